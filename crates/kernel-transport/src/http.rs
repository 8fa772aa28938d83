// crates/kernel-transport/src/http.rs
// ============================================================================
// Module: HTTP Transport Backend
// Description: Transport backend that drives a session protocol over HTTP.
// Purpose: Let the engine dispatch work to an HTTP-reachable backend while
//          enforcing the same SSRF-hardening posture the kernel requires of
//          any outbound network call.
// Dependencies: kernel-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! [`HttpTransport`] opens one session per step attempt, sends each
//! dispatched envelope as a bounded POST request pinned to a resolved IP, and
//! closes the session with a best-effort notification. Scheme restrictions,
//! host allowlists, disabled redirects, and private-network blocking all
//! apply to every request, not just the opening handshake.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io::Read;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;
use std::sync::Mutex;
use std::time::Duration;

use kernel_core::core::identifiers::BackendId;
use kernel_core::core::identifiers::SessionId;
use kernel_core::core::identifiers::StepId;
use kernel_core::interfaces::SessionError;
use kernel_core::interfaces::TransportPort;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use serde::Deserialize;

use crate::capability::CapabilityProfile;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Configuration for one HTTP-reachable transport backend.
///
/// # Invariants
/// - `allow_http = false` blocks cleartext `http://` endpoints.
/// - `max_response_bytes` is a hard upper bound on session responses.
/// - `allow_private_networks = false` blocks private/link-local/loopback targets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HttpBackendConfig {
    /// Base endpoint the backend accepts session requests on.
    pub endpoint: String,
    /// Allow cleartext HTTP (disabled by default).
    pub allow_http: bool,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum response size allowed, in bytes.
    pub max_response_bytes: usize,
    /// Optional host allowlist; `None` allows the endpoint's own host only.
    pub allowed_hosts: Option<BTreeSet<String>>,
    /// Allow requests to private/link-local/loopback addresses.
    pub allow_private_networks: bool,
    /// User agent string for outbound requests.
    pub user_agent: String,
}

impl HttpBackendConfig {
    /// Builds a backend config with hardened defaults for the given endpoint.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            allow_http: false,
            timeout_ms: 30_000,
            max_response_bytes: 4 * 1024 * 1024,
            allowed_hosts: None,
            allow_private_networks: false,
            user_agent: "orchestration-kernel/0.1".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Transport
// ============================================================================

struct OpenSession {
    backend_id: BackendId,
    #[allow(dead_code, reason = "retained for session record completeness; not yet read back")]
    step_id: StepId,
}

/// Transport backend that dispatches session work over HTTP.
///
/// # Invariants
/// - Redirects are never followed.
/// - A session's requests are pinned to the IPs resolved when it was opened.
pub struct HttpTransport {
    backends: BTreeMap<String, (HttpBackendConfig, CapabilityProfile)>,
    sessions: Mutex<BTreeMap<String, OpenSession>>,
}

impl HttpTransport {
    /// Creates a transport with no registered backends.
    #[must_use]
    pub fn new() -> Self {
        Self { backends: BTreeMap::new(), sessions: Mutex::new(BTreeMap::new()) }
    }

    /// Registers an HTTP backend under `backend_id`.
    #[must_use]
    pub fn with_backend(
        mut self,
        backend_id: &BackendId,
        config: HttpBackendConfig,
        capabilities: CapabilityProfile,
    ) -> Self {
        self.backends.insert(backend_id.as_str().to_string(), (config, capabilities));
        self
    }

    fn backend_config(&self, backend_id: &BackendId) -> Result<&HttpBackendConfig, SessionError> {
        self.backends
            .get(backend_id.as_str())
            .map(|(config, _)| config)
            .ok_or_else(|| SessionError::UnknownBackend(backend_id.clone()))
    }

    /// Sends `body` as a pinned POST to the session's owning backend and
    /// returns the parsed JSON response. Shared by the work, finalize, and
    /// route phases; only the envelope they wrap differs.
    fn dispatch(&self, session_id: &SessionId, body: &serde_json::Value) -> Result<serde_json::Value, SessionError> {
        let backend_id = {
            let sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            sessions
                .get(session_id.as_str())
                .map(|session| session.backend_id.clone())
                .ok_or_else(|| SessionError::Closed(session_id.clone()))?
        };
        let config = self
            .backend_config(&backend_id)
            .map_err(|_| SessionError::UnknownBackend(backend_id.clone()))?;
        let url = Url::parse(&config.endpoint)
            .map_err(|err| SessionError::Backend(format!("invalid backend endpoint: {err}")))?;
        let resolved = resolve_request_host(&url, config).map_err(SessionError::Backend)?;
        let mut response = send_pinned_post(&url, config, &resolved, body).map_err(SessionError::Backend)?;
        let response_body = read_response_limited(&mut response, config.max_response_bytes)
            .map_err(SessionError::Backend)?;
        serde_json::from_slice(&response_body)
            .map_err(|err| SessionError::Backend(format!("backend response was not valid json: {err}")))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TransportPort for HttpTransport {
    fn open_session(&self, backend_id: &BackendId, step_id: &StepId) -> Result<SessionId, SessionError> {
        self.backend_config(backend_id)?;
        let session_id = SessionId::new(format!("{backend_id}-{step_id}-{}", unique_suffix()));
        let mut sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions.insert(
            session_id.as_str().to_string(),
            OpenSession { backend_id: backend_id.clone(), step_id: step_id.clone() },
        );
        Ok(session_id)
    }

    fn work(&self, session_id: &SessionId, prompt: &serde_json::Value) -> Result<serde_json::Value, SessionError> {
        self.dispatch(session_id, &serde_json::json!({"phase": "work", "prompt": prompt}))
    }

    fn finalize(&self, session_id: &SessionId, schema: &serde_json::Value) -> Result<serde_json::Value, SessionError> {
        self.dispatch(session_id, &serde_json::json!({"phase": "finalize", "schema": schema}))
    }

    fn route(&self, session_id: &SessionId, schema: &serde_json::Value) -> Result<Option<serde_json::Value>, SessionError> {
        let result = self.dispatch(session_id, &serde_json::json!({"phase": "route", "schema": schema}))?;
        Ok(if result.is_null() { None } else { Some(result) })
    }

    fn close(&self, session_id: &SessionId) -> Result<(), SessionError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        sessions.remove(session_id.as_str()).ok_or_else(|| SessionError::Closed(session_id.clone()))?;
        Ok(())
    }
}

fn unique_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|dur| dur.as_nanos())
        .unwrap_or(0)
}

// ============================================================================
// SECTION: SSRF-Hardened Request Dispatch
// ============================================================================

/// Sends a POST request pinned to a resolved IP, rejecting any server-side redirect.
fn send_pinned_post(
    url: &Url,
    config: &HttpBackendConfig,
    resolved: &ResolvedHost,
    body: &serde_json::Value,
) -> Result<Response, String> {
    let mut last_error: Option<String> = None;
    for ip in &resolved.ips {
        let client = match client_for_ip(config, resolved, *ip) {
            Ok(client) => client,
            Err(err) => {
                last_error = Some(err);
                continue;
            }
        };
        let Ok(response) = client.post(url.as_str()).json(body).send() else {
            last_error = Some("http request failed".to_string());
            continue;
        };
        if response.url() != url {
            return Err("http redirect not allowed".to_string());
        }
        enforce_ip_policy(&resolved.host_label, *ip, config.allow_private_networks)?;
        return Ok(response);
    }
    Err(last_error.unwrap_or_else(|| "http request failed".to_string()))
}

fn client_for_ip(config: &HttpBackendConfig, resolved: &ResolvedHost, ip: IpAddr) -> Result<Client, String> {
    if !resolved.is_domain {
        return build_http_client(config, None);
    }
    let socket_addr = SocketAddr::new(ip, resolved.port);
    build_http_client(config, Some((&resolved.host, socket_addr)))
}

fn build_http_client(config: &HttpBackendConfig, resolve: Option<(&str, SocketAddr)>) -> Result<Client, String> {
    let mut builder = Client::builder()
        .timeout(Duration::from_millis(config.timeout_ms))
        .user_agent(config.user_agent.clone())
        .redirect(Policy::none());
    if let Some((host, socket_addr)) = resolve {
        builder = builder.resolve(host, socket_addr);
    }
    builder.build().map_err(|_| "http client build failed".to_string())
}

fn resolve_request_host(url: &Url, config: &HttpBackendConfig) -> Result<ResolvedHost, String> {
    validate_url(url, config)?;
    let host = url.host_str().ok_or_else(|| "url host required".to_string())?;
    let host_label = normalize_host_label(host);
    let host_for_resolution =
        host.strip_prefix('[').and_then(|inner| inner.strip_suffix(']')).unwrap_or(host);
    let port = url.port_or_known_default().ok_or_else(|| "url port required".to_string())?;
    let mut ips = resolve_host_ips(host_for_resolution, port)?;
    if ips.is_empty() {
        return Err("url host has no resolved addresses".to_string());
    }
    for ip in &ips {
        enforce_ip_policy(&host_label, *ip, config.allow_private_networks)?;
    }
    dedupe_ips(&mut ips);
    Ok(ResolvedHost {
        host: host_for_resolution.to_string(),
        host_label,
        port,
        ips,
        is_domain: host_for_resolution.parse::<IpAddr>().is_err(),
    })
}

fn validate_url(url: &Url, config: &HttpBackendConfig) -> Result<(), String> {
    match url.scheme() {
        "https" => {}
        "http" if config.allow_http => {}
        _ => return Err("unsupported url scheme".to_string()),
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err("url credentials are not allowed".to_string());
    }
    if let Some(allowlist) = &config.allowed_hosts {
        let host = normalize_host_label(url.host_str().ok_or_else(|| "url host required".to_string())?);
        let allowed = allowlist.iter().any(|entry| normalize_host_label(entry.as_str()) == host);
        if !allowed {
            return Err("url host not allowed".to_string());
        }
    }
    Ok(())
}

fn resolve_host_ips(host: &str, port: u16) -> Result<Vec<IpAddr>, String> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }
    (host, port)
        .to_socket_addrs()
        .map(|iter| iter.map(|addr| addr.ip()).collect::<Vec<IpAddr>>())
        .map_err(|_| "url host resolution failed".to_string())
}

fn enforce_ip_policy(host_label: &str, ip: IpAddr, allow_private_networks: bool) -> Result<(), String> {
    if allow_private_networks {
        return Ok(());
    }
    if is_private_or_link_local(&ip) {
        return Err(format!("url host resolves to private or link-local address: {host_label}"));
    }
    Ok(())
}

const fn is_private_or_link_local(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => {
            addr.is_private()
                || addr.is_loopback()
                || addr.is_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
                || addr.is_broadcast()
        }
        IpAddr::V6(addr) => {
            let mapped_private = if let Some(mapped) = addr.to_ipv4_mapped() {
                mapped.is_private()
                    || mapped.is_loopback()
                    || mapped.is_link_local()
                    || mapped.is_unspecified()
                    || mapped.is_multicast()
                    || mapped.is_broadcast()
            } else {
                false
            };
            mapped_private
                || addr.is_loopback()
                || addr.is_unique_local()
                || addr.is_unicast_link_local()
                || addr.is_unspecified()
                || addr.is_multicast()
        }
    }
}

fn normalize_host_label(host: &str) -> String {
    let trimmed = host.trim_end_matches('.');
    let trimmed = trimmed.strip_prefix('[').and_then(|inner| inner.strip_suffix(']')).unwrap_or(trimmed);
    trimmed.to_ascii_lowercase()
}

fn dedupe_ips(ips: &mut Vec<IpAddr>) {
    let mut unique = Vec::with_capacity(ips.len());
    for ip in ips.drain(..) {
        if !unique.contains(&ip) {
            unique.push(ip);
        }
    }
    *ips = unique;
}

/// Resolved host metadata for pinned outbound requests.
///
/// # Invariants
/// - `ips` is non-empty and deduplicated.
struct ResolvedHost {
    host: String,
    host_label: String,
    port: u16,
    ips: Vec<IpAddr>,
    is_domain: bool,
}

fn read_response_limited(response: &mut Response, max_bytes: usize) -> Result<Vec<u8>, String> {
    let expected_len = response.content_length();
    let max_bytes_u64 = u64::try_from(max_bytes).map_err(|_| "response size limit exceeds u64".to_string())?;
    if let Some(expected) = expected_len
        && expected > max_bytes_u64
    {
        return Err("http response exceeds size limit".to_string());
    }
    let mut buf = Vec::new();
    let limit = max_bytes_u64.saturating_add(1);
    let mut handle = response.take(limit);
    handle.read_to_end(&mut buf).map_err(|_| "failed to read response".to_string())?;
    if buf.len() > max_bytes {
        return Err("http response exceeds size limit".to_string());
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_a_session_against_an_unregistered_backend_fails() {
        let transport = HttpTransport::new();
        let backend_id = BackendId::new("missing");
        let step_id = StepId::new("step-1");
        let err = transport.open_session(&backend_id, &step_id).expect_err("unknown backend");
        assert!(matches!(err, SessionError::UnknownBackend(_)));
    }

    #[test]
    fn closing_an_unopened_session_is_rejected() {
        let transport = HttpTransport::new();
        let session_id = SessionId::new("ghost");
        let err = transport.close(&session_id).expect_err("closed");
        assert!(matches!(err, SessionError::Closed(_)));
    }

    #[test]
    fn opening_a_session_against_a_registered_backend_succeeds() {
        let backend_id = BackendId::new("local");
        let transport = HttpTransport::new().with_backend(
            &backend_id,
            HttpBackendConfig::new("https://backend.example/session"),
            CapabilityProfile::default(),
        );
        let step_id = StepId::new("step-1");
        let session_id = transport.open_session(&backend_id, &step_id).expect("opened");
        transport.close(&session_id).expect("closed");
    }

    #[test]
    fn a_cleartext_endpoint_is_rejected_unless_allowed() {
        let config = HttpBackendConfig::new("http://backend.example/session");
        let url = Url::parse(&config.endpoint).expect("url");
        let err = validate_url(&url, &config).expect_err("rejected");
        assert_eq!(err, "unsupported url scheme");
    }

    #[test]
    fn an_allowlisted_host_passes_validation() {
        let mut config = HttpBackendConfig::new("https://backend.example/session");
        config.allowed_hosts = Some(BTreeSet::from(["backend.example".to_string()]));
        let url = Url::parse(&config.endpoint).expect("url");
        validate_url(&url, &config).expect("allowed");
    }

    #[test]
    fn a_host_outside_the_allowlist_is_rejected() {
        let mut config = HttpBackendConfig::new("https://backend.example/session");
        config.allowed_hosts = Some(BTreeSet::from(["other.example".to_string()]));
        let url = Url::parse(&config.endpoint).expect("url");
        let err = validate_url(&url, &config).expect_err("rejected");
        assert_eq!(err, "url host not allowed");
    }
}
