// crates/kernel-transport/src/lib.rs
// ============================================================================
// Module: Kernel Transport
// Description: Transport Port implementations and capability subsumption.
// Purpose: Drive every backend through one session protocol regardless of
//          which capabilities it natively supports.
// Dependencies: kernel-core, reqwest, serde
// ============================================================================

//! ## Overview
//! This crate ships [`HttpTransport`], a `TransportPort` implementation that
//! dispatches session work over HTTP with SSRF-hardened request handling, and
//! [`BackendRegistry`], which fans out to any number of registered backends
//! under an allowlist/denylist access policy. [`capability`] defines the
//! session capability vocabulary and the fallback strategy used when a
//! backend lacks one, so the orchestrator never branches on backend identity.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod capability;
pub mod http;
pub mod registry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use capability::default_fallback;
pub use capability::Capability;
pub use capability::CapabilityProfile;
pub use capability::FallbackStrategy;
pub use http::HttpBackendConfig;
pub use http::HttpTransport;
pub use registry::BackendAccessPolicy;
pub use registry::BackendRegistry;
