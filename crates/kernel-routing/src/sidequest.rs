// crates/kernel-routing/src/sidequest.rs
// ============================================================================
// Module: Sidequest Catalog
// Description: Bounded detour steps a stalled run can be routed into.
// Purpose: Give the routing driver's Tier 2 deterministic stall rule
//          something concrete to detour to, instead of escalating every stall.
// Dependencies: kernel-core
// ============================================================================

//! ## Overview
//! A sidequest catalog entry names a flow-graph step (already present in the
//! graph, typically a [`kernel_core::core::StepKind::Sidequest`] node) and
//! the error-signature prefixes it claims to remediate. When Tier 2's stall
//! rule fires, [`SidequestCatalog::matching`] looks for the first entry whose
//! trigger matches the repeated failure, in catalog order.

use kernel_core::core::SidequestId;
use kernel_core::core::StepId;
use kernel_core::interfaces::Page;

/// One entry in the sidequest catalog.
///
/// # Invariants
/// - `target_step` must name a node already present in the flow graph the
///   catalog is used alongside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidequestEntry {
    /// Catalog identifier for this sidequest.
    pub sidequest_id: SidequestId,
    /// Step the flow detours into when this entry matches.
    pub target_step: StepId,
    /// Step the flow resumes at once the sidequest completes.
    pub resume_step: StepId,
    /// Error-signature prefixes this sidequest is triggered by.
    pub trigger_signatures: Vec<String>,
    /// Selection priority; higher wins when multiple entries match.
    pub priority: i32,
}

impl SidequestEntry {
    fn matches(&self, error_signature: &str) -> bool {
        self.trigger_signatures.iter().any(|prefix| error_signature.starts_with(prefix.as_str()))
    }
}

/// An ordered set of sidequests available to the routing driver.
#[derive(Debug, Clone, Default)]
pub struct SidequestCatalog {
    entries: Vec<SidequestEntry>,
}

impl SidequestCatalog {
    /// Builds a catalog from `entries`.
    #[must_use]
    pub fn new(entries: Vec<SidequestEntry>) -> Self {
        Self { entries }
    }

    /// Returns the highest-priority entry whose trigger matches `error_signature`.
    #[must_use]
    pub fn matching(&self, error_signature: &str) -> Option<&SidequestEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.matches(error_signature))
            .max_by_key(|entry| entry.priority)
    }

    /// Returns every catalog entry, in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[SidequestEntry] {
        &self.entries
    }

    /// Returns a page of catalog entries in declaration order, starting just
    /// past `after` (the cursor returned by a previous call).
    ///
    /// The cursor is the declaration-order index of the last entry returned;
    /// it is opaque to callers beyond being passed back verbatim.
    #[must_use]
    pub fn list(&self, after: Option<&str>, limit: usize) -> Page<SidequestEntry> {
        let start = after.and_then(|cursor| cursor.parse::<usize>().ok()).map_or(0, |index| index + 1);
        let items: Vec<SidequestEntry> = self.entries.iter().skip(start).take(limit).cloned().collect();
        let next_cursor = if items.is_empty() {
            None
        } else {
            let last_index = start + items.len() - 1;
            (last_index + 1 < self.entries.len()).then(|| last_index.to_string())
        };
        Page { items, next_cursor }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, signature: &str, priority: i32) -> SidequestEntry {
        SidequestEntry {
            sidequest_id: SidequestId::new(id),
            target_step: StepId::new(format!("{id}-detour")),
            resume_step: StepId::new("resume"),
            trigger_signatures: vec![signature.to_string()],
            priority,
        }
    }

    #[test]
    fn matching_finds_a_prefix_match() {
        let catalog = SidequestCatalog::new(vec![entry("fix-lint", "lint_error", 0)]);
        let found = catalog.matching("lint_error:E0502").expect("match");
        assert_eq!(found.sidequest_id, SidequestId::new("fix-lint"));
    }

    #[test]
    fn matching_returns_none_when_nothing_matches() {
        let catalog = SidequestCatalog::new(vec![entry("fix-lint", "lint_error", 0)]);
        assert!(catalog.matching("timeout_error").is_none());
    }

    #[test]
    fn matching_prefers_the_higher_priority_entry() {
        let catalog = SidequestCatalog::new(vec![entry("low", "timeout", 0), entry("high", "timeout", 5)]);
        let found = catalog.matching("timeout_in_build").expect("match");
        assert_eq!(found.sidequest_id, SidequestId::new("high"));
    }

    #[test]
    fn list_pages_through_entries_in_declaration_order() {
        let catalog = SidequestCatalog::new(vec![entry("a", "x", 0), entry("b", "x", 0), entry("c", "x", 0)]);
        let first = catalog.list(None, 2);
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.items[0].sidequest_id, SidequestId::new("a"));
        assert_eq!(first.items[1].sidequest_id, SidequestId::new("b"));
        let cursor = first.next_cursor.expect("more entries remain");

        let second = catalog.list(Some(&cursor), 2);
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].sidequest_id, SidequestId::new("c"));
        assert!(second.next_cursor.is_none());
    }

    #[test]
    fn list_returns_an_empty_page_past_the_end() {
        let catalog = SidequestCatalog::new(vec![entry("a", "x", 0)]);
        let page = catalog.list(Some("0"), 10);
        assert!(page.items.is_empty());
        assert!(page.next_cursor.is_none());
    }
}
