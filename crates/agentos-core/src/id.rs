//! Prefixed opaque identifiers for AgentOS entities.
//!
//! All identifiers cross the wire as opaque strings with a short type prefix
//! (`run_…`, `evt_…`, `req_…`). The random portion is a lowercase ULID, which
//! is lexicographically sortable by creation time and globally unique without
//! coordination.

use ulid::Ulid;

/// Returns a new prefixed identifier, e.g. `run_01j9x…`.
///
/// An empty prefix yields the bare ULID.
#[must_use]
pub fn new(prefix: &str) -> String {
    let raw = Ulid::new().to_string().to_ascii_lowercase();
    if prefix.is_empty() {
        raw
    } else {
        format!("{prefix}_{raw}")
    }
}

/// Returns a new request identifier (`req_…`).
#[must_use]
pub fn request_id() -> String {
    new("req")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_prefix() {
        let id = new("run");
        assert!(id.starts_with("run_"));
        assert!(id.len() > "run_".len());
    }

    #[test]
    fn empty_prefix_yields_bare_id() {
        let id = new("");
        assert!(!id.contains('_'));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new("evt"), new("evt"));
    }

    #[test]
    fn ids_are_lowercase() {
        let id = new("req");
        assert_eq!(id, id.to_ascii_lowercase());
    }
}
