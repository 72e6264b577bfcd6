//! Deterministic document ids.
//!
//! Trigger delivery is at-least-once, so every document a processor writes
//! gets an id derived from the inputs that caused it. A redelivered event
//! then addresses the same document instead of allocating a new one.

use uuid::Uuid;

/// Namespace for Action ids keyed by `(incident_id, template_id)`.
const ACTION_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_5e0a_3b7d_4a52_9d0e_8f21_c4b6_a901);

/// Namespace for HistoryEntry ids keyed by `(action_id, from, to, version)`.
const HISTORY_NAMESPACE: Uuid = Uuid::from_u128(0x2a94_d7c3_0e51_4f6b_b8a2_17c9_5d3e_f40c);

/// Parts are joined with the ASCII unit separator so `("a b", "c")` and
/// `("a", "b c")` never collide.
fn derive(namespace: &Uuid, parts: &[&str]) -> String {
    let key = parts.join("\u{1f}");
    Uuid::new_v5(namespace, key.as_bytes()).to_string()
}

pub fn action_id(incident_id: &str, template_id: &str) -> String {
    derive(&ACTION_NAMESPACE, &[incident_id, template_id])
}

pub fn history_id(action_id: &str, previous_status: &str, new_status: &str, version: u64) -> String {
    derive(
        &HISTORY_NAMESPACE,
        &[action_id, previous_status, new_status, &version.to_string()],
    )
}

/// Fresh id for documents created by writers rather than processors.
pub fn random_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_id_is_stable_and_input_sensitive() {
        assert_eq!(action_id("E1", "T1"), action_id("E1", "T1"));
        assert_ne!(action_id("E1", "T1"), action_id("E1", "T2"));
        assert_ne!(action_id("E1", "T1"), action_id("E2", "T1"));
    }

    #[test]
    fn separator_prevents_boundary_collisions() {
        assert_ne!(action_id("a b", "c"), action_id("a", "b c"));
        assert_ne!(action_id("ab", "c"), action_id("a", "bc"));
    }

    #[test]
    fn history_id_depends_on_version() {
        let first = history_id("A1", "not required", "in progress", 2);
        assert_eq!(first, history_id("A1", "not required", "in progress", 2));
        assert_ne!(first, history_id("A1", "not required", "in progress", 4));
        assert_ne!(first, history_id("A1", "in progress", "not required", 2));
    }

    #[test]
    fn action_and_history_namespaces_differ() {
        assert_ne!(action_id("x", "y"), derive(&HISTORY_NAMESPACE, &["x", "y"]));
    }
}
