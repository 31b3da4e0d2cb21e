//! Relationship accounting for source processors.
//!
//! Every relationship a processor exposes must either be auto-terminated or
//! carried by one of its outgoing connections.

use std::collections::BTreeSet;

/// Relationships that are neither auto-terminated nor routed, sorted.
pub fn unaccounted<'a>(
    available: &'a BTreeSet<String>,
    auto_terminated: &[String],
    routed: &BTreeSet<String>,
) -> Vec<&'a str> {
    available
        .iter()
        .filter(|name| !routed.contains(*name) && !auto_terminated.contains(*name))
        .map(String::as_str)
        .collect()
}

/// Message describing unaccounted relationships, if there are any.
pub fn relationship_problem(
    available: &BTreeSet<String>,
    auto_terminated: &[String],
    routed: &BTreeSet<String>,
) -> Option<String> {
    let missing = unaccounted(available, auto_terminated, routed);
    if missing.is_empty() {
        return None;
    }
    Some(format!(
        "Relationships [{}] are not auto-terminated or connected.",
        missing.join(", ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_connected_and_terminated_are_accounted() {
        let available = set(&["failure", "success"]);
        let routed = set(&["success"]);
        let auto_terminated = vec!["failure".to_string()];
        assert!(unaccounted(&available, &auto_terminated, &routed).is_empty());
        assert_eq!(relationship_problem(&available, &auto_terminated, &routed), None);
    }

    #[test]
    fn test_removed_connection_leaves_one_problem() {
        let available = set(&["failure", "success"]);
        let auto_terminated = vec!["failure".to_string()];
        assert_eq!(
            unaccounted(&available, &auto_terminated, &BTreeSet::new()),
            vec!["success"]
        );
    }

    #[test]
    fn test_message_lists_names_sorted() {
        let available = set(&["success", "original", "failure"]);
        assert_eq!(
            relationship_problem(&available, &[], &BTreeSet::new()).as_deref(),
            Some("Relationships [failure, original, success] are not auto-terminated or connected.")
        );
    }
}
