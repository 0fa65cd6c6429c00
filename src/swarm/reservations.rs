//! Path-pattern overlap rules for advisory file reservations.
//!
//! Matching is prefix based, not full glob: `src/api/**` and `src/api/handlers.rs`
//! overlap, `src/api` and `src/api-v2` do not. Good enough for directory-level locks.

use serde::{Deserialize, Serialize};

use crate::database::reservations::FileReservation;

/// An existing reservation that blocks a requested pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConflict {
    pub worker_id: String,
    /// The pattern held by the other worker
    pub pattern: String,
    pub reason: String,
}

/// Every (held pattern, requested pattern) pair that overlaps, across reservations
/// held by workers other than `worker_id`.
pub fn find_conflicts(
    existing: &[FileReservation],
    worker_id: &str,
    patterns: &[String],
) -> Vec<FileConflict> {
    let mut conflicts = Vec::new();
    for reservation in existing.iter().filter(|r| r.worker_id != worker_id) {
        for held in reservation.pattern_list() {
            for requested in patterns {
                if held == *requested || has_path_overlap(&held, requested) {
                    conflicts.push(FileConflict {
                        worker_id: reservation.worker_id.clone(),
                        pattern: held.clone(),
                        reason: reservation.reason.clone(),
                    });
                }
            }
        }
    }
    conflicts
}

/// Two patterns overlap when, after stripping trailing wildcards and slashes, either
/// is a path-boundary prefix of the other. Empty bases never overlap.
pub fn has_path_overlap(a: &str, b: &str) -> bool {
    let a_base = trim_glob(a);
    let b_base = trim_glob(b);
    if a_base.is_empty() || b_base.is_empty() {
        return false;
    }
    has_path_prefix(a_base, b_base) || has_path_prefix(b_base, a_base)
}

fn trim_glob(pattern: &str) -> &str {
    pattern.trim_end_matches(['*', '/'])
}

fn has_path_prefix(s: &str, prefix: &str) -> bool {
    match s.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(worker: &str, patterns: &[&str], reason: &str) -> FileReservation {
        FileReservation {
            id: format!("res-{worker}"),
            mission_id: "m".to_string(),
            worker_id: worker.to_string(),
            patterns: serde_json::to_string(patterns).unwrap(),
            reason: reason.to_string(),
            created_at: String::new(),
        }
    }

    #[test]
    fn test_overlap_respects_path_boundaries() {
        assert!(has_path_overlap("src/api/**", "src/api/handlers.rs"));
        assert!(has_path_overlap("src/api", "src/api/foo.go"));
        assert!(has_path_overlap("src/api/foo.go", "src/api/"));
        assert!(has_path_overlap("src/api", "src/api"));
        assert!(!has_path_overlap("src/api", "src/apiv2"));
        assert!(!has_path_overlap("src/api", "src/api-v2"));
        assert!(!has_path_overlap("src/api/**", "src/web/**"));
    }

    #[test]
    fn test_bare_wildcards_never_overlap_by_prefix() {
        assert!(!has_path_overlap("*", "src/main.rs"));
        assert!(!has_path_overlap("**/", "src"));
    }

    #[test]
    fn test_find_conflicts_skips_own_reservations() {
        let existing = vec![
            reservation("w1", &["src/api/**"], "refactor handlers"),
            reservation("w2", &["docs/"], "docs pass"),
        ];

        let requested = vec!["src/api/handlers.rs".to_string()];
        assert!(find_conflicts(&existing, "w1", &requested).is_empty());

        let conflicts = find_conflicts(&existing, "w3", &requested);
        assert_eq!(
            conflicts,
            vec![FileConflict {
                worker_id: "w1".to_string(),
                pattern: "src/api/**".to_string(),
                reason: "refactor handlers".to_string(),
            }]
        );
    }

    #[test]
    fn test_identical_wildcards_conflict() {
        let existing = vec![reservation("w1", &["*"], "everything")];
        let conflicts = find_conflicts(&existing, "w2", &["*".to_string()]);
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn test_corrupt_pattern_column_is_ignored() {
        let mut broken = reservation("w1", &["src"], "");
        broken.patterns = "not json".to_string();
        assert!(find_conflicts(&[broken], "w2", &["src".to_string()]).is_empty());
    }
}
