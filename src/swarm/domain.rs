use uuid::Uuid;

const MAX_MISSION_ID_LEN: usize = 40;
const FALLBACK_MISSION_ID: &str = "mission";

/// Classify a worker by its agent type
/// Examples:
/// - "backend-engineer" → "backend"
/// - "qa-engineer" → "tests"
/// - "system-architect" → "architecture"
/// - "delivery-implementation-expert" → "general"
pub fn agent_type_to_domain(agent_type: &str) -> &'static str {
    if agent_type.contains("backend") {
        "backend"
    } else if agent_type.contains("frontend") {
        "frontend"
    } else if agent_type.contains("database") {
        "database"
    } else if agent_type.contains("qa") || agent_type.contains("test") {
        "tests"
    } else if agent_type.contains("devops") || agent_type.contains("infra") {
        "infra"
    } else if agent_type.contains("architect") {
        "architecture"
    } else {
        "general"
    }
}

/// Derive a mission id from a free-form title: lower-case ASCII letters and digits,
/// with spaces, hyphens and underscores folded into single hyphens, capped at 40 chars.
pub fn mission_id_from_title(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.trim().to_lowercase().chars() {
        match c {
            'a'..='z' | '0'..='9' => slug.push(c),
            ' ' | '-' | '_' => {
                if !slug.ends_with('-') {
                    slug.push('-');
                }
            }
            _ => {}
        }
    }

    let mut slug: String = slug
        .trim_matches('-')
        .chars()
        .take(MAX_MISSION_ID_LEN)
        .collect();
    // Truncation can leave a dangling separator
    while slug.ends_with('-') {
        slug.pop();
    }

    if slug.is_empty() {
        FALLBACK_MISSION_ID.to_string()
    } else {
        slug
    }
}

/// Random 16-char lowercase hex id
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Random 6-char hex suffix used to disambiguate colliding mission ids
pub fn collision_suffix() -> String {
    Uuid::new_v4().simple().to_string()[..6].to_string()
}

pub fn merge_branch_name(mission_id: &str) -> String {
    format!("swarm/{mission_id}/integration")
}

pub fn worker_branch_name(mission_id: &str, worker_id: &str) -> String {
    format!("swarm/{mission_id}/{worker_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_to_domain() {
        assert_eq!(agent_type_to_domain("backend-engineer"), "backend");
        assert_eq!(agent_type_to_domain("frontend-engineer"), "frontend");
        assert_eq!(agent_type_to_domain("database-engineer"), "database");
        assert_eq!(agent_type_to_domain("qa-engineer"), "tests");
        assert_eq!(agent_type_to_domain("test-writer"), "tests");
        assert_eq!(agent_type_to_domain("devops-engineer"), "infra");
        assert_eq!(agent_type_to_domain("infra-engineer"), "infra");
        assert_eq!(agent_type_to_domain("system-architect"), "architecture");
        assert_eq!(
            agent_type_to_domain("delivery-implementation-expert"),
            "general"
        );
    }

    #[test]
    fn test_agent_type_first_match_wins() {
        // "backend" is checked before "test"
        assert_eq!(agent_type_to_domain("backend-test-runner"), "backend");
    }

    #[test]
    fn test_mission_id_from_title() {
        assert_eq!(mission_id_from_title("Add OAuth Login"), "add-oauth-login");
        assert_eq!(mission_id_from_title("  fix: the  API__bug! "), "fix-the-api-bug");
        assert_eq!(mission_id_from_title("--leading and trailing--"), "leading-and-trailing");
        assert_eq!(mission_id_from_title("Ünïcödé"), "ncd");
    }

    #[test]
    fn test_mission_id_is_capped() {
        let id = mission_id_from_title(&"a".repeat(100));
        assert_eq!(id.len(), 40);

        // cut lands right after a separator
        let title = format!("{} tail", "b".repeat(39));
        assert_eq!(mission_id_from_title(&title), "b".repeat(39));
    }

    #[test]
    fn test_mission_id_empty_title_falls_back() {
        assert_eq!(mission_id_from_title(""), "mission");
        assert_eq!(mission_id_from_title("!!!"), "mission");
    }

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id();
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(generate_id(), id);
    }

    #[test]
    fn test_branch_names() {
        assert_eq!(merge_branch_name("auth"), "swarm/auth/integration");
        assert_eq!(worker_branch_name("auth", "0123abcd"), "swarm/auth/0123abcd");
    }
}
