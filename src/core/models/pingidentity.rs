use serde::{Deserialize, Serialize};

/// Name block on a PingOne user
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct PingUserName {
    #[serde(default)]
    pub given: Option<String>,
    #[serde(default)]
    pub family: Option<String>,
    #[serde(default)]
    pub formatted: Option<String>,
}

impl PingUserName {
    /// Formatted name if PingOne supplied one, else "given family"
    pub fn display(&self) -> Option<String> {
        if let Some(formatted) = self.formatted.as_ref().filter(|f| !f.trim().is_empty()) {
            return Some(formatted.clone());
        }

        let joined = [self.given.as_deref(), self.family.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        (!joined.is_empty()).then_some(joined)
    }
}

/// PingOne user record, `memberOfGroupIDs` is present when
/// requested with `include=memberOfGroupIDs`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PingUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: PingUserName,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(rename = "memberOfGroupIDs", default)]
    pub member_of_group_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PingGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Parent groups this group is nested in
    #[serde(rename = "memberOfGroupIDs", default)]
    pub member_of_group_ids: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_deserializes_minimal_record() {
        let user: PingUser = serde_json::from_value(serde_json::json!({
            "id": "u-1",
            "username": "jdoe",
        }))
        .unwrap();

        assert!(user.enabled);
        assert!(user.member_of_group_ids.is_empty());
        assert_eq!(user.name.display(), None);
    }

    #[test]
    fn test_user_deserializes_group_ids() {
        let user: PingUser = serde_json::from_value(serde_json::json!({
            "id": "u-1",
            "username": "jdoe",
            "enabled": false,
            "name": { "given": "Jane", "family": "Doe" },
            "memberOfGroupIDs": ["g-1", "g-2"],
        }))
        .unwrap();

        assert!(!user.enabled);
        assert_eq!(user.member_of_group_ids, vec!["g-1", "g-2"]);
        assert_eq!(user.name.display().as_deref(), Some("Jane Doe"));
    }

    #[test]
    fn test_name_prefers_formatted() {
        let name = PingUserName {
            given: Some("Jane".to_string()),
            family: Some("Doe".to_string()),
            formatted: Some("Dr. Jane Doe".to_string()),
        };
        assert_eq!(name.display().as_deref(), Some("Dr. Jane Doe"));
    }
}
