use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, Display};

pub const API_VERSION: &str = "backstage.io/v1alpha1";

/// Annotation carrying the PingOne id a user entity was built from
pub const USER_ID_ANNOTATION: &str = "pingidentity.org/user-id";
/// Annotation carrying the PingOne id a group entity was built from
pub const GROUP_ID_ANNOTATION: &str = "pingidentity.org/group-id";

/// Longest entity name the catalog accepts
const MAX_NAME_LEN: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, Display)]
pub enum EntityKind {
    User,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default, Builder)]
#[builder(setter(into))]
pub struct EntityMetadata {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[builder(default)]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub member_of: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSpec {
    #[serde(rename = "type")]
    pub group_type: String,
    #[serde(default)]
    pub profile: Profile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub members: Vec<String>,
}

impl Default for GroupSpec {
    fn default() -> Self {
        Self {
            group_type: "team".to_string(),
            profile: Profile::default(),
            parent: None,
            children: Vec::new(),
            members: Vec::new(),
        }
    }
}

/// A normalized user entity as the catalog stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    pub api_version: String,
    pub metadata: EntityMetadata,
    pub spec: UserSpec,
}

impl UserEntity {
    pub fn new(metadata: EntityMetadata, spec: UserSpec) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            metadata,
            spec,
        }
    }
}

/// A normalized group entity as the catalog stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupEntity {
    pub api_version: String,
    pub metadata: EntityMetadata,
    pub spec: GroupSpec,
}

impl GroupEntity {
    pub fn new(metadata: EntityMetadata, spec: GroupSpec) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            metadata,
            spec,
        }
    }
}

/// Any entity the sync can emit, tagged by `kind` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Entity {
    User(UserEntity),
    Group(GroupEntity),
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::User(_) => EntityKind::User,
            Entity::Group(_) => EntityKind::Group,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Entity::User(u) => &u.metadata.name,
            Entity::Group(g) => &g.metadata.name,
        }
    }

    /// `kind:name` reference, unique within a catalog namespace
    pub fn entity_ref(&self) -> String {
        format!("{}:{}", self.kind().as_ref().to_lowercase(), self.name())
    }
}

impl From<UserEntity> for Entity {
    fn from(user: UserEntity) -> Self {
        Entity::User(user)
    }
}

impl From<GroupEntity> for Entity {
    fn from(group: GroupEntity) -> Self {
        Entity::Group(group)
    }
}

/// Maps an arbitrary source string onto the catalog's name alphabet.
/// Anything outside `[A-Za-z0-9._-]` becomes `_`, result is capped in length
pub fn sanitize_entity_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_LEN)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_valid_names() {
        assert_eq!(sanitize_entity_name("jane.doe-1_x"), "jane.doe-1_x");
    }

    #[test]
    fn test_sanitize_replaces_invalid_chars() {
        assert_eq!(sanitize_entity_name("jane doe@corp.com"), "jane_doe_corp.com");
        assert_eq!(sanitize_entity_name("  Platform Team "), "Platform_Team");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "a".repeat(100);
        assert_eq!(sanitize_entity_name(&long).len(), 63);
    }

    #[test]
    fn test_entity_serializes_backstage_shape() {
        let user = UserEntity::new(
            EntityMetadataBuilder::default()
                .name("jdoe")
                .build()
                .unwrap(),
            UserSpec {
                profile: Profile {
                    display_name: Some("Jane Doe".to_string()),
                    email: None,
                },
                member_of: vec!["devs".to_string()],
            },
        );

        let json = serde_json::to_value(Entity::from(user)).unwrap();
        assert_eq!(json["apiVersion"], API_VERSION);
        assert_eq!(json["kind"], "User");
        assert_eq!(json["metadata"]["name"], "jdoe");
        assert_eq!(json["spec"]["profile"]["displayName"], "Jane Doe");
        assert!(json["spec"]["profile"].get("email").is_none());
        assert_eq!(json["spec"]["memberOf"][0], "devs");
    }

    #[test]
    fn test_entity_ref() {
        let group = GroupEntity::new(
            EntityMetadataBuilder::default()
                .name("devs")
                .build()
                .unwrap(),
            GroupSpec::default(),
        );
        assert_eq!(Entity::from(group).entity_ref(), "group:devs");
    }
}
