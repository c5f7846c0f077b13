use crate::core::models::entity::{
    EntityKind, EntityMetadataBuilder, GROUP_ID_ANNOTATION, GroupEntity, GroupSpec, Profile,
    USER_ID_ANNOTATION, UserEntity, UserSpec, sanitize_entity_name,
};
use crate::core::models::pingidentity::{PingGroup, PingUser};
use crate::core::pingidentity::{ClientError, IdentitySourceClient};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps a PingOne user onto a catalog user, `None` drops the record
pub type UserTransformer = Arc<dyn Fn(&PingUser) -> Option<UserEntity> + Send + Sync>;

/// Maps a PingOne group onto a catalog group, `None` drops the record
pub type GroupTransformer = Arc<dyn Fn(&PingGroup) -> Option<GroupEntity> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ReadOptions {
    pub user_query_size: u32,
    pub group_query_size: u32,
    pub user_transformer: Option<UserTransformer>,
    pub group_transformer: Option<GroupTransformer>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadResult {
    pub users: Vec<UserEntity>,
    pub groups: Vec<GroupEntity>,
}

/// Username as entity name, profile from the PingOne name/email
pub fn default_user_transformer(user: &PingUser) -> Option<UserEntity> {
    let name = sanitize_entity_name(&user.username);
    if name.is_empty() {
        return None;
    }

    let metadata = EntityMetadataBuilder::default()
        .name(name)
        .annotations(BTreeMap::from([(
            USER_ID_ANNOTATION.to_string(),
            user.id.clone(),
        )]))
        .build()
        .ok()?;

    Some(UserEntity::new(
        metadata,
        UserSpec {
            profile: Profile {
                display_name: user.name.display(),
                email: user.email.clone(),
            },
            member_of: Vec::new(),
        },
    ))
}

/// Group name as entity name, display name kept verbatim
pub fn default_group_transformer(group: &PingGroup) -> Option<GroupEntity> {
    let name = sanitize_entity_name(&group.name);
    if name.is_empty() {
        return None;
    }

    let metadata = EntityMetadataBuilder::default()
        .name(name)
        .description(group.description.clone())
        .annotations(BTreeMap::from([(
            GROUP_ID_ANNOTATION.to_string(),
            group.id.clone(),
        )]))
        .build()
        .ok()?;

    Some(GroupEntity::new(
        metadata,
        GroupSpec {
            profile: Profile {
                display_name: Some(group.name.clone()),
                email: None,
            },
            ..GroupSpec::default()
        },
    ))
}

/// Fetches every user and group, runs them through the transformers
/// and links memberships between whatever entities were emitted.
/// Output is ordered by entity name
pub async fn read_ping_identity(
    client: &dyn IdentitySourceClient,
    options: &ReadOptions,
) -> Result<ReadResult, ClientError> {
    let (raw_users, raw_groups) = tokio::try_join!(
        client.fetch_users(options.user_query_size),
        client.fetch_groups(options.group_query_size),
    )?;

    debug!(
        "Fetched {} raw users and {} raw groups",
        raw_users.len(),
        raw_groups.len()
    );

    let user_transformer = options
        .user_transformer
        .clone()
        .unwrap_or_else(|| Arc::new(default_user_transformer) as UserTransformer);
    let group_transformer = options
        .group_transformer
        .clone()
        .unwrap_or_else(|| Arc::new(default_group_transformer) as GroupTransformer);

    let users: Vec<(&PingUser, UserEntity)> = raw_users
        .iter()
        .filter_map(|raw| user_transformer(raw).map(|entity| (raw, entity)))
        .collect();
    let groups: Vec<(&PingGroup, GroupEntity)> = raw_groups
        .iter()
        .filter_map(|raw| group_transformer(raw).map(|entity| (raw, entity)))
        .collect();

    Ok(resolve_relations(users, groups))
}

/// Keeps one record per entity name, the one with the lowest source id.
/// Distinct source names can collapse onto one name after sanitizing
fn drop_duplicate_names<'a, R, E>(
    mut records: Vec<(&'a R, E)>,
    kind: EntityKind,
    source_id: fn(&R) -> &str,
    entity_name: fn(&E) -> &str,
) -> Vec<(&'a R, E)> {
    records.sort_by(|a, b| {
        entity_name(&a.1)
            .cmp(entity_name(&b.1))
            .then_with(|| source_id(a.0).cmp(source_id(b.0)))
    });

    records.dedup_by(|dropped, kept| {
        let duplicate = entity_name(&dropped.1) == entity_name(&kept.1);
        if duplicate {
            warn!(
                "Dropping PingIdentity {} {}, its entity name {} is already taken by {}",
                kind,
                source_id(dropped.0),
                entity_name(&dropped.1),
                source_id(kept.0)
            );
        }
        duplicate
    });

    records
}

fn ping_user_id(user: &PingUser) -> &str {
    &user.id
}

fn ping_group_id(group: &PingGroup) -> &str {
    &group.id
}

fn user_name(user: &UserEntity) -> &str {
    &user.metadata.name
}

fn group_name(group: &GroupEntity) -> &str {
    &group.metadata.name
}

fn resolve_relations(
    users: Vec<(&PingUser, UserEntity)>,
    groups: Vec<(&PingGroup, GroupEntity)>,
) -> ReadResult {
    let users = drop_duplicate_names(users, EntityKind::User, ping_user_id, user_name);
    let groups = drop_duplicate_names(groups, EntityKind::Group, ping_group_id, group_name);

    let group_names: HashMap<&str, String> = groups
        .iter()
        .map(|(raw, entity)| {
            let raw: &PingGroup = *raw;
            (raw.id.as_str(), entity.metadata.name.clone())
        })
        .collect();

    let mut members: HashMap<String, BTreeSet<String>> = HashMap::new();

    let mut out_users: Vec<UserEntity> = users
        .into_iter()
        .map(|(raw, mut entity)| {
            let mut member_of: BTreeSet<String> = entity.spec.member_of.drain(..).collect();
            for group_id in &raw.member_of_group_ids {
                if let Some(group_name) = group_names.get(group_id.as_str()) {
                    member_of.insert(group_name.clone());
                    members
                        .entry(group_name.clone())
                        .or_default()
                        .insert(entity.metadata.name.clone());
                }
            }
            entity.spec.member_of = member_of.into_iter().collect();
            entity
        })
        .collect();

    let mut out_groups: Vec<GroupEntity> = groups
        .into_iter()
        .map(|(raw, mut entity)| {
            if entity.spec.parent.is_none() {
                entity.spec.parent = raw
                    .member_of_group_ids
                    .iter()
                    .filter_map(|id| group_names.get(id.as_str()))
                    .find(|parent| **parent != entity.metadata.name)
                    .cloned();
            }

            let mut group_members: BTreeSet<String> = entity.spec.members.drain(..).collect();
            if let Some(found) = members.remove(&entity.metadata.name) {
                group_members.extend(found);
            }
            entity.spec.members = group_members.into_iter().collect();
            entity
        })
        .collect();

    let mut children: HashMap<String, BTreeSet<String>> = HashMap::new();
    for group in &out_groups {
        if let Some(parent) = &group.spec.parent {
            children
                .entry(parent.clone())
                .or_default()
                .insert(group.metadata.name.clone());
        }
    }

    for group in out_groups.iter_mut() {
        let mut group_children: BTreeSet<String> = group.spec.children.drain(..).collect();
        if let Some(found) = children.remove(&group.metadata.name) {
            group_children.extend(found);
        }
        group.spec.children = group_children.into_iter().collect();
    }

    out_users.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
    out_groups.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

    ReadResult {
        users: out_users,
        groups: out_groups,
    }
}
