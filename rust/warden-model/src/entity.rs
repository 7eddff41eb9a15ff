use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// The host-assigned identity of a persisted entity.
///
/// Hosts use integer keys, UUIDs or slugs interchangeably, so ids are kept as
/// opaque strings and only ever compared or rendered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// The id as it appears inside canonical identifiers and cache keys
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty id carries no identity and is treated as absent
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A reference to an entity owned by the host application: an authority, a
/// target instance or a parent scope.
///
/// The engine never loads these entities; it only needs a stable type tag and,
/// for persisted entities, an id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// The host's name for the entity's type (e.g. `user`, `document`)
    pub type_tag: String,
    /// The entity's id, or `None` if it has not been persisted
    pub id: Option<EntityId>,
}

impl EntityRef {
    /// Reference a persisted entity
    pub fn new(type_tag: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Self {
            type_tag: type_tag.into(),
            id: Some(id.into()),
        }
    }

    /// Reference an entity that has no identity yet
    pub fn unsaved(type_tag: impl Into<String>) -> Self {
        Self {
            type_tag: type_tag.into(),
            id: None,
        }
    }

    /// The id of a persisted entity; empty ids count as unsaved
    pub fn persisted_id(&self) -> Option<&EntityId> {
        self.id.as_ref().filter(|id| !id.is_empty())
    }

    /// Whether this entity has a stable identity
    pub fn is_persisted(&self) -> bool {
        self.persisted_id().is_some()
    }
}

impl From<&EntityRef> for EntityRef {
    fn from(entity: &EntityRef) -> Self {
        entity.clone()
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.persisted_id() {
            Some(id) => write!(f, "{}#{}", self.type_tag, id),
            None => write!(f, "{}#<unsaved>", self.type_tag),
        }
    }
}
