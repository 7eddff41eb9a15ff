use serde::{Deserialize, Serialize};

use crate::{EntityId, EntityRef};

/// The string used to denote "any" in ability names and target types.
pub const WILDCARD: &str = "*";

/// What an ability applies to.
///
/// An absent target (`Option<Target>::None` wherever a target is accepted)
/// denotes the bare action, which is distinct from [`Target::Any`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// Every target of every type (`*`)
    Any,
    /// Every instance of one type, and the type itself
    Type {
        /// The host's type tag
        type_tag: String,
    },
    /// One persisted instance of a type
    Instance {
        /// The host's type tag
        type_tag: String,
        /// The instance id
        id: EntityId,
    },
}

impl Target {
    /// Target a whole type
    pub fn of_type(type_tag: impl Into<String>) -> Self {
        Self::Type {
            type_tag: type_tag.into(),
        }
    }

    /// Target one instance of a type
    pub fn instance(type_tag: impl Into<String>, id: impl Into<EntityId>) -> Self {
        Self::Instance {
            type_tag: type_tag.into(),
            id: id.into(),
        }
    }

    /// The stored `target_type` column for this target
    pub fn type_tag(&self) -> &str {
        match self {
            Target::Any => WILDCARD,
            Target::Type { type_tag } | Target::Instance { type_tag, .. } => type_tag,
        }
    }

    /// The stored `target_id` column for this target
    pub fn id(&self) -> Option<&EntityId> {
        match self {
            Target::Instance { id, .. } => Some(id),
            _ => None,
        }
    }
}

/// A persisted entity is targeted as an instance; an unsaved one can only
/// stand for its type.
impl From<&EntityRef> for Target {
    fn from(entity: &EntityRef) -> Self {
        match entity.persisted_id() {
            Some(id) => Target::instance(entity.type_tag.clone(), id.clone()),
            None => Target::of_type(entity.type_tag.clone()),
        }
    }
}

impl From<EntityRef> for Target {
    fn from(entity: EntityRef) -> Self {
        Target::from(&entity)
    }
}
