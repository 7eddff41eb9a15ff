use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{EntityId, Target, canonical_identifier};

/// Store-assigned key of an [`Ability`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct AbilityId(pub u64);

impl Display for AbilityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity of an ability: at most one [`Ability`] exists per key.
///
/// Keys built with [`AbilityKey::new`] are lowercased like the identifier
/// they are stored under, so `Edit` and `edit` name the same ability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AbilityKey {
    /// The action name; `*` for every action
    pub name: String,
    /// A concrete type, `*` for any type, or `None` for the bare action
    pub target_type: Option<String>,
    /// A specific instance; only meaningful alongside a concrete type
    pub target_id: Option<EntityId>,
}

impl AbilityKey {
    /// The key of `name` scoped to `target`
    pub fn new(name: impl Into<String>, target: Option<&Target>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            target_type: target.map(|target| target.type_tag().to_lowercase()),
            target_id: target
                .and_then(Target::id)
                .map(|id| EntityId::from(id.as_str().to_lowercase())),
        }
    }

    /// The canonical identifier this key is stored under
    pub fn identifier(&self) -> String {
        canonical_identifier(
            &self.name,
            self.target_type.as_deref(),
            self.target_id.as_ref(),
        )
    }
}

/// A reusable named capability, optionally scoped to a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ability {
    /// Store key
    pub id: AbilityId,
    /// Human-readable label
    pub title: Option<String>,
    /// The identity tuple
    #[serde(flatten)]
    pub key: AbilityKey,
}

impl Ability {
    /// See [`AbilityKey::identifier`]
    pub fn identifier(&self) -> String {
        self.key.identifier()
    }

    /// The action name
    pub fn name(&self) -> &str {
        &self.key.name
    }
}

/// The insert form of an [`Ability`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAbility {
    /// The identity tuple
    pub key: AbilityKey,
    /// Human-readable label
    pub title: Option<String>,
}

impl NewAbility {
    /// Materialize the record once the store has assigned an id
    pub fn into_ability(self, id: AbilityId) -> Ability {
        Ability {
            id,
            title: self.title,
            key: self.key,
        }
    }
}

impl From<AbilityKey> for NewAbility {
    fn from(key: AbilityKey) -> Self {
        Self { key, title: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_derives_columns_from_the_target() {
        let key = AbilityKey::new("edit", Some(&Target::Any));
        assert_eq!(key.target_type.as_deref(), Some("*"));
        assert_eq!(key.target_id, None);

        let key = AbilityKey::new("edit", Some(&Target::instance("post", 9u64)));
        assert_eq!(key.target_type.as_deref(), Some("post"));
        assert_eq!(key.target_id, Some(EntityId::from(9u64)));

        let key = AbilityKey::new("edit", None);
        assert_eq!(key.target_type, None);
    }

    #[test]
    fn it_ignores_case_in_ability_identity() {
        let key = AbilityKey::new("Edit", Some(&Target::instance("Post", "A7")));

        assert_eq!(key, AbilityKey::new("edit", Some(&Target::instance("post", "a7"))));
        assert_eq!(key.name, "edit");
        assert_eq!(key.identifier(), "edit-post-a7");
    }

    #[test]
    fn it_serializes_abilities_flat() -> Result<(), serde_json::Error> {
        let ability = NewAbility::from(AbilityKey::new("edit", Some(&Target::of_type("post"))))
            .into_ability(AbilityId(4));
        let json = serde_json::to_value(&ability)?;

        assert_eq!(json["name"], "edit");
        assert_eq!(json["target_type"], "post");
        assert_eq!(json["id"], 4);
        Ok(())
    }
}
