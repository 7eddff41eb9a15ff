use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{AbilityId, EntityRef, RoleId};

/// Store-assigned key of a [`Grant`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GrantId(pub u64);

/// Who a grant is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grantee {
    /// An authority, granted directly
    Authority(EntityRef),
    /// A role, and through it every authority holding it
    Role {
        /// The role's key
        id: RoleId,
    },
}

impl Grantee {
    /// The grantee for a role
    pub fn role(id: RoleId) -> Self {
        Self::Role { id }
    }

    /// Whether this grantee is a role
    pub fn is_role(&self) -> bool {
        matches!(self, Grantee::Role { .. })
    }
}

impl Display for Grantee {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Grantee::Authority(authority) => write!(f, "{authority}"),
            Grantee::Role { id } => write!(f, "role#{id}"),
        }
    }
}

/// The scope columns that, together with the ability, grantee and
/// `forbidden` flag, make a grant unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantScope {
    /// Free-form namespace for the grant
    pub group: Option<String>,
    /// Owning entity the grant is conditioned on
    pub parent: Option<EntityRef>,
}

impl GrantScope {
    /// The scope of ungrouped, unparented grants
    pub fn unscoped() -> Self {
        Self::default()
    }
}

/// A stored allow or forbid edge from a grantee to an ability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Store key
    pub id: GrantId,
    /// The granted ability
    pub ability_id: AbilityId,
    /// Who holds the grant
    pub grantee: Grantee,
    /// Whether the grant forbids rather than allows
    pub forbidden: bool,
    /// Group and parent scope
    #[serde(flatten)]
    pub scope: GrantScope,
}

impl Grant {
    /// Whether this grant occupies the same unique slot as `grant`
    pub fn same_slot(&self, grant: &NewGrant) -> bool {
        self.ability_id == grant.ability_id
            && self.grantee == grant.grantee
            && self.forbidden == grant.forbidden
            && self.scope == grant.scope
    }
}

/// The insert form of a [`Grant`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewGrant {
    /// See [`Grant::ability_id`]
    pub ability_id: AbilityId,
    /// See [`Grant::grantee`]
    pub grantee: Grantee,
    /// See [`Grant::forbidden`]
    pub forbidden: bool,
    /// See [`Grant::scope`]
    #[serde(flatten)]
    pub scope: GrantScope,
}

impl NewGrant {
    /// Materialize the record once the store has assigned an id
    pub fn into_grant(self, id: GrantId) -> Grant {
        Grant {
            id,
            ability_id: self.ability_id,
            grantee: self.grantee,
            forbidden: self.forbidden,
            scope: self.scope,
        }
    }
}

/// A predicate selecting grants for deletion. Every field must match exactly;
/// an unscoped filter only ever matches unscoped grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantFilter {
    /// Grants of any of these abilities
    pub ability_ids: Vec<AbilityId>,
    /// Held by this grantee
    pub grantee: Grantee,
    /// With this flag
    pub forbidden: bool,
    /// In exactly this scope
    pub scope: GrantScope,
}

impl GrantFilter {
    /// Whether `grant` is selected by this filter
    pub fn matches(&self, grant: &Grant) -> bool {
        grant.grantee == self.grantee
            && grant.forbidden == self.forbidden
            && grant.scope == self.scope
            && self.ability_ids.contains(&grant.ability_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(scope: GrantScope) -> Grant {
        Grant {
            id: GrantId(1),
            ability_id: AbilityId(1),
            grantee: Grantee::role(RoleId(1)),
            forbidden: false,
            scope,
        }
    }

    #[test]
    fn it_matches_only_the_exact_scope() {
        let filter = GrantFilter {
            ability_ids: vec![AbilityId(1)],
            grantee: Grantee::role(RoleId(1)),
            forbidden: false,
            scope: GrantScope::unscoped(),
        };

        assert!(filter.matches(&grant(GrantScope::unscoped())));
        assert!(!filter.matches(&grant(GrantScope {
            group: Some("billing".into()),
            parent: None,
        })));
        assert!(!filter.matches(&grant(GrantScope {
            group: None,
            parent: Some(EntityRef::new("team", 1u64)),
        })));
    }

    #[test]
    fn it_keeps_allow_and_forbid_in_separate_slots() {
        let existing = grant(GrantScope::unscoped());
        let forbid = NewGrant {
            ability_id: AbilityId(1),
            grantee: Grantee::role(RoleId(1)),
            forbidden: true,
            scope: GrantScope::unscoped(),
        };

        assert!(!existing.same_slot(&forbid));
        assert!(existing.same_slot(&NewGrant {
            forbidden: false,
            ..forbid
        }));
    }
}
