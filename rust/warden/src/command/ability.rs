use std::collections::BTreeSet;

use tracing::debug;
use warden_model::{
    Ability, AbilityId, EntityRef, Grant, GrantFilter, GrantScope, Grantee, NewGrant, Target,
};
use warden_storage::GrantStore;

use super::{
    AbilityRef, Changes, GranteeRef, Invalidation, Outcome, require_persisted,
    resolve_abilities, resolve_grantees, validate_abilities,
};
use crate::{WardenError, WardenSettings};

/// Builder methods shared by [GiveAbility] and [RemoveAbility]
macro_rules! grant_builder {
    ($command:ident, $entry:ident) => {
        impl $command {
            /// Start a command for `grantee`
            pub fn $entry(grantee: impl Into<GranteeRef>) -> Self {
                Self {
                    grantees: vec![grantee.into()],
                    abilities: Vec::new(),
                    target: None,
                    scope: GrantScope::unscoped(),
                    forbidden: false,
                }
            }

            /// Add another grantee
            pub fn and(mut self, grantee: impl Into<GranteeRef>) -> Self {
                self.grantees.push(grantee.into());
                self
            }

            /// Add one ability
            pub fn ability(mut self, ability: impl Into<AbilityRef>) -> Self {
                self.abilities.push(ability.into());
                self
            }

            /// Add several abilities
            pub fn abilities<A>(mut self, abilities: impl IntoIterator<Item = A>) -> Self
            where
                A: Into<AbilityRef>,
            {
                self.abilities.extend(abilities.into_iter().map(Into::into));
                self
            }

            /// Scope abilities given by name to `target`
            pub fn on(mut self, target: impl Into<Target>) -> Self {
                self.target = Some(target.into());
                self
            }

            /// Only grants in `group`
            pub fn within_group(mut self, group: impl Into<String>) -> Self {
                self.scope.group = Some(group.into());
                self
            }

            /// Only grants conditioned on `parent`
            pub fn under(mut self, parent: impl Into<EntityRef>) -> Self {
                self.scope.parent = Some(parent.into());
                self
            }

            /// Operate on forbidding grants instead of allowing ones
            pub fn forbidding(mut self) -> Self {
                self.forbidden = true;
                self
            }
        }
    };
}

/// Give abilities to authorities or roles. Grants already present in the
/// same slot are skipped, so giving twice stores one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GiveAbility {
    /// Who receives the grants
    pub grantees: Vec<GranteeRef>,
    /// What is granted
    pub abilities: Vec<AbilityRef>,
    /// Target for abilities given by name
    pub target: Option<Target>,
    /// Group and parent of the new grants
    pub scope: GrantScope,
    /// Whether the grants forbid
    pub forbidden: bool,
}

grant_builder!(GiveAbility, to);

impl GiveAbility {
    pub(crate) async fn apply<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Outcome {
        let (grantees, abilities) = match self.resolve(store, settings).await {
            Ok(resolved) => resolved,
            Err(error) => return Outcome::rejected(error),
        };

        let invalidation = Invalidation::for_grantees(&grantees);
        Outcome::new(self.give(store, &grantees, &abilities).await, invalidation)
    }

    async fn resolve<S: GrantStore>(
        &self,
        store: &S,
        settings: &WardenSettings,
    ) -> Result<(Vec<Grantee>, Vec<Ability>), WardenError> {
        validate(&self.grantees, &self.abilities, self.target.as_ref(), &self.scope)?;

        let grantees = resolve_grantees(store, settings, &self.grantees, true).await?;
        let abilities =
            resolve_abilities(store, &self.abilities, self.target.as_ref(), true).await?;
        Ok((grantees, abilities))
    }

    async fn give<S: GrantStore>(
        &self,
        store: &S,
        grantees: &[Grantee],
        abilities: &[Ability],
    ) -> Result<Changes, WardenError> {
        let mut added = 0;
        for grantee in grantees {
            let existing = store.grants_for(grantee).await?;
            let fresh: Vec<NewGrant> = abilities
                .iter()
                .map(|ability| NewGrant {
                    ability_id: ability.id,
                    grantee: grantee.clone(),
                    forbidden: self.forbidden,
                    scope: self.scope.clone(),
                })
                .filter(|grant| !existing.iter().any(|stored| stored.same_slot(grant)))
                .collect();

            if !fresh.is_empty() {
                added += store.insert_grants(fresh).await?.len();
            }
        }

        debug!(
            grantees = grantees.len(),
            abilities = abilities.len(),
            forbidden = self.forbidden,
            added,
            "Gave abilities"
        );

        Ok(Changes { added, removed: 0 })
    }
}

/// Remove abilities from authorities or roles. Only grants in exactly the
/// command's scope and with its `forbidden` flag are deleted; abilities named
/// but never stored are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveAbility {
    /// Who loses the grants
    pub grantees: Vec<GranteeRef>,
    /// What is removed
    pub abilities: Vec<AbilityRef>,
    /// Target for abilities given by name
    pub target: Option<Target>,
    /// Group and parent of the grants to delete
    pub scope: GrantScope,
    /// Whether forbidding grants are removed rather than allowing ones
    pub forbidden: bool,
}

grant_builder!(RemoveAbility, from);

impl RemoveAbility {
    pub(crate) async fn apply<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Outcome {
        let (grantees, ability_ids) = match self.resolve(store, settings).await {
            Ok(resolved) => resolved,
            Err(error) => return Outcome::rejected(error),
        };

        let invalidation = Invalidation::for_grantees(&grantees);
        Outcome::new(self.remove(store, &grantees, ability_ids).await, invalidation)
    }

    async fn resolve<S: GrantStore>(
        &self,
        store: &S,
        settings: &WardenSettings,
    ) -> Result<(Vec<Grantee>, Vec<AbilityId>), WardenError> {
        validate(&self.grantees, &self.abilities, self.target.as_ref(), &self.scope)?;

        let grantees = resolve_grantees(store, settings, &self.grantees, false).await?;
        let ability_ids = resolve_abilities(store, &self.abilities, self.target.as_ref(), false)
            .await?
            .into_iter()
            .map(|ability| ability.id)
            .collect();
        Ok((grantees, ability_ids))
    }

    async fn remove<S: GrantStore>(
        &self,
        store: &S,
        grantees: &[Grantee],
        ability_ids: Vec<AbilityId>,
    ) -> Result<Changes, WardenError> {
        let mut removed = 0;
        if !ability_ids.is_empty() {
            for grantee in grantees {
                removed += store
                    .delete_grants(&GrantFilter {
                        ability_ids: ability_ids.clone(),
                        grantee: grantee.clone(),
                        forbidden: self.forbidden,
                        scope: self.scope.clone(),
                    })
                    .await?;
            }
        }

        debug!(
            grantees = grantees.len(),
            abilities = ability_ids.len(),
            forbidden = self.forbidden,
            removed,
            "Removed abilities"
        );

        Ok(Changes { added: 0, removed })
    }
}

/// Make a grantee's unscoped grants with one `forbidden` flag exactly the
/// given abilities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAbilities {
    /// Whose grants are replaced
    pub grantee: GranteeRef,
    /// The complete set of abilities the grantee should hold
    pub abilities: Vec<AbilityRef>,
    /// Target for abilities given by name
    pub target: Option<Target>,
    /// Which kind of grant is synced
    pub forbidden: bool,
}

impl SyncAbilities {
    /// Replace the allowing grants of `grantee` with `abilities`
    pub fn new<A>(grantee: impl Into<GranteeRef>, abilities: impl IntoIterator<Item = A>) -> Self
    where
        A: Into<AbilityRef>,
    {
        Self {
            grantee: grantee.into(),
            abilities: abilities.into_iter().map(Into::into).collect(),
            target: None,
            forbidden: false,
        }
    }

    /// Scope abilities given by name to `target`
    pub fn on(mut self, target: impl Into<Target>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sync forbidding grants instead of allowing ones
    pub fn forbidding(mut self) -> Self {
        self.forbidden = true;
        self
    }

    pub(crate) async fn apply<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Outcome {
        let (grantees, wanted) = match self.resolve(store, settings).await {
            Ok(resolved) => resolved,
            Err(error) => return Outcome::rejected(error),
        };

        let invalidation = Invalidation::for_grantees(&grantees);
        Outcome::new(self.sync(store, &grantees, &wanted).await, invalidation)
    }

    async fn resolve<S: GrantStore>(
        &self,
        store: &S,
        settings: &WardenSettings,
    ) -> Result<(Vec<Grantee>, BTreeSet<AbilityId>), WardenError> {
        let grantees = [self.grantee.clone()];
        validate(&grantees, &self.abilities, self.target.as_ref(), &GrantScope::unscoped())?;

        let grantees = resolve_grantees(store, settings, &grantees, true).await?;
        let wanted = resolve_abilities(store, &self.abilities, self.target.as_ref(), true)
            .await?
            .into_iter()
            .map(|ability| ability.id)
            .collect();
        Ok((grantees, wanted))
    }

    /// Deletes extra grants before inserting missing ones, per grantee
    async fn sync<S: GrantStore>(
        &self,
        store: &S,
        grantees: &[Grantee],
        wanted: &BTreeSet<AbilityId>,
    ) -> Result<Changes, WardenError> {
        let scope = GrantScope::unscoped();
        let mut changes = Changes::default();

        for grantee in grantees {
            let held: BTreeSet<AbilityId> = store
                .grants_for(grantee)
                .await?
                .into_iter()
                .filter(|grant: &Grant| grant.forbidden == self.forbidden && grant.scope == scope)
                .map(|grant| grant.ability_id)
                .collect();

            let extra: Vec<AbilityId> = held.difference(wanted).copied().collect();
            if !extra.is_empty() {
                changes.removed += store
                    .delete_grants(&GrantFilter {
                        ability_ids: extra,
                        grantee: grantee.clone(),
                        forbidden: self.forbidden,
                        scope: scope.clone(),
                    })
                    .await?;
            }

            let missing: Vec<NewGrant> = wanted
                .difference(&held)
                .map(|ability_id| NewGrant {
                    ability_id: *ability_id,
                    grantee: grantee.clone(),
                    forbidden: self.forbidden,
                    scope: scope.clone(),
                })
                .collect();
            if !missing.is_empty() {
                changes.added += store.insert_grants(missing).await?.len();
            }
        }

        debug!(
            forbidden = self.forbidden,
            added = changes.added,
            removed = changes.removed,
            "Synced abilities"
        );

        Ok(changes)
    }
}

/// Everything that can be checked without touching the store
fn validate(
    grantees: &[GranteeRef],
    abilities: &[AbilityRef],
    target: Option<&Target>,
    scope: &GrantScope,
) -> Result<(), WardenError> {
    validate_abilities(abilities, target)?;

    if let Some(parent) = &scope.parent {
        require_persisted(parent)?;
    }

    for grantee in grantees {
        if let GranteeRef::Authority(authority) = grantee {
            require_persisted(authority)?;
        }
    }

    Ok(())
}
