use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warden_model::{Ability, AbilityId, EntityRef, NewRole, Role, Target, compile, sort_roles};
use warden_storage::{CacheBackend, GrantStore};

use crate::command::{Invalidation, Outcome};
use crate::source::grantees_for;
use crate::{
    AssignRoles, CachedMapSource, Changes, CreateRole, Decision, DeleteRole, Gate, GiveAbility,
    GranteeRef, HostPolicies, MapSource, PermissionMap, RemoveAbility, RetractRoles, RoleRef,
    StoreMapSource, SyncAbilities, SyncRoles, WardenError, WardenSettings,
};

/// Which roles [Warden::roles] lists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleVisibility {
    /// Only roles not marked private
    #[default]
    Public,
    /// Every role
    All,
}

/// The entry point of the engine: answers checks from (possibly cached)
/// permission maps and runs mutation commands, invalidating exactly the maps
/// each command may have made stale before returning.
///
/// A [Warden] is a cheap handle; clones share the store, the cache and the
/// settings.
///
/// ```rust
/// # async fn example() -> Result<(), warden::WardenError> {
/// use warden::{Warden, WardenSettings};
/// use warden_model::{EntityRef, Target};
/// use warden_storage::{MemoryCacheBackend, MemoryGrantStore};
///
/// let warden = Warden::with_cache(
///     MemoryGrantStore::default(),
///     MemoryCacheBackend::default(),
///     WardenSettings::default(),
/// );
/// let alice = EntityRef::new("user", 1u64);
///
/// warden.allow("admin", "edit", Some(Target::of_type("site"))).await?;
/// warden.assign(&alice, "admin").await?;
///
/// assert!(warden.can(&alice, "edit", Some(&Target::of_type("site"))).await?);
/// assert!(warden.is_a(&alice, &["admin"]).await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Warden<Store>
where
    Store: GrantStore + 'static,
{
    store: Store,
    source: Arc<dyn MapSource>,
    settings: Arc<WardenSettings>,
}

impl<Store> Warden<Store>
where
    Store: GrantStore + 'static,
{
    /// An engine that computes every permission map from `store`
    pub fn new(store: Store, settings: WardenSettings) -> Self {
        Self {
            source: Arc::new(StoreMapSource::new(store.clone())),
            store,
            settings: Arc::new(settings),
        }
    }

    /// An engine that keeps permission maps in `cache`, unless caching is
    /// disabled in `settings`, in which case `cache` is never touched
    pub fn with_cache<Cache>(store: Store, cache: Cache, settings: WardenSettings) -> Self
    where
        Cache: CacheBackend<Key = String, Value = Arc<PermissionMap>> + 'static,
    {
        if !settings.cache.enabled {
            return Self::new(store, settings);
        }

        let source = CachedMapSource::new(
            StoreMapSource::new(store.clone()),
            cache,
            settings.cache.prefix.as_str(),
        );

        Self {
            store,
            source: Arc::new(source),
            settings: Arc::new(settings),
        }
    }

    /// The settings this engine runs with
    pub fn settings(&self) -> &WardenSettings {
        &self.settings
    }

    /// The underlying grant store
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// A host gate hook backed by this engine
    pub fn gate<Policies: HostPolicies>(&self, policies: Policies) -> Gate<Store, Policies> {
        Gate::new(self.clone(), policies)
    }

    /// The permission map of `authority`, from cache where possible
    pub async fn permission_map(
        &self,
        authority: &EntityRef,
    ) -> Result<Arc<PermissionMap>, WardenError> {
        self.source.map_for(authority).await
    }

    /// Resolve whether `authority` may perform `ability` on `target`
    pub async fn decide(
        &self,
        authority: &EntityRef,
        ability: &str,
        target: Option<&Target>,
    ) -> Result<Decision, WardenError> {
        let candidates = compile(ability, target);
        Ok(self.permission_map(authority).await?.decide(&candidates))
    }

    /// Whether `authority` may perform `ability` on `target`
    pub async fn can(
        &self,
        authority: &EntityRef,
        ability: &str,
        target: Option<&Target>,
    ) -> Result<bool, WardenError> {
        Ok(self.decide(authority, ability, target).await?.is_allowed())
    }

    /// The negation of [Warden::can]
    pub async fn cannot(
        &self,
        authority: &EntityRef,
        ability: &str,
        target: Option<&Target>,
    ) -> Result<bool, WardenError> {
        Ok(!self.can(authority, ability, target).await?)
    }

    /// Whether `authority` holds any of `roles`
    pub async fn is_a(&self, authority: &EntityRef, roles: &[&str]) -> Result<bool, WardenError> {
        let map = self.permission_map(authority).await?;
        Ok(roles.iter().any(|role| map.has_role(role)))
    }

    /// Whether `authority` holds every one of `roles`
    pub async fn is_all(&self, authority: &EntityRef, roles: &[&str]) -> Result<bool, WardenError> {
        let map = self.permission_map(authority).await?;
        Ok(roles.iter().all(|role| map.has_role(role)))
    }

    /// Whether `authority` holds none of `roles`
    pub async fn is_not(&self, authority: &EntityRef, roles: &[&str]) -> Result<bool, WardenError> {
        Ok(!self.is_a(authority, roles).await?)
    }

    /// The role records assigned to `authority`, ordered by level then name
    pub async fn roles_of(&self, authority: &EntityRef) -> Result<Vec<Role>, WardenError> {
        if !authority.is_persisted() {
            return Err(WardenError::AuthorityNotFound(authority.clone()));
        }

        let (role_ids, _) = grantees_for(&self.store, authority).await?;
        let mut roles = if role_ids.is_empty() {
            Vec::new()
        } else {
            self.store.roles_by_id(&role_ids).await?
        };

        sort_roles(&mut roles);
        Ok(roles)
    }

    /// Abilities allowed to `authority`, directly or through its roles
    pub async fn abilities_of(&self, authority: &EntityRef) -> Result<Vec<Ability>, WardenError> {
        self.granted_to(authority, false).await
    }

    /// Abilities forbidden to `authority`, directly or through its roles
    pub async fn forbidden_abilities_of(
        &self,
        authority: &EntityRef,
    ) -> Result<Vec<Ability>, WardenError> {
        self.granted_to(authority, true).await
    }

    async fn granted_to(
        &self,
        authority: &EntityRef,
        forbidden: bool,
    ) -> Result<Vec<Ability>, WardenError> {
        if !authority.is_persisted() {
            return Err(WardenError::AuthorityNotFound(authority.clone()));
        }

        let (_, grantees) = grantees_for(&self.store, authority).await?;
        let abilities: BTreeMap<AbilityId, Ability> = self
            .store
            .granted_abilities(&grantees)
            .await?
            .into_iter()
            .filter(|granted| granted.grant.forbidden == forbidden)
            .map(|granted| (granted.ability.id, granted.ability))
            .collect();

        Ok(abilities.into_values().collect())
    }

    /// Roles of the configured guard, ordered by level then name
    pub async fn roles(&self, visibility: RoleVisibility) -> Result<Vec<Role>, WardenError> {
        let mut roles = self.store.roles_in_guard(&self.settings.guard).await?;
        if visibility == RoleVisibility::Public {
            roles.retain(|role| !role.private);
        }

        sort_roles(&mut roles);
        Ok(roles)
    }

    /// Run an [AssignRoles] command
    pub async fn assign_roles(&self, command: AssignRoles) -> Result<Changes, WardenError> {
        let outcome = command.apply(&self.store, &self.settings).await;
        self.settle(outcome).await
    }

    /// Assign one role to `authority`
    pub async fn assign(
        &self,
        authority: impl Into<EntityRef>,
        role: impl Into<RoleRef>,
    ) -> Result<Changes, WardenError> {
        self.assign_roles(AssignRoles::to(authority).role(role)).await
    }

    /// Run a [RetractRoles] command
    pub async fn retract_roles(&self, command: RetractRoles) -> Result<Changes, WardenError> {
        let outcome = command.apply(&self.store, &self.settings).await;
        self.settle(outcome).await
    }

    /// Retract one role from `authority`
    pub async fn retract(
        &self,
        authority: impl Into<EntityRef>,
        role: impl Into<RoleRef>,
    ) -> Result<Changes, WardenError> {
        self.retract_roles(RetractRoles::from(authority).role(role)).await
    }

    /// Run a [SyncRoles] command
    pub async fn sync_roles(&self, command: SyncRoles) -> Result<Changes, WardenError> {
        let outcome = command.apply(&self.store, &self.settings).await;
        self.settle(outcome).await
    }

    /// Create a role, or return the existing one with the same guard and
    /// name. A role nobody holds yet cannot make any map stale.
    pub async fn create_role(&self, role: NewRole) -> Result<Role, WardenError> {
        CreateRole(role).apply(&self.store, &self.settings).await
    }

    /// Delete a role with its assignments and grants
    pub async fn delete_role(&self, role: impl Into<RoleRef>) -> Result<Changes, WardenError> {
        let outcome = DeleteRole(role.into())
            .apply(&self.store, &self.settings)
            .await;
        self.settle(outcome).await
    }

    /// Run a [GiveAbility] command
    pub async fn give_ability(&self, command: GiveAbility) -> Result<Changes, WardenError> {
        let outcome = command.apply(&self.store, &self.settings).await;
        self.settle(outcome).await
    }

    /// Run a [RemoveAbility] command
    pub async fn remove_ability(&self, command: RemoveAbility) -> Result<Changes, WardenError> {
        let outcome = command.apply(&self.store, &self.settings).await;
        self.settle(outcome).await
    }

    /// Run a [SyncAbilities] command
    pub async fn sync_abilities(&self, command: SyncAbilities) -> Result<Changes, WardenError> {
        let outcome = command.apply(&self.store, &self.settings).await;
        self.settle(outcome).await
    }

    /// Allow `grantee` to perform `ability` on `target`
    pub async fn allow(
        &self,
        grantee: impl Into<GranteeRef>,
        ability: &str,
        target: Option<Target>,
    ) -> Result<Changes, WardenError> {
        let command = GiveAbility::to(grantee).ability(ability);
        self.give_ability(GiveAbility { target, ..command }).await
    }

    /// Remove an allowing grant; forbidding grants are left alone
    pub async fn disallow(
        &self,
        grantee: impl Into<GranteeRef>,
        ability: &str,
        target: Option<Target>,
    ) -> Result<Changes, WardenError> {
        let command = RemoveAbility::from(grantee).ability(ability);
        self.remove_ability(RemoveAbility { target, ..command }).await
    }

    /// Forbid `grantee` from performing `ability` on `target`, whatever it is
    /// otherwise allowed
    pub async fn forbid(
        &self,
        grantee: impl Into<GranteeRef>,
        ability: &str,
        target: Option<Target>,
    ) -> Result<Changes, WardenError> {
        let command = GiveAbility::to(grantee).ability(ability).forbidding();
        self.give_ability(GiveAbility { target, ..command }).await
    }

    /// Remove a forbidding grant; allowing grants are left alone
    pub async fn permit(
        &self,
        grantee: impl Into<GranteeRef>,
        ability: &str,
        target: Option<Target>,
    ) -> Result<Changes, WardenError> {
        let command = RemoveAbility::from(grantee).ability(ability).forbidding();
        self.remove_ability(RemoveAbility { target, ..command }).await
    }

    /// Forget every cached permission map
    pub async fn refresh(&self) -> Result<(), WardenError> {
        self.source.forget_all().await
    }

    /// Forget the cached permission map of `authority`
    pub async fn refresh_for(&self, authority: &EntityRef) -> Result<(), WardenError> {
        self.source.forget(authority).await
    }

    /// Forget whatever the command may have made stale, then report its
    /// result. A command that failed partway still has its committed rows
    /// invalidated; its own error takes precedence over a failed invalidation.
    async fn settle(&self, outcome: Outcome) -> Result<Changes, WardenError> {
        let Outcome {
            result,
            invalidation,
        } = outcome;
        debug!(?invalidation, succeeded = result.is_ok(), "Settling command");

        let forgotten = self.invalidate(invalidation).await;
        match (result, forgotten) {
            (Ok(changes), Ok(())) => Ok(changes),
            (Ok(_), Err(error)) => Err(error),
            (Err(error), Ok(())) => Err(error),
            (Err(error), Err(cache_error)) => {
                warn!(%error, %cache_error, "Failed to invalidate after a failed command");
                Err(error)
            }
        }
    }

    /// Attempts every authority even when one of them fails
    async fn invalidate(&self, invalidation: Invalidation) -> Result<(), WardenError> {
        match invalidation {
            Invalidation::Authorities(authorities) => {
                let mut first_error = None;
                for authority in &authorities {
                    if let Err(error) = self.source.forget(authority).await {
                        first_error.get_or_insert(error);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
            Invalidation::Everything => self.source.forget_all().await,
        }
    }
}
