use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use warden_model::{
    Ability, AbilityId, AbilityKey, Assignment, EntityRef, Grant, GrantFilter, Grantee,
    NewAbility, NewGrant, NewRole, Role, RoleId,
};

use crate::{ConditionalSync, WardenStorageError};

mod memory;
pub use memory::*;

mod measure;
pub use measure::*;

/// A grant joined to the ability it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantedAbility {
    /// The grant row
    pub grant: Grant,
    /// The ability row the grant references
    pub ability: Ability,
}

/// A [GrantStore] is a facade over the relational substrate holding roles,
/// abilities, role assignments and grants.
///
/// Only equality/`in` predicates, inserts and deletes are required of an
/// implementation. Implementations are shared handles (cheap to clone, all
/// methods take `&self`) and must enforce the unique keys of each relation:
///
/// - roles: `(guard, name)`
/// - abilities: `(name, target_type, target_id)`
/// - assignments: `(role_id, authority)`
/// - grants: `(ability_id, grantee, forbidden, group, parent)`
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait GrantStore: Clone + ConditionalSync {
    /// Roles in `guard` whose name is one of `names`
    async fn roles_by_name(
        &self,
        guard: &str,
        names: &[String],
    ) -> Result<Vec<Role>, WardenStorageError>;

    /// Roles whose id is one of `ids`
    async fn roles_by_id(&self, ids: &[RoleId]) -> Result<Vec<Role>, WardenStorageError>;

    /// Every role in `guard`
    async fn roles_in_guard(&self, guard: &str) -> Result<Vec<Role>, WardenStorageError>;

    /// Insert a role. The role's guard must already be decided.
    async fn insert_role(&self, role: NewRole) -> Result<Role, WardenStorageError>;

    /// Delete a role along with its assignments and grants. Returns whether
    /// the role existed.
    async fn delete_role(&self, id: RoleId) -> Result<bool, WardenStorageError>;

    /// The ability with exactly this key, if any
    async fn find_ability(&self, key: &AbilityKey) -> Result<Option<Ability>, WardenStorageError>;

    /// Abilities whose id is one of `ids`
    async fn abilities_by_id(&self, ids: &[AbilityId])
    -> Result<Vec<Ability>, WardenStorageError>;

    /// Insert an ability
    async fn insert_ability(&self, ability: NewAbility) -> Result<Ability, WardenStorageError>;

    /// Role assignments held by `authority`
    async fn assignments_for(
        &self,
        authority: &EntityRef,
    ) -> Result<Vec<Assignment>, WardenStorageError>;

    /// Assign each of `role_ids` to `authority`, atomically
    async fn insert_assignments(
        &self,
        authority: &EntityRef,
        role_ids: &[RoleId],
    ) -> Result<(), WardenStorageError>;

    /// Remove the assignments of `role_ids` from `authority`, returning how
    /// many were removed
    async fn delete_assignments(
        &self,
        authority: &EntityRef,
        role_ids: &[RoleId],
    ) -> Result<usize, WardenStorageError>;

    /// Every grant held by `grantee`, in any scope
    async fn grants_for(&self, grantee: &Grantee) -> Result<Vec<Grant>, WardenStorageError>;

    /// Every grant held by any of `grantees`, joined to its ability
    async fn granted_abilities(
        &self,
        grantees: &[Grantee],
    ) -> Result<Vec<GrantedAbility>, WardenStorageError>;

    /// Insert a batch of grants atomically: if any of them conflicts, none
    /// is inserted
    async fn insert_grants(&self, grants: Vec<NewGrant>) -> Result<Vec<Grant>, WardenStorageError>;

    /// Delete the grants selected by `filter`, returning how many were removed
    async fn delete_grants(&self, filter: &GrantFilter) -> Result<usize, WardenStorageError>;
}
