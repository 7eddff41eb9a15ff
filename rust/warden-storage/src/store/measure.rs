use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use warden_model::{
    Ability, AbilityId, AbilityKey, Assignment, EntityRef, Grant, GrantFilter, Grantee,
    NewAbility, NewGrant, NewRole, Role, RoleId,
};

use crate::{GrantStore, GrantedAbility, WardenStorageError};

/// A [MeasuredGrantStore] acts as a proxy over a [GrantStore]
/// implementation that counts the queries and writes issued against it.
#[derive(Clone)]
pub struct MeasuredGrantStore<Store>
where
    Store: GrantStore,
{
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    store: Store,
}

impl<Store> MeasuredGrantStore<Store>
where
    Store: GrantStore,
{
    /// Wrap the provided [GrantStore] so that reads and writes to it may be
    /// measured.
    pub fn new(store: Store) -> Self {
        Self {
            reads: Arc::new(AtomicUsize::default()),
            writes: Arc::new(AtomicUsize::default()),
            store,
        }
    }

    /// The aggregate number of queries issued against the wrapped store
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// The aggregate number of inserts and deletes issued against the wrapped
    /// store
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// The wrapped store
    pub fn inner(&self) -> &Store {
        &self.store
    }

    fn read(&self) -> &Store {
        self.reads.fetch_add(1, Ordering::Relaxed);
        &self.store
    }

    fn write(&self) -> &Store {
        self.writes.fetch_add(1, Ordering::Relaxed);
        &self.store
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Store> GrantStore for MeasuredGrantStore<Store>
where
    Store: GrantStore,
{
    async fn roles_by_name(
        &self,
        guard: &str,
        names: &[String],
    ) -> Result<Vec<Role>, WardenStorageError> {
        self.read().roles_by_name(guard, names).await
    }

    async fn roles_by_id(&self, ids: &[RoleId]) -> Result<Vec<Role>, WardenStorageError> {
        self.read().roles_by_id(ids).await
    }

    async fn roles_in_guard(&self, guard: &str) -> Result<Vec<Role>, WardenStorageError> {
        self.read().roles_in_guard(guard).await
    }

    async fn insert_role(&self, role: NewRole) -> Result<Role, WardenStorageError> {
        self.write().insert_role(role).await
    }

    async fn delete_role(&self, id: RoleId) -> Result<bool, WardenStorageError> {
        self.write().delete_role(id).await
    }

    async fn find_ability(&self, key: &AbilityKey) -> Result<Option<Ability>, WardenStorageError> {
        self.read().find_ability(key).await
    }

    async fn abilities_by_id(
        &self,
        ids: &[AbilityId],
    ) -> Result<Vec<Ability>, WardenStorageError> {
        self.read().abilities_by_id(ids).await
    }

    async fn insert_ability(&self, ability: NewAbility) -> Result<Ability, WardenStorageError> {
        self.write().insert_ability(ability).await
    }

    async fn assignments_for(
        &self,
        authority: &EntityRef,
    ) -> Result<Vec<Assignment>, WardenStorageError> {
        self.read().assignments_for(authority).await
    }

    async fn insert_assignments(
        &self,
        authority: &EntityRef,
        role_ids: &[RoleId],
    ) -> Result<(), WardenStorageError> {
        self.write().insert_assignments(authority, role_ids).await
    }

    async fn delete_assignments(
        &self,
        authority: &EntityRef,
        role_ids: &[RoleId],
    ) -> Result<usize, WardenStorageError> {
        self.write().delete_assignments(authority, role_ids).await
    }

    async fn grants_for(&self, grantee: &Grantee) -> Result<Vec<Grant>, WardenStorageError> {
        self.read().grants_for(grantee).await
    }

    async fn granted_abilities(
        &self,
        grantees: &[Grantee],
    ) -> Result<Vec<GrantedAbility>, WardenStorageError> {
        self.read().granted_abilities(grantees).await
    }

    async fn insert_grants(&self, grants: Vec<NewGrant>) -> Result<Vec<Grant>, WardenStorageError> {
        self.write().insert_grants(grants).await
    }

    async fn delete_grants(&self, filter: &GrantFilter) -> Result<usize, WardenStorageError> {
        self.write().delete_grants(filter).await
    }
}
