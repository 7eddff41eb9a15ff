use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;
use warden_model::{EntityRef, Grantee, RoleId};
use warden_storage::{ConditionalSync, GrantStore};

use crate::{PermissionMap, WardenError};

mod cached;
pub use cached::*;

/// A [MapSource] produces the [PermissionMap] of an authority and is told
/// when previously produced maps may have gone stale.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait MapSource: ConditionalSync {
    /// The current permission map of `authority`
    async fn map_for(&self, authority: &EntityRef) -> Result<Arc<PermissionMap>, WardenError>;

    /// Forget anything remembered about `authority`
    async fn forget(&self, authority: &EntityRef) -> Result<(), WardenError>;

    /// Forget anything remembered about every authority
    async fn forget_all(&self) -> Result<(), WardenError>;
}

/// A [MapSource] that computes every map straight from a [GrantStore]. It
/// remembers nothing, so forgetting is a no-op.
#[derive(Clone)]
pub struct StoreMapSource<Store>
where
    Store: GrantStore,
{
    store: Store,
}

impl<Store> StoreMapSource<Store>
where
    Store: GrantStore,
{
    /// Compute maps from `store`
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Build the map of `authority` from its direct grants and the grants of
    /// every role assigned to it
    pub async fn compute(&self, authority: &EntityRef) -> Result<PermissionMap, WardenError> {
        if !authority.is_persisted() {
            return Err(WardenError::AuthorityNotFound(authority.clone()));
        }

        let (role_ids, grantees) = grantees_for(&self.store, authority).await?;
        let roles = if role_ids.is_empty() {
            Vec::new()
        } else {
            self.store.roles_by_id(&role_ids).await?
        };

        let granted = self.store.granted_abilities(&grantees).await?;

        let (forbidden, allowed): (Vec<_>, Vec<_>) = granted
            .into_iter()
            .partition(|granted| granted.grant.forbidden);

        let map = PermissionMap::new(
            roles.into_iter().map(|role| role.name),
            allowed.iter().map(|granted| granted.ability.identifier()),
            forbidden.iter().map(|granted| granted.ability.identifier()),
        );

        debug!(
            %authority,
            roles = map.roles().len(),
            allowed = map.allowed().len(),
            forbidden = map.forbidden().len(),
            "Computed permission map"
        );

        Ok(map)
    }
}

/// The ids of the roles assigned to `authority`, and every grantee whose
/// grants reach it: the authority itself followed by those roles.
pub(crate) async fn grantees_for<Store: GrantStore>(
    store: &Store,
    authority: &EntityRef,
) -> Result<(Vec<RoleId>, Vec<Grantee>), WardenError> {
    let role_ids: Vec<RoleId> = store
        .assignments_for(authority)
        .await?
        .into_iter()
        .map(|assignment| assignment.role_id)
        .collect();

    let mut grantees = Vec::with_capacity(role_ids.len() + 1);
    grantees.push(Grantee::Authority(authority.clone()));
    grantees.extend(role_ids.iter().copied().map(Grantee::role));

    Ok((role_ids, grantees))
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Store> MapSource for StoreMapSource<Store>
where
    Store: GrantStore,
{
    async fn map_for(&self, authority: &EntityRef) -> Result<Arc<PermissionMap>, WardenError> {
        Ok(Arc::new(self.compute(authority).await?))
    }

    async fn forget(&self, _authority: &EntityRef) -> Result<(), WardenError> {
        Ok(())
    }

    async fn forget_all(&self) -> Result<(), WardenError> {
        Ok(())
    }
}
