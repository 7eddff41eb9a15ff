use std::collections::BTreeSet;

use tracing::{debug, info};
use warden_model::{EntityRef, NewRole, Role, RoleId};
use warden_storage::GrantStore;

use super::{
    Changes, Invalidation, Outcome, RoleRef, ensure_role, require_persisted, resolve_roles,
};
use crate::{WardenError, WardenSettings};

/// Assign roles to an authority. Roles named but not yet stored are created
/// in the configured guard; roles already held are left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignRoles {
    /// The authority receiving the roles
    pub authority: EntityRef,
    /// The roles to assign
    pub roles: Vec<RoleRef>,
}

impl AssignRoles {
    /// Assign roles to `authority`
    pub fn to(authority: impl Into<EntityRef>) -> Self {
        Self {
            authority: authority.into(),
            roles: Vec::new(),
        }
    }

    /// Add one role
    pub fn role(mut self, role: impl Into<RoleRef>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add several roles
    pub fn roles<R>(mut self, roles: impl IntoIterator<Item = R>) -> Self
    where
        R: Into<RoleRef>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub(crate) async fn apply<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Outcome {
        if let Err(error) = require_persisted(&self.authority) {
            return Outcome::rejected(error);
        }

        let invalidation = Invalidation::Authorities(vec![self.authority.clone()]);
        Outcome::new(self.assign(store, settings).await, invalidation)
    }

    async fn assign<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Result<Changes, WardenError> {
        let roles = resolve_roles(store, settings, &self.roles, true).await?;
        let held = held_role_ids(store, &self.authority).await?;
        let missing: Vec<RoleId> = roles
            .iter()
            .map(|role| role.id)
            .filter(|id| !held.contains(id))
            .collect();

        if !missing.is_empty() {
            store.insert_assignments(&self.authority, &missing).await?;
        }

        debug!(authority = %self.authority, assigned = missing.len(), "Assigned roles");

        Ok(Changes {
            added: missing.len(),
            removed: 0,
        })
    }
}

/// Retract roles from an authority. Roles the authority does not hold, or
/// that do not exist by name, are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetractRoles {
    /// The authority losing the roles
    pub authority: EntityRef,
    /// The roles to retract
    pub roles: Vec<RoleRef>,
}

impl RetractRoles {
    /// Retract roles from `authority`
    pub fn from(authority: impl Into<EntityRef>) -> Self {
        Self {
            authority: authority.into(),
            roles: Vec::new(),
        }
    }

    /// Add one role
    pub fn role(mut self, role: impl Into<RoleRef>) -> Self {
        self.roles.push(role.into());
        self
    }

    /// Add several roles
    pub fn roles<R>(mut self, roles: impl IntoIterator<Item = R>) -> Self
    where
        R: Into<RoleRef>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    pub(crate) async fn apply<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Outcome {
        if let Err(error) = require_persisted(&self.authority) {
            return Outcome::rejected(error);
        }

        let invalidation = Invalidation::Authorities(vec![self.authority.clone()]);
        Outcome::new(self.retract(store, settings).await, invalidation)
    }

    async fn retract<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Result<Changes, WardenError> {
        let roles = resolve_roles(store, settings, &self.roles, false).await?;
        let held = held_role_ids(store, &self.authority).await?;
        let present: Vec<RoleId> = roles
            .iter()
            .map(|role| role.id)
            .filter(|id| held.contains(id))
            .collect();

        let removed = if present.is_empty() {
            0
        } else {
            store.delete_assignments(&self.authority, &present).await?
        };

        debug!(authority = %self.authority, retracted = removed, "Retracted roles");

        Ok(Changes { added: 0, removed })
    }
}

/// Make an authority's roles exactly the given set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRoles {
    /// The authority whose roles are replaced
    pub authority: EntityRef,
    /// The complete set of roles the authority should hold
    pub roles: Vec<RoleRef>,
}

impl SyncRoles {
    /// Replace the roles of `authority` with `roles`
    pub fn new<R>(authority: impl Into<EntityRef>, roles: impl IntoIterator<Item = R>) -> Self
    where
        R: Into<RoleRef>,
    {
        Self {
            authority: authority.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub(crate) async fn apply<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Outcome {
        if let Err(error) = require_persisted(&self.authority) {
            return Outcome::rejected(error);
        }

        let invalidation = Invalidation::Authorities(vec![self.authority.clone()]);
        Outcome::new(self.sync(store, settings).await, invalidation)
    }

    async fn sync<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Result<Changes, WardenError> {
        let wanted: BTreeSet<RoleId> = resolve_roles(store, settings, &self.roles, true)
            .await?
            .into_iter()
            .map(|role| role.id)
            .collect();
        let held = held_role_ids(store, &self.authority).await?;

        let missing: Vec<RoleId> = wanted.difference(&held).copied().collect();
        let extra: Vec<RoleId> = held.difference(&wanted).copied().collect();

        if !missing.is_empty() {
            store.insert_assignments(&self.authority, &missing).await?;
        }
        let removed = if extra.is_empty() {
            0
        } else {
            store.delete_assignments(&self.authority, &extra).await?
        };

        debug!(
            authority = %self.authority,
            assigned = missing.len(),
            retracted = removed,
            "Synced roles"
        );

        Ok(Changes {
            added: missing.len(),
            removed,
        })
    }
}

/// Create a role unless one with the same guard and name exists, in which
/// case the existing record is returned untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRole(pub NewRole);

impl CreateRole {
    pub(crate) async fn apply<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Result<Role, WardenError> {
        ensure_role(store, settings, self.0).await
    }
}

/// Delete a role together with its assignments and grants. System roles are
/// refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteRole(pub RoleRef);

impl DeleteRole {
    pub(crate) async fn apply<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Outcome {
        let role = match self.resolve(store, settings).await {
            Ok(role) => role,
            Err(error) => return Outcome::rejected(error),
        };

        let deleted = store
            .delete_role(role.id)
            .await
            .map(|existed| Changes {
                added: 0,
                removed: usize::from(existed),
            })
            .map_err(WardenError::from);
        if deleted.is_ok() {
            info!(role = %role.name, guard = %role.guard, "Deleted role");
        }

        // Every holder of the role is affected, and they are not known here
        Outcome::new(deleted, Invalidation::Everything)
    }

    async fn resolve<S: GrantStore>(
        self,
        store: &S,
        settings: &WardenSettings,
    ) -> Result<Role, WardenError> {
        let label = match &self.0 {
            RoleRef::Name(name) => name.clone(),
            RoleRef::Id(id) => format!("role #{id}"),
            RoleRef::Record(role) => role.name.clone(),
        };

        let Some(role) = resolve_roles(store, settings, &[self.0], false)
            .await?
            .pop()
        else {
            return Err(WardenError::RoleNotFound(label));
        };

        if role.system {
            return Err(WardenError::ProtectedRole(role.name));
        }

        Ok(role)
    }
}

async fn held_role_ids<S: GrantStore>(
    store: &S,
    authority: &EntityRef,
) -> Result<BTreeSet<RoleId>, WardenError> {
    Ok(store
        .assignments_for(authority)
        .await?
        .into_iter()
        .map(|assignment| assignment.role_id)
        .collect())
}
