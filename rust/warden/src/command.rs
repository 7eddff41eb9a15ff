//! Mutation commands.
//!
//! Every command validates its whole input before writing anything, skips
//! rows that already exist (or are already absent), and reports which cached
//! permission maps it may have made stale. That report is fixed before the
//! first write and travels with failures too, since a command that fails
//! partway may already have committed some rows. The [`crate::Warden`] facade
//! applies the invalidation before returning to the caller, whatever the
//! outcome.

use std::collections::BTreeSet;

use warden_model::{
    Ability, AbilityId, AbilityKey, EntityRef, Grantee, NewRole, Role, RoleId, Target,
};
use warden_storage::{GrantStore, WardenStorageError};

use crate::{WardenError, WardenSettings};

mod role;
pub use role::*;

mod ability;
pub use ability::*;

/// How many rows a command inserted and deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    /// Rows inserted
    pub added: usize,
    /// Rows deleted
    pub removed: usize,
}

impl Changes {
    /// Whether the command left the store untouched
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Which cached permission maps a command may have made stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Invalidation {
    Authorities(Vec<EntityRef>),
    Everything,
}

impl Invalidation {
    /// Nothing was written
    pub(crate) fn none() -> Self {
        Invalidation::Authorities(Vec::new())
    }

    /// Role-level changes reach an unknown set of authorities
    fn for_grantees(grantees: &[Grantee]) -> Self {
        if grantees.iter().any(Grantee::is_role) {
            return Invalidation::Everything;
        }

        Invalidation::Authorities(
            grantees
                .iter()
                .filter_map(|grantee| match grantee {
                    Grantee::Authority(authority) => Some(authority.clone()),
                    Grantee::Role { .. } => None,
                })
                .collect(),
        )
    }
}

/// What running a command produced, and which maps must be forgotten because
/// of it. The invalidation holds even when `result` is an error.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) result: Result<Changes, WardenError>,
    pub(crate) invalidation: Invalidation,
}

impl Outcome {
    pub(crate) fn new(result: Result<Changes, WardenError>, invalidation: Invalidation) -> Self {
        Self {
            result,
            invalidation,
        }
    }

    /// The command failed before writing anything
    pub(crate) fn rejected(error: WardenError) -> Self {
        Self::new(Err(error), Invalidation::none())
    }
}

/// A role, by name (within the configured guard), id or record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleRef {
    /// Looked up by name; created on demand by commands that grant
    Name(String),
    /// Must exist
    Id(RoleId),
    /// Must still exist
    Record(Role),
}

impl From<&str> for RoleRef {
    fn from(name: &str) -> Self {
        RoleRef::Name(name.to_owned())
    }
}

impl From<String> for RoleRef {
    fn from(name: String) -> Self {
        RoleRef::Name(name)
    }
}

impl From<RoleId> for RoleRef {
    fn from(id: RoleId) -> Self {
        RoleRef::Id(id)
    }
}

impl From<Role> for RoleRef {
    fn from(role: Role) -> Self {
        RoleRef::Record(role)
    }
}

impl From<&Role> for RoleRef {
    fn from(role: &Role) -> Self {
        RoleRef::Record(role.clone())
    }
}

/// An ability, by name (scoped by the command's target), id or record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbilityRef {
    /// Combined with the command's target into an ability key
    Name(String),
    /// Must exist; the command's target does not apply
    Id(AbilityId),
    /// Must still exist; the command's target does not apply
    Record(Ability),
}

impl From<&str> for AbilityRef {
    fn from(name: &str) -> Self {
        AbilityRef::Name(name.to_owned())
    }
}

impl From<String> for AbilityRef {
    fn from(name: String) -> Self {
        AbilityRef::Name(name)
    }
}

impl From<AbilityId> for AbilityRef {
    fn from(id: AbilityId) -> Self {
        AbilityRef::Id(id)
    }
}

impl From<Ability> for AbilityRef {
    fn from(ability: Ability) -> Self {
        AbilityRef::Record(ability)
    }
}

impl From<&Ability> for AbilityRef {
    fn from(ability: &Ability) -> Self {
        AbilityRef::Record(ability.clone())
    }
}

/// Who an ability is given to or taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GranteeRef {
    /// An authority; must be persisted
    Authority(EntityRef),
    /// A role
    Role(RoleRef),
}

impl From<EntityRef> for GranteeRef {
    fn from(authority: EntityRef) -> Self {
        GranteeRef::Authority(authority)
    }
}

impl From<&EntityRef> for GranteeRef {
    fn from(authority: &EntityRef) -> Self {
        GranteeRef::Authority(authority.clone())
    }
}

impl From<RoleRef> for GranteeRef {
    fn from(role: RoleRef) -> Self {
        GranteeRef::Role(role)
    }
}

impl From<Role> for GranteeRef {
    fn from(role: Role) -> Self {
        GranteeRef::Role(role.into())
    }
}

impl From<&Role> for GranteeRef {
    fn from(role: &Role) -> Self {
        GranteeRef::Role(role.into())
    }
}

/// A bare string names a role, as in `allow("admin")`
impl From<&str> for GranteeRef {
    fn from(name: &str) -> Self {
        GranteeRef::Role(name.into())
    }
}

pub(crate) fn require_persisted(authority: &EntityRef) -> Result<(), WardenError> {
    if authority.is_persisted() {
        Ok(())
    } else {
        Err(WardenError::InvalidAuthority(format!(
            "{authority} has not been persisted"
        )))
    }
}

/// Reject ability references that could never be stored, before anything is
/// written.
pub(crate) fn validate_abilities(
    abilities: &[AbilityRef],
    target: Option<&Target>,
) -> Result<(), WardenError> {
    if let Some(target) = target {
        if target.type_tag().is_empty() {
            return Err(WardenError::InvalidPermission(
                "abilities cannot target an empty type".into(),
            ));
        }
    }

    for ability in abilities {
        if let AbilityRef::Name(name) = ability {
            if name.trim().is_empty() {
                return Err(WardenError::InvalidPermission(
                    "ability names cannot be empty".into(),
                ));
            }
        }
    }

    Ok(())
}

/// Resolve role references. Unknown names are created when `create` is set
/// and skipped otherwise; unknown ids are an error either way.
pub(crate) async fn resolve_roles<S: GrantStore>(
    store: &S,
    settings: &WardenSettings,
    roles: &[RoleRef],
    create: bool,
) -> Result<Vec<Role>, WardenError> {
    let mut names = Vec::new();
    let mut ids = Vec::new();

    for role in roles {
        match role {
            RoleRef::Name(name) => names.push(name.clone()),
            RoleRef::Id(id) => ids.push(*id),
            RoleRef::Record(role) => ids.push(role.id),
        }
    }

    let mut resolved = Vec::with_capacity(roles.len());

    if !ids.is_empty() {
        let found = store.roles_by_id(&ids).await?;
        if let Some(missing) = ids
            .iter()
            .find(|id| !found.iter().any(|role| role.id == **id))
        {
            return Err(WardenError::RoleNotFound(format!("role #{missing}")));
        }
        resolved.extend(found);
    }

    if !names.is_empty() {
        let found = store.roles_by_name(&settings.guard, &names).await?;
        for name in &names {
            match found.iter().find(|role| &role.name == name) {
                Some(role) => resolved.push(role.clone()),
                None if create => {
                    resolved.push(ensure_role(store, settings, NewRole::named(name.clone())).await?)
                }
                None => {}
            }
        }
    }

    let mut seen = BTreeSet::new();
    resolved.retain(|role| seen.insert(role.id));
    Ok(resolved)
}

/// Find the role with this guard and name, or create it.
pub(crate) async fn ensure_role<S: GrantStore>(
    store: &S,
    settings: &WardenSettings,
    role: NewRole,
) -> Result<Role, WardenError> {
    let guard = role.guard.clone().unwrap_or_else(|| settings.guard.clone());
    let names = [role.name.clone()];

    if let Some(existing) = store.roles_by_name(&guard, &names).await?.pop() {
        return Ok(existing);
    }

    match store.insert_role(role.guard(guard.clone())).await {
        Ok(role) => Ok(role),
        // Someone else created it between the lookup and the insert
        Err(WardenStorageError::Conflict(_)) => store
            .roles_by_name(&guard, &names)
            .await?
            .pop()
            .ok_or_else(|| WardenError::RoleNotFound(names[0].clone())),
        Err(error) => Err(error.into()),
    }
}

/// Resolve ability references against `target`. With `ensure`, unknown
/// names are created; without it they are skipped. Unknown ids are always
/// an error.
pub(crate) async fn resolve_abilities<S: GrantStore>(
    store: &S,
    abilities: &[AbilityRef],
    target: Option<&Target>,
    ensure: bool,
) -> Result<Vec<Ability>, WardenError> {
    validate_abilities(abilities, target)?;

    let mut ids = Vec::new();
    let mut resolved = Vec::with_capacity(abilities.len());

    for ability in abilities {
        match ability {
            AbilityRef::Id(id) => ids.push(*id),
            AbilityRef::Record(ability) => ids.push(ability.id),
            AbilityRef::Name(name) => {
                let key = AbilityKey::new(name.clone(), target);
                if ensure {
                    resolved.push(ensure_ability(store, key).await?);
                } else if let Some(ability) = store.find_ability(&key).await? {
                    resolved.push(ability);
                }
            }
        }
    }

    if !ids.is_empty() {
        let found = store.abilities_by_id(&ids).await?;
        if let Some(missing) = ids
            .iter()
            .find(|id| !found.iter().any(|ability| ability.id == **id))
        {
            return Err(WardenError::InvalidPermission(format!(
                "ability #{missing} does not exist"
            )));
        }
        resolved.extend(found);
    }

    let mut seen = BTreeSet::new();
    resolved.retain(|ability| seen.insert(ability.id));
    Ok(resolved)
}

/// Find the ability with this key, or create it.
pub(crate) async fn ensure_ability<S: GrantStore>(
    store: &S,
    key: AbilityKey,
) -> Result<Ability, WardenError> {
    if let Some(ability) = store.find_ability(&key).await? {
        return Ok(ability);
    }

    match store.insert_ability(key.clone().into()).await {
        Ok(ability) => Ok(ability),
        Err(WardenStorageError::Conflict(_)) => {
            store.find_ability(&key).await?.ok_or_else(|| {
                WardenError::InvalidPermission(format!(
                    "ability '{}' could not be created",
                    key.identifier()
                ))
            })
        }
        Err(error) => Err(error.into()),
    }
}

/// Turn grantee references into stored grantees. Role names are created
/// when `create` is set and dropped otherwise.
pub(crate) async fn resolve_grantees<S: GrantStore>(
    store: &S,
    settings: &WardenSettings,
    grantees: &[GranteeRef],
    create: bool,
) -> Result<Vec<Grantee>, WardenError> {
    let mut roles = Vec::new();
    let mut resolved = Vec::with_capacity(grantees.len());

    for grantee in grantees {
        match grantee {
            GranteeRef::Authority(authority) => {
                require_persisted(authority)?;
                resolved.push(Grantee::Authority(authority.clone()));
            }
            GranteeRef::Role(role) => roles.push(role.clone()),
        }
    }

    if !roles.is_empty() {
        resolved.extend(
            resolve_roles(store, settings, &roles, create)
                .await?
                .into_iter()
                .map(|role| Grantee::role(role.id)),
        );
    }

    let mut seen = BTreeSet::new();
    resolved.retain(|grantee| seen.insert(grantee.clone()));
    Ok(resolved)
}
