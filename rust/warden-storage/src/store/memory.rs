use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use warden_model::{
    Ability, AbilityId, AbilityKey, Assignment, EntityRef, Grant, GrantFilter, GrantId, Grantee,
    NewAbility, NewGrant, NewRole, Role, RoleId,
};

use crate::{GrantStore, GrantedAbility, WardenStorageError};

#[derive(Default)]
struct Relations {
    roles: BTreeMap<RoleId, Role>,
    abilities: BTreeMap<AbilityId, Ability>,
    assignments: BTreeSet<(RoleId, EntityRef)>,
    grants: BTreeMap<GrantId, Grant>,
    sequence: u64,
}

impl Relations {
    fn next_id(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }
}

/// A trivial implementation of [GrantStore] where all four relations are
/// kept in memory and never persisted. Unique keys are enforced the same way
/// a relational schema would enforce them.
#[derive(Clone, Default)]
pub struct MemoryGrantStore {
    relations: Arc<RwLock<Relations>>,
}

impl MemoryGrantStore {
    /// Total number of grant rows, across every grantee
    pub async fn grant_count(&self) -> usize {
        self.relations.read().await.grants.len()
    }

    /// Total number of ability rows
    pub async fn ability_count(&self) -> usize {
        self.relations.read().await.abilities.len()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl GrantStore for MemoryGrantStore {
    async fn roles_by_name(
        &self,
        guard: &str,
        names: &[String],
    ) -> Result<Vec<Role>, WardenStorageError> {
        let relations = self.relations.read().await;
        Ok(relations
            .roles
            .values()
            .filter(|role| role.guard == guard && names.contains(&role.name))
            .cloned()
            .collect())
    }

    async fn roles_by_id(&self, ids: &[RoleId]) -> Result<Vec<Role>, WardenStorageError> {
        let relations = self.relations.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| relations.roles.get(id))
            .cloned()
            .collect())
    }

    async fn roles_in_guard(&self, guard: &str) -> Result<Vec<Role>, WardenStorageError> {
        let relations = self.relations.read().await;
        Ok(relations
            .roles
            .values()
            .filter(|role| role.guard == guard)
            .cloned()
            .collect())
    }

    async fn insert_role(&self, role: NewRole) -> Result<Role, WardenStorageError> {
        let Some(guard) = role.guard.clone() else {
            return Err(WardenStorageError::Invalid(format!(
                "role '{}' has no guard",
                role.name
            )));
        };

        let mut relations = self.relations.write().await;
        if relations
            .roles
            .values()
            .any(|existing| existing.guard == guard && existing.name == role.name)
        {
            return Err(WardenStorageError::Conflict(format!(
                "role '{}' already exists in guard '{guard}'",
                role.name
            )));
        }

        let id = RoleId(relations.next_id());
        let role = role.into_role(id, guard);
        relations.roles.insert(id, role.clone());
        Ok(role)
    }

    async fn delete_role(&self, id: RoleId) -> Result<bool, WardenStorageError> {
        let mut relations = self.relations.write().await;
        if relations.roles.remove(&id).is_none() {
            return Ok(false);
        }

        relations.assignments.retain(|(role_id, _)| *role_id != id);
        let grantee = Grantee::role(id);
        relations.grants.retain(|_, grant| grant.grantee != grantee);
        Ok(true)
    }

    async fn find_ability(&self, key: &AbilityKey) -> Result<Option<Ability>, WardenStorageError> {
        let relations = self.relations.read().await;
        Ok(relations
            .abilities
            .values()
            .find(|ability| &ability.key == key)
            .cloned())
    }

    async fn abilities_by_id(
        &self,
        ids: &[AbilityId],
    ) -> Result<Vec<Ability>, WardenStorageError> {
        let relations = self.relations.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| relations.abilities.get(id))
            .cloned()
            .collect())
    }

    async fn insert_ability(&self, ability: NewAbility) -> Result<Ability, WardenStorageError> {
        let mut relations = self.relations.write().await;
        if relations
            .abilities
            .values()
            .any(|existing| existing.key == ability.key)
        {
            return Err(WardenStorageError::Conflict(format!(
                "ability '{}' already exists",
                ability.key.identifier()
            )));
        }

        let id = AbilityId(relations.next_id());
        let ability = ability.into_ability(id);
        relations.abilities.insert(id, ability.clone());
        Ok(ability)
    }

    async fn assignments_for(
        &self,
        authority: &EntityRef,
    ) -> Result<Vec<Assignment>, WardenStorageError> {
        let relations = self.relations.read().await;
        Ok(relations
            .assignments
            .iter()
            .filter(|(_, holder)| holder == authority)
            .map(|(role_id, holder)| Assignment {
                role_id: *role_id,
                authority: holder.clone(),
            })
            .collect())
    }

    async fn insert_assignments(
        &self,
        authority: &EntityRef,
        role_ids: &[RoleId],
    ) -> Result<(), WardenStorageError> {
        let mut relations = self.relations.write().await;

        for role_id in role_ids {
            if !relations.roles.contains_key(role_id) {
                return Err(WardenStorageError::NotFound(format!("role #{role_id}")));
            }
            if relations
                .assignments
                .contains(&(*role_id, authority.clone()))
            {
                return Err(WardenStorageError::Conflict(format!(
                    "role #{role_id} is already assigned to {authority}"
                )));
            }
        }

        for role_id in role_ids {
            relations.assignments.insert((*role_id, authority.clone()));
        }
        Ok(())
    }

    async fn delete_assignments(
        &self,
        authority: &EntityRef,
        role_ids: &[RoleId],
    ) -> Result<usize, WardenStorageError> {
        let mut relations = self.relations.write().await;
        let before = relations.assignments.len();
        relations
            .assignments
            .retain(|(role_id, holder)| holder != authority || !role_ids.contains(role_id));
        Ok(before - relations.assignments.len())
    }

    async fn grants_for(&self, grantee: &Grantee) -> Result<Vec<Grant>, WardenStorageError> {
        let relations = self.relations.read().await;
        Ok(relations
            .grants
            .values()
            .filter(|grant| &grant.grantee == grantee)
            .cloned()
            .collect())
    }

    async fn granted_abilities(
        &self,
        grantees: &[Grantee],
    ) -> Result<Vec<GrantedAbility>, WardenStorageError> {
        let relations = self.relations.read().await;
        let mut granted = Vec::new();

        for grant in relations
            .grants
            .values()
            .filter(|grant| grantees.contains(&grant.grantee))
        {
            let Some(ability) = relations.abilities.get(&grant.ability_id) else {
                return Err(WardenStorageError::StorageBackend(format!(
                    "grant references missing ability #{}",
                    grant.ability_id
                )));
            };
            granted.push(GrantedAbility {
                grant: grant.clone(),
                ability: ability.clone(),
            });
        }

        Ok(granted)
    }

    async fn insert_grants(&self, grants: Vec<NewGrant>) -> Result<Vec<Grant>, WardenStorageError> {
        let mut relations = self.relations.write().await;

        for (index, grant) in grants.iter().enumerate() {
            if !relations.abilities.contains_key(&grant.ability_id) {
                return Err(WardenStorageError::NotFound(format!(
                    "ability #{}",
                    grant.ability_id
                )));
            }
            if let Grantee::Role { id } = &grant.grantee {
                if !relations.roles.contains_key(id) {
                    return Err(WardenStorageError::NotFound(format!("role #{id}")));
                }
            }
            let duplicate_in_batch = grants[..index].contains(grant);
            if duplicate_in_batch
                || relations
                    .grants
                    .values()
                    .any(|existing| existing.same_slot(grant))
            {
                return Err(WardenStorageError::Conflict(format!(
                    "ability #{} is already granted to {}",
                    grant.ability_id, grant.grantee
                )));
            }
        }

        let mut inserted = Vec::with_capacity(grants.len());
        for grant in grants {
            let id = GrantId(relations.next_id());
            let grant = grant.into_grant(id);
            relations.grants.insert(id, grant.clone());
            inserted.push(grant);
        }

        Ok(inserted)
    }

    async fn delete_grants(&self, filter: &GrantFilter) -> Result<usize, WardenStorageError> {
        let mut relations = self.relations.write().await;
        let before = relations.grants.len();
        relations.grants.retain(|_, grant| !filter.matches(grant));
        Ok(before - relations.grants.len())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use pretty_assertions::assert_eq;
    use warden_model::{GrantScope, Target};

    use super::*;

    async fn seed(store: &MemoryGrantStore) -> Result<(Role, Ability)> {
        let role = store.insert_role(NewRole::named("admin").guard("web")).await?;
        let ability = store
            .insert_ability(AbilityKey::new("edit", Some(&Target::of_type("post"))).into())
            .await?;
        Ok((role, ability))
    }

    fn allow(ability: &Ability, grantee: Grantee) -> NewGrant {
        NewGrant {
            ability_id: ability.id,
            grantee,
            forbidden: false,
            scope: GrantScope::unscoped(),
        }
    }

    #[tokio::test]
    async fn it_enforces_unique_role_names_per_guard() -> Result<()> {
        let store = MemoryGrantStore::default();
        store.insert_role(NewRole::named("admin").guard("web")).await?;
        store.insert_role(NewRole::named("admin").guard("api")).await?;

        let conflict = store.insert_role(NewRole::named("admin").guard("web")).await;
        assert!(matches!(conflict, Err(WardenStorageError::Conflict(_))));

        let unguarded = store.insert_role(NewRole::named("editor")).await;
        assert!(matches!(unguarded, Err(WardenStorageError::Invalid(_))));

        Ok(())
    }

    #[tokio::test]
    async fn it_enforces_unique_ability_keys() -> Result<()> {
        let store = MemoryGrantStore::default();
        let (_, ability) = seed(&store).await?;

        let conflict = store.insert_ability(ability.key.clone().into()).await;
        assert!(matches!(conflict, Err(WardenStorageError::Conflict(_))));
        assert_eq!(store.find_ability(&ability.key).await?, Some(ability));

        Ok(())
    }

    #[tokio::test]
    async fn it_inserts_grant_batches_atomically() -> Result<()> {
        let store = MemoryGrantStore::default();
        let (role, ability) = seed(&store).await?;
        let user = Grantee::Authority(EntityRef::new("user", 1u64));

        store.insert_grants(vec![allow(&ability, user.clone())]).await?;

        let batch = vec![
            allow(&ability, Grantee::role(role.id)),
            allow(&ability, user.clone()),
        ];
        let conflict = store.insert_grants(batch).await;

        assert!(matches!(conflict, Err(WardenStorageError::Conflict(_))));
        assert_eq!(store.grant_count().await, 1);
        assert!(store.grants_for(&Grantee::role(role.id)).await?.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn it_joins_grants_to_their_abilities() -> Result<()> {
        let store = MemoryGrantStore::default();
        let (role, ability) = seed(&store).await?;
        let user = EntityRef::new("user", 1u64);

        store
            .insert_grants(vec![allow(&ability, Grantee::role(role.id))])
            .await?;

        let granted = store
            .granted_abilities(&[Grantee::Authority(user), Grantee::role(role.id)])
            .await?;

        assert_eq!(granted.len(), 1);
        assert_eq!(granted[0].ability.identifier(), "edit-post");
        Ok(())
    }

    #[tokio::test]
    async fn it_cascades_role_deletion() -> Result<()> {
        let store = MemoryGrantStore::default();
        let (role, ability) = seed(&store).await?;
        let user = EntityRef::new("user", 1u64);

        store.insert_assignments(&user, &[role.id]).await?;
        store
            .insert_grants(vec![allow(&ability, Grantee::role(role.id))])
            .await?;

        assert!(store.delete_role(role.id).await?);
        assert!(!store.delete_role(role.id).await?);
        assert!(store.assignments_for(&user).await?.is_empty());
        assert_eq!(store.grant_count().await, 0);
        assert_eq!(store.ability_count().await, 1);

        Ok(())
    }

    #[tokio::test]
    async fn it_deletes_only_exactly_matching_grants() -> Result<()> {
        let store = MemoryGrantStore::default();
        let (_, ability) = seed(&store).await?;
        let user = Grantee::Authority(EntityRef::new("user", 1u64));

        let grouped = NewGrant {
            scope: GrantScope {
                group: Some("billing".into()),
                parent: None,
            },
            ..allow(&ability, user.clone())
        };
        store
            .insert_grants(vec![allow(&ability, user.clone()), grouped])
            .await?;

        let removed = store
            .delete_grants(&GrantFilter {
                ability_ids: vec![ability.id],
                grantee: user.clone(),
                forbidden: false,
                scope: GrantScope::unscoped(),
            })
            .await?;

        assert_eq!(removed, 1);
        let remaining = store.grants_for(&user).await?;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].scope.group.as_deref(), Some("billing"));

        Ok(())
    }
}
