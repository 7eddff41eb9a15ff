use anyhow::Result;
use pretty_assertions::assert_eq;
use warden::{
    AssignRoles, Changes, GiveAbility, RemoveAbility, RoleVisibility, SyncRoles, Warden,
    WardenError, WardenSettings,
};
use warden_model::{EntityRef, Grantee, NewRole, Target};
use warden_storage::{GrantStore, MemoryGrantStore};

fn warden() -> Warden<MemoryGrantStore> {
    Warden::new(MemoryGrantStore::default(), WardenSettings::default())
}

fn user(id: u64) -> EntityRef {
    EntityRef::new("user", id)
}

#[tokio::test]
async fn it_denies_everything_without_grants() -> Result<()> {
    let warden = warden();
    let alice = user(1);

    assert!(!warden.can(&alice, "edit", None).await?);
    assert!(!warden.can(&alice, "edit", Some(&Target::Any)).await?);
    assert!(!warden.can(&alice, "edit", Some(&Target::of_type("post"))).await?);
    assert!(
        !warden
            .can(&alice, "edit", Some(&Target::instance("post", 1u64)))
            .await?
    );
    assert!(warden.cannot(&alice, "edit", None).await?);
    Ok(())
}

#[tokio::test]
async fn it_stores_one_grant_however_often_an_ability_is_given() -> Result<()> {
    let warden = warden();
    let alice = user(1);
    let post = Target::of_type("post");

    let first = warden.allow(&alice, "edit", Some(post.clone())).await?;
    let second = warden.allow(&alice, "edit", Some(post.clone())).await?;

    assert_eq!(first, Changes { added: 1, removed: 0 });
    assert!(second.is_empty());
    assert_eq!(warden.store().grant_count().await, 1);
    assert!(warden.can(&alice, "edit", Some(&post)).await?);
    Ok(())
}

#[tokio::test]
async fn it_treats_ability_names_and_types_case_insensitively() -> Result<()> {
    let warden = warden();
    let alice = user(1);

    warden.allow(&alice, "Edit", None).await?;
    let again = warden.allow(&alice, "edit", None).await?;
    warden
        .allow(&alice, "Publish", Some(Target::of_type("Post")))
        .await?;

    assert!(again.is_empty());
    assert_eq!(warden.store().ability_count().await, 2);
    assert!(warden.can(&alice, "EDIT", None).await?);
    assert!(warden.can(&alice, "publish", Some(&Target::of_type("post"))).await?);

    let removed = warden.disallow(&alice, "edit", None).await?;
    assert_eq!(removed.removed, 1);
    assert!(!warden.can(&alice, "Edit", None).await?);
    Ok(())
}

#[tokio::test]
async fn it_lets_a_forbid_win_over_a_more_specific_allow() -> Result<()> {
    let warden = warden();
    let alice = user(1);
    let first_post = Target::instance("post", 1u64);

    warden.allow(&alice, "edit", Some(first_post.clone())).await?;
    warden.forbid(&alice, "*", Some(Target::of_type("post"))).await?;

    assert!(!warden.can(&alice, "edit", Some(&first_post)).await?);
    assert!(!warden.can(&alice, "view", Some(&Target::of_type("post"))).await?);
    Ok(())
}

#[tokio::test]
async fn it_lets_a_forbid_through_a_role_win_over_a_direct_allow() -> Result<()> {
    let warden = warden();
    let alice = user(1);

    warden.allow(&alice, "delete", None).await?;
    warden.forbid("banned", "delete", None).await?;
    assert!(warden.can(&alice, "delete", None).await?);

    warden.assign(&alice, "banned").await?;
    assert!(!warden.can(&alice, "delete", None).await?);
    Ok(())
}

#[tokio::test]
async fn it_treats_a_bare_wildcard_as_every_untargeted_ability() -> Result<()> {
    let warden = warden();
    let alice = user(1);

    warden.allow(&alice, "*", None).await?;

    assert!(warden.can(&alice, "edit", None).await?);
    assert!(warden.can(&alice, "publish", None).await?);
    assert!(!warden.can(&alice, "edit", Some(&Target::of_type("post"))).await?);
    Ok(())
}

#[tokio::test]
async fn it_treats_a_typed_wildcard_as_every_ability_on_that_type() -> Result<()> {
    let warden = warden();
    let alice = user(1);

    warden
        .allow(&alice, "*", Some(Target::of_type("post")))
        .await?;

    assert!(warden.can(&alice, "edit", Some(&Target::of_type("post"))).await?);
    assert!(
        warden
            .can(&alice, "delete", Some(&Target::instance("post", 9u64)))
            .await?
    );
    assert!(!warden.can(&alice, "edit", None).await?);
    assert!(!warden.can(&alice, "edit", Some(&Target::of_type("comment"))).await?);
    Ok(())
}

#[tokio::test]
async fn it_treats_a_wildcard_on_anything_as_everything() -> Result<()> {
    let warden = warden();
    let alice = user(1);

    warden.allow(&alice, "*", Some(Target::Any)).await?;

    assert!(warden.can(&alice, "edit", None).await?);
    assert!(warden.can(&alice, "edit", Some(&Target::Any)).await?);
    assert!(warden.can(&alice, "edit", Some(&Target::of_type("post"))).await?);
    assert!(
        warden
            .can(&alice, "ban", Some(&Target::instance("user", 2u64)))
            .await?
    );
    Ok(())
}

#[test_log::test(tokio::test)]
async fn it_grants_through_roles_until_they_are_retracted() -> Result<()> {
    let warden = warden();
    let alice = user(1);
    let site = Target::of_type("site");

    warden.allow("admin", "edit", Some(site.clone())).await?;
    warden.assign(&alice, "admin").await?;

    assert!(warden.can(&alice, "edit", Some(&site)).await?);
    assert!(warden.is_a(&alice, &["admin", "editor"]).await?);
    assert!(!warden.is_all(&alice, &["admin", "editor"]).await?);

    warden.retract(&alice, "admin").await?;

    assert!(!warden.can(&alice, "edit", Some(&site)).await?);
    assert!(warden.is_not(&alice, &["admin"]).await?);
    Ok(())
}

#[tokio::test]
async fn it_removes_only_the_forbid_when_permitting() -> Result<()> {
    let warden = warden();
    let alice = user(1);

    warden.allow(&alice, "edit", None).await?;
    warden.forbid(&alice, "edit", None).await?;
    assert!(!warden.can(&alice, "edit", None).await?);

    let changes = warden.permit(&alice, "edit", None).await?;
    assert_eq!(changes.removed, 1);
    assert!(warden.can(&alice, "edit", None).await?);

    warden.disallow(&alice, "edit", None).await?;
    assert!(!warden.can(&alice, "edit", None).await?);
    Ok(())
}

#[tokio::test]
async fn it_removes_grants_only_within_their_own_scope() -> Result<()> {
    let warden = warden();
    let alice = user(1);
    let team = EntityRef::new("team", 5u64);

    warden
        .give_ability(GiveAbility::to(&alice).ability("edit"))
        .await?;
    warden
        .give_ability(GiveAbility::to(&alice).ability("edit").within_group("billing"))
        .await?;
    warden
        .give_ability(GiveAbility::to(&alice).ability("edit").under(&team))
        .await?;
    assert_eq!(warden.store().grant_count().await, 3);

    let removed = warden
        .remove_ability(RemoveAbility::from(&alice).ability("edit"))
        .await?;
    assert_eq!(removed.removed, 1);

    let removed = warden
        .remove_ability(RemoveAbility::from(&alice).ability("edit").under(&team))
        .await?;
    assert_eq!(removed.removed, 1);

    let remaining = warden
        .store()
        .grants_for(&Grantee::Authority(alice.clone()))
        .await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].scope.group.as_deref(), Some("billing"));

    // Scopes narrow mutations, never checks
    assert!(warden.can(&alice, "edit", None).await?);
    Ok(())
}

#[tokio::test]
async fn it_refuses_to_delete_system_roles() -> Result<()> {
    let warden = warden();
    let alice = user(1);

    warden.create_role(NewRole::named("root").system()).await?;
    warden.allow("root", "*", Some(Target::Any)).await?;
    warden.assign(&alice, "root").await?;

    let result = warden.delete_role("root").await;
    assert!(matches!(result, Err(WardenError::ProtectedRole(name)) if name == "root"));
    assert!(warden.can(&alice, "edit", None).await?);
    Ok(())
}

#[tokio::test]
async fn it_revokes_everything_a_deleted_role_granted() -> Result<()> {
    let warden = warden();
    let alice = user(1);

    warden.allow("editor", "edit", None).await?;
    warden.assign(&alice, "editor").await?;
    assert!(warden.can(&alice, "edit", None).await?);

    warden.delete_role("editor").await?;

    assert!(!warden.can(&alice, "edit", None).await?);
    assert!(warden.roles_of(&alice).await?.is_empty());

    let missing = warden.delete_role("editor").await;
    assert!(matches!(missing, Err(WardenError::RoleNotFound(_))));
    Ok(())
}

#[tokio::test]
async fn it_syncs_roles_to_exactly_the_given_set() -> Result<()> {
    let warden = warden();
    let alice = user(1);

    warden
        .assign_roles(AssignRoles::to(&alice).roles(["admin", "editor"]))
        .await?;
    let changes = warden
        .sync_roles(SyncRoles::new(&alice, ["editor", "viewer"]))
        .await?;

    assert_eq!(changes, Changes { added: 1, removed: 1 });
    let names: Vec<String> = warden
        .roles_of(&alice)
        .await?
        .into_iter()
        .map(|role| role.name)
        .collect();
    assert_eq!(names, vec!["editor".to_string(), "viewer".to_string()]);
    Ok(())
}

#[tokio::test]
async fn it_lists_roles_by_level_and_visibility() -> Result<()> {
    let warden = warden();

    warden.create_role(NewRole::named("viewer")).await?;
    warden.create_role(NewRole::named("admin").level(1)).await?;
    warden
        .create_role(NewRole::named("auditor").level(2).private())
        .await?;
    warden
        .create_role(NewRole::named("elsewhere").guard("api"))
        .await?;

    let names = |roles: Vec<warden_model::Role>| -> Vec<String> {
        roles.into_iter().map(|role| role.name).collect()
    };

    assert_eq!(
        names(warden.roles(RoleVisibility::All).await?),
        vec!["admin", "auditor", "viewer"]
    );
    assert_eq!(
        names(warden.roles(RoleVisibility::Public).await?),
        vec!["admin", "viewer"]
    );
    Ok(())
}

#[tokio::test]
async fn it_lists_allowed_and_forbidden_abilities() -> Result<()> {
    let warden = warden();
    let alice = user(1);

    warden.allow(&alice, "view", None).await?;
    warden.allow("editor", "edit", Some(Target::of_type("post"))).await?;
    warden.forbid("editor", "delete", None).await?;
    warden.assign(&alice, "editor").await?;

    let allowed: Vec<String> = warden
        .abilities_of(&alice)
        .await?
        .iter()
        .map(|ability| ability.identifier())
        .collect();
    let forbidden: Vec<String> = warden
        .forbidden_abilities_of(&alice)
        .await?
        .iter()
        .map(|ability| ability.identifier())
        .collect();

    assert_eq!(allowed, vec!["view", "edit-post"]);
    assert_eq!(forbidden, vec!["delete"]);
    Ok(())
}

#[tokio::test]
async fn it_rejects_authorities_without_identity() -> Result<()> {
    let warden = warden();
    let guest = EntityRef::unsaved("user");

    let check = warden.can(&guest, "edit", None).await;
    assert!(matches!(check, Err(WardenError::AuthorityNotFound(_))));

    let assign = warden.assign(&guest, "admin").await;
    assert!(matches!(assign, Err(WardenError::InvalidAuthority(_))));

    let give = warden.allow(&guest, "edit", None).await;
    assert!(matches!(give, Err(WardenError::InvalidAuthority(_))));

    assert!(warden.roles(RoleVisibility::All).await?.is_empty());
    assert_eq!(warden.store().grant_count().await, 0);
    Ok(())
}
