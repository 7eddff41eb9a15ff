use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::EntityRef;

/// Store-assigned key of a [`Role`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RoleId(pub u64);

impl Display for RoleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named, reusable bundle of abilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Store key
    pub id: RoleId,
    /// Unique within its guard
    pub name: String,
    /// Human-readable label
    pub title: Option<String>,
    /// The namespace this role belongs to
    pub guard: String,
    /// System roles cannot be deleted
    pub system: bool,
    /// Private roles are hidden from public listings
    pub private: bool,
    /// Advisory precedence, lower is higher. Never consulted when resolving
    /// allow/forbid decisions.
    pub level: Option<i32>,
}

/// The insert form of a [`Role`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRole {
    /// See [`Role::name`]
    pub name: String,
    /// See [`Role::title`]
    pub title: Option<String>,
    /// See [`Role::guard`]; `None` takes the engine's configured guard
    pub guard: Option<String>,
    /// See [`Role::system`]
    pub system: bool,
    /// See [`Role::private`]
    pub private: bool,
    /// See [`Role::level`]
    pub level: Option<i32>,
}

impl NewRole {
    /// A plain role with the given name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            guard: None,
            system: false,
            private: false,
            level: None,
        }
    }

    /// Attach a title
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Place the role in an explicit guard
    pub fn guard(mut self, guard: impl Into<String>) -> Self {
        self.guard = Some(guard.into());
        self
    }

    /// Protect the role from deletion
    pub fn system(mut self) -> Self {
        self.system = true;
        self
    }

    /// Hide the role from public listings
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Set the advisory level
    pub fn level(mut self, level: i32) -> Self {
        self.level = Some(level);
        self
    }

    /// Materialize the record once the store has assigned an id and the guard
    /// has been decided
    pub fn into_role(self, id: RoleId, guard: String) -> Role {
        Role {
            id,
            name: self.name,
            title: self.title,
            guard: self.guard.unwrap_or(guard),
            system: self.system,
            private: self.private,
            level: self.level,
        }
    }
}

/// An assignment of a role to an authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    /// The assigned role
    pub role_id: RoleId,
    /// The authority holding the role
    pub authority: EntityRef,
}

/// Order roles for display: by level (unlevelled last), then by name.
pub fn sort_roles(roles: &mut [Role]) {
    roles.sort_by(|a, b| {
        let a_level = a.level.unwrap_or(i32::MAX);
        let b_level = b.level.unwrap_or(i32::MAX);
        a_level.cmp(&b_level).then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_takes_the_engine_guard_unless_one_is_given() {
        let role = NewRole::named("admin").into_role(RoleId(1), "web".into());
        assert_eq!(role.guard, "web");

        let role = NewRole::named("admin")
            .guard("api")
            .into_role(RoleId(1), "web".into());
        assert_eq!(role.guard, "api");
    }

    #[test]
    fn it_orders_roles_by_level_then_name() {
        let mut roles = vec![
            NewRole::named("viewer").into_role(RoleId(1), "web".into()),
            NewRole::named("editor")
                .level(2)
                .into_role(RoleId(2), "web".into()),
            NewRole::named("admin")
                .level(1)
                .into_role(RoleId(3), "web".into()),
            NewRole::named("author").into_role(RoleId(4), "web".into()),
        ];
        sort_roles(&mut roles);

        let names: Vec<_> = roles.iter().map(|role| role.name.as_str()).collect();
        assert_eq!(names, ["admin", "editor", "author", "viewer"]);
    }
}
