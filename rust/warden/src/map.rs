use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

/// The outcome of checking candidate identifiers against a [`PermissionMap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// At least one candidate is allowed and none is forbidden
    Allowed,
    /// At least one candidate is forbidden
    Forbidden,
    /// No candidate is granted either way
    Undetermined,
}

impl Decision {
    /// Whether the check passes
    pub fn is_allowed(self) -> bool {
        self == Decision::Allowed
    }
}

/// A read-mostly snapshot of everything one authority holds: its role names
/// and the canonical identifiers it is allowed and forbidden, whether granted
/// directly or through a role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionMap {
    roles: BTreeSet<String>,
    allowed: HashSet<String>,
    forbidden: HashSet<String>,
}

impl PermissionMap {
    /// Assemble a map from its three sets
    pub fn new(
        roles: impl IntoIterator<Item = String>,
        allowed: impl IntoIterator<Item = String>,
        forbidden: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            roles: roles.into_iter().collect(),
            allowed: allowed.into_iter().collect(),
            forbidden: forbidden.into_iter().collect(),
        }
    }

    /// Names of the roles assigned to the authority
    pub fn roles(&self) -> &BTreeSet<String> {
        &self.roles
    }

    /// Identifiers the authority is allowed
    pub fn allowed(&self) -> &HashSet<String> {
        &self.allowed
    }

    /// Identifiers the authority is forbidden
    pub fn forbidden(&self) -> &HashSet<String> {
        &self.forbidden
    }

    /// Whether the authority holds the role named `role`
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Check candidate identifiers against the map. A forbidden candidate
    /// wins over any number of allowed ones, whatever their specificity.
    pub fn decide<Candidate>(&self, candidates: &[Candidate]) -> Decision
    where
        Candidate: AsRef<str>,
    {
        let mut allowed = false;

        for candidate in candidates {
            let candidate = candidate.as_ref();
            if self.forbidden.contains(candidate) {
                return Decision::Forbidden;
            }
            allowed = allowed || self.allowed.contains(candidate);
        }

        if allowed {
            Decision::Allowed
        } else {
            Decision::Undetermined
        }
    }

    /// Whether the candidates resolve to an allow
    pub fn resolve<Candidate>(&self, candidates: &[Candidate]) -> bool
    where
        Candidate: AsRef<str>,
    {
        self.decide(candidates).is_allowed()
    }
}
