use warden_model::{EntityRef, Target};
use warden_storage::{ConditionalSync, GrantStore};

use crate::{Decision, GateMode, Warden, WardenError};

/// What the host application knows about its own authorization policies.
pub trait HostPolicies: ConditionalSync {
    /// Whether the host defines a policy of its own for `ability` on `target`
    fn has_policy(&self, ability: &str, target: Option<&Target>) -> bool;
}

impl<Probe> HostPolicies for Probe
where
    Probe: Fn(&str, Option<&Target>) -> bool + ConditionalSync,
{
    fn has_policy(&self, ability: &str, target: Option<&Target>) -> bool {
        self(ability, target)
    }
}

/// For hosts without policies of their own: the engine always decides.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHostPolicies;

impl HostPolicies for NoHostPolicies {
    fn has_policy(&self, _ability: &str, _target: Option<&Target>) -> bool {
        false
    }
}

/// The hook a host registers at its authorization dispatch point.
///
/// A returned `Some(decision)` short-circuits the host; `None` lets the host
/// carry on with its own policy lookup.
#[derive(Clone)]
pub struct Gate<Store, Policies>
where
    Store: GrantStore + 'static,
    Policies: HostPolicies,
{
    warden: Warden<Store>,
    policies: Policies,
}

impl<Store, Policies> Gate<Store, Policies>
where
    Store: GrantStore + 'static,
    Policies: HostPolicies,
{
    /// Hook `warden` into a host whose own policies are described by
    /// `policies`
    pub fn new(warden: Warden<Store>, policies: Policies) -> Self {
        Self { warden, policies }
    }

    /// Consult the engine before the host's own policies. An allow is final.
    /// Anything else is final too unless the host has a policy that may still
    /// decide.
    pub async fn before(
        &self,
        authority: &EntityRef,
        ability: &str,
        target: Option<&Target>,
    ) -> Result<Option<bool>, WardenError> {
        if !authority.is_persisted() {
            return Ok(Some(false));
        }

        Ok(match self.warden.decide(authority, ability, target).await? {
            Decision::Allowed => Some(true),
            _ if self.policies.has_policy(ability, target) => None,
            _ => Some(false),
        })
    }

    /// Consult the engine after the host's own policies produced
    /// `host_result`. A decided host result stands.
    pub async fn after(
        &self,
        authority: &EntityRef,
        ability: &str,
        target: Option<&Target>,
        host_result: Option<bool>,
    ) -> Result<Option<bool>, WardenError> {
        if host_result.is_some() {
            return Ok(host_result);
        }
        if !authority.is_persisted() {
            return Ok(Some(false));
        }

        let decision = self.warden.decide(authority, ability, target).await?;
        Ok(Some(decision.is_allowed()))
    }

    /// Run the whole check the way the configured [GateMode] orders it.
    /// `host` evaluates the host's own policy and is called at most once;
    /// a check nobody decides is denied.
    pub async fn check<Host>(
        &self,
        authority: &EntityRef,
        ability: &str,
        target: Option<&Target>,
        host: Host,
    ) -> Result<bool, WardenError>
    where
        Host: FnOnce() -> Option<bool>,
    {
        let decision = match self.warden.settings().gate.mode {
            GateMode::Before => match self.before(authority, ability, target).await? {
                Some(decision) => Some(decision),
                None => host(),
            },
            GateMode::After => {
                let host_result = host();
                self.after(authority, ability, target, host_result).await?
            }
        };

        Ok(decision.unwrap_or(false))
    }
}
