//! Capability resolution over a configuration snapshot.
//!
//! Pure functions: nothing here reads the platform or mutates config.

use crate::category::Capability;
use crate::config_store::{LegacyRoleKind, TicketConfig};
use crate::ticket::Actor;
use crate::RoleId;

/// Decides whether a set of role memberships holds a capability
pub struct PermissionResolver<'a> {
    config: &'a TicketConfig,
}

impl<'a> PermissionResolver<'a> {
    pub fn new(config: &'a TicketConfig) -> Self {
        Self { config }
    }

    /// Resolve one capability.
    ///
    /// Administrators hold every capability. Without a category only the
    /// legacy global lists for access/claim/close are consulted. With a
    /// category, a missing category yields `false`.
    pub fn resolve(
        &self,
        capability: Capability,
        actor_roles: &[RoleId],
        is_admin: bool,
        category: Option<&str>,
    ) -> bool {
        if is_admin {
            return true;
        }

        let Some(name) = category else {
            return self.resolve_legacy(capability, actor_roles);
        };

        let Some(category) = self.config.category(name) else {
            return false;
        };
        let staff = &category.staff_roles;

        let granted = |cap: Capability| actor_roles.iter().any(|role| staff.contains(cap, role));

        match capability {
            // any staff grant on a category implies seeing its tickets
            Capability::Access => Capability::ALL.iter().any(|cap| granted(*cap)),
            other => granted(other),
        }
    }

    pub fn resolve_for(&self, capability: Capability, actor: &Actor, category: Option<&str>) -> bool {
        self.resolve(capability, &actor.roles, actor.is_admin, category)
    }

    fn resolve_legacy(&self, capability: Capability, actor_roles: &[RoleId]) -> bool {
        let kind = match capability {
            Capability::Access => LegacyRoleKind::TicketAccess,
            Capability::Claim => LegacyRoleKind::Claim,
            Capability::Close => LegacyRoleKind::Close,
            Capability::Persistent | Capability::Ping => return false,
        };
        let granted = self.config.permissions.roles(kind);
        actor_roles.iter().any(|role| granted.contains(role))
    }

    /// Roles mentioned when a ticket of `category` opens.
    ///
    /// An explicit ping set wins even when empty; only an absent set falls
    /// back to every access/claim/close/persistent role.
    pub fn roles_to_ping(&self, category: &str) -> Vec<RoleId> {
        let Some(category) = self.config.category(category) else {
            return Vec::new();
        };
        let staff = &category.staff_roles;
        match &staff.ping {
            Some(ping) => ping.clone(),
            None => staff.union(&[
                Capability::Access,
                Capability::Claim,
                Capability::Close,
                Capability::Persistent,
            ]),
        }
    }
}
