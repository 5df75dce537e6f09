//! Permission-overwrite planning for ticket channels.
//!
//! Pure functions from a category snapshot and the legacy role lists to
//! the ordered overwrites the transport must apply. Order matters: the
//! claimant's explicit grant comes after the bulk revoke so it wins for
//! a claimant who also holds one of the revoked roles.

use ticket_common::{Capability, Category, LegacyPermissions, RoleId, UserId};

use crate::transport::{Overwrite, OverwriteTarget, PermissionPatch};

/// Staff roles whose send access follows the claim
const CLAIM_SCOPED: [Capability; 3] = [Capability::Access, Capability::Claim, Capability::Close];

fn push_unique(out: &mut Vec<RoleId>, roles: &[RoleId]) {
    for role in roles {
        if !out.contains(role) {
            out.push(role.clone());
        }
    }
}

/// Roles given view/send on a new ticket: every access, claim, close and
/// persistent role of the category plus the legacy access roles.
pub fn participant_roles(category: Option<&Category>, legacy: &LegacyPermissions) -> Vec<RoleId> {
    let mut roles = category
        .map(|c| {
            c.staff_roles.union(&[
                Capability::Access,
                Capability::Claim,
                Capability::Close,
                Capability::Persistent,
            ])
        })
        .unwrap_or_default();
    push_unique(&mut roles, &legacy.ticket_access_roles);
    roles
}

/// Initial overwrites of a ticket channel
pub fn create_overwrites(
    category: Option<&Category>,
    legacy: &LegacyPermissions,
    creator: &UserId,
) -> Vec<Overwrite> {
    let mut overwrites = vec![
        Overwrite::new(OverwriteTarget::Everyone, PermissionPatch::hidden()),
        Overwrite::new(OverwriteTarget::Member(creator.clone()), PermissionPatch::participant()),
    ];
    overwrites.extend(
        participant_roles(category, legacy)
            .into_iter()
            .map(|role| Overwrite::new(OverwriteTarget::Role(role), PermissionPatch::participant())),
    );
    overwrites
}

/// Roles that lose send access when a ticket is claimed
pub fn claim_revocations(category: Option<&Category>, legacy: &LegacyPermissions) -> Vec<RoleId> {
    let mut roles = match category {
        Some(c) => {
            let persistent = c.staff_roles.roles(Capability::Persistent);
            c.staff_roles
                .union(&CLAIM_SCOPED)
                .into_iter()
                .filter(|role| !persistent.contains(role))
                .collect()
        }
        None => Vec::new(),
    };
    push_unique(&mut roles, &legacy.claim_roles);
    roles
}

/// Roles whose send access is restored on unclaim
pub fn unclaim_restorations(category: Option<&Category>, legacy: &LegacyPermissions) -> Vec<RoleId> {
    let mut roles = category
        .map(|c| c.staff_roles.union(&CLAIM_SCOPED))
        .unwrap_or_default();
    push_unique(&mut roles, &legacy.claim_roles);
    roles
}

/// Ordered overwrites applied on claim: revocations, then the claimant
pub fn claim_overwrites(
    category: Option<&Category>,
    legacy: &LegacyPermissions,
    claimant: &UserId,
) -> Vec<Overwrite> {
    let mut overwrites: Vec<Overwrite> = claim_revocations(category, legacy)
        .into_iter()
        .map(|role| Overwrite::new(OverwriteTarget::Role(role), PermissionPatch::send(false)))
        .collect();
    overwrites.push(Overwrite::new(
        OverwriteTarget::Member(claimant.clone()),
        PermissionPatch::send(true),
    ));
    overwrites
}

pub fn unclaim_overwrites(category: Option<&Category>, legacy: &LegacyPermissions) -> Vec<Overwrite> {
    unclaim_restorations(category, legacy)
        .into_iter()
        .map(|role| Overwrite::new(OverwriteTarget::Role(role), PermissionPatch::send(true)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use ticket_common::StaffRoles;

    fn ids(v: &[&str]) -> Vec<RoleId> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn category(staff: StaffRoles) -> Category {
        Category::new("General Support", "general").with_staff_roles(staff)
    }

    fn sample() -> (Category, LegacyPermissions) {
        let cat = category(StaffRoles {
            access: ids(&["A", "B"]),
            claim: ids(&["B", "C"]),
            close: ids(&["D"]),
            persistent: ids(&["A", "P"]),
            ping: Some(ids(&["X"])),
        });
        let legacy = LegacyPermissions {
            ticket_access_roles: ids(&["LA", "A"]),
            claim_roles: ids(&["LC"]),
            close_roles: ids(&["LX"]),
        };
        (cat, legacy)
    }

    fn apply(state: &mut HashMap<OverwriteTarget, PermissionPatch>, overwrites: &[Overwrite]) {
        for ow in overwrites {
            let current = state.get(&ow.target).copied().unwrap_or_default();
            state.insert(ow.target.clone(), current.merge(ow.patch));
        }
    }

    #[test]
    fn test_create_grants_deduplicated() {
        let (cat, legacy) = sample();
        assert_eq!(participant_roles(Some(&cat), &legacy), ids(&["A", "B", "C", "D", "P", "LA"]));

        let overwrites = create_overwrites(Some(&cat), &legacy, &"U".to_string());
        assert_eq!(overwrites[0].target, OverwriteTarget::Everyone);
        assert_eq!(overwrites[0].patch.view, Some(false));
        assert_eq!(overwrites[1].target, OverwriteTarget::Member("U".into()));
        // ping-only roles get nothing
        assert!(!overwrites
            .iter()
            .any(|o| o.target == OverwriteTarget::Role("X".into())));
    }

    #[test]
    fn test_claim_skips_persistent_roles() {
        let (cat, legacy) = sample();
        assert_eq!(claim_revocations(Some(&cat), &legacy), ids(&["B", "C", "D", "LC"]));
    }

    #[test]
    fn test_claimant_grant_applied_last() {
        let (cat, legacy) = sample();
        let overwrites = claim_overwrites(Some(&cat), &legacy, &"S".to_string());
        let last = overwrites.last().unwrap();
        assert_eq!(last.target, OverwriteTarget::Member("S".into()));
        assert_eq!(last.patch.send, Some(true));
    }

    #[test]
    fn test_unclaim_restores_what_claim_revoked() {
        let (cat, legacy) = sample();
        let mut state = HashMap::new();
        let creator = "U".to_string();
        apply(&mut state, &create_overwrites(Some(&cat), &legacy, &creator));
        let before = state.clone();

        apply(&mut state, &claim_overwrites(Some(&cat), &legacy, &"S".to_string()));
        for role in claim_revocations(Some(&cat), &legacy) {
            assert_eq!(state[&OverwriteTarget::Role(role)].send, Some(false));
        }
        apply(&mut state, &unclaim_overwrites(Some(&cat), &legacy));

        // every role overwrite is back where it started
        for (target, patch) in &before {
            assert_eq!(state.get(target), Some(patch), "{}", target);
        }
        let revoked = claim_revocations(Some(&cat), &legacy);
        let restored = unclaim_restorations(Some(&cat), &legacy);
        assert!(revoked.iter().all(|r| restored.contains(r)));
    }

    #[test]
    fn test_removed_category_falls_back_to_legacy() {
        let (_, legacy) = sample();
        assert_eq!(claim_revocations(None, &legacy), ids(&["LC"]));
        assert_eq!(unclaim_restorations(None, &legacy), ids(&["LC"]));
        assert_eq!(participant_roles(None, &legacy), ids(&["LA", "A"]));
    }
}
