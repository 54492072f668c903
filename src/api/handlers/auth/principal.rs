//! Authenticated principal derived from a verified session token.

use uuid::Uuid;

use super::role::{AccessPolicy, Role, RoleFlags};
use super::token::SessionClaims;

/// Actor context downstream handlers work with. Built only from claims that
/// already passed signature and expiry verification.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub flags: RoleFlags,
    pub current_role: Role,
}

impl Principal {
    #[must_use]
    pub fn from_claims(claims: &SessionClaims) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email.clone(),
            flags: claims.roles,
            current_role: claims.role,
        }
    }

    /// Evaluate a per-operation role policy against this actor.
    #[must_use]
    pub fn satisfies(&self, policy: AccessPolicy) -> bool {
        match policy {
            AccessPolicy::Flag(role) => self.flags.allows(role),
            AccessPolicy::CurrentRole(role) => self.current_role == role,
        }
    }

    /// Admin flag, independent of the active persona. Ownership checks key
    /// off this: the flag bypasses them, the persona does not matter.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.flags.admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(flags: RoleFlags, current: Role) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            flags,
            current_role: current,
        }
    }

    #[test]
    fn flag_policy_ignores_current_role() {
        // Teacher-and-admin account currently acting as student.
        let actor = principal(RoleFlags::new(true, true, true), Role::Student);
        assert!(actor.satisfies(AccessPolicy::Flag(Role::Teacher)));
        assert!(actor.satisfies(AccessPolicy::Flag(Role::Admin)));
    }

    #[test]
    fn current_role_policy_tracks_persona() {
        let actor = principal(RoleFlags::new(true, true, true), Role::Student);
        assert!(!actor.satisfies(AccessPolicy::CurrentRole(Role::Teacher)));
        assert!(actor.satisfies(AccessPolicy::CurrentRole(Role::Student)));
    }

    #[test]
    fn flag_policy_denies_missing_flag() {
        let actor = principal(RoleFlags::new(true, false, false), Role::Student);
        assert!(!actor.satisfies(AccessPolicy::Flag(Role::Teacher)));
        assert!(!actor.satisfies(AccessPolicy::Flag(Role::Admin)));
    }
}
