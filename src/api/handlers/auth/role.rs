//! Role flags, the current-role model, and per-operation access policies.
//!
//! Accounts hold three independent boolean role flags. A session acts as one
//! role at a time (`current_role`), derived at login from the highest
//! privilege flag and changed only through the explicit switch flow.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A role an account can act as.
///
/// Ordering is part of the contract: `Admin > Teacher > Student` decides the
/// initial `current_role` for multi-role accounts.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Admin => "admin",
        }
    }

    /// Parse one of the three literal role names.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "student" => Some(Self::Student),
            "teacher" => Some(Self::Teacher),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three independent role flags carried by an account and its tokens.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct RoleFlags {
    pub student: bool,
    pub teacher: bool,
    pub admin: bool,
}

impl RoleFlags {
    #[must_use]
    pub const fn new(student: bool, teacher: bool, admin: bool) -> Self {
        Self {
            student,
            teacher,
            admin,
        }
    }

    /// True when the account holds at least one role.
    #[must_use]
    pub const fn any(self) -> bool {
        self.student || self.teacher || self.admin
    }

    /// Whether the flag backing `role` is set.
    #[must_use]
    pub const fn allows(self, role: Role) -> bool {
        match role {
            Role::Student => self.student,
            Role::Teacher => self.teacher,
            Role::Admin => self.admin,
        }
    }

    /// Highest-privilege role among the set flags: admin > teacher > student.
    #[must_use]
    pub const fn primary(self) -> Option<Role> {
        if self.admin {
            Some(Role::Admin)
        } else if self.teacher {
            Some(Role::Teacher)
        } else if self.student {
            Some(Role::Student)
        } else {
            None
        }
    }
}

/// Per-operation role requirement.
///
/// Some operations check the underlying flag (an admin-and-teacher account
/// may perform teacher actions even while acting as a student); others check
/// the active persona. The choice is a property of the operation, declared
/// at the call site, never inferred.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccessPolicy {
    /// The account must hold the flag, regardless of the session's persona.
    Flag(Role),
    /// The session must currently be acting as the role.
    CurrentRole(Role),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_round_trips_literals() {
        for role in [Role::Student, Role::Teacher, Role::Admin] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("owner"), None);
        assert_eq!(Role::parse("Admin"), None);
        assert_eq!(Role::parse(""), None);
    }

    #[test]
    fn role_serde_uses_lowercase() {
        let value = serde_json::to_value(Role::Teacher).expect("serialize");
        assert_eq!(value, serde_json::json!("teacher"));
        let role: Role = serde_json::from_value(serde_json::json!("admin")).expect("deserialize");
        assert_eq!(role, Role::Admin);
    }

    #[test]
    fn primary_follows_priority_order() {
        assert_eq!(
            RoleFlags::new(true, true, true).primary(),
            Some(Role::Admin)
        );
        assert_eq!(
            RoleFlags::new(true, true, false).primary(),
            Some(Role::Teacher)
        );
        assert_eq!(
            RoleFlags::new(true, false, false).primary(),
            Some(Role::Student)
        );
        assert_eq!(RoleFlags::new(false, false, false).primary(), None);
    }

    #[test]
    fn flags_are_independent() {
        let flags = RoleFlags::new(true, false, true);
        assert!(flags.allows(Role::Student));
        assert!(!flags.allows(Role::Teacher));
        assert!(flags.allows(Role::Admin));
        assert!(flags.any());
        assert!(!RoleFlags::default().any());
    }
}
