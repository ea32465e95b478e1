//! Role codes used by the `roles` and `role_permissions` tables.
//!
//! Role rows are owned by the main application; tooling only refers to them
//! by code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ADMIN: &str = "admin";
pub const PRINCIPAL: &str = "principal";
pub const TEACHER: &str = "teacher";
pub const PARENT: &str = "parent";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleCode {
    Admin,
    Principal,
    Teacher,
    Parent,
}

impl RoleCode {
    pub const ALL: [RoleCode; 4] = [
        RoleCode::Admin,
        RoleCode::Principal,
        RoleCode::Teacher,
        RoleCode::Parent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => ADMIN,
            Self::Principal => PRINCIPAL,
            Self::Teacher => TEACHER,
            Self::Parent => PARENT,
        }
    }

    /// The admin role is granted every active permission regardless of
    /// what the menu seed lists for it.
    pub fn receives_all_permissions(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for RoleCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role code '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for RoleCode {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            ADMIN => Ok(Self::Admin),
            PRINCIPAL => Ok(Self::Principal),
            TEACHER => Ok(Self::Teacher),
            PARENT => Ok(Self::Parent),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_codes() {
        assert_eq!("admin".parse::<RoleCode>().unwrap(), RoleCode::Admin);
        assert_eq!(" Teacher ".parse::<RoleCode>().unwrap(), RoleCode::Teacher);
        assert!("janitor".parse::<RoleCode>().is_err());
    }

    #[test]
    fn test_round_trip_display() {
        for role in RoleCode::ALL {
            assert_eq!(role.to_string().parse::<RoleCode>().unwrap(), role);
        }
    }

    #[test]
    fn test_only_admin_receives_everything() {
        assert!(RoleCode::Admin.receives_all_permissions());
        assert!(!RoleCode::Parent.receives_all_permissions());
    }
}
