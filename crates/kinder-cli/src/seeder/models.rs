//! Data models for seeding configuration and generated rows.

use kinder_core::RoleCode;
use validator::Validate;

/// Usernames of generated roster accounts start with this; clearing the
/// roster deletes exactly these users.
pub const ROSTER_USERNAME_PREFIX: &str = "demo_roster_";

/// Class codes of generated classes start with this.
pub const ROSTER_CLASS_PREFIX: &str = "DEMO";

pub const DEMO_EMAIL_DOMAIN: &str = "demo.kinder.local";

/// Input for `create-admin`.
#[derive(Debug, Clone, Validate)]
pub struct AdminAccount {
    #[validate(length(min = 3, max = 50))]
    pub username: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 50))]
    pub real_name: String,

    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// A `users` row to insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSeed {
    pub username: String,
    pub email: String,
    pub real_name: String,
    pub phone: String,
    pub role: RoleCode,
    pub password_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassSeed {
    pub code: String,
    pub name: String,
    /// 1 = small, 2 = middle, 3 = large.
    pub class_type: i32,
    pub grade: String,
    pub capacity: i32,
    pub classroom: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherSeed {
    pub user: UserSeed,
    pub teacher_no: String,
    pub major: String,
    /// Index into the generated classes.
    pub class_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentSeed {
    pub student_no: String,
    pub name: String,
    pub gender: String,
    pub birth_date: String,
    pub class_index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentSeed {
    pub user: UserSeed,
    pub relationship: String,
    pub occupation: String,
    pub work_unit: String,
    pub address: String,
    /// Index into the generated students.
    pub student_index: usize,
}

/// Everything one roster run inserts.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub classes: Vec<ClassSeed>,
    pub teachers: Vec<TeacherSeed>,
    pub students: Vec<StudentSeed>,
    pub parents: Vec<ParentSeed>,
}

/// How much demo data to generate.
#[derive(Debug, Clone)]
pub struct RosterConfig {
    pub classes: usize,
    pub teachers_per_class: usize,
    pub students_per_class: usize,
    /// One parent account per this many students.
    pub students_per_parent: usize,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            classes: 6,
            teachers_per_class: 2,
            students_per_class: 24,
            students_per_parent: 2,
        }
    }
}

impl RosterConfig {
    pub fn total_students(&self) -> usize {
        self.classes * self.students_per_class
    }

    pub fn total_parents(&self) -> usize {
        self.classes * self.students_per_class.div_ceil(self.students_per_parent.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_account_validation() {
        let account = AdminAccount {
            username: "admin".to_string(),
            email: "admin@kinder.local".to_string(),
            real_name: "Administrator".to_string(),
            password: "short".to_string(),
        };
        let errors = account.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("password"));

        let ok = AdminAccount {
            password: "long-enough-password".to_string(),
            ..account
        };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_roster_totals() {
        let config = RosterConfig {
            classes: 3,
            teachers_per_class: 1,
            students_per_class: 5,
            students_per_parent: 2,
        };
        assert_eq!(config.total_students(), 15);
        assert_eq!(config.total_parents(), 9);
    }
}
