//! Secondary indexes backing the application's most frequent lookups.
//!
//! MySQL has no `CREATE INDEX IF NOT EXISTS`, so an existing index surfaces
//! as `ER_DUP_KEYNAME` and is counted as already present.

use sqlx::MySqlPool;
use std::time::Instant;
use tracing::{info, warn};

use crate::ddl::{DdlOutcome, execute_ignoring_duplicates};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub table: &'static str,
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

impl IndexSpec {
    pub fn create_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("`{}`", c))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "CREATE INDEX `{}` ON `{}` ({})",
            self.name, self.table, columns
        )
    }
}

pub const RECOMMENDED_INDEXES: &[IndexSpec] = &[
    IndexSpec { table: "permissions", name: "idx_permissions_parent_id", columns: &["parent_id"] },
    IndexSpec { table: "permissions", name: "idx_permissions_type_status", columns: &["type", "status"] },
    IndexSpec { table: "permissions", name: "idx_permissions_path", columns: &["path"] },
    IndexSpec { table: "role_permissions", name: "idx_role_permissions_role", columns: &["role_id", "permission_id"] },
    IndexSpec { table: "role_permissions", name: "idx_role_permissions_permission", columns: &["permission_id"] },
    IndexSpec { table: "user_roles", name: "idx_user_roles_user", columns: &["user_id", "role_id"] },
    IndexSpec { table: "students", name: "idx_students_class_id", columns: &["class_id"] },
    IndexSpec { table: "students", name: "idx_students_status", columns: &["status"] },
    IndexSpec { table: "class_teachers", name: "idx_class_teachers_teacher", columns: &["teacher_id"] },
    IndexSpec { table: "parent_student_relations", name: "idx_psr_parent", columns: &["parent_id"] },
    IndexSpec { table: "parent_student_relations", name: "idx_psr_student", columns: &["student_id"] },
    IndexSpec { table: "assessment_questions", name: "idx_aq_config_dimension", columns: &["config_id", "dimension"] },
    IndexSpec { table: "assessment_records", name: "idx_ar_student", columns: &["student_id", "created_at"] },
    IndexSpec { table: "ai_messages", name: "idx_ai_messages_conversation", columns: &["conversation_id", "created_at"] },
    IndexSpec { table: "ai_conversations", name: "idx_ai_conversations_user", columns: &["user_id", "updated_at"] },
    IndexSpec { table: "script_usages", name: "idx_script_usages_script", columns: &["script_id"] },
];

#[derive(Debug, Default)]
pub struct IndexReport {
    pub created: Vec<&'static str>,
    pub existing: Vec<&'static str>,
    pub failed: Vec<(&'static str, String)>,
}

impl IndexReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Creates every index in [`RECOMMENDED_INDEXES`].
///
/// A failure on one index (for example a table this deployment does not
/// have) is logged and recorded; the remaining indexes are still attempted.
pub async fn optimize_indexes(pool: &MySqlPool) -> IndexReport {
    optimize(pool, RECOMMENDED_INDEXES).await
}

pub async fn optimize(pool: &MySqlPool, specs: &[IndexSpec]) -> IndexReport {
    let start_time = Instant::now();
    let mut report = IndexReport::default();

    for index in specs {
        match execute_ignoring_duplicates(pool, &index.create_sql()).await {
            Ok(DdlOutcome::Applied) => {
                info!(index = index.name, table = index.table, "Index created");
                report.created.push(index.name);
            }
            Ok(DdlOutcome::AlreadyExists) => {
                info!(index = index.name, table = index.table, "Index already present");
                report.existing.push(index.name);
            }
            Err(e) => {
                warn!(index = index.name, table = index.table, error = %e, "Index creation failed");
                report.failed.push((index.name, e.to_string()));
            }
        }
    }

    info!(
        created = report.created.len(),
        existing = report.existing.len(),
        failed = report.failed.len(),
        elapsed = ?start_time.elapsed(),
        "Index optimisation finished"
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_create_sql_quotes_identifiers() {
        let index = IndexSpec {
            table: "role_permissions",
            name: "idx_rp",
            columns: &["role_id", "permission_id"],
        };
        assert_eq!(
            index.create_sql(),
            "CREATE INDEX `idx_rp` ON `role_permissions` (`role_id`, `permission_id`)"
        );
    }

    #[test]
    fn test_index_names_are_unique() {
        let names: HashSet<_> = RECOMMENDED_INDEXES.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), RECOMMENDED_INDEXES.len());
    }

    #[test]
    fn test_every_index_has_columns() {
        assert!(RECOMMENDED_INDEXES.iter().all(|s| !s.columns.is_empty()));
    }
}
