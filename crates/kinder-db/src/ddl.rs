//! Classification of "already exists" failures.
//!
//! Re-running a seed or index task hits duplicate-key and duplicate-object
//! errors for work that was already done. These are recognised by MySQL
//! error number rather than by message text.

use sqlx::mysql::MySqlDatabaseError;
use sqlx::{Executor, MySql};

/// ER_TABLE_EXISTS_ERROR
pub const ER_TABLE_EXISTS: u16 = 1050;
/// ER_DUP_FIELDNAME
pub const ER_DUP_FIELDNAME: u16 = 1060;
/// ER_DUP_KEYNAME
pub const ER_DUP_KEYNAME: u16 = 1061;
/// ER_DUP_ENTRY
pub const ER_DUP_ENTRY: u16 = 1062;
/// ER_NO_SUCH_TABLE
pub const ER_NO_SUCH_TABLE: u16 = 1146;

/// Result of a statement whose target may already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdlOutcome {
    Applied,
    AlreadyExists,
}

pub fn is_duplicate_code(number: u16) -> bool {
    matches!(
        number,
        ER_TABLE_EXISTS | ER_DUP_FIELDNAME | ER_DUP_KEYNAME | ER_DUP_ENTRY
    )
}

/// MySQL error number carried by `err`, if it came from the server.
pub fn mysql_error_number(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<MySqlDatabaseError>()
            .map(|e| e.number()),
        _ => None,
    }
}

/// True when `err` reports that the object or row already exists.
pub fn is_duplicate_error(err: &sqlx::Error) -> bool {
    mysql_error_number(err).is_some_and(is_duplicate_code)
}

/// Executes `sql`, treating duplicate-object errors as success.
pub async fn execute_ignoring_duplicates<'e, E>(executor: E, sql: &str) -> Result<DdlOutcome, sqlx::Error>
where
    E: Executor<'e, Database = MySql>,
{
    match sqlx::query(sql).execute(executor).await {
        Ok(_) => Ok(DdlOutcome::Applied),
        Err(e) if is_duplicate_error(&e) => {
            tracing::debug!(error = %e, "Statement target already exists");
            Ok(DdlOutcome::AlreadyExists)
        }
        Err(e) => Err(e),
    }
}
