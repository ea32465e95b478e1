//! Administrator and demo accounts.

use kinder_core::{OpsError, RoleCode};
use kinder_db::is_duplicate_error;
use kinder_models::{RoleId, UserId};
use sqlx::MySqlConnection;
use sqlx::MySqlPool;
use std::fmt;
use std::time::Instant;
use tracing::{debug, instrument};
use validator::Validate;

use super::models::{AdminAccount, DEMO_EMAIL_DOMAIN, UserSeed};
use super::{hash_password, roles::load_roles};

const INSERT_USER: &str = r#"
    INSERT INTO users (username, password, email, role, phone, status, real_name, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, 'active', ?, NOW(), NOW())
"#;

/// Cost for real administrator passwords.
const ADMIN_BCRYPT_COST: u32 = bcrypt::DEFAULT_COST;

/// Demo accounts share a password that is typed in by hand during demos.
const DEMO_BCRYPT_COST: u32 = 10;

/// The account `seed-demo-users` creates for `role`.
pub fn demo_user(role: RoleCode, password_hash: &str) -> UserSeed {
    let index = RoleCode::ALL.iter().position(|r| *r == role).unwrap_or_default();
    UserSeed {
        username: format!("demo_{}", role),
        email: format!("demo_{}@{}", role, DEMO_EMAIL_DOMAIN),
        real_name: format!("Demo {}", capitalize(role.as_str())),
        phone: format!("1380000{:04}", index + 1),
        role,
        password_hash: password_hash.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

pub(crate) async fn insert_user(conn: &mut MySqlConnection, user: &UserSeed) -> Result<u64, sqlx::Error> {
    Ok(sqlx::query(INSERT_USER)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.email)
        .bind(user.role.as_str())
        .bind(&user.phone)
        .bind(&user.real_name)
        .execute(&mut *conn)
        .await?
        .rows_affected())
}

pub(crate) async fn link_role(conn: &mut MySqlConnection, user_id: UserId, role_id: RoleId) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT IGNORE INTO user_roles (user_id, role_id, created_at, updated_at) VALUES (?, ?, NOW(), NOW())",
    )
    .bind(user_id)
    .bind(role_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn user_id_by_username(conn: &mut MySqlConnection, username: &str) -> Result<UserId, OpsError> {
    sqlx::query_scalar::<_, UserId>("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| OpsError::missing(format!("user '{}' vanished after insert", username)))
}

/// Creates an administrator account linked to the `admin` role.
#[instrument(skip_all, fields(username = %account.username))]
pub async fn create_admin(pool: &MySqlPool, account: &AdminAccount) -> Result<UserId, OpsError> {
    account
        .validate()
        .map_err(|e| OpsError::Other(anyhow::anyhow!("Invalid account: {}", e.to_string().replace('\n', "; "))))?;

    let role_id = sqlx::query_scalar::<_, RoleId>("SELECT id FROM roles WHERE code = ?")
        .bind(RoleCode::Admin.as_str())
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| OpsError::missing("admin role not found; seed roles first"))?;

    let user = UserSeed {
        username: account.username.clone(),
        email: account.email.clone(),
        real_name: account.real_name.clone(),
        phone: String::new(),
        role: RoleCode::Admin,
        password_hash: hash_password(&account.password, ADMIN_BCRYPT_COST)?,
    };

    let mut tx = pool.begin().await?;
    match insert_user(&mut tx, &user).await {
        Ok(_) => {}
        Err(e) if is_duplicate_error(&e) => {
            tx.rollback().await?;
            return Err(OpsError::already_exists(format!(
                "user '{}' or email '{}'",
                user.username, user.email
            )));
        }
        Err(e) => return Err(e.into()),
    }
    let user_id = user_id_by_username(&mut tx, &user.username).await?;
    link_role(&mut tx, user_id, role_id).await?;
    tx.commit().await?;

    Ok(user_id)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemoUsersReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
}

impl fmt::Display for DemoUsersReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for username in &self.created {
            writeln!(f, "   ✓ Created {}", username)?;
        }
        for username in &self.existing {
            writeln!(f, "   • {} already exists", username)?;
        }
        Ok(())
    }
}

/// One `demo_<role>` account per role; existing accounts are left alone.
#[instrument(skip_all)]
pub async fn seed_demo_users(pool: &MySqlPool, password: &str) -> Result<DemoUsersReport, OpsError> {
    let start_time = Instant::now();
    println!("👥 Seeding demo accounts for {} roles...", RoleCode::ALL.len());

    let roles = load_roles(pool).await?;
    let password_hash = hash_password(password, DEMO_BCRYPT_COST)?;

    let mut report = DemoUsersReport::default();
    let mut tx = pool.begin().await?;

    for role in RoleCode::ALL {
        let user = demo_user(role, &password_hash);
        let inserted = match insert_user(&mut tx, &user).await {
            Ok(rows) => rows > 0,
            Err(e) if is_duplicate_error(&e) => false,
            Err(e) => return Err(e.into()),
        };

        let user_id = user_id_by_username(&mut tx, &user.username).await?;
        link_role(&mut tx, user_id, roles[&role]).await?;
        debug!(username = %user.username, inserted, "Demo account ready");

        if inserted {
            report.created.push(user.username);
        } else {
            report.existing.push(user.username);
        }
    }

    tx.commit().await?;
    print!("{}", report);
    println!("   ✓ Done in {:?}", start_time.elapsed());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_user_shape() {
        let user = demo_user(RoleCode::Principal, "hash");
        assert_eq!(user.username, "demo_principal");
        assert_eq!(user.email, "demo_principal@demo.kinder.local");
        assert_eq!(user.real_name, "Demo Principal");
        assert_eq!(user.phone, "13800000002");
        assert_eq!(user.role, RoleCode::Principal);
    }

    #[test]
    fn test_demo_users_are_distinct() {
        let phones: std::collections::HashSet<String> =
            RoleCode::ALL.iter().map(|r| demo_user(*r, "h").phone).collect();
        assert_eq!(phones.len(), RoleCode::ALL.len());
    }
}
