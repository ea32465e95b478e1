//! Role ↔ permission links derived from the seed tree.

use kinder_core::{OpsError, RoleCode};
use kinder_models::{FlatPermission, MenuSeed, Permission, PermissionId, Role, RoleId};
use sqlx::MySqlPool;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{info, instrument, warn};

/// Codes a non-admin role should hold: every node listing the role plus all
/// of that node's ancestors, so the menu can render the path to it.
pub fn codes_for_role(flat: &[FlatPermission], role: RoleCode) -> BTreeSet<String> {
    let parents: HashMap<&str, Option<&str>> = flat
        .iter()
        .map(|p| (p.code.as_str(), p.parent_code.as_deref()))
        .collect();

    let mut codes = BTreeSet::new();
    for entry in flat.iter().filter(|p| p.roles.contains(&role)) {
        let mut current = Some(entry.code.as_str());
        while let Some(code) = current {
            if !codes.insert(code.to_string()) {
                break;
            }
            current = parents.get(code).copied().flatten();
        }
    }
    codes
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role: RoleCode,
    pub granted: usize,
    pub revoked: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleAssignmentReport {
    pub roles: Vec<RoleGrant>,
    /// Seed codes with no active row, e.g. before `seed-permissions` ran.
    pub unknown_codes: BTreeSet<String>,
}

impl RoleAssignmentReport {
    pub fn changed(&self) -> bool {
        self.roles.iter().any(|r| r.granted > 0 || r.revoked > 0)
    }
}

impl fmt::Display for RoleAssignmentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for grant in &self.roles {
            writeln!(
                f,
                "   ✓ {:<10} +{} -{} ({} total)",
                grant.role, grant.granted, grant.revoked, grant.total
            )?;
        }
        if !self.unknown_codes.is_empty() {
            write!(
                f,
                "   ⚠️  {} seed codes have no active permission row",
                self.unknown_codes.len()
            )?;
        }
        Ok(())
    }
}

/// Fails before any write when a role row is missing.
pub(crate) async fn load_roles(pool: &MySqlPool) -> Result<HashMap<RoleCode, RoleId>, OpsError> {
    let rows = sqlx::query_as::<_, Role>("SELECT id, name, code FROM roles")
        .fetch_all(pool)
        .await?;

    let found: HashMap<RoleCode, RoleId> = rows
        .iter()
        .filter_map(|row| row.code.parse::<RoleCode>().ok().map(|code| (code, row.id)))
        .collect();

    let missing: Vec<&str> = RoleCode::ALL
        .iter()
        .filter(|code| !found.contains_key(code))
        .map(RoleCode::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(OpsError::missing(format!("roles not found: {}", missing.join(", "))));
    }
    Ok(found)
}

/// Grants each role exactly the permissions the seed gives it.
#[instrument(skip_all, fields(version = %seed.version))]
pub async fn assign_from_seed(pool: &MySqlPool, seed: &MenuSeed) -> Result<RoleAssignmentReport, OpsError> {
    println!("🔐 Assigning role permissions from seed {}...", seed.version);
    let roles = load_roles(pool).await?;

    let active: Vec<Permission> = sqlx::query_as::<_, Permission>(
        r#"
        SELECT id, name, code, type, parent_id, path, component, icon,
               COALESCE(sort, 0) AS sort, COALESCE(status, 1) AS status
        FROM permissions
        WHERE status = 1
        "#,
    )
    .fetch_all(pool)
    .await?;
    let ids: HashMap<&str, PermissionId> = active.iter().map(|p| (p.code.as_str(), p.id)).collect();
    let flat = seed.flatten();

    let mut report = RoleAssignmentReport::default();
    let mut tx = pool.begin().await?;

    for role in RoleCode::ALL {
        let role_id = roles[&role];
        let wanted: BTreeSet<PermissionId> = if role.receives_all_permissions() {
            active.iter().map(|p| p.id).collect()
        } else {
            codes_for_role(&flat, role)
                .into_iter()
                .filter_map(|code| match ids.get(code.as_str()) {
                    Some(id) => Some(*id),
                    None => {
                        report.unknown_codes.insert(code);
                        None
                    }
                })
                .collect()
        };

        let current: BTreeSet<PermissionId> =
            sqlx::query_scalar::<_, PermissionId>("SELECT permission_id FROM role_permissions WHERE role_id = ?")
                .bind(role_id)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .collect();

        let to_grant: Vec<PermissionId> = wanted.difference(&current).copied().collect();
        let to_revoke: Vec<PermissionId> = current.difference(&wanted).copied().collect();

        for permission_id in &to_grant {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id, created_at, updated_at) \
                 VALUES (?, ?, NOW(), NOW())",
            )
            .bind(role_id)
            .bind(*permission_id)
            .execute(&mut *tx)
            .await?;
        }
        for permission_id in &to_revoke {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = ? AND permission_id = ?")
                .bind(role_id)
                .bind(*permission_id)
                .execute(&mut *tx)
                .await?;
        }

        info!(role = %role, granted = to_grant.len(), revoked = to_revoke.len(), total = wanted.len(), "Role synced");
        report.roles.push(RoleGrant {
            role,
            granted: to_grant.len(),
            revoked: to_revoke.len(),
            total: wanted.len(),
        });
    }

    tx.commit().await?;

    if !report.unknown_codes.is_empty() {
        warn!(codes = ?report.unknown_codes, "Seed codes without an active permission row");
    }
    println!("{}", report);
    Ok(report)
}
