//! Menu/permission tree seeding.
//!
//! The default strategy reconciles the `permissions` table with the seed
//! file keyed on `code`: missing rows are inserted, changed rows updated and
//! rows no longer in the seed are kept, archived or pruned. The destructive
//! rebuild is still available for a database that is too far gone to diff.

use kinder_models::{FlatPermission, MenuSeed, Permission, PermissionId, PermissionKind, PermissionStatus};
use kinder_core::OpsError;
use sqlx::{MySqlConnection, MySqlPool};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

const SELECT_PERMISSIONS: &str = r#"
    SELECT id, name, code, type, parent_id, path, component, icon,
           COALESCE(sort, 0) AS sort, COALESCE(status, 1) AS status
    FROM permissions
    ORDER BY id
"#;

const INSERT_PERMISSION: &str = r#"
    INSERT INTO permissions
        (name, code, type, parent_id, path, component, icon, sort, status, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NOW(), NOW())
"#;

const UPDATE_PERMISSION: &str = r#"
    UPDATE permissions
    SET name = ?, type = ?, parent_id = ?, path = ?, component = ?, icon = ?,
        sort = ?, status = ?, updated_at = NOW()
    WHERE id = ?
"#;

/// What happens to rows whose code is no longer in the seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemovalPolicy {
    /// Leave them untouched.
    Keep,
    /// Set `status = 0` so menus hide the row. The next role assignment
    /// drops its links, so restoring it means assigning roles again.
    #[default]
    Archive,
    /// Delete them with their role links; children move up one level.
    Prune,
}

impl FromStr for RemovalPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(Self::Keep),
            "archive" => Ok(Self::Archive),
            "prune" => Ok(Self::Prune),
            other => Err(format!("unknown removal policy '{}'", other)),
        }
    }
}

/// Difference between the table and the seed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeedPlan {
    /// Missing codes, parents before children.
    pub create: Vec<FlatPermission>,
    pub update: Vec<(PermissionId, FlatPermission)>,
    pub unchanged: usize,
    /// Rows whose code the seed no longer lists.
    pub removed: Vec<Permission>,
    /// Extra rows sharing a code, each with the lowest-id row it folds into.
    pub duplicates: Vec<(Permission, PermissionId)>,
}

impl SeedPlan {
    pub fn is_noop(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.duplicates.is_empty()
    }
}

fn differs(row: &Permission, wanted: &FlatPermission, parent_code: Option<&str>) -> bool {
    row.name != wanted.name
        || row.kind != wanted.kind
        || row.path.as_deref() != Some(wanted.path.as_str())
        || row.component != wanted.component
        || row.icon != wanted.icon
        || row.sort != wanted.sort
        || !row.is_active()
        || parent_code != wanted.parent_code.as_deref()
}

/// Pure diff of `existing` rows against the flattened seed.
///
/// When a code appears more than once the lowest id is the row that is
/// diffed; the others are listed in [`SeedPlan::duplicates`].
pub fn plan(existing: &[Permission], desired: &[FlatPermission]) -> SeedPlan {
    let mut plan = SeedPlan::default();
    let mut by_code: HashMap<&str, &Permission> = HashMap::with_capacity(existing.len());
    let mut rows: Vec<&Permission> = existing.iter().collect();
    rows.sort_by_key(|row| row.id);
    for row in rows {
        match by_code.get(row.code.as_str()) {
            Some(kept) => plan.duplicates.push((row.clone(), kept.id)),
            None => {
                by_code.insert(row.code.as_str(), row);
            }
        }
    }
    let code_of: HashMap<PermissionId, &str> = existing.iter().map(|p| (p.id, p.code.as_str())).collect();

    for wanted in desired {
        match by_code.get(wanted.code.as_str()) {
            None => plan.create.push(wanted.clone()),
            Some(row) => {
                let parent_code = row.parent_id.and_then(|id| code_of.get(&id).copied());
                if differs(row, wanted, parent_code) {
                    plan.update.push((row.id, wanted.clone()));
                } else {
                    plan.unchanged += 1;
                }
            }
        }
    }

    let wanted_codes: HashSet<&str> = desired.iter().map(|d| d.code.as_str()).collect();
    let mut removed: Vec<Permission> = by_code
        .into_values()
        .filter(|row| !wanted_codes.contains(row.code.as_str()))
        .cloned()
        .collect();
    removed.sort_by_key(|row| row.id);
    plan.removed = removed;

    plan
}

/// Structural problems in the `permissions` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    /// Codes whose `parent_id` points at no row.
    pub dangling_parents: Vec<String>,
    pub duplicate_codes: Vec<String>,
    /// Categories whose parent is a menu entry.
    pub non_category_parents: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.dangling_parents.is_empty() && self.duplicate_codes.is_empty() && self.non_category_parents.is_empty()
    }

    /// Problems present here that `before` did not have.
    pub fn introduced_since(&self, before: &IntegrityReport) -> IntegrityReport {
        let new = |now: &[String], then: &[String]| -> Vec<String> {
            now.iter().filter(|code| !then.contains(code)).cloned().collect()
        };
        IntegrityReport {
            dangling_parents: new(&self.dangling_parents, &before.dangling_parents),
            duplicate_codes: new(&self.duplicate_codes, &before.duplicate_codes),
            non_category_parents: new(&self.non_category_parents, &before.non_category_parents),
        }
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return write!(f, "✅ Permission tree is consistent");
        }
        writeln!(f, "⚠️  Permission tree has problems:")?;
        for (label, codes) in [
            ("dangling parent_id", &self.dangling_parents),
            ("duplicate code", &self.duplicate_codes),
            ("category under menu", &self.non_category_parents),
        ] {
            if !codes.is_empty() {
                writeln!(f, "   - {} ({}): {}", label, codes.len(), codes.join(", "))?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub archived: usize,
    pub pruned: usize,
    /// Removed codes left in place under [`RemovalPolicy::Keep`].
    pub kept: usize,
    /// Duplicate rows folded into the row that keeps their code.
    pub merged: usize,
    pub integrity: IntegrityReport,
}

impl fmt::Display for SeedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "   ✓ {} created, {} updated, {} unchanged",
            self.created, self.updated, self.unchanged
        )?;
        writeln!(
            f,
            "   ✓ removed codes: {} archived, {} pruned, {} kept",
            self.archived, self.pruned, self.kept
        )?;
        if self.merged > 0 {
            writeln!(f, "   ✓ {} duplicate rows merged", self.merged)?;
        }
        write!(f, "{}", self.integrity)
    }
}

async fn load_permissions(conn: &mut MySqlConnection) -> Result<Vec<Permission>, sqlx::Error> {
    sqlx::query_as::<_, Permission>(SELECT_PERMISSIONS)
        .fetch_all(&mut *conn)
        .await
}

async fn insert_permission(
    conn: &mut MySqlConnection,
    entry: &FlatPermission,
    parent_id: Option<PermissionId>,
) -> Result<PermissionId, sqlx::Error> {
    let result = sqlx::query(INSERT_PERMISSION)
        .bind(&entry.name)
        .bind(&entry.code)
        .bind(entry.kind)
        .bind(parent_id)
        .bind(&entry.path)
        .bind(&entry.component)
        .bind(&entry.icon)
        .bind(entry.sort)
        .bind(PermissionStatus::ACTIVE)
        .execute(&mut *conn)
        .await?;
    Ok(PermissionId::new(result.last_insert_id() as i64))
}

fn resolve_parent(
    entry: &FlatPermission,
    ids: &HashMap<String, PermissionId>,
) -> Result<Option<PermissionId>, OpsError> {
    match &entry.parent_code {
        None => Ok(None),
        Some(code) => ids.get(code).copied().map(Some).ok_or_else(|| {
            OpsError::invalid_seed(format!("parent '{}' of '{}' was not written first", code, entry.code))
        }),
    }
}

/// Brings the table in line with the seed in one transaction.
#[instrument(skip_all, fields(version = %seed.version, policy = ?policy))]
pub async fn reconcile(pool: &MySqlPool, seed: &MenuSeed, policy: RemovalPolicy) -> Result<SeedReport, OpsError> {
    let start_time = Instant::now();
    let desired = seed.flatten();
    println!("🌱 Reconciling {} permissions (seed {})...", desired.len(), seed.version);

    let mut tx = pool.begin().await?;
    let existing = load_permissions(&mut tx).await?;
    let plan = plan(&existing, &desired);

    info!(
        create = plan.create.len(),
        update = plan.update.len(),
        unchanged = plan.unchanged,
        removed = plan.removed.len(),
        duplicates = plan.duplicates.len(),
        "Permission plan computed"
    );

    let mut report = SeedReport {
        unchanged: plan.unchanged,
        ..SeedReport::default()
    };

    // Duplicates go first so parent lookups below only ever see one id per code.
    for (extra, kept) in &plan.duplicates {
        merge_duplicate(&mut tx, extra.id, *kept).await?;
        warn!(code = %extra.code, duplicate = %extra.id, kept = %kept, "Duplicate permission merged");
        report.merged += 1;
    }

    let mut ids: HashMap<String, PermissionId> = HashMap::with_capacity(existing.len());
    for row in &existing {
        if !plan.duplicates.iter().any(|(extra, _)| extra.id == row.id) {
            ids.insert(row.code.clone(), row.id);
        }
    }

    for entry in &plan.create {
        let parent_id = resolve_parent(entry, &ids)?;
        let id = insert_permission(&mut tx, entry, parent_id).await?;
        debug!(code = %entry.code, id = %id, "Permission created");
        ids.insert(entry.code.clone(), id);
        report.created += 1;
    }

    for (id, entry) in &plan.update {
        let parent_id = resolve_parent(entry, &ids)?;
        sqlx::query(UPDATE_PERMISSION)
            .bind(&entry.name)
            .bind(entry.kind)
            .bind(parent_id)
            .bind(&entry.path)
            .bind(&entry.component)
            .bind(&entry.icon)
            .bind(entry.sort)
            .bind(PermissionStatus::ACTIVE)
            .bind(*id)
            .execute(&mut *tx)
            .await?;
        debug!(code = %entry.code, "Permission updated");
        report.updated += 1;
    }

    match policy {
        RemovalPolicy::Keep => report.kept = plan.removed.len(),
        RemovalPolicy::Archive => {
            for row in plan.removed.iter().filter(|row| row.is_active()) {
                sqlx::query("UPDATE permissions SET status = ?, updated_at = NOW() WHERE id = ?")
                    .bind(PermissionStatus::ARCHIVED)
                    .bind(row.id)
                    .execute(&mut *tx)
                    .await?;
                report.archived += 1;
            }
        }
        RemovalPolicy::Prune => {
            for row in &plan.removed {
                if remove_permission(&mut tx, row.id).await? {
                    report.pruned += 1;
                }
            }
        }
    }

    report.integrity = verify_on(&mut tx).await?;
    tx.commit().await?;

    if !report.integrity.is_clean() {
        warn!(integrity = ?report.integrity, "Permission tree inconsistent after reconcile");
    }
    println!("{}", report);
    println!("✅ Reconciled in {:?}", start_time.elapsed());
    Ok(report)
}

/// Deletes one row and its role links; its children take over its parent.
///
/// The parent is read at removal time because earlier removals in the same
/// transaction may have moved this row. Returns `false` if the row is gone.
async fn remove_permission(conn: &mut MySqlConnection, id: PermissionId) -> Result<bool, sqlx::Error> {
    let Some(parent_id) =
        sqlx::query_scalar::<_, Option<PermissionId>>("SELECT parent_id FROM permissions WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
    else {
        return Ok(false);
    };

    sqlx::query("UPDATE permissions SET parent_id = ?, updated_at = NOW() WHERE parent_id = ?")
        .bind(parent_id)
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM role_permissions WHERE permission_id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM permissions WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(true)
}

/// Folds `extra` into `kept`: role links and children move over, then the
/// extra row is removed.
async fn merge_duplicate(conn: &mut MySqlConnection, extra: PermissionId, kept: PermissionId) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT IGNORE INTO role_permissions (role_id, permission_id, created_at, updated_at)
        SELECT role_id, ?, NOW(), NOW() FROM role_permissions WHERE permission_id = ?
        "#,
    )
    .bind(kept)
    .bind(extra)
    .execute(&mut *conn)
    .await?;
    sqlx::query("UPDATE permissions SET parent_id = ?, updated_at = NOW() WHERE parent_id = ? AND id <> ?")
        .bind(kept)
        .bind(extra)
        .bind(kept)
        .execute(&mut *conn)
        .await?;
    // If `kept` itself sat under `extra`, removal lifts it to `extra`'s parent.
    remove_permission(conn, extra).await?;
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub deleted_links: u64,
    pub deleted_permissions: u64,
    pub inserted: usize,
    pub integrity: IntegrityReport,
}

/// Deletes every permission and role link, then inserts the seed tree.
///
/// Role links are gone afterwards; follow with
/// [`assign_from_seed`](super::roles::assign_from_seed).
#[instrument(skip_all, fields(version = %seed.version))]
pub async fn rebuild(pool: &MySqlPool, seed: &MenuSeed) -> Result<RebuildReport, OpsError> {
    let start_time = Instant::now();
    let desired = seed.flatten();
    println!("🗑️  Rebuilding permission tree from seed {}...", seed.version);

    let mut tx = pool.begin().await?;
    let mut report = RebuildReport {
        deleted_links: sqlx::query("DELETE FROM role_permissions")
            .execute(&mut *tx)
            .await?
            .rows_affected(),
        ..RebuildReport::default()
    };
    sqlx::query("UPDATE permissions SET parent_id = NULL")
        .execute(&mut *tx)
        .await?;
    report.deleted_permissions = sqlx::query("DELETE FROM permissions")
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let mut ids = HashMap::with_capacity(desired.len());
    for entry in &desired {
        let parent_id = resolve_parent(entry, &ids)?;
        let id = insert_permission(&mut tx, entry, parent_id).await?;
        ids.insert(entry.code.clone(), id);
        report.inserted += 1;
    }

    report.integrity = verify_on(&mut tx).await?;
    if !report.integrity.is_clean() {
        tx.rollback().await?;
        return Err(OpsError::invalid_seed(format!(
            "rebuild left an inconsistent tree, rolled back: {:?}",
            report.integrity
        )));
    }
    tx.commit().await?;

    println!(
        "   ✓ Deleted {} permissions and {} role links",
        report.deleted_permissions, report.deleted_links
    );
    println!("   ✓ Inserted {} permissions in {:?}", report.inserted, start_time.elapsed());
    Ok(report)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathFixReport {
    /// `(from, to, rows)` for every mapping that matched something.
    pub renamed: Vec<(String, String, u64)>,
    /// Codes of rows deleted for carrying an invalid path.
    pub removed: Vec<String>,
    /// Tree state after the fixes, checked before commit.
    pub integrity: IntegrityReport,
}

impl PathFixReport {
    pub fn changed(&self) -> bool {
        !self.renamed.is_empty() || !self.removed.is_empty()
    }
}

#[derive(sqlx::FromRow)]
struct PathRow {
    id: PermissionId,
    code: String,
}

/// Rewrites stale menu paths and removes entries that point nowhere.
///
/// Rolls back if the fixes leave the tree with a problem it did not have
/// before.
#[instrument(skip_all)]
pub async fn fix_paths(pool: &MySqlPool, seed: &MenuSeed) -> Result<PathFixReport, OpsError> {
    println!(
        "🔧 Applying {} path fixes and removing {} invalid paths...",
        seed.path_fixes.len(),
        seed.invalid_paths.len()
    );

    let mut tx = pool.begin().await?;
    let before = verify_on(&mut tx).await?;
    let mut report = PathFixReport::default();

    for (from, to) in &seed.path_fixes {
        let rows = sqlx::query("UPDATE permissions SET path = ?, updated_at = NOW() WHERE path = ?")
            .bind(to)
            .bind(from)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if rows > 0 {
            println!("   ✓ {} → {} ({} rows)", from, to, rows);
            report.renamed.push((from.clone(), to.clone(), rows));
        }
    }

    for path in &seed.invalid_paths {
        let rows = sqlx::query_as::<_, PathRow>("SELECT id, code FROM permissions WHERE path = ? ORDER BY id")
            .bind(path)
            .fetch_all(&mut *tx)
            .await?;
        for row in rows {
            if remove_permission(&mut tx, row.id).await? {
                println!("   ✓ Removed {} ({})", row.code, path);
                report.removed.push(row.code);
            }
        }
    }

    report.integrity = verify_on(&mut tx).await?;
    let introduced = report.integrity.introduced_since(&before);
    if !introduced.is_clean() {
        tx.rollback().await?;
        return Err(OpsError::invalid_seed(format!(
            "path fixes left an inconsistent tree, rolled back: {:?}",
            introduced
        )));
    }
    tx.commit().await?;
    if !report.changed() {
        println!("   ✓ Nothing to fix");
    }
    Ok(report)
}

async fn verify_on(conn: &mut MySqlConnection) -> Result<IntegrityReport, sqlx::Error> {
    let dangling_parents = sqlx::query_scalar::<_, String>(
        r#"
        SELECT c.code FROM permissions c
        LEFT JOIN permissions p ON p.id = c.parent_id
        WHERE c.parent_id IS NOT NULL AND p.id IS NULL
        ORDER BY c.code
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let duplicate_codes = sqlx::query_scalar::<_, String>(
        "SELECT code FROM permissions GROUP BY code HAVING COUNT(*) > 1 ORDER BY code",
    )
    .fetch_all(&mut *conn)
    .await?;

    let non_category_parents = sqlx::query_scalar::<_, String>(
        r#"
        SELECT c.code FROM permissions c
        JOIN permissions p ON p.id = c.parent_id
        WHERE c.type = ? AND p.type = ?
        ORDER BY c.code
        "#,
    )
    .bind(PermissionKind::Category)
    .bind(PermissionKind::Menu)
    .fetch_all(&mut *conn)
    .await?;

    Ok(IntegrityReport {
        dangling_parents,
        duplicate_codes,
        non_category_parents,
    })
}

/// Checks the table for structural problems.
pub async fn verify(pool: &MySqlPool) -> Result<IntegrityReport, OpsError> {
    let mut conn = pool.acquire().await?;
    Ok(verify_on(&mut conn).await?)
}
