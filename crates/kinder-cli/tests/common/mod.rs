#[allow(unused_imports)]
use kinder_models::{MenuSeed, PermissionId};
use sqlx::MySqlPool;

/// A small menu: two categories, a nested menu and one role split.
#[allow(dead_code)]
pub fn menu_seed() -> MenuSeed {
    MenuSeed::from_json(
        r##"{
            "version": "test",
            "nodes": [
                {"name": "Teaching", "code": "TEACHING_CATEGORY", "type": "category", "path": "#teaching", "sort": 10,
                 "roles": ["principal", "teacher"],
                 "children": [
                    {"name": "Classes", "code": "CLASS_MANAGEMENT", "type": "menu", "path": "/class", "sort": 1,
                     "roles": ["principal", "teacher"],
                     "children": [
                        {"name": "Class detail", "code": "CLASS_DETAIL", "type": "menu", "path": "/class/detail",
                         "roles": ["teacher", "parent"]}
                     ]}
                 ]},
                {"name": "System", "code": "SYSTEM_CATEGORY", "type": "category", "path": "#system", "sort": 90,
                 "children": [
                    {"name": "Users", "code": "SYSTEM_USERS", "type": "menu", "path": "/system/users", "sort": 1},
                    {"name": "Roles", "code": "SYSTEM_ROLES", "type": "menu", "path": "/system/roles", "sort": 2}
                 ]}
            ]
        }"##,
    )
    .unwrap()
}

/// Inserts a raw permission row, bypassing the seeder.
#[allow(dead_code)]
pub async fn insert_permission_row(
    pool: &MySqlPool,
    code: &str,
    kind: &str,
    path: &str,
    parent_id: Option<PermissionId>,
) -> PermissionId {
    let result = sqlx::query(
        "INSERT INTO permissions (name, code, type, parent_id, path, sort, status) VALUES (?, ?, ?, ?, ?, 0, 1)",
    )
    .bind(code)
    .bind(code)
    .bind(kind)
    .bind(parent_id)
    .bind(path)
    .execute(pool)
    .await
    .unwrap();
    PermissionId::new(result.last_insert_id() as i64)
}

#[allow(dead_code)]
pub async fn permission_id(pool: &MySqlPool, code: &str) -> PermissionId {
    sqlx::query_scalar("SELECT id FROM permissions WHERE code = ? ORDER BY id LIMIT 1")
        .bind(code)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[allow(dead_code)]
pub async fn parent_of(pool: &MySqlPool, code: &str) -> Option<PermissionId> {
    sqlx::query_scalar("SELECT parent_id FROM permissions WHERE code = ?")
        .bind(code)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[allow(dead_code)]
pub async fn role_id(pool: &MySqlPool, code: &str) -> i64 {
    sqlx::query_scalar("SELECT id FROM roles WHERE code = ?")
        .bind(code)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Codes granted to `role`, sorted.
#[allow(dead_code)]
pub async fn granted_codes(pool: &MySqlPool, role: &str) -> Vec<String> {
    sqlx::query_scalar(
        r#"
        SELECT p.code FROM role_permissions rp
        JOIN permissions p ON p.id = rp.permission_id
        JOIN roles r ON r.id = rp.role_id
        WHERE r.code = ?
        ORDER BY p.code
        "#,
    )
    .bind(role)
    .fetch_all(pool)
    .await
    .unwrap()
}

#[allow(dead_code)]
pub async fn count(pool: &MySqlPool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

#[allow(dead_code)]
pub async fn create_kindergarten(pool: &MySqlPool) -> i64 {
    sqlx::query("INSERT INTO kindergartens (name) VALUES ('Test Kindergarten')")
        .execute(pool)
        .await
        .unwrap()
        .last_insert_id() as i64
}
