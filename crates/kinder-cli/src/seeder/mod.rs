//! Database seeding and repair.
//!
//! # Module Structure
//!
//! - [`permissions`] - menu/permission tree: reconcile, rebuild, path repair, integrity
//! - [`roles`] - role ↔ permission links derived from the seed tree
//! - [`users`] - administrator and per-role demo accounts
//! - [`demo`] - fake classes, teachers, students and parents
//! - [`engagement`] - demo activities, enrollment and notifications
//! - [`models`] - data structures for seeding configuration
//!
//! # Usage
//!
//! ```ignore
//! use kinder_cli::seeder::{self, RemovalPolicy};
//!
//! let seed = seeder::load_menu_seed("data/menu.json")?;
//! let report = seeder::permissions::reconcile(&pool, &seed, RemovalPolicy::Archive).await?;
//! let links = seeder::roles::assign_from_seed(&pool, &seed).await?;
//! ```
//!
//! Every writer runs inside a single transaction, so a failure part way
//! leaves the tables as they were.

pub mod demo;
pub mod engagement;
pub mod models;
pub mod permissions;
pub mod roles;
pub mod users;

pub use models::{AdminAccount, RosterConfig};
pub use permissions::{IntegrityReport, PathFixReport, RemovalPolicy, SeedPlan, SeedReport};
pub use roles::RoleAssignmentReport;

use kinder_core::OpsError;
use kinder_models::{AssetManifest, MenuSeed};
use std::path::Path;

pub const DEFAULT_MENU_FILE: &str = "data/menu.json";
pub const DEFAULT_ASSET_FILE: &str = "data/game-assets.json";

/// Reads and validates the menu seed tree.
pub fn load_menu_seed(path: impl AsRef<Path>) -> Result<MenuSeed, OpsError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| OpsError::missing(format!("seed file {}: {}", path.display(), e)))?;
    let seed = MenuSeed::from_json(&raw)?;
    tracing::info!(
        file = %path.display(),
        version = %seed.version,
        nodes = seed.node_count(),
        "Loaded menu seed"
    );
    Ok(seed)
}

/// Reads and validates the game asset manifest.
pub fn load_asset_manifest(path: impl AsRef<Path>) -> Result<AssetManifest, OpsError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .map_err(|e| OpsError::missing(format!("asset manifest {}: {}", path.display(), e)))?;
    AssetManifest::from_json(&raw)
}

/// Hashes a password for seeded accounts.
///
/// Demo data uses a low cost since every generated account shares one hash.
pub fn hash_password(password: &str, cost: u32) -> Result<String, OpsError> {
    bcrypt::hash(password, cost)
        .map_err(|e| OpsError::Other(anyhow::anyhow!("Failed to hash password: {}", e)))
}
