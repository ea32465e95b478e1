//! # Kinder Models
//!
//! Row types for the application tables tooling reads and writes, plus the
//! schemas of the versioned seed files under `data/`.
//!
//! # Modules
//!
//! - [`ids`]: strongly-typed integer ids
//! - [`permissions`]: `permissions` rows and the permission kind
//! - [`roles`]: `roles` and `role_permissions` rows
//! - [`assessment`]: assessment questions carrying generated media
//! - [`ai_models`]: provider configuration rows from `ai_model_configs`
//! - [`seed`]: the menu/permission seed tree
//! - [`assets`]: the game asset manifest

pub mod ai_models;
pub mod assessment;
pub mod assets;
pub mod ids;
pub mod permissions;
pub mod roles;
pub mod seed;

pub use ai_models::{AiModelConfig, ModelType};
pub use assessment::AssessmentQuestion;
pub use assets::{AssetManifest, AudioAsset, ImageAsset};
pub use ids::{
    ClassId, ParentId, PermissionId, QuestionId, RoleId, StudentId, TeacherId, UserId,
};
pub use permissions::{Permission, PermissionKind, PermissionStatus};
pub use roles::{Role, RolePermission};
pub use seed::{FlatPermission, MenuSeed, PermissionNode};
