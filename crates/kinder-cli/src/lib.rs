//! # kinder-cli
//!
//! Operational tooling for the kindergarten platform: permission seeding
//! and repair, role assignment, demo accounts and rosters.
//!
//! The binary in `main.rs` wires these to the cache and media crates.
//!
//! ```ignore
//! use kinder_cli::seeder::{self, RemovalPolicy};
//!
//! let seed = seeder::load_menu_seed(seeder::DEFAULT_MENU_FILE)?;
//! seeder::permissions::reconcile(&pool, &seed, RemovalPolicy::Archive).await?;
//! ```

pub mod seeder;
