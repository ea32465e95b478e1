use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use dialoguer::{Input, Password};
use dotenvy::dotenv;
use kinder_cache::keys::{invalidate, locks};
use kinder_cache::{CacheConfig, DistributedLock, LockGuard, RedisCache};
use kinder_cli::seeder::{self, AdminAccount, RemovalPolicy, RosterConfig};
use kinder_config::{AiProviderConfig, DatabaseConfig, MediaConfig, ThrottleConfig, UploadsConfig};
use kinder_core::LocalFileStorage;
use kinder_db::{MySqlPool, init_db_pool};
use kinder_media::generators;
use kinder_media::{
    BatchThrottle, ImageClient, ImagePostProcess, MediaContext, MediaError, ModelResolver, ProviderEndpoint,
    RetryPolicy, TtsClient, VideoTranscode,
};
use kinder_models::ModelType;
use kinder_observability::{LoggingConfig, init_logging};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// How long a seeding run may hold the Redis lock.
const SEED_LOCK_TTL: Duration = Duration::from_secs(600);

#[derive(Parser)]
#[command(name = "kinder-cli")]
#[command(about = "kinder-ops - seeding, repair and asset generation for the kindergarten platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct ThrottleArgs {
    /// Items processed concurrently per batch
    #[arg(long)]
    batch_size: Option<usize>,

    /// Pause between batches in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Token-bucket rate for provider calls
    #[arg(long)]
    per_second: Option<u32>,

    /// Token-bucket burst size
    #[arg(long, requires = "per_second")]
    burst: Option<u32>,
}

impl ThrottleArgs {
    fn apply(&self, mut config: ThrottleConfig) -> ThrottleConfig {
        if let Some(batch_size) = self.batch_size {
            config = config.with_batch_size(batch_size);
        }
        if let Some(delay_ms) = self.delay_ms {
            config = config.with_delay_ms(delay_ms);
        }
        if self.per_second.is_some() {
            config = config.with_pacing(self.per_second, self.burst);
        }
        config
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Strategy {
    /// Upsert by code
    #[default]
    Reconcile,
    /// Delete everything and reinsert
    Rebuild,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Removed {
    Keep,
    #[default]
    Archive,
    Prune,
}

impl From<Removed> for RemovalPolicy {
    fn from(value: Removed) -> Self {
        match value {
            Removed::Keep => RemovalPolicy::Keep,
            Removed::Archive => RemovalPolicy::Archive,
            Removed::Prune => RemovalPolicy::Prune,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create an administrator account
    CreateAdmin {
        #[arg(short = 'u', long)]
        username: Option<String>,

        #[arg(short = 'e', long)]
        email: Option<String>,

        #[arg(short = 'n', long)]
        name: Option<String>,

        /// Password (will be prompted securely if not provided)
        #[arg(short = 'p', long)]
        password: Option<String>,
    },
    /// Bring the permission tree in line with the menu seed
    SeedPermissions {
        #[arg(long, value_enum, default_value_t = Strategy::Reconcile)]
        strategy: Strategy,

        /// What to do with codes the seed no longer lists
        #[arg(long, value_enum, default_value_t = Removed::Archive)]
        removed: Removed,

        #[arg(long, default_value = seeder::DEFAULT_MENU_FILE)]
        file: PathBuf,
    },
    /// Rewrite stale menu paths and drop entries with invalid paths
    FixMenuPaths {
        #[arg(long, default_value = seeder::DEFAULT_MENU_FILE)]
        file: PathBuf,
    },
    /// Sync role_permissions with the roles listed in the menu seed
    AssignRolePermissions {
        #[arg(long, default_value = seeder::DEFAULT_MENU_FILE)]
        file: PathBuf,
    },
    /// Report structural problems in the permission tree
    VerifyPermissions,
    /// Create one demo account per role
    SeedDemoUsers {
        #[arg(long, env = "DEMO_PASSWORD", default_value = "Demo@123456")]
        password: String,
    },
    /// Seed fake classes, teachers, students and parents
    SeedDemoData {
        #[arg(long, default_value = "6")]
        classes: usize,

        #[arg(long, default_value = "2")]
        teachers: usize,

        /// Students per class
        #[arg(long, default_value = "24")]
        students: usize,
    },
    /// Seed demo activities, enrollment plans, applications and notifications
    SeedDemoActivities,
    /// Remove the generated demo roster and demo activities
    ClearDemoData,
    /// Create the indexes hot queries rely on
    OptimizeIndexes,
    /// Generate illustrations for assessment questions
    GenerateQuestionImages {
        #[command(flatten)]
        throttle: ThrottleArgs,

        /// Stop after this many questions
        #[arg(long)]
        limit: Option<usize>,

        /// Store images as delivered, without crop/scale
        #[arg(long)]
        no_post_process: bool,
    },
    /// Generate narration for assessment questions
    GenerateQuestionAudio {
        #[command(flatten)]
        throttle: ThrottleArgs,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        voice: Option<String>,
    },
    /// Generate game art and narration from the asset manifest
    GenerateGameAssets {
        #[command(flatten)]
        throttle: ThrottleArgs,

        #[arg(long, default_value = seeder::DEFAULT_ASSET_FILE)]
        file: PathBuf,

        /// Only this game
        #[arg(long)]
        game: Option<String>,

        #[arg(long, conflicts_with = "audio_only")]
        images_only: bool,

        #[arg(long)]
        audio_only: bool,

        #[arg(long)]
        no_post_process: bool,
    },
    /// Re-encode a video to H.264/AAC with a duration ceiling
    TranscodeVideo {
        input: PathBuf,
        output: PathBuf,

        #[arg(long)]
        max_seconds: Option<u32>,
    },
    /// Exercise Redis data types, pub/sub and locking
    RedisCheck,
    /// Exercise the session storage layout
    SessionCheck,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging(&LoggingConfig::from_env());

    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Runs one command; `Ok(false)` means it finished but found problems.
async fn run(command: Commands) -> anyhow::Result<bool> {
    match command {
        Commands::CreateAdmin {
            username,
            email,
            name,
            password,
        } => handle_create_admin(username, email, name, password).await,
        Commands::SeedPermissions {
            strategy,
            removed,
            file,
        } => handle_seed_permissions(strategy, removed.into(), file).await,
        Commands::FixMenuPaths { file } => handle_fix_menu_paths(file).await,
        Commands::AssignRolePermissions { file } => handle_assign_role_permissions(file).await,
        Commands::VerifyPermissions => handle_verify_permissions().await,
        Commands::SeedDemoUsers { password } => {
            let pool = connect_db().await?;
            seeder::users::seed_demo_users(&pool, &password).await?;
            Ok(true)
        }
        Commands::SeedDemoData {
            classes,
            teachers,
            students,
        } => {
            let pool = connect_db().await?;
            let config = RosterConfig {
                classes,
                teachers_per_class: teachers,
                students_per_class: students,
                ..RosterConfig::default()
            };
            seeder::demo::seed_demo_roster(&pool, &config).await?;
            Ok(true)
        }
        Commands::SeedDemoActivities => {
            let pool = connect_db().await?;
            seeder::engagement::seed_demo_engagement(&pool).await?;
            Ok(true)
        }
        Commands::ClearDemoData => {
            let pool = connect_db().await?;
            seeder::engagement::clear_demo_engagement(&pool).await?;
            seeder::demo::clear_demo_roster(&pool).await?;
            Ok(true)
        }
        Commands::OptimizeIndexes => handle_optimize_indexes().await,
        Commands::GenerateQuestionImages {
            throttle,
            limit,
            no_post_process,
        } => handle_question_images(throttle, limit, no_post_process).await,
        Commands::GenerateQuestionAudio { throttle, limit, voice } => {
            handle_question_audio(throttle, limit, voice).await
        }
        Commands::GenerateGameAssets {
            throttle,
            file,
            game,
            images_only,
            audio_only,
            no_post_process,
        } => handle_game_assets(throttle, file, game, images_only, audio_only, no_post_process).await,
        Commands::TranscodeVideo {
            input,
            output,
            max_seconds,
        } => {
            let media = MediaConfig::from_env();
            let mut step = VideoTranscode::from_config(&media);
            if let Some(max_seconds) = max_seconds {
                step.max_seconds = max_seconds;
            }
            println!("🎬 Transcoding {} (max {}s)...", input.display(), step.max_seconds);
            step.transcode(&media.ffmpeg_bin, &input, &output).await?;
            println!("✅ Wrote {}", output.display());
            Ok(true)
        }
        Commands::RedisCheck => {
            let cache = connect_cache().await.context("Redis is required for this check")?;
            println!("🔍 Running Redis checks...");
            let report = kinder_cache::run_cache_checks(&cache).await;
            println!("{}", report);
            Ok(report.is_success())
        }
        Commands::SessionCheck => {
            let cache = connect_cache().await.context("Redis is required for this check")?;
            println!("🔍 Running session checks...");
            let report = kinder_cache::run_session_checks(&cache).await;
            println!("{}", report);
            Ok(report.is_success())
        }
    }
}

async fn connect_db() -> anyhow::Result<MySqlPool> {
    let config = DatabaseConfig::from_env()?;
    init_db_pool(&config)
        .await
        .context("Failed to connect to database")
}

async fn connect_cache() -> anyhow::Result<RedisCache> {
    let config = CacheConfig::from_env();
    let cache = tokio::time::timeout(Duration::from_secs(5), RedisCache::from_config(&config))
        .await
        .context("Timed out connecting to Redis")??;
    Ok(cache)
}

/// Redis is optional for seeding: without it there is no lock and cached
/// permissions expire on their own.
async fn optional_cache() -> Option<RedisCache> {
    match connect_cache().await {
        Ok(cache) => Some(cache),
        Err(e) => {
            warn!(error = %e, "Redis unavailable; continuing without lock and cache invalidation");
            None
        }
    }
}

async fn take_seed_lock(cache: Option<&RedisCache>) -> anyhow::Result<Option<LockGuard>> {
    let Some(cache) = cache else { return Ok(None) };
    match DistributedLock::acquire(cache, locks::SEED_PERMISSIONS, SEED_LOCK_TTL).await? {
        Some(guard) => Ok(Some(guard)),
        None => bail!("another seeding run holds {}", cache.key(&locks::lock(locks::SEED_PERMISSIONS))),
    }
}

async fn release_seed_lock(guard: Option<LockGuard>) {
    if let Some(guard) = guard {
        if let Err(e) = guard.release().await {
            warn!(error = %e, "Failed to release seed lock");
        }
    }
}

async fn handle_create_admin(
    username: Option<String>,
    email: Option<String>,
    name: Option<String>,
    password: Option<String>,
) -> anyhow::Result<bool> {
    let username = match username {
        Some(v) => v,
        None => Input::new().with_prompt("Username").interact_text()?,
    };
    let email = match email {
        Some(v) => v,
        None => Input::new().with_prompt("Email address").interact_text()?,
    };
    let real_name = match name {
        Some(v) => v,
        None => Input::new().with_prompt("Full name").interact_text()?,
    };
    let password = match password {
        Some(v) => v,
        None => Password::new()
            .with_prompt("Password")
            .with_confirmation("Confirm password", "Passwords don't match")
            .interact()?,
    };

    let pool = connect_db().await?;
    let account = AdminAccount {
        username,
        email,
        real_name,
        password,
    };
    let user_id = seeder::users::create_admin(&pool, &account).await?;

    println!("\n✅ Administrator created successfully!");
    println!("   Id: {}", user_id);
    println!("   Username: {}", account.username);
    println!("   Email: {}", account.email);
    Ok(true)
}

async fn handle_seed_permissions(strategy: Strategy, removed: RemovalPolicy, file: PathBuf) -> anyhow::Result<bool> {
    let seed = seeder::load_menu_seed(&file)?;
    let pool = connect_db().await?;
    let cache = optional_cache().await;
    let guard = take_seed_lock(cache.as_ref()).await?;

    let outcome = async {
        match strategy {
            Strategy::Reconcile => {
                let report = seeder::permissions::reconcile(&pool, &seed, removed).await?;
                Ok::<_, anyhow::Error>(report.integrity.is_clean())
            }
            Strategy::Rebuild => {
                let report = seeder::permissions::rebuild(&pool, &seed).await?;
                // Rebuild drops every role link.
                seeder::roles::assign_from_seed(&pool, &seed).await?;
                Ok(report.integrity.is_clean())
            }
        }
    }
    .await;

    release_seed_lock(guard).await;
    invalidate::all_permissions(cache.as_ref()).await;
    outcome
}

async fn handle_fix_menu_paths(file: PathBuf) -> anyhow::Result<bool> {
    let seed = seeder::load_menu_seed(&file)?;
    let pool = connect_db().await?;
    let cache = optional_cache().await;
    let guard = take_seed_lock(cache.as_ref()).await?;

    let outcome = seeder::permissions::fix_paths(&pool, &seed).await;
    release_seed_lock(guard).await;

    let report = outcome?;
    if report.changed() {
        invalidate::all_permissions(cache.as_ref()).await;
    }
    println!("{}", report.integrity);
    Ok(report.integrity.is_clean())
}

async fn handle_assign_role_permissions(file: PathBuf) -> anyhow::Result<bool> {
    let seed = seeder::load_menu_seed(&file)?;
    let pool = connect_db().await?;
    let cache = optional_cache().await;
    let guard = take_seed_lock(cache.as_ref()).await?;

    let outcome = seeder::roles::assign_from_seed(&pool, &seed).await;
    release_seed_lock(guard).await;

    let report = outcome?;
    if report.changed() {
        for grant in report.roles.iter().filter(|g| g.granted > 0 || g.revoked > 0) {
            invalidate::role(cache.as_ref(), grant.role.as_str()).await;
        }
        invalidate::all_permissions(cache.as_ref()).await;
    }
    Ok(true)
}

async fn handle_verify_permissions() -> anyhow::Result<bool> {
    let pool = connect_db().await?;
    let report = seeder::permissions::verify(&pool).await?;
    println!("{}", report);
    Ok(report.is_clean())
}

async fn handle_optimize_indexes() -> anyhow::Result<bool> {
    let pool = connect_db().await?;
    println!("⚡ Creating recommended indexes...");
    let report = kinder_db::indexes::optimize_indexes(&pool).await;

    println!("   ✓ {} created, {} already present", report.created.len(), report.existing.len());
    for (name, error) in &report.failed {
        println!("   ❌ {}: {}", name, error);
    }
    Ok(report.is_success())
}

struct MediaSetup {
    ctx: MediaContext,
    ai: AiProviderConfig,
}

fn media_setup(throttle: &ThrottleArgs, post_process: bool) -> anyhow::Result<MediaSetup> {
    let uploads = UploadsConfig::from_env();
    let media = MediaConfig::from_env();
    let ai = AiProviderConfig::from_env();
    let throttle = throttle.apply(ThrottleConfig::from_env());

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .context("Failed to build HTTP client")?;

    println!(
        "⚙️  Batches of {} with {}ms between batches{}",
        throttle.batch_size,
        throttle.delay_ms,
        throttle
            .per_second
            .map(|rate| format!(", paced at {}/s", rate))
            .unwrap_or_default()
    );

    let ctx = MediaContext {
        storage: LocalFileStorage::new(uploads.dir.clone(), uploads.url_prefix.clone()),
        http,
        throttle: BatchThrottle::from_config(&throttle),
        download_timeout: uploads.download_timeout(),
        post_process: post_process.then(|| ImagePostProcess::from_config(&media)),
        ffmpeg_bin: media.ffmpeg_bin.clone(),
        image_size: ai.image_size.clone(),
    };
    Ok(MediaSetup { ctx, ai })
}

/// Database row when a pool is available, environment settings otherwise.
async fn resolve_endpoint(
    resolver: &ModelResolver,
    pool: Option<&MySqlPool>,
    kind: ModelType,
) -> Result<ProviderEndpoint, MediaError> {
    match pool {
        Some(pool) => resolver.resolve(pool, kind).await,
        None if resolver.fallback().api_key.is_some() => Ok(resolver.fallback_endpoint(kind)),
        None => Err(MediaError::MissingModel(kind.as_str())),
    }
}

async fn handle_question_images(
    throttle: ThrottleArgs,
    limit: Option<usize>,
    no_post_process: bool,
) -> anyhow::Result<bool> {
    let pool = connect_db().await?;
    let MediaSetup { ctx, ai } = media_setup(&throttle, !no_post_process)?;
    let resolver = ModelResolver::new(ai.clone());

    let endpoint = resolve_endpoint(&resolver, Some(&pool), ModelType::Image).await?;
    let client = ImageClient::new(ctx.http.clone(), endpoint, RetryPolicy::from_config(&ai));

    println!("🖼️  Generating question images...");
    let summary = generators::question_images(&pool, &ctx, &client, limit).await?;
    println!("{}", summary);
    Ok(summary.is_clean())
}

async fn handle_question_audio(
    throttle: ThrottleArgs,
    limit: Option<usize>,
    voice: Option<String>,
) -> anyhow::Result<bool> {
    let pool = connect_db().await?;
    let MediaSetup { ctx, ai } = media_setup(&throttle, false)?;
    let resolver = ModelResolver::new(ai.clone());

    let endpoint = resolve_endpoint(&resolver, Some(&pool), ModelType::Speech).await?;
    let client = TtsClient::new(ctx.http.clone(), endpoint, ai.tts_voice.clone(), RetryPolicy::from_config(&ai));

    println!("🔊 Generating question audio...");
    let summary = generators::question_audio(&pool, &ctx, &client, voice.as_deref(), limit).await?;
    println!("{}", summary);
    Ok(summary.is_clean())
}

async fn handle_game_assets(
    throttle: ThrottleArgs,
    file: PathBuf,
    game: Option<String>,
    images_only: bool,
    audio_only: bool,
    no_post_process: bool,
) -> anyhow::Result<bool> {
    let mut manifest = seeder::load_asset_manifest(&file)?;
    if let Some(game) = &game {
        manifest = manifest.for_game(game);
        if manifest.images.is_empty() && manifest.audio.is_empty() {
            bail!("no assets for game '{}' in {}", game, file.display());
        }
    }

    let MediaSetup { ctx, ai } = media_setup(&throttle, !no_post_process)?;
    let resolver = ModelResolver::new(ai.clone());
    // Model rows live in the database, but game assets can run without it.
    let pool = match DatabaseConfig::from_env() {
        Ok(config) => match init_db_pool(&config).await {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!(error = %e, "Database unavailable; using AI settings from the environment");
                None
            }
        },
        Err(_) => None,
    };

    let images = if audio_only {
        None
    } else {
        let endpoint = resolve_endpoint(&resolver, pool.as_ref(), ModelType::Image).await?;
        Some(ImageClient::new(ctx.http.clone(), endpoint, RetryPolicy::from_config(&ai)))
    };
    let tts = if images_only {
        None
    } else {
        let endpoint = resolve_endpoint(&resolver, pool.as_ref(), ModelType::Speech).await?;
        Some(TtsClient::new(
            ctx.http.clone(),
            endpoint,
            ai.tts_voice.clone(),
            RetryPolicy::from_config(&ai),
        ))
    };

    println!(
        "🎮 Generating {} images and {} audio clips...",
        manifest.images.len(),
        manifest.audio.len()
    );
    let report = generators::game_assets(&ctx, &manifest, images.as_ref(), tts.as_ref()).await?;
    println!("{}", report);

    let skipped_half_ok = (images_only && report.images.is_clean() && report.image_scan.is_complete())
        || (audio_only && report.audio.is_clean() && report.audio_scan.is_complete());
    Ok(report.is_clean() || skipped_half_ok)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Commands {
        Cli::try_parse_from(std::iter::once("kinder-cli").chain(args.iter().copied()))
            .unwrap()
            .command
    }

    #[test]
    fn test_seed_permissions_defaults() {
        match parse(&["seed-permissions"]) {
            Commands::SeedPermissions {
                strategy,
                removed,
                file,
            } => {
                assert_eq!(strategy, Strategy::Reconcile);
                assert_eq!(RemovalPolicy::from(removed), RemovalPolicy::Archive);
                assert_eq!(file, PathBuf::from("data/menu.json"));
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_seed_permissions_rebuild_prune() {
        match parse(&["seed-permissions", "--strategy", "rebuild", "--removed", "prune"]) {
            Commands::SeedPermissions { strategy, removed, .. } => {
                assert_eq!(strategy, Strategy::Rebuild);
                assert_eq!(removed, Removed::Prune);
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_throttle_flags_override_env_config() {
        let args = match parse(&[
            "generate-question-images",
            "--batch-size",
            "3",
            "--delay-ms",
            "250",
            "--per-second",
            "2",
            "--burst",
            "4",
        ]) {
            Commands::GenerateQuestionImages { throttle, .. } => throttle,
            _ => panic!("wrong command"),
        };
        let config = args.apply(ThrottleConfig::default());
        assert_eq!(config.batch_size, 3);
        assert_eq!(config.delay_ms, 250);
        assert_eq!(config.per_second, Some(2));
        assert_eq!(config.burst, Some(4));
    }

    #[test]
    fn test_throttle_flags_absent_keep_config() {
        let config = ThrottleArgs::default().apply(ThrottleConfig::default());
        assert_eq!(config, ThrottleConfig::default());
    }

    #[test]
    fn test_seed_demo_activities_takes_no_args() {
        assert!(matches!(parse(&["seed-demo-activities"]), Commands::SeedDemoActivities));
        assert!(Cli::try_parse_from(["kinder-cli", "seed-demo-activities", "--classes", "2"]).is_err());
    }

    #[test]
    fn test_burst_requires_rate() {
        let result = Cli::try_parse_from(["kinder-cli", "generate-game-assets", "--burst", "4"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_images_only_conflicts_with_audio_only() {
        let result = Cli::try_parse_from(["kinder-cli", "generate-game-assets", "--images-only", "--audio-only"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_transcode_positional_args() {
        match parse(&["transcode-video", "raw.mov", "out.mp4", "--max-seconds", "30"]) {
            Commands::TranscodeVideo {
                input,
                output,
                max_seconds,
            } => {
                assert_eq!(input, PathBuf::from("raw.mov"));
                assert_eq!(output, PathBuf::from("out.mp4"));
                assert_eq!(max_seconds, Some(30));
            }
            _ => panic!("wrong command"),
        }
    }

    #[tokio::test]
    async fn test_resolve_endpoint_without_database_needs_api_key() {
        let resolver = ModelResolver::new(AiProviderConfig {
            api_key: None,
            ..AiProviderConfig::default()
        });
        let err = resolve_endpoint(&resolver, None, ModelType::Image).await.unwrap_err();
        assert!(matches!(err, MediaError::MissingModel("image")));

        let resolver = ModelResolver::new(AiProviderConfig {
            api_key: Some("sk-test".to_string()),
            ..AiProviderConfig::default()
        });
        let endpoint = resolve_endpoint(&resolver, None, ModelType::Speech).await.unwrap();
        assert_eq!(endpoint.api_key.as_deref(), Some("sk-test"));
    }
}
