//! # Kinder Media
//!
//! Batch generation of AI media for assessment questions and educational
//! games.
//!
//! - [`throttle`]: the batched, throttled runner every generator uses
//! - [`ai`]: provider resolution plus image and speech clients
//! - [`download`]: fetching generated files with a socket timeout
//! - [`process`]: ffmpeg crop/scale and video transcoding
//! - [`generators`]: the question-image, question-audio and game-asset jobs
//! - [`scan`]: post-run presence checks on the uploads tree
//!
//! # Example
//!
//! ```ignore
//! use kinder_media::BatchThrottle;
//!
//! let throttle = BatchThrottle::new(5, Duration::from_secs(5));
//! let summary = throttle
//!     .run(jobs, |job| is_stored(job), |job| produce(job))
//!     .await;
//! println!("{}", summary);
//! ```

pub mod ai;
pub mod download;
pub mod error;
pub mod generators;
pub mod process;
pub mod scan;
pub mod throttle;

pub use ai::{GeneratedImage, ImageClient, ModelResolver, ProviderEndpoint, RetryPolicy, TtsClient};
pub use error::MediaError;
pub use generators::{GameAssetReport, MediaContext};
pub use process::{ImagePostProcess, VideoTranscode};
pub use scan::ScanReport;
pub use throttle::{BatchThrottle, RunSummary, WorkItem};
