//! # Staging File Manager
//!
//! Temporary file handling for services that accept uploads and produce
//! artifacts on behalf of anonymous clients.
//!
//! - [`StagingArea`]: a directory with owner-only permissions that hands out
//!   unguessable `<uuid>...` file names, so concurrent writers never collide.
//! - [`CleanupScheduler`]: fire-and-forget deferred deletion. One shared runner
//!   task holds every pending batch in a deadline heap; deletion failures are
//!   logged and swallowed.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use staging_file_manager::{CleanupScheduler, StagingArea};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let uploads = StagingArea::builder()
//!     .base_directory("/var/lib/convert-gateway/uploads")
//!     .build()
//!     .await?;
//! let cleanup = CleanupScheduler::start();
//!
//! let staged = uploads.stage_bytes("report.docx", "docx", b"...").await?;
//! cleanup.schedule([&staged], Duration::from_secs(30 * 60));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod scheduler;
pub mod security;
pub mod staging;

pub use error::{Result, StagingError};
pub use scheduler::{CleanupScheduler, CleanupTarget};
pub use staging::{StagedFile, StagingArea, StagingAreaBuilder};
