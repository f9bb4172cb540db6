//! Alya media core - fetches YouTube audio and video into a local cache
//!
//! A reference (link or bare id) is resolved through the primary stream API
//! when its quota allows, and through yt-dlp with rotated cookies otherwise.
//! Downloaded files live in one directory that a background janitor keeps
//! within the retention window.
//!
//! # Module Structure
//!
//! - `cli`: the `alya-fetch` operator command line
//! - `core`: configuration, errors, logging and subprocess helpers
//! - `download`: sources, cookie store, cache janitor and the resolution pipeline

pub mod cli;
pub mod core;
pub mod download;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use crate::core::{config, AppError, AppResult, PipelineConfig};
pub use crate::download::{CachedArtifact, CookieStore, DownloadError, MediaKind, ResolutionPipeline};
