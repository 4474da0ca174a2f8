//! File-format conversion gateway
//!
//! Clients upload files, ask for a target format and download the converted
//! file (or a zip of several). No session state is kept on the server: each
//! step hands the client a signed, time-limited token describing the
//! server-side files it may touch next. Every staged file is deleted after a
//! fixed delay whether or not the client comes back.

pub mod config;
pub mod conversion;
pub mod errors;
pub mod models;
pub mod services;
pub mod web;

pub use config::Config;
pub use errors::{AppError, AppResult};
