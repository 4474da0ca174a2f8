//! Centralized error handling for the conversion gateway
//!
//! # Error Categories
//!
//! - **Client Errors**: bad uploads, invalid or expired session tokens,
//!   conversions the registry does not know
//! - **Conversion Errors**: an external tool or library failed on one file
//! - **Storage Errors**: staging directory I/O and archive packaging
//!
//! # Usage
//!
//! ```rust
//! use convert_gateway::errors::{AppError, AppResult};
//!
//! fn check(names: &[String]) -> AppResult<()> {
//!     if names.is_empty() {
//!         return Err(AppError::invalid_input("No files uploaded"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for backend conversion results
pub type ConversionResult<T> = Result<T, ConversionError>;
