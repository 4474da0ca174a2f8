//! Service layer
//!
//! Business logic behind the HTTP handlers. Services are cheap to clone and
//! hold only immutable configuration plus handles to shared components.

pub mod archive;
pub mod token_codec;
pub mod upload;

pub use token_codec::TokenCodec;
pub use upload::{IncomingFile, UploadService};
