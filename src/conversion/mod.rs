//! Conversion registry, backends and the batch dispatcher
//!
//! - [`ConversionRegistry`]: which (source, target) pairs are legal and which
//!   [`Capability`] performs each
//! - [`ConversionBackend`]: executes a capability; [`ToolBackend`] is the
//!   production implementation
//! - [`ConversionService`]: turns an upload session into a download ticket

pub mod backend;
pub mod capability;
pub mod dispatcher;
pub mod native;
pub mod registry;

pub use backend::{ConversionBackend, ConversionJob, SCRATCH_PREFIXES, ToolBackend};
pub use capability::{Capability, Tool};
pub use dispatcher::{ARCHIVE_DISPLAY_NAME, ConversionService};
pub use registry::{ConversionRegistry, MissingTool};
