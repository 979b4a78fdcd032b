//! Core types and definitions for viewscape.
//!
//! This crate defines the vocabulary shared across all other crates:
//! visibility samples, query bounds, the sample stream that results and
//! metrics speak, configuration, errors, and constants. It has no
//! dependency on any terrain or compute backend.

pub mod bounds;
pub mod config;
pub mod constants;
pub mod enums;
pub mod error;
pub mod stream;
pub mod types;

pub use bounds::Bounds;
pub use config::ViewConfig;
pub use enums::{BackendPreference, TargetHeight, ViewKind, Visibility};
pub use error::ViewError;
