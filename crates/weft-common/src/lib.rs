//! # weft-common
//!
//! Shared types for the Weft container network control plane.
//!
//! This crate provides the functionality used across all Weft crates:
//! - Network and endpoint id generation
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod id;

pub use error::{WeftError, WeftResult};
pub use id::ResourceId;
