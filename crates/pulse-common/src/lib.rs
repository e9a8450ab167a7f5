//! Pulse Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Pulse pipeline.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Pulse workspace
//! members:
//!
//! - **Error Handling**: Custom error types and result types
//! - **Checksums**: Partition content fingerprinting
//! - **Types**: Domain types (partition keys, channel posts) and validation
//!
//! # Example
//!
//! ```no_run
//! use pulse_common::{Result, PulseError};
//! use pulse_common::checksum::fingerprint_bytes;
//!
//! fn fingerprint(payload: &[u8]) -> Result<()> {
//!     let fp = fingerprint_bytes(payload);
//!     println!("Partition fingerprint: {}", fp);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{PulseError, Result};
pub use types::{ChannelPost, LoadStatus, PartitionKey, RawPost, ValidationError};
