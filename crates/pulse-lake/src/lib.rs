//! Pulse Data Lake
//!
//! Partitioned raw storage for channel posts plus the manifest index that
//! describes it. One partition holds all records ingested for one
//! `(date, channel)` pair:
//!
//! ```text
//! <lake root>/
//! └── raw/
//!     ├── posts/
//!     │   ├── manifest.json
//!     │   └── YYYY-MM-DD/
//!     │       └── channel_name.json
//!     └── media/
//!         └── channel_name/
//!             └── message_id.jpg
//! ```
//!
//! The manifest is updated only after a partition file is fully in place,
//! so an entry in the manifest always refers to a complete partition.

pub mod layout;
pub mod manifest;
pub mod writer;

pub use layout::LakeLayout;
pub use manifest::{ManifestEntry, ManifestIndex};
pub use writer::{PartitionWriter, SkipReason, SkippedRecord, WriteResult};
