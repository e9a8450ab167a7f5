//! Partition selection
//!
//! Pure logic deciding which partitions a run should process, by comparing
//! the manifest index against the load state. No I/O here; the loader feeds
//! in both sides and acts on the result.

use pulse_common::types::PartitionKey;
use pulse_lake::{ManifestEntry, ManifestIndex};
use std::collections::HashMap;

use crate::loader::LoadMode;
use crate::state::LoadStateEntry;

/// Result of partition selection for one run
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Manifest entries to (re)process
    pub selected: Vec<ManifestEntry>,
    /// Explicitly requested keys absent from the manifest
    pub missing: Vec<PartitionKey>,
}

/// Decide which partitions to process.
///
/// - Incremental: a partition qualifies when it has no load state, its
///   fingerprint differs from the last-loaded one, or the prior attempt
///   ended `pending`/`partial`/`failed`.
/// - Full: every manifest entry, regardless of state.
/// - Partitions: exactly the requested keys; unknown keys are reported in
///   `missing` rather than silently dropped.
pub fn select_partitions(
    manifest: &ManifestIndex,
    states: &HashMap<PartitionKey, LoadStateEntry>,
    mode: &LoadMode,
) -> Selection {
    match mode {
        LoadMode::Incremental => Selection {
            selected: manifest
                .list_partitions(None)
                .into_iter()
                .filter(|entry| match states.get(&entry.key()) {
                    None => true,
                    Some(state) => {
                        state.fingerprint != entry.fingerprint || state.status.needs_retry()
                    }
                })
                .cloned()
                .collect(),
            missing: Vec::new(),
        },
        LoadMode::Full => Selection {
            selected: manifest.list_partitions(None).into_iter().cloned().collect(),
            missing: Vec::new(),
        },
        LoadMode::Partitions(keys) => {
            let mut selection = Selection::default();
            for key in keys {
                match manifest.get(key) {
                    Some(entry) => selection.selected.push(entry.clone()),
                    None => selection.missing.push(key.clone()),
                }
            }
            selection
        }
    }
}
