//! Pulse CLI Library
//!
//! Operator interface for the Pulse pipeline:
//!
//! - **Lake writes**: feed a producer batch into the partitioned store
//!   (`pulse write`)
//! - **Warehouse loads**: run the incremental loader (`pulse load`)
//! - **Schema bootstrap**: create warehouse and load-state schemas
//!   (`pulse init-db`)
//! - **Status**: lake manifest and warehouse summaries (`pulse status`)

pub mod commands;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use pulse_common::types::PartitionKey;

/// Pulse - partitioned lake writer and incremental warehouse loader
#[derive(Parser, Debug)]
#[command(name = "pulse")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load lake partitions into the warehouse
    Load {
        /// Load every manifest partition instead of only new/changed ones
        #[arg(long)]
        full: bool,

        /// Load only these partitions (DATE/CHANNEL, repeatable)
        #[arg(long = "partition", value_name = "DATE/CHANNEL")]
        partitions: Vec<PartitionKey>,
    },

    /// Write a producer batch into the lake
    Write {
        /// Channel the batch belongs to
        #[arg(short, long)]
        channel: String,

        /// JSON file holding an array of raw posts
        #[arg(short, long)]
        input: String,

        /// Ingestion date (defaults to today, UTC)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },

    /// Create warehouse and load-state schemas
    InitDb,

    /// Show lake manifest and warehouse summaries
    Status,
}
