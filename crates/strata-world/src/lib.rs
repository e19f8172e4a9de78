//! # Strata World
//!
//! Chunk persistence for Project Strata.
//!
//! This crate handles:
//! - The in-memory chunk cache with lazy loading
//! - Quad files: 2x2 chunks per file, grouped into segment directories
//! - Skipping uniform chunks on save and removing files that went stale
//! - Parallel save of the whole cache
//! - Reading quad files saved under old locale-formatted names

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod active;
pub mod cache;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod layout;
pub mod legacy;
pub mod progress;
pub mod scheduler;
pub mod terrain;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::active::*;
    pub use crate::cache::*;
    pub use crate::chunk::*;
    pub use crate::codec::{CodecError, CodecResult, QuadOutcome};
    pub use crate::config::*;
    pub use crate::layout::*;
    pub use crate::progress::*;
    pub use crate::scheduler::*;
    pub use crate::terrain::*;
}

pub use prelude::*;
pub use strata_common;
