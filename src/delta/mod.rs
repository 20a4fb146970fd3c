//! Deltas: command streams that rebuild a new stream from a base.
//!
//! A delta is a metadata block followed by an ordered command stream. A copy
//! command references a byte range of the base; a data command carries
//! literal bytes. Replaying the commands in order against the base
//! reconstructs the new stream exactly; the metadata records the strong hash
//! the result must have.
//!
//! - [`DeltaBuilder`] - matches a new stream against a [`Signature`] and
//!   emits commands
//! - [`BinaryDeltaWriter`] - serializes commands (current format)
//! - [`AggregateCopyWriter`] - merges adjacent copy commands before
//!   forwarding them
//! - [`BinaryDeltaReader`] - parses a delta stream (current or legacy)
//! - [`DeltaApplier`] - replays a delta against a base
//!
//! [`Signature`]: crate::signature::Signature

mod aggregate;
mod apply;
mod builder;
mod reader;
mod writer;

pub use aggregate::AggregateCopyWriter;
pub use apply::DeltaApplier;
pub use builder::DeltaBuilder;
pub use reader::BinaryDeltaReader;
pub use writer::{BinaryDeltaWriter, DeltaWriter};

#[cfg(feature = "async-io")]
pub use aggregate::AsyncAggregateCopyWriter;
#[cfg(feature = "async-io")]
pub use reader::AsyncBinaryDeltaReader;
#[cfg(feature = "async-io")]
pub use writer::{AsyncBinaryDeltaWriter, AsyncDeltaWriter};

use serde::{Deserialize, Serialize};

/// Delta metadata, serialized as the JSON block of the current format.
///
/// Records the strong hash the reconstructed stream must have; the applier
/// verifies it after replaying all commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaMetadata {
    /// Name of the hash algorithm of `expected_file_hash`.
    pub expected_file_hash_algorithm_name: String,
    /// Base64 strong hash of the reconstructed stream.
    pub expected_file_hash: String,
}

/// A parsed delta command header. Data payloads are streamed separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaCommand {
    /// Copy `length` bytes starting at `offset` in the base stream.
    Copy {
        /// Byte offset in the base stream.
        offset: u64,
        /// Number of bytes to copy.
        length: u64,
    },
    /// `length` literal bytes follow in the delta stream.
    Data {
        /// Number of literal bytes.
        length: u64,
    },
}
