//! Binary diffing for large files, rsync style.
//!
//! `rdelta` produces and applies binary deltas between versions of a file
//! without ever holding a whole file in memory. The base file is summarized
//! once into a *signature* (a rolling checksum and a strong hash per
//! fixed-size chunk); a new version is then matched against the signature to
//! produce a compact *delta* of copy and literal commands; applying the delta
//! to the base rebuilds the new version exactly, verified by a whole-file
//! hash.
//!
//! The signature and delta wire formats are stable, little-endian binary
//! formats, and streams produced by earlier tooling in the legacy format are
//! still readable.
//!
//! # Example
//!
//! ```
//! use std::io::Cursor;
//! use rdelta::{
//!     AggregateCopyWriter, BinaryDeltaWriter, DeltaApplier, DeltaBuilder,
//!     SignatureBuilder, SignatureReader,
//! };
//!
//! let base: Vec<u8> = (0..100_000u32).map(|i| (i % 251) as u8).collect();
//! let mut new = base.clone();
//! new.extend_from_slice(b"appended tail");
//!
//! // The owner of the base publishes a signature.
//! let mut signature_stream = Vec::new();
//! SignatureBuilder::new().build(&mut Cursor::new(&base), &mut signature_stream)?;
//!
//! // The owner of the new version builds a delta against it.
//! let signature = SignatureReader::new(Cursor::new(&signature_stream)).read_signature()?;
//! let mut writer = AggregateCopyWriter::new(BinaryDeltaWriter::new(Vec::new()));
//! DeltaBuilder::new().build(&mut Cursor::new(&new), &signature, &mut writer)?;
//! let delta_stream = writer.into_inner().into_inner();
//! assert!(delta_stream.len() < new.len() / 10);
//!
//! // The base owner applies the delta to obtain the new version.
//! let mut rebuilt = Vec::new();
//! DeltaApplier::new().apply(
//!     &mut Cursor::new(&base),
//!     &mut Cursor::new(&delta_stream),
//!     &mut rebuilt,
//! )?;
//! assert_eq!(rebuilt, new);
//! # Ok::<(), rdelta::DeltaError>(())
//! ```
//!
//! # Async
//!
//! With the `async-io` feature every operation has an async counterpart over
//! the `futures-io` traits (`build_async`, `read_signature_async`,
//! `apply_async`, and the `Async*` writer and reader types), usable from any
//! runtime through its `futures-io` adapters. Sync and async paths produce
//! byte-identical streams.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod checksum;
mod config;
mod delta;
mod error;
mod hash;
mod progress;
mod signature;
mod wire;

pub use checksum::RollingAlgorithm;
pub use config::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, SignatureOptions};
pub use delta::{
    AggregateCopyWriter, BinaryDeltaReader, BinaryDeltaWriter, DeltaApplier, DeltaBuilder,
    DeltaCommand, DeltaMetadata, DeltaWriter,
};
pub use error::DeltaError;
pub use hash::{HashAlgorithm, StrongHasher};
pub use progress::{CancelToken, ProgressHandler, ProgressKind, ProgressReport};
pub use signature::{
    ChunkSignature, Signature, SignatureBuilder, SignatureMetadata, SignatureReader,
};
pub use wire::StreamFormat;

#[cfg(feature = "async-io")]
pub use delta::{
    AsyncAggregateCopyWriter, AsyncBinaryDeltaReader, AsyncBinaryDeltaWriter, AsyncDeltaWriter,
};
#[cfg(feature = "async-io")]
pub use signature::read_signature_async;
