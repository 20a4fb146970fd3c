//! Progress reporting and cooperative cancellation.
//!
//! Progress callbacks run synchronously on the calling thread at well-defined
//! points (after each applied command, after each signed chunk). A slow
//! callback delays the whole operation, so keep them cheap.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::DeltaError;

/// The phase an operation is reporting progress for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    /// Hashing the input stream before the main pass.
    HashingFile,
    /// Building chunk signatures of the base stream.
    BuildingSignature,
    /// Reading a signature stream into an index.
    ReadingSignature,
    /// Scanning the new stream for matches.
    BuildingDelta,
    /// Replaying delta commands against the base stream.
    ApplyingDelta,
}

impl fmt::Display for ProgressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProgressKind::HashingFile => "hashing file",
            ProgressKind::BuildingSignature => "building signature",
            ProgressKind::ReadingSignature => "reading signature",
            ProgressKind::BuildingDelta => "building delta",
            ProgressKind::ApplyingDelta => "applying delta",
        };
        f.write_str(name)
    }
}

/// A single progress observation: `position` bytes of `total` processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressReport {
    /// What the operation is currently doing.
    pub kind: ProgressKind,
    /// Bytes processed so far.
    pub position: u64,
    /// Total bytes, when known (0 when the stream length is unknown).
    pub total: u64,
}

/// Boxed progress callback. Absence of a callback is a valid no-op
/// configuration.
pub type ProgressHandler = Box<dyn FnMut(ProgressReport) + Send>;

pub(crate) fn report(
    handler: &mut Option<ProgressHandler>,
    kind: ProgressKind,
    position: u64,
    total: u64,
) {
    if let Some(handler) = handler {
        handler(ProgressReport {
            kind,
            position,
            total,
        });
    }
}

/// A cloneable cancellation flag.
///
/// Cancellation is cooperative: operations check the token at read/write and
/// command boundaries and fail with [`DeltaError::Cancelled`]. A command is
/// never left partially applied, but output already flushed by earlier
/// commands remains and must be discarded by the caller.
///
/// # Example
///
/// ```
/// use rdelta::CancelToken;
///
/// let token = CancelToken::new();
/// let watcher = token.clone();
/// assert!(!watcher.is_cancelled());
/// token.cancel();
/// assert!(watcher.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. All clones observe the request.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Returns true once `cancel` has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) fn check(token: &Option<Self>) -> Result<(), DeltaError> {
        match token {
            Some(token) if token.is_cancelled() => Err(DeltaError::Cancelled),
            _ => Ok(()),
        }
    }
}
