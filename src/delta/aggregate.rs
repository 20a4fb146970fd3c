//! Copy-run aggregation.

use crate::error::DeltaError;

use super::writer::DeltaWriter;
use super::DeltaMetadata;

#[cfg(feature = "async-io")]
use super::writer::AsyncDeltaWriter;

/// A pending copy run. Kept outside the writers so the sync and async
/// wrappers share one merging rule.
#[derive(Debug, Default)]
struct PendingCopy {
    run: Option<(u64, u64)>,
}

impl PendingCopy {
    /// Folds a copy into the pending run, or returns the run that must be
    /// flushed first.
    fn push(&mut self, offset: u64, length: u64) -> Option<(u64, u64)> {
        match &mut self.run {
            Some((start, run_length)) if offset == *start + *run_length => {
                *run_length += length;
                None
            }
            _ => self.run.replace((offset, length)),
        }
    }

    fn take(&mut self) -> Option<(u64, u64)> {
        self.run.take()
    }
}

/// Merges runs of adjacent copy commands before forwarding them.
///
/// The matching engine emits one copy per matched chunk, so a long unchanged
/// region arrives as many chunk-sized copies of consecutive base ranges. This
/// wrapper folds each such run into a single command; any data command or
/// non-adjacent copy flushes the run first, preserving command order.
///
/// # Example
///
/// ```
/// use rdelta::{AggregateCopyWriter, BinaryDeltaWriter, DeltaWriter};
///
/// let mut out = Vec::new();
/// let mut writer = AggregateCopyWriter::new(BinaryDeltaWriter::new(&mut out));
/// writer.write_copy(0, 2048)?;
/// writer.write_copy(2048, 2048)?; // folded into the first
/// writer.finish()?;
/// assert_eq!(out.len(), 17); // one copy command
/// # Ok::<(), rdelta::DeltaError>(())
/// ```
pub struct AggregateCopyWriter<S: DeltaWriter> {
    inner: S,
    pending: PendingCopy,
}

impl<S: DeltaWriter> AggregateCopyWriter<S> {
    /// Wraps a downstream writer.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending: PendingCopy::default(),
        }
    }

    /// Unwraps the downstream writer. Call [`finish`](DeltaWriter::finish)
    /// first or a pending run is lost.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: DeltaWriter> DeltaWriter for AggregateCopyWriter<S> {
    fn write_metadata(&mut self, metadata: &DeltaMetadata) -> Result<(), DeltaError> {
        self.inner.write_metadata(metadata)
    }

    fn write_copy(&mut self, offset: u64, length: u64) -> Result<(), DeltaError> {
        if let Some((start, run_length)) = self.pending.push(offset, length) {
            self.inner.write_copy(start, run_length)?;
        }
        Ok(())
    }

    fn write_data(&mut self, data: &[u8]) -> Result<(), DeltaError> {
        if let Some((start, run_length)) = self.pending.take() {
            self.inner.write_copy(start, run_length)?;
        }
        self.inner.write_data(data)
    }

    fn finish(&mut self) -> Result<(), DeltaError> {
        if let Some((start, run_length)) = self.pending.take() {
            self.inner.write_copy(start, run_length)?;
        }
        self.inner.finish()
    }
}

/// Async counterpart of [`AggregateCopyWriter`].
#[cfg(feature = "async-io")]
pub struct AsyncAggregateCopyWriter<S: AsyncDeltaWriter> {
    inner: S,
    pending: PendingCopy,
}

#[cfg(feature = "async-io")]
impl<S: AsyncDeltaWriter> AsyncAggregateCopyWriter<S> {
    /// Wraps a downstream writer.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            pending: PendingCopy::default(),
        }
    }

    /// Unwraps the downstream writer. Call
    /// [`finish`](AsyncDeltaWriter::finish) first or a pending run is lost.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

#[cfg(feature = "async-io")]
impl<S: AsyncDeltaWriter> AsyncDeltaWriter for AsyncAggregateCopyWriter<S> {
    async fn write_metadata(&mut self, metadata: &DeltaMetadata) -> Result<(), DeltaError> {
        self.inner.write_metadata(metadata).await
    }

    async fn write_copy(&mut self, offset: u64, length: u64) -> Result<(), DeltaError> {
        if let Some((start, run_length)) = self.pending.push(offset, length) {
            self.inner.write_copy(start, run_length).await?;
        }
        Ok(())
    }

    async fn write_data(&mut self, data: &[u8]) -> Result<(), DeltaError> {
        if let Some((start, run_length)) = self.pending.take() {
            self.inner.write_copy(start, run_length).await?;
        }
        self.inner.write_data(data).await
    }

    async fn finish(&mut self) -> Result<(), DeltaError> {
        if let Some((start, run_length)) = self.pending.take() {
            self.inner.write_copy(start, run_length).await?;
        }
        self.inner.finish().await
    }
}
