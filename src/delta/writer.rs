//! Delta serialization (current format only).

use std::io::Write;

use crate::error::DeltaError;
use crate::wire::{self, COPY_COMMAND, DATA_COMMAND, DELTA_MAGIC, FORMAT_VERSION};

use super::DeltaMetadata;

/// Sink for delta commands.
///
/// Implementations may serialize directly ([`BinaryDeltaWriter`]) or rewrite
/// the command stream before forwarding it ([`AggregateCopyWriter`]).
/// Commands arrive in output order; `write_metadata` is called exactly once,
/// before any command, and `finish` exactly once after the last.
///
/// [`AggregateCopyWriter`]: super::AggregateCopyWriter
pub trait DeltaWriter {
    /// Records the metadata block.
    fn write_metadata(&mut self, metadata: &DeltaMetadata) -> Result<(), DeltaError>;

    /// Emits a copy of `length` base bytes starting at `offset`.
    fn write_copy(&mut self, offset: u64, length: u64) -> Result<(), DeltaError>;

    /// Emits literal bytes.
    fn write_data(&mut self, data: &[u8]) -> Result<(), DeltaError>;

    /// Flushes any buffered state. No commands may follow.
    fn finish(&mut self) -> Result<(), DeltaError>;
}

/// Encodes the delta header: magic, version, metadata JSON.
///
/// Shared by the sync and async writers so both emit identical bytes.
pub(crate) fn encode_header(metadata: &DeltaMetadata) -> Result<Vec<u8>, DeltaError> {
    let json = serde_json::to_string(metadata)?;
    let mut buf = Vec::with_capacity(DELTA_MAGIC.len() + 1 + json.len() + 4);
    buf.extend_from_slice(DELTA_MAGIC);
    buf.push(FORMAT_VERSION);
    wire::encode_string(&mut buf, &json);
    Ok(buf)
}

/// Encodes a copy command: tag, i64 LE offset, i64 LE length.
pub(crate) fn encode_copy(offset: u64, length: u64) -> [u8; 17] {
    let mut buf = [0u8; 17];
    buf[0] = COPY_COMMAND;
    buf[1..9].copy_from_slice(&(offset as i64).to_le_bytes());
    buf[9..17].copy_from_slice(&(length as i64).to_le_bytes());
    buf
}

/// Encodes a data command header: tag, i64 LE length. The literal bytes
/// follow separately.
pub(crate) fn encode_data_header(length: u64) -> [u8; 9] {
    let mut buf = [0u8; 9];
    buf[0] = DATA_COMMAND;
    buf[1..9].copy_from_slice(&(length as i64).to_le_bytes());
    buf
}

/// Serializes delta commands in the current binary format.
pub struct BinaryDeltaWriter<W: Write> {
    writer: W,
}

impl<W: Write> BinaryDeltaWriter<W> {
    /// Wraps an output stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Unwraps the output stream.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DeltaWriter for BinaryDeltaWriter<W> {
    fn write_metadata(&mut self, metadata: &DeltaMetadata) -> Result<(), DeltaError> {
        self.writer.write_all(&encode_header(metadata)?)?;
        Ok(())
    }

    fn write_copy(&mut self, offset: u64, length: u64) -> Result<(), DeltaError> {
        self.writer.write_all(&encode_copy(offset, length))?;
        Ok(())
    }

    fn write_data(&mut self, data: &[u8]) -> Result<(), DeltaError> {
        self.writer.write_all(&encode_data_header(data.len() as u64))?;
        self.writer.write_all(data)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), DeltaError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Async sink for delta commands, mirroring [`DeltaWriter`].
#[cfg(feature = "async-io")]
pub trait AsyncDeltaWriter {
    /// Records the metadata block.
    fn write_metadata(
        &mut self,
        metadata: &DeltaMetadata,
    ) -> impl Future<Output = Result<(), DeltaError>>;

    /// Emits a copy of `length` base bytes starting at `offset`.
    fn write_copy(&mut self, offset: u64, length: u64)
        -> impl Future<Output = Result<(), DeltaError>>;

    /// Emits literal bytes.
    fn write_data(&mut self, data: &[u8]) -> impl Future<Output = Result<(), DeltaError>>;

    /// Flushes any buffered state. No commands may follow.
    fn finish(&mut self) -> impl Future<Output = Result<(), DeltaError>>;
}

/// Async counterpart of [`BinaryDeltaWriter`]. Produces identical bytes.
#[cfg(feature = "async-io")]
pub struct AsyncBinaryDeltaWriter<W: futures_io::AsyncWrite + Unpin> {
    writer: W,
}

#[cfg(feature = "async-io")]
impl<W: futures_io::AsyncWrite + Unpin> AsyncBinaryDeltaWriter<W> {
    /// Wraps an output stream.
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Unwraps the output stream.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(feature = "async-io")]
impl<W: futures_io::AsyncWrite + Unpin> AsyncDeltaWriter for AsyncBinaryDeltaWriter<W> {
    async fn write_metadata(&mut self, metadata: &DeltaMetadata) -> Result<(), DeltaError> {
        use futures_util::AsyncWriteExt;
        self.writer.write_all(&encode_header(metadata)?).await?;
        Ok(())
    }

    async fn write_copy(&mut self, offset: u64, length: u64) -> Result<(), DeltaError> {
        use futures_util::AsyncWriteExt;
        self.writer.write_all(&encode_copy(offset, length)).await?;
        Ok(())
    }

    async fn write_data(&mut self, data: &[u8]) -> Result<(), DeltaError> {
        use futures_util::AsyncWriteExt;
        self.writer
            .write_all(&encode_data_header(data.len() as u64))
            .await?;
        self.writer.write_all(data).await?;
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), DeltaError> {
        use futures_util::AsyncWriteExt;
        self.writer.flush().await?;
        Ok(())
    }
}
