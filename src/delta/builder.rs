//! Delta construction: the rolling-window matching engine.

use std::io::{Read, Seek, SeekFrom};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Bytes, BytesMut};
use tracing::debug;

use crate::error::DeltaError;
use crate::progress::{self, CancelToken, ProgressHandler, ProgressKind, ProgressReport};
use crate::signature::Signature;
use crate::wire;

use super::writer::DeltaWriter;
use super::DeltaMetadata;

#[cfg(feature = "async-io")]
use super::writer::AsyncDeltaWriter;

const SCAN_BUF_LEN: usize = 64 * 1024;

/// Unmatched bytes are emitted once this many have accumulated, so a stream
/// with no matches at all never buffers more than this plus one window.
/// The cut points depend only on byte positions, never on read sizes, which
/// keeps the sync and async paths byte-identical.
const LITERAL_FLUSH_LIMIT: usize = 4 * 1024 * 1024;

/// Builds a delta from a new stream and a base signature.
///
/// The new stream is traversed twice: one pass computes the whole-stream hash
/// the leading metadata block records, a second pass runs the matching
/// engine. The input must therefore be seekable.
///
/// The output sink is any [`DeltaWriter`]; wrap a [`BinaryDeltaWriter`] in an
/// [`AggregateCopyWriter`] to fold copies over unchanged regions:
///
/// ```no_run
/// use std::fs::File;
/// use std::io::BufReader;
/// use rdelta::{AggregateCopyWriter, BinaryDeltaWriter, DeltaBuilder, SignatureReader};
///
/// let signature = SignatureReader::new(BufReader::new(File::open("base.sig")?))
///     .read_signature()?;
/// let mut new_data = BufReader::new(File::open("new.bin")?);
/// let mut writer = AggregateCopyWriter::new(BinaryDeltaWriter::new(File::create("new.delta")?));
/// DeltaBuilder::new().build(&mut new_data, &signature, &mut writer)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// [`BinaryDeltaWriter`]: super::BinaryDeltaWriter
/// [`AggregateCopyWriter`]: super::AggregateCopyWriter
pub struct DeltaBuilder {
    progress: Option<ProgressHandler>,
    cancel: Option<CancelToken>,
}

impl DeltaBuilder {
    /// Creates a builder.
    pub fn new() -> Self {
        Self {
            progress: None,
            cancel: None,
        }
    }

    /// Installs a progress callback.
    pub fn with_progress(mut self, handler: impl FnMut(ProgressReport) + Send + 'static) -> Self {
        self.progress = Some(Box::new(handler));
        self
    }

    /// Installs a cancellation token checked at read boundaries.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Matches `new_data` against `signature` and writes commands to
    /// `output`, including the final `finish` call.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors from either stream and on cancellation.
    pub fn build<R, S>(
        mut self,
        new_data: &mut R,
        signature: &Signature,
        output: &mut S,
    ) -> Result<(), DeltaError>
    where
        R: Read + Seek,
        S: DeltaWriter,
    {
        let total = new_data.seek(SeekFrom::End(0))?;
        new_data.seek(SeekFrom::Start(0))?;

        let expected_hash = self.hash_pass(new_data, signature, total)?;
        new_data.seek(SeekFrom::Start(0))?;

        output.write_metadata(&metadata(signature, &expected_hash))?;

        let mut matcher = Matcher::new(signature);
        let mut events = Vec::new();
        let mut buf = vec![0u8; SCAN_BUF_LEN];
        let mut position = 0u64;
        loop {
            CancelToken::check(&self.cancel)?;
            let n = wire::read_full(new_data, &mut buf)?;
            if n == 0 {
                break;
            }
            matcher.feed(&buf[..n], &mut events);
            emit(&mut events, output)?;
            position += n as u64;
            progress::report(&mut self.progress, ProgressKind::BuildingDelta, position, total);
        }
        matcher.finish(&mut events);
        emit(&mut events, output)?;
        output.finish()?;
        debug!(
            bytes = position,
            matched = matcher.matched_chunks,
            "delta built"
        );
        Ok(())
    }

    /// Async counterpart of [`build`](Self::build). Produces bytes identical
    /// to the sync path for the same input.
    #[cfg(feature = "async-io")]
    pub async fn build_async<R, S>(
        mut self,
        new_data: &mut R,
        signature: &Signature,
        output: &mut S,
    ) -> Result<(), DeltaError>
    where
        R: futures_io::AsyncRead + futures_io::AsyncSeek + Unpin,
        S: AsyncDeltaWriter,
    {
        use futures_util::AsyncSeekExt;

        let total = new_data.seek(SeekFrom::End(0)).await?;
        new_data.seek(SeekFrom::Start(0)).await?;

        let expected_hash = self.hash_pass_async(new_data, signature, total).await?;
        new_data.seek(SeekFrom::Start(0)).await?;

        output.write_metadata(&metadata(signature, &expected_hash)).await?;

        let mut matcher = Matcher::new(signature);
        let mut events = Vec::new();
        let mut buf = vec![0u8; SCAN_BUF_LEN];
        let mut position = 0u64;
        loop {
            CancelToken::check(&self.cancel)?;
            let n = wire::asynchronous::read_full(new_data, &mut buf).await?;
            if n == 0 {
                break;
            }
            matcher.feed(&buf[..n], &mut events);
            emit_async(&mut events, output).await?;
            position += n as u64;
            progress::report(&mut self.progress, ProgressKind::BuildingDelta, position, total);
        }
        matcher.finish(&mut events);
        emit_async(&mut events, output).await?;
        output.finish().await?;
        debug!(
            bytes = position,
            matched = matcher.matched_chunks,
            "delta built"
        );
        Ok(())
    }

    fn hash_pass<R: Read>(
        &mut self,
        new_data: &mut R,
        signature: &Signature,
        total: u64,
    ) -> Result<Vec<u8>, DeltaError> {
        let mut hasher = signature.hash_algorithm().hasher();
        let mut buf = vec![0u8; SCAN_BUF_LEN];
        let mut position = 0u64;
        loop {
            CancelToken::check(&self.cancel)?;
            let n = wire::read_full(new_data, &mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            position += n as u64;
            progress::report(&mut self.progress, ProgressKind::HashingFile, position, total);
        }
        Ok(hasher.finalize())
    }

    #[cfg(feature = "async-io")]
    async fn hash_pass_async<R: futures_io::AsyncRead + Unpin>(
        &mut self,
        new_data: &mut R,
        signature: &Signature,
        total: u64,
    ) -> Result<Vec<u8>, DeltaError> {
        let mut hasher = signature.hash_algorithm().hasher();
        let mut buf = vec![0u8; SCAN_BUF_LEN];
        let mut position = 0u64;
        loop {
            CancelToken::check(&self.cancel)?;
            let n = wire::asynchronous::read_full(new_data, &mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            position += n as u64;
            progress::report(&mut self.progress, ProgressKind::HashingFile, position, total);
        }
        Ok(hasher.finalize())
    }
}

impl Default for DeltaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn metadata(signature: &Signature, expected_hash: &[u8]) -> DeltaMetadata {
    DeltaMetadata {
        expected_file_hash_algorithm_name: signature.hash_algorithm().name().to_string(),
        expected_file_hash: BASE64.encode(expected_hash),
    }
}

fn emit<S: DeltaWriter>(events: &mut Vec<MatchEvent>, output: &mut S) -> Result<(), DeltaError> {
    for event in events.drain(..) {
        match event {
            MatchEvent::Copy { offset, length } => output.write_copy(offset, length)?,
            MatchEvent::Data(bytes) => output.write_data(&bytes)?,
        }
    }
    Ok(())
}

#[cfg(feature = "async-io")]
async fn emit_async<S: AsyncDeltaWriter>(
    events: &mut Vec<MatchEvent>,
    output: &mut S,
) -> Result<(), DeltaError> {
    for event in events.drain(..) {
        match event {
            MatchEvent::Copy { offset, length } => output.write_copy(offset, length).await?,
            MatchEvent::Data(bytes) => output.write_data(&bytes).await?,
        }
    }
    Ok(())
}

enum MatchEvent {
    Copy { offset: u64, length: u64 },
    Data(Bytes),
}

/// The incremental matching engine.
///
/// Holds unemitted bytes in one buffer: a literal prefix of bytes every
/// window containing them has failed to match, then the current window. A
/// window whose rolling checksum nominates a candidate chunk of the same
/// length and whose strong hash confirms it becomes a copy; the literal
/// prefix is emitted first so commands stay in output order. After a match
/// the window restarts behind the matched bytes, so matched regions are
/// never rescanned.
struct Matcher<'a> {
    signature: &'a Signature,
    chunk_size: usize,
    buf: BytesMut,
    /// Length of the literal prefix; the window starts here.
    window_start: usize,
    /// Checksum of the current full window, when one exists.
    checksum: Option<u32>,
    matched_chunks: u64,
}

impl<'a> Matcher<'a> {
    fn new(signature: &'a Signature) -> Self {
        Self {
            signature,
            chunk_size: usize::from(signature.chunk_size()),
            buf: BytesMut::new(),
            window_start: 0,
            checksum: None,
            matched_chunks: 0,
        }
    }

    /// Feeds the next slice of the new stream. Completed commands are pushed
    /// onto `out` in output order.
    ///
    /// `chunk_size` is at least one (signature parsing enforces the bounds),
    /// so the scan always advances and literal runs flush at the limit.
    fn feed(&mut self, data: &[u8], out: &mut Vec<MatchEvent>) {
        self.buf.extend_from_slice(data);
        self.scan(out);
    }

    /// Emits everything still buffered as literal bytes. The stream may end
    /// mid-window; an unmatched final window is literal like any other
    /// unmatched bytes.
    fn finish(&mut self, out: &mut Vec<MatchEvent>) {
        if !self.buf.is_empty() {
            let literal = self.buf.split_to(self.buf.len()).freeze();
            out.push(MatchEvent::Data(literal));
        }
        self.window_start = 0;
        self.checksum = None;
    }

    fn scan(&mut self, out: &mut Vec<MatchEvent>) {
        loop {
            let available = self.buf.len() - self.window_start;
            if available < self.chunk_size {
                break;
            }
            let checksum = match self.checksum {
                Some(checksum) => checksum,
                None => {
                    let window = &self.buf[self.window_start..self.window_start + self.chunk_size];
                    let checksum = self.signature.rolling_algorithm().calculate(window);
                    self.checksum = Some(checksum);
                    checksum
                }
            };

            if let Some(chunk_index) = self.confirm(checksum) {
                let chunk = &self.signature.chunks()[chunk_index];
                let (offset, length) = (chunk.start_offset, u64::from(chunk.length));
                if self.window_start > 0 {
                    let literal = self.buf.split_to(self.window_start).freeze();
                    out.push(MatchEvent::Data(literal));
                    self.window_start = 0;
                }
                let _ = self.buf.split_to(self.chunk_size);
                out.push(MatchEvent::Copy { offset, length });
                self.checksum = None;
                self.matched_chunks += 1;
                continue;
            }

            // No match; the front byte of the window is literal. Rotating
            // needs the byte entering at the back, so stop when the shifted
            // window would be incomplete.
            if available == self.chunk_size {
                break;
            }
            let remove = self.buf[self.window_start];
            let add = self.buf[self.window_start + self.chunk_size];
            self.checksum = Some(self.signature.rolling_algorithm().rotate(
                checksum,
                remove,
                add,
                self.chunk_size,
            ));
            self.window_start += 1;
            self.flush_literal_runs(out);
        }
    }

    fn flush_literal_runs(&mut self, out: &mut Vec<MatchEvent>) {
        while self.window_start >= LITERAL_FLUSH_LIMIT {
            let literal = self.buf.split_to(LITERAL_FLUSH_LIMIT).freeze();
            out.push(MatchEvent::Data(literal));
            self.window_start -= LITERAL_FLUSH_LIMIT;
        }
    }

    /// Confirms a checksum hit against the candidates' strong hashes. The
    /// window hash is computed at most once per position, and only when a
    /// candidate of matching length exists.
    fn confirm(&self, checksum: u32) -> Option<usize> {
        let window = &self.buf[self.window_start..self.window_start + self.chunk_size];
        let mut window_hash: Option<Vec<u8>> = None;
        for &index in self.signature.candidates(checksum) {
            let chunk = &self.signature.chunks()[index as usize];
            if chunk.length as usize != self.chunk_size {
                continue;
            }
            let hash = window_hash
                .get_or_insert_with(|| self.signature.hash_algorithm().digest(window));
            if *hash == chunk.hash {
                return Some(index as usize);
            }
        }
        None
    }
}
