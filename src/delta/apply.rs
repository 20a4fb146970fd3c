//! Delta application: rebuilding the new stream from a base and a delta.

use std::io::{Read, Seek, SeekFrom, Write};

use tracing::{debug, trace};

use crate::error::DeltaError;
use crate::progress::{self, CancelToken, ProgressHandler, ProgressKind, ProgressReport};
use crate::wire::Counted;

use super::reader::BinaryDeltaReader;
use super::DeltaCommand;

#[cfg(feature = "async-io")]
use super::reader::AsyncBinaryDeltaReader;

const COPY_BUF_LEN: usize = 64 * 1024;

/// Replays a delta against a base stream, reconstructing the new stream.
///
/// The reconstructed bytes are hashed as they are written and the result is
/// compared against the hash recorded in the delta; a mismatch fails with
/// [`DeltaError::IntegrityFailure`] after the full output has been written.
/// The check catches a wrong or modified base as well as a corrupt delta.
///
/// # Example
///
/// ```no_run
/// use std::fs::File;
/// use std::io::BufReader;
/// use rdelta::DeltaApplier;
///
/// let mut base = BufReader::new(File::open("base.bin")?);
/// let mut delta = BufReader::new(File::open("new.delta")?);
/// let mut out = File::create("new.bin")?;
/// DeltaApplier::new().apply(&mut base, &mut delta, &mut out)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct DeltaApplier {
    skip_hash_check: bool,
    progress: Option<ProgressHandler>,
    cancel: Option<CancelToken>,
}

impl DeltaApplier {
    /// Creates an applier that verifies the reconstructed stream.
    pub fn new() -> Self {
        Self {
            skip_hash_check: false,
            progress: None,
            cancel: None,
        }
    }

    /// Disables the final hash verification. Intended for callers that
    /// verify the output themselves.
    pub fn skip_hash_check(mut self, skip: bool) -> Self {
        self.skip_hash_check = skip;
        self
    }

    /// Installs a progress callback. Reports carry the bytes consumed from
    /// the delta stream and the stream's total length.
    pub fn with_progress(mut self, handler: impl FnMut(ProgressReport) + Send + 'static) -> Self {
        self.progress = Some(Box::new(handler));
        self
    }

    /// Installs a cancellation token checked at command boundaries.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Replays `delta` against `base`, writing the result to `output`.
    ///
    /// # Errors
    ///
    /// Fails with [`DeltaError::Format`] on a corrupt delta, an I/O error
    /// when a copy command reaches past the end of the base, and
    /// [`DeltaError::IntegrityFailure`] when the reconstructed stream does
    /// not hash to the recorded value.
    pub fn apply<B, D, O>(
        mut self,
        base: &mut B,
        delta: &mut D,
        output: &mut O,
    ) -> Result<(), DeltaError>
    where
        B: Read + Seek,
        D: Read + Seek,
        O: Write,
    {
        let total = delta.seek(SeekFrom::End(0))?;
        delta.seek(SeekFrom::Start(0))?;

        let mut reader = BinaryDeltaReader::new(Counted::new(delta))?;
        let mut hasher = if self.skip_hash_check {
            None
        } else {
            Some(reader.hash_algorithm().hasher())
        };
        let mut buf = vec![0u8; COPY_BUF_LEN];
        let mut written = 0u64;
        let mut commands = 0u64;

        while let Some(command) = reader.next_command()? {
            CancelToken::check(&self.cancel)?;
            trace!(?command, "replaying");
            match command {
                DeltaCommand::Copy { offset, length } => {
                    base.seek(SeekFrom::Start(offset))?;
                    let mut remaining = length;
                    while remaining > 0 {
                        let n = remaining.min(buf.len() as u64) as usize;
                        base.read_exact(&mut buf[..n])?;
                        output.write_all(&buf[..n])?;
                        if let Some(hasher) = &mut hasher {
                            hasher.update(&buf[..n]);
                        }
                        remaining -= n as u64;
                        written += n as u64;
                    }
                }
                DeltaCommand::Data { length } => {
                    let mut remaining = length;
                    while remaining > 0 {
                        let n = remaining.min(buf.len() as u64) as usize;
                        reader.read_literal(&mut buf[..n])?;
                        output.write_all(&buf[..n])?;
                        if let Some(hasher) = &mut hasher {
                            hasher.update(&buf[..n]);
                        }
                        remaining -= n as u64;
                        written += n as u64;
                    }
                }
            }
            commands += 1;
            progress::report(
                &mut self.progress,
                ProgressKind::ApplyingDelta,
                reader.get_ref().consumed(),
                total,
            );
        }
        output.flush()?;

        if let Some(mut hasher) = hasher {
            let actual = hasher.finalize();
            if actual != reader.expected_hash() {
                return Err(DeltaError::IntegrityFailure {
                    expected: hex(reader.expected_hash()),
                    actual: hex(&actual),
                });
            }
        }
        debug!(commands, bytes = written, "delta applied");
        Ok(())
    }

    /// Async counterpart of [`apply`](Self::apply).
    #[cfg(feature = "async-io")]
    pub async fn apply_async<B, D, O>(
        mut self,
        base: &mut B,
        delta: &mut D,
        output: &mut O,
    ) -> Result<(), DeltaError>
    where
        B: futures_io::AsyncRead + futures_io::AsyncSeek + Unpin,
        D: futures_io::AsyncRead + futures_io::AsyncSeek + Unpin,
        O: futures_io::AsyncWrite + Unpin,
    {
        use futures_util::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

        let total = delta.seek(SeekFrom::End(0)).await?;
        delta.seek(SeekFrom::Start(0)).await?;

        let mut reader = AsyncBinaryDeltaReader::new(Counted::new(delta)).await?;
        let mut hasher = if self.skip_hash_check {
            None
        } else {
            Some(reader.hash_algorithm().hasher())
        };
        let mut buf = vec![0u8; COPY_BUF_LEN];
        let mut written = 0u64;
        let mut commands = 0u64;

        while let Some(command) = reader.next_command().await? {
            CancelToken::check(&self.cancel)?;
            trace!(?command, "replaying");
            match command {
                DeltaCommand::Copy { offset, length } => {
                    base.seek(SeekFrom::Start(offset)).await?;
                    let mut remaining = length;
                    while remaining > 0 {
                        let n = remaining.min(buf.len() as u64) as usize;
                        base.read_exact(&mut buf[..n]).await?;
                        output.write_all(&buf[..n]).await?;
                        if let Some(hasher) = &mut hasher {
                            hasher.update(&buf[..n]);
                        }
                        remaining -= n as u64;
                        written += n as u64;
                    }
                }
                DeltaCommand::Data { length } => {
                    let mut remaining = length;
                    while remaining > 0 {
                        let n = remaining.min(buf.len() as u64) as usize;
                        reader.read_literal(&mut buf[..n]).await?;
                        output.write_all(&buf[..n]).await?;
                        if let Some(hasher) = &mut hasher {
                            hasher.update(&buf[..n]);
                        }
                        remaining -= n as u64;
                        written += n as u64;
                    }
                }
            }
            commands += 1;
            progress::report(
                &mut self.progress,
                ProgressKind::ApplyingDelta,
                reader.get_ref().consumed(),
                total,
            );
        }
        output.flush().await?;

        if let Some(mut hasher) = hasher {
            let actual = hasher.finalize();
            if actual != reader.expected_hash() {
                return Err(DeltaError::IntegrityFailure {
                    expected: hex(reader.expected_hash()),
                    actual: hex(&actual),
                });
            }
        }
        debug!(commands, bytes = written, "delta applied");
        Ok(())
    }
}

impl Default for DeltaApplier {
    fn default() -> Self {
        Self::new()
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    use super::super::writer::{BinaryDeltaWriter, DeltaWriter};
    use super::super::DeltaMetadata;
    use super::*;
    use crate::hash::HashAlgorithm;

    fn delta_for(new_data: &[u8], build: impl FnOnce(&mut BinaryDeltaWriter<&mut Vec<u8>>)) -> Vec<u8> {
        let mut out = Vec::new();
        let mut writer = BinaryDeltaWriter::new(&mut out);
        writer
            .write_metadata(&DeltaMetadata {
                expected_file_hash_algorithm_name: "XXH64".to_string(),
                expected_file_hash: BASE64.encode(HashAlgorithm::XxHash64.digest(new_data)),
            })
            .unwrap();
        build(&mut writer);
        writer.finish().unwrap();
        out
    }

    #[test]
    fn test_copy_and_data_commands() {
        let base = b"the quick brown fox jumps over the lazy dog".to_vec();
        let expected = b"the quick red fox".to_vec();
        let raw = delta_for(&expected, |writer| {
            writer.write_copy(0, 10).unwrap(); // "the quick "
            writer.write_data(b"red").unwrap();
            writer.write_copy(15, 4).unwrap(); // " fox"
        });

        let mut out = Vec::new();
        DeltaApplier::new()
            .apply(&mut Cursor::new(&base), &mut Cursor::new(raw), &mut out)
            .unwrap();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_integrity_failure_on_wrong_base() {
        let base = b"the quick brown fox jumps over the lazy dog".to_vec();
        let expected = b"the quick ".to_vec();
        let raw = delta_for(&expected, |writer| {
            writer.write_copy(0, 10).unwrap();
        });

        let mut tampered = base.clone();
        tampered[3] = b'Q';
        let mut out = Vec::new();
        let err = DeltaApplier::new()
            .apply(&mut Cursor::new(&tampered), &mut Cursor::new(raw), &mut out)
            .unwrap_err();
        assert!(matches!(err, DeltaError::IntegrityFailure { .. }));
        // The output was still produced; only the verdict failed.
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn test_skip_hash_check_accepts_wrong_base() {
        let base = b"0123456789".to_vec();
        let raw = delta_for(b"xxxxx", |writer| {
            writer.write_copy(0, 5).unwrap();
        });
        let mut out = Vec::new();
        DeltaApplier::new()
            .skip_hash_check(true)
            .apply(&mut Cursor::new(&base), &mut Cursor::new(raw), &mut out)
            .unwrap();
        assert_eq!(out, b"01234");
    }

    #[test]
    fn test_copy_past_end_of_base_fails() {
        let base = b"short".to_vec();
        let raw = delta_for(b"irrelevant", |writer| {
            writer.write_copy(0, 100).unwrap();
        });
        let mut out = Vec::new();
        let err = DeltaApplier::new()
            .apply(&mut Cursor::new(&base), &mut Cursor::new(raw), &mut out)
            .unwrap_err();
        assert!(matches!(err, DeltaError::Io(_)));
    }

    #[test]
    fn test_empty_delta_rebuilds_empty_stream() {
        let raw = delta_for(b"", |_| {});
        let mut out = Vec::new();
        DeltaApplier::new()
            .apply(&mut Cursor::new(b"base".to_vec()), &mut Cursor::new(raw), &mut out)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_cancellation() {
        let raw = delta_for(b"xx", |writer| {
            writer.write_data(b"xx").unwrap();
        });
        let token = CancelToken::new();
        token.cancel();
        let mut out = Vec::new();
        let err = DeltaApplier::new()
            .with_cancel(token)
            .apply(&mut Cursor::new(Vec::new()), &mut Cursor::new(raw), &mut out)
            .unwrap_err();
        assert!(matches!(err, DeltaError::Cancelled));
    }

    #[test]
    fn test_progress_reports_delta_stream_consumption() {
        use std::sync::{Arc, Mutex};

        let expected = b"abcdef".to_vec();
        let raw = delta_for(&expected, |writer| {
            writer.write_data(b"abc").unwrap();
            writer.write_data(b"def").unwrap();
        });
        let total = raw.len() as u64;
        let reports = Arc::new(Mutex::new(Vec::new()));
        let sink = reports.clone();
        let mut out = Vec::new();
        DeltaApplier::new()
            .with_progress(move |report| {
                assert_eq!(report.kind, ProgressKind::ApplyingDelta);
                sink.lock().unwrap().push((report.position, report.total));
            })
            .apply(&mut Cursor::new(Vec::new()), &mut Cursor::new(raw), &mut out)
            .unwrap();
        assert_eq!(out, expected);
        // Each three-byte data command is 12 bytes on the wire; the second
        // report sees the whole stream consumed.
        assert_eq!(
            *reports.lock().unwrap(),
            vec![(total - 12, total), (total, total)]
        );
    }
}
