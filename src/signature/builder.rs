//! Signature construction.

use std::io::{Read, Seek, SeekFrom, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tracing::debug;

use crate::config::SignatureOptions;
use crate::error::DeltaError;
use crate::progress::{self, CancelToken, ProgressHandler, ProgressKind, ProgressReport};
use crate::wire;

use super::writer::SignatureWriter;
use super::SignatureMetadata;

const HASH_BUF_LEN: usize = 64 * 1024;

/// Builds a signature of a base stream.
///
/// The base is traversed twice: one pass computes the provenance hash that
/// the leading metadata block records, a second pass signs each chunk. The
/// input must therefore be seekable.
///
/// # Example
///
/// ```no_run
/// use std::fs::File;
/// use std::io::BufReader;
/// use rdelta::SignatureBuilder;
///
/// let mut base = BufReader::new(File::open("base.bin")?);
/// let mut out = File::create("base.sig")?;
/// SignatureBuilder::new().build(&mut base, &mut out)?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct SignatureBuilder {
    options: SignatureOptions,
    progress: Option<ProgressHandler>,
    cancel: Option<CancelToken>,
}

impl SignatureBuilder {
    /// Creates a builder with default options.
    pub fn new() -> Self {
        Self::with_options(SignatureOptions::default())
    }

    /// Creates a builder with the given options.
    pub fn with_options(options: SignatureOptions) -> Self {
        Self {
            options,
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

    /// Signs `base` and writes the signature stream to `output`.
    ///
    /// # Errors
    ///
    /// Fails on I/O errors from either stream and on cancellation.
    pub fn build<R, W>(mut self, base: &mut R, output: &mut W) -> Result<(), DeltaError>
    where
        R: Read + Seek,
        W: Write,
    {
        let total = base.seek(SeekFrom::End(0))?;
        base.seek(SeekFrom::Start(0))?;

        let base_file_hash = self.hash_pass(base, total)?;
        base.seek(SeekFrom::Start(0))?;

        let metadata = self.metadata(&base_file_hash);
        let mut writer = SignatureWriter::new(output);
        writer.write_header(&metadata)?;

        let chunk_size = usize::from(self.options.chunk_size());
        let hash = self.options.hash_algorithm();
        let rolling = self.options.rolling_algorithm();
        let mut buf = vec![0u8; chunk_size];
        let mut position = 0u64;
        let mut chunks = 0u64;
        loop {
            CancelToken::check(&self.cancel)?;
            let filled = wire::read_full(base, &mut buf)?;
            if filled == 0 {
                break;
            }
            let window = &buf[..filled];
            writer.write_chunk(filled as u32, rolling.calculate(window), &hash.digest(window))?;
            position += filled as u64;
            chunks += 1;
            progress::report(
                &mut self.progress,
                ProgressKind::BuildingSignature,
                position,
                total,
            );
            if filled < chunk_size {
                break;
            }
        }
        writer.finish()?;
        debug!(chunks, bytes = position, chunk_size, "signature built");
        Ok(())
    }

    /// Async counterpart of [`build`](Self::build). Produces bytes identical
    /// to the sync path for the same input.
    #[cfg(feature = "async-io")]
    pub async fn build_async<R, W>(mut self, base: &mut R, output: &mut W) -> Result<(), DeltaError>
    where
        R: futures_io::AsyncRead + futures_io::AsyncSeek + Unpin,
        W: futures_io::AsyncWrite + Unpin,
    {
        use futures_util::{AsyncSeekExt, AsyncWriteExt};

        let total = base.seek(SeekFrom::End(0)).await?;
        base.seek(SeekFrom::Start(0)).await?;

        let base_file_hash = self.hash_pass_async(base, total).await?;
        base.seek(SeekFrom::Start(0)).await?;

        let metadata = self.metadata(&base_file_hash);
        output.write_all(&super::writer::encode_header(&metadata)?).await?;

        let chunk_size = usize::from(self.options.chunk_size());
        let hash = self.options.hash_algorithm();
        let rolling = self.options.rolling_algorithm();
        let mut buf = vec![0u8; chunk_size];
        let mut position = 0u64;
        let mut chunks = 0u64;
        loop {
            CancelToken::check(&self.cancel)?;
            let filled = wire::asynchronous::read_full(base, &mut buf).await?;
            if filled == 0 {
                break;
            }
            let window = &buf[..filled];
            let record =
                super::writer::encode_chunk(filled as u32, rolling.calculate(window), &hash.digest(window));
            output.write_all(&record).await?;
            position += filled as u64;
            chunks += 1;
            progress::report(
                &mut self.progress,
                ProgressKind::BuildingSignature,
                position,
                total,
            );
            if filled < chunk_size {
                break;
            }
        }
        output.flush().await?;
        debug!(chunks, bytes = position, chunk_size, "signature built");
        Ok(())
    }

    fn metadata(&self, base_file_hash: &[u8]) -> SignatureMetadata {
        SignatureMetadata {
            chunk_size: self.options.chunk_size(),
            hash_algorithm_name: self.options.hash_algorithm().name().to_string(),
            rolling_checksum_algorithm_name: self.options.rolling_algorithm().name().to_string(),
            base_file_hash_algorithm_name: self
                .options
                .base_file_hash_algorithm()
                .name()
                .to_string(),
            base_file_hash: BASE64.encode(base_file_hash),
        }
    }

    fn hash_pass<R: Read>(&mut self, base: &mut R, total: u64) -> Result<Vec<u8>, DeltaError> {
        let mut hasher = self.options.base_file_hash_algorithm().hasher();
        let mut buf = vec![0u8; HASH_BUF_LEN];
        let mut position = 0u64;
        loop {
            CancelToken::check(&self.cancel)?;
            let n = wire::read_full(base, &mut buf)?;
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
        base: &mut R,
        total: u64,
    ) -> Result<Vec<u8>, DeltaError> {
        let mut hasher = self.options.base_file_hash_algorithm().hasher();
        let mut buf = vec![0u8; HASH_BUF_LEN];
        let mut position = 0u64;
        loop {
            CancelToken::check(&self.cancel)?;
            let n = wire::asynchronous::read_full(base, &mut buf).await?;
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

impl Default for SignatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::hash::HashAlgorithm;

    fn build(data: &[u8], options: SignatureOptions) -> Vec<u8> {
        let mut out = Vec::new();
        SignatureBuilder::with_options(options)
            .build(&mut Cursor::new(data), &mut out)
            .unwrap();
        out
    }

    /// Splits a signature stream into its JSON metadata and chunk records,
    /// decoding the varint string prefix after the magic and version.
    fn split_header(out: &[u8]) -> (SignatureMetadata, &[u8]) {
        assert_eq!(&out[..7], b"FRSNCSG");
        assert_eq!(out[7], 0x01);
        let mut len = 0usize;
        let mut shift = 0;
        let mut i = 8;
        loop {
            let byte = out[i];
            i += 1;
            len |= usize::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        let metadata = serde_json::from_slice(&out[i..i + len]).unwrap();
        (metadata, &out[i + len..])
    }

    #[test]
    fn test_empty_input_has_header_only() {
        let out = build(b"", SignatureOptions::default());
        let (metadata, records) = split_header(&out);
        assert_eq!(metadata.chunk_size, 2048);
        assert!(records.is_empty());
    }

    #[test]
    fn test_chunk_count_and_short_tail() {
        let options = SignatureOptions::new(128).unwrap();
        let data = vec![7u8; 128 * 3 + 50];
        let out = build(&data, options);
        let (_, records) = split_header(&out);
        // Three full records and one short one, 16 bytes each (4 + 4 + 8).
        assert_eq!(records.len(), 4 * 16);
        let last = &records[3 * 16..];
        assert_eq!(i32::from_le_bytes(last[..4].try_into().unwrap()), 50);
    }

    #[test]
    fn test_metadata_records_provenance_hash() {
        let data = b"provenance hash input".to_vec();
        let out = build(&data, SignatureOptions::default());
        let (metadata, _) = split_header(&out);
        assert_eq!(metadata.base_file_hash_algorithm_name, "MD5");
        let expected = BASE64.encode(HashAlgorithm::Md5.digest(&data));
        assert_eq!(metadata.base_file_hash, expected);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail_record() {
        let options = SignatureOptions::new(128).unwrap();
        let out = build(&vec![1u8; 256], options);
        let (_, records) = split_header(&out);
        assert_eq!(records.len(), 2 * 16);
    }

    #[test]
    fn test_cancellation() {
        let token = CancelToken::new();
        token.cancel();
        let mut out = Vec::new();
        let err = SignatureBuilder::new()
            .with_cancel(token)
            .build(&mut Cursor::new(vec![0u8; 4096]), &mut out)
            .unwrap_err();
        assert!(matches!(err, DeltaError::Cancelled));
    }

    #[test]
    fn test_progress_reports_both_phases() {
        use std::sync::{Arc, Mutex};

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut out = Vec::new();
        SignatureBuilder::with_options(SignatureOptions::new(128).unwrap())
            .with_progress(move |report| sink.lock().unwrap().push(report.kind))
            .build(&mut Cursor::new(vec![0u8; 300]), &mut out)
            .unwrap();
        let kinds = seen.lock().unwrap();
        assert!(kinds.contains(&ProgressKind::HashingFile));
        assert!(kinds.contains(&ProgressKind::BuildingSignature));
    }
}
