//! Signature parsing, for both the current and the legacy wire format.

use std::io::Read;

use tracing::debug;

use crate::error::DeltaError;
use crate::hash::HashAlgorithm;
use crate::progress::{self, ProgressHandler, ProgressKind, ProgressReport};
use crate::wire::{
    self, LEGACY_END_OF_METADATA, LEGACY_SIGNATURE_MAGIC, SIGNATURE_MAGIC, StreamFormat,
};

use super::{ChunkSignature, Signature, SignatureMetadata};

/// Parses a signature stream into an indexed [`Signature`].
///
/// The format is detected from the magic: the current format and the legacy
/// format are both accepted, anything else is rejected as a format error.
/// Only sequential reads are performed, so any `Read` source works.
pub struct SignatureReader<R> {
    reader: R,
    progress: Option<ProgressHandler>,
}

impl<R: Read> SignatureReader<R> {
    /// Wraps a signature stream.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            progress: None,
        }
    }

    /// Installs a progress callback. The stream length is not known up front,
    /// so reports carry a zero total and a growing byte position.
    pub fn with_progress(mut self, handler: impl FnMut(ProgressReport) + Send + 'static) -> Self {
        self.progress = Some(Box::new(handler));
        self
    }

    /// Reads the whole stream and returns the parsed signature.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::Format`] for unrecognized magics, truncated
    /// records, and corrupt metadata, and
    /// [`DeltaError::UnsupportedAlgorithm`] for unknown algorithm names.
    pub fn read_signature(mut self) -> Result<Signature, DeltaError> {
        let mut magic = [0u8; SIGNATURE_MAGIC.len()];
        wire::read_exact(&mut self.reader, &mut magic, "signature magic")?;

        let (format, metadata) = if magic == SIGNATURE_MAGIC {
            wire::read_version(&mut self.reader, "signature")?;
            let json = wire::read_string(&mut self.reader, "signature metadata")?;
            (StreamFormat::Current, serde_json::from_str(&json)?)
        } else if magic == LEGACY_SIGNATURE_MAGIC {
            wire::read_version(&mut self.reader, "signature")?;
            (StreamFormat::Legacy, self.read_legacy_metadata()?)
        } else {
            return Err(DeltaError::format(
                "stream does not begin with a recognized signature magic",
            ));
        };

        let hash = HashAlgorithm::from_name(&metadata.hash_algorithm_name)?;
        let chunks = self.read_chunks(format, hash.hash_len())?;
        debug!(?format, chunks = chunks.len(), "signature read");
        Signature::from_parts(format, metadata, chunks)
    }

    fn read_legacy_metadata(&mut self) -> Result<SignatureMetadata, DeltaError> {
        let hash_name = wire::read_string(&mut self.reader, "signature hash algorithm")?;
        let rolling_name = wire::read_string(&mut self.reader, "signature rolling algorithm")?;
        read_end_of_metadata(&mut self.reader)?;
        // The legacy format records no provenance hash; those fields stay
        // empty and are never consulted for legacy signatures.
        Ok(SignatureMetadata {
            chunk_size: 0,
            hash_algorithm_name: hash_name,
            rolling_checksum_algorithm_name: rolling_name,
            base_file_hash_algorithm_name: String::new(),
            base_file_hash: String::new(),
        })
    }

    fn read_chunks(
        &mut self,
        format: StreamFormat,
        hash_len: usize,
    ) -> Result<Vec<ChunkSignature>, DeltaError> {
        let len_width = match format {
            StreamFormat::Current => 4,
            StreamFormat::Legacy => 2,
        };
        let mut chunks = Vec::new();
        let mut offset = 0u64;
        let mut consumed = 0u64;
        let mut len_buf = [0u8; 4];
        loop {
            if !wire::read_exact_or_eof(
                &mut self.reader,
                &mut len_buf[..len_width],
                "signature chunk record",
            )? {
                break;
            }
            let length = match format {
                StreamFormat::Current => {
                    i64::from(i32::from_le_bytes(len_buf))
                }
                StreamFormat::Legacy => {
                    i64::from(i16::from_le_bytes([len_buf[0], len_buf[1]]))
                }
            };
            if length <= 0 {
                return Err(DeltaError::format(format!(
                    "signature chunk record declares invalid length {}",
                    length
                )));
            }
            let mut checksum_buf = [0u8; 4];
            wire::read_exact(&mut self.reader, &mut checksum_buf, "signature chunk checksum")?;
            let mut hash = vec![0u8; hash_len];
            wire::read_exact(&mut self.reader, &mut hash, "signature chunk hash")?;

            chunks.push(ChunkSignature {
                start_offset: offset,
                length: length as u32,
                rolling_checksum: u32::from_le_bytes(checksum_buf),
                hash,
            });
            offset += length as u64;
            consumed += (len_width + 4 + hash_len) as u64;
            progress::report(&mut self.progress, ProgressKind::ReadingSignature, consumed, 0);
        }
        Ok(chunks)
    }
}

fn read_end_of_metadata(reader: &mut impl Read) -> Result<(), DeltaError> {
    let mut marker = [0u8; LEGACY_END_OF_METADATA.len()];
    wire::read_exact(reader, &mut marker, "signature end-of-metadata marker")?;
    if marker != LEGACY_END_OF_METADATA {
        return Err(DeltaError::format(
            "signature end-of-metadata marker is corrupt",
        ));
    }
    Ok(())
}

/// Async counterpart of [`SignatureReader::read_signature`].
#[cfg(feature = "async-io")]
pub async fn read_signature_async<R>(mut reader: R) -> Result<Signature, DeltaError>
where
    R: futures_io::AsyncRead + Unpin,
{
    use crate::wire::asynchronous as awire;

    let mut magic = [0u8; SIGNATURE_MAGIC.len()];
    awire::read_exact(&mut reader, &mut magic, "signature magic").await?;

    let (format, metadata) = if magic == SIGNATURE_MAGIC {
        awire::read_version(&mut reader, "signature").await?;
        let json = awire::read_string(&mut reader, "signature metadata").await?;
        (StreamFormat::Current, serde_json::from_str(&json)?)
    } else if magic == LEGACY_SIGNATURE_MAGIC {
        awire::read_version(&mut reader, "signature").await?;
        let hash_name = awire::read_string(&mut reader, "signature hash algorithm").await?;
        let rolling_name = awire::read_string(&mut reader, "signature rolling algorithm").await?;
        let mut marker = [0u8; LEGACY_END_OF_METADATA.len()];
        awire::read_exact(&mut reader, &mut marker, "signature end-of-metadata marker").await?;
        if marker != LEGACY_END_OF_METADATA {
            return Err(DeltaError::format(
                "signature end-of-metadata marker is corrupt",
            ));
        }
        let metadata = SignatureMetadata {
            chunk_size: 0,
            hash_algorithm_name: hash_name,
            rolling_checksum_algorithm_name: rolling_name,
            base_file_hash_algorithm_name: String::new(),
            base_file_hash: String::new(),
        };
        (StreamFormat::Legacy, metadata)
    } else {
        return Err(DeltaError::format(
            "stream does not begin with a recognized signature magic",
        ));
    };

    let hash = HashAlgorithm::from_name(&metadata.hash_algorithm_name)?;
    let hash_len = hash.hash_len();
    let len_width = match format {
        StreamFormat::Current => 4,
        StreamFormat::Legacy => 2,
    };
    let mut chunks = Vec::new();
    let mut offset = 0u64;
    let mut len_buf = [0u8; 4];
    loop {
        if !awire::read_exact_or_eof(
            &mut reader,
            &mut len_buf[..len_width],
            "signature chunk record",
        )
        .await?
        {
            break;
        }
        let length = match format {
            StreamFormat::Current => i64::from(i32::from_le_bytes(len_buf)),
            StreamFormat::Legacy => i64::from(i16::from_le_bytes([len_buf[0], len_buf[1]])),
        };
        if length <= 0 {
            return Err(DeltaError::format(format!(
                "signature chunk record declares invalid length {}",
                length
            )));
        }
        let mut checksum_buf = [0u8; 4];
        awire::read_exact(&mut reader, &mut checksum_buf, "signature chunk checksum").await?;
        let mut hash_bytes = vec![0u8; hash_len];
        awire::read_exact(&mut reader, &mut hash_bytes, "signature chunk hash").await?;
        chunks.push(ChunkSignature {
            start_offset: offset,
            length: length as u32,
            rolling_checksum: u32::from_le_bytes(checksum_buf),
            hash: hash_bytes,
        });
        offset += length as u64;
    }
    Signature::from_parts(format, metadata, chunks)
}
