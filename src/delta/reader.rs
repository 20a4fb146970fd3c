//! Delta parsing, for both the current and the legacy wire format.

use std::io::Read;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::DeltaError;
use crate::hash::HashAlgorithm;
use crate::wire::{
    self, COPY_COMMAND, DATA_COMMAND, DELTA_MAGIC, LEGACY_DELTA_MAGIC, LEGACY_END_OF_METADATA,
    StreamFormat,
};

use super::{DeltaCommand, DeltaMetadata};

/// An implausible declared hash length marks a corrupt legacy header.
const MAX_LEGACY_HASH_LEN: i32 = 256;

#[derive(Debug)]
struct Header {
    format: StreamFormat,
    metadata: DeltaMetadata,
    hash: HashAlgorithm,
    expected_hash: Vec<u8>,
}

fn header_from_metadata(
    format: StreamFormat,
    metadata: DeltaMetadata,
    expected_hash: Vec<u8>,
) -> Result<Header, DeltaError> {
    let hash = HashAlgorithm::from_name(&metadata.expected_file_hash_algorithm_name)?;
    if expected_hash.len() != hash.hash_len() {
        return Err(DeltaError::format(format!(
            "expected file hash is {} bytes but {} produces {}",
            expected_hash.len(),
            hash.name(),
            hash.hash_len()
        )));
    }
    Ok(Header {
        format,
        metadata,
        hash,
        expected_hash,
    })
}

/// Parses a delta stream: header eagerly, commands on demand.
///
/// The format is detected from the magic; the current format and the legacy
/// format are both accepted. Commands are pulled with
/// [`next_command`](Self::next_command); a data command's payload must be
/// drained with [`read_literal`](Self::read_literal) before the next pull.
#[derive(Debug)]
pub struct BinaryDeltaReader<R: Read> {
    reader: R,
    header: Header,
}

impl<R: Read> BinaryDeltaReader<R> {
    /// Wraps a delta stream and parses its header.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::Format`] for unrecognized magics and corrupt
    /// metadata, and [`DeltaError::UnsupportedAlgorithm`] for unknown hash
    /// names.
    pub fn new(mut reader: R) -> Result<Self, DeltaError> {
        let mut magic = [0u8; DELTA_MAGIC.len()];
        wire::read_exact(&mut reader, &mut magic, "delta magic")?;

        let header = if magic == DELTA_MAGIC {
            wire::read_version(&mut reader, "delta")?;
            let json = wire::read_string(&mut reader, "delta metadata")?;
            let metadata: DeltaMetadata = serde_json::from_str(&json)?;
            let expected_hash = BASE64
                .decode(&metadata.expected_file_hash)
                .map_err(|_| DeltaError::format("expected file hash is not valid base64"))?;
            header_from_metadata(StreamFormat::Current, metadata, expected_hash)?
        } else if magic == LEGACY_DELTA_MAGIC {
            wire::read_version(&mut reader, "delta")?;
            let hash_name = wire::read_string(&mut reader, "delta hash algorithm")?;
            let hash_len = wire::read_i32(&mut reader, "delta hash length")?;
            if !(0..=MAX_LEGACY_HASH_LEN).contains(&hash_len) {
                return Err(DeltaError::format(format!(
                    "delta header declares invalid hash length {}",
                    hash_len
                )));
            }
            let mut expected_hash = vec![0u8; hash_len as usize];
            wire::read_exact(&mut reader, &mut expected_hash, "delta expected hash")?;
            let mut marker = [0u8; LEGACY_END_OF_METADATA.len()];
            wire::read_exact(&mut reader, &mut marker, "delta end-of-metadata marker")?;
            if marker != LEGACY_END_OF_METADATA {
                return Err(DeltaError::format("delta end-of-metadata marker is corrupt"));
            }
            let metadata = DeltaMetadata {
                expected_file_hash_algorithm_name: hash_name,
                expected_file_hash: BASE64.encode(&expected_hash),
            };
            header_from_metadata(StreamFormat::Legacy, metadata, expected_hash)?
        } else {
            return Err(DeltaError::format(
                "stream does not begin with a recognized delta magic",
            ));
        };

        Ok(Self { reader, header })
    }

    /// The wire format family the stream was recognized as.
    pub fn format(&self) -> StreamFormat {
        self.header.format
    }

    /// The parsed metadata block.
    pub fn metadata(&self) -> &DeltaMetadata {
        &self.header.metadata
    }

    /// The hash algorithm of the expected file hash.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.header.hash
    }

    /// The strong hash the reconstructed stream must have.
    pub fn expected_hash(&self) -> &[u8] {
        &self.header.expected_hash
    }

    /// Returns a reference to the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Reads the next command header, or `None` at a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::Format`] for unknown command tags, negative
    /// offsets or lengths, and truncation inside a command.
    pub fn next_command(&mut self) -> Result<Option<DeltaCommand>, DeltaError> {
        let mut tag = [0u8; 1];
        if !wire::read_exact_or_eof(&mut self.reader, &mut tag, "delta command")? {
            return Ok(None);
        }
        match tag[0] {
            COPY_COMMAND => {
                let offset = wire::read_i64(&mut self.reader, "copy command offset")?;
                let length = wire::read_i64(&mut self.reader, "copy command length")?;
                if offset < 0 || length < 0 {
                    return Err(DeltaError::format("copy command range is negative"));
                }
                Ok(Some(DeltaCommand::Copy {
                    offset: offset as u64,
                    length: length as u64,
                }))
            }
            DATA_COMMAND => {
                let length = wire::read_i64(&mut self.reader, "data command length")?;
                if length < 0 {
                    return Err(DeltaError::format("data command length is negative"));
                }
                Ok(Some(DeltaCommand::Data {
                    length: length as u64,
                }))
            }
            tag => Err(DeltaError::format(format!(
                "unknown delta command tag 0x{:02x}",
                tag
            ))),
        }
    }

    /// Reads part of the payload of the last data command.
    ///
    /// The caller tracks how much of the declared length remains; truncation
    /// is a format error.
    pub fn read_literal(&mut self, buf: &mut [u8]) -> Result<(), DeltaError> {
        wire::read_exact(&mut self.reader, buf, "data command payload")
    }
}

/// Async counterpart of [`BinaryDeltaReader`].
#[cfg(feature = "async-io")]
#[derive(Debug)]
pub struct AsyncBinaryDeltaReader<R: futures_io::AsyncRead + Unpin> {
    reader: R,
    header: Header,
}

#[cfg(feature = "async-io")]
impl<R: futures_io::AsyncRead + Unpin> AsyncBinaryDeltaReader<R> {
    /// Wraps a delta stream and parses its header.
    pub async fn new(mut reader: R) -> Result<Self, DeltaError> {
        use crate::wire::asynchronous as awire;

        let mut magic = [0u8; DELTA_MAGIC.len()];
        awire::read_exact(&mut reader, &mut magic, "delta magic").await?;

        let header = if magic == DELTA_MAGIC {
            awire::read_version(&mut reader, "delta").await?;
            let json = awire::read_string(&mut reader, "delta metadata").await?;
            let metadata: DeltaMetadata = serde_json::from_str(&json)?;
            let expected_hash = BASE64
                .decode(&metadata.expected_file_hash)
                .map_err(|_| DeltaError::format("expected file hash is not valid base64"))?;
            header_from_metadata(StreamFormat::Current, metadata, expected_hash)?
        } else if magic == LEGACY_DELTA_MAGIC {
            awire::read_version(&mut reader, "delta").await?;
            let hash_name = awire::read_string(&mut reader, "delta hash algorithm").await?;
            let hash_len = awire::read_i32(&mut reader, "delta hash length").await?;
            if !(0..=MAX_LEGACY_HASH_LEN).contains(&hash_len) {
                return Err(DeltaError::format(format!(
                    "delta header declares invalid hash length {}",
                    hash_len
                )));
            }
            let mut expected_hash = vec![0u8; hash_len as usize];
            awire::read_exact(&mut reader, &mut expected_hash, "delta expected hash").await?;
            let mut marker = [0u8; LEGACY_END_OF_METADATA.len()];
            awire::read_exact(&mut reader, &mut marker, "delta end-of-metadata marker").await?;
            if marker != LEGACY_END_OF_METADATA {
                return Err(DeltaError::format("delta end-of-metadata marker is corrupt"));
            }
            let metadata = DeltaMetadata {
                expected_file_hash_algorithm_name: hash_name,
                expected_file_hash: BASE64.encode(&expected_hash),
            };
            header_from_metadata(StreamFormat::Legacy, metadata, expected_hash)?
        } else {
            return Err(DeltaError::format(
                "stream does not begin with a recognized delta magic",
            ));
        };

        Ok(Self { reader, header })
    }

    /// The wire format family the stream was recognized as.
    pub fn format(&self) -> StreamFormat {
        self.header.format
    }

    /// The parsed metadata block.
    pub fn metadata(&self) -> &DeltaMetadata {
        &self.header.metadata
    }

    /// The hash algorithm of the expected file hash.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.header.hash
    }

    /// The strong hash the reconstructed stream must have.
    pub fn expected_hash(&self) -> &[u8] {
        &self.header.expected_hash
    }

    /// Returns a reference to the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Reads the next command header, or `None` at a clean end of stream.
    pub async fn next_command(&mut self) -> Result<Option<DeltaCommand>, DeltaError> {
        use crate::wire::asynchronous as awire;

        let mut tag = [0u8; 1];
        if !awire::read_exact_or_eof(&mut self.reader, &mut tag, "delta command").await? {
            return Ok(None);
        }
        match tag[0] {
            COPY_COMMAND => {
                let offset = awire::read_i64(&mut self.reader, "copy command offset").await?;
                let length = awire::read_i64(&mut self.reader, "copy command length").await?;
                if offset < 0 || length < 0 {
                    return Err(DeltaError::format("copy command range is negative"));
                }
                Ok(Some(DeltaCommand::Copy {
                    offset: offset as u64,
                    length: length as u64,
                }))
            }
            DATA_COMMAND => {
                let length = awire::read_i64(&mut self.reader, "data command length").await?;
                if length < 0 {
                    return Err(DeltaError::format("data command length is negative"));
                }
                Ok(Some(DeltaCommand::Data {
                    length: length as u64,
                }))
            }
            tag => Err(DeltaError::format(format!(
                "unknown delta command tag 0x{:02x}",
                tag
            ))),
        }
    }

    /// Reads part of the payload of the last data command.
    pub async fn read_literal(&mut self, buf: &mut [u8]) -> Result<(), DeltaError> {
        crate::wire::asynchronous::read_exact(&mut self.reader, buf, "data command payload").await
    }
}
