//! Signatures: per-chunk descriptions of a base stream.
//!
//! A signature partitions the base stream into fixed-size chunks (the last
//! chunk may be short) and records, per chunk, a rolling checksum and a
//! strong hash. Built once per base version, it is immutable and may back any
//! number of concurrent delta computations.
//!
//! - [`SignatureBuilder`] - signs a base stream
//! - [`SignatureReader`] - parses a signature stream and builds the
//!   checksum-to-candidates index the matching engine queries
//! - [`Signature`] - the parsed, indexed result

mod builder;
mod reader;
mod writer;

pub use builder::SignatureBuilder;
pub use reader::SignatureReader;

#[cfg(feature = "async-io")]
pub use reader::read_signature_async;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::checksum::RollingAlgorithm;
use crate::config::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE};
use crate::error::DeltaError;
use crate::hash::HashAlgorithm;
use crate::wire::StreamFormat;

/// The signature record of a single base chunk.
///
/// A chunk's base offset is not serialized; it is the running sum of the
/// lengths of all preceding chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSignature {
    /// Byte offset of the chunk in the base stream.
    pub start_offset: u64,
    /// Chunk length; equal to the chunk size except possibly for the last
    /// chunk.
    pub length: u32,
    /// Rolling checksum of the chunk.
    pub rolling_checksum: u32,
    /// Strong hash of the chunk (length fixed by the hash algorithm).
    pub hash: Vec<u8>,
}

/// Signature metadata, serialized as the JSON block of the current format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureMetadata {
    /// Chunk size the base stream was partitioned with.
    pub chunk_size: u16,
    /// Name of the per-chunk strong hash algorithm.
    pub hash_algorithm_name: String,
    /// Name of the rolling checksum algorithm.
    pub rolling_checksum_algorithm_name: String,
    /// Name of the whole-base-file provenance hash algorithm.
    pub base_file_hash_algorithm_name: String,
    /// Base64 provenance hash of the whole base stream.
    pub base_file_hash: String,
}

/// A parsed signature: metadata, ordered chunks, and a lookup index from
/// rolling checksum to candidate chunks.
///
/// Checksum collisions are expected; the index keeps every colliding chunk
/// as a candidate and leaves disambiguation to the strong hash.
#[derive(Debug)]
pub struct Signature {
    format: StreamFormat,
    metadata: SignatureMetadata,
    hash: HashAlgorithm,
    rolling: RollingAlgorithm,
    chunk_size: u16,
    chunks: Vec<ChunkSignature>,
    index: HashMap<u32, Vec<u32>>,
}

impl Signature {
    pub(crate) fn from_parts(
        format: StreamFormat,
        metadata: SignatureMetadata,
        chunks: Vec<ChunkSignature>,
    ) -> Result<Self, DeltaError> {
        let hash = HashAlgorithm::from_name(&metadata.hash_algorithm_name)?;
        let rolling = RollingAlgorithm::from_name(&metadata.rolling_checksum_algorithm_name)?;

        let chunk_size = match format {
            StreamFormat::Current => {
                // Untrusted input; an out-of-bounds chunk size would defeat
                // the matcher's memory bounds.
                if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&metadata.chunk_size) {
                    return Err(DeltaError::format(format!(
                        "signature metadata declares chunk size {}, outside {}..={}",
                        metadata.chunk_size, MIN_CHUNK_SIZE, MAX_CHUNK_SIZE
                    )));
                }
                metadata.chunk_size
            }
            // The legacy format does not record the chunk size; every chunk
            // but the last has it, so the first record is authoritative.
            StreamFormat::Legacy => chunks
                .first()
                .map(|c| c.length as u16)
                .unwrap_or(DEFAULT_CHUNK_SIZE),
        };

        let mut index: HashMap<u32, Vec<u32>> = HashMap::new();
        for (i, chunk) in chunks.iter().enumerate() {
            index.entry(chunk.rolling_checksum).or_default().push(i as u32);
        }

        Ok(Self {
            format,
            metadata,
            hash,
            rolling,
            chunk_size,
            chunks,
            index,
        })
    }

    /// The wire format family the signature was read from.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// The signature metadata.
    pub fn metadata(&self) -> &SignatureMetadata {
        &self.metadata
    }

    /// The per-chunk strong hash algorithm.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    /// The rolling checksum algorithm.
    pub fn rolling_algorithm(&self) -> RollingAlgorithm {
        self.rolling
    }

    /// The chunk size the base stream was partitioned with.
    pub fn chunk_size(&self) -> u16 {
        self.chunk_size
    }

    /// The ordered chunk records.
    pub fn chunks(&self) -> &[ChunkSignature] {
        &self.chunks
    }

    /// Total length of the signed base stream.
    pub fn base_length(&self) -> u64 {
        self.chunks
            .last()
            .map(|c| c.start_offset + u64::from(c.length))
            .unwrap_or(0)
    }

    /// Indices of the chunks sharing `checksum`.
    pub(crate) fn candidates(&self, checksum: u32) -> &[u32] {
        self.index.get(&checksum).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(offset: u64, length: u32, checksum: u32) -> ChunkSignature {
        ChunkSignature {
            start_offset: offset,
            length,
            rolling_checksum: checksum,
            hash: vec![0; 8],
        }
    }

    fn metadata() -> SignatureMetadata {
        SignatureMetadata {
            chunk_size: 2048,
            hash_algorithm_name: "XXH64".to_string(),
            rolling_checksum_algorithm_name: "Adler32".to_string(),
            base_file_hash_algorithm_name: "MD5".to_string(),
            base_file_hash: String::new(),
        }
    }

    #[test]
    fn test_index_keeps_collisions() {
        let chunks = vec![
            chunk(0, 2048, 7),
            chunk(2048, 2048, 9),
            chunk(4096, 100, 7),
        ];
        let sig = Signature::from_parts(StreamFormat::Current, metadata(), chunks).unwrap();
        assert_eq!(sig.candidates(7), &[0, 2]);
        assert_eq!(sig.candidates(9), &[1]);
        assert!(sig.candidates(8).is_empty());
        assert_eq!(sig.base_length(), 4196);
    }

    #[test]
    fn test_legacy_chunk_size_from_first_record() {
        let chunks = vec![chunk(0, 512, 1), chunk(512, 100, 2)];
        let mut meta = metadata();
        meta.chunk_size = 0;
        let sig = Signature::from_parts(StreamFormat::Legacy, meta, chunks).unwrap();
        assert_eq!(sig.chunk_size(), 512);
    }

    #[test]
    fn test_out_of_bounds_chunk_size_rejected() {
        for chunk_size in [0u16, 127, 40_000] {
            let mut meta = metadata();
            meta.chunk_size = chunk_size;
            assert!(matches!(
                Signature::from_parts(StreamFormat::Current, meta, Vec::new()),
                Err(DeltaError::Format { .. })
            ));
        }
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let mut meta = metadata();
        meta.hash_algorithm_name = "WHIRLPOOL".to_string();
        assert!(matches!(
            Signature::from_parts(StreamFormat::Current, meta, Vec::new()),
            Err(DeltaError::UnsupportedAlgorithm { .. })
        ));
    }

    #[test]
    fn test_metadata_json_field_names() {
        let json = serde_json::to_string(&metadata()).unwrap();
        assert!(json.contains("\"chunkSize\":2048"));
        assert!(json.contains("\"hashAlgorithmName\":\"XXH64\""));
        assert!(json.contains("\"rollingChecksumAlgorithmName\":\"Adler32\""));
        assert!(json.contains("\"baseFileHashAlgorithmName\":\"MD5\""));
    }
}
