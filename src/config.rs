//! Configuration for signature generation.
//!
//! - [`SignatureOptions`] - Chunk size and algorithm selection for signing
//!
//! Chunk sizes are bounded so a per-chunk length always fits the 16-bit
//! records of the legacy wire format.

use crate::checksum::RollingAlgorithm;
use crate::error::DeltaError;
use crate::hash::HashAlgorithm;

/// Smallest allowed chunk size (128 bytes).
pub const MIN_CHUNK_SIZE: u16 = 128;

/// Default chunk size (2 KiB).
pub const DEFAULT_CHUNK_SIZE: u16 = 2048;

/// Largest allowed chunk size (31 KiB).
pub const MAX_CHUNK_SIZE: u16 = 31 * 1024;

/// Configuration for building a signature.
///
/// # Example
///
/// ```
/// use rdelta::{SignatureOptions, HashAlgorithm};
///
/// let options = SignatureOptions::default()
///     .with_chunk_size(4096)?
///     .with_hash_algorithm(HashAlgorithm::XxHash3);
/// assert_eq!(options.chunk_size(), 4096);
/// # Ok::<(), rdelta::DeltaError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureOptions {
    chunk_size: u16,
    hash: HashAlgorithm,
    rolling: RollingAlgorithm,
    base_file_hash: HashAlgorithm,
}

impl SignatureOptions {
    /// Creates options with the given chunk size and the default algorithms.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::InvalidConfig`] if `chunk_size` is outside
    /// `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
    pub fn new(chunk_size: u16) -> Result<Self, DeltaError> {
        Self::default().with_chunk_size(chunk_size)
    }

    /// Sets the chunk size, validating the bounds.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::InvalidConfig`] if `chunk_size` is outside
    /// `[MIN_CHUNK_SIZE, MAX_CHUNK_SIZE]`.
    pub fn with_chunk_size(mut self, chunk_size: u16) -> Result<Self, DeltaError> {
        if chunk_size < MIN_CHUNK_SIZE {
            return Err(DeltaError::InvalidConfig {
                message: "chunk size is below the minimum of 128 bytes",
            });
        }
        if chunk_size > MAX_CHUNK_SIZE {
            return Err(DeltaError::InvalidConfig {
                message: "chunk size is above the maximum of 31 KiB",
            });
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    /// Sets the per-chunk strong hash algorithm.
    pub fn with_hash_algorithm(mut self, hash: HashAlgorithm) -> Self {
        self.hash = hash;
        self
    }

    /// Sets the rolling checksum algorithm.
    pub fn with_rolling_algorithm(mut self, rolling: RollingAlgorithm) -> Self {
        self.rolling = rolling;
        self
    }

    /// Sets the algorithm for the whole-base-file provenance hash recorded in
    /// the signature metadata.
    pub fn with_base_file_hash_algorithm(mut self, hash: HashAlgorithm) -> Self {
        self.base_file_hash = hash;
        self
    }

    /// Returns the chunk size.
    pub fn chunk_size(&self) -> u16 {
        self.chunk_size
    }

    /// Returns the per-chunk strong hash algorithm.
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash
    }

    /// Returns the rolling checksum algorithm.
    pub fn rolling_algorithm(&self) -> RollingAlgorithm {
        self.rolling
    }

    /// Returns the base-file provenance hash algorithm.
    pub fn base_file_hash_algorithm(&self) -> HashAlgorithm {
        self.base_file_hash
    }
}

impl Default for SignatureOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            hash: HashAlgorithm::default(),
            rolling: RollingAlgorithm::default(),
            base_file_hash: HashAlgorithm::Md5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = SignatureOptions::default();
        assert_eq!(options.chunk_size(), DEFAULT_CHUNK_SIZE);
        assert_eq!(options.hash_algorithm(), HashAlgorithm::XxHash64);
        assert_eq!(options.rolling_algorithm(), RollingAlgorithm::Adler32);
        assert_eq!(options.base_file_hash_algorithm(), HashAlgorithm::Md5);
    }

    #[test]
    fn test_chunk_size_bounds() {
        assert!(SignatureOptions::new(MIN_CHUNK_SIZE).is_ok());
        assert!(SignatureOptions::new(MAX_CHUNK_SIZE).is_ok());
        assert!(SignatureOptions::new(MIN_CHUNK_SIZE - 1).is_err());
        assert!(SignatureOptions::new(MAX_CHUNK_SIZE + 1).is_err());
    }

    #[test]
    fn test_builder_pattern() {
        let options = SignatureOptions::default()
            .with_hash_algorithm(HashAlgorithm::Sha1)
            .with_rolling_algorithm(RollingAlgorithm::Adler32V3);
        assert_eq!(options.hash_algorithm(), HashAlgorithm::Sha1);
        assert_eq!(options.rolling_algorithm(), RollingAlgorithm::Adler32V3);
    }
}
