//! Strong hashes.
//!
//! A strong hash confirms rolling-checksum matches and seals whole files:
//! signatures record one digest per chunk plus a provenance hash of the base
//! file, and deltas record the expected hash of the reconstructed file.
//!
//! The supported algorithms form a closed registry addressed by the names
//! recorded in metadata:
//!
//! - [`HashAlgorithm::XxHash64`] - xxHash64, the default (fast, 8 bytes)
//! - [`HashAlgorithm::XxHash3`] - XXH3 64-bit
//! - [`HashAlgorithm::Md5`] - MD5 (16 bytes, used for provenance hashes)
//! - [`HashAlgorithm::Sha1`] - SHA-1 (20 bytes)

mod hashers;

pub use hashers::StrongHasher;

use crate::error::DeltaError;

/// The closed registry of strong hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    /// xxHash64 with seed 0. Digest bytes are serialized little-endian.
    #[default]
    XxHash64,
    /// XXH3, 64-bit variant. Digest bytes are serialized little-endian.
    XxHash3,
    /// MD5.
    Md5,
    /// SHA-1.
    Sha1,
}

impl HashAlgorithm {
    /// Returns the name recorded in metadata.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::XxHash64 => "XXH64",
            HashAlgorithm::XxHash3 => "XXH3",
            HashAlgorithm::Md5 => "MD5",
            HashAlgorithm::Sha1 => "SHA1",
        }
    }

    /// Resolves a recorded name.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::UnsupportedAlgorithm`] for unknown names.
    pub fn from_name(name: &str) -> Result<Self, DeltaError> {
        match name {
            "XXH64" => Ok(HashAlgorithm::XxHash64),
            "XXH3" => Ok(HashAlgorithm::XxHash3),
            "MD5" => Ok(HashAlgorithm::Md5),
            "SHA1" => Ok(HashAlgorithm::Sha1),
            _ => Err(DeltaError::UnsupportedAlgorithm {
                name: name.to_string(),
            }),
        }
    }

    /// Digest length in bytes.
    pub fn hash_len(&self) -> usize {
        match self {
            HashAlgorithm::XxHash64 | HashAlgorithm::XxHash3 => 8,
            HashAlgorithm::Md5 => 16,
            HashAlgorithm::Sha1 => 20,
        }
    }

    /// Creates a streaming hasher for this algorithm.
    pub fn hasher(&self) -> StrongHasher {
        StrongHasher::new(*self)
    }

    /// Hashes a buffer in one shot.
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}
