//! Streaming hasher implementations backing the [`HashAlgorithm`] registry.

use md5::digest::FixedOutputReset;
use md5::{Digest, Md5};
use sha1::Sha1;
use xxhash_rust::xxh3::Xxh3;
use xxhash_rust::xxh64::Xxh64;

use super::HashAlgorithm;

/// Incremental strong hasher.
///
/// `finalize` yields the digest in wire byte order and resets the hasher for
/// reuse. The xxHash digests are serialized little-endian; MD5 and SHA-1 use
/// their standard digest byte sequences.
pub struct StrongHasher {
    state: State,
}

enum State {
    Xxh64(Xxh64),
    Xxh3(Box<Xxh3>),
    Md5(Md5),
    Sha1(Sha1),
}

impl StrongHasher {
    pub(crate) fn new(algorithm: HashAlgorithm) -> Self {
        let state = match algorithm {
            HashAlgorithm::XxHash64 => State::Xxh64(Xxh64::new(0)),
            HashAlgorithm::XxHash3 => State::Xxh3(Box::new(Xxh3::new())),
            HashAlgorithm::Md5 => State::Md5(Md5::new()),
            HashAlgorithm::Sha1 => State::Sha1(Sha1::new()),
        };
        Self { state }
    }

    /// Feeds more data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            State::Xxh64(h) => h.update(data),
            State::Xxh3(h) => h.update(data),
            State::Md5(h) => Digest::update(h, data),
            State::Sha1(h) => Digest::update(h, data),
        }
    }

    /// Returns the digest of everything fed so far and resets the hasher.
    pub fn finalize(&mut self) -> Vec<u8> {
        match &mut self.state {
            State::Xxh64(h) => {
                let digest = h.digest();
                h.reset(0);
                digest.to_le_bytes().to_vec()
            }
            State::Xxh3(h) => {
                let digest = h.digest();
                h.reset();
                digest.to_le_bytes().to_vec()
            }
            State::Md5(h) => h.finalize_fixed_reset().to_vec(),
            State::Sha1(h) => h.finalize_fixed_reset().to_vec(),
        }
    }
}
