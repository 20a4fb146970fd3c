//! Rolling checksums.
//!
//! A rolling checksum is the cheap pre-filter of the matching engine: a
//! fixed-size window slides over the new stream one byte at a time, and
//! [`RollingAlgorithm::rotate`] updates the checksum in O(1) instead of
//! recomputing the window. Equal checksums only nominate candidates; a strong
//! hash confirms every match.
//!
//! The supported algorithms form a closed registry, addressed by the names
//! recorded in signature metadata.

mod adler32;

use crate::error::DeltaError;

/// The closed registry of rolling checksum algorithms.
///
/// `Adler32` is the default and the only revision writers record. The later
/// revisions exist to read and verify streams that were produced with them;
/// they are never silently substituted for the default, because the default's
/// exact arithmetic (including its 16-bit truncation quirk) is part of the
/// recorded format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RollingAlgorithm {
    /// Original two-accumulator rolling sum with 16-bit truncation.
    #[default]
    Adler32,
    /// Mod-65521 revision with a signed-remainder defect in `rotate`.
    Adler32V2,
    /// Corrected mod-65521 revision.
    Adler32V3,
}

impl RollingAlgorithm {
    /// Returns the name recorded in signature metadata.
    pub fn name(&self) -> &'static str {
        match self {
            RollingAlgorithm::Adler32 => "Adler32",
            RollingAlgorithm::Adler32V2 => "Adler32V2",
            RollingAlgorithm::Adler32V3 => "Adler32V3",
        }
    }

    /// Resolves a recorded name.
    ///
    /// # Errors
    ///
    /// Returns [`DeltaError::UnsupportedAlgorithm`] for unknown names.
    pub fn from_name(name: &str) -> Result<Self, DeltaError> {
        match name {
            "Adler32" => Ok(RollingAlgorithm::Adler32),
            "Adler32V2" => Ok(RollingAlgorithm::Adler32V2),
            "Adler32V3" => Ok(RollingAlgorithm::Adler32V3),
            _ => Err(DeltaError::UnsupportedAlgorithm {
                name: name.to_string(),
            }),
        }
    }

    /// Computes the checksum of a full window.
    pub fn calculate(&self, data: &[u8]) -> u32 {
        match self {
            RollingAlgorithm::Adler32 => adler32::v1_calculate(data),
            RollingAlgorithm::Adler32V2 => adler32::v2_calculate(data),
            RollingAlgorithm::Adler32V3 => adler32::v3_calculate(data),
        }
    }

    /// Slides a window of `window` bytes forward by one: `remove` is the byte
    /// leaving at the front, `add` the byte entering at the back.
    ///
    /// For every algorithm `A` and window `w` of length `n`,
    /// `A.rotate(A.calculate(w), w[0], next, n)` equals `A.calculate` of the
    /// shifted window (v2's recorded rotate defect excepted).
    pub fn rotate(&self, checksum: u32, remove: u8, add: u8, window: usize) -> u32 {
        match self {
            RollingAlgorithm::Adler32 => adler32::v1_rotate(checksum, remove, add, window),
            RollingAlgorithm::Adler32V2 => adler32::v2_rotate(checksum, remove, add, window),
            RollingAlgorithm::Adler32V3 => adler32::v3_rotate(checksum, remove, add, window),
        }
    }
}
