//! Signature serialization (current format only).

use std::io::Write;

use crate::error::DeltaError;
use crate::wire::{self, FORMAT_VERSION, SIGNATURE_MAGIC};

use super::SignatureMetadata;

/// Encodes the signature header: magic, version, metadata JSON.
///
/// Shared by the sync and async builders so both emit identical bytes.
pub(crate) fn encode_header(metadata: &SignatureMetadata) -> Result<Vec<u8>, DeltaError> {
    let json = serde_json::to_string(metadata)?;
    let mut buf = Vec::with_capacity(SIGNATURE_MAGIC.len() + 1 + json.len() + 4);
    buf.extend_from_slice(SIGNATURE_MAGIC);
    buf.push(FORMAT_VERSION);
    wire::encode_string(&mut buf, &json);
    Ok(buf)
}

/// Encodes one chunk record: i32 LE length, u32 LE checksum, hash bytes.
pub(crate) fn encode_chunk(length: u32, rolling_checksum: u32, hash: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + hash.len());
    buf.extend_from_slice(&(length as i32).to_le_bytes());
    buf.extend_from_slice(&rolling_checksum.to_le_bytes());
    buf.extend_from_slice(hash);
    buf
}

/// Writes a signature stream record by record.
pub(crate) struct SignatureWriter<W: Write> {
    writer: W,
}

impl<W: Write> SignatureWriter<W> {
    pub(crate) fn new(writer: W) -> Self {
        Self { writer }
    }

    pub(crate) fn write_header(&mut self, metadata: &SignatureMetadata) -> Result<(), DeltaError> {
        let header = encode_header(metadata)?;
        self.writer.write_all(&header)?;
        Ok(())
    }

    pub(crate) fn write_chunk(
        &mut self,
        length: u32,
        rolling_checksum: u32,
        hash: &[u8],
    ) -> Result<(), DeltaError> {
        let record = encode_chunk(length, rolling_checksum, hash);
        self.writer.write_all(&record)?;
        Ok(())
    }

    pub(crate) fn finish(mut self) -> Result<W, DeltaError> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let metadata = SignatureMetadata {
            chunk_size: 2048,
            hash_algorithm_name: "XXH64".to_string(),
            rolling_checksum_algorithm_name: "Adler32".to_string(),
            base_file_hash_algorithm_name: "MD5".to_string(),
            base_file_hash: "AA==".to_string(),
        };
        let header = encode_header(&metadata).unwrap();
        assert_eq!(&header[..7], b"FRSNCSG");
        assert_eq!(header[7], 0x01);
        // The JSON block is longer than 127 bytes, so its varint length
        // prefix takes two bytes.
        let json_len = usize::from(header[8] & 0x7f) | (usize::from(header[9]) << 7);
        assert_eq!(header[8] & 0x80, 0x80);
        let json = std::str::from_utf8(&header[10..10 + json_len]).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.contains("\"chunkSize\":2048"));
        assert_eq!(10 + json_len, header.len());
    }

    #[test]
    fn test_chunk_record_layout() {
        let record = encode_chunk(2048, 0x11223344, &[0xAA; 8]);
        assert_eq!(&record[..4], &2048i32.to_le_bytes());
        assert_eq!(&record[4..8], &[0x44, 0x33, 0x22, 0x11]);
        assert_eq!(&record[8..], &[0xAA; 8]);
    }
}
