//! End-to-end tests: sign a base, diff a new version, apply, verify.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use rdelta::{
    AggregateCopyWriter, BinaryDeltaWriter, DeltaApplier, DeltaBuilder, DeltaError, DeltaMetadata,
    DeltaWriter, HashAlgorithm, MAX_CHUNK_SIZE, MIN_CHUNK_SIZE, RollingAlgorithm, Signature,
    SignatureBuilder, SignatureOptions, SignatureReader,
};

fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
    // xorshift; deterministic data with no repeating structure.
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xFF) as u8
        })
        .collect()
}

fn sign(base: &[u8], options: SignatureOptions) -> Signature {
    let mut raw = Vec::new();
    SignatureBuilder::with_options(options)
        .build(&mut Cursor::new(base), &mut raw)
        .unwrap();
    SignatureReader::new(Cursor::new(raw)).read_signature().unwrap()
}

fn diff(new_data: &[u8], signature: &Signature) -> Vec<u8> {
    let mut writer = AggregateCopyWriter::new(BinaryDeltaWriter::new(Vec::new()));
    DeltaBuilder::new()
        .build(&mut Cursor::new(new_data), signature, &mut writer)
        .unwrap();
    writer.into_inner().into_inner()
}

fn patch(base: &[u8], delta: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    DeltaApplier::new()
        .apply(&mut Cursor::new(base), &mut Cursor::new(delta), &mut out)
        .unwrap();
    out
}

fn roundtrip(base: &[u8], new_data: &[u8], options: SignatureOptions) -> Vec<u8> {
    let signature = sign(base, options);
    let delta = diff(new_data, &signature);
    let rebuilt = patch(base, &delta);
    assert_eq!(rebuilt, new_data);
    delta
}

#[test]
fn test_edit_in_the_middle() {
    let base = pseudo_random(200_000, 42);
    let mut new_data = base.clone();
    new_data.splice(100_000..100_000, b"inserted edit".iter().copied());
    let delta = roundtrip(&base, &new_data, SignatureOptions::default());
    // Unchanged regions travel as copies, so the delta stays far smaller
    // than the file.
    assert!(delta.len() < new_data.len() / 10);
}

#[test]
fn test_identical_input_folds_to_full_copy_runs() {
    let base = pseudo_random(64 * 2048, 7);
    let delta = roundtrip(&base, &base, SignatureOptions::default());
    // Header plus a single aggregated copy command.
    assert!(delta.len() < 256, "delta was {} bytes", delta.len());
}

#[test]
fn test_completely_different_input() {
    let base = pseudo_random(50_000, 1);
    let new_data = pseudo_random(50_000, 2);
    roundtrip(&base, &new_data, SignatureOptions::default());
}

#[test]
fn test_prepended_and_appended_content() {
    let base = pseudo_random(30_000, 3);
    let mut new_data = b"header".to_vec();
    new_data.extend_from_slice(&base);
    new_data.extend_from_slice(b"trailer");
    roundtrip(&base, &new_data, SignatureOptions::default());
}

#[test]
fn test_reordered_blocks() {
    let base = pseudo_random(8 * 1024, 4);
    let mut new_data = base[4 * 1024..].to_vec();
    new_data.extend_from_slice(&base[..4 * 1024]);
    roundtrip(&base, &new_data, SignatureOptions::new(1024).unwrap());
}

#[test]
fn test_empty_base() {
    let new_data = pseudo_random(10_000, 5);
    let delta = roundtrip(b"", &new_data, SignatureOptions::default());
    assert!(delta.len() > new_data.len());
}

#[test]
fn test_empty_new_version() {
    roundtrip(&pseudo_random(10_000, 6), b"", SignatureOptions::default());
}

#[test]
fn test_both_empty() {
    roundtrip(b"", b"", SignatureOptions::default());
}

#[test]
fn test_hash_algorithms() {
    let base = pseudo_random(20_000, 8);
    let mut new_data = base.clone();
    new_data.truncate(15_000);
    for hash in [
        HashAlgorithm::XxHash64,
        HashAlgorithm::XxHash3,
        HashAlgorithm::Md5,
        HashAlgorithm::Sha1,
    ] {
        let options = SignatureOptions::default().with_hash_algorithm(hash);
        roundtrip(&base, &new_data, options);
    }
}

#[test]
fn test_rolling_algorithms() {
    let base = pseudo_random(20_000, 9);
    let mut new_data = base.clone();
    new_data.splice(5_000..5_000, [0u8; 37]);
    for rolling in [
        RollingAlgorithm::Adler32,
        RollingAlgorithm::Adler32V2,
        RollingAlgorithm::Adler32V3,
    ] {
        let options = SignatureOptions::default().with_rolling_algorithm(rolling);
        roundtrip(&base, &new_data, options);
    }
}

#[test]
fn test_chunk_size_bounds() {
    let base = pseudo_random(usize::from(MAX_CHUNK_SIZE) * 3 + 17, 10);
    let mut new_data = base.clone();
    new_data[100] ^= 0xFF;
    for chunk_size in [MIN_CHUNK_SIZE, 1024, MAX_CHUNK_SIZE] {
        roundtrip(&base, &new_data, SignatureOptions::new(chunk_size).unwrap());
    }
}

#[test]
fn test_input_sizes_around_chunk_boundary() {
    let chunk = usize::from(MIN_CHUNK_SIZE);
    for len in [1, chunk - 1, chunk, chunk + 1, 2 * chunk, 2 * chunk + 1] {
        let base = pseudo_random(len, len as u32);
        roundtrip(&base, &base, SignatureOptions::new(MIN_CHUNK_SIZE).unwrap());
    }
}

#[test]
fn test_tampered_base_is_detected() {
    let base = pseudo_random(30_000, 11);
    let signature = sign(&base, SignatureOptions::default());
    let delta = diff(&base, &signature);

    let mut tampered = base.clone();
    tampered[12_345] ^= 0x01;
    let mut out = Vec::new();
    let err = DeltaApplier::new()
        .apply(&mut Cursor::new(&tampered), &mut Cursor::new(&delta), &mut out)
        .unwrap_err();
    assert!(matches!(err, DeltaError::IntegrityFailure { .. }));

    // The same apply succeeds when verification is waived.
    let mut out = Vec::new();
    DeltaApplier::new()
        .skip_hash_check(true)
        .apply(&mut Cursor::new(&tampered), &mut Cursor::new(&delta), &mut out)
        .unwrap();
    assert_eq!(out.len(), base.len());
    assert_ne!(out, base);
}

#[test]
fn test_legacy_delta_applies_like_current_format() {
    let base = pseudo_random(4096, 17);
    let mut expected = base[1024..3072].to_vec();
    expected.extend_from_slice(b"legacy tail");
    let expected_hash = HashAlgorithm::XxHash64.digest(&expected);

    // The same command sequence, hand-built in the legacy wire format.
    let mut legacy = Vec::new();
    legacy.extend_from_slice(b"OCTODELTA");
    legacy.push(0x01);
    legacy.push(0x05);
    legacy.extend_from_slice(b"XXH64");
    legacy.extend_from_slice(&8i32.to_le_bytes());
    legacy.extend_from_slice(&expected_hash);
    legacy.extend_from_slice(b">>>");
    legacy.push(0x60); // copy
    legacy.extend_from_slice(&1024i64.to_le_bytes());
    legacy.extend_from_slice(&2048i64.to_le_bytes());
    legacy.push(0x80); // data
    legacy.extend_from_slice(&11i64.to_le_bytes());
    legacy.extend_from_slice(b"legacy tail");

    let rebuilt = patch(&base, &legacy);
    assert_eq!(rebuilt, expected);

    let mut writer = BinaryDeltaWriter::new(Vec::new());
    writer
        .write_metadata(&DeltaMetadata {
            expected_file_hash_algorithm_name: "XXH64".to_string(),
            expected_file_hash: BASE64.encode(&expected_hash),
        })
        .unwrap();
    writer.write_copy(1024, 2048).unwrap();
    writer.write_data(b"legacy tail").unwrap();
    writer.finish().unwrap();
    assert_eq!(patch(&base, &writer.into_inner()), rebuilt);
}

#[test]
fn test_garbage_streams_are_format_errors() {
    let garbage = pseudo_random(64, 12);
    assert!(matches!(
        SignatureReader::new(Cursor::new(&garbage)).read_signature(),
        Err(DeltaError::Format { .. })
    ));
    let mut out = Vec::new();
    assert!(matches!(
        DeltaApplier::new().apply(
            &mut Cursor::new(b"base".to_vec()),
            &mut Cursor::new(&garbage),
            &mut out
        ),
        Err(DeltaError::Format { .. })
    ));
}

#[test]
fn test_truncated_delta_is_a_format_error() {
    let base = pseudo_random(10_000, 13);
    let signature = sign(&base, SignatureOptions::default());
    let mut delta = diff(&pseudo_random(10_000, 14), &signature);
    delta.truncate(delta.len() - 7);
    let mut out = Vec::new();
    let err = DeltaApplier::new()
        .apply(&mut Cursor::new(&base), &mut Cursor::new(&delta), &mut out)
        .unwrap_err();
    assert!(matches!(err, DeltaError::Format { .. }));
}

#[test]
fn test_signature_applies_across_metadata_variants() {
    // A signature with non-default everything still round-trips.
    let base = pseudo_random(40_000, 15);
    let mut new_data = base.clone();
    new_data.extend_from_slice(&pseudo_random(3_000, 16));
    let options = SignatureOptions::new(512)
        .unwrap()
        .with_hash_algorithm(HashAlgorithm::Sha1)
        .with_rolling_algorithm(RollingAlgorithm::Adler32V3)
        .with_base_file_hash_algorithm(HashAlgorithm::Sha1);
    let signature = sign(&base, options);
    assert_eq!(signature.hash_algorithm(), HashAlgorithm::Sha1);
    assert_eq!(signature.metadata().base_file_hash_algorithm_name, "SHA1");
    let delta = diff(&new_data, &signature);
    assert_eq!(patch(&base, &delta), new_data);
}
