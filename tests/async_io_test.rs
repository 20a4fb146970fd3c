//! Async counterparts must accept any `futures-io` source and produce the
//! same bytes as the sync paths.

#![cfg(feature = "async-io")]

use std::io::Cursor;

use futures_util::io::Cursor as AsyncCursor;
use tokio_util::compat::TokioAsyncReadCompatExt;

use rdelta::{
    AggregateCopyWriter, AsyncAggregateCopyWriter, AsyncBinaryDeltaWriter, BinaryDeltaWriter,
    DeltaApplier, DeltaBuilder, Signature, SignatureBuilder, SignatureReader,
    read_signature_async,
};

fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
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

fn sync_signature(base: &[u8]) -> Vec<u8> {
    let mut raw = Vec::new();
    SignatureBuilder::new()
        .build(&mut Cursor::new(base), &mut raw)
        .unwrap();
    raw
}

fn parse_signature(raw: &[u8]) -> Signature {
    SignatureReader::new(Cursor::new(raw)).read_signature().unwrap()
}

fn sync_delta(new_data: &[u8], signature: &Signature) -> Vec<u8> {
    let mut writer = AggregateCopyWriter::new(BinaryDeltaWriter::new(Vec::new()));
    DeltaBuilder::new()
        .build(&mut Cursor::new(new_data), signature, &mut writer)
        .unwrap();
    writer.into_inner().into_inner()
}

#[tokio::test]
async fn test_async_signature_matches_sync() {
    let base = pseudo_random(100_000, 21);
    let mut raw = Vec::new();
    SignatureBuilder::new()
        .build_async(&mut AsyncCursor::new(&base), &mut raw)
        .await
        .unwrap();
    assert_eq!(raw, sync_signature(&base));
}

#[tokio::test]
async fn test_async_delta_matches_sync() {
    let base = pseudo_random(100_000, 22);
    let mut new_data = base.clone();
    new_data.splice(50_000..50_000, b"async wedge".iter().copied());

    let signature = parse_signature(&sync_signature(&base));
    let mut writer =
        AsyncAggregateCopyWriter::new(AsyncBinaryDeltaWriter::new(AsyncCursor::new(Vec::new())));
    DeltaBuilder::new()
        .build_async(&mut AsyncCursor::new(&new_data), &signature, &mut writer)
        .await
        .unwrap();
    let raw = writer.into_inner().into_inner().into_inner();
    assert_eq!(raw, sync_delta(&new_data, &signature));
}

#[tokio::test]
async fn test_async_signature_reader_matches_sync() {
    let base = pseudo_random(30_000, 23);
    let raw = sync_signature(&base);
    let parsed = read_signature_async(&mut AsyncCursor::new(&raw)).await.unwrap();
    let sync_parsed = parse_signature(&raw);
    assert_eq!(parsed.chunks(), sync_parsed.chunks());
    assert_eq!(parsed.metadata(), sync_parsed.metadata());
}

#[tokio::test]
async fn test_async_apply_rebuilds_new_version() {
    let base = pseudo_random(80_000, 24);
    let mut new_data = base.clone();
    new_data.truncate(60_000);
    new_data.extend_from_slice(&pseudo_random(5_000, 25));

    let signature = parse_signature(&sync_signature(&base));
    let delta = sync_delta(&new_data, &signature);

    let mut out = AsyncCursor::new(Vec::new());
    DeltaApplier::new()
        .apply_async(
            &mut AsyncCursor::new(&base),
            &mut AsyncCursor::new(&delta),
            &mut out,
        )
        .await
        .unwrap();
    assert_eq!(out.into_inner(), new_data);
}

#[tokio::test]
async fn test_tokio_files_through_compat() {
    let dir = tempdir();
    let base_path = dir.join("base.bin");
    let sig_path = dir.join("base.sig");
    let base = pseudo_random(50_000, 26);
    tokio::fs::write(&base_path, &base).await.unwrap();

    let base_file = tokio::fs::File::open(&base_path).await.unwrap();
    let sig_file = tokio::fs::File::create(&sig_path).await.unwrap();
    SignatureBuilder::new()
        .build_async(&mut base_file.compat(), &mut sig_file.compat())
        .await
        .unwrap();

    let raw = tokio::fs::read(&sig_path).await.unwrap();
    assert_eq!(raw, sync_signature(&base));

    tokio::fs::remove_dir_all(&dir).await.unwrap();
}

fn tempdir() -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "rdelta-test-{}-{:?}",
        std::process::id(),
        std::thread::current().id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
