//! Integration tests for the archive container.

use std::collections::BTreeMap;
use std::fs;

use sealbox::archive::{ArchiveKind, ArchiveReader, ArchiveWriter};
use sealbox::config::Settings;
use sealbox::crypto::kdf::MIN_MEMORY_KIB;
use sealbox::crypto::{Argon2Params, Credentials};
use sealbox::SealboxError;
use tempfile::TempDir;

/// Helper: create a temporary archive path inside a fresh temp dir.
fn archive_path() -> (TempDir, std::path::PathBuf) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("test.sbar");
    (dir, path)
}

/// Cheapest Argon2 settings the KDF accepts.
fn fast_params() -> Argon2Params {
    Argon2Params {
        memory_kib: MIN_MEMORY_KIB,
        iterations: 1,
        parallelism: 1,
    }
}

fn creds() -> Credentials {
    Credentials::new("alice", "open sesame", 2468)
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 253) as u8).collect()
}

// ---------------------------------------------------------------------------
// Clear archives
// ---------------------------------------------------------------------------

#[test]
fn clear_archive_roundtrip() {
    let (_dir, path) = archive_path();

    let mut writer = ArchiveWriter::create_clear(&path).unwrap();
    writer.add_entry("readme.txt", b"hello archive").unwrap();
    writer.add_entry("empty.bin", b"").unwrap();
    writer.close().unwrap();

    let mut reader = ArchiveReader::open(&path, None).unwrap();
    assert_eq!(reader.kind(), ArchiveKind::Clear);
    assert_eq!(reader.entries().len(), 2);
    assert_eq!(reader.read_entry("readme.txt").unwrap().as_slice(), b"hello archive");
    assert!(reader.read_entry("empty.bin").unwrap().is_empty());
}

#[test]
fn clear_archive_stores_content_length_prefixed() {
    let (_dir, path) = archive_path();

    let mut writer = ArchiveWriter::create_clear(&path).unwrap();
    let offset = writer.add_entry("a", b"xyz").unwrap() as usize;
    writer.close().unwrap();

    let raw = fs::read(&path).unwrap();
    assert_eq!(&raw[..4], b"SBAR");
    assert_eq!(&raw[offset..offset + 4], &3i32.to_le_bytes());
    assert_eq!(&raw[offset + 4..offset + 7], b"xyz");
}

#[test]
fn clear_archive_content_tamper_is_detected_by_digest() {
    let (_dir, path) = archive_path();

    let mut writer = ArchiveWriter::create_clear(&path).unwrap();
    let offset = writer.add_entry("doc", b"important words").unwrap() as usize;
    writer.close().unwrap();

    let mut raw = fs::read(&path).unwrap();
    raw[offset + 6] ^= 0x20;
    fs::write(&path, &raw).unwrap();

    let mut reader = ArchiveReader::open(&path, None).unwrap();
    let err = reader.read_entry("doc").unwrap_err();
    assert!(matches!(err, SealboxError::EntryDigestMismatch(ref name) if name == "doc"));
}

// ---------------------------------------------------------------------------
// Encrypted archives
// ---------------------------------------------------------------------------

#[test]
fn encrypted_archive_roundtrip_with_multi_block_entry() {
    let (_dir, path) = archive_path();
    let big = payload(200_000);

    let mut writer = ArchiveWriter::create_encrypted(&path, &creds(), &fast_params()).unwrap();
    writer.add_entry("big.bin", &big).unwrap();
    writer.add_entry("small.txt", b"tiny").unwrap();
    writer.close().unwrap();

    let mut reader = ArchiveReader::open(&path, Some(&creds())).unwrap();
    assert_eq!(reader.kind(), ArchiveKind::Encrypted);
    assert_eq!(reader.entry("big.bin").unwrap().length, 200_000);
    assert_eq!(reader.read_entry("big.bin").unwrap().as_slice(), big.as_slice());
    assert_eq!(reader.read_entry("small.txt").unwrap().as_slice(), b"tiny");
}

#[test]
fn encrypted_archive_hides_names_and_content() {
    let (_dir, path) = archive_path();

    let mut writer = ArchiveWriter::create_encrypted(&path, &creds(), &fast_params()).unwrap();
    writer.add_entry("payroll-2026.csv", b"SECRET-SALARY-DATA").unwrap();
    writer.close().unwrap();

    let raw = fs::read(&path).unwrap();
    let contains = |needle: &[u8]| raw.windows(needle.len()).any(|w| w == needle);
    assert!(!contains(b"payroll-2026.csv"));
    assert!(!contains(b"SECRET-SALARY-DATA"));
}

#[test]
fn wrong_credentials_are_a_credential_failure() {
    let (_dir, path) = archive_path();

    let mut writer = ArchiveWriter::create_encrypted(&path, &creds(), &fast_params()).unwrap();
    writer.add_entry("x", b"data").unwrap();
    writer.close().unwrap();

    for wrong in [
        Credentials::new("mallory", "open sesame", 2468),
        Credentials::new("alice", "open sesame!", 2468),
        Credentials::new("alice", "open sesame", 2469),
    ] {
        let err = ArchiveReader::open(&path, Some(&wrong)).unwrap_err();
        assert!(err.is_credential_failure(), "expected credential failure, got {err:?}");
    }
}

#[test]
fn encrypted_archive_requires_credentials() {
    let (_dir, path) = archive_path();
    ArchiveWriter::create_encrypted(&path, &creds(), &fast_params())
        .unwrap()
        .close()
        .unwrap();

    let err = ArchiveReader::open(&path, None).unwrap_err();
    assert!(matches!(err, SealboxError::ProtocolMisuse(_)));
}

#[test]
fn tampered_encrypted_content_fails_integrity() {
    let (_dir, path) = archive_path();

    let mut writer = ArchiveWriter::create_encrypted(&path, &creds(), &fast_params()).unwrap();
    let offset = writer.add_entry("doc", &payload(5_000)).unwrap() as usize;
    writer.add_entry("other", b"untouched").unwrap();
    writer.close().unwrap();

    // Skip the stream header (72 bytes) and the first size field (36 bytes).
    let mut raw = fs::read(&path).unwrap();
    raw[offset + 72 + 36 + 100] ^= 0x01;
    fs::write(&path, &raw).unwrap();

    let mut reader = ArchiveReader::open(&path, Some(&creds())).unwrap();
    let err = reader.read_entry("doc").unwrap_err();
    assert!(matches!(err, SealboxError::IntegrityFailure { block: 0 }));
    assert!(reader.faults().is_empty(), "integrity failures are not resource faults");

    // Other entries stay readable.
    assert_eq!(reader.read_entry("other").unwrap().as_slice(), b"untouched");
}

#[test]
fn tampered_header_is_rejected() {
    let (_dir, path) = archive_path();

    let mut writer = ArchiveWriter::create_encrypted(&path, &creds(), &fast_params()).unwrap();
    writer.add_entry("x", b"data").unwrap();
    writer.close().unwrap();

    let mut raw = fs::read(&path).unwrap();
    raw[16] ^= 0x01; // entry_count
    fs::write(&path, &raw).unwrap();

    let err = ArchiveReader::open(&path, Some(&creds())).unwrap_err();
    assert!(matches!(err, SealboxError::HeaderMacMismatch));
}

#[test]
fn tampered_header_kdf_cost_is_rejected_before_derivation() {
    let (_dir, path) = archive_path();

    let mut writer = ArchiveWriter::create_encrypted(&path, &creds(), &fast_params()).unwrap();
    writer.add_entry("x", b"data").unwrap();
    writer.close().unwrap();

    // High byte of memory_kib: a multi-terabyte Argon2 cost.
    let mut raw = fs::read(&path).unwrap();
    raw[23] ^= 0x80;
    fs::write(&path, &raw).unwrap();

    let err = ArchiveReader::open(&path, Some(&creds())).unwrap_err();
    assert!(matches!(err, SealboxError::InvalidFormat(_)), "got {err:?}");
}

#[test]
fn header_kdf_cost_above_settings_is_refused() {
    let (_dir, path) = archive_path();
    let heavier = Argon2Params {
        iterations: 2,
        ..fast_params()
    };
    ArchiveWriter::create_encrypted(&path, &creds(), &heavier)
        .unwrap()
        .close()
        .unwrap();

    let strict = Settings {
        argon2_memory_kib: MIN_MEMORY_KIB,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        ..Settings::default()
    };
    let err = ArchiveReader::open_with_settings(&path, Some(&creds()), &strict).unwrap_err();
    assert!(matches!(err, SealboxError::InvalidFormat(_)));

    // Default settings allow it.
    assert!(ArchiveReader::open(&path, Some(&creds())).is_ok());
}

#[test]
fn content_is_readable_by_recorded_offset() {
    let (_dir, path) = archive_path();

    let mut writer = ArchiveWriter::create_encrypted(&path, &creds(), &fast_params()).unwrap();
    let first = writer.append_content(b"first record").unwrap();
    let second = writer.append_content(b"second record").unwrap();
    writer.close().unwrap();

    let mut reader = ArchiveReader::open(&path, Some(&creds())).unwrap();
    assert!(reader.entries().is_empty());
    assert_eq!(reader.read_content_at(second).unwrap().as_slice(), b"second record");
    assert_eq!(reader.read_content_at(first).unwrap().as_slice(), b"first record");
    assert!(reader.read_content_at(3).is_err());
}

#[test]
fn flush_then_append_keeps_all_entries() {
    let (_dir, path) = archive_path();

    let mut writer = ArchiveWriter::create_encrypted(&path, &creds(), &fast_params()).unwrap();
    writer.add_entry("one", b"1").unwrap();
    writer.flush().unwrap();

    // A reader sees the flushed state while the writer keeps going.
    let mut early = ArchiveReader::open(&path, Some(&creds())).unwrap();
    assert_eq!(early.entries().len(), 1);

    writer.add_entry("two", b"22").unwrap();
    writer.close().unwrap();

    early.reload_directory().unwrap();
    assert_eq!(early.entries().len(), 2);
    assert_eq!(early.read_entry("two").unwrap().as_slice(), b"22");
    assert_eq!(early.read_entry("one").unwrap().as_slice(), b"1");
}

#[test]
fn metadata_survives_roundtrip() {
    let (_dir, path) = archive_path();
    let mut meta = BTreeMap::new();
    meta.insert("mime".to_string(), "text/plain".to_string());

    let mut writer = ArchiveWriter::create_clear(&path).unwrap();
    writer
        .add_entry_with_metadata("notes.txt", b"n", meta.clone())
        .unwrap();
    writer.close().unwrap();

    let reader = ArchiveReader::open(&path, None).unwrap();
    assert_eq!(reader.entry("notes.txt").unwrap().metadata, meta);
}

// ---------------------------------------------------------------------------
// Error cases
// ---------------------------------------------------------------------------

#[test]
fn duplicate_and_unsafe_names_are_rejected() {
    let (_dir, path) = archive_path();
    let mut writer = ArchiveWriter::create_clear(&path).unwrap();
    writer.add_entry("a.txt", b"1").unwrap();

    assert!(matches!(
        writer.add_entry("a.txt", b"2"),
        Err(SealboxError::EntryAlreadyExists(_))
    ));
    assert!(matches!(
        writer.add_entry("../escape", b"3"),
        Err(SealboxError::InvalidEntryName(_))
    ));
    assert_eq!(writer.entries().len(), 1);
}

#[test]
fn create_twice_fails_and_missing_archive_fails() {
    let (dir, path) = archive_path();
    ArchiveWriter::create_clear(&path).unwrap().close().unwrap();

    assert!(matches!(
        ArchiveWriter::create_clear(&path),
        Err(SealboxError::ArchiveAlreadyExists(_))
    ));
    assert!(matches!(
        ArchiveReader::open(&dir.path().join("missing.sbar"), None),
        Err(SealboxError::ArchiveNotFound(_))
    ));
}

#[test]
fn missing_entry_is_reported() {
    let (_dir, path) = archive_path();
    ArchiveWriter::create_clear(&path).unwrap().close().unwrap();

    let mut reader = ArchiveReader::open(&path, None).unwrap();
    assert!(matches!(
        reader.read_entry("nope"),
        Err(SealboxError::EntryNotFound(_))
    ));
}

#[test]
fn add_file_failure_is_recorded_as_fault() {
    let (dir, path) = archive_path();
    let mut writer = ArchiveWriter::create_clear(&path).unwrap();

    let real = dir.path().join("real.txt");
    fs::write(&real, b"on disk").unwrap();
    writer.add_file("real.txt", &real).unwrap();

    let result = writer.add_file("ghost.txt", &dir.path().join("ghost.txt"));
    assert!(matches!(result, Err(SealboxError::Io(_))));

    assert_eq!(writer.faults().len(), 1);
    assert_eq!(writer.faults()[0].entry.as_deref(), Some("ghost.txt"));
    assert_eq!(writer.entries().len(), 1);
}

#[test]
fn extract_all_continues_past_write_failures() {
    let (dir, path) = archive_path();

    let mut writer = ArchiveWriter::create_encrypted(&path, &creds(), &fast_params()).unwrap();
    writer.add_entry("ok.txt", b"fine").unwrap();
    writer.add_entry("blocked/inner.txt", b"nowhere to go").unwrap();
    writer.add_entry("deep/also_ok.txt", b"fine too").unwrap();
    writer.close().unwrap();

    let out = dir.path().join("out");
    fs::create_dir_all(&out).unwrap();
    // A plain file where a directory is needed.
    fs::write(out.join("blocked"), b"in the way").unwrap();

    let mut reader = ArchiveReader::open(&path, Some(&creds())).unwrap();
    let written = reader.extract_all(&out).unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(fs::read(out.join("ok.txt")).unwrap(), b"fine");
    assert_eq!(fs::read(out.join("deep/also_ok.txt")).unwrap(), b"fine too");
    assert_eq!(reader.faults().len(), 1);
    assert_eq!(reader.faults()[0].entry.as_deref(), Some("blocked/inner.txt"));
}

#[test]
fn dropped_writer_still_flushes_directory() {
    let (_dir, path) = archive_path();
    {
        // Dropping without close still flushes the directory.
        let mut writer = ArchiveWriter::create_clear(&path).unwrap();
        writer.add_entry("kept", b"value").unwrap();
    }
    let mut reader = ArchiveReader::open(&path, None).unwrap();
    assert_eq!(reader.read_entry("kept").unwrap().as_slice(), b"value");
}
