//! Integration tests for ArchiveStore against real ZIP files on disk
//!
//! These tests verify:
//! - Listing and reading with stored/sorted order
//! - Undecodable members are reported, not dropped
//! - Rewrites keep untouched members byte-identical and compressed as before
//! - Failed rewrites leave no destination or staging files behind

use camino::{Utf8Path, Utf8PathBuf};
use machseq::services::{ArchiveStore, DECODE_ERROR_MESSAGE, MemberContent};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

fn utf8_path(dir: &TempDir, name: &str) -> Utf8PathBuf {
    Utf8PathBuf::try_from(dir.path().join(name)).unwrap()
}

fn build_archive(path: &Utf8Path, entries: &[(&str, &[u8], CompressionMethod)]) {
    let mut writer = ZipWriter::new(File::create(path).unwrap());
    for (name, content, method) in entries {
        let options = SimpleFileOptions::default().compression_method(*method);
        if name.ends_with('/') {
            writer.add_directory(*name, options).unwrap();
        } else {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
    }
    writer.finish().unwrap();
}

fn machine_archive(dir: &TempDir) -> Utf8PathBuf {
    let path = utf8_path(dir, "machine.zip");
    build_archive(
        &path,
        &[
            (
                "Configuration/MainKonfiguration.txt",
                b";MACHINE_TYPE_AF500=3\nREAL_MACHINE_TYPE:3\n",
                CompressionMethod::Deflated,
            ),
            ("Bars/", b"", CompressionMethod::Stored),
            ("Bars/z_last.xml", b"<Bar IST=\"1\"/>", CompressionMethod::Deflated),
            ("Bars/a_first.xml", b"<Bar IST=\"2\"/>", CompressionMethod::Stored),
            ("Bars/binary.dat", &[0xff, 0xfe, 0x00, 0x81], CompressionMethod::Stored),
            ("Profiles/p.xml", b"<Profile SOLL=\"3\"/>", CompressionMethod::Deflated),
            ("readme.txt", b"hello", CompressionMethod::Deflated),
        ],
    );
    path
}

fn member_bytes(path: &Utf8Path, name: &str) -> Vec<u8> {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut member = zip.by_name(name).unwrap();
    let mut bytes = Vec::new();
    member.read_to_end(&mut bytes).unwrap();
    bytes
}

fn member_method(path: &Utf8Path, name: &str) -> CompressionMethod {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    let member = zip.by_name(name).unwrap();
    member.compression()
}

#[test]
fn test_list_entries_keeps_stored_order() {
    let temp_dir = TempDir::new().unwrap();
    let archive = machine_archive(&temp_dir);
    let store = ArchiveStore::new();

    let entries = store.list_entries(&archive);
    assert_eq!(entries.len(), 7);
    assert_eq!(entries[0], "Configuration/MainKonfiguration.txt");
    assert_eq!(entries[2], "Bars/z_last.xml");
    assert_eq!(entries[3], "Bars/a_first.xml");
}

#[test]
fn test_read_entry() {
    let temp_dir = TempDir::new().unwrap();
    let archive = machine_archive(&temp_dir);
    let store = ArchiveStore::new();

    assert_eq!(store.read_entry(&archive, "readme.txt").unwrap(), b"hello");
    assert!(store.read_entry(&archive, "missing.txt").is_none());

    assert_eq!(
        store.read_entry_text(&archive, "readme.txt"),
        Some(MemberContent::Text("hello".to_string()))
    );
    assert_eq!(
        store.read_entry_text(&archive, "Bars/binary.dat"),
        Some(MemberContent::Undecodable)
    );
}

#[test]
fn test_read_members_under_folders_sorted_and_undecodable_kept() {
    let temp_dir = TempDir::new().unwrap();
    let archive = machine_archive(&temp_dir);
    let store = ArchiveStore::new();

    let members = store.read_members_under_folders(&archive, &["Bars/", "Profiles/"]);
    let names: Vec<&str> = members.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec!["Bars/a_first.xml", "Bars/binary.dat", "Bars/z_last.xml", "Profiles/p.xml"]
    );

    assert_eq!(members["Bars/binary.dat"].display(), DECODE_ERROR_MESSAGE);
    assert_eq!(members["Bars/a_first.xml"].as_text(), Some("<Bar IST=\"2\"/>"));
}

#[test]
fn test_read_member_bytes_under_folders_stored_order() {
    let temp_dir = TempDir::new().unwrap();
    let archive = machine_archive(&temp_dir);
    let store = ArchiveStore::new();

    let members = store.read_member_bytes_under_folders(&archive, &["Bars/"]);
    let names: Vec<&str> = members.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["Bars/z_last.xml", "Bars/a_first.xml", "Bars/binary.dat"]);
    assert_eq!(members["Bars/binary.dat"], vec![0xff, 0xfe, 0x00, 0x81]);
}

#[test]
fn test_list_member_names_in_folder() {
    let temp_dir = TempDir::new().unwrap();
    let archive = machine_archive(&temp_dir);
    let store = ArchiveStore::new();

    let names = store.list_member_names_in_folder(&archive, "Bars/");
    assert_eq!(names, vec!["a_first.xml", "binary.dat", "z_last.xml"]);
    assert!(names.iter().all(|n| !n.contains('/')));

    assert!(store.list_member_names_in_folder(&archive, "Nothing/").is_empty());
}

#[test]
fn test_rewrite_with_replacements_preserves_other_members() {
    let temp_dir = TempDir::new().unwrap();
    let archive = machine_archive(&temp_dir);
    let dest = utf8_path(&temp_dir, "edited.zip");
    let store = ArchiveStore::new();

    let mut replacements = HashMap::new();
    replacements.insert("readme.txt".to_string(), b"changed".to_vec());
    replacements.insert("not/in/source.txt".to_string(), b"ignored".to_vec());

    assert!(store.rewrite_with_replacements(&archive, &dest, &replacements));

    assert_eq!(store.list_entries(&dest), store.list_entries(&archive));
    assert_eq!(member_bytes(&dest, "readme.txt"), b"changed");
    assert_eq!(member_bytes(&dest, "Bars/binary.dat"), member_bytes(&archive, "Bars/binary.dat"));
    assert_eq!(
        member_bytes(&dest, "Configuration/MainKonfiguration.txt"),
        member_bytes(&archive, "Configuration/MainKonfiguration.txt")
    );
    assert!(store.read_entry(&dest, "not/in/source.txt").is_none());
}

#[test]
fn test_untouched_members_keep_compression() {
    let temp_dir = TempDir::new().unwrap();
    let archive = machine_archive(&temp_dir);
    let dest = utf8_path(&temp_dir, "copy.zip");
    let store = ArchiveStore::new();

    assert!(store.rewrite_with_added_member(&archive, &dest, None, b"{}"));

    assert_eq!(member_method(&dest, "Bars/a_first.xml"), CompressionMethod::Stored);
    assert_eq!(member_method(&dest, "Bars/z_last.xml"), CompressionMethod::Deflated);
}

#[test]
fn test_rewrite_with_added_member() {
    let temp_dir = TempDir::new().unwrap();
    let archive = machine_archive(&temp_dir);
    let dest = utf8_path(&temp_dir, "final.zip");
    let store = ArchiveStore::new();

    assert!(store.rewrite_with_added_member(&archive, &dest, None, b"{\"a\": 1}"));

    let source_entries = store.list_entries(&archive);
    let dest_entries = store.list_entries(&dest);
    assert_eq!(dest_entries.len(), source_entries.len() + 1);
    assert_eq!(dest_entries.last().map(String::as_str), Some("config.json"));
    assert_eq!(member_bytes(&dest, "config.json"), b"{\"a\": 1}");
}

#[test]
fn test_added_member_replaces_existing_name() {
    let temp_dir = TempDir::new().unwrap();
    let archive = machine_archive(&temp_dir);
    let first = utf8_path(&temp_dir, "first.zip");
    let second = utf8_path(&temp_dir, "second.zip");
    let store = ArchiveStore::new();

    assert!(store.rewrite_with_added_member(&archive, &first, Some("config.json"), b"1"));
    assert!(store.rewrite_with_added_member(&first, &second, Some("config.json"), b"2"));

    assert_eq!(store.list_entries(&second), store.list_entries(&first));
    assert_eq!(member_bytes(&second, "config.json"), b"2");
}

#[test]
fn test_rewrite_missing_source_fails_cleanly() {
    let temp_dir = TempDir::new().unwrap();
    let missing = utf8_path(&temp_dir, "missing.zip");
    let dest = utf8_path(&temp_dir, "out.zip");
    let store = ArchiveStore::new();

    assert!(!store.rewrite_with_added_member(&missing, &dest, None, b"{}"));
    assert!(!store.rewrite_with_replacements(&missing, &dest, &HashMap::new()));
    assert!(!dest.exists());
}

#[test]
fn test_corrupt_archive_degrades_and_leaves_no_files() {
    let temp_dir = TempDir::new().unwrap();
    let corrupt = utf8_path(&temp_dir, "corrupt.zip");
    fs::write(&corrupt, b"this is not a zip file").unwrap();

    let out_dir = temp_dir.path().join("out");
    fs::create_dir(&out_dir).unwrap();
    let dest = Utf8PathBuf::try_from(out_dir.join("final.zip")).unwrap();
    let store = ArchiveStore::new();

    assert!(store.list_entries(&corrupt).is_empty());
    assert!(store.read_entry(&corrupt, "anything").is_none());
    assert!(!store.rewrite_with_added_member(&corrupt, &dest, None, b"{}"));

    assert_eq!(fs::read_dir(&out_dir).unwrap().count(), 0);
}

/// Overwrite every zip64 extra-field uncompressed size equal to `actual` with `claimed`
fn patch_zip64_sizes(path: &Utf8Path, actual: u64, claimed: u64) -> usize {
    let mut bytes = fs::read(path).unwrap();
    let mut patched = 0;
    for i in 0..bytes.len().saturating_sub(12) {
        let is_zip64_header = bytes[i] == 0x01 && bytes[i + 1] == 0x00;
        let data_size = u16::from_le_bytes([bytes[i + 2], bytes[i + 3]]);
        if is_zip64_header
            && data_size >= 8
            && bytes[i + 4..i + 12] == actual.to_le_bytes()
        {
            bytes[i + 4..i + 12].copy_from_slice(&claimed.to_le_bytes());
            patched += 1;
        }
    }
    fs::write(path, bytes).unwrap();
    patched
}

#[test]
fn test_oversized_declared_member_size_is_isolated() {
    let temp_dir = TempDir::new().unwrap();
    let path = utf8_path(&temp_dir, "oversized.zip");
    let content: &[u8] = b"<Bar IST=\"1\"/>";

    let mut writer = ZipWriter::new(File::create(&path).unwrap());
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true);
    writer.start_file("Bars/huge.xml", options).unwrap();
    writer.write_all(content).unwrap();
    writer.start_file("Bars/good.xml", SimpleFileOptions::default()).unwrap();
    writer.write_all(b"<Bar SOLL=\"2\"/>").unwrap();
    writer.finish().unwrap();

    assert!(patch_zip64_sizes(&path, content.len() as u64, 0x7fff_ffff_ffff_0000) > 0);

    let store = ArchiveStore::new();
    assert_eq!(store.list_entries(&path).len(), 2);

    let members = store.read_members_under_folders(&path, &["Bars/"]);
    assert_eq!(members.len(), 2);
    assert_eq!(members["Bars/good.xml"].as_text(), Some("<Bar SOLL=\"2\"/>"));

    let bytes = store.read_member_bytes_under_folders(&path, &["Bars/"]);
    assert_eq!(bytes["Bars/good.xml"], b"<Bar SOLL=\"2\"/>".to_vec());
}

#[cfg(unix)]
#[test]
fn test_rewrite_keeps_source_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let archive = machine_archive(&temp_dir);
    fs::set_permissions(&archive, fs::Permissions::from_mode(0o644)).unwrap();
    let added = utf8_path(&temp_dir, "added.zip");
    let replaced = utf8_path(&temp_dir, "replaced.zip");
    let store = ArchiveStore::new();

    assert!(store.rewrite_with_added_member(&archive, &added, None, b"{}"));
    assert!(store.rewrite_with_replacements(&archive, &replaced, &HashMap::new()));

    for output in [&added, &replaced] {
        let mode = fs::metadata(output).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644, "unexpected mode for {}", output);
    }
}
