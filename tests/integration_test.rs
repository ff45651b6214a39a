use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Cursor, Read, Write};

use sha2::{Digest, Sha256};
use varc::archive::{empty_archive_hash, Archive, ArchiveError, AssetOrArchive};
use varc::asset::{Asset, Blob};
use varc::format::Format;
use varc::reader::Reader;
use varc::writer;

fn text(name_contents: &str) -> AssetOrArchive {
    AssetOrArchive::Asset(Asset::from_text(name_contents).unwrap())
}

fn collect_members(reader: &mut dyn Reader) -> Vec<(String, Vec<u8>)> {
    let mut members = Vec::new();
    while let Some((name, mut blob)) = reader.next().unwrap() {
        let mut data = Vec::new();
        blob.read_to_end(&mut data).unwrap();
        members.push((name, data));
    }
    members
}

#[test]
fn empty_digest_matches_known_constant() {
    // The canonical empty archive is an empty tar stream (two zero blocks).
    // If this assertion ever fails, a tar-writer default changed and every
    // previously recorded digest of an empty archive is invalidated.
    assert_eq!(
        empty_archive_hash(),
        "5f70bf18a086007016e948b04aed3b82103a36bea41755b6cddfaf10ace3c6ef"
    );

    let empty = Archive::from_assets(BTreeMap::new()).unwrap();
    assert_eq!(empty.hash(), Some(empty_archive_hash()));
    assert!(empty.is_assets());
    assert!(empty.has_contents());
}

#[test]
fn assets_archive_round_trips_through_wire() {
    let mut assets = BTreeMap::new();
    assets.insert("a.txt".to_string(), text("alpha"));
    assets.insert("b.txt".to_string(), text("beta"));
    let archive = Archive::from_assets(assets).unwrap();

    let decoded = Archive::deserialize(&archive.serialize()).unwrap().unwrap();
    assert!(decoded.is_assets());
    assert!(archive.equals(&decoded));
}

#[test]
fn path_archive_round_trips_through_wire() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("one.txt"), b"one").unwrap();
    fs::write(dir.path().join("two.txt"), b"two").unwrap();
    let archive = Archive::from_path(dir.path()).unwrap();

    let decoded = Archive::deserialize(&archive.serialize()).unwrap().unwrap();
    assert!(decoded.is_path());
    assert!(archive.equals(&decoded));
}

#[test]
fn uri_archive_round_trips_through_wire() {
    let dir = tempfile::tempdir().unwrap();
    let mut assets = BTreeMap::new();
    assets.insert("hello.txt".to_string(), text("hi"));
    let source = Archive::from_assets(assets).unwrap();
    let tar_path = dir.path().join("bundle.tar");
    fs::write(&tar_path, source.bytes(Format::Tar).unwrap()).unwrap();

    let uri = format!("file://{}", tar_path.display());
    let archive = Archive::from_uri(uri).unwrap();
    assert!(archive.is_uri());

    let decoded = Archive::deserialize(&archive.serialize()).unwrap().unwrap();
    assert!(decoded.is_uri());
    assert!(archive.equals(&decoded));
}

#[test]
fn empty_archive_round_trips_through_wire() {
    let archive = Archive::from_assets(BTreeMap::new()).unwrap();
    let decoded = Archive::deserialize(&archive.serialize()).unwrap().unwrap();
    assert!(decoded.is_assets());
    assert!(archive.equals(&decoded));
}

#[test]
fn serde_embeds_archives_in_json_documents() {
    let mut assets = BTreeMap::new();
    assets.insert("readme.txt".to_string(), text("hello"));
    let archive = Archive::from_assets(assets).unwrap();

    let json = serde_json::to_string(&archive).unwrap();
    assert!(json.contains("4dabf18193072939515e22adb298388d"));
    let decoded: Archive = serde_json::from_str(&json).unwrap();
    assert!(archive.equals(&decoded));
}

#[test]
fn nested_archives_flatten_under_prefixes() {
    let mut inner_a = BTreeMap::new();
    inner_a.insert("x".to_string(), text("shared"));
    let mut inner_b = BTreeMap::new();
    inner_b.insert("x".to_string(), text("shared"));

    let mut outer = BTreeMap::new();
    outer.insert(
        "a".to_string(),
        AssetOrArchive::Archive(Archive::from_assets(inner_a).unwrap()),
    );
    outer.insert(
        "b".to_string(),
        AssetOrArchive::Archive(Archive::from_assets(inner_b).unwrap()),
    );
    let archive = Archive::from_assets(outer).unwrap();

    let mut reader = archive.open().unwrap();
    let members = collect_members(reader.as_mut());
    let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a/x", "b/x"]);
}

#[test]
fn nested_archive_zip_preserves_member_paths() {
    // A nested path archive plus a loose text asset, written as zip and read
    // back member by member.
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("foo/bar")).unwrap();
    fs::write(dir.path().join("foo/a.txt"), b"a").unwrap();
    fs::write(dir.path().join("foo/bar/b.txt"), b"b").unwrap();

    let inner = Archive::from_path(dir.path().join("foo")).unwrap();
    let mut outer = BTreeMap::new();
    outer.insert("./foo".to_string(), AssetOrArchive::Archive(inner));
    outer.insert("fake.txt".to_string(), text("hello world"));
    let archive = Archive::from_assets(outer).unwrap();

    let zip_path = dir.path().join("out.zip");
    fs::write(&zip_path, archive.bytes(Format::Zip).unwrap()).unwrap();

    let packed = Archive::from_path(&zip_path).unwrap();
    let mut reader = packed.open().unwrap();
    let members = collect_members(reader.as_mut());
    let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["foo/a.txt", "foo/bar/b.txt", "fake.txt"]);
}

#[test]
fn overlapping_nested_paths_write_each_member_once() {
    // "./foo" and "./foo/bar" both reach b.txt; the flattened name
    // "foo/bar/b.txt" must appear exactly once in the written archive.
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("foo/bar")).unwrap();
    fs::write(dir.path().join("foo/bar/b.txt"), b"b").unwrap();

    let outer_arch = Archive::from_path(dir.path().join("foo")).unwrap();
    let inner_arch = Archive::from_path(dir.path().join("foo/bar")).unwrap();
    let mut assets = BTreeMap::new();
    assets.insert("./foo".to_string(), AssetOrArchive::Archive(outer_arch));
    assets.insert("./foo/bar".to_string(), AssetOrArchive::Archive(inner_arch));
    let archive = Archive::from_assets(assets).unwrap();

    let tar_path = dir.path().join("out.tar");
    fs::write(&tar_path, archive.bytes(Format::Tar).unwrap()).unwrap();

    let packed = Archive::from_path(&tar_path).unwrap();
    let mut reader = packed.open().unwrap();
    let members = collect_members(reader.as_mut());
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].0, "foo/bar/b.txt");
    assert_eq!(members[0].1, b"b");
}

#[test]
fn map_and_directory_sources_encode_to_identical_tar() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), b"alpha contents").unwrap();
    fs::write(dir.path().join("b.txt"), b"beta contents").unwrap();
    let dir_archive = Archive::from_path(dir.path()).unwrap();

    let mut assets = BTreeMap::new();
    assets.insert("a.txt".to_string(), text("alpha contents"));
    assets.insert("b.txt".to_string(), text("beta contents"));
    let map_archive = Archive::from_assets(assets).unwrap();

    // Compare the canonical tar encodings byte for byte; both funnel through
    // the same re-encoder, so the same logical contents must coincide.
    let dir_tar = dir_archive.bytes(Format::Tar).unwrap();
    let map_tar = map_archive.bytes(Format::Tar).unwrap();
    assert_eq!(dir_tar, map_tar);
    assert!(dir_archive.equals(&map_archive));
}

#[test]
fn already_encoded_sources_hash_their_raw_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let mut assets = BTreeMap::new();
    assets.insert("hello.txt".to_string(), text("hi"));
    let source = Archive::from_assets(assets).unwrap();

    let tgz_path = dir.path().join("bundle.tgz");
    let raw = source.bytes(Format::TarGzip).unwrap();
    fs::write(&tgz_path, &raw).unwrap();

    let packed = Archive::from_path(&tgz_path).unwrap();
    // The fast path hashes the file's raw bytes, not a tar re-encode.
    assert_eq!(packed.hash(), Some(hex::encode(Sha256::digest(&raw)).as_str()));
    // And the same fast path returns those bytes verbatim on conversion.
    assert_eq!(packed.bytes(Format::TarGzip).unwrap(), raw);
}

#[test]
fn ensure_hash_is_memoized_and_never_rereads() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("data.txt"), b"memoize me").unwrap();
    let archive = Archive::from_path(dir.path()).unwrap();
    let first = archive.hash().unwrap().to_string();

    // Removing the source makes any re-read fail loudly; the memoized hash
    // must survive untouched.
    drop(dir);
    archive.ensure_hash().unwrap();
    assert_eq!(archive.hash(), Some(first.as_str()));
}

#[test]
fn directory_walk_excludes_bookkeeping_and_dir_symlinks() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("kept.txt"), b"kept").unwrap();
    fs::create_dir(dir.path().join(varc::BOOKKEEPING_DIR)).unwrap();
    fs::write(dir.path().join(varc::BOOKKEEPING_DIR).join("state.json"), b"{}").unwrap();
    fs::create_dir(dir.path().join("real_dir")).unwrap();
    fs::write(dir.path().join("real_dir/inner.txt"), b"inner").unwrap();

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(dir.path().join("real_dir"), dir.path().join("dir_link"))
            .unwrap();
        std::os::unix::fs::symlink(dir.path().join("kept.txt"), dir.path().join("file_link"))
            .unwrap();
    }

    let archive = Archive::from_path(dir.path()).unwrap();
    let mut reader = archive.open().unwrap();
    let members = collect_members(reader.as_mut());
    let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();

    assert!(names.contains(&"kept.txt"));
    assert!(names.contains(&"real_dir/inner.txt"));
    assert!(!names.iter().any(|n| n.contains(varc::BOOKKEEPING_DIR)));
    assert!(!names.iter().any(|n| n.starts_with("dir_link")));

    #[cfg(unix)]
    {
        // A symlink to a file is archived as a copy of the file's bytes.
        let linked = members.iter().find(|(n, _)| n == "file_link").unwrap();
        assert_eq!(linked.1, b"kept");
    }
}

// A cursor that declares more bytes than it delivers.
struct LyingReader {
    emitted: bool,
}

impl Reader for LyingReader {
    fn next(&mut self) -> Result<Option<(String, Blob)>, ArchiveError> {
        if self.emitted {
            return Ok(None);
        }
        self.emitted = true;
        let blob = Blob::new(Box::new(Cursor::new(vec![7u8; 3])), 10);
        Ok(Some(("liar.bin".to_string(), blob)))
    }
}

#[test]
fn tar_writer_rejects_misdeclared_blob_sizes() {
    let mut out = Vec::new();
    let err = writer::write_tar(&mut LyingReader { emitted: false }, &mut out).unwrap_err();
    match err {
        ArchiveError::SizeMismatch { name, expected, actual } => {
            assert_eq!(name, "liar.bin");
            assert_eq!(expected, 10);
            assert_eq!(actual, 3);
        }
        other => panic!("expected SizeMismatch, got {other}"),
    }
}

#[test]
fn zip_writer_rejects_misdeclared_blob_sizes() {
    let mut out = Vec::new();
    let err = writer::write_zip(&mut LyingReader { emitted: false }, &mut out).unwrap_err();
    assert!(matches!(err, ArchiveError::SizeMismatch { expected: 10, actual: 3, .. }));
}

#[test]
fn targzip_round_trip_of_single_text_member() {
    let dir = tempfile::tempdir().unwrap();
    let mut assets = BTreeMap::new();
    assets.insert("hello.txt".to_string(), text("hi"));
    let archive = Archive::from_assets(assets).unwrap();

    let tgz_path = dir.path().join("roundtrip.tgz");
    let mut file = File::create(&tgz_path).unwrap();
    file.write_all(&archive.bytes(Format::TarGzip).unwrap()).unwrap();
    drop(file);

    let packed = Archive::from_path(&tgz_path).unwrap();
    let mut reader = packed.open().unwrap();
    let members = collect_members(reader.as_mut());
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].0, "hello.txt");
    assert_eq!(members[0].1, b"hi");
}

#[test]
fn plain_file_without_archive_suffix_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes");
    fs::write(&path, b"foo\n").unwrap();
    let err = Archive::from_path(&path).unwrap_err();
    assert!(matches!(err, ArchiveError::NotArchiveOrDirectory(_)));
}

#[test]
fn empty_constructor_inputs_are_rejected() {
    assert!(matches!(Archive::from_path(""), Err(ArchiveError::EmptyPath)));
    assert!(matches!(Archive::from_uri(""), Err(ArchiveError::EmptyUri)));
}

#[test]
fn jar_files_are_read_like_zip() {
    let dir = tempfile::tempdir().unwrap();
    let mut assets = BTreeMap::new();
    assets.insert("Manifest.txt".to_string(), text("v1"));
    let source = Archive::from_assets(assets).unwrap();

    let jar_path = dir.path().join("lib.jar");
    fs::write(&jar_path, source.bytes(Format::Zip).unwrap()).unwrap();

    let packed = Archive::from_path(&jar_path).unwrap();
    let mut reader = packed.open().unwrap();
    let members = collect_members(reader.as_mut());
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].0, "Manifest.txt");
}

#[test]
fn jar_is_not_a_writable_target() {
    let mut assets = BTreeMap::new();
    assets.insert("a.txt".to_string(), text("a"));
    let archive = Archive::from_assets(assets).unwrap();
    let mut out = Vec::new();
    let err = archive.archive(Format::Jar, &mut out).unwrap_err();
    assert!(matches!(err, ArchiveError::UnsupportedFormat(Format::Jar)));
}

#[test]
fn placeholder_archives_have_no_contents() {
    // A hash-only wire value whose hash differs from the empty digest is a
    // placeholder: its contents are not known, so it cannot be opened.
    let mut obj = serde_json::Map::new();
    obj.insert(
        varc::wire::SIG_KEY.to_string(),
        serde_json::Value::String(varc::wire::ARCHIVE_SIG.to_string()),
    );
    obj.insert(
        "hash".to_string(),
        serde_json::Value::String("ab".repeat(32)),
    );
    let placeholder = Archive::deserialize(&obj).unwrap().unwrap();
    assert!(!placeholder.is_assets());
    assert!(!placeholder.has_contents());
    assert!(matches!(placeholder.open(), Err(ArchiveError::NoContents)));
}

#[test]
fn unresolvable_hashes_never_compare_equal() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("f.txt"), b"f").unwrap();
    let good = Archive::from_path(dir.path()).unwrap();

    // Deserialized path archive pointing at nothing: its hash cannot be
    // resolved, so it is equal to nothing — not even itself.
    let mut obj = serde_json::Map::new();
    obj.insert(
        varc::wire::SIG_KEY.to_string(),
        serde_json::Value::String(varc::wire::ARCHIVE_SIG.to_string()),
    );
    obj.insert(
        "path".to_string(),
        serde_json::Value::String("/nonexistent/definitely/missing".to_string()),
    );
    let broken = Archive::deserialize(&obj).unwrap().unwrap();
    assert!(!good.equals(&broken));
    assert!(!broken.equals(&broken));
}

#[test]
fn zip_entries_carry_the_fixed_timestamp() {
    let mut assets = BTreeMap::new();
    assets.insert("stamp.txt".to_string(), text("t"));
    let archive = Archive::from_assets(assets).unwrap();
    let data = archive.bytes(Format::Zip).unwrap();

    let mut zip = zip::ZipArchive::new(Cursor::new(data)).unwrap();
    let entry = zip.by_index(0).unwrap();
    let modified = entry.last_modified().unwrap();
    assert_eq!(modified.year(), 1990);
    assert_eq!(modified.month(), 1);
    assert_eq!(modified.day(), 1);
}

#[test]
fn converting_between_formats_preserves_members() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("x.txt"), b"xx").unwrap();
    fs::write(dir.path().join("y.txt"), b"yy").unwrap();

    let tar_path = dir.path().join("src.tar");
    let source = Archive::from_path(dir.path()).unwrap();
    fs::write(&tar_path, source.bytes(Format::Tar).unwrap()).unwrap();

    // tar -> zip -> members
    let tar_archive = Archive::from_path(&tar_path).unwrap();
    let zip_path = dir.path().join("converted.zip");
    fs::write(&zip_path, tar_archive.bytes(Format::Zip).unwrap()).unwrap();

    let zip_archive = Archive::from_path(&zip_path).unwrap();
    let mut reader = zip_archive.open().unwrap();
    let members = collect_members(reader.as_mut());
    let names: Vec<&str> = members.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["x.txt", "y.txt"]);
}
