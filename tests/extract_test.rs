mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use presetsync::zip::{ArchiveExtractor, ExtractError, ExtractErrorKind, ZipParser};
use zip::CompressionMethod;

use common::{zip_archive, zip_archive_with};

#[tokio::test]
async fn extracts_nested_tree_with_deflate() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("pack.zip");
    let big = "per_frame_1=wave_r = 0.5;\n".repeat(500);
    fs::write(
        &archive,
        zip_archive(&[
            ("presets/", b""),
            ("presets/space/star.milk", big.as_bytes()),
            ("presets/readme.txt", b"hello"),
            ("top.prjm", b"x"),
        ]),
    )
    .unwrap();
    let out = dir.path().join("tree");
    fs::create_dir(&out).unwrap();

    let stats = ArchiveExtractor::new().extract(&archive, &out).await.unwrap();

    assert_eq!(stats.files, 3);
    assert_eq!(stats.directories, 1);
    assert_eq!(stats.skipped, 0);
    assert_eq!(
        fs::read_to_string(out.join("presets/space/star.milk")).unwrap(),
        big
    );
    assert_eq!(fs::read(out.join("presets/readme.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(out.join("top.prjm")).unwrap(), b"x");
}

#[tokio::test]
async fn extracts_stored_entries_from_archive_with_comment() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("stored.zip");
    fs::write(
        &archive,
        zip_archive_with(
            &[("a/b/plain.milk", b"stored bytes")],
            CompressionMethod::Stored,
            Some("preset pack, see https://example.com"),
        ),
    )
    .unwrap();
    let out = dir.path().join("tree");
    fs::create_dir(&out).unwrap();

    ArchiveExtractor::new().extract(&archive, &out).await.unwrap();

    assert_eq!(fs::read(out.join("a/b/plain.milk")).unwrap(), b"stored bytes");
}

#[tokio::test]
async fn parser_lists_entries_from_memory() {
    let bytes = zip_archive(&[("dir/", b""), ("dir/one.milk", b"1"), ("two.prjm", b"22")]);
    let parser = ZipParser::new(Arc::new(bytes));

    let entries = parser.list_files().await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.file_name.as_str()).collect();
    assert_eq!(names, ["dir/", "dir/one.milk", "two.prjm"]);
    assert!(entries[0].is_directory);
    assert!(!entries[1].is_directory);
    assert_eq!(entries[2].uncompressed_size, 2);
}

#[tokio::test]
async fn empty_archive_extracts_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("empty.zip");
    fs::write(&archive, zip_archive(&[])).unwrap();

    let stats = ArchiveExtractor::new()
        .extract(&archive, dir.path())
        .await
        .unwrap();
    assert_eq!(stats.files, 0);
}

#[tokio::test]
async fn truncated_archives_are_corrupt() {
    let bytes = zip_archive(&[("glow.milk", b"glow glow glow")]);
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("tree");
    fs::create_dir(&out).unwrap();

    let cut_tail = dir.path().join("tail.zip");
    fs::write(&cut_tail, &bytes[..bytes.len() - 10]).unwrap();
    let err = ArchiveExtractor::new()
        .extract(&cut_tail, &out)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ExtractErrorKind::CorruptArchive, "{err}");

    let cut_head = dir.path().join("head.zip");
    fs::write(&cut_head, &bytes[5..]).unwrap();
    let err = ArchiveExtractor::new()
        .extract(&cut_head, &out)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ExtractErrorKind::CorruptArchive, "{err}");
}

#[tokio::test]
async fn exceeding_the_time_limit_is_an_io_failure() {
    let names: Vec<String> = (0..3000).map(|i| format!("many/p{i}.milk")).collect();
    let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &b"m"[..])).collect();
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("many.zip");
    fs::write(&archive, zip_archive(&entries)).unwrap();
    let out = dir.path().join("tree");
    fs::create_dir(&out).unwrap();

    let err = ArchiveExtractor::new()
        .with_timeout(Duration::ZERO)
        .extract(&archive, &out)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ExtractErrorKind::Io, "{err}");
    match err {
        ExtractError::Io { source, .. } => {
            assert_eq!(source.kind(), std::io::ErrorKind::TimedOut)
        }
        other => panic!("expected an i/o error, got {other:?}"),
    }
}

#[tokio::test]
async fn generous_time_limit_extracts_everything() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("pack.zip");
    fs::write(&archive, zip_archive(&[("a.milk", b"a"), ("b/c.prjm", b"c")])).unwrap();
    let out = dir.path().join("tree");
    fs::create_dir(&out).unwrap();

    let stats = ArchiveExtractor::new()
        .with_timeout(Duration::from_secs(60))
        .extract(&archive, &out)
        .await
        .unwrap();
    assert_eq!(stats.files, 2);
}
