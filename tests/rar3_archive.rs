mod common;

use std::{cell::RefCell, rc::Rc};

use common::*;
use rarview::{Archive, Error, Options, Signature, Whence};

fn two_member_archive() -> Vec<u8> {
    let lines = numbered_lines();
    let mut builder = Rar3Builder::new();
    builder
        .main(0)
        .file(&Rar3File::stored(b"stest1.txt", &lines))
        .file(&Rar3File::stored(b"stest2.txt", &lines))
        .end_archive(0);
    builder.build()
}

#[test]
fn lists_members_in_archive_order() {
    let archive = Archive::from_bytes(two_member_archive(), Options::default()).unwrap();

    assert_eq!(archive.format(), Signature::Rar3);
    assert_eq!(archive.namelist(), vec!["stest1.txt", "stest2.txt"]);
    assert!(!archive.needs_password());

    let info = archive.getinfo("stest1.txt").unwrap();
    assert_eq!(info.unpacked_size, 2048);
    assert_eq!(info.packed_size, 2048);
    assert_eq!(info.method, 0x30);
    assert_eq!(info.extract_version, 29);
    assert!(info.is_stored());
    assert!(!info.is_directory);

    let mtime = info.modification_time.unwrap();
    assert_eq!(
        (mtime.year(), mtime.hour(), mtime.second()),
        (2010, 21, 58)
    );
}

#[test]
fn reads_stored_member_with_crc_check() {
    let archive = Archive::from_bytes(two_member_archive(), Options::default()).unwrap();

    let data = archive.read("stest1.txt").unwrap();
    assert_eq!(data.len(), 2048);
    assert_eq!(data, numbered_lines());
    assert_eq!(archive.read("stest2.txt").unwrap(), data);
}

#[test]
fn missing_member_is_no_entry() {
    let archive = Archive::from_bytes(two_member_archive(), Options::default()).unwrap();

    assert!(matches!(
        archive.read("nope.txt"),
        Err(Error::NoEntry(_))
    ));
}

#[test]
fn lookup_treats_separators_as_equivalent() {
    let mut builder = Rar3Builder::new();
    builder
        .main(0)
        .file(&Rar3File::stored(b"dir\\file.txt", b"payload"))
        .end_archive(0);

    let archive = Archive::from_bytes(builder.build(), Options::default()).unwrap();
    assert_eq!(archive.read("dir/file.txt").unwrap(), b"payload");
}

#[test]
fn rejects_non_archives() {
    assert!(matches!(
        Archive::from_bytes(b"PK\x03\x04 not a rar".to_vec(), Options::default()),
        Err(Error::NotArchive)
    ));
}

#[test]
fn signature_found_behind_sfx_stub() {
    let mut builder = Rar3Builder::with_sfx_prefix(&[0x4d; 3000]);
    builder
        .main(0)
        .file(&Rar3File::stored(b"inner.txt", b"sfx payload"))
        .end_archive(0);

    let archive = Archive::from_bytes(builder.build(), Options::default()).unwrap();
    assert_eq!(archive.read("inner.txt").unwrap(), b"sfx payload");
}

#[test]
fn corrupt_payload_fails_crc_check() {
    let lines = numbered_lines();
    let mut builder = Rar3Builder::new();
    builder
        .main(0)
        .file(&Rar3File {
            crc32: 0xdeadbeef,
            ..Rar3File::stored(b"bad.txt", &lines)
        })
        .end_archive(0);
    let data = builder.build();

    let archive = Archive::from_bytes(data.clone(), Options::default()).unwrap();
    assert!(matches!(
        archive.read("bad.txt"),
        Err(Error::BadArchive(_))
    ));

    // The same archive reads fine with checking disabled.
    let options = Options {
        crc_check: false,
        ..Options::default()
    };
    let archive = Archive::from_bytes(data, options).unwrap();
    assert_eq!(archive.read("bad.txt").unwrap(), lines);
}

#[test]
fn trailing_garbage_ends_the_parse() {
    let mut data = two_member_archive();
    // Strip the end block and glue junk on.
    data.truncate(data.len() - 7);
    data.extend_from_slice(&[0x99; 64]);

    let archive = Archive::from_bytes(data, Options::default()).unwrap();
    assert_eq!(archive.namelist(), vec!["stest1.txt", "stest2.txt"]);
}

#[test]
fn directory_entries_have_no_data() {
    let mut builder = Rar3Builder::new();
    builder
        .main(0)
        .directory(b"subdir")
        .file(&Rar3File::stored(b"subdir\\a.txt", b"abc"))
        .end_archive(0);

    let archive = Archive::from_bytes(builder.build(), Options::default()).unwrap();

    let dir = archive.getinfo("subdir").unwrap();
    assert!(dir.is_directory);
    assert_eq!(archive.read("subdir").unwrap(), b"");
    assert_eq!(archive.read("subdir/a.txt").unwrap(), b"abc");
}

#[test]
fn decodes_compact_unicode_names() {
    // "naive" + correction stream decoding to "naïve".
    let mut name = b"naive".to_vec();
    name.push(0);
    name.extend_from_slice(&[0x00, 0x04, b'n', b'a', 0xef, b'v', 0x00, b'e']);

    let mut builder = Rar3Builder::new();
    builder
        .main(0)
        .file(&Rar3File {
            flags: RAR3_FILE_UNICODE,
            ..Rar3File::stored(&name, b"unicode payload")
        })
        .end_archive(0);

    let archive = Archive::from_bytes(builder.build(), Options::default()).unwrap();
    assert_eq!(archive.namelist(), vec!["naïve"]);
    assert_eq!(archive.read("naïve").unwrap(), b"unicode payload");
}

#[test]
fn non_unicode_names_use_fallback_charset() {
    let mut builder = Rar3Builder::new();
    builder
        .main(0)
        .file(&Rar3File::stored(b"caf\xe9.txt", b"x"))
        .end_archive(0);

    // windows-1252 is the default fallback.
    let archive = Archive::from_bytes(builder.build(), Options::default()).unwrap();
    assert_eq!(archive.namelist(), vec!["café.txt"]);
}

#[test]
fn extracts_stored_comment() {
    let mut builder = Rar3Builder::new();
    builder
        .main(0)
        .comment(b"RARcomment\n")
        .file(&Rar3File::stored(b"file1.txt", b"hello"))
        .end_archive(0);

    let archive = Archive::from_bytes(builder.build(), Options::default()).unwrap();
    assert_eq!(archive.comment(), Some("RARcomment\n"));
    // The comment stream must not show up as an entry.
    assert_eq!(archive.namelist(), vec!["file1.txt"]);
}

#[test]
fn info_callback_sees_every_block() {
    let seen = Rc::new(RefCell::new(vec![]));
    let sink = Rc::clone(&seen);

    let options = Options {
        info_callback: Some(Box::new(move |block| {
            sink.borrow_mut().push(block.offset());
        })),
        ..Options::default()
    };

    Archive::from_bytes(two_member_archive(), options).unwrap();

    // main, two files, end block.
    assert_eq!(seen.borrow().len(), 4);
}

#[test]
fn password_flagged_entry_requires_password() {
    let mut builder = Rar3Builder::new();
    builder
        .main(0)
        .file(&Rar3File {
            flags: RAR3_FILE_PASSWORD,
            salt: Some([9; 8]),
            ..Rar3File::stored(b"secret.txt", b"ciphertext here")
        })
        .end_archive(0);

    let archive = Archive::from_bytes(builder.build(), Options::default()).unwrap();

    let entry = archive.getinfo("secret.txt").unwrap();
    assert!(entry.needs_password());
    assert!(matches!(
        archive.read("secret.txt"),
        Err(Error::PasswordRequired)
    ));
}

#[test]
fn seek_clamps_and_reads_from_the_cursor() {
    let archive = Archive::from_bytes(two_member_archive(), Options::default()).unwrap();
    let mut reader = archive.open_member("stest1.txt").unwrap();

    // Past-end and negative targets clamp.
    assert_eq!(reader.seek(5000, Whence::Start).unwrap(), 2048);
    assert_eq!(reader.read(Some(4)).unwrap(), b"");
    assert_eq!(reader.seek(-10_000, Whence::Current).unwrap(), 0);

    // Every line holds its own offset / 4.
    for pos in [0i64, 512, 1024, 2044, 4, 2000] {
        reader.seek(pos, Whence::Start).unwrap();
        assert_eq!(reader.tell(), pos as u64);
        let line = reader.read(Some(4)).unwrap();
        assert_eq!(line, format!("{:03}\n", pos / 4).as_bytes());
    }

    // Relative and from-end seeks.
    reader.seek(100, Whence::Start).unwrap();
    assert_eq!(reader.seek(-40, Whence::Current).unwrap(), 60);
    assert_eq!(reader.seek(-8, Whence::End).unwrap(), 2040);
    assert_eq!(reader.read(None).unwrap(), b"510\n511\n");

    reader.close();
    assert_eq!(reader.read(Some(4)).unwrap(), b"");
}

#[test]
fn sequential_read_in_chunks_passes_crc() {
    let archive = Archive::from_bytes(two_member_archive(), Options::default()).unwrap();
    let mut reader = archive.open_member("stest2.txt").unwrap();

    let mut collected = vec![];
    loop {
        let chunk = reader.read(Some(100)).unwrap();
        if chunk.is_empty() {
            break;
        }
        collected.extend_from_slice(&chunk);
    }

    assert_eq!(collected, numbered_lines());
}

#[test]
fn two_readers_coexist() {
    let archive = Archive::from_bytes(two_member_archive(), Options::default()).unwrap();

    let mut first = archive.open_member("stest1.txt").unwrap();
    let mut second = archive.open_member("stest2.txt").unwrap();

    first.seek(8, Whence::Start).unwrap();
    assert_eq!(first.read(Some(4)).unwrap(), b"002\n");
    assert_eq!(second.read(Some(4)).unwrap(), b"000\n");
}
