mod common;

use common::*;
use rarview::{Archive, Error, Options, Signature};

fn simple_rar5() -> Vec<u8> {
    let lines = numbered_lines();
    let mut builder = Rar5Builder::new();
    builder
        .main(false)
        .file(&Rar5File::stored(b"stest1.txt", &lines))
        .file(&Rar5File::stored(b"stest2.txt", &lines))
        .end_archive(false);
    builder.build()
}

#[test]
fn parses_record_framed_archives() {
    let archive = Archive::from_bytes(simple_rar5(), Options::default()).unwrap();

    assert_eq!(archive.format(), Signature::Rar5);
    assert_eq!(archive.namelist(), vec!["stest1.txt", "stest2.txt"]);

    let info = archive.getinfo("stest1.txt").unwrap();
    assert_eq!(info.unpacked_size, 2048);
    assert_eq!(info.method, 0x30);
    assert_eq!(info.extract_version, 50);
    assert!(info.is_stored());
}

#[test]
fn reads_stored_rar5_members() {
    let archive = Archive::from_bytes(simple_rar5(), Options::default()).unwrap();

    assert_eq!(archive.read("stest1.txt").unwrap(), numbered_lines());
    assert_eq!(archive.read("stest2.txt").unwrap(), numbered_lines());
}

#[test]
fn extracts_rar5_comment() {
    let mut builder = Rar5Builder::new();
    builder
        .main(false)
        .file(&Rar5File::stored(b"file1.txt", b"data"))
        .comment(b"RARcomment\n")
        .end_archive(false);

    let archive = Archive::from_bytes(builder.build(), Options::default()).unwrap();
    assert_eq!(archive.comment(), Some("RARcomment\n"));
    assert_eq!(archive.namelist(), vec!["file1.txt"]);
}

#[test]
fn walks_rar5_volumes() {
    let payload = (0..2500u32).map(|i| (i % 239) as u8).collect::<Vec<u8>>();
    let (part1, part2) = payload.split_at(1300);

    let mut vol1 = Rar5Builder::new();
    vol1.main(true)
        .file(&Rar5File {
            data: part1,
            unpacked_size: 2500,
            crc32: crc(&payload),
            split: RAR5_BLOCK_SPLIT_AFTER,
            ..Rar5File::stored(b"big.bin", part1)
        })
        .end_archive(true);

    let mut vol2 = Rar5Builder::new();
    vol2.main(true)
        .file(&Rar5File {
            data: part2,
            unpacked_size: 2500,
            crc32: crc(&payload),
            split: RAR5_BLOCK_SPLIT_BEFORE,
            ..Rar5File::stored(b"big.bin", part2)
        })
        .end_archive(false);

    let (_dir, paths) = write_volumes(&[
        ("five.part1.rar", vol1.build()),
        ("five.part2.rar", vol2.build()),
    ]);

    let archive = Archive::open(&paths[0]).unwrap();

    assert_eq!(archive.volumelist().len(), 2);
    let entry = archive.getinfo("big.bin").unwrap();
    assert!(entry.is_split());
    assert_eq!(entry.fragments.len(), 2);

    assert_eq!(archive.read("big.bin").unwrap(), payload);
}

#[test]
fn corrupt_rar5_header_ends_the_parse() {
    let mut data = simple_rar5();

    // Flip a byte inside the second file block's name.
    let needle = b"stest2";
    let at = data
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap();
    data[at] ^= 0xff;

    let archive = Archive::from_bytes(data, Options::default()).unwrap();
    // Parsing stopped at the damaged header, keeping the first entry.
    assert_eq!(archive.namelist(), vec!["stest1.txt"]);
}

#[test]
fn rar5_crc_failure_surfaces_on_read() {
    let mut builder = Rar5Builder::new();
    builder
        .main(false)
        .file(&Rar5File {
            crc32: 0x0bad_0bad,
            ..Rar5File::stored(b"x.bin", b"0123456789")
        })
        .end_archive(false);

    let archive = Archive::from_bytes(builder.build(), Options::default()).unwrap();
    assert!(matches!(archive.read("x.bin"), Err(Error::BadArchive(_))));
}
