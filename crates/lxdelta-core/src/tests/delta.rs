use std::path::Path;

use tar::EntryType;

use crate::delta::{
    profile_path, removed_manifest_path, BuildOutcome, DeltaBuilder, Profile,
};
use crate::diff::diff;
use crate::error::LxdeltaError;
use crate::fingerprint::{fingerprint_file, FingerprintTable};
use crate::testutil::{
    compress, member_paths, read_members, tar_bytes, write_archive, TestMember,
};

fn profile() -> Profile {
    Profile::new("default", "config:\n  limits.cpu: \"2\"\n")
}

fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn delta_holds_only_changed_and_added_members() {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.tar.zst");
    let current = dir.path().join("current.tar.zst");
    let dest = dir.path().join("delta.tar.zst");

    write_archive(
        &base,
        &[TestMember::file("a", "one"), TestMember::file("b", "two")],
    );
    write_archive(
        &current,
        &[
            TestMember::dir("etc/"),
            TestMember::file("a", "one"),
            TestMember::file("b", "two, edited"),
            TestMember::file("c", "three"),
        ],
    );

    let changes = diff(
        &fingerprint_file(&base).unwrap(),
        &fingerprint_file(&current).unwrap(),
    );
    let outcome = DeltaBuilder::default()
        .build(&current, &changes, &dest, &profile())
        .unwrap();
    assert_eq!(
        outcome,
        BuildOutcome::Built {
            members: 2,
            removed: 0
        }
    );

    let members = read_members(&dest);
    assert_eq!(members.len(), 2);
    assert_eq!(members[0].path, "b");
    assert_eq!(members[0].data, b"two, edited");
    assert_eq!(members[1].path, "c");
    assert_eq!(members[1].data, b"three");

    let manifest = std::fs::read(removed_manifest_path(&dest)).unwrap();
    assert!(manifest.is_empty());

    let sidecar = std::fs::read_to_string(profile_path(&dest, "default")).unwrap();
    assert_eq!(sidecar, profile().data);
}

#[test]
fn removal_only_delta_is_empty_archive_with_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let current = dir.path().join("current.tar.zst");
    let dest = dir.path().join("delta.tar.zst");
    write_archive(&current, &[]);

    let baseline: FingerprintTable = [("a", "h1")].into_iter().collect();
    let changes = diff(&baseline, &fingerprint_file(&current).unwrap());

    let outcome = DeltaBuilder::default()
        .build(&current, &changes, &dest, &profile())
        .unwrap();
    assert_eq!(
        outcome,
        BuildOutcome::Built {
            members: 0,
            removed: 1
        }
    );
    assert!(read_members(&dest).is_empty());
    assert_eq!(
        std::fs::read_to_string(removed_manifest_path(&dest)).unwrap(),
        "a\n"
    );
}

#[test]
fn removed_manifest_is_sorted_and_newline_terminated() {
    let dir = tempfile::tempdir().unwrap();
    let current = dir.path().join("current.tar.zst");
    let dest = dir.path().join("delta.tar.zst");
    write_archive(&current, &[TestMember::file("keep", "x")]);

    let baseline: FingerprintTable = [("zeta", "1"), ("alpha", "2"), ("mid/dle", "3")]
        .into_iter()
        .collect();
    let changes = diff(&baseline, &fingerprint_file(&current).unwrap());
    DeltaBuilder::default()
        .build(&current, &changes, &dest, &profile())
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(removed_manifest_path(&dest)).unwrap(),
        "alpha\nmid/dle\nzeta\n"
    );
    assert_eq!(member_paths(&dest), vec!["keep"]);
}

#[test]
fn second_build_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let current = dir.path().join("current.tar.zst");
    let dest = dir.path().join("delta.tar.zst");
    write_archive(&current, &[TestMember::file("a", "v1")]);

    let changes = diff(&FingerprintTable::new(), &fingerprint_file(&current).unwrap());
    let builder = DeltaBuilder::default();
    builder.build(&current, &changes, &dest, &profile()).unwrap();
    let first = std::fs::read(&dest).unwrap();

    // even a different source must not be read again
    write_archive(&current, &[TestMember::file("a", "v2")]);
    let outcome = builder.build(&current, &changes, &dest, &profile()).unwrap();
    assert_eq!(outcome, BuildOutcome::AlreadyPresent);
    assert_eq!(std::fs::read(&dest).unwrap(), first);

    std::fs::remove_file(&current).unwrap();
    let outcome = builder.build(&current, &changes, &dest, &profile()).unwrap();
    assert_eq!(outcome, BuildOutcome::AlreadyPresent);
}

#[test]
fn long_names_survive_the_copy() {
    let dir = tempfile::tempdir().unwrap();
    let current = dir.path().join("current.tar.zst");
    let dest = dir.path().join("delta.tar.zst");
    let long = format!("backup/rootfs/{}/deep.conf", "n".repeat(180));
    write_archive(
        &current,
        &[
            TestMember::file("short", "s"),
            TestMember::file(&long, "long body"),
        ],
    );

    let table = fingerprint_file(&current).unwrap();
    let mut changes = diff(&table, &table);
    changes.changed_or_added.insert(long.clone());

    DeltaBuilder::default()
        .build(&current, &changes, &dest, &profile())
        .unwrap();

    let members = read_members(&dest);
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].path, long);
    assert_eq!(members[0].kind, EntryType::Regular);
    assert_eq!(members[0].data, b"long body");
    assert_eq!(fingerprint_file(&dest).unwrap().get(&long), table.get(&long));
}

#[test]
fn pax_members_survive_the_copy() {
    let dir = tempfile::tempdir().unwrap();
    let current = dir.path().join("current.tar.zst");
    let dest = dir.path().join("delta.tar.zst");
    let long = format!("backup/rootfs/{}", "x".repeat(300));

    let mut builder = tar::Builder::new(Vec::new());
    builder
        .append_pax_extensions([
            ("path", long.as_bytes()),
            ("SCHILY.xattr.user.tag", &b"blue"[..]),
        ])
        .unwrap();
    let mut header = tar::Header::new_ustar();
    header.set_size(4);
    header.set_mode(0o600);
    header.set_entry_type(EntryType::Regular);
    builder
        .append_data(&mut header, "truncated-name", &b"data"[..])
        .unwrap();
    std::fs::write(&current, compress(&builder.into_inner().unwrap())).unwrap();

    let changes = diff(&FingerprintTable::new(), &fingerprint_file(&current).unwrap());
    DeltaBuilder::default()
        .build(&current, &changes, &dest, &profile())
        .unwrap();

    let file = std::fs::File::open(&dest).unwrap();
    let mut seen = Vec::new();
    crate::archive::for_each_member(file, "delta", |entry, path| {
        let xattr = entry
            .pax_extensions()?
            .and_then(|exts| {
                exts.filter_map(|e| e.ok())
                    .find(|e| e.key().ok() == Some("SCHILY.xattr.user.tag"))
                    .map(|e| e.value_bytes().to_vec())
            });
        seen.push((path.to_string(), xattr));
        Ok(())
    })
    .unwrap();
    assert_eq!(seen, vec![(long, Some(b"blue".to_vec()))]);
}

#[test]
fn copied_members_keep_their_headers() {
    let dir = tempfile::tempdir().unwrap();
    let current = dir.path().join("current.tar.zst");
    let dest = dir.path().join("delta.tar.zst");
    let raw = tar_bytes(&[TestMember::file("etc/motd", "welcome\n")]);
    std::fs::write(&current, compress(&raw)).unwrap();

    let changes = diff(&FingerprintTable::new(), &fingerprint_file(&current).unwrap());
    DeltaBuilder::new(19)
        .build(&current, &changes, &dest, &profile())
        .unwrap();

    let out = zstd::stream::decode_all(std::fs::File::open(&dest).unwrap()).unwrap();
    // header block plus one padded data block are byte-identical
    assert_eq!(&out[..1024], &raw[..1024]);
}

#[test]
fn corrupt_source_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let current = dir.path().join("current.tar.zst");
    let dest = dir.path().join("delta.tar.zst");
    std::fs::write(&current, b"not an archive").unwrap();

    let changes = diff(&FingerprintTable::new(), &[("a", "h")].into_iter().collect());
    let err = DeltaBuilder::default()
        .build(&current, &changes, &dest, &profile())
        .unwrap_err();

    match err {
        LxdeltaError::Bucket {
            destination,
            source,
        } => {
            assert_eq!(destination, dest);
            assert!(matches!(*source, LxdeltaError::CorruptArchive { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(dir_entries(dir.path()), vec!["current.tar.zst"]);
}

#[test]
fn truncated_source_leaves_nothing_behind() {
    let dir = tempfile::tempdir().unwrap();
    let current = dir.path().join("current.tar.zst");
    let dest = dir.path().join("delta.tar.zst");
    let mut raw = tar_bytes(&[TestMember::file("big", vec![1u8; 10_000])]);
    raw.truncate(512 + 4096);
    std::fs::write(&current, compress(&raw)).unwrap();

    let changes = diff(&FingerprintTable::new(), &[("big", "h")].into_iter().collect());
    let err = DeltaBuilder::default()
        .build(&current, &changes, &dest, &profile())
        .unwrap_err();

    let LxdeltaError::Bucket { source, .. } = err else {
        panic!("expected a bucket error");
    };
    assert!(matches!(
        *source,
        LxdeltaError::TruncatedMember {
            expected: 10_000,
            actual: 4096,
            ..
        }
    ));
    assert!(!dest.exists());
    assert!(!removed_manifest_path(&dest).exists());
}

#[test]
fn missing_destination_directory_is_a_bucket_error() {
    let dir = tempfile::tempdir().unwrap();
    let current = dir.path().join("current.tar.zst");
    write_archive(&current, &[TestMember::file("a", "x")]);
    let dest = dir.path().join("no-such-dir").join("delta.tar.zst");

    let changes = diff(&FingerprintTable::new(), &fingerprint_file(&current).unwrap());
    let err = DeltaBuilder::default()
        .build(&current, &changes, &dest, &profile())
        .unwrap_err();
    assert!(matches!(err, LxdeltaError::Bucket { .. }));
    assert!(err.to_string().contains("delta.tar.zst"));
}

#[test]
fn build_from_reader_streams_source() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("delta.tar.zst");
    let bytes = crate::testutil::archive_bytes(&[
        TestMember::file("a", "1"),
        TestMember::file("b", "2"),
    ]);
    let mut changes = diff(&FingerprintTable::new(), &FingerprintTable::new());
    changes.changed_or_added.insert("b".into());

    let outcome = DeltaBuilder::default()
        .build_from_reader(&bytes[..], "stream", &changes, &dest, &profile())
        .unwrap();
    assert_eq!(
        outcome,
        BuildOutcome::Built {
            members: 1,
            removed: 0
        }
    );
    assert_eq!(member_paths(&dest), vec!["b"]);
}

#[test]
fn profile_names_with_slashes_stay_local() {
    let p = profile_path(Path::new("/b/x.tar.zst"), "team/web");
    assert_eq!(p, Path::new("/b/x.tar.zst.team_web.profile"));
}
