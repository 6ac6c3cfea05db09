//! Tests for package archive discovery and extraction.

use super::*;
use crate::config::Settings;
use crate::test_utils::{ExpectedCall, StubExecutor, failure_output};
use rstest::{fixture, rstest};
use std::io::Write;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const PACKAGE: &str = "com.bilibili.AzurLane";

struct Root {
    _temp: TempDir,
    layout: Layout,
}

impl Root {
    fn package(&self, name: &str, contents: &[u8]) -> Utf8PathBuf {
        let dir = self.layout.packages_dir();
        fs::create_dir_all(&dir).expect("create packages dir");
        let path = dir.join(name);
        fs::write(&path, contents).expect("write package");
        path
    }

    fn bundled_7zz(&self) -> Utf8PathBuf {
        let path = self.layout.bundled_tool(BUNDLED_ARCHIVER);
        fs::create_dir_all(self.layout.bin_dir()).expect("create bin dir");
        fs::write(&path, b"").expect("write 7zz");
        path
    }
}

#[fixture]
fn root() -> Root {
    let temp = tempfile::tempdir().expect("temp dir");
    let path = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8 temp dir");
    let layout = Layout::new(&path, &Settings::default());
    Root {
        _temp: temp,
        layout,
    }
}

fn write_zip(path: &Utf8Path, entries: &[(&str, &[u8])]) {
    let file = fs::File::create(path).expect("create zip");
    let mut writer = zip::ZipWriter::new(file);
    for (name, payload) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start entry");
        writer.write_all(payload).expect("write entry");
    }
    writer.finish().expect("finish zip");
}

fn package() -> PackageName {
    PackageName::from(PACKAGE)
}

fn policy(skip_if_present: bool) -> PipelinePolicy {
    PipelinePolicy {
        skip_if_present,
        quick_rebuild: false,
    }
}

fn write_raw_apk(invocation: &Invocation) {
    let dir = invocation.working_dir().expect("7zz runs in the target dir");
    fs::write(dir.join(format!("{PACKAGE}.apk")), b"apk").expect("write apk");
}

#[rstest]
fn exact_prefix_match_wins(root: Root) {
    root.package("A.zip", b"");
    root.package("B.7z", b"");
    let expected = root.package("com.x.Y.zip", b"");

    let chosen = find_package_archive(&root.layout.packages_dir(), &PackageName::from("com.x.Y"))
        .expect("archive found");

    assert_eq!(chosen, expected);
}

#[rstest]
fn fallback_takes_first_sorted_candidate(root: Root) {
    root.package("notes.txt", b"");
    root.package("game.part1.rar", b"");
    root.package("b.7z", b"");
    let expected = root.package("a.zip", b"");

    let chosen = find_package_archive(&root.layout.packages_dir(), &package()).expect("found");

    assert_eq!(chosen, expected);
}

#[rstest]
fn split_volumes_are_candidates(root: Root) {
    let expected = root.package("AzurLane.part1.rar", b"");
    root.package("readme.md", b"");

    let chosen = find_package_archive(&root.layout.packages_dir(), &package()).expect("found");

    assert_eq!(chosen, expected);
}

#[rstest]
#[case::empty_dir(true)]
#[case::missing_dir(false)]
fn no_candidates_is_an_error(root: Root, #[case] create_dir: bool) {
    if create_dir {
        fs::create_dir_all(root.layout.packages_dir()).expect("create packages dir");
        root.package("readme.md", b"");
    }

    let err = find_package_archive(&root.layout.packages_dir(), &package())
        .expect_err("nothing to extract");

    assert!(matches!(err, PipelineError::NoPackageArchive { .. }));
}

#[rstest]
fn skip_reuses_existing_apk_without_invoking_tools(root: Root) {
    let target = root.layout.work_dir();
    fs::create_dir_all(&target).expect("create work dir");
    fs::write(target.join(format!("{PACKAGE}.apk")), b"apk").expect("write apk");
    let executor = StubExecutor::new(Vec::new());

    let raw = ArchiveExtractor::new(&executor, &root.layout)
        .extract(&package(), &target, policy(true))
        .expect("skip");

    assert_eq!(raw.stage, ArtifactStage::Raw);
    assert!(executor.invocations().is_empty());
}

#[rstest]
fn bundled_archiver_is_preferred(root: Root) {
    let archive = root.package("com.bilibili.AzurLane.7z", b"7z");
    let sevenz = root.bundled_7zz();
    let target = root.layout.work_dir();
    let executor = StubExecutor::new(vec![
        ExpectedCall::new(sevenz.as_str(), ["x", "-y", archive.as_str()]).with_effect(write_raw_apk),
    ]);

    let raw = ArchiveExtractor::new(&executor, &root.layout)
        .extract(&package(), &target, policy(false))
        .expect("extracted");

    assert!(raw.exists());
    executor.assert_finished();
}

#[rstest]
fn existing_apk_is_replaced_when_skip_disabled(root: Root) {
    let archive = root.package("com.bilibili.AzurLane.7z", b"7z");
    let sevenz = root.bundled_7zz();
    let target = root.layout.work_dir();
    fs::create_dir_all(&target).expect("create work dir");
    fs::write(target.join(format!("{PACKAGE}.apk")), b"old").expect("write apk");
    let executor = StubExecutor::new(vec![
        ExpectedCall::new(sevenz.as_str(), ["x", "-y", archive.as_str()]).with_effect(write_raw_apk),
    ]);

    ArchiveExtractor::new(&executor, &root.layout)
        .extract(&package(), &target, policy(false))
        .expect("extracted");

    executor.assert_finished();
    assert_eq!(fs::read(target.join(format!("{PACKAGE}.apk"))).expect("read"), b"apk");
}

#[rstest]
fn system_unzip_is_used_without_bundled_tool(root: Root) {
    let archive = root.package("com.bilibili.AzurLane.zip", b"zip");
    let target = root.layout.work_dir();
    let unzip_target = target.clone();
    let executor = StubExecutor::new(vec![
        ExpectedCall::new(SYSTEM_UNZIP, ["-o", archive.as_str(), "-d", target.as_str()])
            .with_effect(move |_| {
                fs::write(unzip_target.join(format!("{PACKAGE}.apk")), b"apk").expect("write apk");
            }),
    ]);

    let raw = ArchiveExtractor::new(&executor, &root.layout)
        .extract(&package(), &target, policy(true))
        .expect("extracted");

    assert!(raw.exists());
    executor.assert_finished();
}

#[rstest]
fn in_process_zip_is_last_resort(root: Root) {
    let archive = root.layout.packages_dir().join("com.bilibili.AzurLane.zip");
    fs::create_dir_all(root.layout.packages_dir()).expect("create packages dir");
    write_zip(
        &archive,
        &[
            ("com.bilibili.AzurLane.apk", b"apk-bytes"),
            ("obb/main.obb", b"obb"),
        ],
    );
    let target = root.layout.work_dir();
    let executor = StubExecutor::new(vec![
        ExpectedCall::new(SYSTEM_UNZIP, ["-o", archive.as_str(), "-d", target.as_str()])
            .unavailable(),
    ]);

    let raw = ArchiveExtractor::new(&executor, &root.layout)
        .extract(&package(), &target, policy(true))
        .expect("extracted");

    assert_eq!(fs::read(&raw.path).expect("read apk"), b"apk-bytes");
    assert!(target.join("obb/main.obb").exists());
    executor.assert_finished();
}

#[rstest]
#[case::bundled_archiver(true)]
#[case::system_unzip(false)]
fn failing_extractor_stops_the_chain(root: Root, #[case] bundled: bool) {
    let archive = root.package("com.bilibili.AzurLane.zip", b"corrupt");
    let target = root.layout.work_dir();
    let failing = if bundled {
        let sevenz = root.bundled_7zz();
        ExpectedCall::new(sevenz.as_str(), ["x", "-y", archive.as_str()])
    } else {
        ExpectedCall::new(SYSTEM_UNZIP, ["-o", archive.as_str(), "-d", target.as_str()])
    };
    let executor = StubExecutor::new(vec![failing.returning(failure_output("ERROR: Data Error"))]);

    let err = ArchiveExtractor::new(&executor, &root.layout)
        .extract(&package(), &target, policy(false))
        .expect_err("extractor failed");

    executor.assert_finished();
    assert_eq!(executor.invocations().len(), 1);
    assert!(matches!(err, PipelineError::ToolFailure { .. }));
    let dump = err.diagnostics().expect("tool output is echoed");
    assert!(dump.contains("ERROR: Data Error"));
    assert!(!target.join(format!("{PACKAGE}.apk")).exists());
}

#[rstest]
fn unreadable_archive_without_tools_is_reported(root: Root) {
    let archive = root.package("com.bilibili.AzurLane.zip", b"not a zip");
    let target = root.layout.work_dir();
    let executor = StubExecutor::new(vec![
        ExpectedCall::new(SYSTEM_UNZIP, ["-o", archive.as_str(), "-d", target.as_str()])
            .unavailable(),
    ]);

    let err = ArchiveExtractor::new(&executor, &root.layout)
        .extract(&package(), &target, policy(true))
        .expect_err("nothing can extract this");

    match err {
        PipelineError::ExtractionFailed { archive: failed, attempts } => {
            assert_eq!(failed, archive);
            assert_eq!(attempts.len(), 3);
            assert!(attempts[0].contains(BUNDLED_ARCHIVER));
            assert!(attempts[1].contains(SYSTEM_UNZIP));
        }
        other => panic!("unexpected error: {other}"),
    }
    executor.assert_finished();
}

#[rstest]
fn in_process_extraction_keeps_stored_mtime(root: Root) {
    fs::create_dir_all(root.layout.packages_dir()).expect("create packages dir");
    let archive = root.layout.packages_dir().join("dated.zip");
    let stamp = zip::DateTime::from_date_and_time(2021, 3, 4, 5, 6, 8).expect("valid date");
    let mut writer = zip::ZipWriter::new(fs::File::create(&archive).expect("create zip"));
    writer
        .start_file(
            "com.bilibili.AzurLane.apk",
            SimpleFileOptions::default().last_modified_time(stamp),
        )
        .expect("start entry");
    writer.write_all(b"apk").expect("write entry");
    writer.finish().expect("finish zip");
    let dest = root.layout.work_dir();
    fs::create_dir_all(&dest).expect("create dest");

    extract_zip(&archive, &dest).expect("extracted");

    let modified = fs::metadata(dest.join("com.bilibili.AzurLane.apk"))
        .and_then(|meta| meta.modified())
        .expect("mtime");
    let version = crate::version::format_timestamp(chrono::DateTime::<chrono::Utc>::from(modified));
    assert_eq!(version, "20210304050608");
}

#[rstest]
fn missing_apk_after_extraction_lists_directory(root: Root) {
    let archive = root.package("com.bilibili.AzurLane.7z", b"7z");
    let sevenz = root.bundled_7zz();
    let target = root.layout.work_dir();
    let executor = StubExecutor::new(vec![
        ExpectedCall::new(sevenz.as_str(), ["x", "-y", archive.as_str()]).with_effect(|inv| {
            let dir = inv.working_dir().expect("working dir");
            fs::write(dir.join("com.bilibili.AzurLane_v9.apk"), b"apk").expect("write apk");
        }),
    ]);

    let err = ArchiveExtractor::new(&executor, &root.layout)
        .extract(&package(), &target, policy(true))
        .expect_err("apk has the wrong name");

    match err {
        PipelineError::ArtifactNotFound { path, listing } => {
            assert!(path.ends_with("com.bilibili.AzurLane.apk"));
            assert_eq!(listing, ["com.bilibili.AzurLane_v9.apk"]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
fn zip_entries_escaping_destination_are_rejected(root: Root) {
    fs::create_dir_all(root.layout.packages_dir()).expect("create packages dir");
    let archive = root.layout.packages_dir().join("evil.zip");
    write_zip(&archive, &[("../escape.txt", b"boom")]);
    let dest = root.layout.work_dir();
    fs::create_dir_all(&dest).expect("create dest");

    let err = extract_zip(&archive, &dest).expect_err("traversal rejected");

    assert!(matches!(err, PipelineError::UnsafeArchiveEntry { entry } if entry == "../escape.txt"));
    assert!(!root.layout.root().join("escape.txt").exists());
}
