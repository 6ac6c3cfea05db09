//! Test support for end-to-end pipeline tests.
//!
//! [`Sandbox`] lays out a complete root directory in a temporary location and
//! builds the [`ExpectedCall`]s each stage makes, with side effects that
//! write the files the real Android tooling would produce.

use camino::{Utf8Path, Utf8PathBuf};
use perseus_repackager::apktool::JAVA;
use perseus_repackager::artifact::{PackageIdentity, PackageName};
use perseus_repackager::config::Settings;
use perseus_repackager::exec::tool_file_name;
use perseus_repackager::extract::SYSTEM_UNZIP;
use perseus_repackager::layout::Layout;
use perseus_repackager::native::{NDK_BUILD, parallel_jobs};
use perseus_repackager::patch::SYSTEM_SHELL;
use perseus_repackager::sign::{APKSIGNER, SIGNATURE_SIDECAR_SUFFIX, UNALIGNED_SUFFIX, ZIPALIGN};
use perseus_repackager::test_utils::{ExpectedCall, stdout_output};
use perseus_repackager::version::BADGING_TOOL;
use std::fs;
use std::io::{Read, Write};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const PACKAGE: &str = "com.bilibili.AzurLane";
pub const VERSION: &str = "9.1.2";

/// A root directory populated with every input the pipeline reads.
pub struct Sandbox {
    _temp: TempDir,
    pub settings: Settings,
    pub layout: Layout,
}

impl Sandbox {
    /// Create a root with the package archive, built libraries, the patch
    /// script and the signing material.
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).expect("utf8 temp dir");
        let settings = Settings::default();
        let layout = Layout::new(&root, &settings);

        fs::create_dir_all(layout.packages_dir()).expect("create packages dir");
        write_zip(
            &layout.packages_dir().join(format!("{PACKAGE}.zip")),
            &[(format!("{PACKAGE}.apk").as_str(), b"raw-apk".as_slice())],
        );

        for abi in &settings.abis {
            let dir = layout.native_libs_dir().join(abi);
            fs::create_dir_all(&dir).expect("create abi dir");
            fs::write(dir.join(&settings.library_name), format!("fresh {abi}"))
                .expect("write library");
        }

        let script = layout.patch_script();
        fs::create_dir_all(script.parent().expect("script dir")).expect("create script dir");
        fs::write(script, "#!/bin/sh\n").expect("write patch script");

        let signing = layout.signing_key();
        fs::create_dir_all(signing.parent().expect("signing dir")).expect("create signing dir");
        fs::write(layout.signing_key(), b"key").expect("write key");
        fs::write(layout.signing_cert(), b"cert").expect("write cert");

        Self {
            _temp: temp,
            settings,
            layout,
        }
    }

    pub fn identity(&self) -> PackageIdentity {
        PackageIdentity::new(PackageName::from(PACKAGE), VERSION)
    }

    pub fn work_dir(&self) -> Utf8PathBuf {
        self.layout.work_dir()
    }

    pub fn raw_apk(&self) -> Utf8PathBuf {
        self.work_dir().join(format!("{PACKAGE}.apk"))
    }

    pub fn tree_dir(&self) -> Utf8PathBuf {
        self.work_dir().join(PACKAGE)
    }

    pub fn patched_apk(&self) -> Utf8PathBuf {
        self.work_dir().join(self.identity().patched_archive())
    }

    pub fn ndk_call(&self) -> ExpectedCall {
        ExpectedCall::new(
            tool_file_name(NDK_BUILD, ".cmd"),
            [
                "NDK_PROJECT_PATH=./src".to_owned(),
                "NDK_APPLICATION_MK=./src/Application.mk".to_owned(),
                "APP_BUILD_SCRIPT=./src/Android.mk".to_owned(),
                format!("APP_PLATFORM={}", self.settings.android_platform),
                format!("-j{}", parallel_jobs()),
            ],
        )
    }

    /// `unzip` is missing, so the archive is read in-process.
    pub fn unzip_call(&self) -> ExpectedCall {
        let archive = self.layout.packages_dir().join(format!("{PACKAGE}.zip"));
        let work_dir = self.work_dir();
        ExpectedCall::new(
            SYSTEM_UNZIP,
            ["-o", archive.as_str(), "-d", work_dir.as_str()],
        )
        .unavailable()
    }

    pub fn badging_call(&self) -> ExpectedCall {
        let raw = self.raw_apk();
        ExpectedCall::new(BADGING_TOOL, ["dump", "badging", raw.as_str()]).returning(
            stdout_output(&format!(
                "package: name='{PACKAGE}' versionCode='90' versionName='{VERSION}'\n"
            )),
        )
    }

    pub fn decompile_call(&self) -> ExpectedCall {
        let jar = self.layout.apktool_jar();
        let raw = self.raw_apk();
        let tree = self.tree_dir();
        let created = tree.clone();
        ExpectedCall::new(
            JAVA,
            [
                "-jar",
                jar.as_str(),
                "-q",
                "d",
                "-f",
                raw.as_str(),
                "-o",
                tree.as_str(),
            ],
        )
        .with_effect(move |_| {
            fs::create_dir_all(created.join("lib/x86")).expect("create tree");
            fs::write(created.join("AndroidManifest.xml"), "<manifest/>").expect("write manifest");
        })
    }

    pub fn patch_call(&self) -> ExpectedCall {
        ExpectedCall::new(SYSTEM_SHELL, [self.layout.patch_script().as_str()])
    }

    /// apktool writes an archive holding stale libraries.
    pub fn rebuild_call(&self) -> ExpectedCall {
        let jar = self.layout.apktool_jar();
        let tree = self.tree_dir();
        let output = self.patched_apk();
        let written = output.clone();
        let abis = self.settings.abis.clone();
        ExpectedCall::new(
            JAVA,
            [
                "-jar",
                jar.as_str(),
                "-q",
                "b",
                "-f",
                tree.as_str(),
                "-o",
                output.as_str(),
            ],
        )
        .with_effect(move |_| {
            let mut entries = vec![
                ("AndroidManifest.xml".to_owned(), b"<manifest/>".to_vec()),
                ("classes.dex".to_owned(), b"dex\n035".to_vec()),
            ];
            for abi in &abis {
                entries.push((format!("lib/{abi}/libPerseus.so"), b"stale".to_vec()));
            }
            let borrowed: Vec<(&str, &[u8])> = entries
                .iter()
                .map(|(name, payload)| (name.as_str(), payload.as_slice()))
                .collect();
            write_zip(&written, &borrowed);
        })
    }

    /// The aligner copies its input to its output.
    pub fn align_call(&self) -> ExpectedCall {
        let archive = self.patched_apk();
        let unaligned = Utf8PathBuf::from(format!("{archive}{UNALIGNED_SUFFIX}"));
        let (from, to) = (unaligned.clone(), archive.clone());
        ExpectedCall::new(
            tool_file_name(ZIPALIGN, ".exe"),
            ["-p", "-f", "4", unaligned.as_str(), archive.as_str()],
        )
        .with_effect(move |_| {
            fs::copy(&from, &to).expect("align copies archive");
        })
    }

    /// The signer leaves an `.idsig` sidecar behind.
    pub fn sign_call(&self) -> ExpectedCall {
        let key = self.layout.signing_key();
        let cert = self.layout.signing_cert();
        let archive = self.patched_apk();
        let sidecar = Utf8PathBuf::from(format!("{archive}{SIGNATURE_SIDECAR_SUFFIX}"));
        ExpectedCall::new(
            tool_file_name(APKSIGNER, ".bat"),
            [
                "sign",
                "--key",
                key.as_str(),
                "--cert",
                cert.as_str(),
                archive.as_str(),
            ],
        )
        .with_effect(move |_| {
            fs::write(&sidecar, b"idsig").expect("write sidecar");
        })
    }
}

/// Write a zip with deflated entries.
pub fn write_zip(path: &Utf8Path, entries: &[(&str, &[u8])]) {
    let mut writer = zip::ZipWriter::new(fs::File::create(path).expect("create zip"));
    for (name, payload) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start entry");
        writer.write_all(payload).expect("write entry");
    }
    writer.finish().expect("finish zip");
}

/// Read one entry of a zip as text.
pub fn read_entry(path: &Utf8Path, name: &str) -> String {
    let mut archive =
        zip::ZipArchive::new(fs::File::open(path).expect("open zip")).expect("read zip");
    let mut entry = archive.by_name(name).expect("entry present");
    let mut contents = String::new();
    entry.read_to_string(&mut contents).expect("read entry");
    contents
}
