//! Fixed filesystem layout of a repackaging root.
//!
//! ```text
//! <root>/
//!   packages/          input archives
//!   apk_build/         working directory for every stage
//!   bin/               bundled tools (7zz, apktool.jar, busybox)
//!   signing/           test key and certificate
//!   PerseusLib/        NDK project, libraries land in src/libs/<abi>/
//!   scripts/patch.sh   patch script
//! ```

use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::exec::tool_file_name;
use camino::{Utf8Path, Utf8PathBuf};

/// Resolved paths for one root directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: Utf8PathBuf,
    native_project: Utf8PathBuf,
    patch_script: Utf8PathBuf,
}

impl Layout {
    /// Create a layout rooted at `root`.
    #[must_use]
    pub fn new(root: &Utf8Path, settings: &Settings) -> Self {
        Self {
            root: root.to_owned(),
            native_project: root.join(&settings.native_project),
            patch_script: root.join(&settings.patch_script),
        }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory holding the distributed package archives.
    #[must_use]
    pub fn packages_dir(&self) -> Utf8PathBuf {
        self.root.join("packages")
    }

    /// Working directory shared by every stage.
    #[must_use]
    pub fn work_dir(&self) -> Utf8PathBuf {
        self.root.join("apk_build")
    }

    /// Directory of bundled tool binaries.
    #[must_use]
    pub fn bin_dir(&self) -> Utf8PathBuf {
        self.root.join("bin")
    }

    /// Path of a bundled native executable, with the platform suffix.
    #[must_use]
    pub fn bundled_tool(&self, name: &str) -> Utf8PathBuf {
        self.bin_dir().join(tool_file_name(name, ".exe"))
    }

    /// The bundled apktool jar.
    #[must_use]
    pub fn apktool_jar(&self) -> Utf8PathBuf {
        self.bin_dir().join("apktool.jar")
    }

    /// The test signing key.
    #[must_use]
    pub fn signing_key(&self) -> Utf8PathBuf {
        self.root.join("signing").join("testkey.pk8")
    }

    /// The test signing certificate.
    #[must_use]
    pub fn signing_cert(&self) -> Utf8PathBuf {
        self.root.join("signing").join("testkey.x509.pem")
    }

    /// The NDK project directory.
    #[must_use]
    pub fn native_project(&self) -> &Utf8Path {
        &self.native_project
    }

    /// Directory the NDK build writes per-ABI libraries into.
    #[must_use]
    pub fn native_libs_dir(&self) -> Utf8PathBuf {
        self.native_project.join("src").join("libs")
    }

    /// The patch script.
    #[must_use]
    pub fn patch_script(&self) -> &Utf8Path {
        &self.patch_script
    }
}

/// Return the process working directory as a UTF-8 path.
///
/// # Errors
///
/// Returns an error if the directory cannot be read or is not valid UTF-8.
pub fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir()?;
    Utf8PathBuf::try_from(cwd).map_err(|err| PipelineError::NonUtf8Path(err.to_string()))
}

/// List the entry names of `dir`, sorted, for diagnostics.
///
/// Unreadable directories and non-UTF-8 names are reported as empty rather
/// than failing, since the listing only decorates another error.
#[must_use]
pub fn list_dir(dir: &Utf8Path) -> Vec<String> {
    let Ok(entries) = dir.read_dir_utf8() else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.file_name().to_owned())
        .collect();
    names.sort();
    names
}

/// Every regular file below `dir`, relative to it, in sorted order.
///
/// # Errors
///
/// Returns an error if a directory cannot be read or holds a non-UTF-8 name.
pub fn walk_files(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_owned()];

    while let Some(current) = pending.pop() {
        for entry in current.read_dir_utf8()? {
            let entry = entry?;
            let path = entry.path();
            if entry.file_type()?.is_dir() {
                pending.push(path.to_owned());
            } else if let Ok(relative) = path.strip_prefix(dir) {
                files.push(relative.to_owned());
            }
        }
    }

    files.sort();
    Ok(files)
}
