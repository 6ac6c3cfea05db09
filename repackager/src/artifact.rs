//! Package identity and the artifacts each stage hands to the next.
//!
//! Every artifact lives on disk in the working directory; a stage only starts
//! once the previous stage's artifact exists. File names are derived from the
//! [`PackageName`] and, once resolved, the [`PackageIdentity`] version.

use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;

/// Android package name of the application being patched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the package name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the archive extracted from the distribution.
    #[must_use]
    pub fn raw_archive(&self) -> String {
        format!("{}.apk", self.0)
    }

    /// Directory name of the decompiled tree.
    #[must_use]
    pub fn tree_dir(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Package name plus the version resolved for this run.
///
/// The version is fixed at construction; artifacts derived from it keep the
/// same name for the rest of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageIdentity {
    name: PackageName,
    version: String,
}

impl PackageIdentity {
    /// Bind a resolved version to a package name.
    #[must_use]
    pub fn new(name: PackageName, version: impl Into<String>) -> Self {
        Self {
            name,
            version: version.into(),
        }
    }

    /// The package name.
    #[must_use]
    pub fn name(&self) -> &PackageName {
        &self.name
    }

    /// The resolved version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// `{package}-{version}.patched.apk`, the rebuilt and later signed archive.
    #[must_use]
    pub fn patched_archive(&self) -> String {
        format!("{}-{}.patched.apk", self.name, self.version)
    }

    /// Scratch container name used while editing entries in place.
    #[must_use]
    pub fn scratch_container(&self) -> String {
        format!("{}.zip", self.patched_archive())
    }
}

/// Production stage an artifact belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactStage {
    /// Archive extracted from the distribution.
    Raw,
    /// Tree written by the decompiler.
    DecompiledTree,
    /// Tree after library injection and patching.
    PatchedTree,
    /// Unsigned archive from a full or differential rebuild.
    Rebuilt,
    /// Aligned and signed archive.
    Signed,
}

impl fmt::Display for ArtifactStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Raw => "raw",
            Self::DecompiledTree => "decompiled-tree",
            Self::PatchedTree => "patched-tree",
            Self::Rebuilt => "rebuilt",
            Self::Signed => "signed",
        };
        f.write_str(label)
    }
}

/// A file or directory on disk tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    /// Stage that produced the artifact.
    pub stage: ArtifactStage,
    /// Location on disk.
    pub path: Utf8PathBuf,
}

impl BuildArtifact {
    /// Tag `path` with `stage`.
    #[must_use]
    pub fn new(stage: ArtifactStage, path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            stage,
            path: path.into(),
        }
    }

    /// Whether the artifact is present on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// A sibling file named after this artifact plus `suffix`.
    #[must_use]
    pub fn sibling(&self, suffix: &str) -> Utf8PathBuf {
        Utf8PathBuf::from(format!("{}{suffix}", self.path))
    }
}

/// A native library that must sit at a fixed entry inside the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    /// Normalised path inside the archive, e.g. `lib/x86/libPerseus.so`.
    pub entry_path: String,
    /// Location of the library relative to the working directory, inside the
    /// decompiled tree.
    pub tree_path: Utf8PathBuf,
}

impl LibraryEntry {
    /// Entries for `library` under each ABI, in ABI order.
    #[must_use]
    pub fn for_abis(package: &PackageName, library: &str, abis: &[String]) -> Vec<Self> {
        abis.iter()
            .map(|abi| {
                let entry_path = format!("lib/{abi}/{library}");
                let tree_path = Utf8Path::new(package.tree_dir()).join(&entry_path);
                Self {
                    entry_path,
                    tree_path,
                }
            })
            .collect()
    }

    /// The tree path as an archive entry name (always `/`-separated).
    #[must_use]
    pub fn staged_entry_path(&self) -> String {
        normalize_entry_path(self.tree_path.as_str())
    }
}

/// Normalise an archive entry path so two spellings compare equal.
///
/// Backslashes become `/` and leading `./` or `/` are stripped.
///
/// # Examples
///
/// ```
/// use perseus_repackager::artifact::normalize_entry_path;
///
/// assert_eq!(normalize_entry_path(r".\lib\x86\libPerseus.so"), "lib/x86/libPerseus.so");
/// assert_eq!(normalize_entry_path("/lib/x86/libPerseus.so"), "lib/x86/libPerseus.so");
/// ```
#[must_use]
pub fn normalize_entry_path(path: &str) -> String {
    let unified = path.replace('\\', "/");
    let mut trimmed = unified.as_str();
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    trimmed.to_owned()
}
