//! Run configuration for the repackaging pipeline.
//!
//! Two values are assembled once at start-up into a [`PipelineConfig`] that
//! is passed by reference into every stage:
//!
//! - [`PipelinePolicy`] holds the reuse policy chosen on the command line.
//! - [`Settings`] holds project facts read from an optional
//!   `repackager.toml` in the root directory. Every field has a default, so
//!   the file may be absent or list only the values that differ.

use crate::error::{PipelineError, Result};
use camino::Utf8Path;
use serde::Deserialize;

/// Name of the optional settings file in the root directory.
pub const SETTINGS_FILE: &str = "repackager.toml";

/// Reuse policy consulted by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelinePolicy {
    /// Reuse the extracted archive and decompiled tree when present.
    pub skip_if_present: bool,
    /// Swap native libraries into the previous signed archive when one exists.
    pub quick_rebuild: bool,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            skip_if_present: true,
            quick_rebuild: true,
        }
    }
}

/// Project settings loaded from `repackager.toml`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Android package name of the application being patched.
    pub package_name: String,
    /// File name of the injected native library.
    pub library_name: String,
    /// ABIs the native library is built for, in archive order.
    pub abis: Vec<String>,
    /// Directory of the NDK project, relative to the root.
    pub native_project: String,
    /// Patch script run against the decompiled tree, relative to the root.
    pub patch_script: String,
    /// Value passed as `APP_PLATFORM` to the NDK build.
    pub android_platform: String,
    /// Treat a failed entry edit during a quick rebuild as fatal.
    pub strict_archive_edits: bool,
    /// Run `apksigner verify` after signing.
    pub verify_signature: bool,
    /// Write the native libraries into `perseus_libs.zip` after signing.
    pub bundle_libraries: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            package_name: "com.bilibili.AzurLane".to_owned(),
            library_name: "libPerseus.so".to_owned(),
            abis: vec![
                "arm64-v8a".to_owned(),
                "x86_64".to_owned(),
                "x86".to_owned(),
            ],
            native_project: "PerseusLib".to_owned(),
            patch_script: "scripts/patch.sh".to_owned(),
            android_platform: "android-21".to_owned(),
            strict_archive_edits: false,
            verify_signature: false,
            bundle_libraries: true,
        }
    }
}

impl Settings {
    /// Load `repackager.toml` from `root`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the file exists but cannot
    /// be read or parsed.
    pub fn load(root: &Utf8Path) -> Result<Self> {
        let path = root.join(SETTINGS_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&path).map_err(|err| PipelineError::InvalidConfig {
                path: path.clone(),
                reason: err.to_string(),
            })?;
        Self::parse(&contents).map_err(|reason| PipelineError::InvalidConfig { path, reason })
    }

    /// Parse settings from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the parser's message if the text is not valid settings TOML.
    pub fn parse(contents: &str) -> std::result::Result<Self, String> {
        let settings: Self = toml::from_str(contents).map_err(|err| err.to_string())?;
        if settings.package_name.trim().is_empty() {
            return Err("package_name must not be empty".to_owned());
        }
        if settings.abis.is_empty() {
            return Err("abis must list at least one ABI".to_owned());
        }
        Ok(settings)
    }
}

/// Everything a run needs to know, fixed before the first stage starts.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PipelineConfig {
    /// Reuse policy from the command line.
    pub policy: PipelinePolicy,
    /// Project settings from `repackager.toml`.
    pub settings: Settings,
}

impl PipelineConfig {
    /// Combine the command-line policy with loaded settings.
    #[must_use]
    pub fn new(policy: PipelinePolicy, settings: Settings) -> Self {
        Self { policy, settings }
    }
}
