//! Alignment and signing with the fixed test key.

use crate::artifact::{ArtifactStage, BuildArtifact};
use crate::error::{PipelineError, Result};
use crate::exec::{CommandExecutor, Invocation, run_checked, tool_file_name};
use crate::layout::{Layout, list_dir};
use log::info;
use std::fs;

/// Archive aligner from the Android build tools.
pub const ZIPALIGN: &str = "zipalign";

/// Archive signer from the Android build tools.
pub const APKSIGNER: &str = "apksigner";

/// Suffix of the archive while it waits for alignment.
pub const UNALIGNED_SUFFIX: &str = ".unsigned";

/// Suffix of the v4 signature file `apksigner` writes next to the archive.
pub const SIGNATURE_SIDECAR_SUFFIX: &str = ".idsig";

/// Aligns and signs the rebuilt archive in place.
pub struct Signer<'a> {
    executor: &'a dyn CommandExecutor,
    layout: &'a Layout,
    verify: bool,
}

impl<'a> Signer<'a> {
    /// Create a signer using the key material in `layout`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, layout: &'a Layout) -> Self {
        Self {
            executor,
            layout,
            verify: false,
        }
    }

    /// Run `apksigner verify` after signing.
    #[must_use]
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Align and sign the `rebuilt` archive.
    ///
    /// The archive is moved aside, aligned back to its own name, then signed
    /// in place. The `.idsig` sidecar the signer leaves behind is removed.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ArtifactNotFound`] when there is no archive
    /// to sign and [`PipelineError::ToolFailure`] when alignment, signing or
    /// verification exits non-zero.
    pub fn sign(&self, rebuilt: &BuildArtifact) -> Result<BuildArtifact> {
        let archive = &rebuilt.path;
        if !archive.is_file() {
            return Err(PipelineError::ArtifactNotFound {
                path: archive.clone(),
                listing: archive.parent().map(list_dir).unwrap_or_default(),
            });
        }

        let unaligned = rebuilt.sibling(UNALIGNED_SUFFIX);
        fs::rename(archive, &unaligned)?;

        info!("zipaligning apk");
        let align = Invocation::new(tool_file_name(ZIPALIGN, ".exe")).args([
            "-p",
            "-f",
            "4",
            unaligned.as_str(),
            archive.as_str(),
        ]);
        run_checked(self.executor, &align)?;
        fs::remove_file(&unaligned)?;

        info!("signing apk");
        let key = self.layout.signing_key();
        let cert = self.layout.signing_cert();
        let sign = self.apksigner().args([
            "sign",
            "--key",
            key.as_str(),
            "--cert",
            cert.as_str(),
            archive.as_str(),
        ]);
        run_checked(self.executor, &sign)?;

        let sidecar = rebuilt.sibling(SIGNATURE_SIDECAR_SUFFIX);
        if sidecar.exists() {
            fs::remove_file(&sidecar)?;
        }

        if self.verify {
            info!("verifying apk signature");
            let verify = self.apksigner().args(["verify", archive.as_str()]);
            run_checked(self.executor, &verify)?;
        }

        Ok(BuildArtifact::new(ArtifactStage::Signed, archive.clone()))
    }

    fn apksigner(&self) -> Invocation {
        Invocation::new(tool_file_name(APKSIGNER, ".bat"))
    }
}
