//! Sidecar archive of the built native libraries.

use crate::error::Result;
use crate::layout::walk_files;
use camino::{Utf8Path, Utf8PathBuf};
use log::{info, warn};
use std::fs;
use std::io;
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

/// File name of the library bundle in the working directory.
pub const LIBRARY_BUNDLE: &str = "perseus_libs.zip";

/// Pack every file under `libs_dir` into `out_dir/perseus_libs.zip`.
///
/// Entry names are relative to `libs_dir`, `/`-separated and sorted. Returns
/// `None` without writing anything when `libs_dir` does not exist.
///
/// # Errors
///
/// Returns an error if a library cannot be read or the bundle written.
pub fn bundle_libraries(libs_dir: &Utf8Path, out_dir: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
    info!("compressing Perseus libs into {out_dir}");
    if !libs_dir.is_dir() {
        warn!("Perseus libs dir not found: {libs_dir}, skipping compress");
        return Ok(None);
    }

    let out_path = out_dir.join(LIBRARY_BUNDLE);
    let mut writer = zip::ZipWriter::new(fs::File::create(&out_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for relative in walk_files(libs_dir)? {
        let name = relative.components().map(|c| c.as_str()).collect::<Vec<_>>().join("/");
        writer.start_file(name, options)?;
        let mut file = fs::File::open(libs_dir.join(&relative))?;
        io::copy(&mut file, &mut writer)?;
    }
    writer.finish()?;

    info!("written libs archive: {out_path}");
    Ok(Some(out_path))
}
