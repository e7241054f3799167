//! One-time model weight download.
//!
//! Runs on the detector engine thread, so it uses the blocking reqwest client.

use crate::detector::DetectorError;
use std::path::Path;

/// ONNX weights smaller than this are an error page, not a model.
const MIN_MODEL_BYTES: usize = 1024;

/// Download `url` into `dest`, writing through a temporary file so a partial
/// download never looks like a model.
pub fn fetch_model(url: &str, dest: &Path) -> Result<(), DetectorError> {
    tracing::info!(url, dest = %dest.display(), "downloading face detection model");

    let response = reqwest::blocking::get(url)
        .map_err(|e| DetectorError::ModelFetch(format!("{url}: {e}")))?;
    if !response.status().is_success() {
        return Err(DetectorError::ModelFetch(format!(
            "{url}: HTTP {}",
            response.status()
        )));
    }
    let bytes = response
        .bytes()
        .map_err(|e| DetectorError::ModelFetch(format!("{url}: {e}")))?;

    write_model(&bytes, dest)?;
    tracing::info!(dest = %dest.display(), bytes = bytes.len(), "model downloaded");
    Ok(())
}

fn write_model(bytes: &[u8], dest: &Path) -> Result<(), DetectorError> {
    if bytes.len() < MIN_MODEL_BYTES {
        return Err(DetectorError::ModelFetch(format!(
            "downloaded file is suspiciously small ({} bytes)",
            bytes.len()
        )));
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = dest.with_extension("onnx.part");
    std::fs::write(&partial, bytes)?;

    let written = std::fs::metadata(&partial)?.len();
    if written != bytes.len() as u64 {
        let _ = std::fs::remove_file(&partial);
        return Err(DetectorError::ModelFetch(format!(
            "integrity check failed: expected {} bytes, wrote {written}",
            bytes.len()
        )));
    }

    std::fs::rename(&partial, dest)?;
    Ok(())
}
