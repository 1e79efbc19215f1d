//! Screenshot persistence

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::info;

use super::ScreenshotData;
use crate::error::{CollaboratorError, Result};

/// File name used for a screenshot taken at `shot.timestamp`
pub fn screenshot_file_name(shot: &ScreenshotData) -> String {
    format!("screenshot_{}.png", shot.timestamp.format("%Y%m%d_%H%M%S_%3f"))
}

/// Decode the payload and write it under `dir`, recording the path on `shot`
pub async fn save_screenshot(shot: &mut ScreenshotData, dir: &Path) -> Result<PathBuf> {
    let bytes = STANDARD
        .decode(shot.image_base64.as_bytes())
        .map_err(|e| CollaboratorError::Capture(format!("undecodable screenshot payload: {}", e)))?;

    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(screenshot_file_name(shot));
    tokio::fs::write(&path, &bytes).await?;

    info!("Screenshot saved to: {}", path.display());
    shot.file_path = Some(path.clone());
    Ok(path)
}
