//! Screenshot capture seam.
//!
//! Capture is best effort: a failed or timed-out capture becomes a
//! placeholder [`Screenshot`] and never blocks analysis.

pub mod chromium;

use crate::model::Screenshot;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

pub use chromium::{find_chromium, ChromiumCapture};

/// A device viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub device: &'static str,
    pub width: u32,
    pub height: u32,
    pub mobile: bool,
}

pub const DESKTOP: Viewport = Viewport {
    device: "desktop",
    width: 1366,
    height: 768,
    mobile: false,
};

pub const MOBILE: Viewport = Viewport {
    device: "mobile",
    width: 390,
    height: 844,
    mobile: true,
};

/// Devices captured for every analyzed page.
pub const DEVICES: [Viewport; 2] = [DESKTOP, MOBILE];

#[async_trait]
pub trait ScreenshotCapture: Send + Sync {
    /// Capture `url` at `viewport` and return the image path.
    async fn capture(&self, url: &str, viewport: &Viewport) -> Result<PathBuf>;

    fn name(&self) -> &str;
}

/// Used when no browser is available or screenshots are turned off.
pub struct NoopCapture;

#[async_trait]
impl ScreenshotCapture for NoopCapture {
    async fn capture(&self, _url: &str, _viewport: &Viewport) -> Result<PathBuf> {
        Err(anyhow!("screenshot capture disabled"))
    }

    fn name(&self) -> &str {
        "noop"
    }
}

/// Capture every device in [`DEVICES`], one record per device.
pub async fn capture_devices(
    capture: &dyn ScreenshotCapture,
    url: &str,
    timeout: Duration,
) -> Vec<Screenshot> {
    let mut shots = Vec::with_capacity(DEVICES.len());
    for viewport in &DEVICES {
        let shot = match tokio::time::timeout(timeout, capture.capture(url, viewport)).await {
            Ok(Ok(path)) => Screenshot {
                device: viewport.device.to_string(),
                path: Some(path.display().to_string()),
                error: None,
            },
            Ok(Err(e)) => {
                warn!(url, device = viewport.device, error = %e, "screenshot failed");
                Screenshot::placeholder(viewport.device, e.to_string())
            }
            Err(_) => {
                warn!(url, device = viewport.device, "screenshot timed out");
                Screenshot::placeholder(
                    viewport.device,
                    format!("timed out after {}ms", timeout.as_millis()),
                )
            }
        };
        shots.push(shot);
    }
    shots
}
