//! Headless Chromium screenshots via chromiumoxide.

use super::{ScreenshotCapture, Viewport};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::page::ScreenshotParams;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Find the Chromium binary path.
pub fn find_chromium(configured: Option<&Path>) -> Option<PathBuf> {
    // 1. explicit path from config or FUNNELSCOPE_CHROMIUM_PATH
    if let Some(path) = configured {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    // 2. ~/.funnelscope/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".funnelscope/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".funnelscope/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
            ]
        } else {
            vec![
                home.join(".funnelscope/chromium/chrome-linux64/chrome"),
                home.join(".funnelscope/chromium/chrome"),
            ]
        };
        if let Some(found) = candidates.into_iter().find(|c| c.exists()) {
            return Some(found);
        }
    }

    // 3. system PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// One headless browser shared by every capture; each capture opens its own tab.
pub struct ChromiumCapture {
    browser: Browser,
    output_dir: PathBuf,
}

impl ChromiumCapture {
    /// Launch headless Chromium. Screenshots are written under `output_dir`.
    pub async fn launch(chromium_path: Option<&Path>, output_dir: PathBuf) -> Result<Self> {
        let chrome_path = find_chromium(chromium_path)
            .context("Chromium not found. Set FUNNELSCOPE_CHROMIUM_PATH or install Chrome.")?;
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("cannot create {}", output_dir.display()))?;

        let config = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--hide-scrollbars")
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            output_dir,
        })
    }

    fn file_for(&self, viewport: &Viewport) -> PathBuf {
        self.output_dir
            .join(format!("{}-{}.png", uuid::Uuid::new_v4(), viewport.device))
    }
}

#[async_trait]
impl ScreenshotCapture for ChromiumCapture {
    async fn capture(&self, url: &str, viewport: &Viewport) -> Result<PathBuf> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        let result = async {
            page.execute(SetDeviceMetricsOverrideParams::new(
                viewport.width as i64,
                viewport.height as i64,
                1.0,
                viewport.mobile,
            ))
            .await
            .context("failed to set viewport")?;

            page.goto(url).await.context("navigation failed")?;
            let _ = page.wait_for_navigation().await;

            let path = self.file_for(viewport);
            page.save_screenshot(ScreenshotParams::builder().full_page(true).build(), &path)
                .await
                .context("screenshot failed")?;
            Ok::<_, anyhow::Error>(path)
        }
        .await;

        let _ = page.close().await;
        if let Ok(path) = &result {
            debug!(url, device = viewport.device, path = %path.display(), "screenshot saved");
        }
        result
    }

    fn name(&self) -> &str {
        "chromium"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::DESKTOP;

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("chrome");
        std::fs::write(&fake, b"").unwrap();
        assert_eq!(find_chromium(Some(&fake)), Some(fake));
    }

    #[tokio::test]
    #[ignore] // Requires Chromium to be installed
    async fn test_capture_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let capture = ChromiumCapture::launch(None, dir.path().to_path_buf())
            .await
            .expect("failed to launch");
        let path = capture
            .capture("data:text/html,<h1>Hello</h1>", &DESKTOP)
            .await
            .expect("capture failed");
        assert!(path.exists());
    }
}
