// spider_chrome re-exports chromiumoxide API
use crate::error::{RecorderError, Result};
use crate::screenshot::{LoadStatus, ScreenshotCapturer, TabStatus, TargetHandle};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::ResetPageScaleFactorParams;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::Page;
use chromiumoxide_fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for one screenshot call; a hidden or crashed tab never answers
const SCREENSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound for the two-frame flush before a normalized capture
const FRAME_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

const FLUSH_FRAMES_SCRIPT: &str = r#"new Promise(resolve => {
    requestAnimationFrame(() => requestAnimationFrame(() => resolve(true)));
})"#;

pub struct ChromeDriver {
    browser: Browser,
    temp_dir: Option<PathBuf>,
}

/// Connection mode for Chrome browser
pub enum ConnectionMode {
    /// Sandboxed mode - launches Chrome using system installation
    Sandboxed {
        chrome_path: Option<String>,
        no_sandbox: bool,
        headless: bool,
    },
    /// Advanced mode - connects to existing Chrome on debug port
    DebugPort(u16),
}

impl ChromeDriver {
    /// Helper method to get the current active page, excluding Chrome's new-tab-page
    async fn get_active_page(&self) -> Result<Page> {
        let pages = self.browser.pages().await?;

        // Filter out chrome://new-tab-page/ and return the first real page
        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if !url.starts_with("chrome://") {
                    return Ok(page.clone());
                }
            }
        }

        if let Some(page) = pages.last() {
            return Ok(page.clone());
        }

        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| RecorderError::Other(format!("Failed to create page: {}", e)))
    }

    /// Create new ChromeDriver with specified connection mode
    pub async fn new(mode: ConnectionMode) -> Result<Self> {
        let (browser, temp_dir) = match mode {
            ConnectionMode::Sandboxed {
                chrome_path,
                no_sandbox,
                headless,
            } => {
                // Unique profile directory so parallel recorders don't share state
                let unique_id = uuid::Uuid::new_v4();
                let temp_dir = std::env::temp_dir().join(format!("robert-recorder-{}", unique_id));
                std::fs::create_dir_all(&temp_dir).map_err(|e| {
                    RecorderError::LaunchFailed(format!("Failed to create temp directory: {}", e))
                })?;

                let mut config = if headless {
                    BrowserConfig::builder()
                } else {
                    BrowserConfig::builder().with_head()
                };
                config = config.user_data_dir(&temp_dir);

                // Linux AppArmor workaround
                if no_sandbox {
                    config = config.arg("--no-sandbox");
                }

                if let Some(path) = chrome_path {
                    config = config.chrome_executable(path);
                } else {
                    match Self::ensure_chrome_installed().await {
                        Ok(path) => {
                            config = config.chrome_executable(path);
                        }
                        Err(e) => {
                            log::warn!("Auto-download failed ({}), trying system Chrome", e);
                        }
                    }
                }

                let config = config.build().map_err(|e| launch_error(&e))?;
                let (browser, mut handler) =
                    Browser::launch(config).await.map_err(|e| launch_error(&e))?;

                tokio::spawn(async move {
                    while (handler.next().await).is_some() {
                        // Handle browser events
                    }
                });

                (browser, Some(temp_dir))
            }
            ConnectionMode::DebugPort(port) => {
                let url = format!("http://localhost:{}", port);
                let (browser, mut handler) = Browser::connect(&url).await.map_err(|e| {
                    RecorderError::ConnectionFailed(format!(
                        "Failed to connect to Chrome on port {}. \
                             Make sure Chrome is running with --remote-debugging-port={}: {}",
                        port, port, e
                    ))
                })?;

                tokio::spawn(async move {
                    while (handler.next().await).is_some() {
                        // Handle browser events
                    }
                });

                (browser, None)
            }
        };

        Ok(Self { browser, temp_dir })
    }

    /// Navigate the active page to a URL and wait for its load event
    pub async fn navigate(&self, url: &str) -> Result<()> {
        use chromiumoxide::cdp::browser_protocol::page::{EventLoadEventFired, NavigateParams};

        // Normalize URL - add https:// if no protocol specified
        let normalized_url = if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
            && !url.starts_with("about:")
            && !url.starts_with("data:")
        {
            log::debug!("Normalizing URL: {} -> https://{}", url, url);
            format!("https://{}", url)
        } else {
            url.to_string()
        };

        log::info!("Navigating to {}", normalized_url);
        let page = self.get_active_page().await?;

        // Subscribe before navigating so the load event can't be missed
        let mut loads = page.event_listener::<EventLoadEventFired>().await?;

        let params = NavigateParams::builder()
            .url(&normalized_url)
            .build()
            .map_err(|e| {
                RecorderError::NavigationFailed(format!("Invalid URL {}: {}", normalized_url, e))
            })?;

        let response = page.execute(params).await.map_err(|e| {
            if e.to_string().contains("oneshot canceled") {
                RecorderError::NavigationFailed(
                    "Browser connection lost. The browser may have been closed or crashed."
                        .to_string(),
                )
            } else {
                RecorderError::NavigationFailed(format!(
                    "Failed to navigate to {}: {}",
                    normalized_url, e
                ))
            }
        })?;

        if let Some(error_text) = response.result.error_text {
            log::error!("Navigation error from browser: {}", error_text);
            return Err(RecorderError::NavigationFailed(format!(
                "Navigation error: {}",
                error_text
            )));
        }

        match tokio::time::timeout(Duration::from_secs(30), loads.next()).await {
            Ok(Some(_)) => log::debug!("Page load event fired for {}", normalized_url),
            Ok(None) => log::warn!("Load event stream ended before {} loaded", normalized_url),
            Err(_) => {
                return Err(RecorderError::NavigationFailed(format!(
                    "Timed out waiting for {} to load",
                    normalized_url
                )));
            }
        }

        Ok(())
    }

    /// Execute arbitrary JavaScript in the page context
    pub async fn execute_script(&self, script: &str) -> Result<serde_json::Value> {
        let page = self.get_active_page().await?;
        evaluate_value(&page, script).await
    }

    /// Expose `window.<name>(payload)` to page scripts and stream its calls
    pub async fn add_binding(&self, name: &str) -> Result<EventStream<EventBindingCalled>> {
        let page = self.get_active_page().await?;
        page.execute(AddBindingParams::new(name))
            .await
            .map_err(|e| RecorderError::Other(format!("Failed to add binding '{}': {}", name, e)))?;
        let events = page.event_listener::<EventBindingCalled>().await?;
        log::debug!("Added binding {}", name);
        Ok(events)
    }

    /// Run `script` on every new document of the active page (survives navigations)
    pub async fn add_script_on_new_document(&self, script: &str) -> Result<()> {
        let page = self.get_active_page().await?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script))
            .await
            .map_err(|e| {
                RecorderError::Other(format!("Failed to add script on new document: {}", e))
            })?;
        Ok(())
    }

    /// Handle for the active page
    pub async fn target_handle(&self) -> Result<TargetHandle> {
        let page = self.get_active_page().await?;
        Ok(handle_of(&page))
    }

    /// Get access to the current page for advanced operations
    pub async fn current_page(&self) -> Result<Page> {
        self.get_active_page().await
    }

    /// The page behind a target handle
    pub async fn page_for(&self, target: &TargetHandle) -> Result<Page> {
        let pages = self.browser.pages().await?;
        pages
            .into_iter()
            .find(|page| handle_of(page) == *target)
            .ok_or(RecorderError::NoPage)
    }

    /// Close the browser connection
    pub async fn close(self) -> Result<()> {
        self.browser.close().await?;
        Ok(())
    }

    /// Ensure Chrome is installed, downloading if necessary
    async fn ensure_chrome_installed() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| RecorderError::Other("Cannot determine cache directory".to_string()))?
            .join("robert")
            .join("chrome");

        tokio::fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| RecorderError::Other(format!("Failed to create cache dir: {}", e)))?;

        let revision_info_path = cache_dir.join(".downloaded");
        if revision_info_path.exists() {
            if let Some(executable) = Self::find_chrome_in_cache(&cache_dir).await {
                return Ok(executable);
            }
        }

        log::info!("Downloading Chrome for Testing (first time only, ~150MB)...");
        let fetcher = BrowserFetcher::new(
            BrowserFetcherOptions::builder()
                .with_path(&cache_dir)
                .build()
                .map_err(|e| RecorderError::Other(format!("Fetcher config failed: {}", e)))?,
        );

        let info = fetcher
            .fetch()
            .await
            .map_err(|e| RecorderError::Other(format!("Chrome download failed: {}", e)))?;

        tokio::fs::write(&revision_info_path, "downloaded")
            .await
            .map_err(|e| RecorderError::Other(format!("Failed to write marker: {}", e)))?;

        log::info!("Chrome downloaded to {}", info.executable_path.display());
        Ok(info.executable_path)
    }

    /// Find Chrome executable in cache directory
    async fn find_chrome_in_cache(cache_dir: &Path) -> Option<PathBuf> {
        [
            cache_dir.join("chrome"),
            cache_dir.join("chrome.exe"),
            cache_dir.join("Google Chrome.app/Contents/MacOS/Google Chrome"),
            cache_dir.join("chrome-linux/chrome"),
            cache_dir.join("chrome-mac/Chromium.app/Contents/MacOS/Chromium"),
            cache_dir.join("chrome-win/chrome.exe"),
        ]
        .into_iter()
        .find(|path| path.exists())
    }

    async fn capture_view(&self, target: &TargetHandle, immediate: bool) -> Result<String> {
        let page = self.page_for(target).await?;
        if !immediate {
            normalize_view(&page).await;
        }
        let png = tokio::time::timeout(SCREENSHOT_TIMEOUT, capture_png(&page))
            .await
            .map_err(|_| {
                RecorderError::Other(format!(
                    "Screenshot timed out after {}s",
                    SCREENSHOT_TIMEOUT.as_secs()
                ))
            })??;
        Ok(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(png)
        ))
    }
}

#[async_trait]
impl ScreenshotCapturer for ChromeDriver {
    async fn capture_current_view(&self, target: &TargetHandle, immediate: bool) -> Option<String> {
        match self.capture_view(target, immediate).await {
            Ok(image) => Some(image),
            Err(e) => {
                log::warn!("Screenshot of {} failed: {}", target, e);
                None
            }
        }
    }
}

#[async_trait]
impl TabStatus for ChromeDriver {
    async fn load_status(&self, target: &TargetHandle) -> Result<LoadStatus> {
        let page = self.page_for(target).await?;
        let state: String = evaluate_typed(&page, "document.readyState").await?;
        Ok(if state == "complete" {
            LoadStatus::Complete
        } else {
            LoadStatus::Loading
        })
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        if let Some(temp_dir) = &self.temp_dir {
            if temp_dir.exists() {
                let _ = std::fs::remove_dir_all(temp_dir);
            }
        }
    }
}

fn launch_error(e: &dyn std::fmt::Display) -> RecorderError {
    RecorderError::LaunchFailed(format!(
        "{}. \n\n\
         Chrome not found. You can:\n\
         - Install Chrome: https://www.google.com/chrome/\n\
         - Ubuntu/Debian: sudo apt install chromium-browser\n\
         - macOS: brew install --cask google-chrome\n\
         - Or specify path: --chrome-path /path/to/chrome\n\
         - Linux sandbox issue? Try: --no-sandbox",
        e
    ))
}

pub(crate) fn handle_of(page: &Page) -> TargetHandle {
    let id: &str = page.target_id().as_ref();
    TargetHandle::new(id)
}

pub(crate) async fn evaluate_value(page: &Page, script: &str) -> Result<serde_json::Value> {
    let result = page
        .evaluate(script)
        .await
        .map_err(|e| RecorderError::Probe(format!("Script execution failed: {}", e)))?;
    Ok(result.into_value().unwrap_or(serde_json::Value::Null))
}

pub(crate) async fn evaluate_typed<T: serde::de::DeserializeOwned>(
    page: &Page,
    script: &str,
) -> Result<T> {
    let result = page
        .evaluate(script)
        .await
        .map_err(|e| RecorderError::Probe(format!("Script execution failed: {}", e)))?;
    result
        .into_value()
        .map_err(|e| RecorderError::Probe(format!("Failed to deserialize result: {}", e)))
}

async fn capture_png(page: &Page) -> Result<Vec<u8>> {
    page.screenshot(chromiumoxide::page::ScreenshotParams::default())
        .await
        .map_err(|e| RecorderError::Other(format!("Failed to take screenshot: {}", e)))
}

/// Let pending paints land and undo pinch zoom before a non-urgent capture
async fn normalize_view(page: &Page) {
    if tokio::time::timeout(FRAME_FLUSH_TIMEOUT, page.evaluate(FLUSH_FRAMES_SCRIPT))
        .await
        .is_err()
    {
        // Background tabs don't run animation frames
        log::debug!("Frame flush timed out, capturing anyway");
    }
    if let Err(e) = page.execute(ResetPageScaleFactorParams::default()).await {
        log::debug!("Could not reset page scale: {}", e);
    }
}
