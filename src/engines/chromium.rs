use super::pandoc::decode_markup;
use super::{ConvertEngine, EngineType, Job};
use crate::error::{EngineError, Result};
use crate::format::Format;
use crate::locator::{Tool, ToolLocator};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use chromiumoxide::Page;
use futures::StreamExt;
use pulldown_cmark::{html, Options, Parser};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

const PAGE_STYLE: &str = "body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 40px; line-height: 1.6; }
pre { background: #f4f4f4; padding: 16px; overflow-x: auto; }
code { background: #f4f4f4; padding: 2px 6px; }
table { border-collapse: collapse; }
th, td { border: 1px solid #ccc; padding: 4px 8px; }";

/// Render Markdown into a standalone, styled HTML page.
pub fn render_markdown(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES;
    let mut body = String::with_capacity(markdown.len() * 2);
    html::push_html(&mut body, Parser::new_ext(markdown, options));

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<style>\n{}\n</style>\n</head>\n<body>\n{}</body>\n</html>\n",
        PAGE_STYLE, body
    )
}

/// Native Markdown/HTML to PDF renderer driving headless Chromium over CDP.
pub struct ChromiumEngine {
    locator: Arc<ToolLocator>,
    timeout: Duration,
    /// Launched on first use and kept for the life of the engine
    browser: OnceCell<Browser>,
}

impl ChromiumEngine {
    pub fn new(locator: Arc<ToolLocator>, timeout: Duration) -> Self {
        Self {
            locator,
            timeout,
            browser: OnceCell::new(),
        }
    }

    async fn launch(chrome: PathBuf) -> Result<Browser> {
        let config = BrowserConfig::builder()
            .chrome_executable(chrome)
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg("--disable-sync")
            .arg("--disable-default-apps")
            .arg("--headless")
            .build()
            .map_err(|e| EngineError::backend("Chromium", format!("bad browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| EngineError::backend("Chromium", format!("launch failed: {}", e)))?;

        tokio::spawn(async move { while let Some(_event) = handler.next().await {} });

        info!("Persistent Chromium browser launched via CDP");
        Ok(browser)
    }

    async fn browser(&self) -> Result<&Browser> {
        let chrome = self.locator.locate(Tool::Chrome)?;
        self.browser.get_or_try_init(|| Self::launch(chrome)).await
    }

    async fn print(&self, html_path: &Path, print_background: bool) -> Result<Vec<u8>> {
        let browser = self.browser().await?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EngineError::backend("Chromium", format!("could not open a tab: {}", e)))?;

        let printed = Self::print_page(&page, html_path, print_background).await;
        // The browser outlives this call; its tabs must not.
        if let Err(e) = page.close().await {
            warn!("Could not close Chromium tab: {}", e);
        }
        printed
    }

    async fn print_page(page: &Page, html_path: &Path, print_background: bool) -> Result<Vec<u8>> {
        let url = format!("file://{}", html_path.canonicalize()?.display());
        page.goto(&url)
            .await
            .map_err(|e| EngineError::backend("Chromium", format!("navigation failed: {}", e)))?;

        let params = PrintToPdfParams {
            print_background: Some(print_background),
            prefer_css_page_size: Some(true),
            ..PrintToPdfParams::default()
        };
        page.pdf(params)
            .await
            .map_err(|e| EngineError::backend("Chromium", format!("PDF generation failed: {}", e)))
    }
}

#[async_trait]
impl ConvertEngine for ChromiumEngine {
    fn engine_type(&self) -> EngineType {
        EngineType::PageRenderer
    }

    async fn is_available(&self) -> bool {
        self.locator.is_available(Tool::Chrome)
    }

    async fn convert(&self, job: &Job<'_>) -> Result<PathBuf> {
        let source = Format::from_path(job.input)?;
        if job.target != Format::Pdf || !matches!(source, Format::Markdown | Format::Html) {
            return Err(EngineError::unsupported(job.input.display(), job.target));
        }
        // Fail fast before reading anything when no browser is installed.
        self.locator.locate(Tool::Chrome)?;

        let raw = tokio::fs::read(job.input).await?;
        let text = decode_markup(&raw)?;
        let page = match source {
            Format::Markdown => render_markdown(&text),
            _ => text,
        };

        let scratch = tempfile::Builder::new().prefix("docmill-page").tempdir()?;
        let html_path = scratch.path().join(format!("{}.html", job.input_stem()));
        tokio::fs::write(&html_path, page).await?;
        debug!("Staged page markup at {}", html_path.display());

        info!("Converting {} to PDF using Chromium (CDP)", job.input.display());
        let pdf = tokio::time::timeout(self.timeout, self.print(&html_path, job.options.preserve_layout))
            .await
            .map_err(|_| EngineError::Timeout {
                tool: "Chromium".to_string(),
                secs: self.timeout.as_secs(),
            })??;

        let output_path = job.output_path();
        tokio::fs::write(&output_path, pdf).await?;
        Ok(output_path)
    }
}
