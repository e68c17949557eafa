//! Headless Chrome/Chromium engine over CDP (chromiumoxide).

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::{Headers, SetExtraHttpHeadersParams};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use glasswire_core::config::SurfaceConfig;

use crate::engine::{HARDENED_ARGS, ImageFormat, LaunchOptions, Surface, SurfaceEngine};

/// Launches one headless browser per surface.
pub struct ChromiumEngine {
    chrome_path: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl ChromiumEngine {
    pub fn new(config: &SurfaceConfig) -> Self {
        Self {
            chrome_path: config.chrome_path.as_ref().map(PathBuf::from),
            extra_args: config.extra_args.clone(),
        }
    }
}

#[async_trait]
impl SurfaceEngine for ChromiumEngine {
    fn name(&self) -> &str {
        "chromium"
    }

    async fn launch(&self, options: &LaunchOptions) -> anyhow::Result<Box<dyn Surface>> {
        let viewport = CdpViewport {
            width: options.viewport.width,
            height: options.viewport.height,
            ..CdpViewport::default()
        };

        let mut builder = BrowserConfig::builder()
            .window_size(options.viewport.width, options.viewport.height)
            .viewport(viewport)
            .request_timeout(options.timeout);
        for arg in HARDENED_ARGS.iter().copied().chain(self.extra_args.iter().map(String::as_str)) {
            builder = builder.arg(arg);
        }
        if let Some(path) = &self.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        // The CDP handler must be polled for the browser to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        match open_landing_page(&browser, &options.url).await {
            Ok(page) => {
                debug!(url = %options.url, "Surface page ready");
                Ok(Box::new(ChromiumSurface {
                    browser,
                    page,
                    handler,
                }))
            }
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    warn!(%close_err, "Failed to close browser after launch error");
                }
                handler.abort();
                Err(e)
            }
        }
    }
}

async fn open_landing_page(browser: &Browser, url: &str) -> anyhow::Result<Page> {
    let page = browser
        .new_page("about:blank")
        .await
        .context("Failed to open page")?;
    page.execute(SetExtraHttpHeadersParams::new(Headers::new(
        serde_json::json!({ "Cache-Control": "no-cache" }),
    )))
    .await
    .context("Failed to set request headers")?;
    page.goto(url)
        .await
        .with_context(|| format!("Navigation to {url} failed"))?;
    Ok(page)
}

struct ChromiumSurface {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

#[async_trait]
impl Surface for ChromiumSurface {
    async fn capture(&self, format: ImageFormat) -> anyhow::Result<Vec<u8>> {
        let params = match format {
            ImageFormat::Jpeg { quality } => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Jpeg)
                .quality(i64::from(quality))
                .full_page(false)
                .build(),
            ImageFormat::Png => ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .full_page(false)
                .build(),
        };
        let image = self.page.screenshot(params).await.context("Screenshot failed")?;
        Ok(image)
    }

    async fn close(self: Box<Self>) -> anyhow::Result<()> {
        let ChromiumSurface {
            mut browser,
            page,
            handler,
        } = *self;
        drop(page);
        let closed = browser.close().await;
        let _ = browser.wait().await;
        handler.abort();
        closed.context("Failed to close browser")?;
        Ok(())
    }
}
