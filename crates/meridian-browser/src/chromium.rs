use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use meridian_core::error::AppError;
use meridian_core::traits::{BrowserAutomation, BrowserSession, ScrollPosition, ScrollTo};

/// Launch options for the shared Chromium process.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    /// Explicit binary; otherwise `CHROME_BIN` and well-known paths are tried.
    pub chrome_bin: Option<PathBuf>,
    pub navigation_timeout: Duration,
    /// Upper bound of a single DevTools command.
    pub request_timeout: Duration,
    pub window_size: (u32, u32),
    pub user_agent: Option<String>,
    pub language: String,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_bin: None,
            navigation_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            window_size: (1920, 1080),
            user_agent: None,
            language: "en-US".to_string(),
        }
    }
}

impl BrowserSettings {
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_chrome_bin(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_bin = Some(path.into());
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// One Chromium process shared by every session; each session is its own tab.
#[derive(Clone)]
pub struct ChromiumBrowser {
    browser: Arc<Browser>,
    settings: Arc<BrowserSettings>,
}

impl ChromiumBrowser {
    pub async fn launch(settings: BrowserSettings) -> Result<Self, AppError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .disable_default_args()
            .request_timeout(settings.request_timeout)
            .window_size(settings.window_size.0, settings.window_size.1);

        // Snap-packaged Chromium exposes a wrapper that rejects standard
        // Chrome CLI flags, so prefer a real binary when one can be found.
        if let Some(bin) = settings.chrome_bin.clone().or_else(find_chrome_binary) {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }

        if settings.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        if let Some(user_agent) = &settings.user_agent {
            builder = builder.arg(format!("--user-agent={user_agent}"));
        }

        let config = builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg(format!("--lang={}", settings.language))
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            settings: Arc::new(settings),
        })
    }
}

impl BrowserAutomation for ChromiumBrowser {
    type Session = ChromiumSession;

    async fn new_session(&self) -> Result<ChromiumSession, AppError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to open tab: {e}")))?;
        Ok(ChromiumSession {
            page,
            settings: self.settings.clone(),
        })
    }
}

/// Locate a real Chrome/Chromium binary, honouring `CHROME_BIN` first.
fn find_chrome_binary() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("CHROME_BIN") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    [
        "/snap/chromium/current/usr/lib/chromium-browser/chrome",
        "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ]
    .iter()
    .map(PathBuf::from)
    .find(|p| p.exists())
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// A single tab driven over the DevTools protocol.
pub struct ChromiumSession {
    page: Page,
    settings: Arc<BrowserSettings>,
}

/// Translate protocol failures into the engine's error vocabulary.
fn map_cdp(context: &str, error: CdpError, request_timeout: Duration) -> AppError {
    if matches!(error, CdpError::Timeout) {
        return AppError::Timeout(request_timeout.as_secs());
    }
    let message = error.to_string();
    if message.contains("Could not find node")
        || message.contains("No node with given id")
        || message.contains("Cannot find context with specified id")
        || message.contains("Node is detached")
    {
        AppError::StaleElement(format!("{context}: {message}"))
    } else if message.contains("not found") {
        AppError::ElementNotFound(format!("{context}: {message}"))
    } else {
        AppError::BrowserError(format!("{context}: {message}"))
    }
}

impl ChromiumSession {
    fn err(&self, context: &str) -> impl Fn(CdpError) -> AppError + '_ {
        let context = context.to_string();
        move |e| map_cdp(&context, e, self.settings.request_timeout)
    }

    /// Run a function with `this` bound to `element` and return its primitive result.
    async fn call_on(
        &self,
        element: &Element,
        function: &str,
        context: &str,
    ) -> Result<serde_json::Value, AppError> {
        let returns = element
            .call_js_fn(function, false)
            .await
            .map_err(self.err(context))?;
        Ok(returns.result.value.unwrap_or(serde_json::Value::Null))
    }
}

impl BrowserSession for ChromiumSession {
    type Element = Arc<Element>;

    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        let timeout = self.settings.navigation_timeout;
        let load = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        };
        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result.map_err(self.err(&format!("navigate to {url}"))),
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        }
    }

    async fn reload(&self) -> Result<(), AppError> {
        let timeout = self.settings.navigation_timeout;
        let load = async {
            self.page.reload().await?;
            self.page.wait_for_navigation().await?;
            Ok::<(), CdpError>(())
        };
        match tokio::time::timeout(timeout, load).await {
            Ok(result) => result.map_err(self.err("reload")),
            Err(_) => Err(AppError::Timeout(timeout.as_secs())),
        }
    }

    async fn current_url(&self) -> Result<String, AppError> {
        let url = self.page.url().await.map_err(self.err("current url"))?;
        Ok(url.unwrap_or_default())
    }

    async fn find(&self, selector: &str) -> Result<Option<Arc<Element>>, AppError> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<Arc<Element>>, AppError> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .map_err(self.err(selector))?;
        Ok(elements.into_iter().map(Arc::new).collect())
    }

    async fn find_within(
        &self,
        scope: &Arc<Element>,
        selector: &str,
    ) -> Result<Option<Arc<Element>>, AppError> {
        Ok(self
            .find_all_within(scope, selector)
            .await?
            .into_iter()
            .next())
    }

    async fn find_all_within(
        &self,
        scope: &Arc<Element>,
        selector: &str,
    ) -> Result<Vec<Arc<Element>>, AppError> {
        let elements = scope
            .find_elements(selector)
            .await
            .map_err(self.err(selector))?;
        Ok(elements.into_iter().map(Arc::new).collect())
    }

    async fn click(&self, element: &Arc<Element>) -> Result<(), AppError> {
        match element.click().await {
            Ok(_) => Ok(()),
            Err(e) => {
                // Overlays swallow synthetic mouse events; a DOM click still lands.
                tracing::debug!(error = %e, "Mouse click failed, falling back to script click");
                self.call_on(element, "function() { this.click(); }", "click")
                    .await
                    .map(|_| ())
            }
        }
    }

    async fn send_keys(&self, element: &Arc<Element>, text: &str) -> Result<(), AppError> {
        element.focus().await.map_err(self.err("focus"))?;
        element.type_str(text).await.map_err(self.err("type"))?;
        Ok(())
    }

    async fn press_key(&self, element: &Arc<Element>, key: &str) -> Result<(), AppError> {
        element.press_key(key).await.map_err(self.err(key))?;
        Ok(())
    }

    async fn scroll_container(
        &self,
        container: &Arc<Element>,
        scroll: ScrollTo,
    ) -> Result<ScrollPosition, AppError> {
        let action = match scroll {
            ScrollTo::End => "this.scrollTop = this.scrollHeight;".to_string(),
            ScrollTo::By(delta) => format!("this.scrollBy(0, {delta});"),
        };
        let function = format!(
            "function() {{ {action} return JSON.stringify([Math.round(this.scrollTop), this.scrollHeight]); }}"
        );
        let value = self.call_on(container, &function, "scroll").await?;
        let position: (i64, i64) = value
            .as_str()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default();
        Ok(ScrollPosition {
            top: position.0,
            height: position.1,
        })
    }

    async fn scroll_into_view(&self, element: &Arc<Element>) -> Result<(), AppError> {
        element
            .scroll_into_view()
            .await
            .map_err(self.err("scroll into view"))?;
        Ok(())
    }

    async fn read_text(&self, element: &Arc<Element>) -> Result<String, AppError> {
        let text = element.inner_text().await.map_err(self.err("read text"))?;
        Ok(text.unwrap_or_default())
    }

    async fn read_attribute(
        &self,
        element: &Arc<Element>,
        name: &str,
    ) -> Result<Option<String>, AppError> {
        element.attribute(name).await.map_err(self.err(name))
    }

    async fn inner_html(&self, element: &Arc<Element>) -> Result<String, AppError> {
        let html = element.inner_html().await.map_err(self.err("inner html"))?;
        Ok(html.unwrap_or_default())
    }

    async fn bounding_top(&self, element: &Arc<Element>) -> Result<f64, AppError> {
        let value = self
            .call_on(
                element,
                "function() { return this.getBoundingClientRect().top; }",
                "bounding box",
            )
            .await?;
        Ok(value.as_f64().unwrap_or(f64::MAX))
    }

    async fn evaluate_script(
        &self,
        script: &str,
        args: &[serde_json::Value],
    ) -> Result<serde_json::Value, AppError> {
        let args = serde_json::to_string(args)?;
        let expression = format!("(function() {{ {script} }}).apply(null, {args})");
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(self.err("evaluate"))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn close(self) -> Result<(), AppError> {
        self.page
            .close()
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to close tab: {e}")))
    }
}
