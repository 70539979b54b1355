use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{BrowserConfig, Selectors, WaitConfig, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::source::extract::parse_balance;
use crate::source::ListingSource;
use crate::types::{CollectionBalance, RawListing};

/// W3C web element identifier key.
const ELEMENT_KEY: &str = "element-6066-11e4-a52f-4d65726c656d";

const NO_SUCH_ELEMENT: &str = "no such element";
const STALE_ELEMENT: &str = "stale element reference";

/// Listing Source backed by a W3C WebDriver endpoint (chromedriver).
///
/// Holds exactly one browser session for the life of the run. The session is
/// created in `start` and released in `close`.
pub struct WebDriverSource {
    client: reqwest::Client,
    base_url: String,
    session_id: Option<String>,
    selectors: Selectors,
    waits: WaitConfig,
}

impl WebDriverSource {
    /// Create a new browser session.
    pub async fn start(browser: &BrowserConfig, selectors: Selectors, waits: WaitConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        let base_url = browser.webdriver_url.trim_end_matches('/').to_string();

        let mut source = Self {
            client,
            base_url,
            session_id: None,
            selectors,
            waits,
        };
        let value = source
            .command(Method::POST, "/session", Some(capabilities(browser)))
            .await?;
        let session_id = value
            .get("sessionId")
            .and_then(|s| s.as_str())
            .ok_or_else(|| AppError::WebDriver {
                error: "session not created".to_string(),
                message: format!("response carried no sessionId: {value}"),
            })?
            .to_string();
        info!(session = %session_id, "Browser session started via {}", source.base_url);
        source.session_id = Some(session_id);
        Ok(source)
    }

    fn session_path(&self) -> Result<String> {
        match &self.session_id {
            Some(id) => Ok(format!("/session/{id}")),
            None => Err(AppError::WebDriver {
                error: "invalid session id".to_string(),
                message: "browser session already closed".to_string(),
            }),
        }
    }

    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.client.request(method, &url);
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await?;
        let ok = resp.status().is_success();
        let body: Value = resp.json().await?;
        parse_response(ok, body)
    }

    async fn session_command(&self, method: Method, suffix: &str, body: Option<Value>) -> Result<Value> {
        let path = format!("{}{}", self.session_path()?, suffix);
        self.command(method, &path, body).await
    }

    /// First element matching `css`, or `None` if there is none.
    async fn find(&self, css: &str) -> Result<Option<String>> {
        let res = self
            .session_command(Method::POST, "/element", Some(css_locator(css)))
            .await;
        optional_element(res)
    }

    async fn find_all(&self, css: &str) -> Result<Vec<String>> {
        let value = self
            .session_command(Method::POST, "/elements", Some(css_locator(css)))
            .await?;
        Ok(value
            .as_array()
            .map(|els| els.iter().filter_map(element_id).collect())
            .unwrap_or_default())
    }

    async fn find_in(&self, parent: &str, css: &str) -> Result<Option<String>> {
        let res = self
            .session_command(
                Method::POST,
                &format!("/element/{parent}/element"),
                Some(css_locator(css)),
            )
            .await;
        optional_element(res)
    }

    async fn text(&self, element: &str) -> Result<String> {
        let value = self
            .session_command(Method::GET, &format!("/element/{element}/text"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn property(&self, element: &str, name: &str) -> Result<Option<String>> {
        let value = self
            .session_command(Method::GET, &format!("/element/{element}/property/{name}"), None)
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn is_displayed(&self, element: &str) -> Result<bool> {
        match self
            .session_command(Method::GET, &format!("/element/{element}/displayed"), None)
            .await
        {
            Ok(v) => Ok(v.as_bool().unwrap_or(false)),
            Err(AppError::WebDriver { error, .. }) if error == STALE_ELEMENT => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn execute(&self, script: &str) -> Result<Value> {
        self.session_command(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": [] })),
        )
        .await
    }

    /// Poll until an element matching `css` is visible.
    /// Returns `None` once `timeout` has elapsed without one.
    async fn wait_visible(&self, css: &str, timeout: Duration) -> Result<Option<String>> {
        let started = Instant::now();
        loop {
            if let Some(id) = self.find(css).await? {
                if self.is_displayed(&id).await? {
                    return Ok(Some(id));
                }
            }
            if started.elapsed() >= timeout {
                return Ok(None);
            }
            tokio::time::sleep(self.waits.poll_interval).await;
        }
    }

    async fn read_listing(&self, element: &str) -> RawListing {
        let price_text = match self.find_in(element, &self.selectors.item_price).await {
            Ok(Some(price_el)) => self.text(&price_el).await.ok(),
            Ok(None) => None,
            Err(e) => {
                debug!("price lookup failed: {e}");
                None
            }
        };
        let link = match self.find_in(element, &self.selectors.item_link).await {
            Ok(Some(anchor)) => self.property(&anchor, "href").await.ok().flatten(),
            Ok(None) => None,
            Err(e) => {
                debug!("link lookup failed: {e}");
                None
            }
        };
        RawListing { price_text, link }
    }
}

#[async_trait]
impl ListingSource for WebDriverSource {
    async fn open(&mut self, endpoint: &str) -> Result<()> {
        info!("Monitoring collection: {endpoint}");
        self.session_command(Method::POST, "/url", Some(json!({ "url": endpoint })))
            .await?;

        let timeout = self.waits.page_timeout;
        if self.wait_visible(&self.selectors.page_ready, timeout).await?.is_none() {
            return Err(AppError::StartupWaitTimeout {
                what: "collection page".to_string(),
                waited: timeout,
            });
        }
        tokio::time::sleep(self.waits.page_settle).await;

        // The balance indicator only renders once scrolled into view.
        if let Err(e) = self
            .execute("window.scrollTo(0, document.body.scrollHeight);")
            .await
        {
            warn!("Scroll to bottom failed: {e}");
        }
        Ok(())
    }

    async fn read_balance(&mut self) -> Result<CollectionBalance> {
        let timeout = self.waits.balance_timeout;
        let Some(indicator) = self.wait_visible(&self.selectors.balance, timeout).await? else {
            return Err(AppError::StartupWaitTimeout {
                what: "balance indicator".to_string(),
                waited: timeout,
            });
        };
        tokio::time::sleep(self.waits.balance_settle).await;
        let text = self.text(&indicator).await?;
        parse_balance(&text)
    }

    async fn read_items(&mut self) -> Result<Vec<RawListing>> {
        let timeout = self.waits.items_timeout;
        if self.wait_visible(&self.selectors.item, timeout).await?.is_none() {
            return Ok(Vec::new());
        }
        tokio::time::sleep(self.waits.items_settle).await;

        let elements = self.find_all(&self.selectors.item).await?;
        let mut listings = Vec::with_capacity(elements.len());
        for element in &elements {
            listings.push(self.read_listing(element).await);
        }
        debug!("Read {} listing elements", listings.len());
        Ok(listings)
    }

    async fn close(&mut self) -> Result<()> {
        let Some(id) = self.session_id.take() else {
            return Ok(());
        };
        info!(session = %id, "Closing browser session");
        self.command(Method::DELETE, &format!("/session/{id}"), None)
            .await
            .map(|_| ())
    }
}

// ---------------------------------------------------------------------------
// Wire helpers
// ---------------------------------------------------------------------------

/// New-session payload: a Chrome session tuned for unattended scraping.
fn capabilities(browser: &BrowserConfig) -> Value {
    let mut args = vec![
        "--start-maximized".to_string(),
        "--disable-extensions".to_string(),
        "--disable-notifications".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--no-sandbox".to_string(),
        "--disable-gpu".to_string(),
        "--dns-prefetch-disable".to_string(),
        "--ignore-ssl-errors".to_string(),
        "--ignore-certificate-errors".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
    ];
    if let Some(ua) = &browser.user_agent {
        args.push(format!("--user-agent={ua}"));
    }
    if let Some(proxy) = &browser.proxy {
        args.push(format!("--proxy-server={proxy}"));
    }
    if browser.headless {
        args.push("--headless".to_string());
    }

    let mut chrome = json!({
        "args": args,
        "excludeSwitches": ["enable-automation", "enable-logging"],
        "useAutomationExtension": false,
        "prefs": {
            "profile.default_content_setting_values.geolocation": 2,
            "profile.managed_default_content_setting_values.images": 2
        }
    });
    if let Some(binary) = &browser.binary {
        chrome["binary"] = json!(binary);
    }

    json!({
        "capabilities": {
            "alwaysMatch": {
                "browserName": "chrome",
                "goog:chromeOptions": chrome
            }
        }
    })
}

fn css_locator(css: &str) -> Value {
    json!({ "using": "css selector", "value": css })
}

/// Unwrap the `value` member of a WebDriver response, turning error payloads
/// into `AppError::WebDriver`.
fn parse_response(ok: bool, body: Value) -> Result<Value> {
    let value = body.get("value").cloned().unwrap_or(Value::Null);
    let error = value.get("error").and_then(|e| e.as_str());
    match (ok, error) {
        (true, None) => Ok(value),
        (_, Some(error)) => Err(AppError::WebDriver {
            error: error.to_string(),
            message: value
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string(),
        }),
        (false, None) => Err(AppError::WebDriver {
            error: "unknown error".to_string(),
            message: body.to_string(),
        }),
    }
}

fn element_id(value: &Value) -> Option<String> {
    value.get(ELEMENT_KEY).and_then(|v| v.as_str()).map(str::to_string)
}

fn optional_element(res: Result<Value>) -> Result<Option<String>> {
    match res {
        Ok(v) => Ok(element_id(&v)),
        Err(AppError::WebDriver { error, .. }) if error == NO_SUCH_ELEMENT => Ok(None),
        Err(e) => Err(e),
    }
}
