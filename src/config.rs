use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, Result};

pub const DEFAULT_SETTINGS_PATH: &str = "BotRes/Settings.json";
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";
pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com/v4";
pub const DRIVE_API_URL: &str = "https://www.googleapis.com/drive/v3";

/// Query string that restricts the collection page to items currently on auction.
pub const AUCTION_FILTER: &str = "?search[toggles][0]=ON_AUCTION";

/// Timeout applied to every outbound HTTP call (Telegram, Google, WebDriver).
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Refresh the Google access token this many seconds before it expires.
pub const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

pub const SHEETS_SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets \
                                 https://www.googleapis.com/auth/drive.readonly";

const USER_AGENTS_FILE: &str = "user_agents.txt";
const PROXIES_FILE: &str = "proxies.txt";

// ---------------------------------------------------------------------------
// Settings file (on-disk shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsFile {
    pub settings: Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Settings {
    #[serde(rename = "CollectionURL", default)]
    pub collection_url: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub chat_bot_token: String,
    #[serde(rename = "ChatID", default, deserialize_with = "string_or_number")]
    pub chat_id: String,
    #[serde(default)]
    pub spread_sheet: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread_sheet_id: Option<String>,
    #[serde(default = "default_work_sheet")]
    pub work_sheet: String,
    /// Alert threshold. Older settings files store it as a string.
    #[serde(default = "default_ratio", deserialize_with = "number_or_string")]
    pub ratio: f64,
    /// Conversion rate from the listed currency to the base currency.
    #[serde(rename = "BUSDPrice", default = "default_conversion", deserialize_with = "number_or_string")]
    pub busd_price: f64,
    #[serde(default = "default_client_secret")]
    pub client_secret_file_name: String,
    #[serde(rename = "WebDriverURL", default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default)]
    pub headless: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser_binary: Option<String>,
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default)]
    pub timings: Timings,
    #[serde(default)]
    pub selectors: Selectors,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Timings {
    pub page_timeout_secs: u64,
    pub balance_timeout_secs: u64,
    pub items_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub page_settle_ms: u64,
    pub balance_settle_ms: u64,
    pub items_settle_ms: u64,
    pub empty_market_pause_ms: u64,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            page_timeout_secs: 10,
            balance_timeout_secs: 10,
            items_timeout_secs: 20,
            poll_interval_ms: 250,
            page_settle_ms: 3_000,
            balance_settle_ms: 5_000,
            items_settle_ms: 3_000,
            empty_market_pause_ms: 3_000,
        }
    }
}

/// CSS selectors used to read the collection page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Selectors {
    pub page_ready: String,
    pub balance: String,
    pub item: String,
    pub item_price: String,
    pub item_link: String,
    pub auction_filter: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            page_ready: r#"[data-testid="phoenix-header"]"#.to_string(),
            balance: r#"[id="Header trait-filter-balance"] [class="sc-29427738-0 sc-bgqQcB cKdnBO hktnSP"]"#
                .to_string(),
            item: "article".to_string(),
            item_price: r#"[data-testid="ItemCardPrice"] span span"#.to_string(),
            item_link: "a".to_string(),
            auction_filter: AUCTION_FILTER.to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            collection_url: String::new(),
            chat_bot_token: String::new(),
            chat_id: String::new(),
            spread_sheet: "YN Ratio Sheet".to_string(),
            spread_sheet_id: None,
            work_sheet: default_work_sheet(),
            ratio: default_ratio(),
            busd_price: default_conversion(),
            client_secret_file_name: default_client_secret(),
            webdriver_url: default_webdriver_url(),
            headless: false,
            browser_binary: None,
            use_proxy: false,
            timings: Timings::default(),
            selectors: Selectors::default(),
        }
    }
}

fn default_work_sheet() -> String {
    "Sheet1".to_string()
}

fn default_ratio() -> f64 {
    20.0
}

fn default_conversion() -> f64 {
    1.0
}

fn default_client_secret() -> String {
    "client_secret.json".to_string()
}

fn default_webdriver_url() -> String {
    DEFAULT_WEBDRIVER_URL.to_string()
}

fn number_or_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<f64, D::Error> {
    use serde::de::Error;
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom("number out of range")),
        serde_json::Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("{s:?} is not a number"))),
        other => Err(D::Error::custom(format!("expected number, got {other}"))),
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    use serde::de::Error;
    match serde_json::Value::deserialize(d)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(D::Error::custom(format!("expected string, got {other}"))),
    }
}

/// Load the settings file, writing a default one first if it does not exist.
pub fn load_or_create_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = SettingsFile { settings: Settings::default() };
        std::fs::write(path, serde_json::to_string_pretty(&file)?)?;
        warn!("Settings file not found, wrote defaults to {}", path.display());
    }
    let raw = std::fs::read_to_string(path)?;
    let file: SettingsFile = serde_json::from_str(&raw)?;
    Ok(file.settings)
}

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub api_base: String,
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub sheets_api: String,
    pub drive_api: String,
    pub spreadsheet_title: String,
    pub spreadsheet_id: Option<String>,
    pub worksheet: String,
    pub credentials_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    pub headless: bool,
    pub binary: Option<String>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub page_timeout: Duration,
    pub balance_timeout: Duration,
    pub items_timeout: Duration,
    pub poll_interval: Duration,
    pub page_settle: Duration,
    pub balance_settle: Duration,
    pub items_settle: Duration,
    pub empty_market_pause: Duration,
}

impl From<&Timings> for WaitConfig {
    fn from(t: &Timings) -> Self {
        Self {
            page_timeout: Duration::from_secs(t.page_timeout_secs),
            balance_timeout: Duration::from_secs(t.balance_timeout_secs),
            items_timeout: Duration::from_secs(t.items_timeout_secs),
            poll_interval: Duration::from_millis(t.poll_interval_ms.max(1)),
            page_settle: Duration::from_millis(t.page_settle_ms),
            balance_settle: Duration::from_millis(t.balance_settle_ms),
            items_settle: Duration::from_millis(t.items_settle_ms),
            empty_market_pause: Duration::from_millis(t.empty_market_pause_ms),
        }
    }
}

/// Log destination. Read from the environment alone so logging can start
/// before the settings file is touched.
#[derive(Debug, Clone, PartialEq)]
pub struct LogConfig {
    pub level: String,
    pub dir: PathBuf,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            dir: PathBuf::from(lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string())),
        }
    }
}

/// Immutable process configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub collection_url: String,
    /// Alert fires when an item's ratio is at or above this value.
    pub threshold: f64,
    /// Multiplier applied to every listed price before evaluation.
    pub conversion_rate: f64,
    pub telegram: TelegramConfig,
    pub sheets: SheetsConfig,
    pub browser: BrowserConfig,
    pub waits: WaitConfig,
    pub selectors: Selectors,
    /// Status API port (API_PORT). 0 disables the API.
    pub api_port: u16,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = PathBuf::from(
            std::env::var("SETTINGS_PATH").unwrap_or_else(|_| DEFAULT_SETTINGS_PATH.to_string()),
        );
        let settings = load_or_create_settings(&path)?;
        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut cfg = Self::from_settings(settings, &dir)?;
        cfg.apply_env()?;
        info!(
            collection = %cfg.collection_url,
            threshold = cfg.threshold,
            conversion_rate = cfg.conversion_rate,
            "Loaded settings from {}",
            path.display(),
        );
        Ok(cfg)
    }

    /// Validate settings and resolve file-relative paths against `dir`.
    pub fn from_settings(s: Settings, dir: &Path) -> Result<Self> {
        if s.collection_url.trim().is_empty() {
            return Err(AppError::Config("CollectionURL must be set".to_string()));
        }
        if s.chat_bot_token.trim().is_empty() || s.chat_id.trim().is_empty() {
            return Err(AppError::Config("ChatBotToken and ChatID must be set".to_string()));
        }
        if !s.ratio.is_finite() || s.ratio < 0.0 {
            return Err(AppError::Config(format!("Ratio must be a non-negative number, got {}", s.ratio)));
        }
        if !s.busd_price.is_finite() || s.busd_price <= 0.0 {
            return Err(AppError::Config(format!("BUSDPrice must be positive, got {}", s.busd_price)));
        }
        if s.spread_sheet_id.is_none() && s.spread_sheet.trim().is_empty() {
            return Err(AppError::Config("SpreadSheet or SpreadSheetId must be set".to_string()));
        }

        let user_agent = pick_line(&dir.join(USER_AGENTS_FILE));
        let proxy = if s.use_proxy {
            let proxy = pick_line(&dir.join(PROXIES_FILE));
            match &proxy {
                Some(p) => info!("Proxy selected: {p}"),
                None => warn!("UseProxy is set but {} has no entries", PROXIES_FILE),
            }
            proxy
        } else {
            None
        };

        Ok(Self {
            collection_url: s.collection_url.trim().to_string(),
            threshold: s.ratio,
            conversion_rate: s.busd_price,
            telegram: TelegramConfig {
                api_base: TELEGRAM_API_URL.to_string(),
                bot_token: s.chat_bot_token,
                chat_id: s.chat_id,
            },
            sheets: SheetsConfig {
                sheets_api: SHEETS_API_URL.to_string(),
                drive_api: DRIVE_API_URL.to_string(),
                spreadsheet_title: s.spread_sheet,
                spreadsheet_id: s.spread_sheet_id.filter(|id| !id.trim().is_empty()),
                worksheet: s.work_sheet,
                credentials_path: dir.join(&s.client_secret_file_name),
            },
            browser: BrowserConfig {
                webdriver_url: s.webdriver_url,
                headless: s.headless,
                binary: s.browser_binary,
                user_agent,
                proxy,
            },
            waits: WaitConfig::from(&s.timings),
            selectors: s.selectors,
            api_port: 3000,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("WEBDRIVER_URL") {
            self.browser.webdriver_url = url;
        }
        if let Ok(port) = std::env::var("API_PORT") {
            self.api_port = port
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?;
        }
        Ok(())
    }

    /// Collection endpoint with the auction filter applied.
    pub fn filtered_collection_url(&self) -> String {
        format!("{}{}", self.collection_url, self.selectors.auction_filter)
    }
}

/// Pick one non-empty line at random from a list file.
fn pick_line(path: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(path).ok()?;
    let lines: Vec<&str> = raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines.choose(&mut rand::thread_rng()).map(|l| l.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_json(body: &str) -> Settings {
        let file: SettingsFile = serde_json::from_str(&format!(r#"{{"settings": {body}}}"#)).unwrap();
        file.settings
    }

    fn valid() -> Settings {
        settings_json(
            r#"{
                "CollectionURL": "https://opensea.io/collection/yn",
                "ChatBotToken": "123:abc",
                "ChatID": -1001,
                "SpreadSheet": "YN Ratio Sheet",
                "WorkSheet": "Live",
                "Ratio": "20",
                "BUSDPrice": 1.5,
                "ClientSecretFileName": "svc.json"
            }"#,
        )
    }

    #[test]
    fn parses_pascal_case_settings_keys() {
        let s = valid();
        assert_eq!(s.collection_url, "https://opensea.io/collection/yn");
        assert_eq!(s.chat_id, "-1001");
        assert_eq!(s.ratio, 20.0);
        assert_eq!(s.busd_price, 1.5);
        assert_eq!(s.work_sheet, "Live");
        assert_eq!(s.timings.items_timeout_secs, 20);
        assert_eq!(s.selectors.item, "article");
    }

    #[test]
    fn builds_config_with_resolved_paths() {
        let cfg = Config::from_settings(valid(), Path::new("/nonexistent/BotRes")).unwrap();
        assert_eq!(cfg.threshold, 20.0);
        assert_eq!(cfg.conversion_rate, 1.5);
        assert_eq!(cfg.sheets.credentials_path, PathBuf::from("/nonexistent/BotRes/svc.json"));
        assert_eq!(cfg.sheets.spreadsheet_id, None);
        assert!(cfg.browser.user_agent.is_none());
        assert_eq!(
            cfg.filtered_collection_url(),
            "https://opensea.io/collection/yn?search[toggles][0]=ON_AUCTION"
        );
        assert_eq!(cfg.waits.items_timeout, Duration::from_secs(20));
    }

    #[test]
    fn rejects_missing_collection_url() {
        let mut s = valid();
        s.collection_url = "  ".to_string();
        assert!(matches!(Config::from_settings(s, Path::new(".")), Err(AppError::Config(_))));
    }

    #[test]
    fn rejects_non_positive_conversion_rate() {
        let mut s = valid();
        s.busd_price = 0.0;
        assert!(matches!(Config::from_settings(s, Path::new(".")), Err(AppError::Config(_))));
    }

    #[test]
    fn rejects_malformed_ratio_string() {
        let res: std::result::Result<SettingsFile, _> =
            serde_json::from_str(r#"{"settings": {"Ratio": "twenty"}}"#);
        assert!(res.is_err());
    }

    #[test]
    fn log_settings_come_from_env_only() {
        let defaults = LogConfig::from_lookup(|_| None);
        assert_eq!(defaults, LogConfig { level: "info".to_string(), dir: PathBuf::from("logs") });

        let custom = LogConfig::from_lookup(|key| match key {
            "LOG_LEVEL" => Some("debug".to_string()),
            "LOG_DIR" => Some("/var/log/alerter".to_string()),
            _ => None,
        });
        assert_eq!(custom.level, "debug");
        assert_eq!(custom.dir, PathBuf::from("/var/log/alerter"));
    }

    #[test]
    fn picks_a_listed_line_at_random() {
        let dir = std::env::temp_dir().join(format!("alerter-lines-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("proxies.txt");
        std::fs::write(&path, "10.0.0.1:8080\n\n  10.0.0.2:8080  \n10.0.0.3:8080\n").unwrap();

        let listed = ["10.0.0.1:8080", "10.0.0.2:8080", "10.0.0.3:8080"];
        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            let line = pick_line(&path).unwrap();
            assert!(listed.contains(&line.as_str()), "unexpected line {line:?}");
            seen.insert(line);
        }
        assert!(seen.len() > 1);

        std::fs::write(&path, "\n   \n").unwrap();
        assert_eq!(pick_line(&path), None);
        assert_eq!(pick_line(&dir.join("missing.txt")), None);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = std::env::temp_dir().join(format!("alerter-cfg-{}", std::process::id()));
        let path = dir.join("Settings.json");
        let _ = std::fs::remove_dir_all(&dir);

        let s = load_or_create_settings(&path).unwrap();
        assert!(path.exists());
        assert_eq!(s.ratio, 20.0);
        assert!(s.collection_url.is_empty());

        // Reloading the written file yields the same defaults.
        let again = load_or_create_settings(&path).unwrap();
        assert_eq!(again.work_sheet, s.work_sheet);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
