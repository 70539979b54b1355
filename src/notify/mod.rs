pub mod telegram;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::Alert;

pub use telegram::TelegramDispatcher;

/// Sends one alert to a notification channel. Best-effort: callers log
/// failures and move on, nothing is retried.
#[async_trait]
pub trait AlertDispatcher: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<()>;
}
