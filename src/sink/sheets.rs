use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::config::{SheetsConfig, HTTP_TIMEOUT_SECS};
use crate::error::{AppError, Result};
use crate::sink::auth::TokenProvider;
use crate::sink::SnapshotSink;
use crate::types::CycleSnapshot;

const SPREADSHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";

/// Google Sheets v4 sink. Writes `[price, balance, link]` rows starting at
/// row 2 of the configured worksheet; row 1 is left for headers.
pub struct SheetsSink {
    client: reqwest::Client,
    cfg: SheetsConfig,
    auth: TokenProvider,
    /// Resolved from the title on first publish when not configured.
    spreadsheet_id: Option<String>,
}

impl SheetsSink {
    pub fn new(cfg: SheetsConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        let auth = TokenProvider::new(client.clone(), cfg.credentials_path.clone());
        let spreadsheet_id = cfg.spreadsheet_id.clone();
        Ok(Self { client, cfg, auth, spreadsheet_id })
    }

    async fn spreadsheet_id(&mut self, token: &str) -> Result<String> {
        if let Some(id) = &self.spreadsheet_id {
            return Ok(id.clone());
        }

        let url = format!("{}/files", self.cfg.drive_api.trim_end_matches('/'));
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .query(&[
                ("q", drive_query(&self.cfg.spreadsheet_title).as_str()),
                ("fields", "files(id,name)"),
                ("pageSize", "1"),
            ])
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        let body = check_google_response(status, body)?;

        let id = body
            .get("files")
            .and_then(|f| f.as_array())
            .and_then(|f| f.first())
            .and_then(|f| f.get("id"))
            .and_then(|id| id.as_str())
            .ok_or_else(|| {
                AppError::Publish(format!(
                    "spreadsheet {:?} not found or not shared with the service account",
                    self.cfg.spreadsheet_title
                ))
            })?
            .to_string();
        info!(spreadsheet = %self.cfg.spreadsheet_title, id = %id, "Resolved spreadsheet id");
        self.spreadsheet_id = Some(id.clone());
        Ok(id)
    }

    async fn write(&mut self, snapshot: &CycleSnapshot) -> Result<()> {
        let token = self.auth.access_token().await?;
        let id = self.spreadsheet_id(&token).await?;

        let url = format!(
            "{}/spreadsheets/{}/values:batchUpdate",
            self.cfg.sheets_api.trim_end_matches('/'),
            id
        );
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&token)
            .json(&batch_update_body(&self.cfg.worksheet, snapshot))
            .send()
            .await?;
        let status = resp.status();
        let body: Value = resp.json().await?;
        let body = check_google_response(status, body)?;

        let updated = body.get("totalUpdatedRows").and_then(|v| v.as_u64()).unwrap_or(0);
        info!(
            spreadsheet = %self.cfg.spreadsheet_title,
            worksheet = %self.cfg.worksheet,
            rows = updated,
            "Updated spreadsheet",
        );
        Ok(())
    }
}

#[async_trait]
impl SnapshotSink for SheetsSink {
    async fn publish(&mut self, snapshot: &CycleSnapshot) -> Result<()> {
        if snapshot.is_empty() {
            debug!("Empty snapshot, nothing to write");
            return Ok(());
        }
        self.write(snapshot).await.map_err(|e| match e {
            AppError::Publish(_) => e,
            other => AppError::Publish(other.to_string()),
        })
    }
}

/// A1 range covering `rows` rows of columns A..C, starting at row 2.
pub fn snapshot_range(worksheet: &str, rows: usize) -> String {
    format!("'{}'!A2:C{}", worksheet.replace('\'', "''"), rows + 1)
}

/// Single `values:batchUpdate` request carrying all three columns.
pub fn batch_update_body(worksheet: &str, snapshot: &CycleSnapshot) -> Value {
    let rows: Vec<Value> = snapshot
        .items
        .iter()
        .map(|item| json!([item.price, snapshot.balance, item.link]))
        .collect();
    json!({
        "valueInputOption": "RAW",
        "data": [{
            "range": snapshot_range(worksheet, rows.len()),
            "majorDimension": "ROWS",
            "values": rows,
        }]
    })
}

fn drive_query(title: &str) -> String {
    let escaped = title.replace('\\', "\\\\").replace('\'', "\\'");
    format!("name = '{escaped}' and mimeType = '{SPREADSHEET_MIME}' and trashed = false")
}

fn check_google_response(status: reqwest::StatusCode, body: Value) -> Result<Value> {
    if status.is_success() {
        return Ok(body);
    }
    let message = body
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or("no error message");
    Err(AppError::Publish(format!("store rejected request ({status}): {message}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ListingItem;
    use reqwest::StatusCode;

    fn snapshot() -> CycleSnapshot {
        CycleSnapshot {
            balance: 100_000,
            items: vec![
                ListingItem { price: 4_000.0, link: "https://x/1".to_string(), ratio: 25.0 },
                ListingItem { price: 6_000.0, link: "https://x/2".to_string(), ratio: 16.67 },
            ],
        }
    }

    #[test]
    fn range_spans_rows_two_through_n_plus_one() {
        assert_eq!(snapshot_range("Sheet1", 2), "'Sheet1'!A2:C3");
        assert_eq!(snapshot_range("Bob's", 1), "'Bob''s'!A2:C2");
    }

    #[test]
    fn body_writes_three_columns_in_one_range() {
        let body = batch_update_body("Live", &snapshot());
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["range"], "'Live'!A2:C3");
        assert_eq!(data[0]["values"][0], json!([4000.0, 100000, "https://x/1"]));
        assert_eq!(data[0]["values"][1], json!([6000.0, 100000, "https://x/2"]));
        assert_eq!(body["valueInputOption"], "RAW");
    }

    #[test]
    fn drive_query_escapes_quotes() {
        assert_eq!(
            drive_query("Ali's Sheet"),
            "name = 'Ali\\'s Sheet' and mimeType = 'application/vnd.google-apps.spreadsheet' and trashed = false"
        );
    }

    #[test]
    fn surfaces_google_error_message() {
        let body = json!({ "error": { "code": 401, "message": "Request had invalid authentication credentials." } });
        match check_google_response(StatusCode::UNAUTHORIZED, body) {
            Err(AppError::Publish(m)) => assert!(m.contains("invalid authentication")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_snapshot_skips_network() {
        let mut sink = SheetsSink::new(SheetsConfig {
            sheets_api: "http://127.0.0.1:1".to_string(),
            drive_api: "http://127.0.0.1:1".to_string(),
            spreadsheet_title: "YN Ratio Sheet".to_string(),
            spreadsheet_id: None,
            worksheet: "Sheet1".to_string(),
            credentials_path: "/nonexistent/client_secret.json".into(),
        })
        .unwrap();
        assert!(sink.publish(&CycleSnapshot::new(5)).await.is_ok());
        assert!(matches!(sink.publish(&snapshot()).await, Err(AppError::Publish(_))));
    }
}
