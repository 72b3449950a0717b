// src/sheet_store.rs

use crate::error::StoreError;
use crate::heuristics::PackingRecord;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use urlencoding::encode;

/// One record in the flat shape the spreadsheet expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitPayload {
    pub purchase_order: String,
    pub item_number: String,
    pub order_date: String,
    pub province: String,
    pub quantity: String,
    pub ship_to: String,
}

impl From<&PackingRecord> for SubmitPayload {
    fn from(record: &PackingRecord) -> Self {
        Self {
            purchase_order: record.normalized_po(),
            item_number: record.item_number(),
            order_date: record.order_date.clone().unwrap_or_default(),
            province: record.province.clone().unwrap_or_default(),
            quantity: record.quantity(),
            ship_to: record.ship_to.clone().unwrap_or_default(),
        }
    }
}

/// Purchase orders already recorded remotely, in raw (unnormalized) form.
#[async_trait]
pub trait KnownPoProvider: Send + Sync {
    async fn known_purchase_orders(&self) -> Result<Vec<String>, StoreError>;
}

/// Accepts one record per call. Pacing is the caller's job.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn submit(&self, payload: &SubmitPayload) -> Result<(), StoreError>;
}

/// Fired once at the end of a run so the sheet can refresh PO status.
#[async_trait]
pub trait StatusTrigger: Send + Sync {
    async fn trigger_update(&self) -> Result<(), StoreError>;
}

/// Client for the spreadsheet's Apps Script web app.
pub struct AppsScriptStore {
    client: Client,
    script_url: String,
}

impl AppsScriptStore {
    pub fn new(script_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            script_url: script_url.into(),
        }
    }

    fn mode_url(&self, mode: &str) -> String {
        let sep = if self.script_url.contains('?') { '&' } else { '?' };
        format!("{}{sep}mode={}", self.script_url, encode(mode))
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Status { status, body })
}

#[async_trait]
impl KnownPoProvider for AppsScriptStore {
    async fn known_purchase_orders(&self) -> Result<Vec<String>, StoreError> {
        let resp = self.client.get(self.mode_url("getPOs")).send().await?;
        let data: Value = check_status(resp).await?.json().await?;
        let pos = parse_known_pos(data)?;
        info!(count = pos.len(), "Fetched existing PO list");
        Ok(pos)
    }
}

#[async_trait]
impl RecordSink for AppsScriptStore {
    async fn submit(&self, payload: &SubmitPayload) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(&self.script_url)
            .json(payload)
            .send()
            .await?;
        let body = check_status(resp).await?.text().await?;
        debug!(po = %payload.purchase_order, response = %body, "Store accepted record");
        Ok(())
    }
}

#[async_trait]
impl StatusTrigger for AppsScriptStore {
    async fn trigger_update(&self) -> Result<(), StoreError> {
        let resp = self.client.post(self.mode_url("update")).send().await?;
        check_status(resp).await?;
        Ok(())
    }
}

/// The sheet returns a JSON array of cell values: strings, numbers or blanks.
fn parse_known_pos(data: Value) -> Result<Vec<String>, StoreError> {
    let entries = match data {
        Value::Array(entries) => entries,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(StoreError::Payload(format!(
                "expected a JSON array of POs, got: {other}"
            )));
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect())
}
