//! Remote ledger over a realtime-database style REST API.
//!
//! `POST {base}/sessions/{user}.json` appends a record and answers
//! `{"name": "<generated key>"}`; `GET` on the same path answers `null` or an
//! object of key -> record.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use url::Url;

use crate::error::LedgerError;
use crate::storage::LedgerConfig;

use super::{FocusSession, SessionLedger};

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

pub struct HttpLedger {
    client: Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpLedger {
    pub fn new(
        base_url: &str,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, LedgerError> {
        if base_url.trim().is_empty() {
            return Err(LedgerError::NotConfigured("base URL is empty".into()));
        }
        let base_url = Url::parse(base_url.trim())
            .map_err(|e| LedgerError::NotConfigured(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(LedgerError::NotConfigured(format!(
                "{base_url} cannot hold a path"
            )));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            auth_token: auth_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self, LedgerError> {
        Self::new(
            &config.base_url,
            config.auth_token.clone(),
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }

    fn sessions_url(&self, user_id: &str) -> Result<Url, LedgerError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| LedgerError::NotConfigured("base URL cannot hold a path".into()))?
            .pop_if_empty()
            .push("sessions")
            .push(&format!("{user_id}.json"));
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }

    fn check_status(
        resp: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, LedgerError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().unwrap_or_default();
        Err(LedgerError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl SessionLedger for HttpLedger {
    fn append(&self, user_id: &str, session: &FocusSession) -> Result<String, LedgerError> {
        let url = self.sessions_url(user_id)?;
        let resp = self.client.post(url).json(session).send()?;
        let pushed: PushResponse = serde_json::from_str(&Self::check_status(resp)?.text()?)?;
        tracing::debug!(key = %pushed.name, "session appended to remote ledger");
        Ok(pushed.name)
    }

    fn fetch_all(&self, user_id: &str) -> Result<Vec<FocusSession>, LedgerError> {
        let url = self.sessions_url(user_id)?;
        let resp = self.client.get(url).send()?;
        let body = Self::check_status(resp)?.text()?;

        let records: Option<BTreeMap<String, serde_json::Value>> = serde_json::from_str(&body)?;
        let sessions = records
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value::<FocusSession>(value) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::warn!(%key, "skipping malformed ledger record: {e}");
                    None
                }
            })
            .collect();
        Ok(sessions)
    }
}
