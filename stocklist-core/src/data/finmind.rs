//! FinMind data provider.
//!
//! Fetches the Taiwan instrument table (`TaiwanStockInfo`) from FinMind's v4
//! data API. The token travels as a bearer header. FinMind wraps every
//! response in a `{ msg, status, data }` envelope and reports some failures
//! (quota, bad token) through the envelope status rather than the HTTP status.

use super::provider::{FetchError, InstrumentProvider, RawInstrument};
use crate::config::ProviderConfig;
use crate::credential::Credential;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

/// FinMind v4 response envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    msg: String,
    status: i64,
    #[serde(default)]
    data: Vec<RawInstrument>,
}

/// An authenticated handle for subsequent requests.
pub struct FinMindSession {
    auth: HeaderValue,
}

/// FinMind data provider.
pub struct FinMindProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    dataset: String,
}

impl FinMindProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("stocklist/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            dataset: config.dataset.clone(),
        })
    }

    /// Turn the token into a session. FinMind checks the token on each data
    /// request, so rejection surfaces from `list_instruments`.
    pub fn authenticate(&self, credential: &Credential) -> Result<FinMindSession, FetchError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", credential.expose()))
            .map_err(|_| {
                FetchError::Unauthorized("token contains characters not valid in a header".into())
            })?;
        auth.set_sensitive(true);
        Ok(FinMindSession { auth })
    }

    /// Request the full instrument table.
    pub fn list_instruments(
        &self,
        session: &FinMindSession,
    ) -> Result<Vec<RawInstrument>, FetchError> {
        debug!(url = %self.base_url, dataset = %self.dataset, "requesting instrument list");

        let resp = self
            .client
            .get(&self.base_url)
            .query(&[("dataset", self.dataset.as_str())])
            .header(AUTHORIZATION, session.auth.clone())
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(FetchError::Unauthorized(format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .map_err(|e| FetchError::Transport(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            // Error bodies are usually still an envelope with a useful msg.
            let msg = serde_json::from_str::<Envelope>(&body)
                .map(|env| env.msg)
                .unwrap_or_else(|_| truncate(&body, 200));
            return Err(FetchError::Provider {
                status: i64::from(status.as_u16()),
                msg,
            });
        }

        parse_response(&body)
    }
}

/// Decode a FinMind response body into instrument rows.
pub fn parse_response(body: &str) -> Result<Vec<RawInstrument>, FetchError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| FetchError::Decode(e.to_string()))?;

    match envelope.status {
        200 => {}
        401 | 403 => return Err(FetchError::Unauthorized(envelope.msg)),
        status => {
            return Err(FetchError::Provider {
                status,
                msg: envelope.msg,
            })
        }
    }

    if envelope.data.is_empty() {
        return Err(FetchError::EmptyResult);
    }

    Ok(envelope.data)
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

impl InstrumentProvider for FinMindProvider {
    fn name(&self) -> &str {
        "finmind"
    }

    fn fetch_instruments(
        &self,
        credential: &Credential,
    ) -> Result<Vec<RawInstrument>, FetchError> {
        let session = self.authenticate(credential)?;
        let rows = self.list_instruments(&session)?;
        info!(rows = rows.len(), "instrument list downloaded");
        Ok(rows)
    }
}
