//! Instrument provider trait and structured fetch errors.
//!
//! The InstrumentProvider trait abstracts over the market-data source so the
//! pipeline can run against FinMind in production and a mock in tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential::Credential;

/// One row of the provider's instrument table, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInstrument {
    pub stock_id: String,
    pub stock_name: String,
    #[serde(default)]
    pub industry_category: Option<String>,
}

impl RawInstrument {
    pub fn new(
        stock_id: impl Into<String>,
        stock_name: impl Into<String>,
        industry_category: Option<&str>,
    ) -> Self {
        Self {
            stock_id: stock_id.into(),
            stock_name: stock_name.into(),
            industry_category: industry_category.map(str::to_string),
        }
    }
}

/// Every way a fetch can fail. All of them abort the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("provider rejected the credential: {0}")]
    Unauthorized(String),

    #[error("provider returned status {status}: {msg}")]
    Provider { status: i64, msg: String },

    #[error("provider returned an empty instrument list")]
    EmptyResult,

    #[error("network error: {0}")]
    Transport(String),

    #[error("response format changed: {0}")]
    Decode(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Source of the full instrument list.
///
/// Implementations authenticate and fetch in one call and never retry;
/// retrying is the scheduler's job.
pub trait InstrumentProvider {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch every listed instrument. An empty list is an error.
    fn fetch_instruments(&self, credential: &Credential)
        -> Result<Vec<RawInstrument>, FetchError>;
}
