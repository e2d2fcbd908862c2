//! Instrument data sources.

pub mod finmind;
pub mod provider;

pub use finmind::{FinMindProvider, FinMindSession};
pub use provider::{FetchError, InstrumentProvider, RawInstrument};
