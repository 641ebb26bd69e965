//! `rentab-report`: profitability report population engine.
//!
//! Resolves the day's sales data (dated flat export or read-only SQL),
//! normalizes it into canonical lines, derives unit prices, flags price
//! deviations against list, and writes the ledger workbook sections.

pub mod acquire;
pub mod dates;
pub mod derive;
pub mod engine;
pub mod error;
pub mod format;
pub mod model;
pub mod normalize;
pub mod reference;
pub mod source;
pub mod variance;
pub mod writer;

pub use engine::{run, RunConfig, RunReport};
pub use error::ReportError;
pub use model::{RunSummary, TransactionLine};
