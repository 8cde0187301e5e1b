pub mod aggregations;
pub mod config;
pub mod error;
pub mod ledger;
pub mod types;

pub use config::{AppConfig, LedgerConfig, ServerConfig};
pub use error::{LedgerError, Result};
pub use ledger::Ledger;
pub use types::{Event, LabelShare, LedgerStats, MergeOrder, Payload, Summary, Transition};
