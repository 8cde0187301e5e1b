//! Derived text over a [`ledger_core::Ledger`].
//!
//! Builds the short history strings handed to an inference provider as
//! context, and markdown reports for finished session groups.

pub mod context;
pub mod reports;

pub use context::{generation_context, group_context, ContextEntry};
pub use reports::ReportGenerator;
