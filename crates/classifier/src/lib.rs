//! Transaction classifier for the tallyscan engine.
//!
//! Turns a raw base-chain transaction plus its block context into an
//! [`Intent`](tallyscan_types::Intent) or a [`Rejection`]. Classification
//! never touches the ledger.
//!
//! # Components
//!
//! - [`Classifier`]: packet class, sender, reference and payload extraction
//! - [`InputCache`]: previous outputs fetched through a [`TransactionSource`]
//! - [`ClassifierConfig`] / [`ScriptRules`]: magic, system address, and the
//!   height-dependent script allow-list

mod cache;
mod classify;
mod rejection;
mod rules;

pub use cache::{CacheStats, InputCache, TransactionSource};
pub use classify::{select_reference, BlockContext, Classifier};
pub use rejection::Rejection;
pub use rules::{ClassifierConfig, ScriptRule, ScriptRules};
