//! Core types for auditing the Timelock oracle: the recorded [`Event`]s of one test execution
//! and the immutable, time-ordered [`EventHistory`] every checker consumes.
//!
//! # Usage
//!
//! Please see [the `timelock_checker` docs](https://docs.rs/timelock_checker/).
//!
//! # Features
//!
//! - `serde`: Implement `Serialize` and `Deserialize` for events.
//! - `serde_json` (default): Include the [`ingest`] module, which reads flat JSON trace records.

#![cfg_attr(all(doc, CHANNEL_NIGHTLY), feature(doc_auto_cfg))]
#![deny(unused_must_use)]
#![warn(rust_2018_idioms, unreachable_pub)]

mod event;
mod history;
#[cfg(feature = "serde_json")]
pub mod ingest;
mod process;

pub use event::{Event, EventType, Function, Value};
pub use history::{Episode, EventHistory, HistoryError, Operation};
pub use process::Process;
