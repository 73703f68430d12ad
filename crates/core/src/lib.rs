//! Shared domain types for the watermark desktop shell.
//!
//! Everything in this crate is plain data plus pure validation: the job
//! snapshots returned by the export service, the export/watermark
//! configuration sent with a submission, saved templates, the last-used
//! settings, and the environment parsing used by every config struct.
//! Nothing here touches
//! the network or filesystem, so the client, asset and supervisor crates
//! can all depend on it.

pub mod config;
pub mod env;
pub mod error;
pub mod export;
pub mod settings;
pub mod template;
pub mod types;
