//! Core types and utilities for the `trunkscan` scanner
//!
//! Shared data model for the control-channel parser and the call concluder:
//! trunking events, per-call recording metadata, catalog lookup traits, the
//! filename template expander, and configuration loading.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss,
    clippy::struct_excessive_bools
)]

pub mod config;
pub mod error;
pub mod format;
pub mod types;

// Re-export commonly used types
pub use config::{Config, SystemConfig};
pub use error::{Error, Result};
pub use format::expand_filename_format;
pub use types::{
    CallData, CallError, CallSource, CallStatus, MessageType, TalkgroupCatalog, TalkgroupEntry,
    Transmission, TrunkMessage,
};

/// Initialize the logging system
///
/// # Errors
///
/// Returns an error if the logging system cannot be initialized.
pub fn init_logging() -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}
