//! Call post-processing for the `trunkscan` scanner
//!
//! After a voice call finishes recording as a series of per-transmission
//! audio files, this crate aggregates the transmissions into call metadata,
//! combines and transcodes the audio through external tools, writes the JSON
//! sidecar, invokes upload hooks, retries failed uploads with exponential
//! backoff, and archives or deletes the artifacts per policy.

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
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::struct_excessive_bools,
    clippy::float_cmp
)]

pub mod aggregate;
pub mod concluder;
pub mod error;
pub mod exec;
pub mod plugin;
pub mod sidecar;
pub mod worker;

pub use aggregate::{FinishedCall, build_call_data};
pub use concluder::{CallConcluder, MAX_RETRY};
pub use error::{ConcluderError, ConcluderResult};
pub use plugin::{CallEndHook, PluginRegistry};
pub use worker::{remove_call_files, upload_call_worker};
