//! SmartNet control-channel parsing for the `trunkscan` scanner
//!
//! Decodes the outbound signalling word (OSW) stream of a Motorola SmartNet
//! trunked system: reassembles multi-word messages from a lossy demodulated
//! bitstream, recovers frame alignment across dropped words and interleaved
//! idles, emits typed trunking events, and tracks the talkgroup, patch,
//! adjacent-site, and alternate-control-channel tables the events imply.

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
    clippy::struct_excessive_bools,
    clippy::too_many_lines,
    clippy::float_cmp,
    clippy::suboptimal_flops,
    clippy::unreadable_literal
)]

pub mod bandplan;
pub mod osw;
pub mod parser;
pub mod state;

pub use bandplan::Bandplan;
pub use osw::{Osw, OswQueue, OSW_QUEUE_SIZE, QUEUE_RESET_CMD};
pub use parser::{ChannelMessage, SmartnetParser, MSG_BAD_OSW, MSG_OSW, MSG_TIMEOUT, PROTO_SMARTNET};
pub use state::TrunkingState;
