//! Core data types for the `trunkscan` scanner

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Talkgroup identifier type. Raw values carry status flags in the low
/// four bits; base identifiers have those bits masked off.
pub type TalkgroupId = u32;

/// Radio (unit) identifier type
pub type RadioId = u32;

/// Default priority assigned to talkgroups the catalog does not know about
pub const DEFAULT_TALKGROUP_PRIORITY: i32 = 3;

/// Mask selecting the base portion of a raw talkgroup id
pub const TALKGROUP_BASE_MASK: u32 = 0xFFF0;

/// Kind of trunking event emitted by the control-channel parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// New voice channel grant
    Grant,
    /// Ongoing-call update on an already granted channel
    Update,
    /// Decoded but not actionable
    Unknown,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grant => write!(f, "grant"),
            Self::Update => write!(f, "update"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A decoded trunking event, handed to the call controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrunkMessage {
    /// Event kind
    pub message_type: MessageType,

    /// Voice channel frequency in Hz
    pub freq: f64,

    /// Raw 16-bit talkgroup id. The low four status bits are preserved
    /// for the consumer; state tables key on the base id.
    pub talkgroup: TalkgroupId,

    /// Source radio id (0 when the message carries none)
    pub source: RadioId,

    /// Encrypted call flag, decoded from the talkgroup status bits
    pub encrypted: bool,

    /// Emergency call flag, decoded from the talkgroup status bits
    pub emergency: bool,

    /// Index of the system this parser instance serves
    pub sys_num: i32,

    /// System id announced on the control channel
    pub sys_id: u32,

    /// Site id announced on the control channel (0 when unknown)
    pub site_id: u32,

    /// Phase 2 TDMA voice channel
    pub phase2_tdma: bool,

    /// TDMA slot for the voice channel
    pub tdma_slot: i32,

    /// Digital (true) or analog (false) voice
    pub mode: bool,

    /// Full duplex call
    pub duplex: bool,

    /// Priority assigned to the call
    pub priority: i32,
}

impl TrunkMessage {
    /// Build an event with the protocol defaults applied
    #[must_use]
    pub const fn new(
        message_type: MessageType,
        freq: f64,
        talkgroup: TalkgroupId,
        source: RadioId,
        encrypted: bool,
        emergency: bool,
        sys_num: i32,
        sys_id: u32,
        site_id: u32,
    ) -> Self {
        Self {
            message_type,
            freq,
            talkgroup,
            source,
            encrypted,
            emergency,
            sys_num,
            sys_id,
            site_id,
            phase2_tdma: false,
            tdma_slot: 0,
            mode: false,
            duplex: false,
            priority: DEFAULT_TALKGROUP_PRIORITY,
        }
    }
}

/// One recorded press-to-talk segment belonging to a call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    /// Audio file holding this segment
    pub filename: PathBuf,

    /// Source radio id for the segment
    pub source: i64,

    /// Wall-clock start, integer seconds
    pub start_time: i64,

    /// Wall-clock stop, integer seconds
    pub stop_time: i64,

    /// Wall-clock start, milliseconds
    pub start_time_ms: i64,

    /// Wall-clock stop, milliseconds
    pub stop_time_ms: i64,

    /// Decoder error count for the segment
    pub error_count: u32,

    /// Decoder spike count for the segment
    pub spike_count: u32,

    /// Talkgroup the segment was recorded on
    pub talkgroup: TalkgroupId,

    /// DMR color code, -1 when not applicable
    pub color_code: i32,
}

/// Per-segment source record, positioned on the playable timeline of the
/// concatenated output file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSource {
    /// Source radio id
    pub source: i64,

    /// Wall-clock segment start, integer seconds
    pub time: i64,

    /// Offset into the playable timeline, seconds
    pub position: f64,

    /// Emergency flag for the segment
    pub emergency: bool,

    /// Signaling system tag (empty when unknown)
    pub signal_system: String,

    /// Unit tag from the catalog (empty when unknown)
    pub tag: String,
}

/// Per-segment error record, positioned on the playable timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallError {
    /// Wall-clock segment start, integer seconds
    pub time: i64,

    /// Offset into the playable timeline, seconds
    pub position: f64,

    /// Segment length, seconds
    pub total_len: f64,

    /// Decoder error count
    pub error_count: u32,

    /// Decoder spike count
    pub spike_count: u32,
}

/// Post-processing lifecycle of a concluded call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Not yet processed
    Initial,
    /// Plugin or upload failed; eligible for another attempt
    Retry,
    /// Terminal: processed and uploaded
    Success,
    /// Terminal: gave up
    Failed,
}

impl Default for CallStatus {
    fn default() -> Self {
        Self::Initial
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initial => write!(f, "initial"),
            Self::Retry => write!(f, "retry"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Audio flavor of a recorded call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioType {
    /// Analog FM voice
    Analog,
    /// Digital voice
    Digital,
    /// Phase 2 TDMA digital voice
    DigitalTdma,
}

impl Default for AudioType {
    fn default() -> Self {
        Self::Analog
    }
}

impl std::fmt::Display for AudioType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analog => write!(f, "analog"),
            Self::Digital => write!(f, "digital"),
            Self::DigitalTdma => write!(f, "digital tdma"),
        }
    }
}

/// Recording metadata for a finished call
///
/// Built once by the aggregator, owned by exactly one worker until it
/// reaches a terminal status. `call_length_ms` is the playable sum of the
/// retained segments; the wall-clock span `[start_time_ms, stop_time_ms]`
/// is generally larger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallData {
    /// Post-processing status
    pub status: CallStatus,

    /// Earliest time (unix seconds) the call may be processed again
    pub process_call_time: i64,

    /// Number of retry attempts so far
    pub retry_attempt: u32,

    /// Recorder-assigned call number
    pub call_num: u64,

    /// Index of the system the call belongs to
    pub sys_num: i32,

    /// System short name
    pub short_name: String,

    /// Talkgroup the call was recorded on
    pub talkgroup: TalkgroupId,

    /// Talkgroup group tag from the catalog
    pub talkgroup_tag: String,

    /// Talkgroup alpha tag from the catalog
    pub talkgroup_alpha_tag: String,

    /// Talkgroup description from the catalog
    pub talkgroup_description: String,

    /// Talkgroup group name from the catalog
    pub talkgroup_group: String,

    /// Preformatted talkgroup display string
    pub talkgroup_display: String,

    /// Talkgroups patched with this one at call time
    pub patched_talkgroups: Vec<TalkgroupId>,

    /// Audio flavor
    pub audio_type: AudioType,

    /// Voice channel frequency in Hz
    pub freq: f64,

    /// Measured frequency error in Hz
    pub freq_error: f64,

    /// Signal level in dB
    pub signal: f64,

    /// Noise level in dB
    pub noise: f64,

    /// Source (SDR) number that fed the recorder
    pub source_num: i32,

    /// Recorder number that produced the audio
    pub recorder_num: i32,

    /// TDMA slot, -1 when not applicable
    pub tdma_slot: i32,

    /// Phase 2 TDMA call
    pub phase2_tdma: bool,

    /// Digital (true) or analog (false) voice
    pub mode: bool,

    /// Full duplex call
    pub duplex: bool,

    /// Encrypted call
    pub encrypted: bool,

    /// Emergency call
    pub emergency: bool,

    /// Call priority
    pub priority: i32,

    /// DMR color code adopted from the transmissions, -1 when unset
    pub color_code: i32,

    /// Earliest transmission start, integer seconds
    pub start_time: i64,

    /// Latest transmission stop, integer seconds
    pub stop_time: i64,

    /// Earliest transmission start, milliseconds
    pub start_time_ms: i64,

    /// Latest transmission stop, milliseconds
    pub stop_time_ms: i64,

    /// Playable audio length, seconds
    pub length: f64,

    /// Playable audio length, milliseconds
    pub call_length_ms: i64,

    /// Total decoder errors across retained segments
    pub error_count: u32,

    /// Total decoder spikes across retained segments
    pub spike_count: u32,

    /// Transmissions removed by the minimum-duration filter
    pub min_transmissions_removed: u32,

    /// Retained transmissions, in recording order
    pub transmission_list: Vec<Transmission>,

    /// Per-segment source records on the playable timeline
    pub transmission_source_list: Vec<CallSource>,

    /// Per-segment error records on the playable timeline
    pub transmission_error_list: Vec<CallError>,

    /// Combined audio output path
    pub filename: PathBuf,

    /// JSON sidecar path
    pub status_filename: PathBuf,

    /// Compressed audio output path
    pub converted: PathBuf,

    /// Transcode the combined audio to AAC
    pub compress_wav: bool,

    /// Keep the JSON sidecar after processing
    pub call_log: bool,

    /// Archive combined audio instead of deleting it
    pub audio_archive: bool,

    /// Archive the per-transmission files instead of deleting them
    pub transmission_archive: bool,

    /// Archive files when the upload ultimately fails
    pub archive_files_on_failure: bool,

    /// Optional user upload script, invoked with the three artifact paths
    pub upload_script: Option<String>,

    /// Snapshot of the sidecar JSON once written
    pub call_json: Option<serde_json::Value>,
}

impl Default for CallData {
    fn default() -> Self {
        Self {
            status: CallStatus::Initial,
            process_call_time: 0,
            retry_attempt: 0,
            call_num: 0,
            sys_num: 0,
            short_name: String::new(),
            talkgroup: 0,
            talkgroup_tag: String::new(),
            talkgroup_alpha_tag: String::new(),
            talkgroup_description: String::new(),
            talkgroup_group: String::new(),
            talkgroup_display: String::new(),
            patched_talkgroups: Vec::new(),
            audio_type: AudioType::Analog,
            freq: 0.0,
            freq_error: 0.0,
            signal: 0.0,
            noise: 0.0,
            source_num: 0,
            recorder_num: 0,
            tdma_slot: -1,
            phase2_tdma: false,
            mode: false,
            duplex: false,
            encrypted: false,
            emergency: false,
            priority: DEFAULT_TALKGROUP_PRIORITY,
            color_code: -1,
            start_time: 0,
            stop_time: 0,
            start_time_ms: 0,
            stop_time_ms: 0,
            length: 0.0,
            call_length_ms: 0,
            error_count: 0,
            spike_count: 0,
            min_transmissions_removed: 0,
            transmission_list: Vec::new(),
            transmission_source_list: Vec::new(),
            transmission_error_list: Vec::new(),
            filename: PathBuf::new(),
            status_filename: PathBuf::new(),
            converted: PathBuf::new(),
            compress_wav: false,
            call_log: true,
            audio_archive: false,
            transmission_archive: false,
            archive_files_on_failure: false,
            upload_script: None,
            call_json: None,
        }
    }
}

/// Catalog entry for a known talkgroup
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TalkgroupEntry {
    /// Group tag, e.g. "Law Enforcement"
    pub tag: String,

    /// Alpha tag, e.g. "PD Dispatch"
    pub alpha_tag: String,

    /// Free-form description
    pub description: String,

    /// Group name
    pub group: String,
}

/// Talkgroup and unit catalog of a configured system
///
/// The catalog lives outside the core; the aggregator only needs lookup.
pub trait TalkgroupCatalog {
    /// Look up a talkgroup by its raw id
    fn find_talkgroup(&self, talkgroup: TalkgroupId) -> Option<TalkgroupEntry>;

    /// Look up a unit tag by radio id
    fn find_unit_tag(&self, unit: i64) -> Option<String>;

    /// Talkgroups currently patched with the given one
    fn patched_talkgroups(&self, talkgroup: TalkgroupId) -> Vec<TalkgroupId>;
}

/// Catalog that knows nothing; every lookup misses
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyCatalog;

impl TalkgroupCatalog for EmptyCatalog {
    fn find_talkgroup(&self, _talkgroup: TalkgroupId) -> Option<TalkgroupEntry> {
        None
    }

    fn find_unit_tag(&self, _unit: i64) -> Option<String> {
        None
    }

    fn patched_talkgroups(&self, _talkgroup: TalkgroupId) -> Vec<TalkgroupId> {
        Vec::new()
    }
}
