//! JSON metadata sidecar
//!
//! One JSON file per call, written next to the audio. Key order is part of
//! the de-facto format consumed by downstream uploaders, so the document is
//! built from a struct whose field order matches it; booleans are stored as
//! 0/1 and the call length is rounded to whole seconds, as they always were.

use crate::error::{ConcluderError, ConcluderResult};
use serde::Serialize;
use trunkscan_core::CallData;

/// Round a playable-timeline position to two decimals
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Serialize)]
struct FreqEntry {
    freq: i64,
    time: i64,
    pos: f64,
    len: f64,
    error_count: i64,
    spike_count: i64,
}

#[derive(Serialize)]
struct SrcEntry {
    src: i64,
    time: i64,
    pos: f64,
    emergency: i32,
    signal_system: String,
    tag: String,
}

/// Serialization view of a call; field order defines the key order
#[derive(Serialize)]
#[allow(clippy::struct_field_names)]
struct CallSidecar<'a> {
    freq: i64,
    freq_error: i64,
    signal: i64,
    noise: i64,
    source_num: i32,
    recorder_num: i32,
    tdma_slot: i32,
    phase2_tdma: i32,
    start_time: i64,
    stop_time: i64,
    start_time_ms: i64,
    stop_time_ms: i64,
    emergency: i32,
    priority: i32,
    mode: i32,
    duplex: i32,
    encrypted: i32,
    call_length: i64,
    call_length_ms: i64,
    talkgroup: u32,
    talkgroup_tag: &'a str,
    talkgroup_description: &'a str,
    talkgroup_group_tag: &'a str,
    talkgroup_group: &'a str,
    color_code: i32,
    audio_type: String,
    short_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    patched_talkgroups: Option<&'a [u32]>,
    #[serde(rename = "freqList", skip_serializing_if = "Vec::is_empty")]
    freq_list: Vec<FreqEntry>,
    #[serde(rename = "srcList", skip_serializing_if = "Vec::is_empty")]
    src_list: Vec<SrcEntry>,
}

impl<'a> CallSidecar<'a> {
    fn from_call(call: &'a CallData) -> Self {
        let freq = call.freq.round() as i64;
        Self {
            freq,
            freq_error: call.freq_error as i64,
            signal: call.signal as i64,
            noise: call.noise as i64,
            source_num: call.source_num,
            recorder_num: call.recorder_num,
            tdma_slot: call.tdma_slot,
            phase2_tdma: i32::from(call.phase2_tdma),
            start_time: call.start_time,
            stop_time: call.stop_time,
            start_time_ms: call.start_time_ms,
            stop_time_ms: call.stop_time_ms,
            emergency: i32::from(call.emergency),
            priority: call.priority,
            mode: i32::from(call.mode),
            duplex: i32::from(call.duplex),
            encrypted: i32::from(call.encrypted),
            call_length: call.length.round() as i64,
            call_length_ms: call.call_length_ms,
            talkgroup: call.talkgroup,
            talkgroup_tag: &call.talkgroup_alpha_tag,
            talkgroup_description: &call.talkgroup_description,
            talkgroup_group_tag: &call.talkgroup_tag,
            talkgroup_group: &call.talkgroup_group,
            color_code: call.color_code,
            audio_type: call.audio_type.to_string(),
            short_name: &call.short_name,
            patched_talkgroups: (call.patched_talkgroups.len() > 1)
                .then_some(call.patched_talkgroups.as_slice()),
            freq_list: call
                .transmission_error_list
                .iter()
                .map(|e| FreqEntry {
                    freq,
                    time: e.time,
                    pos: round2(e.position),
                    len: e.total_len,
                    error_count: i64::from(e.error_count),
                    spike_count: i64::from(e.spike_count),
                })
                .collect(),
            src_list: call
                .transmission_source_list
                .iter()
                .map(|s| SrcEntry {
                    src: s.source,
                    time: s.time,
                    pos: round2(s.position),
                    emergency: i32::from(s.emergency),
                    signal_system: s.signal_system.clone(),
                    tag: s.tag.clone(),
                })
                .collect(),
        }
    }
}

/// Write the sidecar to `status_filename` and store the JSON snapshot on
/// the call.
///
/// # Errors
///
/// Returns [`ConcluderError::SidecarWrite`] when the file cannot be
/// created, or a JSON error when serialization fails.
pub async fn write_call_json(call: &mut CallData) -> ConcluderResult<()> {
    let sidecar = CallSidecar::from_call(call);
    // Serialize the struct directly: this is what fixes the key order in
    // the file. The Value snapshot below does not keep it.
    let body = serde_json::to_string_pretty(&sidecar)?;
    let value = serde_json::to_value(&sidecar)?;

    tokio::fs::write(&call.status_filename, body)
        .await
        .map_err(|source| ConcluderError::SidecarWrite {
            path: call.status_filename.clone(),
            source,
        })?;

    call.call_json = Some(value);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unreadable_literal)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trunkscan_core::types::{AudioType, CallError, CallSource};

    fn sample_call(dir: &std::path::Path) -> CallData {
        CallData {
            freq: 851_012_500.0,
            signal: -40.2,
            noise: -95.8,
            source_num: 1,
            recorder_num: 4,
            tdma_slot: -1,
            start_time: 1705327852,
            stop_time: 1705327860,
            start_time_ms: 1705327852_100,
            stop_time_ms: 1705327860_400,
            length: 6.4,
            call_length_ms: 6400,
            talkgroup: 101,
            talkgroup_alpha_tag: "PD Dispatch".to_string(),
            talkgroup_tag: "Law Enforcement".to_string(),
            talkgroup_group: "Police".to_string(),
            audio_type: AudioType::Analog,
            short_name: "pd".to_string(),
            color_code: 0,
            status_filename: dir.join("call.json"),
            transmission_source_list: vec![CallSource {
                source: 7777,
                time: 1705327852,
                position: 0.0,
                emergency: false,
                signal_system: String::new(),
                tag: "Engine 1".to_string(),
            }],
            transmission_error_list: vec![CallError {
                time: 1705327852,
                position: 0.0,
                total_len: 6.4,
                error_count: 2,
                spike_count: 1,
            }],
            ..CallData::default()
        }
    }

    #[tokio::test]
    async fn test_sidecar_contents() {
        let dir = tempfile::tempdir().unwrap();
        let mut call = sample_call(dir.path());

        write_call_json(&mut call).await.unwrap();

        let body = std::fs::read_to_string(dir.path().join("call.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(value["freq"], 851012500);
        assert_eq!(value["talkgroup"], 101);
        assert_eq!(value["talkgroup_tag"], "PD Dispatch");
        assert_eq!(value["talkgroup_group_tag"], "Law Enforcement");
        assert_eq!(value["emergency"], 0);
        assert_eq!(value["call_length"], 6);
        assert_eq!(value["call_length_ms"], 6400);
        assert_eq!(value["audio_type"], "analog");
        assert_eq!(value["freqList"][0]["error_count"], 2);
        assert_eq!(value["srcList"][0]["src"], 7777);
        assert_eq!(value["srcList"][0]["tag"], "Engine 1");
        // No patched talkgroups key when there is at most one
        assert!(value.get("patched_talkgroups").is_none());
        // Snapshot stored back on the call
        assert_eq!(call.call_json, Some(value));
    }

    #[tokio::test]
    async fn test_sidecar_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut call = sample_call(dir.path());

        write_call_json(&mut call).await.unwrap();
        let body = std::fs::read_to_string(dir.path().join("call.json")).unwrap();

        let order = [
            "\"freq\"",
            "\"freq_error\"",
            "\"signal\"",
            "\"noise\"",
            "\"source_num\"",
            "\"recorder_num\"",
            "\"tdma_slot\"",
            "\"phase2_tdma\"",
            "\"start_time\"",
            "\"stop_time\"",
            "\"start_time_ms\"",
            "\"stop_time_ms\"",
            "\"emergency\"",
            "\"priority\"",
            "\"mode\"",
            "\"duplex\"",
            "\"encrypted\"",
            "\"call_length\"",
            "\"call_length_ms\"",
            "\"talkgroup\"",
            "\"talkgroup_tag\"",
            "\"talkgroup_description\"",
            "\"talkgroup_group_tag\"",
            "\"talkgroup_group\"",
            "\"color_code\"",
            "\"audio_type\"",
            "\"short_name\"",
            "\"freqList\"",
            "\"srcList\"",
        ];
        let mut last = 0;
        for key in order {
            let at = body.find(key).unwrap_or_else(|| panic!("missing {key}"));
            assert!(at > last || last == 0, "{key} out of order");
            last = at;
        }
    }

    #[tokio::test]
    async fn test_patched_talkgroups_emitted_when_multiple() {
        let dir = tempfile::tempdir().unwrap();
        let mut call = sample_call(dir.path());
        call.patched_talkgroups = vec![0x1230, 0x4560];

        write_call_json(&mut call).await.unwrap();
        let body = std::fs::read_to_string(dir.path().join("call.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["patched_talkgroups"], serde_json::json!([0x1230, 0x4560]));
    }

    #[tokio::test]
    async fn test_positions_rounded_to_two_decimals() {
        let dir = tempfile::tempdir().unwrap();
        let mut call = sample_call(dir.path());
        call.transmission_source_list[0].position = 1.23456;
        call.transmission_error_list[0].position = 1.23456;

        write_call_json(&mut call).await.unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("call.json")).unwrap())
                .unwrap();
        assert_eq!(value["srcList"][0]["pos"], 1.23);
        assert_eq!(value["freqList"][0]["pos"], 1.23);
    }

    #[tokio::test]
    async fn test_unwritable_path_is_an_error() {
        let mut call = sample_call(std::path::Path::new("/nonexistent-dir"));
        let result = write_call_json(&mut call).await;
        assert!(matches!(result, Err(ConcluderError::SidecarWrite { .. })));
    }
}
