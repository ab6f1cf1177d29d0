//! Call aggregation
//!
//! Turns the recorder's per-transmission view of a finished call into one
//! [`CallData`] record: filters out transmissions below the minimum
//! duration, accumulates the playable timeline, tracks the wall-clock
//! window, resolves catalog metadata, and generates the output filenames.

use crate::error::ConcluderResult;
use chrono::{Datelike, Local, TimeZone};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use trunkscan_core::types::{AudioType, CallError, CallSource};
use trunkscan_core::{
    CallData, CallStatus, Config, SystemConfig, TalkgroupCatalog, Transmission,
    expand_filename_format,
};

/// A finished call as handed over by the call controller
#[derive(Debug, Clone)]
pub struct FinishedCall {
    /// Recorder-assigned call number
    pub call_num: u64,

    /// Index of the system the call belongs to
    pub sys_num: i32,

    /// Talkgroup the call was recorded on
    pub talkgroup: u32,

    /// Preformatted talkgroup display string
    pub talkgroup_display: String,

    /// Voice channel frequency, Hz
    pub freq: f64,

    /// Measured frequency error, Hz
    pub freq_error: f64,

    /// Signal level, dB
    pub signal: f64,

    /// Noise level, dB
    pub noise: f64,

    /// Source (SDR) number that fed the recorder
    pub source_num: i32,

    /// Recorder number that produced the audio
    pub recorder_num: i32,

    /// Encrypted call
    pub encrypted: bool,

    /// Emergency call
    pub emergency: bool,

    /// Call priority
    pub priority: i32,

    /// Digital (true) or analog (false) voice
    pub mode: bool,

    /// Full duplex call
    pub duplex: bool,

    /// TDMA slot, -1 when not applicable
    pub tdma_slot: i32,

    /// Phase 2 TDMA call
    pub phase2_tdma: bool,

    /// Analog FM recording
    pub is_analog: bool,

    /// The call was superseded by a newer one while still monitoring
    pub superseded: bool,

    /// Recorder start time, milliseconds
    pub start_time_ms: i64,

    /// Directory recordings are written under
    pub capture_dir: PathBuf,

    /// Recorded transmissions, in order
    pub transmissions: Vec<Transmission>,
}

/// Build the call record from a finished call
///
/// # Errors
///
/// Returns an error when the output directory tree cannot be created.
pub fn build_call_data(
    call: &FinishedCall,
    sys: &SystemConfig,
    config: &Config,
    catalog: &dyn TalkgroupCatalog,
) -> ConcluderResult<CallData> {
    let mut call_info = CallData {
        status: CallStatus::Initial,
        process_call_time: chrono::Utc::now().timestamp(),
        call_num: call.call_num,
        sys_num: call.sys_num,
        short_name: sys.short_name.clone(),
        talkgroup: call.talkgroup,
        talkgroup_display: call.talkgroup_display.clone(),
        patched_talkgroups: catalog.patched_talkgroups(call.talkgroup),
        freq: call.freq,
        freq_error: call.freq_error,
        signal: call.signal,
        noise: call.noise,
        source_num: call.source_num,
        recorder_num: call.recorder_num,
        encrypted: call.encrypted,
        emergency: call.emergency,
        priority: call.priority,
        mode: call.mode,
        duplex: call.duplex,
        tdma_slot: call.tdma_slot,
        phase2_tdma: call.phase2_tdma,
        compress_wav: sys.compress_wav,
        call_log: sys.call_log,
        audio_archive: sys.audio_archive,
        transmission_archive: sys.transmission_archive,
        archive_files_on_failure: config.archive_files_on_failure,
        upload_script: sys.upload_script.clone(),
        ..CallData::default()
    };

    if let Some(entry) = catalog.find_talkgroup(call.talkgroup) {
        call_info.talkgroup_tag = entry.tag;
        call_info.talkgroup_alpha_tag = entry.alpha_tag;
        call_info.talkgroup_description = entry.description;
        call_info.talkgroup_group = entry.group;
    }

    call_info.audio_type = if call.is_analog {
        AudioType::Analog
    } else if call.phase2_tdma {
        AudioType::DigitalTdma
    } else {
        AudioType::Digital
    };

    aggregate_transmissions(&mut call_info, &call.transmissions, sys, catalog);
    build_filenames(&mut call_info, call, sys, config)?;

    Ok(call_info)
}

/// Filter, accumulate, and index the transmissions
fn aggregate_transmissions(
    call_info: &mut CallData,
    transmissions: &[Transmission],
    sys: &SystemConfig,
    catalog: &dyn TalkgroupCatalog,
) {
    let min_tx_s = sys.min_tx_duration;

    let mut playable_pos_s = 0.0;
    let mut audio_sum_ms: i64 = 0;
    let mut have_any = false;
    let mut min_start_ms = 0i64;
    let mut max_stop_ms = 0i64;

    call_info.transmission_list = Vec::with_capacity(transmissions.len());
    call_info.transmission_source_list = Vec::with_capacity(transmissions.len());
    call_info.transmission_error_list = Vec::with_capacity(transmissions.len());

    for t in transmissions {
        let seg_ms = (t.stop_time_ms - t.start_time_ms).max(0);
        let seg_len_s = seg_ms as f64 / 1000.0;

        if seg_len_s < min_tx_s {
            if !call_info.transmission_archive {
                info!(
                    min = min_tx_s,
                    length = seg_len_s,
                    file = %t.filename.display(),
                    "removing transmission below minimum duration"
                );
                call_info.min_transmissions_removed += 1;
                if t.filename.is_file() {
                    if let Err(e) = std::fs::remove_file(&t.filename) {
                        warn!(file = %t.filename.display(), error = %e, "could not remove transmission");
                    }
                }
            }
            continue;
        }

        if have_any {
            min_start_ms = min_start_ms.min(t.start_time_ms);
            max_stop_ms = max_stop_ms.max(t.stop_time_ms);
        } else {
            have_any = true;
            min_start_ms = t.start_time_ms;
            max_stop_ms = t.stop_time_ms;
        }

        let tag = catalog.find_unit_tag(t.source).unwrap_or_default();

        if t.error_count == 0 {
            info!(src = t.source, tag, pos = playable_pos_s, length = seg_len_s, "transmission");
        } else {
            info!(
                src = t.source,
                tag,
                pos = playable_pos_s,
                length = seg_len_s,
                errors = t.error_count,
                spikes = t.spike_count,
                "transmission"
            );
        }

        // Adopt the first color code seen; later disagreements are worth a
        // warning but do not change the adopted value.
        if t.color_code != -1 {
            if call_info.color_code == -1 {
                call_info.color_code = t.color_code;
            } else if call_info.color_code != t.color_code {
                warn!(
                    adopted = call_info.color_code,
                    current = t.color_code,
                    "call has multiple color codes"
                );
            }
        }

        if call_info.talkgroup != t.talkgroup {
            warn!(
                call_talkgroup = call_info.talkgroup,
                transmission_talkgroup = t.talkgroup,
                "transmission has a different talkgroup than the call"
            );
            call_info.talkgroup = t.talkgroup;
        }

        call_info.transmission_source_list.push(CallSource {
            source: t.source,
            time: t.start_time,
            position: playable_pos_s,
            emergency: false,
            signal_system: String::new(),
            tag,
        });
        call_info.transmission_error_list.push(CallError {
            time: t.start_time,
            position: playable_pos_s,
            total_len: seg_len_s,
            error_count: t.error_count,
            spike_count: t.spike_count,
        });

        call_info.error_count += t.error_count;
        call_info.spike_count += t.spike_count;

        playable_pos_s += seg_len_s;
        audio_sum_ms += seg_ms;

        call_info.transmission_list.push(t.clone());
    }

    if have_any {
        call_info.start_time_ms = min_start_ms;
        call_info.stop_time_ms = max_stop_ms;
        call_info.start_time = min_start_ms / 1000;
        call_info.stop_time = max_stop_ms / 1000;
        call_info.call_length_ms = audio_sum_ms;
        call_info.length = audio_sum_ms as f64 / 1000.0;
    }
}

/// Generate the audio, sidecar, and converted filenames, creating the
/// directory tree they live in. Run after the rest of the record is
/// populated so a custom template can reference any field.
fn build_filenames(
    call_info: &mut CallData,
    call: &FinishedCall,
    sys: &SystemConfig,
    config: &Config,
) -> ConcluderResult<()> {
    let start_ms = call.start_time_ms;
    let work_start_time = start_ms / 1000;

    // System-level format overrides the top-level one
    let filename_format = sys
        .filename_format
        .as_deref()
        .or(config.filename_format.as_deref());

    let base = if let Some(format) = filename_format {
        let expanded = expand_filename_format(format, call_info, work_start_time);
        let base = call.capture_dir.join(expanded);
        if let Some(parent) = base.parent() {
            std::fs::create_dir_all(parent)?;
        }
        base
    } else {
        // Legacy layout: <capture>/<short>/<YYYY>/<M>/<D>/<tg>-<sec>.<ms>_<freq>[.<slot>]
        let local = Local
            .timestamp_opt(work_start_time, 0)
            .single()
            .unwrap_or_default();
        let base_path = call
            .capture_dir
            .join(&sys.short_name)
            .join(local.year().to_string())
            .join(local.month().to_string())
            .join(local.day().to_string());
        std::fs::create_dir_all(&base_path)?;

        let stamp = format!("{}.{:03}", start_ms / 1000, start_ms % 1000);
        let freq = call.freq.round() as i64;
        let name = if call.tdma_slot == -1 {
            format!("{}-{}_{}", call_info.talkgroup, stamp, freq)
        } else {
            format!("{}-{}_{}.{}", call_info.talkgroup, stamp, freq, call.tdma_slot)
        };
        base_path.join(name)
    };

    call_info.filename = with_call_suffix(&base, call.call_num, "wav");
    call_info.status_filename = with_call_suffix(&base, call.call_num, "json");
    call_info.converted = with_call_suffix(&base, call.call_num, "m4a");

    Ok(())
}

fn with_call_suffix(base: &Path, call_num: u64, extension: &str) -> PathBuf {
    PathBuf::from(format!("{}-call_{call_num}.{extension}", base.display()))
}

#[cfg(test)]
#[allow(clippy::unreadable_literal)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use trunkscan_core::types::{EmptyCatalog, TalkgroupEntry};

    fn transmission(
        dir: &Path,
        name: &str,
        start_ms: i64,
        stop_ms: i64,
        talkgroup: u32,
    ) -> Transmission {
        let filename = dir.join(name);
        std::fs::write(&filename, b"RIFF").unwrap();
        Transmission {
            filename,
            source: 7777,
            start_time: start_ms / 1000,
            stop_time: stop_ms / 1000,
            start_time_ms: start_ms,
            stop_time_ms: stop_ms,
            error_count: 0,
            spike_count: 0,
            talkgroup,
            color_code: -1,
        }
    }

    fn finished_call(dir: &Path, transmissions: Vec<Transmission>) -> FinishedCall {
        FinishedCall {
            call_num: 9,
            sys_num: 0,
            talkgroup: 101,
            talkgroup_display: "101".to_string(),
            freq: 851_012_500.0,
            freq_error: 0.0,
            signal: -40.0,
            noise: -95.0,
            source_num: 0,
            recorder_num: 2,
            encrypted: false,
            emergency: false,
            priority: 3,
            mode: false,
            duplex: false,
            tdma_slot: -1,
            phase2_tdma: false,
            is_analog: true,
            superseded: false,
            start_time_ms: 1705327852_000,
            capture_dir: dir.to_path_buf(),
            transmissions,
        }
    }

    struct OneEntryCatalog;

    impl TalkgroupCatalog for OneEntryCatalog {
        fn find_talkgroup(&self, talkgroup: u32) -> Option<TalkgroupEntry> {
            (talkgroup == 101).then(|| TalkgroupEntry {
                tag: "Law Enforcement".to_string(),
                alpha_tag: "PD Dispatch".to_string(),
                description: "Police dispatch".to_string(),
                group: "Police".to_string(),
            })
        }

        fn find_unit_tag(&self, unit: i64) -> Option<String> {
            (unit == 7777).then(|| "Engine 1".to_string())
        }

        fn patched_talkgroups(&self, _talkgroup: u32) -> Vec<u32> {
            Vec::new()
        }
    }

    #[test]
    fn test_min_duration_filter_removes_short_transmissions() {
        let dir = tempfile::tempdir().unwrap();
        let short = transmission(dir.path(), "t1.wav", 0, 300, 101);
        let long = transmission(dir.path(), "t2.wav", 1000, 3000, 101);
        let short_path = short.filename.clone();
        let long_path = long.filename.clone();

        let sys = SystemConfig {
            short_name: "pd".to_string(),
            min_tx_duration: 1.0,
            transmission_archive: false,
            ..SystemConfig::default()
        };
        let call = finished_call(dir.path(), vec![short, long]);

        let call_info =
            build_call_data(&call, &sys, &Config::default(), &EmptyCatalog).unwrap();

        assert!(!short_path.exists(), "short transmission deleted from disk");
        assert!(long_path.exists());
        assert_eq!(call_info.min_transmissions_removed, 1);
        assert_eq!(call_info.transmission_list.len(), 1);
        assert_eq!(call_info.length, 2.0);
        assert_eq!(call_info.call_length_ms, 2000);
        assert_eq!(call_info.start_time_ms, 1000);
        assert_eq!(call_info.stop_time_ms, 3000);
    }

    #[test]
    fn test_min_duration_filter_keeps_files_when_archiving() {
        let dir = tempfile::tempdir().unwrap();
        let short = transmission(dir.path(), "t1.wav", 0, 300, 101);
        let short_path = short.filename.clone();

        let sys = SystemConfig {
            short_name: "pd".to_string(),
            min_tx_duration: 1.0,
            transmission_archive: true,
            ..SystemConfig::default()
        };
        let call = finished_call(dir.path(), vec![short]);

        let call_info =
            build_call_data(&call, &sys, &Config::default(), &EmptyCatalog).unwrap();

        // The segment is still dropped from the list, but nothing is
        // deleted or counted as removed.
        assert!(short_path.exists());
        assert_eq!(call_info.min_transmissions_removed, 0);
        assert!(call_info.transmission_list.is_empty());
    }

    #[test]
    fn test_playable_timeline_and_wall_clock_window() {
        let dir = tempfile::tempdir().unwrap();
        // Two transmissions with a 5 s gap between them
        let t1 = transmission(dir.path(), "t1.wav", 0, 2000, 101);
        let t2 = transmission(dir.path(), "t2.wav", 7000, 10000, 101);

        let sys = SystemConfig {
            short_name: "pd".to_string(),
            ..SystemConfig::default()
        };
        let call = finished_call(dir.path(), vec![t1, t2]);

        let call_info =
            build_call_data(&call, &sys, &Config::default(), &EmptyCatalog).unwrap();

        // Playable length is the sum of segments; the wall-clock span is
        // larger because of the gap.
        assert_eq!(call_info.call_length_ms, 5000);
        assert_eq!(call_info.stop_time_ms - call_info.start_time_ms, 10000);
        assert!(
            call_info.stop_time_ms - call_info.start_time_ms >= call_info.call_length_ms
        );

        // The second segment starts where the first ends on the playable
        // timeline, not at its wall-clock position.
        assert_eq!(call_info.transmission_source_list[0].position, 0.0);
        assert_eq!(call_info.transmission_source_list[1].position, 2.0);
        assert_eq!(call_info.transmission_error_list[1].position, 2.0);
        assert_eq!(call_info.transmission_error_list[1].total_len, 3.0);
    }

    #[test]
    fn test_catalog_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = transmission(dir.path(), "t1.wav", 0, 2000, 101);

        let sys = SystemConfig {
            short_name: "pd".to_string(),
            ..SystemConfig::default()
        };
        let call = finished_call(dir.path(), vec![t1]);

        let call_info =
            build_call_data(&call, &sys, &Config::default(), &OneEntryCatalog).unwrap();

        assert_eq!(call_info.talkgroup_alpha_tag, "PD Dispatch");
        assert_eq!(call_info.talkgroup_group, "Police");
        assert_eq!(call_info.transmission_source_list[0].tag, "Engine 1");
    }

    #[test]
    fn test_missing_catalog_yields_empty_strings() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = transmission(dir.path(), "t1.wav", 0, 2000, 101);
        let sys = SystemConfig {
            short_name: "pd".to_string(),
            ..SystemConfig::default()
        };
        let call = finished_call(dir.path(), vec![t1]);

        let call_info =
            build_call_data(&call, &sys, &Config::default(), &EmptyCatalog).unwrap();

        assert_eq!(call_info.talkgroup_alpha_tag, "");
        assert_eq!(call_info.talkgroup_description, "");
        assert_eq!(call_info.transmission_source_list[0].tag, "");
    }

    #[test]
    fn test_color_code_adoption() {
        let dir = tempfile::tempdir().unwrap();
        let mut t1 = transmission(dir.path(), "t1.wav", 0, 2000, 101);
        let mut t2 = transmission(dir.path(), "t2.wav", 2000, 4000, 101);
        let mut t3 = transmission(dir.path(), "t3.wav", 4000, 6000, 101);
        t1.color_code = -1;
        t2.color_code = 5;
        t3.color_code = 7; // disagrees; adopted value stays 5

        let sys = SystemConfig {
            short_name: "pd".to_string(),
            ..SystemConfig::default()
        };
        let call = finished_call(dir.path(), vec![t1, t2, t3]);

        let call_info =
            build_call_data(&call, &sys, &Config::default(), &EmptyCatalog).unwrap();
        assert_eq!(call_info.color_code, 5);
    }

    #[test]
    fn test_talkgroup_mismatch_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = transmission(dir.path(), "t1.wav", 0, 2000, 101);
        let t2 = transmission(dir.path(), "t2.wav", 2000, 4000, 202);

        let sys = SystemConfig {
            short_name: "pd".to_string(),
            ..SystemConfig::default()
        };
        let call = finished_call(dir.path(), vec![t1, t2]);

        let call_info =
            build_call_data(&call, &sys, &Config::default(), &EmptyCatalog).unwrap();
        assert_eq!(call_info.talkgroup, 202);
    }

    #[test]
    fn test_legacy_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = transmission(dir.path(), "t1.wav", 1705327852_000, 1705327854_000, 101);
        let sys = SystemConfig {
            short_name: "pd".to_string(),
            ..SystemConfig::default()
        };
        let call = finished_call(dir.path(), vec![t1]);

        let call_info =
            build_call_data(&call, &sys, &Config::default(), &EmptyCatalog).unwrap();

        let name = call_info.filename.to_string_lossy().to_string();
        assert!(name.starts_with(&dir.path().join("pd").to_string_lossy().to_string()));
        assert!(name.ends_with("-call_9.wav"));
        assert!(name.contains("101-1705327852.000_851012500"));
        assert!(call_info.filename.parent().unwrap().is_dir());
        assert_eq!(
            call_info.status_filename.extension().unwrap().to_str(),
            Some("json")
        );
        assert_eq!(
            call_info.converted.extension().unwrap().to_str(),
            Some("m4a")
        );
    }

    #[test]
    fn test_legacy_filenames_with_tdma_slot() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = transmission(dir.path(), "t1.wav", 1705327852_000, 1705327854_000, 101);
        let sys = SystemConfig {
            short_name: "pd".to_string(),
            ..SystemConfig::default()
        };
        let mut call = finished_call(dir.path(), vec![t1]);
        call.tdma_slot = 1;

        let call_info =
            build_call_data(&call, &sys, &Config::default(), &EmptyCatalog).unwrap();
        assert!(
            call_info
                .filename
                .to_string_lossy()
                .contains("_851012500.1-call_9.wav")
        );
    }

    #[test]
    fn test_template_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let t1 = transmission(dir.path(), "t1.wav", 1705327852_000, 1705327854_000, 101);
        let sys = SystemConfig {
            short_name: "pd".to_string(),
            filename_format: Some("{short_name}/{talkgroup}/{epoch}".to_string()),
            ..SystemConfig::default()
        };
        let call = finished_call(dir.path(), vec![t1]);

        let call_info =
            build_call_data(&call, &sys, &Config::default(), &EmptyCatalog).unwrap();

        assert_eq!(
            call_info.filename,
            dir.path().join("pd/101/1705327852-call_9.wav")
        );
        assert!(call_info.filename.parent().unwrap().is_dir());
    }

    #[test]
    fn test_empty_call_has_zeroed_timing() {
        let dir = tempfile::tempdir().unwrap();
        let sys = SystemConfig {
            short_name: "pd".to_string(),
            ..SystemConfig::default()
        };
        let call = finished_call(dir.path(), Vec::new());

        let call_info =
            build_call_data(&call, &sys, &Config::default(), &EmptyCatalog).unwrap();

        assert_eq!(call_info.length, 0.0);
        assert_eq!(call_info.start_time_ms, 0);
        assert_eq!(call_info.stop_time_ms, 0);
        assert_eq!(call_info.call_length_ms, 0);
        assert!(call_info.transmission_list.is_empty());
    }
}
