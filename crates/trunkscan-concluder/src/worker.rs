//! Per-call post-processing worker
//!
//! One worker owns one call from dispatch to terminal status. The file
//! operations within a worker are strictly sequenced: combine, sidecar,
//! transcode, upload script, plugin hooks, cleanup.

use crate::exec;
use crate::plugin::PluginRegistry;
use crate::sidecar;
use chrono::{Local, TimeZone};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};
use trunkscan_core::{CallData, CallStatus};

/// `ctime(3)`-style date string used for the AAC metadata
fn ctime_string(epoch: i64) -> String {
    Local
        .timestamp_opt(epoch, 0)
        .single()
        .map(|t| t.format("%a %b %e %H:%M:%S %Y").to_string())
        .unwrap_or_default()
}

/// Process one call to a terminal or retry status, returning the owned
/// record to the supervisor.
pub async fn upload_call_worker(mut call_info: CallData, plugins: Arc<PluginRegistry>) -> CallData {
    if call_info.status == CallStatus::Initial {
        let files: Vec<&Path> = call_info
            .transmission_list
            .iter()
            .filter_map(|t| {
                if t.filename.is_file() {
                    Some(t.filename.as_path())
                } else {
                    error!(
                        file = %t.filename.display(),
                        "transmission file does not exist, not passing it to sox"
                    );
                    None
                }
            })
            .collect();

        if files.is_empty() {
            warn!("no transmission files to combine");
        } else if let Err(e) = exec::combine_wav(&files, &call_info.filename).await {
            // The sidecar and plugins still run; uploaders that need the
            // audio will fail and drive the retry path.
            error!(
                error = %e,
                "failed to combine recordings, make sure sox and fdkaac are installed"
            );
        }

        if let Err(e) = sidecar::write_call_json(&mut call_info).await {
            error!(error = %e, "failed to write call metadata");
            call_info.status = CallStatus::Failed;
            return call_info;
        }

        if call_info.compress_wav {
            let title = if call_info.talkgroup_alpha_tag.is_empty() {
                call_info.talkgroup.to_string()
            } else {
                call_info.talkgroup_alpha_tag.clone()
            };
            if let Err(e) = exec::convert_media(
                &call_info.filename,
                &call_info.converted,
                &ctime_string(call_info.start_time),
                &call_info.short_name,
                &title,
            )
            .await
            {
                error!(error = %e, "failed to convert call recording");
                call_info.status = CallStatus::Failed;
                return call_info;
            }
        }

        if let Some(script) = call_info.upload_script.clone()
            && !script.is_empty()
        {
            info!(script, call = call_info.call_num, "running upload script");
            if let Err(e) = exec::run_upload_script(
                &script,
                &call_info.filename,
                &call_info.status_filename,
                &call_info.converted,
            )
            .await
            {
                warn!(error = %e, "upload script failed");
            }
        }
    }

    if plugins.call_end(&call_info) == 0 {
        remove_call_files(&call_info, false);
        call_info.status = CallStatus::Success;
    } else {
        call_info.status = CallStatus::Retry;
    }

    call_info
}

fn remove_if_file(path: &Path) {
    if path.is_file()
        && let Err(e) = std::fs::remove_file(path)
    {
        warn!(file = %path.display(), error = %e, "could not remove file");
    }
}

/// Apply the archive/delete policy to a call's artifacts
///
/// With `audio_archive` (or a terminal upload failure under
/// `archive_files_on_failure`) the combined audio is kept and the
/// per-transmission temp files are deleted, after copying them into the
/// capture directory when `transmission_archive` asks for it. Otherwise
/// everything goes. The sidecar survives when `call_log` is set, or when a
/// failed call is being archived.
pub fn remove_call_files(call_info: &CallData, plugin_failure: bool) {
    if plugin_failure {
        if call_info.archive_files_on_failure {
            error!(
                call = call_info.call_num,
                attempts = call_info.retry_attempt,
                "upload failed, archiving files"
            );
        } else {
            error!(
                call = call_info.call_num,
                attempts = call_info.retry_attempt,
                "upload failed, removing files"
            );
        }
    }

    let archive = call_info.audio_archive || (plugin_failure && call_info.archive_files_on_failure);

    if archive {
        if call_info.transmission_archive {
            // Move the transmission files into the capture directory,
            // keeping their filenames.
            for t in &call_info.transmission_list {
                if t.filename.is_file()
                    && let Some(name) = t.filename.file_name()
                {
                    let target = call_info.filename.with_file_name(name);
                    if let Err(e) = std::fs::copy(&t.filename, &target) {
                        error!(
                            file = %t.filename.display(),
                            target = %target.display(),
                            error = %e,
                            "could not archive transmission"
                        );
                    }
                }
            }
        }
        for t in &call_info.transmission_list {
            remove_if_file(&t.filename);
        }
    } else {
        remove_if_file(&call_info.filename);
        remove_if_file(&call_info.converted);
        for t in &call_info.transmission_list {
            remove_if_file(&t.filename);
        }
    }

    if !call_info.call_log && !(plugin_failure && call_info.archive_files_on_failure) {
        remove_if_file(&call_info.status_filename);
    }
}
