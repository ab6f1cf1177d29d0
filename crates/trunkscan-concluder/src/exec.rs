//! External tool invocation
//!
//! Audio combine and transcode run through `sox` and `fdkaac` as shell
//! commands, the same way a user would run them; the upload script is
//! whatever the user configured. Exit status zero is success, anything else
//! is a failure.

use crate::error::{ConcluderError, ConcluderResult};
use std::path::Path;
use tokio::process::Command;
use tracing::{debug, trace};

/// Run a shell command line, mapping a nonzero or signal exit to an error
async fn run_shell(command: &str) -> ConcluderResult<()> {
    let status = Command::new("sh").arg("-c").arg(command).status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(ConcluderError::CommandFailed {
            command: command.to_string(),
            status: status.code().unwrap_or(-1),
        })
    }
}

/// Concatenate the transmission files into a single wav
///
/// # Errors
///
/// Returns [`ConcluderError::CommandFailed`] when `sox` exits nonzero, or
/// an I/O error when it cannot be spawned.
pub async fn combine_wav(files: &[&Path], target: &Path) -> ConcluderResult<()> {
    let mut file_args = String::new();
    for file in files {
        file_args.push_str(&format!("'{}' ", file.display()));
    }
    let command = format!("sox {file_args}'{}'", target.display());

    debug!(target = %target.display(), files = files.len(), "combining transmissions");
    trace!(command, "sox command");
    run_shell(&command).await
}

/// Transcode a wav to AAC with embedded title metadata
///
/// # Errors
///
/// Returns [`ConcluderError::CommandFailed`] when the pipeline exits
/// nonzero, or an I/O error when it cannot be spawned.
pub async fn convert_media(
    source: &Path,
    converted: &Path,
    date: &str,
    short_name: &str,
    title: &str,
) -> ConcluderResult<()> {
    let command = format!(
        "sox '{}' --norm=-.01 -t wav - | fdkaac --silent -p 2 --date '{date}' --artist '{short_name}' --title '{title}' --moov-before-mdat --ignorelength -b 8000 -o '{}' -",
        source.display(),
        converted.display()
    );

    trace!(converted = %converted.display(), command, "converting call audio");
    run_shell(&command).await
}

/// Invoke the user upload script with the three artifact paths
///
/// # Errors
///
/// Returns [`ConcluderError::CommandFailed`] when the script exits nonzero,
/// or an I/O error when it cannot be spawned.
pub async fn run_upload_script(
    script: &str,
    audio: &Path,
    sidecar: &Path,
    converted: &Path,
) -> ConcluderResult<()> {
    let command = format!(
        "{script} '{}' '{}' '{}'",
        audio.display(),
        sidecar.display(),
        converted.display()
    );

    debug!(command, "running upload script");
    run_shell(&command).await
}
