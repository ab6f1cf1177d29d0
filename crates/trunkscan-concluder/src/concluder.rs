//! Call concluder supervisor
//!
//! Owns the worker pool and the retry list for the whole process. Each
//! finished call is aggregated and dispatched to its own task; a periodic
//! non-blocking poll reaps finished workers, schedules retries with
//! exponential backoff, and re-dispatches retries whose time has come.

use crate::aggregate::{FinishedCall, build_call_data};
use crate::error::ConcluderResult;
use crate::plugin::PluginRegistry;
use crate::worker::{remove_call_files, upload_call_worker};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};
use trunkscan_core::{CallData, CallStatus, Config, SystemConfig, TalkgroupCatalog};

/// Upload attempts beyond the first before a call is declared failed
pub const MAX_RETRY: u32 = 2;

/// Supervisor for call post-processing workers
#[derive(Debug)]
pub struct CallConcluder {
    workers: Vec<JoinHandle<CallData>>,
    retry_list: Vec<CallData>,
    plugins: Arc<PluginRegistry>,
}

impl CallConcluder {
    /// Create a supervisor with the given plugin registry
    #[must_use]
    pub fn new(plugins: PluginRegistry) -> Self {
        Self {
            workers: Vec::new(),
            retry_list: Vec::new(),
            plugins: Arc::new(plugins),
        }
    }

    /// Aggregate a finished call and dispatch it for post-processing
    ///
    /// Superseded, encrypted, empty, and too-short calls are resolved here
    /// without ever reaching a worker.
    ///
    /// # Errors
    ///
    /// Returns an error when the output directory tree cannot be created.
    pub async fn conclude_call(
        &mut self,
        call: &FinishedCall,
        sys: &SystemConfig,
        config: &Config,
        catalog: &dyn TalkgroupCatalog,
    ) -> ConcluderResult<()> {
        let mut call_info = build_call_data(call, sys, config, catalog)?;

        if call.superseded {
            info!(call = call_info.call_num, "call was superseded, removing files");
            remove_call_files(&call_info, false);
            return Ok(());
        }

        // Encrypted calls without keys: leave the metadata when anything
        // was recorded, never dispatch an upload.
        if call_info.encrypted {
            if !call_info.transmission_list.is_empty() || call_info.min_transmissions_removed > 0 {
                if let Err(e) = crate::sidecar::write_call_json(&mut call_info).await {
                    error!(error = %e, "failed to create metadata for encrypted call");
                }
            }
            remove_call_files(&call_info, false);
            return Ok(());
        }

        if call_info.transmission_list.is_empty() {
            if call_info.min_transmissions_removed == 0 {
                error!(call = call_info.call_num, "no transmissions were recorded");
            } else {
                info!(
                    call = call_info.call_num,
                    removed = call_info.min_transmissions_removed,
                    min = sys.min_tx_duration,
                    "no transmissions longer than the minimum were recorded"
                );
            }
            return Ok(());
        }

        if call_info.length <= sys.min_call_duration {
            info!(
                call = call_info.call_num,
                length = call_info.length,
                min = sys.min_call_duration,
                "call shorter than minimum duration"
            );
            remove_call_files(&call_info, false);
            return Ok(());
        }

        self.dispatch_call(call_info);
        Ok(())
    }

    /// Hand a prepared call record to its own worker task
    pub fn dispatch_call(&mut self, call_info: CallData) {
        let plugins = Arc::clone(&self.plugins);
        self.workers
            .push(tokio::spawn(upload_call_worker(call_info, plugins)));
    }

    /// Poll workers without blocking, schedule retries, and dispatch due
    /// retries. Call this once per main-loop iteration.
    pub async fn manage_workers(&mut self) {
        self.manage_workers_at(chrono::Utc::now().timestamp()).await;
    }

    /// [`Self::manage_workers`] against an explicit clock
    pub async fn manage_workers_at(&mut self, now: i64) {
        for call_info in self.reap_finished().await {
            self.handle_worker_result(call_info, now);
        }

        // Dispatch retries whose time has come
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .retry_list
            .drain(..)
            .partition(|call| call.process_call_time <= now);
        self.retry_list = waiting;
        for call in due {
            self.dispatch_call(call);
        }
    }

    /// Collect results of workers that already finished; never blocks on a
    /// running worker.
    async fn reap_finished(&mut self) -> Vec<CallData> {
        let mut finished = Vec::new();
        let mut remaining = Vec::new();
        for handle in self.workers.drain(..) {
            if handle.is_finished() {
                match handle.await {
                    Ok(call) => finished.push(call),
                    Err(e) => error!(error = %e, "call worker panicked"),
                }
            } else {
                remaining.push(handle);
            }
        }
        self.workers = remaining;
        finished
    }

    fn handle_worker_result(&mut self, mut call_info: CallData, now: i64) {
        if call_info.status != CallStatus::Retry {
            return;
        }

        call_info.retry_attempt += 1;
        if call_info.retry_attempt > MAX_RETRY {
            remove_call_files(&call_info, true);
            error!(
                call = call_info.call_num,
                attempts = call_info.retry_attempt,
                "failed to conclude call"
            );
        } else {
            let jitter = i64::from(rand::rng().random_range(0..10u32));
            let backoff = (1i64 << call_info.retry_attempt) * 60 + jitter;
            call_info.process_call_time = now + backoff;
            error!(
                call = call_info.call_num,
                attempt = call_info.retry_attempt,
                backoff,
                queued = self.retry_list.len() + 1,
                "call upload failed, will retry"
            );
            self.retry_list.push(call_info);
        }
    }

    /// Drain the pool before process exit
    ///
    /// Until the deadline, finished workers are reaped and anything on the
    /// retry path is re-dispatched immediately, bypassing the backoff. On
    /// timeout the pending retries get their file policy applied and any
    /// still-running workers are abandoned: their handles are dropped so
    /// the tasks detach, because joining could block forever on an external
    /// process. Returns true when fully drained.
    pub async fn shutdown(&mut self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;

        while tokio::time::Instant::now() < deadline {
            for mut call_info in self.reap_finished().await {
                if call_info.status == CallStatus::Retry {
                    call_info.retry_attempt += 1;
                    if call_info.retry_attempt > MAX_RETRY {
                        remove_call_files(&call_info, true);
                    } else {
                        self.dispatch_call(call_info);
                    }
                }
            }

            let queued: Vec<CallData> = self.retry_list.drain(..).collect();
            for call in queued {
                self.dispatch_call(call);
            }

            if self.workers.is_empty() && self.retry_list.is_empty() {
                return true;
            }

            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        for call in self.retry_list.drain(..) {
            remove_call_files(&call, true);
        }
        if !self.workers.is_empty() {
            error!(
                workers = self.workers.len(),
                timeout_s = timeout.as_secs(),
                "call concluder shutdown timed out, abandoning running workers"
            );
            self.workers.clear();
        }
        false
    }

    /// Number of workers still running or awaiting reaping
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Calls waiting for their retry time
    #[must_use]
    pub fn retry_queue(&self) -> &[CallData] {
        &self.retry_list
    }
}
