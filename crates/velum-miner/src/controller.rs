//! Public facade over the mining runtime
//!
//! `MinerRuntime` wires the worker and link tasks together, owns the
//! stored difficulty setting, and tracks the current request so a new
//! submission replaces an older in-flight one. One mining request is
//! current at a time; submitting another cancels its predecessor.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use velum_core::Tag;

use crate::channel::{
    create_link_channel, create_reply_channel, create_request_channel, create_status_channel,
    LinkCommand, LinkCommandSender, MinerEvent, MinerEventReceiver, MinerEventSender, RequestId,
};
use crate::config::{MinerConfig, SharedMinerConfig};
use crate::error::{MinerError, MinerResult};
use crate::link::WorkerLinkTask;
use crate::pow::{CancelFlag, MiningOutcome, MiningParams, MAX_DIFFICULTY};
use crate::scheduler::MiningScheduler;
use crate::worker::MiningWorkerTask;

// ----------------------------------------------------------------------------
// Current Job Tracking
// ----------------------------------------------------------------------------

struct CurrentJob {
    request_id: RequestId,
    cancel: CancelFlag,
}

// ----------------------------------------------------------------------------
// Miner Runtime
// ----------------------------------------------------------------------------

/// The mining runtime: task lifecycle, difficulty setting, and submission
/// entry point.
///
/// Construct with [`MinerRuntime::new`], call [`start`](Self::start) to
/// spawn the worker and link tasks, then submit messages through
/// [`create_pow_message`](Self::create_pow_message). Dropping the runtime
/// aborts its tasks if they are still running.
pub struct MinerRuntime {
    config: SharedMinerConfig,
    scheduler: MiningScheduler,
    difficulty: AtomicU8,
    current: Mutex<Option<CurrentJob>>,
    link_sender: LinkCommandSender,
    status_sender: MinerEventSender,
    status_receiver: Option<MinerEventReceiver>,
    pending_tasks: Option<(WorkerLinkTask, MiningWorkerTask)>,
    link_handle: Option<JoinHandle<MinerResult<()>>>,
    worker_handle: Option<JoinHandle<MinerResult<()>>>,
    // Shared with the scheduler so worker-planned requests downgrade to
    // inline while no tasks are consuming the channels
    running: Arc<AtomicBool>,
}

impl MinerRuntime {
    /// Create the runtime and its channel topology. No tasks run until
    /// [`start`](Self::start).
    pub fn new(config: MinerConfig) -> Self {
        let config: SharedMinerConfig = Arc::new(config);

        let (link_sender, link_receiver) = create_link_channel(&config);
        let (request_sender, request_receiver) = create_request_channel(&config);
        let (reply_sender, reply_receiver) = create_reply_channel(&config);
        let (status_sender, status_receiver) = create_status_channel(&config);

        let link = WorkerLinkTask::new(
            link_receiver,
            request_sender,
            reply_receiver,
            status_sender.clone(),
        );
        let worker = MiningWorkerTask::new(request_receiver, reply_sender);
        let running = Arc::new(AtomicBool::new(false));
        let scheduler = MiningScheduler::new(
            config.clone(),
            link_sender.clone(),
            status_sender.clone(),
            running.clone(),
        );
        let difficulty = AtomicU8::new(config.default_difficulty);

        Self {
            config,
            scheduler,
            difficulty,
            current: Mutex::new(None),
            link_sender,
            status_sender,
            status_receiver: Some(status_receiver),
            pending_tasks: Some((link, worker)),
            link_handle: None,
            worker_handle: None,
            running,
        }
    }

    /// Validate the configuration and spawn the worker and link tasks
    pub async fn start(&mut self) -> MinerResult<()> {
        if self.running.load(Ordering::Relaxed) {
            return Err(MinerError::configuration("runtime is already running"));
        }
        self.config
            .validate()
            .map_err(|reason| MinerError::Configuration { reason })?;

        let (mut link, mut worker) = self
            .pending_tasks
            .take()
            .ok_or_else(|| MinerError::configuration("runtime tasks were already consumed"))?;

        self.link_handle = Some(tokio::spawn(async move { link.run().await }));
        self.worker_handle = Some(tokio::spawn(async move { worker.run().await }));
        self.running.store(true, Ordering::Relaxed);

        info!(
            "Miner runtime started (default difficulty {}, worker threshold {})",
            self.config.default_difficulty, self.config.worker_threshold
        );
        Ok(())
    }

    /// Stop the runtime: tear down the link, which rejects pending handles
    /// and lets the worker wind down its searches
    pub async fn stop(&mut self) -> MinerResult<()> {
        if !self.running.load(Ordering::Relaxed) {
            return Ok(());
        }
        self.running.store(false, Ordering::Relaxed);

        let _ = self.link_sender.send(LinkCommand::Shutdown).await;

        if let Some(handle) = self.link_handle.take() {
            let _ = handle.await;
        }
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.await;
        }

        info!("Miner runtime stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Take the status event receiver. Can only be taken once.
    pub fn take_status_receiver(&mut self) -> Option<MinerEventReceiver> {
        self.status_receiver.take()
    }

    // ------------------------------------------------------------------------
    // Difficulty Setting
    // ------------------------------------------------------------------------

    /// The stored difficulty applied to requests that do not specify one
    pub fn difficulty(&self) -> u8 {
        self.difficulty.load(Ordering::Relaxed)
    }

    /// Update the stored difficulty, clamped to the identifier width
    pub fn set_difficulty(&self, difficulty: u8) {
        let clamped = difficulty.min(MAX_DIFFICULTY);
        self.difficulty.store(clamped, Ordering::Relaxed);
        debug!("Stored difficulty set to {}", clamped);
    }

    // ------------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------------

    /// Build, mine, and sign one gift-wrapped message.
    ///
    /// `difficulty` falls back to the stored setting when `None`. The call
    /// resolves exactly once: with the finalized event, with `Cancelled`,
    /// or with an error. Submitting while another request is in flight
    /// cancels the older request first.
    pub async fn create_pow_message(
        &self,
        sender_key: &[u8; 32],
        recipient: &[u8; 32],
        message: &str,
        difficulty: Option<u8>,
        extra_tags: Vec<Tag>,
    ) -> MinerResult<MiningOutcome> {
        let difficulty = difficulty
            .unwrap_or_else(|| self.difficulty())
            .min(MAX_DIFFICULTY);
        let request_id = RequestId::new();
        let cancel = CancelFlag::new();

        let params = MiningParams {
            sender_key: *sender_key,
            recipient: *recipient,
            message: message.to_string(),
            difficulty,
            extra_tags,
            wrap_tags: Vec::new(),
        };

        self.register_current(request_id, cancel.clone()).await;
        let _ = self
            .status_sender
            .try_send(MinerEvent::Started {
                request_id,
                difficulty,
            });
        info!(
            "Submitting mining request {} at difficulty {}",
            request_id, difficulty
        );

        let result = self.scheduler.execute(request_id, params, cancel).await;
        self.clear_current(request_id).await;

        match &result {
            Ok(MiningOutcome::Complete(event)) => {
                info!("Mining request {} complete: {}", request_id, event.id);
                let _ = self
                    .status_sender
                    .try_send(MinerEvent::Completed { request_id });
            }
            Ok(MiningOutcome::Cancelled) => {
                info!("Mining request {} cancelled", request_id);
                let _ = self
                    .status_sender
                    .try_send(MinerEvent::Cancelled { request_id });
            }
            Err(err) => {
                error!("Mining request {} failed: {}", request_id, err);
                let _ = self
                    .status_sender
                    .try_send(MinerEvent::Failed { request_id });
            }
        }

        result
    }

    /// Cancel the current in-flight request, if any. The pending call
    /// resolves with `Cancelled` once the search observes the flag.
    pub async fn cancel_current(&self) {
        let current = self.current.lock().await;
        match current.as_ref() {
            Some(job) => {
                info!("Cancelling mining request {}", job.request_id);
                job.cancel.cancel();
                // The local flag is inert for a dispatched job: the worker
                // mines under its own flag, so the routed cancel is the only
                // path that reaches it and must not be dropped on a full
                // channel
                if self
                    .link_sender
                    .send(LinkCommand::Cancel {
                        request_id: job.request_id,
                    })
                    .await
                    .is_err()
                {
                    debug!("Link gone, request {} was not dispatched", job.request_id);
                }
            }
            None => debug!("Cancel requested with no mining in flight"),
        }
    }

    /// Whether a request is currently in flight
    pub async fn is_mining(&self) -> bool {
        self.current.lock().await.is_some()
    }

    async fn register_current(&self, request_id: RequestId, cancel: CancelFlag) {
        let mut current = self.current.lock().await;
        if let Some(previous) = current.take() {
            debug!(
                "Request {} replaces in-flight request {}",
                request_id, previous.request_id
            );
            previous.cancel.cancel();
            if self
                .link_sender
                .send(LinkCommand::Cancel {
                    request_id: previous.request_id,
                })
                .await
                .is_err()
            {
                debug!(
                    "Link gone, request {} was not dispatched",
                    previous.request_id
                );
            }
        }
        *current = Some(CurrentJob { request_id, cancel });
    }

    async fn clear_current(&self, request_id: RequestId) {
        let mut current = self.current.lock().await;
        if current
            .as_ref()
            .map(|job| job.request_id == request_id)
            .unwrap_or(false)
        {
            *current = None;
        }
    }
}

impl Drop for MinerRuntime {
    fn drop(&mut self) {
        if self.running.load(Ordering::Relaxed) {
            if let Some(handle) = &self.link_handle {
                handle.abort();
            }
            if let Some(handle) = &self.worker_handle {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_difficulty_setting_is_clamped() {
        let runtime = MinerRuntime::new(MinerConfig::testing());
        assert_eq!(runtime.difficulty(), 2);

        runtime.set_difficulty(12);
        assert_eq!(runtime.difficulty(), 12);

        runtime.set_difficulty(200);
        assert_eq!(runtime.difficulty(), MAX_DIFFICULTY);
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_configuration() {
        let mut config = MinerConfig::testing();
        config.request_buffer_size = 0;

        let mut runtime = MinerRuntime::new(config);
        let result = runtime.start().await;
        assert!(matches!(result, Err(MinerError::Configuration { .. })));
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let mut runtime = MinerRuntime::new(MinerConfig::testing());
        runtime.start().await.unwrap();

        let result = runtime.start().await;
        assert!(matches!(result, Err(MinerError::Configuration { .. })));

        runtime.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_status_receiver_can_be_taken_once() {
        let mut runtime = MinerRuntime::new(MinerConfig::testing());
        assert!(runtime.take_status_receiver().is_some());
        assert!(runtime.take_status_receiver().is_none());
    }
}
