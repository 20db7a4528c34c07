//! Execution placement and timeout policy
//!
//! Each request is planned once: cheap searches run inline in the caller's
//! context, expensive ones go to the worker. Worker dispatch that fails
//! before any mining began falls back to inline execution; failures after
//! mining started do not re-run, so a request never mines twice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::channel::{LinkCommand, LinkCommandSender, MinerEvent, MinerEventSender, RequestId};
use crate::config::SharedMinerConfig;
use crate::error::{MinerError, MinerResult};
use crate::pow::{mine_gift_wrap, CancelFlag, MiningOutcome, MiningParams};

// ----------------------------------------------------------------------------
// Execution Plan
// ----------------------------------------------------------------------------

/// Where a mining request runs; chosen once per request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPlan {
    /// Run the search in the caller's context
    Inline,
    /// Dispatch the search to the worker context
    Worker,
}

// ----------------------------------------------------------------------------
// Mining Scheduler
// ----------------------------------------------------------------------------

/// Chooses the execution context for each request and enforces the
/// fallback and timeout policy around the search
#[derive(Debug, Clone)]
pub struct MiningScheduler {
    config: SharedMinerConfig,
    link_sender: LinkCommandSender,
    status_sender: MinerEventSender,
    worker_online: Arc<AtomicBool>,
}

impl MiningScheduler {
    pub fn new(
        config: SharedMinerConfig,
        link_sender: LinkCommandSender,
        status_sender: MinerEventSender,
        worker_online: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            link_sender,
            status_sender,
            worker_online,
        }
    }

    /// Select the execution context for a difficulty level
    pub fn plan(&self, difficulty: u8) -> ExecutionPlan {
        if difficulty >= self.config.worker_threshold {
            ExecutionPlan::Worker
        } else {
            ExecutionPlan::Inline
        }
    }

    /// Run one mining request to a terminal outcome
    pub async fn execute(
        &self,
        request_id: RequestId,
        params: MiningParams,
        cancel: CancelFlag,
    ) -> MinerResult<MiningOutcome> {
        match self.plan(params.difficulty) {
            ExecutionPlan::Inline => {
                debug!(
                    "Request {} running inline at difficulty {}",
                    request_id, params.difficulty
                );
                self.run_inline(request_id, &params, &cancel).await
            }
            ExecutionPlan::Worker => {
                // A dispatch with no link task consuming the command channel
                // would sit queued until the worker timeout; downgrade it to
                // the inline path instead
                if !self.worker_online.load(Ordering::Relaxed) {
                    warn!(
                        "Request {} planned for the worker, but no worker context \
                         is running; running inline",
                        request_id
                    );
                    return self.run_inline(request_id, &params, &cancel).await;
                }

                let dispatched = self.dispatch(request_id, params.clone()).await;
                match dispatched {
                    Err(ref error) if error.allows_inline_fallback() => {
                        warn!(
                            "Worker dispatch for request {} failed ({}), falling back inline",
                            request_id, error
                        );
                        self.run_inline(request_id, &params, &cancel).await
                    }
                    result => result,
                }
            }
        }
    }

    /// Inline path, also used as the fallback: race the search against the
    /// inline timeout
    async fn run_inline(
        &self,
        request_id: RequestId,
        params: &MiningParams,
        cancel: &CancelFlag,
    ) -> MinerResult<MiningOutcome> {
        let status_sender = self.status_sender.clone();
        let search = mine_gift_wrap(params, cancel, |progress| {
            let _ = status_sender.try_send(MinerEvent::Progress {
                request_id,
                counter: progress.counter,
                elapsed_ms: progress.elapsed_ms,
            });
        });

        match timeout(self.config.inline_timeout, search).await {
            Ok(result) => result,
            Err(_) => Err(MinerError::MiningTimeout {
                difficulty: params.difficulty,
                elapsed_ms: self.config.inline_timeout.as_millis() as u64,
            }),
        }
    }

    /// Worker path: register a pending handle with the link task and await
    /// the terminal reply, racing it against the worker timeout
    async fn dispatch(
        &self,
        request_id: RequestId,
        params: MiningParams,
    ) -> MinerResult<MiningOutcome> {
        let difficulty = params.difficulty;
        let (completion, resolved) = oneshot::channel();

        let sent = self
            .link_sender
            .send(LinkCommand::Dispatch {
                request_id,
                params,
                completion,
            })
            .await;
        if sent.is_err() {
            return Err(MinerError::worker_unavailable("worker link closed"));
        }

        match timeout(self.config.worker_timeout, resolved).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                // The link dropped the handle without resolving it
                Err(MinerError::ChannelClosed)
            }
            Err(_) => {
                // Cancel the abandoned job; its late terminal reply then
                // resolves an already-dropped handle and is discarded
                let _ = self
                    .link_sender
                    .try_send(LinkCommand::Cancel { request_id });
                Err(MinerError::MiningTimeout {
                    difficulty,
                    elapsed_ms: self.config.worker_timeout.as_millis() as u64,
                })
            }
        }
    }
}
