//! Worker-side mining task
//!
//! The worker is an isolated context that accepts mining requests, runs
//! each search on its own spawned task, and reports typed replies back over
//! the reply channel. It announces itself with a single `Ready` reply when
//! its loop starts, and cancels every in-flight search when it shuts down.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{
    RequestId, WorkerReply, WorkerReplySender, WorkerRequest, WorkerRequestReceiver,
};
use crate::error::MinerResult;
use crate::pow::{mine_gift_wrap, CancelFlag, MiningOutcome};

// ----------------------------------------------------------------------------
// Mining Worker Task
// ----------------------------------------------------------------------------

/// Task that executes mining requests inside the worker context.
///
/// Requests run concurrently: each search gets its own spawned task and its
/// own cancellation flag. The worker loop itself only routes messages and
/// tracks which requests are in flight.
pub struct MiningWorkerTask {
    request_receiver: WorkerRequestReceiver,
    reply_sender: WorkerReplySender,
    finished_sender: mpsc::UnboundedSender<RequestId>,
    finished_receiver: mpsc::UnboundedReceiver<RequestId>,
    active: HashMap<RequestId, CancelFlag>,
    running: bool,
}

impl MiningWorkerTask {
    pub fn new(
        request_receiver: WorkerRequestReceiver,
        reply_sender: WorkerReplySender,
    ) -> Self {
        let (finished_sender, finished_receiver) = mpsc::unbounded_channel();
        Self {
            request_receiver,
            reply_sender,
            finished_sender,
            finished_receiver,
            active: HashMap::new(),
            running: true,
        }
    }

    /// Main worker loop: announce readiness, then route requests and
    /// completion notices until the request channel closes
    pub async fn run(&mut self) -> MinerResult<()> {
        info!("Mining worker task starting");

        if self.reply_sender.send(WorkerReply::Ready).await.is_err() {
            warn!("Reply channel closed before the worker became ready");
            return Ok(());
        }

        while self.running {
            tokio::select! {
                request = self.request_receiver.recv() => match request {
                    Some(request) => self.handle_request(request),
                    None => {
                        debug!("Request channel closed, stopping worker");
                        self.running = false;
                    }
                },
                Some(request_id) = self.finished_receiver.recv() => {
                    self.active.remove(&request_id);
                }
            }
        }

        // Cancel anything still searching so spawned tasks wind down
        for (request_id, cancel) in self.active.drain() {
            debug!("Cancelling in-flight request {} on worker shutdown", request_id);
            cancel.cancel();
        }

        info!("Mining worker task stopped");
        Ok(())
    }

    fn handle_request(&mut self, request: WorkerRequest) {
        match request {
            WorkerRequest::Create { request_id, params } => {
                debug!(
                    "Worker accepted request {} at difficulty {}",
                    request_id, params.difficulty
                );

                let cancel = CancelFlag::new();
                self.active.insert(request_id, cancel.clone());

                let reply_sender = self.reply_sender.clone();
                let finished_sender = self.finished_sender.clone();
                tokio::spawn(async move {
                    let progress_sender = reply_sender.clone();
                    let result = mine_gift_wrap(&params, &cancel, |progress| {
                        // Heartbeats are lossy: drop them when the reply
                        // channel is full rather than stall the search
                        let _ = progress_sender.try_send(WorkerReply::Progress {
                            request_id,
                            counter: progress.counter,
                            elapsed_ms: progress.elapsed_ms,
                        });
                    })
                    .await;

                    let reply = match result {
                        Ok(MiningOutcome::Complete(event)) => {
                            WorkerReply::Complete { request_id, event }
                        }
                        Ok(MiningOutcome::Cancelled) => WorkerReply::Cancelled { request_id },
                        Err(error) => WorkerReply::Failed { request_id, error },
                    };
                    if reply_sender.send(reply).await.is_err() {
                        debug!("Reply channel closed before request {} resolved", request_id);
                    }
                    let _ = finished_sender.send(request_id);
                });
            }
            WorkerRequest::Cancel { request_id } => match self.active.get(&request_id) {
                Some(cancel) => {
                    debug!("Worker cancelling request {}", request_id);
                    cancel.cancel();
                }
                None => debug!("Cancel for unknown request {} ignored", request_id),
            },
        }
    }
}
