//! Controller-side owner of the worker channel
//!
//! The link task is the only owner of the correlation map between request
//! ids and pending completion handles. Dispatches insert a handle, exactly
//! one terminal reply removes and resolves it, and teardown rejects
//! whatever is left. Late replies for requests that already resolved are
//! logged and dropped.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{
    CompletionSender, LinkCommand, LinkCommandReceiver, MinerEvent, MinerEventSender, RequestId,
    WorkerReply, WorkerReplyReceiver, WorkerRequest, WorkerRequestSender,
};
use crate::error::{MinerError, MinerResult};
use crate::pow::MiningOutcome;

// ----------------------------------------------------------------------------
// Worker Link Task
// ----------------------------------------------------------------------------

/// Task bridging controller commands and worker replies.
///
/// Dispatches are rejected while the worker has not yet announced `Ready`,
/// so the caller can fall back to inline execution instead of queueing
/// against a context that may never come up.
pub struct WorkerLinkTask {
    command_receiver: LinkCommandReceiver,
    request_sender: WorkerRequestSender,
    reply_receiver: WorkerReplyReceiver,
    status_sender: MinerEventSender,
    pending: HashMap<RequestId, CompletionSender>,
    worker_ready: bool,
    running: bool,
}

impl WorkerLinkTask {
    pub fn new(
        command_receiver: LinkCommandReceiver,
        request_sender: WorkerRequestSender,
        reply_receiver: WorkerReplyReceiver,
        status_sender: MinerEventSender,
    ) -> Self {
        Self {
            command_receiver,
            request_sender,
            reply_receiver,
            status_sender,
            pending: HashMap::new(),
            worker_ready: false,
            running: true,
        }
    }

    /// Main link loop: route commands toward the worker and replies back
    /// to their pending handles
    pub async fn run(&mut self) -> MinerResult<()> {
        info!("Worker link task starting");

        while self.running {
            tokio::select! {
                command = self.command_receiver.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        debug!("Link command channel closed");
                        self.running = false;
                    }
                },
                reply = self.reply_receiver.recv() => match reply {
                    Some(reply) => self.handle_reply(reply),
                    None => {
                        warn!("Worker reply channel closed");
                        self.running = false;
                    }
                },
            }
        }

        self.teardown();
        info!("Worker link task stopped");
        Ok(())
    }

    fn handle_command(&mut self, command: LinkCommand) {
        match command {
            LinkCommand::Dispatch {
                request_id,
                params,
                completion,
            } => self.handle_dispatch(request_id, params, completion),
            LinkCommand::Cancel { request_id } => {
                if !self.pending.contains_key(&request_id) {
                    debug!("Cancel for request {} ignored: not pending", request_id);
                    return;
                }
                if self
                    .request_sender
                    .try_send(WorkerRequest::Cancel { request_id })
                    .is_err()
                {
                    // Worker gone; teardown will reject the pending handle
                    warn!("Could not route cancellation for request {}", request_id);
                }
            }
            LinkCommand::Shutdown => {
                info!("Link shutdown requested");
                self.running = false;
            }
        }
    }

    fn handle_dispatch(
        &mut self,
        request_id: RequestId,
        params: crate::pow::MiningParams,
        completion: CompletionSender,
    ) {
        if !self.worker_ready {
            debug!("Rejecting request {}: worker not ready", request_id);
            let _ = completion.send(Err(MinerError::worker_unavailable("worker not ready")));
            return;
        }

        match self
            .request_sender
            .try_send(WorkerRequest::Create { request_id, params })
        {
            Ok(()) => {
                self.pending.insert(request_id, completion);
                debug!(
                    "Dispatched request {} to worker ({} pending)",
                    request_id,
                    self.pending.len()
                );
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = completion.send(Err(MinerError::worker_unavailable(
                    "worker request channel full",
                )));
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let _ = completion.send(Err(MinerError::worker_unavailable(
                    "worker request channel closed",
                )));
            }
        }
    }

    fn handle_reply(&mut self, reply: WorkerReply) {
        match reply {
            WorkerReply::Ready => {
                info!("Mining worker ready");
                self.worker_ready = true;
                let _ = self.status_sender.try_send(MinerEvent::WorkerReady);
            }
            WorkerReply::Progress {
                request_id,
                counter,
                elapsed_ms,
            } => {
                // Heartbeats for already-resolved requests are stale; drop them
                if self.pending.contains_key(&request_id) {
                    let _ = self.status_sender.try_send(MinerEvent::Progress {
                        request_id,
                        counter,
                        elapsed_ms,
                    });
                }
            }
            WorkerReply::Complete { request_id, event } => {
                self.resolve(request_id, Ok(MiningOutcome::Complete(event)));
            }
            WorkerReply::Cancelled { request_id } => {
                self.resolve(request_id, Ok(MiningOutcome::Cancelled));
            }
            WorkerReply::Failed { request_id, error } => {
                self.resolve(request_id, Err(error));
            }
        }
    }

    /// Resolve a pending handle with its terminal result, exactly once
    fn resolve(&mut self, request_id: RequestId, result: MinerResult<MiningOutcome>) {
        match self.pending.remove(&request_id) {
            Some(completion) => {
                if completion.send(result).is_err() {
                    // The requester stopped waiting (timeout or drop)
                    debug!(
                        "Completion handle for request {} was already dropped",
                        request_id
                    );
                }
            }
            None => debug!("Terminal reply for unknown request {} ignored", request_id),
        }
    }

    /// Reject every pending handle so no caller waits forever
    fn teardown(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        warn!(
            "Rejecting {} pending request(s) on link teardown",
            self.pending.len()
        );
        for (_, completion) in self.pending.drain() {
            let _ = completion.send(Err(MinerError::ChannelClosed));
        }
    }
}
