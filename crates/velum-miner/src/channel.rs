//! Channel protocol between the controller side and the mining worker
//!
//! Each direction uses its own typed message enum over a bounded channel,
//! and every request carries an opaque id so replies can be correlated no
//! matter how they interleave. Terminal replies resolve a request exactly
//! once; progress heartbeats are informational and lossy.

use core::fmt;

use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;
use velum_core::Event;

use crate::config::MinerConfig;
use crate::error::{MinerError, MinerResult};
use crate::pow::{MiningOutcome, MiningParams};

// ----------------------------------------------------------------------------
// Request Identity
// ----------------------------------------------------------------------------

/// Opaque identifier correlating requests with replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Worker Protocol
// ----------------------------------------------------------------------------

/// Requests sent from the controller side to the worker
#[derive(Debug, Clone)]
pub enum WorkerRequest {
    /// Start mining a new gift wrap
    Create {
        request_id: RequestId,
        params: MiningParams,
    },
    /// Cancel an in-flight request
    Cancel { request_id: RequestId },
}

/// Replies sent from the worker back to the controller side
#[derive(Debug, Clone)]
pub enum WorkerReply {
    /// Emitted once when the worker loop starts; dispatches arriving before
    /// this are rejected as not-ready
    Ready,
    /// Heartbeat for an in-flight request
    Progress {
        request_id: RequestId,
        counter: u64,
        elapsed_ms: u64,
    },
    /// Terminal: the finalized gift wrap
    Complete { request_id: RequestId, event: Event },
    /// Terminal: the request was cancelled
    Cancelled { request_id: RequestId },
    /// Terminal: the request failed
    Failed {
        request_id: RequestId,
        error: MinerError,
    },
}

impl WorkerReply {
    /// The request this reply belongs to; `Ready` has none
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            WorkerReply::Ready => None,
            WorkerReply::Progress { request_id, .. }
            | WorkerReply::Complete { request_id, .. }
            | WorkerReply::Cancelled { request_id }
            | WorkerReply::Failed { request_id, .. } => Some(*request_id),
        }
    }

    /// Whether this reply resolves its request
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkerReply::Complete { .. }
                | WorkerReply::Cancelled { .. }
                | WorkerReply::Failed { .. }
        )
    }
}

// ----------------------------------------------------------------------------
// Link Commands
// ----------------------------------------------------------------------------

/// One-shot handle resolved by exactly one terminal reply
pub type CompletionSender = oneshot::Sender<MinerResult<MiningOutcome>>;
pub type CompletionReceiver = oneshot::Receiver<MinerResult<MiningOutcome>>;

/// Commands accepted by the worker link task, which owns the correlation
/// map between pending handles and worker replies
#[derive(Debug)]
pub enum LinkCommand {
    /// Register a pending handle and forward the request to the worker
    Dispatch {
        request_id: RequestId,
        params: MiningParams,
        completion: CompletionSender,
    },
    /// Route a cancellation to the worker
    Cancel { request_id: RequestId },
    /// Tear down: every pending handle is rejected as channel-closed
    Shutdown,
}

// ----------------------------------------------------------------------------
// Status Events
// ----------------------------------------------------------------------------

/// Observable mining status for the embedding application
#[derive(Debug, Clone)]
pub enum MinerEvent {
    /// The worker context came online
    WorkerReady,
    /// A request entered the pipeline
    Started { request_id: RequestId, difficulty: u8 },
    /// Heartbeat from an in-flight search
    Progress {
        request_id: RequestId,
        counter: u64,
        elapsed_ms: u64,
    },
    /// The request produced a gift wrap
    Completed { request_id: RequestId },
    /// The request was cancelled
    Cancelled { request_id: RequestId },
    /// The request failed
    Failed { request_id: RequestId },
}

// ----------------------------------------------------------------------------
// Channel Type Aliases
// ----------------------------------------------------------------------------

pub type WorkerRequestSender = mpsc::Sender<WorkerRequest>;
pub type WorkerRequestReceiver = mpsc::Receiver<WorkerRequest>;

pub type WorkerReplySender = mpsc::Sender<WorkerReply>;
pub type WorkerReplyReceiver = mpsc::Receiver<WorkerReply>;

pub type LinkCommandSender = mpsc::Sender<LinkCommand>;
pub type LinkCommandReceiver = mpsc::Receiver<LinkCommand>;

pub type MinerEventSender = mpsc::Sender<MinerEvent>;
pub type MinerEventReceiver = mpsc::Receiver<MinerEvent>;

// ----------------------------------------------------------------------------
// Channel Creation Utilities
// ----------------------------------------------------------------------------

/// Create the bounded request channel (link to worker)
pub fn create_request_channel(
    config: &MinerConfig,
) -> (WorkerRequestSender, WorkerRequestReceiver) {
    mpsc::channel(config.request_buffer_size)
}

/// Create the bounded reply channel (worker to link)
pub fn create_reply_channel(config: &MinerConfig) -> (WorkerReplySender, WorkerReplyReceiver) {
    mpsc::channel(config.reply_buffer_size)
}

/// Create the bounded command channel (controller to link)
pub fn create_link_channel(config: &MinerConfig) -> (LinkCommandSender, LinkCommandReceiver) {
    mpsc::channel(config.request_buffer_size)
}

/// Create the bounded status event channel (miner to application)
pub fn create_status_channel(config: &MinerConfig) -> (MinerEventSender, MinerEventReceiver) {
    mpsc::channel(config.status_buffer_size)
}
