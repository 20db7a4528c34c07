//! # velum-miner
//!
//! Async proof-of-work runtime that finalizes velum gift wraps. Wrapping a
//! message produces an unsigned outer skeleton; this crate searches the
//! skeleton's nonce space until its identifier carries the requested number
//! of leading zero hex characters, then signs it with the wrap's ephemeral
//! key.
//!
//! ## Architecture
//!
//! The runtime is built from isolated tasks connected by bounded channels:
//!
//! - [`MiningWorkerTask`](worker::MiningWorkerTask) executes searches in a
//!   separate context, one spawned task per request.
//! - [`WorkerLinkTask`](link::WorkerLinkTask) owns the correlation map
//!   between request ids and pending completion handles.
//! - [`MiningScheduler`](scheduler::MiningScheduler) places each request
//!   inline or on the worker and enforces timeouts and inline fallback.
//! - [`MinerRuntime`](controller::MinerRuntime) is the public facade:
//!   lifecycle, the stored difficulty setting, submission, and cancellation.
//!
//! The search itself is cooperative: it yields to the host scheduler at a
//! fixed iteration interval, so cancellation and timeouts stay responsive
//! without preemption.

pub mod channel;
pub mod config;
pub mod controller;
pub mod error;
pub mod link;
pub mod pow;
pub mod scheduler;
pub mod worker;

pub use channel::{MinerEvent, MinerEventReceiver, RequestId, WorkerReply, WorkerRequest};
pub use config::{MinerConfig, SharedMinerConfig};
pub use controller::MinerRuntime;
pub use error::{MinerError, MinerResult};
pub use link::WorkerLinkTask;
pub use pow::{
    mine_event, mine_gift_wrap, CancelFlag, MiningOutcome, MiningParams, MiningProgress,
    MAX_DIFFICULTY, MAX_SEARCH_DURATION, PROGRESS_INTERVAL, YIELD_INTERVAL,
};
pub use scheduler::{ExecutionPlan, MiningScheduler};
pub use worker::MiningWorkerTask;
