//! Nonce search over the gift wrap identifier
//!
//! The search mutates only the skeleton's nonce tag, recomputes the
//! canonical identifier, and stops once the identifier carries the
//! requested number of leading zero hex characters. The loop yields to the
//! host scheduler at a fixed iteration interval so cancellation stays
//! responsive, and reports progress through a non-blocking callback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, trace};
use velum_core::{build_envelope, Event, EventKeyPair, Tag, UnsignedEvent};

use crate::error::{MinerError, MinerResult};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Iterations between yields back to the host scheduler
pub const YIELD_INTERVAL: u64 = 10_000;

/// Iterations between progress notifications
pub const PROGRESS_INTERVAL: u64 = 50_000;

/// Hard wall-clock ceiling on a single search, independent of the
/// configured timeouts
pub const MAX_SEARCH_DURATION: Duration = Duration::from_secs(300);

/// Highest meaningful difficulty: the identifier is 64 hex characters wide
pub const MAX_DIFFICULTY: u8 = 64;

// ----------------------------------------------------------------------------
// Cancellation
// ----------------------------------------------------------------------------

/// Cooperative cancellation token for one mining request.
///
/// Cancellation is observed at the search loop's yield points, so abort
/// latency is bounded by `YIELD_INTERVAL` iterations rather than being
/// immediate.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect at the next yield point
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ----------------------------------------------------------------------------
// Mining Inputs and Outcomes
// ----------------------------------------------------------------------------

/// Parameters of one gift-wrap mining request
#[derive(Debug, Clone)]
pub struct MiningParams {
    /// Sender's decrypted private key bytes; held only for the lifetime of
    /// the request
    pub sender_key: [u8; 32],
    /// Recipient's public key bytes
    pub recipient: [u8; 32],
    /// Plaintext message body
    pub message: String,
    /// Target difficulty in leading zero hex characters
    pub difficulty: u8,
    /// Tags carried inside the rumor (reply references, subjects, ...)
    pub extra_tags: Vec<Tag>,
    /// Tags carried only on the outer wrapper
    pub wrap_tags: Vec<Tag>,
}

/// Progress snapshot emitted during a search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiningProgress {
    /// Nonce counter at the time of the snapshot
    pub counter: u64,
    /// Wall-clock time spent so far
    pub elapsed_ms: u64,
}

/// Terminal outcome of a mining request.
///
/// Cancellation is a normal outcome rather than an error: callers treat it
/// as a silent abort.
#[derive(Debug, Clone)]
pub enum MiningOutcome {
    /// The finalized, signed gift wrap
    Complete(Event),
    /// The request was cancelled before completion
    Cancelled,
}

impl MiningOutcome {
    /// The completed event, if this outcome carries one
    pub fn into_event(self) -> Option<Event> {
        match self {
            MiningOutcome::Complete(event) => Some(event),
            MiningOutcome::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MiningOutcome::Cancelled)
    }
}

// ----------------------------------------------------------------------------
// Hash Search
// ----------------------------------------------------------------------------

/// Search the nonce space until the skeleton's identifier satisfies
/// `difficulty`, then sign the skeleton with `keys`.
///
/// Difficulty zero accepts the first candidate without searching. The
/// `on_progress` callback must not block; heartbeats it cannot deliver
/// should be dropped.
pub async fn mine_event(
    mut skeleton: UnsignedEvent,
    keys: &EventKeyPair,
    difficulty: u8,
    cancel: &CancelFlag,
    mut on_progress: impl FnMut(MiningProgress),
) -> MinerResult<MiningOutcome> {
    let difficulty = difficulty.min(MAX_DIFFICULTY);
    let started = Instant::now();
    let mut counter: u64 = 0;

    loop {
        skeleton.set_nonce(counter, difficulty);
        let id = skeleton.id()?;
        if id.pow_difficulty() >= difficulty {
            let elapsed = started.elapsed().as_millis();
            debug!(
                "Nonce search satisfied difficulty {} after {} iterations ({}ms)",
                difficulty, counter, elapsed
            );
            let event = skeleton.sign(keys)?;
            return Ok(MiningOutcome::Complete(event));
        }

        counter += 1;

        if counter % YIELD_INTERVAL == 0 {
            if cancel.is_cancelled() {
                debug!(
                    "Nonce search cancelled after {} iterations at difficulty {}",
                    counter, difficulty
                );
                return Ok(MiningOutcome::Cancelled);
            }
            if started.elapsed() >= MAX_SEARCH_DURATION {
                return Err(MinerError::MiningTimeout {
                    difficulty,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::task::yield_now().await;
        }

        if counter % PROGRESS_INTERVAL == 0 {
            let progress = MiningProgress {
                counter,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            trace!(
                "Nonce search at counter {} ({}ms)",
                progress.counter,
                progress.elapsed_ms
            );
            on_progress(progress);
        }
    }
}

/// Build the envelope for `params` and mine its wrapper.
///
/// This is the single search path shared by inline and worker execution.
pub async fn mine_gift_wrap(
    params: &MiningParams,
    cancel: &CancelFlag,
    on_progress: impl FnMut(MiningProgress),
) -> MinerResult<MiningOutcome> {
    let sender = EventKeyPair::from_bytes(&params.sender_key);
    let draft = build_envelope(
        &sender,
        &params.recipient,
        &params.message,
        &params.extra_tags,
        &params.wrap_tags,
    )?;

    debug!("Starting nonce search at difficulty {}", params.difficulty);
    mine_event(
        draft.skeleton,
        &draft.ephemeral,
        params.difficulty,
        cancel,
        on_progress,
    )
    .await
}
