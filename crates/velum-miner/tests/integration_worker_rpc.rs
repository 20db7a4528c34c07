//! Integration tests for the worker channel protocol
//!
//! Drives the worker and link tasks directly over their channels: readiness
//! announcement, request/reply correlation under concurrency, progress
//! heartbeats, cancellation routing, and teardown of pending handles.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use velum_core::EventKeyPair;
use velum_miner::channel::{
    create_link_channel, create_reply_channel, create_request_channel, create_status_channel,
    LinkCommand, LinkCommandSender, MinerEventReceiver, WorkerReplyReceiver, WorkerRequestSender,
};
use velum_miner::link::WorkerLinkTask;
use velum_miner::{
    MinerConfig, MinerError, MinerEvent, MinerResult, MiningOutcome, MiningParams,
    MiningWorkerTask, RequestId, WorkerReply, WorkerRequest, MAX_DIFFICULTY, PROGRESS_INTERVAL,
};

// ----------------------------------------------------------------------------
// Test Utilities
// ----------------------------------------------------------------------------

fn mining_params(difficulty: u8, message: &str) -> MiningParams {
    let sender = EventKeyPair::generate();
    let recipient = EventKeyPair::generate();
    MiningParams {
        sender_key: sender.private_key_bytes(),
        recipient: recipient.public_key_bytes(),
        message: message.to_string(),
        difficulty,
        extra_tags: Vec::new(),
        wrap_tags: Vec::new(),
    }
}

/// Spawn a bare worker and hand back its channel endpoints
fn spawn_worker(
    config: &MinerConfig,
) -> (
    WorkerRequestSender,
    WorkerReplyReceiver,
    JoinHandle<MinerResult<()>>,
) {
    let (request_sender, request_receiver) = create_request_channel(config);
    let (reply_sender, reply_receiver) = create_reply_channel(config);

    let mut worker = MiningWorkerTask::new(request_receiver, reply_sender);
    let handle = tokio::spawn(async move { worker.run().await });
    (request_sender, reply_receiver, handle)
}

/// Spawn a connected link and worker pair, returning the controller-side
/// endpoints
fn spawn_link_pair(
    config: &MinerConfig,
) -> (
    LinkCommandSender,
    MinerEventReceiver,
    JoinHandle<MinerResult<()>>,
    JoinHandle<MinerResult<()>>,
) {
    let (link_sender, link_receiver) = create_link_channel(config);
    let (request_sender, request_receiver) = create_request_channel(config);
    let (reply_sender, reply_receiver) = create_reply_channel(config);
    let (status_sender, status_receiver) = create_status_channel(config);

    let mut link = WorkerLinkTask::new(
        link_receiver,
        request_sender,
        reply_receiver,
        status_sender,
    );
    let mut worker = MiningWorkerTask::new(request_receiver, reply_sender);

    let link_handle = tokio::spawn(async move { link.run().await });
    let worker_handle = tokio::spawn(async move { worker.run().await });
    (link_sender, status_receiver, link_handle, worker_handle)
}

async fn await_reply(receiver: &mut WorkerReplyReceiver, deadline: Duration) -> WorkerReply {
    timeout(deadline, receiver.recv())
        .await
        .expect("worker reply should arrive within the deadline")
        .expect("reply channel should be open")
}

async fn await_worker_ready(status: &mut MinerEventReceiver) {
    loop {
        let event = timeout(Duration::from_secs(5), status.recv())
            .await
            .expect("worker should announce readiness")
            .expect("status channel should be open");
        if matches!(event, MinerEvent::WorkerReady) {
            return;
        }
    }
}

// ----------------------------------------------------------------------------
// Worker Protocol Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_worker_announces_ready_exactly_once() {
    let config = MinerConfig::testing();
    let (request_sender, mut replies, _handle) = spawn_worker(&config);

    let first = await_reply(&mut replies, Duration::from_millis(500)).await;
    assert!(matches!(first, WorkerReply::Ready));

    // A resolved request does not re-announce readiness
    let request_id = RequestId::new();
    request_sender
        .send(WorkerRequest::Create {
            request_id,
            params: mining_params(0, "ready check"),
        })
        .await
        .unwrap();

    let next = await_reply(&mut replies, Duration::from_secs(5)).await;
    assert!(matches!(next, WorkerReply::Complete { .. }));
}

#[tokio::test]
async fn test_worker_correlates_concurrent_requests() {
    let config = MinerConfig::testing();
    let (request_sender, mut replies, _handle) = spawn_worker(&config);
    assert!(matches!(
        await_reply(&mut replies, Duration::from_millis(500)).await,
        WorkerReply::Ready
    ));

    let first_id = RequestId::new();
    let second_id = RequestId::new();
    for (request_id, message) in [(first_id, "first"), (second_id, "second")] {
        request_sender
            .send(WorkerRequest::Create {
                request_id,
                params: mining_params(0, message),
            })
            .await
            .unwrap();
    }

    let mut resolved = HashSet::new();
    while resolved.len() < 2 {
        match await_reply(&mut replies, Duration::from_secs(5)).await {
            WorkerReply::Complete { request_id, event } => {
                assert!(event.verify().is_ok());
                resolved.insert(request_id);
            }
            WorkerReply::Progress { .. } => {}
            other => panic!("Expected Complete replies, got {:?}", other),
        }
    }
    assert!(resolved.contains(&first_id));
    assert!(resolved.contains(&second_id));
}

#[tokio::test]
async fn test_worker_cancellation_resolves_with_cancelled() {
    let config = MinerConfig::testing();
    let (request_sender, mut replies, _handle) = spawn_worker(&config);
    assert!(matches!(
        await_reply(&mut replies, Duration::from_millis(500)).await,
        WorkerReply::Ready
    ));

    let request_id = RequestId::new();
    request_sender
        .send(WorkerRequest::Create {
            request_id,
            params: mining_params(MAX_DIFFICULTY, "unreachable"),
        })
        .await
        .unwrap();
    request_sender
        .send(WorkerRequest::Cancel { request_id })
        .await
        .unwrap();

    loop {
        match await_reply(&mut replies, Duration::from_secs(10)).await {
            WorkerReply::Cancelled { request_id: id } => {
                assert_eq!(id, request_id);
                break;
            }
            WorkerReply::Progress { .. } => {}
            other => panic!("Expected Cancelled reply, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_worker_reports_progress_heartbeats() {
    let config = MinerConfig::testing();
    let (request_sender, mut replies, _handle) = spawn_worker(&config);
    assert!(matches!(
        await_reply(&mut replies, Duration::from_millis(500)).await,
        WorkerReply::Ready
    ));

    let request_id = RequestId::new();
    request_sender
        .send(WorkerRequest::Create {
            request_id,
            params: mining_params(MAX_DIFFICULTY, "progress check"),
        })
        .await
        .unwrap();

    match await_reply(&mut replies, Duration::from_secs(30)).await {
        WorkerReply::Progress {
            request_id: id,
            counter,
            ..
        } => {
            assert_eq!(id, request_id);
            assert_eq!(counter, PROGRESS_INTERVAL);
        }
        other => panic!("Expected Progress reply, got {:?}", other),
    }

    request_sender
        .send(WorkerRequest::Cancel { request_id })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_worker_ignores_cancel_for_unknown_request() {
    let config = MinerConfig::testing();
    let (request_sender, mut replies, _handle) = spawn_worker(&config);
    assert!(matches!(
        await_reply(&mut replies, Duration::from_millis(500)).await,
        WorkerReply::Ready
    ));

    request_sender
        .send(WorkerRequest::Cancel {
            request_id: RequestId::new(),
        })
        .await
        .unwrap();

    // The worker keeps serving requests afterwards
    let request_id = RequestId::new();
    request_sender
        .send(WorkerRequest::Create {
            request_id,
            params: mining_params(0, "still alive"),
        })
        .await
        .unwrap();

    let reply = await_reply(&mut replies, Duration::from_secs(5)).await;
    match reply {
        WorkerReply::Complete { request_id: id, .. } => assert_eq!(id, request_id),
        other => panic!("Expected Complete reply, got {:?}", other),
    }
}

// ----------------------------------------------------------------------------
// Link Protocol Tests
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_link_resolves_dispatched_request() {
    let config = MinerConfig::testing();
    let (link_sender, mut status, _link_handle, _worker_handle) = spawn_link_pair(&config);
    await_worker_ready(&mut status).await;

    let (completion, resolved) = oneshot::channel();
    link_sender
        .send(LinkCommand::Dispatch {
            request_id: RequestId::new(),
            params: mining_params(0, "through the link"),
            completion,
        })
        .await
        .unwrap();

    let result = timeout(Duration::from_secs(5), resolved)
        .await
        .expect("dispatch should resolve")
        .expect("completion handle should be resolved");
    let event = result
        .expect("mining should succeed")
        .into_event()
        .expect("expected a completed event");
    assert!(event.verify().is_ok());
}

#[tokio::test]
async fn test_link_resolves_multiple_pending_requests() {
    let config = MinerConfig::testing();
    let (link_sender, mut status, _link_handle, _worker_handle) = spawn_link_pair(&config);
    await_worker_ready(&mut status).await;

    let mut handles = Vec::new();
    for index in 0..3 {
        let (completion, resolved) = oneshot::channel();
        link_sender
            .send(LinkCommand::Dispatch {
                request_id: RequestId::new(),
                params: mining_params(0, &format!("burst {}", index)),
                completion,
            })
            .await
            .unwrap();
        handles.push(resolved);
    }

    let results = timeout(Duration::from_secs(10), join_all(handles))
        .await
        .expect("all dispatches should resolve");
    for result in results {
        let outcome = result.expect("completion handle should be resolved");
        assert!(matches!(outcome, Ok(MiningOutcome::Complete(_))));
    }
}

#[tokio::test]
async fn test_link_routes_cancellation_to_worker() {
    let config = MinerConfig::testing();
    let (link_sender, mut status, _link_handle, _worker_handle) = spawn_link_pair(&config);
    await_worker_ready(&mut status).await;

    let request_id = RequestId::new();
    let (completion, resolved) = oneshot::channel();
    link_sender
        .send(LinkCommand::Dispatch {
            request_id,
            params: mining_params(MAX_DIFFICULTY, "cancelled via link"),
            completion,
        })
        .await
        .unwrap();
    link_sender
        .send(LinkCommand::Cancel { request_id })
        .await
        .unwrap();

    let result = timeout(Duration::from_secs(10), resolved)
        .await
        .expect("cancellation should resolve the request")
        .expect("completion handle should be resolved");
    assert!(matches!(result, Ok(MiningOutcome::Cancelled)));
}

#[tokio::test]
async fn test_link_ignores_terminal_reply_for_unknown_request() {
    // Drive the link directly so a reply can be forged for an id that was
    // never dispatched
    let config = MinerConfig::testing();
    let (link_sender, link_receiver) = create_link_channel(&config);
    let (request_sender, _request_receiver) = create_request_channel(&config);
    let (reply_sender, reply_receiver) = create_reply_channel(&config);
    let (status_sender, mut status) = create_status_channel(&config);

    let mut link = WorkerLinkTask::new(
        link_receiver,
        request_sender,
        reply_receiver,
        status_sender,
    );
    tokio::spawn(async move { link.run().await });

    reply_sender.send(WorkerReply::Ready).await.unwrap();
    await_worker_ready(&mut status).await;

    // Terminal replies for an id with no pending handle are discarded
    reply_sender
        .send(WorkerReply::Cancelled {
            request_id: RequestId::new(),
        })
        .await
        .unwrap();
    reply_sender
        .send(WorkerReply::Failed {
            request_id: RequestId::new(),
            error: MinerError::ChannelClosed,
        })
        .await
        .unwrap();

    // The link keeps serving: a real dispatch still correlates and resolves
    let request_id = RequestId::new();
    let (completion, resolved) = oneshot::channel();
    link_sender
        .send(LinkCommand::Dispatch {
            request_id,
            params: mining_params(0, "still served"),
            completion,
        })
        .await
        .unwrap();
    reply_sender
        .send(WorkerReply::Cancelled { request_id })
        .await
        .unwrap();

    let result = timeout(Duration::from_secs(5), resolved)
        .await
        .expect("the known id should still resolve")
        .expect("completion handle should be resolved");
    assert!(matches!(result, Ok(MiningOutcome::Cancelled)));
}

#[tokio::test]
async fn test_link_teardown_rejects_every_pending_request() {
    let config = MinerConfig::testing();
    let (link_sender, mut status, link_handle, _worker_handle) = spawn_link_pair(&config);
    await_worker_ready(&mut status).await;

    let mut handles = Vec::new();
    for index in 0..2 {
        let (completion, resolved) = oneshot::channel();
        link_sender
            .send(LinkCommand::Dispatch {
                request_id: RequestId::new(),
                params: mining_params(MAX_DIFFICULTY, &format!("stuck {}", index)),
                completion,
            })
            .await
            .unwrap();
        handles.push(resolved);
    }

    link_sender.send(LinkCommand::Shutdown).await.unwrap();

    let results = timeout(Duration::from_secs(5), join_all(handles))
        .await
        .expect("teardown should resolve every handle");
    for result in results {
        let outcome = result.expect("completion handle should be resolved");
        assert!(matches!(outcome, Err(MinerError::ChannelClosed)));
    }

    let link_result = timeout(Duration::from_secs(5), link_handle)
        .await
        .expect("link task should exit after shutdown")
        .expect("link task should not panic");
    assert!(link_result.is_ok());
}
