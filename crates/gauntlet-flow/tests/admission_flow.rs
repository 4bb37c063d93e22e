//! Integration tests: queue ordering, stage progression, and recovery
//! working together.

use std::sync::Arc;
use std::thread;

use gauntlet_flow::{AdmissionQueue, FailureKind, FlowError, Recovery, StageMachine};
use gauntlet_protocol::{Notification, SessionId, Stage, UserId};
use gauntlet_session::{ClientLink, LinkReceiver, Outbound, User, UserHandle};

fn connected_user(n: u64) -> (UserHandle, ClientLink, LinkReceiver) {
    let mut user = User::new(UserId(n), SessionId::new(format!("session-{n}")));
    let (link, rx) = ClientLink::channel();
    user.attach_link(link.clone());
    (UserHandle::new(user), link, rx)
}

fn drain_updates(rx: &mut LinkReceiver) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Outbound::Notify(Notification::QueueUpdate { position, total }) = msg {
            out.push((position, total));
        }
    }
    out
}

#[test]
fn test_admitting_head_shifts_everyone_forward() {
    let queue = AdmissionQueue::new();
    let (_a, a_link, mut a_rx) = connected_user(1);
    let (_b, b_link, mut b_rx) = connected_user(2);
    let (_c, c_link, mut c_rx) = connected_user(3);
    queue.add(UserId(1), Some(a_link));
    queue.add(UserId(2), Some(b_link));
    queue.add(UserId(3), Some(c_link));

    queue.broadcast_positions();
    assert_eq!(drain_updates(&mut a_rx), vec![(1, 3)]);
    assert_eq!(drain_updates(&mut b_rx), vec![(2, 3)]);
    assert_eq!(drain_updates(&mut c_rx), vec![(3, 3)]);

    let head = queue.pop_front().unwrap();
    assert_eq!(head.user_id, UserId(1));
    queue.broadcast_positions();

    assert_eq!(drain_updates(&mut b_rx), vec![(1, 2)]);
    assert_eq!(drain_updates(&mut c_rx), vec![(2, 2)]);
    assert!(drain_updates(&mut a_rx).is_empty());
}

#[test]
fn test_concurrent_adds_produce_contiguous_positions() {
    let queue = Arc::new(AdmissionQueue::new());
    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..25u64 {
                    queue.add(UserId(t * 100 + i), None);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(queue.len(), 200);
    let mut positions: Vec<usize> = (0..8u64)
        .flat_map(|t| (0..25u64).map(move |i| UserId(t * 100 + i)))
        .map(|id| queue.position(id).unwrap())
        .collect();
    positions.sort_unstable();
    assert_eq!(positions, (1..=200).collect::<Vec<_>>());
}

#[test]
fn test_full_progression_then_failure_returns_to_tail() {
    let queue = Arc::new(AdmissionQueue::new());
    let recovery = Recovery::new(Arc::clone(&queue));
    let machine = StageMachine::new();
    let (user, link, mut rx) = connected_user(1);
    queue.add(UserId(99), None);

    {
        let mut guard = user.lock();
        machine.execute(&mut guard, Stage::DinoRun).unwrap();
        machine.execute(&mut guard, Stage::Captcha).unwrap();
        machine.execute(&mut guard, Stage::Registering).unwrap();
        assert_eq!(
            machine.execute(&mut guard, Stage::Captcha),
            Err(FlowError::InvalidTransition { from: Stage::Registering, to: Stage::Captcha })
        );
    }

    recovery.fail(&user, FailureKind::ServerError);

    assert_eq!(user.lock().status, Stage::Waiting);
    assert!(link.is_closed());
    assert_eq!(queue.position(UserId(1)), Some(2));

    let stages: Vec<Stage> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|m| match m {
            Outbound::Notify(Notification::StageChange { stage, .. }) => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(stages, vec![Stage::DinoRun, Stage::Captcha, Stage::Registering]);
}

#[test]
fn test_concurrent_failures_close_exactly_once() {
    let queue = Arc::new(AdmissionQueue::new());
    let recovery = Recovery::new(Arc::clone(&queue));
    let (user, _link, mut rx) = connected_user(1);
    user.lock().status = Stage::Captcha;

    let kinds = [FailureKind::Timeout, FailureKind::AttemptsExhausted, FailureKind::ServerError];
    let handles: Vec<_> = kinds
        .into_iter()
        .map(|kind| {
            let recovery = recovery.clone();
            let user = user.clone();
            thread::spawn(move || recovery.fail(&user, kind))
        })
        .collect();
    let closed: usize = handles.into_iter().map(|h| usize::from(h.join().unwrap())).sum();

    assert_eq!(closed, 1);
    let messages: Vec<Outbound> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
    let failures = messages
        .iter()
        .filter(|m| matches!(m, Outbound::Notify(Notification::Failure { .. })))
        .count();
    let closes = messages.iter().filter(|m| **m == Outbound::Close).count();
    assert_eq!((failures, closes), (1, 1));
    assert_eq!(queue.len(), 1);
}
