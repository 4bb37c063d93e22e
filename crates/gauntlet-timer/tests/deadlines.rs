//! Deadline behavior against real user records, recovery and the queue.

use std::sync::Arc;
use std::time::Duration;

use gauntlet_flow::{AdmissionQueue, FailureKind, Recovery, StageMachine};
use gauntlet_protocol::{Notification, SessionId, Stage, UserId};
use gauntlet_session::{ClientLink, LinkReceiver, Outbound, User, UserHandle};
use gauntlet_timer::{StageTimeout, TimeoutSupervisor};

fn captcha_user(n: u64) -> (UserHandle, ClientLink, LinkReceiver) {
    let mut user = User::new(UserId(n), SessionId::new(format!("s{n}")));
    let machine = StageMachine::new();
    machine.execute(&mut user, Stage::DinoRun).unwrap();
    machine.execute(&mut user, Stage::Captcha).unwrap();
    user.set_captcha_target(400, 300);
    user.record_captcha_miss();
    let (link, rx) = ClientLink::channel();
    user.attach_link(link.clone());
    (UserHandle::new(user), link, rx)
}

fn supervisor_for(recovery: Recovery, stage: Stage) -> TimeoutSupervisor<StageTimeout> {
    TimeoutSupervisor::new(StageTimeout::new(recovery, stage), Duration::from_secs(120))
}

fn drain(rx: &mut LinkReceiver) -> Vec<Outbound> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

fn failures(messages: &[Outbound]) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, Outbound::Notify(Notification::Failure { .. })))
        .count()
}

fn closes(messages: &[Outbound]) -> usize {
    messages.iter().filter(|m| **m == Outbound::Close).count()
}

#[tokio::test(start_paused = true)]
async fn test_fire_resets_user_and_closes_once() {
    let queue = Arc::new(AdmissionQueue::new());
    let supervisor = supervisor_for(Recovery::new(Arc::clone(&queue)), Stage::Captcha);
    let (user, link, mut rx) = captcha_user(1);

    supervisor.start(user.clone(), Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(200)).await;

    let messages = drain(&mut rx);
    assert_eq!(failures(&messages), 1);
    assert_eq!(closes(&messages), 1);
    assert!(link.is_closed());
    let guard = user.lock();
    assert_eq!(guard.status, Stage::Waiting);
    assert_eq!(guard.captcha.attempts, 0);
    assert!(guard.link().is_none());
    drop(guard);
    assert_eq!(queue.position(UserId(1)), Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_wins_leaves_user_untouched() {
    let queue = Arc::new(AdmissionQueue::new());
    let supervisor = supervisor_for(Recovery::new(Arc::clone(&queue)), Stage::Captcha);
    let (user, link, mut rx) = captcha_user(1);

    supervisor.start(user.clone(), Duration::from_millis(50));
    assert!(supervisor.cancel());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(drain(&mut rx).is_empty());
    assert!(!link.is_closed());
    assert_eq!(user.lock().status, Stage::Captcha);
    assert_eq!(user.lock().captcha.attempts, 1);
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_fire_racing_attempt_exhaustion_closes_once() {
    let queue = Arc::new(AdmissionQueue::new());
    let recovery = Recovery::new(Arc::clone(&queue));
    let supervisor = supervisor_for(recovery.clone(), Stage::Captcha);
    let (user, _link, mut rx) = captcha_user(1);

    supervisor.start(user.clone(), Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(50)).await;
    // The handler path fails the user at the same instant without cancelling.
    recovery.fail(&user, FailureKind::AttemptsExhausted);
    tokio::time::sleep(Duration::from_millis(150)).await;

    let messages = drain(&mut rx);
    assert_eq!(failures(&messages), 1);
    assert_eq!(closes(&messages), 1);
    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stale_deadline_ignores_user_in_later_stage() {
    let queue = Arc::new(AdmissionQueue::new());
    let supervisor = supervisor_for(Recovery::new(Arc::clone(&queue)), Stage::DinoRun);
    let (user, _link, mut rx) = captcha_user(1);

    // Armed for Dino Run, but the user is already in Captcha.
    supervisor.start(user.clone(), Duration::from_millis(50));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(drain(&mut rx).is_empty());
    assert_eq!(user.lock().status, Stage::Captcha);
    assert!(queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_independent_supervisors_do_not_interfere() {
    let queue = Arc::new(AdmissionQueue::new());
    let recovery = Recovery::new(Arc::clone(&queue));
    let first = supervisor_for(recovery.clone(), Stage::Captcha);
    let second = supervisor_for(recovery, Stage::Captcha);
    let (a, _a_link, _a_rx) = captcha_user(1);
    let (b, _b_link, _b_rx) = captcha_user(2);

    first.start(a.clone(), Duration::from_millis(50));
    second.start(b.clone(), Duration::from_millis(50));
    assert!(first.cancel());
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(a.lock().status, Stage::Captcha);
    assert_eq!(b.lock().status, Stage::Waiting);
    assert_eq!(queue.position(UserId(2)), Some(1));
}
