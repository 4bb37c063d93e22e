//! The whole flow, independent of any transport.
//!
//! The gateway turns frames into calls on [`Gauntlet`]; tests drive it
//! directly with [`ClientLink::channel`] receivers standing in for sockets.
//!
//! Lock order: a user record, then the queue. Never call into
//! [`Recovery`] or the queue-mutating paths of [`Gauntlet`] while holding
//! a user guard.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use gauntlet_flow::{
    AdmissionQueue, FailureKind, FlowError, Recovery, StageMachine, click_hits, kana_match,
    pick_fish,
};
use gauntlet_placement::{CaptchaLayout, LayoutConfig};
use gauntlet_protocol::{Notification, SessionId, Sprite, Stage, UserId};
use gauntlet_session::{Attempt, ClientLink, OtpState, SessionRegistry, TokenError, User, UserHandle};
use gauntlet_timer::{ChallengeDeadlines, TokenMonitor};
use tracing::{debug, info};

use crate::{GauntletConfig, GauntletError};

/// Result of one captcha click or fish-name answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerOutcome {
    /// Right answer.
    Passed,
    /// Missed, with this many tries left.
    Retry { remaining: u32 },
    /// Missed for the last time; the user was sent back.
    Failed,
}

/// The admission and challenge service.
pub struct Gauntlet {
    config: GauntletConfig,
    layout: LayoutConfig,
    registry: SessionRegistry,
    queue: Arc<AdmissionQueue>,
    recovery: Recovery,
    machine: StageMachine,
    monitor: TokenMonitor,
    deadlines: ChallengeDeadlines,
    /// Users holding a live connection, for queue-id lookups.
    directory: RwLock<HashMap<UserId, UserHandle>>,
}

impl Gauntlet {
    pub fn new(config: GauntletConfig) -> Self {
        let config = config.validated();
        let timer_config = config.timer_config();
        let queue = Arc::new(AdmissionQueue::new());
        let recovery =
            Recovery::new(Arc::clone(&queue)).with_redirect_delay(config.redirect_delay_secs);
        Self {
            registry: SessionRegistry::new(config.session_config()),
            monitor: TokenMonitor::new(recovery.clone(), &timer_config),
            deadlines: ChallengeDeadlines::new(recovery.clone(), &timer_config),
            layout: LayoutConfig::default(),
            machine: StageMachine::new(),
            directory: RwLock::new(HashMap::new()),
            queue,
            recovery,
            config,
        }
    }

    pub fn config(&self) -> &GauntletConfig {
        &self.config
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &AdmissionQueue {
        &self.queue
    }

    pub fn monitor(&self) -> &TokenMonitor {
        &self.monitor
    }

    pub fn deadlines(&self) -> &ChallengeDeadlines {
        &self.deadlines
    }

    /// How many users currently hold a live connection.
    pub fn connected_users(&self) -> usize {
        self.directory.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    // -- Sessions ----------------------------------------------------------

    /// Starts a new session. The user is not queued until it connects.
    pub fn join(&self) -> (UserHandle, SessionId) {
        self.registry.create()
    }

    /// Looks up an existing session. `None` for unknown or expired ids.
    pub fn resume(&self, session_id: &SessionId) -> Option<UserHandle> {
        self.registry.get(session_id)
    }

    /// Binds a fresh connection to `user`.
    ///
    /// Sends `welcome`. A connection this one replaces is closed. A
    /// waiting user is queued (or keeps its place if a failure already
    /// re-queued it) and every queued client hears its new position.
    pub fn connect(&self, user: &UserHandle, link: ClientLink) {
        let stage = {
            let mut guard = user.lock();
            if let Some(previous) = guard.attach_link(link.clone()) {
                previous.close();
            }
            self.directory
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(user.id(), user.clone());
            guard.notify(Notification::Welcome {
                session_id: guard.session_id().clone(),
                user_id: guard.id(),
                stage: guard.status,
            });
            guard.status
        };
        info!(user_id = %user.id(), link = %link.id(), %stage, "connected");

        if stage == Stage::Waiting {
            self.queue.add_or_attach(user.id(), link);
            self.queue.broadcast_positions();
        }
    }

    /// Unbinds `link` from `user` when the connection goes away.
    ///
    /// A user left without any connection is dropped from the service's
    /// lookups. A waiting user also leaves the queue; a user in a challenge
    /// keeps its deadline running. A stale `link` (the user already holds a
    /// newer one) changes nothing.
    pub fn disconnect(&self, user: &UserHandle, link: &ClientLink) {
        let (detached, stage) = {
            let mut guard = user.lock();
            let detached = guard.detach_link(link);
            if guard.link().is_none() {
                self.forget(user.id());
            }
            (detached, guard.status)
        };
        if !detached {
            return;
        }
        debug!(user_id = %user.id(), link = %link.id(), %stage, "disconnected");
        if stage == Stage::Waiting && self.queue.remove(user.id()) {
            self.queue.broadcast_positions();
        }
    }

    // -- Admission ---------------------------------------------------------

    /// Moves the first connected user in the queue into the Dino Run.
    ///
    /// Entries with no connection (users re-queued after a failure who
    /// never came back) are dropped on the way.
    pub fn admit_next(&self) -> Option<UserHandle> {
        let mut admitted = None;
        while let Some(entry) = self.queue.pop_front() {
            if entry.link.is_none() {
                debug!(user_id = %entry.user_id, "dropping disconnected queue entry");
                continue;
            }
            let handle = self
                .directory
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&entry.user_id)
                .cloned();
            let Some(user) = handle else {
                continue;
            };
            let entered = {
                let mut guard = user.lock();
                let entered = guard.link().is_some()
                    && guard.status == Stage::Waiting
                    && self.machine.execute(&mut guard, Stage::DinoRun).is_ok();
                if entered {
                    let since_join = guard.joined_at().elapsed();
                    info!(
                        user_id = %user.id(),
                        since_join_ms = since_join.as_millis() as u64,
                        "admitted"
                    );
                }
                entered
            };
            if entered {
                self.deadlines.arm(&user, Stage::DinoRun);
                admitted = Some(user);
                break;
            }
        }
        self.queue.broadcast_positions();
        admitted
    }

    // -- Dino Run ----------------------------------------------------------

    /// Reports the action-game result.
    ///
    /// A loss sends the user back. A clear moves them to the captcha and
    /// deals a fresh scene.
    ///
    /// # Errors
    /// [`FlowError::WrongStage`] outside the Dino Run.
    pub fn finish_dino(&self, user: &UserHandle, cleared: bool) -> Result<(), GauntletError> {
        require_stage(&user.lock(), Stage::DinoRun)?;
        self.deadlines.disarm(user.id());

        if !cleared {
            self.recovery.fail_in(user, Stage::DinoRun, FailureKind::GameOver);
            return Ok(());
        }
        {
            let mut guard = user.lock();
            require_stage(&guard, Stage::DinoRun)?;
            self.machine.execute(&mut guard, Stage::Captcha)?;
        }
        self.prepare_captcha(user)
    }

    // -- Captcha -----------------------------------------------------------

    /// Deals a new captcha scene, remembers the answer, and starts the
    /// captcha deadline.
    ///
    /// # Errors
    /// [`FlowError::WrongStage`] outside the captcha stage;
    /// [`GauntletError::Layout`] if the scene could not be built, in which
    /// case the user has already been sent back.
    pub fn prepare_captcha(&self, user: &UserHandle) -> Result<(), GauntletError> {
        let layout = match CaptchaLayout::generate(&self.layout, rand::rng()) {
            Ok(layout) => layout,
            Err(e) => {
                self.recovery.fail_in(user, Stage::Captcha, FailureKind::ServerError);
                return Err(e.into());
            }
        };
        {
            let mut guard = user.lock();
            require_stage(&guard, Stage::Captcha)?;
            let (x, y) = layout.answer();
            guard.set_captcha_target(to_i32(x), to_i32(y));
            guard.notify(layout_notification(&layout));
        }
        self.deadlines.arm(user, Stage::Captcha);
        Ok(())
    }

    /// Scores a captcha click.
    ///
    /// # Errors
    /// [`FlowError::WrongStage`] outside the captcha stage.
    pub fn verify_captcha(
        &self,
        user: &UserHandle,
        x: i32,
        y: i32,
    ) -> Result<AnswerOutcome, GauntletError> {
        let mut guard = user.lock();
        require_stage(&guard, Stage::Captcha)?;

        let target = (guard.captcha.target_x, guard.captcha.target_y);
        if click_hits(target, (x, y), self.config.click_tolerance) {
            // The deadline only touches this record through the lock we hold.
            self.deadlines.disarm(user.id());
            self.machine.execute(&mut guard, Stage::Registering)?;
            let token = guard.issue_token(self.config.token_ttl());
            guard.notify(Notification::RegistrationToken {
                token,
                expires_in_secs: self.config.token_ttl_secs,
            });
            drop(guard);
            self.monitor.watch(user.clone());
            info!(user_id = %user.id(), "captcha passed");
            return Ok(AnswerOutcome::Passed);
        }

        match guard.record_captcha_miss() {
            Attempt::Retry { remaining } => {
                guard.notify(Notification::CaptchaRetry { attempts_remaining: remaining });
                Ok(AnswerOutcome::Retry { remaining })
            }
            Attempt::Exhausted => {
                drop(guard);
                self.deadlines.disarm(user.id());
                self.recovery.fail_in(user, Stage::Captcha, FailureKind::AttemptsExhausted);
                Ok(AnswerOutcome::Failed)
            }
        }
    }

    // -- Fish name ---------------------------------------------------------

    /// Shows the user a fish to name and resets the answer count.
    ///
    /// # Errors
    /// [`FlowError::WrongStage`] outside registration.
    pub fn send_otp(&self, user: &UserHandle) -> Result<(), GauntletError> {
        let mut guard = user.lock();
        require_stage(&guard, Stage::Registering)?;
        let fish = pick_fish(&mut rand::rng(), None);
        guard.otp = OtpState {
            fish_name: fish.name.to_string(),
            attempts: 0,
        };
        guard.notify(Notification::OtpChallenge {
            image_url: self.config.fish_image_url(fish),
            message: "Type the name of this fish.".to_string(),
        });
        debug!(user_id = %user.id(), fish = fish.image, "fish-name question sent");
        Ok(())
    }

    /// Scores a fish-name answer.
    ///
    /// A miss shows a different fish. The last allowed miss sends the user
    /// back to the waiting room.
    ///
    /// # Errors
    /// [`FlowError::WrongStage`] outside registration;
    /// [`FlowError::OtpNotSent`] before [`send_otp`](Self::send_otp).
    pub fn verify_otp(
        &self,
        user: &UserHandle,
        answer: &str,
    ) -> Result<AnswerOutcome, GauntletError> {
        let mut guard = user.lock();
        require_stage(&guard, Stage::Registering)?;
        if guard.otp.fish_name.is_empty() {
            return Err(FlowError::OtpNotSent.into());
        }

        if kana_match(answer, &guard.otp.fish_name) {
            guard.otp = OtpState::default();
            guard.notify(Notification::OtpPassed { message: "Correct.".to_string() });
            info!(user_id = %user.id(), "fish name passed");
            return Ok(AnswerOutcome::Passed);
        }

        match guard.record_otp_miss() {
            Attempt::Retry { remaining } => {
                let next = pick_fish(&mut rand::rng(), Some(guard.otp.fish_name.as_str()));
                guard.otp.fish_name = next.name.to_string();
                guard.notify(Notification::OtpRetry {
                    attempts_remaining: remaining,
                    image_url: self.config.fish_image_url(next),
                });
                Ok(AnswerOutcome::Retry { remaining })
            }
            Attempt::Exhausted => {
                drop(guard);
                self.monitor.unwatch(user.id());
                self.recovery.fail_in(user, Stage::Registering, FailureKind::WrongFishName);
                Ok(AnswerOutcome::Failed)
            }
        }
    }

    // -- Registration ------------------------------------------------------

    /// Submits the registration form.
    ///
    /// A valid token still ends in a forced server error: the form is
    /// never accepted. An expired token sends the user back with the
    /// token-expired notice.
    ///
    /// # Errors
    /// [`FlowError::WrongStage`] outside registration; token errors for a
    /// wrong session or token (the user stays put) and for an expired one
    /// (the user has been sent back).
    pub fn complete_registration(
        &self,
        user: &UserHandle,
        session_id: &SessionId,
        token: &str,
    ) -> Result<(), GauntletError> {
        let checked = {
            let guard = user.lock();
            require_stage(&guard, Stage::Registering)?;
            guard.validate_token(session_id, token)
        };
        match checked {
            Ok(()) => {
                self.monitor.unwatch(user.id());
                info!(user_id = %user.id(), "registration submitted");
                self.recovery.fail_in(user, Stage::Registering, FailureKind::ServerError);
                Ok(())
            }
            Err(e) => {
                if e == TokenError::Expired {
                    self.monitor.unwatch(user.id());
                    self.recovery.fail_in(user, Stage::Registering, FailureKind::TokenExpired);
                }
                Err(e.into())
            }
        }
    }

    // -- Lifecycle ---------------------------------------------------------

    /// Stops every background deadline and watch loop.
    pub fn shutdown(&self) {
        self.monitor.stop();
        let count = self.deadlines.clear();
        info!(deadlines = count, "gauntlet shut down");
    }

    fn forget(&self, user_id: UserId) {
        self.directory
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&user_id);
    }
}

impl Drop for Gauntlet {
    fn drop(&mut self) {
        self.monitor.stop();
    }
}

fn require_stage(user: &User, expected: Stage) -> Result<(), FlowError> {
    if user.status == expected {
        Ok(())
    } else {
        Err(FlowError::WrongStage { expected, actual: user.status })
    }
}

fn layout_notification(layout: &CaptchaLayout) -> Notification {
    Notification::CaptchaLayout {
        width: layout.width,
        height: layout.height,
        sprite_size: layout.sprite_size,
        target_kind: layout.target.kind,
        sprites: layout
            .sprites()
            .map(|p| Sprite { kind: p.kind, x: p.rect.x, y: p.rect.y })
            .collect(),
    }
}

fn to_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}
