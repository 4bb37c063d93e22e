//! Core protocol types for Gauntlet's wire format.
//!
//! Everything here is serialized as internally tagged JSON
//! (`{"type": "...", ...}`), which is the shape the browser client switches
//! on.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A stable identifier for one participant.
///
/// Allocated by the session registry when the participant first shows up
/// and never reused for the lifetime of the process. Serializes as a plain
/// number thanks to `#[serde(transparent)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "U-{}", self.0)
    }
}

/// The opaque session identifier a client presents to resume its place.
///
/// Held by the client (cookie or local storage) and sent back in
/// [`ClientMessage::Hello`]. Treated as a secret: it is the only thing that
/// ties a new connection to an existing user record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps a raw session string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the raw session string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only a prefix goes to logs; the full id is a bearer secret.
        let shown = self.0.get(..8).unwrap_or(&self.0);
        write!(f, "{shown}…")
    }
}

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// The phase of the registration flow a user is in.
///
/// ```text
/// Waiting → DinoRun → Captcha → Registering
///    ↑         │          │           │
///    └─────────┴──────────┴───────────┘   (any failure)
/// ```
///
/// The wire names match what the browser client already switches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// In the admission queue, waiting for a turn.
    #[serde(rename = "waiting")]
    Waiting,
    /// Playing the endless-runner action game.
    #[serde(rename = "stage1_dino")]
    DinoRun,
    /// Finding the hidden character among decoys.
    #[serde(rename = "stage2_captcha")]
    Captcha,
    /// Holding a registration token, filling in the final form.
    #[serde(rename = "registering")]
    Registering,
}

impl Stage {
    /// All stages, in flow order.
    pub const ALL: [Stage; 4] = [
        Stage::Waiting,
        Stage::DinoRun,
        Stage::Captcha,
        Stage::Registering,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::DinoRun => "stage1_dino",
            Self::Captcha => "stage2_captcha",
            Self::Registering => "registering",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// One sprite of a captcha layout: which character kind, and its top-left
/// corner inside the background.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sprite {
    pub kind: u8,
    pub x: u32,
    pub y: u32,
}

/// Messages the server pushes to a client.
///
/// Delivery is best-effort: the core never waits for, retries, or
/// confirms any of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Reply to `hello`: the session to remember and the current stage.
    Welcome {
        session_id: SessionId,
        user_id: UserId,
        stage: Stage,
    },

    /// Live queue position, 1-indexed, with the queue size at the same
    /// instant.
    #[serde(rename = "queueUpdate")]
    QueueUpdate { position: usize, total: usize },

    /// The user moved to a new stage.
    StageChange { stage: Stage, message: String },

    /// Forced reset. The client shows `message` and reconnects after
    /// `redirect_delay` seconds.
    Failure { message: String, redirect_delay: u64 },

    /// The registration token lapsed before the form was submitted.
    #[serde(rename = "tokenExpired")]
    TokenExpired { message: String },

    /// A freshly generated captcha. Sprites are listed in draw order;
    /// exactly one has `kind == target_kind`.
    CaptchaLayout {
        width: u32,
        height: u32,
        sprite_size: u32,
        target_kind: u8,
        sprites: Vec<Sprite>,
    },

    /// A wrong captcha click that did not exhaust the attempts.
    CaptchaRetry { attempts_remaining: u32 },

    /// Issued after the last challenge; must accompany `register`.
    RegistrationToken { token: String, expires_in_secs: u64 },

    /// A fish picture whose name the user has to type.
    OtpChallenge { image_url: String, message: String },

    /// A wrong fish name. `image_url` is a different fish to try.
    OtpRetry {
        attempts_remaining: u32,
        image_url: String,
    },

    /// The fish name was right.
    OtpPassed { message: String },

    /// Keep-alive reply.
    Pong,

    /// A request the server refused. `code` is a stable machine-readable
    /// tag such as `INVALID_TRANSITION`.
    Error { code: String, message: String },
}

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Messages a client sends over its connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First frame on every connection. `None` (or an unknown id) starts a
    /// new session.
    Hello {
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Keep-alive.
    Ping,

    /// Outcome of the action game.
    DinoResult {
        cleared: bool,
        #[serde(default)]
        score: u32,
    },

    /// A click on the captcha background, in image pixels.
    CaptchaClick { x: i32, y: i32 },

    /// Asks for a fish picture to name.
    OtpRequest,

    /// The user's guess at the fish's name.
    OtpAnswer { answer: String },

    /// Final registration submission.
    Register { token: String },
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_serializes_as_plain_number() {
        assert_eq!(serde_json::to_string(&UserId(42)).unwrap(), "42");
    }

    #[test]
    fn test_user_id_display() {
        assert_eq!(UserId(7).to_string(), "U-7");
    }

    #[test]
    fn test_session_id_display_truncates_secret() {
        let sid = SessionId::new("0123456789abcdef");
        assert_eq!(sid.to_string(), "01234567…");
        assert_eq!(sid.as_str(), "0123456789abcdef");
    }

    #[test]
    fn test_session_id_display_short_value_is_kept() {
        assert_eq!(SessionId::new("abc").to_string(), "abc…");
    }

    #[test]
    fn test_stage_wire_names_match_client() {
        let json = serde_json::to_string(&Stage::DinoRun).unwrap();
        assert_eq!(json, "\"stage1_dino\"");
        let json = serde_json::to_string(&Stage::Captcha).unwrap();
        assert_eq!(json, "\"stage2_captcha\"");
        for stage in Stage::ALL {
            let json = serde_json::to_string(&stage).unwrap();
            assert_eq!(json, format!("\"{stage}\""));
        }
    }

    #[test]
    fn test_queue_update_json_format() {
        let json = serde_json::to_value(Notification::QueueUpdate {
            position: 2,
            total: 5,
        })
        .unwrap();
        assert_eq!(json["type"], "queueUpdate");
        assert_eq!(json["position"], 2);
        assert_eq!(json["total"], 5);
    }

    #[test]
    fn test_failure_json_format() {
        let json = serde_json::to_value(Notification::Failure {
            message: "timeout".into(),
            redirect_delay: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "failure");
        assert_eq!(json["message"], "timeout");
        assert_eq!(json["redirect_delay"], 3);
    }

    #[test]
    fn test_stage_change_json_format() {
        let json = serde_json::to_value(Notification::StageChange {
            stage: Stage::Captcha,
            message: "go".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "stage_change");
        assert_eq!(json["stage"], "stage2_captcha");
    }

    #[test]
    fn test_token_expired_json_format() {
        let json = serde_json::to_value(Notification::TokenExpired {
            message: "late".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "tokenExpired");
    }

    #[test]
    fn test_otp_messages_json_format() {
        let json = serde_json::to_value(Notification::OtpRetry {
            attempts_remaining: 2,
            image_url: "/fish/fugu.jpg".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "otp_retry");
        assert_eq!(json["attempts_remaining"], 2);

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"otp_answer","answer":"ふぐ"}"#).unwrap();
        assert_eq!(msg, ClientMessage::OtpAnswer { answer: "ふぐ".into() });
    }

    #[test]
    fn test_hello_without_session_id_defaults_to_none() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"hello"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Hello { session_id: None });
    }

    #[test]
    fn test_dino_result_score_is_optional() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"dino_result","cleared":true}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::DinoResult {
                cleared: true,
                score: 0
            }
        );
    }

    #[test]
    fn test_unknown_client_message_type_is_rejected() {
        let result: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type":"skip_the_line"}"#);
        assert!(result.is_err());
    }
}
