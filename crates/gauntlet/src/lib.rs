//! # Gauntlet
//!
//! A waiting room in front of a registration form, with timed challenges
//! between the queue and the form. Any failure sends the user to the back
//! of the line.
//!
//! [`Gauntlet`] holds the whole flow and can be driven directly;
//! [`GauntletServer`] puts it behind a WebSocket endpoint.
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), gauntlet::GauntletError> {
//! use gauntlet::prelude::*;
//!
//! let server = GauntletServer::builder()
//!     .config(GauntletConfig::default())
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;
mod service;

pub use config::GauntletConfig;
pub use error::GauntletError;
pub use server::{GauntletServer, GauntletServerBuilder};
pub use service::{AnswerOutcome, Gauntlet};

pub mod prelude {
    pub use crate::{
        AnswerOutcome, Gauntlet, GauntletConfig, GauntletError, GauntletServer,
        GauntletServerBuilder,
    };
    pub use gauntlet_flow::{AdmissionQueue, FailureKind, FlowError, Recovery, StageMachine};
    pub use gauntlet_placement::{CaptchaLayout, LayoutConfig, PlacementEngine, Rect};
    pub use gauntlet_protocol::{ClientMessage, Notification, SessionId, Stage, UserId};
    pub use gauntlet_session::{ClientLink, Outbound, SessionRegistry, UserHandle};
    pub use gauntlet_timer::{ChallengeDeadlines, TimeoutSupervisor, TimerConfig, TokenMonitor};
}
