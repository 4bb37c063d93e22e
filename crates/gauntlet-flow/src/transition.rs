//! The stage transition table.
//!
//! ```text
//! Waiting ──→ DinoRun ──→ Captcha ──→ Registering
//!    ↑           │           │             │
//!    └───────────┴───────────┴─────────────┘
//! ```
//!
//! Forward edges follow the flow order with no skipping. Every stage other
//! than `Waiting` may fall back to `Waiting`.

use gauntlet_protocol::Stage;

/// Allowed successors of `from`.
pub fn successors(from: Stage) -> &'static [Stage] {
    match from {
        Stage::Waiting => &[Stage::DinoRun],
        Stage::DinoRun => &[Stage::Captcha, Stage::Waiting],
        Stage::Captcha => &[Stage::Registering, Stage::Waiting],
        Stage::Registering => &[Stage::Waiting],
    }
}

/// Returns `true` if the table has an edge `from → to`.
pub fn can_transition(from: Stage, to: Stage) -> bool {
    successors(from).contains(&to)
}

/// Instruction shown to the user on entering `stage`.
pub fn instruction(stage: Stage) -> &'static str {
    match stage {
        Stage::Waiting => "You are back in line. Please wait for your turn.",
        Stage::DinoRun => "Start the Dino Run game.",
        Stage::Captcha => "Find the character shown and click it.",
        Stage::Registering => "Fill in the registration form.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waiting_only_advances_to_first_challenge() {
        assert!(can_transition(Stage::Waiting, Stage::DinoRun));
        assert!(!can_transition(Stage::Waiting, Stage::Captcha));
        assert!(!can_transition(Stage::Waiting, Stage::Registering));
        assert!(!can_transition(Stage::Waiting, Stage::Waiting));
    }

    #[test]
    fn test_every_non_waiting_stage_can_fall_back() {
        for stage in Stage::ALL {
            if stage != Stage::Waiting {
                assert!(can_transition(stage, Stage::Waiting), "{stage}");
            }
        }
    }

    #[test]
    fn test_forward_edges_do_not_skip() {
        assert!(can_transition(Stage::DinoRun, Stage::Captcha));
        assert!(!can_transition(Stage::DinoRun, Stage::Registering));
        assert!(can_transition(Stage::Captcha, Stage::Registering));
        assert!(!can_transition(Stage::Registering, Stage::Captcha));
    }

    #[test]
    fn test_instruction_is_non_empty_for_every_stage() {
        for stage in Stage::ALL {
            assert!(!instruction(stage).is_empty());
        }
    }
}
