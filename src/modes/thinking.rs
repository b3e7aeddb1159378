//! Thinking-mode policy table.
//!
//! A mode is a label stored per session. It never changes how the tree is
//! built; it only decides the step-range guidance echoed back to the caller.

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Per-session thinking depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThinkingMode {
    /// Short, direct chains.
    Fast,
    /// Moderate depth with selective branching.
    Expert,
    /// Long chains with deliberate branching and revision.
    Deep,
}

impl ThinkingMode {
    pub const ALL: [ThinkingMode; 3] = [ThinkingMode::Fast, ThinkingMode::Expert, ThinkingMode::Deep];

    /// Policy entry for this mode.
    pub fn config(self) -> ThinkingModeConfig {
        match self {
            ThinkingMode::Fast => ThinkingModeConfig {
                mode: self,
                recommended_steps: StepRange { min: 3, max: 5 },
                guidance: "Move quickly: state the key insight in each step, avoid branching \
                           unless the first approach clearly fails, and conclude within 5 steps."
                    .to_string(),
            },
            ThinkingMode::Expert => ThinkingModeConfig {
                mode: self,
                recommended_steps: StepRange { min: 5, max: 10 },
                guidance: "Work methodically: evaluate promising nodes, branch when two \
                           approaches look comparable, and revise steps that later evidence \
                           contradicts."
                    .to_string(),
            },
            ThinkingMode::Deep => ThinkingModeConfig {
                mode: self,
                recommended_steps: StepRange { min: 10, max: 20 },
                guidance: "Explore thoroughly: branch on every substantive alternative, \
                           evaluate each branch, and use suggestions to revisit \
                           under-explored paths before concluding."
                    .to_string(),
            },
        }
    }

    /// Guidance for a caller currently at `thought_number`.
    pub fn guidance_for(self, thought_number: u32) -> ModeGuidance {
        let config = self.config();
        let range = config.recommended_steps;
        let (within_range, progress) = if thought_number < range.min {
            (
                true,
                format!(
                    "Step {} of a recommended {}-{}: keep developing the reasoning.",
                    thought_number, range.min, range.max
                ),
            )
        } else if thought_number <= range.max {
            (
                true,
                format!(
                    "Step {} is within the recommended {}-{} range: converge when ready.",
                    thought_number, range.min, range.max
                ),
            )
        } else {
            (
                false,
                format!(
                    "Step {} exceeds the recommended maximum of {} for {} mode: consider concluding.",
                    thought_number, range.max, self
                ),
            )
        };
        ModeGuidance {
            mode: self,
            recommended_steps: range,
            guidance: config.guidance,
            progress,
            within_range,
        }
    }
}

impl std::fmt::Display for ThinkingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThinkingMode::Fast => write!(f, "fast"),
            ThinkingMode::Expert => write!(f, "expert"),
            ThinkingMode::Deep => write!(f, "deep"),
        }
    }
}

impl std::str::FromStr for ThinkingMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fast" => Ok(ThinkingMode::Fast),
            "expert" => Ok(ThinkingMode::Expert),
            "deep" => Ok(ThinkingMode::Deep),
            other => Err(AppError::validation(
                "mode",
                format!("unknown thinking mode '{}' (expected fast, expert or deep)", other),
            )),
        }
    }
}

/// Inclusive recommended step range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRange {
    pub min: u32,
    pub max: u32,
}

/// Policy entry returned by mode set/get.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingModeConfig {
    pub mode: ThinkingMode,
    pub recommended_steps: StepRange,
    pub guidance: String,
}

/// Guidance attached to a recorded thought when the session has a mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeGuidance {
    pub mode: ThinkingMode,
    pub recommended_steps: StepRange,
    pub guidance: String,
    pub progress: String,
    pub within_range: bool,
}
