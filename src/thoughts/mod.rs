//! Thought records and input validation.
//!
//! A [`ThoughtParams`] is what a caller submits; [`ThoughtParams::into_record`]
//! normalizes the text, checks field combinations and stamps the record.
//! Records are immutable once stored. Corrections arrive as new records with
//! `is_revision = true`.

mod store;

pub use store::*;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Longest whitespace run kept after normalization.
pub const MAX_WHITESPACE_RUN: usize = 3;

/// One submitted reasoning step, as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtRecord {
    /// Normalized thought text.
    pub thought: String,
    /// Caller's position for this thought (1-based).
    pub thought_number: u32,
    /// Caller's running estimate, never below `thought_number`.
    pub total_thoughts: u32,
    /// Whether the caller intends to continue after this thought.
    pub next_thought_needed: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_revision: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revises_thought: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_from_thought: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    pub session_id: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

impl ThoughtRecord {
    /// The earlier thought this record points back to, if any.
    pub fn referenced_thought(&self) -> Option<u32> {
        self.revises_thought.or(self.branch_from_thought)
    }

    /// First 100 characters, for summaries and logs.
    pub fn preview(&self) -> String {
        let mut preview: String = self.thought.chars().take(100).collect();
        if self.thought.chars().count() > 100 {
            preview.push_str("...");
        }
        preview
    }
}

/// Input parameters for recording a thought.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThoughtParams {
    /// Session the thought belongs to
    #[serde(alias = "sessionId")]
    pub session_id: String,
    /// Thought content
    pub thought: String,
    /// Position of this thought
    #[serde(alias = "thoughtNumber")]
    pub thought_number: u32,
    /// Estimated total thoughts
    #[serde(alias = "totalThoughts")]
    pub total_thoughts: u32,
    /// Whether another thought will follow
    #[serde(alias = "nextThoughtNeeded")]
    pub next_thought_needed: bool,
    /// Marks this thought as a revision of an earlier one
    #[serde(default, alias = "isRevision")]
    pub is_revision: Option<bool>,
    /// Thought number being revised
    #[serde(default, alias = "revisesThought")]
    pub revises_thought: Option<u32>,
    /// Thought number this branch forks from
    #[serde(default, alias = "branchFromThought")]
    pub branch_from_thought: Option<u32>,
    /// Caller-chosen branch identifier
    #[serde(default, alias = "branchId")]
    pub branch_id: Option<String>,
}

impl ThoughtParams {
    /// Create params for a linear continuation.
    pub fn new(
        session_id: impl Into<String>,
        thought: impl Into<String>,
        thought_number: u32,
        total_thoughts: u32,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            thought: thought.into(),
            thought_number,
            total_thoughts,
            next_thought_needed: true,
            is_revision: None,
            revises_thought: None,
            branch_from_thought: None,
            branch_id: None,
        }
    }

    /// Mark as a revision of `thought_number`.
    pub fn revising(mut self, thought_number: u32) -> Self {
        self.is_revision = Some(true);
        self.revises_thought = Some(thought_number);
        self
    }

    /// Fork a branch from `thought_number`.
    pub fn branching(mut self, thought_number: u32, branch_id: impl Into<String>) -> Self {
        self.branch_from_thought = Some(thought_number);
        self.branch_id = Some(branch_id.into());
        self
    }

    /// Declare this the final thought.
    pub fn finished(mut self) -> Self {
        self.next_thought_needed = false;
        self
    }

    /// Validate and normalize into an immutable record.
    ///
    /// Checks only what can be decided from the params themselves. Whether the
    /// referenced thought exists is the tree's decision.
    pub fn into_record(self, max_thought_length: usize, now_ms: u64) -> AppResult<ThoughtRecord> {
        let session_id = self.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(AppError::validation("session_id", "cannot be empty"));
        }

        let thought = normalize_thought(&self.thought);
        if thought.is_empty() {
            return Err(AppError::validation("thought", "cannot be empty"));
        }
        let length = thought.chars().count();
        if length > max_thought_length {
            return Err(AppError::validation(
                "thought",
                format!("{} characters exceeds limit of {}", length, max_thought_length),
            ));
        }

        if self.thought_number == 0 {
            return Err(AppError::validation("thought_number", "must be >= 1"));
        }
        if self.total_thoughts == 0 {
            return Err(AppError::validation("total_thoughts", "must be >= 1"));
        }

        let is_revision = self.is_revision.unwrap_or(false);
        match (is_revision, self.revises_thought) {
            (true, None) => {
                return Err(AppError::validation(
                    "revises_thought",
                    "required when is_revision is true",
                ))
            }
            (false, Some(_)) => {
                return Err(AppError::validation(
                    "is_revision",
                    "must be true when revises_thought is given",
                ))
            }
            _ => {}
        }

        let branch_id = self
            .branch_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        match (self.branch_from_thought, &branch_id) {
            (Some(_), None) => {
                return Err(AppError::validation(
                    "branch_id",
                    "required together with branch_from_thought",
                ))
            }
            (None, Some(_)) => {
                return Err(AppError::validation(
                    "branch_from_thought",
                    "required together with branch_id",
                ))
            }
            _ => {}
        }

        if is_revision && self.branch_from_thought.is_some() {
            return Err(AppError::validation(
                "branch_from_thought",
                "a thought cannot be both a revision and a branch",
            ));
        }

        if let Some(target) = self.revises_thought {
            if target >= self.thought_number {
                return Err(AppError::business(format!(
                    "thought {} cannot revise thought {} (must reference an earlier thought)",
                    self.thought_number, target
                )));
            }
        }
        if let Some(source) = self.branch_from_thought {
            if source >= self.thought_number {
                return Err(AppError::business(format!(
                    "thought {} cannot branch from thought {} (must reference an earlier thought)",
                    self.thought_number, source
                )));
            }
        }

        Ok(ThoughtRecord {
            thought,
            thought_number: self.thought_number,
            total_thoughts: self.total_thoughts.max(self.thought_number),
            next_thought_needed: self.next_thought_needed,
            is_revision,
            revises_thought: self.revises_thought,
            branch_from_thought: self.branch_from_thought,
            branch_id,
            session_id,
            timestamp: now_ms,
        })
    }
}

/// Trim and cap every whitespace run at [`MAX_WHITESPACE_RUN`] characters.
pub fn normalize_thought(raw: &str) -> String {
    let mut normalized = String::with_capacity(raw.len());
    let mut run = 0;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            run += 1;
            if run > MAX_WHITESPACE_RUN {
                continue;
            }
        } else {
            run = 0;
        }
        normalized.push(ch);
    }
    normalized
}
