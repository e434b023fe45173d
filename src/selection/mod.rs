//! Selection Module
//!
//! The state machine that turns a "pick lunch" request into exactly one
//! catalog item, either through a random spin or through the
//! recommendation service.

mod controller;

pub use controller::SelectionController;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::menu::MenuItem;

/// Condition sent when the user leaves the text box empty
pub const DEFAULT_CONDITION: &str = "운동 후 체력 소모가 큼";
pub const LUCKY_REASON: &str = "오늘의 행운 메뉴입니다! 맛있게 드시고 득점하세요!";
pub const FALLBACK_REASON: &str =
    "AI 코치와 연결이 지연되고 있으나, 오늘 컨디션에는 이 메뉴가 최고입니다!";
pub const AI_ERROR_MESSAGE: &str = "AI 코치와 연결하지 못했습니다. 잠시 후 다시 시도해 주세요.";

/// How a result was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PickSource {
    Random,
    Ai,
    /// The AI path failed or answered off-menu and a random pick stood in
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SelectionState {
    Idle,
    RandomSpinning {
        tick: u32,
    },
    AiThinking,
    Result {
        item: MenuItem,
        reason: String,
        source: PickSource,
        resolved_at: DateTime<Utc>,
    },
    Error {
        message: String,
    },
}

impl SelectionState {
    pub fn mode(&self) -> &'static str {
        match self {
            SelectionState::Idle => "idle",
            SelectionState::RandomSpinning { .. } => "random_spinning",
            SelectionState::AiThinking => "ai_thinking",
            SelectionState::Result { .. } => "result",
            SelectionState::Error { .. } => "error",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, SelectionState::Idle)
    }

    pub fn is_result(&self) -> bool {
        matches!(self, SelectionState::Result { .. })
    }
}

/// What observers see after every transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionSnapshot {
    pub state: SelectionState,
    /// Item highlighted while spinning; display only
    pub selected_id: Option<String>,
    /// Identity of the selection process that produced this snapshot
    pub invocation: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("a selection is already in progress")]
    Busy,
    #[error("AI recommendations need an API key")]
    MissingCredential,
    #[error("cannot reset while {0}")]
    InvalidTransition(&'static str),
    #[error("there is no result to order")]
    NoResult,
}
