use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatOutcome, ChatTurn, RequestMode};

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    #[serde(default)]
    pub mode: Option<String>,
}

impl From<ChatRequest> for ChatTurn {
    fn from(req: ChatRequest) -> Self {
        let mode = RequestMode::from_request(req.mode.as_deref());
        ChatTurn {
            session_id: req.session_id,
            message: req.message,
            mode,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub reply: String,
    pub questions_left: u32,
}

impl From<ChatOutcome> for ChatResponse {
    fn from(outcome: ChatOutcome) -> Self {
        Self {
            session_id: outcome.session_id,
            reply: outcome.reply,
            questions_left: outcome.questions_left,
        }
    }
}

/// Any JSON shape is accepted; fields are only read for logging.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReportRequest {
    #[serde(default)]
    pub session_id: Option<Value>,
    #[serde(default)]
    pub email: Option<Value>,
    #[serde(default)]
    pub profile: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResponse {
    pub status: String,
    pub message: String,
}
