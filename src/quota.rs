use log::info;

use crate::store::{SessionStore, StoreError};

pub const DEFAULT_FREE_QUESTIONS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allowed { count: u32 },
    Blocked { count: u32 },
}

/// Free-tier limit on chat-mode questions per session.
#[derive(Debug, Clone, Copy)]
pub struct QuotaGate {
    limit: u32,
}

impl QuotaGate {
    pub fn new(limit: u32) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Count one question against the session and decide whether it may be
    /// answered. The increment happens even when the result is `Blocked`.
    pub async fn check(
        &self,
        sessions: &dyn SessionStore,
        session_id: &str,
    ) -> Result<GateDecision, StoreError> {
        let count = sessions.increment_questions(session_id).await?;
        let decision = self.decide(count);

        if let GateDecision::Blocked { .. } = decision {
            info!(
                "Session {} exceeded free limit ({} > {})",
                session_id, count, self.limit
            );
        }

        Ok(decision)
    }

    pub fn decide(&self, count: u32) -> GateDecision {
        if count > self.limit {
            GateDecision::Blocked { count }
        } else {
            GateDecision::Allowed { count }
        }
    }

    /// Questions left after `count` have been used; never negative.
    pub fn remaining(&self, count: u32) -> u32 {
        self.limit.saturating_sub(count)
    }
}
