//! Chat orchestration: session resolution, quota gating and message logging
//! around a single reply generation.

use log::{error, info};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::model::ReplyGenerator;
use crate::quota::{GateDecision, QuotaGate};
use crate::store::{MessageLog, Role, SessionStore, StoreError};

/// Stored as the assistant turn when the generator fails.
pub const GENERATION_FAILED_NOTICE: &str =
    "Sorry, I couldn't generate a reply right now. Please try again shortly.";

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("reply generation failed: {0}")]
    Generator(String),
}

/// Whether a request counts against the free quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMode {
    Chat,
    Uncounted,
}

impl RequestMode {
    /// Missing mode means chat; any other explicit value skips the quota gate.
    pub fn from_request(mode: Option<&str>) -> Self {
        match mode {
            None | Some("chat") => RequestMode::Chat,
            Some(_) => RequestMode::Uncounted,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub session_id: Option<String>,
    pub message: String,
    pub mode: RequestMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub session_id: String,
    pub reply: String,
    pub questions_left: u32,
}

#[derive(Clone)]
pub struct ChatService {
    sessions: Arc<dyn SessionStore>,
    messages: Arc<dyn MessageLog>,
    generator: Arc<dyn ReplyGenerator>,
    gate: QuotaGate,
    payment_url: String,
}

impl ChatService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        messages: Arc<dyn MessageLog>,
        generator: Arc<dyn ReplyGenerator>,
        gate: QuotaGate,
        payment_url: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            messages,
            generator,
            gate,
            payment_url: payment_url.into(),
        }
    }

    pub fn upgrade_notice(&self) -> String {
        format!(
            "You have reached your free limit of {} questions. Kindly upgrade to continue this chat: {}",
            self.gate.limit(),
            self.payment_url
        )
    }

    /// Return `requested` if it names a stored session, otherwise mint and
    /// store a new one.
    pub async fn resolve_session(&self, requested: Option<&str>) -> Result<String, StoreError> {
        if let Some(id) = requested.filter(|id| !id.is_empty()) {
            if self.sessions.find_session(id).await?.is_some() {
                return Ok(id.to_string());
            }
        }

        let session_id = Uuid::new_v4().to_string();
        self.sessions.create_session(&session_id).await?;
        info!("Created session {}", session_id);

        Ok(session_id)
    }

    pub async fn handle(&self, turn: ChatTurn) -> Result<ChatOutcome, ChatError> {
        let session_id = self.resolve_session(turn.session_id.as_deref()).await?;

        let counted = match turn.mode {
            RequestMode::Chat => match self.gate.check(self.sessions.as_ref(), &session_id).await? {
                GateDecision::Allowed { count } => Some(count),
                GateDecision::Blocked { .. } => {
                    let notice = self.upgrade_notice();
                    self.messages
                        .append_message(&session_id, Role::User, &turn.message)
                        .await?;
                    self.messages
                        .append_message(&session_id, Role::Assistant, &notice)
                        .await?;

                    return Ok(ChatOutcome {
                        session_id,
                        reply: notice,
                        questions_left: 0,
                    });
                }
            },
            RequestMode::Uncounted => None,
        };

        self.messages
            .append_message(&session_id, Role::User, &turn.message)
            .await?;

        let reply = match self.generator.generate(&turn.message).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Reply generation failed for session {}: {}", session_id, e);
                self.messages
                    .append_message(&session_id, Role::Assistant, GENERATION_FAILED_NOTICE)
                    .await?;
                return Err(ChatError::Generator(e.to_string()));
            }
        };

        self.messages
            .append_message(&session_id, Role::Assistant, &reply)
            .await?;

        let count = match counted {
            Some(count) => count,
            None => self
                .sessions
                .find_session(&session_id)
                .await?
                .map(|session| session.questions_count)
                .ok_or_else(|| StoreError::SessionNotFound(session_id.clone()))?,
        };

        Ok(ChatOutcome {
            session_id,
            reply,
            questions_left: self.gate.remaining(count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EchoGenerator;
    use crate::store::SqliteStore;
    use async_trait::async_trait;

    struct FailingGenerator;

    #[async_trait]
    impl ReplyGenerator for FailingGenerator {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            Err(anyhow::anyhow!("backend timed out"))
        }
    }

    async fn service_with(generator: Arc<dyn ReplyGenerator>) -> (ChatService, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let service = ChatService::new(
            store.clone(),
            store.clone(),
            generator,
            QuotaGate::new(crate::quota::DEFAULT_FREE_QUESTIONS),
            "https://pay.example/upgrade",
        );
        (service, store)
    }

    fn chat(session_id: Option<&str>, message: &str) -> ChatTurn {
        ChatTurn {
            session_id: session_id.map(String::from),
            message: message.to_string(),
            mode: RequestMode::Chat,
        }
    }

    async fn transcript(store: &SqliteStore, session_id: &str) -> Vec<(String, String)> {
        sqlx::query_as("SELECT role, text FROM messages WHERE session_id = ?1 ORDER BY id")
            .bind(session_id)
            .fetch_all(store.pool())
            .await
            .unwrap()
    }

    #[test]
    fn mode_defaults_to_chat() {
        assert_eq!(RequestMode::from_request(None), RequestMode::Chat);
        assert_eq!(RequestMode::from_request(Some("chat")), RequestMode::Chat);
        assert_eq!(RequestMode::from_request(Some("report")), RequestMode::Uncounted);
        assert_eq!(RequestMode::from_request(Some("")), RequestMode::Uncounted);
    }

    #[tokio::test]
    async fn test_free_quota_scenario() {
        let (service, store) = service_with(Arc::new(EchoGenerator)).await;

        let first = service.handle(chat(None, "Hi")).await.unwrap();
        assert_eq!(first.reply, "AI: Hi");
        assert_eq!(first.questions_left, 2);
        let sid = first.session_id.clone();

        let second = service.handle(chat(Some(sid.as_str()), "More")).await.unwrap();
        assert_eq!(second.session_id, sid);
        assert_eq!(second.reply, "AI: More");
        assert_eq!(second.questions_left, 1);

        let third = service.handle(chat(Some(sid.as_str()), "Again")).await.unwrap();
        assert_eq!(third.reply, "AI: Again");
        assert_eq!(third.questions_left, 0);

        let fourth = service.handle(chat(Some(sid.as_str()), "One more")).await.unwrap();
        assert_eq!(fourth.session_id, sid);
        assert_eq!(fourth.reply, service.upgrade_notice());
        assert_eq!(fourth.questions_left, 0);

        let fifth = service.handle(chat(Some(sid.as_str()), "Please")).await.unwrap();
        assert_eq!(fifth.reply, service.upgrade_notice());
        assert_eq!(fifth.questions_left, 0);

        let session = store.find_session(&sid).await.unwrap().unwrap();
        assert_eq!(session.questions_count, 5);

        let log = transcript(&store, &sid).await;
        assert_eq!(log.len(), 10);
        assert_eq!(log[6], ("user".to_string(), "One more".to_string()));
        assert_eq!(log[7], ("assistant".to_string(), service.upgrade_notice()));
    }

    #[tokio::test]
    async fn test_upgrade_notice_names_limit_and_link() {
        let (service, _store) = service_with(Arc::new(EchoGenerator)).await;
        assert_eq!(
            service.upgrade_notice(),
            "You have reached your free limit of 3 questions. Kindly upgrade to continue this chat: https://pay.example/upgrade"
        );
    }

    #[tokio::test]
    async fn test_unknown_session_gets_fresh_id() {
        let (service, store) = service_with(Arc::new(EchoGenerator)).await;

        let a = service.handle(chat(Some("made-up"), "x")).await.unwrap();
        assert_ne!(a.session_id, "made-up");
        assert_eq!(a.questions_left, 2);

        let b = service.handle(chat(Some(""), "y")).await.unwrap();
        let c = service.handle(chat(None, "z")).await.unwrap();
        assert_ne!(a.session_id, b.session_id);
        assert_ne!(b.session_id, c.session_id);
        assert!(store.find_session("made-up").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_known_session_keeps_counter() {
        let (service, store) = service_with(Arc::new(EchoGenerator)).await;
        store.create_session("existing").await.unwrap();
        store.increment_questions("existing").await.unwrap();
        store.increment_questions("existing").await.unwrap();

        let outcome = service.handle(chat(Some("existing"), "hello")).await.unwrap();
        assert_eq!(outcome.session_id, "existing");
        assert_eq!(outcome.questions_left, 0);
        assert_eq!(outcome.reply, "AI: hello");
    }

    #[tokio::test]
    async fn test_uncounted_mode_skips_gate() {
        let (service, store) = service_with(Arc::new(EchoGenerator)).await;

        let first = service.handle(chat(None, "counted")).await.unwrap();
        let sid = first.session_id;

        let outcome = service
            .handle(ChatTurn {
                session_id: Some(sid.clone()),
                message: "free".to_string(),
                mode: RequestMode::Uncounted,
            })
            .await
            .unwrap();

        assert_eq!(outcome.reply, "AI: free");
        assert_eq!(outcome.questions_left, 2);

        let session = store.find_session(&sid).await.unwrap().unwrap();
        assert_eq!(session.questions_count, 1);
        assert_eq!(transcript(&store, &sid).await.len(), 4);
    }

    #[tokio::test]
    async fn test_generator_failure_leaves_marker() {
        let (service, store) = service_with(Arc::new(FailingGenerator)).await;
        store.create_session("s").await.unwrap();

        let err = service.handle(chat(Some("s"), "hello")).await.unwrap_err();
        assert!(matches!(err, ChatError::Generator(ref msg) if msg.contains("timed out")));

        let log = transcript(&store, "s").await;
        assert_eq!(
            log,
            vec![
                ("user".to_string(), "hello".to_string()),
                ("assistant".to_string(), GENERATION_FAILED_NOTICE.to_string()),
            ]
        );

        let session = store.find_session("s").await.unwrap().unwrap();
        assert_eq!(session.questions_count, 1);
    }

    #[tokio::test]
    async fn test_blocked_path_never_calls_generator() {
        let (service, store) = service_with(Arc::new(FailingGenerator)).await;
        store.create_session("over").await.unwrap();
        for _ in 0..3 {
            store.increment_questions("over").await.unwrap();
        }

        let outcome = service.handle(chat(Some("over"), "anything")).await.unwrap();
        assert_eq!(outcome.reply, service.upgrade_notice());
        assert_eq!(outcome.questions_left, 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_quota() {
        let (service, store) = service_with(Arc::new(EchoGenerator)).await;
        store.create_session("shared").await.unwrap();

        let mut handles = Vec::new();
        for i in 0..6 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .handle(chat(Some("shared"), &format!("q{i}")))
                    .await
                    .unwrap()
            }));
        }

        let mut answered = 0;
        let mut blocked = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            if outcome.reply == service.upgrade_notice() {
                blocked += 1;
            } else {
                answered += 1;
            }
        }

        assert_eq!(answered, 3);
        assert_eq!(blocked, 3);
        assert_eq!(transcript(&store, "shared").await.len(), 12);
    }
}
