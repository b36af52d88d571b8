//! Chat resolution.
//!
//! A message is answered by the first rule that applies:
//!
//! 1. a stored FAQ whose question matches the message,
//! 2. for file-like requests, a notice or timetable whose title matches,
//!    or a fixed "not found" reply,
//! 3. otherwise the AI fallback.
//!
//! Store and provider failures are logged and collapsed into a single
//! generic reply; callers always get a [`ChatReply`].

pub mod classifier;
pub mod matcher;
pub mod prompt;

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

use crate::db::{ContentStore, StoreError};
use crate::llm::{ChatCompleter, ChatRequest, LlmError};
pub use classifier::is_file_query;
pub use matcher::{MatchDirection, TextMatcher};
use prompt::{ContextSnapshot, CONTEXT_FAQ_LIMIT, CONTEXT_NOTICE_LIMIT, CONTEXT_TIMETABLE_LIMIT};

pub const EMPTY_INPUT_REPLY: &str = "Please enter a message first.";
pub const NOT_FOUND_REPLY: &str = "No related file found in the database.";
pub const FAILURE_REPLY: &str = "Something went wrong. Please try again.";

/// How the AI fallback is prompted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackMode {
    /// Rules only, low temperature.
    Minimal,
    /// Rules plus a snapshot of recent FAQs, notices and timetables.
    Context,
}

impl FallbackMode {
    pub fn temperature(&self) -> f32 {
        match self {
            FallbackMode::Minimal => 0.2,
            FallbackMode::Context => 0.7,
        }
    }
}

impl FromStr for FallbackMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Ok(FallbackMode::Minimal),
            "context" | "context-injected" => Ok(FallbackMode::Context),
            other => Err(format!("expected `minimal` or `context`, got `{other}`")),
        }
    }
}

/// The one reply a chat message produces.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    Faq { text: String },
    File { text: String, file_url: Option<String> },
    NotFound { text: String },
    Ai { text: String },
    Failed { text: String },
    EmptyInput,
}

impl ChatReply {
    pub fn text(&self) -> &str {
        match self {
            ChatReply::Faq { text }
            | ChatReply::File { text, .. }
            | ChatReply::NotFound { text }
            | ChatReply::Ai { text }
            | ChatReply::Failed { text } => text,
            ChatReply::EmptyInput => EMPTY_INPUT_REPLY,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum ResolveError {
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
    #[error("provider error: {0}")]
    Provider(#[from] LlmError),
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub fallback_mode: FallbackMode,
    pub match_direction: MatchDirection,
    pub model: Option<String>,
    pub public_url: Option<String>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fallback_mode: FallbackMode::Minimal,
            match_direction: MatchDirection::Either,
            model: None,
            public_url: None,
        }
    }
}

pub struct ChatPipeline {
    store: Arc<dyn ContentStore>,
    completer: Arc<dyn ChatCompleter>,
    options: PipelineOptions,
}

impl ChatPipeline {
    pub fn new(
        store: Arc<dyn ContentStore>,
        completer: Arc<dyn ChatCompleter>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            completer,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub async fn resolve(&self, message: &str) -> ChatReply {
        let message = message.trim();
        if message.is_empty() {
            return ChatReply::EmptyInput;
        }

        match self.try_resolve(message).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Chat error: {e}");
                ChatReply::Failed {
                    text: FAILURE_REPLY.to_string(),
                }
            }
        }
    }

    async fn try_resolve(&self, message: &str) -> Result<ChatReply, ResolveError> {
        let matcher = TextMatcher::new(message, self.options.match_direction);

        if let Some(faq) = self.store.find_faq(&matcher).await? {
            info!(faq_id = %faq.id, "FAQ match found");
            return Ok(ChatReply::Faq { text: faq.answer });
        }

        if is_file_query(message) {
            return self.resolve_file(&matcher).await;
        }

        let text = self.fallback(message).await?;
        Ok(ChatReply::Ai { text })
    }

    async fn resolve_file(&self, matcher: &TextMatcher) -> Result<ChatReply, ResolveError> {
        if let Some(notice) = self.store.find_notice(matcher).await? {
            info!(notice_id = %notice.id, "Notice match found");
            return Ok(ChatReply::File {
                text: format!("Here is the file you requested: {}", notice.title),
                file_url: self.link(notice.file_url.as_deref()),
            });
        }

        if let Some(timetable) = self.store.find_timetable(matcher).await? {
            info!(timetable_id = %timetable.id, "Timetable match found");
            return Ok(ChatReply::File {
                text: format!("Here is the timetable you requested: {}", timetable.title),
                file_url: self.link(timetable.file_url.as_deref()),
            });
        }

        info!("File requested but nothing matched");
        Ok(ChatReply::NotFound {
            text: NOT_FOUND_REPLY.to_string(),
        })
    }

    async fn fallback(&self, message: &str) -> Result<String, ResolveError> {
        let mode = self.options.fallback_mode;
        let system_prompt = match mode {
            FallbackMode::Minimal => prompt::MINIMAL_PROMPT.to_string(),
            FallbackMode::Context => {
                let snapshot = ContextSnapshot {
                    faqs: self.store.recent_faqs(CONTEXT_FAQ_LIMIT).await?,
                    notices: self.store.recent_notices(CONTEXT_NOTICE_LIMIT).await?,
                    timetables: self.store.recent_timetables(CONTEXT_TIMETABLE_LIMIT).await?,
                };
                prompt::context_prompt(
                    &snapshot,
                    &chrono::Local::now(),
                    self.options.public_url.as_deref(),
                )
            }
        };

        let model = self
            .options
            .model
            .as_deref()
            .unwrap_or_else(|| self.completer.default_model());
        let request =
            ChatRequest::single_turn(model, system_prompt, message, mode.temperature());

        info!(?mode, model, "Falling back to AI provider");
        let response = self.completer.complete(&request).await?;
        Ok(response.content)
    }

    fn link(&self, file_url: Option<&str>) -> Option<String> {
        file_url.map(|path| public_file_url(path, self.options.public_url.as_deref()))
    }
}

/// Prefix a stored `/uploads/...` path with the public base URL, if any.
pub fn public_file_url(path: &str, public_url: Option<&str>) -> String {
    match public_url {
        Some(base) if !base.is_empty() => format!("{}{}", base.trim_end_matches('/'), path),
        _ => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Faq, Notice, Timetable};
    use crate::db::Database;
    use crate::llm::ChatResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records every request and replies with a fixed answer or error.
    struct FakeCompleter {
        calls: AtomicUsize,
        requests: Mutex<Vec<ChatRequest>>,
        fail: bool,
    }

    impl FakeCompleter {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_request(&self) -> ChatRequest {
            self.requests.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl ChatCompleter for FakeCompleter {
        async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(LlmError::Api {
                    status: 500,
                    message: "upstream exploded".into(),
                });
            }
            Ok(ChatResponse {
                content: "Paris is the capital of France.".into(),
                model: request.model.clone(),
            })
        }

        fn default_model(&self) -> &str {
            "llama-3.1-8b-instant"
        }
    }

    /// A store whose every query fails.
    struct BrokenStore;

    #[async_trait]
    impl ContentStore for BrokenStore {
        async fn find_faq(&self, _: &TextMatcher) -> Result<Option<Faq>, StoreError> {
            Err(StoreError::Poisoned)
        }
        async fn find_notice(&self, _: &TextMatcher) -> Result<Option<Notice>, StoreError> {
            Err(StoreError::Poisoned)
        }
        async fn find_timetable(&self, _: &TextMatcher) -> Result<Option<Timetable>, StoreError> {
            Err(StoreError::Poisoned)
        }
        async fn recent_faqs(&self, _: usize) -> Result<Vec<Faq>, StoreError> {
            Err(StoreError::Poisoned)
        }
        async fn recent_notices(&self, _: usize) -> Result<Vec<Notice>, StoreError> {
            Err(StoreError::Poisoned)
        }
        async fn recent_timetables(&self, _: usize) -> Result<Vec<Timetable>, StoreError> {
            Err(StoreError::Poisoned)
        }
    }

    fn seeded() -> Arc<Database> {
        let db = Database::open_in_memory().unwrap();
        db.create_faq(
            "What are the hostel fee rules?",
            "Hostel fees are due by the 10th of every month.",
            Some("hostel"),
        )
        .unwrap();
        db.create_notice(
            "Mid-term exam notice",
            "Mid-terms begin on Monday.",
            Some("exam"),
            Some("/uploads/midterm.pdf"),
        )
        .unwrap();
        db.create_timetable(
            "Semester 3 Timetable",
            Some("BTech"),
            "CSE",
            "3",
            Some("/uploads/sem3.pdf"),
        )
        .unwrap();
        Arc::new(db)
    }

    fn pipeline(
        store: Arc<dyn ContentStore>,
        completer: Arc<FakeCompleter>,
        options: PipelineOptions,
    ) -> ChatPipeline {
        ChatPipeline::new(store, completer, options)
    }

    #[tokio::test]
    async fn test_faq_answer_skips_provider() {
        let completer = FakeCompleter::new(false);
        let chat = pipeline(seeded(), completer.clone(), PipelineOptions::default());

        let reply = chat.resolve("What are the hostel fee rules?").await;
        assert_eq!(
            reply,
            ChatReply::Faq {
                text: "Hostel fees are due by the 10th of every month.".into()
            }
        );
        assert_eq!(completer.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected_before_any_lookup() {
        let completer = FakeCompleter::new(false);
        let chat = pipeline(Arc::new(BrokenStore), completer.clone(), PipelineOptions::default());

        for message in ["", "   ", "\n\t"] {
            assert_eq!(chat.resolve(message).await, ChatReply::EmptyInput);
        }
        assert_eq!(completer.calls(), 0);
    }

    #[tokio::test]
    async fn test_notice_title_match_returns_file() {
        let completer = FakeCompleter::new(false);
        let chat = pipeline(seeded(), completer.clone(), PipelineOptions::default());

        let reply = chat.resolve("exam notice").await;
        assert_eq!(
            reply,
            ChatReply::File {
                text: "Here is the file you requested: Mid-term exam notice".into(),
                file_url: Some("/uploads/midterm.pdf".into()),
            }
        );
        assert_eq!(completer.calls(), 0);
    }

    #[tokio::test]
    async fn test_timetable_match_returns_file() {
        let completer = FakeCompleter::new(false);
        let chat = pipeline(seeded(), completer, PipelineOptions::default());

        let reply = chat.resolve("semester 3 timetable").await;
        assert_eq!(
            reply,
            ChatReply::File {
                text: "Here is the timetable you requested: Semester 3 Timetable".into(),
                file_url: Some("/uploads/sem3.pdf".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_timetable_request_in_any_word_order() {
        let completer = FakeCompleter::new(false);
        let chat = pipeline(seeded(), completer.clone(), PipelineOptions::default());

        let reply = chat.resolve("timetable for semester 3").await;
        assert_eq!(
            reply,
            ChatReply::File {
                text: "Here is the timetable you requested: Semester 3 Timetable".into(),
                file_url: Some("/uploads/sem3.pdf".into()),
            }
        );
        assert_eq!(completer.calls(), 0);
    }

    #[tokio::test]
    async fn test_pattern_only_direction_misses_reordered_title() {
        let completer = FakeCompleter::new(false);
        let options = PipelineOptions {
            match_direction: MatchDirection::Pattern,
            ..Default::default()
        };
        let chat = pipeline(seeded(), completer, options);

        assert_eq!(
            chat.resolve("timetable for semester 3").await,
            ChatReply::NotFound {
                text: NOT_FOUND_REPLY.into()
            }
        );
    }

    #[tokio::test]
    async fn test_contains_direction_matches_longer_message() {
        let completer = FakeCompleter::new(false);
        let options = PipelineOptions {
            match_direction: MatchDirection::Contains,
            public_url: Some("http://localhost:5000".into()),
            ..Default::default()
        };
        let chat = pipeline(seeded(), completer, options);

        let reply = chat.resolve("Please send the Semester 3 Timetable pdf").await;
        assert_eq!(
            reply,
            ChatReply::File {
                text: "Here is the timetable you requested: Semester 3 Timetable".into(),
                file_url: Some("http://localhost:5000/uploads/sem3.pdf".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_file_query_without_match_is_not_found() {
        let completer = FakeCompleter::new(false);
        let chat = pipeline(seeded(), completer.clone(), PipelineOptions::default());

        for message in ["pyq for operating systems", "timetable for semester 5"] {
            assert_eq!(
                chat.resolve(message).await,
                ChatReply::NotFound {
                    text: NOT_FOUND_REPLY.into()
                }
            );
        }
        assert_eq!(completer.calls(), 0);
    }

    #[tokio::test]
    async fn test_general_question_goes_to_provider_with_minimal_prompt() {
        let completer = FakeCompleter::new(false);
        let chat = pipeline(seeded(), completer.clone(), PipelineOptions::default());

        let reply = chat.resolve("  what is the capital of France  ").await;
        assert_eq!(
            reply,
            ChatReply::Ai {
                text: "Paris is the capital of France.".into()
            }
        );
        assert_eq!(completer.calls(), 1);

        let request = completer.last_request();
        assert_eq!(request.model, "llama-3.1-8b-instant");
        assert_eq!(request.temperature, 0.2);
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, "system");
        assert_eq!(request.messages[0].content, prompt::MINIMAL_PROMPT);
        assert_eq!(request.messages[1].content, "what is the capital of France");
    }

    #[tokio::test]
    async fn test_context_mode_injects_store_snapshot() {
        let completer = FakeCompleter::new(false);
        let options = PipelineOptions {
            fallback_mode: FallbackMode::Context,
            model: Some("llama-3.3-70b-versatile".into()),
            ..Default::default()
        };
        let chat = pipeline(seeded(), completer.clone(), options);

        chat.resolve("who won the world cup").await;
        let request = completer.last_request();
        assert_eq!(request.model, "llama-3.3-70b-versatile");
        assert_eq!(request.temperature, 0.7);
        let system = &request.messages[0].content;
        assert!(system.contains("[faq:hostel] What are the hostel fee rules?"));
        assert!(system.contains("[notice:exam] Mid-term exam notice"));
        assert!(system.contains("[timetable] Semester 3 Timetable"));
    }

    #[tokio::test]
    async fn test_provider_failure_becomes_generic_reply() {
        let completer = FakeCompleter::new(true);
        let chat = pipeline(seeded(), completer.clone(), PipelineOptions::default());

        let reply = chat.resolve("what is the capital of France").await;
        assert_eq!(
            reply,
            ChatReply::Failed {
                text: FAILURE_REPLY.into()
            }
        );
        assert!(!reply.text().contains("upstream exploded"));
        assert_eq!(completer.calls(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_becomes_generic_reply() {
        let completer = FakeCompleter::new(false);
        let chat = pipeline(Arc::new(BrokenStore), completer.clone(), PipelineOptions::default());

        let reply = chat.resolve("What are the hostel fee rules?").await;
        assert_eq!(reply.text(), FAILURE_REPLY);
        assert_eq!(completer.calls(), 0);
    }

    #[tokio::test]
    async fn test_repeated_resolution_is_stable() {
        let completer = FakeCompleter::new(false);
        let chat = pipeline(seeded(), completer, PipelineOptions::default());

        for message in ["exam notice", "pyq for operating systems", "hostel fee"] {
            let first = chat.resolve(message).await;
            let second = chat.resolve(message).await;
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_fallback_mode_parsing() {
        assert_eq!("minimal".parse::<FallbackMode>(), Ok(FallbackMode::Minimal));
        assert_eq!("Context-Injected".parse::<FallbackMode>(), Ok(FallbackMode::Context));
        assert!("verbose".parse::<FallbackMode>().is_err());
    }

    #[test]
    fn test_public_file_url() {
        assert_eq!(public_file_url("/uploads/a.pdf", None), "/uploads/a.pdf");
        assert_eq!(
            public_file_url("/uploads/a.pdf", Some("https://campus.example/")),
            "https://campus.example/uploads/a.pdf"
        );
    }
}
