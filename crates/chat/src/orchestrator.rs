//! The session orchestrator — `send_message` lives here.
//!
//! One send runs the whole pipeline: validate, resolve the session,
//! classify intent, gather injected context, assemble the prompt, call the
//! model, post-process the reply, persist the turn. Failure handling is
//! tiered: input validation rejects up front, session resolution and the
//! primary model call propagate, and every other collaborator failure is
//! logged and degraded so the user still gets a reply.

use std::sync::Arc;

use kotoba_core::analysis::SentenceAnalyzer;
use kotoba_core::error::{Error, Result};
use kotoba_core::model::{ChatRequest, ModelClient, PromptMessage};
use kotoba_core::session::{ChatMessage, ChatSession, MessageMeta, Role, SessionId};
use kotoba_core::store::{SessionPatch, SessionStore};
use tracing::{debug, info, warn};

use crate::assemble::{PromptAssembler, PromptInputs};
use crate::inject::{ContextInjector, InjectionCue, InjectionSlot};
use crate::intent::{classify, Intent};
use crate::postprocess::ReplyPostProcessor;

const TITLE_INSTRUCTIONS: &str = "\
Produce a short title (3 to 6 words) for a tutoring conversation, based on \
the excerpt below. Reply with the title only, no quotes, no punctuation at \
the end.";

/// The result of one successful send.
#[derive(Debug)]
pub struct SendOutcome {
    /// The session this turn belongs to (freshly created when the caller
    /// passed no id or a malformed one).
    pub session_id: SessionId,
    /// The intent the message was classified as.
    pub intent: Intent,
    /// The stored assistant reply: cleaned text plus extracted metadata.
    pub reply: ChatMessage,
}

/// The conversational session orchestrator.
pub struct ChatService {
    store: Arc<dyn SessionStore>,
    model: Arc<dyn ModelClient>,
    injectors: Vec<Arc<dyn ContextInjector>>,
    assembler: PromptAssembler,
    post: ReplyPostProcessor,
    analyzer: Option<Arc<dyn SentenceAnalyzer>>,
    model_name: String,
    temperature: f32,
    max_tokens: Option<u32>,
    history_window: usize,
    title_regeneration: bool,
}

impl ChatService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        model: Arc<dyn ModelClient>,
        post: ReplyPostProcessor,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            model,
            injectors: Vec::new(),
            assembler: PromptAssembler::new(),
            post,
            analyzer: None,
            model_name: model_name.into(),
            temperature: 0.7,
            max_tokens: None,
            history_window: 12,
            title_regeneration: true,
        }
    }

    pub fn with_injector(mut self, injector: Arc<dyn ContextInjector>) -> Self {
        self.injectors.push(injector);
        self
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn SentenceAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// How many stored messages are replayed into the prompt.
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window.max(1);
        self
    }

    /// Disable background title regeneration (tests, batch runs).
    pub fn with_title_regeneration(mut self, enabled: bool) -> Self {
        self.title_regeneration = enabled;
        self
    }

    /// Process one user message end to end.
    ///
    /// `session_id` of `None` or a malformed value starts a fresh session;
    /// a well-formed but unknown id creates a session under that exact id,
    /// so retries against a new id land in one session.
    pub async fn send_message(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        text: &str,
    ) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(Error::InvalidInput("message text must not be empty".into()));
        }
        if user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".into()));
        }

        let session = self.resolve_session(user_id, session_id).await?;
        let intent = classify(text);
        debug!(session_id = %session.id, ?intent, "message classified");

        // ANALYZE delegates to the sentence analyzer and skips the pipeline.
        if intent == Intent::Analyze {
            if let Some(analyzer) = &self.analyzer {
                return self.run_analysis(analyzer, session, text).await;
            }
            debug!("no analyzer configured, falling through to normal pipeline");
        }

        let cue = InjectionCue {
            user_id,
            session_id: &session.id,
            user_text: text,
            intent,
        };
        let sections = self.gather_sections(&cue).await;

        let prompt = self.assembler.assemble(&PromptInputs {
            intent,
            summary: session.summary.as_deref(),
            sections: &sections,
            user_text: text,
        });

        let request = self.build_request(prompt, &session, text);
        let reply = self.model.complete(request).await?;

        let processed = self.post.process(&reply.content, intent).await;

        let first_exchange = session.is_fresh();
        let user_message = ChatMessage::user(text);
        let assistant_message = ChatMessage::assistant(processed.clean, processed.meta);

        // Persistence degrades: the user already has their reply.
        let stored = self
            .persist_turn(&session.id, user_message, assistant_message.clone())
            .await;

        if !processed.patch.is_empty() {
            if let Err(e) = self
                .store
                .update_session(&session.id, processed.patch.clone())
                .await
            {
                warn!(session_id = %session.id, error = %e, "session patch failed");
            }
        }

        if self.title_regeneration
            && session.title.is_none()
            && processed.patch.title.is_none()
            && (processed.has_update || first_exchange)
        {
            self.spawn_title_regeneration(
                session.id.clone(),
                processed.patch.summary.clone(),
                text.to_string(),
            );
        }

        info!(
            session_id = %session.id,
            ?intent,
            persisted = stored,
            updated = processed.has_update,
            "send complete"
        );

        Ok(SendOutcome {
            session_id: session.id,
            intent,
            reply: assistant_message,
        })
    }

    /// Resolve or create the session for this send. Store failures here are
    /// fatal: without a session there is nowhere to put the turn.
    async fn resolve_session(
        &self,
        user_id: &str,
        session_id: Option<&str>,
    ) -> Result<ChatSession> {
        match session_id {
            Some(raw) if SessionId::is_wellformed(raw) => {
                let id = SessionId::from(raw);
                if let Some(session) = self.store.get_session(&id).await? {
                    return Ok(session);
                }
                // Unknown well-formed id: create under that id, so a client
                // retrying a first message converges on one session.
                Ok(self.store.create_session(Some(id), user_id).await?)
            }
            Some(raw) => {
                warn!(raw_id = raw, "malformed session id, starting fresh session");
                Ok(self.store.create_session(None, user_id).await?)
            }
            None => Ok(self.store.create_session(None, user_id).await?),
        }
    }

    /// Run all applicable injectors, collecting non-empty blocks. Failures
    /// are logged and treated as "no contribution".
    async fn gather_sections(&self, cue: &InjectionCue<'_>) -> Vec<(InjectionSlot, String)> {
        let mut sections = Vec::new();
        for injector in &self.injectors {
            if !injector.applies(cue) {
                continue;
            }
            match injector.contribute(cue).await {
                Ok(block) if !block.is_empty() => sections.push((injector.slot(), block)),
                Ok(_) => {}
                Err(e) => {
                    warn!(injector = injector.name(), error = %e, "injector failed, skipping");
                }
            }
        }
        sections
    }

    /// System prompt plus the last `history_window` stored messages plus the
    /// new user text.
    fn build_request(&self, prompt: String, session: &ChatSession, text: &str) -> ChatRequest {
        let skip = session.messages.len().saturating_sub(self.history_window);
        let mut messages = Vec::with_capacity(self.history_window + 2);
        messages.push(PromptMessage::system(prompt));
        for m in &session.messages[skip..] {
            messages.push(match m.role {
                Role::Assistant => PromptMessage::assistant(&m.content),
                _ => PromptMessage::user(&m.content),
            });
        }
        messages.push(PromptMessage::user(text));

        ChatRequest {
            model: self.model_name.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn run_analysis(
        &self,
        analyzer: &Arc<dyn SentenceAnalyzer>,
        session: ChatSession,
        text: &str,
    ) -> Result<SendOutcome> {
        let breakdown = analyzer.analyze(&session.user_id, text).await?;
        let user_message = ChatMessage::user(text);
        let assistant_message = ChatMessage::assistant(breakdown, MessageMeta::default());
        self.persist_turn(&session.id, user_message, assistant_message.clone())
            .await;

        Ok(SendOutcome {
            session_id: session.id,
            intent: Intent::Analyze,
            reply: assistant_message,
        })
    }

    /// Store the user message then the assistant message, in that order.
    /// Returns whether both writes landed.
    async fn persist_turn(
        &self,
        session_id: &SessionId,
        user_message: ChatMessage,
        assistant_message: ChatMessage,
    ) -> bool {
        for message in [user_message, assistant_message] {
            if let Err(e) = self.store.add_message(session_id, message).await {
                warn!(session_id = %session_id, error = %e, "message persistence failed");
                return false;
            }
        }
        true
    }

    fn spawn_title_regeneration(
        &self,
        session_id: SessionId,
        summary: Option<String>,
        user_text: String,
    ) {
        let store = Arc::clone(&self.store);
        let model = Arc::clone(&self.model);
        let model_name = self.model_name.clone();
        tokio::spawn(async move {
            if let Err(e) =
                regenerate_title(store, model, model_name, session_id, summary, user_text).await
            {
                warn!(error = %e, "title regeneration failed");
            }
        });
    }
}

/// Derive a short title for a session from its summary (or, for a brand-new
/// session, the first user message) and store it. Idempotent: a session
/// that already has a title is left alone, so concurrent sends cannot
/// thrash it.
async fn regenerate_title(
    store: Arc<dyn SessionStore>,
    model: Arc<dyn ModelClient>,
    model_name: String,
    session_id: SessionId,
    summary: Option<String>,
    user_text: String,
) -> Result<()> {
    match store.get_session(&session_id).await? {
        Some(session) if session.title.is_none() => {}
        _ => return Ok(()),
    }

    let excerpt = summary.unwrap_or(user_text);
    let reply = model
        .complete(ChatRequest {
            model: model_name,
            messages: vec![
                PromptMessage::system(TITLE_INSTRUCTIONS),
                PromptMessage::user(excerpt),
            ],
            temperature: 0.3,
            max_tokens: Some(32),
        })
        .await?;

    let title = reply.content.trim().trim_matches('"').to_string();
    if title.is_empty() {
        return Ok(());
    }

    store
        .update_session(
            &session_id,
            SessionPatch {
                title: Some(title),
                summary: None,
            },
        )
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kotoba_core::error::{KnowledgeError, ModelError, StoreError};
    use kotoba_core::knowledge::{KnowledgeRepository, ReferencedUnit, UnitKind};
    use kotoba_core::model::ChatReply;
    use kotoba_store::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct EmptyKnowledge;

    #[async_trait]
    impl KnowledgeRepository for EmptyKnowledge {
        fn name(&self) -> &str {
            "empty"
        }

        async fn search(
            &self,
            _token: &str,
            _kind: Option<UnitKind>,
            _page: u32,
            _page_size: u32,
        ) -> std::result::Result<Vec<ReferencedUnit>, KnowledgeError> {
            Ok(Vec::new())
        }
    }

    struct CannedModel {
        reply: &'static str,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl CannedModel {
        fn new(reply: &'static str) -> Self {
            Self {
                reply,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ModelClient for CannedModel {
        fn name(&self) -> &str {
            "canned"
        }

        async fn complete(
            &self,
            request: ChatRequest,
        ) -> std::result::Result<ChatReply, ModelError> {
            self.requests.lock().unwrap().push(request);
            Ok(ChatReply {
                content: self.reply.to_string(),
                model: "mock".into(),
                usage: None,
            })
        }
    }

    struct FailingModel;

    #[async_trait]
    impl ModelClient for FailingModel {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(
            &self,
            _request: ChatRequest,
        ) -> std::result::Result<ChatReply, ModelError> {
            Err(ModelError::Network("connection refused".into()))
        }
    }

    /// Wraps a store and counts session creations.
    struct CountingStore {
        inner: InMemoryStore,
        creates: AtomicUsize,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryStore::new(),
                creates: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SessionStore for CountingStore {
        fn name(&self) -> &str {
            "counting"
        }

        async fn get_session(
            &self,
            id: &SessionId,
        ) -> std::result::Result<Option<ChatSession>, StoreError> {
            self.inner.get_session(id).await
        }

        async fn create_session(
            &self,
            id: Option<SessionId>,
            user_id: &str,
        ) -> std::result::Result<ChatSession, StoreError> {
            self.creates.fetch_add(1, Ordering::SeqCst);
            self.inner.create_session(id, user_id).await
        }

        async fn add_message(
            &self,
            session_id: &SessionId,
            message: ChatMessage,
        ) -> std::result::Result<ChatMessage, StoreError> {
            self.inner.add_message(session_id, message).await
        }

        async fn update_session(
            &self,
            session_id: &SessionId,
            patch: SessionPatch,
        ) -> std::result::Result<(), StoreError> {
            self.inner.update_session(session_id, patch).await
        }

        async fn user_sessions(
            &self,
            user_id: &str,
        ) -> std::result::Result<Vec<ChatSession>, StoreError> {
            self.inner.user_sessions(user_id).await
        }
    }

    fn post() -> ReplyPostProcessor {
        ReplyPostProcessor::new(Arc::new(EmptyKnowledge))
    }

    fn service(store: Arc<dyn SessionStore>, model: Arc<dyn ModelClient>) -> ChatService {
        ChatService::new(store, model, post(), "gpt-4o").with_title_regeneration(false)
    }

    #[tokio::test]
    async fn empty_message_is_rejected() {
        let svc = service(
            Arc::new(InMemoryStore::new()),
            Arc::new(CannedModel::new("hi")),
        );
        let err = svc.send_message("user_1", None, "   ").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn send_creates_session_and_persists_turn() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store.clone(), Arc::new(CannedModel::new("Hello!")));

        let outcome = svc
            .send_message("user_1", None, "Good evening")
            .await
            .unwrap();
        assert_eq!(outcome.reply.content, "Hello!");

        let session = store.get_session(&outcome.session_id).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].role, Role::User);
        assert_eq!(session.messages[0].content, "Good evening");
        assert_eq!(session.messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn wellformed_unknown_id_creates_under_that_id() {
        let store = Arc::new(CountingStore::new());
        let svc = service(store.clone(), Arc::new(CannedModel::new("ok")));

        let id = SessionId::new().0;
        let first = svc
            .send_message("user_1", Some(&id), "first")
            .await
            .unwrap();
        assert_eq!(first.session_id.0, id);

        // Retrying against the same id reuses the session, no second create
        let second = svc
            .send_message("user_1", Some(&id), "second")
            .await
            .unwrap();
        assert_eq!(second.session_id.0, id);
        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_id_starts_fresh_session() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store.clone(), Arc::new(CannedModel::new("ok")));

        let outcome = svc
            .send_message("user_1", Some("not-a-uuid"), "hello")
            .await
            .unwrap();
        assert_ne!(outcome.session_id.0, "not-a-uuid");
        assert!(SessionId::is_wellformed(&outcome.session_id.0));
    }

    #[tokio::test]
    async fn turns_persist_in_order_across_sends() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store.clone(), Arc::new(CannedModel::new("reply")));

        let a = svc.send_message("user_1", None, "one").await.unwrap();
        svc.send_message("user_1", Some(&a.session_id.0), "two")
            .await
            .unwrap();

        let session = store.get_session(&a.session_id).await.unwrap().unwrap();
        let contents: Vec<&str> = session.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["one", "reply", "two", "reply"]);
        let roles: Vec<Role> = session.messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
    }

    #[tokio::test]
    async fn model_failure_is_fatal_and_leaves_session_unchanged() {
        let store = Arc::new(InMemoryStore::new());
        let session = store.create_session(None, "user_1").await.unwrap();
        let svc = service(store.clone(), Arc::new(FailingModel));

        let err = svc
            .send_message("user_1", Some(&session.id.0), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));

        let after = store.get_session(&session.id).await.unwrap().unwrap();
        assert!(after.messages.is_empty());
    }

    #[tokio::test]
    async fn failing_injector_degrades_without_failing_send() {
        struct BrokenInjector;

        #[async_trait]
        impl ContextInjector for BrokenInjector {
            fn name(&self) -> &str {
                "broken"
            }

            fn slot(&self) -> InjectionSlot {
                InjectionSlot::Memory
            }

            async fn contribute(&self, _cue: &InjectionCue<'_>) -> Result<String> {
                Err(Error::Internal("memory service down".into()))
            }
        }

        let model = Arc::new(CannedModel::new("still fine"));
        let svc = service(Arc::new(InMemoryStore::new()), model.clone())
            .with_injector(Arc::new(BrokenInjector));

        let outcome = svc.send_message("user_1", None, "hello").await.unwrap();
        assert_eq!(outcome.reply.content, "still fine");

        // The failed block never reached the prompt
        let requests = model.requests.lock().unwrap();
        assert!(!requests[0].messages[0].content.contains("Learner Memory"));
    }

    #[tokio::test]
    async fn sentinel_patch_updates_session() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(
            store.clone(),
            Arc::new(CannedModel::new(
                "Sounds good.[[SUMMARY_UPDATE]]Goal: N4 by December.[[TITLE_UPDATE]]N4 plan",
            )),
        );

        let outcome = svc
            .send_message("user_1", None, "let's aim for N4")
            .await
            .unwrap();
        assert_eq!(outcome.reply.content, "Sounds good.");

        let session = store.get_session(&outcome.session_id).await.unwrap().unwrap();
        assert_eq!(session.summary.as_deref(), Some("Goal: N4 by December."));
        assert_eq!(session.title.as_deref(), Some("N4 plan"));
        // Sentinels never reach the stored assistant message
        assert!(!session.messages[1].content.contains("[["));
    }

    #[tokio::test]
    async fn history_window_bounds_replayed_messages() {
        let store = Arc::new(InMemoryStore::new());
        let session = store.create_session(None, "user_1").await.unwrap();
        for i in 0..20 {
            store
                .add_message(&session.id, ChatMessage::user(format!("m{i}")))
                .await
                .unwrap();
        }

        let model = Arc::new(CannedModel::new("ok"));
        let svc = service(store, model.clone()).with_history_window(12);
        svc.send_message("user_1", Some(&session.id.0), "latest")
            .await
            .unwrap();

        let requests = model.requests.lock().unwrap();
        // 1 system + 12 replayed + 1 new
        assert_eq!(requests[0].messages.len(), 14);
        assert_eq!(requests[0].messages[1].content, "m8");
        assert_eq!(requests[0].messages[13].content, "latest");
    }

    #[tokio::test]
    async fn summary_feeds_the_prompt() {
        let store = Arc::new(InMemoryStore::new());
        let session = store.create_session(None, "user_1").await.unwrap();
        store
            .update_session(
                &session.id,
                SessionPatch {
                    title: None,
                    summary: Some("Working on て-form conjugation.".into()),
                },
            )
            .await
            .unwrap();

        let model = Arc::new(CannedModel::new("ok"));
        let svc = service(store, model.clone());
        svc.send_message("user_1", Some(&session.id.0), "continue")
            .await
            .unwrap();

        let requests = model.requests.lock().unwrap();
        assert!(requests[0].messages[0]
            .content
            .contains("Working on て-form conjugation."));
    }

    #[tokio::test]
    async fn analyze_intent_short_circuits_to_analyzer() {
        struct StubAnalyzer;

        #[async_trait]
        impl SentenceAnalyzer for StubAnalyzer {
            async fn analyze(
                &self,
                _user_id: &str,
                text: &str,
            ) -> std::result::Result<String, ModelError> {
                Ok(format!("breakdown of {text}"))
            }
        }

        let store = Arc::new(InMemoryStore::new());
        let model = Arc::new(CannedModel::new("never used"));
        let svc = service(store.clone(), model.clone()).with_analyzer(Arc::new(StubAnalyzer));

        let outcome = svc.send_message("user_1", None, "食べる").await.unwrap();
        assert_eq!(outcome.intent, Intent::Analyze);
        assert_eq!(outcome.reply.content, "breakdown of 食べる");

        // The primary model never ran
        assert!(model.requests.lock().unwrap().is_empty());

        // The turn is still persisted
        let session = store.get_session(&outcome.session_id).await.unwrap().unwrap();
        assert_eq!(session.messages.len(), 2);
    }

    #[tokio::test]
    async fn analyze_without_analyzer_uses_normal_pipeline() {
        let model = Arc::new(CannedModel::new("pipeline reply"));
        let svc = service(Arc::new(InMemoryStore::new()), model.clone());

        let outcome = svc.send_message("user_1", None, "食べる").await.unwrap();
        assert_eq!(outcome.intent, Intent::Analyze);
        assert_eq!(outcome.reply.content, "pipeline reply");
        assert_eq!(model.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn title_regeneration_skips_titled_sessions() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemoryStore::new());
        let session = store.create_session(None, "user_1").await.unwrap();
        store
            .update_session(
                &session.id,
                SessionPatch {
                    title: Some("Existing title".into()),
                    summary: None,
                },
            )
            .await
            .unwrap();

        let model = Arc::new(CannedModel::new("Generated Title"));
        regenerate_title(
            store.clone(),
            model.clone(),
            "gpt-4o".into(),
            session.id.clone(),
            None,
            "hello".into(),
        )
        .await
        .unwrap();

        // No model call, title untouched
        assert!(model.requests.lock().unwrap().is_empty());
        let after = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(after.title.as_deref(), Some("Existing title"));
    }

    #[tokio::test]
    async fn title_regeneration_sets_title_from_summary() {
        let store: Arc<dyn SessionStore> = Arc::new(InMemoryStore::new());
        let session = store.create_session(None, "user_1").await.unwrap();

        let model = Arc::new(CannedModel::new("Kanji Study Plan"));
        regenerate_title(
            store.clone(),
            model.clone(),
            "gpt-4o".into(),
            session.id.clone(),
            Some("Learner wants a kanji study plan.".into()),
            "hi".into(),
        )
        .await
        .unwrap();

        let after = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(after.title.as_deref(), Some("Kanji Study Plan"));

        let requests = model.requests.lock().unwrap();
        assert!(requests[0].messages[1]
            .content
            .contains("kanji study plan"));
    }
}
