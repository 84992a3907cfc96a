//! Model-backed sentence analysis.
//!
//! One focused prompt, one model call. The breakdown comes back as plain
//! rendered text; the orchestrator returns it to the user verbatim without
//! running the normal pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use kotoba_core::analysis::SentenceAnalyzer;
use kotoba_core::error::ModelError;
use kotoba_core::model::{ChatRequest, ModelClient, PromptMessage};

const ANALYZER_INSTRUCTIONS: &str = "\
You are a Japanese sentence analyzer. Break the given sentence down \
word by word: for each token give its dictionary form, reading in kana, \
part of speech, and meaning. Then explain the grammar patterns in play \
and give a natural English translation. Be precise and compact.";

/// A [`SentenceAnalyzer`] that delegates to a [`ModelClient`].
pub struct ModelBackedAnalyzer {
    model: Arc<dyn ModelClient>,
    model_name: String,
}

impl ModelBackedAnalyzer {
    pub fn new(model: Arc<dyn ModelClient>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
        }
    }
}

#[async_trait]
impl SentenceAnalyzer for ModelBackedAnalyzer {
    async fn analyze(&self, _user_id: &str, text: &str) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: self.model_name.clone(),
            messages: vec![
                PromptMessage::system(ANALYZER_INSTRUCTIONS),
                PromptMessage::user(text),
            ],
            // Low temperature: breakdowns should be stable, not creative.
            temperature: 0.2,
            max_tokens: Some(1024),
        };
        let reply = self.model.complete(request).await?;
        Ok(reply.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kotoba_core::model::ChatReply;
    use std::sync::Mutex;

    struct RecordingModel {
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl ModelClient for RecordingModel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: ChatRequest) -> Result<ChatReply, ModelError> {
            self.requests.lock().unwrap().push(request);
            Ok(ChatReply {
                content: "食べる — to eat (ichidan verb)".into(),
                model: "mock".into(),
                usage: None,
            })
        }
    }

    #[tokio::test]
    async fn sends_one_focused_request() {
        let model = Arc::new(RecordingModel {
            requests: Mutex::new(Vec::new()),
        });
        let analyzer = ModelBackedAnalyzer::new(model.clone(), "gpt-4o");

        let out = analyzer.analyze("user_1", "食べる").await.unwrap();
        assert!(out.contains("to eat"));

        let requests = model.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-4o");
        assert_eq!(requests[0].messages.len(), 2);
        assert_eq!(requests[0].messages[1].content, "食べる");
    }

    #[tokio::test]
    async fn model_errors_propagate() {
        struct FailingModel;

        #[async_trait]
        impl ModelClient for FailingModel {
            fn name(&self) -> &str {
                "failing"
            }

            async fn complete(&self, _request: ChatRequest) -> Result<ChatReply, ModelError> {
                Err(ModelError::Timeout("deadline exceeded".into()))
            }
        }

        let analyzer = ModelBackedAnalyzer::new(Arc::new(FailingModel), "gpt-4o");
        let err = analyzer.analyze("user_1", "食べる").await.unwrap_err();
        assert!(matches!(err, ModelError::Timeout(_)));
    }
}
