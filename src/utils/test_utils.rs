use crate::core::llm::{LanguageModel, ModelError, ModelRequest};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Language model double that replays canned completions in order and
/// records every request it receives.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Result<String, ModelError>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(replies.into_iter().map(|reply| Ok(reply.into())))
    }

    pub fn with_results(replies: impl IntoIterator<Item = Result<String, ModelError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: ModelRequest) -> Result<String, ModelError> {
        self.requests.lock().expect("requests lock").push(request);
        self.replies
            .lock()
            .expect("replies lock")
            .pop_front()
            .unwrap_or(Err(ModelError::EmptyCompletion))
    }
}
