use serde::{Deserialize, Serialize};

use crate::history::Message;
use crate::types::Model;

/// Seed sent with every request so that replies are as repeatable as the
/// service allows.
pub const DEFAULT_SEED: i64 = 1;

/// Body of a streaming chat-completion request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model to complete with.
    pub model: Model,

    /// The full conversation, in order.
    pub messages: Vec<Message>,

    /// Sampling seed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,

    /// Always true for requests made by this crate.
    #[serde(default)]
    pub stream: bool,
}

impl CompletionRequest {
    /// Creates a streaming request for `messages`.
    pub fn new(model: Model, messages: Vec<Message>) -> Self {
        Self {
            model,
            messages,
            seed: Some(DEFAULT_SEED),
            stream: true,
        }
    }

    /// Sets or clears the sampling seed.
    pub fn with_seed(mut self, seed: Option<i64>) -> Self {
        self.seed = seed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::KnownModel;

    #[test]
    fn serializes_to_wire_format() {
        let request = CompletionRequest::new(
            Model::Known(KnownModel::Gpt35Turbo),
            vec![Message::system("Be brief."), Message::user("hi")],
        );
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"model":"gpt-3.5-turbo","messages":[{"role":"system","content":"Be brief."},{"role":"user","content":"hi"}],"seed":1,"stream":true}"#
        );
    }

    #[test]
    fn seed_can_be_omitted() {
        let request = CompletionRequest::new(Model::default(), vec![]).with_seed(None);
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("seed"));
    }
}
