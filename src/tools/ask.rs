use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AskRequest {
    /// The user's question about diet, fitness or health.
    pub question: String,
    /// Personalize the answer with the signed-in user's profile (default true).
    pub personalize: Option<bool>,
}

impl AskRequest {
    pub fn personalize(&self) -> bool {
        self.personalize.unwrap_or(true)
    }
}
