use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::backend::DocumentStore;
use crate::dispatch::Completion;
use crate::error::AtemateError;
use crate::wellness::USERS;
use crate::wellness::accounts::UserProfile;

pub const WELCOME: &str = "Hello! I'm your personal Health Assistant. How can I help you with your diet, fitness, or health concerns today?";

/// Shown in place of any assistant failure; raw errors stay in the logs.
pub const FALLBACK_REPLY: &str =
    "I'm having trouble connecting right now. Please try again shortly.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// One conversation. `ask` takes it by `&mut`, so a session has at most one
/// question in flight.
#[derive(Debug, Clone)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::new(Role::Bot, WELCOME)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

/// A titled prompt from the daily tips catalog.
#[derive(Debug, Clone, Copy)]
pub struct TipPrompt {
    pub title: &'static str,
    pub category: &'static str,
    pub prompt: &'static str,
}

pub const TIP_PROMPTS: [TipPrompt; 10] = [
    TipPrompt { title: "Healthy Eating", category: "Diet", prompt: "Give a short healthy eating tip (2 lines max)." },
    TipPrompt { title: "Gym Workout", category: "Gym", prompt: "Suggest a quick gym workout tip for beginners (2 lines max)." },
    TipPrompt { title: "Morning Habit", category: "Habit", prompt: "Share a morning routine health habit tip (2 lines max)." },
    TipPrompt { title: "Stay Hydrated", category: "Hydration", prompt: "Give a hydration tip (2 lines max)." },
    TipPrompt { title: "Better Sleep", category: "Sleep", prompt: "Suggest a sleep habit for better rest (2 lines max)." },
    TipPrompt { title: "Mental Wellbeing", category: "Mental", prompt: "Provide a short mental health tip (2 lines max)." },
    TipPrompt { title: "Desk Stretch", category: "Stretching", prompt: "Give a quick stretching tip for desk workers (2 lines max)." },
    TipPrompt { title: "Cardio Boost", category: "Cardio", prompt: "Suggest a simple cardio exercise tip (2 lines max)." },
    TipPrompt { title: "Motivation", category: "Motivation", prompt: "Share a motivational fitness quote (2 lines max)." },
    TipPrompt { title: "Immunity", category: "Immunity", prompt: "Give an immunity boosting tip (2 lines max)." },
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AiTip {
    pub title: String,
    pub category: String,
    pub text: String,
}

/// Personalize a question with whatever the profile holds.
pub fn build_prompt(profile: Option<&UserProfile>, question: &str) -> String {
    let or = |value: Option<&String>, default: &str| -> String {
        value.cloned().unwrap_or_else(|| default.to_string())
    };

    format!(
        "User Info:\n\
         Name: {name}\n\
         Age: {age}\n\
         Weight: {weight}\n\
         Allergies: {allergies}\n\
         Medical History: {history}\n\
         Fitness Goal: {goal}\n\
         \n\
         User's Question: {question}\n\
         \n\
         Based on above profile, act like you are a professional dietician and health expert.\n\
         Provide personalized advice considering the user's profile for fitness, diet, health, and habits.\n\
         Keep responses concise (3-5 sentences maximum) but informative.\n\
         Use a warm, professional tone and format responses for easy reading.",
        name = or(profile.and_then(|p| p.name.as_ref()), "User"),
        age = or(profile.and_then(|p| p.age.as_ref()), "unknown"),
        weight = or(profile.and_then(|p| p.weight.as_ref()), "unknown"),
        allergies = or(profile.and_then(|p| p.allergies.as_ref()), "none"),
        history = or(profile.and_then(|p| p.medical_history.as_ref()), "none"),
        goal = or(profile.and_then(|p| p.goal.as_ref()), "General Fitness"),
        question = question.trim(),
    )
}

pub struct Assistant {
    completion: Arc<dyn Completion>,
    store: Arc<dyn DocumentStore>,
}

impl Assistant {
    pub fn new(completion: Arc<dyn Completion>, store: Arc<dyn DocumentStore>) -> Self {
        Self { completion, store }
    }

    /// Answer `question` in `session`, personalized for `uid` when given.
    ///
    /// A blank question is rejected before any request. Completion failures
    /// become `FALLBACK_REPLY`; only cancellation is returned as an error,
    /// and then nothing is appended to the session.
    pub async fn ask(
        &self,
        session: &mut ChatSession,
        uid: Option<&str>,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<ChatMessage, AtemateError> {
        if question.trim().is_empty() {
            return Err(AtemateError::InvalidInput("question must not be empty".to_string()));
        }

        let profile = match uid {
            Some(uid) => self.load_profile(uid).await,
            None => None,
        };
        let prompt = build_prompt(profile.as_ref(), question);

        session.messages.push(ChatMessage::new(Role::User, question));

        let reply = match self.completion.complete(&prompt, cancel).await {
            Ok(text) => text,
            Err(e @ AtemateError::Cancelled(_)) => {
                session.messages.pop();
                return Err(e);
            }
            Err(e) => {
                tracing::error!("assistant completion failed: {e}");
                FALLBACK_REPLY.to_string()
            }
        };

        let message = ChatMessage::new(Role::Bot, reply);
        session.messages.push(message.clone());
        Ok(message)
    }

    /// Generate the daily tips catalog, one request at a time. Prompts that
    /// fail or come back empty are skipped.
    pub async fn ai_tips(&self, cancel: &CancellationToken) -> Result<Vec<AiTip>, AtemateError> {
        let mut tips = Vec::new();
        for entry in TIP_PROMPTS {
            match self.completion.complete(entry.prompt, cancel).await {
                Ok(text) if !text.trim().is_empty() => tips.push(AiTip {
                    title: entry.title.to_string(),
                    category: entry.category.to_string(),
                    text,
                }),
                Ok(_) => {}
                Err(e @ AtemateError::Cancelled(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!(title = entry.title, "tip prompt failed: {e}");
                }
            }
        }
        Ok(tips)
    }

    /// Missing or unreadable profiles fall back to prompt defaults.
    async fn load_profile(&self, uid: &str) -> Option<UserProfile> {
        match self.store.get(USERS, uid).await {
            Ok(doc) => doc.as_ref().map(UserProfile::from),
            Err(e) => {
                tracing::error!(uid = uid, "profile fetch failed: {e}");
                None
            }
        }
    }
}
