use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::backend::{Document, DocumentStore, FieldPath, IdentityService, UserHandle};
use crate::error::AtemateError;
use crate::wellness::{DIETICIANS, USERS, into_fields, require, text};

#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    #[default]
    User,
    Dietician,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Dietician => "dietician",
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SignupRequest {
    /// "user" (default) or "dietician".
    pub kind: AccountKind,
    pub name: String,
    pub email: String,
    pub password: String,
    pub age: String,
    pub gender: String,
    pub height: String,
    pub weight: String,
    pub allergies: String,
    /// Comma-separated conditions.
    pub medical_history: String,
    pub goal: String,
    /// Dietician accounts only.
    pub qualifications: String,
    /// Dietician accounts only.
    pub certification_link: String,
    /// Dietician accounts only.
    pub bio: String,
}

/// Where a successful login lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Member(UserHandle),
    Dietician(UserHandle),
    /// Dietician account not yet verified; the session is closed.
    PendingVerification,
    /// Credentials valid but no profile document; the session is closed.
    UnknownAccount,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<String>,
    pub gender: Option<String>,
    pub weight: Option<String>,
    pub allergies: Option<String>,
    pub medical_history: Option<String>,
    pub goal: Option<String>,
}

impl From<&Document> for UserProfile {
    fn from(doc: &Document) -> Self {
        Self {
            name: text(doc, "name"),
            email: text(doc, "email"),
            age: text(doc, "age"),
            gender: text(doc, "gender"),
            weight: text(doc, "weight"),
            allergies: text(doc, "allergies"),
            medical_history: text(doc, "medicalHistory"),
            goal: text(doc, "goal"),
        }
    }
}

/// Editable profile fields; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub age: Option<String>,
    pub weight: Option<String>,
    pub goal: Option<String>,
    /// Comma-separated conditions.
    pub medical_history: Option<String>,
    pub allergies: Option<String>,
}

pub fn split_list(raw: &str) -> Vec<Value> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Value::String(s.to_string()))
        .collect()
}

pub struct Accounts {
    identity: Arc<dyn IdentityService>,
    store: Arc<dyn DocumentStore>,
}

impl Accounts {
    pub fn new(identity: Arc<dyn IdentityService>, store: Arc<dyn DocumentStore>) -> Self {
        Self { identity, store }
    }

    /// Create the account and its profile document.
    pub async fn sign_up(&self, req: SignupRequest) -> Result<UserHandle, AtemateError> {
        let name = require("name", &req.name)?;
        let email = require("email", &req.email)?;
        if req.password.is_empty() {
            return Err(AtemateError::InvalidInput("password is required".to_string()));
        }

        let user = self.identity.sign_up(&email, &req.password).await?;

        let (collection, body) = match req.kind {
            AccountKind::User => (
                USERS,
                json!({
                    "name": name,
                    "email": email,
                    "age": req.age.trim(),
                    "gender": req.gender.trim(),
                    "height": req.height.trim(),
                    "weight": req.weight.trim(),
                    "allergies": req.allergies.trim(),
                    "userType": AccountKind::User.as_str(),
                    "medicalHistory": split_list(&req.medical_history),
                    "goal": req.goal.trim(),
                    "waterTracker": {},
                    "fitnessTracker": {},
                }),
            ),
            AccountKind::Dietician => (
                DIETICIANS,
                json!({
                    "name": name,
                    "email": email,
                    "qualifications": req.qualifications.trim(),
                    "certificationLink": req.certification_link.trim(),
                    "bio": req.bio.trim(),
                    "userType": AccountKind::Dietician.as_str(),
                    "verified": false,
                    "suggestionsGivenCount": 0,
                }),
            ),
        };
        self.store.set(collection, &user.uid, into_fields(body), false).await?;

        tracing::info!(uid = %user.uid, kind = req.kind.as_str(), "account created");
        Ok(user)
    }

    /// Authenticate and resolve which side of the app the account belongs to.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<LoginOutcome, AtemateError> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AtemateError::InvalidInput(
                "email and password are required".to_string(),
            ));
        }
        let user = self.identity.sign_in(email.trim(), password).await?;

        if self.store.get(USERS, &user.uid).await?.is_some() {
            return Ok(LoginOutcome::Member(user));
        }

        let outcome = match self.store.get(DIETICIANS, &user.uid).await? {
            Some(doc) if doc.get("verified").and_then(Value::as_bool) == Some(true) => {
                return Ok(LoginOutcome::Dietician(user));
            }
            Some(_) => LoginOutcome::PendingVerification,
            None => LoginOutcome::UnknownAccount,
        };
        tracing::warn!(uid = %user.uid, outcome = ?outcome, "login refused");
        self.identity.sign_out().await?;
        Ok(outcome)
    }

    pub async fn sign_out(&self) -> Result<(), AtemateError> {
        self.identity.sign_out().await
    }

    pub fn current_user(&self) -> Result<UserHandle, AtemateError> {
        self.identity.current_user().ok_or(AtemateError::NotSignedIn)
    }

    /// The signed-in account, provided it is a verified dietician.
    pub async fn current_dietician(&self) -> Result<UserHandle, AtemateError> {
        let user = self.current_user()?;
        match self.store.get(DIETICIANS, &user.uid).await? {
            Some(doc) if doc.get("verified").and_then(Value::as_bool) == Some(true) => Ok(user),
            _ => Err(AtemateError::AuthFailed(
                "a verified dietician account is required".to_string(),
            )),
        }
    }

    pub async fn profile(&self, uid: &str) -> Result<Option<UserProfile>, AtemateError> {
        Ok(self.store.get(USERS, uid).await?.as_ref().map(UserProfile::from))
    }

    pub async fn update_profile(&self, uid: &str, update: ProfileUpdate) -> Result<(), AtemateError> {
        let mut updates = Vec::new();
        let mut push = |field: &str, value: Option<String>| {
            if let Some(v) = value {
                updates.push((FieldPath::parse(field), Value::String(v.trim().to_string())));
            }
        };
        push("name", update.name);
        push("age", update.age);
        push("weight", update.weight);
        push("goal", update.goal);
        push("allergies", update.allergies);
        if let Some(history) = update.medical_history {
            updates.push((
                FieldPath::parse("medicalHistory"),
                Value::Array(split_list(&history)),
            ));
        }
        if updates.is_empty() {
            return Ok(());
        }
        self.store.update(USERS, uid, updates).await
    }
}
