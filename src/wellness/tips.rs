use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::backend::{Document, DocumentStore, FieldPath, Query};
use crate::error::AtemateError;
use crate::wellness::{HEALTH_TIPS, LIKES, into_fields, require, text};

/// A dietician-authored tip as stored in `healthTips`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthTip {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: String,
    pub dietician_id: Option<String>,
    pub created_at: Option<String>,
}

impl From<&Document> for HealthTip {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            title: text(doc, "title").unwrap_or_default(),
            content: text(doc, "content").unwrap_or_default(),
            category: text(doc, "category").unwrap_or_default(),
            dietician_id: text(doc, "dieticianId"),
            created_at: text(doc, "createdAt"),
        }
    }
}

/// Fields a dietician fills in. All three are required.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct TipDraft {
    pub title: String,
    pub content: String,
    /// Free text, e.g. Diet, Gym, Mental.
    pub category: String,
}

impl TipDraft {
    fn validated(&self) -> Result<(String, String, String), AtemateError> {
        Ok((
            require("title", &self.title)?,
            require("content", &self.content)?,
            require("category", &self.category)?,
        ))
    }
}

pub struct TipBoard {
    store: Arc<dyn DocumentStore>,
}

impl TipBoard {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn add(&self, dietician_id: &str, draft: &TipDraft) -> Result<String, AtemateError> {
        let (title, content, category) = draft.validated()?;
        let id = self
            .store
            .add(
                HEALTH_TIPS,
                into_fields(json!({
                    "title": title,
                    "content": content,
                    "category": category,
                    "dieticianId": dietician_id,
                    "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                })),
            )
            .await?;
        tracing::info!(tip = %id, dietician = dietician_id, "tip added");
        Ok(id)
    }

    pub async fn update(&self, tip_id: &str, draft: &TipDraft) -> Result<(), AtemateError> {
        let (title, content, category) = draft.validated()?;
        self.store
            .update(
                HEALTH_TIPS,
                tip_id,
                vec![
                    (FieldPath::parse("title"), title.into()),
                    (FieldPath::parse("content"), content.into()),
                    (FieldPath::parse("category"), category.into()),
                ],
            )
            .await
    }

    pub async fn delete(&self, tip_id: &str) -> Result<(), AtemateError> {
        self.store.delete(HEALTH_TIPS, tip_id).await?;
        tracing::info!(tip = tip_id, "tip deleted");
        Ok(())
    }

    pub async fn list_all(&self) -> Result<Vec<HealthTip>, AtemateError> {
        self.run(Query::collection(HEALTH_TIPS)).await
    }

    pub async fn list_by_dietician(&self, dietician_id: &str) -> Result<Vec<HealthTip>, AtemateError> {
        self.run(Query::collection(HEALTH_TIPS).where_eq("dieticianId", dietician_id))
            .await
    }

    /// Most recently created tip, if any.
    pub async fn latest(&self) -> Result<Option<HealthTip>, AtemateError> {
        let q = Query::collection(HEALTH_TIPS)
            .order_by("createdAt", true)
            .limit(1);
        Ok(self.run(q).await?.into_iter().next())
    }

    /// Like the tip, or remove the existing like. Returns whether the tip is
    /// liked afterwards.
    pub async fn toggle_like(&self, user_id: &str, tip_id: &str) -> Result<bool, AtemateError> {
        let existing = self
            .store
            .query(
                &Query::collection(LIKES)
                    .where_eq("userId", user_id)
                    .where_eq("tipId", tip_id)
                    .limit(1),
            )
            .await?;

        if let Some(like) = existing.first() {
            self.store.delete(LIKES, &like.id).await?;
            tracing::debug!(user = user_id, tip = tip_id, "unliked");
            return Ok(false);
        }

        self.store
            .add(
                LIKES,
                into_fields(json!({
                    "userId": user_id,
                    "tipId": tip_id,
                    "createdAt": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                })),
            )
            .await?;
        tracing::debug!(user = user_id, tip = tip_id, "liked");
        Ok(true)
    }

    async fn run(&self, query: Query) -> Result<Vec<HealthTip>, AtemateError> {
        Ok(self
            .store
            .query(&query)
            .await?
            .iter()
            .map(HealthTip::from)
            .collect())
    }
}
