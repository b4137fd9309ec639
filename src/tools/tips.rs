use schemars::JsonSchema;
use serde::Deserialize;

use crate::wellness::tips::TipDraft;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListTipsRequest {
    /// Only tips authored by the signed-in dietician.
    pub mine: Option<bool>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateTipRequest {
    pub tip_id: String,
    pub title: String,
    pub content: String,
    pub category: String,
}

impl UpdateTipRequest {
    pub fn draft(&self) -> TipDraft {
        TipDraft {
            title: self.title.clone(),
            content: self.content.clone(),
            category: self.category.clone(),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TipIdRequest {
    pub tip_id: String,
}
