use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::dispatch::Completion;
use crate::dispatch::nutrition::{FoodRecord, NutritionClient};
use crate::error::AtemateError;

pub const NO_INFO: &str = "No nutrition information available.";
pub const LOOKUP_FAILED: &str = "Error fetching nutritional info.";

/// Barcode facts from the nutrition service, plus a plain-language summary
/// from the assistant model.
pub struct NutritionAdvisor {
    client: NutritionClient,
    completion: Arc<dyn Completion>,
}

impl NutritionAdvisor {
    pub fn new(client: NutritionClient, completion: Arc<dyn Completion>) -> Self {
        Self { client, completion }
    }

    pub async fn lookup(&self, barcode: &str) -> Result<FoodRecord, AtemateError> {
        self.client.lookup(barcode).await
    }

    /// Always yields display text: failures map to fixed fallbacks.
    pub async fn describe(&self, product_name: &str, cancel: &CancellationToken) -> String {
        let product = product_name.trim();
        if product.is_empty() {
            return NO_INFO.to_string();
        }
        let prompt =
            format!("Give me the nutritional information of \"{product}\" in a simple way.");
        match self.completion.complete(&prompt, cancel).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) | Err(AtemateError::EmptyResponse(_)) => NO_INFO.to_string(),
            Err(e) => {
                tracing::error!(product = product, "nutrition description failed: {e}");
                LOOKUP_FAILED.to_string()
            }
        }
    }
}
