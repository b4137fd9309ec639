use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::NutritionConfig;
use crate::dispatch::{build_client, error_from_status, read_capped};
use crate::error::AtemateError;

pub const DEFAULT_ENDPOINT: &str = "https://trackapi.nutritionix.com/v2/search/item";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const SERVICE: &str = "nutrition";

/// Nutrition facts for one scanned product. Missing numbers read as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodRecord {
    pub name: String,
    pub calories: f64,
    pub fat: f64,
    pub protein: f64,
    pub sugar: f64,
    pub fiber: f64,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    foods: Vec<RawFood>,
}

#[derive(Deserialize)]
struct RawFood {
    #[serde(default)]
    food_name: String,
    nf_calories: Option<f64>,
    nf_total_fat: Option<f64>,
    nf_protein: Option<f64>,
    nf_sugars: Option<f64>,
    nf_dietary_fiber: Option<f64>,
}

impl From<RawFood> for FoodRecord {
    fn from(raw: RawFood) -> Self {
        Self {
            name: raw.food_name,
            calories: raw.nf_calories.unwrap_or_default(),
            fat: raw.nf_total_fat.unwrap_or_default(),
            protein: raw.nf_protein.unwrap_or_default(),
            sugar: raw.nf_sugars.unwrap_or_default(),
            fiber: raw.nf_dietary_fiber.unwrap_or_default(),
        }
    }
}

/// Barcode (UPC) lookup against the nutrition REST service.
pub struct NutritionClient {
    client: Client,
    endpoint: String,
    app_id: Option<String>,
    app_key: Option<String>,
    request_timeout: Duration,
}

impl NutritionClient {
    pub fn new(config: &NutritionConfig) -> Result<Self, AtemateError> {
        Ok(Self {
            client: build_client()?,
            endpoint: config.endpoint.clone(),
            app_id: config.app_id.clone(),
            app_key: config.app_key.clone(),
            request_timeout: config.request_timeout,
        })
    }

    pub async fn lookup(&self, barcode: &str) -> Result<FoodRecord, AtemateError> {
        let barcode = barcode.trim();
        if barcode.is_empty() {
            return Err(AtemateError::InvalidInput("barcode must not be empty".to_string()));
        }

        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("upc", barcode)])
            .timeout(self.request_timeout);
        if let Some(id) = &self.app_id {
            request = request.header("x-app-id", id);
        }
        if let Some(key) = &self.app_key {
            request = request.header("x-app-key", key);
        }

        let response = request.send().await.map_err(|e| timeout_or(e, self.request_timeout))?;
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AtemateError::NotFound(format!("barcode {barcode}")));
        }
        if !status.is_success() {
            return Err(error_from_status(response, SERVICE).await);
        }

        let bytes = read_capped(response, SERVICE).await?;
        let parsed: LookupResponse = serde_json::from_slice(&bytes)
            .map_err(|e| AtemateError::SchemaParse(format!("nutrition response: {e}")))?;

        let food = parsed
            .foods
            .into_iter()
            .next()
            .ok_or_else(|| AtemateError::NotFound(format!("barcode {barcode}")))?;

        tracing::debug!(barcode = barcode, name = %food.food_name, "barcode resolved");
        Ok(food.into())
    }
}

fn timeout_or(e: reqwest::Error, timeout: Duration) -> AtemateError {
    if e.is_timeout() {
        AtemateError::Timeout(timeout.as_millis() as u64)
    } else {
        AtemateError::Request(e)
    }
}
