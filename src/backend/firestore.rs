use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde_json::{Value, json};

use crate::backend::value::{decode_fields, encode, encode_fields};
use crate::backend::{
    Document, DocumentStore, FieldPath, Fields, IdentityService, Query, assign,
};
use crate::config::FirebaseConfig;
use crate::dispatch::{build_client, error_from_status, read_capped};
use crate::error::AtemateError;

const SERVICE: &str = "firestore";

/// Document store over the Firestore REST API (v1). Requests carry the
/// signed-in user's id token so security rules apply as they would on device.
pub struct Firestore {
    client: Client,
    documents_url: String,
    identity: Arc<dyn IdentityService>,
}

impl Firestore {
    pub fn new(
        config: &FirebaseConfig,
        identity: Arc<dyn IdentityService>,
    ) -> Result<Self, AtemateError> {
        Ok(Self {
            client: build_client()?,
            documents_url: format!(
                "{}/projects/{}/databases/(default)/documents",
                config.firestore_endpoint.trim_end_matches('/'),
                config.project_id
            ),
            identity,
        })
    }

    fn doc_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{collection}/{id}", self.documents_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.identity.current_user().and_then(|u| u.id_token) {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, AtemateError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AtemateError::AuthFailed(format!(
                "document store rejected request ({status})"
            )));
        }
        Ok(response)
    }

    async fn json_body(response: Response) -> Result<Value, AtemateError> {
        let bytes = read_capped(response, SERVICE).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AtemateError::SchemaParse(format!("firestore response: {e}")))
    }
}

#[async_trait]
impl DocumentStore for Firestore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AtemateError> {
        let response = self.send(self.client.get(self.doc_url(collection, id))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(error_from_status(response, SERVICE).await);
        }
        parse_document(&Self::json_body(response).await?).map(Some)
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> Result<(), AtemateError> {
        if merge && fields.is_empty() {
            return Ok(());
        }
        let mut request = self
            .client
            .patch(self.doc_url(collection, id))
            .json(&json!({"fields": encode_fields(&fields)}));
        if merge {
            let mask: Vec<(&str, String)> = fields
                .keys()
                .map(|k| ("updateMask.fieldPaths", FieldPath::new([k.as_str()]).to_firestore()))
                .collect();
            request = request.query(&mask);
        }

        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(error_from_status(response, SERVICE).await);
        }
        tracing::debug!(collection = collection, id = id, merge = merge, "document set");
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, AtemateError> {
        let request = self
            .client
            .post(format!("{}/{collection}", self.documents_url))
            .json(&json!({"fields": encode_fields(&fields)}));

        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(error_from_status(response, SERVICE).await);
        }
        let doc = parse_document(&Self::json_body(response).await?)?;
        tracing::debug!(collection = collection, id = %doc.id, "document added");
        Ok(doc.id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<(FieldPath, Value)>,
    ) -> Result<(), AtemateError> {
        if updates.is_empty() {
            return Ok(());
        }
        let mut params: Vec<(&str, String)> = vec![("currentDocument.exists", "true".to_string())];
        let mut body = Fields::new();
        for (path, value) in updates {
            params.push(("updateMask.fieldPaths", path.to_firestore()));
            assign(&mut body, &path, value);
        }

        let request = self
            .client
            .patch(self.doc_url(collection, id))
            .query(&params)
            .json(&json!({"fields": encode_fields(&body)}));

        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(AtemateError::NotFound(format!("{collection}/{id}")));
        }
        if !response.status().is_success() {
            return Err(error_from_status(response, SERVICE).await);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, AtemateError> {
        let request = self
            .client
            .post(format!("{}:runQuery", self.documents_url))
            .json(&json!({"structuredQuery": structured_query(query)}));

        let response = self.send(request).await?;
        if !response.status().is_success() {
            return Err(error_from_status(response, SERVICE).await);
        }

        // runQuery streams one element per result; elements without a
        // `document` only report progress (readTime).
        let rows = Self::json_body(response).await?;
        let rows = rows
            .as_array()
            .ok_or_else(|| AtemateError::SchemaParse("runQuery: expected array".to_string()))?;
        rows.iter()
            .filter_map(|row| row.get("document"))
            .map(parse_document)
            .collect()
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AtemateError> {
        let response = self.send(self.client.delete(self.doc_url(collection, id))).await?;
        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            tracing::debug!(collection = collection, id = id, "document deleted");
            return Ok(());
        }
        Err(error_from_status(response, SERVICE).await)
    }
}

/// Build a `structuredQuery` body for `runQuery`.
pub fn structured_query(query: &Query) -> Value {
    let mut sq = json!({"from": [{"collectionId": query.collection}]});

    let filters: Vec<Value> = query
        .filters
        .iter()
        .map(|f| {
            json!({"fieldFilter": {
                "field": {"fieldPath": FieldPath::parse(&f.field).to_firestore()},
                "op": "EQUAL",
                "value": encode(&f.value),
            }})
        })
        .collect();
    match filters.len() {
        0 => {}
        1 => sq["where"] = filters.into_iter().next().unwrap_or(Value::Null),
        _ => sq["where"] = json!({"compositeFilter": {"op": "AND", "filters": filters}}),
    }

    if let Some(order) = &query.order_by {
        sq["orderBy"] = json!([{
            "field": {"fieldPath": FieldPath::parse(&order.field).to_firestore()},
            "direction": if order.descending { "DESCENDING" } else { "ASCENDING" },
        }]);
    }
    if let Some(limit) = query.limit {
        sq["limit"] = json!(limit);
    }
    sq
}

/// `name` is `projects/p/databases/(default)/documents/<collection>/<id>`.
fn parse_document(doc: &Value) -> Result<Document, AtemateError> {
    let name = doc
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| AtemateError::SchemaParse("document missing name".to_string()))?;
    let id = name.rsplit('/').next().unwrap_or(name).to_string();
    let fields = match doc.get("fields") {
        Some(fields) => decode_fields(fields)?,
        None => Fields::new(),
    };
    Ok(Document { id, fields })
}
