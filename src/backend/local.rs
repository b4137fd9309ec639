//! In-process identity and document store, used when no Firebase project is
//! configured and as the fixture backend in tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::backend::{
    Document, DocumentStore, FieldPath, Fields, IdentityService, Query, UserHandle, assign, lookup,
};
use crate::error::AtemateError;

const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    uid: String,
    password_digest: String,
}

#[derive(Default)]
pub struct LocalIdentity {
    accounts: Mutex<HashMap<String, Account>>,
    session: RwLock<Option<UserHandle>>,
}

impl LocalIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    fn accounts(&self) -> MutexGuard<'_, HashMap<String, Account>> {
        self.accounts.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_session(&self, user: Option<UserHandle>) {
        *self.session.write().unwrap_or_else(|p| p.into_inner()) = user;
    }
}

fn digest(uid: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(uid.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn normalize_email(email: &str) -> Result<String, AtemateError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && !domain.is_empty() => Ok(email),
        _ => Err(AtemateError::AuthFailed("email address is malformed".to_string())),
    }
}

#[async_trait]
impl IdentityService for LocalIdentity {
    async fn sign_in(&self, email: &str, password: &str) -> Result<UserHandle, AtemateError> {
        let email = normalize_email(email)?;
        let uid = {
            let accounts = self.accounts();
            match accounts.get(&email) {
                Some(acct) if acct.password_digest == digest(&acct.uid, password) => {
                    acct.uid.clone()
                }
                _ => {
                    return Err(AtemateError::AuthFailed(
                        "invalid email or password".to_string(),
                    ));
                }
            }
        };
        let user = UserHandle {
            uid,
            email,
            id_token: None,
        };
        self.set_session(Some(user.clone()));
        Ok(user)
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<UserHandle, AtemateError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AtemateError::AuthFailed(
                "password should be at least 6 characters".to_string(),
            ));
        }
        let uid = uuid::Uuid::new_v4().simple().to_string();
        {
            let mut accounts = self.accounts();
            if accounts.contains_key(&email) {
                return Err(AtemateError::AuthFailed(
                    "an account with this email already exists".to_string(),
                ));
            }
            accounts.insert(
                email.clone(),
                Account {
                    password_digest: digest(&uid, password),
                    uid: uid.clone(),
                },
            );
        }
        let user = UserHandle {
            uid,
            email,
            id_token: None,
        };
        self.set_session(Some(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), AtemateError> {
        self.set_session(None);
        Ok(())
    }

    fn current_user(&self) -> Option<UserHandle> {
        self.session.read().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

/// collection -> id -> fields
#[derive(Default)]
pub struct LocalStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Fields>>>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collections(&self) -> MutexGuard<'_, HashMap<String, BTreeMap<String, Fields>>> {
        self.collections.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, AtemateError> {
        Ok(self
            .collections()
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| Document {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        fields: Fields,
        merge: bool,
    ) -> Result<(), AtemateError> {
        let mut collections = self.collections();
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) if merge => existing.extend(fields),
            _ => {
                docs.insert(id.to_string(), fields);
            }
        }
        Ok(())
    }

    async fn add(&self, collection: &str, fields: Fields) -> Result<String, AtemateError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.collections()
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), fields);
        Ok(id)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Vec<(FieldPath, Value)>,
    ) -> Result<(), AtemateError> {
        let mut collections = self.collections();
        let doc = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| AtemateError::NotFound(format!("{collection}/{id}")))?;
        for (path, value) in updates {
            assign(doc, &path, value);
        }
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, AtemateError> {
        let collections = self.collections();
        let Some(docs) = collections.get(&query.collection) else {
            return Ok(Vec::new());
        };

        let filters: Vec<(FieldPath, &Value)> = query
            .filters
            .iter()
            .map(|f| (FieldPath::parse(&f.field), &f.value))
            .collect();
        let order = query
            .order_by
            .as_ref()
            .map(|o| (FieldPath::parse(&o.field), o.descending));

        let mut matched: Vec<Document> = docs
            .iter()
            .filter(|(_, fields)| {
                filters
                    .iter()
                    .all(|(path, want)| lookup(fields, path) == Some(*want))
            })
            // Ordering on a field excludes documents that lack it.
            .filter(|(_, fields)| {
                order
                    .as_ref()
                    .is_none_or(|(path, _)| lookup(fields, path).is_some())
            })
            .map(|(id, fields)| Document {
                id: id.clone(),
                fields: fields.clone(),
            })
            .collect();

        if let Some((path, descending)) = &order {
            matched.sort_by(|a, b| {
                let ord = compare(lookup(&a.fields, path), lookup(&b.fields, path));
                if *descending { ord.reverse() } else { ord }
            });
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AtemateError> {
        if let Some(docs) = self.collections().get_mut(collection) {
            docs.remove(id);
        }
        Ok(())
    }
}

/// Cross-type order: null < bool < number < string < everything else.
fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match (a, b) {
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .unwrap_or_default()
            .total_cmp(&y.as_f64().unwrap_or_default()),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(x), Some(y)) => rank(x).cmp(&rank(y)),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}
