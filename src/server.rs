use std::sync::Arc;
use std::time::Instant;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Implementation, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, tool, tool_handler, tool_router};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::backend::firebase::FirebaseAuth;
use crate::backend::firestore::Firestore;
use crate::backend::local::{LocalIdentity, LocalStore};
use crate::backend::{DocumentStore, IdentityService};
use crate::config::Config;
use crate::dispatch::Completion;
use crate::dispatch::gemini::GeminiClient;
use crate::dispatch::nutrition::NutritionClient;
use crate::error::AtemateError;
use crate::response::{ToolMetadata, ToolResponse};
use crate::tools::account::SignInRequest;
use crate::tools::ask::AskRequest;
use crate::tools::nutrition::{BarcodeRequest, DescribeRequest};
use crate::tools::tips::{ListTipsRequest, TipIdRequest, UpdateTipRequest};
use crate::tools::tracker::{
    LogFitnessRequest, LogWaterRequest, SummaryRequest, date_or_today, utc_offset,
};
use crate::wellness::accounts::{Accounts, LoginOutcome, ProfileUpdate, SignupRequest, UserProfile};
use crate::wellness::assistant::{Assistant, ChatSession};
use crate::wellness::nutrition::NutritionAdvisor;
use crate::wellness::tips::{TipBoard, TipDraft};
use crate::wellness::tracker::Tracker;

/// External services the wellness layer runs on. Tests build this by hand
/// with local backends and scripted completions.
pub struct Services {
    pub identity: Arc<dyn IdentityService>,
    pub store: Arc<dyn DocumentStore>,
    pub completion: Arc<dyn Completion>,
    pub nutrition: NutritionClient,
}

impl Services {
    /// Firebase when configured, otherwise the in-process backend.
    pub fn from_config(config: &Config) -> Result<Self, AtemateError> {
        let (identity, store): (Arc<dyn IdentityService>, Arc<dyn DocumentStore>) =
            match &config.firebase {
                Some(firebase) => {
                    let auth: Arc<dyn IdentityService> = Arc::new(FirebaseAuth::new(firebase)?);
                    let store: Arc<dyn DocumentStore> =
                        Arc::new(Firestore::new(firebase, auth.clone())?);
                    tracing::info!(project = %firebase.project_id, "backend: firebase");
                    (auth, store)
                }
                None => {
                    tracing::info!("backend: local (in-memory, not persisted)");
                    let identity: Arc<dyn IdentityService> = Arc::new(LocalIdentity::new());
                    let store: Arc<dyn DocumentStore> = Arc::new(LocalStore::new());
                    (identity, store)
                }
            };

        Ok(Self {
            identity,
            store,
            completion: Arc::new(GeminiClient::new(&config.gemini, config.retry.clone())?),
            nutrition: NutritionClient::new(&config.nutrition)?,
        })
    }
}

#[derive(Clone)]
pub struct AtemateServer {
    accounts: Arc<Accounts>,
    tips: Arc<TipBoard>,
    tracker: Arc<Tracker>,
    assistant: Arc<Assistant>,
    nutrition: Arc<NutritionAdvisor>,
    /// Held across the whole ask, so questions are answered one at a time.
    chat: Arc<Mutex<ChatSession>>,
    /// Child of `shutdown` for asks against the current session. Replaced
    /// and cancelled whenever the session is reset.
    chat_cancel: Arc<std::sync::Mutex<CancellationToken>>,
    shutdown: CancellationToken,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl AtemateServer {
    pub fn new(config: Config) -> Result<Self, AtemateError> {
        Ok(Self::from_services(Services::from_config(&config)?))
    }

    pub fn from_services(services: Services) -> Self {
        let Services {
            identity,
            store,
            completion,
            nutrition,
        } = services;
        let shutdown = CancellationToken::new();

        Self {
            accounts: Arc::new(Accounts::new(identity, store.clone())),
            tips: Arc::new(TipBoard::new(store.clone())),
            tracker: Arc::new(Tracker::new(store.clone())),
            assistant: Arc::new(Assistant::new(completion.clone(), store)),
            nutrition: Arc::new(NutritionAdvisor::new(nutrition, completion)),
            chat: Arc::new(Mutex::new(ChatSession::new())),
            chat_cancel: Arc::new(std::sync::Mutex::new(shutdown.child_token())),
            shutdown,
            tool_router: Self::tool_router(),
        }
    }

    // ------------------------------------------------------------------
    // Accounts
    // ------------------------------------------------------------------

    #[tool(
        name = "sign_up",
        description = "Create a user or dietician account with its profile, and sign it in. Dietician accounts start unverified and cannot sign in until verified."
    )]
    async fn sign_up(
        &self,
        Parameters(req): Parameters<SignupRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let kind = req.kind;
        let result = self.accounts.sign_up(req).await.map(|user| {
            json!({"uid": user.uid, "email": user.email, "kind": kind.as_str()})
        });
        if result.is_ok() {
            self.reset_chat().await;
        }
        Ok(finish("sign_up", start, result))
    }

    #[tool(
        name = "sign_in",
        description = "Sign in with email and password. Reports whether the account is a member or a verified dietician."
    )]
    async fn sign_in(
        &self,
        Parameters(req): Parameters<SignInRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let result = match self.accounts.sign_in(&req.email, &req.password).await {
            Ok(LoginOutcome::Member(user)) => {
                Ok(json!({"uid": user.uid, "email": user.email, "kind": "user"}))
            }
            Ok(LoginOutcome::Dietician(user)) => {
                Ok(json!({"uid": user.uid, "email": user.email, "kind": "dietician"}))
            }
            Ok(LoginOutcome::PendingVerification) => Err(AtemateError::AuthFailed(
                "dietician account is pending verification".to_string(),
            )),
            Ok(LoginOutcome::UnknownAccount) => Err(AtemateError::AuthFailed(
                "no profile exists for this account".to_string(),
            )),
            Err(e) => Err(e),
        };
        self.reset_chat().await;
        Ok(finish("sign_in", start, result))
    }

    #[tool(name = "sign_out", description = "Sign out and clear the chat history.")]
    async fn sign_out(&self) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let result = self.accounts.sign_out().await;
        self.reset_chat().await;
        Ok(finish_text("sign_out", start, result.map(|()| "signed out".to_string())))
    }

    #[tool(
        name = "profile",
        description = "Show the signed-in user's profile.",
        annotations(read_only_hint = true)
    )]
    async fn profile(&self) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        Ok(finish("profile", start, self.current_profile().await))
    }

    #[tool(
        name = "update_profile",
        description = "Update profile fields of the signed-in user. Omitted fields are left unchanged; medical_history is comma-separated."
    )]
    async fn update_profile(
        &self,
        Parameters(req): Parameters<ProfileUpdate>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let result = match self.accounts.current_user() {
            Ok(user) => self.accounts.update_profile(&user.uid, req).await,
            Err(e) => Err(e),
        };
        Ok(finish_text("update_profile", start, result.map(|()| "profile updated".to_string())))
    }

    // ------------------------------------------------------------------
    // Assistant
    // ------------------------------------------------------------------

    #[tool(
        name = "ask",
        description = "Ask the health assistant about diet, fitness or habits. Answers are personalized with the signed-in user's profile. Questions are answered one at a time.",
        annotations(read_only_hint = true)
    )]
    async fn ask(&self, Parameters(req): Parameters<AskRequest>) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let uid = if req.personalize() {
            self.accounts.current_user().ok().map(|user| user.uid)
        } else {
            None
        };
        let cancel = self.session_token();

        let mut session = self.chat.lock().await;
        let result = self
            .assistant
            .ask(&mut session, uid.as_deref(), &req.question, &cancel)
            .await
            .map(|message| message.text);
        Ok(finish_text("ask", start, result))
    }

    #[tool(
        name = "chat_history",
        description = "Show the current chat session, oldest message first.",
        annotations(read_only_hint = true)
    )]
    async fn chat_history(&self) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let session = self.chat.lock().await;
        Ok(finish("chat_history", start, Ok(session.messages())))
    }

    #[tool(
        name = "ai_tips",
        description = "Generate short daily tips (diet, gym, sleep, hydration and more) from the assistant model.",
        annotations(read_only_hint = true)
    )]
    async fn ai_tips(&self) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let cancel = self.shutdown.child_token();
        Ok(finish("ai_tips", start, self.assistant.ai_tips(&cancel).await))
    }

    // ------------------------------------------------------------------
    // Health tips
    // ------------------------------------------------------------------

    #[tool(
        name = "list_tips",
        description = "List dietician health tips. Set `mine` to list only the signed-in dietician's tips.",
        annotations(read_only_hint = true)
    )]
    async fn list_tips(
        &self,
        Parameters(req): Parameters<ListTipsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let result = if req.mine.unwrap_or(false) {
            match self.accounts.current_user() {
                Ok(user) => self.tips.list_by_dietician(&user.uid).await,
                Err(e) => Err(e),
            }
        } else {
            self.tips.list_all().await
        };
        Ok(finish("list_tips", start, result))
    }

    #[tool(
        name = "add_tip",
        description = "Publish a health tip as the signed-in verified dietician."
    )]
    async fn add_tip(&self, Parameters(req): Parameters<TipDraft>) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let result = match self.accounts.current_dietician().await {
            Ok(dietician) => self.tips.add(&dietician.uid, &req).await,
            Err(e) => Err(e),
        };
        Ok(finish("add_tip", start, result.map(|id| json!({"tip_id": id}))))
    }

    #[tool(
        name = "update_tip",
        description = "Replace the title, content and category of a tip. Requires a verified dietician."
    )]
    async fn update_tip(
        &self,
        Parameters(req): Parameters<UpdateTipRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let result = match self.accounts.current_dietician().await {
            Ok(_) => self.tips.update(&req.tip_id, &req.draft()).await,
            Err(e) => Err(e),
        };
        Ok(finish_text("update_tip", start, result.map(|()| "tip updated".to_string())))
    }

    #[tool(
        name = "delete_tip",
        description = "Delete a tip. Requires a verified dietician."
    )]
    async fn delete_tip(
        &self,
        Parameters(req): Parameters<TipIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let result = match self.accounts.current_dietician().await {
            Ok(_) => self.tips.delete(&req.tip_id).await,
            Err(e) => Err(e),
        };
        Ok(finish_text("delete_tip", start, result.map(|()| "tip deleted".to_string())))
    }

    #[tool(
        name = "like_tip",
        description = "Like a tip as the signed-in user, or remove the like if already given."
    )]
    async fn like_tip(
        &self,
        Parameters(req): Parameters<TipIdRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let result = match self.accounts.current_user() {
            Ok(user) => self.tips.toggle_like(&user.uid, &req.tip_id).await,
            Err(e) => Err(e),
        };
        Ok(finish("like_tip", start, result.map(|liked| json!({"liked": liked}))))
    }

    // ------------------------------------------------------------------
    // Tracker
    // ------------------------------------------------------------------

    #[tool(
        name = "log_water",
        description = "Record the day's water intake in millilitres for the signed-in user. Replaces any earlier entry for that date."
    )]
    async fn log_water(
        &self,
        Parameters(req): Parameters<LogWaterRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let result = async {
            let date = date_or_today(req.date.as_deref(), utc_offset(req.utc_offset_minutes)?);
            let user = self.accounts.current_user()?;
            self.tracker.log_water(&user.uid, &date, req.ml).await?;
            Ok::<_, AtemateError>(format!("logged {} ml for {date}", req.ml))
        }
        .await;
        Ok(finish_text("log_water", start, result))
    }

    #[tool(
        name = "log_fitness",
        description = "Record the day's steps and calories burned for the signed-in user."
    )]
    async fn log_fitness(
        &self,
        Parameters(req): Parameters<LogFitnessRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let result = async {
            let date = date_or_today(req.date.as_deref(), utc_offset(req.utc_offset_minutes)?);
            let user = self.accounts.current_user()?;
            self.tracker
                .log_fitness(&user.uid, &date, req.steps, req.calories)
                .await?;
            Ok::<_, AtemateError>(format!(
                "logged {} steps, {} kcal for {date}",
                req.steps, req.calories
            ))
        }
        .await;
        Ok(finish_text("log_fitness", start, result))
    }

    #[tool(
        name = "daily_summary",
        description = "Water, steps and calories for a day plus the latest dietician tip. Pass utc_offset_minutes so the greeting and default date follow the caller's clock.",
        annotations(read_only_hint = true)
    )]
    async fn daily_summary(
        &self,
        Parameters(req): Parameters<SummaryRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let result = async {
            let offset = utc_offset(req.utc_offset_minutes)?;
            let date = date_or_today(req.date.as_deref(), offset);
            let user = self.accounts.current_user()?;
            self.tracker.daily_summary(&user.uid, &date, offset).await
        }
        .await;
        Ok(finish("daily_summary", start, result))
    }

    // ------------------------------------------------------------------
    // Nutrition
    // ------------------------------------------------------------------

    #[tool(
        name = "lookup_barcode",
        description = "Look up a packaged food by UPC barcode: calories, fat, protein, sugar and fiber.",
        annotations(read_only_hint = true)
    )]
    async fn lookup_barcode(
        &self,
        Parameters(req): Parameters<BarcodeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        Ok(finish("lookup_barcode", start, self.nutrition.lookup(&req.barcode).await))
    }

    #[tool(
        name = "describe_nutrition",
        description = "Explain a product's nutrition in plain language.",
        annotations(read_only_hint = true)
    )]
    async fn describe_nutrition(
        &self,
        Parameters(req): Parameters<DescribeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let start = Instant::now();
        let cancel = self.shutdown.child_token();
        let text = self.nutrition.describe(&req.product_name, &cancel).await;
        Ok(finish_text("describe_nutrition", start, Ok(text)))
    }
}

impl AtemateServer {
    /// Cancelling this aborts every in-flight assistant request.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn session_token(&self) -> CancellationToken {
        self.chat_cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Cancels any ask still running against the old session before waiting
    /// for the chat lock.
    async fn reset_chat(&self) {
        let stale = {
            let mut current = self
                .chat_cancel
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *current, self.shutdown.child_token())
        };
        stale.cancel();
        *self.chat.lock().await = ChatSession::new();
    }

    async fn current_profile(&self) -> Result<UserProfile, AtemateError> {
        let user = self.accounts.current_user()?;
        self.accounts
            .profile(&user.uid)
            .await?
            .ok_or_else(|| AtemateError::NotFound(format!("profile for {}", user.email)))
    }
}

fn metadata(tool_name: &str, start: Instant) -> ToolMetadata {
    ToolMetadata {
        tool_name: tool_name.to_string(),
        duration_seconds: start.elapsed().as_secs_f64(),
    }
}

fn failure(tool_name: &str, start: Instant, e: AtemateError) -> CallToolResult {
    tracing::warn!(tool = tool_name, "tool failed: {e}");
    ToolResponse::error(e.user_message(), metadata(tool_name, start)).into_call_tool_result()
}

fn finish<T: Serialize>(
    tool_name: &str,
    start: Instant,
    result: Result<T, AtemateError>,
) -> CallToolResult {
    match result {
        Ok(value) => ToolResponse::data(&value, metadata(tool_name, start)).into_call_tool_result(),
        Err(e) => failure(tool_name, start, e),
    }
}

fn finish_text(
    tool_name: &str,
    start: Instant,
    result: Result<String, AtemateError>,
) -> CallToolResult {
    match result {
        Ok(text) => ToolResponse::success(text, metadata(tool_name, start)).into_call_tool_result(),
        Err(e) => failure(tool_name, start, e),
    }
}

#[tool_handler]
impl ServerHandler for AtemateServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "atemate".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "Atemate: diet and fitness companion.\n\n\
                 1. `sign_up` or `sign_in` first; most tools act on the signed-in account.\n\
                 2. `ask` the health assistant; answers use the user's profile.\n\
                 3. `log_water` / `log_fitness` record the day, `daily_summary` reads it back.\n\
                 4. `lookup_barcode` then `describe_nutrition` for packaged food.\n\
                 5. Verified dieticians manage tips with `add_tip`, `update_tip`, `delete_tip`.\n\n\
                 Every tool replies with JSON: `status` is \"success\" or \"error\"."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
