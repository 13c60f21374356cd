//! HTTP request handlers

use super::sse::{reply_stream, session_stream};
use super::types::{
    AnalyzeRequest, AnswerRequest, AttachmentRequest, ChatRequest, ErrorResponse, HistoryTurn,
    LanguageRequest, QuizRequest, QuizResponse, SuccessResponse,
};
use super::AppState;
use crate::attachment::{validate_language, Attachment, ValidationError};
use crate::conversation::Conversation;
use crate::gateway::{self, ContextTurn, GenerateRequest};
use crate::prompts;
use crate::quiz::{self, Quiz, FALLBACK_WARNING};
use crate::runtime::{DispatchOutcome, RuntimeError, SessionSnapshot};
use crate::session::SessionEvent;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, FromRequest, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.body_limit();

    Router::new()
        // Stateless gateway surfaces
        .route("/api/analyze", post(analyze))
        .route("/api/quiz", post(generate_quiz))
        // Session lifecycle
        .route("/api/sessions", post(create_session))
        .route(
            "/api/sessions/:id",
            get(get_session).delete(delete_session),
        )
        .route("/api/sessions/:id/stream", get(stream_session))
        // Session actions
        .route("/api/sessions/:id/attachment", post(select_attachment))
        .route("/api/sessions/:id/language", post(change_language))
        .route("/api/sessions/:id/analyze", post(request_analysis))
        .route("/api/sessions/:id/chat", post(send_chat))
        .route("/api/sessions/:id/quiz", post(request_quiz))
        .route("/api/sessions/:id/quiz/answer", post(select_answer))
        .route("/api/sessions/:id/quiz/next", post(next_question))
        .route("/api/sessions/:id/quiz/previous", post(previous_question))
        .route("/api/sessions/:id/summary", post(back_to_summary))
        .route("/version", get(get_version))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// `Json` whose rejections answer with the `{error}` body
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
struct ApiJson<T>(T);

// ============================================================
// Stateless Gateway Surfaces
// ============================================================

async fn analyze(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<AnalyzeRequest>,
) -> Result<Response, AppError> {
    let file_data = req
        .file_data
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("File data is required".to_string()))?;
    let language = req
        .language
        .as_deref()
        .map(validate_language)
        .transpose()?
        .ok_or_else(|| AppError::BadRequest("Language is required".to_string()))?;

    let attachment = Attachment::from_data_url(
        &file_data,
        req.mime_type.as_deref(),
        req.file_name.as_deref(),
        state.max_upload_bytes,
    )?;

    let request = if req.is_initial_analysis {
        GenerateRequest::new(prompts::summary_prompt(&language))
            .with_attachment(attachment.inline_data())
    } else {
        let text = req
            .user_message
            .filter(|m| !m.trim().is_empty())
            .ok_or(ValidationError::EmptyMessage)?;
        let history = checked_history(req.chat_history)?;
        GenerateRequest::new(text)
            .with_history(history)
            .with_attachment(attachment.inline_data())
    };

    tracing::info!(
        initial = req.is_initial_analysis,
        mime_type = %attachment.mime_type(),
        history_turns = request.history.len(),
        "Streaming analysis"
    );

    let events = gateway::open_events(state.gateway.as_ref(), &request).await;
    Ok(reply_stream(events).into_response())
}

/// Replays client-supplied turns through a `Conversation` so a history
/// that opens with the model, or with two user turns, is refused
fn checked_history(turns: Vec<HistoryTurn>) -> Result<Vec<ContextTurn>, AppError> {
    let mut conversation = Conversation::new();
    for turn in turns {
        let turn = ContextTurn::from(turn);
        conversation
            .append_turn(turn.role, turn.text)
            .map_err(|e| AppError::BadRequest(format!("Invalid chat history: {e}")))?;
    }
    Ok(conversation.to_context_history())
}

async fn generate_quiz(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<QuizRequest>,
) -> Result<Json<QuizResponse>, AppError> {
    let file_data = req
        .file_data
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("File data is required".to_string()))?;

    let outcome = match Attachment::from_data_url(
        &file_data,
        req.mime_type.as_deref(),
        req.file_name.as_deref(),
        state.max_upload_bytes,
    ) {
        Ok(attachment) => quiz::generate_quiz_or_fallback(state.gateway.as_ref(), &attachment).await,
        Err(e) => {
            tracing::warn!(error = %e, "Quiz upload rejected, serving fallback quiz");
            quiz::QuizOutcome {
                quiz: Quiz::fallback(),
                warning: Some(FALLBACK_WARNING.to_string()),
            }
        }
    };

    Ok(Json(QuizResponse {
        success: true,
        quiz: outcome.quiz,
        warning: outcome.warning,
    }))
}

// ============================================================
// Session Lifecycle
// ============================================================

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionSnapshot>) {
    let snapshot = state.sessions.create().await;
    (StatusCode::CREATED, Json(snapshot))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.sessions.snapshot(&id).await?))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, AppError> {
    if state.sessions.remove(&id).await {
        Ok(Json(SuccessResponse { success: true }))
    } else {
        Err(RuntimeError::NotFound(id).into())
    }
}

async fn stream_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (snapshot, updates) = state.sessions.subscribe(&id).await?;
    Ok(session_stream(snapshot, updates))
}

// ============================================================
// Session Actions
// ============================================================

async fn select_attachment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AttachmentRequest>,
) -> Result<Json<DispatchOutcome>, AppError> {
    match Attachment::from_data_url(
        &req.file_data,
        req.mime_type.as_deref(),
        req.file_name.as_deref(),
        state.max_upload_bytes,
    ) {
        Ok(attachment) => dispatch(&state, &id, SessionEvent::AttachmentSelected { attachment }).await,
        // Rejected uploads never reach the session
        Err(e) => Ok(Json(DispatchOutcome {
            applied: false,
            reason: Some(e.to_string()),
            session: state.sessions.snapshot(&id).await?,
        })),
    }
}

async fn change_language(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<LanguageRequest>,
) -> Result<Json<DispatchOutcome>, AppError> {
    dispatch(
        &state,
        &id,
        SessionEvent::LanguageChanged {
            language: req.language,
        },
    )
    .await
}

async fn request_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DispatchOutcome>, AppError> {
    dispatch(&state, &id, SessionEvent::AnalyzeRequested).await
}

async fn send_chat(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ChatRequest>,
) -> Result<Json<DispatchOutcome>, AppError> {
    dispatch(&state, &id, SessionEvent::ChatSubmitted { text: req.text }).await
}

async fn request_quiz(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DispatchOutcome>, AppError> {
    dispatch(&state, &id, SessionEvent::QuizRequested).await
}

async fn select_answer(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AnswerRequest>,
) -> Result<Json<DispatchOutcome>, AppError> {
    dispatch(
        &state,
        &id,
        SessionEvent::AnswerSelected {
            question_id: req.question_id,
            option: req.option,
        },
    )
    .await
}

async fn next_question(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DispatchOutcome>, AppError> {
    dispatch(&state, &id, SessionEvent::NextQuestion).await
}

async fn previous_question(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DispatchOutcome>, AppError> {
    dispatch(&state, &id, SessionEvent::PreviousQuestion).await
}

async fn back_to_summary(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DispatchOutcome>, AppError> {
    dispatch(&state, &id, SessionEvent::BackToSummary).await
}

async fn dispatch(
    state: &AppState,
    id: &str,
    event: SessionEvent,
) -> Result<Json<DispatchOutcome>, AppError> {
    Ok(Json(state.sessions.dispatch(id, event).await?))
}

// ============================================================
// Version
// ============================================================

async fn get_version() -> &'static str {
    concat!("study-companion ", env!("CARGO_PKG_VERSION"))
}

// ============================================================
// Error Handling
// ============================================================

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    Internal(String),
    /// Body extraction failed; keeps the extractor's status
    Rejected(StatusCode, String),
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Rejected(rejection.status(), rejection.body_text())
    }
}

impl From<ValidationError> for AppError {
    fn from(e: ValidationError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<RuntimeError> for AppError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::NotFound(_) => AppError::NotFound(e.to_string()),
            RuntimeError::Stopped(_) => AppError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Rejected(status, msg) => (status, msg),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(ErrorResponse::new(message));
        (status, body).into_response()
    }
}
