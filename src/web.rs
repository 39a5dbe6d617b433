use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::StatusCode;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::card::Card;
use crate::config::Config;
use crate::lesson::{self, Lesson};
use crate::review::{self, CardFilter, LessonSummary};
use crate::sm2::Grade;
use crate::store::{CardStore, StoreError};

/// Header carrying the caller's user id, set by the authenticating gateway.
pub const USER_HEADER: &str = "x-user-id";

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// -- App state --

struct ServerState {
    store: CardStore,
    lessons: BTreeMap<String, Lesson>,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<Mutex<ServerState>>,
    clock: Clock,
    list_limit: usize,
}

impl AppState {
    pub fn new(store: CardStore, lessons: BTreeMap<String, Lesson>, list_limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ServerState { store, lessons })),
            clock: Arc::new(Utc::now),
            list_limit,
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

// -- Errors --

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Not found")]
    NotFound,

    #[error("Lesson not found")]
    LessonNotFound,

    #[error("{0}")]
    BadRequest(&'static str),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::CardNotFound(_) => ApiError::NotFound,
            other => ApiError::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound | ApiError::LessonNotFound => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(e) => {
                log::error!("store error: {e}");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "message": "Server error" })),
                )
                    .into_response();
            }
        };
        (status, Json(json!({ "message": self.to_string() }))).into_response()
    }
}

// -- Caller identity --

pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| UserId(s.to_string()))
            .ok_or(ApiError::Unauthorized)
    }
}

// -- Handlers --

#[derive(Deserialize)]
struct ListQuery {
    due: Option<String>,
    #[serde(rename = "lessonId")]
    lesson_id: Option<String>,
}

async fn list_cards(
    State(state): State<AppState>,
    UserId(user): UserId,
    Query(query): Query<ListQuery>,
) -> Json<Vec<Card>> {
    let now = state.now();
    let st = state.inner.lock().await;

    let lesson_id = query.lesson_id.as_deref().filter(|l| !l.is_empty());
    let mut filter = CardFilter::user(&user).lesson(lesson_id);
    if query.due.as_deref() == Some("1") {
        filter = filter.due(now);
    }

    let cards = review::list_cards(st.store.cards(), filter, state.list_limit)
        .into_iter()
        .cloned()
        .collect();
    Json(cards)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewCard {
    #[serde(default)]
    front: String,
    #[serde(default)]
    back: String,
    #[serde(default)]
    example: String,
    lesson_id: Option<String>,
}

async fn create_card(
    State(state): State<AppState>,
    UserId(user): UserId,
    Json(form): Json<NewCard>,
) -> Result<(StatusCode, Json<Card>), ApiError> {
    if form.front.trim().is_empty() || form.back.trim().is_empty() {
        return Err(ApiError::BadRequest("front and back are required"));
    }
    let now = state.now();
    let card = Card::new(
        &user,
        form.lesson_id.as_deref(),
        &form.front,
        &form.back,
        &form.example,
        now,
    );

    let mut st = state.inner.lock().await;
    let card = st.store.insert(card)?;
    Ok((StatusCode::CREATED, Json(card)))
}

// The body is read leniently: a missing body, invalid JSON or a non-string
// grade all grade as `good`.
fn grade_from_body(body: &[u8]) -> Grade {
    let value: Option<Value> = serde_json::from_slice(body).ok();
    Grade::parse(value.as_ref().and_then(|v| v.get("grade")).and_then(Value::as_str))
}

async fn review_card(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Card>, ApiError> {
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::NotFound)?;
    let grade = grade_from_body(&body);

    // Load, schedule and persist under one lock so concurrent reviews of the
    // same card are applied one after the other.
    let mut st = state.inner.lock().await;
    let now = state.now();
    let card = st.store.review(&user, id, grade, now)?;
    Ok(Json(card))
}

async fn summary(State(state): State<AppState>, UserId(user): UserId) -> Json<Vec<LessonSummary>> {
    let now = state.now();
    let st = state.inner.lock().await;
    Json(review::lesson_summaries(st.store.cards(), &user, now))
}

#[derive(Serialize)]
struct Generated {
    created: usize,
}

async fn generate_lesson_cards(
    State(state): State<AppState>,
    UserId(user): UserId,
    Path(lesson_id): Path<String>,
) -> Result<Json<Generated>, ApiError> {
    let now = state.now();
    let mut st = state.inner.lock().await;

    let lesson = st.lessons.get(&lesson_id).ok_or(ApiError::LessonNotFound)?;
    let drafts = lesson::vocab_to_cards(&lesson.vocab);
    if drafts.is_empty() {
        return Ok(Json(Generated { created: 0 }));
    }

    let fresh = drafts
        .iter()
        .map(|d| Card::new(&user, Some(lesson_id.as_str()), &d.front, &d.back, &d.example, now))
        .collect();
    let created = st.store.replace_lesson_cards(&user, &lesson_id, fresh)?;
    Ok(Json(Generated { created }))
}

// -- Public entry points --

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/flashcards", get(list_cards).post(create_card))
        .route("/api/flashcards/summary", get(summary))
        .route("/api/flashcards/{id}/review", post(review_card))
        .route("/api/lessons/{id}/cards", post(generate_lesson_cards))
        .with_state(state)
}

pub async fn serve(config: &Config) -> anyhow::Result<()> {
    if !config.lessons_dir.exists() {
        log::warn!("Lessons path {:?} does not exist.", config.lessons_dir);
    }
    let lessons = lesson::load_lessons(std::slice::from_ref(&config.lessons_dir))
        .context("Failed to load lessons")?;
    let store = CardStore::open(&config.cards_file, Utc::now())
        .with_context(|| format!("Failed to open card store {:?}", config.cards_file))?;

    log::info!(
        "Loaded {} cards and {} lessons.",
        store.cards().len(),
        lessons.len()
    );

    let state = AppState::new(store, lessons, config.list_limit);
    let app = router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    log::info!("Serving at http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
