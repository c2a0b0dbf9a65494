#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use forgestudy_backend::config::Config;
use forgestudy_backend::db::DatabaseProxy;
use forgestudy_backend::services::llm_provider::{LLMConfig, LLMProvider};
use forgestudy_backend::state::AppState;
use forgestudy_backend::time::now_ms;

pub const PASSWORD: &str = "correct-horse-battery";

/// Router plus a handle on the same SQLite file for seeding and asserting.
pub struct TestApp {
    pub router: Router,
    pub db: DatabaseProxy,
    _dir: TempDir,
}

pub async fn test_db() -> (DatabaseProxy, TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("forgestudy.db");
    let config = Config::for_database(format!("sqlite:{}?mode=rwc", path.display()));
    let db = DatabaseProxy::connect(&config).await.expect("connect sqlite");
    (db, dir)
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("forgestudy.db");
        let config = Config::for_database(format!("sqlite:{}?mode=rwc", path.display()));
        let db = DatabaseProxy::connect(&config).await.expect("connect sqlite");
        let state = AppState::new(config, db.clone(), LLMProvider::new(LLMConfig::disabled()));
        Self {
            router: forgestudy_backend::build_router(state),
            db,
            _dir: dir,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.dispatch(request).await
    }

    pub async fn send_raw(
        &self,
        uri: &str,
        headers: &[(&str, String)],
        body: Vec<u8>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }
        self.dispatch(builder.body(Body::from(body)).unwrap()).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.send(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.send(Method::POST, uri, Some(token), Some(body)).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let (status, _, body) = self.dispatch_full(request).await;
        (status, body)
    }

    pub async fn dispatch_full(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, headers, body)
    }

    /// Registers an account and returns `(user_id, token)`.
    pub async fn register(&self, email: &str) -> (String, String) {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({ "email": email, "password": PASSWORD, "displayName": "Parent" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        let user_id = body["data"]["user"]["id"].as_str().unwrap().to_string();
        let token = body["data"]["token"].as_str().unwrap().to_string();
        (user_id, token)
    }

    pub async fn create_profile(&self, token: &str, name: &str) -> String {
        let (status, body) = self
            .post("/api/profiles", token, json!({ "displayName": name, "gradeLevel": "5" }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "profile failed: {body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    pub async fn count(&self, table: &str) -> i64 {
        count_rows(&self.db, table).await
    }
}

pub async fn count_rows(db: &DatabaseProxy, table: &str) -> i64 {
    use sqlx::Row;
    let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {table}"))
        .fetch_one(db.pool())
        .await
        .unwrap();
    row.try_get::<i64, _>("n").unwrap()
}

pub struct SeedTopic<'a> {
    pub profile_id: &'a str,
    pub title: &'a str,
    pub orbit_state: i64,
    pub mastery_score: f64,
    pub next_review_date: Option<i64>,
    pub updated_at: i64,
}

pub async fn seed_topic(db: &DatabaseProxy, topic: SeedTopic<'_>) -> String {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        r#"
        INSERT INTO study_topics
          (id, profile_id, title, source, mastery_score, orbit_state, next_review_date,
           interval_days, ease_factor, repetitions, created_at, updated_at)
        VALUES ($1, $2, $3, 'manual', $4, $5, $6, 1, 2.5, 1, $7, $7)
        "#,
    )
    .bind(&id)
    .bind(topic.profile_id)
    .bind(topic.title)
    .bind(topic.mastery_score)
    .bind(topic.orbit_state)
    .bind(topic.next_review_date)
    .bind(topic.updated_at)
    .execute(db.pool())
    .await
    .unwrap();
    id
}

pub async fn seed_homework(
    db: &DatabaseProxy,
    profile_id: &str,
    title: &str,
    due_at: i64,
) -> String {
    let id = Uuid::new_v4().to_string();
    let now = now_ms();
    sqlx::query(
        r#"
        INSERT INTO homework_tasks (id, profile_id, title, due_at, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, 'pending', $5, $5)
        "#,
    )
    .bind(&id)
    .bind(profile_id)
    .bind(title)
    .bind(due_at)
    .bind(now)
    .execute(db.pool())
    .await
    .unwrap();
    id
}

pub async fn complete_homework(db: &DatabaseProxy, task_id: &str) {
    sqlx::query("UPDATE homework_tasks SET status = 'completed' WHERE id = $1")
        .bind(task_id)
        .execute(db.pool())
        .await
        .unwrap();
}
