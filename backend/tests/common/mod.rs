#![allow(dead_code)]

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;

use course_enrollment::api::router;
use course_enrollment::auth::{AuthStrategies, Role, static_tokens};
use course_enrollment::config::TokenEntry;
use course_enrollment::db::{connect_in_memory, migrate};
use course_enrollment::state::AppState;

pub const ADMIN_TOKEN: &str = "admin-token";
pub const STUDENT_TOKEN: &str = "student-token";

pub struct TestApp {
    pub app: Router,
    pub db: SqlitePool,
}

pub async fn setup() -> TestApp {
    let db = connect_in_memory().await.expect("Failed to create database");
    migrate(&db).await.expect("Failed to run migrations");

    let auth = AuthStrategies::new()
        .register(
            Role::Admin,
            static_tokens(
                Role::Admin,
                vec![TokenEntry { subject: "root".into(), token: ADMIN_TOKEN.into() }],
            ),
        )
        .register(
            Role::Student,
            static_tokens(
                Role::Student,
                vec![TokenEntry { subject: "s1".into(), token: STUDENT_TOKEN.into() }],
            ),
        );

    let app = router(AppState::new(db.clone(), auth));
    TestApp { app, db }
}

impl TestApp {
    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        let response = self.app.clone().oneshot(request).await.expect("Request failed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    pub async fn create_course(&self, body: Value) -> Value {
        let (status, course) = self.send(Method::POST, "/course", Some(ADMIN_TOKEN), Some(body)).await;
        assert_eq!(status, StatusCode::OK, "create failed: {}", course);
        course
    }
}

/// Percent-encodes a JSON query parameter value.
pub fn encode(raw: &str) -> String {
    raw.bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            _ => format!("%{:02X}", b),
        })
        .collect()
}
