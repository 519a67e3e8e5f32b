#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{TimeZone, Utc};
use news_aggregator::config::{self, Config};
use news_aggregator::db::Pool;
use news_aggregator::model::ArticleRecord;
use sqlx::sqlite::SqlitePoolOptions;
use axum::extract::State;
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;

pub async fn setup_pool() -> Pool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

pub fn example_config() -> Config {
    serde_yaml::from_str(config::example()).unwrap()
}

/// A canonical record published on 2025-01-`day` at noon UTC.
pub fn record(url: &str, title: &str, source: &str, day: u32) -> ArticleRecord {
    ArticleRecord {
        title: title.to_string(),
        description: None,
        content: None,
        url: url.to_string(),
        image_url: None,
        published_at: Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap(),
        author: None,
        source_name: source.to_string(),
        category_name: None,
    }
}

/// Canned provider endpoint: every request gets the same status and JSON
/// body, and its method and URI are recorded.
#[derive(Clone)]
struct Canned {
    status: StatusCode,
    body: String,
    requests: Arc<Mutex<Vec<String>>>,
}

async fn canned_response(State(canned): State<Canned>, method: Method, uri: Uri) -> Response {
    canned.requests.lock().unwrap().push(format!("{method} {uri}"));
    (
        canned.status,
        [(header::CONTENT_TYPE, "application/json")],
        canned.body.clone(),
    )
        .into_response()
}

pub struct Responder {
    pub base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Responder {
    pub async fn start(status: u16, body: impl Into<String>) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new().fallback(canned_response).with_state(Canned {
            status: StatusCode::from_u16(status).unwrap(),
            body: body.into(),
            requests: requests.clone(),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/"),
            requests,
        }
    }

    /// Requests received so far, e.g. `GET /search?api-key=k`.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// A base URL nothing listens on.
pub fn refused_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/")
}
