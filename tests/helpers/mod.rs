//! Test helper utilities: an in-process gateway plus mock vendor servers.

#![allow(dead_code)]

use axum::extract::{Path, Query, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, ETAG};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use reqwest::multipart;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;

use tryon_gateway::app_state::AppState;
use tryon_gateway::config::AppConfig;
use tryon_gateway::routes;

/// Task id handed out by the mock Kolors submit endpoint.
pub const TASK_ID: &str = "abc";

/// Serve a router on an ephemeral local port and return its base URL.
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Test server error");
    });
    format!("http://{addr}")
}

/// A running gateway and the directory its multipart uploads spool to.
pub struct TestApp {
    pub base_url: String,
    pub upload_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestApp {
    pub fn tryon_url(&self) -> String {
        format!("{}/api/tryon", self.base_url)
    }

    /// Number of entries left in the spool directory.
    pub fn spooled_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path())
            .expect("Upload dir missing")
            .count()
    }
}

/// Start the real router, configured only from `vars`.
pub async fn spawn_app(vars: Vec<(&str, String)>) -> TestApp {
    let upload_dir = tempfile::tempdir().expect("Failed to create upload dir");

    let mut vars: Vec<(String, String)> = vars
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    vars.push((
        "UPLOAD_DIR".to_string(),
        upload_dir.path().display().to_string(),
    ));

    let config = AppConfig::from_vars(vars).expect("Invalid test configuration");
    let state = AppState::from_config(&config).expect("Failed to build app state");
    let base_url = serve(routes::router(state, config.body_limit_bytes)).await;

    TestApp {
        base_url,
        upload_dir,
        client: reqwest::Client::new(),
    }
}

/// Configuration for the Kolors provider pointed at `kolors_url`, with
/// millisecond poll pacing.
pub fn kolors_vars(kolors_url: &str, max_attempts: u32) -> Vec<(&'static str, String)> {
    vec![
        ("TRYON_PROVIDER", "kolors".to_string()),
        ("KOLORS_API_URL", format!("{kolors_url}/")),
        ("ACCESS_KEY_ID", "test-access-key".to_string()),
        ("ACCESS_KEY_SECRET", "test-access-secret".to_string()),
        ("POLL_INITIAL_DELAY_MS", "5".to_string()),
        ("POLL_INTERVAL_MS", "5".to_string()),
        ("POLL_MAX_ATTEMPTS", max_attempts.to_string()),
    ]
}

/// Scripted Kolors vendor: fixed submit status, then one query reply per
/// call (the last reply repeats).
pub struct KolorsScript {
    submit_status: String,
    query_replies: Vec<Value>,
    pub submits: AtomicUsize,
    pub queries: AtomicUsize,
    pub last_seed: AtomicU32,
    pub last_task_id: Mutex<Option<String>>,
    pub last_authorization: Mutex<Option<String>>,
    pub last_human_image: Mutex<Option<String>>,
}

impl KolorsScript {
    pub fn submit_count(&self) -> usize {
        self.submits.load(Ordering::SeqCst)
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

/// Start a mock Kolors API; returns its base URL and the shared script.
pub async fn spawn_kolors(submit_status: &str, query_replies: Vec<Value>) -> (String, Arc<KolorsScript>) {
    let script = Arc::new(KolorsScript {
        submit_status: submit_status.to_string(),
        query_replies,
        submits: AtomicUsize::new(0),
        queries: AtomicUsize::new(0),
        last_seed: AtomicU32::new(u32::MAX),
        last_task_id: Mutex::new(None),
        last_authorization: Mutex::new(None),
        last_human_image: Mutex::new(None),
    });

    let router = Router::new()
        .route("/Submit", post(kolors_submit))
        .route("/Query", get(kolors_query))
        .with_state(script.clone());

    (serve(router).await, script)
}

async fn kolors_submit(
    State(script): State<Arc<KolorsScript>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    script.submits.fetch_add(1, Ordering::SeqCst);
    if let Some(seed) = body["seed"].as_u64() {
        script.last_seed.store(seed as u32, Ordering::SeqCst);
    }
    *script.last_human_image.lock().unwrap() = body["humanImage"].as_str().map(str::to_string);
    *script.last_authorization.lock().unwrap() = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Json(json!({ "result": { "status": script.submit_status, "result": TASK_ID } }))
}

async fn kolors_query(
    State(script): State<Arc<KolorsScript>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let n = script.queries.fetch_add(1, Ordering::SeqCst);
    *script.last_task_id.lock().unwrap() = params.get("taskId").cloned();

    let reply = script
        .query_replies
        .get(n)
        .or_else(|| script.query_replies.last())
        .cloned()
        .unwrap_or_else(|| json!({ "status": "processing" }));
    Json(json!({ "result": reply }))
}

/// Headers seen by a single-endpoint mock.
#[derive(Default)]
pub struct Recorded {
    pub calls: AtomicUsize,
    pub authorization: Mutex<Option<String>>,
    pub body: Mutex<Option<Value>>,
}

/// Mock Hugging Face endpoint answering every POST with `reply`.
pub async fn spawn_huggingface(reply: Value) -> (String, Arc<Recorded>) {
    let recorded = Arc::new(Recorded::default());
    let rec = recorded.clone();
    let router = Router::new().route(
        "/tryon",
        post(move |headers: HeaderMap| {
            let rec = rec.clone();
            let reply = reply.clone();
            async move {
                rec.calls.fetch_add(1, Ordering::SeqCst);
                *rec.authorization.lock().unwrap() = headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Json(reply)
            }
        }),
    );
    (format!("{}/tryon", serve(router).await), recorded)
}

/// Mock Fal.ai `fashn/tryon` endpoint answering every POST with `reply`.
pub async fn spawn_fal(reply: Value) -> (String, Arc<Recorded>) {
    let recorded = Arc::new(Recorded::default());
    let rec = recorded.clone();
    let router = Router::new().route(
        "/fashn/tryon",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let rec = rec.clone();
            let reply = reply.clone();
            async move {
                rec.calls.fetch_add(1, Ordering::SeqCst);
                *rec.authorization.lock().unwrap() = headers
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                *rec.body.lock().unwrap() = Some(body);
                Json(reply)
            }
        }),
    );
    (format!("{}/fashn/tryon", serve(router).await), recorded)
}

/// Size of the body served at `/large.png` by the Workers AI mock.
pub const LARGE_IMAGE_BYTES: usize = 64 * 1024;

/// Mock Workers AI plus static images: `/result.png` (valid), `/large.png`
/// ([`LARGE_IMAGE_BYTES`] of PNG-typed filler) and `/broken.gif` (GIF-typed
/// text).
pub async fn spawn_workers_ai(description: &str) -> (String, Arc<Recorded>) {
    let recorded = Arc::new(Recorded::default());
    let rec = recorded.clone();
    let description = description.to_string();
    let image = png_bytes();

    let router = Router::new()
        .route(
            "/result.png",
            get(move || {
                let image = image.clone();
                async move { ([(CONTENT_TYPE, "image/png")], image) }
            }),
        )
        .route(
            "/large.png",
            get(|| async { ([(CONTENT_TYPE, "image/png")], vec![0u8; LARGE_IMAGE_BYTES]) }),
        )
        .route(
            "/broken.gif",
            get(|| async { ([(CONTENT_TYPE, "image/gif")], "not really a gif") }),
        )
        .route(
            "/accounts/{account}/ai/run/{model}",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let rec = rec.clone();
                let description = description.clone();
                async move {
                    rec.calls.fetch_add(1, Ordering::SeqCst);
                    *rec.authorization.lock().unwrap() = headers
                        .get(AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *rec.body.lock().unwrap() = Some(body);
                    Json(json!({ "result": { "description": description }, "success": true }))
                }
            }),
        );

    (serve(router).await, recorded)
}

/// Bucket name used by the object storage mock.
pub const BUCKET: &str = "tryon-bucket";

/// Objects received by the storage mock.
#[derive(Default)]
pub struct StorageLog {
    pub puts: AtomicUsize,
    pub heads: AtomicUsize,
    pub keys: Mutex<Vec<String>>,
    pub content_types: Mutex<Vec<String>>,
}

/// Mock S3-compatible endpoint: path-style `PUT /{BUCKET}/{key}` is accepted,
/// and everything under `/public/` answers as a PNG.
pub async fn spawn_object_storage() -> (String, Arc<StorageLog>) {
    let log = Arc::new(StorageLog::default());
    let put_log = log.clone();
    let head_log = log.clone();

    let router = Router::new()
        .route(
            &format!("/{BUCKET}/{{*key}}"),
            axum::routing::put(
                move |Path(key): Path<String>, headers: HeaderMap, _body: axum::body::Bytes| {
                    let log = put_log.clone();
                    async move {
                        log.puts.fetch_add(1, Ordering::SeqCst);
                        log.keys.lock().unwrap().push(key);
                        log.content_types.lock().unwrap().push(
                            headers
                                .get(CONTENT_TYPE)
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or_default()
                                .to_string(),
                        );
                        [(ETAG, "\"d41d8cd98f00b204e9800998ecf8427e\"")]
                    }
                },
            ),
        )
        .route(
            "/public/{*key}",
            get(move || {
                let log = head_log.clone();
                async move {
                    log.heads.fetch_add(1, Ordering::SeqCst);
                    ([(CONTENT_TYPE, "image/png")], png_bytes())
                }
            }),
        );

    (serve(router).await, log)
}

/// Object storage settings pointed at the mock, with uploads served from
/// `{storage_url}{public_path}`.
pub fn object_storage_vars(storage_url: &str, public_path: &str) -> Vec<(&'static str, String)> {
    vec![
        ("IMAGE_STORE", "object_storage".to_string()),
        ("STORAGE_BUCKET", BUCKET.to_string()),
        ("STORAGE_ENDPOINT", storage_url.to_string()),
        ("STORAGE_REGION", "us-east-1".to_string()),
        ("STORAGE_ACCESS_KEY", "test-access".to_string()),
        ("STORAGE_SECRET_KEY", "test-secret".to_string()),
        ("STORAGE_PUBLIC_URL", format!("{storage_url}{public_path}")),
    ]
}

/// A small valid PNG.
pub fn png_bytes() -> Vec<u8> {
    let img = image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
        4,
        4,
        image::Rgba([180, 40, 60, 255]),
    ));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode test PNG");
    out.into_inner()
}

/// Multipart body as sent by the upload UI.
pub fn tryon_form(
    person: Option<Vec<u8>>,
    garment: Option<Vec<u8>>,
    seed: Option<&str>,
    randomize_seed: bool,
) -> multipart::Form {
    let mut form = multipart::Form::new();
    if let Some(bytes) = person {
        form = form.part(
            "personImg",
            multipart::Part::bytes(bytes)
                .file_name("person.png")
                .mime_str("image/png")
                .unwrap(),
        );
    }
    if let Some(bytes) = garment {
        form = form.part(
            "garmentImg",
            multipart::Part::bytes(bytes)
                .file_name("garment.png")
                .mime_str("image/png")
                .unwrap(),
        );
    }
    if let Some(seed) = seed {
        form = form.text("seed", seed.to_string());
    }
    form.text("randomizeSeed", randomize_seed.to_string())
}
