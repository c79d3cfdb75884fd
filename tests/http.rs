use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use chrono::{Duration as Days, Local, NaiveDate};
use once_cell::sync::Lazy;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

const API_KEY: &str = "integration-key";

#[derive(Debug, Deserialize)]
struct RecordBody {
    date: NaiveDate,
    value: u64,
    delta: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreakBody {
    current_streak: u32,
    longest_streak: u32,
}

#[derive(Debug, Deserialize)]
struct MutationBody {
    record: Option<RecordBody>,
    streak: StreakBody,
    pending: usize,
}

#[derive(Debug, Deserialize)]
struct SyncStatusBody {
    online: bool,
    authenticated: bool,
    pending: usize,
    remote_id: Option<String>,
    last_sync: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SyncReportBody {
    success: bool,
    outcome: Option<Value>,
}

struct TestServer {
    base_url: String,
    child: Child,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

type Bins = Arc<StdMutex<HashMap<String, Value>>>;

/// JSON-blob API stand-in, running on its own thread so it outlives any
/// single test runtime.
struct MockBlobApi {
    base_url: String,
    bins: Bins,
}

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));
static BLOB_API: Lazy<MockBlobApi> = Lazy::new(spawn_blob_api);

#[cfg(unix)]
mod cleanup {
    use std::sync::Once;
    use std::sync::atomic::{AtomicI32, Ordering};

    static REGISTER: Once = Once::new();
    static PID: AtomicI32 = AtomicI32::new(0);

    pub fn register(pid: u32) {
        REGISTER.call_once(|| {
            PID.store(pid as i32, Ordering::SeqCst);
            unsafe {
                libc::atexit(on_exit);
            }
        });
    }

    extern "C" fn on_exit() {
        let pid = PID.load(Ordering::SeqCst);
        if pid > 0 {
            unsafe {
                libc::kill(pid, libc::SIGTERM);
            }
        }
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("X-Master-Key").and_then(|v| v.to_str().ok()) == Some(API_KEY)
}

async fn create_bin(
    State(bins): State<Bins>,
    headers: HeaderMap,
    Json(doc): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let mut bins = bins.lock().unwrap();
    let id = format!("bin-{}", bins.len() + 1);
    bins.insert(id.clone(), doc);
    Ok(Json(json!({ "metadata": { "id": id } })))
}

async fn read_bin(
    State(bins): State<Bins>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let doc = bins.lock().unwrap().get(&id).cloned().ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(json!({ "record": doc })))
}

async fn update_bin(
    State(bins): State<Bins>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(doc): Json<Value>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    match bins.lock().unwrap().get_mut(&id) {
        Some(slot) => {
            *slot = doc;
            StatusCode::OK
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn delete_bin(State(bins): State<Bins>, Path(id): Path<String>) -> StatusCode {
    match bins.lock().unwrap().remove(&id) {
        Some(_) => StatusCode::OK,
        None => StatusCode::NOT_FOUND,
    }
}

fn spawn_blob_api() -> MockBlobApi {
    let bins: Bins = Arc::default();
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock blob api");
    listener.set_nonblocking(true).unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let app = Router::new()
        .route("/b", post(create_bin))
        .route("/b/:id/latest", get(read_bin))
        .route("/b/:id", put(update_bin).delete(delete_bin))
        .with_state(Arc::clone(&bins));

    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("mock runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::from_std(listener).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });

    MockBlobApi { base_url, bins }
}

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_suffix() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("{}_{}", std::process::id(), nanos)
}

fn unique_data_dir() -> String {
    let mut path = std::env::temp_dir();
    path.push(format!("coin_tracker_http_{}", unique_suffix()));
    path.to_string_lossy().to_string()
}

fn days_ago(days: i64) -> NaiveDate {
    Local::now().date_naive() - Days::days(days)
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Ok(resp) = client.get(format!("{base_url}/api/sync/status")).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        if Instant::now() > deadline {
            panic!("server did not become ready");
        }
        sleep(Duration::from_millis(100)).await;
    }
}

async fn spawn_server() -> TestServer {
    let port = pick_free_port();
    let child = Command::new(env!("CARGO_BIN_EXE_coin_tracker"))
        .env("PORT", port.to_string())
        .env("APP_DATA_DIR", unique_data_dir())
        .env("STATIC_DIR", concat!(env!("CARGO_MANIFEST_DIR"), "/public"))
        .env("BLOB_API_URL", &BLOB_API.base_url)
        .env("BLOB_API_KEY", API_KEY)
        .env("RUST_LOG", "info")
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("failed to spawn server");

    #[cfg(unix)]
    cleanup::register(child.id());

    let base_url = format!("http://127.0.0.1:{port}");
    wait_until_ready(&base_url).await;

    TestServer { base_url, child }
}

async fn shared_server() -> Arc<TestServer> {
    let mut guard = SERVER.lock().await;
    if let Some(server) = guard.as_ref() {
        return Arc::clone(server);
    }
    let server = Arc::new(spawn_server().await);
    *guard = Some(Arc::clone(&server));
    server
}

async fn submit(client: &Client, base_url: &str, date: NaiveDate, value: i64) -> reqwest::Response {
    client
        .post(format!("{base_url}/api/records"))
        .json(&json!({ "date": date, "value": value }))
        .send()
        .await
        .unwrap()
}

async fn sync_status(client: &Client, base_url: &str) -> SyncStatusBody {
    client
        .get(format!("{base_url}/api/sync/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

async fn wait_for_status(
    client: &Client,
    base_url: &str,
    predicate: impl Fn(&SyncStatusBody) -> bool,
) -> SyncStatusBody {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let status = sync_status(client, base_url).await;
        if predicate(&status) {
            return status;
        }
        if Instant::now() > deadline {
            panic!("sync status never reached the expected state: {status:?}");
        }
        sleep(Duration::from_millis(50)).await;
    }
}

#[tokio::test]
async fn http_records_track_deltas_and_streaks() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let (d1, d2, d3) = (days_ago(400), days_ago(399), days_ago(398));

    let first = submit(&client, &server.base_url, d1, 100).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second: MutationBody = submit(&client, &server.base_url, d2, 150)
        .await
        .json()
        .await
        .unwrap();
    let record = second.record.expect("record in response");
    assert_eq!(record.delta, 50);
    assert!(second.streak.longest_streak >= second.streak.current_streak);

    submit(&client, &server.base_url, d3, 120).await;
    let deleted = client
        .delete(format!("{}/api/records/{d2}", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(deleted.status().is_success());

    let records: Vec<RecordBody> = client
        .get(format!("{}/api/records", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(records.iter().all(|r| r.date != d2));
    let third = records.iter().find(|r| r.date == d3).expect("third record");
    assert_eq!(third.value, 120);
    assert_eq!(third.delta, 20);
    let dates: Vec<_> = records.iter().map(|r| r.date).collect();
    let mut newest_first = dates.clone();
    newest_first.sort_by(|a, b| b.cmp(a));
    assert_eq!(dates, newest_first);
}

#[tokio::test]
async fn http_rejects_bad_input() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let negative = submit(&client, &server.base_url, days_ago(350), -1).await;
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

    let future = submit(&client, &server.base_url, days_ago(-3), 10).await;
    assert_eq!(future.status(), StatusCode::BAD_REQUEST);

    let missing = client
        .put(format!("{}/api/records/{}", server.base_url, days_ago(351)))
        .json(&json!({ "value": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn http_export_is_quoted_csv() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let date = days_ago(300);

    client
        .post(format!("{}/api/records", server.base_url))
        .json(&json!({ "date": date, "value": 7, "note": "jar \"A\"" }))
        .send()
        .await
        .unwrap();

    let response = client
        .get(format!("{}/api/export.csv", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/csv"));

    let body = response.text().await.unwrap();
    let mut lines = body.lines();
    assert_eq!(lines.next(), Some("\"date\",\"value\",\"delta\",\"note\""));
    assert!(body.contains(&format!("\"{date}\",\"7\"")));
    assert!(body.contains("\"jar \"\"A\"\"\""));
}

#[tokio::test]
async fn http_static_files_reject_traversal() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let manifest = client
        .get(format!("{}/static/manifest.json", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(manifest.status(), StatusCode::OK);
    assert_eq!(manifest.headers()["content-type"], "application/json");

    let escape = client
        .get(format!("{}/static/..%2F..%2FCargo.toml", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(escape.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn http_sync_round_trip_and_offline_queue() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let base = server.base_url.as_str();

    let username = format!("saver_{}", unique_suffix());
    let registered = client
        .post(format!("{base}/api/auth/register"))
        .json(&json!({ "username": username, "password": "coins-coins" }))
        .send()
        .await
        .unwrap();
    assert_eq!(registered.status(), StatusCode::CREATED);

    let status = wait_for_status(&client, base, |s| {
        s.authenticated && s.remote_id.is_some() && s.last_sync.is_some()
    })
    .await;
    let remote_id = status.remote_id.expect("remote document id");

    let report: SyncReportBody = client
        .post(format!("{base}/api/sync"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(report.success);
    let again: SyncReportBody = client
        .post(format!("{base}/api/sync"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(again.success);
    assert_eq!(again.outcome.unwrap()["outcome"], "unchanged");

    let offline: SyncStatusBody = client
        .post(format!("{base}/api/connectivity"))
        .json(&json!({ "online": false }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!offline.online);

    let date = days_ago(200);
    let queued: MutationBody = submit(&client, base, date, 900).await.json().await.unwrap();
    assert!(queued.pending >= 1);
    let in_remote = |value: u64| {
        BLOB_API
            .bins
            .lock()
            .unwrap()
            .get(&remote_id)
            .map(|doc| {
                doc["records"].as_array().into_iter().flatten().any(|r| {
                    r["date"] == json!(date) && r["value"] == json!(value)
                })
            })
            .unwrap_or(false)
    };
    assert!(!in_remote(900));

    client
        .post(format!("{base}/api/connectivity"))
        .json(&json!({ "online": true }))
        .send()
        .await
        .unwrap();
    let drained = wait_for_status(&client, base, |s| s.online && s.pending == 0).await;
    assert!(drained.online);
    assert!(in_remote(900));

    let logout = client
        .post(format!("{base}/api/auth/logout"))
        .send()
        .await
        .unwrap();
    assert_eq!(logout.status(), StatusCode::NO_CONTENT);
    let signed_out = sync_status(&client, base).await;
    assert!(!signed_out.authenticated);
    assert_eq!(signed_out.pending, 0);

    let after_logout = days_ago(201);
    let kept_local: MutationBody = submit(&client, base, after_logout, 901).await.json().await.unwrap();
    assert_eq!(kept_local.pending, 1);
    let pushed = BLOB_API
        .bins
        .lock()
        .unwrap()
        .get(&remote_id)
        .map(|doc| {
            doc["records"]
                .as_array()
                .into_iter()
                .flatten()
                .any(|r| r["date"] == json!(after_logout))
        })
        .unwrap_or(false);
    assert!(!pushed, "signed-out changes must not reach the remote");

    let me = client
        .get(format!("{base}/api/auth/me"))
        .send()
        .await
        .unwrap();
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
}
