use once_cell::sync::Lazy;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartPoint {
    date: String,
    views: f64,
    inflow: f64,
    conversion_rate: f64,
}

#[derive(Debug, Deserialize)]
struct Card {
    value: String,
    delta: String,
}

#[derive(Debug, Deserialize)]
struct CafeKpi {
    share: Card,
    views: Card,
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

static TEST_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));
static SERVER: Lazy<Mutex<Option<Arc<TestServer>>>> = Lazy::new(|| Mutex::new(None));

#[cfg(unix)]
mod cleanup {
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Once;

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

fn pick_free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind random port");
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn unique_data_path() -> std::path::PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("clinic_dashboard_http_{}_{}.json", std::process::id(), nanos));
    path
}

fn row(id: &str, fields: Value) -> Value {
    json!({ "id": id, "fields": fields })
}

fn seed() -> Value {
    json!({
        "next_id": 1000,
        "tables": {
            "Blog Weekly Metrics": [
                row("recW1", json!({"Week Start": "2025-07-07", "Post ID": "P1", "Subject": "임플란트", "Weekly Views": 100, "Weekly Inflow": 40, "Weekly Conversions": 2})),
                row("recW2", json!({"Week Start": "2025-07-14", "Subject": "신경치료", "Weekly Views": 50, "Weekly Inflow": 10, "Weekly Conversions": 1})),
                row("recW3", json!({"Week Start": "2025-08-04", "Post ID": "P1", "Subject": "임플란트", "Weekly Views": 150, "Weekly Inflow": 60, "Weekly Conversions": 3}))
            ],
            "Blog Ranking Trends": [
                row("recT1", json!({"Post ID": "P1", "Week Start": "2025-08-11", "My Rank": 3, "Benchmark Hospital": "A치과", "Benchmark Rank": 1})),
                row("recT2", json!({"Post ID": "P1", "Week Start": "2025-08-04", "My Rank": 7}))
            ],
            "Place Review": [
                row("recR1", json!({"ReviewId": "r1", "Score": 5, "Content": "친절해요", "AuthorAt": "2025-08-01"})),
                row("recR2", json!({"ReviewId": "r2", "Score": 4, "Content": "깨끗해요", "AuthorAt": "2025-08-03"})),
                row("recR3", json!({"ReviewId": "r3", "Score": 3, "Content": "대기 시간", "AuthorAt": "2025-08-02"}))
            ],
            "Settings - Hospital": [
                row("recH1", json!({"Hospital Name": "서울치과"}))
            ],
            "Cafe Posts": [
                row("recC1", json!({"Post Key": "c1", "Date": "2025-07-03", "Views": 100, "Mentioned Clinics": "서울치과"})),
                row("recC2", json!({"Post Key": "c2", "Date": "2025-07-09", "Views": 100, "Mentioned Clinics": "다른치과"})),
                row("recC3", json!({"Post Key": "c3", "Date": "2025-08-02", "Views": 300, "Mentioned Clinics": "서울치과"})),
                row("recC4", json!({"Post Key": "c4", "Date": "2025-08-12", "Views": 100, "Mentioned Clinics": "다른치과"}))
            ],
            "Medicontent Posts": [
                row("recM1", json!({"Title": "임플란트 수술 과정", "Type": "임플란트", "Status": "작성 중"}))
            ]
        }
    })
}

async fn wait_until_ready(base_url: &str) {
    let client = Client::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Ok(resp) = client
            .get(format!("{base_url}/api/settings/benchmark"))
            .send()
            .await
        {
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
    let data_path = unique_data_path();
    std::fs::write(&data_path, serde_json::to_vec(&seed()).unwrap()).expect("write seed data");

    let child = Command::new(env!("CARGO_BIN_EXE_clinic_dashboard"))
        .env("PORT", port.to_string())
        .env("DASHBOARD_STORE", "file")
        .env("APP_DATA_PATH", &data_path)
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

async fn chart(client: &Client, base_url: &str, params: &[(&str, &str)]) -> Vec<ChartPoint> {
    client
        .get(format!("{base_url}/api/blog/chart-data"))
        .query(params)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn http_chart_data_unknown_subject_means_all() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let all = chart(&client, &server.base_url, &[("periodType", "월간"), ("subject", "전체")]).await;
    let unknown = chart(&client, &server.base_url, &[("periodType", "월간"), ("subject", "치아미백")]).await;

    assert_eq!(all.len(), 2);
    assert_eq!(unknown.len(), all.len());
    assert_eq!(all[0].date, "2025-07-01");
    assert_eq!(all[0].views, 150.0);
    assert_eq!(all[0].inflow, 50.0);
    assert_eq!(all[0].conversion_rate, 6.0);
    assert_eq!(unknown[1].views, all[1].views);

    let weekly = chart(&client, &server.base_url, &[("subject", "임플란트")]).await;
    let dates: Vec<&str> = weekly.iter().map(|p| p.date.as_str()).collect();
    assert_eq!(dates, vec!["2025-07-07", "2025-08-04"]);
}

#[tokio::test]
async fn http_benchmark_round_trip() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let saved: Value = client
        .post(format!("{}/api/settings/benchmark", server.base_url))
        .json(&json!({ "benchmarkHospitals": ["A치과", " ", "B치과"] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(saved, json!({ "ok": true, "count": 2 }));

    let listed: Value = client
        .get(format!("{}/api/settings/benchmark", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed, json!({ "benchmarkHospitals": ["A치과", "B치과"] }));
}

#[tokio::test]
async fn http_medicontent_post_lookup() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let missing = client
        .get(format!("{}/api/medicontent/posts/recNope", server.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    let body: Value = missing.json().await.unwrap();
    assert_eq!(body["error"], "포스트를 찾을 수 없습니다.");

    let found: Value = client
        .get(format!("{}/api/medicontent/posts/recM1", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(found["title"], "임플란트 수술 과정");
    assert_eq!(found["type"], "임플란트");
}

#[tokio::test]
async fn http_campaign_active_is_null_without_campaigns() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let response = client
        .get(format!("{}/api/blog/campaign/active", server.base_url))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let body: Value = response.json().await.unwrap();
    assert!(body.is_null());
}

#[tokio::test]
async fn http_cafe_kpi_reports_share_and_views() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let kpi: CafeKpi = client
        .get(format!("{}/api/cafe/kpi", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(kpi.share.value, "75%");
    assert_eq!(kpi.share.delta, "+25%");
    assert_eq!(kpi.views.value, "300");
    assert_eq!(kpi.views.delta, "+200%");
}

/// A multipart body from `(name, filename, content type, bytes)` parts.
fn multipart(boundary: &str, parts: &[(&str, Option<&str>, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content_type, bytes) in parts {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n").as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n").as_bytes(),
            ),
        }
        if let Some(content_type) = content_type {
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
        }
        body.extend_from_slice(b"\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

async fn upload(client: &Client, base_url: &str, body: Vec<u8>) -> reqwest::Response {
    client
        .post(format!("{base_url}/api/medicontent/upload-images"))
        .header("content-type", "multipart/form-data; boundary=dashboard-test-boundary")
        .body(body)
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn http_upload_accepts_photos_over_two_megabytes() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let photo = vec![0xABu8; 3 * 1024 * 1024];
    let body = multipart(
        "dashboard-test-boundary",
        &[
            ("postId", None, None, b"P-big".as_slice()),
            ("imageType", None, None, b"before".as_slice()),
            ("files", Some("large.jpg"), Some("image/jpeg"), photo.as_slice()),
        ],
    );
    let response = upload(&client, &server.base_url, body).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "이미지 업로드 완료");
    assert_eq!(body["attachments"][0]["filename"], "large.jpg");
    assert_eq!(body["attachments"][0]["size"], 3 * 1024 * 1024);
}

#[tokio::test]
async fn http_upload_rejects_bad_form_fields() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();
    let photo: &[u8] = &[0xFF, 0xD8, 0xFF];

    let sideways = multipart(
        "dashboard-test-boundary",
        &[
            ("postId", None, None, b"P-1".as_slice()),
            ("imageType", None, None, b"sideways".as_slice()),
            ("files", Some("a.jpg"), Some("image/jpeg"), photo),
        ],
    );
    let response = upload(&client, &server.base_url, sideways).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "이미지 타입은 before, process, after 중 하나여야 합니다.");

    let no_post = multipart(
        "dashboard-test-boundary",
        &[
            ("imageType", None, None, b"after".as_slice()),
            ("files", Some("a.jpg"), Some("image/jpeg"), photo),
        ],
    );
    let response = upload(&client, &server.base_url, no_post).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Post ID와 이미지 타입이 필요합니다.");
}

#[tokio::test]
async fn http_malformed_bodies_get_json_errors() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let saved: Value = client
        .post(format!("{}/api/settings/benchmark", server.base_url))
        .json(&json!({ "benchmarkHospitals": "A치과" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(saved, json!({ "ok": true, "count": 0 }));

    let response = client
        .post(format!("{}/api/settings/hospital", server.base_url))
        .header("content-type", "application/json")
        .body("{\"hospitalName\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "요청 본문이 올바르지 않습니다.");

    let response = client
        .patch(format!("{}/api/medicontent/posts/recM1", server.base_url))
        .body("status=done")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "요청 본문이 올바르지 않습니다.");
}

#[tokio::test]
async fn http_blog_metrics_and_ranking_trends() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let metrics: Value = client
        .get(format!("{}/api/blog/metrics", server.base_url))
        .query(&[("postId", "P1")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let weeks: Vec<&str> = metrics["metrics"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["weekStart"].as_str())
        .collect();
    assert_eq!(weeks, vec!["2025-08-04", "2025-07-07"]);

    let trend: Value = client
        .get(format!("{}/api/blog/ranking-trends/P1", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(trend[0], json!({ "weekStart": "2025-08-04", "myRank": 7 }));
    assert_eq!(trend[1]["benchmarkHospital"], "A치과");
}

#[tokio::test]
async fn http_place_report_pages_reviews() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let report: Value = client
        .get(format!("{}/api/place/report", server.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(report["totalReviews"], 3);
    assert_eq!(report["reviews"][0]["ReviewId"], "r2");
    assert_eq!(report["rankings"], json!([]));
}

#[tokio::test]
async fn http_communications_round_trip() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let sent: Value = client
        .post(format!("{}/api/medicontent/communications", server.base_url))
        .json(&json!({
            "postId": "recM1",
            "sender": "hospital",
            "senderName": "서울치과",
            "content": "사진 올렸습니다",
            "type": "comment"
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sent["message"], "메시지가 전송되었습니다.");

    let thread: Value = client
        .get(format!("{}/api/medicontent/communications", server.base_url))
        .query(&[("postId", "recM1")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(thread[0]["content"], "사진 올렸습니다");
    assert_eq!(thread[0]["type"], "comment");

    let response = client
        .put(format!("{}/api/medicontent/data-requests", server.base_url))
        .json(&json!({ "conceptMessage": "no id" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn http_upload_without_files_is_rejected() {
    let _guard = TEST_LOCK.lock().await;
    let server = shared_server().await;
    let client = Client::new();

    let boundary = "dashboard-test-boundary";
    let body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"postId\"\r\n\r\nP-1\r\n\
         --{boundary}\r\nContent-Disposition: form-data; name=\"imageType\"\r\n\r\nbefore\r\n\
         --{boundary}--\r\n"
    );
    let response = client
        .post(format!("{}/api/medicontent/upload-images", server.base_url))
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "파일이 없습니다.");
}
