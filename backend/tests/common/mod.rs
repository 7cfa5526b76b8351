#![allow(dead_code)]

use actix_web::body::BoxBody;
use actix_web::cookie::Cookie;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use image::{ImageFormat, Rgb, RgbImage};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use pneumoscan::config::{AppConfig, CredentialsConfig, StorageConfig};
use pneumoscan::pipeline::DiagnosisService;
use pneumoscan::routes::configure_routes;
use pneumoscan::session::{SESSION_COOKIE, SessionService};
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const TEST_TOKEN: &str = "test-access-token";
pub const SESSION_SECRET: &str = "integration-test-secret";
pub const TEST_CLIENT_ID: &str = "pneumoscan-test.apps.googleusercontent.com";
pub const TEST_CLIENT_SECRET: &str = "test-client-secret";
pub const TEST_REFRESH_TOKEN: &str = "1//test-refresh-token";
const BOUNDARY: &str = "----pneumoscan-test-boundary";

#[derive(Clone, Copy, Debug)]
pub enum PredictBehavior {
    Confidence(f64),
    Status(u16),
    Garbage,
    Delay(u64),
}

#[derive(Default)]
pub struct UpstreamState {
    pub predict_calls: AtomicUsize,
    pub token_calls: AtomicUsize,
    /// (batch, height, width, channels) of the last tensor received.
    pub last_shape: Mutex<Option<(usize, usize, usize, usize)>>,
    pub last_values_in_range: Mutex<Option<bool>>,
}

/// Throwaway server playing the metadata server, the OAuth token endpoint and
/// the model's predict endpoint.
pub struct MockUpstream {
    pub base_url: String,
    pub host: String,
    pub state: Arc<UpstreamState>,
}

impl MockUpstream {
    pub fn predict_calls(&self) -> usize {
        self.state.predict_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.state.token_calls.load(Ordering::SeqCst)
    }

    pub fn last_shape(&self) -> Option<(usize, usize, usize, usize)> {
        *self.state.last_shape.lock().unwrap()
    }

    pub fn last_values_in_range(&self) -> Option<bool> {
        *self.state.last_values_in_range.lock().unwrap()
    }
}

fn token_body() -> serde_json::Value {
    serde_json::json!({
        "access_token": TEST_TOKEN,
        "expires_in": 3599,
        "token_type": "Bearer"
    })
}

async fn metadata_token(req: HttpRequest, state: web::Data<UpstreamState>) -> HttpResponse {
    let flavor = req
        .headers()
        .get("Metadata-Flavor")
        .and_then(|v| v.to_str().ok());
    if flavor != Some("Google") {
        return HttpResponse::Forbidden().body("missing Metadata-Flavor header");
    }
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    HttpResponse::Ok().json(token_body())
}

#[derive(serde::Deserialize)]
struct TokenGrant {
    grant_type: String,
    assertion: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    refresh_token: Option<String>,
}

#[derive(serde::Deserialize)]
struct GrantClaims {
    iss: String,
    scope: String,
}

fn assertion_is_valid(req: &HttpRequest, assertion: &str) -> bool {
    let public_pem = include_bytes!("../fixtures/service_account_pub.pem");
    let Ok(key) = DecodingKey::from_rsa_pem(public_pem) else {
        return false;
    };
    let audience = format!("http://{}/token", req.connection_info().host());
    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[audience]);

    match jsonwebtoken::decode::<GrantClaims>(assertion, &key, &validation) {
        Ok(data) => {
            data.claims.iss == "svc@pneumoscan-test.iam.gserviceaccount.com"
                && data.claims.scope == "https://www.googleapis.com/auth/cloud-platform"
        }
        Err(_) => false,
    }
}

async fn oauth_token(
    req: HttpRequest,
    form: web::Form<TokenGrant>,
    state: web::Data<UpstreamState>,
) -> HttpResponse {
    let granted = match form.grant_type.as_str() {
        "urn:ietf:params:oauth:grant-type:jwt-bearer" => form
            .assertion
            .as_deref()
            .is_some_and(|assertion| assertion_is_valid(&req, assertion)),
        "refresh_token" => {
            form.client_id.as_deref() == Some(TEST_CLIENT_ID)
                && form.client_secret.as_deref() == Some(TEST_CLIENT_SECRET)
                && form.refresh_token.as_deref() == Some(TEST_REFRESH_TOKEN)
        }
        _ => return HttpResponse::BadRequest().body("unsupported grant_type"),
    };

    if !granted {
        return HttpResponse::Unauthorized().body("invalid grant");
    }
    state.token_calls.fetch_add(1, Ordering::SeqCst);
    HttpResponse::Ok().json(token_body())
}

fn record_tensor(state: &UpstreamState, body: &serde_json::Value) {
    let instances = &body["instances"];
    let batch = instances.as_array().map(|a| a.len()).unwrap_or(0);
    let rows = instances[0].as_array().map(|a| a.len()).unwrap_or(0);
    let cols = instances[0][0].as_array().map(|a| a.len()).unwrap_or(0);
    let channels = instances[0][0][0].as_array().map(|a| a.len()).unwrap_or(0);
    *state.last_shape.lock().unwrap() = Some((batch, rows, cols, channels));

    let in_range = instances[0].as_array().into_iter().flatten().all(|row| {
        row.as_array().into_iter().flatten().all(|pixel| {
            pixel
                .as_array()
                .into_iter()
                .flatten()
                .all(|v| v.as_f64().map(|v| (0.0..=1.0).contains(&v)).unwrap_or(false))
        })
    });
    *state.last_values_in_range.lock().unwrap() = Some(in_range);
}

async fn predict(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<UpstreamState>,
    behavior: web::Data<PredictBehavior>,
) -> HttpResponse {
    let expected = format!("Bearer {}", TEST_TOKEN);
    let authorized = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        == Some(expected.as_str());
    if !authorized {
        return HttpResponse::Unauthorized().finish();
    }

    state.predict_calls.fetch_add(1, Ordering::SeqCst);
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(json) => record_tensor(&state, &json),
        Err(_) => return HttpResponse::BadRequest().body("body is not JSON"),
    }

    match *behavior.get_ref() {
        PredictBehavior::Confidence(confidence) => HttpResponse::Ok().json(serde_json::json!({
            "predictions": [[confidence]],
            "deployedModelId": "320059038752571392"
        })),
        PredictBehavior::Status(code) => {
            let status = actix_web::http::StatusCode::from_u16(code)
                .unwrap_or(actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
            HttpResponse::build(status).body("upstream failure")
        }
        PredictBehavior::Garbage => HttpResponse::Ok().body("<html>gateway page</html>"),
        PredictBehavior::Delay(secs) => {
            actix_web::rt::time::sleep(Duration::from_secs(secs)).await;
            HttpResponse::Ok().json(serde_json::json!({ "predictions": [[0.9]] }))
        }
    }
}

pub async fn spawn_upstream(behavior: PredictBehavior) -> MockUpstream {
    let state = web::Data::new(UpstreamState::default());
    let behavior = web::Data::new(behavior);
    let server_state = state.clone();

    let server = HttpServer::new(move || {
        App::new()
            .app_data(server_state.clone())
            .app_data(behavior.clone())
            .app_data(web::PayloadConfig::new(32 * 1024 * 1024))
            .route(
                "/computeMetadata/v1/instance/service-accounts/default/token",
                web::get().to(metadata_token),
            )
            .route("/token", web::post().to(oauth_token))
            .route("/v1/predict", web::post().to(predict))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());

    MockUpstream {
        base_url: format!("http://{}", addr),
        host: addr.to_string(),
        state: state.into_inner(),
    }
}

pub struct TestDirs {
    pub uploads: TempDir,
    pub scratch: TempDir,
}

impl TestDirs {
    pub fn new() -> Self {
        Self {
            uploads: tempfile::tempdir().unwrap(),
            scratch: tempfile::tempdir().unwrap(),
        }
    }

    pub fn upload_count(&self) -> usize {
        std::fs::read_dir(self.uploads.path()).unwrap().count()
    }

    pub fn scratch_count(&self) -> usize {
        std::fs::read_dir(self.scratch.path()).unwrap().count()
    }
}

pub fn test_config(upstream: &MockUpstream, dirs: &TestDirs) -> AppConfig {
    AppConfig {
        endpoint_url: format!("{}/v1/predict", upstream.base_url),
        credentials: CredentialsConfig {
            metadata_host: upstream.host.clone(),
            ..CredentialsConfig::default()
        },
        storage: StorageConfig {
            upload_dir: dirs.uploads.path().to_path_buf(),
            ..StorageConfig::default()
        },
        session_secret: SESSION_SECRET.to_string(),
        request_timeout_secs: 5,
        temp_dir: Some(dirs.scratch.path().to_path_buf()),
        ..AppConfig::default()
    }
}

pub async fn build_app(
    config: &AppConfig,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<BoxBody>,
        Error = actix_web::Error,
        InitError = (),
    > + use<>,
> {
    let service = DiagnosisService::from_config(config).await.unwrap();
    let uploads_dir = service.sink().local_dir().map(|dir| dir.to_path_buf());
    App::new()
        .app_data(web::Data::new(service))
        .app_data(web::Data::new(SessionService::new(&config.session_secret)))
        .configure(move |cfg| configure_routes(cfg, uploads_dir))
}

pub fn encode_image(image: &RgbImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

/// 150x150 image with slight channel noise that still counts as gray.
pub fn near_gray_png() -> Vec<u8> {
    let image = RgbImage::from_fn(150, 150, |x, y| {
        let base = ((x + y) % 200) as u8 + 20;
        Rgb([base, base.saturating_add(3), base.saturating_sub(2)])
    });
    encode_image(&image)
}

pub fn colorful_png() -> Vec<u8> {
    let image = RgbImage::from_fn(150, 150, |x, y| {
        Rgb([(x * 255 / 150) as u8, (y * 255 / 150) as u8, 180])
    });
    encode_image(&image)
}

/// Multipart body with a single file field. Returns the content type header
/// value and the body.
pub fn multipart_file(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

pub fn multipart_text(field: &str, value: &str) -> (String, Vec<u8>) {
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"{f}\"\r\n\r\n{v}\r\n--{b}--\r\n",
        b = BOUNDARY,
        f = field,
        v = value
    );
    (format!("multipart/form-data; boundary={}", BOUNDARY), body.into_bytes())
}

pub fn session_cookie<B>(resp: &ServiceResponse<B>) -> Option<Cookie<'static>> {
    resp.response()
        .cookies()
        .find(|c| c.name() == SESSION_COOKIE)
        .map(|c| c.into_owned())
}

pub fn location<B>(resp: &ServiceResponse<B>) -> Option<String> {
    resp.headers()
        .get(actix_web::http::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn write_service_account_key(dir: &Path, token_uri: &str) -> std::path::PathBuf {
    let key = serde_json::json!({
        "type": "service_account",
        "project_id": "pneumoscan-test",
        "private_key_id": "test-key-1",
        "private_key": include_str!("../fixtures/service_account_key.pem"),
        "client_email": "svc@pneumoscan-test.iam.gserviceaccount.com",
        "token_uri": token_uri,
    });
    let path = dir.join("sa-vertex.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&key).unwrap()).unwrap();
    path
}

/// Credentials file in the shape `gcloud auth application-default login`
/// writes, pointed at `token_uri`.
pub fn write_authorized_user_file(dir: &Path, token_uri: &str, refresh_token: &str) -> std::path::PathBuf {
    let credentials = serde_json::json!({
        "type": "authorized_user",
        "client_id": TEST_CLIENT_ID,
        "client_secret": TEST_CLIENT_SECRET,
        "refresh_token": refresh_token,
        "quota_project_id": "pneumoscan-test",
        "token_uri": token_uri,
    });
    let path = dir.join("application_default_credentials.json");
    std::fs::write(&path, serde_json::to_vec_pretty(&credentials).unwrap()).unwrap();
    path
}
