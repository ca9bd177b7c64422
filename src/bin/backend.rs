#![forbid(unsafe_code)]

//! Axum server for ChocoTube.
//!
//! HTML pages sit behind a single shared password; the thumbnail relay, the
//! autocomplete and comments helpers, and the `/api/*` JSON mirrors are open.
//! Every upstream call is blocking and runs on the blocking pool.

use std::{
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use axum::{
    Form, Json, Router,
    body::Body,
    extract::{Path as AxumPath, Query, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chocotube::{
    aggregate::Aggregator,
    cache::CacheStore,
    config::{RuntimeOverrides, RuntimeSettings, UpstreamEndpoints, resolve_runtime_settings},
    models::{StreamUrlSet, VideoDetail},
    render::{self, WatchMode, WatchPage},
    session::{Preferences, SESSION_COOKIE, SessionKeys},
    upstream::{Transport, UpstreamClient, UreqTransport},
};
use clap::Parser;
use mime_guess::MimeGuess;
use serde::{Deserialize, Serialize};
use tokio::{fs::File, signal};
use tokio_util::io::ReaderStream;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const UPSTREAM_POOL_SIZE: usize = 20;
const WRONG_PASSWORD: &str = "パスワードが間違っています";
const THUMBNAIL_CACHE_CONTROL: &str = "public, max-age=3600";

#[derive(Debug, Parser)]
#[command(name = "backend", about = "ChocoTube web front-end")]
struct BackendArgs {
    /// Address to listen on (overrides CHOCOTUBE_HOST).
    #[arg(long)]
    host: Option<String>,
    /// Port to listen on (overrides CHOCOTUBE_PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Dotenv-style file read before the process environment.
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// TOML file overriding upstream endpoints.
    #[arg(long)]
    upstream_config: Option<PathBuf>,
    /// Directory served under /static.
    #[arg(long)]
    static_root: Option<PathBuf>,
}

impl BackendArgs {
    fn into_overrides(self) -> RuntimeOverrides {
        RuntimeOverrides {
            host: self.host,
            port: self.port,
            env_path: self.env_file,
            static_root: self.static_root,
            upstream_config: self.upstream_config,
        }
    }
}

fn parse_host_arg(value: &str) -> Result<IpAddr> {
    value
        .parse::<IpAddr>()
        .context("expected a valid IPv4 or IPv6 address for --host/CHOCOTUBE_HOST")
}

/// Shared, cheaply clonable handles for every request.
#[derive(Clone)]
struct AppState {
    aggregator: Arc<Aggregator>,
    sessions: Arc<SessionKeys>,
    static_root: Option<Arc<PathBuf>>,
}

impl AppState {
    fn new(
        settings: &RuntimeSettings,
        endpoints: UpstreamEndpoints,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let aggregator = Aggregator::new(
            UpstreamClient::new(transport),
            endpoints,
            settings.youtube_api_key.clone(),
            Arc::new(CacheStore::with_system_clock()),
        );
        Self {
            aggregator: Arc::new(aggregator),
            sessions: Arc::new(SessionKeys::new(
                &settings.password,
                &settings.session_secret,
            )),
            static_root: settings.static_root.clone().map(Arc::new),
        }
    }

    /// Runs a blocking aggregation call off the async workers.
    async fn run<T, F>(&self, job: F) -> ApiResult<T>
    where
        F: FnOnce(&Aggregator) -> T + Send + 'static,
        T: Send + 'static,
    {
        let aggregator = self.aggregator.clone();
        tokio::task::spawn_blocking(move || job(&aggregator))
            .await
            .map_err(|err| {
                error!(error = %err, "aggregation task failed");
                ApiError::internal("upstream aggregation failed")
            })
    }

    fn logged_in(&self, jar: &CookieJar) -> bool {
        jar.get(SESSION_COOKIE)
            .is_some_and(|cookie| self.sessions.verify_token(cookie.value()))
    }
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Creates a 404 error with the provided message.
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// Creates a 400 error with the provided message.
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// Creates a 500 error with the provided message.
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings = resolve_runtime_settings(BackendArgs::parse().into_overrides())?;
    let host = parse_host_arg(&settings.host)?;
    let endpoints = UpstreamEndpoints::load(settings.upstream_config.as_deref())?;
    if settings.youtube_api_key.is_none() {
        info!("YOUTUBE_API_KEY not set, search uses the mirrors only");
    }
    info!(mirrors = endpoints.instances.len(), "upstream endpoints loaded");

    let transport = Arc::new(UreqTransport::new(UPSTREAM_POOL_SIZE));
    let state = AppState::new(&settings, endpoints, transport);
    let app = build_router(state);

    let addr = SocketAddr::new(host, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running web server")?;

    info!("server stopped");
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_router(state: AppState) -> Router {
    let pages = Router::new()
        .route("/", get(index))
        .route("/search", get(search))
        .route("/watch", get(watch_stream))
        .route("/w", get(watch_high))
        .route("/ume", get(watch_embed))
        .route("/edu", get(watch_education))
        .route("/channel/{id}", get(channel))
        .route("/playlist", get(playlist))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_login));

    Router::new()
        .merge(pages)
        .route("/login", get(login_form).post(login_submit))
        .route("/thumbnail", get(thumbnail))
        .route("/suggest", get(suggest))
        .route("/comments", get(comments_fragment))
        .route("/api/search", get(api_search))
        .route("/api/video/{id}", get(api_video))
        .route("/api/trending", get(api_trending))
        .route("/api/channel/{id}/videos", get(api_channel_videos))
        .route("/static/{*path}", get(static_file))
        .fallback(not_found)
        .layer(middleware::from_fn(no_cache_headers))
        .with_state(state)
}

async fn shutdown_signal() {
    // Only graceful shutdown depends on this; Ctrl+C still ends the process.
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
    info!("shutdown requested");
}

async fn require_login(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    if state.logged_in(&jar) {
        next.run(request).await
    } else {
        Redirect::to("/login").into_response()
    }
}

/// Stamps no-cache headers on everything that did not set its own policy.
async fn no_cache_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    if !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
    }
    response
}

async fn not_found(request: Request) -> ApiError {
    let path = request.uri().path();
    if path == "/api" || path.starts_with("/api/") {
        ApiError::not_found("endpoint not found")
    } else {
        ApiError::not_found("page not found")
    }
}

fn preferences(jar: &CookieJar) -> Preferences {
    Preferences::from_cookies(|name| jar.get(name).map(|cookie| cookie.value().to_string()))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    #[serde(default)]
    password: String,
}

async fn login_form(State(state): State<AppState>, jar: CookieJar) -> Response {
    if state.logged_in(&jar) {
        return Redirect::to("/").into_response();
    }
    Html(render::login_page(None)).into_response()
}

async fn login_submit(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    if state.logged_in(&jar) {
        return Redirect::to("/").into_response();
    }
    if !state.sessions.password_matches(&form.password) {
        info!("rejected login attempt");
        return Html(render::login_page(Some(WRONG_PASSWORD))).into_response();
    }
    let cookie = Cookie::build((SESSION_COOKIE, state.sessions.issue_token()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax);
    (jar.add(cookie), Redirect::to("/")).into_response()
}

async fn index(State(state): State<AppState>, jar: CookieJar) -> ApiResult<Html<String>> {
    let videos = state.run(|agg| agg.trending()).await?;
    Ok(Html(render::index_page(&videos, &preferences(&jar))))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    page: Option<String>,
}

async fn search(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<SearchParams>,
) -> ApiResult<Html<String>> {
    let prefs = preferences(&jar);
    let Some(query) = non_empty(params.q) else {
        return Ok(Html(render::search_page("", &[], None, &prefs)));
    };
    let page = params
        .page
        .and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|page| *page >= 1)
        .unwrap_or(1);

    let job_query = query.clone();
    let results = state
        .run(move |agg| {
            if page == 1 {
                agg.search(&job_query)
            } else {
                agg.mirror_search(&job_query, page)
            }
        })
        .await?;
    let next = render::search_next_link(&query, page);
    Ok(Html(render::search_page(&query, &results, Some(&next), &prefs)))
}

#[derive(Debug, Deserialize)]
struct WatchParams {
    v: Option<String>,
}

async fn watch_stream(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<WatchParams>,
) -> ApiResult<Html<String>> {
    watch(state, &jar, WatchMode::Stream, params).await
}

async fn watch_high(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<WatchParams>,
) -> ApiResult<Html<String>> {
    watch(state, &jar, WatchMode::High, params).await
}

async fn watch_embed(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<WatchParams>,
) -> ApiResult<Html<String>> {
    watch(state, &jar, WatchMode::Embed, params).await
}

async fn watch_education(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<WatchParams>,
) -> ApiResult<Html<String>> {
    watch(state, &jar, WatchMode::Education, params).await
}

/// Shared body of the four watch routes. Without a video id the visitor
/// gets the trending page instead.
async fn watch(
    state: AppState,
    jar: &CookieJar,
    mode: WatchMode,
    params: WatchParams,
) -> ApiResult<Html<String>> {
    let prefs = preferences(jar);
    let Some(video_id) = non_empty(params.v) else {
        let videos = state.run(|agg| agg.trending()).await?;
        return Ok(Html(render::index_page(&videos, &prefs)));
    };

    let (video, streams, comments) = {
        let (info_id, streams_id, comments_id) =
            (video_id.clone(), video_id.clone(), video_id.clone());
        tokio::join!(
            state.run(move |agg| agg.video_info(&info_id)),
            state.run(move |agg| agg.stream_urls(&streams_id)),
            state.run(move |agg| agg.comments(&comments_id)),
        )
    };
    let (video, streams, comments) = (video?, streams?, comments?);

    Ok(Html(render::watch_page(&WatchPage {
        video_id: &video_id,
        mode,
        video: video.as_ref(),
        streams: &streams,
        comments: &comments,
        prefs: &prefs,
    })))
}

async fn channel(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(channel_id): AxumPath<String>,
) -> ApiResult<Html<String>> {
    let prefs = preferences(&jar);
    let lookup_id = channel_id.clone();
    let (info, page) = state
        .run(move |agg| {
            let Some(info) = agg.channel_info(&lookup_id) else {
                return (None, None);
            };
            let page = agg.channel_videos(&lookup_id, None);
            (Some(info), page)
        })
        .await?;

    let html = match (&info, page) {
        (Some(info), Some(page)) => render::channel_page(
            &channel_id,
            Some(info),
            &page.videos,
            &page.continuation,
            &prefs,
        ),
        (Some(info), None) => {
            render::channel_page(&channel_id, Some(info), &info.videos, "", &prefs)
        }
        (None, _) => render::channel_page(&channel_id, None, &[], "", &prefs),
    };
    Ok(Html(html))
}

#[derive(Debug, Deserialize)]
struct PlaylistParams {
    list: Option<String>,
}

async fn playlist(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<PlaylistParams>,
) -> ApiResult<Response> {
    let Some(playlist_id) = non_empty(params.list) else {
        return Ok(Redirect::to("/").into_response());
    };
    let info = state.run(move |agg| agg.playlist_info(&playlist_id)).await?;
    Ok(Html(render::playlist_page(info.as_ref(), &preferences(&jar))).into_response())
}

async fn thumbnail(
    State(state): State<AppState>,
    Query(params): Query<WatchParams>,
) -> ApiResult<Response> {
    let Some(video_id) = non_empty(params.v) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let Some(image) = state.run(move |agg| agg.thumbnail(&video_id)).await? else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    let content_type = HeaderValue::from_str(&image.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("image/jpeg"));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CACHE_CONTROL,
                HeaderValue::from_static(THUMBNAIL_CACHE_CONTROL),
            ),
        ],
        image.bytes.clone(),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
struct SuggestParams {
    keyword: Option<String>,
}

async fn suggest(
    State(state): State<AppState>,
    Query(params): Query<SuggestParams>,
) -> ApiResult<Json<Vec<String>>> {
    let Some(keyword) = non_empty(params.keyword) else {
        return Ok(Json(Vec::new()));
    };
    let suggestions = state.run(move |agg| agg.suggestions(&keyword)).await?;
    Ok(Json(suggestions))
}

async fn comments_fragment(
    State(state): State<AppState>,
    Query(params): Query<WatchParams>,
) -> ApiResult<Html<String>> {
    let comments = match non_empty(params.v) {
        Some(video_id) => state.run(move |agg| agg.comments(&video_id)).await?,
        None => Vec::new(),
    };
    Ok(Html(render::comments_fragment(&comments)))
}

#[derive(Debug, Deserialize)]
struct ApiSearchParams {
    q: Option<String>,
}

async fn api_search(
    State(state): State<AppState>,
    Query(params): Query<ApiSearchParams>,
) -> ApiResult<Response> {
    let query = non_empty(params.q).ok_or_else(|| ApiError::bad_request("Query required"))?;
    let results = state.run(move |agg| agg.search(&query)).await?;
    Ok(Json(results).into_response())
}

#[derive(Debug, Serialize)]
struct VideoPayload {
    info: Option<VideoDetail>,
    streams: StreamUrlSet,
}

async fn api_video(
    State(state): State<AppState>,
    AxumPath(video_id): AxumPath<String>,
) -> ApiResult<Json<VideoPayload>> {
    let streams_id = video_id.clone();
    let (info, streams) = tokio::join!(
        state.run(move |agg| agg.video_info(&video_id)),
        state.run(move |agg| agg.stream_urls(&streams_id)),
    );
    Ok(Json(VideoPayload {
        info: info?,
        streams: streams?,
    }))
}

async fn api_trending(State(state): State<AppState>) -> ApiResult<Response> {
    let videos = state.run(|agg| agg.trending()).await?;
    Ok(Json(videos).into_response())
}

#[derive(Debug, Deserialize)]
struct ContinuationParams {
    continuation: Option<String>,
}

async fn api_channel_videos(
    State(state): State<AppState>,
    AxumPath(channel_id): AxumPath<String>,
    Query(params): Query<ContinuationParams>,
) -> ApiResult<Response> {
    let continuation = non_empty(params.continuation);
    let page = state
        .run(move |agg| agg.channel_videos(&channel_id, continuation.as_deref()))
        .await?
        .unwrap_or_default();
    Ok(Json(page).into_response())
}

async fn static_file(
    State(state): State<AppState>,
    AxumPath(path): AxumPath<String>,
) -> ApiResult<Response> {
    let root = state
        .static_root
        .as_ref()
        .ok_or_else(|| ApiError::not_found("file not found"))?;
    let target = resolve_static_path(root, &path)?;
    match tokio::fs::metadata(&target).await {
        Ok(meta) if meta.is_file() => stream_file(target).await,
        _ => Err(ApiError::not_found("file not found")),
    }
}

fn resolve_static_path(root: &Path, request_path: &str) -> ApiResult<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    if trimmed.is_empty() {
        return Err(ApiError::not_found("file not found"));
    }
    let candidate = Path::new(trimmed);
    if candidate
        .components()
        .any(|component| !matches!(component, Component::Normal(_)))
    {
        return Err(ApiError::not_found("file not found"));
    }
    Ok(root.join(candidate))
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;
    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first()
        && let Ok(value) = HeaderValue::from_str(mime.as_ref())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use chocotube::upstream::{UpstreamError, UpstreamRequest, UpstreamResponse};
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::HashMap;
    use tempfile::tempdir;
    use tower::ServiceExt;

    const MIRROR: &str = "https://mirror.test/";

    /// Canned upstream: exact URL matches answer, anything else is unreachable.
    #[derive(Default)]
    struct StubTransport {
        routes: Mutex<HashMap<String, UpstreamResponse>>,
    }

    impl StubTransport {
        fn respond(&self, url: &str, content_type: &str, body: &[u8]) {
            self.routes.lock().insert(
                url.to_string(),
                UpstreamResponse {
                    status: 200,
                    content_type: Some(content_type.to_string()),
                    body: body.to_vec(),
                },
            );
        }
    }

    impl Transport for StubTransport {
        fn fetch(&self, request: &UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
            self.routes
                .lock()
                .get(&request.url)
                .cloned()
                .ok_or_else(|| UpstreamError::Transport("unreachable".into()))
        }
    }

    fn settings(static_root: Option<PathBuf>) -> RuntimeSettings {
        RuntimeSettings {
            host: "127.0.0.1".into(),
            port: 0,
            password: "choco".into(),
            session_secret: "test-secret".into(),
            youtube_api_key: None,
            static_root,
            upstream_config: None,
        }
    }

    fn test_app(stub: Arc<StubTransport>, static_root: Option<PathBuf>) -> (Router, AppState) {
        let endpoints = UpstreamEndpoints {
            instances: vec![MIRROR.to_string()],
            thumbnail_host: "https://img.test".into(),
            ..UpstreamEndpoints::default()
        };
        let state = AppState::new(&settings(static_root), endpoints, stub);
        (build_router(state.clone()), state)
    }

    fn get(uri: &str) -> Request {
        axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn get_with_session(uri: &str, state: &AppState) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .header(
                header::COOKIE,
                format!("{SESSION_COOKIE}={}", state.sessions.issue_token()),
            )
            .body(Body::empty())
            .unwrap()
    }

    fn login_request(password: &str) -> Request {
        axum::http::Request::builder()
            .method("POST")
            .uri("/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("password={password}")))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn backend_args_map_to_overrides() {
        let args = BackendArgs::try_parse_from([
            "backend",
            "--port",
            "9000",
            "--host",
            "0.0.0.0",
            "--env-file",
            "/tmp/custom.env",
            "--static-root",
            "/srv/static",
        ])
        .unwrap();
        let overrides = args.into_overrides();
        assert_eq!(overrides.port, Some(9000));
        assert_eq!(overrides.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(overrides.env_path, Some(PathBuf::from("/tmp/custom.env")));
        assert_eq!(overrides.static_root, Some(PathBuf::from("/srv/static")));
        assert!(overrides.upstream_config.is_none());
    }

    #[test]
    fn backend_args_reject_bad_port() {
        assert!(BackendArgs::try_parse_from(["backend", "--port", "99999"]).is_err());
    }

    #[test]
    fn host_must_be_an_ip() {
        assert!(parse_host_arg("0.0.0.0").is_ok());
        assert!(parse_host_arg("localhost").is_err());
    }

    #[test]
    fn static_paths_reject_traversal() {
        let root = Path::new("/srv/static");
        assert!(resolve_static_path(root, "../etc/passwd").is_err());
        assert!(resolve_static_path(root, "css/../../x").is_err());
        assert!(resolve_static_path(root, "").is_err());
        assert_eq!(
            resolve_static_path(root, "css/site.css").unwrap(),
            PathBuf::from("/srv/static/css/site.css")
        );
    }

    #[tokio::test]
    async fn gated_pages_redirect_to_login() {
        let (app, _) = test_app(Arc::default(), None);
        for uri in ["/", "/search?q=x", "/watch?v=a", "/channel/UC1", "/playlist?list=PL"] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::SEE_OTHER, "{uri}");
            assert_eq!(response.headers()[header::LOCATION], "/login");
        }
    }

    #[tokio::test]
    async fn wrong_password_rerenders_form() {
        let (app, _) = test_app(Arc::default(), None);
        let response = app.oneshot(login_request("nope")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        assert!(body_text(response).await.contains(WRONG_PASSWORD));
    }

    #[tokio::test]
    async fn correct_password_sets_session_cookie() {
        let (app, state) = test_app(Arc::default(), None);
        let response = app.clone().oneshot(login_request("choco")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with(&format!("{SESSION_COOKIE}=")));
        assert!(cookie.contains("HttpOnly"));
        let token = cookie
            .split(';')
            .next()
            .and_then(|pair| pair.split_once('='))
            .map(|(_, value)| value)
            .unwrap();
        assert!(state.sessions.verify_token(token));
    }

    #[tokio::test]
    async fn logged_in_visitors_skip_login() {
        let (app, state) = test_app(Arc::default(), None);
        let response = app
            .oneshot(get_with_session("/login", &state))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn home_page_serves_builtin_trending_when_offline() {
        let (app, state) = test_app(Arc::default(), None);
        let response = app.oneshot(get_with_session("/", &state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "no-cache, no-store, must-revalidate"
        );
        assert!(body_text(response).await.contains("dQw4w9WgXcQ"));
    }

    #[tokio::test]
    async fn watch_without_id_renders_trending() {
        let (app, state) = test_app(Arc::default(), None);
        let response = app
            .oneshot(get_with_session("/edu", &state))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("急上昇"));
    }

    #[tokio::test]
    async fn watch_page_renders_with_everything_down() {
        let (app, state) = test_app(Arc::default(), None);
        let response = app
            .oneshot(get_with_session("/ume?v=abc", &state))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("https://www.youtube-nocookie.com/embed/abc?autoplay=1"));
        assert!(html.contains(render::NO_COMMENTS));
    }

    #[tokio::test]
    async fn playlist_without_list_redirects_home() {
        let (app, state) = test_app(Arc::default(), None);
        let response = app
            .oneshot(get_with_session("/playlist", &state))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
    }

    #[tokio::test]
    async fn api_search_requires_query() {
        let (app, _) = test_app(Arc::default(), None);
        let response = app.oneshot(get("/api/search?q=")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let parsed: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(parsed["error"], "Query required");
    }

    #[tokio::test]
    async fn api_search_returns_mirror_results() {
        let stub = Arc::new(StubTransport::default());
        stub.respond(
            &format!("{MIRROR}api/v1/search?q=cats&page=1&hl=jp"),
            "application/json",
            br#"[{"type":"channel","authorId":"UC1","author":"Cats"}]"#,
        );
        let (app, _) = test_app(stub, None);
        let response = app.oneshot(get("/api/search?q=cats")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let parsed: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(parsed[0]["type"], "channel");
        assert_eq!(parsed[0]["id"], "UC1");
    }

    #[tokio::test]
    async fn api_video_reports_null_info() {
        let (app, _) = test_app(Arc::default(), None);
        let response = app.oneshot(get("/api/video/abc")).await.unwrap();
        let parsed: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(parsed["info"].is_null());
        assert!(parsed["streams"]["primary"].is_null());
        assert_eq!(
            parsed["streams"]["embed"],
            "https://www.youtube-nocookie.com/embed/abc?autoplay=1"
        );
    }

    #[tokio::test]
    async fn api_channel_videos_defaults_on_failure() {
        let (app, _) = test_app(Arc::default(), None);
        let response = app
            .oneshot(get("/api/channel/UC1/videos?continuation=abc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let parsed: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(parsed, serde_json::json!({"videos": [], "continuation": ""}));
    }

    #[tokio::test]
    async fn comments_fragment_shows_placeholder() {
        let (app, _) = test_app(Arc::default(), None);
        let response = app.oneshot(get("/comments?v=abc")).await.unwrap();
        assert_eq!(body_text(response).await, render::NO_COMMENTS);
    }

    #[tokio::test]
    async fn thumbnail_relay_keeps_its_cache_header() {
        let stub = Arc::new(StubTransport::default());
        stub.respond("https://img.test/vi/abc/hqdefault.jpg", "image/jpeg", b"JPEG");
        let (app, _) = test_app(stub, None);

        let response = app.clone().oneshot(get("/thumbnail?v=abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            THUMBNAIL_CACHE_CONTROL
        );
        assert!(response.headers().get(header::PRAGMA).is_none());
        assert_eq!(body_text(response).await, "JPEG");

        let missing = app.clone().oneshot(get("/thumbnail")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        let failed = app.oneshot(get("/thumbnail?v=gone")).await.unwrap();
        assert_eq!(failed.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn thumbnail_relay_forwards_content_type() {
        let stub = Arc::new(StubTransport::default());
        stub.respond("https://img.test/vi/webp/hqdefault.jpg", "image/webp", b"RIFF");
        let (app, _) = test_app(stub, None);

        let response = app.oneshot(get("/thumbnail?v=webp")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/webp");
    }

    #[tokio::test]
    async fn oversized_thumbnail_is_not_relayed() {
        let stub = Arc::new(StubTransport::default());
        let body = vec![0u8; chocotube::upstream::MAX_IMAGE_BYTES as usize + 1];
        stub.respond("https://img.test/vi/huge/hqdefault.jpg", "image/jpeg", &body);
        let (app, _) = test_app(stub, None);

        let response = app.oneshot(get("/thumbnail?v=huge")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn suggest_returns_json_array() {
        let (app, _) = test_app(Arc::default(), None);
        let response = app.oneshot(get("/suggest?keyword=ca")).await.unwrap();
        let parsed: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(parsed, serde_json::json!([]));
    }

    #[tokio::test]
    async fn static_files_are_served_with_mime() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("style.css"), "body{}").unwrap();
        let (app, _) = test_app(Arc::default(), Some(dir.path().to_path_buf()));

        let response = app.clone().oneshot(get("/static/style.css")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
        assert_eq!(body_text(response).await, "body{}");

        let missing = app.oneshot(get("/static/nope.js")).await.unwrap();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_api_routes_are_json_404() {
        let (app, _) = test_app(Arc::default(), None);
        let response = app.oneshot(get("/api/nothing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let parsed: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(parsed["error"], "endpoint not found");
    }

    #[tokio::test]
    async fn api_error_serializes_json() {
        let response = ApiError::not_found("missing").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let parsed: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(parsed["error"], "missing");
    }
}
