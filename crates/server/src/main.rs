//! Pagesmith Server
//!
//! Axum transport for the publishing pipeline: validates inbound requests,
//! short-circuits duplicates against the idempotency store, and schedules the
//! publishing workflow as a background task so the caller gets an immediate
//! acknowledgment.

use axum::{
    extract::State,
    response::Json,
    routing::{get, MethodRouter},
    Router,
};
use clap::Parser;
use pagesmith_core::config::Config;
use pagesmith_core::context::AppContext;
use pagesmith_core::models::{DedupKey, SubmitRequest};
use pagesmith_core::workflow;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Application state
struct AppState {
    ctx: Arc<AppContext>,
    /// Dedup keys with a workflow currently running. At most one workflow per
    /// key is scheduled at a time; a second request for an in-flight key is
    /// acknowledged but not re-run.
    in_flight: Mutex<HashSet<DedupKey>>,
}

type SharedState = Arc<AppState>;

#[derive(Parser)]
#[command(name = "pagesmith", about = "Brief-to-website publishing service")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,
}

/// The one route table: both the router and /debug-routes derive from it,
/// so the debug listing cannot drift from what is actually registered.
fn route_table() -> Vec<(&'static str, MethodRouter<SharedState>)> {
    vec![
        ("/", get(read_root)),
        ("/api-endpoint", get(liveness).post(receive_request)),
        ("/debug-routes", get(debug_routes)),
    ]
}

fn route_paths() -> Vec<&'static str> {
    route_table().into_iter().map(|(path, _)| path).collect()
}

fn app(state: SharedState) -> Router {
    let mut router = Router::new();
    for (path, handler) in route_table() {
        router = router.route(path, handler);
    }
    router.with_state(state)
}

async fn read_root() -> Json<Value> {
    Json(json!({"msg": "OK"}))
}

async fn liveness() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn debug_routes() -> Json<Value> {
    Json(json!(route_paths()))
}

/// Main endpoint: validate, dedup, schedule.
async fn receive_request(
    State(state): State<SharedState>,
    Json(request): Json<SubmitRequest>,
) -> Json<Value> {
    tracing::info!(
        "Received request: task={} round={} email={}",
        request.task,
        request.round,
        request.email
    );

    if request.secret != state.ctx.config.secret {
        tracing::warn!("Invalid secret received");
        return Json(json!({"error": "Invalid secret"}));
    }

    let key = request.dedup_key();

    // Completed before: replay the recorded payload instead of re-running.
    if let Some(prev) = state.ctx.store.lookup(&key).await {
        tracing::warn!("Duplicate request detected for {}. Re-notifying only.", key);
        if let Some(url) = &request.evaluation_url {
            if let Err(e) = workflow::notify_evaluator(&state.ctx.http, url, &prev).await {
                tracing::warn!("Re-notification failed: {:#}", e);
            }
        }
        return Json(json!({"status": "ok", "note": "duplicate handled & re-notified"}));
    }

    // Currently running: acknowledge without scheduling a second workflow.
    {
        let mut in_flight = state.in_flight.lock().await;
        if !in_flight.insert(key.clone()) {
            tracing::warn!("Request for {} already in flight, not rescheduling", key);
            return Json(json!({
                "status": "accepted",
                "note": format!("processing round {} started", request.round)
            }));
        }
    }

    let round = request.round;
    let state_bg = state.clone();
    tokio::spawn(async move {
        match workflow::process_request(&state_bg.ctx, request).await {
            Ok((payload, report)) => {
                if report.all_ok() {
                    tracing::info!("Workflow complete for {}: {}", key, payload.repo_url);
                } else {
                    tracing::warn!(
                        "Workflow complete for {} with degraded steps: {:?}",
                        key,
                        report.steps
                    );
                }
            }
            Err(e) => tracing::error!("Workflow failed for {}: {:#}", key, e),
        }
        state_bg.in_flight.lock().await.remove(&key);
    });

    Json(json!({
        "status": "accepted",
        "note": format!("processing round {} started", round)
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;
    let state: SharedState = Arc::new(AppState {
        ctx: Arc::new(AppContext::new(config)?),
        in_flight: Mutex::new(HashSet::new()),
    });

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    tracing::info!("Pagesmith server running at http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use pagesmith_core::models::PublishPayload;
    use tempfile::tempdir;
    use tower::ServiceExt;

    const BODY: &str = r#"{"secret":"S","email":"a@b.com","task":"demo1","round":1,"nonce":"n1","brief":"Build index.html","attachments":[],"checks":[]}"#;

    fn test_state(dir: &std::path::Path) -> SharedState {
        let config = Config {
            secret: "S".into(),
            github_token: "t".into(),
            github_owner: "octocat".into(),
            llm_token: "k".into(),
            llm_base_url: "http://127.0.0.1:9".into(),
            llm_model: "test-model".into(),
            store_path: dir.join("processed.json"),
            attachment_dir: dir.join("attachments"),
        };
        Arc::new(AppState {
            ctx: Arc::new(AppContext::new(config).unwrap()),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    async fn post_json(router: Router, body: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::post("/api-endpoint")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_invalid_secret_rejected_without_side_effects() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());
        let bad = BODY.replace(r#""secret":"S""#, r#""secret":"wrong""#);

        let (status, body) = post_json(app(state.clone()), &bad).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"error": "Invalid secret"}));
        // Nothing was scheduled.
        assert!(state.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_known_key_replays_instead_of_rerunning() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        // A prior round already completed and was recorded.
        let key = DedupKey::new("a@b.com", "demo1", 1, "n1");
        let payload = PublishPayload {
            email: "a@b.com".into(),
            task: "demo1".into(),
            round: 1,
            nonce: "n1".into(),
            repo_url: "https://github.com/octocat/demo1".into(),
            commit_sha: Some("abc123".into()),
            pages_url: Some("https://octocat.github.io/demo1/".into()),
        };
        state.ctx.store.record(&key, &payload).await.unwrap();

        // No evaluation_url in the body, so the replay branch has nothing to
        // re-notify and responds synchronously.
        let (status, body) = post_json(app(state.clone()), BODY).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": "ok", "note": "duplicate handled & re-notified"})
        );
        assert!(state.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_new_key_is_accepted_immediately() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let (status, body) = post_json(app(state), BODY).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"status": "accepted", "note": "processing round 1 started"})
        );
    }

    #[tokio::test]
    async fn test_debug_routes_reports_the_router_table() {
        let dir = tempdir().unwrap();
        let response = app(test_state(dir.path()))
            .oneshot(Request::get("/debug-routes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let listed: Vec<String> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(listed, route_paths());
    }

    #[tokio::test]
    async fn test_root_and_liveness_shapes() {
        let dir = tempdir().unwrap();
        let state = test_state(dir.path());

        let response = app(state.clone())
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&bytes).unwrap(),
            json!({"msg": "OK"})
        );

        let response = app(state)
            .oneshot(Request::get("/api-endpoint").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(
            serde_json::from_slice::<Value>(&bytes).unwrap(),
            json!({"status": "ok"})
        );
    }
}
