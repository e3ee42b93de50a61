//! REST interface consumed by the reconciliation workflow.
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::db::Pool;
use crate::matching::Matcher;
use crate::yodeck::MediaSource;

pub mod error;
pub mod handlers;

pub use error::{ApiError, ErrorBody};

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub matcher: Matcher,
    /// `None` when no screen platform is configured; manual sync answers 503.
    pub source: Option<Arc<dyn MediaSource>>,
    pub auto_link: bool,
}

impl AppState {
    pub fn new(pool: Pool, matcher: Matcher) -> Self {
        Self {
            pool,
            matcher,
            source: None,
            auto_link: false,
        }
    }

    pub fn with_source(mut self, source: Arc<dyn MediaSource>, auto_link: bool) -> Self {
        self.source = Some(source);
        self.auto_link = auto_link;
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    let media = Router::new()
        .route("/:id/match-suggestions", get(handlers::match_suggestions))
        .route("/:id/link", post(handlers::link))
        .route("/:id/unlink", post(handlers::unlink))
        .route("/:id/archive", post(handlers::archive))
        .route("/:id/unarchive", post(handlers::unarchive));

    let api = Router::new()
        .route("/placements/ads-view", get(handlers::ads_view))
        .nest("/yodeck-media", media)
        .route(
            "/advertisers",
            get(handlers::list_advertisers).post(handlers::upsert_advertiser),
        )
        .route("/sync/yodeck/run", post(handlers::run_sync));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{self, MediaUpsert};
    use crate::model::MediaType;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    async fn setup() -> (Router, Pool) {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        db::upsert_advertiser(&pool, "A1", "Pizza Palace").await.unwrap();
        let mut conn = pool.acquire().await.unwrap();
        for (id, name) in [(501, "PizzaPalace_zomer.mp4"), (502, "Garage_Vermeulen")] {
            db::upsert_media(
                &mut conn,
                &MediaUpsert {
                    external_id: id,
                    name: name.into(),
                    media_type: MediaType::Video,
                    duration_seconds: Some(15.0),
                    screens: vec![],
                },
                Utc::now(),
            )
            .await
            .unwrap();
        }
        drop(conn);
        let router = build_router(AppState::new(pool.clone(), Matcher::default()));
        (router, pool)
    }

    async fn call(
        router: &Router,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (router, _) = setup().await;
        let (status, body) = call(&router, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn link_then_archive_hides_item_and_blocks_suggestions() {
        let (router, _) = setup().await;

        let (status, body) = call(
            &router,
            "POST",
            "/api/yodeck-media/501/link",
            Some(json!({"advertiserId": "A1", "matchType": "suggested", "matchConfidence": 0.82})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Media 501 linked to Pizza Palace");

        let (_, view) = call(&router, "GET", "/api/placements/ads-view", None).await;
        assert_eq!(view["summary"]["linked"], 1);
        let item = &view["items"].as_array().unwrap()[1];
        assert_eq!(item["externalId"], 501);
        assert_eq!(item["status"], "linked");
        assert_eq!(item["advertiserId"], "A1");

        let (status, _) = call(&router, "POST", "/api/yodeck-media/501/archive", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, view) = call(&router, "GET", "/api/placements/ads-view", None).await;
        assert_eq!(view["items"].as_array().unwrap().len(), 1);
        assert_eq!(view["summary"]["total"], 1);
        assert_eq!(view["summary"]["archived"], 1);

        let (_, view) = call(
            &router,
            "GET",
            "/api/placements/ads-view?includeArchived=true",
            None,
        )
        .await;
        assert_eq!(view["summary"]["total"], 2);

        let (status, body) = call(
            &router,
            "GET",
            "/api/yodeck-media/501/match-suggestions",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "CONFLICT");
    }

    #[tokio::test]
    async fn invalid_requests_map_to_status_codes() {
        let (router, _) = setup().await;

        let (status, body) = call(&router, "POST", "/api/yodeck-media/502/unlink", None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "cannot unlink a media item that is unlinked");

        let (status, _) = call(&router, "POST", "/api/yodeck-media/999/archive", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &router,
            "POST",
            "/api/yodeck-media/502/link",
            Some(json!({"advertiserId": "A1", "matchType": "suggested"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "VALIDATION_ERROR");

        let (status, _) = call(
            &router,
            "POST",
            "/api/yodeck-media/502/link",
            Some(json!({"advertiserId": "ghost", "matchType": "manual"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = call(&router, "POST", "/api/sync/yodeck/run", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn suggestions_and_advertiser_upsert() {
        let (router, _) = setup().await;

        let (status, body) = call(
            &router,
            "GET",
            "/api/yodeck-media/501/match-suggestions",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bestMatch"]["advertiserId"], "A1");
        assert!(body["bestMatch"]["score"].as_u64().unwrap() >= 75);

        let (status, created) = call(
            &router,
            "POST",
            "/api/advertisers",
            Some(json!({"name": "Garage Vermeulen"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(!created["id"].as_str().unwrap().is_empty());

        let (_, list) = call(&router, "GET", "/api/advertisers", None).await;
        assert_eq!(list.as_array().unwrap().len(), 2);

        let blank = Some(json!({"name": "  "}));
        let (status, _) = call(&router, "POST", "/api/advertisers", blank).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_path_and_query_answer_json_errors() {
        let (router, _) = setup().await;

        for (method, uri) in [
            ("POST", "/api/yodeck-media/abc/archive"),
            ("GET", "/api/yodeck-media/abc/match-suggestions"),
            ("GET", "/api/placements/ads-view?includeArchived=yes"),
        ] {
            let (status, body) = call(&router, method, uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{} {}", method, uri);
            assert_eq!(body["error"], "VALIDATION_ERROR", "{} {}", method, uri);
            assert!(!body["message"].as_str().unwrap().is_empty());
        }
    }
}
