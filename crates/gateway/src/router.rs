//! Route table and layer stack

use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    BoxError, Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use articlehub_common::errors::AppError;

use crate::handlers;
use crate::middleware::{metrics::track_metrics, rate_limit};
use crate::state::AppState;

fn timeout_error(err: BoxError, limit: Duration) -> AppError {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::RequestTimeout {
            seconds: limit.as_secs(),
        }
    } else {
        AppError::Internal {
            message: format!("Unhandled error: {}", err),
        }
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let limit = state.config.request_timeout().max(Duration::from_secs(1));
    let timeout = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(move |err: BoxError| async move {
            timeout_error(err, limit)
        }))
        .timeout(limit);

    // API routes
    let mut api_routes = Router::new()
        .route(
            "/articles",
            get(handlers::articles::list_articles).post(handlers::articles::create_article),
        )
        .route("/articles/filters", get(handlers::articles::filter_options))
        .route("/articles/advanced", post(handlers::advanced::advanced_search))
        .route(
            "/articles/{id}",
            get(handlers::articles::get_article)
                .put(handlers::articles::update_article)
                .delete(handlers::articles::delete_article),
        )
        .route("/articles/{id}/metrics", put(handlers::articles::update_metrics))
        .route("/summaries", post(handlers::summaries::generate_summary))
        .route("/doi/info", get(handlers::doi::doi_info))
        .route("/doi/resolve", get(handlers::doi::resolve_doi));

    let limits = &state.config.rate_limit;
    if limits.enabled {
        let limiter = rate_limit::create_rate_limiter(limits.requests_per_second, limits.burst);
        api_routes = api_routes.layer(from_fn_with_state(limiter, rate_limit::rate_limit));
    }

    // Compose the app
    Router::new()
        // Health endpoints (never rate limited)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api_routes)
        .route_layer(from_fn(track_metrics))
        .layer(timeout)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use articlehub_common::{
        clients::{ArticleSource, DoiLookup, GraphBuilder, MockCompletion},
        config::AppConfig,
        db::{ArticleStore, MemoryStore, NewArticle},
        errors::{AppError, Result},
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode};
    use axum::response::IntoResponse;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct FakeSource;

    #[async_trait]
    impl ArticleSource for FakeSource {
        async fn fetch_article(&self, source_id: &str) -> Result<NewArticle> {
            let mut article = NewArticle::new(source_id, "Imported article");
            article.topics = vec!["Hydrology".into()];
            Ok(article)
        }
    }

    struct FakeGraph;

    #[async_trait]
    impl GraphBuilder for FakeGraph {
        async fn chat(&self, _question: &str, _session_id: &str, _mode: &str) -> Result<String> {
            Ok(r#"{{"results": [{{"article_identifier": "W1", "abstract": "Soil study"}}]}}"#.to_string())
        }

        async fn index_document(&self, _file_name: &str, _content: Vec<u8>) -> Result<()> {
            Ok(())
        }

        async fn delete_document(&self, _file_name: &str) -> Result<()> {
            Ok(())
        }
    }

    struct FakeDoi;

    #[async_trait]
    impl DoiLookup for FakeDoi {
        async fn resolve_url(&self, doi: &str) -> Result<Option<String>> {
            Ok((doi == "10.1000/known").then(|| "https://example.org/article".to_string()))
        }

        async fn altmetric(&self, doi: &str) -> Result<Option<Value>> {
            if doi == "10.1000/broken" {
                return Err(AppError::external("altmetric", "HTTP 500"));
            }
            Ok((doi == "10.1000/known").then(|| json!({ "score": 4.5 })))
        }
    }

    async fn app_with(config: AppConfig) -> Router {
        let store = Arc::new(MemoryStore::new());
        let mut w1 = NewArticle::new("W1", "Tropical soil carbon");
        w1.topics = vec!["Soil".into()];
        w1.language = "en".into();
        store.create_article(w1).await.unwrap();
        let mut w2 = NewArticle::new("W2", "Coastal erosion");
        w2.topics = vec!["Oceans".into()];
        w2.language = "pt".into();
        store.create_article(w2).await.unwrap();

        let state = AppState::new(
            config,
            store,
            Arc::new(FakeSource),
            Some(Arc::new(FakeGraph)),
            Arc::new(MockCompletion),
            Arc::new(FakeDoi),
        );
        create_router(state)
    }

    async fn app() -> Router {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = false;
        app_with(config).await
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn send_json(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app().await.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));

        let response = app().await.oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_bodies_are_validation_errors() {
        let app = app().await;

        let response = app
            .clone()
            .oneshot(send_json("POST", "/api/articles/advanced", json!({ "query": 42 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"].is_string());

        let response = app
            .clone()
            .oneshot(send_json("POST", "/api/articles", json!({ "siteId": 7 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");

        let plain = Request::builder()
            .method("POST")
            .uri("/api/articles/advanced")
            .header("content-type", "text/plain")
            .body(Body::from(r#"{"query": "soil"}"#))
            .unwrap();
        let response = app.oneshot(plain).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"]["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_update_status_casing() {
        let app = app().await;

        let response = app
            .clone()
            .oneshot(send_json("PUT", "/api/articles/W1", json!({ "status": "draft" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "DRAFT");

        let response = app
            .oneshot(send_json("PUT", "/api/articles/W1", json!({ "status": "retracted" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Unknown article status"));
    }

    #[tokio::test]
    async fn test_timeout_uses_error_envelope() {
        let err = timeout_error(
            Box::new(tower::timeout::error::Elapsed::new()),
            Duration::from_secs(30),
        );
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "REQUEST_TIMEOUT");
        assert_eq!(body["error"]["message"], "Request timed out after 30s");

        let other = timeout_error("boom".into(), Duration::from_secs(30)).into_response();
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_list_filters_by_topic() {
        let response = app()
            .await
            .oneshot(get("/api/articles?topics=soil&pageSize=5"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["total"], 1);
        assert_eq!(body["pageSize"], 5);
        assert_eq!(body["data"][0]["id"], "W1");
        assert_eq!(body["data"][0]["topics"][0]["name"], "Soil");
    }

    #[tokio::test]
    async fn test_list_empty_and_invalid_sort() {
        let response = app().await.oneshot(get("/api/articles?title=nothing-like-this")).await.unwrap();
        let body = json_body(response).await;
        assert_eq!(body["total"], 0);
        assert_eq!(body["message"], "No articles found");

        let response = app().await.oneshot(get("/api/articles?sortBy=password")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert!(body["error"]["message"].is_string());
    }

    #[tokio::test]
    async fn test_get_article() {
        let response = app().await.oneshot(get("/api/articles/W1")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["title"], "Tropical soil carbon");
        assert!(body["citationsMade"].is_array());

        let response = app().await.oneshot(get("/api/articles/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_import_and_duplicate() {
        let app = app().await;
        let response = app
            .clone()
            .oneshot(send_json("POST", "/api/articles", json!({ "siteId": "W9" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["message"], "Article saved successfully");
        assert_eq!(body["graphIndexed"], true);
        assert_eq!(body["article"]["id"], "W9");

        let response = app
            .clone()
            .oneshot(send_json("POST", "/api/articles", json!({ "siteId": "W9" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(send_json("POST", "/api/articles", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let app = app().await;
        let response = app
            .clone()
            .oneshot(send_json("PUT", "/api/articles/W2", json!({ "journalName": "Coastal Letters" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["journalName"], "Coastal Letters");

        let response = app
            .clone()
            .oneshot(send_json("PUT", "/api/articles/W2/metrics", json!({ "views": 10 })))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["views"], 10);

        let response = app
            .clone()
            .oneshot(Request::builder().method("DELETE").uri("/api/articles/W2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["llmCleanupSuccess"], true);

        let response = app.oneshot(get("/api/articles/W2")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_filter_options() {
        let response = app().await.oneshot(get("/api/articles/filters")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["topics"].as_array().unwrap().len(), 2);
        assert_eq!(body["languages"], json!(["en", "pt"]));
    }

    #[tokio::test]
    async fn test_advanced_search() {
        let response = app()
            .await
            .oneshot(send_json("POST", "/api/articles/advanced", json!({ "query": "soil carbon" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body[0]["id"], "W1");
        assert_eq!(body[0]["aiResume"], "Soil study");

        let response = app()
            .await
            .oneshot(send_json("POST", "/api/articles/advanced", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_doi_routes() {
        let app = app().await;
        let response = app.clone().oneshot(get("/api/doi/resolve")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app.clone().oneshot(get("/api/doi/resolve?doi=10.1000/known")).await.unwrap();
        assert_eq!(json_body(response).await["url"], "https://example.org/article");

        let response = app.clone().oneshot(get("/api/doi/info?doi=10.1000/unknown")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app.clone().oneshot(get("/api/doi/info?doi=10.1000/broken")).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await["error"]["details"]["service"], "altmetric");

        let response = app
            .clone()
            .oneshot(get("/api/doi/info?doi=10.1000/known&articleId=W1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/api/articles/W1")).await.unwrap();
        assert_eq!(json_body(response).await["metrics"]["altmetricScore"], 4.5);
    }

    #[tokio::test]
    async fn test_summaries() {
        let app = app().await;
        let response = app
            .clone()
            .oneshot(send_json("POST", "/api/summaries", json!({ "abstract": "" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(send_json("POST", "/api/summaries", json!({ "abstract": "Estudo sobre solos" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json_body(response).await["summary"].as_str().unwrap().contains("solos"));
    }

    #[tokio::test]
    async fn test_rate_limit_rejects_burst() {
        let mut config = AppConfig::default();
        config.rate_limit.enabled = true;
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let app = app_with(config).await;

        let first = app.clone().oneshot(get("/api/articles")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.clone().oneshot(get("/api/articles")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        let health = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }
}
