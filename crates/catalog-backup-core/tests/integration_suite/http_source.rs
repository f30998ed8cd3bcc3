//! HTTP catalog source and connectivity probe against a local stub.

use axum::{
    http::{header, StatusCode},
    routing::post,
    Router,
};
use std::time::Duration;

use catalog_backup_core::recovery::{ConnectivityProbe, HttpConnectivityProbe};
use catalog_backup_core::source::{CatalogPage, CatalogSource, HttpCatalogSource};
use catalog_backup_core::Error;

use super::common::{
    api_config, catalog_router, pages, start_http_server_with_app, unreachable_url, StubCatalog,
    GRAPHQL_PATH,
};

#[tokio::test]
async fn fetch_posts_products_query_with_cursor() {
    let catalog = StubCatalog::new(pages(&[&["1", "2"], &["3"]]));
    let (url, server) = start_http_server_with_app(catalog_router(catalog.clone())).await;
    let source = HttpCatalogSource::new(api_config(&url)).unwrap();

    let first = source.fetch("shop.example.com", None).await.unwrap();
    assert_eq!(first.status, 200);
    let page = CatalogPage::from_body(&first.body).unwrap();
    assert!(page.has_next_page);
    assert_eq!(page.end_cursor.as_deref(), Some("cursor-1"));
    assert_eq!(page.records.len(), 2);

    let second = source
        .fetch("shop.example.com", Some("cursor-1"))
        .await
        .unwrap();
    let page = CatalogPage::from_body(&second.body).unwrap();
    assert!(!page.has_next_page);
    assert_eq!(page.records.len(), 1);

    let requests = catalog.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[0]["query"]
        .as_str()
        .unwrap()
        .contains("products(first: $first, after: $after)"));
    assert!(!requests[0]["query"].as_str().unwrap().contains("totalCount"));
    assert_eq!(requests[0]["variables"]["first"], 250);
    assert!(requests[0]["variables"]["after"].is_null());
    assert_eq!(requests[1]["variables"]["after"], "cursor-1");

    server.abort();
}

#[tokio::test]
async fn throttled_response_carries_retry_after() {
    let catalog = StubCatalog::new(pages(&[&["1"]]));
    catalog.throttle_next(1);
    let (url, server) = start_http_server_with_app(catalog_router(catalog)).await;
    let source = HttpCatalogSource::new(api_config(&url)).unwrap();

    let response = source.fetch("shop.example.com", None).await.unwrap();

    assert_eq!(response.status, 429);
    assert!(response.is_throttled());
    assert_eq!(response.retry_after, Some(Duration::from_millis(50)));

    server.abort();
}

#[tokio::test]
async fn malformed_body_decodes_to_empty_object() {
    let app = Router::new().route(
        GRAPHQL_PATH,
        post(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html>maintenance</html>") }),
    );
    let (url, server) = start_http_server_with_app(app).await;
    let source = HttpCatalogSource::new(api_config(&url)).unwrap();

    let response = source.fetch("shop.example.com", None).await.unwrap();

    assert_eq!(response.status, 200);
    assert!(response.body.as_object().unwrap().is_empty());
    assert!(CatalogPage::from_body(&response.body).is_none());

    server.abort();
}

#[tokio::test]
async fn server_error_status_is_reported_not_raised() {
    let app = Router::new().route(
        GRAPHQL_PATH,
        post(|| async { (StatusCode::BAD_GATEWAY, "upstream unavailable") }),
    );
    let (url, server) = start_http_server_with_app(app).await;
    let source = HttpCatalogSource::new(api_config(&url)).unwrap();

    let response = source.fetch("shop.example.com", None).await.unwrap();

    assert_eq!(response.status, 502);
    assert!(!response.is_success());
    assert!(!response.is_throttled());

    server.abort();
}

#[tokio::test]
async fn unreachable_endpoint_is_connection_error() {
    let source = HttpCatalogSource::new(api_config(&unreachable_url().await)).unwrap();

    let err = source.fetch("shop.example.com", None).await.unwrap_err();

    assert!(matches!(err, Error::Connection(_)));
}

#[tokio::test]
async fn probe_reports_reachability() {
    let (url, server) =
        start_http_server_with_app(catalog_router(StubCatalog::new(vec![]))).await;

    let online = HttpConnectivityProbe::new(&api_config(&url)).unwrap();
    assert!(online.is_online("shop.example.com").await);

    let offline = HttpConnectivityProbe::new(&api_config(&unreachable_url().await)).unwrap();
    assert!(!offline.is_online("shop.example.com").await);

    server.abort();
}
