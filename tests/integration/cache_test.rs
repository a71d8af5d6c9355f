//! Caching engine over real HTTP

use crate::common::TestDatabase;
use async_trait::async_trait;
use bytes::Bytes;
use fieldops::client::cache::{
    CacheEngine, CacheError, CacheRules, Fetcher, HttpFetcher, Request, Response, ResponseSource,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Stands in for a server that went away
struct Unreachable;

#[async_trait]
impl Fetcher for Unreachable {
    async fn fetch(&self, _request: &Request) -> Result<Response, CacheError> {
        Err(CacheError::Network("connection refused".to_string()))
    }
}

fn engine(fixture: &TestDatabase) -> CacheEngine {
    let fetcher = HttpFetcher::new(Duration::from_secs(5)).unwrap();
    CacheEngine::new(CacheRules::default(), Arc::new(fetcher), fixture.db.clone())
}

#[tokio::test]
async fn test_data_served_from_cache_when_server_is_gone() {
    let fixture = TestDatabase::new().await;
    let engine = engine(&fixture);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/resource/Job"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":[]}"#))
        .mount(&server)
        .await;
    let url = format!("{}/api/resource/Job", server.uri());

    let fresh = engine.fetch(&Request::get(url.as_str())).await.unwrap();
    assert_eq!(fresh.source, ResponseSource::Network);

    let offline = CacheEngine::new(CacheRules::default(), Arc::new(Unreachable), fixture.db.clone());
    let cached = offline.fetch(&Request::get(url.as_str())).await.unwrap();
    assert_eq!(cached.source, ResponseSource::Cache);
    assert_eq!(cached.body, Bytes::from(r#"{"data":[]}"#));
}

#[tokio::test]
async fn test_assets_fetched_once() {
    let fixture = TestDatabase::new().await;
    let engine = engine(&fixture);

    let server = MockServer::start().await;
    Mock::given(path("/assets/app.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("console.log(1)"))
        .expect(1)
        .mount(&server)
        .await;
    let url = format!("{}/assets/app.js", server.uri());

    engine.precache(&[url.clone()]).await.unwrap();
    let response = engine.fetch(&Request::get(url.as_str())).await.unwrap();
    assert_eq!(response.source, ResponseSource::Cache);
}

#[tokio::test]
async fn test_failed_precache_stores_nothing() {
    let fixture = TestDatabase::new().await;
    let engine = engine(&fixture);

    let server = MockServer::start().await;
    Mock::given(path("/assets/app.css"))
        .respond_with(ResponseTemplate::new(200).set_body_string("body{}"))
        .mount(&server)
        .await;
    Mock::given(path("/assets/missing.js"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let css = format!("{}/assets/app.css", server.uri());
    let urls = vec![css.clone(), format!("{}/assets/missing.js", server.uri())];
    assert!(engine.precache(&urls).await.is_err());
    assert!(fixture.db.cached_response(&css).await.unwrap().is_none());
}
