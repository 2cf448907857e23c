//! HTTP rate provider tests against a mock rates API.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use z_charge_core::Currency;
use z_charge_fx::{CurrencyConverter, FxConfig, FxError, HttpRateProvider, RateProvider};

// ============================================================================
// Helpers
// ============================================================================

fn provider(server: &MockServer) -> HttpRateProvider {
    let config = FxConfig::default()
        .with_rates_url(server.uri())
        .with_retries(3, Duration::from_millis(1));
    HttpRateProvider::new(config).unwrap()
}

fn rates(base: &str, symbol: &str, rate: f64) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "base": base,
        "rates": { symbol: rate }
    }))
}

fn usdt() -> Currency {
    Currency::new("USDT").unwrap()
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn fetched_rate_is_cached_in_both_directions() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .and(query_param("base", "BTC"))
        .and(query_param("symbols", "USD"))
        .respond_with(rates("BTC", "USD", 50_000.0))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);

    let rate = provider.get_rate(&Currency::btc(), &Currency::usd()).await.unwrap();
    assert_eq!(rate, Decimal::from(50_000));

    let again = provider.get_rate(&Currency::btc(), &Currency::usd()).await.unwrap();
    assert_eq!(again, rate);

    let inverse = provider.get_rate(&Currency::usd(), &Currency::btc()).await.unwrap();
    assert_eq!(inverse, Decimal::new(2, 5));
}

#[tokio::test]
async fn expired_rates_are_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .respond_with(rates("EUR", "USD", 1.08))
        .expect(2)
        .mount(&server)
        .await;

    let config = FxConfig::default()
        .with_rates_url(server.uri())
        .with_cache_ttl(Duration::ZERO);
    let provider = HttpRateProvider::new(config).unwrap();

    for _ in 0..2 {
        let rate = provider.get_rate(&Currency::eur(), &Currency::usd()).await.unwrap();
        assert_eq!(rate, Decimal::new(108, 2));
    }
}

#[tokio::test]
async fn invalidate_clears_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .respond_with(rates("EUR", "USD", 1.08))
        .expect(2)
        .mount(&server)
        .await;

    let provider = provider(&server);
    provider.get_rate(&Currency::eur(), &Currency::usd()).await.unwrap();
    provider.invalidate();
    provider.get_rate(&Currency::eur(), &Currency::usd()).await.unwrap();
}

// ============================================================================
// Inverse Rates
// ============================================================================

#[tokio::test]
async fn inverse_is_derived_when_only_reverse_is_quoted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .and(query_param("base", "USDT"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "base": "USDT",
            "rates": {}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .and(query_param("base", "EUR"))
        .and(query_param("symbols", "USDT"))
        .respond_with(rates("EUR", "USDT", 1.25))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server);

    let rate = provider.get_rate(&usdt(), &Currency::eur()).await.unwrap();
    assert_eq!(rate, Decimal::new(8, 1));

    // Both directions were cached from the single reverse fetch.
    let reverse = provider.get_rate(&Currency::eur(), &usdt()).await.unwrap();
    assert_eq!(reverse, Decimal::new(125, 2));
}

#[tokio::test]
async fn not_found_falls_back_to_the_reverse_pair() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .and(query_param("base", "USDT"))
        .respond_with(ResponseTemplate::new(404).set_body_string("unknown base"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .and(query_param("base", "EUR"))
        .and(query_param("symbols", "USDT"))
        .respond_with(rates("EUR", "USDT", 1.25))
        .expect(1)
        .mount(&server)
        .await;

    let rate = provider(&server)
        .get_rate(&usdt(), &Currency::eur())
        .await
        .unwrap();
    assert_eq!(rate, Decimal::new(8, 1));
}

#[tokio::test]
async fn not_found_both_ways_is_no_rate_available() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&server)
        .await;

    let err = provider(&server)
        .get_rate(&Currency::eur(), &Currency::eth())
        .await
        .unwrap_err();
    assert!(matches!(err, FxError::NoRateAvailable { .. }));
}

#[tokio::test]
async fn unknown_pair_is_no_rate_available() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rates": {} })))
        .expect(2)
        .mount(&server)
        .await;

    let err = provider(&server)
        .get_rate(&Currency::eur(), &Currency::eth())
        .await
        .unwrap_err();
    assert!(matches!(err, FxError::NoRateAvailable { .. }));
}

// ============================================================================
// Retries
// ============================================================================

#[tokio::test]
async fn transient_failures_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .respond_with(rates("EUR", "USD", 1.1))
        .expect(1)
        .mount(&server)
        .await;

    let rate = provider(&server)
        .get_rate(&Currency::eur(), &Currency::usd())
        .await
        .unwrap();
    assert_eq!(rate, Decimal::new(11, 1));
}

#[tokio::test]
async fn exhausted_retries_surface_the_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .expect(3)
        .mount(&server)
        .await;

    let err = provider(&server)
        .get_rate(&Currency::eur(), &Currency::usd())
        .await
        .unwrap_err();
    match err {
        FxError::Provider { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "upstream down");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = provider(&server)
        .get_rate(&Currency::eur(), &Currency::usd())
        .await
        .unwrap_err();
    assert!(matches!(err, FxError::Provider { status: 401, .. }));
}

// ============================================================================
// Authentication and Converter Wiring
// ============================================================================

#[tokio::test]
async fn api_key_is_sent_as_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .and(header("Authorization", "Bearer rates-secret"))
        .respond_with(rates("BTC", "USD", 50_000.0))
        .expect(1)
        .mount(&server)
        .await;

    let config = FxConfig::default()
        .with_rates_url(format!("{}/", server.uri()))
        .with_api_key("rates-secret");
    let provider = HttpRateProvider::new(config).unwrap();
    provider.get_rate(&Currency::btc(), &Currency::usd()).await.unwrap();
}

#[tokio::test]
async fn converter_uses_provider_on_cache_miss() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/rates"))
        .and(query_param("base", "BTC"))
        .respond_with(rates("BTC", "USD", 50_000.0))
        .expect(1)
        .mount(&server)
        .await;

    let converter = CurrencyConverter::with_provider(Arc::new(provider(&server)));

    let cents = converter
        .convert(25_000_000, &Currency::btc(), &Currency::usd())
        .await
        .unwrap();
    assert_eq!(cents, 1_250_000);

    // Second conversion is served from the converter's own cache.
    let cents = converter
        .convert(50_000_000, &Currency::btc(), &Currency::usd())
        .await
        .unwrap();
    assert_eq!(cents, 2_500_000);
}
