//! End-to-end tests against a mock HTTP server, through the hyper adapter.

use std::io::Write;
use std::sync::{Arc, Mutex};

use assert2::{check, let_assert};
use flate2::Compression;
use flate2::write::GzEncoder;
use tether::middleware::BearerAuthLayer;
use tether::{
    ApiClient, Body, ClientConfig, ClientOptions, FailureContext, Headers, Outcome, Params, Payload,
    RetryOptions,
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, header_exists, method, path, query_param},
};

fn defaults(server: &MockServer) -> tether::ClientConfigBuilder {
    ClientConfig::builder()
        .service_uri(server.uri())
        .base_path("/v1")
        .log_requests(false)
}

fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
        .collect()
}

type Reports = Arc<Mutex<Vec<FailureContext>>>;

fn recording(client: ApiClient) -> (ApiClient, Reports) {
    let reports = Reports::default();
    let sink = Arc::clone(&reports);
    let client = client.with_reporter(move |context: &FailureContext| {
        sink.lock().expect("lock").push(context.clone());
    });
    (client, reports)
}

#[tokio::test]
async fn get_returns_decoded_json() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/widgets"))
        .and(query_param("id", "7"))
        .and(header("Accept", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "foo"})))
        .expect(1)
        .mount(&server)
        .await;

    let config = defaults(&server).build();
    let (client, reports) = recording(ApiClient::from_defaults(&config).expect("client"));

    let id = params(&[("id", "7")]);
    let_assert!(Ok(outcome) = client.get("/widgets", &id, &Headers::new()).await);

    let_assert!(Outcome::Success(Payload::Json(value)) = outcome);
    check!(value == serde_json::json!({"name": "foo"}));
    check!(reports.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn not_found_is_reported_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/widgets"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such widget"))
        .expect(1)
        .mount(&server)
        .await;

    let config = defaults(&server).build();
    let (client, reports) = recording(ApiClient::from_defaults(&config).expect("client"));

    let id = params(&[("id", "7")]);
    let_assert!(Ok(outcome) = client.get("/widgets", &id, &Headers::new()).await);

    let_assert!(Outcome::Failure(response) = outcome);
    check!(response.status() == 404);

    let reports = reports.lock().expect("lock");
    check!(reports.len() == 1);
    let_assert!(Some(report) = reports.first());
    check!(report.response_status == 404);
    check!(report.response_body == "no such widget");
    check!(report.request_uri == format!("{}/v1/widgets?id=7", server.uri()));
}

#[tokio::test]
async fn post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/widgets"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(serde_json::json!({"name": "bar"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": 8})))
        .expect(1)
        .mount(&server)
        .await;

    let config = defaults(&server).build();
    let client = ApiClient::from_defaults(&config).expect("client");
    let body = Body::json(&serde_json::json!({"name": "bar"})).expect("json");

    let_assert!(Ok(outcome) = client.post("widgets", body, &Headers::new()).await);
    let_assert!(Some(Payload::Json(value)) = outcome.payload());
    check!(value["id"] == 8);
}

#[tokio::test]
async fn form_bodies_replace_the_default_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/widgets/8"))
        .and(header("Content-Type", "application/x-www-form-urlencoded"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let config = defaults(&server).build();
    let client = ApiClient::from_defaults(&config).expect("client");

    let_assert!(
        Ok(outcome) = client
            .put("/widgets/8", Body::form([("name", "baz")]), &Headers::new())
            .await
    );
    check!(outcome.is_success());
}

#[tokio::test]
async fn instance_options_override_defaults() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/widgets"))
        .and(query_param("api_key", "instance"))
        .and(header("X-Team", "gadgets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = defaults(&server)
        .default_parameter("api_key", "shared")
        .default_header("X-Team", "widgets")
        .build();
    let options = ClientOptions::new()
        .base_path("/v2")
        .parameter("api_key", "instance")
        .http_header("x-team", "gadgets");
    let client = ApiClient::new(&config, options).expect("client");

    let_assert!(Ok(outcome) = client.get("/widgets", &Params::new(), &Headers::new()).await);
    check!(outcome.is_success());
}

#[tokio::test]
async fn registered_middlewares_decorate_requests() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/private"))
        .and(header("Authorization", "Bearer s3cr3t"))
        .and(header_exists("X-Request-Faraday-Start"))
        .and(header_exists("Accept-Encoding"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let config = defaults(&server)
        .register_layer("auth", BearerAuthLayer::new("s3cr3t"))
        .middleware("request_start_header")
        .build();
    let client = ApiClient::new(&config, ClientOptions::new().middleware("auth")).expect("client");

    let_assert!(Ok(outcome) = client.get("/private", &Params::new(), &Headers::new()).await);
    check!(outcome.is_success());
}

#[tokio::test]
async fn html_responses_after_switching() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/page"))
        .and(header("Accept", "text/html"))
        .respond_with(ResponseTemplate::new(200).set_body_raw("<h1>hi</h1>", "text/html"))
        .expect(1)
        .mount(&server)
        .await;

    let config = defaults(&server).build();
    let mut client = ApiClient::from_defaults(&config).expect("client");
    // build the connection first: the switch must still apply
    let_assert!(Ok(_) = client.connection());
    client.expect_html_response();

    let_assert!(Ok(outcome) = client.get("/page", &Params::new(), &Headers::new()).await);
    let_assert!(Some(payload) = outcome.payload());
    check!(payload.as_html() == Some("<h1>hi</h1>"));
}

#[tokio::test]
async fn gzip_responses_are_decompressed() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(br#"{"name":"zipped"}"#).expect("write");
    let compressed = encoder.finish().expect("finish");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/zipped"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Encoding", "gzip")
                .set_body_raw(compressed, "application/json"),
        )
        .mount(&server)
        .await;

    let config = defaults(&server).build();
    let client = ApiClient::from_defaults(&config).expect("client");

    let_assert!(Ok(outcome) = client.get("/zipped", &Params::new(), &Headers::new()).await);
    let_assert!(Some(Payload::Json(value)) = outcome.payload());
    check!(value["name"] == "zipped");
}

#[tokio::test]
async fn action_paths_stay_under_the_base_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/widgets:search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let config = defaults(&server).build();
    let client = ApiClient::from_defaults(&config).expect("client");

    let_assert!(
        Ok(outcome) = client
            .post("/widgets:search", Body::from("{}"), &Headers::new())
            .await
    );
    check!(outcome.is_success());
}

#[tokio::test]
async fn head_with_encoding_headers_and_no_body() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/v1/widgets"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Encoding", "gzip"))
        .expect(1)
        .mount(&server)
        .await;

    let config = defaults(&server).build();
    let client = ApiClient::from_defaults(&config).expect("client");

    let_assert!(Ok(outcome) = client.head("/widgets", &Params::new(), &Headers::new()).await);
    let_assert!(Some(Payload::Json(value)) = outcome.payload());
    check!(value.is_null());
}

#[tokio::test]
async fn listed_statuses_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let config = defaults(&server)
        .retry(RetryOptions::default().with_retry_statuses([503]))
        .build();
    let (client, reports) = recording(ApiClient::from_defaults(&config).expect("client"));

    let_assert!(Ok(outcome) = client.get("/flaky", &Params::new(), &Headers::new()).await);
    let_assert!(Some(response) = outcome.failure());
    check!(response.status() == 503);
    check!(reports.lock().expect("lock").len() == 1);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let config = defaults(&server).build();
    let client = ApiClient::from_defaults(&config).expect("client");

    let_assert!(Ok(outcome) = client.get("/missing", &Params::new(), &Headers::new()).await);
    check!(!outcome.is_success());
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    let config = ClientConfig::builder()
        .service_uri("http://127.0.0.1:1")
        .log_requests(false)
        .retry(RetryOptions::disabled())
        .build();
    let client = ApiClient::from_defaults(&config).expect("client");

    let_assert!(Err(err) = client.get("/widgets", &Params::new(), &Headers::new()).await);
    check!(err.is_transport());
}

#[test]
fn invalid_service_uri_fails_at_construction() {
    let config = ClientConfig::builder().service_uri("").build();
    let_assert!(Err(err) = ApiClient::from_defaults(&config));
    check!(err.is_configuration());
}
