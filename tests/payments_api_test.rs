//! End-to-end tests of the HTTP API over the in-memory store and a mocked PayPal

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use paypal_payments_backend::api::{self, AppState};
use paypal_payments_backend::config::Config;
use paypal_payments_backend::database::{InMemoryPaymentStore, PaymentStore};
use paypal_payments_backend::payments::lifecycle::PaymentLifecycle;
use paypal_payments_backend::payments::providers::PayPalProvider;
use paypal_payments_backend::payments::reconciliation::{
    ReconciliationScheduler, ReconciliationWorker,
};
use paypal_payments_backend::payments::types::{
    Currency, NewPayment, Payment, PaymentStatus, RedirectUrls,
};

/// Long enough that background checks never fire during a test
const IDLE_DELAY: Duration = Duration::from_secs(60);

struct TestApp {
    router: Router,
    store: Arc<InMemoryPaymentStore>,
    gateway: MockServer,
    _worker: JoinHandle<()>,
}

impl TestApp {
    async fn spawn(reconcile_delay: Duration) -> Self {
        let gateway = MockServer::start().await;

        let mut config = Config::default();
        config.paypal.base_url = gateway.uri();
        config.paypal.client_id = "client".to_string();
        config.paypal.client_secret = "secret".to_string();
        config.paypal.timeout_secs = 5;

        let store = Arc::new(InMemoryPaymentStore::new());
        let provider = Arc::new(PayPalProvider::new(config.paypal.clone()).unwrap());
        let (scheduler, queue) = ReconciliationScheduler::new(reconcile_delay);
        let payments = Arc::new(PaymentLifecycle::new(
            provider,
            store.clone(),
            scheduler,
            RedirectUrls::from_base_url(&config.server.base_url),
        ));
        let worker = ReconciliationWorker::new(queue, Arc::clone(&payments), 4).spawn();

        Self {
            router: api::router(AppState::new(config, payments)),
            store,
            gateway,
            _worker: worker,
        }
    }

    async fn request(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn mock_token(&self) {
        Mock::given(method("POST"))
            .and(path("/v1/oauth2/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "mock_access_token",
                "token_type": "Bearer"
            })))
            .mount(&self.gateway)
            .await;
    }

    async fn mock_create_order(&self) {
        Mock::given(method("POST"))
            .and(path("/v2/checkout/orders"))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": "mock_order_id",
                "status": "CREATED",
                "links": [{ "href": "https://mock-approval-url.com", "rel": "approve" }]
            })))
            .mount(&self.gateway)
            .await;
    }

    async fn mock_order_status(&self, order_id: &str, status: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/v2/checkout/orders/{}", order_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": order_id,
                "status": status
            })))
            .mount(&self.gateway)
            .await;
    }

    async fn seed(&self, status: PaymentStatus, reference_id: Option<&str>) -> Payment {
        let mut payment = Payment::new(NewPayment {
            customer_name: "Test User".to_string(),
            customer_email: "test@example.com".to_string(),
            amount: dec!(100.00),
            currency: Currency::Usd,
        });
        payment.status = status;
        payment.reference_id = reference_id.map(str::to_string);
        self.store.insert(&payment).await.unwrap()
    }

    async fn stored(&self, id: uuid::Uuid) -> Payment {
        self.store.find_by_id(id).await.unwrap().unwrap()
    }
}

fn john_doe() -> Value {
    json!({
        "customer_name": "John Doe",
        "customer_email": "john@example.com",
        "amount": 50.00,
        "currency": "USD"
    })
}

#[tokio::test]
async fn test_create_payment() {
    let app = TestApp::spawn(IDLE_DELAY).await;
    app.mock_token().await;
    app.mock_create_order().await;

    let (status, body) = app.post_json("/v1/payments/", john_doe()).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(
        body["message"],
        "Payment initiated successfully. Redirect the customer to complete payment."
    );
    assert_eq!(body["redirect_url"], "https://mock-approval-url.com");
    assert_eq!(body["payment"]["customer_name"], "John Doe");
    assert_eq!(body["payment"]["customer_email"], "john@example.com");
    assert_eq!(body["payment"]["amount"], "50.00");
    assert_eq!(body["payment"]["currency"], "USD");
    assert_eq!(body["payment"]["status"], "processing");

    let display_id = body["payment"]["id"].as_str().unwrap();
    assert!(display_id.starts_with("PAY-"));
    assert_eq!(display_id.len(), 12);

    let stored = app.store.find_by_reference("mock_order_id").await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Processing);
    assert_eq!(stored.approval_url.as_deref(), Some("https://mock-approval-url.com"));
    assert!(stored.display_id() == display_id);
}

#[tokio::test]
async fn test_invalid_payment_data_creates_nothing() {
    let app = TestApp::spawn(IDLE_DELAY).await;

    let (status, body) = app
        .post_json(
            "/v1/payments/",
            json!({
                "customer_name": "John Doe",
                "amount": -50.00,
                "gateway": "invalid_gateway"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Invalid payment data");
    assert!(body["errors"]["customer_email"].is_array());
    assert_eq!(body["errors"]["amount"][0], "Amount must be greater than zero");
    assert!(app.store.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unsupported_currency_is_rejected() {
    let app = TestApp::spawn(IDLE_DELAY).await;

    let mut request = john_doe();
    request["currency"] = json!("JPY");
    let (status, body) = app.post_json("/v1/payments/", request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["errors"]["currency"][0],
        "Currency must be one of USD, EUR, GBP, CAD, AUD"
    );
    assert!(app.store.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_body_is_rejected() {
    let app = TestApp::spawn(IDLE_DELAY).await;

    let (status, body) = app
        .request(
            Request::builder()
                .method("POST")
                .uri("/v1/payments/")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(app.store.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_failure_marks_payment_failed() {
    let app = TestApp::spawn(IDLE_DELAY).await;
    Mock::given(method("POST"))
        .and(path("/v1/oauth2/token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client"
        })))
        .mount(&app.gateway)
        .await;

    let (status, body) = app.post_json("/v1/payments/", john_doe()).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], "error");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Payment processing failed:"));

    let all = app.store.find_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_get_nonexistent_payment() {
    let app = TestApp::spawn(IDLE_DELAY).await;

    let (status, body) = app
        .get(&format!("/v1/payments/{}/", uuid::Uuid::new_v4()))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({ "status": "error", "message": "Payment not found." }));

    let (status, _) = app.get("/v1/payments/not-a-uuid/").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_completed_payment_skips_gateway() {
    let app = TestApp::spawn(IDLE_DELAY).await;
    let payment = app.seed(PaymentStatus::Completed, Some("test-reference")).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "VOIDED" })))
        .expect(0)
        .mount(&app.gateway)
        .await;

    let (status, body) = app.get(&format!("/v1/payments/{}/", payment.id)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "Payment details retrieved successfully.");
    assert_eq!(body["payment"]["customer_name"], "Test User");
    assert_eq!(body["payment"]["status"], "completed");
}

#[tokio::test]
async fn test_read_reconciles_processing_payment() {
    let app = TestApp::spawn(IDLE_DELAY).await;
    app.mock_token().await;
    app.mock_order_status("ORDER-1", "COMPLETED").await;
    let payment = app.seed(PaymentStatus::Processing, Some("ORDER-1")).await;

    let (status, body) = app.get(&format!("/v1/payments/{}/", payment.id)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment"]["status"], "completed");
    let stored = app.stored(payment.id).await;
    assert_eq!(stored.status, PaymentStatus::Completed);
    assert_eq!(stored.gateway_response.unwrap()["status"], "COMPLETED");
}

#[tokio::test]
async fn test_read_keeps_status_when_verification_fails() {
    let app = TestApp::spawn(IDLE_DELAY).await;
    app.mock_token().await;
    Mock::given(method("GET"))
        .and(path("/v2/checkout/orders/ORDER-1"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&app.gateway)
        .await;
    let payment = app.seed(PaymentStatus::Processing, Some("ORDER-1")).await;

    let (status, body) = app.get(&format!("/v1/payments/{}/", payment.id)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["payment"]["status"], "processing");
    assert_eq!(app.stored(payment.id).await.version, payment.version);
}

#[tokio::test]
async fn test_list_payments() {
    let app = TestApp::spawn(IDLE_DELAY).await;
    let first = app.seed(PaymentStatus::Completed, Some("ORDER-1")).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = app.seed(PaymentStatus::Failed, None).await;

    let (status, body) = app.get("/v1/payments/all/").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["message"], "All payments retrieved successfully.");
    let payments = body["payments"].as_array().unwrap();
    assert_eq!(payments.len(), 2);
    assert_eq!(payments[0]["id"], second.id.to_string());
    assert_eq!(payments[1]["id"], first.id.to_string());
    assert!(payments[0]["created_at"].is_string());
}

#[tokio::test]
async fn test_success_callback_captures_payment() {
    let app = TestApp::spawn(IDLE_DELAY).await;
    app.mock_token().await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/ORDER-1/capture"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "status": "COMPLETED" })))
        .expect(1)
        .mount(&app.gateway)
        .await;
    let payment = app.seed(PaymentStatus::Processing, Some("ORDER-1")).await;

    let (status, body) = app.get("/v1/payments/paypal/success/?token=ORDER-1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "status": "success",
            "message": "Payment completed successfully.",
            "payment_id": payment.id.to_string()
        })
    );
    assert_eq!(app.stored(payment.id).await.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_success_callback_unknown_token() {
    let app = TestApp::spawn(IDLE_DELAY).await;

    let (status, body) = app.get("/v1/payments/paypal/success/?token=unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Payment not found.");
}

#[tokio::test]
async fn test_callbacks_require_token() {
    let app = TestApp::spawn(IDLE_DELAY).await;

    for uri in ["/v1/payments/paypal/success/", "/v1/payments/paypal/cancel/"] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No order ID provided.");
    }
}

#[tokio::test]
async fn test_capture_failure_leaves_payment_unchanged() {
    let app = TestApp::spawn(IDLE_DELAY).await;
    app.mock_token().await;
    Mock::given(method("POST"))
        .and(path("/v2/checkout/orders/ORDER-1/capture"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({
            "name": "UNPROCESSABLE_ENTITY"
        })))
        .mount(&app.gateway)
        .await;
    let payment = app.seed(PaymentStatus::Processing, Some("ORDER-1")).await;

    let (status, body) = app.get("/v1/payments/paypal/success/?token=ORDER-1").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Error completing payment.");
    assert_eq!(app.stored(payment.id).await.status, PaymentStatus::Processing);
}

#[tokio::test]
async fn test_cancel_callback_fails_payment() {
    let app = TestApp::spawn(IDLE_DELAY).await;
    let payment = app.seed(PaymentStatus::Processing, Some("ORDER-1")).await;

    let (status, body) = app.get("/v1/payments/paypal/cancel/?token=ORDER-1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
    assert_eq!(body["message"], "Payment was cancelled.");
    assert_eq!(body["payment_id"], payment.id.to_string());
    assert_eq!(app.stored(payment.id).await.status, PaymentStatus::Failed);
}

#[tokio::test]
async fn test_cancel_callback_does_not_regress_completed_payment() {
    let app = TestApp::spawn(IDLE_DELAY).await;
    let payment = app.seed(PaymentStatus::Completed, Some("ORDER-1")).await;

    let (status, body) = app.get("/v1/payments/paypal/cancel/?token=ORDER-1").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");
    assert_eq!(app.stored(payment.id).await.status, PaymentStatus::Completed);
}

#[tokio::test]
async fn test_background_reconciliation_completes_payment() {
    let app = TestApp::spawn(Duration::from_millis(50)).await;
    app.mock_token().await;
    app.mock_create_order().await;
    app.mock_order_status("mock_order_id", "COMPLETED").await;

    let (status, _) = app.post_json("/v1/payments/", john_doe()).await;
    assert_eq!(status, StatusCode::CREATED);

    let mut completed = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let stored = app
            .store
            .find_by_reference("mock_order_id")
            .await
            .unwrap()
            .unwrap();
        if stored.status == PaymentStatus::Completed {
            completed = true;
            break;
        }
    }
    assert!(completed, "scheduled check should complete the payment");
}

#[tokio::test]
async fn test_health_and_request_id() {
    let app = TestApp::spawn(IDLE_DELAY).await;

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["gateway"], "paypal");
    assert_eq!(body["environment"], "development");
    assert_eq!(body["gateway_configured"], true);
}
