use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use carpool_api::{app, AppState};
use carpool_core::identity::MockIdentityResolver;
use carpool_core::FixedClock;
use carpool_domain::{
    CancellationPolicy, Payment, Reservation, ReservationStatus, Trip, GENERIC_FAILURE_MESSAGE,
};
use carpool_lifecycle::mocks::Recorders;
use carpool_lifecycle::{InMemoryTripStore, LifecycleOrchestrator};
use carpool_shared::Masked;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const WEBHOOK_SECRET: &str = "whsec_test";

struct TestApp {
    router: Router,
    store: InMemoryTripStore,
    recorders: Recorders,
    trip: Trip,
}

impl TestApp {
    fn departing_in(hours: i64) -> Self {
        let now = Utc::now();
        let clock = Arc::new(FixedClock::new(now));
        let store = InMemoryTripStore::new();
        let recorders = Recorders::new();

        let trip = Trip::new(Uuid::new_v4(), now + Duration::hours(hours), 3, 10_000);
        store.insert_trip(trip.clone());

        let orchestrator = LifecycleOrchestrator::new(
            Arc::new(store.clone()),
            CancellationPolicy::default(),
            clock.clone(),
            recorders.dispatcher(clock),
        );
        let state = AppState {
            orchestrator: Arc::new(orchestrator),
            identity: Arc::new(MockIdentityResolver),
            webhook_secret: Masked(WEBHOOK_SECRET.to_string()),
        };

        Self {
            router: app(state),
            store,
            recorders,
            trip,
        }
    }

    fn seed(&self, status: ReservationStatus, seats: u32) -> Reservation {
        let mut reservation = Reservation::new_pending(&self.trip, Uuid::new_v4(), seats, 1_000, None, Utc::now());
        reservation.status = status;
        self.store.insert_reservation(reservation.clone());
        if status == ReservationStatus::Confirmed {
            self.store
                .insert_payment(Payment::completed_for(&reservation, None, Utc::now()));
        }
        reservation
    }

    async fn post(&self, uri: &str, caller: Option<Uuid>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("POST").uri(uri);
        if let Some(caller) = caller {
            builder = builder.header("Authorization", format!("Bearer {}", caller));
        }
        let body = match body {
            Some(body) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    async fn webhook(&self, secret: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/webhooks/payments")
            .header("Content-Type", "application/json")
            .header("x-webhook-secret", secret)
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::departing_in(24);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = app.send(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_missing_credentials_are_rejected() {
    let app = TestApp::departing_in(24);
    let (status, body) = app
        .post(&format!("/v1/trips/{}/cancel", app.trip.id), None, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "AUTHENTICATION_ERROR");
}

#[tokio::test]
async fn test_driver_cancels_trip_with_full_refund() {
    let app = TestApp::departing_in(72);
    let confirmed = app.seed(ReservationStatus::Confirmed, 1);

    let (status, body) = app
        .post(
            &format!("/v1/trips/{}/cancel", app.trip.id),
            Some(app.trip.driver_id),
            Some(json!({ "reason": "Problema mecánico" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_status"], "CANCELLED");
    assert_eq!(body["refund_processed"], true);
    assert_eq!(body["refund_percentage"], 100);
    assert_eq!(body["affected_passenger_count"], 1);
    assert_eq!(
        app.store.reservation(confirmed.id).unwrap().status,
        ReservationStatus::CancelledByDriver
    );
}

#[tokio::test]
async fn test_cancel_twice_is_a_conflict() {
    let app = TestApp::departing_in(72);
    let uri = format!("/v1/trips/{}/cancel", app.trip.id);

    let (first, _) = app.post(&uri, Some(app.trip.driver_id), None).await;
    assert_eq!(first, StatusCode::OK);

    let (second, body) = app.post(&uri, Some(app.trip.driver_id), None).await;
    assert_eq!(second, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "ALREADY_FINALIZED");
}

#[tokio::test]
async fn test_non_driver_gets_forbidden_and_unknown_trip_not_found() {
    let app = TestApp::departing_in(72);

    let (status, body) = app
        .post(&format!("/v1/trips/{}/cancel", app.trip.id), Some(Uuid::new_v4()), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "AUTHORIZATION_ERROR");

    let (status, body) = app
        .post(&format!("/v1/trips/{}/cancel", Uuid::new_v4()), Some(app.trip.driver_id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "NOT_FOUND");
}

#[tokio::test]
async fn test_passenger_cancel_splits_refund() {
    let app = TestApp::departing_in(30);
    let confirmed = app.seed(ReservationStatus::Confirmed, 1);

    let (status, body) = app
        .post(
            &format!("/v1/reservations/{}/cancel", confirmed.id),
            Some(confirmed.passenger_id),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_status"], "CANCELLED_BY_PASSENGER");
    assert_eq!(body["refund_percentage"], 90);
    assert_eq!(body["refund_amount_cents"], 9_000);
    assert_eq!(body["driver_compensation_cents"], 1_000);
    assert_eq!(app.recorders.payments.submitted().len(), 2);
}

#[tokio::test]
async fn test_lock_window_is_a_validation_error() {
    let app = TestApp::departing_in(0);
    let confirmed = app.seed(ReservationStatus::Confirmed, 1);

    let (status, body) = app
        .post(
            &format!("/v1/reservations/{}/cancel", confirmed.id),
            Some(confirmed.passenger_id),
            None,
        )
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().unwrap().contains("1 hora"));
}

#[tokio::test]
async fn test_request_approve_pay_flow() {
    let app = TestApp::departing_in(30);
    let passenger = Uuid::new_v4();

    let (status, body) = app
        .post(
            &format!("/v1/trips/{}/reservations", app.trip.id),
            Some(passenger),
            Some(json!({ "seats": 2, "message": "Salgo desde el centro" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["new_status"], "PENDING_APPROVAL");
    let reservation_id = body["reservation_id"].as_str().unwrap().to_string();

    let (status, body) = app
        .post(
            &format!("/v1/trips/{}/reservations/{}/approve", app.trip.id, reservation_id),
            Some(app.trip.driver_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_status"], "APPROVED");
    assert_eq!(body["remaining_seats"], 1);

    let payment = json!({
        "type": "payment.succeeded",
        "reservation_id": reservation_id,
        "reference": "pi_123"
    });

    let (status, _) = app.webhook("wrong", payment.clone()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.webhook(WEBHOOK_SECRET, payment.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["new_status"], "CONFIRMED");
    assert_eq!(body["changed"], true);

    let (status, body) = app.webhook(WEBHOOK_SECRET, payment).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changed"], false);
}

#[tokio::test]
async fn test_other_webhook_events_are_ignored() {
    let app = TestApp::departing_in(30);
    let approved = app.seed(ReservationStatus::Approved, 1);

    let (status, _) = app
        .webhook(
            WEBHOOK_SECRET,
            json!({ "type": "payment.failed", "reservation_id": approved.id }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(
        app.store.reservation(approved.id).unwrap().status,
        ReservationStatus::Approved
    );
}

#[tokio::test]
async fn test_approve_beyond_capacity_is_a_conflict() {
    let app = TestApp::departing_in(30);
    app.seed(ReservationStatus::Confirmed, 2);
    let pending = app.seed(ReservationStatus::PendingApproval, 2);

    let (status, body) = app
        .post(
            &format!("/v1/trips/{}/reservations/{}/approve", app.trip.id, pending.id),
            Some(app.trip.driver_id),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "CAPACITY_EXCEEDED");
}

#[tokio::test]
async fn test_store_failure_returns_generic_message() {
    let app = TestApp::departing_in(72);
    app.seed(ReservationStatus::Confirmed, 1);
    app.store.fail_next_commit();

    let (status, body) = app
        .post(&format!("/v1/trips/{}/cancel", app.trip.id), Some(app.trip.driver_id), None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["kind"], "INFRASTRUCTURE_ERROR");
    assert_eq!(body["error"], GENERIC_FAILURE_MESSAGE);
}

#[tokio::test]
async fn test_malformed_body_is_a_bad_request() {
    let app = TestApp::departing_in(30);
    let (status, body) = app
        .post(
            &format!("/v1/trips/{}/reservations", app.trip.id),
            Some(Uuid::new_v4()),
            Some(json!({ "seats": "two" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "VALIDATION_ERROR");
}
