//! Contribution Tests
//!
//! Covers contribution creation against requests and donations, the order
//! checks run in, pickup scheduling conflicts, and read access.

mod common;

use axum::http::StatusCode;
use common::{app, future_slot, pickup_body};
use serde_json::json;
use time::Duration;
use uuid::Uuid;

// ===========================================================================
// Creating contributions
// ===========================================================================

#[tokio::test]
async fn contribute_to_active_request() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let request_id = app.create_request(ngo.id, "FOOD", "ACTIVE").await;
    let at = future_slot(2);

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_id),
            pickup_body(25.0, at),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error_message());
    let body = resp.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "contribution submitted");
    let data = &body["data"];
    assert_eq!(data["status"], "PENDING");
    assert_eq!(data["requestId"], request_id.to_string());
    assert_eq!(data["donorId"], donor.id.to_string());
    assert_eq!(data["ngoId"], ngo.id.to_string());
    assert_eq!(data["quantityOrAmount"], 25.0);
    assert_eq!(data["pickupLocation"], "14 Lake Road, Pune");
}

#[tokio::test]
async fn fund_request_needs_no_pickup() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let request_id = app.create_request(ngo.id, "FUNDS", "ACTIVE").await;

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_id),
            json!({ "amount": 1500 }),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error_message());
    assert!(resp.data()["pickupAt"].is_null());
}

#[tokio::test]
async fn second_contribution_to_same_request_conflicts() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let request_id = app.create_request(ngo.id, "CLOTHES", "ACTIVE").await;

    app.contribute_to_request(&donor, request_id, future_slot(3))
        .await;

    // A distant slot so the duplicate check, not the schedule, decides.
    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_id),
            pickup_body(5.0, future_slot(9)),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(
        resp.error_message(),
        "you have already contributed to this donation request"
    );
}

#[tokio::test]
async fn closed_request_rejects_contributions() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let request_id = app.create_request(ngo.id, "FOOD", "CLOSED").await;

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_id),
            pickup_body(5.0, future_slot(2)),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.error_message(),
        "donation request is closed and no longer accepts contributions"
    );
}

#[tokio::test]
async fn closed_request_is_reported_before_field_errors() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let request_id = app.create_request(ngo.id, "FOOD", "CLOSED").await;

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_id),
            json!({}),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(resp.error_message().contains("closed"));
}

#[tokio::test]
async fn unknown_request_is_not_found() {
    let app = app().await;
    let donor = app.create_donor().await;

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", Uuid::new_v4()),
            pickup_body(5.0, future_slot(2)),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "donation request not found");
}

#[tokio::test]
async fn missing_fields_are_listed() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let request_id = app.create_request(ngo.id, "FOOD", "ACTIVE").await;

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_id),
            json!({ "quantityOrAmount": 3, "pickupLocation": "Gate 2" }),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.error_message(),
        "missing required fields: pickupDate, pickupTime"
    );
}

#[tokio::test]
async fn non_positive_quantity_is_rejected() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let request_id = app.create_request(ngo.id, "FOOD", "ACTIVE").await;

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_id),
            pickup_body(0.0, future_slot(2)),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.error_message(),
        "quantityOrAmount must be a positive number"
    );
}

#[tokio::test]
async fn past_pickup_is_rejected() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let request_id = app.create_request(ngo.id, "FOOD", "ACTIVE").await;

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_id),
            pickup_body(5.0, future_slot(-1)),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "pickup time must be in the future");
}

#[tokio::test]
async fn malformed_pickup_date_is_rejected() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let request_id = app.create_request(ngo.id, "FOOD", "ACTIVE").await;

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_id),
            json!({
                "quantityOrAmount": 5,
                "pickupLocation": "Gate 2",
                "pickupDate": "next tuesday",
                "pickupTime": "10:00"
            }),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "invalid pickup date or time");
}

#[tokio::test]
async fn ngo_cannot_contribute() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let request_id = app.create_request(ngo.id, "FOOD", "ACTIVE").await;

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_id),
            pickup_body(5.0, future_slot(2)),
            ngo.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

// ===========================================================================
// Pickup scheduling conflicts
// ===========================================================================

#[tokio::test]
async fn ngo_slot_within_window_conflicts() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let first = app.create_donor().await;
    let second = app.create_donor().await;
    let request_a = app.create_request(ngo.id, "FOOD", "ACTIVE").await;
    let request_b = app.create_request(ngo.id, "BOOKS", "ACTIVE").await;
    let at = future_slot(4);

    app.contribute_to_request(&first, request_a, at).await;

    // Exactly on the boundary still conflicts.
    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_b),
            pickup_body(5.0, at + Duration::minutes(60)),
            second.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(
        resp.error_message(),
        "the NGO already has a pickup scheduled within 60 minutes of this time; please choose another slot"
    );
}

#[tokio::test]
async fn ngo_slot_just_outside_window_is_free() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let first = app.create_donor().await;
    let second = app.create_donor().await;
    let request_a = app.create_request(ngo.id, "FOOD", "ACTIVE").await;
    let request_b = app.create_request(ngo.id, "BOOKS", "ACTIVE").await;
    let at = future_slot(4);

    app.contribute_to_request(&first, request_a, at).await;

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_b),
            pickup_body(5.0, at - Duration::minutes(61)),
            second.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error_message());
}

#[tokio::test]
async fn donor_slot_conflicts_across_ngos() {
    let app = app().await;
    let ngo_a = app.create_ngo().await;
    let ngo_b = app.create_ngo().await;
    let donor = app.create_donor().await;
    let request_a = app.create_request(ngo_a.id, "FOOD", "ACTIVE").await;
    let donation_b = app.create_donation(ngo_b.id, "CLOTHES", "PENDING").await;
    let at = future_slot(5);

    app.contribute_to_request(&donor, request_a, at).await;

    let resp = app
        .post_json(
            &format!("/donations/{}/contribute", donation_b),
            pickup_body(2.0, at + Duration::minutes(30)),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert!(resp.error_message().starts_with("you already have a pickup"));
}

#[tokio::test]
async fn resolved_contribution_frees_the_slot() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let first = app.create_donor().await;
    let second = app.create_donor().await;
    let request_a = app.create_request(ngo.id, "FOOD", "ACTIVE").await;
    let request_b = app.create_request(ngo.id, "BOOKS", "ACTIVE").await;
    let at = future_slot(6);

    let held = app.contribute_to_request(&first, request_a, at).await;
    let resp = app
        .put_json(
            &format!("/ngo/donations/{}/status", held),
            json!({ "status": "ACCEPTED" }),
            ngo.token(),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = app
        .post_json(
            &format!("/donation-requests/{}/contribute", request_b),
            pickup_body(5.0, at),
            second.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error_message());
}

// ===========================================================================
// Contributions against donations
// ===========================================================================

#[tokio::test]
async fn pickup_contribution_starts_scheduled() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let donation_id = app.create_donation(ngo.id, "FOOD", "PENDING").await;

    let resp = app
        .post_json(
            &format!("/donations/{}/contribute", donation_id),
            pickup_body(8.0, future_slot(2)),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error_message());
    let data = resp.data();
    assert_eq!(data["status"], "PENDING");
    assert_eq!(data["pickupStatus"], "SCHEDULED");
    assert_eq!(data["donationId"], donation_id.to_string());
}

#[tokio::test]
async fn cancelled_donation_rejects_contributions() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let donation_id = app.create_donation(ngo.id, "FOOD", "CANCELLED").await;

    let resp = app
        .post_json(
            &format!("/donations/{}/contribute", donation_id),
            pickup_body(8.0, future_slot(2)),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(
        resp.error_message(),
        "donation is CANCELLED and no longer accepts contributions"
    );
}

#[tokio::test]
async fn unknown_donation_is_not_found() {
    let app = app().await;
    let donor = app.create_donor().await;

    let resp = app
        .post_json(
            &format!("/donations/{}/contribute", Uuid::new_v4()),
            pickup_body(8.0, future_slot(2)),
            donor.token(),
        )
        .await;

    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.error_message(), "donation not found");
}

// ===========================================================================
// Reading contributions
// ===========================================================================

#[tokio::test]
async fn donor_reads_own_contribution_but_not_others() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let stranger = app.create_donor().await;
    let request_id = app.create_request(ngo.id, "FOOD", "ACTIVE").await;
    let id = app
        .contribute_to_request(&donor, request_id, future_slot(2))
        .await;

    let resp = app.get(&format!("/contributions/{}", id), donor.token()).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.data()["variant"], "request");
    assert_eq!(resp.data()["id"], id.to_string());

    let resp = app
        .get(&format!("/contributions/{}", id), stranger.token())
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app.get(&format!("/contributions/{}", id), ngo.token()).await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn donor_and_ngo_lists_are_scoped() {
    let app = app().await;
    let ngo = app.create_ngo().await;
    let other_ngo = app.create_ngo().await;
    let donor = app.create_donor().await;
    let request_id = app.create_request(ngo.id, "FOOD", "ACTIVE").await;
    let donation_id = app.create_donation(ngo.id, "BOOKS", "PENDING").await;

    app.contribute_to_request(&donor, request_id, future_slot(2))
        .await;
    let resp = app
        .post_json(
            &format!("/donations/{}/contribute", donation_id),
            pickup_body(1.0, future_slot(3)),
            donor.token(),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.error_message());

    let mine = app.get("/donor/contributions", donor.token()).await;
    assert_eq!(mine.status, StatusCode::OK);
    let items = mine.data();
    assert_eq!(items.as_array().unwrap().len(), 2);
    // Newest first
    assert_eq!(items[0]["variant"], "pickup");
    assert_eq!(items[1]["variant"], "request");

    let theirs = app.get("/ngo/contributions", ngo.token()).await;
    assert_eq!(theirs.data().as_array().unwrap().len(), 2);

    let unrelated = app.get("/ngo/contributions", other_ngo.token()).await;
    assert!(unrelated.data().as_array().unwrap().is_empty());
}

#[tokio::test]
async fn list_limit_out_of_range() {
    let app = app().await;
    let donor = app.create_donor().await;

    let resp = app
        .get("/donor/contributions?limit=500", donor.token())
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.error_message(), "limit must be between 1 and 200");
}

#[tokio::test]
async fn malformed_id_answers_with_the_error_envelope() {
    let app = app().await;
    let donor = app.create_donor().await;

    let resp = app.get("/contributions/not-a-uuid", donor.token()).await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json()["success"], false);
    assert!(resp.error_message().starts_with("invalid path"));
}

#[tokio::test]
async fn malformed_query_answers_with_the_error_envelope() {
    let app = app().await;
    let donor = app.create_donor().await;

    let resp = app
        .get("/donor/contributions?limit=many", donor.token())
        .await;

    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json()["success"], false);
    assert!(resp.error_message().starts_with("invalid query"));
}
