use reqwest::StatusCode;

use serde_json::Value;

use uuid::Uuid;

use wiremock::matchers::*;
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::{RegistrationForm, TestApp};

async fn accept_emails(app: &TestApp) {
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&app.email_server)
        .await;
}

#[tokio::test]
async fn offering_snapshot_reports_remaining_spots() {
    let app = TestApp::spawn().await;
    let offering_id = app.create_offering(Some(12)).await;

    let res = app.offering_fetch(&offering_id).await.expect("Failed to execute request");

    assert_eq!(StatusCode::OK, res.status());
    let body: Value = res.json().await.unwrap();
    assert_eq!(12, body["spots_remaining"]);
    assert_eq!(0, body["registered"]);
    assert_eq!("camp", body["kind"]);
}

#[tokio::test]
async fn unknown_offering_is_not_found() {
    let app = TestApp::spawn().await;
    let offering_id = Uuid::new_v4().to_string();

    let fetched = app.offering_fetch(&offering_id).await.unwrap();
    let registered = app
        .register(&offering_id, &RegistrationForm::for_participants(&["Lena"]))
        .await
        .unwrap();

    assert_eq!(StatusCode::NOT_FOUND, fetched.status());
    assert_eq!(StatusCode::NOT_FOUND, registered.status());
}

#[tokio::test]
async fn registration_that_fits_is_confirmed_and_mailed() {
    let app = TestApp::spawn().await;
    let offering_id = app.create_offering(Some(2)).await;

    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let res = app
        .register(&offering_id, &RegistrationForm::for_participants(&["Lena", "Tom"]))
        .await
        .expect("Failed to execute request");

    assert_eq!(StatusCode::CREATED, res.status());
    let body: Value = res.json().await.unwrap();
    assert_eq!("confirmed", body["disposition"]);
    assert_eq!(0, body["offering"]["spots_remaining"]);
    assert_eq!(2, body["entries"].as_array().unwrap().len());
    assert_eq!("not_requested", body["coupon"]["status"]);

    // One withdrawal link per participant
    assert_eq!(2, app.email_links().await.len());
}

#[tokio::test]
async fn registration_for_full_offering_is_waitlisted() {
    let app = TestApp::spawn().await;
    accept_emails(&app).await;
    let offering_id = app.create_offering(Some(2)).await;
    app.register(&offering_id, &RegistrationForm::for_participants(&["Lena", "Tom"]))
        .await
        .unwrap();

    let res = app
        .register(&offering_id, &RegistrationForm::for_participants(&["Max"]))
        .await
        .unwrap();

    assert_eq!(StatusCode::CREATED, res.status());
    let body: Value = res.json().await.unwrap();
    assert_eq!("waitlisted", body["disposition"]);
    assert_eq!(2, body["offering"]["registered"]);
    assert_eq!(1, body["offering"]["waitlisted"]);
}

#[tokio::test]
async fn explicit_waitlist_join_is_accepted_with_free_spots() {
    let app = TestApp::spawn().await;
    accept_emails(&app).await;
    let offering_id = app.create_offering(Some(10)).await;

    let res = app
        .join_waitlist(&offering_id, &RegistrationForm::for_participants(&["Lena"]))
        .await
        .unwrap();

    assert_eq!(StatusCode::CREATED, res.status());
    let body: Value = res.json().await.unwrap();
    assert_eq!("waitlisted", body["disposition"]);
    assert_eq!(10, body["offering"]["spots_remaining"]);
}

#[tokio::test]
async fn malformed_registrations_are_rejected() {
    let app = TestApp::spawn().await;
    let offering_id = app.create_offering(None).await;

    let mut unknown_role = RegistrationForm::for_participants(&["Lena"]);
    unknown_role.participants[0].role = "coach".into();
    let mut bad_email = RegistrationForm::for_participants(&["Lena"]);
    bad_email.contact.email = "not-an-email".into();
    let mut bad_date = RegistrationForm::for_participants(&["Lena"]);
    bad_date.participants[0].birth_date = "08.03.2014".into();

    let test_cases = vec![
        ("no participants", RegistrationForm::for_participants(&[])),
        ("unknown role", unknown_role),
        ("invalid contact email", bad_email),
        ("invalid birth date", bad_date),
    ];
    for (desc, form) in test_cases {
        let res = app.register(&offering_id, &form).await.unwrap();

        assert_eq!(StatusCode::BAD_REQUEST, res.status(), "{}", desc);
    }

    let body: Value = app.offering_fetch(&offering_id).await.unwrap().json().await.unwrap();
    assert_eq!(0, body["registered"]);
}

#[tokio::test]
async fn registration_after_deadline_is_a_conflict() {
    let app = TestApp::spawn().await;
    let res = app
        .offering_create(
            Some(&app.admin),
            &serde_json::json!({
                "name": "Spring Bootcamp",
                "kind": "bootcamp",
                "capacity": 10,
                "registration_deadline": "2020-01-01T00:00:00Z",
            }),
        )
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    let offering_id = body["id"].as_str().unwrap();

    let res = app
        .register(offering_id, &RegistrationForm::for_participants(&["Lena"]))
        .await
        .unwrap();

    assert_eq!(StatusCode::CONFLICT, res.status());
}

#[tokio::test]
async fn failed_email_does_not_fail_the_registration() {
    let app = TestApp::spawn().await;
    let offering_id = app.create_offering(Some(5)).await;

    Mock::given(any())
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&app.email_server)
        .await;

    let res = app
        .register(&offering_id, &RegistrationForm::for_participants(&["Lena"]))
        .await
        .unwrap();

    assert_eq!(StatusCode::CREATED, res.status());
    let body: Value = app.offering_fetch(&offering_id).await.unwrap().json().await.unwrap();
    assert_eq!(1, body["registered"]);
}

#[tokio::test]
async fn repeated_idempotency_key_registers_once() {
    let app = TestApp::spawn().await;
    accept_emails(&app).await;
    let offering_id = app.create_offering(Some(5)).await;
    let form = RegistrationForm::for_participants(&["Lena"]);
    let key = Uuid::new_v4().to_string();

    let mut entry_ids = Vec::new();
    for _ in 0..2 {
        let res = app.register_with_key(&offering_id, &form, &key).await.unwrap();
        assert_eq!(StatusCode::CREATED, res.status());
        let body: Value = res.json().await.unwrap();
        entry_ids.push(body["entries"][0]["id"].clone());
    }

    assert_eq!(entry_ids[0], entry_ids[1]);
    let body: Value = app.offering_fetch(&offering_id).await.unwrap().json().await.unwrap();
    assert_eq!(1, body["registered"]);
}

#[tokio::test]
async fn malformed_idempotency_key_is_rejected() {
    let app = TestApp::spawn().await;
    let offering_id = app.create_offering(Some(5)).await;

    let form = RegistrationForm::for_participants(&["Lena"]);

    let res = app
        .register_with_key(&offering_id, &form, "attempt-1")
        .await
        .unwrap();

    assert_eq!(StatusCode::BAD_REQUEST, res.status());
}

#[tokio::test]
async fn withdrawal_link_frees_the_spot_for_the_waitlist() {
    let app = TestApp::spawn().await;
    accept_emails(&app).await;
    let offering_id = app.create_offering(Some(1)).await;

    app.register(&offering_id, &RegistrationForm::for_participants(&["Lena"]))
        .await
        .unwrap();
    let withdrawal_link = app.email_links().await.remove(0);
    let res = app
        .register(&offering_id, &RegistrationForm::for_participants(&["Tom"]))
        .await
        .unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!("waitlisted", body["disposition"]);

    // Following the link only shows what would be withdrawn
    let res = app.client.get(withdrawal_link.clone()).send().await.unwrap();
    assert_eq!(StatusCode::OK, res.status());
    let body: Value = res.json().await.unwrap();
    assert_eq!("Lena", body["entry"]["participant_name"]);
    assert_eq!("registered", body["placement"]);
    let body: Value = app.offering_fetch(&offering_id).await.unwrap().json().await.unwrap();
    assert_eq!(1, body["registered"]);
    assert_eq!(1, body["waitlisted"]);

    let res = app.client.post(withdrawal_link).send().await.unwrap();

    assert_eq!(StatusCode::OK, res.status());
    let body: Value = res.json().await.unwrap();
    assert_eq!("Lena", body["withdrawn"]["participant_name"]);
    assert_eq!("Tom", body["promoted"][0]["participant_name"]);
    assert_eq!(1, body["offering"]["registered"]);
    assert_eq!(0, body["offering"]["waitlisted"]);

    // Confirmation for Lena, waitlist notice for Tom, promotion mail for Tom
    let sent = app.email_server.received_requests().await.unwrap();
    assert_eq!(3, sent.len());
}

#[tokio::test]
async fn tampered_withdrawal_token_is_unauthorized() {
    let app = TestApp::spawn().await;
    accept_emails(&app).await;
    let offering_id = app.create_offering(Some(1)).await;
    app.register(&offering_id, &RegistrationForm::for_participants(&["Lena"]))
        .await
        .unwrap();
    let mut withdrawal_link = app.email_links().await.remove(0);
    let tampered = format!("{}x", withdrawal_link.path());
    withdrawal_link.set_path(&tampered);

    let shown = app.client.get(withdrawal_link.clone()).send().await.unwrap();
    let confirmed = app.client.post(withdrawal_link).send().await.unwrap();

    assert_eq!(StatusCode::UNAUTHORIZED, shown.status());
    assert_eq!(StatusCode::UNAUTHORIZED, confirmed.status());
    let body: Value = app.offering_fetch(&offering_id).await.unwrap().json().await.unwrap();
    assert_eq!(1, body["registered"]);
}

#[tokio::test]
async fn coupon_is_applied_once_per_family() {
    let app = TestApp::spawn().await;
    accept_emails(&app).await;
    let offering_id = app.create_offering(None).await;
    let res = app
        .coupon_create(
            Some(&app.admin),
            &serde_json::json!({
                "code": "siblings",
                "discount_type": "fixed",
                "discount_value": 2000,
                "max_usage": 10,
            }),
        )
        .await
        .unwrap();
    assert_eq!(StatusCode::CREATED, res.status());
    let coupon: Value = res.json().await.unwrap();
    let coupon_id: Uuid = coupon["id"].as_str().unwrap().parse().unwrap();

    let mut form = RegistrationForm::for_participants(&["Lena"]);
    form.coupon_id = Some(coupon_id);
    let first: Value = app.register(&offering_id, &form).await.unwrap().json().await.unwrap();
    form.participants[0].name = "Tom".into();
    let second: Value = app.register(&offering_id, &form).await.unwrap().json().await.unwrap();

    assert_eq!("applied", first["coupon"]["status"]);
    assert_eq!("rejected", second["coupon"]["status"]);
    assert_eq!("confirmed", second["disposition"]);

    let res = app.coupon_fetch("SIBLINGS?total_price=12000").await.unwrap();
    assert_eq!(StatusCode::OK, res.status());
    let coupon: Value = res.json().await.unwrap();
    assert_eq!(1, coupon["usage_count"]);
    assert_eq!(10000, coupon["discounted_price"]);
}

#[tokio::test]
async fn unknown_coupons_are_not_found() {
    let app = TestApp::spawn().await;

    let missing = app.coupon_fetch("NOPE2024").await.unwrap();
    let malformed = app.coupon_fetch("a").await.unwrap();

    assert_eq!(StatusCode::NOT_FOUND, missing.status());
    assert_eq!(StatusCode::BAD_REQUEST, malformed.status());
}
