use reqwest::StatusCode;

use serde_json::Value;

use wiremock::matchers::*;
use wiremock::{Mock, ResponseTemplate};

use crate::helpers::{Credentials, RegistrationForm, TestApp};

fn camp() -> Value {
    serde_json::json!({
        "name": "Autumn Camp",
        "kind": "camp",
        "capacity": 20,
        "registration_deadline": null,
    })
}

fn coupon(code: &str, discount_type: &str, discount_value: u64) -> Value {
    serde_json::json!({
        "code": code,
        "discount_type": discount_type,
        "discount_value": discount_value,
        "max_usage": null,
    })
}

#[tokio::test]
async fn requests_without_valid_credentials_are_rejected() {
    let app = TestApp::spawn().await;
    let wrong_password = Credentials {
        username: app.admin.username.clone(),
        password: "guess".into(),
    };
    let wrong_username = Credentials {
        username: "root".into(),
        password: app.admin.password.clone(),
    };

    let test_cases = vec![
        ("Missing credentials", None),
        ("Wrong password", Some(&wrong_password)),
        ("Wrong username", Some(&wrong_username)),
    ];
    for (desc, credentials) in test_cases {
        let res = app.offering_create(credentials, &camp()).await.unwrap();

        assert_eq!(StatusCode::UNAUTHORIZED, res.status(), "{}", desc);
    }
}

#[tokio::test]
async fn administrator_can_create_offerings() {
    let app = TestApp::spawn().await;

    let res = app.offering_create(Some(&app.admin), &camp()).await.unwrap();

    assert_eq!(StatusCode::CREATED, res.status());
    let body: Value = res.json().await.unwrap();
    assert_eq!("Autumn Camp", body["name"]);
    assert_eq!(20, body["spots_remaining"]);
}

#[tokio::test]
async fn invalid_offerings_and_coupons_are_rejected() {
    let app = TestApp::spawn().await;

    let offering = |name: &str, kind: &str, capacity: i64| {
        serde_json::json!({
            "name": name,
            "kind": kind,
            "capacity": capacity,
            "registration_deadline": null,
        })
    };
    let offering_cases = vec![
        ("Blank name", offering(" ", "camp", 5)),
        ("Unknown kind", offering("Retreat", "retreat", 5)),
        ("Negative capacity", offering("Camp", "camp", -1)),
    ];
    for (desc, body) in offering_cases {
        let res = app.offering_create(Some(&app.admin), &body).await.unwrap();
        assert_eq!(StatusCode::BAD_REQUEST, res.status(), "{}", desc);
    }

    let coupon_cases = vec![
        ("Short code", coupon("A", "fixed", 500)),
        ("Unknown type", coupon("FREE", "gift", 500)),
        ("Percentage over 100", coupon("FREE", "percentage", 101)),
    ];
    for (desc, body) in coupon_cases {
        let res = app.coupon_create(Some(&app.admin), &body).await.unwrap();
        assert_eq!(StatusCode::BAD_REQUEST, res.status(), "{}", desc);
    }
}

#[tokio::test]
async fn duplicate_coupon_code_is_a_conflict() {
    let app = TestApp::spawn().await;

    let res = app
        .coupon_create(Some(&app.admin), &coupon("EASTER10", "percentage", 10))
        .await
        .unwrap();
    assert_eq!(StatusCode::CREATED, res.status());

    let res = app
        .coupon_create(Some(&app.admin), &coupon("easter10", "fixed", 500))
        .await
        .unwrap();
    assert_eq!(StatusCode::CONFLICT, res.status());
}

#[tokio::test]
async fn promotion_moves_waitlist_head_and_notifies() {
    let app = TestApp::spawn().await;
    let offering_id = app.create_offering(Some(1)).await;

    // Waitlist notices for both families, then the promotion mail
    Mock::given(path("/email"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(3)
        .mount(&app.email_server)
        .await;

    app.join_waitlist(&offering_id, &RegistrationForm::for_participants(&["Lena"]))
        .await
        .unwrap();
    app.join_waitlist(&offering_id, &RegistrationForm::for_participants(&["Tom"]))
        .await
        .unwrap();

    let res = app.promote(Some(&app.admin), &offering_id, 2).await.unwrap();

    assert_eq!(StatusCode::OK, res.status());
    let body: Value = res.json().await.unwrap();
    // Clamped to the single free spot
    assert_eq!(1, body["promoted"].as_array().unwrap().len());
    assert_eq!("Lena", body["promoted"][0]["participant_name"]);
    assert_eq!(1, body["offering"]["registered"]);
    assert_eq!(1, body["offering"]["waitlisted"]);
}

#[tokio::test]
async fn promotion_requires_credentials() {
    let app = TestApp::spawn().await;
    let offering_id = app.create_offering(Some(1)).await;

    let res = app.promote(None, &offering_id, 1).await.unwrap();

    assert_eq!(StatusCode::UNAUTHORIZED, res.status());
}
