use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Response};

use secrecy::Secret;

use serde::Serialize;

use serde_json::Value;

use url::Url;

use uuid::Uuid;

use wiremock::MockServer;

use clubcamps::app;
use clubcamps::auth::AdminCredentials;
use clubcamps::client::EmailClient;
use clubcamps::crypto::SigningKey;
use clubcamps::notification::{EmailNotifier, NotificationDispatcher};
use clubcamps::registration::RegistrationService;
use clubcamps::repo::InMemoryStore;
use clubcamps::settings::RegistrationSettings;

#[derive(Debug, Clone, Serialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantForm {
    pub name: String,
    pub birth_date: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegistrationForm {
    pub user_id: Uuid,
    pub club_id: Option<Uuid>,
    pub contact: ContactForm,
    pub participants: Vec<ParticipantForm>,
    pub total_price: u64,
    pub coupon_id: Option<Uuid>,
}

impl RegistrationForm {
    /// Registration of the named children by a fresh parent account
    pub fn for_participants(names: &[&str]) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            club_id: None,
            contact: ContactForm {
                name: "Jana Weber".into(),
                email: "jana@example.com".into(),
            },
            participants: names
                .iter()
                .map(|name| ParticipantForm {
                    name: name.to_string(),
                    birth_date: "2014-03-08".into(),
                    role: "member".into(),
                })
                .collect(),
            total_price: 12000 * names.len() as u64,
            coupon_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

pub struct TestApp {
    addr: String,

    pub client: Client,
    pub email_server: MockServer,
    pub admin: Credentials,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to listen on random port");
        let port = listener.local_addr().unwrap().port();

        let addr = format!("http://127.0.0.1:{}", port);

        let signing_key = {
            use rand::{distributions::Alphanumeric, Rng};

            let rand_key: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(16)
                .map(char::from)
                .collect();

            SigningKey::new(&Secret::new(rand_key)).expect("Failed to create crypto signing key")
        };

        let email_server = MockServer::start().await;

        let email_client = {
            let sender = "camps@club.example.com"
                .parse()
                .expect("Failed to parse sender email address");
            let api_base_url =
                Url::parse(&email_server.uri()).expect("Failed to parse mock server uri");
            let api_auth_token = Secret::new("TestAuthorization".to_string());
            let api_timeout = Duration::from_secs(2);

            EmailClient::new(sender, api_timeout, api_base_url, api_auth_token.into())
                .expect("Failed to create email client")
        };

        let settings = RegistrationSettings::default();
        let notifier = EmailNotifier::new(
            email_client,
            signing_key.clone(),
            Url::parse(&addr).expect("Failed to parse app address"),
            settings.withdrawal_token_ttl(),
        );
        let dispatcher = NotificationDispatcher::new(Arc::new(notifier));
        let service = RegistrationService::new(Arc::new(InMemoryStore::new()), &settings);

        let admin = Credentials {
            username: "admin".into(),
            password: Uuid::new_v4().to_string(),
        };
        let admin_credentials =
            AdminCredentials::new(admin.username.clone(), hash_password(&admin.password));

        let server = app::run(listener, service, dispatcher, signing_key, admin_credentials)
            .expect("Failed to spawn app instance");
        let _ = tokio::spawn(server);

        let client = Client::new();

        Self {
            addr,
            client,
            email_server,
            admin,
        }
    }

    pub fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", &self.addr, url);
        self.client.request(method, url)
    }

    pub fn authorized_request(
        &self,
        method: Method,
        url: &str,
        credentials: Option<&Credentials>,
    ) -> reqwest::RequestBuilder {
        let req = self.request(method, url);
        if let Some(creds) = credentials {
            req.basic_auth(creds.username.clone(), Some(creds.password.clone()))
        } else {
            req
        }
    }

    pub async fn health_check(&self) -> reqwest::Result<Response> {
        self.request(Method::GET, "health_check").send().await
    }

    pub async fn offering_create(
        &self,
        credentials: Option<&Credentials>,
        body: &Value,
    ) -> reqwest::Result<Response> {
        self.authorized_request(Method::POST, "admin/offerings", credentials)
            .json(body)
            .send()
            .await
    }

    pub async fn coupon_create(
        &self,
        credentials: Option<&Credentials>,
        body: &Value,
    ) -> reqwest::Result<Response> {
        self.authorized_request(Method::POST, "admin/coupons", credentials)
            .json(body)
            .send()
            .await
    }

    pub async fn promote(
        &self,
        credentials: Option<&Credentials>,
        offering_id: &str,
        freed_spots: u32,
    ) -> reqwest::Result<Response> {
        self.authorized_request(
            Method::POST,
            &format!("admin/offerings/{}/promotions", offering_id),
            credentials,
        )
        .json(&serde_json::json!({ "freed_spots": freed_spots }))
        .send()
        .await
    }

    pub async fn offering_fetch(&self, offering_id: &str) -> reqwest::Result<Response> {
        self.request(Method::GET, &format!("offerings/{}", offering_id))
            .send()
            .await
    }

    pub async fn register(
        &self,
        offering_id: &str,
        form: &RegistrationForm,
    ) -> reqwest::Result<Response> {
        self.request(Method::POST, &format!("offerings/{}/registrations", offering_id))
            .json(form)
            .send()
            .await
    }

    pub async fn register_with_key(
        &self,
        offering_id: &str,
        form: &RegistrationForm,
        idempotency_key: &str,
    ) -> reqwest::Result<Response> {
        self.request(Method::POST, &format!("offerings/{}/registrations", offering_id))
            .header("Idempotency-Key", idempotency_key)
            .json(form)
            .send()
            .await
    }

    pub async fn join_waitlist(
        &self,
        offering_id: &str,
        form: &RegistrationForm,
    ) -> reqwest::Result<Response> {
        self.request(Method::POST, &format!("offerings/{}/waitlist", offering_id))
            .json(form)
            .send()
            .await
    }

    pub async fn coupon_fetch(&self, code: &str) -> reqwest::Result<Response> {
        self.request(Method::GET, &format!("coupons/{}", code))
            .send()
            .await
    }

    /// Create an offering as administrator, returning its id
    pub async fn create_offering(&self, capacity: Option<u32>) -> String {
        let res = self
            .offering_create(
                Some(&self.admin),
                &serde_json::json!({
                    "name": "Summer Camp",
                    "kind": "camp",
                    "capacity": capacity,
                    "registration_deadline": null,
                }),
            )
            .await
            .expect("Failed to execute request");
        assert_eq!(reqwest::StatusCode::CREATED, res.status());

        let body: Value = res.json().await.expect("Failed to parse offering");
        body["id"].as_str().expect("Offering has no id").to_string()
    }

    /// Links found in the text body of every email sent so far
    pub async fn email_links(&self) -> Vec<Url> {
        let requests = self
            .email_server
            .received_requests()
            .await
            .expect("Request recording disabled");

        requests
            .iter()
            .flat_map(|request| {
                let body: Value =
                    serde_json::from_slice(&request.body).expect("Failed to parse email body");
                let text = body["TextBody"].as_str().unwrap_or_default().to_string();

                linkify::LinkFinder::new()
                    .links(&text)
                    .filter(|link| *link.kind() == linkify::LinkKind::Url)
                    .map(|link| Url::parse(link.as_str()).expect("Failed to parse link"))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

fn hash_password(password: &str) -> Secret<String> {
    use argon2::password_hash::SaltString;
    use argon2::{Argon2, PasswordHasher};

    let salt = SaltString::generate(&mut rand::thread_rng());

    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .expect("Failed to hash admin password")
        .to_string();

    Secret::new(password_hash)
}
