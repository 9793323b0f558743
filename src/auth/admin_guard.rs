use std::future::Future;
use std::pin::Pin;

use actix_web::{dev, web, FromRequest, HttpRequest};

use argon2::{Argon2, PasswordHash, PasswordVerifier};

use anyhow::Context;

use secrecy::{ExposeSecret, Secret};

use crate::auth::Credentials;
use crate::error::{RestError, RestResult};
use crate::telemetry::spawn_blocking_with_tracing;

/// The configured administrator account
#[derive(Debug, Clone)]
pub struct AdminCredentials {
    username: String,
    password_hash: Secret<String>,
}

impl AdminCredentials {
    pub fn new(username: String, password_hash: Secret<String>) -> Self {
        Self {
            username,
            password_hash,
        }
    }
}

/// Request guard for the administrative endpoints
#[derive(Debug)]
pub struct Administrator {
    pub username: String,
}

impl FromRequest for Administrator {
    type Error = RestError;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _: &mut dev::Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            // NOTE: Must be registered with the application at startup
            let admin = req
                .app_data::<web::Data<AdminCredentials>>()
                .context("Administrator credentials not registered for application")?
                .get_ref()
                .clone();
            // Pull the credentials from the headers
            let creds = Credentials::from_headers(req.headers())
                .map_err(RestError::FailedToAuthenticate)?;

            validate_credentials(admin, creds).await
        })
    }
}

#[tracing::instrument(
    "Validate credentials",
    skip(admin, credentials),
    fields(username = %credentials.username)
)]
async fn validate_credentials(
    admin: AdminCredentials,
    credentials: Credentials,
) -> RestResult<Administrator> {
    // The hash is checked for unknown usernames too, so response time does not depend on them
    let password = credentials.password;
    let password_hash = admin.password_hash;
    spawn_blocking_with_tracing(move || verify_password_hash(password, password_hash))
        .await
        .context("Failed to spawn blocking task")??;

    if credentials.username != admin.username {
        return Err(RestError::FailedToAuthenticate(anyhow::anyhow!(
            "Unknown administrator username"
        )));
    }

    Ok(Administrator {
        username: credentials.username,
    })
}

#[tracing::instrument("Verify password hash", skip(password, password_hash))]
fn verify_password_hash(
    password: Secret<String>,
    password_hash: Secret<String>,
) -> RestResult<()> {
    let password_hash = PasswordHash::new(password_hash.expose_secret())
        .context("Failed to parse stored password hash")?;

    Argon2::default()
        .verify_password(password.expose_secret().as_bytes(), &password_hash)
        .context("Failed to verify password hash")
        .map_err(RestError::FailedToAuthenticate)?;

    Ok(())
}
