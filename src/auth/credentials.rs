use actix_web::http::header::{self, HeaderMap};

use anyhow::Context;

use secrecy::Secret;

const BASIC_AUTH_PREFIX: &str = "Basic ";

/// Username/password pair presented by a client
#[derive(Debug)]
pub struct Credentials {
    pub username: String,
    pub password: Secret<String>,
}

impl Credentials {
    /// Extract basic-auth credentials from the `Authorization` header
    pub fn from_headers(headers: &HeaderMap) -> anyhow::Result<Self> {
        let header_value = headers
            .get(header::AUTHORIZATION)
            .context("Missing authorization in header")?
            .to_str()
            .context("Authorization header is not valid ASCII")?;

        match header_value.strip_prefix(BASIC_AUTH_PREFIX) {
            Some(encoded) => Self::from_basic(encoded),
            None => anyhow::bail!("Missing or unknown Authorization scheme"),
        }
    }

    /// Decode the base64 `username:password` payload of a basic-auth header
    pub fn from_basic(encoded: &str) -> anyhow::Result<Self> {
        use base64::Engine;

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .context("Failed to decode authorization header")?;
        let decoded = String::from_utf8(decoded).context("Failed to decode authorization header")?;

        let (username, password) = decoded
            .split_once(':')
            .context("Missing password in authorization")?;
        if username.is_empty() {
            anyhow::bail!("Missing username in authorization");
        }

        Ok(Self {
            username: username.into(),
            password: Secret::new(password.into()),
        })
    }
}
