use std::net::TcpListener;
use std::sync::Arc;

use anyhow::Context;

use sqlx::PgPool;

use clubcamps::app;
use clubcamps::client::EmailClient;
use clubcamps::crypto::SigningKey;
use clubcamps::notification::{EmailNotifier, NotificationDispatcher};
use clubcamps::registration::RegistrationService;
use clubcamps::repo::PgStore;
use clubcamps::settings::Settings;
use clubcamps::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = telemetry::create_subscriber("info".into(), std::io::stdout);
    telemetry::set_subscriber(subscriber)?;

    let settings = Settings::load()?;

    let pool = PgPool::connect_with(settings.database.with_db())
        .await
        .context("Failed to connect to the database")?;
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let signing_key = SigningKey::new(settings.app.secret_key())?;

    let email_client = EmailClient::new(
        settings.email.sender()?,
        settings.email.api_timeout(),
        settings.email.api_base_url()?,
        settings.email.api_auth_token().into(),
    )?;
    let notifier = EmailNotifier::new(
        email_client,
        signing_key.clone(),
        settings.app.base_url()?,
        settings.registration.withdrawal_token_ttl(),
    );

    let service = RegistrationService::new(Arc::new(PgStore::new(pool)), &settings.registration);
    let dispatcher = NotificationDispatcher::new(Arc::new(notifier));

    let listener = TcpListener::bind(settings.app.addr())?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    app::run(
        listener,
        service,
        dispatcher,
        signing_key,
        settings.admin.credentials(),
    )?
    .await
    .context("Failed to run app")
}
