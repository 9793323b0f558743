use std::net::TcpListener;

use actix_web::dev::Server;
use actix_web::{get, HttpResponse, Responder};
use actix_web::{web, App, HttpServer};

use tracing_actix_web::TracingLogger;

use crate::auth::AdminCredentials;
use crate::controller::{admin, coupons, offerings};
use crate::crypto::SigningKey;
use crate::notification::NotificationDispatcher;
use crate::registration::RegistrationService;

/// Simple health-check endpoint
#[tracing::instrument(name = "Health check")]
#[get("/health_check")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().finish()
}

/// Run the application on a specified TCP listener
pub fn run(
    listener: TcpListener,
    service: RegistrationService,
    dispatcher: NotificationDispatcher,
    signing_key: SigningKey,
    admin_credentials: AdminCredentials,
) -> anyhow::Result<Server> {
    // Wrap application data
    let service = web::Data::new(service);
    let dispatcher = web::Data::new(dispatcher);
    let signing_key = web::Data::new(signing_key);
    let admin_credentials = web::Data::new(admin_credentials);

    // Start the server
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .app_data(service.clone())
            .app_data(dispatcher.clone())
            .app_data(signing_key.clone())
            .app_data(admin_credentials.clone())
            .service(health_check)
            .service(offerings::scope())
            .service(coupons::scope())
            .service(admin::scope())
    })
    .listen(listener)?
    .run();

    Ok(server)
}
