mod config;
mod db;
mod error;
mod extract;
mod rate_limit;
mod repository;
mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::auth::TokenService;
use services::email::{EmailService, SmtpMailer};

#[tokio::main]
async fn main() {
    // A missing .env is normal in deployed environments.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let settings = config::Settings::from_env().expect("invalid configuration");

    let pool = db::init_pool(&settings.database_url, settings.db_max_connections)
        .await
        .expect("database init failed");

    let tokens = Arc::new(TokenService::new(
        &settings.jwt_secret,
        time::Duration::seconds(settings.access_ttl_secs),
        time::Duration::seconds(settings.refresh_ttl_secs),
    ));

    // Email is optional: without SMTP settings confirmation links go to the log.
    let email = match settings.mail.as_ref().map(SmtpMailer::from_settings) {
        Some(Ok(mailer)) => {
            tracing::info!("smtp mailer initialized");
            Some(Arc::new(EmailService::new(Arc::new(mailer), tokens.clone())))
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, "smtp mailer misconfigured; confirmation emails disabled");
            None
        }
        None => {
            tracing::warn!("smtp not configured; confirmation links will be logged");
            None
        }
    };

    let state = state::AppState::new(pool, tokens, email, &settings);
    let app = routes::app(state, &settings);

    let port = settings.port;
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "contact book listening");
    axum::serve(listener, app).await.expect("server failed");
}
