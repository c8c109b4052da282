//! Transactional email: account confirmation.
//!
//! DESIGN
//! ======
//! [`EmailService`] owns template rendering and token minting; delivery goes
//! through the [`Mailer`] trait so the SMTP transport can be swapped for an
//! in-memory recorder in tests. Routes dispatch sends on a spawned task, so an
//! SMTP stall never holds an HTTP response.

use std::sync::Arc;

use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::MailSettings;
use crate::services::auth::{AuthError, TokenService};

const CONFIRM_EMAIL_TEMPLATE: &str = include_str!("../../templates/confirm_email.html");
pub const CONFIRM_EMAIL_SUBJECT: &str = "Confirm your email";
const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("invalid address: {0}")]
    Address(String),
    #[error("message build failed: {0}")]
    Build(String),
    #[error("smtp transport error: {0}")]
    Transport(String),
    #[error("confirmation token: {0}")]
    Token(#[from] AuthError),
}

/// A fully rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Delivery backend.
#[async_trait::async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError>;
}

// =============================================================================
// SMTP
// =============================================================================

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// Build an SMTP transport. Port 465 uses implicit TLS, anything else STARTTLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay host or the from address is invalid.
    pub fn from_settings(settings: &MailSettings) -> Result<Self, EmailError> {
        let from: Mailbox = format!("{} <{}>", settings.from_name, settings.from)
            .parse()
            .map_err(|_| EmailError::Address(settings.from.clone()))?;

        let creds = Credentials::new(settings.username.clone(), settings.password.clone());
        let builder = if settings.port == IMPLICIT_TLS_PORT {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&settings.server)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.server)
        }
        .map_err(|e| EmailError::Transport(e.to_string()))?;

        let transport = builder.port(settings.port).credentials(creds).build();

        Ok(Self { transport, from })
    }
}

#[async_trait::async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), EmailError> {
        let to: Mailbox = email
            .to
            .parse()
            .map_err(|_| EmailError::Address(mask_email(&email.to)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// SERVICE
// =============================================================================

pub struct EmailService {
    mailer: Arc<dyn Mailer>,
    tokens: Arc<TokenService>,
}

impl EmailService {
    #[must_use]
    pub fn new(mailer: Arc<dyn Mailer>, tokens: Arc<TokenService>) -> Self {
        Self { mailer, tokens }
    }

    /// Mint an email token and mail the confirmation link to `email`.
    ///
    /// # Errors
    ///
    /// Returns an error if the token cannot be signed or delivery fails.
    pub async fn send_confirmation(&self, email: &str, username: &str, host: &str) -> Result<(), EmailError> {
        let token = self.tokens.create_email_token(email)?;
        let html = render_confirm_email(username, host, &token);
        self.mailer
            .send(OutgoingEmail { to: email.to_owned(), subject: CONFIRM_EMAIL_SUBJECT.to_owned(), html })
            .await
    }
}

#[must_use]
pub fn render_confirm_email(username: &str, host: &str, token: &str) -> String {
    CONFIRM_EMAIL_TEMPLATE
        .replace("{{USERNAME}}", &escape_html(username))
        .replace("{{HOST}}", host.trim_end_matches('/'))
        .replace("{{TOKEN}}", token)
}

/// Escape text for an HTML body or a quoted attribute value.
#[must_use]
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

/// Log-safe form of an address: `"a***@example.com"`.
#[must_use]
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => match local.chars().next() {
            Some(first) => format!("{first}***@{domain}"),
            None => format!("***@{domain}"),
        },
        None => "***@***".to_owned(),
    }
}

#[cfg(test)]
#[path = "email_test.rs"]
mod tests;
