//! Password reset notification sent over authenticated SMTP
//!
//! The message is `multipart/alternative` with a plain-text and an HTML body,
//! both rendered from the templates bundled in `templates/`. The SMTP secret
//! is read from the environment at send time and never stored in config.

use std::env;

use lettre::address::AddressError;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use minijinja::Environment;
use rand::distributions::Alphanumeric;
use rand::{Rng, thread_rng};
use serde::Serialize;
use tracing::info;

use crate::config::MailConfig;

pub const SUBJECT: &str = "Your New Login Credentials - Family Tree Website";

const TEXT_TEMPLATE: &str = "password_reset.txt";
const HTML_TEMPLATE: &str = "password_reset.html";

/// Length of passwords produced by [`generate_password`]
pub const GENERATED_PASSWORD_LEN: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("SMTP credential missing: set the {0} environment variable")]
    MissingCredential(String),

    #[error("Mail configuration error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),

    #[error("Failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

/// A password reset notification for one user
#[derive(Debug, Clone)]
pub struct PasswordResetEmail {
    pub to: String,
    pub username: String,
    pub new_password: String,
}

#[derive(Serialize)]
struct TemplateContext<'a> {
    username: &'a str,
    new_password: &'a str,
    login_url: &'a str,
}

/// Plain-text and HTML bodies of a rendered message
#[derive(Debug, Clone)]
pub struct RenderedBodies {
    pub text: String,
    pub html: String,
}

fn templates() -> Result<Environment<'static>, MailError> {
    let mut env = Environment::new();
    env.add_template(TEXT_TEMPLATE, include_str!("../templates/password_reset.txt"))?;
    env.add_template(HTML_TEMPLATE, include_str!("../templates/password_reset.html"))?;
    Ok(env)
}

/// Render both bodies; the HTML body is auto-escaped
pub fn render_bodies(email: &PasswordResetEmail, login_url: &str) -> Result<RenderedBodies, MailError> {
    let env = templates()?;
    let context = TemplateContext {
        username: &email.username,
        new_password: &email.new_password,
        login_url,
    };

    Ok(RenderedBodies {
        text: env.get_template(TEXT_TEMPLATE)?.render(&context)?,
        html: env.get_template(HTML_TEMPLATE)?.render(&context)?,
    })
}

/// Compose the full MIME message
pub fn build_message(config: &MailConfig, email: &PasswordResetEmail) -> Result<Message, MailError> {
    let from = Mailbox::new(
        Some(config.from_name.clone()),
        config.from_email.parse::<Address>()?,
    );
    let to: Mailbox = email.to.parse()?;
    let bodies = render_bodies(email, &config.login_url)?;

    Ok(Message::builder()
        .from(from)
        .to(to)
        .subject(SUBJECT)
        .multipart(MultiPart::alternative_plain_html(bodies.text, bodies.html))?)
}

/// Read the SMTP secret named by the config, failing if it is unset or blank
pub fn smtp_secret(config: &MailConfig) -> Result<String, MailError> {
    env::var(&config.password_var)
        .ok()
        .filter(|secret| !secret.trim().is_empty())
        .ok_or_else(|| MailError::MissingCredential(config.password_var.clone()))
}

/// Send the notification through the configured STARTTLS relay
pub async fn send_password_email(
    config: &MailConfig,
    email: &PasswordResetEmail,
) -> Result<(), MailError> {
    let secret = smtp_secret(config)?;
    let message = build_message(config, email)?;

    if config.smtp_host.trim().is_empty() {
        return Err(MailError::Config("SMTP_HOST is empty".to_string()));
    }

    info!("Connecting to SMTP relay {}:{}", config.smtp_host, config.smtp_port);
    let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
        .port(config.smtp_port)
        .credentials(Credentials::new(config.from_email.clone(), secret))
        .build();

    mailer.send(message).await?;
    info!("Sent password reset email to {}", email.to);
    Ok(())
}

/// Generate a random alphanumeric password
pub fn generate_password(len: usize) -> String {
    let mut rng = thread_rng();
    (0..len).map(|_| rng.sample(Alphanumeric) as char).collect()
}
