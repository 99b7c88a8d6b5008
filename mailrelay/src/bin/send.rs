//! Mailrelay Send - deliver one message through the active mailer.
//!
//! Reads a JSON message from the file named on the command line (or stdin
//! when the argument is missing or `-`), sends it synchronously and prints
//! the outcome followed by the provider debug output. Useful for checking a
//! provider configuration.

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mailrelay::mailer::{ReqwestTransport, SenderDefaults};
use mailrelay::{Config, Dispatcher, MailerRegistry, Message};

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr; stdout carries the report.
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true).with_writer(std::io::stderr))
        .init();

    let source = std::env::args().nth(1).unwrap_or_else(|| "-".to_string());
    let raw = if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read message from stdin")?;
        buf
    } else {
        std::fs::read_to_string(&source).with_context(|| format!("Failed to read {}", source))?
    };

    let message: Message = serde_json::from_str(&raw).context("Invalid message JSON")?;

    let config = Config::from_env();
    info!(mailer = %config.mailer, source = %source, "send_starting");

    let transport = ReqwestTransport::new(Duration::from_millis(config.http_timeout_ms))
        .context("Failed to build HTTP client")?;
    let registry = MailerRegistry::new(config.provider_settings(), Arc::new(transport));
    let dispatcher = Dispatcher::new(registry, config.mailer.clone(), SenderDefaults::from_config(&config));

    let report = dispatcher.send(&message).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if !report.debug.is_empty() {
        println!("\n{}", report.debug);
    }

    if !report.sent {
        bail!(
            "{} did not send the message: {}",
            report.mailer,
            report.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
