//! Static slug → constructor table.
//!
//! Every mailer the relay can use is listed in [`MAILERS`]. Construction
//! resolves the mailer's settings (stored values plus environment
//! constants) and hands over the shared HTTP transport.

use std::sync::Arc;

use tracing::warn;

use crate::config::{MailerSettings, ProviderSettings};

use super::http::{ApiProvider, HttpMailer};
use super::providers::{
    AmazonSes, ElasticEmail, MailerSend, Mailgun, Mailjet, Mandrill, Postal, Postmark, Resend,
    SendGrid, SendLayer, Sendinblue, Smtp2Go, SmtpCom, SparkPost,
};
use super::smtp::{SmtpMailer, SENDMAIL_SETTINGS, SMTP_SETTINGS};
use super::transport::HttpTransport;
use super::Mailer;

type Constructor = fn(MailerSettings, Arc<dyn HttpTransport>) -> Box<dyn Mailer>;

/// One row of the registry.
pub struct MailerEntry {
    pub slug: &'static str,
    pub title: &'static str,
    /// Every setting key the mailer reads.
    pub settings: &'static [&'static str],
    build: Constructor,
}

impl MailerEntry {
    const fn http<P: ApiProvider>() -> Self {
        Self {
            slug: P::SLUG,
            title: P::TITLE,
            settings: P::SETTINGS,
            build: build_http::<P>,
        }
    }
}

fn build_http<P: ApiProvider>(settings: MailerSettings, transport: Arc<dyn HttpTransport>) -> Box<dyn Mailer> {
    Box::new(HttpMailer::<P>::new(settings, transport))
}

fn build_smtp(settings: MailerSettings, _: Arc<dyn HttpTransport>) -> Box<dyn Mailer> {
    Box::new(SmtpMailer::smtp(settings))
}

fn build_sendmail(settings: MailerSettings, _: Arc<dyn HttpTransport>) -> Box<dyn Mailer> {
    Box::new(SmtpMailer::sendmail(settings))
}

pub static MAILERS: &[MailerEntry] = &[
    MailerEntry {
        slug: "mail",
        title: "Default (sendmail)",
        settings: SENDMAIL_SETTINGS,
        build: build_sendmail,
    },
    MailerEntry {
        slug: "smtp",
        title: "Other SMTP",
        settings: SMTP_SETTINGS,
        build: build_smtp,
    },
    MailerEntry::http::<SendGrid>(),
    MailerEntry::http::<Mailgun>(),
    MailerEntry::http::<Sendinblue>(),
    MailerEntry::http::<Postmark>(),
    MailerEntry::http::<SparkPost>(),
    MailerEntry::http::<AmazonSes>(),
    MailerEntry::http::<SmtpCom>(),
    MailerEntry::http::<Smtp2Go>(),
    MailerEntry::http::<SendLayer>(),
    MailerEntry::http::<Mailjet>(),
    MailerEntry::http::<MailerSend>(),
    MailerEntry::http::<Mandrill>(),
    MailerEntry::http::<ElasticEmail>(),
    MailerEntry::http::<Resend>(),
    MailerEntry::http::<Postal>(),
];

/// Find a registry row by slug (case-insensitive).
pub fn lookup(slug: &str) -> Option<&'static MailerEntry> {
    MAILERS.iter().find(|e| e.slug.eq_ignore_ascii_case(slug.trim()))
}

/// Builds fresh, single-use mailers from stored settings.
#[derive(Clone)]
pub struct MailerRegistry {
    settings: ProviderSettings,
    transport: Arc<dyn HttpTransport>,
}

impl MailerRegistry {
    pub fn new(settings: ProviderSettings, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            settings,
            transport,
        }
    }

    pub fn entries(&self) -> &'static [MailerEntry] {
        MAILERS
    }

    /// Resolved settings for one mailer.
    pub fn settings_for(&self, slug: &str) -> Option<MailerSettings> {
        lookup(slug).map(|entry| self.settings.for_mailer(entry.slug, entry.settings))
    }

    /// A new adapter for `slug`, or `None` when the slug is unknown.
    pub fn create(&self, slug: &str) -> Option<Box<dyn Mailer>> {
        let Some(entry) = lookup(slug) else {
            warn!(mailer = %slug, "mailer_unknown");
            return None;
        };
        let settings = self.settings.for_mailer(entry.slug, entry.settings);
        Some((entry.build)(settings, self.transport.clone()))
    }
}
