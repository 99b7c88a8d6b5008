use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::context::AppContext;
use crate::message::Message;
use crate::queue::QueueStats;

use super::{ScheduledTask, Task, TaskError};

const REPORT_PERIOD_DAYS: i64 = 7;

/// Weekly delivery report mailed to the site operator.
pub struct SummaryEmailTask;

impl SummaryEmailTask {
    pub const ACTION: &'static str = "mailrelay_summary_report_email";
}

/// Midnight UTC of the Monday after `now` (a week later when `now` is a
/// Monday).
pub fn next_monday(now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive();
    let days_ahead = 7 - i64::from(today.weekday().num_days_from_monday());
    (today + Duration::days(days_ahead))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

#[async_trait]
impl ScheduledTask for SummaryEmailTask {
    fn action(&self) -> &'static str {
        Self::ACTION
    }

    async fn init(&self, ctx: &AppContext) -> Result<(), TaskError> {
        if ctx.config().summary_report_disabled {
            ctx.scheduler().cancel(Self::ACTION);
            return Ok(());
        }

        Task::builder(Self::ACTION)
            .recurring(next_monday(Utc::now()), Duration::weeks(1))
            .unique()
            .register(ctx.scheduler());
        Ok(())
    }

    async fn process(&self, ctx: &AppContext, _params: Value) -> Result<(), TaskError> {
        let config = ctx.config();
        if config.summary_report_disabled {
            ctx.scheduler().cancel(Self::ACTION);
            return Ok(());
        }

        let recipient = config
            .summary_report_to
            .as_deref()
            .filter(|to| !to.is_empty())
            .unwrap_or(config.from_email.as_str());
        if recipient.is_empty() {
            return Err(TaskError::Handler("no summary report recipient configured".into()));
        }

        let until = Utc::now();
        let since = until - Duration::days(REPORT_PERIOD_DAYS);
        let stats = ctx.queue().stats(since).await?;
        let message = build_report(ctx.dispatcher().active_mailer(), &stats, since, until, recipient);

        let report = ctx.dispatcher().send(&message).await;
        if !report.sent {
            return Err(TaskError::Handler(
                report.error.unwrap_or_else(|| "summary report was not sent".into()),
            ));
        }

        info!(recipient = %recipient, total = stats.total(), "summary_report_sent");
        Ok(())
    }
}

fn build_report(
    mailer: &str,
    stats: &QueueStats,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
    recipient: &str,
) -> Message {
    let period = format!("{} to {}", since.format("%Y-%m-%d"), until.format("%Y-%m-%d"));
    let rows = [
        ("Sent", stats.sent),
        ("Failed", stats.failed),
        ("Pending", stats.pending),
        ("Processing", stats.processing),
        ("Total", stats.total()),
    ];

    let mut text = format!("Email summary for {}\nMailer: {}\n\n", period, mailer);
    let mut html = format!(
        "<h2>Email summary for {}</h2><p>Mailer: <strong>{}</strong></p><table>",
        period, mailer
    );
    for (label, count) in rows {
        text.push_str(&format!("{}: {}\n", label, count));
        html.push_str(&format!("<tr><td>{}</td><td>{}</td></tr>", label, count));
    }
    html.push_str("</table>");

    Message::builder()
        .to(recipient, "")
        .subject(&format!("Weekly email summary: {}", period))
        .text(&text)
        .html(&html)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::queue::Priority;
    use crate::tasks::test_support::test_context;
    use chrono::{TimeZone, Weekday};

    #[test]
    fn test_next_monday() {
        let wednesday = Utc.with_ymd_and_hms(2026, 10, 14, 15, 30, 0).unwrap();
        let monday = next_monday(wednesday);
        assert_eq!(monday, Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap());
        assert_eq!(monday.weekday(), Weekday::Mon);

        let on_monday = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        assert_eq!(next_monday(on_monday), Utc.with_ymd_and_hms(2026, 10, 26, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn test_sends_report_to_from_email() {
        let t = test_context(true);
        let queue = t.ctx.queue();
        queue
            .enqueue(&Message::builder().to("user@example.com", "").build(), Priority::Normal)
            .await
            .unwrap();
        queue.process().await.unwrap();
        queue
            .enqueue(&Message::builder().to("other@example.com", "").build(), Priority::Normal)
            .await
            .unwrap();

        SummaryEmailTask.process(&t.ctx, Value::Null).await.unwrap();

        let body = t.transport.last_request().unwrap().json_body().cloned().unwrap();
        assert_eq!(body["to"][0], "relay@example.com");
        assert!(body["subject"].as_str().unwrap().starts_with("Weekly email summary"));
        let text = body["text"].as_str().unwrap();
        assert!(text.contains("Sent: 1"));
        assert!(text.contains("Pending: 1"));
        assert!(text.contains("Total: 2"));
        assert!(body["html"].as_str().unwrap().contains("<td>Sent</td><td>1</td>"));
    }

    #[tokio::test]
    async fn test_init_registers_weekly() {
        let t = test_context(true);
        SummaryEmailTask.init(&t.ctx).await.unwrap();

        let pending = t.ctx.scheduler().pending(SummaryEmailTask::ACTION);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].schedule.next_run().weekday(), Weekday::Mon);
    }
}
