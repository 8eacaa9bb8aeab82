//! Email outbox worker and delivery abstractions.
//!
//! Auth flows never talk to a mail service directly: they enqueue a row in
//! `email_outbox` inside the same transaction as the state change that needs
//! the email. A background task polls pending rows, locks a batch with
//! `FOR UPDATE SKIP LOCKED`, and hands each row to an [`EmailSender`]. Rows
//! are marked `sent`, retried with exponential backoff and jitter, or marked
//! `failed` after the attempt budget is spent.
//!
//! Delivery is at-least-once. A redelivered verification or reset email is
//! harmless: activation and password changes are gated by token redemption,
//! not by how many emails arrive.
//!
//! `LogEmailSender` is the local-dev default; `HttpEmailSender` posts each
//! message to a configured mail-API endpoint.

use anyhow::{Context, Result, bail};
use rand::Rng;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{Instrument, error, info, info_span};
use url::Url;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub template: String,
    pub payload_json: String,
}

/// Subject line for an outbox template.
fn subject_for(template: &str) -> &'static str {
    match template {
        "reset_password" => "Reset your password",
        _ => "Activate your account",
    }
}

/// Email delivery abstraction used by the outbox worker. Implementations
/// deliver a message or return an error to schedule a retry.
pub trait EmailSender: Send + Sync + 'static {
    fn send(&self, message: &EmailMessage) -> impl Future<Output = Result<()>> + Send;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            template = %message.template,
            payload = %message.payload_json,
            "email outbox send stub"
        );
        Ok(())
    }
}

/// Posts each message as JSON to an external mail-API endpoint.
#[derive(Clone, Debug)]
pub struct HttpEmailSender {
    endpoint: Url,
    client: reqwest::Client,
}

impl HttpEmailSender {
    #[must_use]
    pub fn new(endpoint: Url) -> Self {
        // A hung mail endpoint must fail the attempt, not stall the worker.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { endpoint, client }
    }
}

impl EmailSender for HttpEmailSender {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let payload: serde_json::Value = serde_json::from_str(&message.payload_json)
            .context("invalid outbox payload json")?;
        let body = serde_json::json!({
            "to": message.to_email,
            "subject": subject_for(&message.template),
            "template": message.template,
            "payload": payload,
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .context("failed to reach mail endpoint")?;

        if !response.status().is_success() {
            bail!("mail endpoint returned {}", response.status());
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct EmailWorkerConfig {
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for EmailWorkerConfig {
    /// 5s poll interval, 10 messages per batch, 5 attempts, and a 5s->5m
    /// exponential backoff with jitter.
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl EmailWorkerConfig {
    /// Clamp zeroed or inverted settings to usable values.
    #[must_use]
    pub fn normalize(mut self) -> Self {
        if self.poll_interval.is_zero() {
            self.poll_interval = Duration::from_secs(1);
        }
        self.batch_size = self.batch_size.max(1);
        self.max_attempts = self.max_attempts.max(1);
        if self.backoff_base.is_zero() {
            self.backoff_base = Duration::from_secs(1);
        }
        if self.backoff_max < self.backoff_base {
            self.backoff_max = self.backoff_base;
        }
        self
    }
}

/// Spawn the background task that polls and processes the email outbox.
pub fn spawn_outbox_worker<S: EmailSender>(
    pool: PgPool,
    sender: S,
    config: EmailWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        loop {
            if let Err(err) = process_outbox_batch(&pool, &sender, &config).await {
                error!("email outbox batch failed: {err}");
            }
            sleep(config.poll_interval).await;
        }
    })
}

struct OutboxRow {
    id: Uuid,
    attempts: u32,
    message: EmailMessage,
}

async fn process_outbox_batch<S: EmailSender>(
    pool: &PgPool,
    sender: &S,
    config: &EmailWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start email outbox transaction")?;

    let rows = claim_batch(&mut tx, config.batch_size).await?;
    if rows.is_empty() {
        // Commit even on empty to release locks and keep the poll loop consistent.
        tx.commit()
            .await
            .context("failed to commit empty outbox batch")?;
        return Ok(0);
    }

    let row_count = rows.len();
    for row in rows {
        match sender.send(&row.message).await {
            Ok(()) => mark_sent(&mut tx, &row).await?,
            Err(err) => schedule_retry_or_fail(&mut tx, &row, &err, config).await?,
        }
    }

    tx.commit()
        .await
        .context("failed to commit email outbox batch")?;

    Ok(row_count)
}

/// Lock a batch of due pending rows so multiple workers never double-send.
async fn claim_batch(
    tx: &mut Transaction<'_, Postgres>,
    batch_size: usize,
) -> Result<Vec<OutboxRow>> {
    let query = r"
        SELECT id, to_email, template, payload_json::text AS payload_json, attempts
        FROM email_outbox
        WHERE status = 'pending'
          AND next_attempt_at <= NOW()
        ORDER BY next_attempt_at ASC, created_at ASC
        LIMIT $1
        FOR UPDATE SKIP LOCKED
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let rows = sqlx::query(query)
        .bind(i64::try_from(batch_size).unwrap_or(1))
        .fetch_all(&mut **tx)
        .instrument(span)
        .await
        .context("failed to load email outbox batch")?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let attempts: i32 = row.get("attempts");
            OutboxRow {
                id: row.get("id"),
                attempts: u32::try_from(attempts).unwrap_or(0),
                message: EmailMessage {
                    to_email: row.get("to_email"),
                    template: row.get("template"),
                    payload_json: row.get("payload_json"),
                },
            }
        })
        .collect())
}

async fn mark_sent(tx: &mut Transaction<'_, Postgres>, row: &OutboxRow) -> Result<()> {
    let query = r"
        UPDATE email_outbox
        SET status = 'sent',
            attempts = $2,
            last_error = NULL,
            sent_at = NOW()
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(row.id)
        .bind(attempts_column(row.attempts))
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update outbox status to sent")?;
    Ok(())
}

async fn schedule_retry_or_fail(
    tx: &mut Transaction<'_, Postgres>,
    row: &OutboxRow,
    err: &anyhow::Error,
    config: &EmailWorkerConfig,
) -> Result<()> {
    let next_attempt = row.attempts.saturating_add(1);

    if next_attempt >= config.max_attempts {
        let query = r"
            UPDATE email_outbox
            SET status = 'failed',
                attempts = $2,
                last_error = $3
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(row.id)
            .bind(attempts_column(row.attempts))
            .bind(err.to_string())
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to update outbox status to failed")?;
        return Ok(());
    }

    let delay = backoff_delay(next_attempt, config.backoff_base, config.backoff_max);
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);
    let query = r"
        UPDATE email_outbox
        SET status = 'pending',
            attempts = $2,
            last_error = $3,
            next_attempt_at = NOW() + ($4 * INTERVAL '1 millisecond')
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(row.id)
        .bind(attempts_column(row.attempts))
        .bind(err.to_string())
        .bind(delay_ms)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to update outbox retry schedule")?;
    Ok(())
}

fn attempts_column(attempts: u32) -> i32 {
    i32::try_from(attempts.saturating_add(1)).unwrap_or(i32::MAX)
}

fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let shift = attempt.saturating_sub(1).min(31);
    let factor = 1u32 << shift;
    let delay = base.checked_mul(factor).unwrap_or(max);
    jitter_delay(delay.min(max))
}

/// Spread retries over `[delay/2, delay]` so stalled batches do not thunder.
fn jitter_delay(delay: Duration) -> Duration {
    let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    if delay_ms < 2 {
        return delay;
    }
    let half = delay_ms / 2;
    let jitter = rand::thread_rng().gen_range(0..=half);
    Duration::from_millis(half + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_clamps_degenerate_settings() {
        let config = EmailWorkerConfig {
            poll_interval: Duration::ZERO,
            batch_size: 0,
            max_attempts: 0,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
        }
        .normalize();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert!(config.backoff_max >= config.backoff_base);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let base = Duration::from_secs(5);
        let max = Duration::from_secs(300);
        // Jitter keeps the delay within [delay/2, delay].
        let first = backoff_delay(1, base, max);
        assert!(first <= base);
        assert!(first >= base / 2);

        let tenth = backoff_delay(10, base, max);
        assert!(tenth <= max);
        assert!(tenth >= max / 2);
    }

    #[test]
    fn backoff_handles_huge_attempt_counts() {
        let capped = backoff_delay(u32::MAX, Duration::from_secs(5), Duration::from_secs(300));
        assert!(capped <= Duration::from_secs(300));
    }

    #[test]
    fn jitter_keeps_tiny_delays() {
        assert_eq!(jitter_delay(Duration::from_millis(1)), Duration::from_millis(1));
    }

    #[test]
    fn subjects_match_templates() {
        assert_eq!(subject_for("reset_password"), "Reset your password");
        assert_eq!(subject_for("verify_email"), "Activate your account");
    }

    #[test]
    fn attempts_column_is_incremented_and_saturating() {
        assert_eq!(attempts_column(0), 1);
        assert_eq!(attempts_column(u32::MAX), i32::MAX);
    }
}
