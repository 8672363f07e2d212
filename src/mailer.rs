//! Outbound notification delivery.
//!
//! Account flows enqueue rows in `email_outbox` through [`PgOutboxNotifier`]
//! and answer the request without waiting on delivery. A background task
//! polls that table, locks a batch via `FOR UPDATE SKIP LOCKED`, and hands
//! each row to a [`MessageSender`]. Failed rows are retried with exponential
//! backoff and jitter until a max attempt threshold, then marked `failed`.
//!
//! The default sender for local dev is [`LogMessageSender`], which logs the
//! payload and reports success. [`LogNotifier`] skips the outbox entirely
//! and is meant for tests and single-process setups.

use anyhow::{Context, Result};
use rand::Rng;
use sqlx::{PgPool, Row};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::auth::error::AuthError;
use crate::auth::store::Notifier;

/// A queued notification as handed to the sender.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    pub recipient: String,
    pub template: String,
    pub context_json: String,
}

/// Delivery abstraction used by the outbox worker.
pub trait MessageSender: Send + Sync {
    /// Deliver a message or return an error to schedule a retry.
    fn send(&self, message: &OutboundMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of delivering it.
#[derive(Clone, Debug)]
pub struct LogMessageSender;

impl MessageSender for LogMessageSender {
    fn send(&self, message: &OutboundMessage) -> Result<()> {
        info!(
            recipient = %message.recipient,
            template = %message.template,
            payload = %message.context_json,
            "outbox send stub"
        );
        Ok(())
    }
}

/// [`Notifier`] that logs instead of enqueuing. Delivery always succeeds.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn send(
        &self,
        to: &str,
        template: &str,
        context: &serde_json::Value,
    ) -> Result<(), AuthError> {
        info!(recipient = %to, template = %template, payload = %context, "notification stub");
        Ok(())
    }
}

/// [`Notifier`] backed by the `email_outbox` table. Enqueuing is the only
/// synchronous step; delivery happens in the worker.
#[derive(Clone)]
pub struct PgOutboxNotifier {
    pool: PgPool,
}

impl PgOutboxNotifier {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl Notifier for PgOutboxNotifier {
    async fn send(
        &self,
        to: &str,
        template: &str,
        context: &serde_json::Value,
    ) -> Result<(), AuthError> {
        let query = "INSERT INTO email_outbox (recipient, template, context) \
                     VALUES ($1, $2, $3)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(to)
            .bind(template)
            .bind(context)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to enqueue notification")
            .map_err(AuthError::Internal)?;
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct OutboxWorkerConfig {
    poll_interval: Duration,
    batch_size: usize,
    max_attempts: u32,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl OutboxWorkerConfig {
    /// Defaults: 5s poll interval, 10 messages per batch, 5 max attempts,
    /// and 5s->5m exponential backoff with jitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            max_attempts: 5,
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_poll_interval_seconds(mut self, seconds: u64) -> Self {
        self.poll_interval = Duration::from_secs(seconds);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Clamp zero or inverted values so the worker loop cannot spin or stall.
    #[must_use]
    pub fn normalize(self) -> Self {
        let poll_interval = if self.poll_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.poll_interval
        };
        let batch_size = self.batch_size.max(1);
        let max_attempts = self.max_attempts.max(1);
        let backoff_base = if self.backoff_base.is_zero() {
            Duration::from_secs(1)
        } else {
            self.backoff_base
        };
        let backoff_max = if self.backoff_max < backoff_base {
            backoff_base
        } else {
            self.backoff_max
        };
        Self {
            poll_interval,
            batch_size,
            max_attempts,
            backoff_base,
            backoff_max,
        }
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    #[must_use]
    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }
}

impl Default for OutboxWorkerConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Spawn the background task that polls and drains the outbox.
pub fn spawn_outbox_worker(
    pool: PgPool,
    sender: Arc<dyn MessageSender>,
    config: OutboxWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let config = config.normalize();
        let poll_interval = config.poll_interval();

        loop {
            if let Err(err) = process_outbox_batch(&pool, sender.as_ref(), &config).await {
                error!("outbox batch failed: {err}");
            }
            sleep(poll_interval).await;
        }
    })
}

async fn process_outbox_batch(
    pool: &PgPool,
    sender: &dyn MessageSender,
    config: &OutboxWorkerConfig,
) -> Result<usize> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to start outbox transaction")?;

    // Locked batch so multiple workers can run without double-sending.
    let query = r"
        SELECT id, recipient, template, context::text AS context_json, attempts
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
        .bind(i64::try_from(config.batch_size()).unwrap_or(0))
        .fetch_all(&mut *tx)
        .instrument(span)
        .await
        .context("failed to load outbox batch")?;

    if rows.is_empty() {
        tx.commit()
            .await
            .context("failed to commit empty outbox batch")?;
        return Ok(0);
    }

    let row_count = rows.len();
    for row in rows {
        let id: Uuid = row.get("id");
        let attempts: i32 = row.get("attempts");
        let attempts = u32::try_from(attempts).unwrap_or(0);
        let message = OutboundMessage {
            recipient: row.get("recipient"),
            template: row.get("template"),
            context_json: row.get("context_json"),
        };

        let send_result = sender.send(&message);
        settle_outbox_row(&mut tx, id, attempts, &send_result, config).await?;
    }

    tx.commit()
        .await
        .context("failed to commit outbox batch")?;

    Ok(row_count)
}

/// Write a row's post-send disposition. A single statement covers all three
/// outcomes; `settle` decides which one applies.
async fn settle_outbox_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
    attempts: u32,
    send_result: &Result<()>,
    config: &OutboxWorkerConfig,
) -> Result<()> {
    let attempt = attempts.saturating_add(1);
    let (status, last_error, delay) = settle(send_result, attempt, config);
    let delay_ms = i64::try_from(delay.as_millis()).unwrap_or(i64::MAX);

    let query = r"
        UPDATE email_outbox
        SET status = $2,
            attempts = $3,
            last_error = $4,
            sent_at = CASE WHEN $2 = 'sent' THEN NOW() ELSE sent_at END,
            next_attempt_at = NOW() + ($5 * INTERVAL '1 millisecond')
        WHERE id = $1
    ";
    let span = info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    sqlx::query(query)
        .bind(id)
        .bind(status)
        .bind(i32::try_from(attempt).unwrap_or(i32::MAX))
        .bind(last_error)
        .bind(delay_ms)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to settle outbox row")?;

    Ok(())
}

/// Map a delivery result to `(status, last_error, reschedule delay)`.
fn settle(
    send_result: &Result<()>,
    attempt: u32,
    config: &OutboxWorkerConfig,
) -> (&'static str, Option<String>, Duration) {
    match send_result {
        Ok(()) => ("sent", None, Duration::ZERO),
        Err(err) if attempt >= config.max_attempts() => {
            ("failed", Some(err.to_string()), Duration::ZERO)
        }
        Err(err) => (
            "pending",
            Some(err.to_string()),
            retry_delay(attempt, config.backoff_base(), config.backoff_max()),
        ),
    }
}

/// Exponential backoff capped at `max`, jittered over the upper half of the
/// window so bunched failures spread out.
fn retry_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    let exp = attempt.saturating_sub(1).min(31);
    let window_ms = base_ms.saturating_mul(1_u64 << exp).min(max_ms);
    if window_ms < 2 {
        return Duration::from_millis(window_ms);
    }
    let half = window_ms / 2;
    Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
}
