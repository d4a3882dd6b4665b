//! Campaign dispatch engine.
//!
//! Drains a campaign's pending send records through a pool of concurrent
//! workers. All workers share one rate limiter; each record is retried
//! in place with exponential backoff on transient provider errors. The
//! store is the source of truth throughout: a crash mid-run loses no
//! outcomes, and re-running the campaign picks up the remaining Pending
//! records.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::campaign::{CampaignStatus, CampaignStore, SendRecord, StoreError};
use crate::metrics::{
    CAMPAIGNS_FINISHED, RATE_LIMIT_WAIT, RECORDS_CANCELLED, RETRIES_EXHAUSTED, SEND_ATTEMPTS,
    SEND_DURATION, SEND_RETRIES,
};
use crate::provider::{ProviderError, ProviderGateway, SendRequest};
use crate::status::resolve_status;

use super::config::DispatcherConfig;
use super::rate_limiter::RateLimiter;
use super::types::{CancelHandle, DispatchError, DispatchSummary};

/// State shared by the workers of one dispatch run.
struct RunContext {
    config: DispatcherConfig,
    store: Arc<dyn CampaignStore>,
    gateway: Arc<dyn ProviderGateway>,
    limiter: Arc<RateLimiter>,
    queue: Mutex<VecDeque<SendRecord>>,
    campaign_id: String,
    template_id: String,
    cancel: CancelHandle,
    /// First store error seen by any worker. Once set, the run stalls.
    store_failure: Mutex<Option<StoreError>>,
    store_down: AtomicBool,
}

/// The campaign dispatcher.
///
/// One instance serves the whole process; the rate limiter inside it is
/// shared across every campaign dispatched through it.
pub struct CampaignDispatcher {
    config: DispatcherConfig,
    store: Arc<dyn CampaignStore>,
    gateway: Arc<dyn ProviderGateway>,
    limiter: Arc<RateLimiter>,
}

impl CampaignDispatcher {
    /// Create a new dispatcher.
    pub fn new(
        config: DispatcherConfig,
        store: Arc<dyn CampaignStore>,
        gateway: Arc<dyn ProviderGateway>,
    ) -> Self {
        let limiter = Arc::new(RateLimiter::new(config.rate_limit_rpm));
        Self {
            config,
            store,
            gateway,
            limiter,
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Dispatch (or resume) a campaign, driving every Pending record to a
    /// terminal status.
    ///
    /// Returns once all records are settled, the run is cancelled, or the
    /// store becomes unavailable. In the last case the campaign is left
    /// Stalled and a later call resumes it.
    pub async fn run(
        &self,
        campaign_id: &str,
        cancel: CancelHandle,
    ) -> Result<DispatchSummary, DispatchError> {
        let campaign = self
            .store
            .campaign(campaign_id)?
            .ok_or_else(|| DispatchError::CampaignNotFound(campaign_id.to_string()))?;

        if !campaign.status.is_runnable() {
            return Err(DispatchError::NotRunnable {
                id: campaign.id,
                status: campaign.status,
            });
        }

        self.store
            .set_campaign_status(campaign_id, CampaignStatus::Processing)?;

        let pending = self.store.pending_records(campaign_id)?;
        info!(
            campaign_id,
            pending = pending.len(),
            total = campaign.total,
            provider = self.gateway.provider_name(),
            "dispatch run started"
        );

        if !pending.is_empty() {
            let worker_count = (self.config.workers as usize).min(pending.len());
            let ctx = Arc::new(RunContext {
                config: self.config.clone(),
                store: Arc::clone(&self.store),
                gateway: Arc::clone(&self.gateway),
                limiter: Arc::clone(&self.limiter),
                queue: Mutex::new(pending.into()),
                campaign_id: campaign_id.to_string(),
                template_id: campaign.template_id.clone(),
                cancel: cancel.clone(),
                store_failure: Mutex::new(None),
                store_down: AtomicBool::new(false),
            });

            let mut handles = Vec::with_capacity(worker_count);
            for worker_id in 0..worker_count {
                let ctx = Arc::clone(&ctx);
                handles.push(tokio::spawn(worker_loop(ctx, worker_id)));
            }
            for result in futures::future::join_all(handles).await {
                if let Err(e) = result {
                    error!(campaign_id, "send worker panicked: {e}");
                }
            }

            if ctx.store_down.load(Ordering::SeqCst) {
                let source = ctx
                    .store_failure
                    .lock()
                    .await
                    .take()
                    .unwrap_or_else(|| StoreError::Database("unknown store failure".to_string()));
                return self.stall(campaign_id, source);
            }
        }

        if cancel.is_cancelled() {
            if let Err(e) = self.cancel_remaining(campaign_id) {
                return self.stall(campaign_id, e);
            }
        }

        self.finalize(campaign_id)
    }

    /// Mark the campaign stalled after a store failure. Best effort: the
    /// status write may fail for the same reason the run stalled.
    fn stall(
        &self,
        campaign_id: &str,
        source: StoreError,
    ) -> Result<DispatchSummary, DispatchError> {
        error!(campaign_id, %source, "store unavailable, stalling campaign");
        if let Err(e) = self
            .store
            .set_campaign_status(campaign_id, CampaignStatus::Stalled)
        {
            warn!(campaign_id, "could not persist stalled status: {e}");
        }
        CAMPAIGNS_FINISHED
            .with_label_values(&[CampaignStatus::Stalled.as_str()])
            .inc();

        Err(DispatchError::StoreUnavailable {
            id: campaign_id.to_string(),
            source,
        })
    }

    /// Sweep records that never got a delivery outcome into Cancelled.
    fn cancel_remaining(&self, campaign_id: &str) -> Result<(), StoreError> {
        let remaining = self.store.pending_records(campaign_id)?;
        let count = remaining.len();
        for record in remaining {
            self.store.mark_cancelled(campaign_id, &record.phone)?;
            RECORDS_CANCELLED.inc();
        }
        if count > 0 {
            info!(campaign_id, cancelled = count, "cancellation sweep done");
        }
        Ok(())
    }

    /// Recompute the aggregate and settle the campaign status.
    fn finalize(&self, campaign_id: &str) -> Result<DispatchSummary, DispatchError> {
        let agg = self.store.aggregate(campaign_id)?;
        let status = resolve_status(CampaignStatus::Processing, &agg);
        self.store.set_campaign_status(campaign_id, status)?;

        CAMPAIGNS_FINISHED.with_label_values(&[status.as_str()]).inc();
        info!(
            campaign_id,
            status = status.as_str(),
            sent = agg.sent,
            failed = agg.failed,
            cancelled = agg.cancelled,
            "dispatch run finished"
        );

        Ok(DispatchSummary {
            campaign_id: campaign_id.to_string(),
            status,
            sent: agg.sent,
            failed: agg.failed,
            cancelled: agg.cancelled,
            total: agg.total,
        })
    }
}

/// Worker: pop records off the shared queue until it drains, the run is
/// cancelled, or the store goes down.
async fn worker_loop(ctx: Arc<RunContext>, worker_id: usize) {
    debug!(campaign_id = %ctx.campaign_id, worker_id, "worker started");
    loop {
        if ctx.cancel.is_cancelled() || ctx.store_down.load(Ordering::SeqCst) {
            break;
        }
        let record = ctx.queue.lock().await.pop_front();
        let Some(record) = record else {
            break;
        };

        if let Err(e) = process_record(&ctx, record).await {
            let mut failure = ctx.store_failure.lock().await;
            if failure.is_none() {
                *failure = Some(e);
            }
            ctx.store_down.store(true, Ordering::SeqCst);
            break;
        }
    }
    debug!(campaign_id = %ctx.campaign_id, worker_id, "worker stopped");
}

/// Drive one record to a terminal status, retrying transient provider
/// errors in place. A store error aborts immediately so no outcome is
/// silently dropped.
async fn process_record(ctx: &RunContext, record: SendRecord) -> Result<(), StoreError> {
    let phone = record.phone;
    let timeout = Duration::from_secs(u64::from(ctx.config.send_timeout_secs));

    loop {
        // Cancellation leaves the record Pending; the sweep settles it.
        if ctx.cancel.is_cancelled() {
            return Ok(());
        }

        let wait_start = Instant::now();
        ctx.limiter.acquire().await;
        RATE_LIMIT_WAIT
            .with_label_values(&[])
            .observe(wait_start.elapsed().as_secs_f64());

        let attempts = match ctx.store.record_attempt(&ctx.campaign_id, &phone) {
            Ok(n) => n,
            // Already settled by an earlier run, nothing to do. A record
            // that is genuinely missing is a store integration fault and
            // propagates like any other store error.
            Err(StoreError::RecordTerminal { .. }) => return Ok(()),
            Err(e) => return Err(e),
        };

        let request = SendRequest {
            phone: phone.clone(),
            template_id: ctx.template_id.clone(),
            variables: record.variables.clone(),
            timeout,
        };

        let send_start = Instant::now();
        let result = match tokio::time::timeout(timeout, ctx.gateway.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::timeout()),
        };
        let elapsed = send_start.elapsed().as_secs_f64();

        match result {
            Ok(message_id) => {
                SEND_ATTEMPTS.with_label_values(&["sent"]).inc();
                SEND_DURATION.with_label_values(&["sent"]).observe(elapsed);
                ctx.store
                    .mark_sent(&ctx.campaign_id, &phone, &message_id.0)?;
                debug!(
                    campaign_id = %ctx.campaign_id,
                    phone = %phone,
                    message_id = %message_id,
                    attempts,
                    "record sent"
                );
                return Ok(());
            }
            Err(err) if err.is_transient() && attempts < ctx.config.max_attempts => {
                SEND_ATTEMPTS.with_label_values(&["transient_error"]).inc();
                SEND_DURATION
                    .with_label_values(&["transient_error"])
                    .observe(elapsed);
                SEND_RETRIES.inc();

                let delay = backoff_delay(&ctx.config, attempts);
                warn!(
                    campaign_id = %ctx.campaign_id,
                    phone = %phone,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    "transient send error, retrying: {}",
                    err.detail
                );
                sleep(delay).await;
            }
            Err(err) => {
                let label = if err.is_transient() {
                    RETRIES_EXHAUSTED.inc();
                    "transient_error"
                } else {
                    "permanent_error"
                };
                SEND_ATTEMPTS.with_label_values(&[label]).inc();
                SEND_DURATION.with_label_values(&[label]).observe(elapsed);

                ctx.store
                    .mark_failed(&ctx.campaign_id, &phone, &err.detail)?;
                warn!(
                    campaign_id = %ctx.campaign_id,
                    phone = %phone,
                    attempts,
                    kind = %err.kind,
                    "record failed: {}",
                    err.detail
                );
                return Ok(());
            }
        }
    }
}

/// Exponential backoff: base doubles per attempt, capped.
fn backoff_delay(config: &DispatcherConfig, attempts_so_far: u32) -> Duration {
    let exp = attempts_so_far.saturating_sub(1).min(20);
    let ms = config
        .base_backoff_ms
        .saturating_mul(1u64 << exp)
        .min(config.max_backoff_ms);
    Duration::from_millis(ms)
}
