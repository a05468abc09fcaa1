//! The drawing loop.
//!
//! For every batch, in index order: wait until the ledger can afford it, send
//! it (retrying per policy), reconcile the ledger with whatever the server
//! said, then move the checkpoint forward. The checkpoint always names the
//! next batch to attempt, so a crash between sending and saving resends at
//! most one batch and never skips one.

use crate::{
    batch::{Batch, DEFAULT_BATCH_SIZE, plan_batches},
    client::{ChargeSource, SubmissionClient, SubmitResponse},
    error::{DrawError, DrawResult},
    ledger::ChargeLedger,
    progress::ProgressStore,
    retry::RetryPolicy,
    wait::{CancelToken, Clock, WaitResult, sliced_wait},
};
use std::{str::FromStr, time::Duration};
use wplacer_common::Pixel;

/// What to do with a batch that still fails once retries are used up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Record it as failed and move the checkpoint past it.
    #[default]
    Skip,
    /// Stop the run with the checkpoint still pointing at it.
    Halt,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(Self::Skip),
            "halt" => Ok(Self::Halt),
            other => Err(format!("unknown failure policy `{other}`, expected skip or halt")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DrawConfig {
    pub batch_size: usize,
    /// longest single sleep while waiting for charges
    pub wait_slice: Duration,
    pub retry: RetryPolicy,
    pub on_failure: FailurePolicy,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            wait_slice: Duration::from_secs(10),
            retry: RetryPolicy::default(),
            on_failure: FailurePolicy::default(),
        }
    }
}

impl DrawConfig {
    /// Rejects settings no run could work with.
    pub fn validate(&self) -> DrawResult<()> {
        if self.batch_size == 0 {
            return Err(DrawError::InvalidBatchSize(self.batch_size));
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DrawReport {
    pub total_pixels: usize,
    pub total_batches: usize,
    pub start_batch: usize,
    /// batches sent during this run, failed ones included
    pub batches_sent: usize,
    /// pixels covered so far, counting batches finished by earlier runs
    pub pixels_done: usize,
    pub failed_batches: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DrawOutcome {
    NothingToDraw,
    Completed(DrawReport),
    Cancelled { next_batch: usize, report: DrawReport },
    Halted { batch: usize, report: DrawReport },
}

pub struct DrawScheduler<S, P, C> {
    config: DrawConfig,
    ledger: ChargeLedger,
    client: S,
    store: P,
    clock: C,
    cancel: CancelToken,
}

impl<S, P, C> DrawScheduler<S, P, C>
where
    S: SubmissionClient,
    P: ProgressStore,
    C: Clock,
{
    pub fn new(config: DrawConfig, ledger: ChargeLedger, client: S, store: P, clock: C) -> Self {
        Self {
            config,
            ledger,
            client,
            store,
            clock,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn ledger(&self) -> &ChargeLedger {
        &self.ledger
    }

    pub fn client(&self) -> &S {
        &self.client
    }

    pub fn store(&self) -> &P {
        &self.store
    }

    /// Draw `pixels`, resuming from a stored checkpoint if `confirm_resume`
    /// agrees. It is called with `(checkpoint, total_batches)`.
    ///
    /// Only planning and checkpoint-write failures are returned as errors;
    /// a batch the server refuses ends up in the report instead.
    pub fn run(
        &mut self,
        pixels: &[Pixel],
        confirm_resume: impl FnOnce(usize, usize) -> bool,
    ) -> DrawResult<DrawOutcome> {
        let batches = plan_batches(pixels, self.config.batch_size)?;
        if batches.is_empty() {
            info!("nothing to draw");
            self.store.clear()?;
            return Ok(DrawOutcome::NothingToDraw);
        }

        let start_batch = self.resume_point(batches.len(), confirm_resume)?;
        let mut report = DrawReport {
            total_pixels: pixels.len(),
            total_batches: batches.len(),
            start_batch,
            pixels_done: (start_batch * self.config.batch_size).min(pixels.len()),
            ..DrawReport::default()
        };

        for batch in &batches[start_batch..] {
            if self.cancel.is_cancelled() {
                info!(next_batch = batch.index, "cancelled, progress kept");
                return Ok(DrawOutcome::Cancelled {
                    next_batch: batch.index,
                    report,
                });
            }

            if let WaitResult::Cancelled { .. } = self.wait_for_charges(batch) {
                info!(next_batch = batch.index, "cancelled while waiting, progress kept");
                return Ok(DrawOutcome::Cancelled {
                    next_batch: batch.index,
                    report,
                });
            }

            let response = self.submit_with_retry(batch);
            report.batches_sent += 1;
            self.reconcile(batch, response.as_ref().ok());

            let status = response.as_ref().ok().map(|response| response.status);
            let delivered = match &response {
                Ok(response) if response.is_success() => true,
                Ok(response) => {
                    warn!(batch = batch.index, status = response.status, "batch rejected");
                    false
                }
                Err(error) => {
                    warn!(batch = batch.index, %error, "batch could not be delivered");
                    false
                }
            };

            if !delivered {
                report.failed_batches.push(batch.index);
                if self.config.on_failure == FailurePolicy::Halt {
                    error!(batch = batch.index, "halting, checkpoint left at failed batch");
                    return Ok(DrawOutcome::Halted {
                        batch: batch.index,
                        report,
                    });
                }
            }

            self.store.save(batch.index + 1)?;
            report.pixels_done += batch.cost();

            info!(
                "[{}/{}] batch {}/{}, HTTP {}, charges {:.2}/{}",
                report.pixels_done,
                report.total_pixels,
                batch.index + 1,
                report.total_batches,
                status.map_or_else(|| "-".to_string(), |status| status.to_string()),
                self.ledger.count(),
                self.ledger.max(),
            );
        }

        self.store.clear()?;
        info!(
            pixels = report.total_pixels,
            batches = report.total_batches,
            failed = report.failed_batches.len(),
            "completed all batches, progress cleared"
        );

        Ok(DrawOutcome::Completed(report))
    }

    fn resume_point(
        &mut self,
        num_batches: usize,
        confirm_resume: impl FnOnce(usize, usize) -> bool,
    ) -> DrawResult<usize> {
        match self.store.load() {
            None => Ok(0),
            Some(index) if index < num_batches => {
                if confirm_resume(index, num_batches) {
                    info!(batch = index, total = num_batches, "resuming");
                    Ok(index)
                } else {
                    info!("starting over");
                    self.store.clear()?;
                    Ok(0)
                }
            }
            Some(index) => {
                warn!(batch = index, total = num_batches, "stale checkpoint, starting over");
                self.store.clear()?;
                Ok(0)
            }
        }
    }

    fn wait_for_charges(&mut self, batch: &Batch) -> WaitResult {
        let now = self.clock.now();
        self.ledger.advance_to(now);

        let mut cost = batch.cost() as f64;
        if cost > self.ledger.max() {
            warn!(
                batch = batch.index,
                cost,
                max = self.ledger.max(),
                "batch costs more than the charge cap, sending once full"
            );
            cost = self.ledger.max();
        }

        let wait = self.ledger.wait_time_for(cost, now);
        if wait.is_zero() {
            return WaitResult::Elapsed;
        }

        let deficit = cost - self.ledger.projected_balance(now);
        info!(
            batch = batch.index,
            deficit,
            "waiting {:.1}s for charges",
            wait.as_secs_f64()
        );

        let result = sliced_wait(
            &self.clock,
            wait,
            self.config.wait_slice,
            &self.cancel,
            |waited, total| {
                info!(
                    "waited {:.1}/{:.1}s",
                    waited.as_secs_f64(),
                    total.as_secs_f64()
                );
            },
        );

        match result {
            WaitResult::Elapsed => self.ledger.advance_time(wait),
            WaitResult::Cancelled { waited } => self.ledger.advance_time(waited),
        }

        result
    }

    fn submit_with_retry(&mut self, batch: &Batch) -> DrawResult<SubmitResponse> {
        let mut attempt = 1;
        loop {
            let result = self.client.submit(batch);
            if !self.config.retry.should_retry(&result, attempt) {
                return result;
            }

            let delay = self.config.retry.backoff.delay(attempt);
            match &result {
                Ok(response) => {
                    warn!(batch = batch.index, status = response.status, attempt, ?delay, "retrying")
                }
                Err(error) => warn!(batch = batch.index, %error, attempt, ?delay, "retrying"),
            }

            self.clock.sleep(delay);
            attempt += 1;
        }
    }

    /// Trust the server's charge figures when it sends them, otherwise debit
    /// locally.
    fn reconcile(&mut self, batch: &Batch, response: Option<&SubmitResponse>) {
        let now = self.clock.now();
        match response.and_then(SubmitResponse::charges) {
            Some(charges) => self.ledger.observe(charges.count, charges.max, now),
            None => {
                debug!(batch = batch.index, "no charge state in response, debiting locally");
                self.ledger.advance_to(now);
                self.ledger.debit(batch.cost() as f64);
            }
        }
    }
}

impl<S, P, C> DrawScheduler<S, P, C>
where
    S: SubmissionClient + ChargeSource,
    P: ProgressStore,
    C: Clock,
{
    /// Check `config`, then seed the ledger from the account's current
    /// charges. Nothing is fetched when the config is unusable.
    pub fn connect(config: DrawConfig, client: S, store: P, clock: C) -> DrawResult<Self> {
        config.validate()?;

        let status = client.fetch_charges()?;
        let ledger = ChargeLedger::from_status(&status, clock.now());
        info!(
            "charges {:.2}/{}, regen 1 per {:.0}s",
            ledger.count(),
            ledger.max(),
            ledger.regen_interval().as_secs_f64()
        );

        Ok(Self::new(config, ledger, client, store, clock))
    }
}
