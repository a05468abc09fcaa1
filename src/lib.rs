#[macro_use]
extern crate tracing;

pub mod batch;
pub mod client;
pub mod error;
pub mod ledger;
pub mod progress;
pub mod retry;
pub mod scheduler;
pub mod settings;
pub mod wait;

pub use self::{
    batch::{Batch, DEFAULT_BATCH_SIZE, plan_batches},
    client::{ChargeSnapshot, ChargeSource, ChargeStatus, HttpClient, SubmissionClient, SubmitResponse},
    error::{DrawError, DrawResult},
    ledger::ChargeLedger,
    progress::{FileProgressStore, ProgressStore},
    retry::{Backoff, RetryPolicy},
    scheduler::{DrawConfig, DrawOutcome, DrawReport, DrawScheduler, FailurePolicy},
    settings::Settings,
    wait::{CancelToken, Clock, SystemClock, WaitResult, sliced_wait},
};
