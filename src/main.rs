#[macro_use]
extern crate tracing;

use anyhow::Context;
use std::{
    fs::File,
    io::{self, BufRead, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, SystemTime},
};
use tracing_subscriber::EnvFilter;
use wplacer::{
    CancelToken, DrawConfig, DrawOutcome, DrawScheduler, FailurePolicy, FileProgressStore,
    HttpClient, ProgressStore, RetryPolicy, Settings, SystemClock,
};
use wplacer_common::{ArchivedPixelPlan, PixelPlan};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(argh::FromArgs)]
/// Draw a quantized pixel plan onto wplace, resuming where the last run stopped
struct Args {
    #[argh(option)]
    /// file containing the pixel plan (see wplacer-process)
    data: PathBuf,

    #[argh(option, default = "PathBuf::from(\"settings.json\")")]
    /// credentials file
    settings: PathBuf,

    #[argh(option, default = "PathBuf::from(\"progress.json\")")]
    /// checkpoint file
    progress: PathBuf,

    #[argh(option, default = "wplacer::DEFAULT_BATCH_SIZE")]
    /// pixels per request
    batch_size: usize,

    #[argh(option, default = "FailurePolicy::Skip")]
    /// what to do when a batch keeps failing: skip or halt
    on_failure: FailurePolicy,

    #[argh(option, default = "2")]
    /// attempts per batch, including the first
    attempts: u32,

    #[argh(switch, short = 'y')]
    /// resume from a saved checkpoint without asking
    yes: bool,

    #[argh(switch)]
    /// discard any saved checkpoint and start from the first batch
    fresh: bool,

    #[argh(option)]
    /// start at the provided unix timestamp
    start_at: Option<u64>,

    #[argh(option)]
    /// stop cleanly after this many seconds, keeping progress
    max_runtime: Option<u64>,
}

fn load_plan(path: &Path) -> anyhow::Result<PixelPlan> {
    let data_file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    // the plan file is only read, and only for the duration of this call
    let data = unsafe { memmap2::Mmap::map(&data_file)? };

    let archived = rkyv::access::<ArchivedPixelPlan, rkyv::rancor::Error>(&data)
        .context("invalid plan archive")?;
    let plan = rkyv::deserialize::<PixelPlan, rkyv::rancor::Error>(archived)?;

    Ok(plan)
}

fn ask_resume(checkpoint: usize, total: usize) -> bool {
    print!("Found saved progress at batch {checkpoint}/{total}. Resume? (Y/n): ");
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }

    matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes")
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args: Args = argh::from_env();

    info!("loading plan..");
    let plan = load_plan(&args.data)?;
    info!(pixels = plan.len(), chunk = ?plan.chunk, "loaded plan");

    if plan.is_empty() {
        info!("nothing to draw");
        return Ok(());
    }

    let settings = Settings::load(&args.settings)
        .with_context(|| format!("failed to load {}", args.settings.display()))?;
    let client = HttpClient::new(&settings, plan.chunk)?;

    let config = DrawConfig {
        batch_size: args.batch_size,
        retry: RetryPolicy {
            max_attempts: args.attempts,
            ..RetryPolicy::default()
        },
        on_failure: args.on_failure,
        ..DrawConfig::default()
    };
    config.validate()?;

    let mut store = FileProgressStore::new(&args.progress).with_fingerprint(plan.fingerprint());
    if args.fresh {
        store.clear()?;
    }

    if let Some(at_timestamp) = args.start_at {
        info!("waiting until {at_timestamp}..");
        let point_in_time = SystemTime::UNIX_EPOCH + Duration::from_secs(at_timestamp);
        let duration = point_in_time.duration_since(SystemTime::now())?;

        thread::sleep(duration);
    }

    let cancel = CancelToken::new();
    if let Some(secs) = args.max_runtime {
        let cancel = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            info!("max runtime reached, stopping after the current batch");
            cancel.cancel();
        });
    }

    let mut scheduler = DrawScheduler::connect(config, client, store, SystemClock)
        .context("failed to fetch charges")?
        .with_cancel(cancel);
    let yes = args.yes;
    let outcome = scheduler.run(&plan.pixels, |checkpoint, total| {
        yes || ask_resume(checkpoint, total)
    })?;

    match outcome {
        DrawOutcome::NothingToDraw => info!("nothing to draw"),
        DrawOutcome::Completed(report) => {
            if report.failed_batches.is_empty() {
                info!(batches = report.total_batches, "all batches sent");
            } else {
                warn!(failed = ?report.failed_batches, "finished with failed batches");
            }
        }
        DrawOutcome::Cancelled { next_batch, report } => {
            info!(
                next_batch,
                total = report.total_batches,
                "stopped early, rerun to continue"
            );
        }
        DrawOutcome::Halted { batch, .. } => {
            anyhow::bail!("batch {batch} kept failing, rerun to retry it");
        }
    }

    Ok(())
}
