use anyhow::{Result, bail};
use clap::Args;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::cli::Output;
use crate::config::ParForConfig;
use crate::parallel::{BarProgress, CancellationToken, Cancelled, ParFor, ProgressReporter, RunOutcome};

#[derive(Args)]
pub struct RunArgs {
    /// First index of the range (inclusive)
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub lo: i64,

    /// Last index of the range (inclusive)
    #[arg(long, default_value_t = 999, allow_hyphen_values = true)]
    pub hi: i64,

    /// Desired worker count (default from configuration)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Iterations between interruption checks
    #[arg(long)]
    pub check_interval: Option<usize>,

    /// Make the loop body fail at this index
    #[arg(long, value_name = "INDEX", allow_hyphen_values = true)]
    pub fail_at: Option<i64>,

    /// Interrupt the loop after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub cancel_after_ms: Option<u64>,

    /// Simulated work per index in microseconds
    #[arg(long, value_name = "US", default_value_t = 0)]
    pub work_us: u64,

    /// Name used in logs and the progress bar
    #[arg(long, default_value = "synthetic")]
    pub name: String,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct RunSummary {
    name: String,
    lo: i64,
    hi: i64,
    outcome: &'static str,
    workers: usize,
    results: Option<usize>,
    sum: Option<i128>,
    elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub fn execute(args: RunArgs, config: &ParForConfig, output: &Output) -> Result<()> {
    let mut parfor = ParFor::new(args.lo, args.hi).with_config(config).name(args.name.clone());
    if let Some(workers) = args.workers {
        parfor = parfor.workers(workers);
    }
    if let Some(check_interval) = args.check_interval {
        parfor = parfor.check_interval(check_interval);
    }
    let workers = parfor.worker_count();

    let bar = Arc::new(if args.json || output.is_quiet() {
        BarProgress::hidden()
    } else {
        BarProgress::new(args.name.clone())
    });
    let token = CancellationToken::new();
    let parfor = parfor
        .progress(bar.clone() as Arc<dyn ProgressReporter>)
        .cancellation(token.clone());

    if let Some(ms) = args.cancel_after_ms {
        output.verbose(&format!("Interrupting after {ms}ms"));
        let token = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(ms));
            token.cancel();
        });
    }

    let fail_at = args.fail_at;
    let work = Duration::from_micros(args.work_us);
    let started = Instant::now();
    let outcome = parfor.run(move |index, _worker_id| {
        if !work.is_zero() {
            std::thread::sleep(work);
        }
        if fail_at == Some(index) {
            bail!("synthetic failure requested at index {index}");
        }
        Ok((index % 2 == 0).then_some(2 * index))
    });
    let elapsed = started.elapsed();
    bar.finish_and_clear();

    let summary = RunSummary {
        name: args.name,
        lo: args.lo,
        hi: args.hi,
        outcome: outcome.label(),
        workers,
        results: outcome.results().map(<[i64]>::len),
        sum: outcome
            .results()
            .map(|results| results.iter().map(|&value| value as i128).sum()),
        elapsed_ms: elapsed.as_millis(),
        error: match &outcome {
            RunOutcome::Failed(err) => Some(format!("{err:#}")),
            _ => None,
        },
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary, output);
    }

    match outcome {
        RunOutcome::Success(_) => Ok(()),
        RunOutcome::Cancelled => Err(Cancelled.into()),
        RunOutcome::Failed(err) => Err(err),
    }
}

fn print_summary(summary: &RunSummary, output: &Output) {
    let range = format!("[{}, {}]", summary.lo, summary.hi);
    match summary.outcome {
        "success" => output.status_indicator("SUCCESS", &format!("{} over {range}", summary.name), true),
        other => output.status_indicator(&other.to_uppercase(), &format!("{} over {range}", summary.name), false),
    }

    output.category("Summary");
    output.key_value("Workers:", &summary.workers.to_string(), false);
    if let (Some(results), Some(sum)) = (summary.results, summary.sum) {
        output.key_value("Results:", &results.to_string(), true);
        output.key_value("Sum:", &sum.to_string(), false);
    }
    output.key_value("Elapsed:", &format!("{}ms", summary.elapsed_ms), false);
}
