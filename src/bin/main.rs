use std::{
    fs::File,
    io::BufWriter,
    mem,
    path::{Path, PathBuf},
    process,
    time::Duration,
};

use anyhow::Context;
use structopt::StructOpt;
use tokio::{runtime, signal};
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

use fedsim::{settings::Settings, simulation, state_machine::coordinator::RunSummary};

#[derive(Debug, StructOpt)]
#[structopt(name = "Simulator")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,

    /// Path of the file the final model and the round history are written to, as JSON
    #[structopt(long, parse(from_os_str))]
    history: Option<PathBuf>,
}

/// How long the runtime waits for timed out local trainings before the process exits.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn main() {
    let opt = Opt::from_args();

    let mut settings = Settings::new(&opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(mem::take(&mut settings.log.filter))
        .with_ansi(true)
        .init();

    let runtime = runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|err| {
            eprintln!("failed to start the runtime: {}", err);
            process::exit(1);
        });
    let result = runtime.block_on(run(&settings, opt.history));
    // blocking tasks of timed out clients may still be running
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);

    if let Err(err) = result {
        eprintln!("{:#}", err);
        process::exit(1);
    }
}

async fn run(settings: &Settings, history: Option<PathBuf>) -> anyhow::Result<()> {
    let (state_machine, _events) =
        simulation::init(settings).context("failed to set up the simulation")?;

    let summary = tokio::select! {
        summary = state_machine.run() => summary,
        _ = signal::ctrl_c() => {
            warn!("shutting down: interrupted");
            return Ok(());
        }
    };
    let summary = summary.context("the run was aborted")?;

    report(&summary);
    if let Some(path) = history {
        write_summary(&summary, &path)
            .with_context(|| format!("failed to write the history to {}", path.display()))?;
        info!("wrote the history to {}", path.display());
    }
    Ok(())
}

fn report(summary: &RunSummary) {
    info!(
        "finished {} rounds, {} of which failed",
        summary.history.len(),
        summary.num_failed_rounds()
    );
    match summary.last_evaluate_metrics() {
        Some(metrics) => {
            for (name, value) in metrics.iter() {
                info!("final {}: {:.4}", name, value);
            }
        }
        None => warn!("no round produced evaluation metrics"),
    }
}

fn write_summary(summary: &RunSummary, path: &Path) -> anyhow::Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}
