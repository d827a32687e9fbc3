use anyhow::Context;
use clap::Parser;
use depthwatch::{
    DeviceSession, FileSink, MonitorCommand, MonitorSummary, PacketSink, QueueDrainer,
    SessionConfig, StreamMonitor, UpdateRate,
};
use futures::StreamExt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "depthwatch",
    version,
    about = "Measure rate, loss and latency of device output streams",
    long_about = "Open a device session described by a YAML file, drain its output queues\n\
                  and report per-stream statistics until interrupted."
)]
struct Cli {
    /// Session description (YAML)
    #[arg(long, short)]
    config: PathBuf,

    /// Stop after this many seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Report at most this many times per second, overriding the session file
    #[arg(long)]
    report_hz: Option<u32>,

    /// Read commands from stdin: `r [stream]` reset, `p` pause, `s` resume recording, `q` quit
    #[arg(long, short)]
    interactive: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "depthwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = SessionConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    let shutdown = CancellationToken::new();
    spawn_ctrl_c(shutdown.clone());
    if let Some(seconds) = cli.duration {
        let deadline = Duration::try_from_secs_f64(seconds).context("invalid --duration")?;
        let token = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            info!("Duration elapsed");
            token.cancel();
        });
    }

    let mut sinks: Vec<Box<dyn PacketSink>> = Vec::new();
    if let Some(dir) = &config.monitor.output_dir {
        sinks.push(Box::new(FileSink::create(dir, config.monitor.output_extension.as_str())?));
    }

    let session = DeviceSession::open(config).await?;
    let drainer = session.drainer(shutdown.clone());

    let outcome = run_monitor(&session, &drainer, &mut sinks, &cli).await;

    // The session is closed whatever the loop returned
    session.close().await;
    let summary = outcome?;

    info!(cycles = summary.cycles, reason = ?summary.reason, "Finished");
    for snapshot in &summary.snapshots {
        println!(
            "{} (packets: {}, lost: {}, reordered: {}, invalid: {})",
            snapshot, snapshot.packets, snapshot.lost_total, snapshot.reordered_total, snapshot.invalid_samples
        );
    }
    Ok(())
}

async fn run_monitor(
    session: &DeviceSession,
    drainer: &QueueDrainer,
    sinks: &mut [Box<dyn PacketSink>],
    cli: &Cli,
) -> depthwatch::Result<MonitorSummary> {
    let mut monitor = StreamMonitor::for_session(session)?;
    let rate = cli.report_hz.map(UpdateRate::Max).unwrap_or(session.config().monitor.report_rate);
    let mut reports = monitor.snapshots(rate);
    let printer = tokio::spawn(async move {
        while let Some(batch) = reports.next().await {
            for snapshot in batch.iter() {
                info!("{}", snapshot);
            }
        }
    });

    let commands = cli.interactive.then(spawn_stdin_commands);
    let summary = monitor.run(drainer, sinks, commands).await;
    printer.abort();
    summary
}

fn spawn_ctrl_c(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupt received, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("Unable to listen for Ctrl-C: {}", e),
        }
    });
}

fn spawn_stdin_commands() -> mpsc::Receiver<MonitorCommand> {
    let (tx, rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some(command) = parse_command(&line) else {
                warn!("Unknown command: {}", line.trim());
                continue;
            };
            let stop = command == MonitorCommand::Stop;
            if tx.send(command).await.is_err() || stop {
                break;
            }
        }
    });
    rx
}

fn parse_command(line: &str) -> Option<MonitorCommand> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "r" | "reset" => MonitorCommand::Reset { stream: words.next().map(str::to_string) },
        "p" | "pause" => MonitorCommand::SetRecording(false),
        "s" | "record" => MonitorCommand::SetRecording(true),
        "q" | "quit" => MonitorCommand::Stop,
        _ => return None,
    };
    Some(command)
}
