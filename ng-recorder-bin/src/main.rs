mod logger;
mod settings;
mod sink;

use clap::{CommandFactory, Parser};
use logger::Logger;
use ng_recorder_core::{collect_all, Device};
use ng_recorder_opcua::OpcUaClient;
use settings::{Client, Settings, DEFAULT_CONFIG_FILE_NAME};
use sink::JsonLinesSink;
use std::{
    io::{self, BufWriter},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
    time::Instant,
};
use tracing::Level;

/// NG Recorder - reads the recording archives of an OPC UA measurement device
///
/// Every decoded archive point is written to stdout as one JSON object per
/// line; logs go to stderr.
#[derive(Parser)]
#[command(name = "ng-recorder")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "NG Recorder", long_about = None)]
struct Cli {
    /// Host name or address of the device
    host: Option<String>,

    /// OPC UA port of the device
    #[arg(default_value_t = Client::DEFAULT_PORT)]
    port: u16,

    /// Sets a custom config file with full path
    ///
    /// If not specified, 'ng-recorder.toml' in the current working directory
    /// is used when present.
    #[arg(short, long, env = "NG_RECORDER_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level regardless of the configured level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let Some(host) = cli.host.as_deref() else {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    };

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE_NAME));
    let settings = match Settings::new(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    let mut logger = Logger::new(settings.log.level());
    if let Err(e) = logger.initialize(&settings.log) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }
    if cli.verbose {
        logger.set_level(Level::DEBUG);
    }
    tracing::debug!(level = %logger.level(), config = %config_path.display(), "Settings loaded");

    let url = settings.client.endpoint_url(host, cli.port);
    run(&settings, &url).await
}

async fn run(settings: &Settings, url: &str) -> ExitCode {
    let started = Instant::now();
    let client = Arc::new(OpcUaClient::new(settings.client.options.clone()));
    let mut device = Device::new(client.clone());

    tracing::info!(url, "Connecting to device");
    if let Err(e) = device.connect(url).await {
        tracing::error!(url, error = %e, "Connecting to device failed");
        return ExitCode::FAILURE;
    }

    let mut sink = JsonLinesSink::new(BufWriter::new(io::stdout()));
    let outcome = collect_all(&mut device, &mut sink).await;
    if let Err(e) = sink.flush() {
        tracing::error!(error = %e, "Writing output failed");
    }
    client.disconnect().await;

    tracing::info!(
        recordings = outcome.recordings,
        read = outcome.read,
        points = outcome.points,
        written = sink.written(),
        failed = outcome.failed,
        "finished in {:.3}s",
        started.elapsed().as_secs_f64()
    );
    ExitCode::from(u8::try_from(outcome.exit_code()).unwrap_or(1))
}
