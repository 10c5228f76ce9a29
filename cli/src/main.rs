use std::sync::Arc;

use clap::Parser;
use compreface_api::CompreFaceClient;
use compreface_contracts::CompreFaceConfig;
use dotenv::dotenv;
use indicatif::ProgressBar;
use recognition_engine::{TaskEngine, TaskMode};
use serde_json::json;
use shared_api::settings::resolve_service_url;
use shared_api::{CancellationToken, FaceDetector, ProgressReporter, Settings};
use stash_api::StashClient;
use stash_contracts::StashConfig;
use tokio::task;
use tracing::{debug, error, info};
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};
use vision_api::{QualityServiceClient, VisionClient};
use vision_contracts::{QualityServiceConfig, VisionConfig};

mod host;

/// Plugin id under which the library stores our settings.
const PLUGIN_ID: &str = "faceRecognition";

/// CompreFace ships on this port when nothing else is configured.
const DEFAULT_COMPREFACE_URL: &str = "http://localhost:8000";

#[derive(Debug, clap::Parser)]
#[clap(name = "stash-face-recognizer")]
struct CliArgs {
    /// Read the task descriptor from a file instead of stdin (manual runs)
    #[clap(long, env = "TASK_DESCRIPTOR_FILE")]
    descriptor_file: Option<String>,

    #[clap(flatten)]
    stash: StashConfig,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Attempt to load the .env file, ignoring errors if the file doesn't exist
    dotenv().ok();
    let app_name = concat!(env!("CARGO_PKG_NAME"), "-", env!("CARGO_PKG_VERSION")).to_string();
    // stdout belongs to the host output document; all logging goes to stderr
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    let bunyan_formatting_layer = BunyanFormattingLayer::new(app_name.clone(), non_blocking_writer);
    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(JsonStorageLayer)
        .with(bunyan_formatting_layer);
    tracing::subscriber::set_global_default(subscriber).unwrap();
    tracing_log::LogTracer::init()?;
    info!(app_name, "starting");

    let args = CliArgs::parse();
    let input = host::read_task_descriptor(args.descriptor_file.as_deref()).await?;
    let mode = TaskMode::from_args(&input.args)?;
    let mode_name = format!("{:?}", mode);

    // bootstrap connection to read the host-stored settings
    let bootstrap = StashClient::new(&input.server_connection, None)?;
    let mut settings = Settings::from_plugin_config(bootstrap.plugin_settings(PLUGIN_ID).await?)?;
    if let Some(override_url) = args.stash.stash_host_url.clone() {
        settings.stash_host_url = Some(override_url);
    }
    settings.validate()?;

    let stash = Arc::new(StashClient::new(
        &input.server_connection,
        settings.stash_host_url.clone(),
    )?);

    let compreface_url = resolve_service_url(
        settings
            .compreface_url
            .as_deref()
            .unwrap_or(DEFAULT_COMPREFACE_URL),
    )
    .await;
    let recognizer = Arc::new(CompreFaceClient::new(CompreFaceConfig {
        compreface_url,
        recognition_api_key: settings.recognition_api_key.clone().unwrap_or_default(),
        detection_api_key: settings.detection_api_key.clone().unwrap_or_default(),
        verification_api_key: settings.verification_api_key.clone(),
        timeout_seconds: 60,
    })?);

    let vision = match &settings.vision_service_url {
        Some(url) => Some(Arc::new(VisionClient::new(VisionConfig {
            vision_service_url: resolve_service_url(url).await,
            timeout_seconds: 120,
        })?)),
        None => None,
    };

    let detector: Arc<dyn FaceDetector> = match &settings.quality_service_url {
        Some(url) => Arc::new(QualityServiceClient::new(QualityServiceConfig {
            quality_service_url: resolve_service_url(url).await,
            timeout_seconds: 60,
        })?),
        None => recognizer.clone(),
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = stop_signal().await {
            error!("failed to install signal handler: {}", e);
            return;
        }
        info!("stop signal received, finishing the current item");
        signal_cancel.cancel();
    });

    // rx,tx pair carrying progress reports from the engine to the host
    // protocol writer and, on a terminal, the progress bar
    let (tx_progress, mut rx_progress) = tokio::sync::mpsc::unbounded_channel();

    let engine = TaskEngine::new(
        stash,
        recognizer,
        vision,
        detector,
        settings,
        cancel.clone(),
        tx_progress,
    );

    let long_task = task::spawn(async move { engine.run(mode).await });

    let reporting_task = task::spawn(async move {
        let progress_bar = terminal_progress_bar();
        while let Some(progress_report) = rx_progress.recv().await {
            update_progress(progress_report, progress_bar.as_ref());
        }
        anyhow::Result::<()>::Ok(())
    });

    match tokio::try_join!(long_task, reporting_task) {
        Ok((run_result, _)) => match run_result {
            Ok(summary) => {
                debug!("both tasks succeeded");
                host::write_output(&json!({ "output": summary }));
            }
            Err(e) => {
                error!("task {} failed: {:#}", mode_name, e);
                host::log_error(&format!("task {} failed: {:#}", mode_name, e));
                host::write_output(&json!({ "error": e.to_string() }));
                std::process::exit(1);
            }
        },
        Err(e) => {
            error!("one of the tasks panicked: {}", e);
            host::log_error(&format!("task {} aborted: {}", mode_name, e));
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(unix)]
async fn stop_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn stop_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// A progress bar only makes sense when a person is watching.
fn terminal_progress_bar() -> Option<ProgressBar> {
    if !console::Term::stderr().is_term() {
        return None;
    }
    let progress_bar = ProgressBar::new(100);
    if let Ok(style) = indicatif::ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} [{elapsed_precise}] {msg:.yellow.bold} [{wide_bar:.green/green}] {pos}%")
    {
        progress_bar.set_style(style);
    }
    progress_bar.set_message("starting");
    Some(progress_bar)
}

fn update_progress(progress_report: ProgressReporter, progress_bar: Option<&ProgressBar>) {
    match progress_report {
        ProgressReporter::Fraction(fraction) => {
            host::log_progress(fraction);
            if let Some(bar) = progress_bar {
                bar.set_position((fraction * 100.0).round() as u64);
            }
        }
        ProgressReporter::Message(message) => {
            host::log_info(&message);
            if let Some(bar) = progress_bar {
                bar.set_message(message);
            }
        }
        ProgressReporter::FinishWithMessage(message) => {
            host::log_info(&message);
            if let Some(bar) = progress_bar {
                bar.finish_with_message(message);
            }
        }
    }
}
