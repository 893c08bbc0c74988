mod domain;
mod infrastructure;

use crate::domain::models::{AppEvent, MessageSeverity, TransportKind};
use crate::domain::session::{ConnectTarget, Session};
use crate::domain::settings::{Settings, SettingsService};
use crate::infrastructure::input_source::LineInputSource;
use crate::infrastructure::transport::bridge::HidBridgeClient;
use anyhow::Context;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const USAGE: &str = "usage: hybrid_mouse [--network <host> | --hid] [--save]";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut settings_service = SettingsService::new()?;
    let save = apply_args(settings_service.get_mut(), std::env::args().skip(1))?;

    let _logging_guard =
        infrastructure::logging::init_logger(&settings_service.get().log_settings)
            .map_err(|e| eprintln!("Failed to initialize logging: {}", e))
            .ok();

    info!("Starting Hybrid Mouse");

    if save {
        settings_service.save()?;
        info!("Settings saved");
    }
    let settings = settings_service.get().clone();

    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let reporter = tokio::spawn(report_status(event_rx));

    let session = Session::new(settings.transport, event_tx);
    let target = match settings.transport {
        TransportKind::Network => ConnectTarget::network(settings.destination.clone()),
        TransportKind::Hid => {
            let client = HidBridgeClient::connect(&settings.hid_bridge_name)
                .await
                .context("Bluetooth HID is unavailable")?;
            ConnectTarget::hid(Arc::new(client))
        }
    };

    if let Err(e) = session.connect(target).await {
        // The failure status is still queued; let it reach the log first
        flush_status(session, reporter).await;
        return Err(anyhow::Error::new(e)
            .context(format!("Could not start {} session", settings.transport)));
    }
    if let Err(e) = session.attach_input(LineInputSource::stdin()) {
        flush_status(session, reporter).await;
        return Err(e.into());
    }

    tokio::select! {
        _ = session.run_until_idle() => info!("Session ended ({:?})", session.state()),
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }

    session.stop();
    flush_status(session, reporter).await;
    Ok(())
}

/// Drop the last session handle, closing the status stream, and wait until
/// everything already queued has been reported.
async fn flush_status(session: Arc<Session>, reporter: JoinHandle<usize>) -> usize {
    drop(session);
    reporter.await.unwrap_or_default()
}

/// Apply command-line overrides. Returns whether to persist them.
fn apply_args(
    settings: &mut Settings,
    args: impl IntoIterator<Item = String>,
) -> anyhow::Result<bool> {
    let mut save = false;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--network" => {
                settings.transport = TransportKind::Network;
                settings.destination = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--network needs a host\n{}", USAGE))?;
            }
            "--hid" => settings.transport = TransportKind::Hid,
            "--save" => save = true,
            other => anyhow::bail!("Unknown argument: {}\n{}", other, USAGE),
        }
    }

    Ok(save)
}

/// Stand-in for the status label: every status message ends up in the log.
/// Returns how many events were reported once the stream closes.
async fn report_status(mut events: mpsc::UnboundedReceiver<AppEvent>) -> usize {
    let mut reported = 0;
    while let Some(event) = events.recv().await {
        reported += 1;
        match event {
            AppEvent::ConnectionStatus(status) => info!("Connection status: {:?}", status),
            AppEvent::LogMessage(msg) => match msg.severity {
                MessageSeverity::Info | MessageSeverity::Success => info!("{}", msg.message),
                MessageSeverity::Warning => warn!("{}", msg.message),
                MessageSeverity::Error => error!("{}", msg.message),
            },
        }
    }
    reported
}
