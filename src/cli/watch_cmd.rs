use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::renderer;
use crate::core::agents::notify::{self, Alert, NotificationAgent};
use crate::core::agents::refresh::RefreshAgent;
use crate::core::service::Service;

/// Run the refresh and notification agents until Ctrl-C.
pub async fn run(interval_override: Option<u64>, opts: &OutputOptions) -> Result<()> {
    let service = Service::new();
    let config = service.get_config();

    let enabled = config.enabled_providers();
    if enabled.is_empty() {
        eprintln!("No providers enabled. Run `aiq config init` to set up providers.");
        return Ok(());
    }

    let interval_minutes = interval_override.unwrap_or(config.refresh_interval).max(1);
    let cancel = CancellationToken::new();
    let (snapshot_tx, snapshot_rx) = mpsc::channel(32);

    let agent = Arc::new(RefreshAgent::new(
        service.provider_ctx(),
        Duration::from_secs(interval_minutes * 60),
        snapshot_tx,
        cancel.clone(),
    ));
    let mut handles = agent.spawn(&enabled);

    // Observer: desktop alert plus a terminal line per published snapshot
    let states = agent.states();
    let use_color = opts.use_color;
    let text_mode = matches!(opts.format, OutputFormat::Text);
    let notifier = NotificationAgent::new(config.notifications.clone());
    let (alert_tx, mut alert_rx) = mpsc::channel::<Alert>(16);
    handles.push(tokio::spawn(notifier.run(
        snapshot_rx,
        cancel.clone(),
        move |alert| {
            notify::deliver_desktop(alert);
            let _ = alert_tx.try_send(alert.clone());
        },
    )));

    println!(
        "Watching {} provider(s) every {} minute(s). Press Ctrl-C to stop.",
        enabled.len(),
        interval_minutes
    );

    loop {
        tokio::select! {
            Some(alert) = alert_rx.recv() => {
                println!("⚠ {}: {}", alert.title(), alert.body());
            }
            _ = tokio::time::sleep(Duration::from_secs(30)), if text_mode => {
                // Periodic console summary of the latest snapshots
                let states = states.read().await;
                for kind in &enabled {
                    if let Some(snapshot) =
                        states.get(kind).and_then(|s| s.snapshot.as_ref())
                    {
                        println!("{}\n", renderer::render_provider(snapshot, use_color));
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Shutting down...");
                cancel.cancel();
                break;
            }
        }
    }

    // In-flight fetches finish or are abandoned; none publish past this
    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}
