use metrics_exporter_prometheus::PrometheusBuilder;
use ringcore::application::stats::describe_metrics;
use ringcore::config::Config;
use ringcore::domain::shared::value_objects::CallId;
use ringcore::infrastructure::daemon::MemoryDaemon;
use ringcore::infrastructure::persistence::{MemoryContactDirectory, MemoryHistoryRepository};
use ringcore::{DaemonCallback, SipService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting ringcore");
    info!("Configuration loaded: {:?}", config);

    let metrics = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();

    let daemon = Arc::new(MemoryDaemon::new());
    let contacts = Arc::new(MemoryContactDirectory::new());
    contacts.add("+15551230001", "Alice");
    let history = Arc::new(MemoryHistoryRepository::new(config.history.max_entries));

    let service = SipService::new(daemon.clone(), history, contacts, &config.service);

    // Print every service event as JSON
    let mut events = service.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::warn!("Cannot encode {} event: {}", event.event_type(), e),
            }
        }
    });

    demo_conference(&service, &daemon).await?;

    let stats = service.stats().await?;
    info!("Service stats: {:?}", stats);
    for entry in service.history(10).await? {
        info!(
            "History: {} {} missed={} duration={:?}",
            entry.call_id,
            entry.display_name,
            entry.missed,
            entry.duration_seconds()
        );
    }

    service.shutdown().await?;
    drop(service);
    printer.await?;

    println!("{}", metrics.render());
    info!("ringcore stopped");
    Ok(())
}

/// Two calls merged into a conference, one split off by the daemon, both hung up
async fn demo_conference(service: &SipService, daemon: &MemoryDaemon) -> anyhow::Result<()> {
    info!("=== Conference Demo ===");

    service
        .notify(DaemonCallback::incoming_call("acct1", "A", "+15551230001"))
        .await?;
    service
        .notify(DaemonCallback::incoming_call("acct1", "B", "+15551230002"))
        .await?;
    service.notify(DaemonCallback::call_state_changed("A", "CURRENT")).await?;
    service.notify(DaemonCallback::call_state_changed("B", "CURRENT")).await?;

    let (a, b) = (CallId::new("A"), CallId::new("B"));
    service.create_conference(&a, &b).await?;

    daemon.set_participants("conf-1", &["A", "B"]).await;
    service.notify(DaemonCallback::conference_created("conf-1")).await?;
    let conference = service.get_conference("conf-1").await?;
    info!(
        "Conference {} has {} participants",
        conference.id(),
        conference.participant_count()
    );

    // Daemon drops B from the conference
    daemon.set_participants("conf-1", &["A"]).await;
    service
        .notify(DaemonCallback::conference_state_changed("conf-1", "ACTIVE_ATTACHED"))
        .await?;
    for conference in service.concurrent_calls().await? {
        info!("{} -> {:?}", conference.id(), conference.participant_ids());
    }

    service.notify(DaemonCallback::conference_removed("conf-1")).await?;
    service.notify(DaemonCallback::call_state_changed("A", "HUNGUP")).await?;
    service.notify(DaemonCallback::call_state_changed("B", "HUNGUP")).await?;

    let remaining = service.concurrent_calls().await?;
    info!("Conferences left: {}", remaining.len());
    info!("Daemon journal: {:?}", daemon.journal().await);

    info!("=== Conference Demo Complete ===");
    Ok(())
}
