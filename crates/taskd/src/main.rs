mod config;
mod error;

use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing_subscriber::EnvFilter;

use taskd_catalog::Catalog;
use taskd_executor::Calibration;
use taskd_net::{serve, NetConfig};
use taskd_supervisor::Supervisor;

use error::TaskdError;

/// How often the Supervisor's dequeue loop re-checks the shutdown flag when
/// the event queue is idle.
const SUPERVISOR_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(err) = run() {
        tracing::error!(error = %err, "fatal startup failure");
        return Err(err.into());
    }
    Ok(())
}

fn run() -> Result<(), TaskdError> {
    let cfg = config::load()?;
    tracing::info!(
        bind = %cfg.bind,
        max_tasks = cfg.max_tasks,
        queue_capacity = cfg.queue_capacity,
        line_max = cfg.line_max,
        max_clients = cfg.max_clients,
        "starting taskd"
    );

    let calibration = Arc::new(Calibration::measure()?);
    tracing::info!(iters_per_ms = calibration.iters_per_ms, "CPU calibration complete");

    let catalog = Arc::new(Catalog::builtin());

    let listener = TcpListener::bind(cfg.bind).map_err(|source| TaskdError::Bind {
        addr: cfg.bind.to_string(),
        source,
    })?;

    let (sender, receiver) = taskd_protocol::bounded(cfg.queue_capacity);
    let shutdown = Arc::new(AtomicBool::new(false));

    spawn_signal_watcher(Arc::clone(&shutdown))?;

    let net_config = NetConfig {
        line_max: cfg.line_max,
        max_clients: cfg.max_clients,
        max_id: cfg.max_tasks as u32,
    };
    let net_shutdown = Arc::clone(&shutdown);
    let net_handle = thread::Builder::new()
        .name("taskd-acceptor".to_string())
        .spawn(move || {
            if let Err(err) = serve(listener, sender, net_shutdown, net_config) {
                tracing::error!(error = %err, "connection multiplexer stopped with an error");
            }
        })
        .expect("failed to spawn acceptor thread");

    let supervisor = Supervisor::new(catalog, calibration, cfg.max_tasks);
    supervisor.run(&receiver, &shutdown, SUPERVISOR_POLL_INTERVAL);

    // The Supervisor only returns once `shutdown` is set (by a SHUTDOWN
    // command, a signal, or both) — make sure the acceptor sees it too so
    // it stops taking new connections before we wait for it to drain.
    shutdown.store(true, Ordering::SeqCst);
    let _ = net_handle.join();

    tracing::info!("taskd shut down cleanly");
    Ok(())
}

/// Watches `SIGTERM`/`SIGINT` on a dedicated thread and sets `shutdown` on
/// the first one received — the same flag a `SHUTDOWN` command sets, so the
/// Supervisor and Connection Multiplexer don't need to know which triggered
/// it.
fn spawn_signal_watcher(shutdown: Arc<AtomicBool>) -> Result<(), TaskdError> {
    let mut signals = Signals::new([SIGTERM, SIGINT]).map_err(TaskdError::SignalSetup)?;
    thread::Builder::new()
        .name("taskd-signals".to_string())
        .spawn(move || {
            if signals.forever().next().is_some() {
                tracing::info!("received shutdown signal");
                shutdown.store(true, Ordering::SeqCst);
            }
        })
        .expect("failed to spawn signal-watcher thread");
    Ok(())
}
