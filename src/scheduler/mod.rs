//! Scheduler module: decides which applications are due for a check and
//! dispatches check runs without waiting for them to finish.

mod retention;

pub use retention::*;

use crate::checker;
use crate::config::ServerConfig;
use crate::db::{ApplicationTarget, Store, MIN_CHECK_INTERVAL_SECS};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// The main scheduler that drives periodic check dispatch.
pub struct Scheduler {
    store: Arc<Store>,
    tick_interval: Duration,
    probe_timeout: Duration,
    stop_tx: broadcast::Sender<()>,
}

impl Scheduler {
    /// Create a new scheduler with the given store and configuration.
    pub fn new(store: Arc<Store>, cfg: &ServerConfig) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        Self {
            store,
            tick_interval: cfg.tick_interval(),
            probe_timeout: cfg.probe_timeout(),
            stop_tx,
        }
    }

    /// Start the tick loop. The returned handle resolves after a shutdown
    /// signal once in-flight checks have drained.
    pub fn start(&self) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let tick_interval = self.tick_interval;
        let probe_timeout = self.probe_timeout;
        let stop_rx = self.stop_tx.subscribe();

        tokio::spawn(run_tick_loop(store, tick_interval, probe_timeout, stop_rx))
    }

    /// Signal the tick loop to stop.
    pub fn shutdown(&self) {
        let _ = self.stop_tx.send(());
    }
}

/// Drive ticks until stopped.
///
/// `last_dispatch` lives here and only here: the tick loop is its single
/// writer, so no lock is needed and no other component can mutate it. It is
/// not persisted; after a restart every application is immediately due.
async fn run_tick_loop(
    store: Arc<Store>,
    tick_interval: Duration,
    probe_timeout: Duration,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut last_dispatch: HashMap<i64, Instant> = HashMap::new();
    let mut in_flight: JoinSet<()> = JoinSet::new();

    // Immediate full pass so a fresh start has data without waiting a tick.
    match store.list_applications() {
        Ok(apps) => {
            tracing::info!("Scheduler: initial pass over {} applications", apps.len());
            let now = Instant::now();
            for app in collect_due(&apps, &mut last_dispatch, now) {
                dispatch(&mut in_flight, store.clone(), app, probe_timeout);
            }
        }
        Err(e) => tracing::error!("Scheduler: initial registry read failed: {}", e),
    }

    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // the first tick completes immediately

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = interval.tick() => {
                reap_finished(&mut in_flight);

                let apps = match store.list_applications() {
                    Ok(apps) => apps,
                    Err(e) => {
                        // Skip this tick; the untouched map means nothing is
                        // silently dropped, just delayed to the next cadence.
                        tracing::error!("Scheduler: registry read failed: {}", e);
                        continue;
                    }
                };

                prune_departed(&apps, &mut last_dispatch);

                let now = Instant::now();
                let due = collect_due(&apps, &mut last_dispatch, now);
                if !due.is_empty() {
                    tracing::debug!("Scheduler: dispatching {} checks", due.len());
                }
                for app in due {
                    dispatch(&mut in_flight, store.clone(), app, probe_timeout);
                }
            }
        }
    }

    if !in_flight.is_empty() {
        tracing::info!("Scheduler: draining {} in-flight checks", in_flight.len());
    }
    while let Some(res) = in_flight.join_next().await {
        if let Err(e) = res {
            tracing::error!("Scheduler: check task failed: {}", e);
        }
    }
}

/// Collect applications whose interval has elapsed, marking each one as
/// dispatched *before* the caller spawns its check. A slow in-flight check
/// therefore cannot be re-dispatched on the next tick.
///
/// A missing map entry counts as infinitely elapsed, so unseen applications
/// are always due.
fn collect_due(
    apps: &[ApplicationTarget],
    last_dispatch: &mut HashMap<i64, Instant>,
    now: Instant,
) -> Vec<ApplicationTarget> {
    let mut due = Vec::new();

    for app in apps {
        let interval =
            Duration::from_secs(u64::from(app.check_interval.max(MIN_CHECK_INTERVAL_SECS)));
        let ready = last_dispatch
            .get(&app.id)
            .map_or(true, |last| now.duration_since(*last) >= interval);

        if ready {
            last_dispatch.insert(app.id, now);
            due.push(app.clone());
        }
    }

    due
}

/// Drop map entries for applications no longer in the registry.
fn prune_departed(apps: &[ApplicationTarget], last_dispatch: &mut HashMap<i64, Instant>) {
    last_dispatch.retain(|id, _| apps.iter().any(|a| a.id == *id));
}

/// Spawn one fire-and-forget check task. The task is its own error boundary:
/// probe failures become `down` rows inside the runner, and a panic aborts
/// only this task and surfaces when the set is reaped.
fn dispatch(
    in_flight: &mut JoinSet<()>,
    store: Arc<Store>,
    app: ApplicationTarget,
    probe_timeout: Duration,
) {
    in_flight.spawn(async move {
        // Jitter so a burst of simultaneously-due applications does not
        // probe in lockstep.
        let jitter = rand::random::<u64>() % 100;
        tokio::time::sleep(Duration::from_millis(jitter)).await;

        checker::run_checks(&store, &app, probe_timeout).await;
    });
}

fn reap_finished(in_flight: &mut JoinSet<()>) {
    while let Some(res) = in_flight.try_join_next() {
        if let Err(e) = res {
            tracing::error!("Scheduler: check task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(id: i64, check_interval: u32) -> ApplicationTarget {
        ApplicationTarget {
            id,
            server_id: 1,
            name: format!("app-{}", id),
            host: "127.0.0.1".to_string(),
            port: Some(8082),
            health_url: None,
            check_interval,
        }
    }

    #[test]
    fn test_unseen_application_is_immediately_due() {
        let apps = vec![target(1, 60)];
        let mut last = HashMap::new();

        let due = collect_due(&apps, &mut last, Instant::now());
        assert_eq!(due.len(), 1);
        assert!(last.contains_key(&1));
    }

    #[test]
    fn test_one_dispatch_per_interval_window() {
        // interval 60s, tick cadence 5s: exactly one dispatch per window,
        // not one per tick.
        let apps = vec![target(1, 60)];
        let mut last = HashMap::new();
        let t0 = Instant::now();

        let mut dispatches = 0;
        for tick in 0..=12 {
            let now = t0 + Duration::from_secs(5 * tick);
            dispatches += collect_due(&apps, &mut last, now).len();
        }

        // Due at t0 and again at t0+60s.
        assert_eq!(dispatches, 2);
    }

    #[test]
    fn test_not_due_before_interval_elapses() {
        let apps = vec![target(1, 60)];
        let mut last = HashMap::new();
        let t0 = Instant::now();

        assert_eq!(collect_due(&apps, &mut last, t0).len(), 1);
        assert_eq!(
            collect_due(&apps, &mut last, t0 + Duration::from_secs(59)).len(),
            0
        );
        assert_eq!(
            collect_due(&apps, &mut last, t0 + Duration::from_secs(60)).len(),
            1
        );
    }

    #[test]
    fn test_interval_below_tick_cadence_fires_once_per_tick() {
        // A 1s interval clamps to the 5s minimum: due on every 5s tick but
        // never more than once per tick.
        let apps = vec![target(1, 1)];
        let mut last = HashMap::new();
        let t0 = Instant::now();

        for tick in 0..5 {
            let now = t0 + Duration::from_secs(5 * tick);
            assert_eq!(collect_due(&apps, &mut last, now).len(), 1);
            assert_eq!(collect_due(&apps, &mut last, now).len(), 0);
        }
    }

    #[test]
    fn test_mark_happens_before_dispatch() {
        // Marking at collect time means a still-running check does not make
        // its application due again on the next tick.
        let apps = vec![target(1, 60)];
        let mut last = HashMap::new();
        let t0 = Instant::now();

        collect_due(&apps, &mut last, t0);
        // Next tick, the (hypothetically still in-flight) check's app is skipped.
        let due = collect_due(&apps, &mut last, t0 + Duration::from_secs(5));
        assert!(due.is_empty());
    }

    #[test]
    fn test_restart_resets_eligibility() {
        let apps = vec![target(1, 3600)];
        let mut last = HashMap::new();
        collect_due(&apps, &mut last, Instant::now());

        // A restart discards the map; the application is due again at once.
        let mut fresh: HashMap<i64, Instant> = HashMap::new();
        let due = collect_due(&apps, &mut fresh, Instant::now());
        assert_eq!(due.len(), 1);
    }

    #[test]
    fn test_independent_intervals() {
        let apps = vec![target(1, 60), target(2, 5)];
        let mut last = HashMap::new();
        let t0 = Instant::now();

        assert_eq!(collect_due(&apps, &mut last, t0).len(), 2);

        let due = collect_due(&apps, &mut last, t0 + Duration::from_secs(5));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, 2);
    }

    #[test]
    fn test_prune_departed_drops_stale_entries() {
        let apps = vec![target(1, 60)];
        let mut last = HashMap::new();
        last.insert(1, Instant::now());
        last.insert(99, Instant::now());

        prune_departed(&apps, &mut last);
        assert!(last.contains_key(&1));
        assert!(!last.contains_key(&99));
    }
}
