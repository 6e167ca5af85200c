//! Lease manager
//!
//! Single owner of the engine's scheduling state. Consumes one stream of
//! [`LeaseEvent`]s: ticks are observed in order on the event loop (resume
//! marker persisted, then published to waiting acquires), while heartbeats,
//! sweeps and acquire requests run as spawned tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use leasekeeper_common::{LeaseError, RESUME_LAST_WATCHED_TICK, Tick};
use leasekeeper_persistence::{LeaseFilter, LeaseRecord, LeaseStore};

use crate::acquire::AcquireHandler;
use crate::config::LeaseConfig;
use crate::heartbeat::{HeartbeatClient, HeartbeatReporter};
use crate::model::{AcquireOutcome, AcquireRequest, ExpiryEntry, LeaseEvent};
use crate::moment::MomentSource;
use crate::notify::NotificationSink;
use crate::provisioner::{Provisioner, ProvisionerGate};
use crate::scheduler::{ExpiryScheduler, SweepReport};
use crate::state_machine::LeaseStateMachine;

#[derive(Clone, Copy, Debug, Default)]
struct TickCursor {
    /// Marker loaded by `init`
    resumed_from: Option<Tick>,
    /// Last tick processed since `init`
    processed: Option<Tick>,
}

impl TickCursor {
    fn accepts(&self, index: Tick) -> bool {
        match (self.processed, self.resumed_from) {
            (Some(last), _) => index > last,
            // The marker tick itself may not have finished before a restart
            (None, Some(marker)) => index >= marker,
            (None, None) => true,
        }
    }
}

pub struct LeaseManager {
    config: LeaseConfig,
    store: Arc<dyn LeaseStore>,
    state_machine: Arc<LeaseStateMachine>,
    gate: Arc<ProvisionerGate>,
    scheduler: Arc<ExpiryScheduler>,
    heartbeat: Arc<HeartbeatReporter>,
    acquire: Arc<AcquireHandler>,
    ticks: watch::Sender<Tick>,
    cursor: Mutex<TickCursor>,
    initialized: AtomicBool,
    running: AtomicBool,
    shutdown: Notify,
    stopped: watch::Sender<bool>,
    tasks: Mutex<JoinSet<()>>,
}

impl LeaseManager {
    pub fn new(
        config: LeaseConfig,
        store: Arc<dyn LeaseStore>,
        provisioner: Arc<dyn Provisioner>,
        notifier: Arc<dyn NotificationSink>,
        heartbeat_client: Arc<dyn HeartbeatClient>,
        moments: Arc<dyn MomentSource>,
    ) -> Result<Self, LeaseError> {
        config.validate()?;

        let (ticks, tick_rx) = watch::channel(0);
        let state_machine = Arc::new(LeaseStateMachine::new(store.clone()));
        let gate = Arc::new(ProvisionerGate::new(provisioner));
        let scheduler = Arc::new(ExpiryScheduler::new(moments));
        let heartbeat = Arc::new(HeartbeatReporter::new(
            heartbeat_client,
            store.clone(),
            config.heartbeat_frequency,
            config.initial_heartbeat_moment,
        ));
        let acquire = Arc::new(AcquireHandler::new(
            config.policy(),
            state_machine.clone(),
            gate.clone(),
            scheduler.clone(),
            notifier,
            tick_rx,
        ));
        let (stopped, _) = watch::channel(false);

        Ok(Self {
            config,
            store,
            state_machine,
            gate,
            scheduler,
            heartbeat,
            acquire,
            ticks,
            cursor: Mutex::new(TickCursor::default()),
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            stopped,
            tasks: Mutex::new(JoinSet::new()),
        })
    }

    /// Load the resume marker, rebuild the expiry schedule and restore the
    /// heartbeat moment
    pub async fn init(&self) -> Result<(), LeaseError> {
        let marker = self
            .store
            .get_resume_value(RESUME_LAST_WATCHED_TICK)
            .await
            .map_err(LeaseError::persistence)?;
        if let Some(marker) = marker {
            self.ticks.send_replace(marker);
        }
        *self.cursor.lock() = TickCursor {
            resumed_from: marker,
            processed: None,
        };

        let scheduled = self.scheduler.reconcile(self.store.as_ref()).await?;
        self.heartbeat.init().await?;
        self.initialized.store(true, Ordering::SeqCst);

        info!(
            resume_tick = ?marker,
            scheduled,
            storage = %self.store.storage_mode(),
            "Lease manager initialized"
        );
        Ok(())
    }

    /// Consume events until the channel closes or `shutdown` is called
    pub async fn run(&self, mut events: mpsc::Receiver<LeaseEvent>) -> Result<(), LeaseError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(LeaseError::Config(
                "lease manager must be initialized before it runs".to_string(),
            ));
        }
        self.stopped.send_replace(false);
        self.running.store(true, Ordering::SeqCst);
        info!("Lease manager started");

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.notified() => {
                    info!("Lease manager received shutdown");
                    break;
                }
                event = events.recv() => match event {
                    Some(LeaseEvent::Tick { index }) => self.on_tick(index).await,
                    Some(LeaseEvent::Acquire(request)) => self.spawn_acquire(request),
                    None => {
                        info!("Lease event channel closed");
                        break;
                    }
                },
            }
            self.reap_finished();
        }

        self.drain_tasks().await;
        self.running.store(false, Ordering::SeqCst);
        self.stopped.send_replace(true);
        info!("Lease manager stopped");
        Ok(())
    }

    /// Stop consuming events and wait for in-flight work to finish
    pub async fn shutdown(&self) {
        self.shutdown.notify_one();
        if self.running.load(Ordering::SeqCst) {
            let mut stopped = self.stopped.subscribe();
            if stopped.wait_for(|stopped| *stopped).await.is_err() {
                warn!("Lease manager stop signal dropped");
            }
        } else {
            self.drain_tasks().await;
        }
    }

    /// Process one tick to completion: marker, heartbeat and sweep
    ///
    /// Returns `None` when the tick is stale.
    pub async fn handle_tick(&self, index: Tick) -> Result<Option<SweepReport>, LeaseError> {
        if !self.observe_tick(index).await? {
            return Ok(None);
        }
        let moment = self.scheduler.moment_of(index);
        self.heartbeat.on_moment(moment).await;
        let report = self
            .scheduler
            .sweep(index, &self.gate, &self.state_machine)
            .await;
        Ok(Some(report))
    }

    pub async fn handle_acquire(&self, request: AcquireRequest) -> AcquireOutcome {
        self.acquire.handle(request).await
    }

    async fn on_tick(&self, index: Tick) {
        match self.observe_tick(index).await {
            Ok(true) => self.spawn_tick_work(index),
            Ok(false) => {}
            Err(e) => error!(tick = index, error = %e, "Failed to process tick"),
        }
    }

    /// Persist and publish `index`; false when it is stale
    async fn observe_tick(&self, index: Tick) -> Result<bool, LeaseError> {
        let cursor = *self.cursor.lock();
        if !cursor.accepts(index) {
            debug!(tick = index, last = ?cursor.processed, "Ignoring stale tick");
            return Ok(false);
        }

        self.store
            .set_resume_value(RESUME_LAST_WATCHED_TICK, index)
            .await
            .map_err(LeaseError::persistence)?;

        self.cursor.lock().processed = Some(index);
        self.ticks.send_replace(index);
        Ok(true)
    }

    fn spawn_tick_work(&self, index: Tick) {
        let moment = self.scheduler.moment_of(index);
        let heartbeat = self.heartbeat.clone();
        let scheduler = self.scheduler.clone();
        let gate = self.gate.clone();
        let state_machine = self.state_machine.clone();

        let mut tasks = self.tasks.lock();
        tasks.spawn(async move {
            heartbeat.on_moment(moment).await;
        });
        tasks.spawn(async move {
            let report = scheduler.sweep(index, &gate, &state_machine).await;
            if !report.expired.is_empty() || !report.orphaned.is_empty() {
                debug!(
                    tick = index,
                    expired = report.expired.len(),
                    orphaned = report.orphaned.len(),
                    "Sweep finished"
                );
            }
        });
    }

    fn spawn_acquire(&self, request: AcquireRequest) {
        let acquire = self.acquire.clone();
        self.tasks.lock().spawn(async move {
            acquire.handle(request).await;
        });
    }

    fn reap_finished(&self) {
        let mut tasks = self.tasks.lock();
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "Lease task panicked");
            }
        }
    }

    async fn drain_tasks(&self) {
        let mut tasks = std::mem::take(&mut *self.tasks.lock());
        if !tasks.is_empty() {
            info!(count = tasks.len(), "Waiting for in-flight lease tasks");
        }
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Lease task panicked");
            }
        }
    }

    pub fn config(&self) -> &LeaseConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    pub async fn lease(&self, reference: &str) -> Result<Option<LeaseRecord>, LeaseError> {
        self.store
            .find_by_key(reference)
            .await
            .map_err(LeaseError::persistence)
    }

    pub async fn leases(&self, filter: &LeaseFilter) -> Result<Vec<LeaseRecord>, LeaseError> {
        self.store
            .query_by_filter(filter)
            .await
            .map_err(LeaseError::persistence)
    }

    pub fn schedule(&self) -> Vec<ExpiryEntry> {
        self.scheduler.entries()
    }

    pub async fn orphaned(&self) -> Result<Vec<LeaseRecord>, LeaseError> {
        self.scheduler.orphaned(self.store.as_ref()).await
    }

    /// Most recently published tick
    pub fn current_tick(&self) -> Tick {
        *self.ticks.borrow()
    }

    /// Last tick processed, or the resume marker before the first one
    pub fn last_tick(&self) -> Option<Tick> {
        let cursor = *self.cursor.lock();
        cursor.processed.or(cursor.resumed_from)
    }

    pub fn last_heartbeat_moment(&self) -> Option<u64> {
        self.heartbeat.last_heartbeat_moment()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use leasekeeper_common::LeaseStatus;
    use leasekeeper_persistence::{MemoryLeaseStore, ResumePersistence};

    use crate::model::ProvisionSpec;
    use crate::moment::FixedMomentSize;
    use crate::testing::{FakeProvisioner, RecordingHeartbeat, RecordingSink};

    struct Fixture {
        manager: Arc<LeaseManager>,
        store: Arc<MemoryLeaseStore>,
        provisioner: Arc<FakeProvisioner>,
        heartbeat: Arc<RecordingHeartbeat>,
    }

    fn fixture_with(store: Arc<MemoryLeaseStore>) -> Fixture {
        let provisioner = FakeProvisioner::new();
        let heartbeat = RecordingHeartbeat::new();
        let manager = LeaseManager::new(
            LeaseConfig::default(),
            store.clone(),
            provisioner.clone(),
            RecordingSink::new(),
            heartbeat.clone(),
            Arc::new(FixedMomentSize::new(100).unwrap()),
        )
        .unwrap();
        Fixture {
            manager: Arc::new(manager),
            store,
            provisioner,
            heartbeat,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(Arc::new(MemoryLeaseStore::new()))
    }

    fn request(reference: &str, duration: u32) -> AcquireRequest {
        AcquireRequest {
            reference: reference.to_string(),
            tenant: "A".to_string(),
            duration,
            spec: ProvisionSpec::default(),
            compensation_token: None,
        }
    }

    async fn wait_for_status(store: &MemoryLeaseStore, reference: &str, status: LeaseStatus) {
        use leasekeeper_persistence::LeasePersistence;
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let record = store.find_by_key(reference).await.unwrap();
                if record.is_some_and(|r| r.status == status) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[test]
    fn test_tick_cursor() {
        let fresh = TickCursor::default();
        assert!(fresh.accepts(0));

        let resumed = TickCursor {
            resumed_from: Some(100),
            processed: None,
        };
        assert!(!resumed.accepts(99));
        assert!(resumed.accepts(100));

        let running = TickCursor {
            resumed_from: Some(100),
            processed: Some(100),
        };
        assert!(!running.accepts(100));
        assert!(running.accepts(101));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = LeaseConfig {
            acquire_window: 0,
            ..Default::default()
        };
        let result = LeaseManager::new(
            config,
            Arc::new(MemoryLeaseStore::new()),
            FakeProvisioner::new(),
            RecordingSink::new(),
            RecordingHeartbeat::new(),
            Arc::new(FixedMomentSize::new(100).unwrap()),
        );
        assert!(matches!(result, Err(LeaseError::Config(_))));
    }

    #[tokio::test]
    async fn test_run_requires_init() {
        let f = fixture();
        let (_tx, rx) = mpsc::channel(8);
        assert!(f.manager.run(rx).await.is_err());
    }

    #[tokio::test]
    async fn test_tick_persists_marker_and_drops_stale() {
        let f = fixture();
        f.manager.init().await.unwrap();

        assert!(f.manager.handle_tick(1000).await.unwrap().is_some());
        assert_eq!(f.manager.current_tick(), 1000);
        assert_eq!(
            f.store.get_resume_value(RESUME_LAST_WATCHED_TICK).await.unwrap(),
            Some(1000)
        );

        assert!(f.manager.handle_tick(1000).await.unwrap().is_none());
        assert!(f.manager.handle_tick(999).await.unwrap().is_none());
        assert_eq!(f.manager.last_tick(), Some(1000));
    }

    #[tokio::test]
    async fn test_marker_store_outage_skips_tick() {
        let f = fixture();
        f.manager.init().await.unwrap();
        f.manager.handle_tick(1000).await.unwrap();

        f.store.set_available(false);
        assert!(matches!(
            f.manager.handle_tick(1001).await,
            Err(LeaseError::Persistence(_))
        ));
        assert_eq!(f.manager.current_tick(), 1000);

        f.store.set_available(true);
        assert!(f.manager.handle_tick(1001).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_init_resumes_from_marker() {
        let store = Arc::new(MemoryLeaseStore::new());
        store
            .set_resume_value(RESUME_LAST_WATCHED_TICK, 5000)
            .await
            .unwrap();

        let f = fixture_with(store);
        f.manager.init().await.unwrap();
        assert_eq!(f.manager.current_tick(), 5000);
        assert_eq!(f.manager.last_tick(), Some(5000));

        assert!(f.manager.handle_tick(4999).await.unwrap().is_none());
        assert!(f.manager.handle_tick(5000).await.unwrap().is_some());
        assert!(f.manager.handle_tick(5000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_heartbeat_once_per_moment() {
        let f = fixture();
        f.manager.init().await.unwrap();

        for tick in [1000, 1010, 1050, 1099, 1100] {
            f.manager.handle_tick(tick).await.unwrap();
        }
        assert_eq!(*f.heartbeat.sent.lock(), vec![10, 11]);
        assert_eq!(f.manager.last_heartbeat_moment(), Some(11));
    }

    #[tokio::test]
    async fn test_restart_rebuilds_schedule() {
        let f = fixture();
        f.manager.init().await.unwrap();
        f.manager.handle_tick(1000).await.unwrap();
        for (reference, duration) in [("r1", 1), ("r2", 3), ("r3", 7)] {
            f.manager.handle_acquire(request(reference, duration)).await;
        }
        let before = f.manager.schedule();
        assert_eq!(before.len(), 3);

        let restarted = fixture_with(f.store.clone());
        restarted.manager.init().await.unwrap();
        assert_eq!(restarted.manager.schedule(), before);
        assert!(restarted.manager.orphaned().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_loop_end_to_end() {
        let f = fixture();
        f.manager.init().await.unwrap();

        let (tx, rx) = mpsc::channel(16);
        let manager = f.manager.clone();
        let run = tokio::spawn(async move { manager.run(rx).await });

        tx.send(LeaseEvent::Tick { index: 1000 }).await.unwrap();
        tx.send(LeaseEvent::Acquire(request("r1", 1))).await.unwrap();
        wait_for_status(&f.store, "r1", LeaseStatus::Acquired).await;
        assert_eq!(f.manager.schedule().len(), 1);

        // Out-of-order tick is dropped
        tx.send(LeaseEvent::Tick { index: 900 }).await.unwrap();
        tx.send(LeaseEvent::Tick { index: 1200 }).await.unwrap();
        wait_for_status(&f.store, "r1", LeaseStatus::Expired).await;
        assert!(f.manager.schedule().is_empty());
        assert_eq!(*f.provisioner.destroyed.lock(), vec!["c1".to_string()]);

        f.manager.shutdown().await;
        run.await.unwrap().unwrap();
        assert!(!f.manager.is_running());
        assert_eq!(f.manager.last_tick(), Some(1200));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_loop_heartbeats_strictly_increase() {
        let f = fixture();
        f.manager.init().await.unwrap();
        f.heartbeat
            .delay_ms
            .store(3, std::sync::atomic::Ordering::SeqCst);

        let (tx, rx) = mpsc::channel(16);
        let manager = f.manager.clone();
        let run = tokio::spawn(async move { manager.run(rx).await });

        // Every tick is a new moment, so tick work for neighbours overlaps
        for moment in 10..=60u64 {
            tx.send(LeaseEvent::Tick { index: moment * 100 }).await.unwrap();
        }
        tokio::time::timeout(Duration::from_secs(5), async {
            while f.manager.last_tick() != Some(6000) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        f.manager.shutdown().await;
        run.await.unwrap().unwrap();

        let sent = f.heartbeat.sent.lock().clone();
        assert!(!sent.is_empty());
        assert!(sent.windows(2).all(|pair| pair[0] < pair[1]), "{:?}", sent);
        assert_eq!(f.manager.last_heartbeat_moment(), sent.last().copied());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_shutdown_waits_for_in_flight_acquire() {
        let f = fixture();
        f.manager.init().await.unwrap();
        let release = Arc::new(Notify::new());
        *f.provisioner.create_gate.lock() = Some(release.clone());

        let (tx, rx) = mpsc::channel(16);
        let manager = f.manager.clone();
        let run = tokio::spawn(async move { manager.run(rx).await });

        tx.send(LeaseEvent::Acquire(request("r1", 1))).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while f.provisioner.create_count() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let manager = f.manager.clone();
        let shutdown = tokio::spawn(async move { manager.shutdown().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!shutdown.is_finished());

        release.notify_one();
        shutdown.await.unwrap();
        run.await.unwrap().unwrap();

        use leasekeeper_persistence::LeasePersistence;
        let record = f.store.find_by_key("r1").await.unwrap().unwrap();
        assert_eq!(record.status, LeaseStatus::Acquired);
    }
}
