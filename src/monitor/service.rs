//! Monitor event loop
//!
//! One task owns the state store and every device supervisor. It handles
//! transport events, poll ticks and handle commands one at a time, so state
//! has a single writer and needs no locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::client::{ClientConfig, ConnectionSupervisor, DeviceEvent, EventSink, Session, Transport};
use crate::config::DeviceRegistry;
use crate::models::ModelResolver;
use crate::registry::{Broadcaster, StateStore};
use crate::telemetry::ErrorClassifier;
use crate::thumbnail::ThumbnailCache;

use super::config::MonitorConfig;
use super::handle::{Command, MonitorHandle};

/// Pending handle commands before callers wait
const COMMAND_CAPACITY: usize = 64;

/// Shortest accepted poll interval
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Printer fleet monitor
pub struct Monitor<T: Transport> {
    config: MonitorConfig,
    store: StateStore,
    supervisors: Vec<ConnectionSupervisor<T::Session>>,

    /// Device id to position in `supervisors`
    positions: HashMap<String, usize>,

    events: mpsc::Receiver<DeviceEvent>,
    commands: mpsc::Receiver<Command>,
}

impl<T: Transport> Monitor<T> {
    /// Connect every configured device and spawn the monitor loop
    ///
    /// Must be called from within a tokio runtime. A device whose session
    /// cannot be opened stays disconnected; the others are unaffected.
    pub fn start(
        config: MonitorConfig,
        devices: DeviceRegistry,
        resolver: ModelResolver,
        transport: T,
    ) -> MonitorHandle {
        let thumbnails = ThumbnailCache::new(config.archive_dir.clone());
        Self::start_with_thumbnails(config, devices, resolver, transport, thumbnails)
    }

    /// Like [`Monitor::start`] with a preconfigured thumbnail cache
    pub fn start_with_thumbnails(
        config: MonitorConfig,
        devices: DeviceRegistry,
        resolver: ModelResolver,
        transport: T,
        thumbnails: ThumbnailCache,
    ) -> MonitorHandle {
        let resolver = Arc::new(resolver);
        let store = StateStore::new(
            &devices,
            Arc::clone(&resolver),
            ErrorClassifier::new(config.temperature_delta),
            Broadcaster::new(config.broadcast_capacity),
        );

        let (event_tx, events) = mpsc::channel(config.event_capacity.max(1));
        let (command_tx, commands) = mpsc::channel(COMMAND_CAPACITY);

        let mut supervisors = Vec::with_capacity(devices.len());
        let mut positions = HashMap::with_capacity(devices.len());
        for device in devices.iter() {
            let client_config = ClientConfig::for_device(device)
                .reconnect_period(config.reconnect_period)
                .keep_alive(config.keep_alive)
                .shutdown_timeout(config.shutdown_timeout);

            let mut supervisor = ConnectionSupervisor::with_config(device.clone(), client_config);
            supervisor.connect(&transport, EventSink::new(device.id.as_str(), event_tx.clone()));

            positions.insert(device.id.clone(), supervisors.len());
            supervisors.push(supervisor);
        }

        tracing::info!(
            devices = supervisors.len(),
            poll_secs = config.poll_interval.as_secs(),
            "Monitor starting"
        );

        let monitor = Self {
            config,
            store,
            supervisors,
            positions,
            events,
            commands,
        };
        tokio::spawn(monitor.run());

        MonitorHandle::new(command_tx, resolver, Arc::new(thumbnails))
    }

    async fn run(mut self) {
        let period = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                // Drain delivered events before answering commands
                biased;

                Some(event) = self.events.recv() => self.handle_event(event),

                command = self.commands.recv() => {
                    let Some(command) = command else {
                        tracing::info!("All handles dropped");
                        self.close_all().await;
                        break;
                    };

                    if let Some(reply) = self.handle_command(command) {
                        tracing::info!("Shutdown requested");
                        self.close_all().await;
                        let _ = reply.send(());
                        break;
                    }
                }

                _ = ticker.tick() => self.poll(),
            }
        }

        tracing::info!("Monitor stopped");
    }

    fn handle_event(&mut self, event: DeviceEvent) {
        let Some(&pos) = self.positions.get(&*event.device_id) else {
            tracing::warn!(device = %event.device_id, "Event for unknown device");
            return;
        };

        let Some(update) = self.supervisors[pos].handle_event(event.event) else {
            return;
        };

        if let Err(e) = self.store.merge(&event.device_id, update) {
            tracing::warn!(device = %event.device_id, error = %e, "Failed to merge update");
        }
    }

    /// Serve a command; returns the reply channel of a shutdown request
    fn handle_command(&mut self, command: Command) -> Option<oneshot::Sender<()>> {
        // A dropped reply receiver means the caller gave up
        match command {
            Command::AllStates(reply) => {
                let _ = reply.send(self.store.snapshot());
            }
            Command::State { device_id, reply } => {
                let _ = reply.send(self.store.get(&device_id).cloned());
            }
            Command::RefreshAll(reply) => {
                let _ = reply.send(self.request_all());
            }
            Command::Subscribe(reply) => {
                let _ = reply.send(self.store.subscribe());
            }
            Command::Shutdown(reply) => return Some(reply),
        }
        None
    }

    fn poll(&mut self) {
        let sent = self.request_all();
        tracing::trace!(sent = sent, "Poll tick");

        let now = std::time::Instant::now();
        for supervisor in &self.supervisors {
            supervisor.check_silence(now, self.config.message_timeout);
        }
    }

    fn request_all(&self) -> usize {
        self.supervisors
            .iter()
            .filter(|s| s.request_status())
            .count()
    }

    /// Close every session concurrently, each bounded by its own timeout
    async fn close_all(&mut self) {
        let mut closing = JoinSet::new();
        for supervisor in &mut self.supervisors {
            if let Some(session) = supervisor.detach() {
                closing.spawn(session.close());
            }
        }

        let sessions = closing.len();
        while let Some(result) = closing.join_next().await {
            if let Err(e) = result {
                tracing::warn!(error = %e, "Session close task failed");
            }
        }
        tracing::debug!(sessions = sessions, "Sessions closed");
    }
}
