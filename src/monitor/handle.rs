//! Cloneable handle to a running monitor

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};
use crate::models::{ModelAsset, ModelResolver};
use crate::registry::{DeviceState, Subscription};
use crate::thumbnail::ThumbnailCache;

/// Requests served by the monitor loop
pub(super) enum Command {
    AllStates(oneshot::Sender<Vec<DeviceState>>),
    State {
        device_id: String,
        reply: oneshot::Sender<Option<DeviceState>>,
    },
    RefreshAll(oneshot::Sender<usize>),
    Subscribe(oneshot::Sender<Subscription>),
    Shutdown(oneshot::Sender<()>),
}

/// Handle for reading state from and controlling a monitor
///
/// State requests are answered by the monitor loop with cloned snapshots.
/// Model lookups and thumbnails are served directly from shared read-only
/// data without involving the loop.
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::Sender<Command>,
    resolver: Arc<ModelResolver>,
    thumbnails: Arc<ThumbnailCache>,
}

impl MonitorHandle {
    pub(super) fn new(
        commands: mpsc::Sender<Command>,
        resolver: Arc<ModelResolver>,
        thumbnails: Arc<ThumbnailCache>,
    ) -> Self {
        Self {
            commands,
            resolver,
            thumbnails,
        }
    }

    /// States of all devices in configuration order
    pub async fn all_states(&self) -> Result<Vec<DeviceState>> {
        self.request(Command::AllStates).await
    }

    /// State of one device, `None` for an unknown id
    pub async fn state(&self, device_id: &str) -> Result<Option<DeviceState>> {
        let device_id = device_id.to_string();
        self.request(|reply| Command::State { device_id, reply })
            .await
    }

    /// Ask every connected device for a full status push
    ///
    /// Returns the number of devices a request was sent to.
    pub async fn request_refresh_all(&self) -> Result<usize> {
        self.request(Command::RefreshAll).await
    }

    /// Full snapshot plus every later state update
    pub async fn subscribe(&self) -> Result<Subscription> {
        self.request(Command::Subscribe).await
    }

    /// Thumbnail of the project archive matching a job filename
    pub async fn thumbnail_for_gcode(&self, gcode_filename: &str) -> Option<Bytes> {
        self.thumbnails.thumbnail_for_gcode(gcode_filename).await
    }

    /// Model asset for a job filename
    pub fn resolve(&self, filename: &str) -> Option<ModelAsset> {
        self.resolver.resolve(filename).cloned()
    }

    /// Shared thumbnail cache
    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    /// Whether the monitor loop has stopped
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Close every device session and stop the monitor loop
    ///
    /// Returns once all sessions are closed.
    pub async fn shutdown(&self) -> Result<()> {
        self.request(Command::Shutdown).await
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| Error::MonitorClosed)?;
        rx.await.map_err(|_| Error::MonitorClosed)
    }
}

impl std::fmt::Debug for MonitorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}
