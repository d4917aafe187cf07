//! In-memory transport for tests

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use crate::error::{Error, Result};

use super::config::ClientConfig;
use super::transport::{EventSink, Session, Transport};

#[derive(Default)]
struct Recorded {
    sinks: HashMap<String, EventSink>,
    configs: Vec<ClientConfig>,
    subscribed: Vec<String>,
    published: Vec<(String, Bytes)>,
    closed: Vec<String>,
    refuse: HashSet<String>,
    reject_subscribe: bool,
    close_delay: Option<Duration>,
}

/// Transport recording every session call
#[derive(Clone, Default)]
pub(crate) struct MockTransport {
    inner: Arc<Mutex<Recorded>>,
}

impl MockTransport {
    /// Fail `connect` for this device id
    pub fn refuse(&self, device_id: &str) {
        self.inner.lock().unwrap().refuse.insert(device_id.to_string());
    }

    /// Make every `subscribe` call fail
    pub fn reject_subscribe(&self) {
        self.inner.lock().unwrap().reject_subscribe = true;
    }

    /// Make every `close` take `delay`
    pub fn slow_close(&self, delay: Duration) {
        self.inner.lock().unwrap().close_delay = Some(delay);
    }

    /// Event sink handed to the session of `device_id`
    pub fn sink(&self, device_id: &str) -> EventSink {
        self.inner.lock().unwrap().sinks[device_id].clone()
    }

    pub fn configs(&self) -> Vec<ClientConfig> {
        self.inner.lock().unwrap().configs.clone()
    }

    pub fn subscribed(&self) -> Vec<String> {
        self.inner.lock().unwrap().subscribed.clone()
    }

    pub fn published(&self) -> Vec<(String, Bytes)> {
        self.inner.lock().unwrap().published.clone()
    }

    pub fn closed(&self) -> Vec<String> {
        self.inner.lock().unwrap().closed.clone()
    }
}

pub(crate) struct MockSession {
    device_id: String,
    inner: Arc<Mutex<Recorded>>,
}

impl Session for MockSession {
    fn subscribe(&self, topic: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.reject_subscribe {
            return Err(Error::Transport("subscribe queue full".into()));
        }
        inner.subscribed.push(topic.to_string());
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.inner
            .lock()
            .unwrap()
            .published
            .push((topic.to_string(), payload));
        Ok(())
    }

    async fn close(self) {
        let delay = self.inner.lock().unwrap().close_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.inner.lock().unwrap().closed.push(self.device_id);
    }
}

impl Transport for MockTransport {
    type Session = MockSession;

    fn connect(&self, config: ClientConfig, events: EventSink) -> Result<MockSession> {
        let device_id = events.device_id().to_string();
        let mut inner = self.inner.lock().unwrap();
        if inner.refuse.contains(&device_id) {
            return Err(Error::Transport("connection refused".into()));
        }

        inner.configs.push(config);
        inner.sinks.insert(device_id.clone(), events);

        Ok(MockSession {
            device_id,
            inner: Arc::clone(&self.inner),
        })
    }
}
