//! MQTT transport
//!
//! Devices expose an MQTT broker over TLS with a self-signed certificate, so
//! the TLS layer accepts whatever certificate the device presents; the access
//! code is the only credential.
//!
//! Each session runs its `rumqttc` event loop on its own task. After a
//! connection error the loop waits a fixed `reconnect_period` and polls again,
//! which makes `rumqttc` reconnect. Closing a session that is not connected
//! stops the loop at once, even mid-retry; a connected session first sends
//! its disconnect.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use rumqttc::tokio_rustls::rustls;
use rumqttc::{
    AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS, SubscribeReasonCode,
    TlsConfiguration,
};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

use super::config::ClientConfig;
use super::transport::{EventSink, Session, Transport, TransportEvent};

/// Requests the client may queue before `try_*` calls start failing
const REQUEST_CAPACITY: usize = 32;

/// `rumqttc`-backed transport
#[derive(Debug, Clone, Default)]
pub struct MqttTransport;

impl MqttTransport {
    /// Create a transport
    pub fn new() -> Self {
        Self
    }
}

impl Transport for MqttTransport {
    type Session = MqttSession;

    fn connect(&self, config: ClientConfig, events: EventSink) -> Result<MqttSession> {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options
            .set_credentials(&config.username, &config.password)
            .set_keep_alive(config.keep_alive)
            .set_max_packet_size(config.max_packet_size, config.max_packet_size)
            .set_transport(rumqttc::Transport::tls_with_config(
                TlsConfiguration::Rustls(Arc::new(device_tls_config())),
            ));

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

        tracing::info!(
            device = %events.device_id(),
            host = %config.host,
            port = config.port,
            "Connecting"
        );

        let stop = Arc::new(Notify::new());
        let task = tokio::spawn(run_event_loop(
            eventloop,
            events,
            config.reconnect_period,
            Arc::clone(&stop),
        ));

        Ok(MqttSession {
            client,
            task,
            stop,
            shutdown_timeout: config.shutdown_timeout,
        })
    }
}

/// An MQTT session with one device
pub struct MqttSession {
    client: AsyncClient,
    task: JoinHandle<()>,
    stop: Arc<Notify>,
    shutdown_timeout: Duration,
}

impl Session for MqttSession {
    fn subscribe(&self, topic: &str) -> Result<()> {
        self.client
            .try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| Error::Transport(e.to_string()))
    }

    fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| Error::Transport(e.to_string()))
    }

    async fn close(self) {
        if let Err(e) = self.client.try_disconnect() {
            tracing::debug!(error = %e, "Disconnect request not queued");
        }
        self.stop.notify_one();

        let abort = self.task.abort_handle();
        if tokio::time::timeout(self.shutdown_timeout, self.task)
            .await
            .is_err()
        {
            tracing::warn!("Session did not close in time, aborting");
            abort.abort();
        }
    }
}

/// Drive the `rumqttc` event loop, translating packets into events
///
/// Runs until the monitor is gone, the disconnect has been sent, or `stop`
/// fires while not connected.
async fn run_event_loop(
    mut eventloop: EventLoop,
    events: EventSink,
    reconnect_period: Duration,
    stop: Arc<Notify>,
) {
    let mut connected = false;
    let mut stopping = false;

    loop {
        let polled = if stopping {
            eventloop.poll().await
        } else {
            tokio::select! {
                _ = stop.notified() => {
                    if !connected {
                        tracing::debug!(device = %events.device_id(), "Stopped while offline");
                        break;
                    }
                    // Keep polling until the queued disconnect goes out
                    stopping = true;
                    continue;
                }
                polled = eventloop.poll() => polled,
            }
        };

        let delivered = match polled {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected = true;
                events.emit(TransportEvent::Connected).await
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let accepted = ack
                    .return_codes
                    .iter()
                    .all(|code| !matches!(code, SubscribeReasonCode::Failure));
                events.emit(TransportEvent::Subscribed { accepted }).await
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                events
                    .emit(TransportEvent::Message {
                        topic: publish.topic,
                        payload: publish.payload,
                    })
                    .await
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::debug!(device = %events.device_id(), "Disconnect sent");
                break;
            }
            Ok(_) => true,
            Err(_) if stopping => break,
            Err(e) => {
                let mut delivered = events.emit(TransportEvent::Error(e.to_string())).await;
                if connected {
                    connected = false;
                    delivered &= events.emit(TransportEvent::Offline).await;
                }

                tokio::select! {
                    _ = stop.notified() => {
                        tracing::debug!(device = %events.device_id(), "Stopped while offline");
                        break;
                    }
                    _ = tokio::time::sleep(reconnect_period) => {}
                }
                delivered && events.emit(TransportEvent::Reconnecting).await
            }
        };

        if !delivered {
            tracing::debug!(device = %events.device_id(), "Monitor gone, stopping session");
            break;
        }
    }
}

/// TLS configuration accepting the device's self-signed certificate
fn device_tls_config() -> rustls::ClientConfig {
    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(danger::AcceptDeviceCertificate))
        .with_no_client_auth()
}

mod danger {
    use super::rustls;
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
    use rustls::{DigitallySignedStruct, SignatureScheme};

    /// Trusts any server certificate
    #[derive(Debug)]
    pub(super) struct AcceptDeviceCertificate;

    impl ServerCertVerifier for AcceptDeviceCertificate {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            vec![
                SignatureScheme::RSA_PKCS1_SHA256,
                SignatureScheme::RSA_PKCS1_SHA384,
                SignatureScheme::RSA_PKCS1_SHA512,
                SignatureScheme::ECDSA_NISTP256_SHA256,
                SignatureScheme::ECDSA_NISTP384_SHA384,
                SignatureScheme::RSA_PSS_SHA256,
                SignatureScheme::RSA_PSS_SHA384,
                SignatureScheme::RSA_PSS_SHA512,
                SignatureScheme::ED25519,
            ]
        }
    }
}
