//! `StackActor` - runs one protocol stack instance on a tokio task.
//!
//! The actor owns the sans-IO [`Avdtp`] engine and serialises every input to
//! it: application requests from [`StackActorHandle`], link-layer indications
//! and timer firings. After each input the events the engine queued are
//! forwarded, in order, to the application's event channel.
//!
//! # Shutdown
//!
//! Cancelling the handle's token stops the actor and every timer it armed.
//! The actor also stops once all handles are dropped.

use super::messages::{StackMessage, StackStatus};
use super::timers::{TimerFired, TokioTimers};
use crate::config::Config;
use crate::engine::Avdtp;
use crate::errors::AvdtError;
use crate::events::{AvdtEvent, ConfigRejection};
use crate::link::{LinkIndication, LinkLayer, SecurityPolicy};
use crate::media::MediaPacket;
use crate::msg::{ErrorCode, Label, StreamConfig};
use crate::observability::metrics;
use crate::scb::{EndpointConfig, WriteOutcome};
use crate::types::{LinkState, PeerAddr, Seid, StreamHandle, StreamState};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default channel buffer size for the stack mailbox.
const STACK_CHANNEL_BUFFER: usize = 256;

/// Handle to a running [`StackActor`].
///
/// Every request is answered synchronously by the engine; procedure results
/// arrive later as [`AvdtEvent`]s on the channel returned by
/// [`StackActorHandle::spawn`].
#[derive(Clone, Debug)]
pub struct StackActorHandle {
    sender: mpsc::Sender<StackMessage>,
    cancel_token: CancellationToken,
}

impl StackActorHandle {
    /// Spawn a stack actor and return its handle and event stream.
    ///
    /// `indications` carries the link layer's upward indications for this
    /// stack; `link` is its downward half.
    pub fn spawn<L, S>(
        name: impl Into<String>,
        config: Config,
        link: L,
        indications: mpsc::UnboundedReceiver<LinkIndication>,
        security: S,
    ) -> (Self, mpsc::UnboundedReceiver<AvdtEvent>)
    where
        L: LinkLayer + Send + 'static,
        S: SecurityPolicy + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(STACK_CHANNEL_BUFFER);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();

        let timers = TokioTimers::new(fired_tx, &cancel_token);
        let actor = StackActor {
            name: name.into(),
            engine: Avdtp::new(config, link, timers, security),
            receiver,
            indications,
            fired: fired_rx,
            events: events_tx,
            cancel_token: cancel_token.clone(),
        };

        tokio::spawn(actor.run());

        (
            Self {
                sender,
                cancel_token,
            },
            events_rx,
        )
    }

    async fn request<R>(
        &self,
        make: impl FnOnce(oneshot::Sender<R>) -> StackMessage,
    ) -> Result<R, AvdtError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(make(tx))
            .await
            .map_err(|e| AvdtError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| AvdtError::Internal(format!("response receive failed: {e}")))
    }

    pub async fn register(&self, endpoint: EndpointConfig) -> Result<StreamHandle, AvdtError> {
        self.request(|respond_to| StackMessage::Register {
            endpoint,
            respond_to,
        })
        .await?
    }

    pub async fn remove(&self, stream: StreamHandle) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::Remove { stream, respond_to })
            .await?
    }

    pub async fn connect(&self, peer: PeerAddr) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::Connect { peer, respond_to })
            .await?
    }

    pub async fn disconnect(&self, peer: PeerAddr) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::Disconnect { peer, respond_to })
            .await?
    }

    pub async fn discover(&self, peer: PeerAddr) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::Discover { peer, respond_to })
            .await?
    }

    pub async fn get_capabilities(
        &self,
        peer: PeerAddr,
        seid: Seid,
        all: bool,
    ) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::GetCapabilities {
            peer,
            seid,
            all,
            respond_to,
        })
        .await?
    }

    pub async fn set_configuration(
        &self,
        stream: StreamHandle,
        peer: PeerAddr,
        peer_seid: Seid,
        config: StreamConfig,
    ) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::SetConfiguration {
            stream,
            peer,
            peer_seid,
            config,
            respond_to,
        })
        .await?
    }

    pub async fn config_response(
        &self,
        stream: StreamHandle,
        label: Label,
        result: Result<(), ConfigRejection>,
    ) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::ConfigResponse {
            stream,
            label,
            result,
            respond_to,
        })
        .await?
    }

    pub async fn get_configuration(&self, stream: StreamHandle) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::GetConfiguration { stream, respond_to })
            .await?
    }

    pub async fn open(&self, stream: StreamHandle) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::Open { stream, respond_to })
            .await?
    }

    pub async fn start(&self, streams: Vec<StreamHandle>) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::Start {
            streams,
            respond_to,
        })
        .await?
    }

    pub async fn suspend(&self, streams: Vec<StreamHandle>) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::Suspend {
            streams,
            respond_to,
        })
        .await?
    }

    pub async fn close(&self, stream: StreamHandle) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::Close { stream, respond_to })
            .await?
    }

    pub async fn abort(&self, stream: StreamHandle) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::Abort { stream, respond_to })
            .await?
    }

    pub async fn reconfigure(
        &self,
        stream: StreamHandle,
        config: StreamConfig,
    ) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::Reconfigure {
            stream,
            config,
            respond_to,
        })
        .await?
    }

    pub async fn reconfigure_response(
        &self,
        stream: StreamHandle,
        label: Label,
        result: Result<(), ConfigRejection>,
    ) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::ReconfigureResponse {
            stream,
            label,
            result,
            respond_to,
        })
        .await?
    }

    pub async fn security(&self, stream: StreamHandle, data: Bytes) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::Security {
            stream,
            data,
            respond_to,
        })
        .await?
    }

    pub async fn security_response(
        &self,
        stream: StreamHandle,
        label: Label,
        result: Result<Bytes, ErrorCode>,
    ) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::SecurityResponse {
            stream,
            label,
            result,
            respond_to,
        })
        .await?
    }

    pub async fn delay_report(&self, stream: StreamHandle, delay: u16) -> Result<(), AvdtError> {
        self.request(|respond_to| StackMessage::DelayReport {
            stream,
            delay,
            respond_to,
        })
        .await?
    }

    pub async fn write(
        &self,
        stream: StreamHandle,
        packet: MediaPacket,
    ) -> Result<WriteOutcome, AvdtError> {
        self.request(|respond_to| StackMessage::Write {
            stream,
            packet,
            respond_to,
        })
        .await?
    }

    pub async fn stream_state(&self, stream: StreamHandle) -> Result<Option<StreamState>, AvdtError> {
        self.request(|respond_to| StackMessage::StreamState { stream, respond_to })
            .await
    }

    pub async fn link_state(&self, peer: PeerAddr) -> Result<LinkState, AvdtError> {
        self.request(|respond_to| StackMessage::LinkState { peer, respond_to })
            .await
    }

    /// Get the current stack status.
    pub async fn get_status(&self) -> Result<StackStatus, AvdtError> {
        self.request(|respond_to| StackMessage::GetStatus { respond_to })
            .await
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The stack actor: engine plus its input channels.
pub struct StackActor<L: LinkLayer, S: SecurityPolicy> {
    name: String,
    engine: Avdtp<L, TokioTimers, S>,
    receiver: mpsc::Receiver<StackMessage>,
    indications: mpsc::UnboundedReceiver<LinkIndication>,
    fired: mpsc::UnboundedReceiver<TimerFired>,
    events: mpsc::UnboundedSender<AvdtEvent>,
    cancel_token: CancellationToken,
}

impl<L: LinkLayer, S: SecurityPolicy> StackActor<L, S> {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "avdtp.actor", fields(stack = %self.name))]
    async fn run(mut self) {
        info!(target: "avdtp.actor", stack = %self.name, "StackActor started");

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "avdtp.actor",
                        stack = %self.name,
                        "StackActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => self.handle_message(message),
                        None => {
                            info!(
                                target: "avdtp.actor",
                                stack = %self.name,
                                "StackActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }

                Some(indication) = self.indications.recv() => {
                    self.engine.handle_link(indication);
                }

                Some(fired) = self.fired.recv() => {
                    if self.engine.timers_mut().fired(fired) {
                        self.engine.on_timer(fired.token);
                    } else {
                        debug!(target: "avdtp.actor", token = ?fired.token, "Superseded timer firing dropped");
                    }
                }
            }

            self.forward_events();
            metrics::set_actor_mailbox_depth(self.receiver.len());
        }

        self.engine.timers_mut().shutdown();
        info!(
            target: "avdtp.actor",
            stack = %self.name,
            links = self.engine.link_count(),
            endpoints = self.engine.endpoint_count(),
            "StackActor stopped"
        );
    }

    fn forward_events(&mut self) {
        while let Some(event) = self.engine.poll_event() {
            if self.events.send(event).is_err() {
                debug!(target: "avdtp.actor", stack = %self.name, "Event receiver dropped");
            }
        }
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: StackMessage) {
        let engine = &mut self.engine;
        match message {
            StackMessage::Register {
                endpoint,
                respond_to,
            } => {
                let _ = respond_to.send(engine.register(endpoint));
            }
            StackMessage::Remove { stream, respond_to } => {
                let _ = respond_to.send(engine.remove(stream));
            }
            StackMessage::Connect { peer, respond_to } => {
                let _ = respond_to.send(engine.connect(peer));
            }
            StackMessage::Disconnect { peer, respond_to } => {
                let _ = respond_to.send(engine.disconnect(peer));
            }
            StackMessage::Discover { peer, respond_to } => {
                let _ = respond_to.send(engine.discover(peer));
            }
            StackMessage::GetCapabilities {
                peer,
                seid,
                all,
                respond_to,
            } => {
                let _ = respond_to.send(engine.get_capabilities(peer, seid, all));
            }
            StackMessage::SetConfiguration {
                stream,
                peer,
                peer_seid,
                config,
                respond_to,
            } => {
                let _ = respond_to.send(engine.set_configuration(stream, peer, peer_seid, config));
            }
            StackMessage::ConfigResponse {
                stream,
                label,
                result,
                respond_to,
            } => {
                let _ = respond_to.send(engine.config_response(stream, label, result));
            }
            StackMessage::GetConfiguration { stream, respond_to } => {
                let _ = respond_to.send(engine.get_configuration(stream));
            }
            StackMessage::Open { stream, respond_to } => {
                let _ = respond_to.send(engine.open(stream));
            }
            StackMessage::Start {
                streams,
                respond_to,
            } => {
                let _ = respond_to.send(engine.start(&streams));
            }
            StackMessage::Suspend {
                streams,
                respond_to,
            } => {
                let _ = respond_to.send(engine.suspend(&streams));
            }
            StackMessage::Close { stream, respond_to } => {
                let _ = respond_to.send(engine.close(stream));
            }
            StackMessage::Abort { stream, respond_to } => {
                let _ = respond_to.send(engine.abort(stream));
            }
            StackMessage::Reconfigure {
                stream,
                config,
                respond_to,
            } => {
                let _ = respond_to.send(engine.reconfigure(stream, config));
            }
            StackMessage::ReconfigureResponse {
                stream,
                label,
                result,
                respond_to,
            } => {
                let _ = respond_to.send(engine.reconfigure_response(stream, label, result));
            }
            StackMessage::Security {
                stream,
                data,
                respond_to,
            } => {
                let _ = respond_to.send(engine.security(stream, data));
            }
            StackMessage::SecurityResponse {
                stream,
                label,
                result,
                respond_to,
            } => {
                let _ = respond_to.send(engine.security_response(stream, label, result));
            }
            StackMessage::DelayReport {
                stream,
                delay,
                respond_to,
            } => {
                let _ = respond_to.send(engine.delay_report(stream, delay));
            }
            StackMessage::Write {
                stream,
                packet,
                respond_to,
            } => {
                let _ = respond_to.send(engine.write(stream, packet));
            }
            StackMessage::StreamState { stream, respond_to } => {
                let _ = respond_to.send(engine.stream_state(stream));
            }
            StackMessage::LinkState { peer, respond_to } => {
                let _ = respond_to.send(engine.link_state(peer));
            }
            StackMessage::GetStatus { respond_to } => {
                let status = StackStatus {
                    links: engine.link_count(),
                    endpoints: engine.endpoint_count(),
                    transport_channels: engine.transport_channels(),
                    mailbox_depth: self.receiver.len(),
                };
                let _ = respond_to.send(status);
            }
        }
    }
}
