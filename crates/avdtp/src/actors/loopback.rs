//! In-process link layer connecting stacks running on the same runtime.
//!
//! A [`LoopbackHub`] task plays the role of the radio: each attached device
//! gets a [`ChannelLink`] for its downward requests and a receiver of
//! [`LinkIndication`]s. Channels connect in order, configuration completes
//! right after the acceptor answers, and writes are delivered unchanged to
//! the other end.

use crate::link::{ChannelParams, LinkIndication, LinkLayer, WriteResult};
use crate::types::{Lcid, PeerAddr};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// First dynamically allocated channel id.
const FIRST_DYNAMIC_LCID: u16 = 0x0040;

#[derive(Debug)]
enum HubRequest {
    Attach {
        addr: PeerAddr,
        indications: mpsc::UnboundedSender<LinkIndication>,
        next_lcid: Arc<AtomicU16>,
    },
    Connect {
        from: PeerAddr,
        lcid: Lcid,
        to: PeerAddr,
        mtu: u16,
    },
    ConnectRsp {
        from: PeerAddr,
        lcid: Lcid,
        accept: bool,
    },
    Disconnect {
        from: PeerAddr,
        lcid: Lcid,
    },
    Write {
        from: PeerAddr,
        lcid: Lcid,
        data: Bytes,
    },
}

/// Handle to the hub task.
#[derive(Debug, Clone)]
pub struct LoopbackHub {
    requests: mpsc::UnboundedSender<HubRequest>,
    cancel_token: CancellationToken,
}

impl LoopbackHub {
    /// Spawn the hub task.
    #[must_use]
    pub fn spawn() -> Self {
        let (requests, receiver) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let hub = Hub {
            receiver,
            cancel_token: cancel_token.clone(),
            devices: HashMap::new(),
            channels: HashMap::new(),
        };
        tokio::spawn(hub.run());
        Self {
            requests,
            cancel_token,
        }
    }

    /// Attach a device. Returns its link layer and indication stream.
    #[must_use]
    pub fn attach(&self, addr: PeerAddr) -> (ChannelLink, mpsc::UnboundedReceiver<LinkIndication>) {
        let (indications, receiver) = mpsc::unbounded_channel();
        let next_lcid = Arc::new(AtomicU16::new(FIRST_DYNAMIC_LCID));
        if self
            .requests
            .send(HubRequest::Attach {
                addr,
                indications,
                next_lcid: Arc::clone(&next_lcid),
            })
            .is_err()
        {
            warn!(target: "avdtp.loopback", %addr, "Hub is gone, device not attached");
        }
        let link = ChannelLink {
            local: addr,
            requests: self.requests.clone(),
            next_lcid,
        };
        (link, receiver)
    }

    /// Stop the hub. Every further write fails.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}

/// [`LinkLayer`] of one device attached to a [`LoopbackHub`].
#[derive(Debug)]
pub struct ChannelLink {
    local: PeerAddr,
    requests: mpsc::UnboundedSender<HubRequest>,
    next_lcid: Arc<AtomicU16>,
}

impl ChannelLink {
    #[must_use]
    pub fn local(&self) -> PeerAddr {
        self.local
    }

    fn post(&self, request: HubRequest) -> bool {
        self.requests.send(request).is_ok()
    }
}

impl LinkLayer for ChannelLink {
    fn connect_req(&mut self, peer: PeerAddr, params: &ChannelParams) -> Option<Lcid> {
        let lcid = Lcid(self.next_lcid.fetch_add(1, Ordering::Relaxed));
        self.post(HubRequest::Connect {
            from: self.local,
            lcid,
            to: peer,
            mtu: params.mtu,
        })
        .then_some(lcid)
    }

    fn connect_rsp(&mut self, lcid: Lcid, accept: bool) {
        self.post(HubRequest::ConnectRsp {
            from: self.local,
            lcid,
            accept,
        });
    }

    fn disconnect_req(&mut self, lcid: Lcid) {
        self.post(HubRequest::Disconnect {
            from: self.local,
            lcid,
        });
    }

    fn data_write(&mut self, lcid: Lcid, data: Bytes) -> WriteResult {
        if self.post(HubRequest::Write {
            from: self.local,
            lcid,
            data,
        }) {
            WriteResult::Accepted
        } else {
            WriteResult::Failed
        }
    }
}

#[derive(Debug)]
struct Device {
    indications: mpsc::UnboundedSender<LinkIndication>,
    next_lcid: Arc<AtomicU16>,
}

/// One end of a loopback channel.
#[derive(Debug, Clone, Copy)]
struct ChannelEnd {
    remote: PeerAddr,
    remote_lcid: Lcid,
    initiator: bool,
    mtu: u16,
    open: bool,
}

struct Hub {
    receiver: mpsc::UnboundedReceiver<HubRequest>,
    cancel_token: CancellationToken,
    devices: HashMap<PeerAddr, Device>,
    channels: HashMap<(PeerAddr, Lcid), ChannelEnd>,
}

impl Hub {
    #[instrument(skip_all, name = "avdtp.loopback")]
    async fn run(mut self) {
        info!(target: "avdtp.loopback", "Loopback hub started");
        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => break,
                request = self.receiver.recv() => match request {
                    Some(request) => self.handle(request),
                    None => break,
                },
            }
        }
        info!(
            target: "avdtp.loopback",
            devices = self.devices.len(),
            channels = self.channels.len() / 2,
            "Loopback hub stopped"
        );
    }

    fn deliver(&self, addr: PeerAddr, indication: LinkIndication) {
        let delivered = self
            .devices
            .get(&addr)
            .is_some_and(|d| d.indications.send(indication).is_ok());
        if !delivered {
            debug!(target: "avdtp.loopback", %addr, "Indication for detached device dropped");
        }
    }

    fn handle(&mut self, request: HubRequest) {
        match request {
            HubRequest::Attach {
                addr,
                indications,
                next_lcid,
            } => {
                debug!(target: "avdtp.loopback", %addr, "Device attached");
                self.devices.insert(
                    addr,
                    Device {
                        indications,
                        next_lcid,
                    },
                );
            }
            HubRequest::Connect {
                from,
                lcid,
                to,
                mtu,
            } => {
                let Some(device) = self.devices.get(&to) else {
                    debug!(target: "avdtp.loopback", %from, %to, "Connect to unknown device");
                    self.deliver(
                        from,
                        LinkIndication::ConnectCfm {
                            lcid,
                            success: false,
                        },
                    );
                    return;
                };
                let remote_lcid = Lcid(device.next_lcid.fetch_add(1, Ordering::Relaxed));
                self.channels.insert(
                    (from, lcid),
                    ChannelEnd {
                        remote: to,
                        remote_lcid,
                        initiator: true,
                        mtu,
                        open: false,
                    },
                );
                self.channels.insert(
                    (to, remote_lcid),
                    ChannelEnd {
                        remote: from,
                        remote_lcid: lcid,
                        initiator: false,
                        mtu,
                        open: false,
                    },
                );
                self.deliver(
                    to,
                    LinkIndication::ConnectInd {
                        peer: from,
                        lcid: remote_lcid,
                    },
                );
            }
            HubRequest::ConnectRsp { from, lcid, accept } => {
                let Some(end) = self.channels.get(&(from, lcid)).copied() else {
                    return;
                };
                if end.initiator || end.open {
                    return;
                }
                if !accept {
                    self.channels.remove(&(from, lcid));
                    self.channels.remove(&(end.remote, end.remote_lcid));
                    self.deliver(
                        end.remote,
                        LinkIndication::ConnectCfm {
                            lcid: end.remote_lcid,
                            success: false,
                        },
                    );
                    return;
                }
                for key in [(from, lcid), (end.remote, end.remote_lcid)] {
                    if let Some(e) = self.channels.get_mut(&key) {
                        e.open = true;
                    }
                }
                self.deliver(
                    end.remote,
                    LinkIndication::ConnectCfm {
                        lcid: end.remote_lcid,
                        success: true,
                    },
                );
                self.deliver(
                    end.remote,
                    LinkIndication::ConfigComplete {
                        lcid: end.remote_lcid,
                        peer_mtu: end.mtu,
                    },
                );
                self.deliver(
                    from,
                    LinkIndication::ConfigComplete {
                        lcid,
                        peer_mtu: end.mtu,
                    },
                );
            }
            HubRequest::Disconnect { from, lcid } => {
                let Some(end) = self.channels.remove(&(from, lcid)) else {
                    return;
                };
                self.channels.remove(&(end.remote, end.remote_lcid));
                self.deliver(from, LinkIndication::Disconnected { lcid });
                self.deliver(
                    end.remote,
                    LinkIndication::Disconnected {
                        lcid: end.remote_lcid,
                    },
                );
            }
            HubRequest::Write { from, lcid, data } => match self.channels.get(&(from, lcid)) {
                Some(end) if end.open => {
                    let (remote, remote_lcid) = (end.remote, end.remote_lcid);
                    self.deliver(
                        remote,
                        LinkIndication::Data {
                            lcid: remote_lcid,
                            data,
                        },
                    );
                }
                _ => debug!(target: "avdtp.loopback", %from, %lcid, "Write on closed channel dropped"),
            },
        }
    }
}
