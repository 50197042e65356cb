//! Recording link layer.
//!
//! Every call the stack makes on its link layer is appended to a request log
//! that tests inspect and drain. Channel ids are handed out from a counter
//! starting at the first dynamic channel id.
//!
//! # Example
//!
//! ```rust,ignore
//! use avdtp_test_utils::MockLink;
//!
//! let link = MockLink::new().with_write_result(WriteResult::Congested);
//! ```

use avdtp::{ChannelParams, ChannelType, Lcid, LinkLayer, PeerAddr, WriteResult};
use bytes::Bytes;
use tracing::trace;

/// First channel id the mock hands out.
pub const FIRST_MOCK_LCID: u16 = 0x0040;

/// One call made by the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkRequest {
    Connect {
        peer: PeerAddr,
        params: ChannelParams,
        lcid: Lcid,
    },
    ConnectRsp {
        lcid: Lcid,
        accept: bool,
    },
    Disconnect {
        lcid: Lcid,
    },
    Write {
        lcid: Lcid,
        data: Bytes,
    },
}

/// Link layer that records requests instead of talking to a controller.
#[derive(Debug)]
pub struct MockLink {
    requests: Vec<LinkRequest>,
    next_lcid: u16,
    write_result: WriteResult,
    refuse_connect: bool,
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLink {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
            next_lcid: FIRST_MOCK_LCID,
            write_result: WriteResult::Accepted,
            refuse_connect: false,
        }
    }

    /// Answer every write with `result` (the packet is still recorded).
    #[must_use]
    pub fn with_write_result(mut self, result: WriteResult) -> Self {
        self.write_result = result;
        self
    }

    /// Return no channel id from `connect_req`.
    #[must_use]
    pub fn refusing_connections(mut self) -> Self {
        self.refuse_connect = true;
        self
    }

    pub fn set_write_result(&mut self, result: WriteResult) {
        self.write_result = result;
    }

    pub fn set_refuse_connect(&mut self, refuse: bool) {
        self.refuse_connect = refuse;
    }

    /// Allocate a channel id for a simulated inbound connection.
    pub fn allocate_lcid(&mut self) -> Lcid {
        let lcid = Lcid(self.next_lcid);
        self.next_lcid += 1;
        lcid
    }

    #[must_use]
    pub fn requests(&self) -> &[LinkRequest] {
        &self.requests
    }

    /// Drain the request log.
    pub fn take_requests(&mut self) -> Vec<LinkRequest> {
        std::mem::take(&mut self.requests)
    }

    /// Most recent connect request for `channel`, if any.
    #[must_use]
    pub fn last_connect(&self, channel: ChannelType) -> Option<(PeerAddr, Lcid)> {
        self.requests.iter().rev().find_map(|r| match r {
            LinkRequest::Connect { peer, params, lcid } if params.channel == channel => {
                Some((*peer, *lcid))
            }
            _ => None,
        })
    }

    /// Packets written on `lcid`, in order.
    #[must_use]
    pub fn writes_on(&self, lcid: Lcid) -> Vec<Bytes> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                LinkRequest::Write { lcid: l, data } if *l == lcid => Some(data.clone()),
                _ => None,
            })
            .collect()
    }

    /// Drain only the writes on `lcid`, leaving every other request logged.
    pub fn take_writes_on(&mut self, lcid: Lcid) -> Vec<Bytes> {
        let mut taken = Vec::new();
        self.requests.retain(|r| match r {
            LinkRequest::Write { lcid: l, data } if *l == lcid => {
                taken.push(data.clone());
                false
            }
            _ => true,
        });
        taken
    }

    /// Channels the stack asked to close, in order.
    #[must_use]
    pub fn disconnects(&self) -> Vec<Lcid> {
        self.requests
            .iter()
            .filter_map(|r| match r {
                LinkRequest::Disconnect { lcid } => Some(*lcid),
                _ => None,
            })
            .collect()
    }

    /// Drain the disconnect requests, leaving every other request logged.
    pub fn take_disconnects(&mut self) -> Vec<Lcid> {
        let mut taken = Vec::new();
        self.requests.retain(|r| match r {
            LinkRequest::Disconnect { lcid } => {
                taken.push(*lcid);
                false
            }
            _ => true,
        });
        taken
    }

    /// Answer given to an inbound connection, if one was sent.
    #[must_use]
    pub fn connect_answer(&self, lcid: Lcid) -> Option<bool> {
        self.requests.iter().rev().find_map(|r| match r {
            LinkRequest::ConnectRsp { lcid: l, accept } if *l == lcid => Some(*accept),
            _ => None,
        })
    }
}

impl LinkLayer for MockLink {
    fn connect_req(&mut self, peer: PeerAddr, params: &ChannelParams) -> Option<Lcid> {
        if self.refuse_connect {
            trace!(%peer, channel = params.channel.as_str(), "Mock link refusing connect");
            return None;
        }
        let lcid = self.allocate_lcid();
        self.requests.push(LinkRequest::Connect {
            peer,
            params: *params,
            lcid,
        });
        Some(lcid)
    }

    fn connect_rsp(&mut self, lcid: Lcid, accept: bool) {
        self.requests.push(LinkRequest::ConnectRsp { lcid, accept });
    }

    fn disconnect_req(&mut self, lcid: Lcid) {
        self.requests.push(LinkRequest::Disconnect { lcid });
    }

    fn data_write(&mut self, lcid: Lcid, data: Bytes) -> WriteResult {
        self.requests.push(LinkRequest::Write { lcid, data });
        self.write_result
    }
}
