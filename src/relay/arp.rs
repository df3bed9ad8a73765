//! ARP proxy for the relay's own interface addresses.

use std::sync::Arc;

use pnet::packet::arp::ArpOperations;

use crate::domain::{best_vlan_match, ConnectPoint, OutboundPacket};
use crate::parser::{ArpMessage, EthernetFrame, FramePayload};
use crate::services::InterfaceService;

pub struct ArpProxy {
    interfaces: Arc<dyn InterfaceService>,
}

impl ArpProxy {
    pub fn new(interfaces: Arc<dyn InterfaceService>) -> Self {
        Self { interfaces }
    }

    /// Answer an ARP request for an address owned by an interface at
    /// `received_from` that accepts the request's VLAN. The reply goes
    /// straight back out of the same port; requests are never flooded.
    pub fn handle(&self, frame: &EthernetFrame, received_from: &ConnectPoint) -> Option<OutboundPacket> {
        let request = frame.arp()?;
        if request.operation != ArpOperations::Request {
            return None;
        }

        let candidates = self.interfaces.interfaces_by_port(received_from);
        if candidates.is_empty() {
            tracing::warn!("No interface configured at {}, ignoring ARP", received_from);
            return None;
        }
        let owners = candidates.iter().filter(|iface| iface.owns_ip(request.target_ip));
        let Some(iface) = best_vlan_match(owners, frame.vlan) else {
            tracing::trace!(
                "ARP for {} on VLAN {} at {} is not for us",
                request.target_ip,
                frame.vlan,
                received_from
            );
            return None;
        };
        let reply_mac = iface.mac_or_default();

        let reply = EthernetFrame {
            destination: frame.source,
            source: reply_mac,
            vlan: frame.vlan,
            priority: frame.priority,
            payload: FramePayload::Arp(ArpMessage {
                operation: ArpOperations::Reply,
                sender_mac: reply_mac,
                sender_ip: request.target_ip,
                target_mac: request.sender_mac,
                target_ip: request.sender_ip,
            }),
        };

        match reply.to_bytes() {
            Ok(bytes) => {
                tracing::trace!("ARP reply {} is-at {} to {}", request.target_ip, reply_mac, received_from);
                Some(OutboundPacket::to(received_from, bytes))
            }
            Err(e) => {
                tracing::debug!("Failed to encode ARP reply: {}", e);
                None
            }
        }
    }
}
