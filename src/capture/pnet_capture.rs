//! pnet-based capture and emission.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};

use super::PacketCapture;
use crate::domain::{ConnectPoint, InboundPacket, OutboundPacket};
use crate::error::CaptureError;
use crate::services::PacketService;

const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// A host interface bound to one connect point.
pub struct PnetCapture {
    interface: NetworkInterface,
    connect_point: ConnectPoint,
    rx: Box<dyn DataLinkReceiver>,
    tx: Option<Box<dyn DataLinkSender>>,
    running: Arc<AtomicBool>,
}

impl PnetCapture {
    /// Open a datalink channel on `interface_name` for `connect_point`.
    pub fn open(interface_name: &str, connect_point: ConnectPoint) -> Result<Self, CaptureError> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == interface_name)
            .ok_or_else(|| CaptureError::InterfaceNotFound(interface_name.to_string()))?;

        let config = Config {
            read_timeout: Some(READ_TIMEOUT),
            ..Config::default()
        };

        let (tx, rx) = match datalink::channel(&interface, config) {
            Ok(Channel::Ethernet(tx, rx)) => (tx, rx),
            Ok(_) => {
                return Err(CaptureError::ChannelCreation(
                    "unsupported channel type".to_string(),
                ))
            }
            Err(e) => {
                let msg = e.to_string();
                if e.kind() == io::ErrorKind::PermissionDenied
                    || msg.contains("Operation not permitted")
                {
                    return Err(CaptureError::InsufficientPermissions);
                }
                return Err(CaptureError::ChannelCreation(msg));
            }
        };

        Ok(Self {
            interface,
            connect_point,
            rx,
            tx: Some(tx),
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    pub fn connect_point(&self) -> &ConnectPoint {
        &self.connect_point
    }

    /// Hand the send half of the channel to an emitter. Only the first call
    /// returns it.
    pub fn take_sender(&mut self) -> Option<Box<dyn DataLinkSender>> {
        self.tx.take()
    }

    /// List all available network interfaces.
    pub fn list_interfaces() -> Vec<String> {
        datalink::interfaces()
            .into_iter()
            .map(|iface| {
                let status = if iface.is_up() { "UP" } else { "DOWN" };
                let mac = iface
                    .mac
                    .map(|mac| mac.to_string())
                    .unwrap_or_else(|| "no MAC".to_string());
                format!("{}: {} [{}]", iface.name, status, mac)
            })
            .collect()
    }
}

impl PacketCapture for PnetCapture {
    fn packets(&mut self) -> Result<Box<dyn Iterator<Item = InboundPacket> + '_>, CaptureError> {
        Ok(Box::new(FrameIterator {
            rx: &mut self.rx,
            connect_point: self.connect_point.clone(),
            running: Arc::clone(&self.running),
        }))
    }

    fn interface_name(&self) -> &str {
        &self.interface.name
    }

    fn set_running(&mut self, running: Arc<AtomicBool>) {
        self.running = running;
    }
}

struct FrameIterator<'a> {
    rx: &'a mut Box<dyn DataLinkReceiver>,
    connect_point: ConnectPoint,
    running: Arc<AtomicBool>,
}

impl Iterator for FrameIterator<'_> {
    type Item = InboundPacket;

    fn next(&mut self) -> Option<Self::Item> {
        while self.running.load(Ordering::SeqCst) {
            match self.rx.next() {
                Ok(frame) => {
                    if is_relay_candidate(frame) {
                        return Some(InboundPacket::new(self.connect_point.clone(), frame.to_vec()));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
                Err(e) => tracing::debug!("Capture error on {}: {}", self.connect_point, e),
            }
        }
        None
    }
}

/// Cheap ethertype filter ahead of full frame parsing.
fn is_relay_candidate(data: &[u8]) -> bool {
    let Some(ethernet) = EthernetPacket::new(data) else {
        return false;
    };
    let ethertype = ethernet.get_ethertype();
    ethertype == EtherTypes::Ipv4
        || ethertype == EtherTypes::Arp
        || ethertype == EtherTypes::Ipv6
        || ethertype == EtherTypes::Vlan
}

/// Emits frames through the datalink senders of the bound ports.
#[derive(Default)]
pub struct PnetPacketService {
    senders: Mutex<HashMap<ConnectPoint, Box<dyn DataLinkSender>>>,
}

impl PnetPacketService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connect_point: ConnectPoint, sender: Box<dyn DataLinkSender>) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connect_point, sender);
    }
}

impl PacketService for PnetPacketService {
    fn emit(&self, packet: OutboundPacket) {
        let target = packet.target();
        let mut senders = self.senders.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = senders.get_mut(&target) else {
            tracing::warn!("No bound port for {}, dropping frame", target);
            return;
        };
        match sender.send_to(&packet.data, None) {
            Some(Ok(())) => tracing::trace!("Sent {} bytes via {}", packet.data.len(), target),
            Some(Err(e)) => tracing::warn!("Failed to send via {}: {}", target, e),
            None => tracing::warn!("Send buffer unavailable on {}", target),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use macaddr::MacAddr6;
    use pnet::packet::arp::ArpOperations;

    use super::*;
    use crate::domain::VlanId;
    use crate::parser::{ArpMessage, EthernetFrame, FramePayload};

    fn frame(vlan: VlanId, payload: FramePayload) -> Vec<u8> {
        EthernetFrame {
            destination: MacAddr6::broadcast(),
            source: MacAddr6::new(0x02, 0, 0, 0, 0, 1),
            vlan,
            priority: 0,
            payload,
        }
        .to_bytes()
        .unwrap()
    }

    fn arp() -> FramePayload {
        FramePayload::Arp(ArpMessage {
            operation: ArpOperations::Request,
            sender_mac: MacAddr6::new(0x02, 0, 0, 0, 0, 1),
            sender_ip: Ipv4Addr::new(10, 0, 0, 2),
            target_mac: MacAddr6::nil(),
            target_ip: Ipv4Addr::new(10, 0, 0, 1),
        })
    }

    #[test]
    fn test_arp_and_tagged_frames_pass_filter() {
        assert!(is_relay_candidate(&frame(VlanId::NONE, arp())));
        assert!(is_relay_candidate(&frame(VlanId::new(10).unwrap(), arp())));
    }

    #[test]
    fn test_other_ethertypes_rejected() {
        assert!(!is_relay_candidate(&frame(
            VlanId::NONE,
            FramePayload::Other(0x88cc, vec![0; 32])
        )));
        assert!(!is_relay_candidate(&[0u8; 4]));
    }
}
