//! Relay manager: packet classification, server/gateway tracking and the
//! read-only query surface.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use macaddr::MacAddr6;

use crate::domain::{ConnectPoint, DhcpRecord, Host, HostEvent, HostEventKind, HostId, InboundPacket};
use crate::parser::{EthernetFrame, FramePayload, Ipv6Datagram, UdpDatagram};
use crate::relay::arp::ArpProxy;
use crate::relay::handler::{Dhcp4Handler, DHCP_CLIENT_PORT, DHCP_SERVER_PORT};
use crate::relay::Collaborators;
use crate::services::HostListener;
use crate::store::DhcpRelayStore;

const DHCPV6_CLIENT_PORT: u16 = 546;
const DHCPV6_SERVER_PORT: u16 = 547;

/// Where the DHCP server lives, as supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpServerConfig {
    pub server_ip: Ipv4Addr,
    pub server_connect_point: ConnectPoint,
    pub gateway_ip: Option<Ipv4Addr>,
}

/// Informational queries over relay state.
pub trait DhcpRelayService {
    fn dhcp_record(&self, host_id: &HostId) -> Option<Arc<DhcpRecord>>;

    fn dhcp_records(&self) -> Vec<Arc<DhcpRecord>>;

    /// Resolved MAC of the server, or of the gateway in front of it.
    fn dhcp_server_mac(&self) -> Option<MacAddr6>;
}

pub struct DhcpRelayManager {
    handler: Dhcp4Handler,
    arp: ArpProxy,
    store: Arc<DhcpRelayStore>,
    services: Collaborators,
    arp_enabled: AtomicBool,
}

impl DhcpRelayManager {
    /// Build a manager and register it for host events.
    pub fn new(services: Collaborators) -> Arc<Self> {
        let store = Arc::new(DhcpRelayStore::new());
        let manager = Arc::new(Self {
            handler: Dhcp4Handler::new(services.clone(), Arc::clone(&store)),
            arp: ArpProxy::new(Arc::clone(&services.interfaces)),
            store,
            services,
            arp_enabled: AtomicBool::new(true),
        });
        let listener = Arc::downgrade(&manager);
        manager.services.hosts.add_listener(listener);
        manager
    }

    pub fn handler(&self) -> &Dhcp4Handler {
        &self.handler
    }

    pub fn set_arp_enabled(&self, enabled: bool) {
        let previous = self.arp_enabled.swap(enabled, Ordering::Relaxed);
        if previous != enabled {
            tracing::info!("ARP handling {}", if enabled { "enabled" } else { "disabled" });
        }
    }

    pub fn arp_enabled(&self) -> bool {
        self.arp_enabled.load(Ordering::Relaxed)
    }

    /// Apply a new server target, then resolve its uplink from known hosts
    /// or ask host discovery to find it.
    pub fn update_config(&self, config: &DhcpServerConfig) {
        let previous = self.handler.config();
        self.handler.configure(
            config.server_ip,
            config.server_connect_point.clone(),
            config.gateway_ip,
        );

        let (probe_ip, what) = match config.gateway_ip {
            Some(gateway_ip) => (gateway_ip, "gateway"),
            None => (config.server_ip, "DHCP server"),
        };

        match self.services.hosts.hosts_by_ip(probe_ip).first() {
            Some(host) => self.host_updated(host),
            None => {
                tracing::info!("Probing to resolve {} IP {}", what, probe_ip);
                let hosts = &self.services.hosts;
                if let Some(ip) = previous.gateway_ip {
                    hosts.stop_monitoring_ip(ip);
                }
                if let Some(ip) = previous.server_ip {
                    hosts.stop_monitoring_ip(ip);
                }
                hosts.start_monitoring_ip(probe_ip);
            }
        }
    }

    /// Classify one inbound frame and emit whatever the relay answers with.
    pub fn process(&self, packet: &InboundPacket) {
        if let Some(out) = self.classify(packet) {
            self.services.packets.emit(out);
        }
    }

    fn classify(&self, packet: &InboundPacket) -> Option<crate::domain::OutboundPacket> {
        let frame = match EthernetFrame::parse(&packet.data) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Ignoring frame from {}: {}", packet.received_from, e);
                return None;
            }
        };

        match &frame.payload {
            FramePayload::Ipv4(ip) => match ip.udp() {
                Some(udp) if is_dhcp4(udp) => self.handler.handle(&frame, &packet.received_from),
                _ => None,
            },
            FramePayload::Ipv6(ip) if is_dhcp6(ip) => {
                tracing::debug!(
                    "DHCPv6 from {} on {} is not relayed",
                    frame.source,
                    packet.received_from
                );
                None
            }
            FramePayload::Arp(_) if self.arp_enabled() => {
                self.arp.handle(&frame, &packet.received_from)
            }
            _ => None,
        }
    }

    fn host_updated(&self, host: &Host) {
        let config = self.handler.config();
        if let Some(probe_ip) = config.probe_ip() {
            if host.has_ip(probe_ip) {
                self.handler.on_uplink_resolved(host.mac(), host.vlan());
            }
        }
    }

    fn host_removed(&self, host: &Host) {
        let config = self.handler.config();
        let owned = [config.server_ip, config.gateway_ip]
            .into_iter()
            .flatten()
            .find(|ip| host.has_ip(*ip));
        if let Some(ip) = owned {
            tracing::warn!("DHCP server/gateway host {} for {} removed", host.id, ip);
            self.handler.clear_uplink();
        }
    }
}

impl HostListener for DhcpRelayManager {
    fn event(&self, event: &HostEvent) {
        match event.kind {
            HostEventKind::Added | HostEventKind::Updated => self.host_updated(&event.host),
            HostEventKind::Removed => self.host_removed(&event.host),
            // Server relocation is not tracked.
            HostEventKind::Moved => {}
        }
    }
}

impl DhcpRelayService for DhcpRelayManager {
    fn dhcp_record(&self, host_id: &HostId) -> Option<Arc<DhcpRecord>> {
        self.store.get(host_id)
    }

    fn dhcp_records(&self) -> Vec<Arc<DhcpRecord>> {
        self.store.records()
    }

    fn dhcp_server_mac(&self) -> Option<MacAddr6> {
        self.handler.config().uplink.map(|uplink| uplink.mac)
    }
}

fn is_dhcp4(udp: &UdpDatagram) -> bool {
    let dhcp_port = |port| port == DHCP_SERVER_PORT || port == DHCP_CLIENT_PORT;
    dhcp_port(udp.source_port) && dhcp_port(udp.destination_port)
}

fn is_dhcp6(ip: &Ipv6Datagram) -> bool {
    let dhcp_port = |port| port == DHCPV6_CLIENT_PORT || port == DHCPV6_SERVER_PORT;
    matches!(ip.udp_ports, Some((src, dst)) if dhcp_port(src) && dhcp_port(dst))
}
