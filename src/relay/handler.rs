//! DHCPv4 relay state machine.
//!
//! Requests from clients are rewritten toward the configured server, replies
//! from the server are rewritten back toward the client's attachment point.
//! Each call is independent: every unmet precondition drops that one packet
//! and DHCP client retransmission does the rest.

use std::net::Ipv4Addr;
use std::sync::Arc;

use macaddr::MacAddr6;
use pnet::ipnetwork::Ipv4Network;

use crate::domain::{
    CircuitId, ConnectPoint, DhcpMessageType, DhcpPacket, DhcpRecord, HostDescription, HostId,
    HostLocation, Interface, OutboundPacket, ProviderId, RelayAgentInformation, Route, RouteSource,
    VlanId,
};
use crate::error::RelayError;
use crate::parser::{DhcpParser, DhcpWriter, EthernetFrame};
use crate::relay::config::{RelayConfig, SharedRelayConfig, Uplink};
use crate::relay::resolver::{ClientInterface, InterfaceResolver};
use crate::relay::Collaborators;
use crate::store::DhcpRelayStore;

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;

/// Provider under which host facts learned from DHCP are published.
pub const PROVIDER_ID: ProviderId = ProviderId::new("host", "dhcp-relay");

pub struct Dhcp4Handler {
    config: SharedRelayConfig,
    resolver: InterfaceResolver,
    store: Arc<DhcpRelayStore>,
    services: Collaborators,
    parser: DhcpParser,
    writer: DhcpWriter,
}

impl Dhcp4Handler {
    pub fn new(services: Collaborators, store: Arc<DhcpRelayStore>) -> Self {
        Self {
            config: SharedRelayConfig::new(),
            resolver: InterfaceResolver::new(Arc::clone(&services.interfaces)),
            store,
            services,
            parser: DhcpParser::new(),
            writer: DhcpWriter::new(),
        }
    }

    /// Replace the server target. Any previously resolved uplink is dropped.
    pub fn configure(
        &self,
        server_ip: Ipv4Addr,
        server_connect_point: ConnectPoint,
        gateway_ip: Option<Ipv4Addr>,
    ) {
        tracing::info!(
            "DHCP server {} at {}{}",
            server_ip,
            server_connect_point,
            gateway_ip
                .map(|gw| format!(" via gateway {}", gw))
                .unwrap_or_default()
        );
        self.config.update(|config| {
            config.server_ip = Some(server_ip);
            config.server_connect_point = Some(server_connect_point);
            config.gateway_ip = gateway_ip;
            config.uplink = None;
        });
    }

    /// The server (or gateway) host binding became known.
    pub fn on_uplink_resolved(&self, mac: MacAddr6, vlan: VlanId) {
        tracing::info!("Uplink resolved to {} on VLAN {}", mac, vlan);
        self.config.update(|config| config.uplink = Some(Uplink { mac, vlan }));
    }

    /// The server (or gateway) host binding went away.
    pub fn clear_uplink(&self) {
        let previous = self.config.snapshot().uplink;
        self.config.update(|config| config.uplink = None);
        if let Some(uplink) = previous {
            tracing::info!("Uplink {} cleared", uplink.mac);
        }
    }

    pub fn configured(&self) -> bool {
        self.config.snapshot().configured()
    }

    pub fn config(&self) -> Arc<RelayConfig> {
        self.config.snapshot()
    }

    /// Transform one DHCPv4 frame. Returns the frame to emit, or `None` when
    /// the packet is dropped or needs no action.
    pub fn handle(&self, frame: &EthernetFrame, received_from: &ConnectPoint) -> Option<OutboundPacket> {
        match self.process(frame, received_from) {
            Ok(out) => out,
            Err(e) => {
                e.log();
                None
            }
        }
    }

    fn process(
        &self,
        frame: &EthernetFrame,
        received_from: &ConnectPoint,
    ) -> Result<Option<OutboundPacket>, RelayError> {
        let udp = frame
            .udp()
            .ok_or_else(|| RelayError::MalformedPacket("not a UDP datagram".to_string()))?;
        let dhcp = self
            .parser
            .parse(&udp.payload)
            .map_err(|e| RelayError::MalformedPacket(e.to_string()))?;

        let config = self.config.snapshot();
        if !config.configured() {
            return Err(RelayError::ConfigurationIncomplete);
        }

        let Some(msg_type) = dhcp.message_type() else {
            tracing::debug!("DHCP message from {} has no message type", dhcp.chaddr);
            return Ok(None);
        };

        match msg_type {
            DhcpMessageType::Discover | DhcpMessageType::Request => self
                .relay_to_server(frame, dhcp, msg_type, &config, received_from)
                .map(Some),
            DhcpMessageType::Offer | DhcpMessageType::Ack => {
                self.relay_to_client(frame, dhcp, msg_type).map(Some)
            }
            DhcpMessageType::Release => {
                tracing::debug!("Ignoring {} from {}", msg_type, dhcp.chaddr);
                Ok(None)
            }
            other => {
                tracing::trace!("Not relaying {} from {}", other, dhcp.chaddr);
                Ok(None)
            }
        }
    }

    fn relay_to_server(
        &self,
        frame: &EthernetFrame,
        mut dhcp: DhcpPacket,
        msg_type: DhcpMessageType,
        config: &RelayConfig,
        received_from: &ConnectPoint,
    ) -> Result<OutboundPacket, RelayError> {
        let (server_ip, server_connect_point) =
            match (config.server_ip, config.server_connect_point.as_ref()) {
                (Some(ip), Some(cp)) => (ip, cp),
                _ => return Err(RelayError::ConfigurationIncomplete),
            };
        let directly_connected = self.resolver.directly_connected(&dhcp);

        if directly_connected && msg_type == DhcpMessageType::Discover {
            self.publish_client_location(dhcp.chaddr, frame.vlan, received_from);
        }

        let uplink = config.uplink.ok_or_else(|| {
            RelayError::UnresolvedTopology(format!(
                "uplink MAC for {} not resolved, dropping {} from {}",
                config.probe_ip().unwrap_or(server_ip),
                msg_type,
                dhcp.chaddr
            ))
        })?;

        let client_iface = self
            .resolver
            .client_facing_interface(received_from, frame.vlan)
            .ok_or_else(|| {
                RelayError::UnresolvedTopology(format!(
                    "no interface with an IPv4 address at {}",
                    received_from
                ))
            })?;
        let relay_ip = Self::interface_ip(&client_iface)?;

        if directly_connected {
            let circuit_id = CircuitId::new(received_from.clone(), frame.vlan);
            dhcp.set_relay_agent_information(RelayAgentInformation::with_circuit_id(&circuit_id));
            dhcp.giaddr = relay_ip;
        }

        let mut out = frame.clone();
        out.destination = uplink.mac;
        out.vlan = uplink.vlan;
        out.source = self
            .resolver
            .server_facing_mac(server_connect_point, uplink.vlan)
            .unwrap_or(frame.source);
        let bytes = self.rewrite(
            out,
            &dhcp,
            (relay_ip, server_ip),
            (DHCP_SERVER_PORT, DHCP_SERVER_PORT),
        )?;

        let host_id = HostId::new(dhcp.chaddr, frame.vlan);
        let mut record = self.record_or_new(host_id);
        record
            .add_location(received_from.clone())
            .set_ip4_status(msg_type)
            .set_directly_connected(directly_connected)
            .update_last_seen();
        if !directly_connected {
            record.set_next_hop(frame.source);
        }
        self.store.put(host_id, record);

        tracing::trace!(
            "{} from {} on {} relayed to {} at {}",
            msg_type,
            dhcp.chaddr,
            received_from,
            server_ip,
            server_connect_point
        );
        Ok(OutboundPacket::to(server_connect_point, bytes))
    }

    fn relay_to_client(
        &self,
        frame: &EthernetFrame,
        mut dhcp: DhcpPacket,
        msg_type: DhcpMessageType,
    ) -> Result<OutboundPacket, RelayError> {
        let directly_connected = self.resolver.directly_connected(&dhcp);
        let frame_record = self.store.get(&HostId::new(dhcp.chaddr, frame.vlan));

        let ClientInterface { interface, vlan } = self
            .resolver
            .client_interface(&dhcp, frame.vlan, frame_record.as_deref())
            .ok_or_else(|| {
                RelayError::UnresolvedTopology(format!(
                    "cannot find the interface for {} to {}",
                    msg_type, dhcp.chaddr
                ))
            })?;
        let relay_ip = Self::interface_ip(&interface)?;

        let host_id = HostId::new(dhcp.chaddr, vlan);
        let client_record = self.store.get(&host_id);

        let destination = if directly_connected {
            dhcp.chaddr
        } else {
            client_record
                .as_deref()
                .or(frame_record.as_deref())
                .and_then(DhcpRecord::next_hop)
                .ok_or_else(|| {
                    RelayError::UnresolvedTopology(format!(
                        "no relay record with a next hop for {}, dropping {}",
                        host_id, msg_type
                    ))
                })?
        };

        if directly_connected {
            dhcp.remove_relay_agent_information();
            dhcp.giaddr = Ipv4Addr::UNSPECIFIED;
        }

        let client_port = if directly_connected {
            DHCP_CLIENT_PORT
        } else {
            DHCP_SERVER_PORT
        };

        let mut out = frame.clone();
        out.destination = destination;
        out.source = interface.mac_or_default();
        out.vlan = vlan;
        let bytes = self.rewrite(
            out,
            &dhcp,
            (relay_ip, dhcp.yiaddr),
            (DHCP_SERVER_PORT, client_port),
        )?;

        let mut record = client_record
            .map(|r| DhcpRecord::clone(&r))
            .unwrap_or_else(|| DhcpRecord::new(host_id));
        record
            .add_location(interface.connect_point.clone())
            .set_ip4_status(msg_type)
            .set_directly_connected(directly_connected)
            .update_last_seen();
        if !directly_connected {
            record.set_next_hop(destination);
        }
        if msg_type == DhcpMessageType::Ack {
            record.set_ip4_address(dhcp.yiaddr);
        }
        self.store.put(host_id, record.clone());

        if msg_type == DhcpMessageType::Ack {
            self.publish_lease(&record, &interface, dhcp.yiaddr);
        }

        tracing::trace!(
            "{} for {} relayed to {} on VLAN {}",
            msg_type,
            dhcp.chaddr,
            interface.connect_point,
            vlan
        );
        Ok(OutboundPacket::to(&interface.connect_point, bytes))
    }

    /// Re-address `out` and replace its DHCP payload.
    fn rewrite(
        &self,
        mut out: EthernetFrame,
        dhcp: &DhcpPacket,
        (source_ip, destination_ip): (Ipv4Addr, Ipv4Addr),
        (source_port, destination_port): (u16, u16),
    ) -> Result<Vec<u8>, RelayError> {
        let ip = out
            .ipv4_mut()
            .ok_or_else(|| RelayError::MalformedPacket("not an IPv4 packet".to_string()))?;
        ip.source = source_ip;
        ip.destination = destination_ip;

        let udp = out
            .udp_mut()
            .ok_or_else(|| RelayError::MalformedPacket("not a UDP datagram".to_string()))?;
        udp.source_port = source_port;
        udp.destination_port = destination_port;
        udp.payload = self.writer.write(dhcp).map_err(|e| {
            RelayError::UnresolvedTopology(format!("cannot encode DHCP message for {}: {}", dhcp.chaddr, e))
        })?;

        out.to_bytes()
            .map_err(|e| RelayError::MalformedPacket(e.to_string()))
    }

    fn record_or_new(&self, host_id: HostId) -> DhcpRecord {
        self.store
            .get(&host_id)
            .map(|r| DhcpRecord::clone(&r))
            .unwrap_or_else(|| DhcpRecord::new(host_id))
    }

    fn interface_ip(iface: &Interface) -> Result<Ipv4Addr, RelayError> {
        iface.ipv4_address().ok_or_else(|| {
            RelayError::UnresolvedTopology(format!("interface {} has no IPv4 address", iface.name))
        })
    }

    /// Publish where a directly connected client was seen, before it has an
    /// address.
    fn publish_client_location(&self, mac: MacAddr6, vlan: VlanId, location: &ConnectPoint) {
        let description = HostDescription::new(mac, vlan, HostLocation::now(location.clone()));
        self.services.host_store.create_or_update_host(
            &PROVIDER_ID,
            HostId::new(mac, vlan),
            description,
            false,
        );
    }

    /// Publish the lease from an ACK: a host fact for directly connected
    /// clients, a /32 route via the next-hop relay otherwise.
    ///
    /// Failures here are logged only; the ACK is relayed regardless.
    fn publish_lease(&self, record: &DhcpRecord, iface: &Interface, ip: Ipv4Addr) {
        let host_id = record.host_id();

        if record.directly_connected() {
            let description = HostDescription::new(
                host_id.mac,
                host_id.vlan,
                HostLocation::now(iface.connect_point.clone()),
            )
            .with_ip(ip);
            self.services
                .host_store
                .create_or_update_host(&PROVIDER_ID, host_id, description, false);
            return;
        }

        let Some(next_hop_mac) = record.next_hop() else {
            tracing::warn!("No next hop in relay record of {}, no route for {}", host_id, ip);
            return;
        };
        let next_hop_id = HostId::new(next_hop_mac, host_id.vlan);
        let Some(next_hop) = self.services.hosts.host(&next_hop_id) else {
            tracing::warn!("Next hop host {} unknown, no route for {}", next_hop_id, ip);
            return;
        };
        let Some(next_hop_ip) = next_hop.ips.first().copied() else {
            tracing::warn!("Next hop host {} has no IPv4 address, no route for {}", next_hop_id, ip);
            return;
        };

        let route = Route::new(RouteSource::Static, Ipv4Network::from(ip), next_hop_ip);
        self.services.routes.update_route(route);
    }
}

#[cfg(test)]
mod tests {
    use pnet::packet::ip::IpNextHeaderProtocols;

    use super::*;
    use crate::domain::{DeviceId, DhcpOption, HostEventKind, RelaySubOption};
    use crate::parser::{FramePayload, Ipv4Datagram, Ipv4Payload, UdpDatagram};
    use crate::services::{
        HostService, HostStore, HostTable, InterfaceService, PacketService, RouteTable,
        StaticInterfaceService,
    };

    const SERVER_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const CLIENT_MAC: MacAddr6 = MacAddr6::new(0x02, 0, 0, 0, 0, 0x01);
    const UPLINK_MAC: MacAddr6 = MacAddr6::new(0xaa, 0xbb, 0, 0, 0, 0x01);
    const RELAY_MAC: MacAddr6 = MacAddr6::new(0x02, 0, 0, 0, 0x0a, 0x01);

    struct NoPackets;

    impl PacketService for NoPackets {
        fn emit(&self, _packet: OutboundPacket) {}
    }

    fn cp(port: u32) -> ConnectPoint {
        ConnectPoint::new(DeviceId::new("of:0000000000000001").unwrap(), port)
    }

    fn vlan(id: u16) -> VlanId {
        VlanId::new(id).unwrap()
    }

    struct Fixture {
        handler: Dhcp4Handler,
        hosts: Arc<HostTable>,
        routes: Arc<RouteTable>,
        store: Arc<DhcpRelayStore>,
    }

    fn fixture() -> Fixture {
        fixture_with(vec![
            Interface::new("p1", cp(1))
                .with_ip("10.0.1.1/24".parse().unwrap())
                .with_mac(MacAddr6::new(0x02, 0, 0, 0, 0xff, 0x01))
                .with_vlan_tagged([vlan(10)]),
            Interface::new("p3", cp(3)).with_ip("10.0.3.1/24".parse().unwrap()),
        ])
    }

    fn fixture_with(interfaces: Vec<Interface>) -> Fixture {
        let interfaces: Arc<dyn InterfaceService> = Arc::new(StaticInterfaceService::new(interfaces));
        let hosts = Arc::new(HostTable::new());
        let routes = Arc::new(RouteTable::new());
        let store = Arc::new(DhcpRelayStore::new());
        let services = Collaborators {
            interfaces,
            hosts: hosts.clone() as Arc<dyn HostService>,
            host_store: hosts.clone() as Arc<dyn HostStore>,
            routes: routes.clone(),
            packets: Arc::new(NoPackets),
        };
        let handler = Dhcp4Handler::new(services, Arc::clone(&store));
        handler.configure(SERVER_IP, cp(9), None);
        handler.on_uplink_resolved(UPLINK_MAC, VlanId::NONE);
        Fixture {
            handler,
            hosts,
            routes,
            store,
        }
    }

    fn dhcp(op: u8, msg_type: DhcpMessageType, extra: Vec<DhcpOption>) -> DhcpPacket {
        let mut options = vec![DhcpOption::MessageType(msg_type)];
        options.extend(extra);
        options.push(DhcpOption::End);
        DhcpPacket {
            op,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 0xabcd,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: CLIENT_MAC,
            sname: vec![0; 64],
            file: vec![0; 128],
            options,
        }
    }

    fn frame(source: MacAddr6, vlan: VlanId, ports: (u16, u16), dhcp: &DhcpPacket) -> EthernetFrame {
        EthernetFrame {
            destination: MacAddr6::broadcast(),
            source,
            vlan,
            priority: 0,
            payload: FramePayload::Ipv4(Ipv4Datagram {
                dscp: 0,
                ecn: 0,
                identification: 1,
                flags: 0,
                fragment_offset: 0,
                ttl: 64,
                protocol: IpNextHeaderProtocols::Udp.0,
                source: Ipv4Addr::UNSPECIFIED,
                destination: Ipv4Addr::BROADCAST,
                options: Vec::new(),
                payload: Ipv4Payload::Udp(UdpDatagram {
                    source_port: ports.0,
                    destination_port: ports.1,
                    payload: DhcpWriter::new().write(dhcp).unwrap(),
                }),
            }),
        }
    }

    fn decode(out: &OutboundPacket) -> (EthernetFrame, DhcpPacket) {
        let frame = EthernetFrame::parse(&out.data).unwrap();
        let dhcp = DhcpParser::new().parse(&frame.udp().unwrap().payload).unwrap();
        (frame, dhcp)
    }

    fn relay_option_count(dhcp: &DhcpPacket) -> usize {
        dhcp.options
            .iter()
            .filter(|opt| opt.code() == crate::domain::option_codes::RELAY_AGENT_INFORMATION)
            .count()
    }

    mod configuration_tests {
        use super::*;

        #[test]
        fn test_unconfigured_handler_drops() {
            let f = fixture();
            let handler =
                Dhcp4Handler::new(f.handler.services.clone(), Arc::new(DhcpRelayStore::new()));
            assert!(!handler.configured());

            let request = dhcp(1, DhcpMessageType::Discover, vec![]);
            let inbound = frame(CLIENT_MAC, vlan(10), (68, 67), &request);
            assert!(handler.handle(&inbound, &cp(1)).is_none());
        }

        #[test]
        fn test_configure_clears_uplink() {
            let f = fixture();
            assert!(f.handler.config().uplink.is_some());
            f.handler.configure(Ipv4Addr::new(10, 0, 0, 2), cp(9), None);
            assert!(f.handler.configured());
            assert!(f.handler.config().uplink.is_none());
        }

        #[test]
        fn test_unresolved_uplink_drops_request() {
            let f = fixture();
            f.handler.clear_uplink();
            let request = dhcp(1, DhcpMessageType::Discover, vec![]);
            let inbound = frame(CLIENT_MAC, vlan(10), (68, 67), &request);

            assert!(f.handler.handle(&inbound, &cp(1)).is_none());
            assert!(f.store.is_empty());
        }

        #[test]
        fn test_release_and_unknown_types_ignored() {
            let f = fixture();
            for msg_type in [
                DhcpMessageType::Release,
                DhcpMessageType::Inform,
                DhcpMessageType::Decline,
                DhcpMessageType::Nak,
            ] {
                let inbound = frame(CLIENT_MAC, vlan(10), (68, 67), &dhcp(1, msg_type, vec![]));
                assert!(f.handler.handle(&inbound, &cp(1)).is_none());
            }
            assert!(f.store.is_empty());
        }

        #[test]
        fn test_garbage_payload_dropped() {
            let f = fixture();
            let request = dhcp(1, DhcpMessageType::Discover, vec![]);
            let mut inbound = frame(CLIENT_MAC, vlan(10), (68, 67), &request);
            inbound.udp_mut().unwrap().payload = vec![1, 2, 3];
            assert!(f.handler.handle(&inbound, &cp(1)).is_none());
        }
    }

    mod request_tests {
        use super::*;

        #[test]
        fn test_direct_discover_is_relayed_with_circuit_id() {
            let f = fixture();
            let request = dhcp(1, DhcpMessageType::Discover, vec![]);
            let out = f
                .handler
                .handle(&frame(CLIENT_MAC, vlan(10), (68, 67), &request), &cp(1))
                .unwrap();

            assert_eq!(out.target(), cp(9));
            let (frame, relayed) = decode(&out);
            assert_eq!(frame.destination, UPLINK_MAC);
            assert_eq!(frame.source, CLIENT_MAC);
            assert_eq!(frame.vlan, VlanId::NONE);
            let ip = frame.ipv4().unwrap();
            assert_eq!(ip.source, Ipv4Addr::new(10, 0, 1, 1));
            assert_eq!(ip.destination, SERVER_IP);
            let udp = frame.udp().unwrap();
            assert_eq!((udp.source_port, udp.destination_port), (67, 67));

            assert_eq!(relayed.giaddr, Ipv4Addr::new(10, 0, 1, 1));
            assert_eq!(relay_option_count(&relayed), 1);
            assert_eq!(relayed.circuit_id(), Some(CircuitId::new(cp(1), vlan(10))));
            assert_eq!(relayed.options.last(), Some(&DhcpOption::End));
            assert_eq!(relayed.xid, request.xid);
        }

        #[test]
        fn test_direct_discover_publishes_location_and_record() {
            let f = fixture();
            let request = dhcp(1, DhcpMessageType::Discover, vec![]);
            f.handler
                .handle(&frame(CLIENT_MAC, vlan(10), (68, 67), &request), &cp(1))
                .unwrap();

            let host_id = HostId::new(CLIENT_MAC, vlan(10));
            let host = f.hosts.host(&host_id).unwrap();
            assert_eq!(host.locations[0].connect_point, cp(1));
            assert!(host.ips.is_empty());

            let record = f.store.get(&host_id).unwrap();
            assert!(record.directly_connected());
            assert_eq!(record.ip4_status(), Some(DhcpMessageType::Discover));
            assert_eq!(record.current_location().unwrap().connect_point, cp(1));
            assert_eq!(record.next_hop(), None);
        }

        #[test]
        fn test_existing_own_relay_option_replaced_not_duplicated() {
            let f = fixture();
            let stale = CircuitId::new(cp(3), VlanId::NONE);
            let mut request = dhcp(
                1,
                DhcpMessageType::Request,
                vec![DhcpOption::RelayAgentInformation(
                    RelayAgentInformation::with_circuit_id(&stale),
                )],
            );
            request.giaddr = Ipv4Addr::new(10, 0, 3, 1);

            let out = f
                .handler
                .handle(&frame(CLIENT_MAC, vlan(10), (68, 67), &request), &cp(1))
                .unwrap();
            let (_, relayed) = decode(&out);
            assert_eq!(relay_option_count(&relayed), 1);
            assert_eq!(relayed.circuit_id(), Some(CircuitId::new(cp(1), vlan(10))));
            assert_eq!(relayed.giaddr, Ipv4Addr::new(10, 0, 1, 1));
        }

        #[test]
        fn test_indirect_request_keeps_foreign_option_and_records_next_hop() {
            let f = fixture();
            let foreign = RelayAgentInformation {
                sub_options: vec![RelaySubOption::CircuitId(b"ge-0/0/1".to_vec())],
            };
            let mut request = dhcp(
                1,
                DhcpMessageType::Request,
                vec![DhcpOption::RelayAgentInformation(foreign.clone())],
            );
            request.giaddr = Ipv4Addr::new(192, 168, 5, 1);

            let out = f
                .handler
                .handle(&frame(RELAY_MAC, VlanId::NONE, (67, 67), &request), &cp(3))
                .unwrap();
            let (frame, relayed) = decode(&out);
            assert_eq!(relayed.giaddr, Ipv4Addr::new(192, 168, 5, 1));
            assert_eq!(relayed.relay_agent_information(), Some(&foreign));
            assert_eq!(frame.ipv4().unwrap().source, Ipv4Addr::new(10, 0, 3, 1));

            let record = f.store.get(&HostId::new(CLIENT_MAC, VlanId::NONE)).unwrap();
            assert!(!record.directly_connected());
            assert_eq!(record.next_hop(), Some(RELAY_MAC));
            assert!(f.hosts.hosts().is_empty());
        }

        #[test]
        fn test_no_interface_on_port_drops() {
            let f = fixture();
            let request = dhcp(1, DhcpMessageType::Discover, vec![]);
            assert!(f
                .handler
                .handle(&frame(CLIENT_MAC, vlan(10), (68, 67), &request), &cp(7))
                .is_none());
        }

        #[test]
        fn test_unencodable_circuit_id_drops_without_record() {
            let port = ConnectPoint::new(DeviceId::new(format!("of:{}", "0".repeat(260))).unwrap(), 1);
            let f = fixture_with(vec![
                Interface::new("long", port.clone()).with_ip("10.0.1.1/24".parse().unwrap())
            ]);

            let request = dhcp(1, DhcpMessageType::Discover, vec![]);
            let inbound = frame(CLIENT_MAC, VlanId::NONE, (68, 67), &request);
            assert!(f.handler.handle(&inbound, &port).is_none());
            assert!(f.store.get(&HostId::new(CLIENT_MAC, VlanId::NONE)).is_none());
        }

        #[test]
        fn test_end_stays_last_over_repeated_relays() {
            let f = fixture();
            let mut request = dhcp(1, DhcpMessageType::Discover, vec![]);
            for _ in 0..3 {
                let out = f
                    .handler
                    .handle(&frame(CLIENT_MAC, vlan(10), (68, 67), &request), &cp(1))
                    .unwrap();
                request = decode(&out).1;
                let ends = request.options.iter().filter(|o| **o == DhcpOption::End).count();
                assert_eq!(ends, 1);
                assert_eq!(request.options.last(), Some(&DhcpOption::End));
                assert_eq!(relay_option_count(&request), 1);
            }
        }
    }

    mod reply_tests {
        use super::*;

        fn relay_discover(f: &Fixture) -> DhcpPacket {
            let request = dhcp(1, DhcpMessageType::Discover, vec![]);
            let out = f
                .handler
                .handle(&frame(CLIENT_MAC, vlan(10), (68, 67), &request), &cp(1))
                .unwrap();
            decode(&out).1
        }

        fn server_reply(relayed: &DhcpPacket, msg_type: DhcpMessageType) -> DhcpPacket {
            let mut reply = relayed.clone();
            reply.op = 2;
            reply.yiaddr = Ipv4Addr::new(10, 0, 1, 50);
            reply.options.retain(|opt| !matches!(opt, DhcpOption::MessageType(_)));
            reply.options.insert(0, DhcpOption::MessageType(msg_type));
            reply
        }

        #[test]
        fn test_offer_returns_to_client_port() {
            let f = fixture();
            let offer = server_reply(&relay_discover(&f), DhcpMessageType::Offer);
            let out = f
                .handler
                .handle(&frame(UPLINK_MAC, VlanId::NONE, (67, 67), &offer), &cp(9))
                .unwrap();

            assert_eq!(out.target(), cp(1));
            let (frame, relayed) = decode(&out);
            assert_eq!(frame.destination, CLIENT_MAC);
            assert_eq!(frame.source, MacAddr6::new(0x02, 0, 0, 0, 0xff, 0x01));
            assert_eq!(frame.vlan, vlan(10));
            let ip = frame.ipv4().unwrap();
            assert_eq!(ip.source, Ipv4Addr::new(10, 0, 1, 1));
            assert_eq!(ip.destination, Ipv4Addr::new(10, 0, 1, 50));
            let udp = frame.udp().unwrap();
            assert_eq!((udp.source_port, udp.destination_port), (67, 68));

            assert!(!relayed.has_relay_agent_option());
            assert_eq!(relayed.giaddr, Ipv4Addr::UNSPECIFIED);
        }

        #[test]
        fn test_ack_persists_address_and_publishes_host() {
            let f = fixture();
            let ack = server_reply(&relay_discover(&f), DhcpMessageType::Ack);
            f.handler
                .handle(&frame(UPLINK_MAC, VlanId::NONE, (67, 67), &ack), &cp(9))
                .unwrap();

            let host_id = HostId::new(CLIENT_MAC, vlan(10));
            let record = f.store.get(&host_id).unwrap();
            assert_eq!(record.ip4_address(), Some(Ipv4Addr::new(10, 0, 1, 50)));
            assert_eq!(record.ip4_status(), Some(DhcpMessageType::Ack));
            assert!(f.hosts.host(&host_id).unwrap().has_ip(Ipv4Addr::new(10, 0, 1, 50)));
            assert!(f.routes.routes().is_empty());
        }

        #[test]
        fn test_undecodable_own_circuit_id_uses_record() {
            let f = fixture();
            let request = dhcp(1, DhcpMessageType::Discover, vec![]);
            let out = f
                .handler
                .handle(&frame(CLIENT_MAC, VlanId::NONE, (68, 67), &request), &cp(3))
                .unwrap();
            let relayed = decode(&out).1;
            assert_eq!(relayed.giaddr, Ipv4Addr::new(10, 0, 3, 1));

            let mut offer = server_reply(&relayed, DhcpMessageType::Offer);
            offer.set_relay_agent_information(RelayAgentInformation {
                sub_options: vec![RelaySubOption::CircuitId(b"garbage".to_vec())],
            });
            let out = f
                .handler
                .handle(&frame(UPLINK_MAC, VlanId::NONE, (67, 67), &offer), &cp(9))
                .unwrap();

            assert_eq!(out.target(), cp(3));
            let (frame, relayed) = decode(&out);
            assert_eq!(frame.destination, CLIENT_MAC);
            assert_eq!(frame.vlan, VlanId::NONE);
            assert_eq!(frame.ipv4().unwrap().source, Ipv4Addr::new(10, 0, 3, 1));
            assert_eq!(frame.udp().unwrap().destination_port, 68);
            assert!(!relayed.has_relay_agent_option());
        }

        #[test]
        fn test_reply_without_circuit_or_record_dropped() {
            let f = fixture();
            let discover = dhcp(1, DhcpMessageType::Discover, vec![]);
            let offer = server_reply(&discover, DhcpMessageType::Offer);
            assert!(f
                .handler
                .handle(&frame(UPLINK_MAC, VlanId::NONE, (67, 67), &offer), &cp(9))
                .is_none());
        }

        #[test]
        fn test_indirect_ack_publishes_route_via_next_hop() {
            let f = fixture();
            f.hosts.create_or_update_host(
                &ProviderId::new("host", "test"),
                HostId::new(RELAY_MAC, VlanId::NONE),
                HostDescription::new(RELAY_MAC, VlanId::NONE, HostLocation::new(cp(3), 1))
                    .with_ip(Ipv4Addr::new(10, 0, 3, 2)),
                false,
            );

            let mut request = dhcp(
                1,
                DhcpMessageType::Request,
                vec![DhcpOption::RelayAgentInformation(RelayAgentInformation {
                    sub_options: vec![RelaySubOption::CircuitId(b"ge-0/0/1".to_vec())],
                })],
            );
            request.giaddr = Ipv4Addr::new(192, 168, 5, 1);
            let out = f
                .handler
                .handle(&frame(RELAY_MAC, VlanId::NONE, (67, 67), &request), &cp(3))
                .unwrap();

            let mut ack = server_reply(&decode(&out).1, DhcpMessageType::Ack);
            ack.yiaddr = Ipv4Addr::new(192, 168, 5, 20);
            let out = f
                .handler
                .handle(&frame(UPLINK_MAC, VlanId::NONE, (67, 67), &ack), &cp(9))
                .unwrap();

            assert_eq!(out.target(), cp(3));
            let (frame, relayed) = decode(&out);
            assert_eq!(frame.destination, RELAY_MAC);
            assert_eq!(frame.udp().unwrap().destination_port, 67);
            assert!(relayed.has_relay_agent_option());
            assert_eq!(relayed.giaddr, Ipv4Addr::new(192, 168, 5, 1));

            let routes = f.routes.routes();
            assert_eq!(routes.len(), 1);
            assert_eq!(routes[0].prefix, "192.168.5.20/32".parse().unwrap());
            assert_eq!(routes[0].next_hop, Ipv4Addr::new(10, 0, 3, 2));
            assert_eq!(routes[0].source, RouteSource::Static);
        }

        #[test]
        fn test_indirect_ack_without_next_hop_host_still_relayed() {
            let f = fixture();
            let mut request = dhcp(
                1,
                DhcpMessageType::Request,
                vec![DhcpOption::Unknown(82, vec![9, 1, 0])],
            );
            request.giaddr = Ipv4Addr::new(192, 168, 5, 1);
            let out = f
                .handler
                .handle(&frame(RELAY_MAC, VlanId::NONE, (67, 67), &request), &cp(3))
                .unwrap();

            let ack = server_reply(&decode(&out).1, DhcpMessageType::Ack);
            assert!(f
                .handler
                .handle(&frame(UPLINK_MAC, VlanId::NONE, (67, 67), &ack), &cp(9))
                .is_some());
            assert!(f.routes.routes().is_empty());
        }

        #[test]
        fn test_host_events_reach_listeners_on_ack() {
            use std::sync::Mutex;

            use crate::domain::HostEvent;
            use crate::services::HostListener;

            #[derive(Default)]
            struct Kinds(Mutex<Vec<HostEventKind>>);
            impl HostListener for Kinds {
                fn event(&self, event: &HostEvent) {
                    self.0.lock().unwrap().push(event.kind);
                }
            }

            let f = fixture();
            let kinds = Arc::new(Kinds::default());
            let listener: Arc<dyn HostListener> = kinds.clone();
            f.hosts.add_listener(Arc::downgrade(&listener));

            let ack = server_reply(&relay_discover(&f), DhcpMessageType::Ack);
            f.handler
                .handle(&frame(UPLINK_MAC, VlanId::NONE, (67, 67), &ack), &cp(9))
                .unwrap();

            assert_eq!(
                *kinds.0.lock().unwrap(),
                vec![HostEventKind::Added, HostEventKind::Updated]
            );
        }
    }
}
