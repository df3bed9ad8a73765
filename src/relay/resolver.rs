//! Interface resolution: which local interface a DHCP message enters or
//! leaves through.

use std::net::Ipv4Addr;
use std::sync::Arc;

use macaddr::MacAddr6;

use crate::domain::{best_vlan_match, ConnectPoint, DhcpPacket, DhcpRecord, Interface, VlanId};
use crate::services::InterfaceService;

/// The interface a server reply goes out of, with the VLAN to tag it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInterface {
    pub interface: Interface,
    pub vlan: VlanId,
}

pub struct InterfaceResolver {
    interfaces: Arc<dyn InterfaceService>,
}

impl InterfaceResolver {
    pub fn new(interfaces: Arc<dyn InterfaceService>) -> Self {
        Self { interfaces }
    }

    /// True if `ip` is one of our own interface addresses.
    pub fn is_local_ip(&self, ip: Ipv4Addr) -> bool {
        !self.interfaces.interfaces_by_ip(ip).is_empty()
    }

    /// A message is directly connected when it carries no relay agent option,
    /// or when the option was added by us (giaddr is one of our addresses).
    pub fn directly_connected(&self, dhcp: &DhcpPacket) -> bool {
        !dhcp.has_relay_agent_option() || self.is_local_ip(dhcp.giaddr)
    }

    /// The interface a client request arrived on: the best VLAN match at the
    /// connect point, else any interface there with an address.
    pub fn client_facing_interface(&self, connect_point: &ConnectPoint, vlan: VlanId) -> Option<Interface> {
        let candidates: Vec<Interface> = self
            .interfaces
            .interfaces_by_port(connect_point)
            .into_iter()
            .filter(|iface| iface.ipv4_address().is_some())
            .collect();

        best_vlan_match(&candidates, vlan)
            .or_else(|| candidates.first())
            .cloned()
    }

    /// Source MAC for frames sent toward the server: the MAC of our interface
    /// at the server connect point in the uplink VLAN, if configured.
    pub fn server_facing_mac(&self, server_connect_point: &ConnectPoint, vlan: VlanId) -> Option<MacAddr6> {
        let candidates = self.interfaces.interfaces_by_port(server_connect_point);
        best_vlan_match(&candidates, vlan)
            .and_then(|iface| iface.mac)
            .filter(|mac| !mac.is_nil())
    }

    /// Resolve where a server reply goes.
    ///
    /// A decodable circuit id is trusted only when giaddr is ours; otherwise,
    /// or when it names no configured interface, the latest location in the
    /// client's relay record is used together with the reply's VLAN.
    pub fn client_interface(
        &self,
        dhcp: &DhcpPacket,
        frame_vlan: VlanId,
        record: Option<&DhcpRecord>,
    ) -> Option<ClientInterface> {
        if self.is_local_ip(dhcp.giaddr) {
            if let Some(circuit_id) = dhcp.circuit_id() {
                let candidates = self.interfaces.interfaces_by_port(circuit_id.connect_point());
                match best_vlan_match(&candidates, circuit_id.vlan()) {
                    Some(iface) => {
                        return Some(ClientInterface {
                            interface: iface.clone(),
                            vlan: circuit_id.vlan(),
                        })
                    }
                    None => tracing::debug!(
                        "No interface at {} for VLAN {}, falling back to relay record",
                        circuit_id.connect_point(),
                        circuit_id.vlan()
                    ),
                }
            }
        }

        let location = record?.current_location()?;
        let candidates = self.interfaces.interfaces_by_port(&location.connect_point);
        best_vlan_match(&candidates, frame_vlan).map(|iface| ClientInterface {
            vlan: iface.default_vlan(),
            interface: iface.clone(),
        })
    }
}
