//! Per-client relay state.

use std::net::Ipv4Addr;

use macaddr::MacAddr6;

use crate::domain::dhcp::DhcpMessageType;
use crate::domain::net::{now_millis, ConnectPoint, HostId, HostLocation, VlanId};

/// What the relay remembers about one client between its request and the
/// server's reply.
///
/// Records are values: the store hands out shared snapshots, and writers
/// clone, modify and submit a whole new record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpRecord {
    host_id: HostId,
    locations: Vec<HostLocation>,
    ip4_address: Option<Ipv4Addr>,
    ip4_status: Option<DhcpMessageType>,
    directly_connected: bool,
    next_hop: Option<MacAddr6>,
    last_seen: u64,
}

impl DhcpRecord {
    pub fn new(host_id: HostId) -> Self {
        Self {
            host_id,
            locations: Vec::new(),
            ip4_address: None,
            ip4_status: None,
            directly_connected: false,
            next_hop: None,
            last_seen: now_millis(),
        }
    }

    pub fn host_id(&self) -> HostId {
        self.host_id
    }

    pub fn mac(&self) -> MacAddr6 {
        self.host_id.mac
    }

    pub fn vlan(&self) -> VlanId {
        self.host_id.vlan
    }

    pub fn locations(&self) -> &[HostLocation] {
        &self.locations
    }

    /// The location with the latest timestamp.
    pub fn current_location(&self) -> Option<&HostLocation> {
        self.locations.iter().max_by_key(|loc| loc.time)
    }

    /// Record that the client was seen at `connect_point` now.
    ///
    /// Any earlier entry for the same connect point is replaced, and the new
    /// timestamp is strictly greater than every other entry's so the new
    /// location becomes current even within one clock tick.
    pub fn add_location(&mut self, connect_point: ConnectPoint) -> &mut Self {
        let latest = self.locations.iter().map(|loc| loc.time).max();
        let time = match latest {
            Some(latest) => now_millis().max(latest + 1),
            None => now_millis(),
        };
        self.locations.retain(|loc| loc.connect_point != connect_point);
        self.locations.push(HostLocation::new(connect_point, time));
        self
    }

    pub fn ip4_address(&self) -> Option<Ipv4Addr> {
        self.ip4_address
    }

    pub fn set_ip4_address(&mut self, ip: Ipv4Addr) -> &mut Self {
        self.ip4_address = Some(ip);
        self
    }

    pub fn ip4_status(&self) -> Option<DhcpMessageType> {
        self.ip4_status
    }

    pub fn set_ip4_status(&mut self, status: DhcpMessageType) -> &mut Self {
        self.ip4_status = Some(status);
        self
    }

    pub fn directly_connected(&self) -> bool {
        self.directly_connected
    }

    pub fn set_directly_connected(&mut self, directly_connected: bool) -> &mut Self {
        self.directly_connected = directly_connected;
        self
    }

    /// MAC of the upstream relay; only meaningful when not directly connected.
    pub fn next_hop(&self) -> Option<MacAddr6> {
        self.next_hop
    }

    pub fn set_next_hop(&mut self, mac: MacAddr6) -> &mut Self {
        self.next_hop = Some(mac);
        self
    }

    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    pub fn update_last_seen(&mut self) -> &mut Self {
        self.last_seen = now_millis();
        self
    }
}
