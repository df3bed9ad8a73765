//! Configured L3 interfaces of the relay.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use macaddr::MacAddr6;
use pnet::ipnetwork::Ipv4Network;

use crate::domain::net::{ConnectPoint, VlanId};

/// Source MAC used when an interface has none configured.
pub const FALLBACK_MAC: MacAddr6 = MacAddr6::new(0xa4, 0x23, 0x05, 0x00, 0x00, 0x00);

/// How a VLAN matched an interface. Variants are ordered by precedence:
/// when several interfaces at one connect point accept a VLAN, the one
/// with the smallest match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VlanMatch {
    Untagged,
    Vlan,
    Native,
    Tagged,
}

/// An interface configured at a connect point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub name: String,
    pub connect_point: ConnectPoint,
    pub ips: Vec<Ipv4Network>,
    pub mac: Option<MacAddr6>,
    pub vlan: VlanId,
    pub vlan_untagged: VlanId,
    pub vlan_tagged: BTreeSet<VlanId>,
    pub vlan_native: VlanId,
}

impl Interface {
    pub fn new(name: impl Into<String>, connect_point: ConnectPoint) -> Self {
        Self {
            name: name.into(),
            connect_point,
            ips: Vec::new(),
            mac: None,
            vlan: VlanId::NONE,
            vlan_untagged: VlanId::NONE,
            vlan_tagged: BTreeSet::new(),
            vlan_native: VlanId::NONE,
        }
    }

    pub fn with_ip(mut self, ip: Ipv4Network) -> Self {
        self.ips.push(ip);
        self
    }

    pub fn with_mac(mut self, mac: MacAddr6) -> Self {
        self.mac = Some(mac);
        self
    }

    pub fn with_vlan(mut self, vlan: VlanId) -> Self {
        self.vlan = vlan;
        self
    }

    pub fn with_vlan_untagged(mut self, vlan: VlanId) -> Self {
        self.vlan_untagged = vlan;
        self
    }

    pub fn with_vlan_tagged(mut self, vlans: impl IntoIterator<Item = VlanId>) -> Self {
        self.vlan_tagged.extend(vlans);
        self
    }

    pub fn with_vlan_native(mut self, vlan: VlanId) -> Self {
        self.vlan_native = vlan;
        self
    }

    /// The first configured IPv4 address.
    pub fn ipv4_address(&self) -> Option<Ipv4Addr> {
        self.ips.first().map(|net| net.ip())
    }

    /// True if `ip` is one of this interface's own addresses.
    pub fn owns_ip(&self, ip: Ipv4Addr) -> bool {
        self.ips.iter().any(|net| net.ip() == ip)
    }

    pub fn mac_or_default(&self) -> MacAddr6 {
        self.mac.filter(|mac| !mac.is_nil()).unwrap_or(FALLBACK_MAC)
    }

    /// Classify how `vlan` is accepted by this interface, if at all.
    pub fn vlan_match(&self, vlan: VlanId) -> Option<VlanMatch> {
        if self.vlan_untagged == vlan {
            Some(VlanMatch::Untagged)
        } else if self.vlan == vlan {
            Some(VlanMatch::Vlan)
        } else if self.vlan_native == vlan {
            Some(VlanMatch::Native)
        } else if self.vlan_tagged.contains(&vlan) {
            Some(VlanMatch::Tagged)
        } else {
            None
        }
    }

    /// VLAN used toward this interface when nothing more specific is known:
    /// the legacy `vlan`, then untagged, then native.
    pub fn default_vlan(&self) -> VlanId {
        [self.vlan, self.vlan_untagged, self.vlan_native]
            .into_iter()
            .find(|vlan| !vlan.is_none())
            .unwrap_or(VlanId::NONE)
    }
}

/// Pick the interface that best accepts `vlan`, ties going to the earliest.
pub fn best_vlan_match<'a, I>(interfaces: I, vlan: VlanId) -> Option<&'a Interface>
where
    I: IntoIterator<Item = &'a Interface>,
{
    interfaces
        .into_iter()
        .enumerate()
        .filter_map(|(index, iface)| iface.vlan_match(vlan).map(|m| ((m, index), iface)))
        .min_by_key(|(key, _)| *key)
        .map(|(_, iface)| iface)
}
