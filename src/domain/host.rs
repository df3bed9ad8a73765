//! Host and route facts exchanged with the control plane.

use std::fmt;
use std::net::Ipv4Addr;

use macaddr::MacAddr6;
use pnet::ipnetwork::Ipv4Network;

use crate::domain::net::{HostId, HostLocation, VlanId};

/// Identifies who published a host fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderId {
    pub scheme: &'static str,
    pub id: &'static str,
}

impl ProviderId {
    pub const fn new(scheme: &'static str, id: &'static str) -> Self {
        Self { scheme, id }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scheme, self.id)
    }
}

/// What a provider knows about a host at one moment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostDescription {
    pub mac: MacAddr6,
    pub vlan: VlanId,
    pub location: HostLocation,
    pub ips: Vec<Ipv4Addr>,
}

impl HostDescription {
    pub fn new(mac: MacAddr6, vlan: VlanId, location: HostLocation) -> Self {
        Self {
            mac,
            vlan,
            location,
            ips: Vec::new(),
        }
    }

    pub fn with_ip(mut self, ip: Ipv4Addr) -> Self {
        self.ips.push(ip);
        self
    }
}

/// A host as known by the host service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub id: HostId,
    pub locations: Vec<HostLocation>,
    pub ips: Vec<Ipv4Addr>,
}

impl Host {
    pub fn mac(&self) -> MacAddr6 {
        self.id.mac
    }

    pub fn vlan(&self) -> VlanId {
        self.id.vlan
    }

    pub fn has_ip(&self, ip: Ipv4Addr) -> bool {
        self.ips.contains(&ip)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEventKind {
    Added,
    Updated,
    Removed,
    Moved,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEvent {
    pub kind: HostEventKind,
    pub host: Host,
}

impl HostEvent {
    pub fn new(kind: HostEventKind, host: Host) -> Self {
        Self { kind, host }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteSource {
    Static,
}

/// A unicast route toward a prefix via a next-hop address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub source: RouteSource,
    pub prefix: Ipv4Network,
    pub next_hop: Ipv4Addr,
}

impl Route {
    pub fn new(source: RouteSource, prefix: Ipv4Network, next_hop: Ipv4Addr) -> Self {
        Self {
            source,
            prefix,
            next_hop,
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {} ({:?})", self.prefix, self.next_hop, self.source)
    }
}
