//! Collaborators the relay depends on.
//!
//! Each trait is a narrow capability the relay consumes; the control plane
//! around the relay provides the real implementation. The in-memory ones in
//! `memory` back the daemon and the tests.

mod memory;

pub use memory::{HostTable, RouteTable, StaticInterfaceService};

use std::net::Ipv4Addr;
use std::sync::Weak;

use crate::domain::{
    ConnectPoint, Host, HostDescription, HostEvent, HostId, Interface, OutboundPacket, ProviderId,
    Route,
};

/// Read access to configured L3 interfaces.
pub trait InterfaceService: Send + Sync {
    /// All interfaces, in configuration order.
    fn interfaces(&self) -> Vec<Interface>;

    /// Interfaces attached at `connect_point`, in configuration order.
    fn interfaces_by_port(&self, connect_point: &ConnectPoint) -> Vec<Interface> {
        self.interfaces()
            .into_iter()
            .filter(|iface| iface.connect_point == *connect_point)
            .collect()
    }

    /// Interfaces that own `ip` as one of their addresses.
    fn interfaces_by_ip(&self, ip: Ipv4Addr) -> Vec<Interface> {
        self.interfaces()
            .into_iter()
            .filter(|iface| iface.owns_ip(ip))
            .collect()
    }
}

/// Read access to discovered hosts, plus IP monitoring.
pub trait HostService: Send + Sync {
    fn host(&self, id: &HostId) -> Option<Host>;

    fn hosts_by_ip(&self, ip: Ipv4Addr) -> Vec<Host>;

    /// Ask host discovery to actively look for `ip`.
    fn start_monitoring_ip(&self, ip: Ipv4Addr);

    fn stop_monitoring_ip(&self, ip: Ipv4Addr);

    /// Register for host events. Dropped listeners are pruned lazily.
    fn add_listener(&self, listener: Weak<dyn HostListener>);
}

/// Receives host events.
pub trait HostListener: Send + Sync {
    fn event(&self, event: &HostEvent);
}

/// Write access to host facts. The relay only ever adds or updates.
pub trait HostStore: Send + Sync {
    fn create_or_update_host(
        &self,
        provider: &ProviderId,
        id: HostId,
        description: HostDescription,
        replace_ips: bool,
    );
}

pub trait RouteStore: Send + Sync {
    fn update_route(&self, route: Route);
}

/// Frame emission. Fire-and-forget: no confirmation, no retry.
pub trait PacketService: Send + Sync {
    fn emit(&self, packet: OutboundPacket);
}
