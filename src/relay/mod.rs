//! DHCPv4 relay: request/reply rewriting, interface resolution, ARP proxy
//! and the manager that ties them to the packet path.

mod arp;
mod config;
mod handler;
mod manager;
mod resolver;

pub use arp::ArpProxy;
pub use config::{RelayConfig, SharedRelayConfig, Uplink};
pub use handler::{Dhcp4Handler, DHCP_CLIENT_PORT, DHCP_SERVER_PORT, PROVIDER_ID};
pub use manager::{DhcpRelayManager, DhcpRelayService, DhcpServerConfig};
pub use resolver::{ClientInterface, InterfaceResolver};

use std::sync::Arc;

use crate::services::{HostService, HostStore, InterfaceService, PacketService, RouteStore};

/// Services the relay consumes from the surrounding control plane.
#[derive(Clone)]
pub struct Collaborators {
    pub interfaces: Arc<dyn InterfaceService>,
    pub hosts: Arc<dyn HostService>,
    pub host_store: Arc<dyn HostStore>,
    pub routes: Arc<dyn RouteStore>,
    pub packets: Arc<dyn PacketService>,
}
