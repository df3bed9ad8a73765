//! dhcp-relay - DHCPv4 relay agent and ARP proxy
//!
//! Intercepts DHCP traffic at switch ports, forwards client requests to a
//! configured DHCP server (directly or via a gateway) and steers server
//! replies back to the port the client sits behind. Per-client relay records
//! remember where each client was seen; acknowledged leases are published as
//! host facts or routes.
//!
//! # Architecture
//!
//! - `domain`: value types (DHCP messages, relay agent option, topology)
//! - `parser`: DHCP and Ethernet/IPv4/UDP/ARP encoding
//! - `services`: collaborator traits and in-memory implementations
//! - `store`: relay record store
//! - `relay`: the relay handler, ARP proxy and manager
//! - `capture`: raw frame capture and emission

pub mod capture;
pub mod config;
pub mod domain;
pub mod error;
pub mod parser;
pub mod relay;
pub mod services;
pub mod store;

pub use capture::{DryRunPacketService, PacketCapture, PnetCapture, PnetPacketService};
pub use config::Config;
pub use domain::{ConnectPoint, DhcpPacket, DhcpRecord, HostId, InboundPacket, OutboundPacket, VlanId};
pub use error::{CaptureError, ConfigError, RelayError};
pub use relay::{Collaborators, DhcpRelayManager, DhcpRelayService, DhcpServerConfig};
pub use store::DhcpRelayStore;
