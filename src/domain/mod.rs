//! Domain models for the DHCP relay.
//!
//! This module contains the core value types that are independent
//! of any infrastructure concerns: wire parsing lives in `parser`,
//! packet I/O in `capture`.

pub mod dhcp;
mod host;
mod interface;
mod net;
mod packet;
mod record;
pub mod relay_agent;

pub use dhcp::{option_codes, DhcpMessageType, DhcpOption, DhcpPacket};
pub use host::{Host, HostDescription, HostEvent, HostEventKind, ProviderId, Route, RouteSource};
pub use interface::{best_vlan_match, Interface, VlanMatch, FALLBACK_MAC};
pub use net::{now_millis, ConnectPoint, DeviceId, HostId, HostLocation, VlanId};
pub use packet::{InboundPacket, OutboundPacket, TrafficTreatment};
pub use record::DhcpRecord;
pub use relay_agent::{CircuitId, RelayAgentInformation, RelaySubOption};
