//! Wire formats.
//!
//! Turns raw frames into domain values and back: Ethernet/VLAN/IPv4/UDP/ARP
//! layering in `frame`, the DHCP message itself in `dhcp_parser` and
//! `dhcp_writer`.

mod dhcp_parser;
mod dhcp_writer;
mod frame;

pub use dhcp_parser::DhcpParser;
pub use dhcp_writer::DhcpWriter;
pub use frame::{
    ArpMessage, EthernetFrame, FramePayload, Ipv4Datagram, Ipv4Payload, Ipv6Datagram, UdpDatagram,
};
