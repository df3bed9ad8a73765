//! Ethernet frame layering: Ethernet[/802.1Q] carrying IPv4/UDP, ARP or IPv6.
//!
//! Frames are decoded through `pnet` packet views into owned values the
//! relay can rewrite, then encoded back with fresh IPv4 and UDP checksums.

use std::net::Ipv4Addr;

use macaddr::MacAddr6;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperation, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherType, EtherTypes, EthernetPacket, MutableEthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::{self, Ipv4Packet, MutableIpv4Packet};
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::{self, MutableUdpPacket, UdpPacket};
use pnet::packet::vlan::{ClassOfService, MutableVlanPacket, VlanPacket};
use pnet::packet::{MutablePacket, Packet};
use pnet::util::MacAddr;

use crate::domain::VlanId;
use crate::error::FrameError;

const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const IPV4_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;
const ARP_LEN: usize = 28;

/// A decoded Ethernet frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EthernetFrame {
    pub destination: MacAddr6,
    pub source: MacAddr6,
    /// 802.1Q VLAN, or [`VlanId::NONE`] when the frame is untagged.
    pub vlan: VlanId,
    /// 802.1Q priority code point; ignored when untagged.
    pub priority: u8,
    pub payload: FramePayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    Ipv4(Ipv4Datagram),
    Ipv6(Ipv6Datagram),
    Arp(ArpMessage),
    /// Any other EtherType, kept raw.
    Other(u16, Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv4Datagram {
    pub dscp: u8,
    pub ecn: u8,
    pub identification: u16,
    pub flags: u8,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    /// Raw header options, a multiple of four bytes.
    pub options: Vec<u8>,
    pub payload: Ipv4Payload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ipv4Payload {
    Udp(UdpDatagram),
    Other(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UdpDatagram {
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: Vec<u8>,
}

/// Just enough of an IPv6 packet to recognise DHCPv6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ipv6Datagram {
    pub next_header: u8,
    /// (source, destination) ports when the payload is UDP.
    pub udp_ports: Option<(u16, u16)>,
    raw: Vec<u8>,
}

/// An Ethernet/IPv4 ARP message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArpMessage {
    pub operation: ArpOperation,
    pub sender_mac: MacAddr6,
    pub sender_ip: Ipv4Addr,
    pub target_mac: MacAddr6,
    pub target_ip: Ipv4Addr,
}

impl EthernetFrame {
    /// Decode a raw frame.
    pub fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let eth = EthernetPacket::new(data).ok_or(FrameError::Truncated { layer: "Ethernet" })?;
        let destination = MacAddr6::from(eth.get_destination().octets());
        let source = MacAddr6::from(eth.get_source().octets());

        if eth.get_ethertype() == EtherTypes::Vlan {
            let tag =
                VlanPacket::new(eth.payload()).ok_or(FrameError::Truncated { layer: "802.1Q" })?;
            // VID 4095 is reserved; treat it like an untagged frame.
            let vlan = VlanId::new(tag.get_vlan_identifier()).unwrap_or(VlanId::NONE);
            Ok(Self {
                destination,
                source,
                vlan,
                priority: tag.get_priority_code_point().0,
                payload: FramePayload::parse(tag.get_ethertype(), tag.payload())?,
            })
        } else {
            Ok(Self {
                destination,
                source,
                vlan: VlanId::NONE,
                priority: 0,
                payload: FramePayload::parse(eth.get_ethertype(), eth.payload())?,
            })
        }
    }

    /// Encode the frame, tagging it when `vlan` is set.
    pub fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let (ethertype, l3) = self.payload.encode()?;
        let header_len = match self.vlan.id() {
            Some(_) => ETHERNET_HEADER_LEN + VLAN_TAG_LEN,
            None => ETHERNET_HEADER_LEN,
        };

        let mut buf = vec![0u8; header_len + l3.len()];
        buf[header_len..].copy_from_slice(&l3);

        let mut eth = MutableEthernetPacket::new(&mut buf)
            .ok_or(FrameError::Encode { layer: "Ethernet" })?;
        eth.set_destination(MacAddr::from(self.destination.into_array()));
        eth.set_source(MacAddr::from(self.source.into_array()));

        match self.vlan.id() {
            Some(id) => {
                eth.set_ethertype(EtherTypes::Vlan);
                let mut tag = MutableVlanPacket::new(eth.payload_mut())
                    .ok_or(FrameError::Encode { layer: "802.1Q" })?;
                tag.set_priority_code_point(ClassOfService(self.priority & 0x07));
                tag.set_drop_eligible_indicator(0);
                tag.set_vlan_identifier(id);
                tag.set_ethertype(ethertype);
            }
            None => eth.set_ethertype(ethertype),
        }

        Ok(buf)
    }

    pub fn ipv4(&self) -> Option<&Ipv4Datagram> {
        match &self.payload {
            FramePayload::Ipv4(ip) => Some(ip),
            _ => None,
        }
    }

    pub fn ipv4_mut(&mut self) -> Option<&mut Ipv4Datagram> {
        match &mut self.payload {
            FramePayload::Ipv4(ip) => Some(ip),
            _ => None,
        }
    }

    pub fn udp(&self) -> Option<&UdpDatagram> {
        match &self.ipv4()?.payload {
            Ipv4Payload::Udp(udp) => Some(udp),
            Ipv4Payload::Other(_) => None,
        }
    }

    pub fn udp_mut(&mut self) -> Option<&mut UdpDatagram> {
        match &mut self.ipv4_mut()?.payload {
            Ipv4Payload::Udp(udp) => Some(udp),
            Ipv4Payload::Other(_) => None,
        }
    }

    pub fn arp(&self) -> Option<&ArpMessage> {
        match &self.payload {
            FramePayload::Arp(arp) => Some(arp),
            _ => None,
        }
    }
}

impl FramePayload {
    fn parse(ethertype: EtherType, data: &[u8]) -> Result<Self, FrameError> {
        Ok(match ethertype {
            EtherTypes::Ipv4 => FramePayload::Ipv4(Ipv4Datagram::parse(data)?),
            EtherTypes::Ipv6 => FramePayload::Ipv6(Ipv6Datagram::parse(data)?),
            EtherTypes::Arp => FramePayload::Arp(ArpMessage::parse(data)?),
            EtherType(other) => FramePayload::Other(other, data.to_vec()),
        })
    }

    fn encode(&self) -> Result<(EtherType, Vec<u8>), FrameError> {
        Ok(match self {
            FramePayload::Ipv4(ip) => (EtherTypes::Ipv4, ip.to_bytes()?),
            FramePayload::Ipv6(ip) => (EtherTypes::Ipv6, ip.raw.clone()),
            FramePayload::Arp(arp) => (EtherTypes::Arp, arp.to_bytes()?),
            FramePayload::Other(ethertype, raw) => (EtherType(*ethertype), raw.clone()),
        })
    }
}

impl Ipv4Datagram {
    fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let ip = Ipv4Packet::new(data).ok_or(FrameError::Truncated { layer: "IPv4" })?;
        let header_len = ip.get_header_length() as usize * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(FrameError::BadIpv4Header(ip.get_header_length()));
        }
        if data.len() < header_len || (ip.get_total_length() as usize) > data.len() {
            return Err(FrameError::Truncated { layer: "IPv4" });
        }

        let payload = if ip.get_next_level_protocol() == IpNextHeaderProtocols::Udp {
            Ipv4Payload::Udp(UdpDatagram::parse(ip.payload())?)
        } else {
            Ipv4Payload::Other(ip.payload().to_vec())
        };

        Ok(Self {
            dscp: ip.get_dscp(),
            ecn: ip.get_ecn(),
            identification: ip.get_identification(),
            flags: ip.get_flags(),
            fragment_offset: ip.get_fragment_offset(),
            ttl: ip.get_ttl(),
            protocol: ip.get_next_level_protocol().0,
            source: ip.get_source(),
            destination: ip.get_destination(),
            options: data[IPV4_MIN_HEADER_LEN..header_len].to_vec(),
            payload,
        })
    }

    fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let l4 = match &self.payload {
            Ipv4Payload::Udp(udp) => udp.to_bytes(self.source, self.destination)?,
            Ipv4Payload::Other(raw) => raw.clone(),
        };
        let header_len = IPV4_MIN_HEADER_LEN + self.options.len();
        let total_len = header_len + l4.len();

        let mut buf = vec![0u8; total_len];
        buf[IPV4_MIN_HEADER_LEN..header_len].copy_from_slice(&self.options);
        buf[header_len..].copy_from_slice(&l4);

        let mut ip =
            MutableIpv4Packet::new(&mut buf).ok_or(FrameError::Encode { layer: "IPv4" })?;
        ip.set_version(4);
        ip.set_header_length((header_len / 4) as u8);
        ip.set_dscp(self.dscp);
        ip.set_ecn(self.ecn);
        ip.set_total_length(total_len as u16);
        ip.set_identification(self.identification);
        ip.set_flags(self.flags);
        ip.set_fragment_offset(self.fragment_offset);
        ip.set_ttl(self.ttl);
        ip.set_next_level_protocol(pnet::packet::ip::IpNextHeaderProtocol(self.protocol));
        ip.set_source(self.source);
        ip.set_destination(self.destination);
        ip.set_checksum(0);
        let checksum = ipv4::checksum(&ip.to_immutable());
        ip.set_checksum(checksum);

        Ok(buf)
    }

    pub fn udp(&self) -> Option<&UdpDatagram> {
        match &self.payload {
            Ipv4Payload::Udp(udp) => Some(udp),
            Ipv4Payload::Other(_) => None,
        }
    }
}

impl UdpDatagram {
    fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let udp = UdpPacket::new(data).ok_or(FrameError::Truncated { layer: "UDP" })?;
        let declared = (udp.get_length() as usize).saturating_sub(UDP_HEADER_LEN);
        if declared > udp.payload().len() {
            return Err(FrameError::Truncated { layer: "UDP" });
        }
        Ok(Self {
            source_port: udp.get_source(),
            destination_port: udp.get_destination(),
            payload: udp.payload()[..declared].to_vec(),
        })
    }

    fn to_bytes(&self, source: Ipv4Addr, destination: Ipv4Addr) -> Result<Vec<u8>, FrameError> {
        let total_len = UDP_HEADER_LEN + self.payload.len();
        let mut buf = vec![0u8; total_len];
        buf[UDP_HEADER_LEN..].copy_from_slice(&self.payload);

        let mut udp = MutableUdpPacket::new(&mut buf).ok_or(FrameError::Encode { layer: "UDP" })?;
        udp.set_source(self.source_port);
        udp.set_destination(self.destination_port);
        udp.set_length(total_len as u16);
        udp.set_checksum(0);
        let checksum = udp::ipv4_checksum(&udp.to_immutable(), &source, &destination);
        udp.set_checksum(checksum);

        Ok(buf)
    }
}

impl Ipv6Datagram {
    fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let ip = Ipv6Packet::new(data).ok_or(FrameError::Truncated { layer: "IPv6" })?;
        let next_header = ip.get_next_header();
        let udp_ports = if next_header == IpNextHeaderProtocols::Udp {
            UdpPacket::new(ip.payload()).map(|udp| (udp.get_source(), udp.get_destination()))
        } else {
            None
        };
        Ok(Self {
            next_header: next_header.0,
            udp_ports,
            raw: data.to_vec(),
        })
    }
}

impl ArpMessage {
    fn parse(data: &[u8]) -> Result<Self, FrameError> {
        let arp = ArpPacket::new(data).ok_or(FrameError::Truncated { layer: "ARP" })?;
        if arp.get_hardware_type() != ArpHardwareTypes::Ethernet
            || arp.get_protocol_type() != EtherTypes::Ipv4
            || arp.get_hw_addr_len() != 6
            || arp.get_proto_addr_len() != 4
        {
            return Err(FrameError::UnsupportedArp {
                hardware: arp.get_hw_addr_len(),
                protocol: arp.get_proto_addr_len(),
            });
        }
        Ok(Self {
            operation: arp.get_operation(),
            sender_mac: MacAddr6::from(arp.get_sender_hw_addr().octets()),
            sender_ip: arp.get_sender_proto_addr(),
            target_mac: MacAddr6::from(arp.get_target_hw_addr().octets()),
            target_ip: arp.get_target_proto_addr(),
        })
    }

    fn to_bytes(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = vec![0u8; ARP_LEN];
        let mut arp = MutableArpPacket::new(&mut buf).ok_or(FrameError::Encode { layer: "ARP" })?;
        arp.set_hardware_type(ArpHardwareTypes::Ethernet);
        arp.set_protocol_type(EtherTypes::Ipv4);
        arp.set_hw_addr_len(6);
        arp.set_proto_addr_len(4);
        arp.set_operation(self.operation);
        arp.set_sender_hw_addr(MacAddr::from(self.sender_mac.into_array()));
        arp.set_sender_proto_addr(self.sender_ip);
        arp.set_target_hw_addr(MacAddr::from(self.target_mac.into_array()));
        arp.set_target_proto_addr(self.target_ip);
        Ok(buf)
    }
}
