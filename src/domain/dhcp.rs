//! DHCP packet domain models.
//!
//! These types represent the logical structure of DHCP packets,
//! independent of wire format parsing. Everything the relay does not
//! interpret is kept verbatim so a relayed message differs from the
//! original only where the relay rewrote it.

use std::net::Ipv4Addr;

use macaddr::MacAddr6;

use crate::domain::relay_agent::{CircuitId, RelayAgentInformation};

/// DHCP option codes the relay interprets.
pub mod option_codes {
    pub const PAD: u8 = 0;
    pub const REQUESTED_IP: u8 = 50;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_ID: u8 = 54;
    pub const RELAY_AGENT_INFORMATION: u8 = 82;
    pub const END: u8 = 255;
}

/// DHCP message types as defined in RFC 2131.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DhcpMessageType {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
}

impl DhcpMessageType {
    /// Parse from the DHCP option 53 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Discover),
            2 => Some(Self::Offer),
            3 => Some(Self::Request),
            4 => Some(Self::Decline),
            5 => Some(Self::Ack),
            6 => Some(Self::Nak),
            7 => Some(Self::Release),
            8 => Some(Self::Inform),
            _ => None,
        }
    }

    /// The option 53 value.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Discover => 1,
            Self::Offer => 2,
            Self::Request => 3,
            Self::Decline => 4,
            Self::Ack => 5,
            Self::Nak => 6,
            Self::Release => 7,
            Self::Inform => 8,
        }
    }
}

impl std::fmt::Display for DhcpMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover => write!(f, "DHCPDISCOVER"),
            Self::Offer => write!(f, "DHCPOFFER"),
            Self::Request => write!(f, "DHCPREQUEST"),
            Self::Decline => write!(f, "DHCPDECLINE"),
            Self::Ack => write!(f, "DHCPACK"),
            Self::Nak => write!(f, "DHCPNAK"),
            Self::Release => write!(f, "DHCPRELEASE"),
            Self::Inform => write!(f, "DHCPINFORM"),
        }
    }
}

/// A DHCP option, tagged by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    /// Option 53: DHCP Message Type
    MessageType(DhcpMessageType),
    /// Option 50: Requested IP Address
    RequestedIp(Ipv4Addr),
    /// Option 54: Server Identifier
    ServerIdentifier(Ipv4Addr),
    /// Option 82: Relay Agent Information
    RelayAgentInformation(RelayAgentInformation),
    /// Option 255: End
    End,
    /// Any other option, or a known one whose payload did not decode (code, data)
    Unknown(u8, Vec<u8>),
}

impl DhcpOption {
    pub fn code(&self) -> u8 {
        match self {
            Self::MessageType(_) => option_codes::MESSAGE_TYPE,
            Self::RequestedIp(_) => option_codes::REQUESTED_IP,
            Self::ServerIdentifier(_) => option_codes::SERVER_ID,
            Self::RelayAgentInformation(_) => option_codes::RELAY_AGENT_INFORMATION,
            Self::End => option_codes::END,
            Self::Unknown(code, _) => *code,
        }
    }
}

/// A parsed DHCP packet with all fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpPacket {
    /// Operation: 1 = BOOTREQUEST, 2 = BOOTREPLY
    pub op: u8,
    /// Hardware type (1 = Ethernet)
    pub htype: u8,
    /// Hardware address length
    pub hlen: u8,
    /// Relay hop count
    pub hops: u8,
    /// Transaction ID
    pub xid: u32,
    /// Seconds elapsed
    pub secs: u16,
    /// Flags
    pub flags: u16,
    /// Client IP address (if already known)
    pub ciaddr: Ipv4Addr,
    /// 'Your' IP address (assigned by server)
    pub yiaddr: Ipv4Addr,
    /// Server IP address
    pub siaddr: Ipv4Addr,
    /// Gateway IP address
    pub giaddr: Ipv4Addr,
    /// Client hardware address (MAC).
    ///
    /// Only the first six bytes of the 16-byte field are kept; the rest is
    /// written back as zeros whatever `hlen` says. The relay keys clients by
    /// Ethernet MAC, so non-Ethernet hardware addresses are not preserved.
    pub chaddr: MacAddr6,
    /// Server hostname field, 64 raw bytes
    pub sname: Vec<u8>,
    /// Boot filename field, 128 raw bytes
    pub file: Vec<u8>,
    /// DHCP options in wire order
    pub options: Vec<DhcpOption>,
}

impl DhcpPacket {
    /// Get the DHCP message type from options.
    pub fn message_type(&self) -> Option<DhcpMessageType> {
        self.options.iter().find_map(|opt| {
            if let DhcpOption::MessageType(msg_type) = opt {
                Some(*msg_type)
            } else {
                None
            }
        })
    }

    /// True if any option 82 is present, decodable or not.
    pub fn has_relay_agent_option(&self) -> bool {
        self.options
            .iter()
            .any(|opt| opt.code() == option_codes::RELAY_AGENT_INFORMATION)
    }

    /// Get the decoded relay agent information (Option 82).
    pub fn relay_agent_information(&self) -> Option<&RelayAgentInformation> {
        self.options.iter().find_map(|opt| {
            if let DhcpOption::RelayAgentInformation(ref info) = opt {
                Some(info)
            } else {
                None
            }
        })
    }

    /// Decode the circuit id sub-option, if present and in our format.
    pub fn circuit_id(&self) -> Option<CircuitId> {
        let raw = self.relay_agent_information()?.circuit_id()?;
        match CircuitId::decode(raw) {
            Ok(cid) => Some(cid),
            Err(e) => {
                tracing::debug!("Invalid circuit id {:?}: {}", String::from_utf8_lossy(raw), e);
                None
            }
        }
    }

    /// Replace any relay agent information with `info`, keeping END as the
    /// last option exactly once.
    pub fn set_relay_agent_information(&mut self, info: RelayAgentInformation) {
        self.options.retain(|opt| {
            !matches!(
                opt.code(),
                option_codes::END | option_codes::RELAY_AGENT_INFORMATION
            )
        });
        self.options.push(DhcpOption::RelayAgentInformation(info));
        self.options.push(DhcpOption::End);
    }

    /// Drop every option 82 from the option list.
    pub fn remove_relay_agent_information(&mut self) {
        self.options
            .retain(|opt| opt.code() != option_codes::RELAY_AGENT_INFORMATION);
    }
}
