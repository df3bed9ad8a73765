//! DHCP message decoding (RFC 2131 / RFC 2132).

use std::net::Ipv4Addr;

use macaddr::MacAddr6;

use crate::domain::relay_agent::RelayAgentInformation;
use crate::domain::{option_codes, DhcpMessageType, DhcpOption, DhcpPacket};
use crate::error::ParseError;

/// Magic cookie that separates the BOOTP header from DHCP options.
pub(crate) const DHCP_MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

/// Fixed BOOTP header length; the cookie follows immediately.
const HEADER_LEN: usize = 236;
const OPTIONS_OFFSET: usize = HEADER_LEN + DHCP_MAGIC_COOKIE.len();

const CHADDR_OFFSET: usize = 28;
const SNAME: std::ops::Range<usize> = 44..108;
const FILE: std::ops::Range<usize> = 108..HEADER_LEN;

/// Parser for DHCP packets.
///
/// Focuses solely on turning the DHCP wire format into domain types.
/// Options the relay does not interpret are preserved verbatim as
/// [`DhcpOption::Unknown`] so they survive re-serialization.
pub struct DhcpParser;

impl DhcpParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a DHCP message from a UDP payload.
    pub fn parse(&self, data: &[u8]) -> Result<DhcpPacket, ParseError> {
        if data.len() < OPTIONS_OFFSET {
            return Err(ParseError::PacketTooShort {
                expected: OPTIONS_OFFSET,
                actual: data.len(),
            });
        }
        if data[HEADER_LEN..OPTIONS_OFFSET] != DHCP_MAGIC_COOKIE {
            return Err(ParseError::InvalidMagicCookie);
        }

        let mut chaddr = [0u8; 6];
        chaddr.copy_from_slice(&data[CHADDR_OFFSET..CHADDR_OFFSET + 6]);

        Ok(DhcpPacket {
            op: data[0],
            htype: data[1],
            hlen: data[2],
            hops: data[3],
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: ipv4_at(data, 12),
            yiaddr: ipv4_at(data, 16),
            siaddr: ipv4_at(data, 20),
            giaddr: ipv4_at(data, 24),
            // Only Ethernet hardware addresses are relayed; the rest of the
            // 16-byte field is padding.
            chaddr: MacAddr6::from(chaddr),
            sname: data[SNAME].to_vec(),
            file: data[FILE].to_vec(),
            options: self.parse_options(&data[OPTIONS_OFFSET..])?,
        })
    }

    /// Parse DHCP options from the options section.
    ///
    /// The list is terminated by END, which is kept as the last element.
    /// A missing END is an error: the relay only handles well-formed
    /// option lists.
    fn parse_options(&self, data: &[u8]) -> Result<Vec<DhcpOption>, ParseError> {
        let mut options = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            let code = data[offset];

            if code == option_codes::PAD {
                offset += 1;
                continue;
            }

            if code == option_codes::END {
                options.push(DhcpOption::End);
                return Ok(options);
            }

            if offset + 1 >= data.len() {
                return Err(ParseError::InvalidOption {
                    offset,
                    message: "option length missing".to_string(),
                });
            }

            let len = data[offset + 1] as usize;

            if offset + 2 + len > data.len() {
                return Err(ParseError::InvalidOption {
                    offset,
                    message: format!(
                        "option data truncated: expected {} bytes, have {}",
                        len,
                        data.len() - offset - 2
                    ),
                });
            }

            let option_data = &data[offset + 2..offset + 2 + len];
            options.push(self.parse_option(code, option_data));

            offset += 2 + len;
        }

        Err(ParseError::InvalidOption {
            offset,
            message: "option list not terminated by END".to_string(),
        })
    }

    /// Parse a single DHCP option. Known codes whose payload does not
    /// decode fall back to [`DhcpOption::Unknown`] with the raw bytes.
    fn parse_option(&self, code: u8, data: &[u8]) -> DhcpOption {
        let parsed = match code {
            option_codes::MESSAGE_TYPE if data.len() == 1 => {
                DhcpMessageType::from_u8(data[0]).map(DhcpOption::MessageType)
            }

            option_codes::REQUESTED_IP => Self::parse_ipv4(data).map(DhcpOption::RequestedIp),

            option_codes::SERVER_ID => Self::parse_ipv4(data).map(DhcpOption::ServerIdentifier),

            option_codes::RELAY_AGENT_INFORMATION => {
                RelayAgentInformation::parse(data).map(DhcpOption::RelayAgentInformation)
            }

            _ => None,
        };

        parsed.unwrap_or_else(|| DhcpOption::Unknown(code, data.to_vec()))
    }

    fn parse_ipv4(data: &[u8]) -> Option<Ipv4Addr> {
        let octets: [u8; 4] = data.try_into().ok()?;
        Some(Ipv4Addr::from(octets))
    }
}

fn ipv4_at(data: &[u8], offset: usize) -> Ipv4Addr {
    Ipv4Addr::new(data[offset], data[offset + 1], data[offset + 2], data[offset + 3])
}

impl Default for DhcpParser {
    fn default() -> Self {
        Self::new()
    }
}
