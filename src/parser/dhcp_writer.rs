//! DHCP packet serializer, the inverse of [`DhcpParser`](super::DhcpParser).

use crate::domain::{option_codes, DhcpOption, DhcpPacket};
use crate::error::ParseError;
use crate::parser::dhcp_parser::DHCP_MAGIC_COOKIE;

/// BOOTP minimum message size; shorter messages are zero-padded after END.
const MIN_BOOTP_SIZE: usize = 300;

/// Serializes [`DhcpPacket`] values into UDP payloads.
pub struct DhcpWriter;

impl DhcpWriter {
    pub fn new() -> Self {
        Self
    }

    /// Encode `packet`. END is appended if the option list lacks it, and
    /// anything after END is not written. Fails if an option payload does
    /// not fit its one-byte length.
    pub fn write(&self, packet: &DhcpPacket) -> Result<Vec<u8>, ParseError> {
        let mut out = Vec::with_capacity(MIN_BOOTP_SIZE);

        out.push(packet.op);
        out.push(packet.htype);
        out.push(packet.hlen);
        out.push(packet.hops);
        out.extend_from_slice(&packet.xid.to_be_bytes());
        out.extend_from_slice(&packet.secs.to_be_bytes());
        out.extend_from_slice(&packet.flags.to_be_bytes());
        out.extend_from_slice(&packet.ciaddr.octets());
        out.extend_from_slice(&packet.yiaddr.octets());
        out.extend_from_slice(&packet.siaddr.octets());
        out.extend_from_slice(&packet.giaddr.octets());

        // chaddr is 16 bytes; only the Ethernet MAC is kept, the padding is zeroed
        out.extend_from_slice(packet.chaddr.as_bytes());
        out.extend_from_slice(&[0u8; 10]);

        Self::write_fixed(&mut out, &packet.sname, 64);
        Self::write_fixed(&mut out, &packet.file, 128);
        out.extend_from_slice(&DHCP_MAGIC_COOKIE);

        for option in &packet.options {
            if *option == DhcpOption::End {
                break;
            }
            Self::write_option(&mut out, option)?;
        }
        out.push(option_codes::END);

        if out.len() < MIN_BOOTP_SIZE {
            out.resize(MIN_BOOTP_SIZE, option_codes::PAD);
        }
        Ok(out)
    }

    /// Write `field` into exactly `size` bytes, truncating or zero-filling.
    fn write_fixed(out: &mut Vec<u8>, field: &[u8], size: usize) {
        let len = field.len().min(size);
        out.extend_from_slice(&field[..len]);
        out.resize(out.len() + size - len, 0);
    }

    fn write_option(out: &mut Vec<u8>, option: &DhcpOption) -> Result<(), ParseError> {
        let too_long = |len| ParseError::OptionTooLong {
            code: option.code(),
            len,
        };
        let data = match option {
            DhcpOption::MessageType(msg_type) => vec![msg_type.as_u8()],
            DhcpOption::RequestedIp(ip) | DhcpOption::ServerIdentifier(ip) => ip.octets().to_vec(),
            DhcpOption::RelayAgentInformation(info) => {
                let longest = info.sub_options.iter().map(|sub| sub.data().len()).max();
                info.encode()
                    .ok_or_else(|| too_long(longest.unwrap_or_default()))?
            }
            DhcpOption::Unknown(_, data) => data.clone(),
            DhcpOption::End => return Ok(()),
        };

        let len = u8::try_from(data.len()).map_err(|_| too_long(data.len()))?;
        out.push(option.code());
        out.push(len);
        out.extend_from_slice(&data);
        Ok(())
    }
}

impl Default for DhcpWriter {
    fn default() -> Self {
        Self::new()
    }
}
