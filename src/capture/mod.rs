//! Frame capture and emission on the ports the relay is bound to.
//!
//! `PacketCapture` abstracts the receive side so the daemon loop can run
//! against pnet or a canned frame source. Emission goes through
//! [`PacketService`](crate::services::PacketService) implementations.

mod pnet_capture;

pub use pnet_capture::{PnetCapture, PnetPacketService};

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::domain::{InboundPacket, OutboundPacket};
use crate::error::CaptureError;
use crate::parser::EthernetFrame;
use crate::services::PacketService;

/// Receive side of one bound port.
pub trait PacketCapture: Send {
    /// Start capturing. The iterator yields every frame that could matter to
    /// the relay, tagged with this port's connect point, and ends once the
    /// running flag is cleared.
    fn packets(&mut self) -> Result<Box<dyn Iterator<Item = InboundPacket> + '_>, CaptureError>;

    fn interface_name(&self) -> &str;

    /// Flag checked between reads; clearing it stops the iterator.
    fn set_running(&mut self, running: Arc<AtomicBool>);
}

/// Logs frames instead of putting them on the wire.
#[derive(Debug, Default)]
pub struct DryRunPacketService;

impl PacketService for DryRunPacketService {
    fn emit(&self, packet: OutboundPacket) {
        let target = packet.target();
        match EthernetFrame::parse(&packet.data) {
            Ok(frame) => tracing::info!(
                "[dry-run] {} -> {} vlan {} via {} ({} bytes)",
                frame.source,
                frame.destination,
                frame.vlan,
                target,
                packet.data.len()
            ),
            Err(e) => tracing::info!("[dry-run] unparseable frame via {}: {}", target, e),
        }
    }
}
