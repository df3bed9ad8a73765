//! Packets entering and leaving the relay through the packet I/O substrate.

use crate::domain::net::{ConnectPoint, DeviceId};

/// A raw frame received at a connect point.
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub received_from: ConnectPoint,
    pub data: Vec<u8>,
}

impl InboundPacket {
    pub fn new(received_from: ConnectPoint, data: Vec<u8>) -> Self {
        Self {
            received_from,
            data,
        }
    }
}

/// Output instructions for an emitted frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficTreatment {
    pub output_port: u32,
}

/// A raw frame to emit from a device port. Emission is fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPacket {
    pub device_id: DeviceId,
    pub treatment: TrafficTreatment,
    pub data: Vec<u8>,
}

impl OutboundPacket {
    /// A frame sent out of `connect_point`.
    pub fn to(connect_point: &ConnectPoint, data: Vec<u8>) -> Self {
        Self {
            device_id: connect_point.device_id.clone(),
            treatment: TrafficTreatment {
                output_port: connect_point.port,
            },
            data,
        }
    }

    /// The connect point the frame leaves from.
    pub fn target(&self) -> ConnectPoint {
        ConnectPoint::new(self.device_id.clone(), self.treatment.output_port)
    }
}
