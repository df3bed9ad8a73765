//! Network identity types: devices, ports, VLANs and host identities.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use macaddr::MacAddr6;

/// Identifier of a switching device, e.g. `of:0000000000000001`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device id. Returns `None` for empty or whitespace-bearing ids.
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() || !id.is_ascii() || id.chars().any(|c| c.is_ascii_whitespace()) {
            return None;
        }
        Some(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A (device, port) attachment point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectPoint {
    pub device_id: DeviceId,
    pub port: u32,
}

impl ConnectPoint {
    pub fn new(device_id: DeviceId, port: u32) -> Self {
        Self { device_id, port }
    }
}

/// Formats as `device/port`.
impl fmt::Display for ConnectPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device_id, self.port)
    }
}

impl FromStr for ConnectPoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (device, port) = s
            .rsplit_once('/')
            .ok_or_else(|| format!("missing '/' in connect point {s:?}"))?;
        let device_id =
            DeviceId::new(device).ok_or_else(|| format!("invalid device id {device:?}"))?;
        let port = port
            .parse::<u32>()
            .map_err(|_| format!("invalid port number {port:?}"))?;
        Ok(Self::new(device_id, port))
    }
}

/// An 802.1Q VLAN id, or [`VlanId::NONE`] for untagged traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VlanId(u16);

impl VlanId {
    /// Untagged.
    pub const NONE: VlanId = VlanId(0xffff);
    /// Highest usable VLAN id.
    pub const MAX: u16 = 4094;

    /// Create a tagged VLAN id. Returns `None` outside `0..=4094`.
    pub fn new(id: u16) -> Option<Self> {
        (id <= Self::MAX).then_some(Self(id))
    }

    /// The 12-bit tag value, or `None` when untagged.
    pub fn id(&self) -> Option<u16> {
        (!self.is_none()).then_some(self.0)
    }

    pub fn is_none(&self) -> bool {
        *self == Self::NONE
    }
}

impl Default for VlanId {
    fn default() -> Self {
        Self::NONE
    }
}

/// Formats as the decimal id, or `None` when untagged.
impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id() {
            Some(id) => write!(f, "{id}"),
            None => f.write_str("None"),
        }
    }
}

impl FromStr for VlanId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "None" {
            return Ok(Self::NONE);
        }
        let id = s
            .parse::<u16>()
            .map_err(|_| format!("invalid VLAN id {s:?}"))?;
        Self::new(id).ok_or_else(|| format!("VLAN id out of range: {id}"))
    }
}

/// Identity of an end host: MAC plus VLAN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId {
    pub mac: MacAddr6,
    pub vlan: VlanId,
}

impl HostId {
    pub fn new(mac: MacAddr6, vlan: VlanId) -> Self {
        Self { mac, vlan }
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.mac, self.vlan)
    }
}

/// A connect point where a host was observed, with the observation time in
/// milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostLocation {
    pub connect_point: ConnectPoint,
    pub time: u64,
}

impl HostLocation {
    pub fn new(connect_point: ConnectPoint, time: u64) -> Self {
        Self {
            connect_point,
            time,
        }
    }

    /// A location observed now.
    pub fn now(connect_point: ConnectPoint) -> Self {
        Self::new(connect_point, now_millis())
    }
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
