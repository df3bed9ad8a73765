//! Daemon configuration: a TOML file plus environment overrides.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use macaddr::MacAddr6;
use pnet::ipnetwork::Ipv4Network;
use serde::Deserialize;

use crate::domain::{ConnectPoint, HostDescription, HostId, HostLocation, Interface, VlanId};
use crate::error::ConfigError;
use crate::relay::DhcpServerConfig;

const DEFAULT_CONFIG_PATH: &str = "/etc/dhcp-relay.toml";
const DEFAULT_LOG_FILTER: &str = "info";

/// A host interface captured on behalf of a connect point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortBinding {
    pub name: String,
    pub connect_point: ConnectPoint,
}

/// A host known ahead of discovery, such as the DHCP server itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticHost {
    pub mac: MacAddr6,
    pub vlan: VlanId,
    pub ips: Vec<Ipv4Addr>,
    pub location: ConnectPoint,
}

impl StaticHost {
    pub fn id(&self) -> HostId {
        HostId::new(self.mac, self.vlan)
    }

    pub fn description(&self) -> HostDescription {
        let location = HostLocation::now(self.location.clone());
        self.ips.iter().fold(
            HostDescription::new(self.mac, self.vlan, location),
            |description, ip| description.with_ip(*ip),
        )
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `None` leaves the relay unconfigured; every DHCP packet is dropped.
    pub server: Option<DhcpServerConfig>,
    pub arp_enabled: bool,
    pub log_filter: String,
    pub ports: Vec<PortBinding>,
    pub interfaces: Vec<Interface>,
    pub hosts: Vec<StaticHost>,
}

impl Config {
    /// The file to load: the explicit path, else `DHCP_RELAY_CONFIG`, else
    /// the system default.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var("DHCP_RELAY_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut config = Self::parse(&content, path)?;
        config.apply_arp_override(std::env::var("DHCP_RELAY_ARP_ENABLED").ok())?;
        Ok(config)
    }

    /// Parse configuration text. `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.display().to_string(),
            source,
        })?;
        raw.try_into()
    }

    fn apply_arp_override(&mut self, value: Option<String>) -> Result<(), ConfigError> {
        let Some(value) = value else {
            return Ok(());
        };
        self.arp_enabled = match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => {
                return Err(ConfigError::InvalidValue {
                    field: "DHCP_RELAY_ARP_ENABLED",
                    value,
                })
            }
        };
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    relay: RawRelay,
    #[serde(default)]
    ports: Vec<RawPort>,
    #[serde(default)]
    interfaces: Vec<RawInterface>,
    #[serde(default)]
    hosts: Vec<RawHost>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawRelay {
    dhcp_server_ip: Option<Ipv4Addr>,
    dhcp_server_connect_point: Option<String>,
    dhcp_gateway_ip: Option<Ipv4Addr>,
    arp_enabled: bool,
    log_filter: String,
}

impl Default for RawRelay {
    fn default() -> Self {
        Self {
            dhcp_server_ip: None,
            dhcp_server_connect_point: None,
            dhcp_gateway_ip: None,
            arp_enabled: true,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPort {
    name: String,
    connect_point: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInterface {
    name: String,
    connect_point: String,
    #[serde(default)]
    ips: Vec<String>,
    mac: Option<String>,
    vlan: Option<u16>,
    vlan_untagged: Option<u16>,
    #[serde(default)]
    vlan_tagged: Vec<u16>,
    vlan_native: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawHost {
    mac: String,
    vlan: Option<u16>,
    #[serde(default)]
    ips: Vec<Ipv4Addr>,
    location: String,
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        let relay = raw.relay;
        let server = match (relay.dhcp_server_ip, relay.dhcp_server_connect_point) {
            (Some(server_ip), Some(cp)) => Some(DhcpServerConfig {
                server_ip,
                server_connect_point: connect_point("relay.dhcp_server_connect_point", &cp)?,
                gateway_ip: relay.dhcp_gateway_ip,
            }),
            (None, None) if relay.dhcp_gateway_ip.is_none() => None,
            (Some(_), None) => {
                return Err(ConfigError::InvalidValue {
                    field: "relay.dhcp_server_connect_point",
                    value: "missing".to_string(),
                })
            }
            (None, _) => {
                return Err(ConfigError::InvalidValue {
                    field: "relay.dhcp_server_ip",
                    value: "missing".to_string(),
                })
            }
        };

        let ports = raw
            .ports
            .into_iter()
            .map(|port| {
                Ok(PortBinding {
                    connect_point: connect_point("ports.connect_point", &port.connect_point)?,
                    name: port.name,
                })
            })
            .collect::<Result<_, ConfigError>>()?;

        let interfaces = raw
            .interfaces
            .into_iter()
            .map(Interface::try_from)
            .collect::<Result<_, _>>()?;

        let hosts = raw
            .hosts
            .into_iter()
            .map(|host| {
                Ok(StaticHost {
                    mac: mac("hosts.mac", &host.mac)?,
                    vlan: optional_vlan("hosts.vlan", host.vlan)?,
                    ips: host.ips,
                    location: connect_point("hosts.location", &host.location)?,
                })
            })
            .collect::<Result<_, ConfigError>>()?;

        Ok(Config {
            server,
            arp_enabled: relay.arp_enabled,
            log_filter: relay.log_filter,
            ports,
            interfaces,
            hosts,
        })
    }
}

impl TryFrom<RawInterface> for Interface {
    type Error = ConfigError;

    fn try_from(raw: RawInterface) -> Result<Self, Self::Error> {
        let mut iface = Interface::new(
            raw.name,
            connect_point("interfaces.connect_point", &raw.connect_point)?,
        )
        .with_vlan(optional_vlan("interfaces.vlan", raw.vlan)?)
        .with_vlan_untagged(optional_vlan("interfaces.vlan_untagged", raw.vlan_untagged)?)
        .with_vlan_native(optional_vlan("interfaces.vlan_native", raw.vlan_native)?)
        .with_vlan_tagged(
            raw.vlan_tagged
                .into_iter()
                .map(|id| vlan("interfaces.vlan_tagged", id))
                .collect::<Result<Vec<_>, _>>()?,
        );

        for ip in &raw.ips {
            let network = ip
                .parse::<Ipv4Network>()
                .map_err(|_| ConfigError::InvalidValue {
                    field: "interfaces.ips",
                    value: ip.clone(),
                })?;
            iface = iface.with_ip(network);
        }
        if let Some(raw_mac) = &raw.mac {
            iface = iface.with_mac(mac("interfaces.mac", raw_mac)?);
        }
        Ok(iface)
    }
}

fn connect_point(field: &'static str, value: &str) -> Result<ConnectPoint, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn mac(field: &'static str, value: &str) -> Result<MacAddr6, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn vlan(field: &'static str, id: u16) -> Result<VlanId, ConfigError> {
    VlanId::new(id).ok_or(ConfigError::InvalidValue {
        field,
        value: id.to_string(),
    })
}

fn optional_vlan(field: &'static str, id: Option<u16>) -> Result<VlanId, ConfigError> {
    id.map_or(Ok(VlanId::NONE), |id| vlan(field, id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DeviceId;

    const FULL: &str = r#"
[relay]
dhcp_server_ip = "10.0.0.1"
dhcp_server_connect_point = "of:0000000000000001/9"
dhcp_gateway_ip = "10.0.9.1"
arp_enabled = false
log_filter = "dhcp_relay=debug"

[[ports]]
name = "eth1"
connect_point = "of:0000000000000001/1"

[[interfaces]]
name = "clients"
connect_point = "of:0000000000000001/1"
ips = ["10.0.1.1/24"]
mac = "02:00:00:00:ff:01"
vlan_tagged = [10, 20]

[[hosts]]
mac = "aa:bb:00:00:00:01"
ips = ["10.0.9.1"]
location = "of:0000000000000001/9"
"#;

    fn parse(content: &str) -> Result<Config, ConfigError> {
        Config::parse(content, Path::new("test.toml"))
    }

    fn cp(port: u32) -> ConnectPoint {
        ConnectPoint::new(DeviceId::new("of:0000000000000001").unwrap(), port)
    }

    mod load_tests {
        use super::*;

        #[test]
        fn test_full_config() {
            let config = parse(FULL).unwrap();

            assert_eq!(
                config.server,
                Some(DhcpServerConfig {
                    server_ip: Ipv4Addr::new(10, 0, 0, 1),
                    server_connect_point: cp(9),
                    gateway_ip: Some(Ipv4Addr::new(10, 0, 9, 1)),
                })
            );
            assert!(!config.arp_enabled);
            assert_eq!(config.log_filter, "dhcp_relay=debug");
            assert_eq!(
                config.ports,
                vec![PortBinding {
                    name: "eth1".to_string(),
                    connect_point: cp(1),
                }]
            );

            let iface = &config.interfaces[0];
            assert_eq!(iface.name, "clients");
            assert_eq!(iface.ipv4_address(), Some(Ipv4Addr::new(10, 0, 1, 1)));
            assert_eq!(iface.mac, Some(MacAddr6::new(0x02, 0, 0, 0, 0xff, 0x01)));
            assert_eq!(iface.vlan_tagged.len(), 2);
            assert!(iface.vlan_untagged.is_none());

            let host = &config.hosts[0];
            assert_eq!(host.vlan, VlanId::NONE);
            assert_eq!(host.id(), HostId::new(host.mac, VlanId::NONE));
            assert_eq!(host.description().ips, vec![Ipv4Addr::new(10, 0, 9, 1)]);
            assert_eq!(host.description().location.connect_point, cp(9));
        }

        #[test]
        fn test_empty_config_uses_defaults() {
            let config = parse("").unwrap();
            assert!(config.server.is_none());
            assert!(config.arp_enabled);
            assert_eq!(config.log_filter, "info");
            assert!(config.ports.is_empty());
            assert!(config.interfaces.is_empty());
        }

        #[test]
        fn test_missing_file() {
            let err = Config::load(Path::new("/nonexistent/dhcp-relay.toml")).unwrap_err();
            assert!(matches!(err, ConfigError::Io { .. }));
        }
    }

    mod validation_tests {
        use super::*;

        #[test]
        fn test_server_ip_without_connect_point() {
            let err = parse("[relay]\ndhcp_server_ip = \"10.0.0.1\"\n").unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue {
                    field: "relay.dhcp_server_connect_point",
                    ..
                }
            ));
        }

        #[test]
        fn test_gateway_without_server() {
            assert!(parse("[relay]\ndhcp_gateway_ip = \"10.0.9.1\"\n").is_err());
        }

        #[test]
        fn test_bad_connect_point() {
            let err = parse("[[ports]]\nname = \"eth0\"\nconnect_point = \"of:1\"\n").unwrap_err();
            assert!(matches!(
                err,
                ConfigError::InvalidValue {
                    field: "ports.connect_point",
                    ..
                }
            ));
        }

        #[test]
        fn test_vlan_out_of_range() {
            let content = "[[interfaces]]\nname = \"x\"\nconnect_point = \"of:1/1\"\nvlan = 4095\n";
            assert!(matches!(
                parse(content).unwrap_err(),
                ConfigError::InvalidValue {
                    field: "interfaces.vlan",
                    ..
                }
            ));
        }

        #[test]
        fn test_bad_address_and_unknown_key() {
            assert!(matches!(
                parse("[relay]\ndhcp_server_ip = \"10.0.0\"\n").unwrap_err(),
                ConfigError::Parse { .. }
            ));
            assert!(matches!(
                parse("[relay]\nserver = 1\n").unwrap_err(),
                ConfigError::Parse { .. }
            ));
        }
    }

    mod override_tests {
        use super::*;

        #[test]
        fn test_arp_override() {
            let mut config = parse("").unwrap();
            config.apply_arp_override(Some("off".to_string())).unwrap();
            assert!(!config.arp_enabled);
            config.apply_arp_override(Some("1".to_string())).unwrap();
            assert!(config.arp_enabled);
            config.apply_arp_override(None).unwrap();
            assert!(config.arp_enabled);
        }

        #[test]
        fn test_invalid_arp_override() {
            let mut config = parse("").unwrap();
            let err = config.apply_arp_override(Some("maybe".to_string())).unwrap_err();
            assert!(err.to_string().contains("DHCP_RELAY_ARP_ENABLED"));
        }

        #[test]
        fn test_explicit_path_wins() {
            assert_eq!(
                Config::resolve_path(Some(PathBuf::from("/tmp/relay.toml"))),
                PathBuf::from("/tmp/relay.toml")
            );
        }
    }
}
