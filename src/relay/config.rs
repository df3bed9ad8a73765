//! Runtime relay target and its atomically swapped snapshot holder.

use std::net::Ipv4Addr;
use std::sync::{Arc, PoisonError, RwLock};

use macaddr::MacAddr6;

use crate::domain::{ConnectPoint, VlanId};

/// Resolved L2 binding of the server, or of the gateway in front of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uplink {
    pub mac: MacAddr6,
    pub vlan: VlanId,
}

/// Where DHCP requests are relayed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayConfig {
    pub server_ip: Option<Ipv4Addr>,
    pub server_connect_point: Option<ConnectPoint>,
    pub gateway_ip: Option<Ipv4Addr>,
    pub uplink: Option<Uplink>,
}

impl RelayConfig {
    /// True once both the server IP and its connect point are known.
    pub fn configured(&self) -> bool {
        self.server_ip.is_some() && self.server_connect_point.is_some()
    }

    /// The address whose host binding gives the uplink: the gateway when one
    /// is configured, otherwise the server itself.
    pub fn probe_ip(&self) -> Option<Ipv4Addr> {
        self.gateway_ip.or(self.server_ip)
    }
}

/// Holds the current [`RelayConfig`] as an immutable snapshot.
///
/// Readers clone the `Arc` and work on a consistent value for the rest of
/// the packet; writers build a new value and swap it in.
#[derive(Debug, Default)]
pub struct SharedRelayConfig {
    current: RwLock<Arc<RelayConfig>>,
}

impl SharedRelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<RelayConfig> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Derive a new snapshot from the current one and publish it. Updates
    /// are serialized, so concurrent updaters never lose each other's edits.
    pub fn update<F>(&self, f: F) -> Arc<RelayConfig>
    where
        F: FnOnce(&mut RelayConfig),
    {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = RelayConfig::clone(&current);
        f(&mut next);
        let next = Arc::new(next);
        *current = Arc::clone(&next);
        next
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    use super::*;
    use crate::domain::DeviceId;

    fn cp() -> ConnectPoint {
        ConnectPoint::new(DeviceId::new("of:s1").unwrap(), 1)
    }

    #[test]
    fn test_configured_needs_ip_and_connect_point() {
        let mut config = RelayConfig::default();
        assert!(!config.configured());
        config.server_ip = Some(Ipv4Addr::new(10, 0, 0, 1));
        assert!(!config.configured());
        config.server_connect_point = Some(cp());
        assert!(config.configured());
    }

    #[test]
    fn test_probe_ip_prefers_gateway() {
        let mut config = RelayConfig {
            server_ip: Some(Ipv4Addr::new(10, 0, 0, 1)),
            ..Default::default()
        };
        assert_eq!(config.probe_ip(), Some(Ipv4Addr::new(10, 0, 0, 1)));
        config.gateway_ip = Some(Ipv4Addr::new(10, 0, 9, 1));
        assert_eq!(config.probe_ip(), Some(Ipv4Addr::new(10, 0, 9, 1)));
    }

    #[test]
    fn test_snapshot_is_stable_across_update() {
        let shared = SharedRelayConfig::new();
        let before = shared.snapshot();
        shared.update(|config| config.server_ip = Some(Ipv4Addr::new(10, 0, 0, 1)));

        assert_eq!(before.server_ip, None);
        assert_eq!(shared.snapshot().server_ip, Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn test_readers_never_see_torn_config() {
        let shared = Arc::new(SharedRelayConfig::new());
        let running = Arc::new(AtomicBool::new(true));

        let targets = [
            (Ipv4Addr::new(10, 0, 0, 1), MacAddr6::new(0xaa, 0, 0, 0, 0, 1)),
            (Ipv4Addr::new(10, 0, 0, 2), MacAddr6::new(0xbb, 0, 0, 0, 0, 2)),
        ];

        let writer = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                for i in 0..2000 {
                    let (ip, mac) = targets[i % 2];
                    shared.update(|config| {
                        config.server_ip = Some(ip);
                        config.server_connect_point = Some(cp());
                        config.uplink = Some(Uplink {
                            mac,
                            vlan: VlanId::NONE,
                        });
                    });
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                let running = Arc::clone(&running);
                thread::spawn(move || {
                    while running.load(Ordering::Relaxed) {
                        let config = shared.snapshot();
                        if let (Some(ip), Some(uplink)) = (config.server_ip, config.uplink) {
                            assert!(targets.contains(&(ip, uplink.mac)));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        running.store(false, Ordering::Relaxed);
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
