//! In-memory collaborators.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::Ipv4Addr;
use std::sync::{PoisonError, RwLock, Weak};

use pnet::ipnetwork::Ipv4Network;

use crate::domain::{
    Host, HostDescription, HostEvent, HostEventKind, HostId, Interface, ProviderId, Route,
};
use crate::services::{HostListener, HostService, HostStore, InterfaceService, RouteStore};

/// A fixed set of interfaces, loaded once from configuration.
#[derive(Debug, Default)]
pub struct StaticInterfaceService {
    interfaces: Vec<Interface>,
}

impl StaticInterfaceService {
    pub fn new(interfaces: Vec<Interface>) -> Self {
        Self { interfaces }
    }
}

impl InterfaceService for StaticInterfaceService {
    fn interfaces(&self) -> Vec<Interface> {
        self.interfaces.clone()
    }
}

/// Host facts keyed by identity, with event fan-out to listeners.
#[derive(Default)]
pub struct HostTable {
    hosts: RwLock<HashMap<HostId, Host>>,
    monitored: RwLock<BTreeSet<Ipv4Addr>>,
    listeners: RwLock<Vec<Weak<dyn HostListener>>>,
}

impl HostTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget a host and tell listeners.
    pub fn remove_host(&self, id: &HostId) -> Option<Host> {
        let removed = self
            .hosts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if let Some(host) = &removed {
            self.notify(HostEvent::new(HostEventKind::Removed, host.clone()));
        }
        removed
    }

    pub fn hosts(&self) -> Vec<Host> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// IPs host discovery has been asked to look for.
    pub fn monitored_ips(&self) -> Vec<Ipv4Addr> {
        self.monitored
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .copied()
            .collect()
    }

    fn notify(&self, event: HostEvent) {
        // Snapshot the live listeners so none is called under our lock.
        let live: Vec<_> = {
            let mut listeners = self
                .listeners
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            listeners.retain(|listener| listener.strong_count() > 0);
            listeners.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in live {
            listener.event(&event);
        }
    }
}

impl HostService for HostTable {
    fn host(&self, id: &HostId) -> Option<Host> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    fn hosts_by_ip(&self, ip: Ipv4Addr) -> Vec<Host> {
        self.hosts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|host| host.has_ip(ip))
            .cloned()
            .collect()
    }

    fn start_monitoring_ip(&self, ip: Ipv4Addr) {
        let added = self
            .monitored
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ip);
        if added {
            tracing::debug!("Monitoring {}", ip);
        }
    }

    fn stop_monitoring_ip(&self, ip: Ipv4Addr) {
        let removed = self
            .monitored
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ip);
        if removed {
            tracing::debug!("Stopped monitoring {}", ip);
        }
    }

    fn add_listener(&self, listener: Weak<dyn HostListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }
}

impl HostStore for HostTable {
    fn create_or_update_host(
        &self,
        provider: &ProviderId,
        id: HostId,
        description: HostDescription,
        replace_ips: bool,
    ) {
        let event = {
            let mut hosts = self.hosts.write().unwrap_or_else(PoisonError::into_inner);
            match hosts.get_mut(&id) {
                Some(host) => {
                    let moved = !host
                        .locations
                        .iter()
                        .any(|loc| loc.connect_point == description.location.connect_point);
                    host.locations
                        .retain(|loc| loc.connect_point != description.location.connect_point);
                    host.locations.push(description.location);

                    if replace_ips {
                        host.ips = description.ips;
                    } else {
                        for ip in description.ips {
                            if !host.ips.contains(&ip) {
                                host.ips.push(ip);
                            }
                        }
                    }

                    let kind = if moved {
                        HostEventKind::Moved
                    } else {
                        HostEventKind::Updated
                    };
                    HostEvent::new(kind, host.clone())
                }
                None => {
                    let host = Host {
                        id,
                        locations: vec![description.location],
                        ips: description.ips,
                    };
                    hosts.insert(id, host.clone());
                    HostEvent::new(HostEventKind::Added, host)
                }
            }
        };

        tracing::debug!("Host {} {:?} by {}", id, event.kind, provider);
        self.notify(event);
    }
}

/// Routes keyed by prefix; a newer route for a prefix replaces the older.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<BTreeMap<Ipv4Network, Route>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl RouteStore for RouteTable {
    fn update_route(&self, route: Route) {
        tracing::info!("Route {}", route);
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(route.prefix, route);
    }
}
