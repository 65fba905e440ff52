// SPDX-License-Identifier: Apache-2.0

//! Port discovery, admission, reconciliation, and retirement (§4.3 "Port
//! manager"). Discovery walks the kernel's interface list via
//! `getifaddrs`; everything else operates purely on the in-memory table the
//! manager owns, so it is exercised with a synthetic discovery source in
//! tests rather than the live kernel.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::name::InterfaceName;
use crate::port::{AdminState, IfIndex, LinkState};

/// One line of a discovery snapshot: what the kernel currently reports for
/// a single interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredInterface {
    pub ifindex: IfIndex,
    pub name: InterfaceName,
    pub link_up: bool,
}

/// A source of discovery snapshots. The live implementation walks
/// `getifaddrs()`; tests supply a fixed `Vec`.
pub trait DiscoverySource {
    fn discover(&self) -> std::io::Result<Vec<DiscoveredInterface>>;
}

/// Enumerates real kernel interfaces via `getifaddrs`, excluding loopback.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelDiscovery;

impl DiscoverySource for KernelDiscovery {
    fn discover(&self) -> std::io::Result<Vec<DiscoveredInterface>> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for ifa in nix::ifaddrs::getifaddrs().map_err(std::io::Error::from)? {
            if !seen.insert(ifa.interface_name.clone()) {
                continue;
            }
            if ifa.flags.contains(nix::net::if_::InterfaceFlags::IFF_LOOPBACK) {
                continue;
            }
            let ifindex = match nix::net::if_::if_nametoindex(ifa.interface_name.as_str()) {
                Ok(idx) => match IfIndex::try_new(idx) {
                    Ok(idx) => idx,
                    Err(_) => continue,
                },
                Err(_) => continue,
            };
            let Ok(name) = InterfaceName::try_from(ifa.interface_name.as_str()) else {
                continue;
            };
            out.push(DiscoveredInterface {
                ifindex,
                name,
                link_up: ifa.flags.contains(nix::net::if_::InterfaceFlags::IFF_UP),
            });
        }
        Ok(out)
    }
}

/// A port the manager currently administers.
#[derive(Debug, Clone)]
pub struct AdmittedPort {
    pub port_num: u32,
    pub ifindex: IfIndex,
    pub name: InterfaceName,
    pub admin_state: AdminState,
    pub link_state: LinkState,
}

/// The outcome of one reconciliation pass: what the caller must actually do
/// to the live port table and kernel state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub retired: Vec<u32>,
    pub admitted: Vec<IfIndex>,
    pub link_changed: Vec<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum PortManagerError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] std::io::Error),
    #[error("port numbers exhausted")]
    PortNumbersExhausted,
}

/// Owns the admitted-port table and runs the four-step reconcile algorithm
/// (§4.3): delete pipeline ports no longer present in the system, create
/// system interfaces not yet in the pipeline, refresh link/admin state for
/// survivors, and assign dense port numbers to newcomers.
#[derive(Debug, Default)]
pub struct PortManager {
    by_ifindex: HashMap<IfIndex, AdmittedPort>,
    next_port_num: u32,
}

impl PortManager {
    #[must_use]
    pub fn new() -> Self {
        PortManager {
            by_ifindex: HashMap::new(),
            next_port_num: 1,
        }
    }

    #[must_use]
    pub fn ports(&self) -> impl Iterator<Item = &AdmittedPort> {
        self.by_ifindex.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_ifindex.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_ifindex.is_empty()
    }

    fn allocate_port_num(&mut self) -> Result<u32, PortManagerError> {
        let num = self.next_port_num;
        self.next_port_num = self.next_port_num.checked_add(1).ok_or(PortManagerError::PortNumbersExhausted)?;
        Ok(num)
    }

    /// Run one reconciliation pass against `source`'s current snapshot.
    pub fn reconcile(&mut self, source: &impl DiscoverySource) -> Result<ReconcileReport, PortManagerError> {
        let discovered = source.discover()?;
        let discovered_by_ifindex: HashMap<IfIndex, &DiscoveredInterface> =
            discovered.iter().map(|d| (d.ifindex, d)).collect();

        let mut report = ReconcileReport::default();

        let stale: Vec<IfIndex> = self
            .by_ifindex
            .keys()
            .copied()
            .filter(|ifindex| !discovered_by_ifindex.contains_key(ifindex))
            .collect();
        for ifindex in stale {
            if let Some(port) = self.by_ifindex.remove(&ifindex) {
                info!(port_num = port.port_num, name = %port.name, "retiring port no longer present");
                report.retired.push(port.port_num);
            }
        }

        for candidate in &discovered {
            if self.by_ifindex.contains_key(&candidate.ifindex) {
                continue;
            }
            let port_num = self.allocate_port_num()?;
            debug!(port_num, name = %candidate.name, "admitting new port");
            self.by_ifindex.insert(
                candidate.ifindex,
                AdmittedPort {
                    port_num,
                    ifindex: candidate.ifindex,
                    name: candidate.name.clone(),
                    admin_state: AdminState::Down,
                    link_state: if candidate.link_up {
                        LinkState::Detected
                    } else {
                        LinkState::NotDetected
                    },
                },
            );
            report.admitted.push(candidate.ifindex);
        }

        for port in self.by_ifindex.values_mut() {
            let Some(current) = discovered_by_ifindex.get(&port.ifindex) else {
                continue;
            };
            let new_link_state = if current.link_up {
                LinkState::Detected
            } else {
                LinkState::NotDetected
            };
            if new_link_state != port.link_state {
                warn!(port_num = port.port_num, ?new_link_state, "link state changed");
                port.link_state = new_link_state;
                report.link_changed.push(port.port_num);
            }
        }

        Ok(report)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct Fixed(Vec<DiscoveredInterface>);

    impl DiscoverySource for Fixed {
        fn discover(&self) -> std::io::Result<Vec<DiscoveredInterface>> {
            Ok(self.0.clone())
        }
    }

    fn iface(idx: u32, name: &str, up: bool) -> DiscoveredInterface {
        DiscoveredInterface {
            ifindex: IfIndex::try_new(idx).unwrap(),
            name: InterfaceName::try_from(name).unwrap(),
            link_up: up,
        }
    }

    #[test]
    fn reconcile_admits_new_interfaces() {
        let mut manager = PortManager::new();
        let report = manager.reconcile(&Fixed(vec![iface(1, "eth0", true)])).unwrap();
        assert_eq!(report.admitted.len(), 1);
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn reconcile_retires_vanished_interfaces() {
        let mut manager = PortManager::new();
        manager.reconcile(&Fixed(vec![iface(1, "eth0", true)])).unwrap();
        let report = manager.reconcile(&Fixed(vec![])).unwrap();
        assert_eq!(report.retired, vec![1]);
        assert!(manager.is_empty());
    }

    #[test]
    fn reconcile_detects_link_state_change() {
        let mut manager = PortManager::new();
        manager.reconcile(&Fixed(vec![iface(1, "eth0", false)])).unwrap();
        let report = manager.reconcile(&Fixed(vec![iface(1, "eth0", true)])).unwrap();
        assert_eq!(report.link_changed, vec![1]);
    }

    #[test]
    fn reconcile_is_idempotent_on_unchanged_snapshot() {
        let mut manager = PortManager::new();
        manager.reconcile(&Fixed(vec![iface(1, "eth0", true)])).unwrap();
        let report = manager.reconcile(&Fixed(vec![iface(1, "eth0", true)])).unwrap();
        assert!(report.retired.is_empty());
        assert!(report.admitted.is_empty());
        assert!(report.link_changed.is_empty());
    }

    #[test]
    fn port_numbers_stay_dense_across_churn() {
        let mut manager = PortManager::new();
        manager
            .reconcile(&Fixed(vec![iface(1, "eth0", true), iface(2, "eth1", true)]))
            .unwrap();
        manager.reconcile(&Fixed(vec![iface(2, "eth1", true)])).unwrap();
        let report = manager.reconcile(&Fixed(vec![iface(2, "eth1", true), iface(3, "eth2", true)])).unwrap();
        assert_eq!(report.admitted, vec![IfIndex::try_new(3).unwrap()]);
    }
}
