// SPDX-License-Identifier: Apache-2.0

//! Switch port lifecycle: discovery, admission, the two port I/O drivers
//! (kernel-shared ring and virtual link), and bring-up/bring-down (§3, §4.2,
//! §4.2a, §4.3).

pub mod bringup;
pub mod kernel_ring;
pub mod manager;
pub mod name;
pub mod port;
pub mod virtual_link;

pub use kernel_ring::KernelRingPort;
pub use manager::{
    AdmittedPort, DiscoveredInterface, DiscoverySource, KernelDiscovery, PortManager, PortManagerError,
    ReconcileReport,
};
pub use name::{IllegalInterfaceName, InterfaceName};
pub use port::{
    meta_port, AdminState, IfIndex, LinkState, NicPort, PortConfigFlags, PortError, PortQueue, SwitchPort,
    ZeroIfIndex, TX_DRAIN_INTERVAL,
};
pub use virtual_link::{ThreadRngBytes, VirtualLinkPort};
