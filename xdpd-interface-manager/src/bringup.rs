// SPDX-License-Identifier: Apache-2.0

//! Port bring-up/bring-down side effects (§4.2): promiscuous mode, MTU
//! discovery, and disabling the kernel offloads that would otherwise let
//! the NIC driver coalesce or rewrite frames before this switch's pipeline
//! ever sees them.

use std::io;
use std::os::fd::RawFd;

const SIOCGIFFLAGS: libc::c_ulong = 0x8913;
const SIOCSIFFLAGS: libc::c_ulong = 0x8914;
const SIOCGIFMTU: libc::c_ulong = 0x8921;

const IFF_UP: libc::c_short = 0x1;
const IFF_PROMISC: libc::c_short = 0x100;

const ETHTOOL_SGFEATURES: u32 = 0x0000003b;
const ETHTOOL_GFEATURES: u32 = 0x0000003a;
const SIOCETHTOOL: libc::c_ulong = 0x8946;

#[repr(C)]
struct IfreqFlags {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_flags: libc::c_short,
}

#[repr(C)]
struct IfreqMtu {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_mtu: libc::c_int,
}

fn ifname_bytes(name: &str) -> io::Result<[libc::c_char; libc::IFNAMSIZ]> {
    if name.len() >= libc::IFNAMSIZ {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "interface name too long"));
    }
    let mut buf = [0 as libc::c_char; libc::IFNAMSIZ];
    for (dst, src) in buf.iter_mut().zip(name.as_bytes()) {
        *dst = *src as libc::c_char;
    }
    Ok(buf)
}

fn ioctl_socket() -> io::Result<RawFd> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(fd)
}

fn get_flags(fd: RawFd, ifreq: &mut IfreqFlags) -> io::Result<()> {
    let rc = unsafe { libc::ioctl(fd, SIOCGIFFLAGS, ifreq as *mut IfreqFlags) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn set_flags(fd: RawFd, ifreq: &IfreqFlags) -> io::Result<()> {
    let rc = unsafe { libc::ioctl(fd, SIOCSIFFLAGS, ifreq as *const IfreqFlags) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Bring `name` up: set `IFF_UP|IFF_PROMISC`. If `IFF_UP` is already set
/// (something else brought the link up first), this is a no-op on that bit
/// — the caller still proceeds to allocate ring buffers regardless.
pub fn bring_up(name: &str) -> io::Result<()> {
    let fd = ioctl_socket()?;
    let result = (|| {
        let mut ifreq = IfreqFlags {
            ifr_name: ifname_bytes(name)?,
            ifr_flags: 0,
        };
        get_flags(fd, &mut ifreq)?;
        ifreq.ifr_flags |= IFF_UP | IFF_PROMISC;
        set_flags(fd, &ifreq)
    })();
    unsafe { libc::close(fd) };
    result
}

/// Bring `name` down: clear `IFF_UP` only, per the bring-down ordering in
/// §4.2 (toggle the port's `up` flag, take the write lock, clear `IFF_UP`,
/// release the lock) — promiscuous mode is left set since re-enabling it on
/// the next `bring_up` is cheaper than tracking whether some other process
/// also wants it.
pub fn bring_down(name: &str) -> io::Result<()> {
    let fd = ioctl_socket()?;
    let result = (|| {
        let mut ifreq = IfreqFlags {
            ifr_name: ifname_bytes(name)?,
            ifr_flags: 0,
        };
        get_flags(fd, &mut ifreq)?;
        ifreq.ifr_flags &= !IFF_UP;
        set_flags(fd, &ifreq)
    })();
    unsafe { libc::close(fd) };
    result
}

/// Read the interface MTU via `SIOCGIFMTU`.
pub fn read_mtu(name: &str) -> io::Result<u16> {
    let fd = ioctl_socket()?;
    let mut ifreq = IfreqMtu {
        ifr_name: ifname_bytes(name)?,
        ifr_mtu: 0,
    };
    let rc = unsafe { libc::ioctl(fd, SIOCGIFMTU, &mut ifreq as *mut IfreqMtu) };
    unsafe { libc::close(fd) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ifreq.ifr_mtu as u16)
}

/// Ethtool feature block bits this module cares about, per the kernel's
/// `ethtool-copy.h` `NETIF_F_*` bit positions as exposed through
/// `ETHTOOL_{G,S}FEATURES`.
mod feature_bits {
    pub const TX_CHECKSUM_IP_GENERIC: u32 = 1 << 17;
    pub const GRO: u32 = 1 << 19;
    pub const LRO: u32 = 1 << 15;
}

#[repr(C)]
struct EthtoolGfeaturesBlock {
    available: u32,
    requested: u32,
    active: u32,
    never_changed: u32,
}

#[repr(C)]
struct EthtoolGfeatures {
    cmd: u32,
    size: u32,
    features: [EthtoolGfeaturesBlock; 1],
}

#[repr(C)]
struct EthtoolSfeaturesBlock {
    valid: u32,
    requested: u32,
}

#[repr(C)]
struct EthtoolSfeatures {
    cmd: u32,
    size: u32,
    features: [EthtoolSfeaturesBlock; 1],
}

#[repr(C)]
struct IfreqData {
    ifr_name: [libc::c_char; libc::IFNAMSIZ],
    ifr_data: *mut libc::c_void,
}

/// Disable GRO, LRO, and generic TX checksum offload on `name` (§4.2: a
/// software datapath must see frames exactly as received, and must not
/// hand the kernel a frame with an unfinished checksum it expects hardware
/// to complete). Missing ethtool support (common for veth peers, which
/// don't implement `{G,S}FEATURES` for every bit) is tolerated: a `ENOTTY`
/// or `EOPNOTSUPP` from the kernel is not an error here, it means there is
/// nothing to disable.
pub fn disable_offloads(name: &str) -> io::Result<()> {
    let fd = ioctl_socket()?;
    let result = disable_offloads_inner(fd, name);
    unsafe { libc::close(fd) };
    match result {
        Err(e)
            if e.raw_os_error() == Some(libc::ENOTTY) || e.raw_os_error() == Some(libc::EOPNOTSUPP) =>
        {
            Ok(())
        }
        other => other,
    }
}

fn disable_offloads_inner(fd: RawFd, name: &str) -> io::Result<()> {
    let mut get = EthtoolGfeatures {
        cmd: ETHTOOL_GFEATURES,
        size: 1,
        features: [EthtoolGfeaturesBlock {
            available: 0,
            requested: 0,
            active: 0,
            never_changed: 0,
        }],
    };
    let mut ifr = IfreqData {
        ifr_name: ifname_bytes(name)?,
        ifr_data: std::ptr::addr_of_mut!(get).cast(),
    };
    let rc = unsafe { libc::ioctl(fd, SIOCETHTOOL, &mut ifr as *mut IfreqData) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    let clear = feature_bits::GRO | feature_bits::LRO | feature_bits::TX_CHECKSUM_IP_GENERIC;
    let mut set = EthtoolSfeatures {
        cmd: ETHTOOL_SGFEATURES,
        size: 1,
        features: [EthtoolSfeaturesBlock {
            valid: clear,
            requested: 0,
        }],
    };
    let mut ifr = IfreqData {
        ifr_name: ifname_bytes(name)?,
        ifr_data: std::ptr::addr_of_mut!(set).cast(),
    };
    let rc = unsafe { libc::ioctl(fd, SIOCETHTOOL, &mut ifr as *mut IfreqData) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ifname_bytes_rejects_oversized_names() {
        let too_long = "a".repeat(libc::IFNAMSIZ);
        assert!(ifname_bytes(&too_long).is_err());
    }

    #[test]
    fn ifname_bytes_accepts_typical_names() {
        assert!(ifname_bytes("eth0").is_ok());
    }
}
