// SPDX-License-Identifier: Apache-2.0

//! The action executor (§4.6): runs the ordered `Action` list a pipeline
//! traversal terminated with against one packet — header push/pop,
//! set-field, set-queue, TTL manipulation, group resolution, and the
//! `OUTPUT` fan-out/back-pressure semantics.

use xdpd_flow_entry::{Action, GroupId, GroupTable};
use xdpd_interface_manager::port::{meta_port, PortConfigFlags};
use xdpd_net::buffer::{BufferPool, PacketBufferMut};
use xdpd_net::checksum::{self, Ipv4PseudoHeader, L4ChecksumInput};
use xdpd_net::classifier::ChecksumLayer;
use xdpd_net::ip::Ip;
use xdpd_net::packet::Packet;

use crate::buffer_store::BufferStore;
use crate::header_edit;
use crate::ports::PortRegistry;

/// Why the executor stopped driving a packet further.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    Transmitted,
    Dropped,
    /// Selected the `CONTROLLER` meta-port: the packet has been stored and
    /// the returned `buffer_id` is what a `PACKET_IN` upcall would carry.
    ToController { buffer_id: u32 },
}

/// Execute `actions` against `packet`, received on `in_port`. `select_hash`
/// is the caller-supplied hash for `SELECT`-type groups (a hash of the
/// 5-tuple is the conventional choice, computed once per packet by the
/// worker loop so every group resolution along one traversal agrees).
#[allow(clippy::too_many_arguments)]
pub fn execute<Buf, P>(
    mut packet: Packet<Buf>,
    in_port: u32,
    actions: &[Action],
    registry: &PortRegistry<Buf, P>,
    groups: &GroupTable,
    pool: &P,
    select_hash: u32,
    buffer_store: &BufferStore<Buf>,
) -> ExecuteOutcome
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    for action in actions {
        match action {
            Action::Drop => return ExecuteOutcome::Dropped,
            Action::Output { port, .. } => {
                return output_to_port(packet, in_port, *port, registry, pool, buffer_store);
            }
            Action::Group(id) => {
                return execute_group(packet, in_port, GroupId(*id), registry, groups, pool, select_hash, buffer_store);
            }
            Action::SetQueue(queue) => packet.set_output_queue(*queue),
            Action::PushVlan { ethertype } => {
                let tpid = xdpd_net::vlan::Tpid::from_ethertype(*ethertype).unwrap_or(xdpd_net::vlan::Tpid::CTag);
                let tag = xdpd_net::vlan::Vlan {
                    tpid,
                    pcp: 0,
                    dei: false,
                    vid: 0,
                };
                if header_edit::push_vlan(&mut packet, tag).is_err() {
                    tracing::warn!(in_port, "PUSH_VLAN failed, dropping packet");
                    return ExecuteOutcome::Dropped;
                }
            }
            Action::PopVlan => {
                if header_edit::pop_vlan(&mut packet).is_err() {
                    tracing::warn!(in_port, "POP_VLAN on a packet with no tag, dropping");
                    return ExecuteOutcome::Dropped;
                }
            }
            Action::SetVlanVid(vid) => {
                let vid = *vid;
                if header_edit::set_vlan_field(&mut packet, |v| v.vid = vid & 0x0FFF).is_err() {
                    tracing::warn!(in_port, "SET_VLAN_VID on a packet with no tag, dropping");
                    return ExecuteOutcome::Dropped;
                }
            }
            Action::SetVlanPcp(pcp) => {
                let pcp = *pcp;
                if header_edit::set_vlan_field(&mut packet, |v| v.pcp = pcp & 0x7).is_err() {
                    tracing::warn!(in_port, "SET_VLAN_PCP on a packet with no tag, dropping");
                    return ExecuteOutcome::Dropped;
                }
            }
            Action::SetEthSrc(mac) => header_edit::set_eth_field(&mut packet, |e| e.set_source(*mac)),
            Action::SetEthDst(mac) => header_edit::set_eth_field(&mut packet, |e| e.set_destination(*mac)),
            Action::SetIpv4Src(addr) => {
                if set_ipv4_field(&mut packet, |v4| v4.set_source(*addr)) {
                    let layer = ChecksumLayer::IPV4_HEADER | transport_layer(&packet);
                    packet.headers_mut().state.mark_dirty(layer);
                }
            }
            Action::SetIpv4Dst(addr) => {
                if set_ipv4_field(&mut packet, |v4| v4.set_destination(*addr)) {
                    let layer = ChecksumLayer::IPV4_HEADER | transport_layer(&packet);
                    packet.headers_mut().state.mark_dirty(layer);
                }
            }
            Action::SetIpDscp(dscp) => {
                if let Some(layer) = header_edit::set_ip_dscp(&mut packet, *dscp) {
                    packet.headers_mut().state.mark_dirty(layer);
                }
            }
            Action::SetTcpSrc(port) => {
                let port = *port;
                if let Some(tcp) = packet.headers_mut().tcp.as_mut() {
                    tcp.set_source_port(port);
                    packet.headers_mut().state.mark_dirty(ChecksumLayer::TCP);
                }
            }
            Action::SetTcpDst(port) => {
                let port = *port;
                if let Some(tcp) = packet.headers_mut().tcp.as_mut() {
                    tcp.set_destination_port(port);
                    packet.headers_mut().state.mark_dirty(ChecksumLayer::TCP);
                }
            }
            Action::SetUdpSrc(port) => {
                let port = *port;
                if let Some(udp) = packet.headers_mut().udp.as_mut() {
                    udp.set_source_port(port);
                    packet.headers_mut().state.mark_dirty(ChecksumLayer::UDP);
                }
            }
            Action::SetUdpDst(port) => {
                let port = *port;
                if let Some(udp) = packet.headers_mut().udp.as_mut() {
                    udp.set_destination_port(port);
                    packet.headers_mut().state.mark_dirty(ChecksumLayer::UDP);
                }
            }
            Action::SetSctpSrc(port) => {
                let port = *port;
                if let Some(sctp) = packet.headers_mut().sctp.as_mut() {
                    sctp.set_source_port(port);
                    packet.headers_mut().state.mark_dirty(ChecksumLayer::SCTP);
                }
            }
            Action::SetSctpDst(port) => {
                let port = *port;
                if let Some(sctp) = packet.headers_mut().sctp.as_mut() {
                    sctp.set_destination_port(port);
                    packet.headers_mut().state.mark_dirty(ChecksumLayer::SCTP);
                }
            }
            Action::SetNwTtl(ttl) => set_ttl(&mut packet, *ttl),
            Action::DecNwTtl => {
                let current = current_ttl(&packet);
                if current == 0 {
                    return ExecuteOutcome::Dropped;
                }
                set_ttl(&mut packet, current - 1);
            }
            Action::CopyTtlOut | Action::CopyTtlIn => {
                // No outer encapsulation (MPLS/PBB) is modeled, so there is
                // no second TTL to copy to/from.
            }
            Action::SetMplsTtl(ttl) => {
                if header_edit::set_mpls_ttl(&mut packet, *ttl).is_err() {
                    tracing::warn!(in_port, "SET_MPLS_TTL on a packet with no label, dropping");
                    return ExecuteOutcome::Dropped;
                }
            }
            Action::DecMplsTtl => {
                let Some(label) = packet.headers().mpls else {
                    tracing::warn!(in_port, "DEC_MPLS_TTL on a packet with no label, dropping");
                    return ExecuteOutcome::Dropped;
                };
                if label.ttl == 0 {
                    return ExecuteOutcome::Dropped;
                }
                if header_edit::set_mpls_ttl(&mut packet, label.ttl - 1).is_err() {
                    tracing::warn!(in_port, "DEC_MPLS_TTL failed to rewrite the label, dropping");
                    return ExecuteOutcome::Dropped;
                }
            }
        }
    }

    tracing::debug!(in_port, "action list had no terminal OUTPUT/GROUP/DROP action");
    ExecuteOutcome::Dropped
}

fn transport_layer<Buf: PacketBufferMut>(packet: &Packet<Buf>) -> ChecksumLayer {
    if packet.headers().tcp.is_some() {
        ChecksumLayer::TCP
    } else if packet.headers().udp.is_some() {
        ChecksumLayer::UDP
    } else {
        ChecksumLayer::empty()
    }
}

fn set_ipv4_field<Buf: PacketBufferMut>(packet: &mut Packet<Buf>, edit: impl FnOnce(&mut xdpd_net::ip::Ipv4)) -> bool {
    let Some(Ip::V4(mut v4)) = packet.headers().ip else {
        return false;
    };
    edit(&mut v4);
    let mut out = [0u8; 20];
    if v4.write(&mut out).is_err() {
        return false;
    }
    let Some(l3) = packet.headers().state.l3_offset else {
        return false;
    };
    packet.buffer_mut().as_mut()[l3..l3 + out.len()].copy_from_slice(&out);
    packet.headers_mut().ip = Some(Ip::V4(v4));
    true
}

fn current_ttl<Buf: PacketBufferMut>(packet: &Packet<Buf>) -> u8 {
    match packet.headers().ip {
        Some(Ip::V4(v4)) => v4.ttl(),
        Some(Ip::V6(v6)) => v6.hop_limit(),
        None => 0,
    }
}

fn set_ttl<Buf: PacketBufferMut>(packet: &mut Packet<Buf>, ttl: u8) {
    match packet.headers().ip {
        Some(Ip::V4(_)) => {
            set_ipv4_field(packet, |v4| v4.set_ttl(ttl));
            packet.headers_mut().state.mark_dirty(ChecksumLayer::IPV4_HEADER);
        }
        Some(Ip::V6(mut v6)) => {
            v6.set_hop_limit(ttl);
            packet.headers_mut().ip = Some(Ip::V6(v6));
            if let Some(l3) = packet.headers().state.l3_offset {
                packet.buffer_mut().as_mut()[l3 + 7] = ttl;
            }
        }
        None => {}
    }
}

/// Recompute any checksum the action list marked dirty, assuming no IPv4
/// options and no TCP options — the common case for a software datapath
/// that never originates either.
fn recompute_checksums<Buf: PacketBufferMut>(packet: &mut Packet<Buf>) {
    const IPV4_HEADER_LEN: usize = 20;
    const TCP_HEADER_LEN: usize = 20;
    const UDP_HEADER_LEN: usize = 8;

    if packet.headers().state.dirty_checksums.is_empty() {
        return;
    }

    // SCTP's checksum covers only the segment itself, no IP pseudo-header,
    // so it is fixed up independently of the IPv4-specific path below.
    if packet.headers().state.dirty_checksums.contains(ChecksumLayer::SCTP) {
        if let Some(l4) = packet.headers().state.l4_offset {
            let body = packet.buffer_mut().as_mut();
            if l4 <= body.len() {
                checksum::recompute_sctp(&mut body[l4..]);
            }
        }
        packet.headers_mut().state.dirty_checksums.remove(ChecksumLayer::SCTP);
    }

    let dirty = packet.headers().state.dirty_checksums;
    if dirty.is_empty() {
        return;
    }
    let Some(l3) = packet.headers().state.l3_offset else {
        return;
    };
    let Some(ip) = packet.headers().ip else {
        return;
    };
    let Ip::V4(v4) = ip else {
        packet.headers_mut().state.dirty_checksums = ChecksumLayer::empty();
        return;
    };
    let source = v4.source();
    let destination = v4.destination();
    let protocol = ip.protocol();
    let l4_offset = packet.headers().state.l4_offset;

    let body = packet.buffer_mut().as_mut();
    if body.len() < l3 + IPV4_HEADER_LEN {
        return;
    }
    let (head, rest) = body.split_at_mut(l3 + IPV4_HEADER_LEN);
    let ipv4_header = &mut head[l3..];

    let l4_input = l4_offset.and_then(|offset| {
        let l4_header_len = if dirty.contains(ChecksumLayer::TCP) { TCP_HEADER_LEN } else { UDP_HEADER_LEN };
        let rel = offset.checked_sub(l3 + IPV4_HEADER_LEN)?;
        if rest.len() < rel + l4_header_len {
            return None;
        }
        let (l4_header, payload) = rest[rel..].split_at_mut(l4_header_len);
        Some(L4ChecksumInput {
            l4_header,
            payload,
            pseudo: Ipv4PseudoHeader {
                source,
                destination,
                protocol,
                segment_len: (l4_header.len() + payload.len()) as u16,
            },
            checksum_offset: 16,
        })
    });

    checksum::recompute(dirty, Some(ipv4_header), l4_input);
    packet.headers_mut().state.dirty_checksums = ChecksumLayer::empty();
}

#[allow(clippy::too_many_arguments)]
fn execute_group<Buf, P>(
    packet: Packet<Buf>,
    in_port: u32,
    group_id: GroupId,
    registry: &PortRegistry<Buf, P>,
    groups: &GroupTable,
    pool: &P,
    select_hash: u32,
    buffer_store: &BufferStore<Buf>,
) -> ExecuteOutcome
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    let Some(entry) = groups.get(group_id) else {
        tracing::warn!(in_port, group_id = group_id.0, "GROUP action referenced an unknown group");
        return ExecuteOutcome::Dropped;
    };
    let port_is_live = |port_num: u32| registry.with_entry(port_num, |e| e.switch_port.may_emit()).unwrap_or(false);
    let buckets = entry.buckets_to_execute(select_hash, port_is_live);
    let Some((last, heads)) = buckets.split_last() else {
        return ExecuteOutcome::Dropped;
    };

    let bytes = packet.len() as u64;
    // Every bucket but the last is soft-replicated into a fresh buffer; the
    // last consumes the original descriptor (§4.6 "the original is
    // destroyed after fan-out").
    for (index, bucket) in heads {
        groups.record_bucket_hit(group_id, *index, bytes);
        match pool.new_buffer(packet.buffer().as_ref()) {
            Ok(buf) => {
                let replica = packet.make_replica(buf);
                execute(replica, in_port, &bucket.actions, registry, groups, pool, select_hash, buffer_store);
            }
            Err(_) => tracing::warn!(in_port, "no buffer available to replicate a group bucket"),
        }
    }
    let (last_index, last_bucket) = *last;
    groups.record_bucket_hit(group_id, last_index, bytes);
    execute(packet, in_port, &last_bucket.actions, registry, groups, pool, select_hash, buffer_store)
}

fn output_to_port<Buf, P>(
    packet: Packet<Buf>,
    in_port: u32,
    target: u32,
    registry: &PortRegistry<Buf, P>,
    pool: &P,
    buffer_store: &BufferStore<Buf>,
) -> ExecuteOutcome
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    match target {
        meta_port::CONTROLLER => {
            let buffer_id = buffer_store.store(packet, in_port);
            ExecuteOutcome::ToController { buffer_id }
        }
        meta_port::IN_PORT => send_to_one_port(packet, in_port, registry),
        meta_port::FLOOD | meta_port::ALL => flood(packet, in_port, registry, pool),
        port_num => send_to_one_port(packet, port_num, registry),
    }
}

/// `FLOOD`/`ALL`: soft-replicate to every other admitted port that has not
/// opted out via `NO_FLOOD`, excluding `in_port`.
fn flood<Buf, P>(packet: Packet<Buf>, in_port: u32, registry: &PortRegistry<Buf, P>, pool: &P) -> ExecuteOutcome
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    let mut targets = registry.port_nums();
    targets.retain(|p| *p != in_port);
    targets.retain(|p| {
        registry
            .with_entry(*p, |e| !e.switch_port.config.contains(PortConfigFlags::NO_FLOOD))
            .unwrap_or(false)
    });

    let Some((&last, heads)) = targets.split_last() else {
        return ExecuteOutcome::Dropped;
    };
    for &port_num in heads {
        match pool.new_buffer(packet.buffer().as_ref()) {
            Ok(buf) => {
                let replica = packet.make_replica(buf);
                send_to_one_port(replica, port_num, registry);
            }
            Err(_) => tracing::warn!(in_port, port_num, "no buffer available to replicate a flood target"),
        }
    }
    send_to_one_port(packet, last, registry)
}

/// Deliver one packet to one concrete port: virtual links reinject by
/// dropping the frame into the peer's own RX inbox (so the peer's owning
/// core dispatches it exactly as if it had arrived on the wire); everything
/// else gets a checksum fixup and an enqueue onto its selected TX queue,
/// with overrun counted as `tx_dropped` (§4.6 "enqueue back-pressure").
fn send_to_one_port<Buf, P>(mut packet: Packet<Buf>, target: u32, registry: &PortRegistry<Buf, P>) -> ExecuteOutcome
where
    Buf: PacketBufferMut,
    P: BufferPool<Buf>,
{
    recompute_checksums(&mut packet);
    let queue_idx = packet.output_queue().unwrap_or(0) as usize;

    let delivered = registry.with_entry(target, move |entry| {
        if !entry.switch_port.may_emit() {
            return false;
        }
        if entry.driver.virtual_peer().is_some() {
            return entry.driver.deliver_from_peer(packet).is_ok();
        }
        let n = entry.switch_port.queues.len();
        if n == 0 {
            return false;
        }
        let idx = queue_idx.min(n - 1);
        match entry.switch_port.queues[idx].enqueue(packet) {
            Ok(()) => true,
            Err(_returned) => {
                entry.switch_port.tx_dropped += 1;
                false
            }
        }
    });

    match delivered {
        Some(true) => ExecuteOutcome::Transmitted,
        _ => ExecuteOutcome::Dropped,
    }
}
