//! Packet-to-fingerprint extraction (§4.3): parses a Layer-3 frame, pulls
//! out the canonical address/port key, hashes it, and looks the bucket up
//! in either the Maglev or the modulo table.
//!
//! Every branch that cannot or should not produce a decision returns mark
//! `0` rather than an error — see the Packet parse row of the error
//! taxonomy. Nothing in this module allocates a `Result`.

use crate::hash::djb2;
use crate::shared::SharedData;

/// EtherType of the Layer-3 frame carried in the queued packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum L2Protocol {
    Ipv4,
    Ipv6,
    /// Anything else is parsed no further; `classify` returns mark 0.
    Other(u16),
}

/// `ETH_P_IP`.
pub const ETH_P_IP: u16 = 0x0800;
/// `ETH_P_IPV6`.
pub const ETH_P_IPV6: u16 = 0x86DD;

impl From<u16> for L2Protocol {
    fn from(ethertype: u16) -> Self {
        match ethertype {
            ETH_P_IP => Self::Ipv4,
            ETH_P_IPV6 => Self::Ipv6,
            other => Self::Other(other),
        }
    }
}

const IPPROTO_ICMP: u8 = 1;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_ICMPV6: u8 = 58;
const ICMP_DEST_UNREACH: u8 = 3;

/// Which lookup table `classify` consults, fixed for the lifetime of the
/// data-plane `run` loop (§9: "dispatch on mode... a tagged selection, not
/// a dynamic indirection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    Maglev,
    Modulo,
}

/// Parses `payload` as an `protocol`-tagged Layer-3 frame, extracts the
/// hashing key, and returns the resulting fwmark (already offset by
/// `sh.fw_offset`), or `0` when no decision applies.
pub fn classify(sh: &SharedData, protocol: L2Protocol, payload: &[u8], port_extension: bool, mode: LookupMode) -> u32 {
    let Some(key) = extract_key(protocol, payload, port_extension) else {
        return 0;
    };
    let hash = djb2(&key);
    let backend = match mode {
        LookupMode::Maglev => lookup_maglev(sh, hash),
        LookupMode::Modulo => lookup_modulo(sh, hash),
    };
    match backend {
        Some(i) => (i + sh.fw_offset) as u32,
        None => 0,
    }
}

fn lookup_maglev(sh: &SharedData, hash: u32) -> Option<i32> {
    let c = (hash as usize) % sh.magd.m as usize;
    match sh.magd.lookup[c] {
        i if i >= 0 => Some(i),
        _ => None,
    }
}

fn lookup_modulo(sh: &SharedData, hash: u32) -> Option<i32> {
    if sh.modulo.n_active == 0 {
        return None;
    }
    let k = (hash as usize) % sh.modulo.n_active as usize;
    Some(sh.modulo.lookup[k])
}

/// Extracts the byte key to hash, or `None` when the packet is one of the
/// cases the classifier declines to decide on (IP options, fragmentation,
/// an unhandled L4/L3 protocol, or an ICMP type other than the reserved
/// destination-unreachable hook below).
fn extract_key(protocol: L2Protocol, payload: &[u8], port_extension: bool) -> Option<Vec<u8>> {
    match protocol {
        L2Protocol::Ipv4 => extract_ipv4_key(payload, port_extension),
        L2Protocol::Ipv6 => extract_ipv6_key(payload, port_extension),
        L2Protocol::Other(_) => None,
    }
}

fn extract_ipv4_key(payload: &[u8], port_extension: bool) -> Option<Vec<u8>> {
    if payload.len() < 20 {
        return None;
    }
    let ihl = payload[0] & 0x0f;
    if ihl != 5 {
        return None; // IPv4 options present, not handled.
    }
    let frag_field = u16::from_be_bytes([payload[6], payload[7]]);
    let more_fragments = frag_field & 0x2000 != 0;
    let frag_offset = frag_field & 0x1fff;
    if more_fragments || frag_offset != 0 {
        return None; // Fragmented, not handled.
    }

    match payload[9] {
        IPPROTO_TCP => {
            if port_extension && payload.len() < 24 {
                return None;
            }
            build_key(&payload[12..20], port_extension.then(|| &payload[20..24]))
        }
        IPPROTO_ICMP if payload.len() >= 21 && payload[20] == ICMP_DEST_UNREACH => {
            rehash_icmp_inner(payload)
        }
        _ => None,
    }
}

fn extract_ipv6_key(payload: &[u8], port_extension: bool) -> Option<Vec<u8>> {
    if payload.len() < 40 {
        return None;
    }
    match payload[6] {
        IPPROTO_TCP => {
            if port_extension && payload.len() < 44 {
                return None;
            }
            build_key(&payload[8..40], port_extension.then(|| &payload[40..44]))
        }
        IPPROTO_ICMPV6 if payload.len() >= 41 && payload[40] == ICMP_DEST_UNREACH => {
            rehash_icmp_inner(payload)
        }
        _ => None,
    }
}

fn build_key(addrs: &[u8], ports: Option<&[u8]>) -> Option<Vec<u8>> {
    let mut key = addrs.to_vec();
    if let Some(p) = ports {
        key.extend_from_slice(p);
    }
    Some(key)
}

/// Reserved hook: for an ICMP(v4/v6) destination-unreachable, a complete
/// implementation would re-hash on the inner packet with source and
/// destination swapped. The spec marks this as deliberately unimplemented
/// (§4.3, §9); this function always declines so `classify` falls back to
/// mark 0, without inventing behavior for the inner-packet case.
fn rehash_icmp_inner(_payload: &[u8]) -> Option<Vec<u8>> {
    None
}
