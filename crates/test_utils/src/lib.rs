//! Shared fixtures for `nfqlb-common` and `nfqlb-runner` tests: sample
//! `SharedData` builders and sample IPv4/IPv6/TCP packet builders, so
//! integration tests don't each hand-roll byte layouts.

use nfqlb_common::maglev::seeded_rng;
use nfqlb_common::SharedData;

/// A `SharedData` built from a fixed seed, for deterministic fixtures.
pub fn sample_shared_data(own_fwmark: i32, fw_offset: i32, m: u32, n: u32, seed: u64) -> SharedData {
    let mut rng = seeded_rng(seed);
    SharedData::create(own_fwmark, fw_offset, Some(m), Some(n), &mut rng)
}

const IPPROTO_TCP: u8 = 6;

/// A minimal IPv4/TCP packet: no options, not fragmented, carrying the
/// given addresses and ports. With `port_extension = false` the packet is
/// still 24 bytes long; callers that don't need ports can ignore the tail.
pub fn ipv4_tcp_packet(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
    let mut p = vec![0u8; 24];
    p[0] = 0x45; // version 4, IHL 5
    p[9] = IPPROTO_TCP;
    p[12..16].copy_from_slice(&src);
    p[16..20].copy_from_slice(&dst);
    p[20..22].copy_from_slice(&sport.to_be_bytes());
    p[22..24].copy_from_slice(&dport.to_be_bytes());
    p
}

/// An IPv4/TCP packet with IP options present (`IHL = 6`), which the
/// classifier always rejects.
pub fn ipv4_tcp_packet_with_options(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
    let mut p = ipv4_tcp_packet(src, dst, sport, dport);
    p[0] = 0x46;
    p
}

/// An IPv4/TCP packet with the more-fragments bit set.
pub fn ipv4_tcp_packet_fragmented(src: [u8; 4], dst: [u8; 4], sport: u16, dport: u16) -> Vec<u8> {
    let mut p = ipv4_tcp_packet(src, dst, sport, dport);
    p[6] = 0x20;
    p
}

/// A minimal IPv6/TCP packet: no extension headers, carrying the given
/// addresses and ports.
pub fn ipv6_tcp_packet(src: [u8; 16], dst: [u8; 16], sport: u16, dport: u16) -> Vec<u8> {
    let mut p = vec![0u8; 44];
    p[6] = IPPROTO_TCP;
    p[8..24].copy_from_slice(&src);
    p[24..40].copy_from_slice(&dst);
    p[40..42].copy_from_slice(&sport.to_be_bytes());
    p[42..44].copy_from_slice(&dport.to_be_bytes());
    p
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_shared_data_activates_the_default_backend_count() {
        let sh = sample_shared_data(0, 1, 23, 5, 1);
        assert_eq!(sh.modulo.n_active, 4);
    }

    #[test]
    fn ipv4_packet_builders_set_the_expected_flags() {
        let base = ipv4_tcp_packet([1, 2, 3, 4], [5, 6, 7, 8], 10, 20);
        assert_eq!(base[0] & 0x0f, 5);

        let opts = ipv4_tcp_packet_with_options([1, 2, 3, 4], [5, 6, 7, 8], 10, 20);
        assert_eq!(opts[0] & 0x0f, 6);

        let frag = ipv4_tcp_packet_fragmented([1, 2, 3, 4], [5, 6, 7, 8], 10, 20);
        assert_eq!(frag[6] & 0x20, 0x20);
    }
}
