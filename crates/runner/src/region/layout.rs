//! The fixed-offset byte layout of the shared region (§6 of the spec).
//!
//! This is a manual codec rather than a `serde` (de)serialization: the
//! on-disk shape is an ABI contract pinned to explicit byte offsets, sized
//! to `MAX_M`/`MAX_N` regardless of the configured `M`/`N`, not a
//! self-describing document format. Every integer is little-endian; the
//! region is produced and consumed on the same host, so this matches the
//! spec's "same host, same ABI" assumption.

use nfqlb_common::{MagData, ModuloAux, SharedData, MAX_M, MAX_N};

pub const OWN_FWMARK_OFFSET: usize = 0;
pub const FW_OFFSET_OFFSET: usize = 4;
pub const MAGDATA_OFFSET: usize = 8;
pub const MAGDATA_M_OFFSET: usize = MAGDATA_OFFSET;
pub const MAGDATA_N_OFFSET: usize = MAGDATA_OFFSET + 4;
pub const MAGDATA_LOOKUP_OFFSET: usize = MAGDATA_OFFSET + 8;
const MAGDATA_LOOKUP_BYTES: usize = MAX_M * 4;
pub const MAGDATA_PERMUTATION_OFFSET: usize = MAGDATA_LOOKUP_OFFSET + MAGDATA_LOOKUP_BYTES;
const MAGDATA_PERMUTATION_BYTES: usize = MAX_N * MAX_M * 4;
pub const MAGDATA_ACTIVE_OFFSET: usize = MAGDATA_PERMUTATION_OFFSET + MAGDATA_PERMUTATION_BYTES;
const MAGDATA_ACTIVE_BYTES: usize = MAX_N * 4;
pub const MODULO_OFFSET: usize = MAGDATA_ACTIVE_OFFSET + MAGDATA_ACTIVE_BYTES;
pub const MODULO_NACTIVE_OFFSET: usize = MODULO_OFFSET;
pub const MODULO_LOOKUP_OFFSET: usize = MODULO_OFFSET + 4;
const MODULO_LOOKUP_BYTES: usize = MAX_N * 4;

/// Total size of the region, fixed regardless of the configured `M`/`N`.
pub const REGION_SIZE: usize = MODULO_LOOKUP_OFFSET + MODULO_LOOKUP_BYTES;

#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("region buffer too small: expected at least {expected} bytes, found {found}")]
    TooSmall { expected: usize, found: usize },
    #[error("configured M={m} exceeds MAX_M={max}")]
    MTooLarge { m: u32, max: usize },
    #[error("configured N={n} exceeds MAX_N={max}")]
    NTooLarge { n: u32, max: usize },
}

fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_i32(buf: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

fn get_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(buf[offset..offset + 4].try_into().unwrap())
}

/// Encodes `sh` into `buf` using the fixed layout above. `buf` must be at
/// least `REGION_SIZE` bytes. Writes `modulo.n_active` last, so a
/// concurrent read-only mapping never observes `n_active` ahead of the
/// `lookup` prefix it claims is populated (§5).
pub fn encode(sh: &SharedData, buf: &mut [u8]) -> Result<(), LayoutError> {
    if buf.len() < REGION_SIZE {
        return Err(LayoutError::TooSmall {
            expected: REGION_SIZE,
            found: buf.len(),
        });
    }
    if sh.magd.m as usize > MAX_M {
        return Err(LayoutError::MTooLarge {
            m: sh.magd.m,
            max: MAX_M,
        });
    }
    if sh.magd.n as usize > MAX_N {
        return Err(LayoutError::NTooLarge {
            n: sh.magd.n,
            max: MAX_N,
        });
    }

    put_i32(buf, OWN_FWMARK_OFFSET, sh.own_fwmark);
    put_i32(buf, FW_OFFSET_OFFSET, sh.fw_offset);
    put_u32(buf, MAGDATA_M_OFFSET, sh.magd.m);
    put_u32(buf, MAGDATA_N_OFFSET, sh.magd.n);

    for i in 0..MAX_M {
        let value = sh.magd.lookup.get(i).copied().unwrap_or(-1);
        put_i32(buf, MAGDATA_LOOKUP_OFFSET + i * 4, value);
    }

    for i in 0..MAX_N {
        let base = MAGDATA_PERMUTATION_OFFSET + i * MAX_M * 4;
        for j in 0..MAX_M {
            let value = sh
                .magd
                .permutation
                .get(i)
                .and_then(|row| row.get(j))
                .copied()
                .unwrap_or(0);
            put_u32(buf, base + j * 4, value);
        }
    }

    for i in 0..MAX_N {
        let value = sh.magd.active.get(i).copied().unwrap_or(0);
        put_u32(buf, MAGDATA_ACTIVE_OFFSET + i * 4, value);
    }

    for i in 0..MAX_N {
        let value = sh.modulo.lookup.get(i).copied().unwrap_or(0);
        put_i32(buf, MODULO_LOOKUP_OFFSET + i * 4, value);
    }
    put_i32(buf, MODULO_NACTIVE_OFFSET, sh.modulo.n_active);

    Ok(())
}

/// Decodes a `SharedData` snapshot out of `buf`, truncating the
/// `MAX_M`/`MAX_N`-sized storage back down to the configured `M`/`N`.
pub fn decode(buf: &[u8]) -> Result<SharedData, LayoutError> {
    if buf.len() < REGION_SIZE {
        return Err(LayoutError::TooSmall {
            expected: REGION_SIZE,
            found: buf.len(),
        });
    }

    let own_fwmark = get_i32(buf, OWN_FWMARK_OFFSET);
    let fw_offset = get_i32(buf, FW_OFFSET_OFFSET);
    let m = get_u32(buf, MAGDATA_M_OFFSET);
    let n = get_u32(buf, MAGDATA_N_OFFSET);
    if m as usize > MAX_M {
        return Err(LayoutError::MTooLarge { m, max: MAX_M });
    }
    if n as usize > MAX_N {
        return Err(LayoutError::NTooLarge { n, max: MAX_N });
    }

    let lookup = (0..m as usize)
        .map(|i| get_i32(buf, MAGDATA_LOOKUP_OFFSET + i * 4))
        .collect();

    let permutation = (0..n as usize)
        .map(|i| {
            let base = MAGDATA_PERMUTATION_OFFSET + i * MAX_M * 4;
            (0..m as usize).map(|j| get_u32(buf, base + j * 4)).collect()
        })
        .collect();

    let active = (0..n as usize)
        .map(|i| get_u32(buf, MAGDATA_ACTIVE_OFFSET + i * 4))
        .collect();

    let magd = MagData {
        m,
        n,
        permutation,
        active,
        lookup,
    };

    let n_active = get_i32(buf, MODULO_NACTIVE_OFFSET);
    let modulo_lookup = (0..n_active.max(0) as usize)
        .map(|i| get_i32(buf, MODULO_LOOKUP_OFFSET + i * 4))
        .collect();
    let modulo = ModuloAux {
        n_active,
        lookup: modulo_lookup,
    };

    Ok(SharedData {
        own_fwmark,
        fw_offset,
        magd,
        modulo,
    })
}
