//! `SharedData`: the logical content of the shared region — the classifier's
//! own fwmark identity, the fwmark offset, and the Maglev/modulo tables.
//! This module is intentionally IO-free; `nfqlb-runner::region` owns turning
//! this into bytes on a mapped region.

use rand::rngs::StdRng;

use crate::maglev::{self, MagData, DEFAULT_ACTIVE_COUNT, DEFAULT_M, DEFAULT_N};
use crate::modulo::ModuloAux;

/// The persistent state the control process writes and the data-plane
/// process reads: the classifier's own mark, the mark offset, and the two
/// lookup tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedData {
    pub own_fwmark: i32,
    pub fw_offset: i32,
    pub magd: MagData,
    pub modulo: ModuloAux,
}

impl SharedData {
    /// Builds a freshly-created region: clamps the requested `(m, n)`
    /// (defaulting to `(997, 10)` when absent), activates backends `0..4`,
    /// and populates both tables.
    pub fn create(own_fwmark: i32, fw_offset: i32, m: Option<u32>, n: Option<u32>, rng: &mut StdRng) -> Self {
        let m = maglev::clamp_m(m.unwrap_or(DEFAULT_M));
        let n = maglev::clamp_n(n.unwrap_or(DEFAULT_N));

        let mut magd = MagData::initialize(m, n, rng);
        for i in 0..DEFAULT_ACTIVE_COUNT.min(n) as usize {
            magd.active[i] = 1;
        }
        magd.populate();
        let modulo = ModuloAux::update(&magd.active);

        Self {
            own_fwmark,
            fw_offset,
            magd,
            modulo,
        }
    }

    /// Activates the backends named by `raw_ids` (already in mark space,
    /// i.e. `fwOffset` is subtracted here) and recomputes both tables.
    pub fn activate(&mut self, raw_ids: impl IntoIterator<Item = i64>) {
        let offset = i64::from(self.fw_offset);
        self.magd
            .set_active(raw_ids.into_iter().map(|id| id - offset), true);
        self.modulo = ModuloAux::update(&self.magd.active);
    }

    /// Deactivates the backends named by `raw_ids`, symmetric to `activate`.
    pub fn deactivate(&mut self, raw_ids: impl IntoIterator<Item = i64>) {
        let offset = i64::from(self.fw_offset);
        self.magd
            .set_active(raw_ids.into_iter().map(|id| id - offset), false);
        self.modulo = ModuloAux::update(&self.magd.active);
    }
}
