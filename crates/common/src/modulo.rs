//! The modulo auxiliary table: a plain ascending list of currently-active
//! backend indices, recomputed alongside every Maglev re-population.

/// Companion table to `MagData`: the count of active backends and the
/// ascending list of their indices, used by the modulo lookup mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuloAux {
    pub n_active: i32,
    pub lookup: Vec<i32>,
}

impl ModuloAux {
    /// Rebuilds `n_active`/`lookup` from `active[0..n)`, in ascending index
    /// order. Runs after every mutation of `active` (M3).
    pub fn update(active: &[u32]) -> Self {
        let lookup: Vec<i32> = active
            .iter()
            .enumerate()
            .filter(|&(_, &a)| a != 0)
            .map(|(i, _)| i as i32)
            .collect();
        Self {
            n_active: lookup.len() as i32,
            lookup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // P5: nActive equals popcount of active, lookup is the strictly
    // increasing list of active indices.
    #[test]
    fn p5_modulo_consistency() {
        let active = [1, 0, 1, 1, 0];
        let m = ModuloAux::update(&active);
        assert_eq!(m.n_active, 3);
        assert_eq!(m.lookup, vec![0, 2, 3]);
        assert!(m.lookup.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn no_active_backends() {
        let m = ModuloAux::update(&[0, 0, 0]);
        assert_eq!(m.n_active, 0);
        assert!(m.lookup.is_empty());
    }

    #[test]
    fn all_active_backends() {
        let m = ModuloAux::update(&[1, 1, 1, 1]);
        assert_eq!(m.n_active, 4);
        assert_eq!(m.lookup, vec![0, 1, 2, 3]);
    }
}
