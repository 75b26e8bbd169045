//! Named physical parameters and their slot-accounting descriptors.
//!
//! Every quantity a dispersion model can fit or derive is one [`Param`]
//! variant. A parameter's [`ParamDescriptor`] determines how many slots it
//! occupies in the flat optimization vector of a cluster: a cluster-scoped
//! parameter occupies exactly one slot shared by all spins, a per-spin
//! parameter one slot per selected spin, and a keyed rate parameter one slot
//! per selected spin per experimental condition key.

use std::fmt;

/// Identifier for one experimental condition (e.g. a spectrometer frequency)
/// under which a keyed rate parameter takes a distinct value.
///
/// Keys are registered on the dataset in first-seen order; the wrapped index
/// is the position in that canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConditionKey(pub usize);

impl fmt::Display for ConditionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamScope {
    /// One value per selected spin.
    PerSpin,
    /// One value shared by the whole cluster.
    PerCluster,
}

/// Physical category of a parameter, used for constraint caps, grid bounds
/// and numeric scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamCategory {
    /// Transverse relaxation rates (R2, R2A, R2B, R1rho').
    Rate,
    /// Chemical-shift differences between exchanging states.
    ShiftDifference,
    /// State populations (pA, pB, pC).
    Population,
    /// Exchange rates (kex and friends).
    ExchangeRate,
    /// Exchange time constants (tex = 1/kex).
    TimeConstant,
    /// Composite fast-exchange contributions (phi_ex).
    ExchangeContribution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamDescriptor {
    pub scope: ParamScope,
    /// Whether the parameter takes a distinct value per condition key.
    pub keyed: bool,
    pub category: ParamCategory,
}

/// A named physical parameter of a dispersion model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Param {
    R2,
    R2A,
    R2B,
    R1RhoPrime,
    Dw,
    DwAB,
    DwBC,
    DwH,
    PhiEx,
    PA,
    PB,
    PC,
    Kex,
    KexAB,
    KexBC,
    KAB,
    KBA,
    Tex,
}

impl Param {
    pub const fn descriptor(self) -> ParamDescriptor {
        use Param::*;
        use ParamCategory::*;
        use ParamScope::*;
        match self {
            R2 | R2A | R2B | R1RhoPrime => ParamDescriptor {
                scope: PerSpin,
                keyed: true,
                category: Rate,
            },
            Dw | DwAB | DwBC | DwH => ParamDescriptor {
                scope: PerSpin,
                keyed: false,
                category: ShiftDifference,
            },
            PhiEx => ParamDescriptor {
                scope: PerSpin,
                keyed: false,
                category: ExchangeContribution,
            },
            PA | PB | PC => ParamDescriptor {
                scope: PerCluster,
                keyed: false,
                category: Population,
            },
            Kex | KexAB | KexBC | KAB | KBA => ParamDescriptor {
                scope: PerCluster,
                keyed: false,
                category: ExchangeRate,
            },
            Tex => ParamDescriptor {
                scope: PerCluster,
                keyed: false,
                category: TimeConstant,
            },
        }
    }

    pub const fn name(self) -> &'static str {
        use Param::*;
        match self {
            R2 => "r2",
            R2A => "r2a",
            R2B => "r2b",
            R1RhoPrime => "r1rho_prime",
            Dw => "dw",
            DwAB => "dw_AB",
            DwBC => "dw_BC",
            DwH => "dwH",
            PhiEx => "phi_ex",
            PA => "pA",
            PB => "pB",
            PC => "pC",
            Kex => "kex",
            KexAB => "kex_AB",
            KexBC => "kex_BC",
            KAB => "k_AB",
            KBA => "k_BA",
            Tex => "tex",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        use Param::*;
        Some(match name {
            "r2" => R2,
            "r2a" => R2A,
            "r2b" => R2B,
            "r1rho_prime" => R1RhoPrime,
            "dw" => Dw,
            "dw_AB" => DwAB,
            "dw_BC" => DwBC,
            "dwH" => DwH,
            "phi_ex" => PhiEx,
            "pA" => PA,
            "pB" => PB,
            "pC" => PC,
            "kex" => Kex,
            "kex_AB" => KexAB,
            "kex_BC" => KexBC,
            "k_AB" => KAB,
            "k_BA" => KBA,
            "tex" => Tex,
            _ => return None,
        })
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        let all = [
            Param::R2,
            Param::R2A,
            Param::R2B,
            Param::R1RhoPrime,
            Param::Dw,
            Param::DwAB,
            Param::DwBC,
            Param::DwH,
            Param::PhiEx,
            Param::PA,
            Param::PB,
            Param::PC,
            Param::Kex,
            Param::KexAB,
            Param::KexBC,
            Param::KAB,
            Param::KBA,
            Param::Tex,
        ];
        for p in all {
            assert_eq!(Param::from_name(p.name()), Some(p));
        }
    }

    #[test]
    fn keyed_params_are_per_spin_rates() {
        for p in [Param::R2, Param::R2A, Param::R2B, Param::R1RhoPrime] {
            let d = p.descriptor();
            assert!(d.keyed);
            assert_eq!(d.scope, ParamScope::PerSpin);
            assert_eq!(d.category, ParamCategory::Rate);
        }
    }
}
