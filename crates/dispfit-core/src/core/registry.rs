//! Static registry of dispersion models.
//!
//! Each model identifier maps to a fixed description: its experiment family,
//! its ordered free-parameter list, the rules deriving dependent parameters
//! after a fit, the nesting edges that allow seeding its starting point from
//! a simpler model, and policy flags. The registry is a compile-time `phf`
//! table looked up by key; no model-specific branching exists elsewhere.

use phf::phf_map;

use super::models::params::Param;

/// Experiment family a model belongs to. Determines which relaxation-rate
/// cap applies in the linear constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentFamily {
    Cpmg,
    R1Rho,
}

/// Population-constraint policy. `Skewed` marks models whose derivation is
/// only valid for strongly asymmetric population splits and tightens the
/// lower bound on the dominant population.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationPolicy {
    Free,
    Skewed,
}

/// A rule re-deriving a dependent parameter from fitted ones after
/// disassembly. Rules are applied in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Derivation {
    /// `to = 1 - from` (two-state population complement).
    Complement { from: Param, to: Param },
    /// `to = 1 - a - b` (three-state population complement).
    ComplementPair { a: Param, b: Param, to: Param },
    /// `to = 1 / from`. Skipped with a warning when `from` is zero.
    Reciprocal { from: Param, to: Param },
    /// `to = (1 - pop) * rate` (forward flux, e.g. k_AB = pB * kex).
    FluxForward { rate: Param, pop: Param, to: Param },
    /// `to = pop * rate` (reverse flux, e.g. k_BA = pA * kex).
    FluxReverse { rate: Param, pop: Param, to: Param },
}

/// How one target parameter is seeded from an already-fit source model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// Straight copy. A split copy (one source rate feeding two component
    /// rates) is expressed as two `Direct` entries with the same `from`.
    Direct { from: Param, to: Param },
    /// `to = 1 / from`. A zero source value is a configuration error, never
    /// a silent NaN.
    Reciprocal { from: Param, to: Param },
    /// `to = (1 - pop) * rate`; the one documented composite copy
    /// (k_AB seeded from CR72's pA and kex).
    Composite { rate: Param, pop: Param, to: Param },
}

/// One nesting edge: the simpler model this model can be seeded from, and
/// the parameter translations to apply.
#[derive(Debug, Clone, Copy)]
pub struct NestingEdge {
    pub source: &'static str,
    pub translations: &'static [Translation],
}

/// A grid-search sparsity hint: while `driver` sits at its reference
/// increment (typically "no exchange"), varying `decoupled` is redundant.
#[derive(Debug, Clone, Copy)]
pub struct SparsePair {
    pub driver: Param,
    pub decoupled: Param,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelInfo {
    pub id: &'static str,
    pub family: ExperimentFamily,
    /// Free parameters, in canonical declaration order.
    pub params: &'static [Param],
    pub derivations: &'static [Derivation],
    pub nests_from: &'static [NestingEdge],
    pub sparse_pairs: &'static [SparsePair],
    pub population_policy: PopulationPolicy,
}

impl ModelInfo {
    pub fn has_param(&self, param: Param) -> bool {
        self.params.contains(&param)
    }

    /// Whether two models declare the identical free-parameter set.
    pub fn same_param_set(&self, other: &ModelInfo) -> bool {
        self.params.len() == other.params.len()
            && self.params.iter().all(|p| other.params.contains(p))
    }
}

const TWO_SITE_DERIVATIONS: &[Derivation] = &[
    Derivation::Complement {
        from: Param::PA,
        to: Param::PB,
    },
    Derivation::Reciprocal {
        from: Param::Kex,
        to: Param::Tex,
    },
    Derivation::FluxForward {
        rate: Param::Kex,
        pop: Param::PA,
        to: Param::KAB,
    },
    Derivation::FluxReverse {
        rate: Param::Kex,
        pop: Param::PA,
        to: Param::KBA,
    },
];

const FROM_CR72_DIRECT: &[Translation] = &[
    Translation::Direct {
        from: Param::R2,
        to: Param::R2,
    },
    Translation::Direct {
        from: Param::PA,
        to: Param::PA,
    },
    Translation::Direct {
        from: Param::Dw,
        to: Param::Dw,
    },
    Translation::Direct {
        from: Param::Kex,
        to: Param::Kex,
    },
];

const KEX_DW_SPARSE: &[SparsePair] = &[SparsePair {
    driver: Param::Kex,
    decoupled: Param::Dw,
}];

pub static MODELS: phf::Map<&'static str, ModelInfo> = phf_map! {
    "NOREX" => ModelInfo {
        id: "NOREX",
        family: ExperimentFamily::Cpmg,
        params: &[Param::R2],
        derivations: &[],
        nests_from: &[],
        sparse_pairs: &[],
        population_policy: PopulationPolicy::Free,
    },
    "LM63" => ModelInfo {
        id: "LM63",
        family: ExperimentFamily::Cpmg,
        params: &[Param::R2, Param::PhiEx, Param::Kex],
        derivations: &[],
        nests_from: &[NestingEdge {
            source: "NOREX",
            translations: &[Translation::Direct { from: Param::R2, to: Param::R2 }],
        }],
        sparse_pairs: &[SparsePair { driver: Param::Kex, decoupled: Param::PhiEx }],
        population_policy: PopulationPolicy::Free,
    },
    "CR72" => ModelInfo {
        id: "CR72",
        family: ExperimentFamily::Cpmg,
        params: &[Param::R2, Param::PA, Param::Dw, Param::Kex],
        derivations: TWO_SITE_DERIVATIONS,
        nests_from: &[
            NestingEdge {
                source: "LM63",
                translations: &[
                    Translation::Direct { from: Param::R2, to: Param::R2 },
                    Translation::Direct { from: Param::Kex, to: Param::Kex },
                ],
            },
            NestingEdge {
                source: "NOREX",
                translations: &[Translation::Direct { from: Param::R2, to: Param::R2 }],
            },
        ],
        sparse_pairs: KEX_DW_SPARSE,
        population_policy: PopulationPolicy::Free,
    },
    "CR72 full" => ModelInfo {
        id: "CR72 full",
        family: ExperimentFamily::Cpmg,
        params: &[Param::R2A, Param::R2B, Param::PA, Param::Dw, Param::Kex],
        derivations: TWO_SITE_DERIVATIONS,
        nests_from: &[NestingEdge {
            source: "CR72",
            translations: &[
                Translation::Direct { from: Param::R2, to: Param::R2A },
                Translation::Direct { from: Param::R2, to: Param::R2B },
                Translation::Direct { from: Param::PA, to: Param::PA },
                Translation::Direct { from: Param::Dw, to: Param::Dw },
                Translation::Direct { from: Param::Kex, to: Param::Kex },
            ],
        }],
        sparse_pairs: KEX_DW_SPARSE,
        population_policy: PopulationPolicy::Free,
    },
    "B14" => ModelInfo {
        id: "B14",
        family: ExperimentFamily::Cpmg,
        params: &[Param::R2, Param::PA, Param::Dw, Param::Kex],
        derivations: TWO_SITE_DERIVATIONS,
        nests_from: &[NestingEdge { source: "CR72", translations: FROM_CR72_DIRECT }],
        sparse_pairs: KEX_DW_SPARSE,
        population_policy: PopulationPolicy::Free,
    },
    "IT99" => ModelInfo {
        id: "IT99",
        family: ExperimentFamily::Cpmg,
        params: &[Param::R2, Param::PA, Param::Dw, Param::Tex],
        derivations: &[
            Derivation::Complement { from: Param::PA, to: Param::PB },
            Derivation::Reciprocal { from: Param::Tex, to: Param::Kex },
        ],
        nests_from: &[NestingEdge {
            source: "CR72",
            translations: &[
                Translation::Direct { from: Param::R2, to: Param::R2 },
                Translation::Direct { from: Param::PA, to: Param::PA },
                Translation::Direct { from: Param::Dw, to: Param::Dw },
                Translation::Reciprocal { from: Param::Kex, to: Param::Tex },
            ],
        }],
        sparse_pairs: &[SparsePair { driver: Param::Tex, decoupled: Param::Dw }],
        population_policy: PopulationPolicy::Skewed,
    },
    "TSMFK01" => ModelInfo {
        id: "TSMFK01",
        family: ExperimentFamily::Cpmg,
        params: &[Param::R2A, Param::Dw, Param::KAB],
        derivations: &[],
        nests_from: &[NestingEdge {
            source: "CR72",
            translations: &[
                Translation::Direct { from: Param::R2, to: Param::R2A },
                Translation::Direct { from: Param::Dw, to: Param::Dw },
                Translation::Composite { rate: Param::Kex, pop: Param::PA, to: Param::KAB },
            ],
        }],
        sparse_pairs: &[SparsePair { driver: Param::KAB, decoupled: Param::Dw }],
        population_policy: PopulationPolicy::Skewed,
    },
    "NS CPMG 2-site 3D" => ModelInfo {
        id: "NS CPMG 2-site 3D",
        family: ExperimentFamily::Cpmg,
        params: &[Param::R2, Param::PA, Param::Dw, Param::Kex],
        derivations: TWO_SITE_DERIVATIONS,
        nests_from: &[
            NestingEdge { source: "CR72", translations: FROM_CR72_DIRECT },
            NestingEdge { source: "B14", translations: FROM_CR72_DIRECT },
        ],
        sparse_pairs: KEX_DW_SPARSE,
        population_policy: PopulationPolicy::Free,
    },
    "MMQ CR72" => ModelInfo {
        id: "MMQ CR72",
        family: ExperimentFamily::Cpmg,
        params: &[Param::R2, Param::PA, Param::Dw, Param::DwH, Param::Kex],
        derivations: TWO_SITE_DERIVATIONS,
        nests_from: &[NestingEdge { source: "CR72", translations: FROM_CR72_DIRECT }],
        sparse_pairs: KEX_DW_SPARSE,
        population_policy: PopulationPolicy::Free,
    },
    "NS MMQ 3-site" => ModelInfo {
        id: "NS MMQ 3-site",
        family: ExperimentFamily::Cpmg,
        params: &[
            Param::R2,
            Param::PA,
            Param::PB,
            Param::DwAB,
            Param::DwBC,
            Param::KexAB,
            Param::KexBC,
        ],
        derivations: &[Derivation::ComplementPair {
            a: Param::PA,
            b: Param::PB,
            to: Param::PC,
        }],
        nests_from: &[NestingEdge {
            source: "CR72",
            translations: &[
                Translation::Direct { from: Param::R2, to: Param::R2 },
                Translation::Direct { from: Param::PA, to: Param::PA },
                Translation::Direct { from: Param::Dw, to: Param::DwAB },
                Translation::Direct { from: Param::Kex, to: Param::KexAB },
            ],
        }],
        sparse_pairs: &[
            SparsePair { driver: Param::KexAB, decoupled: Param::DwAB },
            SparsePair { driver: Param::KexBC, decoupled: Param::DwBC },
        ],
        population_policy: PopulationPolicy::Free,
    },
    "TP02" => ModelInfo {
        id: "TP02",
        family: ExperimentFamily::R1Rho,
        params: &[Param::R1RhoPrime, Param::PA, Param::Dw, Param::Kex],
        derivations: TWO_SITE_DERIVATIONS,
        nests_from: &[],
        sparse_pairs: KEX_DW_SPARSE,
        population_policy: PopulationPolicy::Free,
    },
    "MP05" => ModelInfo {
        id: "MP05",
        family: ExperimentFamily::R1Rho,
        params: &[Param::R1RhoPrime, Param::PA, Param::Dw, Param::Kex],
        derivations: TWO_SITE_DERIVATIONS,
        nests_from: &[NestingEdge {
            source: "TP02",
            translations: &[
                Translation::Direct { from: Param::R1RhoPrime, to: Param::R1RhoPrime },
                Translation::Direct { from: Param::PA, to: Param::PA },
                Translation::Direct { from: Param::Dw, to: Param::Dw },
                Translation::Direct { from: Param::Kex, to: Param::Kex },
            ],
        }],
        sparse_pairs: KEX_DW_SPARSE,
        population_policy: PopulationPolicy::Free,
    },
    "NS R1rho 2-site" => ModelInfo {
        id: "NS R1rho 2-site",
        family: ExperimentFamily::R1Rho,
        params: &[Param::R1RhoPrime, Param::PA, Param::Dw, Param::Kex],
        derivations: TWO_SITE_DERIVATIONS,
        nests_from: &[
            NestingEdge {
                source: "MP05",
                translations: &[
                    Translation::Direct { from: Param::R1RhoPrime, to: Param::R1RhoPrime },
                    Translation::Direct { from: Param::PA, to: Param::PA },
                    Translation::Direct { from: Param::Dw, to: Param::Dw },
                    Translation::Direct { from: Param::Kex, to: Param::Kex },
                ],
            },
            NestingEdge {
                source: "TP02",
                translations: &[
                    Translation::Direct { from: Param::R1RhoPrime, to: Param::R1RhoPrime },
                    Translation::Direct { from: Param::PA, to: Param::PA },
                    Translation::Direct { from: Param::Dw, to: Param::Dw },
                    Translation::Direct { from: Param::Kex, to: Param::Kex },
                ],
            },
        ],
        sparse_pairs: KEX_DW_SPARSE,
        population_policy: PopulationPolicy::Free,
    },
};

pub fn get(model_id: &str) -> Option<&'static ModelInfo> {
    MODELS.get(model_id)
}

/// Default grid bounds for a free parameter, by category, adjusted for the
/// model's population policy.
pub fn grid_bounds(param: Param, policy: PopulationPolicy) -> (f64, f64) {
    use super::models::params::ParamCategory::*;
    match param.descriptor().category {
        Rate => (0.0, 40.0),
        ShiftDifference => (0.0, 10.0),
        ExchangeContribution => (0.0, 10.0),
        Population => match param {
            Param::PA => match policy {
                PopulationPolicy::Free => (0.5, 1.0),
                PopulationPolicy::Skewed => (0.85, 1.0),
            },
            _ => (0.0, 0.5),
        },
        ExchangeRate => (1.0, 1.0e5),
        TimeConstant => (1.0e-5, 0.1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_is_internally_consistent() {
        for (id, info) in MODELS.entries() {
            assert_eq!(*id, info.id);
            assert!(!info.params.is_empty(), "{id} has no free parameters");
            for edge in info.nests_from {
                let source = get(edge.source)
                    .unwrap_or_else(|| panic!("{id} nests from unknown model {}", edge.source));
                for t in edge.translations {
                    let (from, to) = match *t {
                        Translation::Direct { from, to } => (from, to),
                        Translation::Reciprocal { from, to } => (from, to),
                        Translation::Composite { rate, to, .. } => (rate, to),
                    };
                    assert!(
                        source.has_param(from) || source.derivations.iter().any(|d| matches!(
                            d,
                            Derivation::Complement { to: t, .. }
                            | Derivation::ComplementPair { to: t, .. }
                            | Derivation::Reciprocal { to: t, .. }
                            | Derivation::FluxForward { to: t, .. }
                            | Derivation::FluxReverse { to: t, .. } if *t == from
                        )),
                        "{id}: translation source {from} not produced by {}",
                        edge.source
                    );
                    assert!(info.has_param(to), "{id}: translation target {to} not free");
                }
            }
        }
    }

    #[test]
    fn equivalent_models_share_param_sets() {
        let cr72 = get("CR72").unwrap();
        let b14 = get("B14").unwrap();
        assert!(cr72.same_param_set(b14));
        assert!(!cr72.same_param_set(get("CR72 full").unwrap()));
    }

    #[test]
    fn skewed_policy_tightens_population_grid() {
        let free = grid_bounds(Param::PA, PopulationPolicy::Free);
        let skew = grid_bounds(Param::PA, PopulationPolicy::Skewed);
        assert_eq!(free.0, 0.5);
        assert_eq!(skew.0, 0.85);
    }
}
