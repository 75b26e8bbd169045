//! Reference forward model shipped with the binary.
//!
//! A fast-exchange closed form behind the [`DispersionModel`] seam, so the
//! CLI is exercisable end to end without an external physics crate:
//!
//! `R2eff(x) = r2 + (phi/kex) * (1 - (4x/kex) * tanh(kex/(4x)))`
//!
//! where `phi` is either the fitted exchange contribution or
//! `pA * (1 - pA) * dw^2`. Models without an exchange rate reduce to the
//! flat baseline.

use dispfit::core::models::params::Param;
use dispfit::engine::objective::{DispersionModel, PointParams};

pub struct FastExchangeModel;

impl FastExchangeModel {
    fn base_rate(params: &PointParams) -> f64 {
        params
            .get(Param::R2)
            .or_else(|| params.get(Param::R2A))
            .or_else(|| params.get(Param::R1RhoPrime))
            .unwrap_or(0.0)
    }

    fn exchange_rate(params: &PointParams) -> Option<f64> {
        params
            .get(Param::Kex)
            .or_else(|| params.get(Param::KexAB))
            .or_else(|| {
                params
                    .get(Param::Tex)
                    .and_then(|tex| (tex != 0.0).then(|| 1.0 / tex))
            })
            .or_else(|| params.get(Param::KAB))
    }

    fn exchange_amplitude(params: &PointParams) -> f64 {
        if let Some(phi) = params.get(Param::PhiEx) {
            return phi;
        }
        let dw = params
            .get(Param::Dw)
            .or_else(|| params.get(Param::DwAB))
            .unwrap_or(0.0);
        let pa = params.get(Param::PA).unwrap_or(1.0);
        pa * (1.0 - pa) * dw * dw
    }
}

impl DispersionModel for FastExchangeModel {
    fn predict(&self, _spin: &str, params: &PointParams, x: f64) -> f64 {
        let r2 = Self::base_rate(params);
        let Some(kex) = Self::exchange_rate(params) else {
            return r2;
        };
        if kex <= 0.0 {
            return r2;
        }
        let phi = Self::exchange_amplitude(params);
        if x <= 0.0 {
            // Zero refocusing frequency: the full exchange broadening.
            return r2 + phi / kex;
        }
        r2 + (phi / kex) * (1.0 - (4.0 * x / kex) * (kex / (4.0 * x)).tanh())
    }
}
