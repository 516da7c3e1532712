//! Interpretation of the optional weight column

/// How the weight column of each record is turned into weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WeightPolicy {
    /// Ignore any weight column; every record weighs 1
    #[default]
    Unweighted,
    /// The column holds weights, used for both z and position
    Weights,
    /// The column holds sigmas; z is weighted by `1/σ²`, positions are not
    InverseVariance,
    /// The column holds sigmas; plain mean with error `sqrt(Σσ²)/n`
    SimpleMeanSigma,
    /// The column holds weights taken as inverse variances; error `sqrt(Σ1/w)/n`
    LegacyInverseVariance,
}

/// Weights derived from one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weighting {
    /// Weight applied to z
    pub weight: f64,
    /// Weight applied to x and y
    pub position_weight: f64,
    /// Per-record term summed for the propagated error
    pub error_term: f64,
}

impl Weighting {
    const UNIT: Weighting = Weighting {
        weight: 1.0,
        position_weight: 1.0,
        error_term: 0.0,
    };
}

impl WeightPolicy {
    /// Whether records must carry a weight column
    pub fn needs_column(self) -> bool {
        self != WeightPolicy::Unweighted
    }

    /// Whether the z weights can differ between records
    pub fn has_variable_weights(self) -> bool {
        matches!(
            self,
            WeightPolicy::Weights | WeightPolicy::InverseVariance | WeightPolicy::LegacyInverseVariance
        )
    }

    /// Whether a propagated error can be derived from the column
    pub fn propagates_error(self) -> bool {
        matches!(
            self,
            WeightPolicy::InverseVariance
                | WeightPolicy::SimpleMeanSigma
                | WeightPolicy::LegacyInverseVariance
        )
    }

    /// Derive the weights for one record from its column value.
    ///
    /// Returns `None` when the derived weight is not a positive finite
    /// number; such records are dropped from the reduction.
    pub fn weigh(self, column: Option<f64>) -> Option<Weighting> {
        let value = match (self, column) {
            (WeightPolicy::Unweighted, _) => return Some(Weighting::UNIT),
            (_, Some(value)) => value,
            (_, None) => return None,
        };
        if !(value.is_finite() && value > 0.0) {
            return None;
        }

        let weighting = match self {
            WeightPolicy::Unweighted => Weighting::UNIT,
            WeightPolicy::Weights => Weighting {
                weight: value,
                position_weight: value,
                error_term: 0.0,
            },
            WeightPolicy::InverseVariance => {
                let inverse_variance = 1.0 / (value * value);
                Weighting {
                    weight: inverse_variance,
                    position_weight: 1.0,
                    error_term: inverse_variance,
                }
            }
            WeightPolicy::SimpleMeanSigma => Weighting {
                weight: 1.0,
                position_weight: 1.0,
                error_term: value * value,
            },
            WeightPolicy::LegacyInverseVariance => Weighting {
                weight: value,
                position_weight: value,
                error_term: 1.0 / value,
            },
        };
        (weighting.weight.is_finite() && weighting.weight > 0.0).then_some(weighting)
    }

    /// Propagated error of a mean from the summed error terms of `n` records
    pub fn propagated_error(self, error_sum: f64, n: u64) -> f64 {
        match self {
            WeightPolicy::InverseVariance => 1.0 / error_sum.sqrt(),
            WeightPolicy::SimpleMeanSigma | WeightPolicy::LegacyInverseVariance => {
                error_sum.sqrt() / n as f64
            }
            WeightPolicy::Unweighted | WeightPolicy::Weights => f64::NAN,
        }
    }
}
