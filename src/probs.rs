//! Normal-distribution helpers for turning an expected loss and a dispersion
//! (G) value into probabilities.

use statrs::function::erf::{erfc, erfc_inv};

/// Added to losses before taking logarithms so a loss of zero stays finite.
pub const LOSS_EPSILON: f64 = 0.00001;

/// Dispersion cap applied when the expected loss is below one.
const SMALL_LOSS_MAX_G: f64 = 1.7613;

/// Standard normal CDF.
pub fn phi(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

/// Inverse of the standard normal CDF.
pub fn invphi(p: f64) -> f64 {
    -std::f64::consts::SQRT_2 * erfc_inv(p / 0.5)
}

/// Probability that losses will not exceed `value`, given expected loss `e`.
pub fn prob_from_value(g: f64, e: f64, value: f64) -> f64 {
    let e = e + LOSS_EPSILON;
    let value = value + LOSS_EPSILON;
    phi((value.ln() - e.ln()) / g)
}

/// Loss value with non-exceedance probability `p`, given expected loss `e`.
pub fn value_from_prob(g: f64, e: f64, p: f64) -> f64 {
    let e = e + LOSS_EPSILON;
    (g * invphi(p) + e.ln()).exp()
}

/// Probability that losses fall between consecutive edges of `edges`.
///
/// With two edges this is the probability of a single range; with more, the
/// sum over all consecutive ranges. Small expected losses get a capped G, and
/// an expected loss of zero is treated as 0.5.
pub fn prob_from_range(g: f64, e: f64, edges: &[f64]) -> f64 {
    let mut e = e + LOSS_EPSILON;
    let mut g = g;
    if e < 1.0 && g > 1.7 {
        g = SMALL_LOSS_MAX_G;
    }
    if edges.len() == 2 && e < 0.001 {
        e = 0.5;
    }
    edges
        .windows(2)
        .map(|w| {
            let fmin = w[0] + LOSS_EPSILON;
            let fmax = w[1] + LOSS_EPSILON;
            phi((fmax.ln() - e.ln()) / g) - phi((fmin.ln() - e.ln()) / g)
        })
        .sum()
}
