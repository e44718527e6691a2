//! Market-Making Engine
//!
//! Pure functions from pool volumes to decimal odds.
//!
//! Both algorithms blend a volume-derived probability with a neutral prior.
//! The prior's weight `s = max(0.05, 0.3 - total / 50)` shrinks as money comes
//! in, so young markets quote conservatively and mature markets follow the
//! money. Probabilities become odds through `1 / (p * (1 - house_rate))`, and
//! every quote is clamped into the configured band.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::money;

/// Odds engine parameters
#[derive(Debug, Clone, PartialEq)]
pub struct OddsParams {
    /// Total house fee rate (platform + incentive)
    pub house_rate: Decimal,
    pub min_odds: Decimal,
    pub max_odds_two_sided: Decimal,
    pub max_odds_multi: Decimal,
    /// Share of the opposing pool a side may be exposed to
    pub safety_buffer: Decimal,
}

impl Default for OddsParams {
    fn default() -> Self {
        Self {
            house_rate: Decimal::new(545, 4), // 5.45%
            min_odds: Decimal::new(105, 2),
            max_odds_two_sided: Decimal::from(20),
            max_odds_multi: Decimal::from(100),
            safety_buffer: Decimal::new(9, 1),
        }
    }
}

impl OddsParams {
    fn keep_rate(&self) -> Decimal {
        Decimal::ONE - self.house_rate
    }

    /// `1 / (p * (1 - house_rate))`, unclamped
    fn odds_from_probability(&self, probability: Decimal, ceiling: Decimal) -> Decimal {
        money::div(Decimal::ONE, probability * self.keep_rate()).unwrap_or(ceiling)
    }
}

/// Weight given to the neutral prior for a market holding `total` volume
pub fn smoothing_weight(total: Decimal) -> Decimal {
    let floor = Decimal::new(5, 2);
    let decayed = Decimal::new(3, 1) - total / Decimal::from(50);
    money::truncate(decayed.max(floor))
}

// ============================================================================
// Two-sided
// ============================================================================

/// Highest odds side `own` may quote without its potential profit exceeding
/// `safety_buffer` of the opposing pool (grossed up for the house fee).
///
/// `cap = 1 + safety_buffer * opposing / ((1 - house_rate) * own)`.
/// An empty side risks nothing and gets the two-sided ceiling.
pub fn two_sided_liquidity_cap(own: Decimal, opposing: Decimal, params: &OddsParams) -> Decimal {
    if own.is_zero() {
        return params.max_odds_two_sided;
    }
    let exposure = params.safety_buffer * opposing;
    match money::div(exposure, params.keep_rate() * own) {
        Some(ratio) => Decimal::ONE + ratio,
        None => params.max_odds_two_sided,
    }
}

/// Odds for both sides of a two-sided market, `(odds_a, odds_b)`.
///
/// The base probability of a side is its share of the total volume, so adding
/// stake to a side never lengthens its odds.
pub fn two_sided_odds(v_a: Decimal, v_b: Decimal, params: &OddsParams) -> (Decimal, Decimal) {
    let lo = params.min_odds;
    let hi = params.max_odds_two_sided;
    let half = Decimal::new(5, 1);
    let total = v_a + v_b;

    if total.is_zero() {
        let cold = money::clamp(params.odds_from_probability(half, hi), lo, hi);
        return (cold, cold);
    }

    let s = smoothing_weight(total);
    let quote = |own: Decimal, opposing: Decimal| {
        let base = money::div(own, total).unwrap_or(half);
        let probability = money::truncate(s * half + (Decimal::ONE - s) * base);
        let fair = params.odds_from_probability(probability, hi);
        let cap = two_sided_liquidity_cap(own, opposing, params);
        money::clamp(fair.min(cap), lo, hi)
    };

    (quote(v_a, v_b), quote(v_b, v_a))
}

// ============================================================================
// Multi-sided
// ============================================================================

/// Blended win probabilities for a multi-sided market.
///
/// Market-implied weights are `max(0.1, total - v_i + 1)`, so a participant
/// holding less of the pool is weighted up. The result is
/// `s / N + (1 - s) * implied_i`, which sums to one before truncation.
pub fn multi_sided_probabilities(volumes: &[(Uuid, Decimal)]) -> Vec<(Uuid, Decimal)> {
    if volumes.is_empty() {
        return Vec::new();
    }

    let n = Decimal::from(volumes.len() as u64);
    let total: Decimal = volumes.iter().map(|(_, v)| *v).sum();
    let uniform = money::div(Decimal::ONE, n).unwrap_or(Decimal::ZERO);

    if total.is_zero() {
        return volumes.iter().map(|(id, _)| (*id, uniform)).collect();
    }

    let floor = Decimal::new(1, 1);
    let weights: Vec<(Uuid, Decimal)> = volumes
        .iter()
        .map(|(id, v)| (*id, (total - *v + Decimal::ONE).max(floor)))
        .collect();
    let weight_sum: Decimal = weights.iter().map(|(_, w)| *w).sum();

    let s = smoothing_weight(total);
    weights
        .into_iter()
        .map(|(id, w)| {
            let implied = money::div(w, weight_sum).unwrap_or(uniform);
            (id, money::truncate(s * uniform + (Decimal::ONE - s) * implied))
        })
        .collect()
}

/// Odds for every participant of a multi-sided market, in input order.
///
/// A market with no volume quotes `N * (1 - house_rate)` for everyone.
pub fn multi_sided_odds(volumes: &[(Uuid, Decimal)], params: &OddsParams) -> Vec<(Uuid, Decimal)> {
    let lo = params.min_odds;
    let hi = params.max_odds_multi;
    let total: Decimal = volumes.iter().map(|(_, v)| *v).sum();

    if total.is_zero() {
        let n = Decimal::from(volumes.len() as u64);
        let cold = money::clamp(money::mul(n, params.keep_rate()), lo, hi);
        return volumes.iter().map(|(id, _)| (*id, cold)).collect();
    }

    multi_sided_probabilities(volumes)
        .into_iter()
        .map(|(id, p)| (id, money::clamp(params.odds_from_probability(p, hi), lo, hi)))
        .collect()
}
