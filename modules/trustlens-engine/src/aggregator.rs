//! Trust score aggregation. Pure math, no I/O.

use chrono::{DateTime, NaiveDate, Utc};

use trustlens_common::{Claim, TrustPoint};

/// Claim-age half-life: a 180-day-old claim counts half as much as one
/// made today.
const HALF_LIFE_DAYS: f64 = 180.0;

/// Score assigned to a claim whose verification timed out. Below neutral
/// so unverifiable claims drag the mean down rather than anchoring it.
pub const TIMEOUT_SCORE: f64 = 40.0;

/// Age-decay weight for a claim. Monotonically non-increasing with age;
/// future-dated claims clamp to weight 1.
pub fn decay_weight(age_days: f64) -> f64 {
    0.5_f64.powf(age_days.max(0.0) / HALF_LIFE_DAYS)
}

/// Current trust score: recency-weighted mean of per-claim trust scores.
/// No claims means no signal either way, so neutral 50.
pub fn current_score(claims: &[Claim], as_of: DateTime<Utc>) -> f64 {
    if claims.is_empty() {
        return 50.0;
    }

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for claim in claims {
        let age_days = (as_of - claim.observed_at).num_seconds() as f64 / 86_400.0;
        let w = decay_weight(age_days);
        weighted_sum += claim.trust_score * w;
        weight_total += w;
    }

    (weighted_sum / weight_total).clamp(0.0, 100.0)
}

/// Append one history point for `date`. If a point for the same calendar
/// day already exists it is replaced (idempotent per day); older points
/// are never rewritten.
pub fn append_history(history: &mut Vec<TrustPoint>, date: NaiveDate, score: f64) {
    if let Some(existing) = history.iter_mut().find(|p| p.date == date) {
        existing.score = score;
        return;
    }
    history.push(TrustPoint { date, score });
    history.sort_by_key(|p| p.date);
}
