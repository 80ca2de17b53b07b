//! Pure naming functions for parameterised gauge families.
//!
//! Families whose parameter is a number (fee-estimate targets, hash-rate
//! windows) get one metric *name* per parameter rather than a label, so
//! each member is its own unlabeled gauge.

/// Hash-rate window the daemon uses when none is given. Its gauge keeps
/// the bare family name.
pub const DEFAULT_HASHPS_WINDOW: i64 = 120;

/// `base_N` for non-negative parameters, `base_negN` for negative ones.
pub fn suffixed_metric_name(base: &str, param: i64) -> String {
    if param < 0 {
        format!("{base}_neg{}", param.unsigned_abs())
    } else {
        format!("{base}_{param}")
    }
}

/// Name of the hash-rate gauge for `window` blocks.
///
/// The default window maps to `base` itself; `-1` (since the last
/// difficulty change) maps to `base_neg1`; anything else to `base_N`.
pub fn hashps_metric_name(base: &str, window: i64) -> String {
    if window == DEFAULT_HASHPS_WINDOW {
        base.to_string()
    } else {
        suffixed_metric_name(base, window)
    }
}
