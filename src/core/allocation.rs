//! Slot apportionment by the largest-remainder method.

use std::collections::BTreeMap;

use crate::core::mix::Ratios;

/// Fixed-point resolution of a ratio. Apportionment runs on integers so that
/// remainders which are equal in exact arithmetic compare equal.
const RATIO_SCALE: f64 = 1e9;

/// Split `slots` across categories in proportion to `ratios`.
///
/// Each category first receives `floor(ratio × slots)`; the leftover slots go
/// one at a time to the largest fractional remainders, ties broken by category
/// name. Ratios are normalised by their sum, so the result always totals
/// `slots` exactly. Categories with a zero ratio still appear with count zero.
pub fn largest_remainder(ratios: &Ratios, slots: usize) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = ratios.keys().map(|k| (k.clone(), 0)).collect();
    let total: f64 = ratios.values().filter(|r| r.is_finite() && **r > 0.0).sum();
    if slots == 0 || total <= 0.0 {
        return counts;
    }

    let weights: Vec<(&str, u128)> = ratios
        .iter()
        .map(|(category, ratio)| {
            let weight = if ratio.is_finite() && *ratio > 0.0 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let scaled = (*ratio / total * RATIO_SCALE).round() as u128;
                scaled
            } else {
                0
            };
            (category.as_str(), weight)
        })
        .collect();
    let denominator: u128 = weights.iter().map(|(_, w)| w).sum();
    if denominator == 0 {
        return counts;
    }

    let n = slots as u128;
    let mut remainders: Vec<(&str, u128)> = Vec::with_capacity(weights.len());
    let mut assigned = 0usize;
    for (category, weight) in weights {
        let share = weight * n;
        #[allow(clippy::cast_possible_truncation)]
        let whole = (share / denominator) as usize;
        assigned += whole;
        counts.insert(category.to_string(), whole);
        remainders.push((category, share % denominator));
    }

    // BTreeMap iteration is name-ordered and sort_by is stable, so equal
    // remainders keep name order.
    remainders.sort_by(|a, b| b.1.cmp(&a.1));
    for (category, _) in remainders.into_iter().take(slots.saturating_sub(assigned)) {
        if let Some(count) = counts.get_mut(category) {
            *count += 1;
        }
    }
    counts
}

/// Lay out per-category counts over a sequence of slots so categories
/// interleave rather than clump (smooth weighted round-robin).
///
/// The output has exactly `Σ counts` entries and each category appears
/// exactly its count. Ties go to the category that sorts first by name.
pub fn interleave(counts: &BTreeMap<String, usize>) -> Vec<String> {
    let total: usize = counts.values().sum();
    #[allow(clippy::cast_possible_wrap)]
    let total_weight = total as i64;
    // (name, running weight, static weight)
    let mut current: Vec<(&str, i64, i64)> = counts
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(name, n)| {
            #[allow(clippy::cast_possible_wrap)]
            let weight = *n as i64;
            (name.as_str(), 0i64, weight)
        })
        .collect();

    let mut order = Vec::with_capacity(total);
    for _ in 0..total {
        for entry in &mut current {
            entry.1 += entry.2;
        }
        let mut pick = 0;
        for idx in 1..current.len() {
            if current[idx].1 > current[pick].1 {
                pick = idx;
            }
        }
        current[pick].1 -= total_weight;
        order.push(current[pick].0.to_string());
    }
    order
}
