//! Information measures used by split search.

/// Shannon entropy (base 2) of a class-count vector. Empty vectors and vectors
/// summing to zero have zero entropy.
pub fn entropy(counts: &[usize]) -> f64 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

/// Size-weighted mean entropy of a family of groups.
pub fn weighted_entropy(groups: &[&[usize]], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    groups
        .iter()
        .map(|counts| {
            let size: usize = counts.iter().sum();
            size as f64 / total as f64 * entropy(counts)
        })
        .sum()
}

/// Split information: entropy of the partition-size distribution.
pub fn split_information(sizes: &[usize]) -> f64 {
    entropy(sizes)
}

/// `gain / split_info`, or zero when either makes the ratio meaningless.
pub fn gain_ratio(gain: f64, split_info: f64) -> f64 {
    if split_info == 0.0 || gain <= 0.0 {
        0.0
    } else {
        gain / split_info
    }
}

/// Penalty subtracted from the gain of numeric attributes with `distinct`
/// observed values in a partition of `records`.
pub fn numeric_penalty(distinct: usize, records: usize) -> f64 {
    if distinct < 2 || records == 0 {
        return 0.0;
    }
    ((distinct - 1) as f64).log2() / records as f64
}

/// `log2(log2(size))`, the multiplier turning a gain ratio into an ultimate
/// gain ratio. Non-positive for `size <= 2`.
pub fn ultimate_multiplier(size: usize) -> f64 {
    (size as f64).log2().log2()
}
