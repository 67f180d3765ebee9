//! Full-quantile normalization of value groups

use rayon::prelude::*;

use crate::stats::{quantile_sorted, sort_order};

/// Probability of rank `k` among `n` sorted values
fn rank_prob(k: usize, n: usize) -> f64 {
    if n <= 1 {
        0.5
    } else {
        k as f64 / (n - 1) as f64
    }
}

/// Force every group onto a common distribution.
///
/// The reference distribution is the mean, rank by rank, of the groups'
/// sorted values. Groups of unequal size are compared through their quantile
/// functions on a grid as long as the largest group, and a value of rank `r`
/// in a group of size `n` receives the reference quantile at `r / (n - 1)`.
/// For equal-sized groups this is the classic algorithm: after normalization
/// every group holds exactly the same sorted values.
///
/// Ranks are ordinal; ties keep their input order.
pub fn full_quantile(groups: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let non_empty = groups.iter().filter(|g| !g.is_empty()).count();
    if non_empty <= 1 {
        return groups.to_vec();
    }

    // Independent per-group sorts
    let orders: Vec<Vec<usize>> = groups.par_iter().map(|g| sort_order(g)).collect();
    let sorted: Vec<Vec<f64>> = groups
        .iter()
        .zip(&orders)
        .map(|(g, order)| order.iter().map(|&i| g[i]).collect())
        .collect();

    // Synchronisation point: the reference needs every sorted group
    let n_ref = sorted.iter().map(Vec::len).max().unwrap_or(0);
    let reference: Vec<f64> = (0..n_ref)
        .map(|k| {
            let p = rank_prob(k, n_ref);
            let total: f64 = sorted
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| {
                    if s.len() == n_ref {
                        s[k]
                    } else {
                        quantile_sorted(s, p)
                    }
                })
                .sum();
            total / non_empty as f64
        })
        .collect();

    groups
        .par_iter()
        .zip(orders.par_iter())
        .map(|(g, order)| {
            let n = g.len();
            let mut out = vec![0.0; n];
            for (rank, &idx) in order.iter().enumerate() {
                out[idx] = if n == n_ref {
                    reference[rank]
                } else {
                    quantile_sorted(&reference, rank_prob(rank, n))
                };
            }
            out
        })
        .collect()
}

/// Full-quantile normalize the positions of `values` listed in each group,
/// leaving other positions untouched.
pub(crate) fn full_quantile_within(values: &[f64], groups: &[Vec<usize>]) -> Vec<f64> {
    let gathered: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| g.iter().map(|&i| values[i]).collect())
        .collect();
    let normalized = full_quantile(&gathered);

    let mut out = values.to_vec();
    for (group, group_values) in groups.iter().zip(normalized) {
        for (&i, v) in group.iter().zip(group_values) {
            out[i] = v;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_equal_sizes() {
        // Textbook example: columns (5,2,3,4), (4,1,4,2), (3,4,6,8)
        let groups = vec![
            vec![5.0, 2.0, 3.0, 4.0],
            vec![4.0, 1.0, 4.0, 2.0],
            vec![3.0, 4.0, 6.0, 8.0],
        ];
        let out = full_quantile(&groups);
        // Reference: mean of sorted columns = [2, 3, 4.666.., 5.666..]
        let reference = [2.0, 3.0, 14.0 / 3.0, 17.0 / 3.0];
        for col in &out {
            let mut s = col.clone();
            s.sort_by(f64::total_cmp);
            for (a, b) in s.iter().zip(&reference) {
                assert!((a - b).abs() < 1e-12);
            }
        }
        // Rank structure kept: largest of first column is still largest
        assert!((out[0][0] - 17.0 / 3.0).abs() < 1e-12);
        assert!((out[2][0] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_unequal_sizes_share_distribution() {
        let groups = vec![vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 30.0, 40.0, 50.0]];
        let out = full_quantile(&groups);
        // Extremes map to the extremes of the reference
        assert!((out[0][0] - out[1][0]).abs() < 1e-12);
        assert!((out[0][2] - out[1][4]).abs() < 1e-12);
        // Medians agree
        assert!((out[0][1] - out[1][2]).abs() < 1e-12);
    }

    #[test]
    fn test_single_group_unchanged() {
        let groups = vec![vec![3.0, 1.0, 2.0]];
        assert_eq!(full_quantile(&groups), groups);
    }

    #[test]
    fn test_within_scatter() {
        let values = vec![1.0, 10.0, 2.0, 20.0, 99.0];
        let groups = vec![vec![0, 2], vec![1, 3]];
        let out = full_quantile_within(&values, &groups);
        assert!((out[0] - 5.5).abs() < 1e-12);
        assert!((out[1] - 5.5).abs() < 1e-12);
        assert!((out[2] - 11.0).abs() < 1e-12);
        assert!((out[3] - 11.0).abs() < 1e-12);
        assert_eq!(out[4], 99.0);
    }
}
