//! CART regression tree used by the random forest.
//!
//! The tree is stored as a flat arena of [`Node`] values with index 0 as the
//! root and grown iteratively, so deep trees on sorted data cannot exhaust
//! the stack. Trees are grown until every leaf is pure or its samples can no
//! longer be separated by any feature.

use super::forest::SplitCriterion;
use ndarray::{ArrayView1, ArrayView2};

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Targets shared by all trees of a forest, with the value ranks the
/// absolute-error criterion needs.
pub(crate) struct Targets<'a> {
    values: ArrayView1<'a, f64>,
    ranks: Vec<usize>,
    by_rank: Vec<f64>,
}

impl<'a> Targets<'a> {
    pub(crate) fn new(values: ArrayView1<'a, f64>) -> Self {
        let mut by_rank: Vec<f64> = values.to_vec();
        by_rank.sort_by(|a, b| a.total_cmp(b));
        by_rank.dedup();
        let ranks = values
            .iter()
            .map(|v| by_rank.partition_point(|r| r < v))
            .collect();
        Self {
            values,
            ranks,
            by_rank,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct RegressionTree {
    nodes: Vec<Node>,
}

struct Split {
    feature: usize,
    threshold: f64,
    cost: f64,
}

impl RegressionTree {
    /// Grow a tree on the rows listed in `samples` (repeats allowed).
    pub(crate) fn fit(
        x: &ArrayView2<'_, f64>,
        targets: &Targets<'_>,
        samples: Vec<usize>,
        criterion: SplitCriterion,
    ) -> Self {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let mut pending = vec![(0usize, samples)];

        while let Some((slot, indices)) = pending.pop() {
            let value = leaf_value(targets, &indices, criterion);
            let split = if is_pure(targets, &indices) {
                None
            } else {
                best_split(x, targets, &indices, criterion)
            };

            match split {
                None => nodes[slot] = Node::Leaf { value },
                Some(split) => {
                    let (left, right): (Vec<usize>, Vec<usize>) = indices
                        .iter()
                        .partition(|&&i| x[[i, split.feature]] <= split.threshold);
                    let left_slot = nodes.len();
                    let right_slot = left_slot + 1;
                    nodes.push(Node::Leaf { value });
                    nodes.push(Node::Leaf { value });
                    nodes[slot] = Node::Split {
                        feature: split.feature,
                        threshold: split.threshold,
                        left: left_slot,
                        right: right_slot,
                    };
                    pending.push((right_slot, right));
                    pending.push((left_slot, left));
                }
            }
        }

        Self { nodes }
    }

    pub(crate) fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    #[cfg(test)]
    fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

fn is_pure(targets: &Targets<'_>, indices: &[usize]) -> bool {
    let first = targets.values[indices[0]];
    indices.iter().all(|&i| targets.values[i] == first)
}

fn leaf_value(targets: &Targets<'_>, indices: &[usize], criterion: SplitCriterion) -> f64 {
    match criterion {
        SplitCriterion::SquaredError => {
            indices.iter().map(|&i| targets.values[i]).sum::<f64>() / indices.len() as f64
        }
        SplitCriterion::AbsoluteError => {
            let mut v: Vec<f64> = indices.iter().map(|&i| targets.values[i]).collect();
            v.sort_by(|a, b| a.total_cmp(b));
            let mid = v.len() / 2;
            if v.len() % 2 == 0 {
                (v[mid - 1] + v[mid]) / 2.0
            } else {
                v[mid]
            }
        }
    }
}

/// Lowest-cost threshold over all features, or `None` when no feature
/// separates the samples.
fn best_split(
    x: &ArrayView2<'_, f64>,
    targets: &Targets<'_>,
    indices: &[usize],
    criterion: SplitCriterion,
) -> Option<Split> {
    let mut best: Option<Split> = None;
    let mut order = indices.to_vec();

    for feature in 0..x.ncols() {
        order.sort_by(|&a, &b| x[[a, feature]].total_cmp(&x[[b, feature]]));
        let first = x[[order[0], feature]];
        let last = x[[order[order.len() - 1], feature]];
        if first == last {
            continue;
        }

        let candidate = match criterion {
            SplitCriterion::SquaredError => scan_squared(x, targets, &order, feature),
            SplitCriterion::AbsoluteError => scan_absolute(x, targets, &order, feature),
        };
        if let Some(split) = candidate {
            if best.as_ref().map_or(true, |b| split.cost < b.cost) {
                best = Some(split);
            }
        }
    }
    best
}

fn threshold_between(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    // Adjacent floats: the midpoint can round up to `hi`
    if mid >= hi {
        lo
    } else {
        mid
    }
}

fn scan_squared(
    x: &ArrayView2<'_, f64>,
    targets: &Targets<'_>,
    order: &[usize],
    feature: usize,
) -> Option<Split> {
    let n = order.len();
    let (total, total_sq) = order.iter().fold((0.0, 0.0), |(s, q), &i| {
        let y = targets.values[i];
        (s + y, q + y * y)
    });

    let (mut sum, mut sq) = (0.0, 0.0);
    let mut best: Option<Split> = None;
    for k in 1..n {
        let y = targets.values[order[k - 1]];
        sum += y;
        sq += y * y;

        let lo = x[[order[k - 1], feature]];
        let hi = x[[order[k], feature]];
        if lo == hi {
            continue;
        }

        let nl = k as f64;
        let nr = (n - k) as f64;
        let left_sse = sq - sum * sum / nl;
        let right_sse = (total_sq - sq) - (total - sum) * (total - sum) / nr;
        let cost = left_sse + right_sse;
        if best.as_ref().map_or(true, |b| cost < b.cost) {
            best = Some(Split {
                feature,
                threshold: threshold_between(lo, hi),
                cost,
            });
        }
    }
    best
}

fn scan_absolute(
    x: &ArrayView2<'_, f64>,
    targets: &Targets<'_>,
    order: &[usize],
    feature: usize,
) -> Option<Split> {
    let n = order.len();
    let mut left = RankTree::new(&targets.by_rank);
    let mut right = RankTree::new(&targets.by_rank);
    for &i in order {
        right.insert(targets.ranks[i], 1.0);
    }

    let mut best: Option<Split> = None;
    for k in 1..n {
        let moved = order[k - 1];
        left.insert(targets.ranks[moved], 1.0);
        right.insert(targets.ranks[moved], -1.0);

        let lo = x[[order[k - 1], feature]];
        let hi = x[[order[k], feature]];
        if lo == hi {
            continue;
        }

        let cost = left.abs_deviation() + right.abs_deviation();
        if best.as_ref().map_or(true, |b| cost < b.cost) {
            best = Some(Split {
                feature,
                threshold: threshold_between(lo, hi),
                cost,
            });
        }
    }
    best
}

/// Fenwick tree over target ranks holding counts and value sums, giving the
/// sum of absolute deviations from the median in logarithmic time.
struct RankTree<'a> {
    by_rank: &'a [f64],
    counts: Vec<f64>,
    sums: Vec<f64>,
    total_count: f64,
    total_sum: f64,
}

impl<'a> RankTree<'a> {
    fn new(by_rank: &'a [f64]) -> Self {
        let m = by_rank.len();
        Self {
            by_rank,
            counts: vec![0.0; m + 1],
            sums: vec![0.0; m + 1],
            total_count: 0.0,
            total_sum: 0.0,
        }
    }

    /// Add (`weight = 1`) or remove (`weight = -1`) one value of `rank`
    fn insert(&mut self, rank: usize, weight: f64) {
        let value = self.by_rank[rank] * weight;
        self.total_count += weight;
        self.total_sum += value;
        let mut i = rank + 1;
        while i < self.counts.len() {
            self.counts[i] += weight;
            self.sums[i] += value;
            i += i & i.wrapping_neg();
        }
    }

    /// Count and sum of values with rank `<= rank`
    fn prefix(&self, rank: usize) -> (f64, f64) {
        let (mut count, mut sum) = (0.0, 0.0);
        let mut i = rank + 1;
        while i > 0 {
            count += self.counts[i];
            sum += self.sums[i];
            i -= i & i.wrapping_neg();
        }
        (count, sum)
    }

    /// Smallest rank whose prefix count reaches `k`
    fn select(&self, k: f64) -> usize {
        let mut pos = 0;
        let mut remaining = k;
        let mut step = (self.counts.len() - 1).next_power_of_two();
        while step > 0 {
            let next = pos + step;
            if next < self.counts.len() && self.counts[next] < remaining {
                pos = next;
                remaining -= self.counts[next];
            }
            step >>= 1;
        }
        pos.min(self.by_rank.len().saturating_sub(1))
    }

    fn abs_deviation(&self) -> f64 {
        if self.total_count < 0.5 {
            return 0.0;
        }
        let median_rank = self.select((self.total_count / 2.0).ceil());
        let median = self.by_rank[median_rank];
        let (below_count, below_sum) = self.prefix(median_rank);
        let above_count = self.total_count - below_count;
        let above_sum = self.total_sum - below_sum;
        (median * below_count - below_sum) + (above_sum - median * above_count)
    }
}
