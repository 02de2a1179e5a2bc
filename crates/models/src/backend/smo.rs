//! Sequential minimal optimization for epsilon-support vector regression.
//!
//! The dual is posed over `2l` variables: `alpha[i]` and `alpha[i + l]` are
//! the multipliers of the upper and lower tube constraint of sample `i`.
//! Working pairs are chosen with second-order (maximal gain) selection and
//! kernel rows are served from an LRU cache.

use lru::LruCache;
use sdb_core::{Error, Result};
use std::num::NonZeroUsize;
use std::sync::Arc;

const TAU: f64 = 1e-12;

/// Lazily evaluated kernel matrix over the training samples
pub(crate) struct KernelCache<F: Fn(usize, usize) -> f64> {
    eval: F,
    l: usize,
    rows: LruCache<usize, Arc<[f64]>>,
    diag: Vec<f64>,
}

impl<F: Fn(usize, usize) -> f64> KernelCache<F> {
    /// `cache_mb` bounds the memory held by cached rows (at least two rows
    /// are always kept).
    pub(crate) fn new(l: usize, cache_mb: usize, eval: F) -> Self {
        let row_bytes = (l * std::mem::size_of::<f64>()).max(1);
        let capacity = (cache_mb.saturating_mul(1 << 20) / row_bytes).clamp(2, l.max(2));
        let diag = (0..l).map(|i| eval(i, i)).collect();
        Self {
            eval,
            l,
            rows: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
            diag,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.rows.cap().get()
    }

    fn row(&mut self, i: usize) -> Arc<[f64]> {
        if let Some(row) = self.rows.get(&i) {
            return Arc::clone(row);
        }
        let row: Arc<[f64]> = (0..self.l).map(|j| (self.eval)(i, j)).collect();
        self.rows.put(i, Arc::clone(&row));
        row
    }

    fn diag(&self, i: usize) -> f64 {
        self.diag[i]
    }
}

/// Dual solution: one expansion coefficient per training sample and the bias
pub(crate) struct Solution {
    pub coef: Vec<f64>,
    pub rho: f64,
    pub iterations: usize,
}

/// Solve the epsilon-SVR dual for targets `z`
pub(crate) fn solve<F: Fn(usize, usize) -> f64>(
    kernel: &mut KernelCache<F>,
    z: &[f64],
    c: f64,
    epsilon: f64,
    tolerance: f64,
) -> Result<Solution> {
    let l = z.len();
    let n = 2 * l;
    let sign = |t: usize| if t < l { 1.0 } else { -1.0 };

    let mut alpha = vec![0.0_f64; n];
    // Gradient of the dual objective at alpha = 0 is the linear term
    let mut grad: Vec<f64> = (0..n)
        .map(|t| if t < l { epsilon - z[t] } else { epsilon + z[t - l] })
        .collect();

    let max_iter = 10_000_000usize.max(l.saturating_mul(100));
    let mut iterations = 0;

    while iterations < max_iter {
        let Some((i, j)) = select_working_set(kernel, &alpha, &grad, c, tolerance, l) else {
            break;
        };
        iterations += 1;

        let (si, sj) = (sign(i), sign(j));
        let row_i = kernel.row(i % l);
        let row_j = kernel.row(j % l);
        let k_ij = row_i[j % l];
        let mut quad = kernel.diag(i % l) + kernel.diag(j % l) - 2.0 * k_ij;
        if quad <= 0.0 {
            quad = TAU;
        }

        let (old_i, old_j) = (alpha[i], alpha[j]);
        if si != sj {
            let delta = (-grad[i] - grad[j]) / quad;
            let diff = alpha[i] - alpha[j];
            alpha[i] += delta;
            alpha[j] += delta;
            if diff > 0.0 {
                if alpha[j] < 0.0 {
                    alpha[j] = 0.0;
                    alpha[i] = diff;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = -diff;
            }
            if diff > 0.0 {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = c - diff;
                }
            } else if alpha[j] > c {
                alpha[j] = c;
                alpha[i] = c + diff;
            }
        } else {
            let delta = (grad[i] - grad[j]) / quad;
            let sum = alpha[i] + alpha[j];
            alpha[i] -= delta;
            alpha[j] += delta;
            if sum > c {
                if alpha[i] > c {
                    alpha[i] = c;
                    alpha[j] = sum - c;
                }
            } else if alpha[j] < 0.0 {
                alpha[j] = 0.0;
                alpha[i] = sum;
            }
            if sum > c {
                if alpha[j] > c {
                    alpha[j] = c;
                    alpha[i] = sum - c;
                }
            } else if alpha[i] < 0.0 {
                alpha[i] = 0.0;
                alpha[j] = sum;
            }
        }

        let d_i = alpha[i] - old_i;
        let d_j = alpha[j] - old_j;
        for (t, g) in grad.iter_mut().enumerate() {
            let st = sign(t);
            let k = t % l;
            *g += si * st * row_i[k] * d_i + sj * st * row_j[k] * d_j;
        }
    }

    if iterations >= max_iter {
        tracing::warn!(iterations, "SMO reached the iteration limit before converging");
    }

    let rho = bias(&alpha, &grad, c, l);
    let coef: Vec<f64> = (0..l).map(|s| alpha[s] - alpha[s + l]).collect();
    if !rho.is_finite() || coef.iter().any(|v| !v.is_finite()) {
        return Err(Error::Fit {
            stage: "fit",
            reason: "support vector solver diverged".into(),
        });
    }

    Ok(Solution {
        coef,
        rho,
        iterations,
    })
}

/// Second-order working set selection; `None` once the KKT gap is below
/// `tolerance`.
fn select_working_set<F: Fn(usize, usize) -> f64>(
    kernel: &mut KernelCache<F>,
    alpha: &[f64],
    grad: &[f64],
    c: f64,
    tolerance: f64,
    l: usize,
) -> Option<(usize, usize)> {
    let upper = |t: usize| t < l;

    let mut g_max = f64::NEG_INFINITY;
    let mut i_sel = None;
    for t in 0..alpha.len() {
        if upper(t) {
            if alpha[t] < c && -grad[t] >= g_max {
                g_max = -grad[t];
                i_sel = Some(t);
            }
        } else if alpha[t] > 0.0 && grad[t] >= g_max {
            g_max = grad[t];
            i_sel = Some(t);
        }
    }

    let i = i_sel?;
    let row_i = kernel.row(i % l);
    let k_ii = kernel.diag(i % l);

    let mut g_max2 = f64::NEG_INFINITY;
    let mut j_sel = None;
    let mut best_obj = f64::INFINITY;
    for t in 0..alpha.len() {
        let grad_diff = if upper(t) {
            if alpha[t] <= 0.0 {
                continue;
            }
            g_max2 = g_max2.max(grad[t]);
            g_max + grad[t]
        } else {
            if alpha[t] >= c {
                continue;
            }
            g_max2 = g_max2.max(-grad[t]);
            g_max - grad[t]
        };

        if grad_diff > 0.0 {
            let mut quad = k_ii + kernel.diag(t % l) - 2.0 * row_i[t % l];
            if quad <= 0.0 {
                quad = TAU;
            }
            let obj = -(grad_diff * grad_diff) / quad;
            if obj <= best_obj {
                best_obj = obj;
                j_sel = Some(t);
            }
        }
    }

    if g_max + g_max2 < tolerance {
        return None;
    }
    j_sel.map(|j| (i, j))
}

/// Bias from the free variables, or the midpoint of the feasible interval
/// when every variable sits at a bound.
fn bias(alpha: &[f64], grad: &[f64], c: f64, l: usize) -> f64 {
    let mut ub = f64::INFINITY;
    let mut lb = f64::NEG_INFINITY;
    let mut free_sum = 0.0;
    let mut free = 0usize;

    for t in 0..alpha.len() {
        let positive = t < l;
        let y_grad = if positive { grad[t] } else { -grad[t] };
        if alpha[t] >= c {
            if positive {
                lb = lb.max(y_grad);
            } else {
                ub = ub.min(y_grad);
            }
        } else if alpha[t] <= 0.0 {
            if positive {
                ub = ub.min(y_grad);
            } else {
                lb = lb.max(y_grad);
            }
        } else {
            free += 1;
            free_sum += y_grad;
        }
    }

    if free > 0 {
        free_sum / free as f64
    } else {
        (ub + lb) / 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn linear_kernel(x: &[f64]) -> impl Fn(usize, usize) -> f64 + '_ {
        move |i, j| x[i] * x[j]
    }

    #[test]
    fn test_fits_line_within_tube() {
        let x = [0.0, 1.0, 2.0, 3.0, 4.0];
        let z: Vec<f64> = x.iter().map(|v| -2.0 * v - 1.0).collect();
        let mut kernel = KernelCache::new(x.len(), 1, linear_kernel(&x));
        let solution = solve(&mut kernel, &z, 100.0, 0.01, 1e-6).unwrap();

        for (s, &target) in z.iter().enumerate() {
            let f: f64 = solution
                .coef
                .iter()
                .enumerate()
                .map(|(t, a)| a * x[t] * x[s])
                .sum::<f64>()
                - solution.rho;
            assert_relative_eq!(f, target, epsilon = 0.02);
        }
    }

    #[test]
    fn test_coefficients_balance() {
        let x = [0.5, 1.5, 2.5, 3.0];
        let z = [-1.0, -4.0, -2.0, -6.0];
        let mut kernel = KernelCache::new(4, 1, linear_kernel(&x));
        let solution = solve(&mut kernel, &z, 10.0, 0.1, 1e-4).unwrap();
        // Equality constraint of the dual
        assert_relative_eq!(solution.coef.iter().sum::<f64>(), 0.0, epsilon = 1e-9);
        assert!(solution.coef.iter().all(|a| a.abs() <= 10.0 + 1e-9));
    }

    #[test]
    fn test_constant_target_inside_tube() {
        let x: [f64; 3] = [1.0, 2.0, 3.0];
        let z = [-5.0, -5.0, -5.0];
        let mut kernel = KernelCache::new(3, 1, |i, j| (-(x[i] - x[j]).powi(2)).exp());
        let solution = solve(&mut kernel, &z, 1000.0, 0.1, 1e-3).unwrap();
        for s in 0..3 {
            let f: f64 = (0..3)
                .map(|t| solution.coef[t] * (-(x[t] - x[s]).powi(2)).exp())
                .sum::<f64>()
                - solution.rho;
            assert_relative_eq!(f, -5.0, epsilon = 0.11);
        }
    }

    #[test]
    fn test_cache_capacity_bounds() {
        let kernel = KernelCache::new(1000, 0, |_, _| 1.0);
        assert_eq!(kernel.capacity(), 2);
        let kernel = KernelCache::new(10, 8000, |_, _| 1.0);
        assert_eq!(kernel.capacity(), 10);
    }
}
