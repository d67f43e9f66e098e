// SPDX-License-Identifier: MIT
//
// Dense Newton corrector for the implicit BDF step. Jacobian is built by
// forward finite differences and factored with `nalgebra`'s LU each
// iteration — adequate for the small state counts this adapter targets
// (a handful of continuous states per model instance).

use nalgebra::{DMatrix, DVector};

pub const MAX_ITERATIONS: usize = 20;
pub const CONVERGENCE_TOL: f64 = 1e-9;
const FD_EPS: f64 = 1e-7;

/// Solves `residual(x) = 0` starting from `x0`, returning the converged
/// vector or `None` if the iteration fails to converge within
/// `MAX_ITERATIONS`. `residual` is `FnMut` rather than `Fn` since callers
/// typically close over a `&mut` callback into a model.
pub fn solve<F>(x0: &DVector<f64>, mut residual: F) -> Option<DVector<f64>>
where
    F: FnMut(&DVector<f64>) -> DVector<f64>,
{
    let n = x0.len();
    if n == 0 {
        return Some(x0.clone());
    }

    let mut x = x0.clone();
    for _ in 0..MAX_ITERATIONS {
        let f0 = residual(&x);
        if f0.norm() < CONVERGENCE_TOL {
            return Some(x);
        }

        let jac = finite_difference_jacobian(&x, &f0, &mut residual);
        let lu = jac.lu();
        let delta = lu.solve(&f0)?;
        x -= &delta;

        if delta.norm() < CONVERGENCE_TOL {
            return Some(x);
        }
    }
    None
}

fn finite_difference_jacobian<F>(x: &DVector<f64>, f0: &DVector<f64>, residual: &mut F) -> DMatrix<f64>
where
    F: FnMut(&DVector<f64>) -> DVector<f64>,
{
    let n = x.len();
    let mut jac = DMatrix::zeros(n, n);
    for j in 0..n {
        let step = FD_EPS * x[j].abs().max(1.0);
        let mut perturbed = x.clone();
        perturbed[j] += step;
        let f1 = residual(&perturbed);
        for i in 0..n {
            jac[(i, j)] = (f1[i] - f0[i]) / step;
        }
    }
    jac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_linear_system() {
        // x - b = 0, b = [1, 2]
        let target = DVector::from_vec(vec![1.0, 2.0]);
        let x0 = DVector::from_vec(vec![0.0, 0.0]);
        let result = solve(&x0, |x| x - &target).unwrap();
        assert!((result[0] - 1.0).abs() < 1e-6);
        assert!((result[1] - 2.0).abs() < 1e-6);
    }

    #[test]
    fn empty_state_solves_trivially() {
        let x0 = DVector::<f64>::zeros(0);
        let result = solve(&x0, |x| x.clone()).unwrap();
        assert_eq!(result.len(), 0);
    }
}
