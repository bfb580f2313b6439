//! KKT termination testing (spec §4.4, §4.5): given an iterate, its
//! multipliers, and the working-set labels a QP solve produced, computes the
//! four violation measures [`crate::types::OptimalityStatus`] bundles.
//!
//! Follows the `L = f - lambda^T c - z^T x` Lagrangian sign convention
//! declared in [`crate::nlp::Nlp::hessian_values`]: stationarity is
//! `grad f - J^T lambda - z`, and a multiplier's required sign at an active
//! bound follows from that same convention.

use faer::Col;

use crate::error::DriverError;
use crate::sparse::Triplet;
use crate::types::{is_infinite_bound, ActiveType, OptimalityStatus};
use crate::E;

#[allow(clippy::too_many_arguments)]
pub fn check_optimality(
    x: &Col<E>,
    x_l: &Col<E>,
    x_u: &Col<E>,
    c: &Col<E>,
    c_l: &Col<E>,
    c_u: &Col<E>,
    grad_f: &Col<E>,
    jacobian: &Triplet,
    lambda_c: &Col<E>,
    lambda_b: &Col<E>,
    bound_ws: &[ActiveType],
    constraint_ws: &[ActiveType],
) -> Result<OptimalityStatus, DriverError> {
    let n = x.nrows();
    let m = c.nrows();

    let mut stat = Col::<E>::zeros(n);
    for i in 0..n {
        stat[i] = grad_f[i] - lambda_b[i];
    }
    jacobian
        .multiply_transpose(lambda_c.as_ref(), &mut stat, -1.0)
        .map_err(|_| DriverError::InvalidWorkingSet)?;
    let stationarity_violation = (0..n).fold(0.0_f64, |acc, i| acc.max(stat[i].abs()));

    let mut primal_violation: E = 0.0;
    for i in 0..n {
        primal_violation = primal_violation
            .max((x_l[i] - x[i]).max(0.0))
            .max((x[i] - x_u[i]).max(0.0));
        if (bound_ws[i] == ActiveType::ActiveBelow && is_infinite_bound(x_l[i]))
            || (bound_ws[i] == ActiveType::ActiveAbove && is_infinite_bound(x_u[i]))
        {
            return Err(DriverError::InvalidWorkingSet);
        }
    }
    for i in 0..m {
        primal_violation = primal_violation
            .max((c_l[i] - c[i]).max(0.0))
            .max((c[i] - c_u[i]).max(0.0));
        if (constraint_ws[i] == ActiveType::ActiveBelow && is_infinite_bound(c_l[i]))
            || (constraint_ws[i] == ActiveType::ActiveAbove && is_infinite_bound(c_u[i]))
        {
            return Err(DriverError::InvalidWorkingSet);
        }
    }

    let mut dual_violation: E = 0.0;
    for i in 0..n {
        dual_violation = dual_violation.max(match bound_ws[i] {
            ActiveType::ActiveBelow => (-lambda_b[i]).max(0.0),
            ActiveType::ActiveAbove => lambda_b[i].max(0.0),
            ActiveType::Inactive => lambda_b[i].abs(),
            ActiveType::ActiveBothSide => 0.0,
        });
    }
    for i in 0..m {
        dual_violation = dual_violation.max(match constraint_ws[i] {
            ActiveType::ActiveBelow => (-lambda_c[i]).max(0.0),
            ActiveType::ActiveAbove => lambda_c[i].max(0.0),
            ActiveType::Inactive => lambda_c[i].abs(),
            ActiveType::ActiveBothSide => 0.0,
        });
    }

    let mut complementarity_violation: E = 0.0;
    for i in 0..n {
        let dist = match bound_ws[i] {
            ActiveType::ActiveBelow => x[i] - x_l[i],
            ActiveType::ActiveAbove => x_u[i] - x[i],
            _ => 0.0,
        };
        complementarity_violation = complementarity_violation.max((lambda_b[i] * dist).abs());
    }
    for i in 0..m {
        let dist = match constraint_ws[i] {
            ActiveType::ActiveBelow => c[i] - c_l[i],
            ActiveType::ActiveAbove => c_u[i] - c[i],
            _ => 0.0,
        };
        complementarity_violation = complementarity_violation.max((lambda_c[i] * dist).abs());
    }

    Ok(OptimalityStatus {
        primal_violation,
        dual_violation,
        complementarity_violation,
        stationarity_violation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unconstrained_stationary_point_is_optimal() {
        let x = Col::<E>::from_fn(2, |i| i as E);
        let bounds = Col::<E>::from_fn(2, |_| -1e18);
        let ubounds = Col::<E>::from_fn(2, |_| 1e18);
        let c = Col::<E>::zeros(0);
        let c_l = Col::<E>::zeros(0);
        let c_u = Col::<E>::zeros(0);
        let grad_f = Col::<E>::zeros(2);
        let jacobian = Triplet::new(0, 2, false);
        let lambda_c = Col::<E>::zeros(0);
        let lambda_b = Col::<E>::zeros(2);

        let status = check_optimality(
            &x, &bounds, &ubounds, &c, &c_l, &c_u, &grad_f, &jacobian, &lambda_c, &lambda_b, &[ActiveType::Inactive; 2], &[],
        )
        .unwrap();
        assert!(status.is_optimal(1e-5, 1e-6, 1e-6, 1e-5));
    }

    #[test]
    fn inconsistent_working_set_on_infinite_bound_is_rejected() {
        let x = Col::<E>::from_fn(1, |_| 0.0);
        let x_l = Col::<E>::from_fn(1, |_| -1e18);
        let x_u = Col::<E>::from_fn(1, |_| 1e18);
        let c = Col::<E>::zeros(0);
        let c_l = Col::<E>::zeros(0);
        let c_u = Col::<E>::zeros(0);
        let grad_f = Col::<E>::zeros(1);
        let jacobian = Triplet::new(0, 1, false);
        let lambda_c = Col::<E>::zeros(0);
        let lambda_b = Col::<E>::zeros(1);

        let result = check_optimality(
            &x, &x_l, &x_u, &c, &c_l, &c_u, &grad_f, &jacobian, &lambda_c, &lambda_b, &[ActiveType::ActiveBelow], &[],
        );
        assert_eq!(result, Err(DriverError::InvalidWorkingSet));
    }
}
