//! Conversion between constraint form and generator form
//!
//! The two forms of a relation are interconverted through the Hilbert-basis
//! saturator:
//!
//! - constraints to basis: saturate the constraint system itself; the
//!   initial solutions and direction vectors returned are the generators.
//!   The basis is anchored at the first initial solution; every further
//!   initial solution is recorded as its difference from the anchor, so the
//!   anchored cone covers all of them.
//! - basis to constraints: saturate the polar system. A candidate row
//!   `(A, b)` is valid when `A*v + b >= 0` at every anchor and `A*d >= 0`
//!   along every direction, so each basis row is fed homogenized (its `b`
//!   appended) as a `>=` row over the `n+1` candidate coordinates. A
//!   returned direction and its negation together witness an equality.
//!
//! Saturator failures never escape: UNSAT flows back as infeasibility where
//! that is meaningful, and everything else degrades to "no information".

use crate::matrix::{Matrix, Row};
use karrlog_hilbert::{HilbertBasis, Saturation};
use num_rational::BigRational;
use num_traits::{One, Zero};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Handle on the saturator shared by all relations of one plugin.
#[derive(Clone)]
pub struct Dualizer {
    cancel: Arc<AtomicBool>,
}

impl Dualizer {
    pub fn new(cancel: Arc<AtomicBool>) -> Self {
        Self { cancel }
    }

    fn saturator(&self) -> HilbertBasis {
        let mut hb = HilbertBasis::new();
        hb.set_cancel(self.cancel.clone());
        hb
    }

    /// Constraint form to basis form. `None` means the constraints are
    /// infeasible; `Some` with an empty matrix means no information (top).
    pub fn constraints_to_basis(&self, src: &Matrix) -> Option<Matrix> {
        let n = src.width();
        let mut hb = self.saturator();
        for row in src.rows() {
            if row.is_eq {
                hb.add_eq(row.a.clone(), -row.b.clone());
            } else {
                hb.add_ge(row.a.clone(), -row.b.clone());
            }
        }
        for i in 0..n {
            hb.set_is_int(i);
        }

        let mut dst = Matrix::new(n);
        match hb.saturate() {
            Saturation::Unsat => return None,
            Saturation::Undef => return Some(dst),
            Saturation::Sat => {}
        }

        let mut anchor: Option<Vec<BigRational>> = None;
        for i in 0..hb.get_basis_size() {
            let (soln, is_initial) = hb.get_basis_solution(i);
            if is_initial {
                match &anchor {
                    None => {
                        dst.push(Row::new(soln.clone(), BigRational::one(), true));
                        anchor = Some(soln);
                    }
                    Some(first) => {
                        // further initial solutions become directions from
                        // the anchor
                        let diff: Vec<BigRational> =
                            soln.iter().zip(first).map(|(s, f)| s - f).collect();
                        if diff.iter().any(|x| !x.is_zero()) {
                            dst.push(Row::new(diff, BigRational::zero(), true));
                        }
                    }
                }
            } else {
                dst.push(Row::new(soln, BigRational::zero(), true));
            }
        }
        Some(dst)
    }

    /// Basis form to constraint form. An empty basis carries no
    /// information, so the result is empty (top); so is any saturator
    /// failure here.
    pub fn basis_to_constraints(&self, src: &Matrix) -> Matrix {
        let n = src.width();
        let mut dst = Matrix::new(n);
        if src.is_empty() {
            return dst;
        }
        let mut hb = self.saturator();
        for row in src.rows() {
            let mut v = row.a.clone();
            v.push(row.b.clone());
            hb.add_ge(v, BigRational::zero());
        }
        for i in 0..=n {
            hb.set_is_int(i);
        }
        if hb.saturate() != Saturation::Sat {
            return dst;
        }

        let mut pending: Vec<Vec<BigRational>> = Vec::new();
        for i in 0..hb.get_basis_size() {
            let (soln, is_initial) = hb.get_basis_solution(i);
            if is_initial || soln[..n].iter().all(Zero::is_zero) {
                continue;
            }
            pending.push(soln);
        }
        // a direction paired with its negation witnesses an equality
        let mut used = vec![false; pending.len()];
        for i in 0..pending.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            let neg: Vec<BigRational> = pending[i].iter().map(|x| -x).collect();
            let is_eq = match pending.iter().enumerate().find(|(j, s)| !used[*j] && **s == neg) {
                Some((j, _)) => {
                    used[j] = true;
                    true
                }
                None => false,
            };
            let soln = &pending[i];
            dst.push(Row::new(soln[..n].to_vec(), soln[n].clone(), is_eq));
        }
        dst
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dualizer() -> Dualizer {
        Dualizer::new(Arc::new(AtomicBool::new(false)))
    }

    fn rat(n: i64) -> BigRational {
        BigRational::from_integer(n.into())
    }

    fn row(a: &[i64], b: i64, is_eq: bool) -> Row {
        Row::new(a.iter().map(|&x| rat(x)).collect(), rat(b), is_eq)
    }

    /// Whether a concrete point satisfies every row of a constraint matrix.
    fn sat_point(m: &Matrix, p: &[i64]) -> bool {
        use num_traits::Signed;
        m.rows().iter().all(|r| {
            let v = r
                .a
                .iter()
                .zip(p)
                .map(|(c, &x)| c * rat(x))
                .sum::<BigRational>()
                + r.b.clone();
            if r.is_eq {
                v.is_zero()
            } else {
                !v.is_negative()
            }
        })
    }

    #[test]
    fn test_point_round_trip() {
        // x = 3, y = 5
        let mut m = Matrix::new(2);
        m.push(Row::pin(2, 0, 3));
        m.push(Row::pin(2, 1, 5));
        let dz = dualizer();
        let basis = dz.constraints_to_basis(&m).unwrap();
        assert_eq!(basis.len(), 1);
        assert_eq!(basis.rows()[0], row(&[3, 5], 1, true));
        let back = dz.basis_to_constraints(&basis);
        // the constraints must pin the point exactly
        assert!(sat_point(&back, &[3, 5]));
        for other in [[3, 4], [2, 5], [0, 0], [4, 6]] {
            assert!(!sat_point(&back, &other), "{back} admits {other:?}");
        }
    }

    #[test]
    fn test_infeasible_constraints() {
        let mut m = Matrix::new(1);
        m.push(Row::pin(1, 0, 0));
        m.push(Row::pin(1, 0, 1));
        assert!(dualizer().constraints_to_basis(&m).is_none());
    }

    #[test]
    fn test_ray_yields_inequality() {
        // basis: anchor 1, direction +1; the half-line x >= 1
        let mut basis = Matrix::new(1);
        basis.push(row(&[1], 1, true));
        basis.push(row(&[1], 0, true));
        let back = dualizer().basis_to_constraints(&basis);
        // x - 1 >= 0 and nothing contradicting growth
        assert!(back.contains(&row(&[1], -1, false)));
        assert!(back.rows().iter().all(|r| !r.is_eq));
    }

    #[test]
    fn test_multiple_initials_become_directions() {
        // 1 <= x <= 3 anchors at one endpoint with a difference direction
        let mut m = Matrix::new(1);
        m.push(row(&[1], -1, false));
        m.push(row(&[-1], 3, false));
        let basis = dualizer().constraints_to_basis(&m).unwrap();
        let anchors: Vec<_> = basis.rows().iter().filter(|r| r.b.is_one()).collect();
        assert_eq!(anchors.len(), 1);
        assert!(basis.len() >= 2);
    }

    #[test]
    fn test_empty_basis_is_top() {
        let dz = dualizer();
        let top = dz.basis_to_constraints(&Matrix::new(3));
        assert!(top.is_empty());
    }

    #[test]
    fn test_full_space_round_trip() {
        // no constraints, to the basis of the whole plane, and back to no
        // constraints
        let dz = dualizer();
        let basis = dz.constraints_to_basis(&Matrix::new(2)).unwrap();
        assert!(!basis.is_empty());
        let back = dz.basis_to_constraints(&basis);
        assert!(back.is_empty());
    }
}
