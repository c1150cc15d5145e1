//! Double-description computation of polyhedral cone generators
//!
//! Maintains the generators of a rational cone in `d` dimensions as a set of lines
//! (two-sided directions) and rays (one-sided directions) while the cone is
//! intersected with one hyperplane or halfspace at a time.
//!
//! ## Algorithm Overview
//!
//! Classic Motzkin double description:
//! 1. Start from the full space: `d` unit lines, no rays.
//! 2. For a constraint `a*y = 0` or `a*y >= 0`, if some line leaves the
//!    hyperplane, use it as the pivot: project every other generator onto
//!    `a*y = 0`; for an inequality the pivot survives as the ray pointing
//!    into the halfspace.
//! 3. Otherwise partition the rays by the sign of `a*r`; rays on the wrong
//!    side are replaced by their sign-cancelling combinations with rays on
//!    the right side.
//!
//! Generators are kept as primitive integer vectors. The combination step
//! admits non-extreme rays; they are redundant but harmless, and a
//! generator cap bounds the blow-up.

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, Zero};

fn dot(a: &[BigInt], b: &[BigInt]) -> BigInt {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Divide out the gcd of all components. Returns false if the vector is zero.
fn primitive(v: &mut [BigInt]) -> bool {
    let mut g = BigInt::zero();
    for x in v.iter() {
        g = g.gcd(&x.abs());
    }
    if g.is_zero() {
        return false;
    }
    if !g.is_one() {
        for x in v.iter_mut() {
            *x = &*x / &g;
        }
    }
    true
}

/// Flip sign so the first non-zero component is positive (lines only).
fn canonical_line(v: &mut [BigInt]) {
    if let Some(first) = v.iter().find(|x| !x.is_zero()) {
        if first.is_negative() {
            for x in v.iter_mut() {
                *x = -&*x;
            }
        }
    }
}

fn push_unique(set: &mut Vec<Vec<BigInt>>, v: Vec<BigInt>) {
    if !set.contains(&v) {
        set.push(v);
    }
}

/// Generator representation of a polyhedral cone
pub(crate) struct Cone {
    dim: usize,
    lines: Vec<Vec<BigInt>>,
    rays: Vec<Vec<BigInt>>,
}

impl Cone {
    /// The full space: one line per coordinate axis.
    pub(crate) fn full(dim: usize) -> Self {
        let mut lines = Vec::with_capacity(dim);
        for i in 0..dim {
            let mut unit = vec![BigInt::zero(); dim];
            unit[i] = BigInt::from(1);
            lines.push(unit);
        }
        Cone {
            dim,
            lines,
            rays: Vec::new(),
        }
    }

    pub(crate) fn lines(&self) -> &[Vec<BigInt>] {
        &self.lines
    }

    pub(crate) fn rays(&self) -> &[Vec<BigInt>] {
        &self.rays
    }

    /// Intersect with `a*y = 0` (is_eq) or `a*y >= 0`.
    ///
    /// Returns false when the generator count exceeds `cap`; the caller
    /// treats that as an undecided saturation.
    pub(crate) fn intersect(&mut self, a: &[BigInt], is_eq: bool, cap: usize) -> bool {
        debug_assert_eq!(a.len(), self.dim);

        // A line crossing the constraint serves as the pivot.
        let pivot_idx = self.lines.iter().position(|l| !dot(a, l).is_zero());
        if let Some(pi) = pivot_idx {
            let mut pivot = self.lines.swap_remove(pi);
            let mut pd = dot(a, &pivot);
            if pd.is_negative() {
                for x in pivot.iter_mut() {
                    *x = -&*x;
                }
                pd = -pd;
            }
            let project = |v: &[BigInt]| -> Option<Vec<BigInt>> {
                let dv = dot(a, v);
                let mut out: Vec<BigInt> = v
                    .iter()
                    .zip(&pivot)
                    .map(|(x, p)| &pd * x - &dv * p)
                    .collect();
                primitive(&mut out).then_some(out)
            };
            let lines: Vec<Vec<BigInt>> = self
                .lines
                .iter()
                .filter_map(|l| {
                    let mut l = project(l)?;
                    canonical_line(&mut l);
                    Some(l)
                })
                .collect();
            self.lines = lines;
            let mut rays = Vec::with_capacity(self.rays.len() + 1);
            for r in &self.rays {
                if let Some(r) = project(r) {
                    push_unique(&mut rays, r);
                }
            }
            if !is_eq {
                push_unique(&mut rays, pivot);
            }
            self.rays = rays;
            return self.rays.len() <= cap;
        }

        // Every line lies inside the constraint; split the rays by sign.
        let dots: Vec<BigInt> = self.rays.iter().map(|r| dot(a, r)).collect();
        let mut next: Vec<Vec<BigInt>> = Vec::new();
        for (r, d) in self.rays.iter().zip(&dots) {
            if d.is_zero() || (!is_eq && d.is_positive()) {
                push_unique(&mut next, r.clone());
            }
        }
        for (p, dp) in self.rays.iter().zip(&dots) {
            if !dp.is_positive() {
                continue;
            }
            for (n, dn) in self.rays.iter().zip(&dots) {
                if !dn.is_negative() {
                    continue;
                }
                // a * (|dn|*p + dp*n) = 0
                let mut w: Vec<BigInt> = p
                    .iter()
                    .zip(n)
                    .map(|(pc, nc)| -dn * pc + dp * nc)
                    .collect();
                if primitive(&mut w) {
                    push_unique(&mut next, w);
                }
                if next.len() > cap {
                    return false;
                }
            }
        }
        self.rays = next;
        true
    }
}
