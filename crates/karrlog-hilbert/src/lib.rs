//! Integer Hilbert-basis saturator
//!
//! Given a system of linear equalities and inequalities over integer
//! variables, computes a finite generator description of the solution set:
//! a set of **initial** solutions (particular, inhomogeneous) plus a set of
//! **non-initial** direction vectors (homogeneous), such that every
//! solution is an initial solution plus a non-negative combination of
//! directions.
//!
//! ## Algorithm Overview
//!
//! 1. Scale each rational row to integers.
//! 2. Run a GCD divisibility test on the integer equality rows; a failed
//!    test means there is no integer solution at all.
//! 3. Homogenize: a row `A*x = b` (or `>= b`) becomes the cone constraint
//!    `A*x - b*w = 0` (or `>= 0`) with `w >= 0` in one extra dimension,
//!    whose generators are computed by double description (see [`cone`]).
//!    Rays with `w > 0` scale to the initial solutions; rays and lines
//!    with `w = 0` are the directions.
//!
//! Saturation degrades to `Undef` instead of failing: on cancellation, on
//! generator blow-up past the cap, and when an initial solution is not
//! integral. Callers treat `Undef` as "no information".

mod cone;

use cone::Cone;
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of a saturation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Saturation {
    /// A basis was computed
    Sat,
    /// The system has no integer solution
    Unsat,
    /// Undecided (cancelled, blown up, or non-integral vertex)
    Undef,
}

#[derive(Debug, Clone)]
struct SatRow {
    a: Vec<BigRational>,
    rhs: BigRational,
    is_eq: bool,
}

/// The saturator. Constraints accumulate between [`HilbertBasis::reset`]
/// calls; [`HilbertBasis::saturate`] computes the basis, which is then read
/// back one solution at a time.
pub struct HilbertBasis {
    rows: Vec<SatRow>,
    int_cols: Vec<bool>,
    cancel: Arc<AtomicBool>,
    basis: Vec<(Vec<BigRational>, bool)>,
    max_generators: usize,
}

impl HilbertBasis {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            int_cols: Vec::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            basis: Vec::new(),
            max_generators: 4096,
        }
    }

    /// Drop all constraints, integer markings, and any computed basis.
    pub fn reset(&mut self) {
        self.rows.clear();
        self.int_cols.clear();
        self.basis.clear();
    }

    /// Add the equality `row * x = rhs`.
    pub fn add_eq(&mut self, row: Vec<BigRational>, rhs: BigRational) {
        self.rows.push(SatRow {
            a: row,
            rhs,
            is_eq: true,
        });
    }

    /// Add the inequality `row * x >= rhs`.
    pub fn add_ge(&mut self, row: Vec<BigRational>, rhs: BigRational) {
        self.rows.push(SatRow {
            a: row,
            rhs,
            is_eq: false,
        });
    }

    /// Mark a column as ranging over the integers.
    pub fn set_is_int(&mut self, col: usize) {
        if self.int_cols.len() <= col {
            self.int_cols.resize(col + 1, false);
        }
        self.int_cols[col] = true;
    }

    /// Install a cancellation flag; it is polled during saturation.
    pub fn set_cancel(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = flag;
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn width(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.a.len())
            .chain([self.int_cols.len()])
            .max()
            .unwrap_or(0)
    }

    /// Compute the basis.
    pub fn saturate(&mut self) -> Saturation {
        self.basis.clear();
        let n = self.width();

        // integer rows, padded to a uniform width
        let mut scaled: Vec<(Vec<BigInt>, BigInt, bool)> = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut a = row.a.clone();
            a.resize(n, BigRational::zero());
            let (ia, irhs) = scale_row(&a, &row.rhs);
            scaled.push((ia, irhs, row.is_eq));
        }

        for (a, rhs, is_eq) in &scaled {
            if *is_eq && self.gcd_infeasible(a, rhs) {
                return Saturation::Unsat;
            }
        }

        // homogenized cone over (x, w)
        let mut cone = Cone::full(n + 1);
        let mut w_row = vec![BigInt::zero(); n + 1];
        w_row[n] = BigInt::from(1);
        if !cone.intersect(&w_row, false, self.max_generators) {
            return Saturation::Undef;
        }
        for (a, rhs, is_eq) in &scaled {
            if self.cancelled() {
                return Saturation::Undef;
            }
            let mut row = a.clone();
            row.push(-rhs.clone());
            if !cone.intersect(&row, *is_eq, self.max_generators) {
                return Saturation::Undef;
            }
        }

        // read generators back as solutions
        let mut initial = Vec::new();
        let mut directions = Vec::new();
        for line in cone.lines() {
            debug_assert!(line[n].is_zero());
            if line[..n].iter().any(|x| !x.is_zero()) {
                directions.push(to_rationals(&line[..n]));
                directions.push(to_rationals(
                    &line[..n].iter().map(|x| -x).collect::<Vec<_>>(),
                ));
            }
        }
        for ray in cone.rays() {
            let w = &ray[n];
            if w.is_positive() {
                let mut sol = Vec::with_capacity(n);
                for x in &ray[..n] {
                    let (q, r) = x.div_rem(w);
                    if !r.is_zero() {
                        return Saturation::Undef;
                    }
                    sol.push(BigRational::from_integer(q));
                }
                initial.push(sol);
            } else if ray[..n].iter().any(|x| !x.is_zero()) {
                directions.push(to_rationals(&ray[..n]));
            }
        }

        if initial.is_empty() {
            return Saturation::Unsat;
        }
        self.basis = initial
            .into_iter()
            .map(|s| (s, true))
            .chain(directions.into_iter().map(|d| (d, false)))
            .collect();
        Saturation::Sat
    }

    /// GCD divisibility test on an integer equality row.
    /// `a_1*x_1 + ... + a_n*x_n = c` has no integer solution when
    /// `gcd(a_1, ..., a_n)` does not divide `c`.
    fn gcd_infeasible(&self, a: &[BigInt], rhs: &BigInt) -> bool {
        let mut g = BigInt::zero();
        for (i, coeff) in a.iter().enumerate() {
            if coeff.is_zero() {
                continue;
            }
            if !self.int_cols.get(i).copied().unwrap_or(false) {
                return false;
            }
            g = g.gcd(&coeff.abs());
            if g.is_one() {
                return false;
            }
        }
        if g.is_zero() {
            return !rhs.is_zero();
        }
        !(rhs % &g).is_zero()
    }

    pub fn get_basis_size(&self) -> usize {
        self.basis.len()
    }

    /// Returns the i-th basis solution and whether it is an initial
    /// (inhomogeneous) solution.
    pub fn get_basis_solution(&self, i: usize) -> (Vec<BigRational>, bool) {
        let (sol, is_initial) = &self.basis[i];
        (sol.clone(), *is_initial)
    }
}

impl Default for HilbertBasis {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HilbertBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in &self.rows {
            for x in &row.a {
                write!(f, "{x} ")?;
            }
            writeln!(f, "{} {}", if row.is_eq { "=" } else { ">=" }, row.rhs)?;
        }
        for (sol, is_initial) in &self.basis {
            write!(f, "{} [", if *is_initial { "init" } else { "dir " })?;
            for x in sol {
                write!(f, " {x}")?;
            }
            writeln!(f, " ]")?;
        }
        Ok(())
    }
}

/// Scale a rational row and right-hand side to integers by the common
/// denominator. Positive scaling preserves both row kinds.
fn scale_row(a: &[BigRational], rhs: &BigRational) -> (Vec<BigInt>, BigInt) {
    let mut lcm = rhs.denom().clone();
    for x in a {
        lcm = lcm.lcm(x.denom());
    }
    let scale = BigRational::from_integer(lcm);
    let ia = a.iter().map(|x| (x * &scale).to_integer()).collect();
    let irhs = (rhs * &scale).to_integer();
    (ia, irhs)
}

fn to_rationals(v: &[BigInt]) -> Vec<BigRational> {
    v.iter()
        .map(|x| BigRational::from_integer(x.clone()))
        .collect()
}
