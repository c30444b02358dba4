//! Banded matrix storage with an in-place LU factorization (partial pivoting).
//!
//! Storage follows the LAPACK general band layout: element `A(i, j)` lives at row `kl + ku + i - j`
//! of column `j`, and the extra `kl` rows on top hold the fill-in created by row interchanges.
//! The Jacobian of the composite flame problem couples each point only to its neighbours, so the
//! half-bandwidths stay fixed however fine the grid becomes.
use super::flame_error::FlameError;
use nalgebra::{DMatrix, DVector};

#[derive(Debug, Clone)]
pub struct BandMatrix {
    n: usize,
    kl: usize,
    ku: usize,
    data: DMatrix<f64>,
    pivots: Vec<usize>,
    factored: bool,
}

impl BandMatrix {
    pub fn new(n: usize, kl: usize, ku: usize) -> Self {
        Self {
            n,
            kl,
            ku,
            data: DMatrix::zeros(2 * kl + ku + 1, n),
            pivots: vec![0; n],
            factored: false,
        }
    }

    pub fn size(&self) -> usize {
        self.n
    }

    pub fn bandwidths(&self) -> (usize, usize) {
        (self.kl, self.ku)
    }

    pub fn in_band(&self, i: usize, j: usize) -> bool {
        i < self.n && j < self.n && j <= i + self.ku && i <= j + self.kl
    }

    #[inline]
    fn slot(&self, i: usize, j: usize) -> usize {
        self.kl + self.ku + i - j
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        if self.in_band(i, j) {
            self.data[(self.slot(i, j), j)]
        } else {
            0.0
        }
    }

    /// Stores `value` at (i, j); entries outside the band are silently dropped.
    pub fn set(&mut self, i: usize, j: usize, value: f64) {
        if self.in_band(i, j) {
            let s = self.slot(i, j);
            self.data[(s, j)] = value;
            self.factored = false;
        }
    }

    pub fn is_factored(&self) -> bool {
        self.factored
    }

    /// matrix-vector product with the unfactored matrix
    pub fn multiply(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut y = DVector::zeros(self.n);
        for j in 0..self.n {
            let i_start = j.saturating_sub(self.ku);
            let i_end = (j + self.kl + 1).min(self.n);
            for i in i_start..i_end {
                y[i] += self.get(i, j) * x[j];
            }
        }
        y
    }

    /// LU factorization in place, returns the first column with a zero pivot on failure
    pub fn factor(&mut self) -> Result<(), FlameError> {
        let kv = self.kl + self.ku;
        let n = self.n;
        let mut ju = 0usize;
        for j in 0..n {
            let km = self.kl.min(n - 1 - j);
            // pivot search in column j
            let mut jp = 0usize;
            let mut vmax = self.data[(kv, j)].abs();
            for i in 1..=km {
                let v = self.data[(kv + i, j)].abs();
                if v > vmax {
                    vmax = v;
                    jp = i;
                }
            }
            self.pivots[j] = j + jp;
            if vmax == 0.0 || !vmax.is_finite() {
                self.factored = false;
                return Err(FlameError::SingularJacobian { column: j });
            }
            ju = ju.max((j + self.ku + jp).min(n - 1));
            if jp != 0 {
                for c in j..=ju {
                    let a = kv + j - c;
                    let b = kv + j + jp - c;
                    let tmp = self.data[(a, c)];
                    self.data[(a, c)] = self.data[(b, c)];
                    self.data[(b, c)] = tmp;
                }
            }
            let pivot = self.data[(kv, j)];
            for i in 1..=km {
                self.data[(kv + i, j)] /= pivot;
            }
            for c in j + 1..=ju {
                let a = self.data[(kv + j - c, c)];
                if a != 0.0 {
                    for i in 1..=km {
                        let l = self.data[(kv + i, j)];
                        self.data[(kv + j + i - c, c)] -= l * a;
                    }
                }
            }
        }
        self.factored = true;
        Ok(())
    }

    /// Solves A x = b with the factored matrix, overwriting `b` with x.
    pub fn solve_in_place(&self, b: &mut DVector<f64>) -> Result<(), FlameError> {
        if !self.factored {
            return Err(FlameError::SingularJacobian { column: 0 });
        }
        let kv = self.kl + self.ku;
        let n = self.n;
        for j in 0..n {
            let km = self.kl.min(n - 1 - j);
            let l = self.pivots[j];
            if l != j {
                b.swap_rows(l, j);
            }
            let bj = b[j];
            if bj != 0.0 {
                for i in 1..=km {
                    b[j + i] -= self.data[(kv + i, j)] * bj;
                }
            }
        }
        for j in (0..n).rev() {
            b[j] /= self.data[(kv, j)];
            let bj = b[j];
            let i_start = j.saturating_sub(kv);
            for i in i_start..j {
                b[i] -= self.data[(kv + i - j, j)] * bj;
            }
        }
        Ok(())
    }

    pub fn solve(&self, b: &DVector<f64>) -> Result<DVector<f64>, FlameError> {
        let mut x = b.clone();
        self.solve_in_place(&mut x)?;
        Ok(x)
    }
}
