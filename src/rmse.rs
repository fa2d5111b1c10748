use crate::als::LatentFactors;
use crate::error::{Error, Result};
use crate::types::{Pair, SparseRatingsMatrix};

/// Running sum of squared residuals.
#[derive(Default, Copy, Clone)]
pub struct RmseAccumulator {
    squared_error: f64,
    count: usize,
}

impl RmseAccumulator {

    #[inline]
    pub fn push(&mut self, residual: f64) {
        self.squared_error += residual * residual;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Fails on an empty accumulator rather than returning NaN.
    pub fn finalise(&self) -> Result<f64> {
        match self.count {
            0 => Err(Error::EmptySet("residuals")),
            count => Ok((self.squared_error / count as f64).sqrt()),
        }
    }
}

/// RMSE of the factorization over exactly the given (user, movie) pairs, each of which has to be
/// observed in `ratings`.
pub fn compute_rmse(
    ratings: &SparseRatingsMatrix,
    factors: &LatentFactors,
    pairs: &[Pair],
) -> Result<f64> {

    if pairs.is_empty() {
        return Err(Error::EmptySet("rating pairs"));
    }

    let mut accumulator = RmseAccumulator::default();

    for &(row, col) in pairs {
        let rating = ratings.get(row, col)
            .ok_or_else(|| Error::Range(format!("({}, {}) is not an observed rating", row, col)))?;
        accumulator.push(rating - factors.predict(row, col));
    }

    accumulator.finalise()
}
