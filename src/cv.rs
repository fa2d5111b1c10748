/**
 * RecoBlend
 * Copyright (C) 2026 RecoBlend contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

// Random search over the ALS hyperparameters, scored by k-fold resampled validation RMSE.

use std::time::Instant;

use rand::seq::SliceRandom;
use rand::Rng;
use scoped_pool::Pool;

use crate::als::{self, AlsConfig};
use crate::error::{Error, Result};
use crate::groups::IndexGroups;
use crate::rmse::compute_rmse;
use crate::split::{split_train_test, Sampling};
use crate::types::SparseRatingsMatrix;
use crate::utils;

/// The hyperparameters tuned by the search.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Hyperparameters {
    pub num_features: usize,
    pub init_weight: f64,
    pub lambda_movie: f64,
    pub lambda_user: f64,
}

impl Hyperparameters {

    /// Solver configuration for these hyperparameters, everything else from `base`.
    pub fn apply(&self, base: &AlsConfig) -> AlsConfig {
        AlsConfig {
            num_features: self.num_features,
            init_weight: self.init_weight,
            lambda_movie: self.lambda_movie,
            lambda_user: self.lambda_user,
            ..*base
        }
    }
}

impl<'a> From<&'a AlsConfig> for Hyperparameters {
    fn from(config: &'a AlsConfig) -> Self {
        Hyperparameters {
            num_features: config.num_features,
            init_weight: config.init_weight,
            lambda_movie: config.lambda_movie,
            lambda_user: config.lambda_user,
        }
    }
}

/// Candidate grids and the validation protocol.
#[derive(Clone, Debug)]
pub struct SearchSpace {
    pub num_features: Vec<usize>,
    pub init_weight: Vec<f64>,
    pub lambda_movie: Vec<f64>,
    pub lambda_user: Vec<f64>,
    /// Number of sampled combinations.
    pub candidates: usize,
    pub folds: usize,
    /// Held-out fraction of each fold.
    pub p_test: f64,
    pub sampling: Sampling,
    /// Solver settings other than the tuned hyperparameters.
    pub solver: AlsConfig,
}

impl Default for SearchSpace {
    fn default() -> Self {
        SearchSpace {
            num_features: linspace(1.0, 60.0, 60).into_iter().map(|value| value as usize).collect(),
            init_weight: linspace(1.0, 3.0, 60),
            lambda_movie: linspace(0.01, 1.0, 100),
            lambda_user: linspace(0.01, 1.0, 100),
            candidates: 60,
            folds: 5,
            p_test: 0.2,
            sampling: Sampling::default(),
            solver: AlsConfig::default(),
        }
    }
}

impl SearchSpace {

    fn validate(&self) -> Result<()> {
        if self.num_features.is_empty() || self.init_weight.is_empty()
            || self.lambda_movie.is_empty() || self.lambda_user.is_empty() {
            return Err(Error::InvalidConfig("every hyperparameter grid needs a value".to_owned()));
        }
        if self.folds == 0 {
            return Err(Error::InvalidConfig("at least one fold is required".to_owned()));
        }
        Ok(())
    }
}

/// `num` evenly spaced values from `start` to `stop`, both included.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|index| start + step * index as f64).collect()
        },
    }
}

#[derive(Clone, Copy, Debug)]
pub struct SearchOutcome {
    pub best: Hyperparameters,
    /// Mean validation RMSE of `best`.
    pub rmse: f64,
    pub evaluated: usize,
    /// Candidates abandoned after a numeric failure.
    pub skipped: usize,
}

/// Draws every coordinate independently, with replacement, from its grid.
pub fn sample_candidates<R: Rng + ?Sized>(
    space: &SearchSpace,
    rng: &mut R,
) -> Result<Vec<Hyperparameters>> {

    space.validate()?;

    let lambda_movie = draw(&space.lambda_movie, space.candidates, rng);
    let lambda_user = draw(&space.lambda_user, space.candidates, rng);
    let num_features = draw(&space.num_features, space.candidates, rng);
    let init_weight = draw(&space.init_weight, space.candidates, rng);

    let candidates = (0..space.candidates)
        .map(|index| Hyperparameters {
            num_features: num_features[index],
            init_weight: init_weight[index],
            lambda_movie: lambda_movie[index],
            lambda_user: lambda_user[index],
        })
        .collect();

    Ok(candidates)
}

fn draw<T: Copy, R: Rng + ?Sized>(grid: &[T], amount: usize, rng: &mut R) -> Vec<T> {
    // Grids are validated to be non-empty
    (0..amount).filter_map(|_| grid.choose(rng).copied()).collect()
}

/// Mean held-out RMSE of one candidate over freshly drawn folds of `train`.
pub fn evaluate_candidate<R: Rng + ?Sized>(
    train: &SparseRatingsMatrix,
    candidate: &Hyperparameters,
    space: &SearchSpace,
    rng: &mut R,
    pool: &Pool,
) -> Result<f64> {

    let config = candidate.apply(&space.solver);
    let mut total = 0.0;

    for fold in 0..space.folds {
        let (fold_train, fold_test) = split_train_test(train, space.p_test, space.sampling, rng, pool)?;

        let factorization = als::train(&fold_train, &config, rng)?;
        let held_out = IndexGroups::build(&fold_test);
        let rmse = compute_rmse(&fold_test, &factorization.factors, held_out.pairs())?;

        tracing::debug!(fold, rmse, "validation fold");
        total += rmse;
    }

    Ok(total / space.folds as f64)
}

/// Random search: scores every sampled candidate and keeps the first one with the lowest mean
/// validation RMSE.
pub fn random_search<R: Rng + ?Sized>(
    train: &SparseRatingsMatrix,
    space: &SearchSpace,
    rng: &mut R,
    pool: &Pool,
) -> Result<SearchOutcome> {

    let candidates = sample_candidates(space, rng)?;
    search_candidates(train, &candidates, space, rng, pool)
}

/// Scores the given candidates in order. A candidate failing numerically is logged and skipped,
/// the remaining ones are still evaluated.
pub fn search_candidates<R: Rng + ?Sized>(
    train: &SparseRatingsMatrix,
    candidates: &[Hyperparameters],
    space: &SearchSpace,
    rng: &mut R,
    pool: &Pool,
) -> Result<SearchOutcome> {

    let start = Instant::now();
    let mut scored: Vec<(Hyperparameters, f64)> = Vec::with_capacity(candidates.len());

    for (index, candidate) in candidates.iter().enumerate() {

        match evaluate_candidate(train, candidate, space, rng, pool) {
            Ok(rmse) => {
                tracing::info!(index, ?candidate, rmse, "evaluated candidate");
                scored.push((*candidate, rmse));
            },
            Err(error) if error.is_numeric() => {
                tracing::warn!(index, ?candidate, %error, "skipping candidate");
            },
            Err(error) => return Err(error),
        }
    }

    let (best, rmse) = best_candidate(&scored).ok_or(Error::NoViableCandidate(candidates.len()))?;
    let skipped = candidates.len() - scored.len();

    tracing::info!(
        ?best,
        rmse,
        skipped,
        elapsed_ms = utils::to_millis(start.elapsed()),
        "random search finished",
    );

    Ok(SearchOutcome { best, rmse, evaluated: scored.len(), skipped })
}

/// Lowest RMSE wins, ties keep the earlier candidate. NaN scores never win.
fn best_candidate(scored: &[(Hyperparameters, f64)]) -> Option<(Hyperparameters, f64)> {
    let mut best: Option<(Hyperparameters, f64)> = None;

    for &(candidate, rmse) in scored {
        let improved = match best {
            Some((_, best_rmse)) => rmse < best_rmse,
            None => !rmse.is_nan(),
        };
        if improved {
            best = Some((candidate, rmse));
        }
    }

    best
}
