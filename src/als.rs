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

// Alternating least squares on the observed ratings only. Each user's and each movie's factor
// vector is the solution of a ridge regression whose penalty grows with the number of ratings of
// that user or movie (weighted-lambda regularization).

use std::time::Instant;

use nalgebra::{DMatrix, DVector};
use rand::Rng;

use crate::error::{Error, Result, Side};
use crate::groups::IndexGroups;
use crate::rmse::compute_rmse;
use crate::types::SparseRatingsMatrix;
use crate::utils;

/// Smallest admissible ratio between the smallest and the largest pivot of a Cholesky factor.
const PIVOT_TOLERANCE: f64 = 1e-10;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AlsConfig {
    /// Dimensionality F of the latent factors.
    pub num_features: usize,
    /// Factors are initialised uniformly from `[0, init_weight)`.
    pub init_weight: f64,
    pub lambda_movie: f64,
    pub lambda_user: f64,
    /// Upper bound on the number of alternating sweeps.
    pub iterations: usize,
    /// Training stops once the RMSE changes by less than this between two sweeps.
    pub stop_criterion: f64,
}

impl Default for AlsConfig {
    fn default() -> Self {
        AlsConfig {
            num_features: 20,
            init_weight: 1.0,
            lambda_movie: 0.1,
            lambda_user: 0.1,
            iterations: 50,
            stop_criterion: 1e-5,
        }
    }
}

impl AlsConfig {

    pub fn validate(&self) -> Result<()> {
        if self.num_features == 0 {
            return Err(Error::InvalidConfig("num_features must be at least 1".to_owned()));
        }
        if !(self.init_weight.is_finite() && self.init_weight > 0.0) {
            return Err(Error::InvalidConfig(
                format!("init_weight must be positive, got {}", self.init_weight)));
        }
        if !(self.lambda_movie.is_finite() && self.lambda_user.is_finite()) {
            return Err(Error::InvalidConfig("regularization must be finite".to_owned()));
        }
        Ok(())
    }
}

/// User factors are F x num_users, movie factors F x num_movies.
#[derive(Clone, Debug, PartialEq)]
pub struct LatentFactors {
    pub user_factors: DMatrix<f64>,
    pub movie_factors: DMatrix<f64>,
}

impl LatentFactors {

    /// Draws the movie factors first, then the user factors.
    pub fn random<R: Rng + ?Sized>(
        num_features: usize,
        num_users: usize,
        num_movies: usize,
        weight: f64,
        rng: &mut R,
    ) -> Self {
        let movie_factors = DMatrix::from_fn(num_features, num_movies, |_, _| weight * rng.gen::<f64>());
        let user_factors = DMatrix::from_fn(num_features, num_users, |_, _| weight * rng.gen::<f64>());

        LatentFactors { user_factors, movie_factors }
    }

    pub fn num_features(&self) -> usize {
        self.user_factors.nrows()
    }

    pub fn num_users(&self) -> usize {
        self.user_factors.ncols()
    }

    pub fn num_movies(&self) -> usize {
        self.movie_factors.ncols()
    }

    #[inline]
    pub fn predict(&self, user: u32, movie: u32) -> f64 {
        self.movie_factors.column(movie as usize).dot(&self.user_factors.column(user as usize))
    }

    /// Dense num_users x num_movies matrix of predicted ratings.
    pub fn predict_all(&self) -> DMatrix<f64> {
        self.user_factors.transpose() * &self.movie_factors
    }
}

pub struct Factorization {
    pub factors: LatentFactors,
    /// Training RMSE after each sweep.
    pub history: Vec<f64>,
    /// Training RMSE of the random initialisation.
    pub initial_rmse: f64,
    pub converged: bool,
}

impl Factorization {

    pub fn final_rmse(&self) -> f64 {
        self.history.last().copied().unwrap_or(self.initial_rmse)
    }
}

/// Factorizes the observed entries of `train`. Users and movies without ratings keep their random
/// initial factors.
pub fn train<R: Rng + ?Sized>(
    train: &SparseRatingsMatrix,
    config: &AlsConfig,
    rng: &mut R,
) -> Result<Factorization> {

    config.validate()?;

    let groups = IndexGroups::build(train);
    if groups.pairs().is_empty() {
        return Err(Error::EmptySet("training ratings"));
    }

    let start = Instant::now();

    let mut factors = LatentFactors::random(
        config.num_features,
        train.num_rows(),
        train.num_cols(),
        config.init_weight,
        rng,
    );

    let initial_rmse = compute_rmse(train, &factors, groups.pairs())?;
    let mut history: Vec<f64> = Vec::with_capacity(config.iterations);
    let mut converged = false;

    for iteration in 0..config.iterations {

        update_movie_factors(train, &groups, config.lambda_movie, &mut factors)?;
        update_user_factors(train, &groups, config.lambda_user, &mut factors)?;

        let rmse = compute_rmse(train, &factors, groups.pairs())?;
        let previous = history.last().copied().unwrap_or(0.0);
        history.push(rmse);

        tracing::debug!(iteration, rmse, "als sweep");

        if (rmse - previous).abs() < config.stop_criterion {
            converged = true;
            break;
        }
    }

    let factorization = Factorization { factors, history, initial_rmse, converged };

    tracing::info!(
        num_features = config.num_features,
        iterations = factorization.history.len(),
        converged,
        rmse = factorization.final_rmse(),
        elapsed_ms = utils::to_millis(start.elapsed()),
        "als finished",
    );

    Ok(factorization)
}

/// Solves `(U_m U_m^T + n_m * lambda_movie * I) z = U_m r_m` for every rated movie m.
fn update_movie_factors(
    train: &SparseRatingsMatrix,
    groups: &IndexGroups,
    lambda_movie: f64,
    factors: &mut LatentFactors,
) -> Result<()> {

    for (movie, users) in groups.by_col().iter().enumerate() {
        if users.is_empty() {
            continue;
        }

        let ratings: Vec<f64> = users.iter()
            .map(|user| train.row(*user)[&(movie as u32)])
            .collect();

        let z = solve_regularized(&factors.user_factors, users, ratings, lambda_movie)
            .ok_or(Error::SingularMatrix { side: Side::Movie, index: movie })?;

        factors.movie_factors.set_column(movie, &z);
    }

    Ok(())
}

/// Solves `(M_u M_u^T + n_u * lambda_user * I) w = M_u r_u` for every user u with ratings.
fn update_user_factors(
    train: &SparseRatingsMatrix,
    groups: &IndexGroups,
    lambda_user: f64,
    factors: &mut LatentFactors,
) -> Result<()> {

    for (user, movies) in groups.by_row().iter().enumerate() {
        if movies.is_empty() {
            continue;
        }

        let row = train.row(user as u32);
        let ratings: Vec<f64> = movies.iter().map(|movie| row[movie]).collect();

        let w = solve_regularized(&factors.movie_factors, movies, ratings, lambda_user)
            .ok_or(Error::SingularMatrix { side: Side::User, index: user })?;

        factors.user_factors.set_column(user, &w);
    }

    Ok(())
}

/// Ridge solution for one entity, given the fixed factors of the entities it has ratings with.
/// Returns `None` unless the normal equations are numerically positive definite.
fn solve_regularized(
    fixed: &DMatrix<f64>,
    observed: &[u32],
    ratings: Vec<f64>,
    lambda: f64,
) -> Option<DVector<f64>> {

    let num_features = fixed.nrows();
    let columns: Vec<usize> = observed.iter().map(|index| *index as usize).collect();

    let gathered = fixed.select_columns(columns.iter());
    let ratings = DVector::from_vec(ratings);

    let penalty = observed.len() as f64 * lambda;
    let a = &gathered * gathered.transpose() + DMatrix::identity(num_features, num_features) * penalty;
    let b = &gathered * ratings;

    let cholesky = a.cholesky()?;

    let pivots = cholesky.l().diagonal();
    if !(pivots.min() > PIVOT_TOLERANCE * pivots.max()) {
        return None;
    }

    Some(cholesky.solve(&b))
}


#[cfg(test)]
mod tests {

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::{train, AlsConfig, LatentFactors};
    use crate::error::{Error, Side};
    use crate::types::SparseRatingsMatrix;

    fn diagonal_ratings() -> SparseRatingsMatrix {
        let mut ratings = SparseRatingsMatrix::new(3, 3);
        ratings.insert(0, 0, 5.0).unwrap();
        ratings.insert(1, 1, 3.0).unwrap();
        ratings.insert(2, 2, 4.0).unwrap();
        ratings
    }

    /// Rank two ratings with roughly 80% of the entries observed.
    fn low_rank_ratings(seed: u64) -> SparseRatingsMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let truth = LatentFactors::random(2, 30, 20, 1.0, &mut rng);

        let mut ratings = SparseRatingsMatrix::new(30, 20);
        for user in 0..30 {
            for movie in 0..20 {
                if rng.gen::<f64>() < 0.8 {
                    let rating = 1.0 + truth.predict(user, movie);
                    ratings.insert(user, movie, rating).unwrap();
                }
            }
        }
        ratings
    }

    #[test]
    fn small_diagonal_scenario() {
        let config = AlsConfig {
            num_features: 1,
            init_weight: 1.0,
            lambda_movie: 0.1,
            lambda_user: 0.1,
            iterations: 10,
            ..AlsConfig::default()
        };

        let mut rng = StdRng::seed_from_u64(988);
        let factorization = train(&diagonal_ratings(), &config, &mut rng).unwrap();

        assert!(!factorization.history.is_empty());
        assert!(factorization.history.len() <= 10);
        assert!(factorization.final_rmse() < factorization.initial_rmse);
        assert!(factorization.final_rmse() < 0.5);
        assert_eq!(factorization.factors.num_features(), 1);
    }

    #[test]
    fn reconstructs_low_rank_matrix() {
        let ratings = low_rank_ratings(42);
        let config = AlsConfig {
            num_features: 3,
            lambda_movie: 0.001,
            lambda_user: 0.001,
            iterations: 200,
            stop_criterion: 1e-7,
            ..AlsConfig::default()
        };

        let mut rng = StdRng::seed_from_u64(988);
        let factorization = train(&ratings, &config, &mut rng).unwrap();

        assert!(factorization.final_rmse() < 0.1, "rmse {}", factorization.final_rmse());

        let first_sweeps = &factorization.history[..5.min(factorization.history.len())];
        assert!(first_sweeps.last().unwrap() <= first_sweeps.first().unwrap());
    }

    #[test]
    fn deterministic_for_fixed_seed() {
        let ratings = low_rank_ratings(3);
        let config = AlsConfig { num_features: 4, iterations: 5, ..AlsConfig::default() };

        let first = train(&ratings, &config, &mut StdRng::seed_from_u64(1)).unwrap();
        let second = train(&ratings, &config, &mut StdRng::seed_from_u64(1)).unwrap();

        assert_eq!(first.factors, second.factors);
        assert_eq!(first.history, second.history);
    }

    #[test]
    fn unrated_movies_keep_initial_factors() {
        let mut ratings = SparseRatingsMatrix::new(2, 3);
        ratings.insert(0, 0, 4.0).unwrap();
        ratings.insert(1, 0, 2.0).unwrap();
        ratings.insert(1, 1, 5.0).unwrap();

        let config = AlsConfig { num_features: 2, iterations: 3, ..AlsConfig::default() };

        let initial = LatentFactors::random(2, 2, 3, 1.0, &mut StdRng::seed_from_u64(9));
        let factorization = train(&ratings, &config, &mut StdRng::seed_from_u64(9)).unwrap();

        assert_eq!(factorization.factors.movie_factors.column(2), initial.movie_factors.column(2));
        assert_ne!(factorization.factors.movie_factors.column(0), initial.movie_factors.column(0));
    }

    #[test]
    fn negative_regularization_fails_fast() {
        let config = AlsConfig {
            num_features: 1,
            lambda_movie: -1.0,
            lambda_user: -1.0,
            ..AlsConfig::default()
        };

        // Each movie has a single rater whose factor lies in [0, 1), so u^2 - 1 < 0
        match train(&diagonal_ratings(), &config, &mut StdRng::seed_from_u64(5)) {
            Err(Error::SingularMatrix { side: Side::Movie, index: 0 }) => (),
            other => panic!("unexpected result {:?}", other.map(|f| f.history)),
        }
    }

    #[test]
    fn invalid_configuration() {
        let config = AlsConfig { num_features: 0, ..AlsConfig::default() };
        assert!(train(&diagonal_ratings(), &config, &mut StdRng::seed_from_u64(5)).is_err());
    }

    #[test]
    fn empty_training_set() {
        let ratings = SparseRatingsMatrix::new(3, 3);
        assert!(train(&ratings, &AlsConfig::default(), &mut StdRng::seed_from_u64(5)).is_err());
    }

    #[test]
    fn predict_all_matches_pointwise_predictions() {
        let factors = LatentFactors::random(3, 4, 5, 2.0, &mut StdRng::seed_from_u64(2));
        let dense = factors.predict_all();

        assert_eq!(dense.shape(), (4, 5));
        for user in 0..4 {
            for movie in 0..5 {
                assert!((dense[(user, movie)] - factors.predict(user as u32, movie as u32)).abs() < 1e-12);
            }
        }
    }
}
