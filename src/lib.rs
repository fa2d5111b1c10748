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

extern crate csv;
extern crate fnv;
extern crate nalgebra;
extern crate rand;
extern crate scoped_pool;
extern crate serde;
#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate serde_json;

use rand::Rng;
use scoped_pool::Pool;

pub mod als;
pub mod blend;
pub mod cv;
pub mod error;
pub mod groups;
pub mod io;
pub mod models;
pub mod predictions;
pub mod rmse;
pub mod split;
pub mod stats;
pub mod types;
pub mod utils;

mod usage_tests;

pub use crate::error::{Error, Result};
pub use crate::types::SparseRatingsMatrix;

use crate::als::{AlsConfig, Factorization};
use crate::groups::IndexGroups;
use crate::split::Sampling;

/// A factorization trained on one part of the ratings and scored on the held-out rest.
pub struct Holdout {
    pub factorization: Factorization,
    pub train_rmse: f64,
    /// `None` when nothing was held out.
    pub test_rmse: Option<f64>,
}

/// Splits `ratings`, trains on the training part and scores both parts.
pub fn train_with_holdout<R: Rng + ?Sized>(
    ratings: &SparseRatingsMatrix,
    config: &AlsConfig,
    p_test: f64,
    sampling: Sampling,
    rng: &mut R,
    pool: &Pool,
) -> Result<Holdout> {

    let (train, test) = split::split_train_test(ratings, p_test, sampling, rng, pool)?;
    train_and_score(&train, &test, config, rng)
}

/// Trains on `train` and scores the factorization on exactly the entries of `test`. Both matrices
/// have to come from the same split, so that no held-out entry was seen during training or tuning.
pub fn train_and_score<R: Rng + ?Sized>(
    train: &SparseRatingsMatrix,
    test: &SparseRatingsMatrix,
    config: &AlsConfig,
    rng: &mut R,
) -> Result<Holdout> {

    if train.shape() != test.shape() {
        return Err(Error::Range(format!(
            "train matrix {:?} and test matrix {:?} differ in shape", train.shape(), test.shape())));
    }

    let factorization = als::train(train, config, rng)?;
    let train_rmse = factorization.final_rmse();

    let test_rmse = match test.nnz() {
        0 => None,
        _ => {
            let held_out = IndexGroups::build(test);
            Some(rmse::compute_rmse(test, &factorization.factors, held_out.pairs())?)
        },
    };

    tracing::info!(train_rmse, ?test_rmse, "holdout evaluation");

    Ok(Holdout { factorization, train_rmse, test_rmse })
}
