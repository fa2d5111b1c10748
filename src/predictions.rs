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

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use fnv::FnvHashMap;
use nalgebra::{DMatrix, DVector};

use crate::als::LatentFactors;
use crate::error::{Error, Result};

/// External (user, movie) identifiers, 1-based as in the input files.
pub type Key = (u32, u32);

/// Predicted ratings of a single model, at most one per (user, movie) pair.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PredictionTable {
    ratings: BTreeMap<Key, f64>,
}

impl PredictionTable {

    pub fn new() -> Self {
        PredictionTable::default()
    }

    pub fn insert(&mut self, user: u32, movie: u32, rating: f64) -> Result<()> {
        match self.ratings.entry((user, movie)) {
            Entry::Occupied(_) => Err(Error::DuplicatePrediction { user, movie }),
            Entry::Vacant(entry) => {
                entry.insert(rating);
                Ok(())
            },
        }
    }

    pub fn get(&self, user: u32, movie: u32) -> Option<f64> {
        self.ratings.get(&(user, movie)).copied()
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// Entries ordered by user, then movie.
    pub fn iter(&self) -> impl Iterator<Item = (Key, f64)> + '_ {
        self.ratings.iter().map(|(key, rating)| (*key, *rating))
    }

    /// Keeps only the requested pairs. Requested pairs without a prediction are ignored.
    pub fn restrict(&self, requested: &[Key]) -> PredictionTable {
        let ratings = requested.iter()
            .filter_map(|key| self.ratings.get(key).map(|rating| (*key, *rating)))
            .collect();
        PredictionTable { ratings }
    }

    /// Predictions of a factorization for the requested external pairs, or for every
    /// (user, movie) combination when `requested` is `None`. `kept_rows` and `kept_cols` map the
    /// factor indices back to the 0-based indices of the raw ratings matrix.
    pub fn from_factors(
        factors: &LatentFactors,
        kept_rows: &[u32],
        kept_cols: &[u32],
        requested: Option<&[Key]>,
    ) -> Result<PredictionTable> {

        if kept_rows.len() != factors.num_users() || kept_cols.len() != factors.num_movies() {
            return Err(Error::Range(format!(
                "{} users and {} movies do not match factors of shape {}x{}",
                kept_rows.len(), kept_cols.len(), factors.num_users(), factors.num_movies())));
        }

        let mut table = PredictionTable::new();

        match requested {
            None => {
                for (user, external_user) in kept_rows.iter().enumerate() {
                    for (movie, external_movie) in kept_cols.iter().enumerate() {
                        table.insert(
                            external_user + 1,
                            external_movie + 1,
                            factors.predict(user as u32, movie as u32),
                        )?;
                    }
                }
            },
            Some(requested) => {
                let users = reverse_index(kept_rows);
                let movies = reverse_index(kept_cols);

                let mut num_skipped = 0;
                for &(external_user, external_movie) in requested {
                    let user = external_user.checked_sub(1).and_then(|index| users.get(&index));
                    let movie = external_movie.checked_sub(1).and_then(|index| movies.get(&index));

                    match (user, movie) {
                        (Some(user), Some(movie)) => {
                            let rating = factors.predict(*user, *movie);
                            table.insert(external_user, external_movie, rating)?;
                        },
                        _ => num_skipped += 1,
                    }
                }

                if num_skipped > 0 {
                    tracing::warn!(num_skipped, "requested pairs outside of the trained matrix");
                }
            },
        }

        Ok(table)
    }
}

fn reverse_index(kept: &[u32]) -> FnvHashMap<u32, u32> {
    kept.iter()
        .enumerate()
        .map(|(new_index, old_index)| (*old_index, new_index as u32))
        .collect()
}

/// Several models' predictions joined on (user, movie). The model columns are fixed when the
/// table is built, a missing prediction is `None`.
#[derive(Clone, Debug)]
pub struct BlendTable {
    models: Vec<String>,
    keys: Vec<Key>,
    columns: Vec<Vec<Option<f64>>>,
}

/// Blend table rows that also appear in the ground truth, as a dense design matrix
/// (rows x models) and the target ratings.
pub struct AlignedRows {
    pub predictions: DMatrix<f64>,
    pub targets: DVector<f64>,
}

impl BlendTable {

    /// Outer join of the given tables, with one column per model in the given order.
    pub fn outer_join(tables: Vec<(String, PredictionTable)>) -> Result<BlendTable> {

        let mut models: Vec<String> = Vec::with_capacity(tables.len());
        for (model, _) in tables.iter() {
            if models.contains(model) {
                return Err(Error::InvalidConfig(format!("model {} appears twice", model)));
            }
            models.push(model.clone());
        }

        let keys: Vec<Key> = tables.iter()
            .flat_map(|(_, table)| table.ratings.keys().copied())
            .collect::<BTreeSet<Key>>()
            .into_iter()
            .collect();

        let columns = tables.iter()
            .map(|(_, table)| keys.iter().map(|(user, movie)| table.get(*user, *movie)).collect())
            .collect();

        Ok(BlendTable { models, keys, columns })
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn column(&self, model: usize) -> &[Option<f64>] {
        &self.columns[model]
    }

    /// Inner join with the ground truth. Every joined row needs a prediction from every model.
    pub fn align(&self, ground_truth: &PredictionTable) -> Result<AlignedRows> {

        let rows: Vec<(usize, f64)> = self.keys.iter()
            .enumerate()
            .filter_map(|(index, (user, movie))| {
                ground_truth.get(*user, *movie).map(|rating| (index, rating))
            })
            .collect();

        if rows.is_empty() {
            return Err(Error::EmptySet("rows shared with the ground truth"));
        }

        let mut predictions = DMatrix::zeros(rows.len(), self.models.len());
        for (model, column) in self.columns.iter().enumerate() {
            for (position, &(index, _)) in rows.iter().enumerate() {
                let (user, movie) = self.keys[index];
                predictions[(position, model)] = column[index].ok_or_else(|| {
                    Error::MergeMismatch { model: self.models[model].clone(), user, movie }
                })?;
            }
        }

        let targets = DVector::from_iterator(rows.len(), rows.iter().map(|&(_, rating)| rating));

        Ok(AlignedRows { predictions, targets })
    }

    /// Weighted sum of the model columns per row. Rows where a model has no prediction get NaN.
    pub fn combine(&self, weights: &[f64]) -> Result<PredictionTable> {

        if weights.len() != self.models.len() {
            return Err(Error::InvalidConfig(format!(
                "{} weights for {} models", weights.len(), self.models.len())));
        }

        let mut blended = PredictionTable::new();

        for (index, (user, movie)) in self.keys.iter().enumerate() {
            let rating = self.columns.iter()
                .zip(weights)
                .map(|(column, weight)| column[index].map_or(f64::NAN, |value| weight * value))
                .sum();
            blended.insert(*user, *movie, rating)?;
        }

        Ok(blended)
    }
}
