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

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use scoped_pool::Pool;

use crate::error::{Error, Result};
use crate::types::SparseRatingsMatrix;

/// How the held-out rows of a column are drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sampling {
    /// Draws `floor(n * p_test)` rows with replacement. Duplicate draws collapse, so the held-out
    /// fraction of a column can end up below `p_test`.
    WithReplacement,
    /// Draws exactly `floor(n * p_test)` distinct rows.
    WithoutReplacement,
}

impl Default for Sampling {
    fn default() -> Self {
        Sampling::WithReplacement
    }
}

#[derive(Clone, Default)]
struct ColumnSplit {
    train: Vec<(u32, f64)>,
    test: Vec<(u32, f64)>,
}

/// Splits the observed ratings of every column (movie) independently into a training and a test
/// part. Both results keep the shape of `matrix` and never share an entry.
///
/// Columns are split in parallel on `pool`. Each column draws from its own generator, seeded from
/// `rng` in column order, so the outcome does not depend on the number of threads.
pub fn split_train_test<R: Rng + ?Sized>(
    matrix: &SparseRatingsMatrix,
    p_test: f64,
    sampling: Sampling,
    rng: &mut R,
    pool: &Pool,
) -> Result<(SparseRatingsMatrix, SparseRatingsMatrix)> {

    if !(0.0..=1.0).contains(&p_test) {
        return Err(Error::InvalidConfig(format!("p_test must be within [0, 1], got {}", p_test)));
    }

    let columns = matrix.columns();
    let seeds: Vec<u64> = columns.iter().map(|_| rng.gen()).collect();
    let mut splits: Vec<ColumnSplit> = vec![ColumnSplit::default(); columns.len()];

    pool.scoped(|scope| {
        for ((split, column), seed) in splits.iter_mut().zip(columns.iter()).zip(seeds.iter()) {
            scope.execute(move || {
                *split = split_column(column, p_test, sampling, *seed);
            });
        }
    });

    let (num_rows, num_cols) = matrix.shape();
    let mut train = SparseRatingsMatrix::new(num_rows, num_cols);
    let mut test = SparseRatingsMatrix::new(num_rows, num_cols);

    for (col, split) in splits.into_iter().enumerate() {
        for (row, rating) in split.train {
            train.insert(row, col as u32, rating)?;
        }
        for (row, rating) in split.test {
            test.insert(row, col as u32, rating)?;
        }
    }

    tracing::info!(
        nnz = matrix.nnz(),
        train_nnz = train.nnz(),
        test_nnz = test.nnz(),
        "split ratings",
    );

    Ok((train, test))
}

/// Draws `folds` independent train/validation splits of `matrix`. Every fold owns freshly
/// allocated matrices.
pub fn split_folds<R: Rng + ?Sized>(
    matrix: &SparseRatingsMatrix,
    folds: usize,
    p_test: f64,
    sampling: Sampling,
    rng: &mut R,
    pool: &Pool,
) -> Result<Vec<(SparseRatingsMatrix, SparseRatingsMatrix)>> {
    (0..folds)
        .map(|_| split_train_test(matrix, p_test, sampling, rng, pool))
        .collect()
}

fn split_column(column: &[(u32, f64)], p_test: f64, sampling: Sampling, seed: u64) -> ColumnSplit {

    let mut rng = StdRng::seed_from_u64(seed);
    let num_selects = (column.len() as f64 * p_test) as usize;
    let mut selected = vec![false; column.len()];

    match sampling {
        Sampling::WithReplacement => {
            for _ in 0..num_selects {
                selected[rng.gen_range(0..column.len())] = true;
            }
        },
        Sampling::WithoutReplacement => {
            for position in index::sample(&mut rng, column.len(), num_selects).into_iter() {
                selected[position] = true;
            }
        },
    }

    let mut split = ColumnSplit::default();
    for (&(row, rating), is_selected) in column.iter().zip(selected) {
        if is_selected {
            split.test.push((row, rating));
        } else {
            split.train.push((row, rating));
        }
    }

    split
}
