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

use fnv::FnvHashMap;

use crate::error::{Error, Result};

/// A (row, column) index pair. Internally rows are users and columns are movies, both 0-based.
pub type Pair = (u32, u32);

pub type SparseVector = FnvHashMap<u32, f64>;

pub fn new_sparse_vector(capacity: usize) -> SparseVector {
    FnvHashMap::with_capacity_and_hasher(capacity, Default::default())
}

/// Ratings matrix holding only the observed entries. An absent entry means "not rated", which is
/// different from a rating of zero.
#[derive(Clone, Debug, PartialEq)]
pub struct SparseRatingsMatrix {
    num_rows: usize,
    num_cols: usize,
    rows: Vec<SparseVector>,
}

impl SparseRatingsMatrix {

    pub fn new(num_rows: usize, num_cols: usize) -> Self {
        SparseRatingsMatrix {
            num_rows,
            num_cols,
            rows: vec![new_sparse_vector(0); num_rows],
        }
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn num_cols(&self) -> usize {
        self.num_cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.num_rows, self.num_cols)
    }

    /// Number of observed entries.
    pub fn nnz(&self) -> usize {
        self.rows.iter().map(|row| row.len()).sum()
    }

    pub fn insert(&mut self, row: u32, col: u32, rating: f64) -> Result<()> {
        if row as usize >= self.num_rows || col as usize >= self.num_cols {
            return Err(Error::Range(format!(
                "({}, {}) outside of a {}x{} matrix", row, col, self.num_rows, self.num_cols)));
        }

        self.rows[row as usize].insert(col, rating);
        Ok(())
    }

    pub fn get(&self, row: u32, col: u32) -> Option<f64> {
        self.rows.get(row as usize).and_then(|entries| entries.get(&col).copied())
    }

    pub fn row(&self, row: u32) -> &SparseVector {
        &self.rows[row as usize]
    }

    /// All observed entries ordered by row, then column.
    pub fn entries(&self) -> Vec<(u32, u32, f64)> {
        let mut entries = Vec::with_capacity(self.nnz());
        for (row_idx, row) in self.rows.iter().enumerate() {
            let mut cols: Vec<(u32, f64)> = row.iter().map(|(col, rating)| (*col, *rating)).collect();
            cols.sort_by_key(|&(col, _)| col);
            entries.extend(cols.into_iter().map(|(col, rating)| (row_idx as u32, col, rating)));
        }
        entries
    }

    /// Column-wise view of the observed entries, each column ordered by row.
    pub fn columns(&self) -> Vec<Vec<(u32, f64)>> {
        let mut columns = vec![Vec::new(); self.num_cols];
        for (row, col, rating) in self.entries() {
            columns[col as usize].push((row, rating));
        }
        columns
    }
}
