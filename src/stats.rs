use crate::error::Result;
use crate::types::SparseRatingsMatrix;

/// Number of observed ratings per user (row) and per movie (column).
pub struct ObservationCounts {
    per_row: Vec<u32>,
    per_col: Vec<u32>,
}

impl ObservationCounts {

    pub fn per_row(&self) -> &[u32] {
        &self.per_row
    }

    pub fn per_col(&self) -> &[u32] {
        &self.per_col
    }

    pub fn num_observations(&self) -> u64 {
        self.per_row.iter().map(|count| *count as u64).sum()
    }
}

impl<'a> From<&'a SparseRatingsMatrix> for ObservationCounts {

    fn from(matrix: &'a SparseRatingsMatrix) -> Self {

        let mut per_row = vec![0; matrix.num_rows()];
        let mut per_col = vec![0; matrix.num_cols()];

        for (row, col, _) in matrix.entries() {
            per_row[row as usize] += 1;
            per_col[col as usize] += 1;
        }

        ObservationCounts { per_row, per_col }
    }
}

/// Result of `filter_valid`: the re-indexed submatrix and, for each of its rows and columns, the
/// index it had in the input matrix.
pub struct ValidRatings {
    pub ratings: SparseRatingsMatrix,
    pub kept_rows: Vec<u32>,
    pub kept_cols: Vec<u32>,
}

/// Keeps the rows and the columns having at least `min_observations` ratings. Both counts come
/// from the input matrix, so a kept row may end up with fewer ratings once columns are dropped.
pub fn filter_valid(matrix: &SparseRatingsMatrix, min_observations: u32) -> Result<ValidRatings> {

    let counts = ObservationCounts::from(matrix);

    let kept_rows: Vec<u32> = kept_indices(counts.per_row(), min_observations);
    let kept_cols: Vec<u32> = kept_indices(counts.per_col(), min_observations);

    let mut new_row_index: Vec<Option<u32>> = vec![None; matrix.num_rows()];
    for (new_index, old_index) in kept_rows.iter().enumerate() {
        new_row_index[*old_index as usize] = Some(new_index as u32);
    }

    let mut new_col_index: Vec<Option<u32>> = vec![None; matrix.num_cols()];
    for (new_index, old_index) in kept_cols.iter().enumerate() {
        new_col_index[*old_index as usize] = Some(new_index as u32);
    }

    let mut ratings = SparseRatingsMatrix::new(kept_rows.len(), kept_cols.len());

    for (row, col, rating) in matrix.entries() {
        if let (Some(new_row), Some(new_col)) =
            (new_row_index[row as usize], new_col_index[col as usize]) {
            ratings.insert(new_row, new_col, rating)?;
        }
    }

    tracing::info!(
        original_shape = ?matrix.shape(),
        valid_shape = ?ratings.shape(),
        min_observations,
        "filtered valid ratings",
    );

    Ok(ValidRatings { ratings, kept_rows, kept_cols })
}

fn kept_indices(counts: &[u32], min_observations: u32) -> Vec<u32> {
    counts.iter()
        .enumerate()
        .filter(|(_, count)| **count >= min_observations)
        .map(|(index, _)| index as u32)
        .collect()
}
