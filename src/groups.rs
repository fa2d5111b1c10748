use crate::types::{Pair, SparseRatingsMatrix};

/// Observed (row, column) pairs of a ratings matrix, grouped once by row and once by column.
/// Rows or columns without any rating get an empty group.
pub struct IndexGroups {
    pairs: Vec<Pair>,
    by_row: Vec<Vec<u32>>,
    by_col: Vec<Vec<u32>>,
}

impl IndexGroups {

    pub fn build(matrix: &SparseRatingsMatrix) -> Self {

        let mut pairs: Vec<Pair> = Vec::with_capacity(matrix.nnz());
        let mut by_row: Vec<Vec<u32>> = vec![Vec::new(); matrix.num_rows()];
        let mut by_col: Vec<Vec<u32>> = vec![Vec::new(); matrix.num_cols()];

        // Entries arrive sorted by row, then column, so every group ends up sorted as well
        for (row, col, _) in matrix.entries() {
            pairs.push((row, col));
            by_row[row as usize].push(col);
            by_col[col as usize].push(row);
        }

        IndexGroups { pairs, by_row, by_col }
    }

    /// Every observed pair exactly once.
    pub fn pairs(&self) -> &[Pair] {
        &self.pairs
    }

    /// Observed columns per row, i.e. the movies rated by each user.
    pub fn by_row(&self) -> &[Vec<u32>] {
        &self.by_row
    }

    /// Observed rows per column, i.e. the users who rated each movie.
    pub fn by_col(&self) -> &[Vec<u32>] {
        &self.by_col
    }
}


#[cfg(test)]
mod tests {

    use super::IndexGroups;
    use crate::types::SparseRatingsMatrix;

    #[test]
    fn groups_by_row_and_column() {
        let mut matrix = SparseRatingsMatrix::new(3, 4);
        for &(row, col) in &[(2, 3), (0, 1), (2, 0), (0, 3), (1, 1)] {
            matrix.insert(row, col, 1.0).unwrap();
        }

        let groups = IndexGroups::build(&matrix);

        assert_eq!(groups.pairs(), &[(0, 1), (0, 3), (1, 1), (2, 0), (2, 3)]);
        assert_eq!(groups.by_row(), &[vec![1, 3], vec![1], vec![0, 3]]);
        assert_eq!(groups.by_col(), &[vec![2], vec![0, 1], vec![], vec![0, 2]]);
    }

    #[test]
    fn empty_matrix() {
        let groups = IndexGroups::build(&SparseRatingsMatrix::new(2, 2));
        assert!(groups.pairs().is_empty());
        assert_eq!(groups.by_row(), &[Vec::<u32>::new(), Vec::new()]);
    }
}
