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

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::prelude::*;
use std::io::{stdout, BufReader};
use std::path::{Path, PathBuf};

use crate::cv::Hyperparameters;
use crate::error::{Error, Result};
use crate::predictions::{Key, PredictionTable};
use crate::types::SparseRatingsMatrix;

/// A raw rating as found in the input file, with 1-based indices.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RatingRecord {
    pub row: i64,
    pub col: i64,
    pub rating: f64,
}

/// Parses a `r{row}_c{col},{rating}` line.
pub fn parse_rating_line(line_number: usize, line: &str) -> Result<RatingRecord> {

    let malformed = || Error::Parse { line: line_number, text: line.to_owned() };

    let mut fields = line.trim().splitn(2, ',');
    let id = fields.next().ok_or_else(malformed)?;
    let rating = fields.next().ok_or_else(malformed)?;

    let (row, col) = parse_id(id).ok_or_else(malformed)?;
    let rating: f64 = rating.trim().parse().map_err(|_| malformed())?;

    Ok(RatingRecord { row, col, rating })
}

/// Parses a `r{row}_c{col}` identifier into 1-based (user, movie) ids.
pub fn parse_pair_id(line_number: usize, id: &str) -> Result<Key> {

    let malformed = || Error::Parse { line: line_number, text: id.to_owned() };
    let (row, col) = parse_id(id).ok_or_else(malformed)?;

    if row < 1 || col < 1 || row > u32::MAX as i64 || col > u32::MAX as i64 {
        return Err(Error::Range(format!("identifier {} is out of range", id)));
    }

    Ok((row as u32, col as u32))
}

fn parse_id(id: &str) -> Option<(i64, i64)> {
    let mut parts = id.trim().splitn(2, '_');
    let row = parts.next()?.strip_prefix('r')?.parse().ok()?;
    let col = parts.next()?.strip_prefix('c')?.parse().ok()?;
    Some((row, col))
}

/// Reads all ratings after the header line. Blank lines are skipped, the first malformed line
/// aborts the whole read.
pub fn read_ratings<R: BufRead>(reader: R) -> Result<Vec<RatingRecord>> {

    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_rating_line(index + 1, &line)?);
    }

    Ok(records)
}

pub fn read_ratings_file(path: &Path) -> Result<Vec<RatingRecord>> {
    let file = File::open(path)?;
    read_ratings(BufReader::new(file))
}

/// Largest user or movie id accepted when building a ratings matrix. Every row below the largest id
/// is allocated, so a single stray id must not size the matrix.
pub const MAX_DIMENSION: i64 = 10_000_000;

/// Sizes the matrix to the largest row and column observed and stores every record at its
/// 0-based position.
pub fn build_matrix(records: &[RatingRecord]) -> Result<SparseRatingsMatrix> {

    if let Some(record) = records.iter().find(|record| record.row < 1 || record.col < 1) {
        return Err(Error::Range(
            format!("r{}_c{} is not a 1-based position", record.row, record.col)));
    }

    let num_rows = records.iter().map(|record| record.row).max().unwrap_or(0);
    let num_cols = records.iter().map(|record| record.col).max().unwrap_or(0);

    if num_rows > MAX_DIMENSION || num_cols > MAX_DIMENSION {
        return Err(Error::Range(format!(
            "{}x{} ratings matrix exceeds {} users or movies", num_rows, num_cols, MAX_DIMENSION)));
    }

    let mut matrix = SparseRatingsMatrix::new(num_rows as usize, num_cols as usize);
    for record in records {
        matrix.insert((record.row - 1) as u32, (record.col - 1) as u32, record.rating)?;
    }

    tracing::info!(
        num_rows,
        num_cols,
        nnz = matrix.nnz(),
        "loaded ratings",
    );

    Ok(matrix)
}

#[derive(Deserialize)]
struct SubmissionRow {
    #[serde(rename = "Id")]
    id: String,
}

/// The `Id` column of a sample submission, as (user, movie) ids.
pub fn read_pair_ids<R: Read>(reader: R) -> Result<Vec<Key>> {

    let mut reader = csv::Reader::from_reader(reader);
    let mut ids = Vec::new();

    for (index, row) in reader.deserialize().enumerate() {
        let row: SubmissionRow = row?;
        // header is line 1
        ids.push(parse_pair_id(index + 2, &row.id)?);
    }

    Ok(ids)
}

/// Field names are the column headers of the prediction files.
#[derive(Serialize, Deserialize)]
struct PredictionRow {
    #[serde(rename = "User")]
    user: u32,
    #[serde(rename = "Movie")]
    movie: u32,
    #[serde(rename = "Rating")]
    rating: f64,
}

/// Reads a `User,Movie,Rating` table. Additional columns, such as a leading row index, are
/// ignored.
pub fn read_predictions<R: Read>(reader: R) -> Result<PredictionTable> {

    let mut reader = csv::Reader::from_reader(reader);
    let mut table = PredictionTable::new();

    for row in reader.deserialize() {
        let row: PredictionRow = row?;
        table.insert(row.user, row.movie, row.rating)?;
    }

    Ok(table)
}

pub fn read_predictions_file(path: &Path) -> Result<PredictionTable> {
    read_predictions(File::open(path)?)
}

pub fn write_predictions<W: Write>(table: &PredictionTable, writer: W) -> Result<()> {

    let mut writer = csv::Writer::from_writer(writer);

    for ((user, movie), rating) in table.iter() {
        writer.serialize(PredictionRow { user, movie, rating })?;
    }

    writer.flush()?;
    Ok(())
}

/// Location of a model's prediction table inside `dir`.
pub fn predictions_path(dir: &Path, model: &str) -> PathBuf {
    dir.join(format!("{}_predictions.csv", model))
}

/// Appends one `[num_features, weight, lambda_movie, lambda_user]` line to the record of tuning
/// runs at `path`.
pub fn append_best_params(path: &Path, params: &Hyperparameters) -> Result<()> {

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;

    let record = json!([
        params.num_features,
        params.init_weight,
        params.lambda_movie,
        params.lambda_user,
    ]);

    writeln!(file, "{}", record)?;
    Ok(())
}

/// The most recently appended tuning result, if any.
pub fn read_last_best_params<R: BufRead>(reader: R) -> Result<Option<Hyperparameters>> {

    let mut last: Option<String> = None;
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            last = Some(line);
        }
    }

    match last {
        None => Ok(None),
        Some(line) => {
            let (num_features, init_weight, lambda_movie, lambda_user): (f64, f64, f64, f64) =
                serde_json::from_str(&line)?;

            if !(num_features >= 1.0) {
                return Err(Error::InvalidConfig(
                    format!("stored num_features {} is not positive", num_features)));
            }

            Ok(Some(Hyperparameters {
                num_features: num_features as usize,
                init_weight,
                lambda_movie,
                lambda_user,
            }))
        },
    }
}

/// Writes the blend weights as a JSON object keyed by model name.
pub fn write_weights<W: Write>(weights: &[(String, f64)], mut writer: W) -> Result<()> {
    let weights: BTreeMap<&str, f64> = weights.iter()
        .map(|(model, weight)| (model.as_str(), *weight))
        .collect();

    serde_json::to_writer_pretty(&mut writer, &weights)?;
    writeln!(writer)?;
    Ok(())
}

/// A file at `path` if given, stdout otherwise.
pub fn output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    let out: Box<dyn Write> = match path {
        Some(path) => Box::new(File::create(path)?),
        _ => Box::new(stdout()),
    };

    Ok(out)
}


#[cfg(test)]
mod tests {

    use std::io::Cursor;
    use std::path::Path;

    use super::*;

    #[test]
    fn parse_valid_line() {
        let record = parse_rating_line(2, "r44_c1,4").unwrap();
        assert_eq!(record, RatingRecord { row: 44, col: 1, rating: 4.0 });

        let record = parse_rating_line(3, " r1_c12,3.5 ").unwrap();
        assert_eq!(record, RatingRecord { row: 1, col: 12, rating: 3.5 });
    }

    #[test]
    fn parse_malformed_lines() {
        for line in &["r1c2,3", "r1_c2", "x1_c2,3", "r1_c2,three", "r_c2,3", ""] {
            match parse_rating_line(7, line) {
                Err(Error::Parse { line: 7, text }) => assert_eq!(&text, line),
                other => panic!("unexpected result for {:?}: {:?}", line, other),
            }
        }
    }

    #[test]
    fn read_skips_header_and_blank_lines() {
        let input = "Id,Prediction\nr1_c1,5\n\nr2_c3,1\n";
        let records = read_ratings(Cursor::new(input)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1], RatingRecord { row: 2, col: 3, rating: 1.0 });
    }

    #[test]
    fn read_reports_the_failing_line() {
        let input = "Id,Prediction\nr1_c1,5\nbroken\n";
        match read_ratings(Cursor::new(input)) {
            Err(Error::Parse { line: 3, .. }) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn matrix_from_records() {
        let records = vec![
            RatingRecord { row: 1, col: 1, rating: 5.0 },
            RatingRecord { row: 3, col: 2, rating: 2.0 },
        ];
        let matrix = build_matrix(&records).unwrap();

        assert_eq!(matrix.shape(), (3, 2));
        assert_eq!(matrix.nnz(), 2);
        assert_eq!(matrix.get(0, 0), Some(5.0));
        assert_eq!(matrix.get(2, 1), Some(2.0));
        assert_eq!(matrix.get(1, 1), None);
    }

    #[test]
    fn matrix_rejects_non_positive_indices() {
        let records = vec![RatingRecord { row: 0, col: 1, rating: 5.0 }];
        match build_matrix(&records) {
            Err(Error::Range(_)) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn matrix_rejects_absurd_ids() {
        let records = vec![
            RatingRecord { row: 1, col: 1, rating: 5.0 },
            RatingRecord { row: 4_000_000_000, col: 1, rating: 3.0 },
        ];
        match build_matrix(&records) {
            Err(Error::Range(_)) => (),
            other => panic!("unexpected result {:?}", other.map(|matrix| matrix.shape())),
        }

        let records = vec![RatingRecord { row: 2, col: MAX_DIMENSION + 1, rating: 1.0 }];
        assert!(build_matrix(&records).is_err());
    }

    #[test]
    fn empty_matrix() {
        let matrix = build_matrix(&[]).unwrap();
        assert_eq!(matrix.shape(), (0, 0));
        assert_eq!(matrix.nnz(), 0);
    }

    #[test]
    fn submission_ids() {
        let input = "Id,Prediction\nr37_c1,3\nr73_c1,3\n";
        let ids = read_pair_ids(Cursor::new(input)).unwrap();
        assert_eq!(ids, vec![(37, 1), (73, 1)]);

        let input = "Id,Prediction\nr0_c1,3\n";
        assert!(read_pair_ids(Cursor::new(input)).is_err());
    }

    #[test]
    fn predictions_through_csv() {
        let mut table = PredictionTable::new();
        table.insert(2, 1, 3.25).unwrap();
        table.insert(1, 7, 4.0).unwrap();

        let mut buffer: Vec<u8> = Vec::new();
        write_predictions(&table, &mut buffer).unwrap();

        let written = String::from_utf8(buffer).unwrap();
        assert_eq!(written, "User,Movie,Rating\n1,7,4.0\n2,1,3.25\n");
    }

    #[test]
    fn predictions_with_index_column() {
        let input = ",User,Movie,Rating\n0,1,1,3.5\n1,1,2,4.5\n";
        let table = read_predictions(Cursor::new(input)).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1, 2), Some(4.5));
    }

    #[test]
    fn duplicate_predictions_are_rejected() {
        let input = "User,Movie,Rating\n1,1,3.5\n1,1,4.5\n";
        match read_predictions(Cursor::new(input)) {
            Err(Error::DuplicatePrediction { user: 1, movie: 1 }) => (),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn last_best_params() {
        let input = "[20,1.0,0.2,0.02]\n[7,2.5,0.5,0.1]\n\n";
        let params = read_last_best_params(Cursor::new(input)).unwrap().unwrap();

        assert_eq!(params, Hyperparameters {
            num_features: 7,
            init_weight: 2.5,
            lambda_movie: 0.5,
            lambda_user: 0.1,
        });

        assert!(read_last_best_params(Cursor::new("")).unwrap().is_none());
        assert!(read_last_best_params(Cursor::new("[1,2]\n")).is_err());
    }

    #[test]
    fn weights_as_json() {
        let weights = vec![("svd".to_owned(), 0.25), ("als".to_owned(), 0.75)];
        let mut buffer: Vec<u8> = Vec::new();
        write_weights(&weights, &mut buffer).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&buffer).unwrap();
        assert_eq!(parsed["als"], 0.75);
        assert_eq!(parsed["svd"], 0.25);
    }

    #[test]
    fn prediction_file_names() {
        let path = predictions_path(Path::new("predict_save"), "als");
        assert_eq!(path, Path::new("predict_save").join("als_predictions.csv"));
    }
}
