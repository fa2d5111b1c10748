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

use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Which factor matrix a per-entity solve was updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Movie,
    User,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("line {line}: malformed rating record {text:?}")]
    Parse { line: usize, text: String },

    #[error("index out of range: {0}")]
    Range(String),

    #[error("normal equations for {side:?} {index} are not positive definite")]
    SingularMatrix { side: Side, index: usize },

    #[error("cannot compute an error over an empty set of {0}")]
    EmptySet(&'static str),

    #[error("model {model} has no prediction for user {user}, movie {movie}")]
    MergeMismatch { model: String, user: u32, movie: u32 },

    #[error("duplicate prediction for user {user}, movie {movie}")]
    DuplicatePrediction { user: u32, movie: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("none of the {0} candidate hyperparameter combinations could be evaluated")]
    NoViableCandidate(usize),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Errors raised by the numerical routines rather than by bad input. A cross-validation
    /// candidate failing with one of these is skipped instead of aborting the search.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Error::SingularMatrix { .. } | Error::EmptySet(_))
    }
}
