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

#[cfg(test)]
mod tests {

    use std::io::Cursor;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use scoped_pool::Pool;

    use crate::als::AlsConfig;
    use crate::blend::{self, BlendConfig};
    use crate::io;
    use crate::models::{AlsRecommender, Registry, TrainingData};
    use crate::predictions::{BlendTable, PredictionTable};
    use crate::split::Sampling;
    use crate::stats::filter_valid;
    use crate::train_with_holdout;

    #[test]
    fn programmatic_usage() {

        /* Ratings come as "r{user}_c{movie},{rating}" lines below a header, with 1-based ids. */
        let mut input = String::from("Id,Prediction\n");
        for user in 1..=12 {
            for movie in 1..=8 {
                if (user * movie) % 5 != 0 {
                    let rating = 1 + (user + 2 * movie) % 5;
                    input.push_str(&format!("r{}_c{},{}\n", user, movie, rating));
                }
            }
        }

        let records = io::read_ratings(Cursor::new(input)).unwrap();
        let ratings = io::build_matrix(&records).unwrap();
        assert_eq!(ratings.shape(), (12, 8));

        /* Users and movies with too few ratings are dropped, the remaining ones are re-indexed.
           The kept indices let us translate predictions back to the original ids. */
        let valid = filter_valid(&ratings, 2).unwrap();

        /* All randomness flows from a single seeded generator, the split runs on a thread pool. */
        let mut rng = StdRng::seed_from_u64(988);
        let pool = Pool::new(2);

        let config = AlsConfig { num_features: 3, iterations: 20, ..AlsConfig::default() };
        let holdout = train_with_holdout(
            &valid.ratings,
            &config,
            0.2,
            Sampling::WithReplacement,
            &mut rng,
            &pool,
        ).unwrap();

        assert!(holdout.train_rmse < holdout.factorization.initial_rmse);
        assert!(holdout.test_rmse.is_some());

        /* Models are registered explicitly, their order becomes the column order of the blend. */
        let mut registry = Registry::new();
        registry.register(Box::new(AlsRecommender::new("als_small", config))).unwrap();
        registry.register(Box::new(AlsRecommender::new(
            "als_large",
            AlsConfig { num_features: 6, ..config },
        ))).unwrap();

        let data = TrainingData {
            ratings: valid.ratings.clone(),
            kept_rows: valid.kept_rows.clone(),
            kept_cols: valid.kept_cols.clone(),
        };

        let tables = registry.predict_all(&data, None, &mut rng).unwrap();
        let table = BlendTable::outer_join(tables).unwrap();

        /* The observed ratings serve as ground truth for learning the blend weights. */
        let mut ground_truth = PredictionTable::new();
        for (row, col, rating) in valid.ratings.entries() {
            let user = valid.kept_rows[row as usize] + 1;
            let movie = valid.kept_cols[col as usize] + 1;
            ground_truth.insert(user, movie, rating).unwrap();
        }

        let outcome = blend::optimize(&table, &ground_truth, &BlendConfig::default()).unwrap();
        assert_eq!(outcome.weights.len(), 2);

        let blended = blend::blend_predictions(&table, &outcome).unwrap();
        assert_eq!(blended.len(), table.len());

        let mut csv: Vec<u8> = Vec::new();
        io::write_predictions(&blended, &mut csv).unwrap();
        assert!(String::from_utf8(csv).unwrap().starts_with("User,Movie,Rating\n"));

        pool.shutdown();
    }
}
