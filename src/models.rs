//! Models whose prediction tables feed the blend. The registry is an explicit, ordered list built
//! at startup; its order is the column order of the blend table.

use std::fmt;
use std::path::PathBuf;

use rand::RngCore;

use crate::als::{self, AlsConfig, LatentFactors};
use crate::error::{Error, Result};
use crate::io;
use crate::predictions::{Key, PredictionTable};
use crate::types::SparseRatingsMatrix;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelFamily {
    /// Alternating least squares, trained in process.
    Als,
    /// Predictions computed elsewhere and exchanged as a prediction table.
    External,
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ModelFamily::Als => write!(f, "als"),
            ModelFamily::External => write!(f, "external"),
        }
    }
}

/// Filtered ratings plus the raw 0-based index of every kept row and column.
pub struct TrainingData {
    pub ratings: SparseRatingsMatrix,
    pub kept_rows: Vec<u32>,
    pub kept_cols: Vec<u32>,
}

pub trait Recommender {
    fn name(&self) -> &str;
    fn family(&self) -> ModelFamily;
    fn train(&self, data: &TrainingData, rng: &mut dyn RngCore) -> Result<Box<dyn TrainedModel>>;
}

pub trait TrainedModel {
    /// Predictions for the requested external (user, movie) ids, or for every pair the model
    /// knows when `requested` is `None`.
    fn predict(&self, requested: Option<&[Key]>) -> Result<PredictionTable>;
}

pub struct AlsRecommender {
    name: String,
    config: AlsConfig,
}

impl AlsRecommender {
    pub fn new(name: &str, config: AlsConfig) -> Self {
        AlsRecommender { name: name.to_owned(), config }
    }
}

struct AlsModel {
    factors: LatentFactors,
    kept_rows: Vec<u32>,
    kept_cols: Vec<u32>,
}

impl Recommender for AlsRecommender {

    fn name(&self) -> &str {
        &self.name
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::Als
    }

    fn train(&self, data: &TrainingData, rng: &mut dyn RngCore) -> Result<Box<dyn TrainedModel>> {
        let factorization = als::train(&data.ratings, &self.config, rng)?;

        Ok(Box::new(AlsModel {
            factors: factorization.factors,
            kept_rows: data.kept_rows.clone(),
            kept_cols: data.kept_cols.clone(),
        }))
    }
}

impl TrainedModel for AlsModel {
    fn predict(&self, requested: Option<&[Key]>) -> Result<PredictionTable> {
        PredictionTable::from_factors(&self.factors, &self.kept_rows, &self.kept_cols, requested)
    }
}

/// A model trained by another library. Training loads its prediction table from disk.
pub struct ExternalPredictions {
    name: String,
    path: PathBuf,
}

impl ExternalPredictions {
    pub fn new(name: &str, path: PathBuf) -> Self {
        ExternalPredictions { name: name.to_owned(), path }
    }
}

struct LoadedTable(PredictionTable);

impl Recommender for ExternalPredictions {

    fn name(&self) -> &str {
        &self.name
    }

    fn family(&self) -> ModelFamily {
        ModelFamily::External
    }

    fn train(&self, _data: &TrainingData, _rng: &mut dyn RngCore) -> Result<Box<dyn TrainedModel>> {
        let table = io::read_predictions_file(&self.path)?;
        tracing::info!(model = %self.name, path = ?self.path, rows = table.len(), "loaded predictions");
        Ok(Box::new(LoadedTable(table)))
    }
}

impl TrainedModel for LoadedTable {
    fn predict(&self, requested: Option<&[Key]>) -> Result<PredictionTable> {
        match requested {
            Some(requested) => Ok(self.0.restrict(requested)),
            None => Ok(self.0.clone()),
        }
    }
}

#[derive(Default)]
pub struct Registry {
    models: Vec<Box<dyn Recommender>>,
}

impl Registry {

    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register(&mut self, model: Box<dyn Recommender>) -> Result<()> {
        if self.models.iter().any(|registered| registered.name() == model.name()) {
            return Err(Error::InvalidConfig(format!("model {} is registered twice", model.name())));
        }
        self.models.push(model);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.models.iter().map(|model| model.name()).collect()
    }

    /// Trains every model in registration order and collects its predictions.
    pub fn predict_all(
        &self,
        data: &TrainingData,
        requested: Option<&[Key]>,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<(String, PredictionTable)>> {

        let mut tables = Vec::with_capacity(self.models.len());

        for model in self.models.iter() {
            tracing::info!(model = model.name(), family = %model.family(), "training model");
            let trained = model.train(data, rng)?;
            let predictions = trained.predict(requested)?;
            tables.push((model.name().to_owned(), predictions));
        }

        Ok(tables)
    }
}


#[cfg(test)]
mod tests {

    use std::path::PathBuf;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{AlsRecommender, ExternalPredictions, ModelFamily, Recommender, Registry, TrainingData};
    use crate::als::AlsConfig;
    use crate::error::Error;
    use crate::types::SparseRatingsMatrix;

    fn training_data() -> TrainingData {
        let mut ratings = SparseRatingsMatrix::new(3, 2);
        ratings.insert(0, 0, 5.0).unwrap();
        ratings.insert(1, 1, 3.0).unwrap();
        ratings.insert(2, 0, 4.0).unwrap();
        ratings.insert(2, 1, 2.0).unwrap();

        // raw movie 1 was filtered out
        TrainingData { ratings, kept_rows: vec![0, 1, 2], kept_cols: vec![0, 2] }
    }

    fn als(name: &str) -> Box<dyn Recommender> {
        let config = AlsConfig { num_features: 2, iterations: 5, ..AlsConfig::default() };
        Box::new(AlsRecommender::new(name, config))
    }

    #[test]
    fn als_predicts_requested_external_ids() {
        let model = als("als");
        assert_eq!(model.family(), ModelFamily::Als);

        let trained = model.train(&training_data(), &mut StdRng::seed_from_u64(988)).unwrap();

        let requested = [(1, 1), (3, 3), (2, 2)];
        let predictions = trained.predict(Some(&requested[..])).unwrap();

        assert_eq!(predictions.len(), 2);
        assert!(predictions.get(1, 1).is_some());
        assert!(predictions.get(3, 3).is_some());

        let everything = trained.predict(None).unwrap();
        assert_eq!(everything.len(), 6);
    }

    #[test]
    fn registry_rejects_duplicate_names() {
        let mut registry = Registry::new();
        registry.register(als("als")).unwrap();

        match registry.register(als("als")) {
            Err(Error::InvalidConfig(_)) => (),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn registry_keeps_registration_order() {
        let mut registry = Registry::new();
        registry.register(als("second")).unwrap();
        registry.register(als("first")).unwrap();

        let tables = registry
            .predict_all(&training_data(), Some(&[(1, 1)][..]), &mut StdRng::seed_from_u64(1))
            .unwrap();

        let names: Vec<&str> = tables.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["second", "first"]);
        assert_eq!(registry.names(), names);
    }

    #[test]
    fn missing_external_table() {
        let model = ExternalPredictions::new("svd", PathBuf::from("does/not/exist.csv"));
        assert_eq!(model.family(), ModelFamily::External);

        match model.train(&training_data(), &mut StdRng::seed_from_u64(1)) {
            Err(Error::Io(_)) => (),
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("loading a missing file succeeded"),
        }
    }
}
