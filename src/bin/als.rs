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

extern crate anyhow;
extern crate getopts;
extern crate num_cpus;
extern crate rand;
extern crate recoblend;
extern crate scoped_pool;

use std::env;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use getopts::{Matches, Options};
use rand::rngs::StdRng;
use rand::SeedableRng;
use scoped_pool::Pool;

use recoblend::als::AlsConfig;
use recoblend::cv::{self, Hyperparameters, SearchSpace};
use recoblend::io;
use recoblend::models::{AlsRecommender, ExternalPredictions, Registry, TrainingData};
use recoblend::split::{self, Sampling};
use recoblend::stats::filter_valid;
use recoblend::utils;

struct Settings {
    inputfile: PathBuf,
    outputdir: PathBuf,
    submission: Option<PathBuf>,
    min_ratings: u32,
    p_test: f64,
    config: AlsConfig,
    seed: u64,
    cross_validate: bool,
    params_file: PathBuf,
    load_params: Option<PathBuf>,
    externals: Vec<(String, PathBuf)>,
}

fn main() {

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("i", "inputfile", "Input file name (required). A header line followed by one \
        rating per line in the form r{user}_c{movie},{rating}.", "PATH");
    opts.optopt("o", "outputdir", "Directory for the prediction tables (optional, defaults to \
        the current directory).", "PATH");
    opts.optopt("s", "submission", "Sample submission whose Id column lists the pairs to \
        predict (optional, all pairs are predicted by default).", "PATH");
    opts.optopt("", "min-ratings", "Minimum number of ratings of a kept user or movie \
        (optional, defaults to 0).", "NUMBER");
    opts.optopt("", "p-test", "Fraction of each movie's ratings held out for evaluation \
        (optional, defaults to 0.2).", "FRACTION");
    opts.optopt("", "features", "Number of latent features (optional, defaults to 20).", "NUMBER");
    opts.optopt("", "weight", "Upper bound of the random initial factors (optional, defaults \
        to 1.0).", "NUMBER");
    opts.optopt("", "lambda-movie", "Movie regularization (optional, defaults to 0.1).", "NUMBER");
    opts.optopt("", "lambda-user", "User regularization (optional, defaults to 0.1).", "NUMBER");
    opts.optopt("", "iterations", "Maximum number of ALS sweeps (optional, defaults to 50).",
        "NUMBER");
    opts.optopt("", "seed", "Seed of the random generator (optional, defaults to 988).", "NUMBER");
    opts.optflag("", "cross-validate", "Tune the hyperparameters by random search with 5-fold \
        validation before training.");
    opts.optopt("", "params-file", "File the tuned hyperparameters are appended to (optional, \
        defaults to best_params.jsonl).", "PATH");
    opts.optopt("", "load-params", "Use the most recent hyperparameters stored in this file \
        (optional).", "PATH");
    opts.optmulti("", "external", "Prediction table of a model trained elsewhere, to be \
        restricted to the requested pairs and copied into the output directory (optional, \
        repeatable).", "NAME=PATH");
    opts.optflag("h", "help", "Print this help menu");

    let matches = match opts.parse(&args[1..]) {
        Ok(matches) => matches,
        Err(failure) => {
            let hint = failure.to_string();
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    if matches.opt_present("h") {
        return print_usage_and_exit(&program, opts, None);
    }

    if !matches.opt_present("i") {
        return print_usage_and_exit(
            &program,
            opts,
            Some("Please specify an inputfile via --inputfile."),
        );
    }

    let settings = match settings_from(&matches) {
        Ok(settings) => settings,
        Err(hint) => return print_usage_and_exit(&program, opts, Some(&hint)),
    };

    utils::init_logging();

    if let Err(failure) = run(settings) {
        eprintln!("Error: {:?}", failure);
        process::exit(1);
    }
}

fn print_usage_and_exit(
    program: &str,
    opts: Options,
    hint: Option<&str>
) {

    if let Some(hint) = hint {
        eprintln!("\n{}\n", hint);
    }

    let brief = format!("Usage: {} [options]", program);
    eprint!("{}", opts.usage(&brief));

    process::exit(if hint.is_some() { 2 } else { 0 });
}

fn option<T>(matches: &Matches, name: &str, default: T) -> std::result::Result<T, String>
    where T: FromStr, T::Err: Display {

    matches.opt_get_default(name, default)
        .map_err(|failure| format!("Problem with option '{}': {}", name, failure))
}

fn settings_from(matches: &Matches) -> std::result::Result<Settings, String> {

    let defaults = AlsConfig::default();

    let config = AlsConfig {
        num_features: option(matches, "features", defaults.num_features)?,
        init_weight: option(matches, "weight", defaults.init_weight)?,
        lambda_movie: option(matches, "lambda-movie", defaults.lambda_movie)?,
        lambda_user: option(matches, "lambda-user", defaults.lambda_user)?,
        iterations: option(matches, "iterations", defaults.iterations)?,
        ..defaults
    };

    let mut externals = Vec::new();
    for external in matches.opt_strs("external") {
        let mut parts = external.splitn(2, '=');
        match (parts.next(), parts.next()) {
            (Some(name), Some(path)) if !name.is_empty() && !path.is_empty() => {
                externals.push((name.to_owned(), PathBuf::from(path)));
            },
            _ => return Err(format!("Problem with option 'external': expected NAME=PATH, got {}",
                external)),
        }
    }

    Ok(Settings {
        inputfile: PathBuf::from(matches.opt_str("i").unwrap_or_default()),
        outputdir: PathBuf::from(matches.opt_str("o").unwrap_or_else(|| ".".to_owned())),
        submission: matches.opt_str("s").map(PathBuf::from),
        min_ratings: option(matches, "min-ratings", 0)?,
        p_test: option(matches, "p-test", 0.2)?,
        config,
        seed: option(matches, "seed", 988)?,
        cross_validate: matches.opt_present("cross-validate"),
        params_file: PathBuf::from(
            matches.opt_str("params-file").unwrap_or_else(|| "best_params.jsonl".to_owned())),
        load_params: matches.opt_str("load-params").map(PathBuf::from),
        externals,
    })
}

fn run(settings: Settings) -> Result<()> {

    let records = io::read_ratings_file(&settings.inputfile)
        .with_context(|| format!("reading ratings from {}", settings.inputfile.display()))?;
    let ratings = io::build_matrix(&records)?;
    let valid = filter_valid(&ratings, settings.min_ratings)?;

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let pool = Pool::new(num_cpus::get());

    let result = tune_and_predict(&settings, valid, &mut rng, &pool);
    pool.shutdown();
    result
}

fn tune_and_predict(
    settings: &Settings,
    valid: recoblend::stats::ValidRatings,
    rng: &mut StdRng,
    pool: &Pool,
) -> Result<()> {

    let mut config = settings.config;

    if let Some(path) = &settings.load_params {
        let file = File::open(path)
            .with_context(|| format!("opening hyperparameters {}", path.display()))?;
        match io::read_last_best_params(BufReader::new(file))? {
            Some(params) => {
                tracing::info!(?params, "loaded hyperparameters");
                config = params.apply(&config);
            },
            None => bail!("no hyperparameters stored in {}", path.display()),
        }
    }

    if settings.cross_validate {
        // Tuning only sees the training part, the tuned config is scored on the matching test part
        let (train, test) = split::split_train_test(
            &valid.ratings, settings.p_test, Sampling::default(), rng, pool)?;

        let space = SearchSpace { solver: config, ..SearchSpace::default() };
        let outcome = cv::random_search(&train, &space, rng, pool)?;

        io::append_best_params(&settings.params_file, &outcome.best)
            .with_context(|| format!("recording hyperparameters in {}",
                settings.params_file.display()))?;

        config = outcome.best.apply(&config);

        tracing::info!(params = ?outcome.best, "scoring tuned hyperparameters");
        recoblend::train_and_score(&train, &test, &config, rng)?;

    } else {
        tracing::info!(params = ?Hyperparameters::from(&config), "training with hyperparameters");

        if settings.p_test > 0.0 {
            recoblend::train_with_holdout(
                &valid.ratings, &config, settings.p_test, Sampling::default(), rng, pool)?;
        }
    }

    let requested = match &settings.submission {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("opening submission {}", path.display()))?;
            Some(io::read_pair_ids(file)?)
        },
        None => None,
    };

    let mut registry = Registry::new();
    registry.register(Box::new(AlsRecommender::new("als", config)))?;
    for (name, path) in settings.externals.iter() {
        registry.register(Box::new(ExternalPredictions::new(name, path.clone())))?;
    }

    // Final models see every valid rating
    let data = TrainingData {
        ratings: valid.ratings,
        kept_rows: valid.kept_rows,
        kept_cols: valid.kept_cols,
    };

    let tables = registry.predict_all(&data, requested.as_deref(), rng)?;

    fs::create_dir_all(&settings.outputdir)
        .with_context(|| format!("creating {}", settings.outputdir.display()))?;

    for (model, table) in tables.iter() {
        let path = io::predictions_path(&settings.outputdir, model);
        write_table(&path, table)?;
        tracing::info!(model = model.as_str(), path = ?path, rows = table.len(), "wrote predictions");
    }

    Ok(())
}

fn write_table(path: &Path, table: &recoblend::predictions::PredictionTable) -> Result<()> {
    let out = io::output(Some(path))
        .with_context(|| format!("creating {}", path.display()))?;
    io::write_predictions(table, out)?;
    Ok(())
}
