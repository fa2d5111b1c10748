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
extern crate recoblend;

use std::env;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use getopts::Options;

use recoblend::blend::{self, BlendConfig, Constraint};
use recoblend::io;
use recoblend::predictions::{BlendTable, PredictionTable};
use recoblend::utils;

struct Settings {
    models: Vec<String>,
    training_dir: PathBuf,
    ground_truth: PathBuf,
    predict_dir: PathBuf,
    outputfile: Option<PathBuf>,
    weights_file: Option<PathBuf>,
    config: BlendConfig,
}

fn main() {

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optmulti("m", "model", "Name of a model to blend (required, repeatable). Its predictions \
        are read from {NAME}_predictions.csv.", "NAME");
    opts.optopt("t", "training-dir", "Directory with the held-out predictions the weights are \
        learned on (optional, defaults to predict_save).", "PATH");
    opts.optopt("g", "ground-truth", "True ratings of the held-out pairs (optional, defaults to \
        ground_truth.csv inside the training directory).", "PATH");
    opts.optopt("p", "predict-dir", "Directory with the predictions to blend (optional, \
        defaults to train_predictions).", "PATH");
    opts.optopt("o", "outputfile", "Output file name (optional, output will be written to \
        stdout by default).", "PATH");
    opts.optopt("w", "weights-file", "Write the learned weights as JSON to this file \
        (optional).", "PATH");
    opts.optflag("", "simplex", "Restrict the weights to be non-negative and sum to one.");
    opts.optopt("", "max-iterations", "Iteration cap of the optimizer (optional, defaults to \
        1000).", "NUMBER");
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

    let models = matches.opt_strs("m");
    if models.is_empty() {
        return print_usage_and_exit(
            &program,
            opts,
            Some("Please specify at least one model via --model."),
        );
    }

    let max_iterations: usize = match matches.opt_get_default("max-iterations", 1000) {
        Ok(max_iterations) => max_iterations,
        Err(failure) => {
            let hint = format!("Problem with option 'max-iterations': {}", failure.to_string());
            return print_usage_and_exit(&program, opts, Some(&hint))
        },
    };

    let constraint = if matches.opt_present("simplex") {
        Constraint::Simplex
    } else {
        Constraint::Unconstrained
    };

    let training_dir = PathBuf::from(
        matches.opt_str("t").unwrap_or_else(|| "predict_save".to_owned()));
    let ground_truth = matches.opt_str("g")
        .map(PathBuf::from)
        .unwrap_or_else(|| training_dir.join("ground_truth.csv"));

    let settings = Settings {
        models,
        training_dir,
        ground_truth,
        predict_dir: PathBuf::from(
            matches.opt_str("p").unwrap_or_else(|| "train_predictions".to_owned())),
        outputfile: matches.opt_str("o").map(PathBuf::from),
        weights_file: matches.opt_str("w").map(PathBuf::from),
        config: BlendConfig { max_iterations, constraint, ..BlendConfig::default() },
    };

    utils::init_logging();

    if let Err(failure) = run(&settings) {
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

fn run(settings: &Settings) -> Result<()> {

    tracing::info!(dir = ?settings.training_dir, models = ?settings.models, "loading predictions");
    let training = load_tables(&settings.training_dir, &settings.models)?;

    let ground_truth = io::read_predictions_file(&settings.ground_truth)
        .with_context(|| format!("reading ground truth {}", settings.ground_truth.display()))?;

    let outcome = blend::optimize(&training, &ground_truth, &settings.config)?;

    for (model, weight) in outcome.weights.iter() {
        tracing::info!(model = model.as_str(), weight, "blend weight");
    }

    if let Some(path) = &settings.weights_file {
        let out = io::output(Some(path))
            .with_context(|| format!("creating {}", path.display()))?;
        io::write_weights(&outcome.weights, out)?;
    }

    tracing::info!(dir = ?settings.predict_dir, "blending predictions");
    let to_blend = load_tables(&settings.predict_dir, &settings.models)?;
    let blended = blend::blend_predictions(&to_blend, &outcome)?;

    let out = io::output(settings.outputfile.as_deref())?;
    io::write_predictions(&blended, out)?;

    Ok(())
}

/// One prediction table per model, joined in the given model order.
fn load_tables(dir: &Path, models: &[String]) -> Result<BlendTable> {

    let mut tables: Vec<(String, PredictionTable)> = Vec::with_capacity(models.len());

    for model in models {
        let path = io::predictions_path(dir, model);
        let table = io::read_predictions_file(&path)
            .with_context(|| format!("reading predictions of {} from {}", model, path.display()))?;
        tables.push((model.clone(), table));
    }

    Ok(BlendTable::outer_join(tables)?)
}
