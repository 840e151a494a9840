use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::Parser;
use float_ord::FloatOrd;
use log::{error, info};
use serde::Serialize;

use mmcf::problem::{ArcIndex, Flow};
use mmcf::{
    BlockConfig, Configuration, Formulation, LpSolver, PreprocessBounds, PreprocessReport,
    Problem, Registry, Result, INF,
};

/// Builds and solves the LP relaxation of a multicommodity min cost flow problem
#[derive(Parser, Debug)]
#[clap(name = "mmcf", version)]
struct Args {
    /// The JSON instance to solve
    instance: PathBuf,
    /// JSON file with the configuration of the model
    #[clap(long)]
    config: Option<PathBuf>,
    /// 0 for the flow decomposition, anything else for the knapsack decomposition
    #[clap(long)]
    formulation: Option<i32>,
    /// Add the strong forcing constraints to the knapsack decomposition
    #[clap(long)]
    strong_forcing: bool,
    /// Preprocess the instance before building the model
    #[clap(long)]
    preprocess: bool,
    /// JSON file with the preprocessing bounds, all zero if not given
    #[clap(long)]
    bounds: Option<PathBuf>,
    /// The kind of model to build
    #[clap(long, default_value = "mmcf")]
    model: String,
    /// Derive fixed costs as this multiple of the mean arc cost times capacity
    #[clap(long)]
    fixed_cost_ratio: Option<f64>,
    /// Where to write the result, stdout if not given
    #[clap(long, short)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Report {
    instance: String,
    formulation: Option<Formulation>,
    strong_forcing: bool,
    preprocessing: Option<PreprocessReport>,
    objective: f64,
    /// Flows indexed (commodity, arc)
    flows: Vec<Vec<Flow>>,
    activations: Vec<f64>,
    /// The arc using the largest share of its shared capacity
    busiest_arc: Option<(ArcIndex, f64)>,
}

fn configuration(args: &Args) -> Result<Configuration> {
    let mut config = match &args.config {
        Some(path) => Configuration::from_path(path)?,
        None => Configuration::default(),
    };
    if args.formulation.is_some() {
        config.formulation = args.formulation;
    }
    if args.strong_forcing {
        config.strong_forcing = Some(true);
    }
    Ok(config)
}

fn busiest_arc(problem: &Problem, flows: &[Vec<Flow>]) -> Option<(ArcIndex, f64)> {
    (0..problem.n_arcs())
        .filter(|&j| problem.shared_capacity(j) > 0.0 && problem.shared_capacity(j) < INF)
        .map(|j| {
            let total = flows.iter().map(|f| f[j]).sum::<Flow>();
            (j, total / problem.shared_capacity(j))
        })
        .max_by_key(|&(_, load)| FloatOrd(load))
}

fn run(args: &Args) -> Result<()> {
    let config = configuration(args)?;

    let mut problem = Problem::from_path(&args.instance)?;
    if let Some(ratio) = args.fixed_cost_ratio {
        problem.set_fixed_costs_from_mean(ratio);
    }

    let registry = Registry::with_defaults();
    let mut model = registry.create(&args.model, problem, BlockConfig::default())?;

    let preprocessing = match args.preprocess {
        true => {
            let bounds = match &args.bounds {
                Some(path) => PreprocessBounds::from_path(path)?,
                None => PreprocessBounds::default(),
            };
            Some(model.preprocess(&bounds)?)
        }
        false => None,
    };

    model.build(Some(&config))?;
    let outcome = LpSolver::solve(&mut model)?;

    let problem = model.problem();
    let flows = (0..problem.n_commodities())
        .map(|k| model.flows(k))
        .collect::<Vec<_>>();
    let report = Report {
        instance: args.instance.display().to_string(),
        formulation: model.formulation(),
        strong_forcing: model.strong_forcing(),
        preprocessing,
        objective: outcome.objective,
        activations: (0..problem.n_arcs()).map(|j| model.activation(j)).collect(),
        busiest_arc: busiest_arc(problem, &flows),
        flows,
    };

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(&mut writer, &report)?;
            writer.flush()?;
            info!("Wrote the result to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

pub fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if let Err(err) = run(&args) {
        error!("{}", err);
        std::process::exit(1);
    }
}
