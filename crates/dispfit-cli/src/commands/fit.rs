use crate::cli::FitArgs;
use crate::config::PartialFitConfig;
use crate::error::{CliError, Result};
use crate::physics::FastExchangeModel;
use crate::progress::ConsoleProgress;
use dispfit::{
    core::io,
    core::models::dataset::Dataset,
    core::registry,
    engine::config::FitConfig,
    engine::progress::ProgressReporter,
    workflows::{self, FitReport},
};
use tracing::info;

pub fn run(args: FitArgs) -> Result<()> {
    let model = registry::get(&args.model)
        .ok_or_else(|| CliError::Argument(format!("unknown model '{}'", args.model)))?;
    if let Some(source) = &args.source {
        registry::get(source)
            .ok_or_else(|| CliError::Argument(format!("unknown source model '{source}'")))?;
    }

    let partial = match &args.config {
        Some(path) => PartialFitConfig::from_file(path)?,
        None => PartialFitConfig::default(),
    };
    info!("Merging configuration from file and CLI arguments...");
    let config = partial.merge_with_cli(&args, model.family)?;

    info!("Loading measurement table from {:?}", &args.input);
    let mut dataset = io::load_dataset(&args.input, &args.model)?;

    let physics = FastExchangeModel;
    let console = ConsoleProgress::new();
    let reporter = ProgressReporter::with_callback(console.callback());

    if let Some(source) = &args.source {
        // The source fit seeds the target; its own errors are not needed.
        let source_config = FitConfig {
            monte_carlo: None,
            ..config.clone()
        };
        println!("Fitting source model '{source}'...");
        let report =
            workflows::run_fit(&mut dataset, source, None, &source_config, &physics, &reporter)?;
        print_report(&report, &dataset);
    }

    println!("Fitting model '{}'...", args.model);
    let report = workflows::run_fit(
        &mut dataset,
        &args.model,
        args.source.as_deref(),
        &config,
        &physics,
        &reporter,
    )?;
    print_report(&report, &dataset);

    if let Some(path) = &args.output {
        io::save_parameters(&dataset, path)?;
        println!("✓ Fitted parameters written to: {}", path.display());
    }
    Ok(())
}

fn print_report(report: &FitReport, dataset: &Dataset) {
    println!(
        "Model {}: {} cluster(s) fit.",
        report.model,
        report.clusters.len()
    );
    for fit in &report.clusters {
        println!(
            "  Cluster {} [{}]: chi2 = {:.6e}, {} iterations, {} evaluations",
            fit.cluster_index,
            fit.spins.join(", "),
            fit.chi2,
            fit.iterations,
            fit.evaluations,
        );
        if let Some(note) = fit.note {
            println!("    note: {note}");
        }
        if let Some(warning) = &fit.warning {
            println!("    warning: {warning}");
        }
        for slot in &fit.layout {
            let owner = slot
                .spin
                .map(|i| fit.spins[i].as_str())
                .unwrap_or("(cluster)");
            let key = slot
                .key
                .and_then(|k| dataset.condition_label(k))
                .unwrap_or("");
            println!(
                "    {:<12} {:<10} {:<8} {:>14.6}",
                slot.param.name(),
                owner,
                key,
                fit.values[slot.index],
            );
        }
        if let Some(mc) = fit.monte_carlo {
            println!(
                "    monte carlo: {} repetition(s) kept, {} eliminated",
                mc.kept, mc.eliminated
            );
        }
    }
}
