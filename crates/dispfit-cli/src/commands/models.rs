use crate::error::Result;
use dispfit::core::registry::{ExperimentFamily, ModelInfo, MODELS};

/// List every registered dispersion model with its free parameters and
/// nesting sources.
pub fn run() -> Result<()> {
    let mut entries: Vec<&ModelInfo> = MODELS.values().collect();
    entries.sort_unstable_by_key(|model| model.id);

    println!("{:<20} {:<8} {:<40} {}", "model", "family", "parameters", "nests from");
    for model in entries {
        let family = match model.family {
            ExperimentFamily::Cpmg => "CPMG",
            ExperimentFamily::R1Rho => "R1rho",
        };
        let params: Vec<&str> = model.params.iter().map(|p| p.name()).collect();
        let sources: Vec<&str> = model.nests_from.iter().map(|e| e.source).collect();
        println!(
            "{:<20} {:<8} {:<40} {}",
            model.id,
            family,
            params.join(", "),
            sources.join(", "),
        );
    }
    Ok(())
}
