//! Check command - report whether a model is installed.

use ollaweb_core::{Coordinator, ModelName};

use super::parse_model;

pub(crate) async fn run(coordinator: &Coordinator, model: &str) -> miette::Result<()> {
    let model = parse_model(model)?;

    coordinator
        .ensure_running()
        .await
        .map_err(|e| miette::miette!("Failed to start engine: {}", e))?;

    if coordinator.check_installed(&model).await {
        println!("{}: installed", model);
    } else {
        println!("{}: not installed", model);
        println!();
        println!("To install it, run:");
        println!("  {}", pull_hint(&model));
    }

    Ok(())
}

/// Command that installs exactly the model that was checked, tag included.
fn pull_hint(model: &ModelName) -> String {
    format!("ollaweb pull {}", model)
}
