//! Models command - list what the engine has installed.

use ollaweb_core::Coordinator;
use ollaweb_engine::paths;

pub(crate) async fn run(coordinator: &Coordinator) -> miette::Result<()> {
    coordinator
        .ensure_running()
        .await
        .map_err(|e| miette::miette!("Failed to start engine: {}", e))?;

    let models = coordinator
        .installed_models()
        .await
        .map_err(|e| miette::miette!("Failed to list models: {}", e))?;

    if models.is_empty() {
        println!("No models installed.");
        println!();
        println!("To install the default model, run:");
        println!("  ollaweb pull {}", coordinator.config().default_model);
        return Ok(());
    }

    println!("Installed models:");
    for model in models {
        println!("  - {}", model);
    }

    println!();
    println!("Models directory: {}", paths::models_dir().display());

    Ok(())
}
