//! Info command - show configuration and paths.

use ollaweb_core::{CoordinatorConfig, OllamaConfig};
use ollaweb_engine::paths;

pub(crate) fn run(engine: &OllamaConfig, coordinator: &CoordinatorConfig) -> miette::Result<()> {
    println!("ollaweb");
    println!("=======");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Engine URL:       {}", engine.base_url);
    println!("Engine binary:    {}", engine.binary.display());
    let resolved = paths::find_on_path(&engine.binary);
    println!("  Found: {}", resolved.is_some());
    println!();

    println!("Data directory:   {}", paths::ollama_data_dir().display());
    println!("Models directory: {}", paths::models_dir().display());
    println!();

    println!("Default model:    {}", coordinator.default_model);
    match coordinator.readiness_timeout {
        Some(timeout) => println!("Readiness probe:  {}s", timeout.as_secs()),
        None => println!("Readiness probe:  disabled"),
    }
    println!("Progress buffer:  {}", coordinator.progress_capacity);

    Ok(())
}
