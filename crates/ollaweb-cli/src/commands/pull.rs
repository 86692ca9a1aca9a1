//! Pull command - install a model and show its progress.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use ollaweb_core::{Coordinator, InstallEvent, InstallOutcome};

use super::parse_model;

pub(crate) async fn run(coordinator: &Coordinator, model: &str) -> miette::Result<()> {
    let model = parse_model(model)?;

    coordinator
        .ensure_running()
        .await
        .map_err(|e| miette::miette!("Failed to start engine: {}", e))?;

    if coordinator.check_installed(&model).await {
        println!("Model '{}' is already installed.", model);
        return Ok(());
    }

    println!("Installing model: {}", model);
    println!("This may take a while depending on your connection...");
    println!();

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .map_err(|e| miette::miette!("Invalid progress template: {}", e))?,
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut progress = coordinator.install(&model);
    let mut outcome = None;
    loop {
        let event = tokio::select! {
            event = progress.next_event() => event,
            _ = tokio::signal::ctrl_c() => {
                pb.set_message("cancelling...");
                coordinator.cancel_install(&model);
                continue;
            }
        };
        match event {
            Some(InstallEvent::Progress(line)) => pb.set_message(line),
            Some(InstallEvent::Finished(result)) => outcome = Some(result),
            None => break,
        }
    }

    match outcome {
        Some(InstallOutcome::Installed) => {
            pb.finish_with_message("done");
            println!();
            println!("Model '{}' installed successfully!", model);
            Ok(())
        }
        Some(InstallOutcome::Failed(reason)) => {
            pb.abandon_with_message("failed");
            Err(miette::miette!("Failed to install {}: {}", model, reason))
        }
        None => {
            pb.abandon();
            Err(miette::miette!("Installation of {} ended without a result", model))
        }
    }
}
