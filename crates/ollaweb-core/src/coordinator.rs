//! The single entry point request handlers talk to.

use std::sync::Arc;

use tracing::{debug, info};

use ollaweb_engine::InferenceEngine;

use crate::config::CoordinatorConfig;
use crate::conversation::Conversation;
use crate::error::CoordinatorError;
use crate::installer::{InstallEvent, InstallStream, Installer};
use crate::model::{InstallState, ModelName};
use crate::registry::InstallRegistry;
use crate::session::{GenerationSession, GenerationStream};
use crate::supervisor::{ProcessSupervisor, ServerState};

/// Owns engine supervision, install state and generation for one process.
///
/// Build one at startup and clone the handle into every request path; all
/// clones share the same state.
#[derive(Clone)]
pub struct Coordinator {
    engine: Arc<dyn InferenceEngine>,
    config: Arc<CoordinatorConfig>,
    supervisor: Arc<ProcessSupervisor>,
    registry: InstallRegistry,
    installer: Installer,
}

impl Coordinator {
    pub fn new(engine: Arc<dyn InferenceEngine>, config: CoordinatorConfig) -> Self {
        Self {
            supervisor: Arc::new(ProcessSupervisor::new(
                engine.clone(),
                config.readiness_timeout,
            )),
            registry: InstallRegistry::new(engine.clone()),
            installer: Installer::new(engine.clone(), config.progress_capacity),
            config: Arc::new(config),
            engine,
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The configured fallback model.
    pub fn default_model(&self) -> Result<ModelName, CoordinatorError> {
        Ok(ModelName::new(&self.config.default_model)?)
    }

    /// Launch the engine once; later calls return immediately.
    pub async fn ensure_running(&self) -> Result<(), CoordinatorError> {
        self.supervisor.ensure_running().await
    }

    pub fn server_state(&self) -> ServerState {
        self.supervisor.state()
    }

    /// Ask the engine whether `model` is installed and cache the answer.
    pub async fn check_installed(&self, model: &ModelName) -> bool {
        let ticket = self.installer.mark_checking(model);
        let installed = self.registry.is_installed(model).await;
        self.installer.record_check(model, ticket, installed);
        installed
    }

    /// Installed models as the engine lists them.
    pub async fn installed_models(&self) -> Result<Vec<ModelName>, CoordinatorError> {
        Ok(self.registry.installed_models().await?)
    }

    /// Install `model`, sharing any installation already in flight.
    pub fn install(&self, model: &ModelName) -> InstallStream {
        self.installer.install(model)
    }

    /// Cancel the in-flight installation of `model`, if any.
    pub fn cancel_install(&self, model: &ModelName) -> bool {
        self.installer.cancel(model)
    }

    pub fn install_state(&self, model: &ModelName) -> InstallState {
        self.installer.state(model)
    }

    /// Stream a reply from an installed model.
    ///
    /// Fails fast with [`CoordinatorError::PreconditionFailure`] when the
    /// model is not installed; nothing is installed implicitly here.
    pub async fn generate(
        &self,
        model: &ModelName,
        conversation: Conversation,
    ) -> Result<GenerationStream, CoordinatorError> {
        let ready = match self.installer.state(model) {
            InstallState::Installed => true,
            InstallState::Installing => false,
            _ => self.check_installed(model).await,
        };

        if !ready {
            return Err(CoordinatorError::PreconditionFailure {
                model: model.clone(),
                state: self.installer.state(model),
            });
        }

        Ok(GenerationSession::new(self.engine.clone(), model.clone(), conversation).stream())
    }

    /// Full chat path: start the engine, install the model if missing,
    /// then stream the reply.
    pub async fn chat(
        &self,
        model: &ModelName,
        conversation: Conversation,
    ) -> Result<GenerationStream, CoordinatorError> {
        self.ensure_running().await?;

        if !self.check_installed(model).await {
            info!("Model {} missing; installing before chat", model);
            let mut progress = self.install(model);
            while let Some(event) = progress.next_event().await {
                match event {
                    InstallEvent::Progress(line) => debug!("{}: {}", model, line),
                    InstallEvent::Finished(outcome) => outcome.into_result()?,
                }
            }
        }

        self.generate(model, conversation).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Message;
    use crate::installer::InstallOutcome;
    use crate::testing::FakeEngine;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn coordinator(engine: Arc<FakeEngine>) -> Coordinator {
        let config = CoordinatorConfig::builder().readiness_timeout(None).build();
        Coordinator::new(engine, config)
    }

    fn name(raw: &str) -> ModelName {
        ModelName::new(raw).unwrap()
    }

    fn hello() -> Conversation {
        Conversation::new(vec![Message::user("hello")]).unwrap()
    }

    #[tokio::test]
    async fn test_check_installed_true_after_install() {
        let engine = Arc::new(FakeEngine::new());
        let coordinator = coordinator(engine);
        let model = name("demo-model");

        assert!(!coordinator.check_installed(&model).await);
        assert_eq!(coordinator.install_state(&model), InstallState::NotInstalled);

        assert_eq!(coordinator.install(&model).outcome().await, InstallOutcome::Installed);
        assert!(coordinator.check_installed(&model).await);
        assert_eq!(coordinator.install_state(&model), InstallState::Installed);
    }

    #[tokio::test]
    async fn test_stale_listing_does_not_undo_completed_install() {
        let engine = Arc::new(FakeEngine::new());
        engine.hold_listings();
        let coordinator = coordinator(engine.clone());
        let model = name("demo-model");

        let check = {
            let coordinator = coordinator.clone();
            let model = model.clone();
            tokio::spawn(async move { coordinator.check_installed(&model).await })
        };
        tokio::time::timeout(Duration::from_secs(5), async {
            while engine.parked_listings() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(coordinator.install(&model).outcome().await, InstallOutcome::Installed);
        assert_eq!(coordinator.install_state(&model), InstallState::Installed);

        engine.release_listings();
        assert!(!check.await.unwrap());
        assert_eq!(coordinator.install_state(&model), InstallState::Installed);
    }

    #[tokio::test]
    async fn test_generate_requires_installed_model() {
        let engine = Arc::new(FakeEngine::new());
        let coordinator = coordinator(engine.clone());

        let err = coordinator.generate(&name("missing"), hello()).await.err().unwrap();
        assert!(matches!(
            err,
            CoordinatorError::PreconditionFailure { state: InstallState::NotInstalled, .. }
        ));
        assert!(engine.last_chat().is_none());
    }

    #[tokio::test]
    async fn test_generate_refuses_while_installing() {
        let engine = Arc::new(FakeEngine::new());
        engine.hold_pulls();
        let coordinator = coordinator(engine.clone());
        let model = name("demo-model");

        let progress = coordinator.install(&model);
        let err = coordinator.generate(&model, hello()).await.err().unwrap();
        assert!(matches!(
            err,
            CoordinatorError::PreconditionFailure { state: InstallState::Installing, .. }
        ));

        engine.release_pulls();
        progress.outcome().await;
        let text = coordinator
            .generate(&model, hello())
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();
        assert_eq!(text, "Hello, world");
    }

    #[tokio::test]
    async fn test_chat_starts_installs_and_generates() {
        let engine = Arc::new(FakeEngine::new());
        let coordinator = coordinator(engine.clone());

        let text = coordinator
            .chat(&name("demo-model"), hello())
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();

        assert_eq!(text, "Hello, world");
        assert_eq!(engine.spawn_calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.pull_calls(), vec!["demo-model:latest".to_string()]);
        assert_eq!(coordinator.server_state(), ServerState::Running);
    }

    #[tokio::test]
    async fn test_chat_skips_install_for_installed_model() {
        let engine = Arc::new(FakeEngine::new().with_installed("llava:latest"));
        let coordinator = coordinator(engine.clone());

        coordinator
            .chat(&name("llava"), hello())
            .await
            .unwrap()
            .collect_text()
            .await
            .unwrap();
        assert!(engine.pull_calls().is_empty());
    }

    #[tokio::test]
    async fn test_chat_surfaces_install_failure() {
        let engine = Arc::new(FakeEngine::new().with_failing_pull("bad-model:latest", "manifest unknown"));
        let coordinator = coordinator(engine.clone());
        let model = name("bad-model");

        let err = coordinator.chat(&model, hello()).await.err().unwrap();
        assert!(matches!(err, CoordinatorError::InstallFailure(reason) if reason.contains("manifest unknown")));
        assert!(matches!(coordinator.install_state(&model), InstallState::Failed(_)));
        assert!(engine.last_chat().is_none());
        // The engine process state is untouched by a model failure.
        assert_eq!(coordinator.server_state(), ServerState::Running);
    }

    #[tokio::test]
    async fn test_concurrent_chats_share_install() {
        let engine = Arc::new(FakeEngine::new());
        engine.hold_pulls();
        let coordinator = coordinator(engine.clone());

        let a = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator.chat(&name("demo-model"), hello()).await?.collect_text().await
            })
        };
        let b = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .chat(&name("demo-model:latest"), hello())
                    .await?
                    .collect_text()
                    .await
            })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while !coordinator.installer.is_live(&name("demo-model")) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        // Let the second request reach the live operation too.
        tokio::time::sleep(Duration::from_millis(20)).await;
        engine.release_pulls();

        assert_eq!(a.await.unwrap().unwrap(), "Hello, world");
        assert_eq!(b.await.unwrap().unwrap(), "Hello, world");
        assert_eq!(engine.pull_calls().len(), 1);
    }

    #[test]
    fn test_default_model() {
        let coordinator = coordinator(Arc::new(FakeEngine::new()));
        assert_eq!(coordinator.default_model().unwrap().as_str(), "llama3.2-vision:latest");
    }
}
