use super::{ComponentState, FormcheckApp};
use crate::error::Result;
use tracing::{error, info};

impl FormcheckApp {
    /// Register components and load the pose model
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing Formcheck components");

        let mut states = self.component_states.lock().await;
        states.insert("model".to_string(), ComponentState::Stopped);
        states.insert("session".to_string(), ComponentState::Stopped);
        if self.keyboard_enabled {
            states.insert("keyboard".to_string(), ComponentState::Stopped);
        }
        drop(states);

        self.set_component_state("model", ComponentState::Starting)
            .await;

        let model = &self.config.model;
        match self
            .controller
            .load_model(self.backend.as_ref(), &model.asset, model.delegate)
            .await
        {
            Ok(()) => {
                self.set_component_state("model", ComponentState::Running)
                    .await;
                info!("Pose model ready");
                Ok(())
            }
            Err(e) => {
                self.set_component_state("model", ComponentState::Failed)
                    .await;
                error!("Failed to load pose model: {}", e);
                Err(e)
            }
        }
    }

    /// Start the keyboard controls, then the feedback session
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting Formcheck");

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Starting)
                    .await;

                keyboard_handler.start().await.map_err(|e| {
                    error!("Failed to start keyboard handler: {}", e);
                    e
                })?;

                self.set_component_state("keyboard", ComponentState::Running)
                    .await;
            }
        }

        self.start_session().await
    }

    /// Start the session if idle, stop it if running
    pub async fn toggle(&self) -> Result<()> {
        if self.controller.is_running() {
            self.stop_session().await
        } else {
            self.start_session().await
        }
    }

    pub(super) async fn start_session(&self) -> Result<()> {
        self.set_component_state("session", ComponentState::Starting)
            .await;

        match self.controller.start().await {
            Ok(()) => {
                self.set_component_state("session", ComponentState::Running)
                    .await;
                Ok(())
            }
            Err(e) => {
                self.set_component_state("session", ComponentState::Failed)
                    .await;
                error!("Failed to start feedback session: {}", e);
                Err(e)
            }
        }
    }

    pub(super) async fn stop_session(&self) -> Result<()> {
        self.set_component_state("session", ComponentState::Stopping)
            .await;
        let result = self.controller.stop().await;
        self.set_component_state("session", ComponentState::Stopped)
            .await;
        result
    }
}
