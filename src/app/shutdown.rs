use super::{ComponentState, FormcheckApp};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

impl FormcheckApp {
    /// Stop the keyboard and the session, then release the pose engine
    pub async fn shutdown(&mut self) -> crate::error::Result<i32> {
        info!("Beginning graceful shutdown");

        let mut exit_code = 0;

        if self.keyboard_enabled {
            if let Some(keyboard_handler) = &self.keyboard_handler {
                self.set_component_state("keyboard", ComponentState::Stopping)
                    .await;
                if let Err(e) = keyboard_handler.stop().await {
                    error!("Error stopping keyboard: {}", e);
                    exit_code = 1;
                }
                self.set_component_state("keyboard", ComponentState::Stopped)
                    .await;
            }
        }

        self.set_component_state("session", ComponentState::Stopping)
            .await;
        match timeout(Duration::from_secs(10), self.controller.shutdown()).await {
            Ok(Ok(())) => {
                self.set_component_state("session", ComponentState::Stopped)
                    .await;
                self.set_component_state("model", ComponentState::Stopped)
                    .await;
            }
            Ok(Err(e)) => {
                self.set_component_state("session", ComponentState::Failed)
                    .await;
                error!("Error stopping feedback session: {}", e);
                exit_code = 1;
            }
            Err(_) => {
                self.set_component_state("session", ComponentState::Failed)
                    .await;
                error!("Feedback session stop timeout");
                exit_code = 1;
            }
        }

        info!("Graceful shutdown completed with exit code: {}", exit_code);
        Ok(exit_code)
    }
}
