use super::{ComponentState, FormcheckApp, ShutdownReason};
use crate::error::{FormcheckError, Result};
use crate::events::{EventFilter, EventReceiver, FormcheckEvent, SessionStatus};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tracing::{info, warn};

impl FormcheckApp {
    /// Run until a signal or a shutdown request, reacting to start/stop toggles
    pub async fn run(&mut self) -> Result<i32> {
        info!("Formcheck is running");

        let shutdown_sender = self
            .shutdown_sender
            .take()
            .ok_or_else(|| FormcheckError::system("Shutdown sender already taken"))?;
        let mut shutdown_receiver = self
            .shutdown_receiver
            .take()
            .ok_or_else(|| FormcheckError::system("Shutdown receiver already taken"))?;

        self.setup_signal_handlers(shutdown_sender);

        let mut requests = EventReceiver::new(
            self.event_bus.subscribe(),
            EventFilter::EventTypes(vec![
                "toggle_requested",
                "shutdown_requested",
                "status_changed",
            ]),
            "app".to_string(),
        );

        let shutdown_reason = loop {
            tokio::select! {
                reason = &mut shutdown_receiver => {
                    break reason.map_err(|_| {
                        FormcheckError::system("Shutdown channel closed unexpectedly")
                    })?;
                }
                event = requests.recv() => match event {
                    Some(FormcheckEvent::ToggleRequested { .. }) => {
                        // Failures are already reported through session status events
                        if let Err(e) = self.toggle().await {
                            warn!("Start/stop toggle failed: {}", e);
                        }
                    }
                    Some(FormcheckEvent::ShutdownRequested { reason, .. }) => {
                        break ShutdownReason::UserRequest(reason);
                    }
                    Some(FormcheckEvent::StatusChanged {
                        status: SessionStatus::AcquisitionFailed,
                        ..
                    }) => {
                        // The controller ended the session on its own
                        self.set_component_state("session", ComponentState::Failed)
                            .await;
                    }
                    Some(_) => {}
                    None => break ShutdownReason::Error("Event bus closed".to_string()),
                }
            }
        };

        info!("Shutdown initiated: {:?}", shutdown_reason);

        let exit_code = self.shutdown().await?;

        info!("Formcheck shutdown complete");
        Ok(exit_code)
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm =
                    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                        Ok(sigterm) => sigterm,
                        Err(e) => {
                            warn!("Failed to register SIGTERM handler: {}", e);
                            return;
                        }
                    };

                if let Some(()) = sigterm.recv().await {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
