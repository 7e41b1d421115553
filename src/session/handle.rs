use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use super::events::SessionCommand;
use super::state::SessionState;
use super::stats::{SessionCounters, SessionStats};

/// Cloneable control surface for a running session
///
/// Commands are queued and applied by the session in order. When every
/// handle is dropped the session stops itself.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<SessionCommand>,
    state: watch::Receiver<SessionState>,
    counters: Arc<SessionCounters>,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::Sender<SessionCommand>,
        state: watch::Receiver<SessionState>,
        counters: Arc<SessionCounters>,
    ) -> Self {
        Self {
            commands,
            state,
            counters,
        }
    }

    pub async fn start(&self, identity: impl Into<String>, target_lang: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::Start {
            identity: identity.into(),
            target_lang: target_lang.into(),
        })
        .await
    }

    pub async fn stop(&self) -> Result<()> {
        self.send(SessionCommand::Stop).await
    }

    pub async fn set_target_lang(&self, target_lang: impl Into<String>) -> Result<()> {
        self.send(SessionCommand::SetTargetLang(target_lang.into())).await
    }

    pub async fn retry_payment(&self) -> Result<()> {
        self.send(SessionCommand::RetryPayment).await
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Wait until the session enters `target` (or any terminal state)
    pub async fn wait_for(&mut self, target: SessionState) -> SessionState {
        let reached = self
            .state
            .wait_for(|state| *state == target || state.is_terminal())
            .await
            .map(|state| *state);

        reached.unwrap_or(SessionState::Closed)
    }

    pub fn stats(&self) -> SessionStats {
        self.counters.snapshot(self.state())
    }

    async fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .context("Session is no longer running")
    }
}
