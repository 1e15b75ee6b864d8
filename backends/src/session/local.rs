//! Same-process automation session against the host display.

use async_trait::async_trait;
use spector_core::api::{
    Action, ActionResult, Backend, ExecutionTarget, Observation, Session, VerifyError,
};
use tokio::process::Command;

use super::{
    action_script, cleanup_script, prepare_script, probe_script, run_script, screenshot_script,
};

pub struct LocalBackend {
    scroll_scale: u32,
}

impl LocalBackend {
    pub fn new(scroll_scale: u32) -> Self {
        Self { scroll_scale }
    }
}

fn shell(script: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(script);
    command
}

#[async_trait]
impl Backend for LocalBackend {
    fn name(&self) -> &str {
        "local"
    }

    async fn open(&self, target: &ExecutionTarget) -> Result<Box<dyn Session>, VerifyError> {
        let display = target
            .slot
            .as_ref()
            .map(|s| s.display.clone())
            .unwrap_or_else(|| ":0".to_string());

        let probe = probe_script(&display);
        run_script(shell(&probe), &probe)
            .await
            .map_err(|e| VerifyError::BackendUnavailable(format!("display {display}: {e}")))?;

        let display_env = display.as_str();
        tracing::info!(display = %display_env, "opened local session");
        Ok(Box::new(LocalSession {
            display,
            scroll_scale: self.scroll_scale,
        }))
    }
}

pub struct LocalSession {
    display: String,
    scroll_scale: u32,
}

#[async_trait]
impl Session for LocalSession {
    async fn capture(&mut self) -> Result<Observation, VerifyError> {
        let script = screenshot_script(&self.display);
        let stdout = run_script(shell(&script), &script).await?;
        let b64 = String::from_utf8_lossy(&stdout).trim().to_string();
        Ok(Observation::new(b64))
    }

    async fn perform(&mut self, action: &Action) -> Result<ActionResult, VerifyError> {
        if let Action::Wait { ms } = action {
            tokio::time::sleep(std::time::Duration::from_millis(*ms)).await;
            return Ok(ActionResult::success());
        }
        match action_script(&self.display, action, self.scroll_scale) {
            Some(script) => {
                run_script(shell(&script), &script).await?;
                Ok(ActionResult::success())
            }
            None => Ok(ActionResult::success()),
        }
    }

    async fn prepare(&mut self, start_url: &str) -> Result<(), VerifyError> {
        let script = prepare_script(&self.display, start_url);
        run_script(shell(&script), &script).await?;
        // Give the browser a moment to start and render.
        tokio::time::sleep(std::time::Duration::from_millis(2000)).await;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), VerifyError> {
        let script = cleanup_script(&self.display);
        run_script(shell(&script), &script).await?;
        Ok(())
    }

    async fn close(&mut self) {
        tracing::debug!(display = %self.display, "local session closed");
    }
}
