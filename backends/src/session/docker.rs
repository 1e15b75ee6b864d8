//! Session proxied into the isolated display container.
//!
//! The same command vocabulary as the local variant, executed through
//! `docker exec` into a container that hosts the pooled displays. Opening a
//! session probes container liveness first; a stopped container is a
//! `BackendUnavailable`, not a run-time action failure.

use async_trait::async_trait;
use spector_core::api::{
    Action, ActionResult, Backend, ExecutionTarget, Observation, Session, VerifyError,
};
use tokio::process::Command;

use super::{
    action_script, cleanup_script, prepare_script, probe_script, run_script, screenshot_script,
};

pub struct DockerBackend {
    container: String,
    scroll_scale: u32,
}

impl DockerBackend {
    pub fn new(container: impl Into<String>, scroll_scale: u32) -> Self {
        Self {
            container: container.into(),
            scroll_scale,
        }
    }
}

fn docker_exec(container: &str, script: &str) -> Command {
    let mut command = Command::new("docker");
    command.args(["exec", container, "sh", "-c", script]);
    command
}

#[async_trait]
impl Backend for DockerBackend {
    fn name(&self) -> &str {
        "docker"
    }

    async fn open(&self, target: &ExecutionTarget) -> Result<Box<dyn Session>, VerifyError> {
        let display = target
            .slot
            .as_ref()
            .map(|s| s.display.clone())
            .unwrap_or_else(|| ":99".to_string());

        // Container liveness first; `docker ps` is cheaper and clearer than
        // a failed exec.
        let mut ps = Command::new("docker");
        ps.args(["ps", "-q", "-f", &format!("name={}", self.container)]);
        let output = ps.output().await.map_err(|e| {
            VerifyError::BackendUnavailable(format!("docker not reachable: {e}"))
        })?;
        if output.stdout.is_empty() {
            return Err(VerifyError::BackendUnavailable(format!(
                "container {} is not running",
                self.container
            )));
        }

        let probe = probe_script(&display);
        run_script(docker_exec(&self.container, &probe), &probe)
            .await
            .map_err(|e| VerifyError::BackendUnavailable(format!("display {display}: {e}")))?;

        let display_env = display.as_str();
        tracing::info!(container = %self.container, display = %display_env, "opened docker session");
        Ok(Box::new(DockerSession {
            container: self.container.clone(),
            display,
            scroll_scale: self.scroll_scale,
        }))
    }
}

pub struct DockerSession {
    container: String,
    display: String,
    scroll_scale: u32,
}

impl DockerSession {
    async fn exec(&self, script: &str) -> Result<Vec<u8>, VerifyError> {
        run_script(docker_exec(&self.container, script), script).await
    }
}

#[async_trait]
impl Session for DockerSession {
    async fn capture(&mut self) -> Result<Observation, VerifyError> {
        let script = screenshot_script(&self.display);
        let stdout = self.exec(&script).await?;
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
                self.exec(&script).await?;
                Ok(ActionResult::success())
            }
            None => Ok(ActionResult::success()),
        }
    }

    async fn prepare(&mut self, start_url: &str) -> Result<(), VerifyError> {
        let script = prepare_script(&self.display, start_url);
        self.exec(&script).await?;
        tokio::time::sleep(std::time::Duration::from_millis(2000)).await;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), VerifyError> {
        let script = cleanup_script(&self.display);
        self.exec(&script).await?;
        Ok(())
    }

    async fn close(&mut self) {
        tracing::debug!(container = %self.container, display = %self.display, "docker session closed");
    }
}
