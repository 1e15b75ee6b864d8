//! Execution session variants.
//!
//! Both variants drive an X display with the same `xdotool`/`import` command
//! vocabulary; they differ only in transport. The local variant runs the
//! commands in-process against the host display, the docker variant proxies
//! them over `docker exec` into the isolated display container. Backend
//! selection is configuration; the orchestrator never branches on it.

mod docker;
mod local;

pub use docker::DockerBackend;
pub use local::LocalBackend;

use std::process::Output;
use std::sync::Arc;

use spector_core::api::{
    Action, Backend, BackendConfig, BackendKind, ScrollDirection, VerifyError,
};
use tokio::process::Command;

/// Build the backend named by configuration.
pub fn from_config(cfg: &BackendConfig) -> Arc<dyn Backend> {
    match cfg.kind {
        BackendKind::Local => Arc::new(LocalBackend::new(cfg.scroll_scale)),
        BackendKind::Docker => Arc::new(DockerBackend::new(&cfg.container, cfg.scroll_scale)),
    }
}

/// Screenshot of the whole display, emitted as base64 on stdout.
pub(crate) fn screenshot_script(display: &str) -> String {
    format!("export DISPLAY={display} && import -window root png:- | base64 -w 0")
}

/// Shell script for one GUI action, or `None` for actions that need no
/// display command (`wait` is slept locally; bookkeeping never reaches a
/// session).
pub(crate) fn action_script(display: &str, action: &Action, scroll_scale: u32) -> Option<String> {
    match action {
        Action::Click { x, y } => Some(format!(
            "DISPLAY={display} xdotool mousemove {x} {y} click 1"
        )),
        Action::Type { text } => {
            // Escape single quotes so spaces and quotes survive the shell.
            let safe = text.replace('\'', "'\\''");
            Some(format!("DISPLAY={display} xdotool type -- '{safe}'"))
        }
        Action::Scroll { direction, amount } => {
            let button = match direction {
                ScrollDirection::Up => 4,
                ScrollDirection::Down => 5,
                ScrollDirection::Left => 6,
                ScrollDirection::Right => 7,
            };
            let clicks = (amount / scroll_scale.max(1)).clamp(1, 10);
            Some(format!(
                "DISPLAY={display} xdotool click --repeat {clicks} {button}"
            ))
        }
        Action::Wait { .. } | Action::AssertCriterion { .. } | Action::Finish { .. } => None,
    }
}

/// Open the target in a fresh private browser window on the display.
pub(crate) fn prepare_script(display: &str, start_url: &str) -> String {
    let safe_url = start_url.replace('\'', "'\\''");
    format!("DISPLAY={display} firefox --private-window '{safe_url}' >/dev/null 2>&1 &")
}

/// Close whatever browser windows `prepare` opened; tolerant when none
/// exist.
pub(crate) fn cleanup_script(display: &str) -> String {
    format!("DISPLAY={display} xdotool search --onlyvisible --class firefox windowclose || true")
}

/// Probe that the display answers at all.
pub(crate) fn probe_script(display: &str) -> String {
    format!("DISPLAY={display} xdotool getdisplaygeometry")
}

/// Run a shell script through the given command and classify failures.
///
/// A spawn error or a missing runtime is permanent; a non-zero exit from the
/// display tooling usually means the display was momentarily busy or the
/// target was not yet rendered, which is the retryable class.
pub(crate) async fn run_script(mut command: Command, script: &str) -> Result<Vec<u8>, VerifyError> {
    let output: Output = command
        .output()
        .await
        .map_err(|e| VerifyError::ActionFailure(format!("failed to spawn shell: {e}")))?;

    if output.status.success() {
        return Ok(output.stdout);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    tracing::debug!(script = %script, stderr = %stderr, "display command failed");
    if stderr.contains("No such container")
        || stderr.contains("is not running")
        || stderr.contains("command not found")
        || stderr.contains("No such file")
    {
        Err(VerifyError::ActionFailure(stderr))
    } else {
        Err(VerifyError::TransientAction(if stderr.is_empty() {
            format!("display command exited with {}", output.status)
        } else {
            stderr
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_script_escapes_single_quotes() {
        let script = action_script(
            ":99",
            &Action::Type {
                text: "it's done".to_string(),
            },
            100,
        )
        .unwrap();
        assert!(script.contains(r#"'it'\''s done'"#));
    }

    #[test]
    fn scroll_clicks_are_scaled_and_clamped() {
        let script = |amount| {
            action_script(
                ":99",
                &Action::Scroll {
                    direction: ScrollDirection::Down,
                    amount,
                },
                100,
            )
            .unwrap()
        };
        assert!(script(250).contains("--repeat 2 5"));
        assert!(script(10).contains("--repeat 1 5"));
        assert!(script(50_000).contains("--repeat 10 5"));
    }

    #[test]
    fn scroll_up_uses_button_four() {
        let script = action_script(
            ":99",
            &Action::Scroll {
                direction: ScrollDirection::Up,
                amount: 100,
            },
            100,
        )
        .unwrap();
        assert!(script.contains("--repeat 1 4"));
    }

    #[test]
    fn bookkeeping_actions_have_no_script() {
        assert!(action_script(":99", &Action::Wait { ms: 100 }, 100).is_none());
        assert!(action_script(
            ":99",
            &Action::Finish {
                summary: "done".into()
            },
            100
        )
        .is_none());
    }
}
