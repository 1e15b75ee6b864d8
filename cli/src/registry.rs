//! In-memory registry of setups and their requirements.
//!
//! Backs the tool-invocation surface: setups are loaded from a TOML file,
//! requirements start `unprocessed`, and each finished run overwrites the
//! requirement's state with the latest rollup. The persistent store behind
//! this seam is an external collaborator; this registry is its in-process
//! stand-in.

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use spector_core::api::{Input, Priority, Requirement, Run, RunStatus, VerificationStatus};

#[derive(Debug, Deserialize)]
pub struct SetupSpec {
    pub name: String,
    pub start_url: String,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub requirements: Vec<RequirementSpec>,
}

#[derive(Debug, Deserialize)]
pub struct InputSpec {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct RequirementSpec {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    pub criteria: Vec<String>,
}

impl SetupSpec {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let spec: SetupSpec = toml::from_str(&text)?;
        if spec.requirements.is_empty() {
            anyhow::bail!("setup '{}' has no requirements", spec.name);
        }
        Ok(spec)
    }

    pub fn input(&self) -> Input {
        let mut input = Input::new();
        for pair in &self.inputs {
            input = input.with(pair.name.clone(), pair.value.clone());
        }
        input
    }
}

impl RequirementSpec {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let spec: RequirementSpec = toml::from_str(&text)?;
        if spec.criteria.is_empty() {
            anyhow::bail!("requirement '{}' has no acceptance criteria", spec.title);
        }
        Ok(spec)
    }

    pub fn to_requirement(&self) -> Requirement {
        let mut requirement =
            Requirement::new(self.title.clone(), self.description.clone())
                .with_criteria(self.criteria.iter().cloned());
        requirement.source = self.source.clone();
        requirement.tags = self.tags.clone();
        requirement.priority = self.priority;
        requirement
    }
}

/// Lifecycle of a registered requirement, driven by run outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementState {
    Unprocessed,
    Processing,
    Met,
    PartiallyMet,
    Unmet,
    Error,
}

pub struct RequirementEntry {
    pub requirement: Requirement,
    pub state: RequirementState,
    pub last_run_id: Option<Uuid>,
}

pub struct SetupEntry {
    pub id: u32,
    pub name: String,
    pub start_url: String,
    pub input: Input,
    pub requirements: Vec<RequirementEntry>,
}

#[derive(Default)]
pub struct SetupRegistry {
    setups: RwLock<Vec<SetupEntry>>,
}

/// What a run outcome does to the requirement's registry state.
fn state_for_run(run: &Run) -> RequirementState {
    match run.status {
        RunStatus::Completed => match run.overall() {
            VerificationStatus::Met => RequirementState::Met,
            VerificationStatus::PartiallyMet => RequirementState::PartiallyMet,
            VerificationStatus::Unmet => RequirementState::Unmet,
            VerificationStatus::Error => RequirementState::Error,
        },
        RunStatus::Cancelled => RequirementState::Unprocessed,
        _ => RequirementState::Error,
    }
}

impl SetupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_setup(&self, spec: SetupSpec) -> u32 {
        let mut setups = self.setups.write().unwrap();
        let id = setups.len() as u32 + 1;
        let input = spec.input();
        setups.push(SetupEntry {
            id,
            name: spec.name,
            start_url: spec.start_url,
            input,
            requirements: spec
                .requirements
                .iter()
                .map(|r| RequirementEntry {
                    requirement: r.to_requirement(),
                    state: RequirementState::Unprocessed,
                    last_run_id: None,
                })
                .collect(),
        });
        id
    }

    pub fn with_setups<T>(&self, f: impl FnOnce(&[SetupEntry]) -> T) -> T {
        f(&self.setups.read().unwrap())
    }

    /// Requirement + setup context for a verification, marking it
    /// `processing` on the way out.
    pub fn checkout(
        &self,
        setup_id: u32,
        requirement_id: &Uuid,
    ) -> Option<(Requirement, Input, String)> {
        let mut setups = self.setups.write().unwrap();
        let setup = setups.iter_mut().find(|s| s.id == setup_id)?;
        let start_url = setup.start_url.clone();
        let input = setup.input.clone();
        let entry = setup
            .requirements
            .iter_mut()
            .find(|r| r.requirement.id == *requirement_id)?;
        entry.state = RequirementState::Processing;
        Some((entry.requirement.clone(), input, start_url))
    }

    /// Record a finished run's rollup as the requirement's latest state.
    pub fn record_result(&self, requirement_id: &Uuid, run: &Run) {
        let mut setups = self.setups.write().unwrap();
        for setup in setups.iter_mut() {
            if let Some(entry) = setup
                .requirements
                .iter_mut()
                .find(|r| r.requirement.id == *requirement_id)
            {
                entry.state = state_for_run(run);
                entry.last_run_id = Some(run.id);
                return;
            }
        }
        tracing::warn!(requirement_id = %requirement_id, "run result for unknown requirement");
    }

    pub fn unprocessed(&self, setup_id: u32) -> Vec<Requirement> {
        self.setups
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.id == setup_id)
            .flat_map(|s| {
                s.requirements
                    .iter()
                    .filter(|r| r.state == RequirementState::Unprocessed)
                    .map(|r| r.requirement.clone())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use spector_core::api::ExecutionTarget;
    use std::io::Write;

    const SETUP_TOML: &str = r#"
        name = "webshop"
        start_url = "http://localhost:8002/"

        [[inputs]]
        name = "email"
        value = "john.doe@example.org"

        [[requirements]]
        title = "Explicit search trigger"
        description = "Keyword input is staged until the user submits"
        priority = "high"
        tags = ["ui", "search"]
        criteria = ["typing does not filter", "enter triggers the search"]

        [[requirements]]
        title = "Facet filters apply immediately"
        description = "Category filters apply on click"
        criteria = ["clicking a category updates results"]
    "#;

    fn registry() -> (SetupRegistry, u32) {
        let spec: SetupSpec = toml::from_str(SETUP_TOML).unwrap();
        let registry = SetupRegistry::new();
        let id = registry.add_setup(spec);
        (registry, id)
    }

    #[test]
    fn setup_spec_parses_requirements_and_inputs() {
        let spec: SetupSpec = toml::from_str(SETUP_TOML).unwrap();
        assert_eq!(spec.requirements.len(), 2);
        let req = spec.requirements[0].to_requirement();
        assert_eq!(req.priority, Priority::High);
        assert_eq!(req.criteria[1].name, "AC-2");
        assert_eq!(spec.input().values[0].0, "email");
    }

    #[test]
    fn checkout_marks_processing_and_unprocessed_shrinks() {
        let (registry, id) = registry();
        assert_eq!(registry.unprocessed(id).len(), 2);

        let first = registry.unprocessed(id)[0].clone();
        let (requirement, _input, url) = registry.checkout(id, &first.id).unwrap();
        assert_eq!(requirement.id, first.id);
        assert_eq!(url, "http://localhost:8002/");
        assert_eq!(registry.unprocessed(id).len(), 1);
    }

    #[test]
    fn record_result_updates_state_from_rollup() {
        let (registry, id) = registry();
        let target = registry.unprocessed(id)[0].clone();
        let (requirement, input, url) = registry.checkout(id, &target.id).unwrap();

        let mut run = Run::new(requirement, input, ExecutionTarget::new(url));
        run.transition(spector_core::api::RunStatus::Running).unwrap();
        run.record_failure("backend unavailable");
        run.transition(spector_core::api::RunStatus::Failed).unwrap();
        registry.record_result(&target.id, &run);

        registry.with_setups(|setups| {
            let entry = setups[0]
                .requirements
                .iter()
                .find(|r| r.requirement.id == target.id)
                .unwrap();
            assert_eq!(entry.state, RequirementState::Error);
            assert_eq!(entry.last_run_id, Some(run.id));
        });
    }

    #[test]
    fn setup_load_rejects_empty_requirement_list() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "name = \"empty\"\nstart_url = \"http://x/\"\n").unwrap();
        let err = SetupSpec::load(file.path().to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("no requirements"));
    }

    #[test]
    fn setup_load_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{SETUP_TOML}").unwrap();
        let spec = SetupSpec::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(spec.name, "webshop");
        assert_eq!(spec.requirements.len(), 2);
    }

    #[test]
    fn unknown_ids_are_none() {
        let (registry, id) = registry();
        assert!(registry.checkout(id + 1, &Uuid::new_v4()).is_none());
        assert!(registry.checkout(id, &Uuid::new_v4()).is_none());
    }
}
