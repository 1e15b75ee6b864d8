use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// One independently verdict-bearing condition within a requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub id: Uuid,
    /// Per-requirement numbering, e.g. "AC-1".
    pub name: String,
    pub text: String,
    #[serde(default)]
    pub tag: Option<String>,
}

impl AcceptanceCriterion {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            text: text.into(),
            tag: None,
        }
    }
}

/// A natural-language requirement with its ordered acceptance criteria.
/// Immutable once a run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub priority: Priority,
    pub criteria: Vec<AcceptanceCriterion>,
}

impl Requirement {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            title: title.into(),
            description: description.into(),
            source: None,
            tags: Vec::new(),
            priority: Priority::default(),
            criteria: Vec::new(),
        }
    }

    /// Attach criteria from bare text, numbering them AC-1..AC-n.
    pub fn with_criteria<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.criteria = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| AcceptanceCriterion::new(format!("AC-{}", i + 1), text))
            .collect();
        self
    }

    pub fn criterion(&self, index: usize) -> Option<&AcceptanceCriterion> {
        self.criteria.get(index)
    }
}

/// Named values (credentials, seed data) that parameterize a trajectory.
/// Order is preserved for prompt rendering; immutable per run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Input {
    pub values: Vec<(String, String)>,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_are_numbered_in_order() {
        let req = Requirement::new("t", "d").with_criteria(["first", "second", "third"]);
        let names: Vec<&str> = req.criteria.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["AC-1", "AC-2", "AC-3"]);
        assert_eq!(req.criterion(1).unwrap().text, "second");
        assert!(req.criterion(3).is_none());
    }

    #[test]
    fn input_preserves_insertion_order() {
        let input = Input::new().with("email", "a@b.c").with("password", "pw");
        assert_eq!(input.values[0].0, "email");
        assert_eq!(input.values[1].0, "password");
    }
}
