use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Level of a work item in the Epic > Story > Task > Sub-task hierarchy.
///
/// The derived ordering is the creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueKind {
    Epic,
    Story,
    Task,
    #[serde(rename = "Sub-task", alias = "Subtask", alias = "SubTask", alias = "Sub-Task")]
    SubTask,
}

impl IssueKind {
    pub const ALL: [IssueKind; 4] = [
        IssueKind::Epic,
        IssueKind::Story,
        IssueKind::Task,
        IssueKind::SubTask,
    ];

    /// Issue type name as Jira expects it in `issuetype.name`.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueKind::Epic => "Epic",
            IssueKind::Story => "Story",
            IssueKind::Task => "Task",
            IssueKind::SubTask => "Sub-task",
        }
    }

    pub fn plural(&self) -> &'static str {
        match self {
            IssueKind::Epic => "epics",
            IssueKind::Story => "stories",
            IssueKind::Task => "tasks",
            IssueKind::SubTask => "sub-tasks",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Highest,
    High,
    #[default]
    Medium,
    Low,
    Lowest,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Highest => "Highest",
            Priority::High => "High",
            Priority::Medium => "Medium",
            Priority::Low => "Low",
            Priority::Lowest => "Lowest",
        }
    }
}

/// A requirement-derived work item as produced by the language model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub priority: Priority,
    /// Summary of the owning item, as written by the model.
    #[serde(rename = "parent", default, skip_serializing_if = "Option::is_none")]
    pub parent_summary: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<String>,
}

/// Models often write `null` for fields they have nothing to say about.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
impl WorkItem {
    pub fn new(kind: IssueKind, summary: impl Into<String>) -> Self {
        Self {
            kind,
            summary: summary.into(),
            description: String::new(),
            priority: Priority::default(),
            parent_summary: None,
            labels: Vec::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent_summary = Some(parent.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_labels(mut self, labels: &[&str]) -> Self {
        self.labels = labels.iter().map(|l| l.to_string()).collect();
        self
    }
}

/// Counts of each kind in a list of items, in creation order.
pub fn count_by_kind(items: &[WorkItem]) -> [(IssueKind, usize); 4] {
    IssueKind::ALL.map(|kind| (kind, items.iter().filter(|i| i.kind == kind).count()))
}
