pub mod jira;

use async_trait::async_trait;

use crate::error::ApiError;
use crate::model::issue::{AccessibleResource, JiraIssue, Project};
use crate::model::work_item::{IssueKind, Priority};

/// Bearer token plus the Jira Cloud site it is used against.
#[derive(Debug, Clone)]
pub struct CloudAuth {
    pub token: String,
    pub cloud_id: String,
}

/// How a new issue belongs to its owner. Jira expresses this through two
/// unrelated fields depending on the issue type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentLink {
    /// `fields.parent.key`, used by sub-tasks.
    DirectParent(String),
    /// The epic-link custom field, used by stories and tasks.
    EpicLink(String),
    None,
}

impl ParentLink {
    pub fn for_kind(kind: IssueKind, parent_key: Option<String>) -> Self {
        match (kind, parent_key) {
            (IssueKind::SubTask, Some(key)) => ParentLink::DirectParent(key),
            (IssueKind::Story | IssueKind::Task, Some(key)) => ParentLink::EpicLink(key),
            _ => ParentLink::None,
        }
    }
}

/// Fields for a `create_issue` call.
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub kind: IssueKind,
    pub summary: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub labels: Vec<String>,
    pub parent: ParentLink,
}

#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn list_accessible_resources(&self, token: &str) -> Result<Vec<AccessibleResource>, ApiError>;
    async fn list_projects(&self, auth: &CloudAuth) -> Result<Vec<Project>, ApiError>;
    async fn list_issues(&self, auth: &CloudAuth, project_key: &str) -> Result<Vec<JiraIssue>, ApiError>;
    /// Create an issue and return its full representation.
    async fn create_issue(
        &self,
        auth: &CloudAuth,
        project_key: &str,
        issue: &NewIssue,
    ) -> Result<JiraIssue, ApiError>;
    async fn get_issue(&self, auth: &CloudAuth, issue_id: &str) -> Result<JiraIssue, ApiError>;
}
