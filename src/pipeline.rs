use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{CreationConfig, JiraConfig, OrphanSubtasks};
use crate::error::{ApiError, AuthError};
use crate::hierarchy::{Hierarchy, ItemId, PlannedItem};
use crate::model::issue::JiraIssue;
use crate::model::work_item::{IssueKind, WorkItem};
use crate::tracker::{CloudAuth, IssueTracker, NewIssue, ParentLink};

/// An issue created by the driver, tied back to the item it came from.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedIssue {
    pub key: String,
    pub kind: IssueKind,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_key: Option<String>,
    pub issue: JiraIssue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Sub-task whose parent was never created.
    UnresolvedParent { parent: Option<String> },
    /// The tracker rejected the create call.
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct NotCreated {
    pub kind: IssueKind,
    pub summary: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreatedIssues {
    pub epics: Vec<CreatedIssue>,
    pub stories: Vec<CreatedIssue>,
    pub tasks: Vec<CreatedIssue>,
    pub subtasks: Vec<CreatedIssue>,
}

impl CreatedIssues {
    pub fn of_kind(&self, kind: IssueKind) -> &[CreatedIssue] {
        match kind {
            IssueKind::Epic => &self.epics,
            IssueKind::Story => &self.stories,
            IssueKind::Task => &self.tasks,
            IssueKind::SubTask => &self.subtasks,
        }
    }

    fn of_kind_mut(&mut self, kind: IssueKind) -> &mut Vec<CreatedIssue> {
        match kind {
            IssueKind::Epic => &mut self.epics,
            IssueKind::Story => &mut self.stories,
            IssueKind::Task => &mut self.tasks,
            IssueKind::SubTask => &mut self.subtasks,
        }
    }
}

/// Outcome of one creation pass. Partial results are normal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreationReport {
    pub created: CreatedIssues,
    pub not_created: Vec<NotCreated>,
}

impl CreationReport {
    pub fn counts(&self) -> [(IssueKind, usize); 4] {
        IssueKind::ALL.map(|kind| (kind, self.created.of_kind(kind).len()))
    }

    pub fn total_created(&self) -> usize {
        self.counts().iter().map(|(_, n)| n).sum()
    }

    pub fn message(&self, project_key: &str) -> String {
        let [epics, stories, tasks, subtasks] = self.counts().map(|(_, n)| n);
        format!(
            "Created {epics} epics, {stories} stories, {tasks} tasks, and {subtasks} sub-tasks in JIRA project {project_key}"
        )
    }
}

/// Create every item of `hierarchy`, one at a time, epics first and
/// sub-tasks last. A failing item is recorded and the pass moves on.
pub async fn create_hierarchy(
    tracker: &dyn IssueTracker,
    auth: &CloudAuth,
    project_key: &str,
    hierarchy: &Hierarchy,
    orphans: OrphanSubtasks,
) -> CreationReport {
    tracing::info!(project = project_key, items = hierarchy.len(), "creating issues");
    let mut report = CreationReport::default();
    let mut keys: HashMap<ItemId, String> = HashMap::new();

    for (kind, level) in hierarchy.levels() {
        for planned in level {
            let parent_key = planned.parent.and_then(|id| keys.get(&id).cloned());
            let item = &planned.item;

            if kind == IssueKind::SubTask && parent_key.is_none() && orphans == OrphanSubtasks::Skip {
                tracing::warn!(
                    summary = %item.summary,
                    parent = item.parent_summary.as_deref().unwrap_or("<none>"),
                    "skipping sub-task without a created parent"
                );
                report.not_created.push(NotCreated {
                    kind,
                    summary: item.summary.clone(),
                    reason: SkipReason::UnresolvedParent {
                        parent: item.parent_summary.clone(),
                    },
                });
                continue;
            }

            if parent_key.is_none() {
                if let Some(parent) = &item.parent_summary {
                    tracing::debug!(summary = %item.summary, %parent, "parent not found, creating unlinked");
                }
            }

            let new_issue = new_issue_for(planned, parent_key.clone());
            match tracker.create_issue(auth, project_key, &new_issue).await {
                Ok(issue) => {
                    tracing::info!(%kind, key = %issue.key, summary = %item.summary, "created issue");
                    keys.insert(planned.id, issue.key.clone());
                    report.created.of_kind_mut(kind).push(CreatedIssue {
                        key: issue.key.clone(),
                        kind,
                        summary: item.summary.clone(),
                        parent_key,
                        issue,
                    });
                }
                Err(e) => {
                    tracing::warn!(%kind, summary = %item.summary, status = ?e.status(), error = %e, "failed to create issue");
                    report.not_created.push(NotCreated {
                        kind,
                        summary: item.summary.clone(),
                        reason: SkipReason::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }
    }

    report
}

fn new_issue_for(planned: &PlannedItem, parent_key: Option<String>) -> NewIssue {
    let item = &planned.item;
    NewIssue {
        kind: item.kind,
        summary: item.summary.clone(),
        description: Some(item.description.clone()).filter(|d| !d.is_empty()),
        priority: Some(item.priority),
        labels: item.labels.clone(),
        parent: ParentLink::for_kind(item.kind, parent_key),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIssuesRequest {
    #[serde(alias = "projectKey")]
    pub project_key: String,
    #[serde(default)]
    pub items: Vec<WorkItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateIssuesResponse {
    pub success: bool,
    pub message: String,
    pub created_issues: CreatedIssues,
    pub not_created: Vec<NotCreated>,
}

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Project key is required")]
    MissingProjectKey,
    #[error("No JIRA items provided")]
    NoItems,
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Failed to retrieve JIRA cloud ID")]
    CloudId(#[source] ApiError),
}

impl RequestError {
    /// HTTP-style status for callers that surface this over the wire.
    pub fn status_code(&self) -> u16 {
        match self {
            RequestError::MissingProjectKey | RequestError::NoItems => 400,
            RequestError::Auth(AuthError::NoAccessibleResources) => 500,
            RequestError::Auth(_) => 401,
            RequestError::CloudId(_) => 500,
        }
    }
}

/// The configured cloud id, or the first site the token can access.
pub async fn resolve_cloud_id(
    tracker: &dyn IssueTracker,
    jira: &JiraConfig,
    token: &str,
) -> Result<String, RequestError> {
    if let Some(id) = jira.cloud_id.as_deref().filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }
    let resources = tracker
        .list_accessible_resources(token)
        .await
        .map_err(RequestError::CloudId)?;
    resources
        .into_iter()
        .next()
        .map(|r| r.id)
        .ok_or(RequestError::Auth(AuthError::NoAccessibleResources))
}

/// Validate a create request, authenticate, and run the creation pass.
pub async fn create_issues(
    tracker: &dyn IssueTracker,
    jira: &JiraConfig,
    creation: &CreationConfig,
    request: CreateIssuesRequest,
    now_ms: i64,
) -> Result<CreateIssuesResponse, RequestError> {
    let token = jira.bearer_token(now_ms)?;
    let project_key = request.project_key.trim();
    if project_key.is_empty() {
        return Err(RequestError::MissingProjectKey);
    }
    if request.items.is_empty() {
        return Err(RequestError::NoItems);
    }

    let auth = CloudAuth {
        token: token.to_string(),
        cloud_id: resolve_cloud_id(tracker, jira, token).await?,
    };

    let hierarchy = Hierarchy::build(request.items);
    let report = create_hierarchy(tracker, &auth, project_key, &hierarchy, creation.orphan_subtasks).await;

    Ok(CreateIssuesResponse {
        success: true,
        message: report.message(project_key),
        created_issues: report.created,
        not_created: report.not_created,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::tests::MockTracker;

    fn auth() -> CloudAuth {
        CloudAuth {
            token: "tok".into(),
            cloud_id: "cloud-1".into(),
        }
    }

    fn jira_config() -> JiraConfig {
        JiraConfig {
            access_token: Some("tok".into()),
            ..Default::default()
        }
    }

    async fn run(tracker: &MockTracker, items: Vec<WorkItem>, orphans: OrphanSubtasks) -> CreationReport {
        create_hierarchy(tracker, &auth(), "APP", &Hierarchy::build(items), orphans).await
    }

    fn keys(issues: &[CreatedIssue]) -> Vec<&str> {
        issues.iter().map(|c| c.key.as_str()).collect()
    }

    #[tokio::test]
    async fn creates_levels_in_fixed_order() {
        let tracker = MockTracker::new();
        let items = vec![
            WorkItem::new(IssueKind::SubTask, "sub").with_parent("task"),
            WorkItem::new(IssueKind::Task, "task").with_parent("story"),
            WorkItem::new(IssueKind::Story, "story").with_parent("epic"),
            WorkItem::new(IssueKind::Epic, "epic"),
            WorkItem::new(IssueKind::Story, "story 2"),
        ];
        let report = run(&tracker, items, OrphanSubtasks::Skip).await;

        let kinds: Vec<_> = tracker.calls().iter().map(|c| c.kind).collect();
        let mut sorted = kinds.clone();
        sorted.sort();
        assert_eq!(kinds, sorted);
        assert_eq!(report.total_created(), 5);
        assert!(report.not_created.is_empty());
    }

    #[tokio::test]
    async fn links_children_to_created_parent_keys() {
        let tracker = MockTracker::new();
        let items = vec![
            WorkItem::new(IssueKind::Epic, "epic"),
            WorkItem::new(IssueKind::Story, "story").with_parent("epic"),
            WorkItem::new(IssueKind::Task, "task").with_parent("story"),
            WorkItem::new(IssueKind::SubTask, "sub").with_parent("task"),
        ];
        let report = run(&tracker, items, OrphanSubtasks::Skip).await;

        assert_eq!(report.created.stories[0].parent_key.as_deref(), Some("APP-1"));
        assert_eq!(report.created.tasks[0].parent_key.as_deref(), Some("APP-2"));
        assert_eq!(report.created.subtasks[0].parent_key.as_deref(), Some("APP-3"));

        let calls = tracker.calls();
        assert_eq!(calls[1].parent, ParentLink::EpicLink("APP-1".into()));
        assert_eq!(calls[2].parent, ParentLink::EpicLink("APP-2".into()));
        assert_eq!(calls[3].parent, ParentLink::DirectParent("APP-3".into()));
    }

    #[tokio::test]
    async fn unknown_story_parent_creates_unlinked() {
        let tracker = MockTracker::new();
        let items = vec![
            WorkItem::new(IssueKind::Epic, "A"),
            WorkItem::new(IssueKind::Epic, "B"),
            WorkItem::new(IssueKind::Story, "s1").with_parent("A"),
            WorkItem::new(IssueKind::Story, "s2").with_parent("A"),
            WorkItem::new(IssueKind::Story, "s3").with_parent("Z"),
        ];
        let report = run(&tracker, items, OrphanSubtasks::Skip).await;

        assert_eq!(keys(&report.created.epics), ["APP-1", "APP-2"]);
        let stories = &report.created.stories;
        assert_eq!(stories.len(), 3);
        assert_eq!(stories[0].parent_key.as_deref(), Some("APP-1"));
        assert_eq!(stories[1].parent_key.as_deref(), Some("APP-1"));
        assert_eq!(stories[2].parent_key, None);
        assert_eq!(tracker.calls()[4].parent, ParentLink::None);
        assert_eq!(
            report.counts(),
            [
                (IssueKind::Epic, 2),
                (IssueKind::Story, 3),
                (IssueKind::Task, 0),
                (IssueKind::SubTask, 0),
            ]
        );
    }

    #[tokio::test]
    async fn orphan_subtask_is_skipped_and_batch_continues() {
        let tracker = MockTracker::new();
        let items = vec![
            WorkItem::new(IssueKind::Task, "task"),
            WorkItem::new(IssueKind::SubTask, "orphan").with_parent("nope"),
            WorkItem::new(IssueKind::SubTask, "no parent at all"),
            WorkItem::new(IssueKind::SubTask, "child").with_parent("task"),
        ];
        let report = run(&tracker, items, OrphanSubtasks::Skip).await;

        assert_eq!(report.created.tasks.len(), 1);
        assert_eq!(report.created.subtasks.len(), 1);
        assert_eq!(report.created.subtasks[0].summary, "child");
        assert_eq!(report.not_created.len(), 2);
        assert_eq!(report.not_created[0].summary, "orphan");
        assert_eq!(
            report.not_created[0].reason,
            SkipReason::UnresolvedParent {
                parent: Some("nope".into())
            }
        );
        assert_eq!(
            report.not_created[1].reason,
            SkipReason::UnresolvedParent { parent: None }
        );
        assert_eq!(tracker.calls().len(), 2);
    }

    #[tokio::test]
    async fn orphan_subtask_created_unlinked_when_configured() {
        let tracker = MockTracker::new();
        let items = vec![WorkItem::new(IssueKind::SubTask, "orphan").with_parent("nope")];
        let report = run(&tracker, items, OrphanSubtasks::CreateUnlinked).await;

        assert_eq!(report.created.subtasks.len(), 1);
        assert_eq!(tracker.calls()[0].parent, ParentLink::None);
    }

    #[tokio::test]
    async fn failed_item_is_recorded_and_children_degrade() {
        let tracker = MockTracker::new().failing_on("epic");
        let items = vec![
            WorkItem::new(IssueKind::Epic, "epic"),
            WorkItem::new(IssueKind::Epic, "other epic"),
            WorkItem::new(IssueKind::Story, "story").with_parent("epic"),
            WorkItem::new(IssueKind::Task, "task").with_parent("story"),
        ];
        let report = run(&tracker, items, OrphanSubtasks::Skip).await;

        assert_eq!(keys(&report.created.epics), ["APP-1"]);
        assert_eq!(report.created.epics[0].summary, "other epic");
        assert_eq!(report.created.stories[0].parent_key, None);
        assert_eq!(report.created.tasks[0].parent_key.as_deref(), Some("APP-2"));
        assert_eq!(report.not_created.len(), 1);
        match &report.not_created[0].reason {
            SkipReason::Failed { error } => assert!(error.contains("400")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_parent_leaves_subtask_orphaned() {
        let tracker = MockTracker::new().failing_on("task");
        let items = vec![
            WorkItem::new(IssueKind::Task, "task"),
            WorkItem::new(IssueKind::SubTask, "sub").with_parent("task"),
        ];
        let report = run(&tracker, items, OrphanSubtasks::Skip).await;

        assert_eq!(report.total_created(), 0);
        assert_eq!(report.not_created.len(), 2);
        assert!(matches!(
            report.not_created[1].reason,
            SkipReason::UnresolvedParent { .. }
        ));
    }

    #[tokio::test]
    async fn passes_item_fields_through() {
        use crate::model::work_item::Priority;

        let tracker = MockTracker::new();
        let items = vec![
            WorkItem::new(IssueKind::Epic, "epic")
                .with_description("the big one")
                .with_priority(Priority::Highest)
                .with_labels(&["Backend", "Security"]),
            WorkItem::new(IssueKind::Epic, "bare"),
        ];
        run(&tracker, items, OrphanSubtasks::Skip).await;

        let calls = tracker.calls();
        assert_eq!(calls[0].description.as_deref(), Some("the big one"));
        assert_eq!(calls[0].priority, Some(Priority::Highest));
        assert_eq!(calls[0].labels, vec!["Backend", "Security"]);
        assert_eq!(calls[1].description, None);
        assert_eq!(calls[1].priority, Some(Priority::Medium));
    }

    #[tokio::test]
    async fn rerunning_a_batch_creates_duplicates() {
        let tracker = MockTracker::new();
        let items = vec![
            WorkItem::new(IssueKind::Epic, "epic"),
            WorkItem::new(IssueKind::Story, "story").with_parent("epic"),
        ];
        let first = run(&tracker, items.clone(), OrphanSubtasks::Skip).await;
        let second = run(&tracker, items, OrphanSubtasks::Skip).await;

        assert_eq!(tracker.calls().len(), 4);
        assert_eq!(keys(&first.created.epics), ["APP-1"]);
        assert_eq!(keys(&second.created.epics), ["APP-3"]);
        assert_eq!(second.created.stories[0].parent_key.as_deref(), Some("APP-3"));
    }

    #[test]
    fn report_message_counts_each_kind() {
        let report = CreationReport::default();
        assert_eq!(
            report.message("APP"),
            "Created 0 epics, 0 stories, 0 tasks, and 0 sub-tasks in JIRA project APP"
        );
    }

    #[tokio::test]
    async fn create_issues_runs_full_request() {
        let tracker = MockTracker::new();
        let request: CreateIssuesRequest = serde_json::from_str(
            r#"{
                "projectKey": "APP",
                "items": [
                    {"type": "Epic", "summary": "A"},
                    {"type": "Story", "summary": "B", "parent": "A"},
                    {"type": "Sub-task", "summary": "C", "parent": "B"}
                ]
            }"#,
        )
        .unwrap();

        let response = create_issues(&tracker, &jira_config(), &CreationConfig::default(), request, 0)
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(
            response.message,
            "Created 1 epics, 1 stories, 0 tasks, and 1 sub-tasks in JIRA project APP"
        );
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["created_issues"]["subtasks"][0]["parent_key"], "APP-2");
        assert_eq!(json["not_created"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn create_issues_rejects_bad_requests() {
        let tracker = MockTracker::new();
        let items = vec![WorkItem::new(IssueKind::Epic, "A")];
        let creation = CreationConfig::default();

        let no_key = CreateIssuesRequest {
            project_key: " ".into(),
            items: items.clone(),
        };
        let err = create_issues(&tracker, &jira_config(), &creation, no_key, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::MissingProjectKey));
        assert_eq!(err.status_code(), 400);

        let no_items = CreateIssuesRequest {
            project_key: "APP".into(),
            items: vec![],
        };
        let err = create_issues(&tracker, &jira_config(), &creation, no_items, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::NoItems));

        let expired = JiraConfig {
            expires_at: Some(10),
            ..jira_config()
        };
        let request = CreateIssuesRequest {
            project_key: "APP".into(),
            items,
        };
        let err = create_issues(&tracker, &expired, &creation, request, 20)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.to_string(), "JIRA session expired. Please reconnect to JIRA.");
        assert!(tracker.calls().is_empty());
    }

    #[tokio::test]
    async fn cloud_id_prefers_configuration() {
        let tracker = MockTracker::new().without_resources();
        let jira = JiraConfig {
            cloud_id: Some("configured".into()),
            ..jira_config()
        };
        assert_eq!(resolve_cloud_id(&tracker, &jira, "tok").await.unwrap(), "configured");
    }

    #[tokio::test]
    async fn cloud_id_falls_back_to_first_resource() {
        let tracker = MockTracker::new();
        assert_eq!(
            resolve_cloud_id(&tracker, &jira_config(), "tok").await.unwrap(),
            "cloud-1"
        );

        let empty = MockTracker::new().without_resources();
        let err = resolve_cloud_id(&empty, &jira_config(), "tok").await.unwrap_err();
        assert!(matches!(err, RequestError::Auth(AuthError::NoAccessibleResources)));
        assert_eq!(err.status_code(), 500);
    }
}
