use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{CloudAuth, IssueTracker, NewIssue, ParentLink};
use crate::error::ApiError;
use crate::model::issue::{AccessibleResource, CreatedRef, IssueFields, JiraIssue, Project};
use crate::util::adf::text_to_adf;

/// Jira Cloud REST v3 client authenticated with OAuth bearer tokens.
pub struct JiraClient {
    api_base: String,
    epic_link_field: String,
    client: reqwest::Client,
}

impl JiraClient {
    pub fn new(api_base: impl Into<String>, epic_link_field: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            epic_link_field: epic_link_field.into(),
            client: reqwest::Client::new(),
        }
    }

    fn rest_url(&self, cloud_id: &str, path: &str) -> String {
        format!("{}/ex/jira/{cloud_id}/rest/api/3/{path}", self.api_base)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, token: &str) -> Result<T, ApiError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;
        Ok(check_status(resp).await?.json().await?)
    }

    /// Request body for `POST /issue`.
    pub fn issue_body(&self, project_key: &str, issue: &NewIssue) -> Value {
        let mut fields = Map::new();
        fields.insert("project".into(), json!({ "key": project_key }));
        fields.insert("summary".into(), json!(issue.summary));
        fields.insert("issuetype".into(), json!({ "name": issue.kind.as_str() }));

        if let Some(description) = issue.description.as_deref().filter(|d| !d.is_empty()) {
            fields.insert("description".into(), text_to_adf(description));
        }
        if let Some(priority) = issue.priority {
            fields.insert("priority".into(), json!({ "name": priority.as_str() }));
        }
        if !issue.labels.is_empty() {
            fields.insert("labels".into(), json!(issue.labels));
        }
        match &issue.parent {
            ParentLink::DirectParent(key) => {
                fields.insert("parent".into(), json!({ "key": key }));
            }
            ParentLink::EpicLink(key) => {
                fields.insert(self.epic_link_field.clone(), json!(key));
            }
            ParentLink::None => {}
        }

        json!({ "fields": fields })
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[derive(Deserialize)]
struct ProjectSearch {
    #[serde(default)]
    values: Vec<Project>,
}

#[derive(Deserialize)]
struct IssueSearch {
    #[serde(default)]
    issues: Vec<JiraIssue>,
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn list_accessible_resources(&self, token: &str) -> Result<Vec<AccessibleResource>, ApiError> {
        let url = format!("{}/oauth/token/accessible-resources", self.api_base);
        self.get_json(&url, token).await
    }

    async fn list_projects(&self, auth: &CloudAuth) -> Result<Vec<Project>, ApiError> {
        let url = self.rest_url(&auth.cloud_id, "project/search");
        let search: ProjectSearch = self.get_json(&url, &auth.token).await?;
        Ok(search.values)
    }

    async fn list_issues(&self, auth: &CloudAuth, project_key: &str) -> Result<Vec<JiraIssue>, ApiError> {
        let jql = format!("project = {project_key} ORDER BY updated DESC");
        let url = format!(
            "{}?jql={}",
            self.rest_url(&auth.cloud_id, "search"),
            urlencoding::encode(&jql)
        );
        let search: IssueSearch = self.get_json(&url, &auth.token).await?;
        Ok(search.issues)
    }

    async fn create_issue(
        &self,
        auth: &CloudAuth,
        project_key: &str,
        issue: &NewIssue,
    ) -> Result<JiraIssue, ApiError> {
        let resp = self
            .client
            .post(self.rest_url(&auth.cloud_id, "issue"))
            .bearer_auth(&auth.token)
            .header("Accept", "application/json")
            .json(&self.issue_body(project_key, issue))
            .send()
            .await?;
        let created: CreatedRef = check_status(resp).await?.json().await?;
        tracing::debug!(id = %created.id, key = %created.key, "issue created, fetching full record");

        // The issue exists once the POST succeeds, so a failed fetch must not
        // lose its key.
        match self.get_issue(auth, &created.id).await {
            Ok(issue) => Ok(issue),
            Err(e) => {
                tracing::warn!(key = %created.key, error = %e, "issue created but fetching it failed");
                Ok(JiraIssue {
                    id: created.id,
                    key: created.key,
                    self_url: String::new(),
                    fields: IssueFields::default(),
                })
            }
        }
    }

    async fn get_issue(&self, auth: &CloudAuth, issue_id: &str) -> Result<JiraIssue, ApiError> {
        let url = self.rest_url(&auth.cloud_id, &format!("issue/{issue_id}"));
        self.get_json(&url, &auth.token).await
    }
}
