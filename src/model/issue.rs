use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::adf::extract_text_from_adf;

/// One Jira Cloud site the bearer token is authorised for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessibleResource {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub simplified: Option<bool>,
}

/// Full issue representation as returned by `GET /issue/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraIssue {
    pub id: String,
    pub key: String,
    #[serde(rename = "self", default)]
    pub self_url: String,
    #[serde(default)]
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NamedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuetype: Option<NamedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<NamedField>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ParentRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedField {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentRef {
    pub key: String,
}

impl JiraIssue {
    pub fn summary(&self) -> &str {
        self.fields.summary.as_deref().unwrap_or_default()
    }

    /// Plain-text description, flattened from ADF when needed.
    pub fn description_text(&self) -> Option<String> {
        self.fields
            .description
            .as_ref()
            .and_then(extract_text_from_adf)
    }
}

/// Reply to `POST /issue`; only identifiers come back.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRef {
    pub id: String,
    pub key: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_with_adf_description_flattens_to_text() {
        let json = r#"{
            "id": "10001",
            "key": "APP-1",
            "self": "https://example/rest/api/3/issue/10001",
            "fields": {
                "summary": "Login",
                "description": {"type":"doc","version":1,"content":[
                    {"type":"paragraph","content":[{"type":"text","text":"Users sign in"}]}
                ]},
                "issuetype": {"name": "Story"}
            }
        }"#;
        let issue: JiraIssue = serde_json::from_str(json).unwrap();
        assert_eq!(issue.summary(), "Login");
        assert_eq!(issue.description_text().as_deref(), Some("Users sign in"));
        assert_eq!(issue.fields.issuetype.unwrap().name, "Story");
    }

    #[test]
    fn issue_without_fields_still_parses() {
        let issue: JiraIssue = serde_json::from_str(r#"{"id":"1","key":"APP-1"}"#).unwrap();
        assert_eq!(issue.summary(), "");
        assert!(issue.description_text().is_none());
    }
}
