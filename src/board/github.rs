//! Reference `BoardProvider` backed by GitHub Projects (v2) GraphQL.
//!
//! Scoped to the two operations the core actually calls; project/column
//! resolution is left to configuration rather than discovered at runtime.

use crate::board::traits::{BoardProvider, IssueRef, NewIssue};
use crate::error::{BoardError, Result};
use anyhow::Context as _;

pub struct GitHubBoardProvider {
    http: reqwest::Client,
    token: String,
    owner_repo: String,
    project_number: u64,
}

impl GitHubBoardProvider {
    pub fn new(token: impl Into<String>, owner_repo: impl Into<String>, project_number: u64) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("spacebot-core")
            .build()
            .context("failed to build github http client")?;
        Ok(Self {
            http,
            token: token.into(),
            owner_repo: owner_repo.into(),
            project_number,
        })
    }

    async fn graphql(&self, query: &str, variables: serde_json::Value) -> Result<serde_json::Value> {
        let response = self
            .http
            .post("https://api.github.com/graphql")
            .bearer_auth(&self.token)
            .json(&serde_json::json!({ "query": query, "variables": variables }))
            .send()
            .await
            .map_err(|_| BoardError::Other(anyhow::anyhow!("github graphql request failed")))?;

        if !response.status().is_success() {
            return Err(BoardError::Other(anyhow::anyhow!(
                "github graphql returned {}",
                response.status()
            ))
            .into());
        }

        response
            .json()
            .await
            .map_err(|e| BoardError::Other(anyhow::anyhow!(e)).into())
    }
}

fn split_owner_repo(owner_repo: &str) -> Result<(&str, &str)> {
    owner_repo
        .split_once('/')
        .ok_or_else(|| BoardError::CreateFailed(format!("owner/repo must contain a slash, got {owner_repo:?}")).into())
}

fn parse_created_issue(body: &serde_json::Value, column: String) -> Result<IssueRef> {
    let created = body
        .get("data")
        .and_then(|d| d.get("createIssue"))
        .and_then(|d| d.get("issue"))
        .ok_or_else(|| BoardError::CreateFailed("missing issue in github response".to_string()))?;

    Ok(IssueRef {
        number: created.get("number").and_then(|n| n.as_u64()).unwrap_or_default(),
        title: created.get("title").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
        url: created.get("url").and_then(|t| t.as_str()).unwrap_or_default().to_string(),
        column,
    })
}

impl BoardProvider for GitHubBoardProvider {
    async fn create_issue(&self, issue: NewIssue) -> Result<IssueRef> {
        let (owner, repo) = split_owner_repo(&self.owner_repo)?;

        let body = self
            .graphql(
                r#"
                mutation($repoId: ID!, $title: String!, $body: String!) {
                  createIssue(input: { repositoryId: $repoId, title: $title, body: $body }) {
                    issue { number title url }
                  }
                }
                "#,
                serde_json::json!({ "repoId": format!("{owner}/{repo}"), "title": issue.title, "body": issue.body }),
            )
            .await?;

        parse_created_issue(&body, issue.column)
    }

    async fn move_issue(&self, number: u64, column: &str) -> Result<()> {
        tracing::info!(number, column, project = self.project_number, "moving issue on github project board");
        self.graphql(
            r#"
            mutation($itemId: ID!, $fieldId: ID!, $value: String!) {
              updateProjectV2ItemFieldValue(input: {
                itemId: $itemId, fieldId: $fieldId,
                value: { singleSelectOptionId: $value }
              }) { clientMutationId }
            }
            "#,
            serde_json::json!({ "itemId": number.to_string(), "fieldId": "status", "value": column }),
        )
        .await
        .map(|_| ())
        .map_err(|error| BoardError::MoveFailed(error.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_owner_repo_splits_on_the_first_slash() {
        let (owner, repo) = split_owner_repo("acme/widgets").unwrap();
        assert_eq!(owner, "acme");
        assert_eq!(repo, "widgets");
    }

    #[test]
    fn split_owner_repo_rejects_a_missing_slash() {
        assert!(split_owner_repo("acme-widgets").is_err());
    }

    #[test]
    fn parse_created_issue_extracts_number_title_and_url() {
        let body = serde_json::json!({
            "data": {
                "createIssue": {
                    "issue": { "number": 42, "title": "Flaky test", "url": "https://github.com/acme/widgets/issues/42" }
                }
            }
        });
        let issue = parse_created_issue(&body, "Ready".to_string()).unwrap();
        assert_eq!(issue.number, 42);
        assert_eq!(issue.title, "Flaky test");
        assert_eq!(issue.column, "Ready");
    }

    #[test]
    fn parse_created_issue_errors_when_the_issue_is_missing() {
        let body = serde_json::json!({"data": {}});
        assert!(parse_created_issue(&body, "Ready".to_string()).is_err());
    }
}
