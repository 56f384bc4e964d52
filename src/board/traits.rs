//! The pluggable issue-board contract.

use crate::error::Result;
use std::future::Future;
use std::pin::Pin;

#[derive(Debug, Clone)]
pub struct NewIssue {
    pub title: String,
    pub body: String,
    pub column: String,
}

#[derive(Debug, Clone)]
pub struct IssueRef {
    pub number: u64,
    pub title: String,
    pub url: String,
    pub column: String,
}

pub trait BoardProvider: Send + Sync + 'static {
    fn create_issue(&self, issue: NewIssue) -> impl Future<Output = Result<IssueRef>> + Send;

    fn move_issue(&self, number: u64, column: &str) -> impl Future<Output = Result<()>> + Send;
}

pub trait BoardProviderDyn: Send + Sync + 'static {
    fn create_issue<'a>(
        &'a self,
        issue: NewIssue,
    ) -> Pin<Box<dyn Future<Output = Result<IssueRef>> + Send + 'a>>;

    fn move_issue<'a>(
        &'a self,
        number: u64,
        column: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

impl<T: BoardProvider> BoardProviderDyn for T {
    fn create_issue<'a>(
        &'a self,
        issue: NewIssue,
    ) -> Pin<Box<dyn Future<Output = Result<IssueRef>> + Send + 'a>> {
        Box::pin(BoardProvider::create_issue(self, issue))
    }

    fn move_issue<'a>(
        &'a self,
        number: u64,
        column: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(BoardProvider::move_issue(self, number, column))
    }
}
