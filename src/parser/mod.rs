//! Pure parsing functions: URL extraction, job/provider/pickup grammars,
//! ambient classification, normalization, and opening-message templates.
//!
//! Nothing here performs I/O; every function is a total, deterministic
//! transform over its input so the router and deliberation engine can be
//! exercised without a live chat/LLM connection.

use regex::Regex;
use std::sync::LazyLock;

pub const STOPWORDS: &[&str] = &[
    "and", "or", "for", "on", "of", "please", "now", "it", "this", "these", "those", "the", "a",
    "an", "pr", "pull", "that", "thanks", "thank", "again", "job", "pipeline",
];

fn is_stopword(hint: &str) -> bool {
    STOPWORDS.contains(&hint.to_lowercase().as_str())
}

static GITHUB_ISSUE_PR_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://github\.com/[A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+/(?:issues|pull)/\d+").unwrap()
});
static GENERIC_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s<>]+").unwrap());
static BRACKET_URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<(https?://[^\s|>]+)(?:\|[^>]*)?>").unwrap());
static USER_MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@[A-Za-z0-9]+>").unwrap());

/// GitHub issue/PR URLs in `text`, restricted to `/issues/\d+` and `/pull/\d+` paths.
pub fn extract_github_issue_urls(text: &str) -> Vec<String> {
    GITHUB_ISSUE_PR_URL.find_iter(text).map(|m| m.as_str().to_string()).collect()
}

/// Plain and bracket-wrapped URLs, excluding anything matched by
/// [`extract_github_issue_urls`].
pub fn extract_generic_urls(text: &str) -> Vec<String> {
    let github: std::collections::HashSet<String> = extract_github_issue_urls(text).into_iter().collect();
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();

    for cap in BRACKET_URL.captures_iter(text) {
        let url = cap[1].to_string();
        if !github.contains(&url) && seen.insert(url.clone()) {
            out.push(url);
        }
    }

    for m in GENERIC_URL.find_iter(text) {
        let url = m.as_str().trim_end_matches(['>', ')', '.', ',']).to_string();
        if !github.contains(&url) && seen.insert(url.clone()) {
            out.push(url);
        }
    }

    out
}

/// Lowercase, collapse whitespace, strip `<@USERID>` mention tokens, while
/// preserving file-path-like segments (`foo/bar.ts`).
pub fn normalize_for_parsing(text: &str) -> String {
    let stripped = USER_MENTION.replace_all(text, " ");
    let lower = stripped.to_lowercase();
    lower.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Equality used for thread-history dedup: collapse whitespace and lowercase.
pub fn normalized_eq(a: &str, b: &str) -> bool {
    normalize_for_parsing(a) == normalize_for_parsing(b)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub provider: String,
    pub project_hint: Option<String>,
    pub prompt: String,
}

static PROVIDER_GRAMMAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:please\s+|can you\s+|someone\s+)?(?:run\s+|use\s+|invoke\s+|trigger\s+|ask\s+)?(claude|codex)\b(?:\s+(?:for|on)\s+([a-z0-9._-]+))?\s*(.*)$",
    )
    .unwrap()
});

/// Direct LLM-provider invocation grammar (§4.1 stage 3). Caller is
/// responsible for the "addressed to bot or begins with command" gate.
pub fn parse_direct_provider_request(text: &str) -> Option<ProviderRequest> {
    let caps = PROVIDER_GRAMMAR.captures(text.trim())?;
    let provider = caps.get(1)?.as_str().to_lowercase();
    let project_hint = caps
        .get(2)
        .map(|m| m.as_str().to_string())
        .filter(|hint| !is_stopword(hint));
    let prompt = caps.get(3).map(|m| m.as_str().trim().to_string()).unwrap_or_default();

    Some(ProviderRequest { provider, project_hint, prompt })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub job: String,
    pub project_hint: Option<String>,
    pub pr_number: Option<String>,
    pub fix_conflicts: bool,
}

static JOB_VERB: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(run|review|qa)\b(?:\s+(?:for|on)\s+([a-z0-9._-]+))?").unwrap());
static PR_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"github\.com/([A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)/pull/(\d+)").unwrap());
static PR_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"/pull/(\d+)").unwrap());
static PR_HASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\d+)\b").unwrap());
static URL_ANY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());
static MERGE_CONFLICT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)merge conflict").unwrap());

/// Job-request grammar (§4.1 stage 4). `parseSlackJobRequest` in spec.
pub fn parse_job_request(text: &str) -> Option<JobRequest> {
    let without_urls = URL_ANY.replace_all(text, " ");
    let pr_number = PR_URL
        .captures(text)
        .map(|c| c[2].to_string())
        .or_else(|| PR_PATH.captures(text).map(|c| c[1].to_string()))
        .or_else(|| PR_HASH.captures(&without_urls).map(|c| c[1].to_string()));

    let verb_match = JOB_VERB.captures(text);
    let mut job = verb_match
        .as_ref()
        .map(|c| c[1].to_lowercase())
        .unwrap_or_else(|| "review".to_string());
    let project_hint = verb_match
        .as_ref()
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
        .filter(|hint| !is_stopword(hint));

    let fix_conflicts = pr_number.is_some() && MERGE_CONFLICT.is_match(text);
    if fix_conflicts {
        job = "review".to_string();
    }

    if verb_match.is_none() && pr_number.is_none() {
        return None;
    }

    Some(JobRequest { job, project_hint, pr_number, fix_conflicts })
}

static PICKUP_INTENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(pick ?up|work on|implement|tackle|start on|grab|handle this|ship this)\b").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuePickup {
    pub owner_repo: String,
    pub issue_number: String,
}

/// Issue-pickup grammar (§4.1 stage 5): a GitHub issue URL plus pickup-intent
/// language.
pub fn parse_issue_pickup(text: &str) -> Option<IssuePickup> {
    if !PICKUP_INTENT.is_match(text) {
        return None;
    }

    let issue_url = Regex::new(r"github\.com/([A-Za-z0-9_.\-]+/[A-Za-z0-9_.\-]+)/issues/(\d+)").unwrap();
    if let Some(caps) = issue_url.captures(text) {
        return Some(IssuePickup { owner_repo: caps[1].to_string(), issue_number: caps[2].to_string() });
    }

    let board_style = Regex::new(r"\?issue=([A-Za-z0-9_.\-]+)\|([A-Za-z0-9_.\-]+)\|(\d+)").unwrap();
    board_style.captures(text).map(|caps| IssuePickup {
        owner_repo: format!("{}/{}", &caps[1], &caps[2]),
        issue_number: caps[3].to_string(),
    })
}

static AMBIENT_GREETING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(hey|hi|hello|yo|sup)\b").unwrap());
static AMBIENT_GROUP_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(guys|team|everyone|folks)\b").unwrap());

/// Ambient team-chatter classifier (§4.1 stage 11).
pub fn is_ambient_chatter(text: &str) -> bool {
    let trimmed = text.trim();
    if !AMBIENT_GREETING.is_match(trimmed) {
        return false;
    }
    let word_count = trimmed.split_whitespace().count();
    AMBIENT_GROUP_WORD.is_match(trimmed) || word_count <= 6
}

/// Parse a `<owner>/<repo>#<number>` trigger ref, as used by issue-review
/// discussions. Malformed refs return `None`.
pub fn parse_issue_ref(trigger_ref: &str) -> Option<(String, u64)> {
    let (repo, number) = trigger_ref.rsplit_once('#')?;
    if !repo.contains('/') || repo.is_empty() {
        return None;
    }
    let number: u64 = number.parse().ok()?;
    Some((repo.to_string(), number))
}

/// Deterministic opening-message templates, selected by hash of `trigger_ref`.
pub fn opening_message(trigger_type: crate::TriggerType, trigger_ref: &str, context: &str) -> String {
    use crate::TriggerType::*;

    let hash = hash_str(trigger_ref);

    match trigger_type {
        PrReview => {
            let templates = [
                format!("Opened PR#{trigger_ref} — let's take a look."),
                format!("New PR up: #{trigger_ref}. Digging in."),
                format!("PR#{trigger_ref} is ready for eyes."),
                format!("Kicking off review on PR#{trigger_ref}."),
            ];
            templates[(hash % templates.len() as u64) as usize].clone()
        }
        BuildFailure => {
            let excerpt: String = context.chars().take(500).collect();
            format!("Build broke on {trigger_ref}. Looking into it.\n\n{excerpt}")
        }
        PrdKickoff => format!("Picking up {trigger_ref}. Going to start carving out the implementation."),
        CodeWatch => {
            let location = extract_labeled_line(context, "Location:").unwrap_or_else(|| "the codebase".to_string());
            let signal = extract_labeled_line(context, "Signal:").unwrap_or_else(|| "something worth a look".to_string());
            let templates = [
                format!("Flagging {signal} at {location}."),
                format!("Caught {signal} at {location}."),
                format!("Noticed {signal} in {location}."),
                format!("Found {signal} — {location}."),
                format!("Heads up on {location}: {signal}."),
            ];
            let mut message = templates[(hash % templates.len() as u64) as usize].clone();
            if let Some(snippet) = extract_labeled_line(context, "Snippet:") {
                message.push_str(&format!("\n```\n{snippet}\n```"));
            }
            message
        }
        IssueReview => {
            let excerpt: String = context.chars().take(500).collect();
            excerpt
        }
    }
}

/// Pull the trimmed value off a `"Label: value"` line in a multi-line
/// trigger context blob, e.g. `extract_labeled_line(ctx, "Signal:")`.
pub fn extract_labeled_line(context: &str, label: &str) -> Option<String> {
    context
        .lines()
        .find_map(|line| line.strip_prefix(label).map(|rest| rest.trim().to_string()))
        .filter(|s| !s.is_empty())
}

fn hash_str(s: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

/// `"fix: <signal> at <location>"`, each component defaulting to generic text.
pub fn code_watch_issue_title(signal: &str, location: &str) -> String {
    let signal = if signal.trim().is_empty() { "an issue" } else { signal.trim() };
    let location = if location.trim().is_empty() { "the codebase" } else { location.trim() };
    format!("fix: {signal} at {location}")
}

const LEADING_VERBS: &[&str] = &["found", "noticed", "flagging", "caught"];

/// Audit-report one-liner → issue title: `"fix: " + lowercased body`, with
/// terminal punctuation and a leading verb stripped, truncated to ≤80 chars
/// of body (≤85 total with the `"fix: "` prefix).
pub fn audit_issue_title(one_liner: &str) -> String {
    let mut body = one_liner.trim().to_lowercase();
    body = body.trim_end_matches(['.', '!', '?']).to_string();

    for verb in LEADING_VERBS {
        if let Some(rest) = body.strip_prefix(verb) {
            body = rest.trim_start().to_string();
            break;
        }
    }

    if body.chars().count() > 80 {
        body = body.chars().take(80).collect();
    }

    format!("fix: {body}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriggerType;

    #[test]
    fn github_issue_and_pr_urls_are_classified_separately() {
        let text = "see https://github.com/org/repo/issues/12 and https://example.com/page and https://github.com/org/repo/pull/5";
        let github = extract_github_issue_urls(text);
        assert_eq!(github, vec![
            "https://github.com/org/repo/issues/12",
            "https://github.com/org/repo/pull/5",
        ]);
        let generic = extract_generic_urls(text);
        assert_eq!(generic, vec!["https://example.com/page"]);
    }

    #[test]
    fn bracket_wrapped_url_contributes_only_the_url() {
        let generic = extract_generic_urls("check <https://example.com/x|label>");
        assert_eq!(generic, vec!["https://example.com/x"]);
    }

    #[test]
    fn normalize_preserves_file_paths() {
        assert_eq!(normalize_for_parsing("See  Foo/Bar.ts now"), "see foo/bar.ts now");
    }

    #[test]
    fn job_grammar_rejects_stopword_hints() {
        let parsed = parse_job_request("run for the project please").unwrap();
        assert_eq!(parsed.job, "run");
        assert_eq!(parsed.project_hint, None);
    }

    #[test]
    fn job_grammar_promotes_merge_conflict_pr_to_review() {
        let parsed = parse_job_request("please review https://github.com/org/repo/pull/42, merge conflicts").unwrap();
        assert_eq!(parsed.job, "review");
        assert_eq!(parsed.pr_number, Some("42".to_string()));
        assert!(parsed.fix_conflicts);
    }

    #[test]
    fn ambient_classifier_matches_group_greeting() {
        assert!(is_ambient_chatter("hey team how is everyone doing today"));
    }

    #[test]
    fn ambient_classifier_does_not_require_deploy_keyword_disqualification() {
        assert!(is_ambient_chatter("hey team please deploy"));
    }

    #[test]
    fn hash_sign_digits_are_not_pr_references_inside_urls() {
        let parsed = parse_job_request("check out https://example.com/page#42");
        assert!(parsed.is_none() || parsed.unwrap().pr_number.is_none());
    }

    #[test]
    fn audit_title_strips_leading_verb_and_truncates() {
        let title = audit_issue_title("Found a race condition in the reply dedup LRU.");
        assert_eq!(title, "fix: a race condition in the reply dedup lru");
    }

    #[test]
    fn issue_ref_requires_owner_repo_hash_number() {
        assert_eq!(parse_issue_ref("facebook/react#444"), Some(("facebook/react".to_string(), 444)));
        assert_eq!(parse_issue_ref("malformed"), None);
    }

    #[test]
    fn opening_message_for_build_failure_includes_context() {
        let message = opening_message(TriggerType::BuildFailure, "main", "stack trace here");
        assert!(message.starts_with("Build broke on main."));
        assert!(message.contains("stack trace here"));
    }
}
