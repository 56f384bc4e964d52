//! Reference [`crate::proactive::RoadmapReader`]: reads a project's
//! `ROADMAP.md` checklist. Best-effort — a missing or unparsable file just
//! yields an empty, `found: false` summary.

use crate::proactive::{RoadmapItem, RoadmapReader, RoadmapSummary};
use regex::Regex;
use std::sync::LazyLock;

static CHECKLIST_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*-\s*\[( |x|X)\]\s*(.+)$").unwrap());

pub struct MarkdownRoadmapReader;

impl RoadmapReader for MarkdownRoadmapReader {
    async fn read(&self, project_path: &str) -> RoadmapSummary {
        let path = std::path::Path::new(project_path).join("ROADMAP.md");
        let Ok(content) = tokio::fs::read_to_string(&path).await else {
            return RoadmapSummary::default();
        };

        let items: Vec<RoadmapItem> = content.lines().filter_map(parse_checklist_line).collect();
        if items.is_empty() {
            return RoadmapSummary::default();
        }

        RoadmapSummary { found: true, items }
    }
}

fn parse_checklist_line(line: &str) -> Option<RoadmapItem> {
    let caps = CHECKLIST_ITEM.captures(line)?;
    let checked = caps[1].eq_ignore_ascii_case("x");
    let title = caps[2].trim().to_string();
    Some(RoadmapItem { title, checked, processed: false })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_checklist() {
        let item = parse_checklist_line("- [x] ship the router").unwrap();
        assert!(item.checked);
        assert_eq!(item.title, "ship the router");

        let item = parse_checklist_line("- [ ] write DESIGN.md").unwrap();
        assert!(!item.checked);

        assert!(parse_checklist_line("just prose, no checklist").is_none());
    }
}
