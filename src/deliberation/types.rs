//! Discussion data model.

use crate::{ChannelId, DiscussionId, PersonaId, TriggerType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscussionStatus {
    Active,
    Consensus,
    Blocked,
}

impl std::fmt::Display for DiscussionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Active => "active",
            Self::Consensus => "consensus",
            Self::Blocked => "blocked",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DiscussionStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "consensus" => Ok(Self::Consensus),
            "blocked" => Ok(Self::Blocked),
            other => Err(anyhow::anyhow!("unknown discussion status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusResult {
    Approved,
    ChangesRequested,
    HumanNeeded,
}

impl std::fmt::Display for ConsensusResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Approved => "approved",
            Self::ChangesRequested => "changes_requested",
            Self::HumanNeeded => "human_needed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConsensusResult {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "approved" => Ok(Self::Approved),
            "changes_requested" => Ok(Self::ChangesRequested),
            "human_needed" => Ok(Self::HumanNeeded),
            other => Err(anyhow::anyhow!("unknown consensus result: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn discussion_status_round_trips_through_display_and_from_str() {
        for status in [DiscussionStatus::Active, DiscussionStatus::Consensus, DiscussionStatus::Blocked] {
            let rendered = status.to_string();
            assert_eq!(DiscussionStatus::from_str(&rendered).unwrap(), status);
        }
    }

    #[test]
    fn discussion_status_from_str_rejects_unknown_values() {
        assert!(DiscussionStatus::from_str("pending").is_err());
    }

    #[test]
    fn consensus_result_round_trips_through_display_and_from_str() {
        for result in [ConsensusResult::Approved, ConsensusResult::ChangesRequested, ConsensusResult::HumanNeeded] {
            let rendered = result.to_string();
            assert_eq!(ConsensusResult::from_str(&rendered).unwrap(), result);
        }
    }

    #[test]
    fn consensus_result_from_str_rejects_unknown_values() {
        assert!(ConsensusResult::from_str("maybe").is_err());
    }
}

#[derive(Debug, Clone)]
pub struct Discussion {
    pub id: DiscussionId,
    pub project_path: String,
    pub trigger_type: TriggerType,
    pub trigger_ref: String,
    pub context: String,
    pub channel_id: ChannelId,
    pub thread_anchor: String,
    pub status: DiscussionStatus,
    pub round: u32,
    pub replies_used: usize,
    pub participants: Vec<PersonaId>,
    pub consensus_result: Option<ConsensusResult>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}
