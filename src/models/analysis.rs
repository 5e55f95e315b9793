use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::user::UserId;

/// A campaign analysis the user chose to keep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedAnalysis {
    pub id: Uuid,
    pub owner_id: UserId,
    pub title: String,
    pub campaign_data: String,
    pub analysis_result: String,
    pub created_at: DateTime<Utc>,
}

impl SavedAnalysis {
    pub fn new(
        owner_id: UserId,
        title: impl Into<String>,
        campaign_data: impl Into<String>,
        analysis_result: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            title: title.into(),
            campaign_data: campaign_data.into(),
            analysis_result: analysis_result.into(),
            created_at: Utc::now(),
        }
    }

    pub fn summary(&self) -> AnalysisSummary {
        AnalysisSummary {
            id: self.id,
            title: self.title.clone(),
            created_at: self.created_at,
        }
    }
}

impl fmt::Display for SavedAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", "=".repeat(self.title.chars().count()))?;
        writeln!(f, "Created: {}", self.created_at.format("%Y-%m-%d %H:%M"))?;
        writeln!(f, "\nCampaign data:\n{}", self.campaign_data)?;
        write!(f, "\nAnalysis:\n{}", self.analysis_result)
    }
}

/// History entry: enough to list analyses without their bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
}
