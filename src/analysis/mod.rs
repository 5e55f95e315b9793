//! AI-assisted campaign analysis and the saved-analysis history.

mod gemini;
pub mod prompt;

pub use gemini::{GeminiAnalyzer, GenerateRequest, GenerateResponse, GEMINI_ENDPOINT};

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::backend::{AuthSession, BackendError, DashboardStore};
use crate::models::{AnalysisSummary, SavedAnalysis, User};
use crate::sync::{Notice, Notifier};

/// Longest campaign description accepted for analysis, in characters.
pub const MAX_CAMPAIGN_DATA_CHARS: usize = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Campaign data cannot be empty.")]
    EmptyInput,
    #[error("Invalid campaign data or over the 10,000 character limit.")]
    InvalidInput,
    #[error("Your session has expired. Please sign in again.")]
    NoSession,
    #[error("Gemini API key is not configured.")]
    MissingApiKey,
    #[error("Fill in every field to save the analysis.")]
    Incomplete,
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("{message}")]
    Upstream { status: u16, message: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Rejects blank data and data over [`MAX_CAMPAIGN_DATA_CHARS`].
pub fn validate_campaign_data(campaign_data: &str) -> Result<(), AnalysisError> {
    if campaign_data.trim().is_empty() {
        return Err(AnalysisError::EmptyInput);
    }
    if campaign_data.chars().count() > MAX_CAMPAIGN_DATA_CHARS {
        return Err(AnalysisError::InvalidInput);
    }
    Ok(())
}

/// Something that turns a campaign description into an analysis.
#[async_trait]
pub trait CampaignAnalyzer: Send + Sync {
    async fn analyze(&self, campaign_data: &str) -> Result<String, AnalysisError>;
}

/// Runs analyses for the signed-in user and manages their saved history.
///
/// Every failure is reported through the notifier and returned; nothing is
/// retried.
pub struct AnalysisDesk {
    analyzer: Arc<dyn CampaignAnalyzer>,
    store: Arc<dyn DashboardStore>,
    session: Arc<dyn AuthSession>,
    notifier: Arc<dyn Notifier>,
}

impl AnalysisDesk {
    pub fn new(
        analyzer: Arc<dyn CampaignAnalyzer>,
        store: Arc<dyn DashboardStore>,
        session: Arc<dyn AuthSession>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            analyzer,
            store,
            session,
            notifier,
        }
    }

    fn user(&self) -> Result<User, AnalysisError> {
        self.session.current_user().ok_or(AnalysisError::NoSession)
    }

    fn fail<T>(&self, notice: impl Into<String>, err: AnalysisError) -> Result<T, AnalysisError> {
        tracing::error!("{}", err);
        self.notifier.notify(Notice::error(notice));
        Err(err)
    }

    pub async fn run(&self, campaign_data: &str) -> Result<String, AnalysisError> {
        if campaign_data.trim().is_empty() {
            let err = AnalysisError::EmptyInput;
            return self.fail(err.to_string(), err);
        }
        if let Err(err) = self.user() {
            return self.fail(err.to_string(), err);
        }

        match self.analyzer.analyze(campaign_data).await {
            Ok(analysis) => {
                self.notifier.notify(Notice::success("AI analysis complete!"));
                Ok(analysis)
            }
            Err(err) => self.fail(format!("Analysis failed: {}", err), err),
        }
    }

    pub async fn save(
        &self,
        title: &str,
        campaign_data: &str,
        analysis_result: &str,
    ) -> Result<SavedAnalysis, AnalysisError> {
        let user = match self.user() {
            Ok(user) => user,
            Err(err) => return self.fail(err.to_string(), err),
        };
        if [title, campaign_data, analysis_result]
            .iter()
            .any(|field| field.trim().is_empty())
        {
            let err = AnalysisError::Incomplete;
            return self.fail(err.to_string(), err);
        }

        let analysis = SavedAnalysis::new(user.id, title.trim(), campaign_data, analysis_result);
        match self.store.insert_analysis(&analysis).await {
            Ok(saved) => {
                self.notifier
                    .notify(Notice::success("Analysis saved successfully!"));
                Ok(saved)
            }
            Err(e) => self.fail("An error occurred while saving the analysis.", e.into()),
        }
    }

    /// Saved analyses, newest first.
    pub async fn history(&self) -> Result<Vec<AnalysisSummary>, AnalysisError> {
        let user = self.user()?;
        match self.store.list_analyses(&user.id).await {
            Ok(history) => Ok(history),
            Err(e) => self.fail("Could not load the analysis history.", e.into()),
        }
    }

    pub async fn load(&self, id: Uuid) -> Result<SavedAnalysis, AnalysisError> {
        let user = self.user()?;
        let result: Result<SavedAnalysis, AnalysisError> =
            match self.store.get_analysis(&user.id, id).await {
                Ok(Some(analysis)) => Ok(analysis),
                Ok(None) => Err(BackendError::NotFound(format!("analysis {}", id)).into()),
                Err(e) => Err(e.into()),
            };
        match result {
            Ok(analysis) => {
                self.notifier
                    .notify(Notice::success(format!("Analysis \"{}\" loaded.", analysis.title)));
                Ok(analysis)
            }
            Err(err) => self.fail("Could not load the selected analysis.", err),
        }
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), AnalysisError> {
        let user = self.user()?;
        match self.store.delete_analysis(&user.id, id).await {
            Ok(()) => {
                self.notifier.notify(Notice::success("Analysis deleted."));
                Ok(())
            }
            Err(e) => self.fail("Error deleting the analysis.", e.into()),
        }
    }
}
