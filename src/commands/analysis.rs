use clap::{Args, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

use super::{read_input, CommandError, OutputFormat, Session};
use trafego::analysis::AnalysisDesk;

#[derive(Args)]
pub struct AnalysisCommand {
    #[command(subcommand)]
    pub command: AnalysisSubcommand,
}

#[derive(Subcommand)]
pub enum AnalysisSubcommand {
    /// Analyze campaign data with the AI media buyer
    Run {
        /// Campaign data (reads --file or stdin when omitted)
        data: Option<String>,

        /// File holding the campaign data
        #[arg(long, conflicts_with = "data")]
        file: Option<PathBuf>,

        /// Save the result under this title
        #[arg(long)]
        save: Option<String>,
    },

    /// Save an analysis produced earlier
    Save {
        /// Title of the analysis
        #[arg(long)]
        title: String,

        /// File holding the campaign data
        #[arg(long)]
        data_file: PathBuf,

        /// File holding the analysis text
        #[arg(long)]
        result_file: PathBuf,
    },

    /// List saved analyses, newest first
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show a saved analysis
    Show {
        /// Analysis ID (UUID)
        id: Uuid,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a saved analysis
    Delete {
        /// Analysis ID (UUID)
        id: Uuid,
    },
}

impl AnalysisCommand {
    pub async fn run(&self, session: &Session) -> Result<(), CommandError> {
        let desk = AnalysisDesk::new(
            session.analyzer.clone(),
            session.store.clone(),
            session.auth.clone(),
            session.notifier.clone(),
        );

        match &self.command {
            AnalysisSubcommand::Run { data, file, save } => {
                let campaign_data = match data {
                    Some(data) => data.clone(),
                    None => read_input(file.as_deref())?,
                };
                let analysis = desk.run(&campaign_data).await?;
                println!("{}", analysis);
                if let Some(title) = save {
                    desk.save(title, &campaign_data, &analysis).await?;
                }
            }
            AnalysisSubcommand::Save {
                title,
                data_file,
                result_file,
            } => {
                let campaign_data = std::fs::read_to_string(data_file)?;
                let result = std::fs::read_to_string(result_file)?;
                let saved = desk.save(title, &campaign_data, &result).await?;
                println!("{}", saved.id);
            }
            AnalysisSubcommand::List { format } => {
                let history = desk.history().await?;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&history)?),
                    OutputFormat::Text => {
                        if history.is_empty() {
                            println!("No saved analyses.");
                        }
                        for summary in &history {
                            println!(
                                "{}  {}  {}",
                                summary.created_at.format("%Y-%m-%d %H:%M"),
                                summary.id,
                                summary.title
                            );
                        }
                    }
                }
            }
            AnalysisSubcommand::Show { id, format } => {
                let analysis = desk.load(*id).await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&analysis)?)
                    }
                    OutputFormat::Text => {
                        println!("{}", analysis.title);
                        println!("{}\n", "=".repeat(analysis.title.chars().count()));
                        println!("Campaign data:\n{}\n", analysis.campaign_data);
                        println!("Analysis:\n{}", analysis.analysis_result);
                    }
                }
            }
            AnalysisSubcommand::Delete { id } => {
                desk.delete(*id).await?;
            }
        }
        Ok(())
    }
}
