use chrono::{Datelike, Local, NaiveDate};
use clap::{Args, Subcommand};
use uuid::Uuid;

use super::{CommandError, OutputFormat, Session};
use trafego::ledger::{LedgerField, LedgerMonth, LedgerSheet, RowStatus};

#[derive(Args)]
pub struct LedgerCommand {
    #[command(subcommand)]
    pub command: LedgerSubcommand,
}

#[derive(Subcommand)]
pub enum LedgerSubcommand {
    /// Show one month of a product's ledger
    Show {
        /// Product ID (UUID)
        #[arg(long)]
        product: Uuid,

        /// Month as YYYY-MM (defaults to the current month)
        #[arg(long, value_parser = parse_month)]
        month: Option<(i32, u32)>,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Set one cell of a day and save the row
    Set {
        /// Product ID (UUID)
        #[arg(long)]
        product: Uuid,

        /// Day as YYYY-MM-DD
        #[arg(long)]
        date: NaiveDate,

        /// Column: investment, revenue or sales
        #[arg(long)]
        field: LedgerField,

        /// New value; omit to clear the cell
        #[arg(long)]
        value: Option<f64>,
    },
}

fn parse_month(s: &str) -> Result<(i32, u32), String> {
    NaiveDate::parse_from_str(&format!("{}-01", s), "%Y-%m-%d")
        .map(|date| (date.year(), date.month()))
        .map_err(|_| format!("Invalid month '{}'. Use YYYY-MM", s))
}

impl LedgerCommand {
    pub async fn run(&self, session: &Session) -> Result<(), CommandError> {
        match &self.command {
            LedgerSubcommand::Show {
                product,
                month,
                format,
            } => {
                let (year, month) = month.unwrap_or_else(|| {
                    let today = Local::now().date_naive();
                    (today.year(), today.month())
                });
                let ledger = LedgerMonth::load(
                    session.store.as_ref(),
                    &session.user.id,
                    *product,
                    year,
                    month,
                )
                .await?;

                match format {
                    OutputFormat::Text => print!("{}", ledger),
                    OutputFormat::Json => {
                        let rows: Vec<_> = ledger
                            .rows()
                            .filter(|(_, entry)| !entry.is_empty())
                            .map(|(day, entry)| {
                                serde_json::json!({
                                    "day": day,
                                    "investment": entry.investment,
                                    "revenue": entry.revenue,
                                    "sales": entry.sales,
                                    "result": entry.result(),
                                    "roi": entry.roi(),
                                    "cpa": entry.cpa(),
                                })
                            })
                            .collect();
                        println!("{}", serde_json::to_string_pretty(&rows)?);
                    }
                }
                Ok(())
            }
            LedgerSubcommand::Set {
                product,
                date,
                field,
                value,
            } => {
                let mut sheet = LedgerSheet::open(
                    session.store.clone(),
                    session.notifier.clone(),
                    session.user.id.clone(),
                    *product,
                    date.year(),
                    date.month(),
                )
                .await?
                .with_delay(session.autosave_delay);

                sheet.edit(date.day(), *field, *value)?;
                // A one-shot command saves right away instead of waiting
                if sheet.flush().await == 0 {
                    return Err(CommandError::SaveFailed);
                }
                if sheet.status(date.day()) == RowStatus::Saved {
                    println!("Saved {}", date);
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_month() {
        assert_eq!(parse_month("2024-02"), Ok((2024, 2)));
        assert!(parse_month("2024-13").is_err());
        assert!(parse_month("feb").is_err());
    }
}
