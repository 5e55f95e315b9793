use clap::{Args, Subcommand};
use uuid::Uuid;

use super::{CommandError, OutputFormat, Session};
use trafego::products::ProductCatalog;

#[derive(Args)]
pub struct ProductCommand {
    #[command(subcommand)]
    pub command: ProductSubcommand,
}

#[derive(Subcommand)]
pub enum ProductSubcommand {
    /// Add a product
    Add {
        /// Product name
        name: String,

        /// Average ticket (price)
        #[arg(long)]
        ticket: Option<f64>,
    },

    /// List products
    List {
        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Delete a product without ledger entries
    Delete {
        /// Product ID (UUID)
        id: Uuid,
    },
}

impl ProductCommand {
    pub async fn run(&self, session: &Session) -> Result<(), CommandError> {
        let catalog = ProductCatalog::new(
            session.store.clone(),
            session.notifier.clone(),
            session.user.id.clone(),
        );

        match &self.command {
            ProductSubcommand::Add { name, ticket } => {
                let product = catalog.add(name, *ticket).await?;
                println!("{}", product);
            }
            ProductSubcommand::List { format } => {
                let products = catalog.list().await?;
                match format {
                    OutputFormat::Json => {
                        println!("{}", serde_json::to_string_pretty(&products)?)
                    }
                    OutputFormat::Text => {
                        if products.is_empty() {
                            println!("No products found.");
                        }
                        for product in &products {
                            println!("{}", product);
                        }
                    }
                }
            }
            ProductSubcommand::Delete { id } => {
                catalog.delete(*id).await?;
            }
        }
        Ok(())
    }
}
