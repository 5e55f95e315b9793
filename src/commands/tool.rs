use clap::{Args, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

use super::{read_input, CommandError, OutputFormat, Session};
use trafego::calculators::{
    CpaMaximo, MetricasAgendamento, Planejamento, Simulador, Sonar, Tool, ToolKind,
};
use trafego::sync::{SaveOutcome, ToolDataSync};

#[derive(Args)]
pub struct ToolCommand {
    #[command(subcommand)]
    pub command: ToolSubcommand,
}

#[derive(Subcommand)]
pub enum ToolSubcommand {
    /// Show a tool's saved inputs and its results
    Show {
        /// Tool name (cpa_maximo, simulador, planejamento, metricas_agendamento, sonar)
        tool: ToolKind,

        /// Output format
        #[arg(long, short, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Change input fields and save
    Set {
        tool: ToolKind,

        /// Assignments as field=value; values are JSON, bare words are strings
        #[arg(required = true, value_name = "FIELD=VALUE")]
        assignments: Vec<String>,
    },

    /// Replace a tool's inputs with a JSON document and save
    Save {
        tool: ToolKind,

        /// File holding the JSON payload (reads stdin when omitted)
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Follow changes made from other sessions until interrupted
    Watch { tool: ToolKind },
}

/// Describes a change received from another session.
type Describe<T> = fn(&T, &T) -> Option<String>;

fn no_description<T>(_: &T, _: &T) -> Option<String> {
    None
}

fn describe_scheduling(old: &MetricasAgendamento, new: &MetricasAgendamento) -> Option<String> {
    MetricasAgendamento::changed_field(old, new).map(|field| format!("'{}' was changed", field))
}

impl ToolCommand {
    pub async fn run(&self, session: &Session) -> Result<(), CommandError> {
        match self.tool() {
            ToolKind::CpaMaximo => self.run_for::<CpaMaximo>(session, no_description).await,
            ToolKind::Simulador => self.run_for::<Simulador>(session, no_description).await,
            ToolKind::Planejamento => self.run_for::<Planejamento>(session, no_description).await,
            ToolKind::MetricasAgendamento => {
                self.run_for::<MetricasAgendamento>(session, describe_scheduling)
                    .await
            }
            ToolKind::Sonar => self.run_for::<Sonar>(session, no_description).await,
        }
    }

    fn tool(&self) -> ToolKind {
        match &self.command {
            ToolSubcommand::Show { tool, .. }
            | ToolSubcommand::Set { tool, .. }
            | ToolSubcommand::Save { tool, .. }
            | ToolSubcommand::Watch { tool } => *tool,
        }
    }

    async fn run_for<T: Tool>(
        &self,
        session: &Session,
        describe: Describe<T>,
    ) -> Result<(), CommandError> {
        match &self.command {
            ToolSubcommand::Show { format, .. } => {
                let sync = mount::<T>(session).await;
                let payload = sync.payload();
                sync.unmount().await;
                match format {
                    OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&payload)?),
                    OutputFormat::Text => print_tool(&payload)?,
                }
                Ok(())
            }
            ToolSubcommand::Set { assignments, .. } => {
                let sync = mount::<T>(session).await;
                let result = set_fields(&sync, assignments).await;
                sync.unmount().await;
                let (payload, outcome) = result?;
                finish_save(outcome, &payload)
            }
            ToolSubcommand::Save { file, .. } => {
                let contents = read_input(file.as_deref())?;
                let payload: T = serde_json::from_str(&contents)?;
                let sync = mount::<T>(session).await;
                let outcome = sync.save(&payload).await;
                sync.unmount().await;
                finish_save(outcome, &payload)
            }
            ToolSubcommand::Watch { .. } => {
                let sync = ToolDataSync::builder(session.tools.clone(), T::NAME, T::default())
                    .notifier(session.notifier.clone())
                    .settings(session.settings)
                    .on_remote_update(move |old: &T, new: &T| {
                        match describe(old, new) {
                            Some(change) => eprintln!("Updated from another session: {}", change),
                            None => eprintln!("Updated from another session"),
                        }
                        println!("{}\n", new.evaluate());
                    })
                    .mount()
                    .await;

                println!("{}\n", sync.payload().evaluate());
                eprintln!("Watching {} for changes (Ctrl-C to stop)", T::NAME);
                tokio::signal::ctrl_c().await?;
                sync.unmount().await;
                Ok(())
            }
        }
    }
}

async fn mount<T: Tool>(session: &Session) -> ToolDataSync<T> {
    ToolDataSync::builder(session.tools.clone(), T::NAME, T::default())
        .notifier(session.notifier.clone())
        .settings(session.settings)
        .mount()
        .await
}

fn print_tool<T: Tool>(payload: &T) -> Result<(), CommandError> {
    println!("{}", T::NAME);
    println!("{}\n", "=".repeat(T::NAME.len()));
    if let Value::Object(fields) = serde_json::to_value(payload)? {
        for (name, value) in fields {
            println!("  {}: {}", name, value);
        }
    }
    println!("\n{}", payload.evaluate());
    Ok(())
}

fn finish_save<T: Tool>(outcome: SaveOutcome, payload: &T) -> Result<(), CommandError> {
    match outcome {
        SaveOutcome::Saved => {
            println!("{}", payload.evaluate());
            Ok(())
        }
        SaveOutcome::Refused => Err(CommandError::NoSession),
        SaveOutcome::Failed | SaveOutcome::Discarded => Err(CommandError::SaveFailed),
    }
}

/// Edits the loaded inputs and saves them.
///
/// The record is saved whole, so editing the fallback defaults after a
/// failed load would overwrite every field the user had stored.
async fn set_fields<T: Tool>(
    sync: &ToolDataSync<T>,
    assignments: &[String],
) -> Result<(T, SaveOutcome), CommandError> {
    if sync.state().load_failed {
        return Err(CommandError::LoadFailed(T::NAME.to_string()));
    }
    let payload = apply_assignments(&sync.payload(), assignments)?;
    sync.set_payload(payload.clone());
    let outcome = sync.save_current().await;
    Ok((payload, outcome))
}

/// Applies `field=value` edits to a payload's JSON form and checks the
/// result still deserializes as `T`.
fn apply_assignments<T: Tool>(payload: &T, assignments: &[String]) -> Result<T, CommandError> {
    let mut value = serde_json::to_value(payload)?;
    let Value::Object(fields) = &mut value else {
        return Err(CommandError::Usage(format!(
            "{} has no editable fields",
            T::NAME
        )));
    };

    for assignment in assignments {
        let (name, raw) = assignment.split_once('=').ok_or_else(|| {
            CommandError::Usage(format!(
                "Invalid assignment '{}'. Use field=value",
                assignment
            ))
        })?;
        let Some(slot) = fields.get_mut(name) else {
            let valid: Vec<&str> = fields.keys().map(String::as_str).collect();
            return Err(CommandError::Usage(format!(
                "Unknown field '{}' for {}. Valid fields: {}",
                name,
                T::NAME,
                valid.join(", ")
            )));
        };
        *slot = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    }

    Ok(serde_json::from_value(value)?)
}
