//! Prompts command handler.
//!
//! Lists the prompt definitions available to the workspace and prints one.

use care_core::{config::AppConfig, AppResult};
use care_prompt::{list_prompts, load_prompt};
use clap::{Args, Subcommand};

/// List or show prompt definitions
#[derive(Args, Debug)]
pub struct PromptsCommand {
    #[command(subcommand)]
    pub action: PromptsAction,
}

#[derive(Subcommand, Debug)]
pub enum PromptsAction {
    /// List every prompt ID with its title
    List,

    /// Print a prompt definition as YAML
    Show {
        /// Prompt ID (e.g. care.judge)
        id: String,
    },
}

impl PromptsCommand {
    /// Execute the prompts command.
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        match &self.action {
            PromptsAction::List => {
                for id in list_prompts(&config.workspace)? {
                    match load_prompt(&config.workspace, &id) {
                        Ok(definition) => println!("{:<16} {}", id, definition.title),
                        Err(e) => {
                            tracing::warn!("Skipping invalid prompt {}: {}", id, e);
                            println!("{:<16} (invalid)", id);
                        }
                    }
                }
            }
            PromptsAction::Show { id } => {
                let definition = load_prompt(&config.workspace, id)?;
                print!("{}", serde_yaml::to_string(&definition)?);
            }
        }
        Ok(())
    }
}
