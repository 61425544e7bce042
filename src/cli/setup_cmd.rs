use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::debug;

use crate::cli::output::{OutputFormat, OutputOptions};
use crate::cli::prompt;
use crate::core::client::Connector;
use crate::core::config::{AppConfig, ConfigEntry};
use crate::core::config_flow::{ConfigFlow, FlowResult, UserInput};
use crate::core::srp::SrpConnector;

#[derive(Args, Debug, Default)]
pub struct SetupArgs {
    /// SRP billing account id
    #[arg(long, env = "SRP_ACCOUNT_ID")]
    pub account_id: Option<String>,

    /// SRP account username
    #[arg(long, env = "SRP_USERNAME")]
    pub username: Option<String>,

    /// SRP account password
    #[arg(long, env = "SRP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Display name for the sensor
    #[arg(long, env = "SRP_NAME")]
    pub name: Option<String>,

    /// Account is on a time-of-use plan
    #[arg(long, env = "SRP_IS_TOU")]
    pub is_tou: Option<bool>,
}

impl SetupArgs {
    /// Input for a non-interactive import, if every required field was given.
    fn import_input(&self) -> Option<UserInput> {
        Some(UserInput {
            account_id: self.account_id.clone()?,
            username: self.username.clone()?,
            password: self.password.clone()?,
            name: self.name.clone(),
            is_tou: self.is_tou,
        })
    }

    fn defaults(&self) -> UserInput {
        UserInput {
            account_id: self.account_id.clone().unwrap_or_default(),
            username: self.username.clone().unwrap_or_default(),
            password: String::new(),
            name: self.name.clone(),
            is_tou: self.is_tou,
        }
    }
}

pub async fn run(args: SetupArgs, opts: &OutputOptions) -> Result<()> {
    let mut config = AppConfig::load()?;
    let connector: Arc<dyn Connector> = Arc::new(SrpConnector);
    let flow = ConfigFlow::new(connector);

    let result = match args.import_input() {
        Some(input) => flow.step_import(config.entry.as_ref(), input).await,
        None => interactive(&flow, config.entry.as_ref(), &args).await?,
    };

    match result {
        FlowResult::CreateEntry { title, data } => {
            config.entry = Some(data);
            let path = config.save()?;
            report_created(&title, config.entry.as_ref(), &path, opts)?;
        }
        FlowResult::Abort { reason } => {
            eprintln!(
                "An SRP Energy account is already configured ({}).",
                reason.code()
            );
            eprintln!("Run `srp-energy config remove` first to replace it.");
            std::process::exit(1);
        }
        FlowResult::Form { errors, .. } => {
            for (field, error) in &errors {
                eprintln!("Setup failed: {} [{}: {}]", error, field, error.code());
            }
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Show the form until it yields an entry, an abort, or the user cancels.
async fn interactive(
    flow: &ConfigFlow,
    existing: Option<&ConfigEntry>,
    args: &SetupArgs,
) -> Result<FlowResult> {
    let mut result = flow.step_user(existing, None).await;
    let mut defaults = args.defaults();

    loop {
        let errors = match result {
            FlowResult::Form { errors, .. } => errors
                .values()
                .map(|e| e.to_string())
                .collect::<Vec<_>>(),
            other => return Ok(other),
        };

        let input = match prompt::credential_form(&defaults, &errors) {
            Ok(Some(input)) => input,
            Ok(None) => {
                eprintln!("Not a terminal. Pass --account-id, --username and --password (or SRP_* env vars).");
                std::process::exit(1);
            }
            Err(_) => {
                eprintln!("Setup cancelled.");
                std::process::exit(1);
            }
        };
        debug!(input = ?input, "Submitting setup form");

        defaults = UserInput {
            password: String::new(),
            ..input.clone()
        };
        result = flow.step_user(existing, Some(input)).await;
    }
}

fn report_created(
    title: &str,
    entry: Option<&ConfigEntry>,
    path: &std::path::Path,
    opts: &OutputOptions,
) -> Result<()> {
    match opts.format {
        OutputFormat::Text => {
            println!("Configured {}", title);
            if let Some(entry) = entry {
                println!("  Account   {}", entry.account_id);
                println!("  TOU plan  {}", if entry.is_tou { "yes" } else { "no" });
            }
            println!("  Saved to {}", path.display());
        }
        OutputFormat::Json => {
            let payload = serde_json::json!({
                "title": title,
                "account_id": entry.map(|e| e.account_id.as_str()),
                "is_tou": entry.map(|e| e.is_tou),
                "path": path.display().to_string(),
            });
            println!("{}", opts.to_json(&payload)?);
        }
    }
    Ok(())
}
