pub mod baseline;
pub mod compliance;
pub mod devices;
pub mod health_scripts;
pub mod login;
pub mod printers;
pub mod probe;
pub mod progress;
pub mod report_template;
pub mod tenant;

use crate::config::ConfigManager;
use crate::error::{IntuneError, Result};
use crate::graph::GraphClient;
use clap::Args;
use colored::Colorize;

/// Connection options shared by every Graph-backed command
#[derive(Args, Debug, Clone, Default)]
pub struct GraphOpts {
    /// Bearer token for Microsoft Graph (skips the tenant token cache)
    #[arg(long, global = true, env = "GRAPH_TOKEN", hide_env_values = true)]
    pub graph_token: Option<String>,

    /// Tenant to use instead of the active one
    #[arg(long, global = true)]
    pub tenant: Option<String>,
}

/// Authenticated Graph client plus a label for output and reports
pub struct Session {
    pub graph: GraphClient,
    pub tenant_label: String,
    pub config: crate::config::Config,
}

/// Resolve a Graph client from `--graph-token` or the tenant token cache
pub async fn connect(opts: &GraphOpts) -> Result<Session> {
    let manager = ConfigManager::load()?;
    let config = manager.load_config()?;

    if let Some(token) = opts.graph_token.as_deref().filter(|t| !t.trim().is_empty()) {
        let label = opts.tenant.clone().unwrap_or_else(|| "token".to_string());
        tracing::debug!("Using bearer token supplied on the command line");
        return Ok(Session {
            graph: GraphClient::new(token.trim().to_string()),
            tenant_label: label,
            config,
        });
    }

    let tenant = match &opts.tenant {
        Some(name) => manager.get_tenant(name)?,
        None => manager.get_active_tenant()?.ok_or_else(|| {
            IntuneError::ConfigError(
                "No active tenant. Run 'intunectl login' or pass --graph-token".into(),
            )
        })?,
    };

    println!("→ Tenant: {}", tenant.name.cyan().bold());
    let graph = GraphClient::from_config(&manager, &tenant.name).await?;

    Ok(Session {
        graph,
        tenant_label: tenant.name,
        config,
    })
}

/// Split comma-separated values and drop blanks
pub fn split_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|v| v.split(','))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}
