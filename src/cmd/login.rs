use crate::config::{AuthType, ConfigManager, TenantConfig};
use crate::error::{IntuneError, Result};
use crate::graph::auth::GraphAuth;
use clap::Args;
use colored::Colorize;

/// First `n` characters, safe on non-ASCII input
fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Tenant name; looked up in tenants.toml, then tenants.env, then <name>.env
    #[arg(index = 1)]
    name: Option<String>,

    /// Entra ID tenant ID (quick setup)
    #[arg(long)]
    tenant_id: Option<String>,

    /// App registration client ID (quick setup)
    #[arg(long)]
    client_id: Option<String>,

    /// Client secret for the client credentials flow
    #[arg(long, env = "INTUNECTL_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,

    /// Use client credentials instead of the device code flow
    #[arg(long)]
    client_credentials: bool,

    #[arg(long)]
    description: Option<String>,

    /// Import from env files without authenticating
    #[arg(long)]
    import_only: bool,
}

#[derive(Args, Debug)]
pub struct LogoutArgs {
    /// Tenant name (default: the active tenant)
    #[arg(index = 1)]
    name: Option<String>,

    /// Clear cached tokens for every tenant
    #[arg(long)]
    all: bool,
}

fn not_found_help(name: &str) -> IntuneError {
    IntuneError::ConfigError(format!(
        "Tenant '{}' not found.\n\n\
        Add it to tenants.env in the config directory:\n   \
           [{}]\n   \
           TENANT_ID=your-tenant-id\n   \
           CLIENT_ID=your-client-id\n   \
           CLIENT_SECRET=your-secret\n\n\
        or run: intunectl tenant add {} --tenant-id ... --client-id ...",
        name,
        name.to_uppercase(),
        name
    ))
}

pub async fn login(args: LoginArgs) -> Result<()> {
    let config_manager = ConfigManager::load()?;
    let auth = GraphAuth::new(config_manager.clone());

    let tenant_config = match (&args.name, &args.tenant_id, &args.client_id) {
        (name, Some(tenant_id), Some(client_id)) => {
            let name = name.clone().unwrap_or_else(|| {
                let auto_name = tenant_id.split('-').next().unwrap_or("tenant").to_string();
                println!("{} Auto-generated tenant name: {}", "→".cyan(), auto_name.bold());
                auto_name
            });

            let auth_type = if args.client_credentials || args.client_secret.is_some() {
                AuthType::ClientCredentials
            } else {
                AuthType::DeviceCode
            };

            let tenant = TenantConfig {
                name: name.clone(),
                tenant_id: tenant_id.clone(),
                client_id: client_id.clone(),
                client_secret: args.client_secret.clone(),
                auth_type,
                description: args.description.clone(),
            };
            config_manager.add_tenant(tenant.clone())?;
            println!("{} Tenant '{}' saved", "✓".green(), name);
            tenant
        }
        (Some(name), _, _) => {
            let tenant = config_manager
                .get_tenant_or_env(name)
                .map_err(|_| not_found_help(name))?;

            println!(
                "{} Loaded tenant: {} {}",
                "✓".green(),
                tenant.name.bold(),
                tenant.description.as_deref().unwrap_or("").dimmed()
            );
            println!("  Tenant ID: {}...", truncate_chars(&tenant.tenant_id, 8));
            println!("  Client ID: {}...", truncate_chars(&tenant.client_id, 8));

            if args.import_only {
                println!(
                    "\n{} Imported. Run 'intunectl login {}' to authenticate.",
                    "→".cyan(),
                    tenant.name
                );
                return Ok(());
            }
            tenant
        }
        _ => {
            return Err(IntuneError::InvalidConfig(
                "Usage:\n  \
                intunectl login CONTOSO                        # configured or env-file tenant\n  \
                intunectl login --tenant-id ID --client-id ID  # quick setup"
                    .into(),
            ));
        }
    };

    match tenant_config.auth_type {
        AuthType::DeviceCode => auth.login_device_code(&tenant_config).await?,
        AuthType::ClientCredentials => auth.login_client_credentials(&tenant_config).await?,
    };
    tracing::debug!("Authenticated tenant {}", tenant_config.name);

    config_manager.set_active_tenant(&tenant_config.name)?;
    println!("\n{} Active tenant: {}", "→".cyan(), tenant_config.name.bold());
    Ok(())
}

pub async fn logout(args: LogoutArgs) -> Result<()> {
    let config_manager = ConfigManager::load()?;
    let auth = GraphAuth::new(config_manager.clone());

    if args.all {
        for tenant in &config_manager.load_tenants()? {
            auth.logout(&tenant.name)?;
        }
        println!("{} Logged out from all tenants", "✓".green());
    } else if let Some(name) = &args.name {
        auth.logout(name)?;
    } else if let Some(current) = config_manager.load_config()?.current_tenant {
        auth.logout(&current)?;
    } else {
        println!("{} No active tenant", "!".yellow());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("ünïcode-tenant", 3), "ünï");
        assert_eq!(truncate_chars("ab", 8), "ab");
    }
}
