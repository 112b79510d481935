use clap::{Parser, Subcommand};
use colored::Colorize;
use intunectl::{cmd, config, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "intunectl",
    about = "Intune administration automations over Microsoft Graph",
    version,
    long_about = "Sync proactive remediation scripts, keep compliance OS thresholds current,\n\
                  compare security baselines, report low disk space, provision printers\n\
                  and run detection/remediation probes on managed endpoints."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authenticate to Microsoft Graph API
    Login(cmd::login::LoginArgs),

    /// Logout and clear cached credentials
    Logout(cmd::login::LogoutArgs),

    /// Manage tenant configurations
    #[command(subcommand)]
    Tenant(TenantCommands),

    /// Device health scripts (proactive remediations)
    #[command(subcommand)]
    HealthScripts(HealthScriptCommands),

    /// Compliance policy OS thresholds and release filters
    #[command(subcommand)]
    Compliance(ComplianceCommands),

    /// Security baseline tools
    #[command(subcommand)]
    Baseline(BaselineCommands),

    /// Managed device reports
    #[command(subcommand)]
    Devices(DeviceCommands),

    /// Universal Print provisioning
    #[command(subcommand)]
    Printers(PrinterCommands),

    /// Endpoint detection/remediation probes (run on the device)
    #[command(subcommand)]
    Probe(ProbeCommands),
}

#[derive(Subcommand, Debug)]
enum TenantCommands {
    /// Add a new tenant configuration
    Add(cmd::tenant::TenantAddArgs),

    /// List configured tenants
    List(cmd::tenant::TenantListArgs),

    /// Switch active tenant
    Switch(cmd::tenant::TenantSwitchArgs),

    /// Remove a tenant configuration
    Remove(cmd::tenant::TenantRemoveArgs),
}

#[derive(Subcommand, Debug)]
enum HealthScriptCommands {
    /// Create or update health scripts from a local folder
    Sync(cmd::health_scripts::SyncArgs),

    /// List device health scripts in the tenant
    List(cmd::health_scripts::ListArgs),
}

#[derive(Subcommand, Debug)]
enum ComplianceCommands {
    /// Set minimum OS versions on compliance policies
    OsBuild(cmd::compliance::OsBuildArgs),

    /// Ensure one assignment filter per Windows feature release
    Filters(cmd::compliance::FiltersArgs),
}

#[derive(Subcommand, Debug)]
enum BaselineCommands {
    /// Compare the settings of two baseline policies
    Compare(cmd::baseline::CompareArgs),
}

#[derive(Subcommand, Debug)]
enum DeviceCommands {
    /// Report devices running low on disk space
    DiskSpace(cmd::devices::DiskSpaceArgs),
}

#[derive(Subcommand, Debug)]
enum PrinterCommands {
    /// List Universal Print shares
    List(cmd::printers::ListArgs),

    /// Create printer provisioning policies for shares
    Provision(cmd::printers::ProvisionArgs),
}

#[derive(Subcommand, Debug)]
enum ProbeCommands {
    /// Check (and optionally set) a registry value
    Registry(cmd::probe::registry::RegistryArgs),

    /// Ensure the primary user holds a user right
    LogonRight(cmd::probe::logon_right::LogonRightArgs),

    /// Check that files exist (or do not)
    File(cmd::probe::file::FileArgs),
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("intunectl=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let configured = config::ConfigManager::load()
                .and_then(|m| m.load_config())
                .ok()
                .and_then(|c| c.log_level);
            EnvFilter::new(configured.unwrap_or_else(|| "intunectl=warn".into()))
        })
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns the process exit code; probes report compliance through it
async fn run() -> error::Result<i32> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Login(args) => cmd::login::login(args).await?,
        Commands::Logout(args) => cmd::login::logout(args).await?,
        Commands::Tenant(tenant_cmd) => match tenant_cmd {
            TenantCommands::Add(args) => cmd::tenant::add(args).await?,
            TenantCommands::List(args) => cmd::tenant::list(args).await?,
            TenantCommands::Switch(args) => cmd::tenant::switch(args).await?,
            TenantCommands::Remove(args) => cmd::tenant::remove(args).await?,
        },
        Commands::HealthScripts(hs_cmd) => match hs_cmd {
            HealthScriptCommands::Sync(args) => cmd::health_scripts::sync(args).await?,
            HealthScriptCommands::List(args) => cmd::health_scripts::list(args).await?,
        },
        Commands::Compliance(compliance_cmd) => match compliance_cmd {
            ComplianceCommands::OsBuild(args) => cmd::compliance::os_build(args).await?,
            ComplianceCommands::Filters(args) => cmd::compliance::filters(args).await?,
        },
        Commands::Baseline(baseline_cmd) => match baseline_cmd {
            BaselineCommands::Compare(args) => cmd::baseline::compare(args).await?,
        },
        Commands::Devices(device_cmd) => match device_cmd {
            DeviceCommands::DiskSpace(args) => cmd::devices::disk_space(args).await?,
        },
        Commands::Printers(printer_cmd) => match printer_cmd {
            PrinterCommands::List(args) => cmd::printers::list(args).await?,
            PrinterCommands::Provision(args) => cmd::printers::provision(args).await?,
        },
        Commands::Probe(probe_cmd) => {
            return match probe_cmd {
                ProbeCommands::Registry(args) => cmd::probe::registry(args),
                ProbeCommands::LogonRight(args) => cmd::probe::logon_right(args),
                ProbeCommands::File(args) => cmd::probe::file(args),
            };
        }
    }

    Ok(0)
}
