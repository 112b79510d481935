//! Device health script (proactive remediation) sync
//!
//! Mirrors a local folder of detection/remediation script pairs into
//! Intune. Each subdirectory of the scripts folder is one package:
//!
//! ```text
//! scripts/
//!   Clear-TeamsCache/
//!     detect.ps1
//!     remediate.ps1
//!     metadata.json   (optional)
//! ```
//!
//! New packages are created, changed ones patched, unchanged ones left
//! alone. Microsoft-published scripts are never touched.

use crate::cmd::{GraphOpts, connect};
use crate::error::{IntuneError, Result};
use crate::graph::GraphClient;
use crate::graph::intune;
use crate::graph::models::DeviceHealthScript;
use base64::{Engine as _, engine::general_purpose};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_PUBLISHER: &str = "IT Department";
const METADATA_FILE: &str = "metadata.json";

#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Folder containing one subdirectory per health script
    #[arg(short = 'f', long)]
    pub scripts_folder: PathBuf,

    /// Publisher used when a package has no metadata.json publisher
    #[arg(long, default_value = DEFAULT_PUBLISHER)]
    pub publisher: String,

    /// Patch matching scripts even when nothing changed
    #[arg(long)]
    pub force: bool,

    /// Assign newly created scripts to this group (daily schedule)
    #[arg(long)]
    pub group_id: Option<String>,

    /// Show what would change without writing to Intune
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub graph: GraphOpts,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Show IDs and versions
    #[arg(short = 'd', long = "detailed")]
    pub detailed: bool,

    #[command(flatten)]
    pub graph: GraphOpts,
}

/// Optional per-package overrides read from `metadata.json`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PackageMetadata {
    pub description: Option<String>,
    pub publisher: Option<String>,
    pub run_as_account: Option<String>,
    #[serde(rename = "runAs32Bit")]
    pub run_as_32_bit: Option<bool>,
    pub enforce_signature_check: Option<bool>,
}

/// A detection/remediation pair discovered on disk
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptPackage {
    pub name: String,
    pub detection: Vec<u8>,
    pub remediation: Option<Vec<u8>>,
    pub metadata: PackageMetadata,
}

impl ScriptPackage {
    fn description(&self) -> String {
        self.metadata
            .description
            .clone()
            .unwrap_or_else(|| format!("Synced from {}", self.name))
    }

    fn publisher<'a>(&'a self, default_publisher: &'a str) -> &'a str {
        self.metadata
            .publisher
            .as_deref()
            .unwrap_or(default_publisher)
    }

    fn run_as_account(&self) -> &str {
        match self.metadata.run_as_account.as_deref() {
            Some(account) if account.eq_ignore_ascii_case("user") => "user",
            _ => "system",
        }
    }

    fn run_as_32_bit(&self) -> bool {
        self.metadata.run_as_32_bit.unwrap_or(false)
    }

    fn enforce_signature_check(&self) -> bool {
        self.metadata.enforce_signature_check.unwrap_or(false)
    }
}

/// A package directory that could not be used
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPackage {
    pub name: String,
    pub reason: String,
}

/// Scan the scripts folder; directories are visited in name order
pub fn discover_packages(folder: &Path) -> Result<(Vec<ScriptPackage>, Vec<SkippedPackage>)> {
    if !folder.is_dir() {
        return Err(IntuneError::ConfigError(format!(
            "Scripts folder does not exist: {}",
            folder.display()
        )));
    }

    let mut dirs: Vec<PathBuf> = fs::read_dir(folder)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();

    let mut packages = Vec::new();
    let mut skipped = Vec::new();

    for dir in dirs {
        let name = match dir.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };

        match load_package(&dir, &name) {
            Ok(pkg) => packages.push(pkg),
            Err(reason) => skipped.push(SkippedPackage { name, reason }),
        }
    }

    Ok((packages, skipped))
}

fn load_package(dir: &Path, name: &str) -> std::result::Result<ScriptPackage, String> {
    let mut detection = Vec::new();
    let mut remediation = Vec::new();

    let entries = fs::read_dir(dir).map_err(|e| e.to_string())?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_lowercase(),
            None => continue,
        };
        if !path.is_file() || !file_name.ends_with(".ps1") {
            continue;
        }
        if file_name.starts_with("detect") {
            detection.push(path);
        } else if file_name.starts_with("remediat") {
            remediation.push(path);
        }
    }

    if detection.len() > 1 || remediation.len() > 1 {
        return Err("more than one detection or remediation script".into());
    }
    let detection_path = detection.pop().ok_or("no detect*.ps1 script")?;

    let metadata_path = dir.join(METADATA_FILE);
    let metadata = if metadata_path.exists() {
        let raw = fs::read_to_string(&metadata_path).map_err(|e| e.to_string())?;
        serde_json::from_str(&raw).map_err(|e| format!("invalid {}: {}", METADATA_FILE, e))?
    } else {
        PackageMetadata::default()
    };

    Ok(ScriptPackage {
        name: name.to_string(),
        detection: fs::read(&detection_path).map_err(|e| e.to_string())?,
        remediation: match remediation.pop() {
            Some(p) => Some(fs::read(&p).map_err(|e| e.to_string())?),
            None => None,
        },
        metadata,
    })
}

fn encode(content: &[u8]) -> String {
    general_purpose::STANDARD.encode(content)
}

fn decode(content: Option<&str>) -> Option<Vec<u8>> {
    match content {
        None => Some(Vec::new()),
        Some(c) => general_purpose::STANDARD.decode(c.trim()).ok(),
    }
}

/// PATCH body for a package; a pure function of the package contents
pub fn patch_body(pkg: &ScriptPackage, default_publisher: &str) -> Value {
    json!({
        "@odata.type": "#microsoft.graph.deviceHealthScript",
        "displayName": pkg.name,
        "description": pkg.description(),
        "publisher": pkg.publisher(default_publisher),
        "runAsAccount": pkg.run_as_account(),
        "runAs32Bit": pkg.run_as_32_bit(),
        "enforceSignatureCheck": pkg.enforce_signature_check(),
        "detectionScriptContent": encode(&pkg.detection),
        "remediationScriptContent": encode(pkg.remediation.as_deref().unwrap_or_default()),
    })
}

/// POST body: the PATCH body plus the default scope tag
pub fn create_body(pkg: &ScriptPackage, default_publisher: &str) -> Value {
    let mut body = patch_body(pkg, default_publisher);
    body["roleScopeTagIds"] = json!(["0"]);
    body
}

/// Why a remote script differs from its local package, if it does
pub fn change_reason(
    pkg: &ScriptPackage,
    remote: &DeviceHealthScript,
    default_publisher: &str,
) -> Option<String> {
    let mut reasons = Vec::new();

    if decode(remote.detection_script_content.as_deref()).as_deref() != Some(&pkg.detection[..]) {
        reasons.push("detection script");
    }
    let local_remediation = pkg.remediation.as_deref().unwrap_or_default();
    if decode(remote.remediation_script_content.as_deref()).as_deref() != Some(local_remediation) {
        reasons.push("remediation script");
    }
    if remote.description.as_deref().unwrap_or_default() != pkg.description() {
        reasons.push("description");
    }
    if remote.publisher.as_deref().unwrap_or_default() != pkg.publisher(default_publisher) {
        reasons.push("publisher");
    }
    if !remote
        .run_as_account
        .as_deref()
        .unwrap_or("system")
        .eq_ignore_ascii_case(pkg.run_as_account())
    {
        reasons.push("run as account");
    }
    if remote.run_as_32_bit != pkg.run_as_32_bit() {
        reasons.push("32-bit flag");
    }
    if remote.enforce_signature_check != pkg.enforce_signature_check() {
        reasons.push("signature check");
    }

    if reasons.is_empty() {
        None
    } else {
        Some(reasons.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    Create,
    Update { id: String, reason: String },
    Unchanged { id: String },
    SkipGlobal { id: String },
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub default_publisher: String,
    pub force: bool,
    pub dry_run: bool,
    pub group_id: Option<String>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            default_publisher: DEFAULT_PUBLISHER.to_string(),
            force: false,
            dry_run: false,
            group_id: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SyncSummary {
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl SyncSummary {
    fn total(&self) -> usize {
        self.created.len()
            + self.updated.len()
            + self.unchanged.len()
            + self.skipped.len()
            + self.failed.len()
    }
}

/// Decide what to do with one package given the remote script, if any
pub fn plan_action(
    pkg: &ScriptPackage,
    remote: Option<&DeviceHealthScript>,
    options: &SyncOptions,
) -> SyncAction {
    let Some(remote) = remote else {
        return SyncAction::Create;
    };

    if remote.is_global_script {
        return SyncAction::SkipGlobal {
            id: remote.id.clone(),
        };
    }

    match change_reason(pkg, remote, &options.default_publisher) {
        Some(reason) => SyncAction::Update {
            id: remote.id.clone(),
            reason,
        },
        None if options.force => SyncAction::Update {
            id: remote.id.clone(),
            reason: "forced".into(),
        },
        None => SyncAction::Unchanged {
            id: remote.id.clone(),
        },
    }
}

/// Push packages to Intune, creating or patching as needed
pub async fn sync_packages(
    graph: &GraphClient,
    packages: &[ScriptPackage],
    options: &SyncOptions,
) -> Result<SyncSummary> {
    let existing = intune::list_health_scripts(graph).await?;
    tracing::debug!("Found {} existing device health scripts", existing.len());

    let by_name: HashMap<String, &DeviceHealthScript> = existing
        .iter()
        .map(|s| (s.display_name.to_lowercase(), s))
        .collect();

    let mut summary = SyncSummary::default();

    for pkg in packages {
        let remote = match by_name.get(&pkg.name.to_lowercase()) {
            // List responses may omit script bodies; read the full object.
            Some(s) if s.detection_script_content.is_none() && !s.is_global_script => {
                match intune::get_health_script(graph, &s.id).await {
                    Ok(full) => Some(full),
                    Err(e) => {
                        println!("  {} {}: {}", "✗".red(), pkg.name, e);
                        summary.failed.push((pkg.name.clone(), e.to_string()));
                        continue;
                    }
                }
            }
            Some(s) => Some((*s).clone()),
            None => None,
        };

        match plan_action(pkg, remote.as_ref(), options) {
            SyncAction::Create => {
                if options.dry_run {
                    println!("  {} {} (would create)", "+".green(), pkg.name);
                    summary.created.push(pkg.name.clone());
                    continue;
                }
                let body = create_body(pkg, &options.default_publisher);
                match intune::create_health_script(graph, &body).await {
                    Ok(created) => {
                        println!("  {} {} created ({})", "✓".green(), pkg.name, created.id);
                        if let Some(group_id) = &options.group_id {
                            if let Err(e) =
                                intune::assign_health_script(graph, &created.id, group_id).await
                            {
                                println!("    {} Assignment failed: {}", "✗".red(), e);
                                summary.failed.push((pkg.name.clone(), e.to_string()));
                                continue;
                            }
                            println!("    {} Assigned to group {}", "✓".green(), group_id);
                        }
                        summary.created.push(pkg.name.clone());
                    }
                    Err(e) => {
                        println!("  {} {}: {}", "✗".red(), pkg.name, e);
                        summary.failed.push((pkg.name.clone(), e.to_string()));
                    }
                }
            }
            SyncAction::Update { id, reason } => {
                if options.dry_run {
                    println!("  {} {} (would update: {})", "~".yellow(), pkg.name, reason);
                    summary.updated.push(pkg.name.clone());
                    continue;
                }
                let body = patch_body(pkg, &options.default_publisher);
                match intune::update_health_script(graph, &id, &body).await {
                    Ok(()) => {
                        println!("  {} {} updated ({})", "✓".green(), pkg.name, reason);
                        summary.updated.push(pkg.name.clone());
                    }
                    Err(e) => {
                        println!("  {} {}: {}", "✗".red(), pkg.name, e);
                        summary.failed.push((pkg.name.clone(), e.to_string()));
                    }
                }
            }
            SyncAction::Unchanged { .. } => {
                println!("  {} {} unchanged", "•".dimmed(), pkg.name);
                summary.unchanged.push(pkg.name.clone());
            }
            SyncAction::SkipGlobal { .. } => {
                println!(
                    "  {} {} is a Microsoft-published script, skipping",
                    "!".yellow(),
                    pkg.name
                );
                summary.skipped.push(pkg.name.clone());
            }
        }
    }

    Ok(summary)
}

pub async fn sync(args: SyncArgs) -> Result<()> {
    println!("{} device health scripts...", "Syncing".cyan().bold());
    println!("→ Folder: {}", args.scripts_folder.display().to_string().cyan());

    let (packages, skipped) = discover_packages(&args.scripts_folder)?;
    for skip in &skipped {
        println!("  {} {}: {}", "!".yellow(), skip.name, skip.reason);
        tracing::warn!("Skipping package {}: {}", skip.name, skip.reason);
    }
    println!("→ Packages: {}", packages.len().to_string().cyan());

    if packages.is_empty() {
        println!("{} Nothing to sync", "!".yellow());
        return Ok(());
    }

    let session = connect(&args.graph).await?;
    let options = SyncOptions {
        default_publisher: args.publisher,
        force: args.force,
        dry_run: args.dry_run,
        group_id: args.group_id,
    };

    if options.dry_run {
        println!("\n{} DRY RUN - no changes will be written", "ℹ".yellow().bold());
    }
    println!();

    let mut summary = sync_packages(&session.graph, &packages, &options).await?;
    summary
        .skipped
        .extend(skipped.into_iter().map(|s| s.name));

    println!(
        "\n{} created: {}, updated: {}, unchanged: {}, skipped: {}, failed: {}",
        "Summary".bold(),
        summary.created.len().to_string().green(),
        summary.updated.len().to_string().yellow(),
        summary.unchanged.len(),
        summary.skipped.len(),
        summary.failed.len().to_string().red()
    );

    if !summary.failed.is_empty() {
        return Err(IntuneError::PartialFailure {
            failed: summary.failed.len(),
            total: summary.total(),
        });
    }

    Ok(())
}

pub async fn list(args: ListArgs) -> Result<()> {
    println!("{} device health scripts...", "Listing".cyan().bold());

    let session = connect(&args.graph).await?;
    let scripts = intune::list_health_scripts(&session.graph).await?;

    if scripts.is_empty() {
        println!("  No device health scripts found");
        return Ok(());
    }

    for script in &scripts {
        let publisher = script.publisher.as_deref().unwrap_or("Unknown");
        let marker = if script.is_global_script {
            "•".blue()
        } else {
            "•".cyan()
        };
        println!("  {} {} ({})", marker, script.display_name, publisher.dimmed());
        if args.detailed {
            println!("    ID: {}", script.id.dimmed());
            if let Some(version) = &script.version {
                println!("    Version: {}", version.dimmed());
            }
            let run_as = script.run_as_account.as_deref().unwrap_or("system");
            println!("    Run as: {}", run_as.dimmed());
        }
    }

    println!("\n{} {} script(s)", "✓".green(), scripts.len());
    Ok(())
}
