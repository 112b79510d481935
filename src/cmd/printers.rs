//! Universal Print shares and per-printer provisioning policies

use crate::cmd::{GraphOpts, connect, split_list};
use crate::error::{IntuneError, Result};
use crate::graph::GraphClient;
use crate::graph::intune;
use crate::graph::models::PrintShare;
use clap::Args;
use colored::Colorize;
use serde_json::{Value, json};
use std::collections::HashSet;

const UP_INSTALLS: &str = "user_vendor_msft_printerprovisioning_upprinterinstalls_{printersharedid}";
const STRING_VALUE: &str = "#microsoft.graph.deviceManagementConfigurationStringSettingValue";
const SIMPLE_INSTANCE: &str = "#microsoft.graph.deviceManagementConfigurationSimpleSettingInstance";

#[derive(Args, Debug)]
pub struct ListArgs {
    #[command(flatten)]
    pub graph: GraphOpts,
}

#[derive(Args, Debug)]
pub struct ProvisionArgs {
    /// Printer share names to provision (default: all shares)
    #[arg(long = "share")]
    pub shares: Vec<String>,

    /// Assign created policies to this group
    #[arg(long)]
    pub group_id: Option<String>,

    /// Prefix for created policy names
    #[arg(long, default_value = "Printer - ")]
    pub name_prefix: String,

    /// Show planned policies without creating them
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub graph: GraphOpts,
}

fn string_setting(id: &str, value: &str) -> Value {
    json!({
        "@odata.type": SIMPLE_INSTANCE,
        "settingDefinitionId": format!("{}_{}", UP_INSTALLS, id),
        "simpleSettingValue": {
            "@odata.type": STRING_VALUE,
            "value": value
        }
    })
}

/// Settings Catalog policy that installs one Universal Print share
pub fn provisioning_policy(share: &PrintShare, printer_id: &str, name: &str) -> Value {
    json!({
        "name": name,
        "description": format!("Installs Universal Print share '{}'", share.display_name),
        "platforms": "windows10",
        "technologies": "mdm",
        "roleScopeTagIds": ["0"],
        "settings": [{
            "@odata.type": "#microsoft.graph.deviceManagementConfigurationSetting",
            "settingInstance": {
                "@odata.type": "#microsoft.graph.deviceManagementConfigurationGroupSettingCollectionInstance",
                "settingDefinitionId": UP_INSTALLS,
                "groupSettingCollectionValue": [{
                    "children": [
                        string_setting("clouddeviceid", printer_id),
                        {
                            "@odata.type": "#microsoft.graph.deviceManagementConfigurationChoiceSettingInstance",
                            "settingDefinitionId": format!("{}_install", UP_INSTALLS),
                            "choiceSettingValue": {
                                "value": format!("{}_install_true", UP_INSTALLS),
                                "children": []
                            }
                        },
                        string_setting("printersharedid", &share.id),
                        string_setting("printersharedname", &share.display_name)
                    ]
                }]
            }
        }]
    })
}

/// Pick shares by name (case-insensitive); names that match nothing are returned separately
pub fn select_shares<'a>(
    shares: &'a [PrintShare],
    wanted: &[String],
) -> (Vec<&'a PrintShare>, Vec<String>) {
    if wanted.is_empty() {
        return (shares.iter().collect(), Vec::new());
    }

    let mut selected = Vec::new();
    let mut missing = Vec::new();
    for name in wanted {
        match shares.iter().find(|s| s.display_name.eq_ignore_ascii_case(name)) {
            Some(share) => selected.push(share),
            None => missing.push(name.clone()),
        }
    }
    (selected, missing)
}

#[derive(Debug, Default)]
pub struct ProvisionSummary {
    pub created: usize,
    pub existing: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub async fn provision_shares(
    graph: &GraphClient,
    shares: &[&PrintShare],
    name_prefix: &str,
    group_id: Option<&str>,
    dry_run: bool,
) -> Result<ProvisionSummary> {
    let existing: HashSet<String> = intune::list_configuration_policies(graph)
        .await?
        .into_iter()
        .map(|p| p.name.to_lowercase())
        .collect();

    let mut summary = ProvisionSummary::default();

    for share in shares {
        let name = format!("{}{}", name_prefix, share.display_name);

        let Some(printer_id) = share.printer.as_ref().map(|p| p.id.as_str()) else {
            println!(
                "  {} {} has no registered printer, skipping",
                "!".yellow(),
                share.display_name
            );
            summary.skipped += 1;
            continue;
        };

        if existing.contains(&name.to_lowercase()) {
            println!("  {} {} already exists", "•".dimmed(), name);
            summary.existing += 1;
            continue;
        }

        if dry_run {
            println!("  {} {} (would create)", "+".green(), name);
            summary.created += 1;
            continue;
        }

        let body = provisioning_policy(share, printer_id, &name);
        let created = match intune::create_configuration_policy(graph, &body).await {
            Ok(p) => p,
            Err(e) => {
                println!("  {} {}: {}", "✗".red(), name, e);
                summary.failed += 1;
                continue;
            }
        };
        println!("  {} {} created ({})", "✓".green(), name, created.id);

        if let Some(group_id) = group_id {
            if let Err(e) =
                intune::assign_configuration_policy(graph, &created.id, group_id).await
            {
                println!("    {} Assignment failed: {}", "✗".red(), e);
                summary.failed += 1;
                continue;
            }
            println!("    {} Assigned to group {}", "✓".green(), group_id);
        }
        summary.created += 1;
    }

    Ok(summary)
}

pub async fn list(args: ListArgs) -> Result<()> {
    println!("{} Universal Print shares...", "Listing".cyan().bold());

    let session = connect(&args.graph).await?;
    let shares = intune::list_print_shares(&session.graph).await?;

    if shares.is_empty() {
        println!("  No printer shares found");
        return Ok(());
    }

    for share in &shares {
        let printer = share
            .printer
            .as_ref()
            .map(|p| p.display_name.as_deref().unwrap_or(&p.id))
            .unwrap_or("no printer");
        println!("  {} {} ({})", "•".cyan(), share.display_name, printer.dimmed());
        tracing::debug!("share {} printer {:?}", share.id, share.printer.as_ref().map(|p| &p.id));
    }

    println!("\n{} {} share(s)", "✓".green(), shares.len());
    Ok(())
}

pub async fn provision(args: ProvisionArgs) -> Result<()> {
    println!("{} printer policies...", "Provisioning".cyan().bold());

    let session = connect(&args.graph).await?;
    let shares = intune::list_print_shares(&session.graph).await?;
    let wanted = split_list(&args.shares);

    let (selected, missing) = select_shares(&shares, &wanted);
    for name in &missing {
        println!("  {} No share named '{}'", "!".yellow(), name);
    }
    if selected.is_empty() {
        return Err(IntuneError::ConfigError("No matching printer shares".into()));
    }

    if args.dry_run {
        println!("{} DRY RUN - no changes will be written", "ℹ".yellow().bold());
    }

    let summary = provision_shares(
        &session.graph,
        &selected,
        &args.name_prefix,
        args.group_id.as_deref(),
        args.dry_run,
    )
    .await?;

    println!(
        "\n{} created: {}, existing: {}, skipped: {}, failed: {}",
        "Summary".bold(),
        summary.created.to_string().green(),
        summary.existing,
        summary.skipped,
        summary.failed.to_string().red()
    );

    if summary.failed > 0 {
        return Err(IntuneError::PartialFailure {
            failed: summary.failed,
            total: selected.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::baseline::flatten_settings;
    use crate::graph::models::PrinterRef;

    fn share(name: &str, printer: Option<&str>) -> PrintShare {
        PrintShare {
            id: format!("share-{}", name.to_lowercase()),
            display_name: name.into(),
            printer: printer.map(|id| PrinterRef {
                id: id.into(),
                display_name: None,
            }),
            allow_all_users: Some(true),
        }
    }

    #[test]
    fn test_provisioning_policy_shape() {
        let s = share("HQ-Floor2", Some("cloud-123"));
        let body = provisioning_policy(&s, "cloud-123", "Printer - HQ-Floor2");
        assert_eq!(body["platforms"], "windows10");
        assert_eq!(body["technologies"], "mdm");

        let settings = body["settings"].as_array().unwrap().clone();
        let flat = flatten_settings(&settings);
        assert_eq!(flat[&format!("{}_clouddeviceid", UP_INSTALLS)], "cloud-123");
        assert_eq!(flat[&format!("{}_printersharedid", UP_INSTALLS)], "share-hq-floor2");
        assert_eq!(flat[&format!("{}_printersharedname", UP_INSTALLS)], "HQ-Floor2");
    }

    #[test]
    fn test_select_shares() {
        let shares = vec![share("HQ", Some("p1")), share("Lab", Some("p2"))];

        let (all, missing) = select_shares(&shares, &[]);
        assert_eq!(all.len(), 2);
        assert!(missing.is_empty());

        let (some, missing) = select_shares(&shares, &["lab".into(), "Annex".into()]);
        assert_eq!(some.len(), 1);
        assert_eq!(some[0].display_name, "Lab");
        assert_eq!(missing, vec!["Annex".to_string()]);
    }
}
