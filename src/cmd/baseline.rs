//! Security baseline comparison
//!
//! Flattens the Settings Catalog tree of two configuration policies into
//! `settingDefinitionId -> value` maps and reports where they differ.

use crate::cmd::progress;
use crate::cmd::report_template::{
    ReportFormat, ReportMetadata, ReportRow, ReportTable, ReportType, RowTone, write_report,
};
use crate::cmd::{GraphOpts, connect};
use crate::error::{IntuneError, Result};
use crate::graph::GraphClient;
use crate::graph::intune;
use crate::graph::models::ConfigurationPolicy;
use chrono::Local;
use clap::Args;
use colored::Colorize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CompareArgs {
    /// First baseline (policy ID or name)
    #[arg(long)]
    pub baseline1: String,

    /// Second baseline (policy ID or name)
    #[arg(long)]
    pub baseline2: String,

    /// Write the comparison to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format (inferred from the output extension when omitted)
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Leave identical settings out of the report
    #[arg(long)]
    pub differences_only: bool,

    #[command(flatten)]
    pub graph: GraphOpts,
}

/// One leaf of a flattened settings tree
#[derive(Debug, Clone, PartialEq)]
pub struct FlatSetting {
    pub definition_id: String,
    pub value: String,
}

/// Display names gathered from expanded `settingDefinitions`
#[derive(Debug, Default)]
pub struct DefinitionNames {
    settings: HashMap<String, String>,
    options: HashMap<String, String>,
}

impl DefinitionNames {
    pub fn from_settings(settings: &[Value]) -> Self {
        let mut names = DefinitionNames::default();
        for setting in settings {
            let Some(defs) = setting["settingDefinitions"].as_array() else {
                continue;
            };
            for def in defs {
                let (Some(id), Some(name)) = (def["id"].as_str(), def["displayName"].as_str())
                else {
                    continue;
                };
                names.settings.insert(id.to_lowercase(), name.to_string());

                for option in def["options"].as_array().into_iter().flatten() {
                    if let (Some(item), Some(label)) =
                        (option["itemId"].as_str(), option["displayName"].as_str())
                    {
                        names.options.insert(item.to_lowercase(), label.to_string());
                    }
                }
            }
        }
        names
    }

    fn merge(&mut self, other: DefinitionNames) {
        self.settings.extend(other.settings);
        self.options.extend(other.options);
    }

    /// Display name for a (possibly `[n]`-suffixed) key
    pub fn setting(&self, key: &str) -> String {
        let (base, suffix) = match key.find('[') {
            Some(i) => key.split_at(i),
            None => (key, ""),
        };
        match self.settings.get(&base.to_lowercase()) {
            Some(name) => format!("{}{}", name, suffix),
            None => key.to_string(),
        }
    }

    pub fn value(&self, raw: &str) -> String {
        raw.split(", ")
            .map(|v| {
                self.options
                    .get(&v.to_lowercase())
                    .cloned()
                    .unwrap_or_else(|| v.to_string())
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Flatten every `settingInstance` of a policy into an ordered map
///
/// Definition ids seen more than once (group collections) get `[1]`,
/// `[2]`, ... appended in document order.
pub fn flatten_settings(settings: &[Value]) -> BTreeMap<String, String> {
    let mut leaves = Vec::new();
    for setting in settings {
        walk_instance(&setting["settingInstance"], &mut leaves);
    }

    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut flat = BTreeMap::new();
    for leaf in leaves {
        let id = leaf.definition_id.to_lowercase();
        let count = seen.entry(id.clone()).or_insert(0);
        let key = if *count == 0 {
            id
        } else {
            format!("{}[{}]", id, count)
        };
        *count += 1;
        flat.insert(key, leaf.value);
    }
    flat
}

fn walk_instance(instance: &Value, out: &mut Vec<FlatSetting>) {
    let Some(id) = instance["settingDefinitionId"].as_str() else {
        return;
    };
    let kind = instance["@odata.type"].as_str().unwrap_or_default();
    let kind = kind.trim_start_matches("#microsoft.graph.deviceManagementConfiguration");

    match kind {
        "ChoiceSettingInstance" => {
            let choice = &instance["choiceSettingValue"];
            push_leaf(out, id, scalar(&choice["value"]));
            walk_children(&choice["children"], out);
        }
        "ChoiceSettingCollectionInstance" => {
            let values = instance["choiceSettingCollectionValue"]
                .as_array()
                .map(Vec::as_slice)
                .unwrap_or_default();
            let joined = values
                .iter()
                .map(|v| scalar(&v["value"]))
                .collect::<Vec<_>>()
                .join(", ");
            push_leaf(out, id, joined);
            for v in values {
                walk_children(&v["children"], out);
            }
        }
        "SimpleSettingInstance" => {
            push_leaf(out, id, scalar(&instance["simpleSettingValue"]["value"]));
        }
        "SimpleSettingCollectionInstance" => {
            let joined = instance["simpleSettingCollectionValue"]
                .as_array()
                .into_iter()
                .flatten()
                .map(|v| scalar(&v["value"]))
                .collect::<Vec<_>>()
                .join(", ");
            push_leaf(out, id, joined);
        }
        "GroupSettingInstance" => {
            walk_children(&instance["groupSettingValue"]["children"], out);
        }
        "GroupSettingCollectionInstance" => {
            for group in instance["groupSettingCollectionValue"]
                .as_array()
                .into_iter()
                .flatten()
            {
                walk_children(&group["children"], out);
            }
        }
        other => {
            tracing::debug!("Unhandled setting instance type '{}' for {}", other, id);
        }
    }
}

fn walk_children(children: &Value, out: &mut Vec<FlatSetting>) {
    for child in children.as_array().into_iter().flatten() {
        walk_instance(child, out);
    }
}

fn push_leaf(out: &mut Vec<FlatSetting>, id: &str, value: String) {
    out.push(FlatSetting {
        definition_id: id.to_string(),
        value,
    });
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffStatus {
    Same,
    Different,
    OnlyInBaseline1,
    OnlyInBaseline2,
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiffStatus::Same => "Same",
            DiffStatus::Different => "Different",
            DiffStatus::OnlyInBaseline1 => "Only in Baseline1",
            DiffStatus::OnlyInBaseline2 => "Only in Baseline2",
        };
        f.write_str(s)
    }
}

impl DiffStatus {
    fn tone(&self) -> RowTone {
        match self {
            DiffStatus::Same => RowTone::Ok,
            DiffStatus::Different => RowTone::Danger,
            DiffStatus::OnlyInBaseline1 | DiffStatus::OnlyInBaseline2 => RowTone::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SettingDiff {
    pub key: String,
    pub value1: Option<String>,
    pub value2: Option<String>,
    pub status: DiffStatus,
}

/// Compare two flattened trees; rows come back ordered by key
pub fn diff_settings(
    baseline1: &BTreeMap<String, String>,
    baseline2: &BTreeMap<String, String>,
) -> Vec<SettingDiff> {
    let mut keys: Vec<&String> = baseline1.keys().chain(baseline2.keys()).collect();
    keys.sort();
    keys.dedup();

    keys.into_iter()
        .map(|key| {
            let v1 = baseline1.get(key);
            let v2 = baseline2.get(key);
            let status = match (v1, v2) {
                (Some(a), Some(b)) if a == b => DiffStatus::Same,
                (Some(_), Some(_)) => DiffStatus::Different,
                (Some(_), None) => DiffStatus::OnlyInBaseline1,
                (None, _) => DiffStatus::OnlyInBaseline2,
            };
            SettingDiff {
                key: key.clone(),
                value1: v1.cloned(),
                value2: v2.cloned(),
                status,
            }
        })
        .collect()
}

#[derive(Debug, Default, PartialEq)]
pub struct DiffCounts {
    pub same: usize,
    pub different: usize,
    pub only_in_1: usize,
    pub only_in_2: usize,
}

pub fn count_statuses(diffs: &[SettingDiff]) -> DiffCounts {
    let mut counts = DiffCounts::default();
    for d in diffs {
        match d.status {
            DiffStatus::Same => counts.same += 1,
            DiffStatus::Different => counts.different += 1,
            DiffStatus::OnlyInBaseline1 => counts.only_in_1 += 1,
            DiffStatus::OnlyInBaseline2 => counts.only_in_2 += 1,
        }
    }
    counts
}

/// Find a configuration policy by ID, or by name when no ID matches
pub fn find_policy<'a>(
    policies: &'a [ConfigurationPolicy],
    id_or_name: &str,
) -> Result<&'a ConfigurationPolicy> {
    if let Some(p) = policies.iter().find(|p| p.id.eq_ignore_ascii_case(id_or_name)) {
        return Ok(p);
    }

    let matches: Vec<&ConfigurationPolicy> = policies
        .iter()
        .filter(|p| p.name.eq_ignore_ascii_case(id_or_name))
        .collect();

    match matches.as_slice() {
        [one] => Ok(one),
        [] => Err(IntuneError::ConfigError(format!(
            "No configuration policy named '{}'",
            id_or_name
        ))),
        many => Err(IntuneError::ConfigError(format!(
            "'{}' matches {} policies; pass the policy ID instead",
            id_or_name,
            many.len()
        ))),
    }
}

/// The outcome of comparing two policies, ready for display
pub struct Comparison {
    pub name1: String,
    pub name2: String,
    pub names: DefinitionNames,
    pub diffs: Vec<SettingDiff>,
}

pub async fn compare_policies(
    graph: &GraphClient,
    first: &str,
    second: &str,
) -> Result<Comparison> {
    let policies = intune::list_configuration_policies(graph).await?;
    let p1 = find_policy(&policies, first)?;
    let p2 = find_policy(&policies, second)?;

    let settings1 = intune::get_configuration_policy_settings(graph, &p1.id).await?;
    let settings2 = intune::get_configuration_policy_settings(graph, &p2.id).await?;
    tracing::debug!(
        "Fetched {} and {} top-level settings",
        settings1.len(),
        settings2.len()
    );

    let mut names = DefinitionNames::from_settings(&settings1);
    names.merge(DefinitionNames::from_settings(&settings2));

    let diffs = diff_settings(&flatten_settings(&settings1), &flatten_settings(&settings2));

    Ok(Comparison {
        name1: p1.name.clone(),
        name2: p2.name.clone(),
        names,
        diffs,
    })
}

fn report_table(comparison: &Comparison, differences_only: bool) -> ReportTable {
    let rows = comparison
        .diffs
        .iter()
        .filter(|d| !(differences_only && d.status == DiffStatus::Same))
        .map(|d| ReportRow {
            cells: vec![
                comparison.names.setting(&d.key),
                d.key.clone(),
                d.value1.as_deref().map(|v| comparison.names.value(v)).unwrap_or_default(),
                d.value2.as_deref().map(|v| comparison.names.value(v)).unwrap_or_default(),
                d.status.to_string(),
            ],
            tone: d.status.tone(),
        })
        .collect();

    ReportTable {
        title: "Settings".into(),
        headers: vec![
            "Setting".into(),
            "Definition ID".into(),
            comparison.name1.clone(),
            comparison.name2.clone(),
            "Status".into(),
        ],
        rows,
    }
}

pub async fn compare(args: CompareArgs) -> Result<()> {
    println!("{} security baselines...", "Comparing".cyan().bold());

    let session = connect(&args.graph).await?;

    let spinner = progress::create_spinner("Fetching baseline settings...");
    let fetched = compare_policies(&session.graph, &args.baseline1, &args.baseline2).await;
    let comparison = match fetched {
        Ok(c) => {
            progress::finish_success(&spinner, "Fetched baseline settings");
            c
        }
        Err(e) => {
            progress::finish_error(&spinner, "Failed to fetch baseline settings");
            return Err(e);
        }
    };

    let counts = count_statuses(&comparison.diffs);
    println!("→ Baseline1: {}", comparison.name1.cyan());
    println!("→ Baseline2: {}", comparison.name2.cyan());
    println!();
    println!("  {} Same: {}", "✓".green(), counts.same);
    println!("  {} Different: {}", "✗".red(), counts.different);
    println!("  {} Only in Baseline1: {}", "!".yellow(), counts.only_in_1);
    println!("  {} Only in Baseline2: {}", "!".yellow(), counts.only_in_2);

    if args.output.is_none() {
        for d in comparison.diffs.iter().filter(|d| d.status != DiffStatus::Same) {
            println!(
                "    {} [{}] {} -> {}",
                comparison.names.setting(&d.key),
                d.status.to_string().yellow(),
                d.value1.as_deref().unwrap_or("-"),
                d.value2.as_deref().unwrap_or("-")
            );
        }
    }

    if let Some(output) = &args.output {
        let path = session.config.resolve_report_path(output);
        let format = args.format.unwrap_or_else(|| ReportFormat::from_path(&path));
        let metadata = ReportMetadata {
            title: format!("{} vs {}", comparison.name1, comparison.name2),
            tenant_name: session.tenant_label.clone(),
            generated_at: Local::now(),
            report_type: ReportType::BaselineComparison,
        };
        let summary = vec![
            ("Same".to_string(), counts.same.to_string()),
            ("Different".to_string(), counts.different.to_string()),
            ("Only in Baseline1".to_string(), counts.only_in_1.to_string()),
            ("Only in Baseline2".to_string(), counts.only_in_2.to_string()),
        ];
        let table = report_table(&comparison, args.differences_only);
        write_report(&path, format, &metadata, &summary, &table)?;
        println!("\n{} Report written to {}", "✓".green(), path.display());
    }

    Ok(())
}
