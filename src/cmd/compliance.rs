//! Compliance policy OS version thresholds and per-release assignment filters

use crate::cmd::{GraphOpts, connect, split_list};
use crate::error::{IntuneError, Result};
use crate::graph::GraphClient;
use crate::graph::intune;
use crate::graph::models::{AssignmentFilter, CompliancePolicy, OperatingSystemBuildRange};
use clap::Args;
use colored::Colorize;
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

const FILTER_PLATFORM: &str = "windows10AndLater";

#[derive(Args, Debug)]
pub struct OsBuildArgs {
    /// Platforms to update (comma-separated: windows,ios,macos,android)
    #[arg(long, value_delimiter = ',', default_value = "windows")]
    pub platforms: Vec<String>,

    /// Minimum Windows build per feature release, e.g. 10.0.22631.4317
    #[arg(long = "windows-build")]
    pub windows_builds: Vec<String>,

    /// Minimum iOS/iPadOS version
    #[arg(long)]
    pub ios_min: Option<String>,

    /// Minimum macOS version
    #[arg(long)]
    pub macos_min: Option<String>,

    /// Minimum Android version
    #[arg(long)]
    pub android_min: Option<String>,

    /// Only touch policies whose name starts with this prefix
    #[arg(long)]
    pub policy_prefix: Option<String>,

    /// Show planned changes without patching
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub graph: GraphOpts,
}

#[derive(Args, Debug)]
pub struct FiltersArgs {
    /// Windows build per feature release, e.g. 10.0.26100.2033
    #[arg(long = "windows-build", required = true)]
    pub windows_builds: Vec<String>,

    /// Show planned changes without writing
    #[arg(long)]
    pub dry_run: bool,

    #[command(flatten)]
    pub graph: GraphOpts,
}

/// A Windows version as `major.minor.build.revision`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct OsBuild {
    pub major: u32,
    pub minor: u32,
    pub build: u32,
    pub revision: u32,
}

impl FromStr for OsBuild {
    type Err = IntuneError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 && parts.len() != 4 {
            return Err(IntuneError::ConfigError(format!(
                "Invalid Windows build '{}': expected major.minor.build[.revision]",
                s
            )));
        }

        let mut numbers = [0u32; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| {
                IntuneError::ConfigError(format!(
                    "Invalid Windows build '{}': '{}' is not a number",
                    s, part
                ))
            })?;
        }

        Ok(OsBuild {
            major: numbers[0],
            minor: numbers[1],
            build: numbers[2],
            revision: numbers[3],
        })
    }
}

impl fmt::Display for OsBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.revision)
    }
}

impl OsBuild {
    /// Highest version still inside this feature release
    pub fn release_ceiling(&self) -> String {
        format!("{}.{}.{}.99999", self.major, self.minor, self.build)
    }

    pub fn release_prefix(&self) -> String {
        format!("{}.{}.{}", self.major, self.minor, self.build)
    }

    pub fn release_name(&self) -> String {
        let name = match self.build {
            19044 => "Windows 10 21H2",
            19045 => "Windows 10 22H2",
            22000 => "Windows 11 21H2",
            22621 => "Windows 11 22H2",
            22631 => "Windows 11 23H2",
            26100 => "Windows 11 24H2",
            26200 => "Windows 11 25H2",
            _ => return format!("Windows build {}", self.build),
        };
        name.to_string()
    }
}

/// Parse builds, keeping one (the first) per feature release, ordered by build
pub fn parse_builds(values: &[String]) -> Result<Vec<OsBuild>> {
    let mut builds: Vec<OsBuild> = Vec::new();
    for value in split_list(values) {
        let build: OsBuild = value.parse()?;
        if builds.iter().any(|b| b.release_prefix() == build.release_prefix()) {
            tracing::warn!("Ignoring duplicate build for release {}", build.release_prefix());
            continue;
        }
        builds.push(build);
    }
    builds.sort();
    Ok(builds)
}

/// Allowed build ranges for a Windows compliance policy
pub fn build_ranges(builds: &[OsBuild]) -> Vec<OperatingSystemBuildRange> {
    builds
        .iter()
        .map(|b| OperatingSystemBuildRange {
            description: Some(format!("{} minimum {}", b.release_name(), b)),
            lowest_version: b.to_string(),
            highest_version: b.release_ceiling(),
        })
        .collect()
}

fn validate_version(value: &str) -> Result<String> {
    let value = value.trim();
    let valid = !value.is_empty()
        && value
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()));
    if valid {
        Ok(value.to_string())
    } else {
        Err(IntuneError::ConfigError(format!("Invalid OS version '{}'", value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Ios,
    MacOs,
    Android,
}

impl FromStr for Platform {
    type Err = IntuneError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "windows" | "windows10" => Ok(Platform::Windows),
            "ios" | "ipados" => Ok(Platform::Ios),
            "macos" | "mac" => Ok(Platform::MacOs),
            "android" => Ok(Platform::Android),
            other => Err(IntuneError::ConfigError(format!("Unknown platform '{}'", other))),
        }
    }
}

impl Platform {
    /// Platform for a compliance policy `@odata.type`
    pub fn from_odata_type(odata_type: &str) -> Option<Platform> {
        let t = odata_type.trim_start_matches("#microsoft.graph.").to_lowercase();
        if t.starts_with("windows10") {
            Some(Platform::Windows)
        } else if t.starts_with("ios") {
            Some(Platform::Ios)
        } else if t.starts_with("macos") {
            Some(Platform::MacOs)
        } else if t.starts_with("android") || t.starts_with("aosp") {
            Some(Platform::Android)
        } else {
            None
        }
    }
}

/// Desired OS thresholds, one entry per platform being managed
#[derive(Debug, Clone, Default)]
pub struct OsTargets {
    pub windows: Option<Vec<OsBuild>>,
    pub ios: Option<String>,
    pub macos: Option<String>,
    pub android: Option<String>,
}

impl OsTargets {
    pub fn from_args(args: &OsBuildArgs) -> Result<Self> {
        let mut targets = OsTargets::default();

        for name in split_list(&args.platforms) {
            match name.parse::<Platform>()? {
                Platform::Windows => {
                    let builds = parse_builds(&args.windows_builds)?;
                    if builds.is_empty() {
                        return Err(IntuneError::ConfigError(
                            "--windows-build is required for the windows platform".into(),
                        ));
                    }
                    targets.windows = Some(builds);
                }
                Platform::Ios => targets.ios = Some(required_version(&args.ios_min, "--ios-min")?),
                Platform::MacOs => {
                    targets.macos = Some(required_version(&args.macos_min, "--macos-min")?)
                }
                Platform::Android => {
                    targets.android = Some(required_version(&args.android_min, "--android-min")?)
                }
            }
        }

        Ok(targets)
    }

    /// Whether any target was given for `platform`
    pub fn covers(&self, platform: Platform) -> bool {
        match platform {
            Platform::Windows => self.windows.is_some(),
            Platform::Ios => self.ios.is_some(),
            Platform::MacOs => self.macos.is_some(),
            Platform::Android => self.android.is_some(),
        }
    }
}

fn required_version(value: &Option<String>, flag: &str) -> Result<String> {
    match value {
        Some(v) => validate_version(v),
        None => Err(IntuneError::ConfigError(format!("{} is required for this platform", flag))),
    }
}

/// PATCH body that brings `policy` to the targets, or `None` when it is already there
pub fn desired_patch(policy: &CompliancePolicy, targets: &OsTargets) -> Option<Value> {
    let platform = Platform::from_odata_type(&policy.odata_type)?;

    if platform == Platform::Windows {
        let ranges = build_ranges(targets.windows.as_deref()?);
        let current = policy.valid_operating_system_build_ranges.as_deref().unwrap_or_default();
        if current == ranges.as_slice() {
            return None;
        }
        return Some(json!({
            "@odata.type": policy.odata_type,
            "validOperatingSystemBuildRanges": ranges,
        }));
    }

    let wanted = match platform {
        Platform::Ios => targets.ios.as_deref()?,
        Platform::MacOs => targets.macos.as_deref()?,
        Platform::Android => targets.android.as_deref()?,
        Platform::Windows => return None,
    };
    if policy.os_minimum_version.as_deref() == Some(wanted) {
        return None;
    }
    Some(json!({
        "@odata.type": policy.odata_type,
        "osMinimumVersion": wanted,
    }))
}

#[derive(Debug, Default)]
pub struct UpdateSummary {
    pub updated: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Patch every matching compliance policy that is off target
pub async fn apply_os_targets(
    graph: &GraphClient,
    targets: &OsTargets,
    policy_prefix: Option<&str>,
    dry_run: bool,
) -> Result<UpdateSummary> {
    let policies = intune::list_compliance_policies(graph).await?;
    tracing::debug!("Found {} compliance policies", policies.len());

    let mut summary = UpdateSummary::default();
    let prefix = policy_prefix.map(|p| p.to_lowercase());

    for policy in &policies {
        if let Some(prefix) = &prefix {
            if !policy.display_name.to_lowercase().starts_with(prefix.as_str()) {
                continue;
            }
        }
        match Platform::from_odata_type(&policy.odata_type) {
            Some(platform) if targets.covers(platform) => {}
            _ => continue,
        }

        let Some(body) = desired_patch(policy, targets) else {
            println!("  {} {} already compliant", "•".dimmed(), policy.display_name);
            summary.unchanged += 1;
            continue;
        };

        if dry_run {
            println!("  {} {} (would update)", "~".yellow(), policy.display_name);
            tracing::debug!("PATCH body for {}: {}", policy.id, body);
            summary.updated += 1;
            continue;
        }

        match intune::update_compliance_policy(graph, &policy.id, &body).await {
            Ok(()) => {
                println!("  {} {} updated", "✓".green(), policy.display_name);
                summary.updated += 1;
            }
            Err(e) => {
                println!("  {} {}: {}", "✗".red(), policy.display_name, e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

/// The filter that targets one Windows feature release
pub fn release_filter(build: &OsBuild) -> AssignmentFilter {
    AssignmentFilter {
        id: String::new(),
        display_name: format!("Windows build {}", build.build),
        description: Some(format!("Devices running {}", build.release_name())),
        platform: FILTER_PLATFORM.to_string(),
        rule: format!(
            "(device.osVersion -startsWith \"{}\")",
            build.release_prefix()
        ),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FilterAction {
    Create,
    UpdateRule { id: String },
    Unchanged,
}

pub fn plan_filter(wanted: &AssignmentFilter, existing: &[AssignmentFilter]) -> FilterAction {
    match existing
        .iter()
        .find(|f| f.display_name.eq_ignore_ascii_case(&wanted.display_name))
    {
        None => FilterAction::Create,
        Some(f) if f.rule.trim() != wanted.rule => FilterAction::UpdateRule { id: f.id.clone() },
        Some(_) => FilterAction::Unchanged,
    }
}

/// Create or fix one assignment filter per feature release
pub async fn sync_filters(
    graph: &GraphClient,
    builds: &[OsBuild],
    dry_run: bool,
) -> Result<UpdateSummary> {
    let existing = intune::list_assignment_filters(graph).await?;
    let mut summary = UpdateSummary::default();

    for build in builds {
        let wanted = release_filter(build);
        let action = plan_filter(&wanted, &existing);

        let result = match (&action, dry_run) {
            (FilterAction::Unchanged, _) => {
                println!("  {} {} unchanged", "•".dimmed(), wanted.display_name);
                summary.unchanged += 1;
                continue;
            }
            (FilterAction::Create, true) => {
                println!("  {} {} (would create)", "+".green(), wanted.display_name);
                Ok(())
            }
            (FilterAction::UpdateRule { .. }, true) => {
                println!("  {} {} (would update rule)", "~".yellow(), wanted.display_name);
                Ok(())
            }
            (FilterAction::Create, false) => intune::create_assignment_filter(graph, &wanted)
                .await
                .map(|created| {
                    println!(
                        "  {} {} created ({})",
                        "✓".green(),
                        wanted.display_name,
                        created.id
                    );
                }),
            (FilterAction::UpdateRule { id }, false) => {
                intune::update_assignment_filter_rule(graph, id, &wanted.rule)
                    .await
                    .map(|()| {
                        println!("  {} {} rule updated", "✓".green(), wanted.display_name);
                    })
            }
        };

        match result {
            Ok(()) => summary.updated += 1,
            Err(e) => {
                println!("  {} {}: {}", "✗".red(), wanted.display_name, e);
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

fn finish(summary: UpdateSummary) -> Result<()> {
    println!(
        "\n{} changed: {}, unchanged: {}, failed: {}",
        "Summary".bold(),
        summary.updated.to_string().green(),
        summary.unchanged,
        summary.failed.to_string().red()
    );

    if summary.failed > 0 {
        return Err(IntuneError::PartialFailure {
            failed: summary.failed,
            total: summary.updated + summary.unchanged + summary.failed,
        });
    }
    Ok(())
}

pub async fn os_build(args: OsBuildArgs) -> Result<()> {
    let targets = OsTargets::from_args(&args)?;

    println!("{} compliance OS thresholds...", "Updating".cyan().bold());
    if let Some(builds) = &targets.windows {
        for build in builds {
            println!("→ {}: {} - {}", build.release_name(), build, build.release_ceiling());
        }
    }
    let minimums = [
        ("iOS", &targets.ios),
        ("macOS", &targets.macos),
        ("Android", &targets.android),
    ];
    for (label, value) in minimums {
        if let Some(v) = value {
            println!("→ {} minimum: {}", label, v.cyan());
        }
    }
    if args.dry_run {
        println!("{} DRY RUN - no changes will be written", "ℹ".yellow().bold());
    }

    let session = connect(&args.graph).await?;
    let summary = apply_os_targets(
        &session.graph,
        &targets,
        args.policy_prefix.as_deref(),
        args.dry_run,
    )
    .await?;

    finish(summary)
}

pub async fn filters(args: FiltersArgs) -> Result<()> {
    let builds = parse_builds(&args.windows_builds)?;

    println!("{} Windows release assignment filters...", "Syncing".cyan().bold());
    if args.dry_run {
        println!("{} DRY RUN - no changes will be written", "ℹ".yellow().bold());
    }

    let session = connect(&args.graph).await?;
    let summary = sync_filters(&session.graph, &builds, args.dry_run).await?;

    finish(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn windows_policy(ranges: Option<Vec<OperatingSystemBuildRange>>) -> CompliancePolicy {
        CompliancePolicy {
            id: "cp-1".into(),
            odata_type: "#microsoft.graph.windows10CompliancePolicy".into(),
            display_name: "Win - Baseline".into(),
            os_minimum_version: None,
            os_maximum_version: None,
            valid_operating_system_build_ranges: ranges,
        }
    }

    #[test]
    fn test_parse_os_build() {
        let build: OsBuild = "10.0.22631.4317".parse().unwrap();
        assert_eq!(build.build, 22631);
        assert_eq!(build.revision, 4317);
        assert_eq!(build.release_ceiling(), "10.0.22631.99999");
        assert_eq!(build.release_name(), "Windows 11 23H2");

        let short: OsBuild = "10.0.26100".parse().unwrap();
        assert_eq!(short.to_string(), "10.0.26100.0");
    }

    #[test]
    fn test_parse_os_build_rejects_garbage() {
        assert!("10.0".parse::<OsBuild>().is_err());
        assert!("10.0.x.1".parse::<OsBuild>().is_err());
        assert!("10.0.22631.4317.1".parse::<OsBuild>().is_err());
    }

    #[test]
    fn test_parse_builds_dedupes_and_sorts() {
        let builds = parse_builds(&[
            "10.0.26100.2033,10.0.22631.4317".to_string(),
            "10.0.22631.9999".to_string(),
        ])
        .unwrap();
        assert_eq!(builds.len(), 2);
        assert_eq!(builds[0].to_string(), "10.0.22631.4317");
        assert_eq!(builds[1].build, 26100);
    }

    #[test]
    fn test_windows_patch_sets_ranges_and_type() {
        let targets = OsTargets {
            windows: Some(vec!["10.0.22631.4317".parse().unwrap()]),
            ..Default::default()
        };
        let body = desired_patch(&windows_policy(None), &targets).unwrap();
        assert_eq!(body["@odata.type"], "#microsoft.graph.windows10CompliancePolicy");
        let ranges = body["validOperatingSystemBuildRanges"].as_array().unwrap();
        assert_eq!(ranges[0]["lowestVersion"], "10.0.22631.4317");
        assert_eq!(ranges[0]["highestVersion"], "10.0.22631.99999");
        assert!(ranges[0]["description"].as_str().unwrap().contains("23H2"));
    }

    #[test]
    fn test_policy_at_target_is_not_patched() {
        let builds: Vec<OsBuild> = vec!["10.0.22631.4317".parse().unwrap()];
        let policy = windows_policy(Some(build_ranges(&builds)));
        let targets = OsTargets {
            windows: Some(builds),
            ..Default::default()
        };
        assert!(desired_patch(&policy, &targets).is_none());
    }

    #[test]
    fn test_mobile_minimum_version_patch() {
        let mut policy = windows_policy(None);
        policy.odata_type = "#microsoft.graph.iosCompliancePolicy".into();
        policy.os_minimum_version = Some("17.0".into());

        let targets = OsTargets {
            ios: Some("17.6".into()),
            ..Default::default()
        };
        let body = desired_patch(&policy, &targets).unwrap();
        assert_eq!(body["osMinimumVersion"], "17.6");

        policy.os_minimum_version = Some("17.6".into());
        assert!(desired_patch(&policy, &targets).is_none());

        // No macOS target: macOS policies are left alone.
        policy.odata_type = "#microsoft.graph.macOSCompliancePolicy".into();
        assert!(desired_patch(&policy, &targets).is_none());
    }

    #[test]
    fn test_platform_from_odata_type() {
        assert_eq!(
            Platform::from_odata_type("#microsoft.graph.androidWorkProfileCompliancePolicy"),
            Some(Platform::Android)
        );
        assert_eq!(
            Platform::from_odata_type("#microsoft.graph.windows10MobileCompliancePolicy"),
            Some(Platform::Windows)
        );
        assert_eq!(Platform::from_odata_type("#microsoft.graph.windows81CompliancePolicy"), None);
    }

    #[test]
    fn test_release_filter_and_plan() {
        let build: OsBuild = "10.0.26100.2033".parse().unwrap();
        let wanted = release_filter(&build);
        assert_eq!(wanted.display_name, "Windows build 26100");
        assert_eq!(wanted.rule, "(device.osVersion -startsWith \"10.0.26100\")");

        assert_eq!(plan_filter(&wanted, &[]), FilterAction::Create);

        let mut existing = wanted.clone();
        existing.id = "f-1".into();
        existing.display_name = "windows BUILD 26100".into();
        assert_eq!(plan_filter(&wanted, &[existing.clone()]), FilterAction::Unchanged);

        existing.rule = "(device.osVersion -startsWith \"10.0.2610\")".into();
        assert_eq!(
            plan_filter(&wanted, &[existing]),
            FilterAction::UpdateRule { id: "f-1".into() }
        );
    }

    #[test]
    fn test_validate_version() {
        assert_eq!(validate_version(" 14.5 ").unwrap(), "14.5");
        assert!(validate_version("14.x").is_err());
        assert!(validate_version("").is_err());
    }
}
