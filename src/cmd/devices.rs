//! Managed device queries and the low disk space report

use crate::cmd::progress;
use crate::cmd::report_template::{
    ReportFormat, ReportMetadata, ReportRow, ReportTable, ReportType, RowTone, write_report,
};
use crate::cmd::{GraphOpts, connect};
use crate::error::Result;
use crate::graph::GraphClient;
use crate::graph::intune;
use crate::graph::models::ManagedDevice;
use chrono::Local;
use clap::Args;
use colored::Colorize;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::cmp::Ordering;
use std::path::PathBuf;

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

#[derive(Args, Debug)]
pub struct DiskSpaceArgs {
    /// Flag devices with less free space than this (GB)
    #[arg(long)]
    pub threshold_gb: Option<f64>,

    /// Also flag devices below this percentage of free space
    #[arg(long)]
    pub threshold_percent: Option<f64>,

    /// Only include devices with this operating system
    #[arg(long, default_value = "Windows")]
    pub os: String,

    /// Parallel per-device requests
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Write the report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report format (inferred from the output extension when omitted)
    #[arg(long, value_enum)]
    pub format: Option<ReportFormat>,

    #[command(flatten)]
    pub graph: GraphOpts,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskThreshold {
    pub min_free_gb: f64,
    pub min_free_percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskStatus {
    Low,
    Ok,
    Unknown,
}

impl DiskStatus {
    fn as_str(&self) -> &'static str {
        match self {
            DiskStatus::Low => "Low",
            DiskStatus::Ok => "OK",
            DiskStatus::Unknown => "Unknown",
        }
    }

    fn tone(&self) -> RowTone {
        match self {
            DiskStatus::Low => RowTone::Danger,
            DiskStatus::Ok => RowTone::Ok,
            DiskStatus::Unknown => RowTone::Neutral,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiskRow {
    pub device: ManagedDevice,
    pub free_gb: Option<f64>,
    pub total_gb: Option<f64>,
    pub free_percent: Option<f64>,
    pub status: DiskStatus,
}

/// Storage figures and status for one device
pub fn classify(device: ManagedDevice, threshold: &DiskThreshold) -> DiskRow {
    let total = device.total_storage_space_in_bytes.filter(|b| *b > 0);
    let free = device.free_storage_space_in_bytes.filter(|b| *b >= 0);

    let free_gb = free.map(|b| b as f64 / BYTES_PER_GB);
    let total_gb = total.map(|b| b as f64 / BYTES_PER_GB);
    let free_percent = match (free, total) {
        (Some(f), Some(t)) => Some(f as f64 / t as f64 * 100.0),
        _ => None,
    };

    let status = match (free_gb, total_gb) {
        (Some(gb), Some(_)) => {
            let low_gb = gb < threshold.min_free_gb;
            let low_pct = matches!(
                (threshold.min_free_percent, free_percent),
                (Some(min), Some(pct)) if pct < min
            );
            if low_gb || low_pct {
                DiskStatus::Low
            } else {
                DiskStatus::Ok
            }
        }
        _ => DiskStatus::Unknown,
    };

    DiskRow {
        device,
        free_gb,
        total_gb,
        free_percent,
        status,
    }
}

/// Ascending by free space; devices without figures go last
pub fn sort_rows(rows: &mut [DiskRow]) {
    rows.sort_by(|a, b| match (a.free_gb, b.free_gb) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.device.display_name().cmp(b.device.display_name()),
    });
}

pub struct StorageScan {
    pub devices: Vec<ManagedDevice>,
    pub failures: Vec<(String, String)>,
}

/// Fetch storage fields for every device, at most `concurrency` requests at a time
pub async fn fetch_storage(
    graph: &GraphClient,
    devices: Vec<ManagedDevice>,
    concurrency: usize,
    bar: Option<&ProgressBar>,
) -> StorageScan {
    let results: Vec<(ManagedDevice, Result<ManagedDevice>)> = stream::iter(devices)
        .map(|device| async move {
            let detail = intune::get_managed_device_storage(graph, &device.id).await;
            (device, detail)
        })
        .buffer_unordered(concurrency.max(1))
        .inspect(|_| {
            if let Some(bar) = bar {
                bar.inc(1);
            }
        })
        .collect()
        .await;

    let mut scan = StorageScan {
        devices: Vec::with_capacity(results.len()),
        failures: Vec::new(),
    };
    for (listed, detail) in results {
        match detail {
            Ok(full) => scan.devices.push(full),
            Err(e) => {
                tracing::warn!("Storage lookup failed for {}: {}", listed.display_name(), e);
                scan.failures.push((listed.display_name().to_string(), e.to_string()));
            }
        }
    }
    scan
}

pub struct DiskReport {
    pub rows: Vec<DiskRow>,
    pub failures: Vec<(String, String)>,
}

impl DiskReport {
    pub fn low_count(&self) -> usize {
        self.rows.iter().filter(|r| r.status == DiskStatus::Low).count()
    }
}

/// List devices, fetch their storage and classify them
pub async fn disk_space_report(
    graph: &GraphClient,
    operating_system: Option<&str>,
    threshold: &DiskThreshold,
    concurrency: usize,
) -> Result<DiskReport> {
    let spinner = progress::create_spinner("Listing managed devices...");
    let devices = match intune::list_managed_devices(graph, operating_system).await {
        Ok(d) => {
            progress::finish_success(&spinner, &format!("Found {} devices", d.len()));
            d
        }
        Err(e) => {
            progress::finish_error(&spinner, "Failed to list managed devices");
            return Err(e);
        }
    };

    let bar = progress::create_progress_bar(devices.len() as u64, "Reading storage");
    let scan = fetch_storage(graph, devices, concurrency, Some(&bar)).await;
    progress::finish_success(&bar, "Storage figures collected");

    let mut rows: Vec<DiskRow> = scan
        .devices
        .into_iter()
        .map(|d| classify(d, threshold))
        .collect();
    sort_rows(&mut rows);

    Ok(DiskReport {
        rows,
        failures: scan.failures,
    })
}

fn format_gb(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}", v)).unwrap_or_default()
}

fn report_table(report: &DiskReport) -> ReportTable {
    ReportTable {
        title: "Devices".into(),
        headers: [
            "Device", "User", "OS Version", "Model", "Free (GB)", "Total (GB)", "Free (%)",
            "Last Sync", "Status",
        ]
        .into_iter()
        .map(String::from)
        .collect(),
        rows: report
            .rows
            .iter()
            .map(|r| ReportRow {
                cells: vec![
                    r.device.display_name().to_string(),
                    r.device.user_principal_name.clone().unwrap_or_default(),
                    r.device.os_version.clone().unwrap_or_default(),
                    r.device.model.clone().unwrap_or_default(),
                    format_gb(r.free_gb),
                    format_gb(r.total_gb),
                    r.free_percent.map(|p| format!("{:.0}", p)).unwrap_or_default(),
                    r.device
                        .last_sync_date_time
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_default(),
                    r.status.as_str().to_string(),
                ],
                tone: r.status.tone(),
            })
            .collect(),
    }
}

pub async fn disk_space(args: DiskSpaceArgs) -> Result<()> {
    println!("{} device disk space...", "Checking".cyan().bold());

    let session = connect(&args.graph).await?;
    let threshold = DiskThreshold {
        min_free_gb: args
            .threshold_gb
            .unwrap_or_else(|| session.config.disk_space_threshold_gb()),
        min_free_percent: args.threshold_percent,
    };
    let concurrency = args
        .concurrency
        .filter(|c| *c > 0)
        .unwrap_or_else(|| session.config.concurrency());

    println!("→ Threshold: {:.1} GB", threshold.min_free_gb);
    if let Some(pct) = threshold.min_free_percent {
        println!("→ Threshold: {:.0}% free", pct);
    }

    let os = Some(args.os.as_str()).filter(|o| !o.eq_ignore_ascii_case("all"));
    let report = disk_space_report(&session.graph, os, &threshold, concurrency).await?;

    let low = report.low_count();
    println!(
        "\n  {} {} device(s) below threshold of {}",
        if low > 0 { "!".yellow() } else { "✓".green() },
        low,
        report.rows.len()
    );
    for row in report.rows.iter().filter(|r| r.status == DiskStatus::Low) {
        println!(
            "    {} {} GB free ({})",
            row.device.display_name(),
            format_gb(row.free_gb).red(),
            row.device.user_principal_name.as_deref().unwrap_or("-").dimmed()
        );
    }
    if !report.failures.is_empty() {
        println!(
            "  {} {} device(s) could not be read (run with --verbose for details)",
            "✗".red(),
            report.failures.len()
        );
    }

    if let Some(output) = &args.output {
        let path = session.config.resolve_report_path(output);
        let format = args.format.unwrap_or_else(|| ReportFormat::from_path(&path));
        let metadata = ReportMetadata {
            title: "Low Disk Space".into(),
            tenant_name: session.tenant_label.clone(),
            generated_at: Local::now(),
            report_type: ReportType::DiskSpace,
        };
        let summary = vec![
            ("Devices".to_string(), report.rows.len().to_string()),
            ("Low".to_string(), low.to_string()),
            ("Threshold (GB)".to_string(), format!("{:.1}", threshold.min_free_gb)),
            ("Unreadable".to_string(), report.failures.len().to_string()),
        ];
        write_report(&path, format, &metadata, &summary, &report_table(&report))?;
        println!("\n{} Report written to {}", "✓".green(), path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: i64 = 1024 * 1024 * 1024;

    fn device(name: &str, free_gb: Option<i64>, total_gb: Option<i64>) -> ManagedDevice {
        ManagedDevice {
            id: name.to_lowercase(),
            device_name: Some(name.into()),
            free_storage_space_in_bytes: free_gb.map(|g| g * GB),
            total_storage_space_in_bytes: total_gb.map(|g| g * GB),
            ..Default::default()
        }
    }

    fn threshold(gb: f64, pct: Option<f64>) -> DiskThreshold {
        DiskThreshold {
            min_free_gb: gb,
            min_free_percent: pct,
        }
    }

    #[test]
    fn test_classify_by_gb() {
        let row = classify(device("PC1", Some(5), Some(256)), &threshold(10.0, None));
        assert_eq!(row.status, DiskStatus::Low);
        assert_eq!(row.free_gb, Some(5.0));

        let row = classify(device("PC2", Some(50), Some(256)), &threshold(10.0, None));
        assert_eq!(row.status, DiskStatus::Ok);
    }

    #[test]
    fn test_classify_by_percent() {
        // 40 of 1000 GB is 4% free
        let row = classify(device("PC3", Some(40), Some(1000)), &threshold(10.0, Some(5.0)));
        assert_eq!(row.status, DiskStatus::Low);
        assert!((row.free_percent.unwrap() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_classify_missing_figures_is_unknown() {
        assert_eq!(
            classify(device("PC4", None, Some(256)), &threshold(10.0, None)).status,
            DiskStatus::Unknown
        );
        assert_eq!(
            classify(device("PC5", Some(0), Some(0)), &threshold(10.0, None)).status,
            DiskStatus::Unknown
        );
    }

    #[test]
    fn test_sort_rows_ascending_unknown_last() {
        let t = threshold(10.0, None);
        let mut rows = vec![
            classify(device("B", Some(80), Some(256)), &t),
            classify(device("A", None, None), &t),
            classify(device("C", Some(3), Some(256)), &t),
        ];
        sort_rows(&mut rows);
        let names: Vec<&str> = rows.iter().map(|r| r.device.display_name()).collect();
        assert_eq!(names, vec!["C", "B", "A"]);
    }

    #[test]
    fn test_report_table_rows() {
        let t = threshold(10.0, None);
        let report = DiskReport {
            rows: vec![classify(device("PC1", Some(5), Some(256)), &t)],
            failures: vec![],
        };
        let table = report_table(&report);
        assert_eq!(table.headers.len(), table.rows[0].cells.len());
        assert_eq!(table.rows[0].cells[4], "5.0");
        assert_eq!(table.rows[0].cells[8], "Low");
        assert_eq!(table.rows[0].tone, RowTone::Danger);
        assert_eq!(report.low_count(), 1);
    }
}
