//! HTML and CSV report rendering
//!
//! Shared by the baseline comparison and disk-space reports:
//! - header with tenant and generation time
//! - summary cards
//! - one status-coloured table
//!
//! CSV output carries the same table without styling.

use crate::error::Result;
use chrono::{DateTime, Local};
use std::fs;
use std::path::Path;

/// Report metadata
#[derive(Debug, Clone)]
pub struct ReportMetadata {
    pub title: String,
    pub tenant_name: String,
    pub generated_at: DateTime<Local>,
    pub report_type: ReportType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    BaselineComparison,
    DiskSpace,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::BaselineComparison => "Security Baseline Comparison",
            ReportType::DiskSpace => "Device Disk Space Report",
        }
    }
}

/// Output format for report commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReportFormat {
    Html,
    Csv,
}

impl ReportFormat {
    /// Infer from the output file extension, defaulting to HTML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ReportFormat::Csv,
            _ => ReportFormat::Html,
        }
    }
}

/// Row highlight in the HTML table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowTone {
    Ok,
    Warning,
    Danger,
    Neutral,
}

impl RowTone {
    fn class(&self) -> &'static str {
        match self {
            RowTone::Ok => "row-ok",
            RowTone::Warning => "row-warning",
            RowTone::Danger => "row-danger",
            RowTone::Neutral => "row-neutral",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReportRow {
    pub cells: Vec<String>,
    pub tone: RowTone,
}

#[derive(Debug, Clone)]
pub struct ReportTable {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<ReportRow>,
}

/// Escape text for inclusion in HTML element content or attributes
pub fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Generate the complete HTML report
pub fn generate_html_report(
    metadata: &ReportMetadata,
    summary: &[(String, String)],
    table: &ReportTable,
) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} - {tenant}</title>
    <style>
{css}
    </style>
</head>
<body>
    <div class="container">
{header}
{summary}
{table}
{footer}
    </div>
</body>
</html>"#,
        title = html_escape(&metadata.title),
        tenant = html_escape(&metadata.tenant_name),
        css = get_css_styles(),
        header = generate_header(metadata),
        summary = generate_summary_section(summary),
        table = generate_table_section(table),
        footer = generate_footer(metadata),
    )
}

/// Write the table as CSV with a header row
pub fn write_csv_report(path: &Path, table: &ReportTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&table.headers)?;
    for row in &table.rows {
        writer.write_record(&row.cells)?;
    }
    writer.flush()?;
    Ok(())
}

/// Render the report in the requested format and write it to `path`
pub fn write_report(
    path: &Path,
    format: ReportFormat,
    metadata: &ReportMetadata,
    summary: &[(String, String)],
    table: &ReportTable,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    match format {
        ReportFormat::Html => fs::write(path, generate_html_report(metadata, summary, table))?,
        ReportFormat::Csv => write_csv_report(path, table)?,
    }

    tracing::debug!("Wrote {:?} report to {}", format, path.display());
    Ok(())
}

fn get_css_styles() -> &'static str {
    r#"
        :root {
            --primary: #1e40af;
            --secondary: #64748b;
            --success: #16a34a;
            --warning: #ca8a04;
            --danger: #dc2626;
            --light: #f8fafc;
            --dark: #1e293b;
            --border: #e2e8f0;
        }

        * { margin: 0; padding: 0; box-sizing: border-box; }

        body {
            font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
            line-height: 1.6;
            color: var(--dark);
            background: var(--light);
        }

        .container {
            max-width: 1400px;
            margin: 0 auto;
            padding: 2rem;
            background: white;
            min-height: 100vh;
        }

        .header {
            text-align: center;
            padding: 2rem 0;
            border-bottom: 3px solid var(--primary);
            margin-bottom: 2rem;
        }

        .header h1 { color: var(--primary); font-size: 2rem; font-weight: 600; }
        .header .subtitle { color: var(--secondary); font-size: 1.1rem; }

        .header .metadata {
            display: flex;
            justify-content: center;
            gap: 2rem;
            margin-top: 1rem;
            font-size: 0.9rem;
            color: var(--secondary);
        }

        .summary-grid {
            display: grid;
            grid-template-columns: repeat(auto-fit, minmax(180px, 1fr));
            gap: 1rem;
            margin-bottom: 2rem;
        }

        .summary-card {
            background: var(--light);
            padding: 1.25rem;
            border-radius: 8px;
            border: 1px solid var(--border);
            text-align: center;
        }

        .summary-card h4 {
            font-size: 0.8rem;
            color: var(--secondary);
            text-transform: uppercase;
            margin-bottom: 0.25rem;
        }

        .summary-card p { font-size: 1.5rem; font-weight: 600; }

        .section-title {
            font-size: 1.25rem;
            font-weight: 600;
            color: var(--primary);
            margin-bottom: 1rem;
            padding-bottom: 0.5rem;
            border-bottom: 2px solid var(--border);
        }

        .report-table { width: 100%; border-collapse: collapse; font-size: 0.9rem; }

        .report-table th,
        .report-table td {
            padding: 0.6rem;
            text-align: left;
            border-bottom: 1px solid var(--border);
            vertical-align: top;
            word-break: break-word;
        }

        .report-table th {
            background: var(--light);
            font-weight: 600;
            color: var(--secondary);
            font-size: 0.8rem;
            text-transform: uppercase;
            position: sticky;
            top: 0;
        }

        .row-ok td:first-child { border-left: 4px solid var(--success); }
        .row-warning td:first-child { border-left: 4px solid var(--warning); }
        .row-danger td:first-child { border-left: 4px solid var(--danger); }
        .row-danger { background: #fef2f2; }
        .row-neutral td:first-child { border-left: 4px solid var(--border); }

        .footer {
            text-align: center;
            padding: 2rem 0;
            margin-top: 2rem;
            border-top: 1px solid var(--border);
            color: var(--secondary);
            font-size: 0.85rem;
        }

        @media print {
            .container { padding: 0; max-width: none; }
            .report-table th { position: static; }
        }
    "#
}

fn generate_header(metadata: &ReportMetadata) -> String {
    format!(
        r#"        <header class="header">
            <h1>{title}</h1>
            <p class="subtitle">{report_type}</p>
            <div class="metadata">
                <span><strong>Tenant:</strong> {tenant}</span>
                <span><strong>Generated:</strong> {date}</span>
            </div>
        </header>"#,
        title = html_escape(&metadata.title),
        report_type = metadata.report_type.as_str(),
        tenant = html_escape(&metadata.tenant_name),
        date = metadata.generated_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

fn generate_summary_section(summary: &[(String, String)]) -> String {
    if summary.is_empty() {
        return String::new();
    }

    let cards = summary
        .iter()
        .map(|(label, value)| {
            format!(
                r#"            <div class="summary-card"><h4>{}</h4><p>{}</p></div>"#,
                html_escape(label),
                html_escape(value)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"        <section class="summary-grid">
{cards}
        </section>"#
    )
}

fn generate_table_section(table: &ReportTable) -> String {
    let headers = table
        .headers
        .iter()
        .map(|h| format!("<th>{}</th>", html_escape(h)))
        .collect::<String>();

    let rows = if table.rows.is_empty() {
        format!(
            r#"                <tr class="row-neutral"><td colspan="{}">No rows</td></tr>"#,
            table.headers.len().max(1)
        )
    } else {
        table
            .rows
            .iter()
            .map(|row| {
                let cells = row
                    .cells
                    .iter()
                    .map(|c| format!("<td>{}</td>", html_escape(c)))
                    .collect::<String>();
                format!(r#"                <tr class="{}">{}</tr>"#, row.tone.class(), cells)
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"        <section class="section">
            <h2 class="section-title">{title} ({count})</h2>
            <table class="report-table">
                <thead><tr>{headers}</tr></thead>
                <tbody>
{rows}
                </tbody>
            </table>
        </section>"#,
        title = html_escape(&table.title),
        count = table.rows.len(),
    )
}

fn generate_footer(metadata: &ReportMetadata) -> String {
    format!(
        r#"        <footer class="footer">
            <p>Generated by intunectl {version} on {date}</p>
        </footer>"#,
        version = env!("CARGO_PKG_VERSION"),
        date = metadata.generated_at.format("%Y-%m-%d"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (ReportMetadata, ReportTable) {
        let metadata = ReportMetadata {
            title: "Baseline <A> vs B".into(),
            tenant_name: "Contoso".into(),
            generated_at: Local::now(),
            report_type: ReportType::BaselineComparison,
        };
        let table = ReportTable {
            title: "Settings".into(),
            headers: vec!["Setting".into(), "Status".into()],
            rows: vec![ReportRow {
                cells: vec!["device_vendor_msft_a".into(), "Only in Baseline1".into()],
                tone: RowTone::Warning,
            }],
        };
        (metadata, table)
    }

    #[test]
    fn test_html_report_escapes_and_contains_rows() {
        let (metadata, table) = sample();
        let html = generate_html_report(&metadata, &[("Same".into(), "3".into())], &table);
        assert!(html.contains("Baseline &lt;A&gt; vs B"));
        assert!(html.contains(r#"<tr class="row-warning"><td>device_vendor_msft_a</td>"#));
        assert!(html.contains("<h4>Same</h4><p>3</p>"));
    }

    #[test]
    fn test_csv_report_has_header_and_rows() {
        let (_, table) = sample();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv_report(&path, &table).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "Setting,Status\ndevice_vendor_msft_a,Only in Baseline1\n");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ReportFormat::from_path(Path::new("r.CSV")), ReportFormat::Csv);
        assert_eq!(ReportFormat::from_path(Path::new("r.html")), ReportFormat::Html);
        assert_eq!(ReportFormat::from_path(Path::new("report")), ReportFormat::Html);
    }
}
