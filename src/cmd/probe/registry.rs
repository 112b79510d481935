//! Registry value check and remediation via `reg.exe`

use super::ProbeOutcome;
use super::runner::CommandRunner;
use crate::error::Result;
use clap::{Args, ValueEnum};

#[derive(Args, Debug)]
pub struct RegistryArgs {
    /// Registry key, e.g. HKLM\SOFTWARE\Policies\Microsoft\Windows\Personalization
    #[arg(long)]
    pub key: String,

    /// Value name (empty for the default value)
    #[arg(long, default_value = "")]
    pub name: String,

    /// Expected data
    #[arg(long)]
    pub expected: String,

    /// Value type used for comparison and when writing
    #[arg(long = "type", value_enum, ignore_case = true, default_value = "REG_DWORD")]
    pub value_type: RegType,

    /// Write the expected value when it is missing or different
    #[arg(long)]
    pub remediate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegType {
    RegSz,
    RegExpandSz,
    RegMultiSz,
    RegDword,
    RegQword,
}

impl RegType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegType::RegSz => "REG_SZ",
            RegType::RegExpandSz => "REG_EXPAND_SZ",
            RegType::RegMultiSz => "REG_MULTI_SZ",
            RegType::RegDword => "REG_DWORD",
            RegType::RegQword => "REG_QWORD",
        }
    }

    fn is_numeric(&self) -> bool {
        matches!(self, RegType::RegDword | RegType::RegQword)
    }
}

/// A value as printed by `reg query`
#[derive(Debug, Clone, PartialEq)]
pub struct RegValue {
    pub name: String,
    pub kind: String,
    pub data: String,
}

/// Columns in `reg query` output are separated by four spaces
const COLUMN_SEP: &str = "    ";

/// Parse `reg query` output, e.g. `    EnableLUA    REG_DWORD    0x1`
///
/// Data is kept verbatim apart from the line ending.
pub fn parse_reg_query(output: &str, name: &str) -> Option<RegValue> {
    let wanted = if name.is_empty() { "(Default)" } else { name };

    output.lines().find_map(|line| {
        let line = line.trim_end_matches('\r');
        let type_at = line.find("    REG_")?;
        let value_name = line[..type_at].trim_start();
        if value_name.is_empty() || !value_name.eq_ignore_ascii_case(wanted) {
            return None;
        }

        let rest = &line[type_at + COLUMN_SEP.len()..];
        let (kind, data) = rest.split_once(COLUMN_SEP).unwrap_or((rest, ""));
        Some(RegValue {
            name: value_name.to_string(),
            kind: kind.trim_end().to_string(),
            data: data.to_string(),
        })
    })
}

/// Parse a DWORD/QWORD as `reg.exe` prints (`0x1f`) or a user types it (`31`)
pub fn parse_number(text: &str) -> Option<u64> {
    let t = text.trim();
    match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => t.parse().ok(),
    }
}

pub fn values_match(value_type: RegType, actual: &str, expected: &str) -> bool {
    if value_type.is_numeric() {
        return match (parse_number(actual), parse_number(expected)) {
            (Some(a), Some(e)) => a == e,
            _ => false,
        };
    }
    actual.trim() == expected.trim()
}

fn query_args<'a>(key: &'a str, name: &'a str) -> Vec<&'a str> {
    if name.is_empty() {
        vec!["query", key, "/ve"]
    } else {
        vec!["query", key, "/v", name]
    }
}

fn read_value(runner: &dyn CommandRunner, key: &str, name: &str) -> Result<Option<RegValue>> {
    let output = runner.run("reg", &query_args(key, name))?;
    if !output.success() {
        tracing::debug!("reg query failed: {}", output.stderr_text());
        return Ok(None);
    }
    Ok(parse_reg_query(&output.stdout_text(), name))
}

fn describe(key: &str, name: &str) -> String {
    if name.is_empty() {
        format!("{}\\(Default)", key)
    } else {
        format!("{}\\{}", key, name)
    }
}

pub fn check(runner: &dyn CommandRunner, args: &RegistryArgs) -> Result<ProbeOutcome> {
    let target = describe(&args.key, &args.name);

    let current = read_value(runner, &args.key, &args.name)?;
    let found = match &current {
        Some(v) if values_match(args.value_type, &v.data, &args.expected) => {
            return Ok(ProbeOutcome::Compliant(format!("{} = {}", target, v.data)));
        }
        Some(v) => format!("{} is {}, expected {}", target, v.data, args.expected),
        None => format!("{} not found", target),
    };

    if !args.remediate {
        return Ok(ProbeOutcome::NonCompliant(found));
    }

    let mut add = vec!["add", args.key.as_str()];
    if args.name.is_empty() {
        add.push("/ve");
    } else {
        add.extend(["/v", args.name.as_str()]);
    }
    add.extend(["/t", args.value_type.as_str(), "/d", args.expected.as_str(), "/f"]);

    let output = runner.run("reg", &add)?;
    if !output.success() {
        return Ok(ProbeOutcome::Failed(format!(
            "{}; reg add failed: {}",
            found,
            output.stderr_text()
        )));
    }

    match read_value(runner, &args.key, &args.name)? {
        Some(v) if values_match(args.value_type, &v.data, &args.expected) => Ok(
            ProbeOutcome::Remediated(format!("{} set to {}", target, args.expected)),
        ),
        _ => Ok(ProbeOutcome::Failed(format!(
            "{} still not {} after remediation",
            target, args.expected
        ))),
    }
}
