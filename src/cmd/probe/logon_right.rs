//! Grant the primary user of a device a user right (local logon by default)
//!
//! The user is taken from LogonUI's last logged-on SID, falling back to the
//! first Entra ID profile and then the first domain/local profile. Rights are
//! read from a `secedit /export` and granted with `secedit /configure`.

use super::ProbeOutcome;
use super::runner::CommandRunner;
use crate::error::{IntuneError, Result};
use clap::Args;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const LOGON_UI_KEY: &str = r"HKLM\SOFTWARE\Microsoft\Windows\CurrentVersion\Authentication\LogonUI";
const PROFILE_LIST_KEY: &str = r"HKLM\SOFTWARE\Microsoft\Windows NT\CurrentVersion\ProfileList";
const ENTRA_SID_PREFIX: &str = "S-1-12-1-";
const DOMAIN_SID_PREFIX: &str = "S-1-5-21-";

#[derive(Args, Debug)]
pub struct LogonRightArgs {
    /// User right to check
    #[arg(long, default_value = "SeInteractiveLogonRight")]
    pub right: String,

    /// Grant the right when the primary user lacks it
    #[arg(long)]
    pub remediate: bool,
}

/// `LastLoggedOnUserSID` from `reg query` output
pub fn parse_last_logged_on_sid(output: &str) -> Option<String> {
    super::registry::parse_reg_query(output, "LastLoggedOnUserSID")
        .map(|v| v.data)
        .filter(|sid| sid.starts_with("S-1-"))
}

/// First Entra ID profile SID, else the first domain/local one
pub fn pick_profile_sid(profile_list: &str) -> Option<String> {
    let sids: Vec<&str> = profile_list
        .lines()
        .filter_map(|line| line.trim().rsplit('\\').next())
        .filter(|leaf| leaf.starts_with("S-1-"))
        .collect();

    sids.iter()
        .find(|s| s.starts_with(ENTRA_SID_PREFIX))
        .or_else(|| sids.iter().find(|s| s.starts_with(DOMAIN_SID_PREFIX)))
        .map(|s| s.to_string())
}

pub fn primary_user_sid(runner: &dyn CommandRunner) -> Result<String> {
    let logon_ui = runner.run("reg", &["query", LOGON_UI_KEY, "/v", "LastLoggedOnUserSID"])?;
    if logon_ui.success() {
        if let Some(sid) = parse_last_logged_on_sid(&logon_ui.stdout_text()) {
            tracing::debug!("Primary user from LogonUI: {}", sid);
            return Ok(sid);
        }
    }

    let profiles = runner.run("reg", &["query", PROFILE_LIST_KEY])?;
    if profiles.success() {
        if let Some(sid) = pick_profile_sid(&profiles.stdout_text()) {
            tracing::debug!("Primary user from ProfileList: {}", sid);
            return Ok(sid);
        }
    }

    Err(IntuneError::ProbeError("Could not determine the primary user SID".into()))
}

/// Decode a secedit INF: UTF-16LE (with or without BOM) or UTF-8
pub fn decode_inf(bytes: &[u8]) -> String {
    let utf16 = |body: &[u8]| {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    };

    match bytes {
        [0xFF, 0xFE, rest @ ..] => utf16(rest),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8_lossy(rest).into_owned(),
        [first, 0, ..] if *first != 0 && bytes.len() % 2 == 0 => utf16(bytes),
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// UTF-16LE with BOM, as secedit writes Unicode templates
pub fn encode_inf(text: &str) -> Vec<u8> {
    let mut out = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out
}

/// Principals listed for `right` under `[Privilege Rights]`; `None` if the right is absent
pub fn parse_right(inf: &str, right: &str) -> Option<Vec<String>> {
    let mut in_section = false;

    for line in inf.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_section = line.eq_ignore_ascii_case("[Privilege Rights]");
            continue;
        }
        if !in_section {
            continue;
        }
        let Some((name, value)) = line.split_once('=') else {
            continue;
        };
        if name.trim().eq_ignore_ascii_case(right) {
            return Some(
                value
                    .split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            );
        }
    }
    None
}

pub fn holds_right(principals: &[String], sid: &str) -> bool {
    principals
        .iter()
        .any(|p| p.trim_start_matches('*').eq_ignore_ascii_case(sid))
}

/// Minimal security template that sets `right` to the existing principals plus `sid`
pub fn remediation_inf(right: &str, principals: &[String], sid: &str) -> String {
    let mut entries: Vec<String> = principals.to_vec();
    entries.push(format!("*{}", sid));

    format!(
        "[Unicode]\r\nUnicode=yes\r\n[Version]\r\nsignature=\"$CHICAGO$\"\r\nRevision=1\r\n[Privilege Rights]\r\n{} = {}\r\n",
        right,
        entries.join(",")
    )
}

/// Fresh, uniquely named scratch directory, removed on drop
fn work_dir() -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix("intunectl-secedit-").tempdir()?)
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

fn export_rights(runner: &dyn CommandRunner, work: &TempDir) -> Result<String> {
    let export = path_arg(&work.path().join("export.inf"));
    let output = runner.run(
        "secedit",
        &["/export", "/cfg", export.as_str(), "/areas", "USER_RIGHTS", "/quiet"],
    )?;
    if !output.success() {
        return Err(IntuneError::ProbeError(format!(
            "secedit /export failed ({}): {}",
            output.status,
            output.stderr_text()
        )));
    }
    Ok(decode_inf(&fs::read(&export)?))
}

pub fn check(runner: &dyn CommandRunner, args: &LogonRightArgs) -> Result<ProbeOutcome> {
    let sid = primary_user_sid(runner)?;
    let work = work_dir()?;

    let inf = export_rights(runner, &work)?;
    let principals = parse_right(&inf, &args.right).unwrap_or_default();

    if holds_right(&principals, &sid) {
        return Ok(ProbeOutcome::Compliant(format!("{} holds {}", sid, args.right)));
    }
    let missing = format!("{} does not hold {}", sid, args.right);
    if !args.remediate {
        return Ok(ProbeOutcome::NonCompliant(missing));
    }

    let template = work.path().join("grant.inf");
    let database = work.path().join("grant.sdb");
    fs::write(&template, encode_inf(&remediation_inf(&args.right, &principals, &sid)))?;
    let (database, template) = (path_arg(&database), path_arg(&template));

    let output = runner.run(
        "secedit",
        &[
            "/configure",
            "/db",
            database.as_str(),
            "/cfg",
            template.as_str(),
            "/areas",
            "USER_RIGHTS",
            "/quiet",
        ],
    )?;
    if !output.success() {
        return Ok(ProbeOutcome::Failed(format!(
            "{}; secedit /configure failed ({}): {}",
            missing,
            output.status,
            output.stderr_text()
        )));
    }

    let verified = parse_right(&export_rights(runner, &work)?, &args.right).unwrap_or_default();
    if holds_right(&verified, &sid) {
        Ok(ProbeOutcome::Remediated(format!("Granted {} to {}", args.right, sid)))
    } else {
        Ok(ProbeOutcome::Failed(format!(
            "{} still missing after secedit /configure",
            args.right
        )))
    }
}
