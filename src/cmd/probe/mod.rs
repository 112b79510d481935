//! Endpoint detection and remediation probes
//!
//! These run on the managed device itself, as the detection or
//! remediation half of a device health script. Exit codes follow the
//! Intune convention: `0` compliant (or remediated), `1` otherwise. The
//! single output line ends up in the Intune portal's device status.

pub mod file;
pub mod logon_right;
pub mod registry;
pub mod runner;

use crate::error::Result;
use colored::Colorize;
use runner::SystemRunner;

#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Compliant(String),
    NonCompliant(String),
    Remediated(String),
    Failed(String),
}

impl ProbeOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            ProbeOutcome::Compliant(_) | ProbeOutcome::Remediated(_) => 0,
            ProbeOutcome::NonCompliant(_) | ProbeOutcome::Failed(_) => 1,
        }
    }

    fn print(&self) {
        match self {
            ProbeOutcome::Compliant(m) => println!("{} Compliant: {}", "✓".green(), m),
            ProbeOutcome::Remediated(m) => println!("{} Remediated: {}", "✓".green(), m),
            ProbeOutcome::NonCompliant(m) => println!("{} Non-compliant: {}", "✗".yellow(), m),
            ProbeOutcome::Failed(m) => println!("{} Failed: {}", "✗".red(), m),
        }
    }
}

fn finish(outcome: ProbeOutcome) -> i32 {
    outcome.print();
    outcome.exit_code()
}

pub fn registry(args: registry::RegistryArgs) -> Result<i32> {
    Ok(finish(registry::check(&SystemRunner, &args)?))
}

pub fn logon_right(args: logon_right::LogonRightArgs) -> Result<i32> {
    Ok(finish(logon_right::check(&SystemRunner, &args)?))
}

pub fn file(args: file::FileArgs) -> Result<i32> {
    Ok(finish(file::check(&args)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ProbeOutcome::Compliant("ok".into()).exit_code(), 0);
        assert_eq!(ProbeOutcome::Remediated("fixed".into()).exit_code(), 0);
        assert_eq!(ProbeOutcome::NonCompliant("drift".into()).exit_code(), 1);
        assert_eq!(ProbeOutcome::Failed("boom".into()).exit_code(), 1);
    }
}
