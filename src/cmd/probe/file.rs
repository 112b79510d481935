//! File presence check with environment variable expansion

use super::ProbeOutcome;
use clap::{Args, ValueEnum};
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct FileArgs {
    /// Path to check; `%VAR%`, `$VAR` and `${VAR}` are expanded
    #[arg(long = "path", required = true)]
    pub paths: Vec<String>,

    /// Whether every path or any one path must satisfy the check
    #[arg(long = "match", value_enum, default_value = "all")]
    pub match_mode: MatchMode,

    /// Compliant when the files do NOT exist
    #[arg(long)]
    pub absent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MatchMode {
    All,
    Any,
}

/// Expand environment references; unknown variables are left as written
pub fn expand_env(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(pos) = rest.find(['%', '$']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        let (name, consumed) = if let Some(after) = tail.strip_prefix('%') {
            match after.find('%') {
                Some(end) if end > 0 => (&after[..end], end + 2),
                _ => ("", 0),
            }
        } else if let Some(after) = tail.strip_prefix("${") {
            match after.find('}') {
                Some(end) if end > 0 => (&after[..end], end + 3),
                _ => ("", 0),
            }
        } else {
            let after = &tail[1..];
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], if end > 0 { end + 1 } else { 0 })
        };

        match (consumed, lookup(name)) {
            (0, _) | (_, None) => {
                // A closing `%` may open the next reference
                let literal = if consumed == 0 || tail.starts_with('%') {
                    1
                } else {
                    consumed
                };
                out.push_str(&tail[..literal]);
                rest = &tail[literal..];
            }
            (_, Some(value)) => {
                out.push_str(&value);
                rest = &tail[consumed..];
            }
        }
    }

    out.push_str(rest);
    out
}

pub fn evaluate(
    paths: &[PathBuf],
    mode: MatchMode,
    absent: bool,
    exists: impl Fn(&Path) -> bool,
) -> ProbeOutcome {
    let satisfied: Vec<bool> = paths.iter().map(|p| exists(p) != absent).collect();
    let ok = match mode {
        MatchMode::All => satisfied.iter().all(|s| *s),
        MatchMode::Any => satisfied.iter().any(|s| *s),
    };

    let failing: Vec<String> = paths
        .iter()
        .zip(&satisfied)
        .filter(|(_, s)| !**s)
        .map(|(p, _)| p.display().to_string())
        .collect();
    let state = if absent { "present" } else { "missing" };

    if ok {
        ProbeOutcome::Compliant(format!(
            "{} of {} path(s) as expected",
            paths.len() - failing.len(),
            paths.len()
        ))
    } else {
        ProbeOutcome::NonCompliant(format!("{}: {}", state, failing.join("; ")))
    }
}

pub fn check(args: &FileArgs) -> ProbeOutcome {
    let paths: Vec<PathBuf> = args
        .paths
        .iter()
        .map(|p| PathBuf::from(expand_env(p, |name| std::env::var(name).ok())))
        .collect();
    tracing::debug!("Checking paths {:?}", paths);

    evaluate(&paths, args.match_mode, args.absent, |p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn env(name: &str) -> Option<String> {
        match name {
            "ProgramFiles" => Some(r"C:\Program Files".into()),
            "HOME" => Some("/home/ada".into()),
            _ => None,
        }
    }

    #[test]
    fn test_expand_env_forms() {
        assert_eq!(
            expand_env(r"%ProgramFiles%\Contoso\agent.exe", env),
            r"C:\Program Files\Contoso\agent.exe"
        );
        assert_eq!(expand_env("$HOME/.config", env), "/home/ada/.config");
        assert_eq!(expand_env("${HOME}x", env), "/home/adax");
    }

    #[test]
    fn test_expand_env_leaves_unknown_and_stray_markers() {
        assert_eq!(expand_env("%NOPE%\\a", env), "%NOPE%\\a");
        assert_eq!(expand_env("100% done", env), "100% done");
        assert_eq!(expand_env("cost $5", env), "cost $5");
        assert_eq!(expand_env("trailing $", env), "trailing $");
        assert_eq!(expand_env("%NOPE%%HOME%", env), "%NOPE%/home/ada");
    }

    #[test]
    fn test_expand_env_after_stray_percent() {
        assert_eq!(
            expand_env(r"50% off %ProgramFiles%\x", env),
            r"50% off C:\Program Files\x"
        );
    }

    #[test]
    fn test_evaluate_modes() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        fs::write(&present, "x").unwrap();
        let missing = dir.path().join("missing.txt");
        let both = vec![present.clone(), missing.clone()];
        let exists = |p: &Path| p.exists();

        assert_eq!(evaluate(&both, MatchMode::All, false, exists).exit_code(), 1);
        assert_eq!(evaluate(&both, MatchMode::Any, false, exists).exit_code(), 0);
        assert_eq!(evaluate(&[missing.clone()], MatchMode::All, true, exists).exit_code(), 0);

        match evaluate(&both, MatchMode::All, true, exists) {
            ProbeOutcome::NonCompliant(message) => {
                assert!(message.starts_with("present:"));
                assert!(message.contains("present.txt"));
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
