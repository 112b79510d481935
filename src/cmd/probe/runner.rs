use crate::error::{IntuneError, Result};
use std::process::Command;

/// Captured result of an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Seam between probe logic and the OS tools it drives (`reg.exe`, `secedit.exe`)
pub trait CommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;
}

/// Runs commands on the local machine
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        tracing::debug!("Running {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| IntuneError::ProbeError(format!("Failed to execute {}: {}", program, e)))?;

        Ok(CommandOutput {
            // None when killed by a signal
            status: output.status.code().unwrap_or(-1),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    type Handler = Box<dyn Fn(&[&str]) -> CommandOutput>;

    /// Scripted runner: first matching expectation answers, every call is recorded
    #[derive(Default)]
    pub struct FakeRunner {
        expectations: Vec<(String, Vec<String>, Handler)>,
        pub calls: RefCell<Vec<String>>,
    }

    impl FakeRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Answer calls to `program` whose arguments contain every one of `needles`
        pub fn on(
            mut self,
            program: &str,
            needles: &[&str],
            handler: impl Fn(&[&str]) -> CommandOutput + 'static,
        ) -> Self {
            self.expectations.push((
                program.to_string(),
                needles.iter().map(|n| n.to_string()).collect(),
                Box::new(handler),
            ));
            self
        }

        pub fn called_with(&self, fragment: &str) -> bool {
            self.calls.borrow().iter().any(|c| c.contains(fragment))
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
            self.calls
                .borrow_mut()
                .push(format!("{} {}", program, args.join(" ")));

            for (p, needles, handler) in &self.expectations {
                if p == program && needles.iter().all(|n| args.contains(&n.as_str())) {
                    return Ok(handler(args));
                }
            }
            Ok(CommandOutput {
                status: 1,
                stderr: b"ERROR: unexpected command".to_vec(),
                ..Default::default()
            })
        }
    }

    pub fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            status: 0,
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        }
    }

    pub fn fail() -> CommandOutput {
        CommandOutput {
            status: 1,
            stdout: Vec::new(),
            stderr: b"ERROR: The system was unable to find the specified registry key or value."
                .to_vec(),
        }
    }

    /// Path following `flag` in an argument list
    pub fn arg_after(args: &[&str], flag: &str) -> Option<PathBuf> {
        args.iter()
            .position(|a| a.eq_ignore_ascii_case(flag))
            .and_then(|i| args.get(i + 1))
            .map(PathBuf::from)
    }
}
