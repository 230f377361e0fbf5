//! PowerShell command runner.
//!
//! The Storage module cmdlets (`Get-Disk`, `Get-Partition`, `Set-Partition`, `Set-Volume`)
//! are the supported way to manage letters and labels, so the backend drives them through
//! `powershell.exe` and reads results back as JSON.

use log::debug;
use serde::de::DeserializeOwned;
use std::fmt;
use std::process::Command;

/// Error running a PowerShell script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PowerShellError {
    /// The interpreter couldn't be started.
    Spawn(String),
    /// The script exited unsuccessfully.
    Failed { code: Option<i32>, stderr: String },
    /// The script's output wasn't the expected JSON.
    Parse(String),
}

impl fmt::Display for PowerShellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(msg) => write!(f, "Failed to start PowerShell: {}", msg),
            Self::Failed { code, stderr } => match code {
                Some(code) => write!(f, "PowerShell exited with {}: {}", code, stderr),
                None => write!(f, "PowerShell was terminated: {}", stderr),
            },
            Self::Parse(msg) => write!(f, "Unexpected PowerShell output: {}", msg),
        }
    }
}

impl std::error::Error for PowerShellError {}

/// Flags for an unattended, profile-free session.
const BASE_ARGS: [&str; 4] = ["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass"];

#[derive(Debug, Clone)]
pub struct PowerShell {
    program: String,
}

impl PowerShell {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }

    /// Runs a script and returns its stdout.
    pub fn run(&self, script: &str) -> Result<String, PowerShellError> {
        debug!("Running PowerShell: {}", script);
        let output = Command::new(&self.program)
            .args(BASE_ARGS)
            .arg("-Command")
            .arg(script)
            .output()
            .map_err(|e| PowerShellError::Spawn(format!("{}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(PowerShellError::Failed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Runs a script that ends in `ConvertTo-Json` and parses the result.
    pub fn run_json<T: DeserializeOwned>(&self, script: &str) -> Result<T, PowerShellError> {
        let stdout = self.run(script)?;
        parse_json(&stdout)
    }
}

/// Parses script output, tolerating a byte-order mark and surrounding whitespace.
pub fn parse_json<T: DeserializeOwned>(stdout: &str) -> Result<T, PowerShellError> {
    let trimmed = stdout.trim_start_matches('\u{feff}').trim();
    serde_json::from_str(trimmed).map_err(|e| PowerShellError::Parse(e.to_string()))
}

/// Single-quoted PowerShell string literal. Embedded quotes are doubled.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        // PowerShell treats typographic single quotes as quote characters too.
        if matches!(c, '\'' | '\u{2018}' | '\u{2019}' | '\u{201a}' | '\u{201b}') {
            quoted.push(c);
        }
        quoted.push(c);
    }
    quoted.push('\'');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_plain() {
        assert_eq!(quote("DATA"), "'DATA'");
        assert_eq!(quote(""), "''");
    }

    #[test]
    fn test_quote_doubles_single_quotes() {
        assert_eq!(quote("Bob's disk"), "'Bob''s disk'");
        assert_eq!(quote("\u{2019}x"), "'\u{2019}\u{2019}x'");
    }

    #[test]
    fn test_quote_leaves_dollar_and_backtick_alone() {
        assert_eq!(quote("$env:X `n"), "'$env:X `n'");
    }

    #[test]
    fn test_parse_json_with_bom() {
        let value: Vec<u32> = parse_json("\u{feff}[1,2]\r\n").unwrap();
        assert_eq!(value, vec![1, 2]);
    }

    #[test]
    fn test_parse_json_error() {
        let err = parse_json::<Vec<u32>>("Get-Disk : Access denied").unwrap_err();
        assert!(matches!(err, PowerShellError::Parse(_)));
    }

    #[test]
    fn test_missing_interpreter_is_spawn_error() {
        let shell = PowerShell::new("drivemap-test-no-such-powershell");
        assert!(matches!(shell.run("Get-Disk"), Err(PowerShellError::Spawn(_))));
    }
}
