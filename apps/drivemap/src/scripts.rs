//! Startup scripts run after the remap pass.
//!
//! Every file in the scripts directory runs once, in natural name order, whether or not the
//! remap converged. Scripts aren't retried and a failing one doesn't stop the rest.

use log::{debug, info, warn};
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// How a script file is executed, by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptKind {
    PowerShell,
    Batch,
    Executable,
}

impl ScriptKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "ps1" => Some(Self::PowerShell),
            "cmd" | "bat" => Some(Self::Batch),
            "exe" => Some(Self::Executable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScriptStatus {
    Completed,
    Failed { code: Option<i32> },
    NotStarted { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOutcome {
    pub path: PathBuf,
    pub kind: ScriptKind,
    #[serde(flatten)]
    pub status: ScriptStatus,
}

impl ScriptOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == ScriptStatus::Completed
    }
}

/// Lists runnable scripts in `dir`, in natural order of their file names.
pub fn discover(dir: &Path) -> io::Result<Vec<(PathBuf, ScriptKind)>> {
    let mut scripts = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let path = entry.path();
        match ScriptKind::from_path(&path) {
            Some(kind) => scripts.push((path, kind)),
            None => debug!("Skipping {}, not a script", path.display()),
        }
    }
    scripts.sort_by(|(a, _), (b, _)| {
        alphanumeric_sort::compare_str(file_name_lower(a), file_name_lower(b))
    });
    Ok(scripts)
}

fn file_name_lower(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Runs scripts with the configured interpreters.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    powershell: String,
    cmd: String,
}

impl ScriptRunner {
    pub fn new(powershell: &str) -> Self {
        Self {
            powershell: powershell.to_string(),
            cmd: "cmd.exe".to_string(),
        }
    }

    pub fn with_cmd(mut self, cmd: &str) -> Self {
        self.cmd = cmd.to_string();
        self
    }

    fn command(&self, path: &Path, kind: ScriptKind) -> Command {
        match kind {
            ScriptKind::PowerShell => {
                let mut command = Command::new(&self.powershell);
                command
                    .args(["-NoProfile", "-NonInteractive", "-ExecutionPolicy", "Bypass", "-File"])
                    .arg(path);
                command
            }
            ScriptKind::Batch => {
                let mut command = Command::new(&self.cmd);
                command.arg("/C").arg(path);
                command
            }
            ScriptKind::Executable => Command::new(path),
        }
    }

    pub fn run(&self, path: &Path, kind: ScriptKind) -> ScriptOutcome {
        info!("Running startup script {}", path.display());
        let status = match self.command(path, kind).status() {
            Ok(status) if status.success() => ScriptStatus::Completed,
            Ok(status) => {
                warn!("Startup script {} exited with {:?}", path.display(), status.code());
                ScriptStatus::Failed { code: status.code() }
            }
            Err(e) => {
                warn!("Couldn't start {}: {}", path.display(), e);
                ScriptStatus::NotStarted { reason: e.to_string() }
            }
        };
        ScriptOutcome {
            path: path.to_path_buf(),
            kind,
            status,
        }
    }

    /// Runs every script in `dir`. An unreadable directory is logged and yields no outcomes.
    pub fn run_all(&self, dir: &Path) -> Vec<ScriptOutcome> {
        let scripts = match discover(dir) {
            Ok(scripts) => scripts,
            Err(e) => {
                warn!("Couldn't list startup scripts in {}: {}", dir.display(), e);
                return Vec::new();
            }
        };
        if scripts.is_empty() {
            info!("No startup scripts in {}", dir.display());
        }
        scripts.iter().map(|(path, kind)| self.run(path, *kind)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir_with(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in files {
            fs::write(dir.path().join(name), "").unwrap();
        }
        dir
    }

    fn names(scripts: &[(PathBuf, ScriptKind)]) -> Vec<String> {
        scripts
            .iter()
            .map(|(p, _)| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_kind_from_extension() {
        assert_eq!(ScriptKind::from_path(Path::new("a.ps1")), Some(ScriptKind::PowerShell));
        assert_eq!(ScriptKind::from_path(Path::new("a.PS1")), Some(ScriptKind::PowerShell));
        assert_eq!(ScriptKind::from_path(Path::new("a.bat")), Some(ScriptKind::Batch));
        assert_eq!(ScriptKind::from_path(Path::new("a.cmd")), Some(ScriptKind::Batch));
        assert_eq!(ScriptKind::from_path(Path::new("a.exe")), Some(ScriptKind::Executable));
        assert_eq!(ScriptKind::from_path(Path::new("readme.txt")), None);
        assert_eq!(ScriptKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_discover_natural_order() {
        let dir = dir_with(&["10-last.ps1", "2-second.cmd", "1-first.exe", "notes.txt"]);
        fs::create_dir(dir.path().join("3-dir.ps1")).unwrap();

        let scripts = discover(dir.path()).unwrap();
        assert_eq!(names(&scripts), vec!["1-first.exe", "2-second.cmd", "10-last.ps1"]);
        assert_eq!(scripts[1].1, ScriptKind::Batch);
    }

    #[test]
    fn test_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(discover(&missing).is_err());
        assert!(ScriptRunner::new("powershell.exe").run_all(&missing).is_empty());
    }

    #[test]
    fn test_missing_interpreter_is_not_started() {
        let dir = dir_with(&["1.ps1", "2.cmd"]);
        let runner = ScriptRunner::new("drivemap-test-no-such-powershell").with_cmd("drivemap-test-no-such-cmd");

        let outcomes = runner.run_all(dir.path());
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| matches!(o.status, ScriptStatus::NotStarted { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_codes_become_outcomes() {
        let dir = dir_with(&["1-ok.ps1", "2-fails.cmd", "3-ok.ps1"]);
        // `true` and `false` ignore their arguments.
        let runner = ScriptRunner::new("true").with_cmd("false");

        let outcomes = runner.run_all(dir.path());
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].succeeded());
        assert_eq!(outcomes[1].status, ScriptStatus::Failed { code: Some(1) });
        assert!(outcomes[2].succeeded());
    }

    #[test]
    fn test_outcome_json() {
        let outcome = ScriptOutcome {
            path: PathBuf::from("x.ps1"),
            kind: ScriptKind::PowerShell,
            status: ScriptStatus::Failed { code: Some(3) },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "power_shell");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["code"], 3);
    }
}
