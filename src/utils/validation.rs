//! External-engine availability check
//!
//! The probe/convert engine is pluggable, but the default `FfmpegEngine`
//! shells out to `ffmpeg`/`ffprobe`, so the binary still needs to tell an
//! operator up front whether those tools are on `PATH`.

use std::process::Command;
use which::which;

/// Result of locating and versioning one external tool.
#[derive(Debug, Clone)]
pub struct DependencyStatus {
    pub name: String,
    pub found: bool,
    pub version: Option<String>,
    pub path: Option<String>,
}

impl std::fmt::Display for DependencyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.found {
            write!(f, "✓ {}", self.name)?;
            if let Some(ref version) = self.version {
                write!(f, " ({version})")?;
            }
            if let Some(ref path) = self.path {
                write!(f, "\n  Path: {path}")?;
            }
            Ok(())
        } else {
            write!(f, "✗ {} - NOT FOUND", self.name)
        }
    }
}

fn check_tool(name: &str, version_arg: &str) -> DependencyStatus {
    match which(name) {
        Ok(path) => DependencyStatus {
            name: name.to_string(),
            found: true,
            version: tool_version(name, version_arg),
            path: Some(path.display().to_string()),
        },
        Err(_) => DependencyStatus {
            name: name.to_string(),
            found: false,
            version: None,
            path: None,
        },
    }
}

fn tool_version(name: &str, version_arg: &str) -> Option<String> {
    let output = Command::new(name).arg(version_arg).output().ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(2))
        .map(|s| s.to_string())
}

/// Check that both halves of the default probe/convert engine are present.
pub fn check_engine() -> Vec<DependencyStatus> {
    vec![
        check_tool("ffmpeg", "-version"),
        check_tool("ffprobe", "-version"),
    ]
}

/// Whether every tool the default engine needs is on `PATH`.
pub fn engine_available() -> bool {
    check_engine().iter().all(|dep| dep.found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_engine_reports_both_tools() {
        let deps = check_engine();
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().any(|d| d.name == "ffmpeg"));
        assert!(deps.iter().any(|d| d.name == "ffprobe"));
    }
}
