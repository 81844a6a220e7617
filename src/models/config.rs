//! Process-environment configuration model
//!
//! The HTTP-facing consumption of these fields lives outside this crate,
//! but the env-parsing mechanics themselves are owned here, the way the
//! lineage's `ConfigManager` owns defaulting and parsing for its
//! (file-based) configuration.

use std::path::PathBuf;
use std::str::FromStr;

/// `POD_EXPLICIT` - one of `yes|no|clean`, default `no`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodExplicit {
    Yes,
    No,
    Clean,
}

impl Default for PodExplicit {
    fn default() -> Self {
        Self::No
    }
}

impl FromStr for PodExplicit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yes" => Ok(Self::Yes),
            "no" => Ok(Self::No),
            "clean" => Ok(Self::Clean),
            _ => Err(()),
        }
    }
}

/// `POD_TYPE` - `episodic|serial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodType {
    Episodic,
    Serial,
}

impl Default for PodType {
    fn default() -> Self {
        Self::Episodic
    }
}

impl FromStr for PodType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "episodic" => Ok(Self::Episodic),
            "serial" => Ok(Self::Serial),
            _ => Err(()),
        }
    }
}

/// Process-wide configuration, sourced from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub port: u16,
    pub pod_title: Option<String>,
    pub pod_description: Option<String>,
    pub pod_language: Option<String>,
    pub pod_copyright: Option<String>,
    pub pod_author: Option<String>,
    pub pod_owner_name: Option<String>,
    pub pod_owner_email: Option<String>,
    pub pod_explicit: PodExplicit,
    pub pod_category: Option<String>,
    pub pod_type: PodType,
    pub pod_image_url: Option<String>,
    /// Library roots, supplied as CLI positional arguments (not env).
    pub roots: Vec<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    let base = std::env::var("TMPDIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(base).join("podible-transcodes")
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

impl Config {
    /// Load configuration from the process environment, with the
    /// documented defaults for everything absent or unparseable.
    pub fn from_env(roots: Vec<PathBuf>) -> Self {
        let data_dir = env_string("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);

        let port: u16 = env_string("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(80);

        let pod_explicit = env_string("POD_EXPLICIT")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| {
                if let Some(raw) = env_string("POD_EXPLICIT") {
                    tracing::warn!("Unrecognized POD_EXPLICIT value '{raw}', defaulting to 'no'");
                }
                PodExplicit::No
            });

        let pod_type = env_string("POD_TYPE")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| {
                if let Some(raw) = env_string("POD_TYPE") {
                    tracing::warn!("Unrecognized POD_TYPE value '{raw}', defaulting to 'episodic'");
                }
                PodType::Episodic
            });

        Self {
            data_dir,
            port,
            pod_title: env_string("POD_TITLE"),
            pod_description: env_string("POD_DESCRIPTION"),
            pod_language: env_string("POD_LANGUAGE"),
            pod_copyright: env_string("POD_COPYRIGHT"),
            pod_author: env_string("POD_AUTHOR"),
            pod_owner_name: env_string("POD_OWNER_NAME"),
            pod_owner_email: env_string("POD_OWNER_EMAIL"),
            pod_explicit,
            pod_category: env_string("POD_CATEGORY"),
            pod_type,
            pod_image_url: env_string("POD_IMAGE_URL"),
            roots,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pod_explicit_parses_known_values() {
        assert_eq!("yes".parse::<PodExplicit>(), Ok(PodExplicit::Yes));
        assert_eq!("CLEAN".parse::<PodExplicit>(), Ok(PodExplicit::Clean));
        assert!("bogus".parse::<PodExplicit>().is_err());
    }

    #[test]
    fn default_data_dir_is_under_tmp() {
        let dir = default_data_dir();
        assert!(dir.ends_with("podible-transcodes"));
    }
}
