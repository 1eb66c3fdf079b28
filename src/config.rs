//! Configuration for deployhook.
//!
//! Configuration sources (highest priority first):
//! 1. Command-line flags
//! 2. Environment variables (OAUTH_TOKEN, REPOSITORIES_ROOT, BUILD_RUN_DIR,
//!    PORT, HOST, WEBHOOK_SECRET, DEPLOY_ROOT)
//! 3. Config file (.deployhook/config.yaml)
//! 4. Defaults
//!
//! Flags and environment variables are merged by clap into [`ConfigOverrides`].
//!
//! Config file discovery:
//! - An explicit `--config` / `DEPLOYHOOK_CONFIG` path wins
//! - Otherwise searches current directory and parents for .deployhook/config.yaml
//! - Paths in the config file are relative to the directory holding `.deployhook/`
//!
//! The resolved configuration is built once at startup and passed around
//! explicitly; nothing reads it from a global.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{BuildType, Route, RoutingTable};

const DEFAULT_REPOSITORIES_ROOT: &str = "/home/ubuntu/dev/github";
const DEFAULT_PORT: u16 = 3300;
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_USER_AGENT: &str = "deployhook";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub routes: Vec<Route>,
    /// Build types deployed when a request names none
    #[serde(default)]
    pub default_build_types: Vec<BuildType>,
    #[serde(default)]
    pub artifacts: Option<ArtifactsConfig>,
    #[serde(default)]
    pub scripts: Option<ScriptsConfig>,
    #[serde(default)]
    pub queue: Option<QueueConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    pub deploy_root: Option<String>,
    pub repositories_root: Option<String>,
    pub build_run_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    pub api_base: Option<String>,
    pub user_agent: Option<String>,
    pub max_redirects: Option<u32>,
    pub settle_delay_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptsConfig {
    pub shell: Option<String>,
    pub shutdown: Option<String>,
    pub build: Option<String>,
    pub startup: Option<String>,
    /// Startup artifact argument; `{service}` is replaced by the service name
    pub artifact_glob: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    pub capacity: Option<usize>,
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub token: Option<String>,
    pub webhook_secret: Option<String>,
    pub repositories_root: Option<PathBuf>,
    pub build_run_dir: Option<PathBuf>,
    pub deploy_root: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Remote archive API settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSettings {
    pub api_base: String,
    pub user_agent: String,
    /// Redirect hops allowed per download
    pub max_redirects: u32,
    /// Pause before listing runs so the CI provider can publish artifacts
    pub settle_delay: Duration,
}

impl Default for ArtifactSettings {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 10,
            settle_delay: Duration::from_secs(5),
        }
    }
}

/// Lifecycle script settings, paths relative to the build run dir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSettings {
    pub shell: String,
    pub shutdown: String,
    pub build: String,
    pub startup: String,
    pub artifact_glob: String,
}

impl Default for ScriptSettings {
    fn default() -> Self {
        Self {
            shell: "sh".to_string(),
            shutdown: "../src/shutdown.sh".to_string(),
            build: "../src/build.sh".to_string(),
            startup: "../src/startup.sh".to_string(),
            artifact_glob: "../artifacts/{service}/target/*.jar".to_string(),
        }
    }
}

impl ScriptSettings {
    pub fn artifact_glob_for(&self, service: &str) -> String {
        self.artifact_glob.replace("{service}", service)
    }
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Directory holding `{bt}/build`, archives and staging files
    pub deploy_root: PathBuf,
    /// Checkouts of the service repositories
    pub repositories_root: PathBuf,
    /// Working directory of the lifecycle scripts
    pub build_run_dir: PathBuf,
    pub host: String,
    pub port: u16,
    /// Credential for the archive API
    pub token: Option<String>,
    /// Shared secret for webhook signatures
    pub webhook_secret: Option<String>,
    pub routes: RoutingTable,
    pub default_build_types: Vec<BuildType>,
    pub artifacts: ArtifactSettings,
    pub scripts: ScriptSettings,
    pub queue_capacity: usize,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

impl ResolvedConfig {
    /// Configuration with defaults only, rooted at `deploy_root`
    pub fn with_defaults(deploy_root: PathBuf) -> Self {
        let repositories_root = PathBuf::from(DEFAULT_REPOSITORIES_ROOT);
        Self {
            deploy_root,
            build_run_dir: repositories_root.join("build").join("run"),
            repositories_root,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            token: None,
            webhook_secret: None,
            routes: RoutingTable::default(),
            default_build_types: Vec::new(),
            artifacts: ArtifactSettings::default(),
            scripts: ScriptSettings::default(),
            queue_capacity: 32,
            config_file: None,
        }
    }

    /// Append-only deployment history log
    pub fn history_path(&self) -> PathBuf {
        self.deploy_root.join(".deployhook").join("history.jsonl")
    }

    pub fn listen_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Find config file by searching a directory and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".deployhook").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load configuration, discovering the config file from the current directory
pub fn load_config(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    load_config_from(&cwd, overrides)
}

/// Load configuration with `start_dir` as the discovery starting point
pub fn load_config_from(start_dir: &Path, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let config_file = match &overrides.config_file {
        Some(path) => Some(path.clone()),
        None => find_config_file(start_dir),
    };

    let mut config = ResolvedConfig::with_defaults(start_dir.to_path_buf());
    let mut run_dir_pinned = false;

    if let Some(ref config_path) = config_file {
        let file = load_config_file(config_path)?;
        run_dir_pinned = file.paths.build_run_dir.is_some();
        apply_config_file(&mut config, config_path, file);
        config.config_file = Some(config_path.clone());
    }

    apply_overrides(&mut config, overrides, run_dir_pinned);

    Ok(config)
}

fn apply_config_file(config: &mut ResolvedConfig, config_path: &Path, file: ConfigFile) {
    // Base directory is the parent of .deployhook/ (i.e., grandparent of config.yaml)
    let base_dir = config_path
        .parent()
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."));

    if let Some(ref root) = file.paths.deploy_root {
        config.deploy_root = resolve_path(base_dir, root);
    } else {
        config.deploy_root = base_dir.to_path_buf();
    }

    let repositories_root = file
        .paths
        .repositories_root
        .as_deref()
        .map(|p| resolve_path(base_dir, p));
    if let Some(root) = repositories_root {
        config.build_run_dir = root.join("build").join("run");
        config.repositories_root = root;
    }
    if let Some(ref run_dir) = file.paths.build_run_dir {
        config.build_run_dir = resolve_path(base_dir, run_dir);
    }

    config.routes = RoutingTable::new(file.routes);
    config.default_build_types = file.default_build_types;

    if let Some(artifacts) = file.artifacts {
        let defaults = &mut config.artifacts;
        if let Some(api_base) = artifacts.api_base {
            defaults.api_base = api_base.trim_end_matches('/').to_string();
        }
        if let Some(user_agent) = artifacts.user_agent {
            defaults.user_agent = user_agent;
        }
        if let Some(max) = artifacts.max_redirects {
            defaults.max_redirects = max;
        }
        if let Some(secs) = artifacts.settle_delay_seconds {
            defaults.settle_delay = Duration::from_secs(secs);
        }
    }

    if let Some(scripts) = file.scripts {
        let defaults = &mut config.scripts;
        if let Some(shell) = scripts.shell {
            defaults.shell = shell;
        }
        if let Some(shutdown) = scripts.shutdown {
            defaults.shutdown = shutdown;
        }
        if let Some(build) = scripts.build {
            defaults.build = build;
        }
        if let Some(startup) = scripts.startup {
            defaults.startup = startup;
        }
        if let Some(glob) = scripts.artifact_glob {
            defaults.artifact_glob = glob;
        }
    }

    if let Some(capacity) = file.queue.and_then(|q| q.capacity) {
        config.queue_capacity = capacity.max(1);
    }
}

/// `run_dir_pinned`: the config file set `build_run_dir` itself
fn apply_overrides(
    config: &mut ResolvedConfig,
    overrides: &ConfigOverrides,
    run_dir_pinned: bool,
) {
    if let Some(ref root) = overrides.repositories_root {
        config.repositories_root = root.clone();
        // The run dir follows the repositories root unless set explicitly
        if overrides.build_run_dir.is_none() && !run_dir_pinned {
            config.build_run_dir = root.join("build").join("run");
        }
    }
    if let Some(ref run_dir) = overrides.build_run_dir {
        config.build_run_dir = run_dir.clone();
    }
    if let Some(ref root) = overrides.deploy_root {
        config.deploy_root = root.clone();
    }
    if let Some(ref host) = overrides.host {
        config.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.port = port;
    }
    if overrides.token.is_some() {
        config.token = overrides.token.clone();
    }
    if overrides.webhook_secret.is_some() {
        config.webhook_secret = overrides.webhook_secret.clone();
    }
}

/// Printable view of the configuration with credentials redacted
#[derive(Debug, Serialize)]
pub struct RedactedConfig<'a> {
    pub config_file: Option<&'a Path>,
    pub deploy_root: &'a Path,
    pub repositories_root: &'a Path,
    pub build_run_dir: &'a Path,
    pub listen: String,
    pub token: &'static str,
    pub webhook_secret: &'static str,
    pub api_base: &'a str,
    pub max_redirects: u32,
    pub settle_delay_seconds: u64,
    pub queue_capacity: usize,
    pub default_build_types: Vec<&'a str>,
    pub routes: &'a [Route],
}

impl ResolvedConfig {
    pub fn redacted(&self) -> RedactedConfig<'_> {
        fn mask(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "<set>"
            } else {
                "<unset>"
            }
        }

        RedactedConfig {
            config_file: self.config_file.as_deref(),
            deploy_root: &self.deploy_root,
            repositories_root: &self.repositories_root,
            build_run_dir: &self.build_run_dir,
            listen: self.listen_address(),
            token: mask(&self.token),
            webhook_secret: mask(&self.webhook_secret),
            api_base: &self.artifacts.api_base,
            max_redirects: self.artifacts.max_redirects,
            settle_delay_seconds: self.artifacts.settle_delay.as_secs(),
            queue_capacity: self.queue_capacity,
            default_build_types: self.default_build_types.iter().map(|b| b.as_str()).collect(),
            routes: self.routes.routes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let config_dir = dir.join(".deployhook");
        std::fs::create_dir_all(&config_dir).unwrap();
        let config_path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "{}", body).unwrap();
        config_path
    }

    #[test]
    fn test_defaults_without_file() {
        let temp = TempDir::new().unwrap();
        let config = load_config_from(temp.path(), &ConfigOverrides::default()).unwrap();

        assert_eq!(config.deploy_root, temp.path());
        assert_eq!(
            config.build_run_dir,
            PathBuf::from("/home/ubuntu/dev/github/build/run")
        );
        assert_eq!(config.port, 3300);
        assert_eq!(config.artifacts.max_redirects, 10);
        assert!(config.routes.is_empty());
        assert!(config.config_file.is_none());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            temp.path(),
            r#"
version: "1"
paths:
  deploy_root: ./www
  repositories_root: /opt/repos
default_build_types: [citizen, employee]
routes:
  - repository: Transerve-PwC/municipal-services
    ref: refs/heads/feature/rp
    module: municipal-services-rp
    service: rented-properties
artifacts:
  api_base: https://ghe.example.com/api/v3/
  max_redirects: 3
  settle_delay_seconds: 0
scripts:
  shell: bash
queue:
  capacity: 4
"#,
        );

        let config = load_config_from(temp.path(), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.config_file, Some(config_path));
        assert_eq!(config.deploy_root, temp.path().join("www"));
        assert_eq!(config.repositories_root, PathBuf::from("/opt/repos"));
        assert_eq!(config.build_run_dir, PathBuf::from("/opt/repos/build/run"));
        assert_eq!(config.default_build_types.len(), 2);
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.artifacts.api_base, "https://ghe.example.com/api/v3");
        assert_eq!(config.artifacts.max_redirects, 3);
        assert_eq!(config.artifacts.settle_delay, Duration::ZERO);
        assert_eq!(config.scripts.shell, "bash");
        assert_eq!(config.scripts.startup, "../src/startup.sh");
        assert_eq!(config.queue_capacity, 4);
    }

    #[test]
    fn test_discovery_from_subdirectory() {
        let temp = TempDir::new().unwrap();
        write_config(temp.path(), "version: \"1\"\n");
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = load_config_from(&nested, &ConfigOverrides::default()).unwrap();
        assert!(config.config_file.is_some());
        assert_eq!(config.deploy_root, temp.path());
    }

    #[test]
    fn test_overrides_win_over_file() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            "version: \"1\"\npaths:\n  repositories_root: /opt/repos\n",
        );

        let overrides = ConfigOverrides {
            repositories_root: Some(PathBuf::from("/srv/repos")),
            port: Some(8080),
            token: Some("secret-token".to_string()),
            ..Default::default()
        };

        let config = load_config_from(temp.path(), &overrides).unwrap();
        assert_eq!(config.repositories_root, PathBuf::from("/srv/repos"));
        assert_eq!(config.build_run_dir, PathBuf::from("/srv/repos/build/run"));
        assert_eq!(config.listen_address(), "127.0.0.1:8080");
        assert_eq!(config.token.as_deref(), Some("secret-token"));
    }

    #[test]
    fn test_root_override_keeps_explicit_run_dir() {
        let temp = TempDir::new().unwrap();
        write_config(
            temp.path(),
            "version: \"1\"\npaths:\n  repositories_root: /opt/repos\n  build_run_dir: /opt/runner\n",
        );

        let overrides = ConfigOverrides {
            repositories_root: Some(PathBuf::from("/srv/repos")),
            ..Default::default()
        };

        let config = load_config_from(temp.path(), &overrides).unwrap();
        assert_eq!(config.repositories_root, PathBuf::from("/srv/repos"));
        assert_eq!(config.build_run_dir, PathBuf::from("/opt/runner"));

        let overrides = ConfigOverrides {
            repositories_root: Some(PathBuf::from("/srv/repos")),
            build_run_dir: Some(PathBuf::from("/srv/run")),
            ..Default::default()
        };
        let config = load_config_from(temp.path(), &overrides).unwrap();
        assert_eq!(config.build_run_dir, PathBuf::from("/srv/run"));
    }

    #[test]
    fn test_redacted_view_hides_credentials() {
        let mut config = ResolvedConfig::with_defaults(PathBuf::from("/srv"));
        config.token = Some("ghp_abc".to_string());

        let json = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!json.contains("ghp_abc"));
        assert!(json.contains("\"token\":\"<set>\""));
        assert!(json.contains("\"webhook_secret\":\"<unset>\""));
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "../sibling"),
            PathBuf::from("/home/user/project/../sibling")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
    }

    #[test]
    fn test_artifact_glob_template() {
        let scripts = ScriptSettings::default();
        assert_eq!(
            scripts.artifact_glob_for("estate-services"),
            "../artifacts/estate-services/target/*.jar"
        );
    }
}
