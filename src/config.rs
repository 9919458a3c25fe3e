//! Configuration for artvault.
//!
//! Config file discovery (first match wins):
//! 1. `ARTVAULT_CONFIG` environment variable
//! 2. `.artvault/config.yaml` in the current directory or any parent
//! 3. `~/.config/artvault/config.yaml`
//!
//! Relative paths inside the file resolve against the project root (the
//! directory holding `.artvault/`, or the config file's directory otherwise).
//! Without any config file a single filesystem collection at `~/Pictures`
//! is used.
//!
//! Site and collection types are looked up in static tables and every entry
//! is validated before anything runs.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::collection::hint::{HintStrategy, Hinter, DEFAULT_NAMESPACE};
use crate::collection::{Collection, FilesystemBackend, MemoryBackend};
use crate::filetypes::{FileType, Registry};
use crate::site::{ManifestConfig, ManifestSite, Site};
use crate::sync::{Archiver, DEFAULT_THROTTLE};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV: &str = "ARTVAULT_CONFIG";

const APP_DIR: &str = ".artvault";
const APP_NAME: &str = "artvault";
const CONFIG_NAME: &str = "config.yaml";

/// Global cached configuration (stores Result to handle init errors)
static CONFIG: OnceLock<Result<ResolvedConfig, String>> = OnceLock::new();

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
    #[serde(default)]
    pub collections: Vec<PluginEntry>,
    #[serde(default)]
    pub sync: SyncConfig,
}

fn default_version() -> String {
    "1".to_string()
}

/// One site or collection instance
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Type-specific settings, checked against the type's own schema
    #[serde(default)]
    pub config: serde_yaml::Value,
}

impl PluginEntry {
    /// Configured name, defaulting to the type name
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.kind)
    }

    fn typed_config<T: DeserializeOwned>(&self) -> Result<T> {
        let value = match &self.config {
            serde_yaml::Value::Null => serde_yaml::Value::Mapping(Default::default()),
            other => other.clone(),
        };
        serde_yaml::from_value(value)
            .with_context(|| format!("Invalid config for {} '{}'", self.kind, self.name()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteEntry {
    #[serde(flatten)]
    pub plugin: PluginEntry,
    /// Collections this site archives into
    #[serde(default)]
    pub target: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SyncConfig {
    pub throttle_ms: Option<u64>,
    pub user_agent: Option<String>,
}

/// Resolved sync loop settings
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub throttle: Duration,
    pub user_agent: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            throttle: DEFAULT_THROTTLE,
            user_agent: format!("{}/{}", APP_NAME, env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Resolved configuration with plugin entries and absolute base directory
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// Directory relative paths resolve against
    pub base_dir: PathBuf,
    pub version: String,
    pub sites: Vec<SiteEntry>,
    pub collections: Vec<PluginEntry>,
    pub sync: SyncSettings,
}

// ============================================================================
// Plugin tables
// ============================================================================

type CollectionConstructor = fn(&PluginEntry, &Path) -> Result<Collection>;

type SiteFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Site>>> + Send>>;

struct SiteType {
    name: &'static str,
    /// Check the type-specific config without opening anything
    check: fn(&SiteEntry, &Path) -> Result<()>,
    open: fn(SiteEntry, PathBuf, reqwest::Client) -> SiteFuture,
}

const COLLECTION_TYPES: &[(&str, CollectionConstructor)] = &[
    ("filesystem", filesystem_collection),
    ("memory", memory_collection),
];

const SITE_TYPES: &[SiteType] = &[SiteType {
    name: "manifest",
    check: check_manifest_site,
    open: open_manifest_site,
}];

fn collection_type(kind: &str) -> Option<CollectionConstructor> {
    COLLECTION_TYPES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(kind))
        .map(|(_, constructor)| *constructor)
}

fn site_type(kind: &str) -> Option<&'static SiteType> {
    SITE_TYPES.iter().find(|t| t.name.eq_ignore_ascii_case(kind))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum HintKind {
    Attribute,
    Filename,
}

/// Settings shared by every collection type
#[derive(Debug, Clone, Deserialize)]
struct CommonCollectionConfig {
    /// Hint strategies in priority order
    hints: Option<Vec<HintKind>>,
    /// Attribute namespace for the attribute hint
    namespace: Option<String>,
    /// Enabled file types in priority order
    filetypes: Option<Vec<FileType>>,
}

impl CommonCollectionConfig {
    fn apply(self, collection: Collection) -> Collection {
        let collection = match self.filetypes {
            Some(types) => collection.with_registry(Registry::new(types)),
            None => collection,
        };

        let namespace = self.namespace.unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        match self.hints {
            Some(kinds) => collection.with_hinter(Hinter::new(
                kinds
                    .into_iter()
                    .map(|kind| match kind {
                        HintKind::Attribute => HintStrategy::attribute(namespace.clone()),
                        HintKind::Filename => HintStrategy::Filename,
                    })
                    .collect(),
            )),
            None => collection.with_hinter(Hinter::new(vec![
                HintStrategy::attribute(namespace),
                HintStrategy::Filename,
            ])),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct FilesystemCollectionConfig {
    /// Target directory; `~/Pictures` if unset
    path: Option<String>,
    #[serde(flatten)]
    common: CommonCollectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct MemoryCollectionConfig {
    #[serde(default = "default_true")]
    attributes: bool,
    #[serde(flatten)]
    common: CommonCollectionConfig,
}

fn default_true() -> bool {
    true
}

fn filesystem_collection(entry: &PluginEntry, base: &Path) -> Result<Collection> {
    let config: FilesystemCollectionConfig = entry.typed_config()?;
    let path = match config.path {
        Some(path) => resolve_path(base, &path),
        None => default_pictures_dir()?,
    };
    let collection = Collection::new(entry.name(), Arc::new(FilesystemBackend::new(path)));
    Ok(config.common.apply(collection))
}

fn memory_collection(entry: &PluginEntry, _base: &Path) -> Result<Collection> {
    let config: MemoryCollectionConfig = entry.typed_config()?;
    let backend = if config.attributes {
        MemoryBackend::new()
    } else {
        MemoryBackend::without_attributes()
    };
    Ok(config.common.apply(Collection::new(entry.name(), Arc::new(backend))))
}

fn manifest_config(entry: &SiteEntry, base: &Path) -> Result<ManifestConfig> {
    let mut config: ManifestConfig = entry.plugin.typed_config()?;
    config.path = resolve_path(base, &config.path.to_string_lossy());
    Ok(config)
}

fn check_manifest_site(entry: &SiteEntry, base: &Path) -> Result<()> {
    manifest_config(entry, base).map(|_| ())
}

fn open_manifest_site(entry: SiteEntry, base: PathBuf, client: reqwest::Client) -> SiteFuture {
    Box::pin(async move {
        let config = manifest_config(&entry, &base)?;
        let site = ManifestSite::load(entry.plugin.name.clone(), entry.target.clone(), config, client).await?;
        Ok(Box::new(site) as Box<dyn Site>)
    })
}

// ============================================================================
// Validation and construction
// ============================================================================

impl ResolvedConfig {
    /// Check every entry: known type, unique name, existing targets and a
    /// well-formed type-specific config
    pub fn validate(&self) -> Result<()> {
        let mut collection_names = Vec::new();
        for entry in &self.collections {
            let constructor = collection_type(&entry.kind)
                .with_context(|| format!("Unknown collection type '{}'", entry.kind))?;
            if collection_names.contains(&entry.name()) {
                bail!("Duplicate collection name '{}'", entry.name());
            }
            constructor(entry, &self.base_dir)?;
            collection_names.push(entry.name());
        }

        let mut site_names = Vec::new();
        for entry in &self.sites {
            let plugin = &entry.plugin;
            let site = site_type(&plugin.kind).with_context(|| format!("Unknown site type '{}'", plugin.kind))?;
            if site_names.contains(&plugin.name()) {
                bail!("Duplicate site name '{}'", plugin.name());
            }
            if entry.target.is_empty() {
                bail!("Site '{}' has no target collection", plugin.name());
            }
            for target in &entry.target {
                if !collection_names.contains(&target.as_str()) {
                    bail!("Site '{}' refers to nonexistent target '{}'", plugin.name(), target);
                }
            }
            (site.check)(entry, &self.base_dir)?;
            site_names.push(plugin.name());
        }

        Ok(())
    }

    /// Instantiate every configured collection, keyed by name
    pub fn build_collections(&self) -> Result<IndexMap<String, Arc<Collection>>> {
        let mut collections = IndexMap::new();
        for entry in &self.collections {
            let constructor = collection_type(&entry.kind)
                .with_context(|| format!("Unknown collection type '{}'", entry.kind))?;
            let collection = constructor(entry, &self.base_dir)?;
            collections.insert(entry.name().to_string(), Arc::new(collection));
        }
        Ok(collections)
    }

    /// Open every configured site
    pub async fn build_sites(&self, client: &reqwest::Client) -> Result<Vec<Box<dyn Site>>> {
        let mut sites = Vec::new();
        for entry in &self.sites {
            let site = site_type(&entry.plugin.kind)
                .with_context(|| format!("Unknown site type '{}'", entry.plugin.kind))?;
            sites.push((site.open)(entry.clone(), self.base_dir.clone(), client.clone()).await?);
        }
        Ok(sites)
    }

    /// HTTP client for payload downloads
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(&self.sync.user_agent)
            .build()
            .context("Failed to build HTTP client")
    }

    /// A validated archiver over every configured site and collection
    pub async fn archiver(&self) -> Result<Archiver> {
        self.validate()?;
        let client = self.http_client()?;
        let sites = self.build_sites(&client).await?;
        Ok(Archiver::new(sites, self.build_collections()?).with_throttle(self.sync.throttle))
    }
}

// ============================================================================
// Discovery and loading
// ============================================================================

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(APP_DIR).join(CONFIG_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    let user_config = dirs::home_dir()?.join(".config").join(APP_NAME).join(CONFIG_NAME);
    user_config.exists().then_some(user_config)
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Project root for a config file: the parent of `.artvault/`, else the
/// file's own directory
fn base_dir_for(config_path: &Path) -> PathBuf {
    let dir = config_path.parent().unwrap_or(Path::new("."));
    match (dir.file_name(), dir.parent()) {
        (Some(name), Some(root)) if name == APP_DIR => root.to_path_buf(),
        _ => dir.to_path_buf(),
    }
}

/// Resolve a path that may start with `~` or be relative to `base`
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    if path_str == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }

    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

fn default_pictures_dir() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .context("Failed to determine home directory")?
        .join("Pictures"))
}

/// Resolve a parsed config file located at `config_path`
fn resolve(config: ConfigFile, config_path: Option<PathBuf>) -> Result<ResolvedConfig> {
    let base_dir = match &config_path {
        Some(path) => base_dir_for(path),
        None => std::env::current_dir().context("Failed to determine current directory")?,
    };

    let defaults = SyncSettings::default();
    let sync = SyncSettings {
        throttle: config
            .sync
            .throttle_ms
            .map(Duration::from_millis)
            .unwrap_or(defaults.throttle),
        user_agent: config.sync.user_agent.unwrap_or(defaults.user_agent),
    };

    Ok(ResolvedConfig {
        config_file: config_path,
        base_dir,
        version: config.version,
        sites: config.sites,
        collections: config.collections,
        sync,
    })
}

/// Load the config file at `path`
pub fn load_config_from(path: &Path) -> Result<ResolvedConfig> {
    let config = load_config_file(path)?;
    resolve(config, Some(path.to_path_buf()))
}

/// Load configuration from all sources
fn load_config() -> Result<ResolvedConfig> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return load_config_from(Path::new(&path));
    }

    match find_config_file() {
        Some(path) => load_config_from(&path),
        None => {
            let default = ConfigFile {
                version: default_version(),
                collections: vec![PluginEntry {
                    kind: "filesystem".to_string(),
                    name: Some("pictures".to_string()),
                    config: serde_yaml::Value::Null,
                }],
                ..ConfigFile::default()
            };
            resolve(default, None)
        }
    }
}

/// Get the global configuration (loads once, then cached)
pub fn config() -> Result<&'static ResolvedConfig> {
    let result = CONFIG.get_or_init(|| load_config().map_err(|e| format!("{:#}", e)));

    match result {
        Ok(config) => Ok(config),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload configuration (useful for testing)
pub fn reload_config() -> Result<ResolvedConfig> {
    load_config()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, yaml: &str) -> PathBuf {
        let app_dir = dir.path().join(APP_DIR);
        std::fs::create_dir_all(&app_dir).unwrap();
        let config_path = app_dir.join(CONFIG_NAME);
        let mut file = std::fs::File::create(&config_path).unwrap();
        writeln!(file, "{}", yaml).unwrap();
        config_path
    }

    fn parse(yaml: &str) -> ResolvedConfig {
        let config: ConfigFile = serde_yaml::from_str(yaml).unwrap();
        resolve(config, Some(PathBuf::from("/project/.artvault/config.yaml"))).unwrap()
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let config_path = write_config(
            &temp,
            r#"
version: "1"
sites:
  - type: manifest
    name: example
    target: [local]
    config:
      path: manifests/example.yaml
collections:
  - type: filesystem
    name: local
    config:
      path: ./archive
      hints: [filename]
sync:
  throttle_ms: 1500
"#,
        );

        let config = load_config_from(&config_path).unwrap();
        assert_eq!(config.version, "1");
        assert_eq!(config.base_dir, temp.path());
        assert_eq!(config.sites[0].plugin.name(), "example");
        assert_eq!(config.sites[0].target, vec!["local"]);
        assert_eq!(config.collections[0].kind, "filesystem");
        assert_eq!(config.sync.throttle, Duration::from_millis(1500));
        assert!(config.sync.user_agent.starts_with("artvault/"));
        config.validate().unwrap();

        let collections = config.build_collections().unwrap();
        let local = &collections["local"];
        assert_eq!(local.name(), "local");
        assert_eq!(local.backend().name(), "filesystem");
    }

    #[test]
    fn test_defaults() {
        let config = parse("collections:\n  - type: memory\n    config: {}\n");
        assert_eq!(config.version, "1");
        assert_eq!(config.sync.throttle, DEFAULT_THROTTLE);
        assert_eq!(config.collections[0].name(), "memory");
        assert_eq!(config.base_dir, PathBuf::from("/project"));
        config.validate().unwrap();
    }

    #[test]
    fn test_type_names_are_case_insensitive() {
        let config = parse("collections:\n  - type: Memory\n");
        config.validate().unwrap();
    }

    #[test]
    fn test_rejects_unknown_type() {
        let config = parse("collections:\n  - type: dropbox\n");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Unknown collection type 'dropbox'"));

        let config = parse(
            "collections:\n  - type: memory\nsites:\n  - type: scraper\n    target: [memory]\n",
        );
        assert!(config.validate().unwrap_err().to_string().contains("Unknown site type"));
    }

    #[test]
    fn test_rejects_duplicate_names() {
        let config = parse("collections:\n  - type: memory\n  - type: memory\n");
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("Duplicate collection name 'memory'"));
    }

    #[test]
    fn test_rejects_missing_target() {
        let config = parse(
            r#"
collections:
  - type: memory
    name: local
sites:
  - type: manifest
    target: [elsewhere]
    config:
      path: m.yaml
"#,
        );
        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("nonexistent target 'elsewhere'"));

        let config = parse("sites:\n  - type: manifest\n    config:\n      path: m.yaml\n");
        assert!(config.validate().unwrap_err().to_string().contains("no target"));
    }

    #[test]
    fn test_rejects_bad_typed_config() {
        let config = parse(
            "collections:\n  - type: filesystem\n    config:\n      hints: [carrier-pigeon]\n",
        );
        assert!(config.validate().unwrap_err().to_string().contains("Invalid config for filesystem"));

        let config = parse(
            "collections:\n  - type: memory\nsites:\n  - type: manifest\n    target: [memory]\n    config: {}\n",
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_dir_for() {
        assert_eq!(
            base_dir_for(Path::new("/home/user/project/.artvault/config.yaml")),
            PathBuf::from("/home/user/project")
        );
        assert_eq!(
            base_dir_for(Path::new("/etc/artvault/config.yaml")),
            PathBuf::from("/etc/artvault")
        );
    }

    #[test]
    fn test_resolve_relative_path() {
        let base = PathBuf::from("/home/user/project");

        assert_eq!(
            resolve_path(&base, "./subdir"),
            PathBuf::from("/home/user/project/./subdir")
        );
        assert_eq!(
            resolve_path(&base, "/absolute/path"),
            PathBuf::from("/absolute/path")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(resolve_path(&base, "~/Pictures"), home.join("Pictures"));
        }
    }
}
