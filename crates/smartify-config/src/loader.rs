//! YAML loader with custom tag support
//!
//! - `!include path` - replace the node with another YAML file
//! - `!secret key` - substitute a value from `secrets.yaml` in the config dir
//! - `!env_var VAR [default]` - substitute an environment variable

use crate::error::{ConfigError, ConfigResult};
use serde_yaml::value::TaggedValue;
use serde_yaml::Value;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

const SECRETS_FILE: &str = "secrets.yaml";

/// YAML loader resolving includes, secrets and environment variables
pub struct YamlLoader {
    /// Base directory for relative paths and `secrets.yaml`
    config_dir: PathBuf,
    /// Loaded on first `!secret`
    secrets: Option<HashMap<String, String>>,
    /// Files currently being loaded, to detect include cycles
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    /// Create a new loader rooted at the given config directory
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets: None,
            include_stack: HashSet::new(),
        }
    }

    /// Load and process a YAML file
    ///
    /// Relative paths are taken from the config directory.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve(path.as_ref(), &self.config_dir.clone());
        self.load_resolved(path)
    }

    fn load_resolved(&mut self, path: PathBuf) -> ConfigResult<Value> {
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = read(&path)?;
        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process(value, source_path)
    }

    fn process(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    result.insert(k, self.process(v, source_path)?);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.process(v, source_path))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            _ => Ok(value),
        }
    }

    fn process_tagged(&mut self, tagged: TaggedValue, source_path: &Path) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!("Processing tag '{}'", tag);

        match tag.as_str() {
            "!include" => {
                let name = tag_argument(&tag, tagged.value)?;
                let base = source_path.parent().unwrap_or(&self.config_dir).to_path_buf();
                let path = self.resolve(Path::new(&name), &base);
                self.load_resolved(path)
            }
            "!secret" => {
                let key = tag_argument(&tag, tagged.value)?;
                let value = self.secret(&key)?;
                debug!("Substituted secret: {}", key);
                Ok(Value::String(value))
            }
            "!env_var" => {
                let arg = tag_argument(&tag, tagged.value)?;
                let (var, default) = match arg.split_once(char::is_whitespace) {
                    Some((var, default)) => (var.to_string(), Some(default.trim().to_string())),
                    None => (arg, None),
                };
                let value = match (std::env::var(&var), default) {
                    (Ok(value), _) => value,
                    (Err(_), Some(default)) => default,
                    (Err(_), None) => return Err(ConfigError::EnvVarNotFound { var }),
                };
                // Re-parse so numbers and booleans keep their type
                Ok(serde_yaml::from_str(&value).unwrap_or(Value::String(value)))
            }
            _ => {
                let value = self.process(tagged.value, source_path)?;
                Ok(Value::Tagged(Box::new(TaggedValue {
                    tag: tagged.tag,
                    value,
                })))
            }
        }
    }

    fn secret(&mut self, key: &str) -> ConfigResult<String> {
        if self.secrets.is_none() {
            self.secrets = Some(load_secrets(&self.config_dir)?);
        }
        self.secrets
            .as_ref()
            .and_then(|secrets| secrets.get(key).cloned())
            .ok_or_else(|| ConfigError::SecretNotFound {
                key: key.to_string(),
            })
    }

    fn resolve(&self, path: &Path, base: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }

    /// Get the config directory
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn read(path: &Path) -> ConfigResult<String> {
    fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })
}

fn tag_argument(tag: &str, value: Value) -> ConfigResult<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ConfigError::InvalidTag {
            tag: tag.to_string(),
            reason: format!("expected a string, got {:?}", other),
        }),
    }
}

fn load_secrets(config_dir: &Path) -> ConfigResult<HashMap<String, String>> {
    let path = config_dir.join(SECRETS_FILE);
    if !path.exists() {
        debug!("No secrets.yaml found at {:?}", path);
        return Ok(HashMap::new());
    }

    let raw: HashMap<String, Value> =
        serde_yaml::from_str(&read(&path)?).map_err(|e| ConfigError::ParseYaml {
            path: path.clone(),
            source: e,
        })?;

    let secrets: HashMap<String, String> = raw
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => String::new(),
                other => serde_yaml::to_string(&other)
                    .unwrap_or_default()
                    .trim()
                    .to_string(),
            };
            (k, value)
        })
        .collect();

    debug!("Loaded {} secrets from {:?}", secrets.len(), path);
    Ok(secrets)
}

/// Load a YAML file with full tag processing
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    YamlLoader::new(config_dir).load_file(file)
}

/// Load a YAML string with tag processing
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    YamlLoader::new(config_dir).load_string(content, Path::new(source_name))
}
