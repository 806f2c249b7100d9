//! 配置文件读写与带注释生成。
//!
//! 用户文件与默认值逐字段合并：缺字段时回写完整配置（保留字段注释），
//! 读入后统一走 [`ConfigSpec::normalize`] 做取值修正。

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("invalid yaml at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldMeta {
    pub name: &'static str,
    pub description: &'static str,
}

pub trait ConfigSpec: Serialize + DeserializeOwned + Default {
    const FILE_NAME: &'static str;

    fn fields() -> &'static [FieldMeta];

    /// 读入后的取值修正（夹紧范围、去空白等）。
    fn normalize(&mut self) {}
}

/// 在 `base_dir`（缺省为当前目录）下加载或创建配置文件。
pub fn load_or_create_with_base<T: ConfigSpec>(base_dir: Option<&Path>) -> Result<T, ConfigError> {
    let path = match base_dir {
        Some(base) => base.join(T::FILE_NAME),
        None => PathBuf::from(T::FILE_NAME),
    };
    load_or_create_at(&path)
}

pub fn load_or_create_at<T: ConfigSpec>(path: &Path) -> Result<T, ConfigError> {
    ensure_parent(path)?;

    if !path.exists() {
        let config = T::default();
        write_with_comments(&config, path)?;
        return Ok(config);
    }

    let user = read_yaml(path)?;
    let missing = match &user {
        Value::Mapping(map) => T::fields()
            .iter()
            .any(|f| !map.contains_key(Value::String(f.name.to_string()))),
        _ => true,
    };

    let mut merged = to_value(&T::default())?;
    merge_values(&mut merged, user);

    let mut config: T =
        serde_yaml::from_value(merged).map_err(|err| ConfigError::Validation(err.to_string()))?;
    config.normalize();

    if missing {
        write_with_comments(&config, path)?;
    }

    Ok(config)
}

pub fn write_with_comments<T: ConfigSpec>(config: &T, path: &Path) -> Result<(), ConfigError> {
    ensure_parent(path)?;
    let yaml = render_with_comments(config)?;
    fs::write(path, yaml).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn render_with_comments<T: ConfigSpec>(config: &T) -> Result<String, ConfigError> {
    let Value::Mapping(mapping) = to_value(config)? else {
        return Err(ConfigError::Validation(
            "config must serialize to a mapping".to_string(),
        ));
    };

    let mut out = String::new();
    for field in T::fields() {
        for line in field.description.lines() {
            out.push_str("# ");
            out.push_str(line);
            out.push('\n');
        }
        let key = Value::String(field.name.to_string());
        let val = mapping.get(&key).cloned().unwrap_or(Value::Null);
        let entry = serde_yaml::to_string(&Mapping::from_iter([(key, val)]))
            .map_err(|err| ConfigError::Validation(err.to_string()))?;
        out.push_str(entry.trim_end());
        out.push('\n');
    }
    Ok(out)
}

fn read_yaml(path: &Path) -> Result<Value, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn to_value<T: Serialize>(config: &T) -> Result<Value, ConfigError> {
    serde_yaml::to_value(config).map_err(|err| ConfigError::Validation(err.to_string()))
}

fn merge_values(default: &mut Value, user: Value) {
    match (default, user) {
        (Value::Mapping(dest), Value::Mapping(src)) => {
            for (key, user_val) in src {
                match dest.get_mut(&key) {
                    Some(dest_val) => merge_values(dest_val, user_val),
                    None => {
                        dest.insert(key, user_val);
                    }
                }
            }
        }
        // 空文件解析为 Null，保留默认值
        (_, Value::Null) => {}
        (dest, other) => *dest = other,
    }
}

fn ensure_parent(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
