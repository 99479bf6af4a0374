use crate::dvfs_common_rs::register::core::exceptions::{DvfsError, DvfsResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// 既定の設定ファイル検索順
pub const DEFAULT_CONFIG_PATHS: &[&str] = &["dvfs.config.toml", "dvfs.config.json", "config.toml", "config.json"];

/// 設定ファイル形式の書き出しを許す既定の較正周波数 (kHz)
pub const DEFAULT_SECONDARY_REFERENCE_KHZ: &str = "665600";

/// プロファイル定義の差し替え先（未指定なら組み込み定義）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilesConfig {
    pub catalog_path: Option<PathBuf>,
    pub axes_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub secondary_reference_khz: String,
    pub default_suffix: Option<String>,
    pub output_dir: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            secondary_reference_khz: DEFAULT_SECONDARY_REFERENCE_KHZ.into(),
            default_suffix: None,
            output_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub profiles: ProfilesConfig,
    pub export: ExportConfig,
    pub logging: LogConfig,
}

/// 設定ローダー
///
/// 検索パスの最初に読めたファイルを既定値に重ね、環境変数で上書きしてから検証する
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::with_paths(DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect())
    }

    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            env_prefix: "DVFS_".into(),
        }
    }

    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn load(&self) -> DvfsResult<EditorConfig> {
        let mut config = EditorConfig::default();
        for path in &self.config_paths {
            if !path.exists() {
                continue;
            }
            match self.load_from_file(path) {
                Ok(file_config) => {
                    config = self.merge_config(config, file_config);
                    break;
                }
                // ロガー初期化前なので標準エラーに出す
                Err(e) => eprintln!("Warning: Failed to load config from {:?}: {}", path, e),
            }
        }
        config = self.apply_env_overrides(config);
        self.validate_config(&config)?;
        Ok(config)
    }

    pub fn load_from_file(&self, path: &Path) -> DvfsResult<EditorConfig> {
        let content = fs::read_to_string(path)
            .map_err(|e| DvfsError::Config(format!("設定ファイルを読めません: {}", e)))?;
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| DvfsError::Config(format!("JSON設定の解析に失敗: {}", e))),
            Some("toml") => {
                toml::from_str(&content).map_err(|e| DvfsError::Config(format!("TOML設定の解析に失敗: {}", e)))
            }
            _ => Err(DvfsError::Config("未対応の設定ファイル形式".into())),
        }
    }

    fn merge_config(&self, mut base: EditorConfig, file: EditorConfig) -> EditorConfig {
        base.profiles.catalog_path = file.profiles.catalog_path.or(base.profiles.catalog_path);
        base.profiles.axes_path = file.profiles.axes_path.or(base.profiles.axes_path);
        if file.export.secondary_reference_khz != ExportConfig::default().secondary_reference_khz {
            base.export.secondary_reference_khz = file.export.secondary_reference_khz;
        }
        base.export.default_suffix = file.export.default_suffix.or(base.export.default_suffix);
        base.export.output_dir = file.export.output_dir.or(base.export.output_dir);
        if file.logging.level != LogConfig::default().level {
            base.logging.level = file.logging.level;
        }
        base.logging.file = file.logging.file.or(base.logging.file);
        base
    }

    fn env_var(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", self.env_prefix, key)).ok()
    }

    fn apply_env_overrides(&self, mut config: EditorConfig) -> EditorConfig {
        if let Some(level) = self.env_var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(file) = self.env_var("LOG_FILE") {
            config.logging.file = Some(PathBuf::from(file));
        }
        if let Some(khz) = self.env_var("SECONDARY_REFERENCE_KHZ") {
            config.export.secondary_reference_khz = khz;
        }
        if let Some(dir) = self.env_var("OUTPUT_DIR") {
            config.export.output_dir = Some(PathBuf::from(dir));
        }
        if let Some(path) = self.env_var("CATALOG_PATH") {
            config.profiles.catalog_path = Some(PathBuf::from(path));
        }
        if let Some(path) = self.env_var("AXES_PATH") {
            config.profiles.axes_path = Some(PathBuf::from(path));
        }
        config
    }

    fn validate_config(&self, config: &EditorConfig) -> DvfsResult<()> {
        match config.logging.level.to_lowercase().as_str() {
            "off" | "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(DvfsError::Config(
                    "ログレベルは off, trace, debug, info, warn, error のいずれか".into(),
                ))
            }
        }
        let khz = &config.export.secondary_reference_khz;
        if khz.is_empty() || !khz.chars().all(|c| c.is_ascii_digit()) {
            return Err(DvfsError::Config(format!("基準周波数が不正です: {}", khz)));
        }
        Ok(())
    }

    pub fn save_config(&self, config: &EditorConfig, path: &Path) -> DvfsResult<()> {
        let content = match path.extension().and_then(|s| s.to_str()) {
            Some("json") => serde_json::to_string_pretty(config)
                .map_err(|e| DvfsError::Config(format!("JSONへの変換に失敗: {}", e)))?,
            Some("toml") => toml::to_string_pretty(config)
                .map_err(|e| DvfsError::Config(format!("TOMLへの変換に失敗: {}", e)))?,
            _ => return Err(DvfsError::Config("未対応の設定ファイル形式".into())),
        };
        fs::write(path, content)?;
        Ok(())
    }
}
