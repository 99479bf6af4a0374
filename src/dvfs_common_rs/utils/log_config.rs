/// ログ出力の初期化
/// ライブラリは log のマクロだけを使い、バイナリが env_logger を設定する

use crate::dvfs_common_rs::register::core::exceptions::{DvfsError, DvfsResult};
use crate::dvfs_common_rs::utils::config_loader::LogConfig;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::{self, File, OpenOptions};
use std::path::Path;

/// ログレベル文字列を解釈する
pub fn parse_level(level: &str) -> DvfsResult<LevelFilter> {
    level
        .parse::<LevelFilter>()
        .map_err(|_| DvfsError::Config(format!("Invalid log level: {}", level)))
}

fn open_log_file(path: &Path) -> DvfsResult<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// 設定に従って env_logger を初期化する
///
/// `RUST_LOG` があれば設定のレベルより優先する。2回目以降の呼び出しは何もしない
pub fn init_logging(config: &LogConfig) -> DvfsResult<()> {
    let level = parse_level(&config.level)?;
    let mut builder = Builder::new();
    builder.filter_level(level).parse_default_env().format_timestamp_millis();
    if let Some(path) = &config.file {
        let file = open_log_file(path)?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    if builder.try_init().is_err() {
        log::debug!("Logger already initialised");
    }
    Ok(())
}

/// CLI の --debug 指定を反映したログ設定
pub fn effective_config(config: &LogConfig, debug: bool) -> LogConfig {
    let mut config = config.clone();
    if debug {
        config.level = "debug".into();
    }
    config
}
