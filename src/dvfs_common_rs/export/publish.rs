/// 書き出し先の決定と公開
/// 一時ファイルに書いてから最終パスへコピーし、一時ファイルを削除する

use crate::dvfs_common_rs::register::core::exceptions::{DvfsResult, ExportError};
use log::debug;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// 書き出し先のパスを決める
///
/// `<元の名前><suffix>.<拡張子>` を元ファイルの隣、または出力ディレクトリに置く。
/// 上書き指定でサフィックスも出力ディレクトリもなければ元ファイルそのもの
///
/// Args:
///     source: 元ファイル
///     suffix: 名前に付けるサフィックス
///     output_dir: 出力ディレクトリ
///     overwrite: 上書きするか
pub fn output_path(
    source: &Path,
    suffix: &str,
    output_dir: Option<&Path>,
    overwrite: bool,
) -> Result<PathBuf, ExportError> {
    if suffix.is_empty() && output_dir.is_none() {
        return if overwrite {
            Ok(source.to_path_buf())
        } else {
            Err(ExportError::SuffixRequired)
        };
    }

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match source.extension() {
        Some(ext) => format!("{}{}.{}", stem, suffix, ext.to_string_lossy()),
        None => format!("{}{}", stem, suffix),
    };
    let directory = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => source.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(directory.join(file_name))
}

/// 内容を一時ファイル経由で書き出す
pub fn publish(destination: &Path, contents: &str) -> DvfsResult<()> {
    let mut scratch = NamedTempFile::new()?;
    scratch.write_all(contents.as_bytes())?;
    scratch.flush()?;
    fs::copy(scratch.path(), destination)?;
    debug!(
        "Published {} bytes to {} via {}",
        contents.len(),
        destination.display(),
        scratch.path().display()
    );
    scratch.close()?;
    Ok(())
}
