/// 較正テーブルエディタ
/// 表示層から呼ばれる読み込み・選択・編集・書き出しの窓口。
/// 利用者向けの状態はすべて1枠のメッセージシンクに通知する

use crate::dvfs_common_rs::edit::session::{EditSession, FieldKey, SelectionPlan};
use crate::dvfs_common_rs::export::primary::rewrite_table;
use crate::dvfs_common_rs::export::publish::{output_path, publish};
use crate::dvfs_common_rs::export::secondary::rewrite_secondary;
use crate::dvfs_common_rs::register::core::exceptions::{DvfsError, DvfsResult, EditError, ExportError};
use crate::dvfs_common_rs::register::profile::{ProfileDefinition, ProfileRegistry};
use crate::dvfs_common_rs::table::parser::{FrequencyFlags, TableParser};
use crate::dvfs_common_rs::table::partition::{ChannelMap, DisplayTree, FieldPartitioner, PartitionedTable};
use crate::dvfs_common_rs::utils::config_loader::DEFAULT_SECONDARY_REFERENCE_KHZ;
use log::{debug, info, warn};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const EXPORT_SUCCESS_MESSAGE: &str = "Export successful!";
pub const AXIS_NOT_PRESENT_MESSAGE: &str = "ERROR: Axis may be unnecessary for selected frequency";

/// 利用者向けメッセージの通知先
#[cfg_attr(test, mockall::automock)]
pub trait MessageSink {
    fn post(&mut self, message: &str);
}

/// 最後のメッセージだけを保持するシンク
#[derive(Debug, Clone, Default)]
pub struct MessageSlot {
    message: Option<String>,
}

impl MessageSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn take(&mut self) -> Option<String> {
        self.message.take()
    }
}

impl MessageSink for MessageSlot {
    fn post(&mut self, message: &str) {
        self.message = Some(message.to_string());
    }
}

/// 表示用の1フィールド
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRow {
    pub key: FieldKey,
    pub bits: u32,
    /// 現在の値（フィールドのビット列）
    pub value: u32,
    /// 保留中の値。範囲外なら "N/A"
    pub pending: String,
}

/// 書き出し依頼
#[derive(Debug, Clone, Default)]
pub struct ExportRequest {
    pub derated: Option<PathBuf>,
    pub secondary: Option<PathBuf>,
    pub suffix: String,
    pub overwrite: bool,
    pub output_dir: Option<PathBuf>,
}

/// 成果物の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Primary,
    Derated,
    Secondary,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Primary => "table",
            ArtifactKind::Derated => "derated table",
            ArtifactKind::Secondary => "configuration file",
        };
        f.write_str(name)
    }
}

/// 成果物ごとの結果
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactReport {
    pub kind: ArtifactKind,
    pub source: PathBuf,
    /// 書き出し先、または失敗理由
    pub outcome: Result<PathBuf, DvfsError>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportReport {
    pub artifacts: Vec<ArtifactReport>,
}

impl ExportReport {
    pub fn is_success(&self) -> bool {
        self.artifacts.iter().all(|a| a.outcome.is_ok())
    }

    pub fn last_error(&self) -> Option<&DvfsError> {
        self.artifacts.iter().rev().find_map(|a| a.outcome.as_ref().err())
    }

    pub fn published(&self) -> Vec<&Path> {
        self.artifacts
            .iter()
            .filter_map(|a| a.outcome.as_ref().ok().map(PathBuf::as_path))
            .collect()
    }
}

#[derive(Debug)]
struct LoadedTable {
    source: PathBuf,
    text: String,
    table: PartitionedTable,
}

/// 較正テーブルエディタ
pub struct CalibrationEditor<S: MessageSink> {
    registry: ProfileRegistry,
    sink: S,
    reference_frequency: String,
    loaded: Option<LoadedTable>,
    session: Option<EditSession>,
}

impl<S: MessageSink> CalibrationEditor<S> {
    pub fn new(registry: ProfileRegistry, sink: S) -> Self {
        Self {
            registry,
            sink,
            reference_frequency: DEFAULT_SECONDARY_REFERENCE_KHZ.to_string(),
            loaded: None,
            session: None,
        }
    }

    /// 設定ファイル形式を書き出す較正周波数 (kHz) を変える
    pub fn with_reference_frequency(mut self, khz: &str) -> Self {
        self.reference_frequency = khz.to_string();
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn post_error(&mut self, error: &DvfsError) {
        let message = match error {
            DvfsError::Edit(EditError::AxisNotPresent { .. }) => AXIS_NOT_PRESENT_MESSAGE.to_string(),
            DvfsError::Edit(EditError::OutOfBounds { field, bits, .. }) => {
                format!("ERROR: Out of bounds, {}-bit number for {}", bits, field)
            }
            other => format!("ERROR: {}", other),
        };
        self.sink.post(&message);
    }

    fn report<T>(&mut self, result: DvfsResult<T>) -> DvfsResult<T> {
        if let Err(e) = &result {
            self.post_error(e);
        }
        result
    }

    /// ファイルを読み込む。失敗した場合は現在の状態を変えない
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> DvfsResult<()> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(DvfsError::from);
        let text = self.report(text)?;
        self.load_from_str(path, &text)
    }

    /// テキストを読み込む。`source` は書き出し先の名前の元になる
    pub fn load_from_str<P: Into<PathBuf>>(&mut self, source: P, text: &str) -> DvfsResult<()> {
        let table = self.parse_and_partition(text);
        let table = self.report(table)?;

        let profile = table.profile;
        info!(
            "Loaded {} table with {} frequencies",
            profile,
            table.frequencies.len()
        );
        self.session = None;
        self.loaded = Some(LoadedTable {
            source: source.into(),
            text: text.to_string(),
            table,
        });
        self.sink.post(&format!("Parsed {} DVFS Table", profile));
        Ok(())
    }

    fn parse_and_partition(&self, text: &str) -> DvfsResult<PartitionedTable> {
        let parsed = TableParser::new(&self.registry).parse_str(text)?;
        let definition = self
            .registry
            .get(parsed.profile)
            .ok_or(DvfsError::UnsupportedProfile)?;
        FieldPartitioner::new(definition).partition(parsed)
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    pub fn table(&self) -> Option<&PartitionedTable> {
        self.loaded.as_ref().map(|l| &l.table)
    }

    pub fn source(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|l| l.source.as_path())
    }

    pub fn definition(&self) -> Option<&ProfileDefinition> {
        self.registry.get(self.table()?.profile)
    }

    /// 読み込んだ順の周波数
    pub fn frequencies(&self) -> &[String] {
        self.table().map(|t| t.frequencies.as_slice()).unwrap_or(&[])
    }

    pub fn axes(&self) -> Vec<&str> {
        self.definition()
            .map(|d| d.layout.axes.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn bus_widths(&self) -> Vec<&str> {
        self.definition()
            .map(|d| d.layout.bus_width_names())
            .unwrap_or_default()
    }

    pub fn flags(&self, frequency: &str) -> Option<&FrequencyFlags> {
        self.table()?.flags.get(frequency)
    }

    pub fn session(&self) -> Option<&EditSession> {
        self.session.as_ref()
    }

    /// (周波数, 軸, バス幅) を選択して編集セッションを開く
    ///
    /// 前のセッションの保留中の編集は捨てる
    pub fn select(&mut self, frequency: &str, axis: &str, bus_width: &str) -> DvfsResult<()> {
        let result = self.open_session(frequency, axis, bus_width);
        self.report(result)
    }

    fn open_session(&mut self, frequency: &str, axis: &str, bus_width: &str) -> DvfsResult<()> {
        let Self {
            registry,
            loaded,
            session,
            ..
        } = self;
        let loaded = loaded.as_mut().ok_or(EditError::NoTableLoaded)?;
        let definition = registry
            .get(loaded.table.profile)
            .ok_or(DvfsError::UnsupportedProfile)?;
        if !loaded.table.has_frequency(frequency) {
            return Err(EditError::UnknownFrequency(frequency.to_string()).into());
        }
        let channels = definition
            .layout
            .channels(bus_width)
            .ok_or_else(|| EditError::UnknownBusWidth(bus_width.to_string()))?
            .to_vec();
        let plan = SelectionPlan::resolve(&definition.layout, loaded.table.flags.get(frequency), axis)?;

        if let Some(previous) = session.take() {
            if let Some(tree) = loaded.table.tree_mut(previous.frequency()) {
                previous.clear(tree);
            }
        }
        let tree = loaded
            .table
            .tree_mut(frequency)
            .ok_or_else(|| EditError::UnknownFrequency(frequency.to_string()))?;
        *session = Some(EditSession::open(tree, frequency, plan, &channels)?);
        Ok(())
    }

    /// 選択中の軸のツリー（読み取り専用）
    pub fn view(&self) -> Option<&ChannelMap> {
        let session = self.session.as_ref()?;
        self.table()?.tree(session.frequency())?.axis(session.tree_axis())
    }

    /// 編集対象フィールドを表示順に並べる
    pub fn rows(&self) -> Vec<FieldRow> {
        let (Some(session), Some(table)) = (self.session.as_ref(), self.table()) else {
            return Vec::new();
        };
        let Some(tree) = table.tree(session.frequency()) else {
            return Vec::new();
        };
        session
            .fields()
            .iter()
            .filter_map(|key| {
                let value = tree.field(session.tree_axis(), &key.channel, &key.register, &key.field)?;
                Some(FieldRow {
                    key: key.clone(),
                    bits: value.bits,
                    value: value.decoded,
                    pending: value.display_total(),
                })
            })
            .collect()
    }

    fn active(&mut self) -> DvfsResult<(&EditSession, &mut PartitionedTable)> {
        let loaded = self.loaded.as_mut().ok_or(EditError::NoTableLoaded)?;
        let session = self.session.as_ref().ok_or(EditError::NoSelection)?;
        Ok((session, &mut loaded.table))
    }

    fn with_tree<T, F>(&mut self, action: F) -> DvfsResult<T>
    where
        F: FnOnce(&EditSession, &mut DisplayTree) -> DvfsResult<T>,
    {
        let result = self.active().and_then(|(session, table)| {
            let tree = table
                .tree_mut(session.frequency())
                .ok_or_else(|| EditError::UnknownFrequency(session.frequency().to_string()))?;
            action(session, tree)
        });
        self.report(result)
    }

    /// 1フィールドを増減する
    pub fn edit_field(&mut self, key: &FieldKey, delta: i64) -> DvfsResult<()> {
        self.with_tree(|session, tree| session.step_field(tree, key, delta))
    }

    /// 全対象を刻み幅だけ増やす
    pub fn increment(&mut self) -> DvfsResult<()> {
        self.with_tree(|session, tree| {
            session.increment(tree);
            Ok(())
        })
    }

    /// 全対象を刻み幅だけ減らす
    pub fn decrement(&mut self) -> DvfsResult<()> {
        self.with_tree(|session, tree| {
            session.decrement(tree);
            Ok(())
        })
    }

    fn first_violation(&self) -> Option<EditError> {
        let session = self.session.as_ref()?;
        let tree = self.table()?.tree(session.frequency())?;
        session.first_violation(tree)
    }

    /// 全対象が範囲内か。範囲外があればメッセージを出す
    pub fn can_apply(&mut self) -> bool {
        if self.session.is_none() {
            return false;
        }
        match self.first_violation() {
            Some(violation) => {
                self.post_error(&DvfsError::from(violation));
                false
            }
            None => true,
        }
    }

    /// 保留中の編集を確定し、新しい編集を付け直す
    ///
    /// Returns:
    ///     確定したフィールド数
    pub fn apply(&mut self) -> DvfsResult<usize> {
        if let Some(violation) = self.first_violation() {
            return self.report(Err(violation.into()));
        }
        self.with_tree(|session, tree| {
            let applied = session.apply(tree);
            session.reattach(tree);
            Ok(applied)
        })
    }

    /// 保留中の編集を捨て、新しい編集を付け直す
    pub fn clear(&mut self) -> DvfsResult<()> {
        self.with_tree(|session, tree| {
            session.clear(tree);
            session.reattach(tree);
            Ok(())
        })
    }

    /// 保留中の編集を（範囲内なら）確定してから外す
    fn settle_pending(&mut self) {
        if self.session.is_none() {
            return;
        }
        let apply = self.can_apply();
        let settled = self.with_tree(|session, tree| {
            if apply {
                session.apply(tree);
            }
            session.clear(tree);
            Ok(())
        });
        if let Err(e) = settled {
            debug!("Pending edits not settled: {}", e);
        }
    }

    fn reopen(&mut self) {
        let reopened = self.with_tree(|session, tree| {
            session.reattach(tree);
            Ok(())
        });
        if let Err(e) = reopened {
            debug!("Selection not reopened: {}", e);
        }
    }

    /// 読み込んだテーブルと、指定があれば derated テーブル・設定ファイルを書き出す
    ///
    /// 成果物ごとに結果を返し、1つの失敗は他の成果物に影響しない
    pub fn export(&mut self, request: &ExportRequest) -> DvfsResult<ExportReport> {
        let source = self.loaded.as_ref().map(|l| l.source.clone()).ok_or(EditError::NoTableLoaded);
        let source = self.report(source.map_err(DvfsError::from))?;
        let destination = output_path(
            &source,
            &request.suffix,
            request.output_dir.as_deref(),
            request.overwrite,
        )
        .map_err(DvfsError::from);
        let destination = self.report(destination)?;

        self.settle_pending();

        let mut report = ExportReport::default();
        report.artifacts.push(ArtifactReport {
            kind: ArtifactKind::Primary,
            source: source.clone(),
            outcome: self.export_primary(&destination),
        });
        if let Some(derated) = &request.derated {
            report.artifacts.push(ArtifactReport {
                kind: ArtifactKind::Derated,
                source: derated.clone(),
                outcome: self.export_derated(derated, request),
            });
        }
        if let Some(secondary) = &request.secondary {
            report.artifacts.push(ArtifactReport {
                kind: ArtifactKind::Secondary,
                source: secondary.clone(),
                outcome: self.export_secondary(secondary, request),
            });
        }

        for artifact in &report.artifacts {
            match &artifact.outcome {
                Ok(path) => info!("Exported {} to {}", artifact.kind, path.display()),
                Err(e) => warn!("Skipped {} {}: {}", artifact.kind, artifact.source.display(), e),
            }
        }
        match report.last_error().cloned() {
            None => self.sink.post(EXPORT_SUCCESS_MESSAGE),
            Some(e) => self.sink.post(&format!("ERROR: {}", e)),
        }

        self.reopen();
        Ok(report)
    }

    fn loaded_table(&self) -> DvfsResult<&LoadedTable> {
        Ok(self.loaded.as_ref().ok_or(EditError::NoTableLoaded)?)
    }

    fn export_primary(&self, destination: &Path) -> DvfsResult<PathBuf> {
        let loaded = self.loaded_table()?;
        let rewrite = rewrite_table(&loaded.text, &loaded.table)?;
        publish(destination, &rewrite.text)?;
        Ok(destination.to_path_buf())
    }

    fn export_derated(&self, derated: &Path, request: &ExportRequest) -> DvfsResult<PathBuf> {
        let loaded = self.loaded_table()?;
        let destination = output_path(derated, &request.suffix, request.output_dir.as_deref(), request.overwrite)?;
        let text = fs::read_to_string(derated)?;
        let rewrite = rewrite_table(&text, &loaded.table)?;
        publish(&destination, &rewrite.text)?;
        Ok(destination)
    }

    fn export_secondary(&self, secondary: &Path, request: &ExportRequest) -> DvfsResult<PathBuf> {
        let loaded = self.loaded_table()?;
        let destination =
            output_path(secondary, &request.suffix, request.output_dir.as_deref(), request.overwrite)?;
        let text = fs::read_to_string(secondary)?;
        let rewrite = rewrite_secondary(&text, &loaded.table, &self.reference_frequency).map_err(|e| {
            if let ExportError::FrequencyMismatch { .. } = e {
                warn!("Configuration file {} not updated", secondary.display());
            }
            e
        })?;
        publish(&destination, &rewrite.text)?;
        Ok(destination)
    }
}
