/// 軸対応表
/// テーブル上のレジスタ名パターンを、カタログ名・設定ファイル名・軸ラベルに対応付けるルール群と、
/// 軸ごとの表示レイアウト（フィールド選択、別名、バス幅、フラグビット）

use crate::dvfs_common_rs::register::core::exceptions::{CatalogError, DvfsError, DvfsResult};
use log::debug;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;

/// トレーニング用レジスタ群を指す軸ラベルの接尾辞
pub const TRAINING_SUFFIX: &str = " (training)";

/// チャンネル番号を取り出す名前付きグループ
pub const CHANNEL_GROUP: &str = "CH";

/// トレーニング軸のラベル
pub fn training_axis(axis: &str) -> String {
    format!("{}{}", axis, TRAINING_SUFFIX)
}

/// 1件のルール適用結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleMatch {
    /// カタログ上のレジスタ名
    pub catalog_name: String,
    /// 設定ファイル上の名前（存在しない場合は None）
    pub secondary_name: Option<String>,
    /// チャンネル（グループがなければ空文字列）
    pub channel: String,
}

/// 名前対応ルール
#[derive(Debug, Clone)]
pub struct AxisRule {
    pub pattern: String,
    regex: Regex,
    pub catalog_template: String,
    pub secondary_template: String,
    pub axis: String,
    pub twos_complement: bool,
}

impl AxisRule {
    /// ルールを作成する
    ///
    /// パターンは先頭一致で評価される。テンプレートは `${1}` / `${CH}` 形式の置換を使う
    pub fn new(
        pattern: &str,
        catalog_template: &str,
        secondary_template: &str,
        axis: &str,
        twos_complement: bool,
    ) -> Result<Self, CatalogError> {
        let regex = Regex::new(&format!("^(?:{})", pattern)).map_err(|e| CatalogError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
            catalog_template: catalog_template.to_string(),
            secondary_template: secondary_template.to_string(),
            axis: axis.to_string(),
            twos_complement,
        })
    }

    pub fn is_match(&self, register_name: &str) -> bool {
        self.regex.is_match(register_name)
    }

    /// レジスタ名にルールを適用する
    ///
    /// 一致した部分をテンプレートで置き換え、一致しなかった残りはそのまま後ろに付く
    pub fn apply(&self, register_name: &str) -> Option<RuleMatch> {
        let captures = self.regex.captures(register_name)?;
        let matched = captures.get(0)?;
        let remainder = &register_name[matched.end()..];

        let substitute = |template: &str| {
            let mut name = String::new();
            captures.expand(template, &mut name);
            name.push_str(remainder);
            name
        };

        let secondary_name = if self.secondary_template.is_empty() {
            None
        } else {
            Some(substitute(&self.secondary_template))
        };
        let channel = captures
            .name(CHANNEL_GROUP)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();

        Some(RuleMatch {
            catalog_name: substitute(&self.catalog_template),
            secondary_name,
            channel,
        })
    }
}

/// 順序付きのルール表
#[derive(Debug, Clone, Default)]
pub struct AxisMappingTable {
    rules: Vec<AxisRule>,
}

impl AxisMappingTable {
    pub fn new(rules: Vec<AxisRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[AxisRule] {
        &self.rules
    }

    /// レジスタ名に一致する全ルール
    pub fn matching<'a>(&'a self, register_name: &'a str) -> impl Iterator<Item = &'a AxisRule> + 'a {
        self.rules.iter().filter(move |rule| rule.is_match(register_name))
    }

    /// 表に現れる軸ラベル（重複なし・出現順）
    pub fn axis_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if !labels.contains(&rule.axis.as_str()) {
                labels.push(&rule.axis);
            }
        }
        labels
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// 編集対象フィールドの選択
///
/// 名前順に並べたフィールド列の位置 `i` について `i % period` が `indices` に含まれるものを選ぶ
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldSelection {
    pub indices: Vec<usize>,
    pub period: usize,
}

impl FieldSelection {
    /// 全フィールドを選ぶ
    pub fn all() -> Self {
        Self {
            indices: vec![0],
            period: 1,
        }
    }

    pub fn selects(&self, index: usize) -> bool {
        self.period == 0 || self.indices.contains(&(index % self.period))
    }
}

impl Default for FieldSelection {
    fn default() -> Self {
        Self::all()
    }
}

/// 別名軸（表示上の軸を別のツリー軸と選択に読み替える）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisAlias {
    pub target: String,
    pub selection: FieldSelection,
}

/// パックされたフラグレジスタのビット配置
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FlagBits {
    pub register: String,
    pub bits: BTreeMap<String, u32>,
}

/// 軸の表示レイアウト
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplayLayout {
    pub axes: Vec<String>,
    pub sign_magnitude_axes: Vec<String>,
    pub bus_widths: BTreeMap<String, Vec<String>>,
    pub field_selection: BTreeMap<String, FieldSelection>,
    pub aliases: BTreeMap<String, AxisAlias>,
    pub training: FlagBits,
    pub bypass: FlagBits,
}

impl DisplayLayout {
    pub fn has_axis(&self, axis: &str) -> bool {
        self.axes.iter().any(|a| a == axis)
    }

    pub fn selection_for(&self, axis: &str) -> FieldSelection {
        self.field_selection.get(axis).cloned().unwrap_or_default()
    }

    pub fn alias(&self, axis: &str) -> Option<&AxisAlias> {
        self.aliases.get(axis)
    }

    pub fn is_sign_magnitude(&self, tree_axis: &str) -> bool {
        self.sign_magnitude_axes.iter().any(|a| a == tree_axis)
    }

    /// バス幅に対して表示するチャンネル
    pub fn channels(&self, bus_width: &str) -> Option<&[String]> {
        self.bus_widths.get(bus_width).map(Vec::as_slice)
    }

    pub fn bus_width_names(&self) -> Vec<&str> {
        self.bus_widths.keys().map(String::as_str).collect()
    }
}

// TOML上の表現
#[derive(Debug, Deserialize)]
struct RuleSpec {
    pattern: String,
    catalog: String,
    #[serde(default)]
    secondary: String,
    axis: String,
    #[serde(default)]
    twos_complement: bool,
}

#[derive(Debug, Deserialize)]
struct SelectionSpec {
    axis: String,
    indices: Vec<usize>,
    period: usize,
}

#[derive(Debug, Deserialize)]
struct AliasSpec {
    axis: String,
    target: String,
    indices: Vec<usize>,
    period: usize,
}

#[derive(Debug, Deserialize)]
struct AxisSpec {
    axes: Vec<String>,
    #[serde(default)]
    sign_magnitude_axes: Vec<String>,
    #[serde(default)]
    bus_widths: BTreeMap<String, Vec<String>>,
    training: FlagBits,
    bypass: FlagBits,
    #[serde(default)]
    field_selection: Vec<SelectionSpec>,
    #[serde(default)]
    alias: Vec<AliasSpec>,
    #[serde(default)]
    rule: Vec<RuleSpec>,
}

/// TOML文字列から軸対応表と表示レイアウトを読み込む
pub fn load_axis_spec(text: &str) -> DvfsResult<(AxisMappingTable, DisplayLayout)> {
    let spec: AxisSpec =
        toml::from_str(text).map_err(|e| DvfsError::Config(format!("軸定義: {}", e)))?;

    let rules = spec
        .rule
        .iter()
        .map(|r| AxisRule::new(&r.pattern, &r.catalog, &r.secondary, &r.axis, r.twos_complement))
        .collect::<Result<Vec<_>, _>>()?;

    let layout = DisplayLayout {
        axes: spec.axes,
        sign_magnitude_axes: spec.sign_magnitude_axes,
        bus_widths: spec.bus_widths,
        field_selection: spec
            .field_selection
            .into_iter()
            .map(|s| {
                (
                    s.axis,
                    FieldSelection {
                        indices: s.indices,
                        period: s.period,
                    },
                )
            })
            .collect(),
        aliases: spec
            .alias
            .into_iter()
            .map(|a| {
                (
                    a.axis,
                    AxisAlias {
                        target: a.target,
                        selection: FieldSelection {
                            indices: a.indices,
                            period: a.period,
                        },
                    },
                )
            })
            .collect(),
        training: spec.training,
        bypass: spec.bypass,
    };

    debug!(
        "Loaded axis spec: {} rules, {} axes",
        rules.len(),
        layout.axes.len()
    );
    Ok((AxisMappingTable::new(rules), layout))
}
