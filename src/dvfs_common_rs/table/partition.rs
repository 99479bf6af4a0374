/// フィールド分割
/// 軸対応表とカタログを使って周波数レコードを
/// 軸 → チャンネル → レジスタ → フィールド の表示ツリーに展開する

use crate::dvfs_common_rs::edit::pending::PendingEdit;
use crate::dvfs_common_rs::register::axis_table::AxisRule;
use crate::dvfs_common_rs::register::catalog::Bank;
use crate::dvfs_common_rs::register::core::bit_utils::{decode_field, parse_hex_literal};
use crate::dvfs_common_rs::register::core::exceptions::{CatalogError, DvfsResult, ParseError};
use crate::dvfs_common_rs::register::profile::{Profile, ProfileDefinition};
use crate::dvfs_common_rs::table::parser::{FrequencyFlags, FrequencyRecord, ParsedTable};
use log::{debug, info};
use std::collections::BTreeMap;

/// 1フィールドの値と、編集中であれば保留中の編集
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldValue {
    /// フィールドのビット列（符号なしとして保持）
    pub decoded: u32,
    pub bits: u32,
    pub twos_complement: bool,
    pub lsb: u32,
    pub edit: Option<PendingEdit>,
}

impl FieldValue {
    pub fn new(decoded: u32, bits: u32, twos_complement: bool, lsb: u32) -> Self {
        Self {
            decoded,
            bits,
            twos_complement,
            lsb,
            edit: None,
        }
    }

    /// 符号表現を考慮した数値
    pub fn signed_value(&self) -> i64 {
        decode_field(self.decoded, self.bits, self.twos_complement)
    }

    pub fn is_editing(&self) -> bool {
        self.edit.is_some()
    }
}

/// フィールド名 → 値
pub type FieldMap = BTreeMap<String, FieldValue>;
/// レジスタ名 → フィールド
pub type RegisterMap = BTreeMap<String, FieldMap>;
/// チャンネル → レジスタ
pub type ChannelMap = BTreeMap<String, RegisterMap>;

/// ツリー内のレジスタ位置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterLocation {
    pub axis: String,
    pub channel: String,
    pub register: String,
}

/// 1周波数分の表示ツリー
#[derive(Debug, Clone, Default)]
pub struct DisplayTree {
    axes: BTreeMap<String, ChannelMap>,
    locations: BTreeMap<String, RegisterLocation>,
}

impl DisplayTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn axis(&self, axis: &str) -> Option<&ChannelMap> {
        self.axes.get(axis)
    }

    pub fn axis_mut(&mut self, axis: &str) -> Option<&mut ChannelMap> {
        self.axes.get_mut(axis)
    }

    pub fn has_axis(&self, axis: &str) -> bool {
        self.axes.contains_key(axis)
    }

    pub fn axis_names(&self) -> Vec<&str> {
        self.axes.keys().map(String::as_str).collect()
    }

    /// レジスタのフィールドを（なければ作って）返す
    pub fn register_entry(&mut self, axis: &str, channel: &str, register: &str) -> &mut FieldMap {
        self.locations
            .entry(register.to_string())
            .or_insert_with(|| RegisterLocation {
                axis: axis.to_string(),
                channel: channel.to_string(),
                register: register.to_string(),
            });
        self.axes
            .entry(axis.to_string())
            .or_default()
            .entry(channel.to_string())
            .or_default()
            .entry(register.to_string())
            .or_default()
    }

    /// テーブル上のレジスタ名が置かれている位置
    pub fn locate(&self, register: &str) -> Option<&RegisterLocation> {
        self.locations.get(register)
    }

    pub fn contains_register(&self, register: &str) -> bool {
        self.locations.contains_key(register)
    }

    /// テーブル上のレジスタ名からフィールドを引く
    pub fn register(&self, register: &str) -> Option<&FieldMap> {
        let location = self.locate(register)?;
        self.fields_at(location)
    }

    pub fn fields_at(&self, location: &RegisterLocation) -> Option<&FieldMap> {
        self.axes
            .get(&location.axis)?
            .get(&location.channel)?
            .get(&location.register)
    }

    pub fn field(&self, axis: &str, channel: &str, register: &str, field: &str) -> Option<&FieldValue> {
        self.axes.get(axis)?.get(channel)?.get(register)?.get(field)
    }

    pub fn field_mut(&mut self, axis: &str, channel: &str, register: &str, field: &str) -> Option<&mut FieldValue> {
        self.axes
            .get_mut(axis)?
            .get_mut(channel)?
            .get_mut(register)?
            .get_mut(field)
    }

    /// 全フィールド（軸・チャンネル・レジスタ・フィールド順）
    pub fn fields_mut(&mut self) -> impl Iterator<Item = &mut FieldValue> {
        self.axes
            .values_mut()
            .flat_map(|channels| channels.values_mut())
            .flat_map(|registers| registers.values_mut())
            .flat_map(|fields| fields.values_mut())
    }

    pub fn register_count(&self) -> usize {
        self.locations.len()
    }
}

/// レジスタ名 → 保護マスク（初回登録時のみ記録）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterMasks {
    masks: BTreeMap<String, u32>,
}

impl RegisterMasks {
    /// 未登録の場合だけマスクを記録する。記録した場合 true
    pub fn record_once(&mut self, register: &str, protect_mask: u32) -> bool {
        if self.masks.contains_key(register) {
            return false;
        }
        self.masks.insert(register.to_string(), protect_mask);
        true
    }

    pub fn get(&self, register: &str) -> Option<u32> {
        self.masks.get(register).copied()
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

/// 設定ファイル上の名前 → ツリー内の位置
#[derive(Debug, Clone, Default)]
pub struct SecondaryIndex {
    entries: BTreeMap<String, RegisterLocation>,
}

impl SecondaryIndex {
    /// 後から登録したものが優先される
    pub fn insert(&mut self, secondary_name: String, location: RegisterLocation) {
        if let Some(previous) = self.entries.get(&secondary_name) {
            if previous != &location {
                debug!(
                    "Secondary name {} remapped: {} -> {}",
                    secondary_name, previous.register, location.register
                );
            }
        }
        self.entries.insert(secondary_name, location);
    }

    pub fn get(&self, secondary_name: &str) -> Option<&RegisterLocation> {
        self.entries.get(secondary_name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 分割済みテーブル
#[derive(Debug, Clone)]
pub struct PartitionedTable {
    pub profile: Profile,
    pub frequencies: Vec<String>,
    pub trees: BTreeMap<String, DisplayTree>,
    pub masks: RegisterMasks,
    pub secondary_index: SecondaryIndex,
    pub flags: BTreeMap<String, FrequencyFlags>,
}

impl PartitionedTable {
    pub fn tree(&self, frequency: &str) -> Option<&DisplayTree> {
        self.trees.get(frequency)
    }

    pub fn tree_mut(&mut self, frequency: &str) -> Option<&mut DisplayTree> {
        self.trees.get_mut(frequency)
    }

    pub fn has_frequency(&self, frequency: &str) -> bool {
        self.trees.contains_key(frequency)
    }
}

/// フィールド分割器
pub struct FieldPartitioner<'p> {
    definition: &'p ProfileDefinition,
}

impl<'p> FieldPartitioner<'p> {
    pub fn new(definition: &'p ProfileDefinition) -> Self {
        Self { definition }
    }

    /// 解析済みテーブル全体を分割する
    pub fn partition(&self, parsed: ParsedTable) -> DvfsResult<PartitionedTable> {
        let mut masks = RegisterMasks::default();
        let mut secondary_index = SecondaryIndex::default();
        let mut trees = BTreeMap::new();

        for frequency in &parsed.frequencies {
            let Some(record) = parsed.records.get(frequency) else {
                continue;
            };
            let mut tree = DisplayTree::new();
            self.partition_record(record, &mut tree, &mut masks, &mut secondary_index)?;
            debug!(
                "Partitioned {} kHz: {} registers in {} axes",
                frequency,
                tree.register_count(),
                tree.axis_names().len()
            );
            trees.insert(frequency.clone(), tree);
        }

        info!(
            "Partitioned {} frequencies, {} protect masks",
            trees.len(),
            masks.len()
        );
        Ok(PartitionedTable {
            profile: parsed.profile,
            frequencies: parsed.frequencies,
            trees,
            masks,
            secondary_index,
            flags: parsed.flags,
        })
    }

    /// 1周波数分のレコードを表示ツリーに展開する
    ///
    /// 1つのレジスタに複数のルールが一致した場合は設定の誤りとして扱う
    pub fn partition_record(
        &self,
        record: &FrequencyRecord,
        tree: &mut DisplayTree,
        masks: &mut RegisterMasks,
        secondary_index: &mut SecondaryIndex,
    ) -> DvfsResult<()> {
        for (register, value) in record {
            let mut rules = self.definition.axis_table.matching(register);
            let Some(rule) = rules.next() else {
                continue;
            };
            if let Some(other) = rules.next() {
                return Err(CatalogError::AmbiguousRule {
                    register: register.clone(),
                    first: rule.pattern.clone(),
                    second: other.pattern.clone(),
                }
                .into());
            }
            self.partition_register(rule, register, value, tree, masks, secondary_index)?;
        }
        Ok(())
    }

    fn partition_register(
        &self,
        rule: &AxisRule,
        register: &str,
        value: &str,
        tree: &mut DisplayTree,
        masks: &mut RegisterMasks,
        secondary_index: &mut SecondaryIndex,
    ) -> DvfsResult<()> {
        let Some(matched) = rule.apply(register) else {
            return Ok(());
        };
        let definition = self
            .definition
            .catalog
            .lookup(Bank::for_register(register), &matched.catalog_name)?;
        let raw = parse_hex_literal(value).ok_or_else(|| ParseError::InvalidHexValue {
            register: register.to_string(),
            value: value.to_string(),
        })?;

        if masks.record_once(register, definition.protect_mask()) {
            debug!(
                "{} -> {} [{}] protect=0x{:08x}",
                register,
                matched.catalog_name,
                rule.axis,
                definition.protect_mask()
            );
        }

        let fields = tree.register_entry(&rule.axis, &matched.channel, register);
        for field in &definition.fields {
            fields.insert(
                field.name.clone(),
                FieldValue::new(field.decode(raw), field.size(), rule.twos_complement, field.lsb),
            );
        }

        if let Some(secondary_name) = matched.secondary_name {
            secondary_index.insert(
                secondary_name,
                RegisterLocation {
                    axis: rule.axis.clone(),
                    channel: matched.channel,
                    register: register.to_string(),
                },
            );
        }
        Ok(())
    }
}
