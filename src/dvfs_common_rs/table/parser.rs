/// DVFS テーブル解析
/// 行単位のテキストを周波数ごとのレコード (レジスタ名 → 16進値) に分け、
/// プロファイルを判定し、周波数ごとのフラグ（トレーニング要否・バイパス）を取り出す

use crate::dvfs_common_rs::register::axis_table::FlagBits;
use crate::dvfs_common_rs::register::core::bit_utils::{bit_is_set, parse_hex_literal};
use crate::dvfs_common_rs::register::core::exceptions::{DvfsResult, ParseError};
use crate::dvfs_common_rs::register::profile::{Profile, ProfileRegistry};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::Path;

/// レコードの周波数 (kHz) を持つ項目名
pub const FREQUENCY_KEY: &str = "SDRAM frequency khz";

/// 各周波数レコードの終端を示すレジスタ名
pub const RECORD_TERMINATOR: &str = "PLLHUB_ENABLE_FREQ_CHANGE";

/// レジスタ名から除去する装飾文字
const NAME_DECORATION: &[char] = &['/', '*', ' ', '\t', '\r', '\n'];

/// 1周波数分のレコード
pub type FrequencyRecord = BTreeMap<String, String>;

/// `<16進値>,<レジスタ名>[装飾]` 形式のデータ行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLine<'a> {
    /// 前後の空白を除いた値の文字列
    pub value: &'a str,
    /// 行内での値の位置（書き出し時の置換範囲）
    pub value_span: Range<usize>,
    /// 装飾と付記を除いたレジスタ名
    pub name: String,
}

/// 装飾を除いた名前から `-` / `;` 以降の付記を落とす
pub fn canonical_register_name(name: &str) -> &str {
    let name = name.split('-').next().unwrap_or(name);
    let name = name.split(';').next().unwrap_or(name);
    name.trim_end_matches(|c| c == ';' || c == ' ')
}

/// データ行を値とレジスタ名に分ける
///
/// Args:
///     line: 入力の1行
///
/// Returns:
///     データ行でない（カンマがない・名前が空）場合は None
pub fn split_data_line(line: &str) -> Option<DataLine<'_>> {
    let comma = line.find(',')?;
    let value_part = &line[..comma];
    let name_part = line[comma + 1..].split(',').next().unwrap_or("");
    if name_part.trim().is_empty() {
        return None;
    }

    let name = canonical_register_name(name_part.trim_matches(NAME_DECORATION));
    if name.is_empty() {
        return None;
    }

    let leading = value_part.len() - value_part.trim_start().len();
    let value = value_part.trim();
    Some(DataLine {
        value,
        value_span: leading..leading + value.len(),
        name: name.to_string(),
    })
}

/// テキストを周波数レコードに分ける
///
/// 終端レジスタが現れるまでの行を1レコードにまとめ、そのレコードの周波数キーで登録する
///
/// Returns:
///     (出現順の周波数一覧, 周波数 → レコード)
pub fn split_records(text: &str) -> Result<(Vec<String>, BTreeMap<String, FrequencyRecord>), ParseError> {
    let mut frequencies: Vec<String> = Vec::new();
    let mut records: BTreeMap<String, FrequencyRecord> = BTreeMap::new();
    let mut working = FrequencyRecord::new();

    for line in text.lines() {
        let Some(data) = split_data_line(line) else {
            continue;
        };
        let is_terminator = data.name == RECORD_TERMINATOR;
        working.insert(data.name, data.value.to_string());
        if !is_terminator {
            continue;
        }

        let frequency = working
            .get(FREQUENCY_KEY)
            .cloned()
            .ok_or(ParseError::MissingFrequencyKey {
                register_count: working.len(),
            })?;
        debug!("Frequency record {} kHz: {} registers", frequency, working.len());
        if records.contains_key(&frequency) {
            warn!("Duplicate frequency record {} kHz, keeping the later one", frequency);
        } else {
            frequencies.push(frequency.clone());
        }
        records.insert(frequency, std::mem::take(&mut working));
    }

    if !working.is_empty() {
        warn!(
            "Dropping {} lines after the last {} record terminator",
            working.len(),
            RECORD_TERMINATOR
        );
    }
    if frequencies.is_empty() {
        return Err(ParseError::NoFrequencyRecord);
    }
    Ok((frequencies, records))
}

/// 周波数ごとのフラグ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrequencyFlags {
    /// 軸 → トレーニング用レジスタ群を使うか
    pub training: BTreeMap<String, bool>,
    /// 軸 → 刻み幅を8倍にするか
    pub bypass: BTreeMap<String, bool>,
}

impl FrequencyFlags {
    pub fn needs_training(&self, axis: &str) -> bool {
        self.training.get(axis).copied().unwrap_or(false)
    }

    pub fn is_bypassed(&self, axis: &str) -> bool {
        self.bypass.get(axis).copied().unwrap_or(false)
    }
}

fn decode_flag_register(
    record: &FrequencyRecord,
    frequency: &str,
    flags: &FlagBits,
) -> Result<BTreeMap<String, bool>, ParseError> {
    let raw = record
        .get(&flags.register)
        .ok_or_else(|| ParseError::MissingFlagRegister {
            frequency: frequency.to_string(),
            register: flags.register.clone(),
        })?;
    let value = parse_hex_literal(raw).ok_or_else(|| ParseError::InvalidHexValue {
        register: flags.register.clone(),
        value: raw.clone(),
    })?;
    Ok(flags
        .bits
        .iter()
        .map(|(axis, bit)| (axis.clone(), bit_is_set(value, *bit)))
        .collect())
}

/// レコードからトレーニング・バイパスのフラグを取り出す
pub fn decode_flags(
    record: &FrequencyRecord,
    frequency: &str,
    training: &FlagBits,
    bypass: &FlagBits,
) -> Result<FrequencyFlags, ParseError> {
    Ok(FrequencyFlags {
        training: decode_flag_register(record, frequency, training)?,
        bypass: decode_flag_register(record, frequency, bypass)?,
    })
}

/// 解析済みテーブル
#[derive(Debug, Clone)]
pub struct ParsedTable {
    pub profile: Profile,
    /// 出現順の周波数
    pub frequencies: Vec<String>,
    pub records: BTreeMap<String, FrequencyRecord>,
    pub flags: BTreeMap<String, FrequencyFlags>,
}

/// テーブルパーサー
pub struct TableParser<'r> {
    registry: &'r ProfileRegistry,
}

impl<'r> TableParser<'r> {
    pub fn new(registry: &'r ProfileRegistry) -> Self {
        Self { registry }
    }

    /// テキストを解析する
    pub fn parse_str(&self, text: &str) -> DvfsResult<ParsedTable> {
        let (frequencies, records) = split_records(text)?;

        let first = records
            .get(&frequencies[0])
            .ok_or(ParseError::NoFrequencyRecord)?;
        let definition = self.registry.detect(|name| first.contains_key(name))?;
        info!("Parsed {} DVFS table: {} frequencies", definition.profile, frequencies.len());

        let mut flags = BTreeMap::new();
        for (frequency, record) in &records {
            let decoded = decode_flags(
                record,
                frequency,
                &definition.layout.training,
                &definition.layout.bypass,
            )?;
            flags.insert(frequency.clone(), decoded);
        }

        Ok(ParsedTable {
            profile: definition.profile,
            frequencies,
            records,
            flags,
        })
    }

    /// ファイルを読み込んで解析する
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> DvfsResult<ParsedTable> {
        let text = fs::read_to_string(path.as_ref())?;
        debug!("Read {} bytes from {}", text.len(), path.as_ref().display());
        self.parse_str(&text)
    }
}
