/// DVFS テーブル形式の書き出し
/// 元のテーブル（または derated テーブル）を1行ずつ流し直し、
/// 表示ツリーにあるレジスタの値だけを再構成した値に置き換える

use crate::dvfs_common_rs::export::reassemble::reencode_register;
use crate::dvfs_common_rs::register::core::bit_utils::{format_hex_literal, parse_hex_literal};
use crate::dvfs_common_rs::register::core::exceptions::ExportError;
use crate::dvfs_common_rs::table::parser::{split_data_line, FREQUENCY_KEY, RECORD_TERMINATOR};
use crate::dvfs_common_rs::table::partition::{DisplayTree, PartitionedTable, RegisterMasks};
use log::{debug, warn};

/// 書き換え結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRewrite {
    pub text: String,
    /// 値を置き換えた行数
    pub rewritten_lines: usize,
    /// 書き換えたレコードの周波数（出現順）
    pub frequencies: Vec<String>,
}

fn record_frequency(lines: &[&str]) -> Option<String> {
    lines
        .iter()
        .filter_map(|line| split_data_line(line))
        .find(|data| data.name == FREQUENCY_KEY)
        .map(|data| data.value.to_string())
}

/// 1行を書き換えて出力に追加する。値を置き換えた場合 true
fn rewrite_line(line: &str, tree: &DisplayTree, masks: &RegisterMasks, output: &mut String) -> bool {
    let Some(data) = split_data_line(line) else {
        output.push_str(line);
        return false;
    };
    if !tree.contains_register(&data.name) {
        output.push_str(line);
        return false;
    }
    let Some(original) = parse_hex_literal(data.value) else {
        warn!("{}: value {} is not hex, left unchanged", data.name, data.value);
        output.push_str(line);
        return false;
    };
    let Some(value) = reencode_register(tree, masks, &data.name, original) else {
        output.push_str(line);
        return false;
    };

    output.push_str(&line[..data.value_span.start]);
    output.push_str(&format_hex_literal(value));
    output.push_str(&line[data.value_span.end..]);
    true
}

/// テーブル形式のテキストを書き換える
///
/// 終端レジスタまでを1レコードとしてまとめ、そのレコード内の周波数キーで表示ツリーを選ぶ。
/// 最後の終端より後ろの行と、ツリーにないレジスタの行はそのまま出力する
///
/// Args:
///     text: 元のテキスト
///     table: 編集中の分割済みテーブル
///
/// Returns:
///     レコードの周波数がテーブルにない場合は FrequencyNotInTable
pub fn rewrite_table(text: &str, table: &PartitionedTable) -> Result<TableRewrite, ExportError> {
    let mut output = String::with_capacity(text.len());
    let mut record: Vec<&str> = Vec::new();
    let mut rewritten_lines = 0;
    let mut frequencies = Vec::new();

    for line in text.split_inclusive('\n') {
        record.push(line);
        let is_terminator = split_data_line(line)
            .map(|data| data.name == RECORD_TERMINATOR)
            .unwrap_or(false);
        if !is_terminator {
            continue;
        }

        let Some(frequency) = record_frequency(&record) else {
            warn!("Record without {} passed through unchanged", FREQUENCY_KEY);
            output.extend(record.drain(..));
            continue;
        };
        let tree = table
            .tree(&frequency)
            .ok_or_else(|| ExportError::FrequencyNotInTable(frequency.clone()))?;
        for line in record.drain(..) {
            if rewrite_line(line, tree, &table.masks, &mut output) {
                rewritten_lines += 1;
            }
        }
        debug!("Rewrote record {} kHz", frequency);
        frequencies.push(frequency);
    }
    output.extend(record.drain(..));

    Ok(TableRewrite {
        text: output,
        rewritten_lines,
        frequencies,
    })
}
