/// 設定ファイル形式 (.cfg) の書き出し
/// ヘッダの較正周波数が基準周波数と一致する場合だけ、
/// 逆引き表で見つかる行の値を再構成した値に置き換える

use crate::dvfs_common_rs::export::reassemble::reencode;
use crate::dvfs_common_rs::register::core::bit_utils::{extract_bits, format_hex_literal, parse_hex_literal};
use crate::dvfs_common_rs::register::core::exceptions::ExportError;
use crate::dvfs_common_rs::table::partition::{DisplayTree, FieldMap, PartitionedTable};
use log::{debug, warn};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static HEADER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^# Parameter file: .+\(([\d,.]+) MHz\)").expect("header pattern"));

static SDRAM_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^SDRAM\[\d+\]\.(?P<name>[^\s=]+)\s*=\s*(?P<value>[^\s;]+)\s*;").expect("SDRAM line pattern")
});

static COMMENTED_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#@\s*(?P<name>[^\s{=]+)\s*\{[^}]*\}\s*=\s*(?P<value>[^\s;]+)\s*;").expect("commented line pattern")
});

/// MRW 書き込みで対象を区別できないレジスタ名の接頭辞
pub const MRW_PREFIXES: &[&str] = &["EmcMrw", "EmcWarmBootMrwExtra", "EMC_MRW"];

/// MRW 行の保護マスク（デバイス選択とアドレスを残す）
pub const MRW_PROTECT_MASK: u32 = 0xffff_0000;

/// 値のビット 23:16 (モードレジスタアドレス) で決まる書き換え先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MrwTarget {
    pub address: u32,
    pub axis: &'static str,
    pub register: &'static str,
}

pub const MRW_TARGETS: &[MrwTarget] = &[
    MrwTarget {
        address: 0x0e,
        axis: "DQVREF",
        register: "EMC_MRW15_0",
    },
    MrwTarget {
        address: 0x0c,
        axis: "CMDVREF",
        register: "R0_DRAM_MR12",
    },
];

/// 書き換え結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecondaryRewrite {
    pub text: String,
    pub rewritten_lines: usize,
    /// ヘッダの較正周波数 (kHz)
    pub frequency: String,
}

/// MHz 表記を kHz の整数文字列に変換する（小数第3位まで、以降は切り捨て）
///
/// "665.6" → "665600", "1,600" → "1600000"
pub fn mhz_to_khz(mhz: &str) -> Option<String> {
    let digits: String = mhz.chars().filter(|c| *c != ',').collect();
    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits.as_str(), ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let whole: u64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut thousandths: String = fraction.chars().take(3).collect();
    while thousandths.len() < 3 {
        thousandths.push('0');
    }
    let thousandths: u64 = thousandths.parse().ok()?;
    Some((whole.checked_mul(1000)? + thousandths).to_string())
}

/// 先頭の "# " 行の並びからヘッダの較正周波数 (kHz) を探す
pub fn header_frequency(text: &str) -> Option<String> {
    text.lines()
        .take_while(|line| line.starts_with("# "))
        .find_map(|line| HEADER_PATTERN.captures(line))
        .and_then(|caps| mhz_to_khz(&caps[1]))
}

fn data_captures(line: &str) -> Option<Captures<'_>> {
    SDRAM_LINE.captures(line).or_else(|| COMMENTED_LINE.captures(line))
}

fn mrw_target<'t>(tree: &'t DisplayTree, name: &str, raw: u32) -> Option<&'t FieldMap> {
    if !MRW_PREFIXES.iter().any(|prefix| name.starts_with(prefix)) {
        return None;
    }
    let address = extract_bits(raw, 16, 8);
    let target = MRW_TARGETS.iter().find(|t| t.address == address)?;
    tree.axis(target.axis)?.get("")?.get(target.register)
}

/// 行のレジスタ名と値から、再構成に使うフィールドと保護マスクを決める
fn resolve<'t>(
    tree: &'t DisplayTree,
    table: &PartitionedTable,
    name: &str,
    raw: u32,
) -> Option<(&'t FieldMap, u32)> {
    if let Some(fields) = mrw_target(tree, name, raw) {
        return Some((fields, MRW_PROTECT_MASK));
    }
    let location = table.secondary_index.get(name)?;
    let fields = tree.fields_at(location)?;
    let protect_mask = table.masks.get(&location.register)?;
    Some((fields, protect_mask))
}

/// 設定ファイル形式のテキストを書き換える
///
/// Args:
///     text: 元のテキスト
///     table: 編集中の分割済みテーブル
///     reference_frequency: 書き換えを許す較正周波数 (kHz)
///
/// Returns:
///     ヘッダがなければ MissingSecondaryHeader、周波数が違えば FrequencyMismatch、
///     基準周波数がテーブルになければ FrequencyNotInTable
pub fn rewrite_secondary(
    text: &str,
    table: &PartitionedTable,
    reference_frequency: &str,
) -> Result<SecondaryRewrite, ExportError> {
    let frequency = header_frequency(text).ok_or(ExportError::MissingSecondaryHeader)?;
    if frequency != reference_frequency {
        return Err(ExportError::FrequencyMismatch {
            expected: reference_frequency.to_string(),
            found: frequency,
        });
    }
    let tree = table
        .tree(reference_frequency)
        .ok_or_else(|| ExportError::FrequencyNotInTable(reference_frequency.to_string()))?;

    let mut output = String::with_capacity(text.len());
    let mut rewritten_lines = 0;
    for line in text.split_inclusive('\n') {
        let Some(caps) = data_captures(line) else {
            output.push_str(line);
            continue;
        };
        let (Some(name), Some(value)) = (caps.name("name"), caps.name("value")) else {
            output.push_str(line);
            continue;
        };
        let Some(raw) = parse_hex_literal(value.as_str()) else {
            output.push_str(line);
            continue;
        };
        let Some((fields, protect_mask)) = resolve(tree, table, name.as_str(), raw) else {
            output.push_str(line);
            continue;
        };

        let updated = reencode(raw, fields.values(), protect_mask);
        output.push_str(&line[..value.start()]);
        output.push_str(&format_hex_literal(updated));
        output.push_str(&line[value.end()..]);
        rewritten_lines += 1;
        if updated != raw {
            debug!("{}: {:#010x} -> {:#010x}", name.as_str(), raw, updated);
        }
    }

    if rewritten_lines == 0 {
        warn!("No configuration lines matched the loaded table");
    }
    Ok(SecondaryRewrite {
        text: output,
        rewritten_lines,
        frequency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dvfs_common_rs::register::profile::Profile;
    use crate::dvfs_common_rs::table::parser::FrequencyFlags;
    use crate::dvfs_common_rs::table::partition::{FieldValue, RegisterLocation, RegisterMasks, SecondaryIndex};
    use std::collections::BTreeMap;

    fn table() -> PartitionedTable {
        let mut tree = DisplayTree::new();
        tree.register_entry("DQVREF", "", "EMC_MRW15_0")
            .insert("MRW15_OP".to_string(), FieldValue::new(0x25, 8, false, 0));
        tree.register_entry("CMDVREF", "", "R0_DRAM_MR12")
            .insert("CMDVREF_MR12".to_string(), FieldValue::new(0x33, 8, false, 0));
        tree.register_entry("PutermExtra", "", "EMC_PUTERM_EXTRA_0")
            .insert("PUTERM_EXTRA".to_string(), FieldValue::new(0x11, 22, false, 0));

        let mut masks = RegisterMasks::default();
        masks.record_once("EMC_MRW15_0", 0xffff_ff00);
        masks.record_once("R0_DRAM_MR12", 0xffff_ff00);
        masks.record_once("EMC_PUTERM_EXTRA_0", 0xffc0_0000);

        let mut index = SecondaryIndex::default();
        index.insert(
            "EmcPutermExtra".to_string(),
            RegisterLocation {
                axis: "PutermExtra".to_string(),
                channel: String::new(),
                register: "EMC_PUTERM_EXTRA_0".to_string(),
            },
        );

        let mut trees = BTreeMap::new();
        trees.insert("665600".to_string(), tree);
        let mut flags = BTreeMap::new();
        flags.insert("665600".to_string(), FrequencyFlags::default());
        PartitionedTable {
            profile: Profile::T234,
            frequencies: vec!["665600".to_string()],
            trees,
            masks,
            secondary_index: index,
            flags,
        }
    }

    const CFG: &str = "\
# Orin SDRAM configuration
# Parameter file: orin-lpddr5.par (665.6 MHz)
SDRAM[0].EmcPutermExtra = 0x00000010;
SDRAM[0].EmcMrw15 = 0x880e0012;
SDRAM[0].EmcWarmBootMrwExtra = 0x080c0010;
SDRAM[0].EmcMrw2 = 0x08020044;
#@ EMC_MRW15_0{ch=1} = 0x480e0000;
SDRAM[0].EmcUnrelated = 0x00000001;
SDRAM[0].EmcName = auto;
";

    #[test]
    fn test_mhz_to_khz() {
        assert_eq!(mhz_to_khz("665.6").as_deref(), Some("665600"));
        assert_eq!(mhz_to_khz("1,600").as_deref(), Some("1600000"));
        assert_eq!(mhz_to_khz("204").as_deref(), Some("204000"));
        assert_eq!(mhz_to_khz("3,199.0005").as_deref(), Some("3199000"));
        assert_eq!(mhz_to_khz(".5").as_deref(), Some("500"));
        assert_eq!(mhz_to_khz("1.2.3"), None);
        assert_eq!(mhz_to_khz(""), None);
    }

    #[test]
    fn test_header_frequency() {
        assert_eq!(header_frequency(CFG).as_deref(), Some("665600"));
        // ヘッダはファイル先頭のコメント行の並びにある場合だけ有効
        assert_eq!(
            header_frequency("SDRAM[0].EmcMrw15 = 0x0;\n# Parameter file: x (665.6 MHz)\n"),
            None
        );
    }

    #[test]
    fn test_rewrite_secondary() {
        let out = rewrite_secondary(CFG, &table(), "665600").unwrap();
        assert_eq!(out.frequency, "665600");
        assert_eq!(out.rewritten_lines, 4);

        let lines: Vec<&str> = out.text.lines().collect();
        assert_eq!(lines[0], "# Orin SDRAM configuration");
        assert_eq!(lines[2], "SDRAM[0].EmcPutermExtra = 0x00000011;");
        // アドレス 0x0e は MRW15、下位16ビットだけを書き換える
        assert_eq!(lines[3], "SDRAM[0].EmcMrw15 = 0x880e0025;");
        // アドレス 0x0c は MR12
        assert_eq!(lines[4], "SDRAM[0].EmcWarmBootMrwExtra = 0x080c0033;");
        // どちらのアドレスでもない MRW 行は逆引き表にもなければそのまま
        assert_eq!(lines[5], "SDRAM[0].EmcMrw2 = 0x08020044;");
        assert_eq!(lines[6], "#@ EMC_MRW15_0{ch=1} = 0x480e0025;");
        assert_eq!(lines[7], "SDRAM[0].EmcUnrelated = 0x00000001;");
        assert_eq!(lines[8], "SDRAM[0].EmcName = auto;");
    }

    #[test]
    fn test_frequency_mismatch() {
        let cfg = CFG.replace("665.6 MHz", "204 MHz");
        assert_eq!(
            rewrite_secondary(&cfg, &table(), "665600").unwrap_err(),
            ExportError::FrequencyMismatch {
                expected: "665600".to_string(),
                found: "204000".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_header() {
        let cfg = CFG.replace("# Parameter file: orin-lpddr5.par (665.6 MHz)\n", "");
        assert_eq!(
            rewrite_secondary(&cfg, &table(), "665600").unwrap_err(),
            ExportError::MissingSecondaryHeader
        );
    }

    #[test]
    fn test_reference_frequency_not_loaded() {
        let cfg = CFG.replace("665.6 MHz", "2,133 MHz");
        assert_eq!(
            rewrite_secondary(&cfg, &table(), "2133000").unwrap_err(),
            ExportError::FrequencyNotInTable("2133000".to_string())
        );
    }
}
