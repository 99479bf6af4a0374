/// ビット操作ユーティリティ
/// 32ビットのレジスタ語からのフィールド抽出・挿入と、符号表現の変換

/// レジスタ語のビット幅
pub const REGISTER_WIDTH: u32 = 32;

/// 下位 `length` ビットを立てたマスクを返す
pub fn low_mask(length: u32) -> u32 {
    if length == 0 {
        0
    } else if length >= REGISTER_WIDTH {
        u32::MAX
    } else {
        (1u32 << length) - 1
    }
}

/// lsb..=msb の範囲を覆うフィールドマスクを返す
///
/// 範囲が不正（msb < lsb、またはレジスタ幅の外）の場合は 0
pub fn field_mask(lsb: u32, msb: u32) -> u32 {
    if msb < lsb || msb >= REGISTER_WIDTH {
        return 0;
    }
    low_mask(msb - lsb + 1) << lsb
}

/// 指定されたビット範囲から値を抽出する
///
/// Args:
///     data: 元のレジスタ値
///     start_bit: 開始ビット位置（LSB基準）
///     length: 抽出するビット長
///
/// Returns:
///     抽出された値（範囲外の指定は 0）
pub fn extract_bits(data: u32, start_bit: u32, length: u32) -> u32 {
    if length == 0 || start_bit >= REGISTER_WIDTH || start_bit + length > REGISTER_WIDTH {
        return 0;
    }
    (data >> start_bit) & low_mask(length)
}

/// 指定されたビット範囲に値を設定する
///
/// Args:
///     data: 対象のレジスタ値（可変参照）
///     start_bit: 開始ビット位置（LSB基準）
///     length: 設定するビット長
///     value: 設定する値（はみ出したビットは捨てられる）
pub fn set_bits(data: &mut u32, start_bit: u32, length: u32, value: u32) {
    if length == 0 || start_bit >= REGISTER_WIDTH || start_bit + length > REGISTER_WIDTH {
        return;
    }
    let mask = low_mask(length);
    *data &= !(mask << start_bit);
    *data |= (value & mask) << start_bit;
}

/// 単一ビットが立っているか
pub fn bit_is_set(data: u32, bit: u32) -> bool {
    extract_bits(data, bit, 1) == 1
}

/// 2の補数表現のビット列を符号付き整数として解釈する
///
/// Args:
///     value: 2の補数のビット列
///     bits: ビット数
pub fn twos_complement_value(value: u32, bits: u32) -> i64 {
    if bits == 0 {
        return 0;
    }
    let value = (value & low_mask(bits)) as i64;
    if value & (1i64 << (bits - 1)) != 0 {
        value - (1i64 << bits)
    } else {
        value
    }
}

/// 符号付き整数を2の補数のビット列に変換する
///
/// 負でない値はそのまま返す。範囲チェックは呼び出し側で `within_bounds` を使うこと
pub fn twos_complement(value: i64, bits: u32) -> u32 {
    if value < 0 {
        (((1i64 << bits) + value) as u32) & low_mask(bits)
    } else {
        value as u32
    }
}

/// 指定ビット幅・符号表現で表現できる値の範囲 (最小, 最大)
pub fn value_range(bits: u32, two: bool) -> (i64, i64) {
    if bits == 0 {
        return (0, 0);
    }
    if two {
        (-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1)
    } else {
        (0, (1i64 << bits) - 1)
    }
}

/// 値がビット幅に収まるかを判定する
///
/// Args:
///     value: 10進の値
///     bits: ビット数
///     two: 2の補数かどうか
pub fn within_bounds(value: i64, bits: u32, two: bool) -> bool {
    let (min, max) = value_range(bits, two);
    value >= min && value <= max
}

/// フィールドのビット列を数値として解釈する
pub fn decode_field(raw: u32, bits: u32, two: bool) -> i64 {
    if two {
        twos_complement_value(raw, bits)
    } else {
        (raw & low_mask(bits)) as i64
    }
}

/// 数値をフィールドのビット列に変換する（`decode_field` の逆）
pub fn encode_field(value: i64, bits: u32, two: bool) -> u32 {
    if two {
        twos_complement(value, bits)
    } else {
        (value as u32) & low_mask(bits)
    }
}

/// `0x` 付き・なしの16進リテラルを解析する
pub fn parse_hex_literal(text: &str) -> Option<u32> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 16).ok()
}

/// レジスタ値を固定幅・ゼロ埋めの `0x` 付きリテラルにする
pub fn format_hex_literal(value: u32) -> String {
    format!("{:#010x}", value)
}
