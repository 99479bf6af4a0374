/// DVFS テーブル編集用エラー型定義
/// 読み込み・カタログ・編集・書き出しの各段階ごとのエラーと、それらの統合型

use std::error::Error;
use std::fmt;

/// テーブル解析エラー
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// 周波数レコードが1つも得られない（空・不正な入力）
    NoFrequencyRecord,
    /// レコードに周波数キーが含まれていない
    MissingFrequencyKey { register_count: usize },
    /// フラグレジスタが見つからない
    MissingFlagRegister { frequency: String, register: String },
    /// 16進値として解釈できない
    InvalidHexValue { register: String, value: String },
    /// 予期しないデータ形式
    UnexpectedFormat(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::NoFrequencyRecord => {
                write!(f, "周波数レコードが見つかりません")
            }
            ParseError::MissingFrequencyKey { register_count } => {
                write!(f, "周波数キーのないレコードです ({}レジスタ)", register_count)
            }
            ParseError::MissingFlagRegister { frequency, register } => {
                write!(f, "周波数 {} にフラグレジスタ '{}' がありません", frequency, register)
            }
            ParseError::InvalidHexValue { register, value } => {
                write!(f, "レジスタ '{}' の値が16進数ではありません: {}", register, value)
            }
            ParseError::UnexpectedFormat(msg) => {
                write!(f, "予期しないデータ形式: {}", msg)
            }
        }
    }
}

impl Error for ParseError {}

/// レジスタカタログ・対応表の不整合
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// カタログに存在しないレジスタ
    UnknownRegister { bank: String, register: String },
    /// レジスタに存在しないフィールド
    UnknownField { register: String, field: String },
    /// 1つのレジスタに複数のルールが一致した
    AmbiguousRule { register: String, first: String, second: String },
    /// レジスタ定義が不変条件を満たさない
    InvalidDefinition { register: String, reason: String },
    /// ルールのパターンがコンパイルできない
    InvalidPattern { pattern: String, reason: String },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::UnknownRegister { bank, register } => {
                write!(f, "不明なレジスタ: {}/{}", bank, register)
            }
            CatalogError::UnknownField { register, field } => {
                write!(f, "レジスタ '{}' に不明なフィールド: {}", register, field)
            }
            CatalogError::AmbiguousRule { register, first, second } => {
                write!(f, "レジスタ '{}' に複数のルールが一致しました: '{}' と '{}'", register, first, second)
            }
            CatalogError::InvalidDefinition { register, reason } => {
                write!(f, "レジスタ '{}' の定義が不正です: {}", register, reason)
            }
            CatalogError::InvalidPattern { pattern, reason } => {
                write!(f, "パターン '{}' が不正です: {}", pattern, reason)
            }
        }
    }
}

impl Error for CatalogError {}

/// 編集セッションのエラー
#[derive(Debug, Clone, PartialEq)]
pub enum EditError {
    /// 値がフィールドのビット幅に収まらない
    OutOfBounds { field: String, bits: u32, value: i64 },
    /// テーブルに存在しない周波数
    UnknownFrequency(String),
    /// 表示軸として定義されていない軸
    UnknownAxis(String),
    /// 定義されていないバス幅
    UnknownBusWidth(String),
    /// 選択した周波数にその軸のレジスタがない
    AxisNotPresent { frequency: String, axis: String },
    /// 現在の選択範囲に含まれないフィールド
    FieldNotInScope { channel: String, register: String, field: String },
    /// 軸が選択されていない
    NoSelection,
    /// テーブルが読み込まれていない
    NoTableLoaded,
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditError::OutOfBounds { field, bits, value } => {
                write!(f, "{}ビットのフィールド {} の範囲外です: {}", bits, field, value)
            }
            EditError::UnknownFrequency(frequency) => {
                write!(f, "不明な周波数: {}", frequency)
            }
            EditError::UnknownAxis(axis) => write!(f, "不明な軸: {}", axis),
            EditError::UnknownBusWidth(width) => write!(f, "不明なバス幅: {}", width),
            EditError::AxisNotPresent { frequency, axis } => {
                write!(f, "周波数 {} に軸 {} のレジスタがありません", frequency, axis)
            }
            EditError::FieldNotInScope { channel, register, field } => {
                write!(f, "選択範囲外のフィールド: [{}] {}.{}", channel, register, field)
            }
            EditError::NoSelection => write!(f, "軸が選択されていません"),
            EditError::NoTableLoaded => write!(f, "テーブルが読み込まれていません"),
        }
    }
}

impl Error for EditError {}

/// 書き出しエラー（成果物ごと）
#[derive(Debug, Clone, PartialEq)]
pub enum ExportError {
    /// 設定ファイルの周波数が基準周波数と一致しない
    FrequencyMismatch { expected: String, found: String },
    /// ファイル内の周波数がテーブルに存在しない
    FrequencyNotInTable(String),
    /// 設定ファイルに周波数ヘッダがない
    MissingSecondaryHeader,
    /// 上書きしない場合はサフィックスか出力先が必要
    SuffixRequired,
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::FrequencyMismatch { expected, found } => {
                write!(f, "周波数が一致しません: 期待 {} kHz, 実際 {} kHz", expected, found)
            }
            ExportError::FrequencyNotInTable(frequency) => {
                write!(f, "周波数 {} kHz はテーブルにありません", frequency)
            }
            ExportError::MissingSecondaryHeader => {
                write!(f, "設定ファイルに周波数ヘッダがありません")
            }
            ExportError::SuffixRequired => {
                write!(f, "上書きしない場合はサフィックスか出力ディレクトリを指定してください")
            }
        }
    }
}

impl Error for ExportError {}

/// DVFS 編集処理の統合エラー型
#[derive(Debug, Clone, PartialEq)]
pub enum DvfsError {
    /// テーブル解析エラー
    Parse(ParseError),
    /// 対応するプロファイルがない
    UnsupportedProfile,
    /// カタログ不整合
    Catalog(CatalogError),
    /// 編集エラー
    Edit(EditError),
    /// 書き出しエラー
    Export(ExportError),
    /// I/O エラー
    Io(String),
    /// 設定エラー
    Config(String),
}

impl fmt::Display for DvfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DvfsError::Parse(err) => write!(f, "テーブル解析エラー: {}", err),
            DvfsError::UnsupportedProfile => write!(f, "対応していないDVFSテーブルです"),
            DvfsError::Catalog(err) => write!(f, "カタログエラー: {}", err),
            DvfsError::Edit(err) => write!(f, "編集エラー: {}", err),
            DvfsError::Export(err) => write!(f, "書き出しエラー: {}", err),
            DvfsError::Io(msg) => write!(f, "I/Oエラー: {}", msg),
            DvfsError::Config(msg) => write!(f, "設定エラー: {}", msg),
        }
    }
}

impl Error for DvfsError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DvfsError::Parse(err) => Some(err),
            DvfsError::Catalog(err) => Some(err),
            DvfsError::Edit(err) => Some(err),
            DvfsError::Export(err) => Some(err),
            _ => None,
        }
    }
}

// From実装で自動変換をサポート
impl From<ParseError> for DvfsError {
    fn from(err: ParseError) -> Self {
        DvfsError::Parse(err)
    }
}

impl From<CatalogError> for DvfsError {
    fn from(err: CatalogError) -> Self {
        DvfsError::Catalog(err)
    }
}

impl From<EditError> for DvfsError {
    fn from(err: EditError) -> Self {
        DvfsError::Edit(err)
    }
}

impl From<ExportError> for DvfsError {
    fn from(err: ExportError) -> Self {
        DvfsError::Export(err)
    }
}

impl From<std::io::Error> for DvfsError {
    fn from(err: std::io::Error) -> Self {
        DvfsError::Io(err.to_string())
    }
}

/// Result型のエイリアス
pub type DvfsResult<T> = Result<T, DvfsError>;

/// エラーヘルパー関数
impl CatalogError {
    /// 不明なレジスタエラーを作成
    pub fn unknown_register(bank: &str, register: &str) -> Self {
        CatalogError::UnknownRegister {
            bank: bank.to_string(),
            register: register.to_string(),
        }
    }

    /// 定義不正エラーを作成
    pub fn invalid_definition(register: &str, reason: impl Into<String>) -> Self {
        CatalogError::InvalidDefinition {
            register: register.to_string(),
            reason: reason.into(),
        }
    }
}

impl EditError {
    /// 範囲外エラーを作成
    pub fn out_of_bounds(field: &str, bits: u32, value: i64) -> Self {
        EditError::OutOfBounds {
            field: field.to_string(),
            bits,
            value,
        }
    }
}
