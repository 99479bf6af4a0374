/// レジスタカタログ
/// バンク名 + レジスタ名からビット配置定義を引く不変の辞書と、
/// ベースカタログに合成レジスタを追加する `extend` ビルダー

use crate::dvfs_common_rs::register::core::bit_utils::{field_mask, REGISTER_WIDTH};
use crate::dvfs_common_rs::register::core::exceptions::{CatalogError, DvfsError, DvfsResult};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

/// 符号-絶対値表現レジスタの符号フィールド名
pub const SIGN_FIELD: &str = "SIGN";

/// 符号ビット位置
pub const SIGN_BIT: u32 = 31;

/// 合成レジスタのバイト数
const SYNTHETIC_BYTES: u32 = 8;

/// レジスタバンク
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bank {
    #[serde(rename = "EMC")]
    Emc,
    #[serde(rename = "R0")]
    R0,
}

impl Bank {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bank::Emc => "EMC",
            Bank::R0 => "R0",
        }
    }

    /// テーブル上のレジスタ名から所属バンクを決める
    pub fn for_register(register_name: &str) -> Bank {
        if register_name.starts_with("R0") {
            Bank::R0
        } else {
            Bank::Emc
        }
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// フィールドのアクセス種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    Rw,
    Ro,
}

/// フィールド定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub lsb: u32,
    pub msb: u32,
    #[serde(default)]
    pub default: u32,
    #[serde(default)]
    pub sw_default: u32,
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub enums: BTreeMap<String, u32>,
    #[serde(default)]
    pub parity_protection: bool,
}

impl FieldDefinition {
    /// 読み書き可能なフィールドを作成
    pub fn new(name: &str, lsb: u32, msb: u32) -> Self {
        Self {
            name: name.to_string(),
            lsb,
            msb,
            default: 0,
            sw_default: 0,
            access: Access::Rw,
            enums: BTreeMap::new(),
            parity_protection: false,
        }
    }

    /// ビット幅
    pub fn size(&self) -> u32 {
        self.msb.saturating_sub(self.lsb) + 1
    }

    /// レジスタ内でのビットマスク
    pub fn mask(&self) -> u32 {
        field_mask(self.lsb, self.msb)
    }

    /// レジスタ値からフィールド値を取り出す
    pub fn decode(&self, raw: u32) -> u32 {
        (raw & self.mask()) >> self.lsb
    }
}

fn default_word_count() -> u32 {
    1
}

fn default_size() -> u32 {
    REGISTER_WIDTH
}

/// レジスタ定義
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDefinition {
    pub name: String,
    #[serde(default)]
    pub addr: u32,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_word_count")]
    pub word_count: u32,
    #[serde(default = "default_size")]
    pub size: u32,
    #[serde(default)]
    pub reset_val: u32,
    #[serde(default)]
    pub reset_mask: u32,
    #[serde(default)]
    pub sw_default_val: u32,
    #[serde(default)]
    pub sw_default_mask: u32,
    #[serde(default)]
    pub read_mask: u32,
    pub write_mask: u32,
    /// 宣言順のフィールド
    #[serde(default, rename = "field")]
    pub fields: Vec<FieldDefinition>,
}

impl RegisterDefinition {
    /// 32ビット・全フィールド書き込み可のレジスタを作成
    pub fn new(name: &str, fields: Vec<FieldDefinition>) -> Self {
        let write_mask = fields.iter().fold(0u32, |acc, f| acc | f.mask());
        Self {
            name: name.to_string(),
            addr: 0,
            secure: false,
            word_count: 1,
            size: REGISTER_WIDTH,
            reset_val: 0,
            reset_mask: write_mask,
            sw_default_val: 0,
            sw_default_mask: write_mask,
            read_mask: write_mask,
            write_mask,
            fields,
        }
    }

    /// 書き込みマスクを差し替える
    pub fn with_write_mask(mut self, write_mask: u32) -> Self {
        self.write_mask = write_mask;
        self.read_mask = write_mask;
        self.sw_default_mask = write_mask;
        self
    }

    /// ツールが変更してはならないビット（書き込みマスクの補数）
    pub fn protect_mask(&self) -> u32 {
        !self.write_mask
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// フィールド配置の不変条件を検証する
    ///
    /// 各フィールドが連続・非重複でレジスタ幅に収まり、幅の合計がレジスタ幅以下であること
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.size == 0 || self.size > REGISTER_WIDTH {
            return Err(CatalogError::invalid_definition(
                &self.name,
                format!("レジスタ幅 {} は 1..=32 の範囲外", self.size),
            ));
        }
        let mut occupied = 0u32;
        let mut total_width = 0u32;
        for field in &self.fields {
            if field.msb < field.lsb || field.msb >= self.size {
                return Err(CatalogError::invalid_definition(
                    &self.name,
                    format!("フィールド {} の範囲 [{}:{}] が不正", field.name, field.msb, field.lsb),
                ));
            }
            if occupied & field.mask() != 0 {
                return Err(CatalogError::invalid_definition(
                    &self.name,
                    format!("フィールド {} が他のフィールドと重なっている", field.name),
                ));
            }
            occupied |= field.mask();
            total_width += field.size();
        }
        if total_width > self.size {
            return Err(CatalogError::invalid_definition(
                &self.name,
                format!("フィールド幅の合計 {} がレジスタ幅 {} を超える", total_width, self.size),
            ));
        }
        Ok(())
    }
}

/// TOML上のカタログ表現（バンク名 → レジスタ定義の配列）
#[derive(Debug, Default, Deserialize)]
struct CatalogSpec {
    #[serde(rename = "EMC", default)]
    emc: Vec<RegisterDefinition>,
    #[serde(rename = "R0", default)]
    r0: Vec<RegisterDefinition>,
}

/// レジスタカタログ
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegisterCatalog {
    banks: BTreeMap<Bank, BTreeMap<String, RegisterDefinition>>,
}

impl RegisterCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// TOML文字列からカタログを構築する
    ///
    /// 各レジスタ定義は登録前に検証され、同一バンク内での重複はエラーになる
    pub fn from_toml_str(text: &str) -> DvfsResult<Self> {
        let spec: CatalogSpec =
            toml::from_str(text).map_err(|e| DvfsError::Config(format!("カタログ定義: {}", e)))?;
        let mut catalog = Self::new();
        for (bank, registers) in [(Bank::Emc, spec.emc), (Bank::R0, spec.r0)] {
            for register in registers {
                register.validate()?;
                if catalog.contains(bank, &register.name) {
                    return Err(CatalogError::invalid_definition(&register.name, "重複した定義").into());
                }
                catalog.insert(bank, register);
            }
        }
        debug!("Loaded register catalog: {} registers", catalog.len());
        Ok(catalog)
    }

    /// ファイルからカタログを読み込む
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> DvfsResult<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// バンクとレジスタ名で定義を引く
    pub fn lookup(&self, bank: Bank, register_name: &str) -> Result<&RegisterDefinition, CatalogError> {
        self.banks
            .get(&bank)
            .and_then(|registers| registers.get(register_name))
            .ok_or_else(|| CatalogError::unknown_register(bank.as_str(), register_name))
    }

    pub fn contains(&self, bank: Bank, register_name: &str) -> bool {
        self.lookup(bank, register_name).is_ok()
    }

    /// バンク内のレジスタ名（昇順）
    pub fn register_names(&self, bank: Bank) -> Vec<&str> {
        self.banks
            .get(&bank)
            .map(|registers| registers.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.banks.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&mut self, bank: Bank, register: RegisterDefinition) {
        self.banks
            .entry(bank)
            .or_default()
            .insert(register.name.clone(), register);
    }
}

/// 符号-絶対値表現の合成レジスタ（符号ビット31 + 下位の絶対値フィールド）
fn sign_magnitude_register(name: &str, magnitude_bits: u32, write_mask: u32) -> RegisterDefinition {
    let mut register = RegisterDefinition::new(
        name,
        vec![
            FieldDefinition::new(SIGN_FIELD, SIGN_BIT, SIGN_BIT),
            FieldDefinition::new(name, 0, magnitude_bits - 1),
        ],
    )
    .with_write_mask(write_mask);
    register.reset_mask = field_mask(SIGN_BIT, SIGN_BIT) | field_mask(0, magnitude_bits - 1);
    register
}

/// パリティ保護付きの8ビット単一フィールドレジスタ
fn mode_register(name: &str, field_name: &str) -> RegisterDefinition {
    let mut field = FieldDefinition::new(field_name, 0, 7);
    field.parity_protection = true;
    RegisterDefinition::new(name, vec![field]).with_write_mask(0x0000_00ff)
}

/// トレーニング用 IB VREF レジスタ名
pub fn ib_vref_register_name(byte: u32) -> String {
    format!("SAVE_RESTORE_MOD_IB_BYTE{}_VREF_OFF", byte)
}

/// トレーニング用 OB VREF レジスタ名（バイト番号から (byte/2, byte%2) を導出）
pub fn ob_vref_register_name(byte: u32) -> String {
    format!("SAVE_RESTORE_MOD_OB_C{}S{}_VREF_OFF", byte / 2, byte % 2)
}

/// ベースカタログに合成レジスタを加えたカタログを返す
///
/// ベースカタログは変更しない。合成レジスタは同名の定義があっても上書きされる
///
/// Args:
///     base: 宣言的に定義されたベースカタログ
///
/// Returns:
///     合成レジスタを含む新しいカタログ
pub fn extend(base: &RegisterCatalog) -> RegisterCatalog {
    let mut catalog = base.clone();

    for byte in 0..SYNTHETIC_BYTES {
        catalog.insert(
            Bank::Emc,
            sign_magnitude_register(&ib_vref_register_name(byte), 7, 0xcf00_007f),
        );
        catalog.insert(
            Bank::Emc,
            sign_magnitude_register(&ob_vref_register_name(byte), 8, 0x8000_00ff),
        );
    }

    catalog.insert(Bank::R0, mode_register("DRAM_MR12", "CMDVREF_MR12"));
    catalog.insert(Bank::R0, mode_register("DRAM_MR14", "DQVREF_MR14"));
    catalog.insert(Bank::R0, mode_register("DRAM_MR15", "DQVREF_MR15"));

    debug!(
        "Extended register catalog: {} -> {} registers",
        base.len(),
        catalog.len()
    );
    catalog
}
