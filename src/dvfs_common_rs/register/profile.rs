/// ハードウェアプロファイル
/// プロファイルごとに (カタログ, 軸対応表, 表示レイアウト) を保持し、
/// 読み込んだテーブルの識別レジスタから使用するプロファイルを決める

use crate::dvfs_common_rs::register::axis_table::{load_axis_spec, AxisMappingTable, DisplayLayout};
use crate::dvfs_common_rs::register::catalog::{extend, RegisterCatalog};
use crate::dvfs_common_rs::register::core::exceptions::{DvfsError, DvfsResult};
use log::{debug, info};
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

const T234_CATALOG: &str = include_str!("profile_spec/t234_catalog.toml");
const T234_AXES: &str = include_str!("profile_spec/t234_axes.toml");

// 埋め込み仕様から組み込みプロファイルを構築（初回アクセス時に1回だけ）
static BUILTIN_PROFILES: Lazy<ProfileRegistry> = Lazy::new(|| {
    let t234 = ProfileDefinition::from_toml(Profile::T234, T234_CATALOG, T234_AXES)
        .expect("embedded T234 profile");
    ProfileRegistry::new(vec![t234])
});

/// 対応するハードウェアプロファイル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Profile {
    /// Orin (LPDDR5)
    T234,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::T234 => "T234",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// プロファイル判定用の識別レジスタ（先に見つかったものが優先）
pub const PROFILE_MARKERS: &[(&str, Profile)] =
    &[("EMC_PMACRO_OB_DDLL_LONG_WCK_RANK0_0_0_CH0", Profile::T234)];

/// 1つのプロファイルが持つ静的設定一式
#[derive(Debug, Clone)]
pub struct ProfileDefinition {
    pub profile: Profile,
    /// 合成レジスタを含むカタログ
    pub catalog: RegisterCatalog,
    pub axis_table: AxisMappingTable,
    pub layout: DisplayLayout,
}

impl ProfileDefinition {
    /// カタログと軸定義の TOML から構築する
    pub fn from_toml(profile: Profile, catalog_toml: &str, axes_toml: &str) -> DvfsResult<Self> {
        let base = RegisterCatalog::from_toml_str(catalog_toml)?;
        let (axis_table, layout) = load_axis_spec(axes_toml)?;
        Ok(Self {
            profile,
            catalog: extend(&base),
            axis_table,
            layout,
        })
    }
}

/// プロファイルの登録簿
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<Profile, ProfileDefinition>,
}

impl ProfileRegistry {
    pub fn new(definitions: Vec<ProfileDefinition>) -> Self {
        Self {
            profiles: definitions.into_iter().map(|d| (d.profile, d)).collect(),
        }
    }

    /// 埋め込み仕様による組み込みプロファイル
    pub fn builtin() -> Self {
        BUILTIN_PROFILES.clone()
    }

    /// 外部ファイルで T234 の仕様を差し替えた登録簿を作る
    ///
    /// Args:
    ///     catalog_path: カタログ TOML（None なら埋め込み仕様）
    ///     axes_path: 軸定義 TOML（None なら埋め込み仕様）
    pub fn with_overrides(catalog_path: Option<&Path>, axes_path: Option<&Path>) -> DvfsResult<Self> {
        if catalog_path.is_none() && axes_path.is_none() {
            return Ok(Self::builtin());
        }
        let catalog_toml = match catalog_path {
            Some(path) => {
                info!("Loading register catalog from {}", path.display());
                fs::read_to_string(path)?
            }
            None => T234_CATALOG.to_string(),
        };
        let axes_toml = match axes_path {
            Some(path) => {
                info!("Loading axis table from {}", path.display());
                fs::read_to_string(path)?
            }
            None => T234_AXES.to_string(),
        };
        let t234 = ProfileDefinition::from_toml(Profile::T234, &catalog_toml, &axes_toml)?;
        Ok(Self::new(vec![t234]))
    }

    pub fn get(&self, profile: Profile) -> Option<&ProfileDefinition> {
        self.profiles.get(&profile)
    }

    /// レコード内の識別レジスタからプロファイルを決める
    ///
    /// Args:
    ///     has_register: レコードにレジスタ名が含まれるかを返す関数
    ///
    /// Returns:
    ///     最初に見つかった識別レジスタのプロファイル、なければ UnsupportedProfile
    pub fn detect<F>(&self, has_register: F) -> DvfsResult<&ProfileDefinition>
    where
        F: Fn(&str) -> bool,
    {
        for (marker, profile) in PROFILE_MARKERS {
            if !has_register(marker) {
                continue;
            }
            if let Some(definition) = self.profiles.get(profile) {
                debug!("Profile marker {} found: {}", marker, profile);
                return Ok(definition);
            }
        }
        Err(DvfsError::UnsupportedProfile)
    }
}
