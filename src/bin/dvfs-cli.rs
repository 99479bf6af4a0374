use clap::{Parser, Subcommand};
use dvfs_rust::dvfs_common_rs::edit::FieldKey;
use dvfs_rust::dvfs_common_rs::editor::{CalibrationEditor, ExportRequest, FieldRow, MessageSlot};
use dvfs_rust::dvfs_common_rs::register::ProfileRegistry;
use dvfs_rust::dvfs_common_rs::utils::config_loader::{ConfigLoader, EditorConfig};
use dvfs_rust::dvfs_common_rs::utils::log_config::{effective_config, init_logging};
use std::error::Error;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dvfs-cli")]
#[command(about = "DRAM DVFS 較正テーブル編集ツール")]
#[command(version = "0.1.0")]
#[command(long_about = "
DRAM DVFS 較正テーブル編集ツール

周波数ごとの較正値をフィールド単位で編集し、
編集したビット以外を保ったままテーブル・derated テーブル・設定ファイルを書き出します。

- info:  テーブルの周波数・フラグ・軸を表示
- show:  選択した (周波数, 軸, バス幅) のフィールドを表示
- edit:  フィールドを増減して書き出し
")]
struct Cli {
    /// 設定ファイル（未指定なら dvfs.config.toml などを検索）
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// デバッグログを有効にする
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// テーブルの概要を表示
    Info {
        /// DVFS テーブル
        table: PathBuf,
    },
    /// 選択したフィールドを表示
    Show {
        /// DVFS テーブル
        table: PathBuf,
        /// 周波数 (kHz)
        #[arg(short, long)]
        frequency: String,
        /// 軸
        #[arg(short, long)]
        axis: String,
        /// バス幅
        #[arg(short = 'w', long, default_value = "128")]
        bus_width: String,
    },
    /// フィールドを編集して書き出す
    Edit {
        /// DVFS テーブル
        table: PathBuf,
        /// 周波数 (kHz)
        #[arg(short, long)]
        frequency: String,
        /// 軸
        #[arg(short, long)]
        axis: String,
        /// バス幅
        #[arg(short = 'w', long, default_value = "128")]
        bus_width: String,
        /// 全対象フィールドの増減回数（負で減少）
        #[arg(long, default_value = "0", allow_hyphen_values = true)]
        step: i64,
        /// 個別フィールドの増減 CH:REGISTER:FIELD=DELTA（チャンネルなしは空）
        #[arg(long = "field", allow_hyphen_values = true)]
        fields: Vec<String>,
        /// 同じ形式の derated テーブル
        #[arg(long)]
        derated: Option<PathBuf>,
        /// 設定ファイル (.cfg)
        #[arg(long)]
        cfg: Option<PathBuf>,
        /// 出力ファイル名のサフィックス
        #[arg(short, long, conflicts_with = "overwrite")]
        suffix: Option<String>,
        /// 元ファイルを上書きする
        #[arg(long)]
        overwrite: bool,
        /// 出力ディレクトリ
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

/// CH:REGISTER:FIELD=DELTA を解釈する
fn parse_field_edit(arg: &str) -> Result<(FieldKey, i64), String> {
    let (location, delta) = arg
        .rsplit_once('=')
        .ok_or_else(|| format!("'=' がありません: {}", arg))?;
    let delta: i64 = delta
        .trim()
        .parse()
        .map_err(|_| format!("増減値が不正です: {}", delta))?;
    let parts: Vec<&str> = location.splitn(3, ':').collect();
    match parts.as_slice() {
        [channel, register, field] if !register.is_empty() && !field.is_empty() => {
            Ok((FieldKey::new(channel, register, field), delta))
        }
        _ => Err(format!("CH:REGISTER:FIELD の形式ではありません: {}", location)),
    }
}

/// これより多く増減すると、選択中のどのフィールドも範囲外になる
fn step_limit(rows: &[FieldRow]) -> u64 {
    rows.iter()
        .map(|row| 1u64 << (row.bits + 1).min(63))
        .max()
        .unwrap_or(0)
}

fn print_message(editor: &mut CalibrationEditor<MessageSlot>) {
    if let Some(message) = editor.sink_mut().take() {
        println!("{}", message);
    }
}

fn run_info(editor: &mut CalibrationEditor<MessageSlot>) {
    let frequencies = editor.frequencies().to_vec();
    println!("周波数 ({}):", frequencies.len());
    for frequency in &frequencies {
        let Some(flags) = editor.flags(frequency) else {
            println!("  {} kHz", frequency);
            continue;
        };
        let training: Vec<&str> = flags
            .training
            .iter()
            .filter(|(_, set)| **set)
            .map(|(axis, _)| axis.as_str())
            .collect();
        let bypass: Vec<&str> = flags
            .bypass
            .iter()
            .filter(|(_, set)| **set)
            .map(|(axis, _)| axis.as_str())
            .collect();
        println!(
            "  {} kHz  training: [{}]  bypass: [{}]",
            frequency,
            training.join(", "),
            bypass.join(", ")
        );
    }
    println!("軸: {}", editor.axes().join(", "));
    println!("バス幅: {}", editor.bus_widths().join(", "));
}

fn print_rows(editor: &CalibrationEditor<MessageSlot>) {
    if let Some(session) = editor.session() {
        println!(
            "{} kHz  {} -> {}  step {}{}",
            session.frequency(),
            session.display_axis(),
            session.tree_axis(),
            session.step(),
            if session.is_sign_magnitude() { "  (sign-magnitude)" } else { "" }
        );
    }
    println!("{:<4} {:<48} {:<44} {:>4} {:>10} {:>10}", "CH", "REGISTER", "FIELD", "BITS", "VALUE", "PENDING");
    for row in editor.rows() {
        println!(
            "{:<4} {:<48} {:<44} {:>4} {:>10} {:>10}",
            row.key.channel,
            row.key.register,
            row.key.field,
            row.bits,
            format!("{:#x}", row.value),
            row.pending
        );
    }
}

fn build_editor(config: &EditorConfig) -> Result<CalibrationEditor<MessageSlot>, Box<dyn Error>> {
    let registry = ProfileRegistry::with_overrides(
        config.profiles.catalog_path.as_deref(),
        config.profiles.axes_path.as_deref(),
    )?;
    Ok(CalibrationEditor::new(registry, MessageSlot::new())
        .with_reference_frequency(&config.export.secondary_reference_khz))
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let loader = match &cli.config {
        Some(path) => ConfigLoader::with_paths(vec![path.clone()]),
        None => ConfigLoader::new(),
    };
    let config = loader.load()?;
    init_logging(&effective_config(&config.logging, cli.debug))?;
    let mut editor = build_editor(&config)?;

    match cli.command {
        Commands::Info { table } => {
            let loaded = editor.load(&table);
            print_message(&mut editor);
            loaded?;
            run_info(&mut editor);
        }

        Commands::Show {
            table,
            frequency,
            axis,
            bus_width,
        } => {
            editor.load(&table)?;
            let selected = editor.select(&frequency, &axis, &bus_width);
            print_message(&mut editor);
            selected?;
            print_rows(&editor);
        }

        Commands::Edit {
            table,
            frequency,
            axis,
            bus_width,
            step,
            fields,
            derated,
            cfg,
            suffix,
            overwrite,
            output_dir,
        } => {
            let edits = fields
                .iter()
                .map(|arg| parse_field_edit(arg))
                .collect::<Result<Vec<_>, _>>()?;

            editor.load(&table)?;
            let selected = editor.select(&frequency, &axis, &bus_width);
            print_message(&mut editor);
            selected?;

            let limit = step_limit(&editor.rows());
            if step.unsigned_abs() > limit {
                return Err(format!("--step {} は選択中のフィールドの範囲を超えています (最大 {})", step, limit).into());
            }
            for _ in 0..step.unsigned_abs() {
                if step > 0 {
                    editor.increment()?;
                } else {
                    editor.decrement()?;
                }
            }
            for (key, delta) in &edits {
                editor.edit_field(key, *delta)?;
            }
            print_rows(&editor);

            let applied = editor.apply();
            print_message(&mut editor);
            println!("{} フィールドを確定しました", applied?);

            let request = ExportRequest {
                derated,
                secondary: cfg,
                suffix: suffix
                    .or_else(|| config.export.default_suffix.clone())
                    .unwrap_or_default(),
                overwrite,
                output_dir: output_dir.or_else(|| config.export.output_dir.clone()),
            };
            let report = editor.export(&request)?;
            for artifact in &report.artifacts {
                match &artifact.outcome {
                    Ok(path) => println!("  {}: {}", artifact.kind, path.display()),
                    Err(e) => println!("  {}: {} ({})", artifact.kind, artifact.source.display(), e),
                }
            }
            print_message(&mut editor);
            if let Some(e) = report.last_error() {
                return Err(e.clone().into());
            }
        }
    }

    Ok(())
}
