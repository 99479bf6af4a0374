use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dvfs_rust::dvfs_common_rs::export::{reencode_register, rewrite_table};
use dvfs_rust::dvfs_common_rs::register::{Profile, ProfileRegistry};
use dvfs_rust::dvfs_common_rs::table::{FieldPartitioner, TableParser};

const REGISTERS: &[(&str, u32)] = &[
    ("EMC_PMACRO_OB_DDLL_LONG_WCK_RANK0_0_0_CH0", 0x0040_0040),
    ("EMC_PMACRO_AUTO_CAL_CONFIG3_0_CH0", 0x001f_0001),
    ("EMC_PMACRO_AUTO_CAL_CONFIG8_0_CH0", 0x0403_0201),
    ("EMC_PUTERM_EXTRA_0", 0xabc0_0010),
    ("EMC_QUSE_0", 0x0000_0003),
    ("EMC_MRW15_0", 0x880e_0020),
    ("R0_DRAM_MR12", 0x0000_0030),
    ("EMC_SAVE_RESTORE_MOD_IB_BYTE0_VREF_OFF", 0x8000_0002),
];

/// 周波数数 x チャンネル数のテーブルを生成
fn build_table(frequencies: usize, channels: usize) -> String {
    let mut text = String::new();
    for f in 0..frequencies {
        text.push_str("  0x00000080, /* needs_training */\n");
        text.push_str("  0x00000100, /* EMC_PMACRO_DDLL_BYPASS_0 */\n");
        for (name, value) in REGISTERS {
            text.push_str(&format!("  {:#010x}, /* {} */\n", value, name));
        }
        for ch in 0..channels {
            for rank in 0..2 {
                text.push_str(&format!(
                    "  {:#010x}, /* EMC_PMACRO_OB_DDLL_LONG_DQ_RANK{}_0_0_CH{} */\n",
                    0x0020_0010 + ch as u32,
                    rank,
                    ch
                ));
                text.push_str(&format!(
                    "  {:#010x}, /* EMC_PMACRO_IB_DDLL_LONG_DQS_RANK{}_0_0_CH{} */\n",
                    0x0030_0018 + ch as u32,
                    rank,
                    ch
                ));
            }
        }
        text.push_str(&format!("  {}, /* SDRAM frequency khz */\n", 204000 + f * 100000));
        text.push_str("  0x00000000, /* PLLHUB_ENABLE_FREQ_CHANGE */\n");
    }
    text
}

fn benchmark_parse(c: &mut Criterion) {
    let registry = ProfileRegistry::builtin();
    let mut group = c.benchmark_group("parse");

    for frequencies in [1, 4, 16] {
        let text = build_table(frequencies, 16);
        group.bench_with_input(BenchmarkId::new("parse_str", frequencies), &text, |b, text| {
            b.iter(|| black_box(TableParser::new(&registry).parse_str(black_box(text)).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_partition(c: &mut Criterion) {
    let registry = ProfileRegistry::builtin();
    let definition = registry.get(Profile::T234).unwrap();
    let mut group = c.benchmark_group("partition");

    for channels in [8, 16] {
        let parsed = TableParser::new(&registry)
            .parse_str(&build_table(8, channels))
            .unwrap();
        group.bench_with_input(BenchmarkId::new("partition", channels), &parsed, |b, parsed| {
            b.iter(|| black_box(FieldPartitioner::new(definition).partition(parsed.clone()).unwrap()));
        });
    }

    group.finish();
}

fn benchmark_export(c: &mut Criterion) {
    let registry = ProfileRegistry::builtin();
    let definition = registry.get(Profile::T234).unwrap();
    let text = build_table(8, 16);
    let parsed = TableParser::new(&registry).parse_str(&text).unwrap();
    let table = FieldPartitioner::new(definition).partition(parsed).unwrap();

    c.bench_function("rewrite_table", |b| {
        b.iter(|| black_box(rewrite_table(black_box(&text), &table).unwrap()));
    });

    let tree = table.tree("204000").unwrap();
    c.bench_function("reencode_register", |b| {
        b.iter(|| {
            black_box(reencode_register(
                tree,
                &table.masks,
                black_box("EMC_PMACRO_OB_DDLL_LONG_DQ_RANK0_0_0_CH3"),
                black_box(0xf820_0013),
            ))
        });
    });
}

criterion_group!(benches, benchmark_parse, benchmark_partition, benchmark_export);
criterion_main!(benches);
