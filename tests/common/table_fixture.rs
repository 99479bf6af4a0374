use std::fs;
use std::path::{Path, PathBuf};

/// Frequency-indexed T234 table fixture builder
/// Renders records in the same layout as the vendor tables: `  0x........, /* NAME */`

pub const FREQ_HIGH: &str = "665600";
pub const FREQ_LOW: &str = "204000";

/// needs_training bit for DQIVREF
pub const TRAINING_DQIVREF: u32 = 1 << 7;
/// bypass bit for OBDQ
pub const BYPASS_OBDQ: u32 = 1 << 8;

pub const WCK_MARKER: &str = "EMC_PMACRO_OB_DDLL_LONG_WCK_RANK0_0_0_CH0";
pub const OB_DQ_CH0: &str = "EMC_PMACRO_OB_DDLL_LONG_DQ_RANK0_0_0_CH0";
pub const OB_DQ_CH1: &str = "EMC_PMACRO_OB_DDLL_LONG_DQ_RANK0_0_0_CH1";
pub const AUTOCAL_CLK_CH0: &str = "EMC_PMACRO_AUTO_CAL_CONFIG3_0_CH0";
pub const AUTOCAL_TERM_CH0: &str = "EMC_PMACRO_AUTO_CAL_CONFIG8_0_CH0";
pub const PUTERM: &str = "EMC_PUTERM_EXTRA_0";
pub const QUSE: &str = "EMC_QUSE_0";
pub const MRW15: &str = "EMC_MRW15_0";
pub const MR12: &str = "R0_DRAM_MR12";
pub const IB_VREF_BYTE0: &str = "EMC_SAVE_RESTORE_MOD_IB_BYTE0_VREF_OFF";
pub const IB_VREF_BYTE1: &str = "EMC_SAVE_RESTORE_MOD_IB_BYTE1_VREF_OFF";
pub const OB_TRAINING_BYTE0: &str = "EMC0_EMC_TRAINING_RW_OFFSET_OB_BYTE0_0";

#[derive(Debug, Clone)]
pub struct RecordFixture {
    pub frequency: String,
    pub training: u32,
    pub bypass: u32,
    pub registers: Vec<(String, u32)>,
}

#[derive(Debug, Clone, Default)]
pub struct TableFixture {
    records: Vec<RecordFixture>,
    trailer: Vec<String>,
}

impl TableFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(mut self, frequency: &str, training: u32, bypass: u32, registers: &[(&str, u32)]) -> Self {
        self.records.push(RecordFixture {
            frequency: frequency.to_string(),
            training,
            bypass,
            registers: registers.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
        });
        self
    }

    /// Lines after the last record terminator
    pub fn trailer(mut self, line: &str) -> Self {
        self.trailer.push(line.to_string());
        self
    }

    pub fn render(&self) -> String {
        let mut text = String::from("// T234 LPDDR5 DVFS table\n");
        for record in &self.records {
            text.push_str(&format!("// {} kHz\n", record.frequency));
            text.push_str(&format!("  {:#010x}, /* needs_training */\n", record.training));
            text.push_str(&format!("  {:#010x}, /* EMC_PMACRO_DDLL_BYPASS_0 */\n", record.bypass));
            for (name, value) in &record.registers {
                text.push_str(&format!("  {:#010x}, /* {} */\n", value, name));
            }
            text.push_str(&format!("  {}, /* SDRAM frequency khz */\n", record.frequency));
            text.push_str("  0x00000000, /* PLLHUB_ENABLE_FREQ_CHANGE */\n");
        }
        for line in &self.trailer {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

pub fn standard_registers() -> Vec<(&'static str, u32)> {
    vec![
        (WCK_MARKER, 0x0040_0040),
        (OB_DQ_CH0, 0xf820_0010),
        (OB_DQ_CH1, 0x0022_0012),
        (AUTOCAL_CLK_CH0, 0x001f_0001),
        (AUTOCAL_TERM_CH0, 0x0403_0201),
        (PUTERM, 0xabc0_0010),
        (QUSE, 0x0000_0003),
        (MRW15, 0x880e_0020),
        (MR12, 0x0000_0030),
        (IB_VREF_BYTE0, 0x8000_0002),
        (IB_VREF_BYTE1, 0x0000_0001),
        (OB_TRAINING_BYTE0, 0x0000_00fe),
    ]
}

/// 665600 kHz needs DQIVREF training, 204000 kHz bypasses OBDQ
pub fn sample_fixture() -> TableFixture {
    let registers = standard_registers();
    TableFixture::new()
        .record(FREQ_HIGH, TRAINING_DQIVREF, 0, &registers)
        .record(FREQ_LOW, 0, BYPASS_OBDQ, &registers)
}

pub fn sample_table() -> String {
    sample_fixture().render()
}

/// Secondary configuration file declaring the given calibration frequency
pub fn sample_cfg(mhz: &str) -> String {
    format!(
        "\
# T234 SDRAM parameters
# Parameter file: orin-lpddr5.par ({} MHz)
SDRAM[0].EmcPutermExtra = 0xabc00010;
SDRAM[0].EmcQUse = 0x00000003;
SDRAM[0].EmcPmacroObDdllLongDqRank0_0_0 = 0xf8200010;
SDRAM[0].EmcMrw15 = 0x880e0020;
SDRAM[0].EmcWarmBootMrwExtra = 0x080c0030;
#@ EMC_MRW15_0{{ch=1}} = 0x480e0020;
SDRAM[0].EmcSwizzleRank0Byte0 = 0x12345678;
",
        mhz
    )
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}
