use chrono::Local;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::device::TelemetrySample;
use crate::stats::SampleAggregate;
use crate::tuning::OperatingPoint;

/// 文件名与 CSV 行里的时间戳格式
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// 逐条读数 CSV 日志。文件在首次写入时才创建，
/// 表头只在文件为空时写一次。
pub struct ReadingsLog {
    path: PathBuf,
}

impl ReadingsLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// 按约定文件名在指定目录下构造
    pub fn in_dir(dir: &Path, voltage_mv: u32, frequency_mhz: u32, timestamp: &str) -> Self {
        Self::new(dir.join(format!(
            "bitaxe_readings_volt_{}_freq_{}_{}.csv",
            voltage_mv, frequency_mhz, timestamp
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, sample: &TelemetrySample, note: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        if file.metadata()?.len() == 0 {
            writeln!(
                file,
                "Timestamp,Hashrate(GH/s),Frequency(MHz),Temp(°C),VRTemp(°C),CoreVoltage(mV),CoreVoltageActual(mV),Power(W),Current(mA),Voltage(mV),J/TH,Note"
            )?;
        }

        let timestamp = Local::now().format(TIMESTAMP_FORMAT);
        writeln!(
            file,
            "{},{:.2},{},{:.2},{:.2},{},{},{:.2},{:.2},{:.2},{:.2},{}",
            timestamp,
            sample.hashrate_ghs,
            sample.frequency_mhz,
            sample.chip_temp_c,
            sample.vr_temp_c,
            sample.core_voltage_set_mv,
            sample.core_voltage_actual_mv,
            sample.power_w,
            sample.current_ma,
            sample.voltage_mv,
            sample.efficiency_j_th,
            note
        )?;
        Ok(())
    }
}

/// 每轮汇总文件。监控模式下从不写入，因此文件也不会被创建。
pub struct SummaryLog {
    path: PathBuf,
}

impl SummaryLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn in_dir(dir: &Path, voltage_mv: u32, frequency_mhz: u32, timestamp: &str) -> Self {
        Self::new(dir.join(format!(
            "bitaxe_summaries_volt_{}_freq_{}_{}.csv",
            voltage_mv, frequency_mhz, timestamp
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 追加一轮的汇总块：平均算力行 + Metric,Min,Max,Avg 表
    pub fn append_run(
        &self,
        run_number: u32,
        point: OperatingPoint,
        aggregate: &SampleAggregate,
    ) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        writeln!(file)?;
        writeln!(
            file,
            "Run {} Summary: Frequency {} MHz, Voltage {} mV, Avg Hashrate {:.2} GH/s",
            run_number,
            point.frequency_mhz,
            point.voltage_mv,
            aggregate.hashrate.avg()
        )?;
        writeln!(file, "Metric,Min,Max,Avg")?;
        for (name, unit, metric) in aggregate.rows() {
            writeln!(
                file,
                "{},{:.2}{},{:.2}{},{:.2}{}",
                name,
                metric.min,
                unit,
                metric.max,
                unit,
                metric.avg(),
                unit
            )?;
        }
        writeln!(file)?;
        Ok(())
    }

    /// 追加全局汇总文本
    pub fn append_lines(&self, lines: &[String]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file)?;
        for line in lines {
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}
