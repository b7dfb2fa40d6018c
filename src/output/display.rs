//! 面向操作员的彩色状态输出，直接写到标准输出而不经过日志层

use chrono::Local;
use std::time::Duration;

use crate::device::TelemetrySample;
use crate::safety::{SafetyReport, Severity};
use crate::stats::{BestResult, SampleAggregate};

pub const GREEN: &str = "\x1b[32m";
pub const ORANGE: &str = "\x1b[95m";
pub const RED: &str = "\x1b[91m";
pub const RESET: &str = "\x1b[0m";

pub fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Nominal => GREEN,
        Severity::Warning => ORANGE,
        Severity::Critical => RED,
    }
}

/// 状态块的进度上下文
pub struct StatusContext {
    pub reading_count: u64,
    /// 监控模式下无上限
    pub total_readings: Option<u64>,
    pub run_number: u32,
    pub total_tests: u32,
    /// 当前轮剩余加上后续各轮的预计总时长，监控模式下为 None
    pub time_remaining: Option<Duration>,
    pub monitor_mode: bool,
}

/// 打印一块当前状态：进度头 + 带配色的指标行
pub fn print_status(
    sample: &TelemetrySample,
    report: &SafetyReport,
    aggregate: &SampleAggregate,
    ctx: &StatusContext,
) {
    let clock = Local::now().format("%H:%M:%S");
    if ctx.monitor_mode {
        println!(
            "{}Status [{}] Monitor Mode ({}/∞){}",
            GREEN, clock, ctx.reading_count, RESET
        );
    } else {
        let remaining = ctx.time_remaining.unwrap_or_default().as_secs();
        let hours = remaining / 3600;
        let minutes = (remaining % 3600) / 60;
        println!(
            "{}Status [{}] Test {}/{} ({}/{}) Est. Time Remaining: {}h {}m{}",
            GREEN,
            clock,
            ctx.run_number,
            ctx.total_tests,
            ctx.reading_count,
            ctx.total_readings.unwrap_or(0),
            hours,
            minutes,
            RESET
        );
    }

    let metrics: [(&str, f64, &crate::stats::MetricAggregate, &str, &str); 5] = [
        ("Hashrate", sample.hashrate_ghs, &aggregate.hashrate, "GH/s", GREEN),
        ("J/TH", sample.efficiency_j_th, &aggregate.efficiency, "J/TH", GREEN),
        (
            "Temp",
            sample.chip_temp_c,
            &aggregate.chip_temp,
            "°C",
            severity_color(report.chip_temp),
        ),
        (
            "VR Temp",
            sample.vr_temp_c,
            &aggregate.vr_temp,
            "°C",
            severity_color(report.vr_temp),
        ),
        (
            "Power",
            sample.power_w,
            &aggregate.power,
            "W",
            severity_color(report.power),
        ),
    ];
    for (label, value, metric, unit, color) in metrics {
        println!(
            "{}: {}{:.2}{} {} (Min: {:.2}, Max: {:.2}, Avg: {:.2})",
            label,
            color,
            value,
            RESET,
            unit,
            metric.min,
            metric.max,
            metric.avg()
        );
    }
    println!("Frequency: {} MHz", sample.frequency_mhz);
    println!("Core Voltage: {} mV", sample.core_voltage_set_mv);
    println!("{}", "-".repeat(40));
}

/// 全局汇总文本，既打印到控制台也追加到汇总文件
pub fn global_summary_lines(
    global: &SampleAggregate,
    best: Option<&BestResult>,
) -> Vec<String> {
    let mut lines = Vec::new();
    lines.push("=== Global Summary ===".to_string());
    lines.push("Min Values:".to_string());
    for (name, unit, metric) in global.rows() {
        lines.push(format!("{}: {:.2}{}", capitalize(name), metric.min, unit));
    }
    lines.push(String::new());
    lines.push("Max Values:".to_string());
    for (name, unit, metric) in global.rows() {
        lines.push(format!("{}: {:.2}{}", capitalize(name), metric.max, unit));
    }
    if let Some(best) = best {
        lines.push(String::new());
        lines.push(format!(
            "Best Average Hashrate: {:.2} GH/s at {} MHz, {} mV",
            best.hashrate_ghs, best.frequency_mhz, best.voltage_mv
        ));
    }
    lines
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
