use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

#[derive(Parser, Debug)]
#[command(author, version, about = "Bitaxe status logger for monitoring hashrate, temperature, and power across a frequency range or in monitor-only mode.", long_about = None)]
pub struct Args {
    /// Core voltage in mV (minimum 1000 mV)
    #[arg(short = 'v', long)]
    pub voltage: u32,

    /// Initial frequency in MHz (minimum 400 MHz)
    #[arg(short = 'f', long)]
    pub frequency: u32,

    /// Bitaxe IP address (e.g. 192.168.2.205)
    #[arg(long = "ip")]
    pub ip_address: String,

    /// Frequency range in MHz to test above and below the initial frequency (ignored in monitor mode)
    #[arg(long, default_value = "10")]
    pub range: u32,

    /// Frequency step size in MHz
    #[arg(long, default_value = "2")]
    pub step: u32,

    /// Number of consecutive identical hashrate readings to trigger a reboot
    #[arg(long)]
    pub reboot: Option<u32>,

    /// Run in monitor-only mode at the specified settings indefinitely
    #[arg(short = 'm', long)]
    pub monitor: bool,

    /// Path to a CSV of known good voltage/frequency pairs (monitor mode only)
    #[arg(long)]
    pub values: Option<PathBuf>,

    /// Optional TOML file overriding thresholds and timing
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Args {
    /// CLI 层面的数值约束，在任何设备交互前失败
    pub fn validate(&self, config: &Config) -> Result<(), ConfigError> {
        if self.voltage < config.limits.min_core_voltage {
            return Err(ConfigError::InvalidValue {
                field: "voltage".to_string(),
                value: self.voltage.to_string(),
                reason: format!("must be at least {} mV", config.limits.min_core_voltage),
            });
        }
        if self.frequency < config.limits.min_frequency {
            return Err(ConfigError::InvalidValue {
                field: "frequency".to_string(),
                value: self.frequency.to_string(),
                reason: format!("must be at least {} MHz", config.limits.min_frequency),
            });
        }
        if self.step == 0 {
            return Err(ConfigError::InvalidValue {
                field: "step".to_string(),
                value: self.step.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if let Some(reboot) = self.reboot {
            if reboot == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "reboot".to_string(),
                    value: reboot.to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }
        if self.values.is_some() && !self.monitor {
            return Err(ConfigError::ValidationError {
                field: "values".to_string(),
                reason: "only valid in monitor mode (-m)".to_string(),
            });
        }
        Ok(())
    }
}

/// 校验点分四段 IP 并扩展为 http 基地址
pub fn validate_ip(ip: &str) -> Result<String, ConfigError> {
    let octets: Vec<&str> = ip.split('.').collect();
    let well_formed = octets.len() == 4
        && octets
            .iter()
            .all(|o| !o.is_empty() && o.len() <= 3 && o.chars().all(|c| c.is_ascii_digit()));
    if !well_formed {
        return Err(ConfigError::InvalidValue {
            field: "ip_address".to_string(),
            value: ip.to_string(),
            reason: "invalid IP address format, use format like 192.168.2.205".to_string(),
        });
    }
    Ok(format!("http://{}", ip))
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub thresholds: ThresholdConfig,
    pub timing: TimingConfig,
    pub limits: LimitConfig,
    pub tuning: TuningConfig,
}

/// 安全阈值，温度单位 °C，功耗单位 W
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub temp_warning: f64,
    pub temp_critical: f64,
    pub vr_temp_warning: f64,
    pub vr_temp_critical: f64,
    pub power_warning: f64,
    pub power_critical: f64,
    /// 所有指标需低于临界值至少此裕量才允许进阶
    pub advance_margin: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            temp_warning: 62.0,
            temp_critical: 65.0,
            vr_temp_warning: 80.0,
            vr_temp_critical: 85.0,
            power_warning: 23.0,
            power_critical: 26.0,
            advance_margin: 2.0,
        }
    }
}

/// 时间参数，全部以秒计
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// 每轮测试时长
    pub run_duration: u64,
    /// 读数写入 CSV 的间隔
    pub log_interval: u64,
    /// 轮询与状态显示间隔
    pub status_interval: u64,
    /// 单次 HTTP 请求超时
    pub fetch_timeout: u64,
    /// 写入设置后的稳定等待
    pub settle_delay: u64,
    /// 重启后的稳定等待
    pub reboot_delay: u64,
    /// 读取失败后的重试退避
    pub retry_backoff: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            run_duration: 600,
            log_interval: 10,
            status_interval: 10,
            fetch_timeout: 10,
            settle_delay: 5,
            reboot_delay: 30,
            retry_backoff: 10,
        }
    }
}

/// 安全下限，任何写入前都会被钳制到不低于这些值
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitConfig {
    pub min_frequency: u32,
    pub min_core_voltage: u32,
}

impl Default for LimitConfig {
    fn default() -> Self {
        Self {
            min_frequency: 400,
            min_core_voltage: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    /// 两次调整之间至少要有的连续读数
    pub readings_to_advance: u32,
    /// 临界回退后阻止再进阶的冷却窗口（秒）
    pub advance_delay: u64,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            readings_to_advance: 5,
            advance_delay: 7200,
        }
    }
}

impl Config {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.thresholds.temp_warning >= self.thresholds.temp_critical {
            anyhow::bail!("temp_warning must be below temp_critical");
        }
        if self.thresholds.vr_temp_warning >= self.thresholds.vr_temp_critical {
            anyhow::bail!("vr_temp_warning must be below vr_temp_critical");
        }
        if self.thresholds.power_warning >= self.thresholds.power_critical {
            anyhow::bail!("power_warning must be below power_critical");
        }
        if self.thresholds.advance_margin < 0.0 {
            anyhow::bail!("advance_margin must be non-negative");
        }
        if self.timing.fetch_timeout == 0 {
            anyhow::bail!("fetch_timeout must be greater than 0");
        }
        if self.limits.min_frequency == 0 || self.limits.min_core_voltage == 0 {
            anyhow::bail!("safety minima must be greater than 0");
        }
        Ok(())
    }
}
