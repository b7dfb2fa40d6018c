pub mod client;

pub use client::BitaxeClient;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::DeviceError;

/// 一次轮询得到的遥测样本，取回后不可变
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySample {
    pub frequency_mhz: u32,
    pub power_w: f64,
    pub voltage_mv: f64,
    pub current_ma: f64,
    pub chip_temp_c: f64,
    pub vr_temp_c: f64,
    pub hashrate_ghs: f64,
    pub core_voltage_set_mv: u32,
    pub core_voltage_actual_mv: u32,
    /// 派生指标：J/TH，算力为 0 时为 0
    pub efficiency_j_th: f64,
}

impl TelemetrySample {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        frequency_mhz: u32,
        power_w: f64,
        voltage_mv: f64,
        current_ma: f64,
        chip_temp_c: f64,
        vr_temp_c: f64,
        hashrate_ghs: f64,
        core_voltage_set_mv: u32,
        core_voltage_actual_mv: u32,
    ) -> Self {
        let efficiency_j_th = if hashrate_ghs > 0.0 {
            power_w / (hashrate_ghs / 1000.0)
        } else {
            0.0
        };
        Self {
            frequency_mhz,
            power_w,
            voltage_mv,
            current_ma,
            chip_temp_c,
            vr_temp_c,
            hashrate_ghs,
            core_voltage_set_mv,
            core_voltage_actual_mv,
            efficiency_j_th,
        }
    }
}

/// `GET /api/system/info` 的应答。设备在瞬态期间可能缺字段，
/// 缺失的数值按设备默认值补齐而不是报错。
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SystemInfoResponse {
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    #[serde(default)]
    pub power: f64,
    #[serde(default)]
    pub voltage: f64,
    #[serde(default)]
    pub current: f64,
    #[serde(default)]
    pub temp: f64,
    #[serde(default)]
    pub vr_temp: f64,
    #[serde(default)]
    pub hash_rate: f64,
    #[serde(default = "default_core_voltage")]
    pub core_voltage: u32,
    #[serde(default = "default_core_voltage")]
    pub core_voltage_actual: u32,
}

fn default_frequency() -> u32 {
    550
}

fn default_core_voltage() -> u32 {
    1250
}

impl SystemInfoResponse {
    pub(crate) fn into_sample(self) -> TelemetrySample {
        TelemetrySample::new(
            self.frequency,
            self.power,
            self.voltage,
            self.current,
            self.temp,
            self.vr_temp,
            self.hash_rate,
            self.core_voltage,
            self.core_voltage_actual,
        )
    }
}

/// 设备 API 特征，运行控制器通过它与设备交互
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// 读取设备状态
    async fn fetch_status(&self) -> Result<TelemetrySample, DeviceError>;

    /// 应用频率与核心电压，写入后回读校验
    async fn apply_settings(
        &self,
        frequency_mhz: u32,
        core_voltage_mv: u32,
    ) -> Result<(), DeviceError>;

    /// 重启设备，调用方负责等待稳定
    async fn reboot(&self) -> Result<(), DeviceError>;
}
