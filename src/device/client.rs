use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::{DeviceApi, SystemInfoResponse, TelemetrySample};
use crate::config::{Config, LimitConfig};
use crate::error::DeviceError;

/// 写入后允许的回读偏差
const VERIFY_TOLERANCE: i64 = 1;

/// Bitaxe HTTP API 客户端
pub struct BitaxeClient {
    http: reqwest::Client,
    base_url: String,
    limits: LimitConfig,
    settle_delay: Duration,
}

impl BitaxeClient {
    pub fn new(base_url: String, config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timing.fetch_timeout))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            limits: config.limits.clone(),
            settle_delay: Duration::from_secs(config.timing.settle_delay),
        })
    }

    async fn read_info(&self) -> Result<SystemInfoResponse, DeviceError> {
        let response = self
            .http
            .get(format!("{}/api/system/info", self.base_url))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DeviceError::Transient {
                error: e.to_string(),
            })?;

        response
            .json::<SystemInfoResponse>()
            .await
            .map_err(|e| DeviceError::Transient {
                error: e.to_string(),
            })
    }
}

#[async_trait]
impl DeviceApi for BitaxeClient {
    async fn fetch_status(&self) -> Result<TelemetrySample, DeviceError> {
        Ok(self.read_info().await?.into_sample())
    }

    async fn apply_settings(
        &self,
        frequency_mhz: u32,
        core_voltage_mv: u32,
    ) -> Result<(), DeviceError> {
        // 写入前钳制到安全下限
        let frequency = frequency_mhz.max(self.limits.min_frequency);
        let voltage = core_voltage_mv.max(self.limits.min_core_voltage);

        let payload = serde_json::json!({ "frequency": frequency, "coreVoltage": voltage });
        debug!(
            "Sending PATCH request to {}/api/system with payload: {}",
            self.base_url, payload
        );

        self.http
            .patch(format!("{}/api/system", self.base_url))
            .json(&payload)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DeviceError::ApplyFailed {
                error: e.to_string(),
            })?;

        info!(
            "Set frequency to {} MHz, core voltage to {} mV",
            frequency, voltage
        );

        // 等待设置稳定后回读校验
        tokio::time::sleep(self.settle_delay).await;

        let actual = self
            .read_info()
            .await
            .map_err(|e| DeviceError::VerifyFailed {
                error: e.to_string(),
            })?;

        if !within_tolerance(frequency, actual.frequency)
            || !within_tolerance(voltage, actual.core_voltage)
        {
            return Err(DeviceError::VerifyMismatch {
                requested_frequency: frequency,
                requested_voltage: voltage,
                actual_frequency: actual.frequency,
                actual_voltage: actual.core_voltage,
            });
        }

        info!(
            "Verified settings: actual frequency {} MHz, actual core voltage {} mV",
            actual.frequency, actual.core_voltage
        );
        Ok(())
    }

    async fn reboot(&self) -> Result<(), DeviceError> {
        self.http
            .post(format!("{}/api/system/restart", self.base_url))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DeviceError::RebootFailed {
                error: e.to_string(),
            })?;

        info!("Device rebooted successfully.");
        Ok(())
    }
}

fn within_tolerance(requested: u32, actual: u32) -> bool {
    (actual as i64 - requested as i64).abs() <= VERIFY_TOLERANCE
}
