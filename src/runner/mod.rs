use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::device::{DeviceApi, TelemetrySample};
use crate::error::AxetuneError;
use crate::output::csv_log::TIMESTAMP_FORMAT;
use crate::output::{display, ReadingsLog, StatusContext, SummaryLog};
use crate::safety;
use crate::stats::{BestResult, SampleAggregate};
use crate::tuning::{Adjustment, AdjustmentStrategy, OperatingPoint};

/// 协作式停止令牌，只在循环边界被检查，不抢占进行中的请求
#[derive(Debug, Clone, Default)]
pub struct ShutdownToken(Arc<AtomicBool>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// 单轮的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// 时间预算正常耗尽
    Completed,
    /// 操作员请求停止
    Interrupted,
    /// 初始设置失败，本轮被跳过
    Skipped,
    /// 临界条件触发紧急停机，终止整个会话
    CriticalStop,
}

/// 一次调优会话的选项
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub initial: OperatingPoint,
    pub range_mhz: u32,
    pub step_mhz: u32,
    pub monitor_mode: bool,
    pub reboot_threshold: Option<u32>,
    pub output_dir: PathBuf,
}

/// 扫描计划：初始频率上下 range 内按 step 递增的全部频点
pub fn sweep_frequencies(initial_mhz: u32, range_mhz: u32, step_mhz: u32) -> Vec<u32> {
    let start = initial_mhz as i64 - range_mhz as i64;
    let end = initial_mhz as i64 + range_mhz as i64;
    let step = step_mhz.max(1) as i64;

    let mut frequencies = Vec::new();
    let mut frequency = start;
    while frequency <= end {
        frequencies.push(frequency.max(0) as u32);
        frequency += step;
    }
    frequencies
}

/// 运行控制器：驱动会话内的每一轮监控，
/// 串联遥测客户端、安全评估器与工作点选择器
pub struct RunController<D: DeviceApi> {
    device: D,
    config: Config,
    strategy: AdjustmentStrategy,
    shutdown: ShutdownToken,
    opts: SessionOptions,
    /// 进程生命周期的全局聚合，从不重置
    global: SampleAggregate,
    best: Option<BestResult>,
    readings_log: ReadingsLog,
    summary_log: SummaryLog,
}

impl<D: DeviceApi> RunController<D> {
    pub fn new(
        device: D,
        config: Config,
        strategy: AdjustmentStrategy,
        shutdown: ShutdownToken,
        opts: SessionOptions,
    ) -> Self {
        let timestamp = chrono::Local::now().format(TIMESTAMP_FORMAT).to_string();
        let readings_log = ReadingsLog::in_dir(
            &opts.output_dir,
            opts.initial.voltage_mv,
            opts.initial.frequency_mhz,
            &timestamp,
        );
        let summary_log = SummaryLog::in_dir(
            &opts.output_dir,
            opts.initial.voltage_mv,
            opts.initial.frequency_mhz,
            &timestamp,
        );

        Self {
            device,
            config,
            strategy,
            shutdown,
            opts,
            global: SampleAggregate::default(),
            best: None,
            readings_log,
            summary_log,
        }
    }

    pub fn best(&self) -> Option<BestResult> {
        self.best
    }

    pub fn global(&self) -> &SampleAggregate {
        &self.global
    }

    /// 驱动一次完整会话：扫描一段频率范围，或在监控模式下无限期运行
    pub async fn run_session(&mut self) -> Result<(), AxetuneError> {
        let initial = self.opts.initial;
        let start_frequency = if self.opts.monitor_mode {
            initial.frequency_mhz
        } else {
            initial.frequency_mhz.saturating_sub(self.opts.range_mhz)
        };

        info!(
            "Requested initial settings: {} MHz, {} mV",
            start_frequency, initial.voltage_mv
        );
        if let Err(e) = self
            .device
            .apply_settings(start_frequency, initial.voltage_mv)
            .await
        {
            error!("Failed to set initial settings. Exiting.");
            return Err(e.into());
        }
        info!(
            "Initial settings applied: {} MHz, {} mV",
            start_frequency, initial.voltage_mv
        );

        let mut critical_stop = false;

        if self.opts.monitor_mode {
            info!(
                "Monitoring at {} MHz indefinitely",
                initial.frequency_mhz
            );
            if self.strategy.is_table() {
                info!("Using operating point table for dynamic adjustments");
            }
            let outcome = self.run_once(initial, 1, 1).await;
            critical_stop = outcome == RunOutcome::CriticalStop;
        } else {
            let frequencies =
                sweep_frequencies(initial.frequency_mhz, self.opts.range_mhz, self.opts.step_mhz);
            let total_tests = frequencies.len() as u32;
            info!(
                "Testing from {} MHz to {} MHz with step {} MHz",
                frequencies.first().copied().unwrap_or(start_frequency),
                frequencies.last().copied().unwrap_or(start_frequency),
                self.opts.step_mhz
            );

            for (index, &frequency_mhz) in frequencies.iter().enumerate() {
                let point = OperatingPoint {
                    voltage_mv: initial.voltage_mv,
                    frequency_mhz,
                };
                let outcome = self.run_once(point, (index + 1) as u32, total_tests).await;
                match outcome {
                    RunOutcome::CriticalStop => {
                        critical_stop = true;
                        break;
                    }
                    RunOutcome::Interrupted => break,
                    RunOutcome::Completed | RunOutcome::Skipped => {}
                }
                if self.shutdown.is_triggered() {
                    break;
                }
            }
        }

        if !self.opts.monitor_mode {
            // 紧急停机路径已经恢复过设置
            if !critical_stop {
                self.restore_final_settings().await;
            }
            let lines = display::global_summary_lines(&self.global, self.best.as_ref());
            for line in &lines {
                println!("{}{}{}", display::GREEN, line, display::RESET);
            }
            if let Err(e) = self.summary_log.append_lines(&lines) {
                error!("Error logging global summary to summaries file: {}", e);
            }
            info!("Readings: {}", self.readings_log.path().display());
            info!("Summaries: {}", self.summary_log.path().display());
        } else {
            info!(
                "Monitor mode terminated. Readings: {}",
                self.readings_log.path().display()
            );
        }

        Ok(())
    }

    /// 在指定工作点运行一轮：有界（非监控）或无限期（监控）
    async fn run_once(
        &mut self,
        mut point: OperatingPoint,
        run_number: u32,
        total_tests: u32,
    ) -> RunOutcome {
        if let Err(e) = self
            .device
            .apply_settings(point.frequency_mhz, point.voltage_mv)
            .await
        {
            error!(
                "Skipping run {} at {} MHz, {} mV: {}",
                run_number, point.frequency_mhz, point.voltage_mv, e
            );
            return RunOutcome::Skipped;
        }

        let timing = self.config.timing.clone();
        let run_duration = Duration::from_secs(timing.run_duration);
        let status_interval = Duration::from_secs(timing.status_interval);
        let log_interval = Duration::from_secs(timing.log_interval);
        let total_readings = if self.opts.monitor_mode {
            None
        } else {
            Some(timing.run_duration / timing.status_interval.max(1))
        };

        if self.opts.monitor_mode {
            info!(
                "Run {}: {} MHz, {} mV indefinitely",
                run_number, point.frequency_mhz, point.voltage_mv
            );
        } else {
            info!(
                "Run {}: {} MHz, {} mV for {}s",
                run_number, point.frequency_mhz, point.voltage_mv, timing.run_duration
            );
        }

        let started = Instant::now();
        let mut last_log = Instant::now();
        let mut run_aggregate = SampleAggregate::default();
        let mut reading_count: u64 = 0;
        let mut readings_since_adjustment: u32 = 0;
        let mut last_hashrate: Option<f64> = None;
        let mut identical_count: u32 = 0;

        while (self.opts.monitor_mode || started.elapsed() < run_duration)
            && !self.shutdown.is_triggered()
        {
            let sample = match self.device.fetch_status().await {
                Ok(sample) => sample,
                Err(e) => {
                    error!("Error fetching system info: {}", e);
                    warn!("Retrying in {}s...", timing.retry_backoff);
                    sleep(Duration::from_secs(timing.retry_backoff)).await;
                    continue;
                }
            };

            reading_count += 1;
            run_aggregate.update(&sample);
            self.global.update(&sample);

            // 可选的算力卡死检测：连续相同读数达到阈值即重启设备
            if let Some(threshold) = self.opts.reboot_threshold {
                if last_hashrate == Some(sample.hashrate_ghs) {
                    identical_count += 1;
                    if identical_count >= threshold {
                        warn!(
                            "Detected {} identical hashrate readings ({:.2} GH/s). Rebooting device...",
                            identical_count, sample.hashrate_ghs
                        );
                        let note = format!(
                            "Rebooted due to {} identical hashrate readings",
                            identical_count
                        );
                        if let Err(e) = self.readings_log.append(&sample, &note) {
                            error!("Error logging readings data: {}", e);
                        }
                        match self.device.reboot().await {
                            Ok(()) => {
                                sleep(Duration::from_secs(timing.reboot_delay)).await;
                                identical_count = 0;
                                last_hashrate = None;
                            }
                            Err(e) => error!("{}. Continuing run...", e),
                        }
                    }
                } else {
                    identical_count = 1;
                    last_hashrate = Some(sample.hashrate_ghs);
                }
            }

            let report = safety::evaluate(&sample, &self.config.thresholds);

            // 表驱动模式要求距上次调整有足够读数才咨询选择器；
            // 扫描模式的临界防护每个读数都检查
            let consult = if self.strategy.is_table() {
                readings_since_adjustment >= self.config.tuning.readings_to_advance
            } else {
                true
            };
            let decision = if consult {
                self.strategy.decide(point, &report, Instant::now())
            } else {
                Adjustment::Hold
            };

            let mut settings_changed = false;
            match decision {
                Adjustment::Hold => {}
                Adjustment::AtFloor => {
                    error!("Critical condition hit but already at lowest settings.");
                }
                Adjustment::CoolingDown { remaining } => {
                    warn!(
                        "Advance delayed: {} minutes remaining before advancing to a higher voltage.",
                        remaining.as_secs() / 60
                    );
                }
                Adjustment::Advance(next) | Adjustment::FallBack(next) => {
                    if matches!(decision, Adjustment::FallBack(_)) {
                        error!(
                            "Critical {} (Temp: {:.2}°C, VR Temp: {:.2}°C, Power: {:.2} W). Dropping to {} MHz, {} mV.",
                            report.critical_reason().unwrap_or("condition"),
                            sample.chip_temp_c,
                            sample.vr_temp_c,
                            sample.power_w,
                            next.frequency_mhz,
                            next.voltage_mv
                        );
                    } else {
                        info!(
                            "All metrics safe (Temp: {:.2}°C, VR Temp: {:.2}°C, Power: {:.2} W). Increasing to {} MHz, {} mV.",
                            sample.chip_temp_c,
                            sample.vr_temp_c,
                            sample.power_w,
                            next.frequency_mhz,
                            next.voltage_mv
                        );
                    }
                    match self
                        .device
                        .apply_settings(next.frequency_mhz, next.voltage_mv)
                        .await
                    {
                        Ok(()) => {
                            point = next;
                            settings_changed = true;
                            readings_since_adjustment = 0;
                            let note = format!(
                                "Adjusted to {} MHz, {} mV",
                                next.frequency_mhz, next.voltage_mv
                            );
                            if let Err(e) = self.readings_log.append(&sample, &note) {
                                error!("Error logging readings data: {}", e);
                            }
                        }
                        Err(e) => {
                            error!(
                                "Failed to adjust settings to {} MHz, {} mV: {}. Continuing with current settings.",
                                next.frequency_mhz, next.voltage_mv, e
                            );
                        }
                    }
                }
                Adjustment::EmergencyStop(reduced) => {
                    let reason = report.critical_reason().unwrap_or("critical condition");
                    error!(
                        "Critical {} (Temp: {:.2}°C, VR Temp: {:.2}°C, Power: {:.2} W). Reducing to {} MHz, {} mV and stopping test.",
                        reason,
                        sample.chip_temp_c,
                        sample.vr_temp_c,
                        sample.power_w,
                        reduced.frequency_mhz,
                        reduced.voltage_mv
                    );
                    if let Err(e) = self
                        .device
                        .apply_settings(reduced.frequency_mhz, reduced.voltage_mv)
                        .await
                    {
                        error!("Failed to apply emergency settings: {}", e);
                    }
                    let note = format!("Reduced and stopped due to {}", reason);
                    if let Err(e) = self.readings_log.append(&sample, &note) {
                        error!("Error logging readings data: {}", e);
                    }
                    if !self.opts.monitor_mode && run_aggregate.reading_count() > 0 {
                        BestResult::challenge(
                            &mut self.best,
                            run_aggregate.hashrate.avg(),
                            point.frequency_mhz,
                            point.voltage_mv,
                        );
                        if let Err(e) =
                            self.summary_log.append_run(run_number, point, &run_aggregate)
                        {
                            error!("Error logging summaries data: {}", e);
                        }
                    }
                    self.restore_final_settings().await;
                    return RunOutcome::CriticalStop;
                }
            }

            readings_since_adjustment += 1;

            if last_log.elapsed() >= log_interval {
                if let Err(e) = self.readings_log.append(&sample, "") {
                    error!("Error logging readings data: {}", e);
                }
                last_log = Instant::now();
            }

            // 调整生效的这一拍跳过状态显示
            if !settings_changed {
                let time_remaining = if self.opts.monitor_mode {
                    None
                } else {
                    let remaining_tests = total_tests.saturating_sub(run_number);
                    Some(
                        run_duration.saturating_sub(started.elapsed())
                            + run_duration * remaining_tests,
                    )
                };
                display::print_status(
                    &sample,
                    &report,
                    &run_aggregate,
                    &StatusContext {
                        reading_count,
                        total_readings,
                        run_number,
                        total_tests,
                        time_remaining,
                        monitor_mode: self.opts.monitor_mode,
                    },
                );
            }

            if self.shutdown.is_triggered() {
                break;
            }
            sleep(status_interval).await;
        }

        let outcome = if self.shutdown.is_triggered() {
            RunOutcome::Interrupted
        } else {
            RunOutcome::Completed
        };

        // 监控模式不产生每轮汇总
        if !self.opts.monitor_mode && run_aggregate.reading_count() > 0 {
            BestResult::challenge(
                &mut self.best,
                run_aggregate.hashrate.avg(),
                point.frequency_mhz,
                point.voltage_mv,
            );
            if let Err(e) = self.summary_log.append_run(run_number, point, &run_aggregate) {
                error!("Error logging summaries data: {}", e);
            }
        }

        outcome
    }

    /// 会话收尾：恢复最佳算力设置，没有有效轮次时回到初始设置
    async fn restore_final_settings(&self) {
        if !self.opts.monitor_mode {
            if let Some(best) = self.best {
                info!(
                    "Setting system to best hashrate settings: {} MHz, {} mV",
                    best.frequency_mhz, best.voltage_mv
                );
                if let Err(e) = self
                    .device
                    .apply_settings(best.frequency_mhz, best.voltage_mv)
                    .await
                {
                    error!(
                        "Failed to set best hashrate settings: {}. Reverting to initial settings.",
                        e
                    );
                    if let Err(e) = self
                        .device
                        .apply_settings(self.opts.initial.frequency_mhz, self.opts.initial.voltage_mv)
                        .await
                    {
                        error!("Failed to restore initial settings: {}", e);
                    }
                }
                return;
            }
        }
        warn!("No valid runs completed or in monitor mode. Setting to initial settings.");
        if let Err(e) = self
            .device
            .apply_settings(self.opts.initial.frequency_mhz, self.opts.initial.voltage_mv)
            .await
        {
            error!("Failed to restore initial settings: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_frequencies_inclusive_range() {
        assert_eq!(sweep_frequencies(500, 10, 5), vec![490, 495, 500, 505, 510]);
        assert_eq!(sweep_frequencies(500, 10, 2).len(), 11);
        // range 0 只测初始频率
        assert_eq!(sweep_frequencies(500, 0, 2), vec![500]);
        // 步长大于范围时覆盖两端
        assert_eq!(sweep_frequencies(500, 3, 10), vec![497]);
    }

    #[test]
    fn test_sweep_frequencies_never_negative() {
        let frequencies = sweep_frequencies(410, 500, 100);
        assert!(frequencies.iter().all(|&f| f <= 910));
        assert_eq!(frequencies[0], 0);
    }

    #[test]
    fn test_shutdown_token() {
        let token = ShutdownToken::new();
        assert!(!token.is_triggered());
        let clone = token.clone();
        clone.trigger();
        assert!(token.is_triggered());
    }
}
