use async_trait::async_trait;
use mockall::mock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axetune_rs::config::Config;
use axetune_rs::device::{DeviceApi, TelemetrySample};
use axetune_rs::error::DeviceError;
use axetune_rs::runner::{RunController, SessionOptions, ShutdownToken};
use axetune_rs::tuning::{AdjustmentStrategy, OperatingPoint, OperatingPointTable};

mock! {
    pub Device {}

    #[async_trait]
    impl DeviceApi for Device {
        async fn fetch_status(&self) -> Result<TelemetrySample, DeviceError>;
        async fn apply_settings(
            &self,
            frequency_mhz: u32,
            core_voltage_mv: u32,
        ) -> Result<(), DeviceError>;
        async fn reboot(&self) -> Result<(), DeviceError>;
    }
}

/// 压缩全部等待时间，让一轮只收一个读数
fn fast_config() -> Config {
    let mut config = Config::default();
    config.timing.run_duration = 1;
    config.timing.status_interval = 1;
    config.timing.log_interval = 0;
    config.timing.retry_backoff = 0;
    config.timing.reboot_delay = 0;
    config.timing.settle_delay = 0;
    config
}

fn safe_sample(hashrate_ghs: f64) -> TelemetrySample {
    TelemetrySample::new(500, 20.0, 5080.0, 4200.0, 55.0, 70.0, hashrate_ghs, 1200, 1198)
}

fn hot_sample() -> TelemetrySample {
    TelemetrySample::new(500, 20.0, 5080.0, 4200.0, 70.0, 70.0, 1000.0, 1200, 1198)
}

fn fresh_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("axetune_it_{}", name));
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).expect("Failed to create test dir");
    dir
}

fn find_file(dir: &Path, fragment: &str) -> Option<PathBuf> {
    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.contains(fragment))
        })
}

fn record_applies(device: &mut MockDevice) -> Arc<Mutex<Vec<(u32, u32)>>> {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorder = calls.clone();
    device.expect_apply_settings().returning(move |f, v| {
        recorder.lock().unwrap().push((f, v));
        Ok(())
    });
    calls
}

fn options(dir: &Path, monitor: bool, range: u32, step: u32) -> SessionOptions {
    SessionOptions {
        initial: OperatingPoint {
            voltage_mv: 1200,
            frequency_mhz: 500,
        },
        range_mhz: range,
        step_mhz: step,
        monitor_mode: monitor,
        reboot_threshold: None,
        output_dir: dir.to_path_buf(),
    }
}

/// 有界扫描会话：逐轮计数读数，结束时恢复平均算力最高一轮的设置
#[tokio::test]
async fn test_sweep_session_selects_best_run() {
    let dir = fresh_dir("sweep_best");
    let config = fast_config();

    let mut device = MockDevice::new();
    let applies = record_applies(&mut device);

    // 三轮各返回一个样本，中间一轮算力最高
    let counter = Arc::new(AtomicUsize::new(0));
    device.expect_fetch_status().returning(move || {
        let index = counter.fetch_add(1, Ordering::SeqCst);
        let hashrate = [1200.0, 1500.0, 1300.0][index.min(2)];
        Ok(safe_sample(hashrate))
    });

    let strategy = AdjustmentStrategy::sweep(&config);
    let opts = options(&dir, false, 2, 2);
    let mut controller =
        RunController::new(device, config, strategy, ShutdownToken::new(), opts);
    controller.run_session().await.expect("Session failed");

    let best = controller.best().expect("No best result recorded");
    assert_eq!(best.frequency_mhz, 500);
    assert_eq!(best.voltage_mv, 1200);
    assert_eq!(best.hashrate_ghs, 1500.0);
    assert_eq!(controller.global().reading_count(), 3);

    // 初始设置 + 三轮各一次 + 结束时恢复最佳
    let applies = applies.lock().unwrap();
    assert_eq!(
        applies.as_slice(),
        &[
            (498, 1200),
            (498, 1200),
            (500, 1200),
            (502, 1200),
            (500, 1200)
        ]
    );

    let summary = find_file(&dir, "summaries").expect("No summary file written");
    let content = std::fs::read_to_string(summary).unwrap();
    assert!(content.contains("Run 1 Summary: Frequency 498 MHz"));
    assert!(content.contains("Run 2 Summary: Frequency 500 MHz"));
    assert!(content.contains("Run 3 Summary: Frequency 502 MHz"));
    assert!(content.contains("=== Global Summary ==="));
    assert!(content.contains("Best Average Hashrate: 1500.00 GH/s at 500 MHz, 1200 mV"));

    std::fs::remove_dir_all(&dir).ok();
}

/// 扫描模式下临界触发一次性降档、写汇总并恢复最佳设置，会话终止
#[tokio::test]
async fn test_sweep_critical_stop_restores_settings() {
    let dir = fresh_dir("critical_stop");
    let config = fast_config();

    let mut device = MockDevice::new();
    let applies = record_applies(&mut device);
    device
        .expect_fetch_status()
        .times(1)
        .returning(|| Ok(hot_sample()));

    let strategy = AdjustmentStrategy::sweep(&config);
    let opts = options(&dir, false, 0, 2);
    let mut controller =
        RunController::new(device, config, strategy, ShutdownToken::new(), opts);
    controller.run_session().await.expect("Session failed");

    // 初始 + 本轮 + 紧急降档 + 恢复最佳（本轮平均值即最佳）
    let applies = applies.lock().unwrap();
    assert_eq!(
        applies.as_slice(),
        &[(500, 1200), (500, 1200), (490, 1190), (500, 1200)]
    );

    let readings = find_file(&dir, "readings").expect("No readings file written");
    let content = std::fs::read_to_string(readings).unwrap();
    assert!(content.contains("Reduced and stopped due to critical temperature"));

    let summary = find_file(&dir, "summaries").expect("No summary file written");
    let content = std::fs::read_to_string(summary).unwrap();
    assert!(content.contains("Run 1 Summary"));

    std::fs::remove_dir_all(&dir).ok();
}

/// 监控模式只产生读数日志，不产生每轮汇总文件
#[tokio::test]
async fn test_monitor_mode_writes_no_summary() {
    let dir = fresh_dir("monitor_no_summary");
    let config = fast_config();

    let mut device = MockDevice::new();
    let applies = record_applies(&mut device);

    let shutdown = ShutdownToken::new();
    let trigger = shutdown.clone();
    device.expect_fetch_status().returning(move || {
        // 第一个读数后请求停止
        trigger.trigger();
        Ok(safe_sample(1000.0))
    });

    let strategy = AdjustmentStrategy::sweep(&config);
    let opts = options(&dir, true, 10, 2);
    let mut controller = RunController::new(device, config, strategy, shutdown, opts);
    controller.run_session().await.expect("Session failed");

    assert_eq!(controller.global().reading_count(), 1);
    assert_eq!(applies.lock().unwrap().len(), 2);
    assert!(find_file(&dir, "readings").is_some());
    assert!(find_file(&dir, "summaries").is_none());

    std::fs::remove_dir_all(&dir).ok();
}

/// 表驱动模式：攒够读数后咨询选择器并进阶到下一档
#[tokio::test]
async fn test_table_mode_advances_after_enough_readings() {
    let dir = fresh_dir("table_advance");
    let mut config = fast_config();
    config.tuning.readings_to_advance = 1;

    let mut device = MockDevice::new();
    let applies = record_applies(&mut device);

    let shutdown = ShutdownToken::new();
    let trigger = shutdown.clone();
    let counter = Arc::new(AtomicUsize::new(0));
    device.expect_fetch_status().returning(move || {
        if counter.fetch_add(1, Ordering::SeqCst) >= 2 {
            trigger.trigger();
        }
        Ok(safe_sample(1400.0))
    });

    let table = OperatingPointTable::from_points(vec![
        OperatingPoint {
            voltage_mv: 1200,
            frequency_mhz: 500,
        },
        OperatingPoint {
            voltage_mv: 1250,
            frequency_mhz: 550,
        },
    ])
    .unwrap();
    let strategy = AdjustmentStrategy::table(table, &config);
    let opts = options(&dir, true, 10, 2);
    let mut controller = RunController::new(device, config, strategy, shutdown, opts);
    controller.run_session().await.expect("Session failed");

    let applies = applies.lock().unwrap();
    assert_eq!(
        applies.as_slice(),
        &[(500, 1200), (500, 1200), (550, 1250)]
    );

    let readings = find_file(&dir, "readings").expect("No readings file written");
    let content = std::fs::read_to_string(readings).unwrap();
    assert!(content.contains("Adjusted to 550 MHz, 1250 mV"));

    std::fs::remove_dir_all(&dir).ok();
}

/// 瞬态读取失败退避重试，不计入读数
#[tokio::test]
async fn test_transient_fetch_is_retried_without_counting() {
    let dir = fresh_dir("transient_retry");
    let config = fast_config();

    let mut device = MockDevice::new();
    let _applies = record_applies(&mut device);

    let shutdown = ShutdownToken::new();
    let trigger = shutdown.clone();
    let counter = Arc::new(AtomicUsize::new(0));
    device.expect_fetch_status().returning(move || {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(DeviceError::Transient {
                error: "connection timed out".to_string(),
            })
        } else {
            trigger.trigger();
            Ok(safe_sample(1000.0))
        }
    });

    let strategy = AdjustmentStrategy::sweep(&config);
    let opts = options(&dir, true, 10, 2);
    let mut controller = RunController::new(device, config, strategy, shutdown, opts);
    controller.run_session().await.expect("Session failed");

    assert_eq!(controller.global().reading_count(), 1);

    std::fs::remove_dir_all(&dir).ok();
}

/// 算力卡死检测：达到阈值即重启并复位计数
#[tokio::test]
async fn test_reboot_on_stuck_hashrate() {
    let dir = fresh_dir("reboot_stuck");
    let config = fast_config();

    let mut device = MockDevice::new();
    let _applies = record_applies(&mut device);
    device.expect_reboot().times(1).returning(|| Ok(()));

    let shutdown = ShutdownToken::new();
    let trigger = shutdown.clone();
    let counter = Arc::new(AtomicUsize::new(0));
    device.expect_fetch_status().returning(move || {
        if counter.fetch_add(1, Ordering::SeqCst) >= 2 {
            trigger.trigger();
        }
        // 每次都返回完全相同的算力
        Ok(safe_sample(1234.56))
    });

    let strategy = AdjustmentStrategy::sweep(&config);
    let mut opts = options(&dir, true, 10, 2);
    opts.reboot_threshold = Some(2);
    let mut controller = RunController::new(device, config, strategy, shutdown, opts);
    controller.run_session().await.expect("Session failed");

    let readings = find_file(&dir, "readings").expect("No readings file written");
    let content = std::fs::read_to_string(readings).unwrap();
    assert!(content.contains("Rebooted due to 2 identical hashrate readings"));

    std::fs::remove_dir_all(&dir).ok();
}
