pub mod selector;

pub use selector::{Adjustment, AdjustmentStrategy, SweepGuard, TableSelector};

use std::path::Path;
use std::time::{Duration, Instant};

use crate::error::ConfigError;

/// 电压/频率工作点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingPoint {
    pub voltage_mv: u32,
    pub frequency_mhz: u32,
}

/// 已验证工作点表，加载后按电压升序排序且不可变。
/// 重复电压不做去重，查找取第一个匹配。
#[derive(Debug, Clone)]
pub struct OperatingPointTable {
    points: Vec<OperatingPoint>,
}

impl OperatingPointTable {
    /// 从 CSV 文件加载，列为 (voltageMV, frequencyMHz)，可带表头行。
    /// 文件缺失或没有任何合法行时失败。
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let mut points = Vec::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut cols = line.split(',');
            let (Some(voltage), Some(frequency)) = (cols.next(), cols.next()) else {
                continue;
            };
            // 表头或坏行直接跳过
            match (
                voltage.trim().parse::<u32>(),
                frequency.trim().parse::<u32>(),
            ) {
                (Ok(voltage_mv), Ok(frequency_mhz)) => points.push(OperatingPoint {
                    voltage_mv,
                    frequency_mhz,
                }),
                _ => continue,
            }
        }

        Self::from_points(points).map_err(|_| ConfigError::EmptyTable {
            path: path.display().to_string(),
        })
    }

    /// 从已有点集构造，排序并拒绝空表
    pub fn from_points(mut points: Vec<OperatingPoint>) -> Result<Self, ConfigError> {
        if points.is_empty() {
            return Err(ConfigError::EmptyTable {
                path: "<memory>".to_string(),
            });
        }
        points.sort_by_key(|p| p.voltage_mv);
        Ok(Self { points })
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> OperatingPoint {
        self.points[index]
    }

    pub fn points(&self) -> &[OperatingPoint] {
        &self.points
    }

    /// 当前工作点在表中的位置：优先精确匹配整个点；
    /// 否则取第一个电压不低于当前电压的条目的前一项；
    /// 当前电压高于所有条目时钳制到最后一项。
    pub fn position_of(&self, current: OperatingPoint) -> usize {
        if let Some(index) = self.points.iter().position(|p| *p == current) {
            return index;
        }
        for (index, point) in self.points.iter().enumerate() {
            if point.voltage_mv >= current.voltage_mv {
                return index.saturating_sub(1);
            }
        }
        self.points.len() - 1
    }
}

/// 临界回退记录。一旦写入便保留整个进程生命周期，
/// 之后只限制而不清零未来的进阶上限。
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackState {
    pub time: Option<Instant>,
    pub voltage_mv: Option<u32>,
}

impl FallbackState {
    pub fn record(&mut self, now: Instant, voltage_mv: u32) {
        self.time = Some(now);
        self.voltage_mv = Some(voltage_mv);
    }

    /// 冷却窗口内是否阻止进阶到 `next_voltage_mv`。
    /// 返回剩余冷却时间；低于回退电压的进阶永不被阻止。
    pub fn blocks_advance(
        &self,
        next_voltage_mv: u32,
        now: Instant,
        advance_delay: Duration,
    ) -> Option<Duration> {
        let (time, voltage) = (self.time?, self.voltage_mv?);
        let elapsed = now.saturating_duration_since(time);
        if elapsed < advance_delay && next_voltage_mv >= voltage {
            Some(advance_delay - elapsed)
        } else {
            None
        }
    }
}
