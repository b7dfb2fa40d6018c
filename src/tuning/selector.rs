use std::time::{Duration, Instant};

use super::{FallbackState, OperatingPoint, OperatingPointTable};
use crate::config::Config;
use crate::safety::SafetyReport;

/// 紧急降档时频率与电压各自回退的固定步长
const EMERGENCY_BACKOFF_STEP: u32 = 10;

/// 工作点调整决策
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    /// 保持当前工作点
    Hold,
    /// 临界条件但已处于最低档位
    AtFloor,
    /// 满足条件但被冷却窗口阻塞，附剩余时间
    CoolingDown { remaining: Duration },
    /// 进阶到更高工作点
    Advance(OperatingPoint),
    /// 临界回退到更低工作点
    FallBack(OperatingPoint),
    /// 紧急降档并终止本轮（扫描模式下的一次性停机）
    EmergencyStop(OperatingPoint),
}

/// 工作点调整策略，启动时根据是否提供工作点表二选一
pub enum AdjustmentStrategy {
    /// 表驱动自适应模式
    Table(TableSelector),
    /// 线性扫描模式，只做紧急防护
    Sweep(SweepGuard),
}

impl AdjustmentStrategy {
    pub fn table(table: OperatingPointTable, config: &Config) -> Self {
        Self::Table(TableSelector::new(
            table,
            Duration::from_secs(config.tuning.advance_delay),
        ))
    }

    pub fn sweep(config: &Config) -> Self {
        Self::Sweep(SweepGuard::new(
            config.limits.min_frequency,
            config.limits.min_core_voltage,
        ))
    }

    pub fn is_table(&self) -> bool {
        matches!(self, Self::Table(_))
    }

    pub fn decide(
        &mut self,
        current: OperatingPoint,
        report: &SafetyReport,
        now: Instant,
    ) -> Adjustment {
        match self {
            Self::Table(selector) => selector.decide(current, report, now),
            Self::Sweep(guard) => guard.decide(current, report),
        }
    }
}

/// 沿已排序工作点表升降档的选择器
pub struct TableSelector {
    table: OperatingPointTable,
    fallback: FallbackState,
    advance_delay: Duration,
}

impl TableSelector {
    pub fn new(table: OperatingPointTable, advance_delay: Duration) -> Self {
        Self {
            table,
            fallback: FallbackState::default(),
            advance_delay,
        }
    }

    pub fn fallback(&self) -> &FallbackState {
        &self.fallback
    }

    pub fn decide(
        &mut self,
        current: OperatingPoint,
        report: &SafetyReport,
        now: Instant,
    ) -> Adjustment {
        let index = self.table.position_of(current);

        if report.critical_hit {
            if index == 0 {
                return Adjustment::AtFloor;
            }
            self.fallback.record(now, current.voltage_mv);
            return Adjustment::FallBack(self.table.get(index - 1));
        }

        // 冷却门比较的是紧邻的下一档电压，而不是可能更大跳变的目标电压
        let next_voltage = if index + 1 < self.table.len() {
            self.table.get(index + 1).voltage_mv
        } else {
            current.voltage_mv
        };
        if let Some(remaining) = self.fallback.blocks_advance(next_voltage, now, self.advance_delay)
        {
            return Adjustment::CoolingDown { remaining };
        }

        if report.safe_margin && index + 1 < self.table.len() {
            return Adjustment::Advance(self.table.get(index + 1));
        }

        Adjustment::Hold
    }
}

/// 扫描模式防护：临界时一次性降档并终止本轮
pub struct SweepGuard {
    min_frequency: u32,
    min_core_voltage: u32,
}

impl SweepGuard {
    pub fn new(min_frequency: u32, min_core_voltage: u32) -> Self {
        Self {
            min_frequency,
            min_core_voltage,
        }
    }

    pub fn decide(&self, current: OperatingPoint, report: &SafetyReport) -> Adjustment {
        if !report.critical_hit {
            return Adjustment::Hold;
        }
        Adjustment::EmergencyStop(OperatingPoint {
            frequency_mhz: current
                .frequency_mhz
                .saturating_sub(EMERGENCY_BACKOFF_STEP)
                .max(self.min_frequency),
            voltage_mv: current
                .voltage_mv
                .saturating_sub(EMERGENCY_BACKOFF_STEP)
                .max(self.min_core_voltage),
        })
    }
}
