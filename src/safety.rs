use crate::config::ThresholdConfig;
use crate::device::TelemetrySample;

/// 单项指标的严重级别，用于状态显示配色
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Nominal,
    Warning,
    Critical,
}

/// 一次遥测的安全评估结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyReport {
    pub chip_temp: Severity,
    pub vr_temp: Severity,
    pub power: Severity,
    /// 任一指标达到临界阈值
    pub critical_hit: bool,
    /// 三项指标全部低于临界阈值至少 advance_margin，允许进阶
    pub safe_margin: bool,
}

impl SafetyReport {
    /// 触发临界的原因描述，按芯片温度、稳压器温度、功耗的优先级
    pub fn critical_reason(&self) -> Option<&'static str> {
        if self.chip_temp == Severity::Critical {
            Some("critical temperature")
        } else if self.vr_temp == Severity::Critical {
            Some("critical VR temperature")
        } else if self.power == Severity::Critical {
            Some("critical power")
        } else {
            None
        }
    }
}

fn classify(value: f64, warning: f64, critical: f64) -> Severity {
    if value >= critical {
        Severity::Critical
    } else if value >= warning {
        Severity::Warning
    } else {
        Severity::Nominal
    }
}

/// 纯函数安全评估，无状态无副作用
pub fn evaluate(sample: &TelemetrySample, thresholds: &ThresholdConfig) -> SafetyReport {
    let chip_temp = classify(
        sample.chip_temp_c,
        thresholds.temp_warning,
        thresholds.temp_critical,
    );
    let vr_temp = classify(
        sample.vr_temp_c,
        thresholds.vr_temp_warning,
        thresholds.vr_temp_critical,
    );
    let power = classify(
        sample.power_w,
        thresholds.power_warning,
        thresholds.power_critical,
    );

    let critical_hit = chip_temp == Severity::Critical
        || vr_temp == Severity::Critical
        || power == Severity::Critical;

    let margin = thresholds.advance_margin;
    let safe_margin = sample.chip_temp_c <= thresholds.temp_critical - margin
        && sample.vr_temp_c <= thresholds.vr_temp_critical - margin
        && sample.power_w <= thresholds.power_critical - margin;

    SafetyReport {
        chip_temp,
        vr_temp,
        power,
        critical_hit,
        safe_margin,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with(temp: f64, vr_temp: f64, power: f64) -> TelemetrySample {
        TelemetrySample::new(500, power, 5100.0, 4400.0, temp, vr_temp, 1200.0, 1200, 1198)
    }

    #[test]
    fn test_nominal_report() {
        let report = evaluate(
            &sample_with(55.0, 70.0, 20.0),
            &ThresholdConfig::default(),
        );
        assert_eq!(report.chip_temp, Severity::Nominal);
        assert_eq!(report.vr_temp, Severity::Nominal);
        assert_eq!(report.power, Severity::Nominal);
        assert!(!report.critical_hit);
        assert!(report.safe_margin);
        assert_eq!(report.critical_reason(), None);
    }

    #[test]
    fn test_warning_does_not_trip_critical() {
        let report = evaluate(
            &sample_with(63.0, 81.0, 24.0),
            &ThresholdConfig::default(),
        );
        assert_eq!(report.chip_temp, Severity::Warning);
        assert_eq!(report.vr_temp, Severity::Warning);
        assert_eq!(report.power, Severity::Warning);
        assert!(!report.critical_hit);
        // 63.0 <= 65.0 - 2.0 恰好在裕量边界上
        assert!(report.safe_margin);
    }

    #[test]
    fn test_critical_boundaries() {
        let thresholds = ThresholdConfig::default();

        let chip = evaluate(&sample_with(65.0, 70.0, 20.0), &thresholds);
        assert!(chip.critical_hit);
        assert_eq!(chip.critical_reason(), Some("critical temperature"));

        let vr = evaluate(&sample_with(55.0, 85.0, 20.0), &thresholds);
        assert!(vr.critical_hit);
        assert_eq!(vr.critical_reason(), Some("critical VR temperature"));

        let power = evaluate(&sample_with(55.0, 70.0, 26.0), &thresholds);
        assert!(power.critical_hit);
        assert_eq!(power.critical_reason(), Some("critical power"));
    }

    #[test]
    fn test_margin_gate_independent_of_warning() {
        let thresholds = ThresholdConfig::default();
        // 温度高于裕量线但低于警告线不存在（警告62 < 65-2=63 边界），
        // 用 63.5 验证：Warning 且不满足裕量
        let report = evaluate(&sample_with(63.5, 70.0, 20.0), &thresholds);
        assert_eq!(report.chip_temp, Severity::Warning);
        assert!(!report.critical_hit);
        assert!(!report.safe_margin);
    }
}
