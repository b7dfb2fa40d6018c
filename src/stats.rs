use crate::device::TelemetrySample;

/// 单一指标的 min/max/sum/count 聚合。
/// min/max 从 ±∞ 哨兵起步，只会被观测值收紧。
#[derive(Debug, Clone, Copy)]
pub struct MetricAggregate {
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub count: u64,
}

impl Default for MetricAggregate {
    fn default() -> Self {
        Self {
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sum: 0.0,
            count: 0,
        }
    }
}

impl MetricAggregate {
    pub fn update(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.sum += value;
        self.count += 1;
    }

    pub fn avg(&self) -> f64 {
        if self.count > 0 {
            self.sum / self.count as f64
        } else {
            0.0
        }
    }
}

/// 全部遥测字段的聚合，每个样本更新一次。
/// 每轮一个实例，另有一个进程生命周期的全局实例（从不重置）。
#[derive(Debug, Clone, Default)]
pub struct SampleAggregate {
    pub frequency: MetricAggregate,
    pub power: MetricAggregate,
    pub voltage: MetricAggregate,
    pub current: MetricAggregate,
    pub chip_temp: MetricAggregate,
    pub vr_temp: MetricAggregate,
    pub hashrate: MetricAggregate,
    pub core_voltage: MetricAggregate,
    pub core_voltage_actual: MetricAggregate,
    pub efficiency: MetricAggregate,
}

impl SampleAggregate {
    pub fn update(&mut self, sample: &TelemetrySample) {
        self.frequency.update(sample.frequency_mhz as f64);
        self.power.update(sample.power_w);
        self.voltage.update(sample.voltage_mv);
        self.current.update(sample.current_ma);
        self.chip_temp.update(sample.chip_temp_c);
        self.vr_temp.update(sample.vr_temp_c);
        self.hashrate.update(sample.hashrate_ghs);
        self.core_voltage.update(sample.core_voltage_set_mv as f64);
        self.core_voltage_actual
            .update(sample.core_voltage_actual_mv as f64);
        self.efficiency.update(sample.efficiency_j_th);
    }

    /// 汇总输出用的 (名称, 单位, 聚合) 行，顺序与 CSV 报表一致
    pub fn rows(&self) -> [(&'static str, &'static str, &MetricAggregate); 10] {
        [
            ("frequency", " MHz", &self.frequency),
            ("power", " W", &self.power),
            ("voltage", " mV", &self.voltage),
            ("current", " mA", &self.current),
            ("temp", "°C", &self.chip_temp),
            ("vrTemp", "°C", &self.vr_temp),
            ("hashRate", " GH/s", &self.hashrate),
            ("coreVoltage", " mV", &self.core_voltage),
            ("coreVoltageActual", " mV", &self.core_voltage_actual),
            ("jth", " J/TH", &self.efficiency),
        ]
    }

    pub fn reading_count(&self) -> u64 {
        self.hashrate.count
    }
}

/// 目前观测到的最佳平均算力轮次，程序结束时用于恢复最优设置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestResult {
    pub hashrate_ghs: f64,
    pub frequency_mhz: u32,
    pub voltage_mv: u32,
}

impl BestResult {
    /// 若本轮平均算力超过当前最佳则替换，返回是否替换
    pub fn challenge(
        slot: &mut Option<BestResult>,
        hashrate_ghs: f64,
        frequency_mhz: u32,
        voltage_mv: u32,
    ) -> bool {
        let current = slot.map_or(0.0, |b| b.hashrate_ghs);
        if hashrate_ghs > current {
            *slot = Some(BestResult {
                hashrate_ghs,
                frequency_mhz,
                voltage_mv,
            });
            true
        } else {
            false
        }
    }
}
