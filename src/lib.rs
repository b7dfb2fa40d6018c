//! AxeTune-RS - Bitaxe 状态记录与调优程序
//!
//! AxeTune-RS 是一个用 Rust 编写的 Bitaxe 监控调优工具，通过设备的本地
//! HTTP API 轮询算力、温度、功耗和电压，并在热/功耗安全限制内扫描或
//! 自适应调整频率/电压工作点：
//! - 扫描模式：在固定电压下对一段频率范围逐档测试
//! - 表驱动模式：沿一张已验证的电压/频率表自适应升降档
//! - 监控模式：在指定工作点无限期监控
//!
//! ## 架构特点
//!
//! ### 单线程监督控制环
//! - 轮询 → 安全评估 → (可能的) 调整 → 记录 → 休眠
//! - 协作式停止令牌，在循环边界响应中断
//!
//! ### 安全防护
//! - 芯片温度 / 稳压器温度 / 功耗三项独立的警告与临界阈值
//! - 临界回退后的进阶冷却窗口，防止工作点振荡

pub mod config;
pub mod device;
pub mod error;
pub mod output;
pub mod runner;
pub mod safety;
pub mod stats;
pub mod tuning;

pub use config::Config;
pub use error::AxetuneError;
pub use runner::RunController;

/// 程序版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 程序名称
pub const NAME: &str = "axetune-rs";
