use thiserror::Error;

#[derive(Error, Debug)]
pub enum AxetuneError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Transient read failure: {error}")]
    Transient { error: String },

    #[error("Settings apply failed: {error}")]
    ApplyFailed { error: String },

    #[error("Could not verify settings: {error}")]
    VerifyFailed { error: String },

    #[error("Settings did not apply correctly. Requested: {requested_frequency} MHz, {requested_voltage} mV; Actual: {actual_frequency} MHz, {actual_voltage} mV")]
    VerifyMismatch {
        requested_frequency: u32,
        requested_voltage: u32,
        actual_frequency: u32,
        actual_voltage: u32,
    },

    #[error("Reboot failed: {error}")]
    RebootFailed { error: String },
}

impl DeviceError {
    /// 只有读取失败可以退避重试，其余错误由调用方决定放弃或回退
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Transient { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("File not found: {path}")]
    FileNotFound { path: String },

    #[error("Parse error: {error}")]
    ParseError { error: String },

    #[error("Validation error: {field}, reason: {reason}")]
    ValidationError { field: String, reason: String },

    #[error("Invalid value: {field}, value: {value}, reason: {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Operating point table is empty or improperly formatted: {path}")]
    EmptyTable { path: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let transient = DeviceError::Transient {
            error: "connection timed out".to_string(),
        };
        assert!(transient.is_transient());

        let apply_failed = DeviceError::ApplyFailed {
            error: "500 Internal Server Error".to_string(),
        };
        assert!(!apply_failed.is_transient());

        let mismatch = DeviceError::VerifyMismatch {
            requested_frequency: 500,
            requested_voltage: 1200,
            actual_frequency: 490,
            actual_voltage: 1200,
        };
        assert!(!mismatch.is_transient());
    }

    #[test]
    fn test_error_display_carries_values() {
        let err = DeviceError::VerifyMismatch {
            requested_frequency: 500,
            requested_voltage: 1200,
            actual_frequency: 510,
            actual_voltage: 1195,
        };
        let text = err.to_string();
        assert!(text.contains("500 MHz"));
        assert!(text.contains("510 MHz"));
    }
}
