use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to initialize logging: {0}")]
    LoggingInit(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to initialize database: {0}")]
    DatabaseInit(String),
    #[error("vendor API unavailable: {0}")]
    Vendor(String),
    #[error("runtime failure: {0}")]
    Runtime(String),
}

impl AppError {
    pub fn logging_init<E: std::fmt::Display>(error: E) -> Self {
        Self::LoggingInit(error.to_string())
    }

    pub fn config<E: std::fmt::Display>(error: E) -> Self {
        Self::Config(error.to_string())
    }

    pub fn database_init<E: std::fmt::Display>(error: E) -> Self {
        Self::DatabaseInit(error.to_string())
    }

    /// Client construction or the initial vendor connect failed.
    pub fn vendor<E: std::fmt::Display>(error: E) -> Self {
        Self::Vendor(error.to_string())
    }

    pub fn runtime<E: std::fmt::Display>(error: E) -> Self {
        Self::Runtime(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn maps_logging_init_error_message() {
        let err = AppError::logging_init("subscriber already set");
        assert_eq!(
            err.to_string(),
            "failed to initialize logging: subscriber already set"
        );
    }

    #[test]
    fn maps_vendor_error_message() {
        let err = AppError::vendor("get user info failed: vendor returned HTTP 401: Unauthorized");
        assert_eq!(
            err.to_string(),
            "vendor API unavailable: get user info failed: vendor returned HTTP 401: Unauthorized"
        );
    }

    #[test]
    fn maps_runtime_error_message() {
        let err = AppError::runtime("vendor connection refused");
        assert_eq!(err.to_string(), "runtime failure: vendor connection refused");
    }
}
