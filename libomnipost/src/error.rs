//! Error types for Omnipost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OmnipostError>;

#[derive(Error, Debug)]
pub enum OmnipostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl OmnipostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            OmnipostError::InvalidInput(_) => 3,
            OmnipostError::NotFound(_) => 3,
            OmnipostError::Platform(PlatformError::Credential(_)) => 2,
            OmnipostError::Platform(_) => 1,
            OmnipostError::Config(_) => 1,
            OmnipostError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Adapter-level publish failures.
///
/// `Transient` marks a remote "not ready yet" signal; it is retried only
/// inside the carousel adapter's bounded retry loop. Everything else
/// propagates unchanged to the dispatcher and its caller.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("No credential: {0}")]
    Credential(String),

    #[error("Publish validation failed: {0}")]
    Validation(String),

    #[error("Remote not ready: {0}")]
    Transient(String),

    #[error("Remote rejected request: {0}")]
    Fatal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = OmnipostError::InvalidInput("Empty body".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_not_found() {
        let error = OmnipostError::NotFound("variant abc".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_credential_error() {
        let platform_error = PlatformError::Credential("no linked account".to_string());
        let error = OmnipostError::Platform(platform_error);
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_fatal_error() {
        let platform_error = PlatformError::Fatal("rejected".to_string());
        let error = OmnipostError::Platform(platform_error);
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_transient_error() {
        let platform_error = PlatformError::Transient("media still processing".to_string());
        let error = OmnipostError::Platform(platform_error);
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_error() {
        let config_error = ConfigError::MissingField("database.path".to_string());
        let error = OmnipostError::Config(config_error);
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_invalid_input() {
        let error = OmnipostError::InvalidInput("Body cannot be empty".to_string());
        let message = format!("{}", error);
        assert_eq!(message, "Invalid input: Body cannot be empty");
    }

    #[test]
    fn test_error_message_formatting_credential() {
        let platform_error = PlatformError::Credential("no instagram account linked".to_string());
        let error = OmnipostError::Platform(platform_error);
        let message = format!("{}", error);
        assert_eq!(
            message,
            "Platform error: No credential: no instagram account linked"
        );
    }

    #[test]
    fn test_error_message_formatting_transient() {
        let platform_error = PlatformError::Transient("Media ID is not available".to_string());
        let message = format!("{}", platform_error);
        assert_eq!(message, "Remote not ready: Media ID is not available");
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let platform_error = PlatformError::Fatal("test".to_string());
        let error: OmnipostError = platform_error.into();

        match error {
            OmnipostError::Platform(_) => {}
            _ => panic!("Expected OmnipostError::Platform"),
        }
    }

    #[test]
    fn test_error_conversion_from_db_error() {
        let db_error = DbError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "test"));
        let error: OmnipostError = db_error.into();

        match error {
            OmnipostError::Database(_) => {}
            _ => panic!("Expected OmnipostError::Database"),
        }
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Transient("not ready".to_string());
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }

    #[test]
    fn test_exit_code_consistency() {
        let cred1 = OmnipostError::Platform(PlatformError::Credential("a".to_string()));
        let cred2 = OmnipostError::Platform(PlatformError::Credential("b".to_string()));
        assert_eq!(cred1.exit_code(), cred2.exit_code());
        assert_eq!(cred1.exit_code(), 2);

        let validation = OmnipostError::Platform(PlatformError::Validation("x".to_string()));
        let fatal = OmnipostError::Platform(PlatformError::Fatal("x".to_string()));
        assert_eq!(validation.exit_code(), 1);
        assert_eq!(fatal.exit_code(), 1);
    }
}
