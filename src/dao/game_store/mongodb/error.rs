use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to save the match snapshot")]
    SaveMatch {
        #[source]
        source: MongoError,
    },
    #[error("failed to load the match snapshot")]
    LoadMatch {
        #[source]
        source: MongoError,
    },
    #[error("failed to save progress of device `{device_id}`")]
    SaveProgress {
        device_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load progress of device `{device_id}`")]
    LoadProgress {
        device_id: String,
        #[source]
        source: MongoError,
    },
}
