//! CouchDB failures, split between database-level and document-level calls.

use reqwest::StatusCode;
use thiserror::Error;

/// Result alias for the CouchDB store.
pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures talking to CouchDB.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    /// `COUCH_BASE_URL` is unset.
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// The HTTP client could not be built.
    #[error("failed to build CouchDB client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// A database-level request (lookup or create) could not be sent.
    #[error("CouchDB {op} on database `{database}` failed")]
    Database {
        op: &'static str,
        database: String,
        #[source]
        source: reqwest::Error,
    },
    /// A database-level request returned an unexpected status.
    #[error("CouchDB {op} on database `{database}` returned {status}")]
    DatabaseStatus {
        op: &'static str,
        database: String,
        status: StatusCode,
    },
    /// A document request could not be sent.
    #[error("failed to send CouchDB request for `{doc_id}`")]
    RequestSend {
        doc_id: String,
        #[source]
        source: reqwest::Error,
    },
    /// A document request returned an unexpected status.
    #[error("unexpected CouchDB response status {status} for `{doc_id}`")]
    RequestStatus { doc_id: String, status: StatusCode },
    /// The document changed since its revision was read.
    #[error("revision conflict on CouchDB document `{doc_id}`")]
    RevisionConflict { doc_id: String },
    /// The stored document has an unexpected shape.
    #[error("failed to decode CouchDB document `{doc_id}`")]
    DecodeDocument {
        doc_id: String,
        #[source]
        source: reqwest::Error,
    },
}
