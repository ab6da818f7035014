//! Fatal job errors.

use miette::Diagnostic;
use thiserror::Error;

use lawex_azure::AzureError;

/// Errors that stop the job, either before any query runs or at the end
/// when queries failed.
#[derive(Debug, Error, Diagnostic)]
pub enum JobError {
    #[error("configuration error: {0}")]
    #[diagnostic(
        code(lawex::configuration),
        help("Check the job's environment variables.")
    )]
    Configuration(String),

    #[error("failed to read secret '{secret}' from key vault '{vault}'")]
    #[diagnostic(
        code(lawex::secret),
        help("The job identity needs 'get' permission on the vault's secrets.")
    )]
    SecretRetrieval {
        vault: String,
        secret: String,
        #[source]
        source: AzureError,
    },

    #[error("invalid query catalog {path}: {reason}")]
    #[diagnostic(code(lawex::catalog))]
    Catalog { path: String, reason: String },

    #[error("{failed} of {total} queries failed")]
    #[diagnostic(code(lawex::queries_failed), help("See the log for per-query errors."))]
    QueriesFailed { failed: usize, total: usize },
}
