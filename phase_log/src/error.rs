use pp_types::RunId;

/// Failure of the event log itself. Nothing can proceed without it, so
/// callers treat every variant as fatal.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("run {0} does not exist in the event log")]
    RunNotFound(RunId),

    #[error("event log database error while trying to {context}")]
    Database {
        context: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("unable to create the directory for the event log at {path}")]
    CreateDir {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("event log lock poisoned by a panicking worker")]
    Poisoned,
}

/// Build a closure mapping a rusqlite error into [`StorageError::Database`].
pub(crate) fn db_err(context: &'static str) -> impl FnOnce(rusqlite::Error) -> StorageError {
    move |source| StorageError::Database { context, source }
}
