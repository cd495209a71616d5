use crate::domain::error::DomainError;
use crate::domain::repository::StoreKind;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage error ({store}): {source}")]
    Storage {
        store: StoreKind,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("export I/O error: {0}")]
    ExportIo(#[source] std::io::Error),

    #[error("malformed CSV: unterminated quoted field starting on line {line}")]
    MalformedCsv { line: usize },
}
