use thiserror::Error;

#[derive(Error, Debug)]
pub enum PennyError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Please choose a .csv file: {0}")]
    NotCsv(String),

    #[error("The file appears to be empty: {0}")]
    EmptyFile(String),

    #[error("Not signed in: no owner id configured (run `penny init --owner-id ...` or pass --owner-id)")]
    NotSignedIn,

    #[error("Unmapped account: {0}")]
    UnmappedAccount(String),

    #[error("Unknown account type: {0}")]
    UnknownAccountType(String),

    #[error("Invalid account mapping '{0}' (expected SLUG=TYPE_ID)")]
    InvalidMapping(String),

    #[error("{0} row issue(s) found; refusing to write in strict mode")]
    Validation(usize),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PennyError>;
