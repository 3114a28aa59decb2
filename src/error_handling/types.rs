use std::fmt;

#[derive(Debug)]
pub enum ConnectionError {
    AlreadyConnected(String),
    NotFound(String),
    ResolveFailed(String),
    ConnectFailed(std::io::Error),
    ConnectTimeout(u64),
    BindFailed(std::io::Error),
    SendFailed(std::io::Error),
    SocketError(std::io::Error),
    InvalidTarget(String),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionError::AlreadyConnected(id) => {
                write!(f, "Connection '{}' is already connected", id)
            }
            ConnectionError::NotFound(id) => write!(f, "No connection with id '{}'", id),
            ConnectionError::ResolveFailed(addr) => write!(f, "Could not resolve '{}'", addr),
            ConnectionError::ConnectFailed(e) => write!(f, "Connect failed: {}", e),
            ConnectionError::ConnectTimeout(ms) => write!(f, "Connect timed out after {} ms", ms),
            ConnectionError::BindFailed(e) => write!(f, "Bind failed: {}", e),
            ConnectionError::SendFailed(e) => write!(f, "Send failed: {}", e),
            ConnectionError::SocketError(e) => write!(f, "Socket error: {}", e),
            ConnectionError::InvalidTarget(t) => write!(f, "Invalid send target '{}'", t),
        }
    }
}

impl std::error::Error for ConnectionError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyConnectionId,
    EmptyPatternList,
    EmptyPattern(usize),
    OddPatternLength(usize, String),
    NonHexPattern(usize, String),
    EmptyConnectionPool,
    DuplicateConnectionId(String),
    BadPort(String),
    EmptyChannelLayout,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyConnectionId => write!(f, "Rule connection id is empty"),
            ValidationError::EmptyPatternList => write!(f, "Rule has no header patterns"),
            ValidationError::EmptyPattern(i) => write!(f, "Header pattern #{} is empty", i),
            ValidationError::OddPatternLength(i, p) => {
                write!(f, "Header pattern #{} '{}' has odd hex length", i, p)
            }
            ValidationError::NonHexPattern(i, p) => {
                write!(f, "Header pattern #{} '{}' contains non-hex characters", i, p)
            }
            ValidationError::EmptyConnectionPool => {
                write!(f, "Configuration contains no connections")
            }
            ValidationError::DuplicateConnectionId(id) => {
                write!(f, "Duplicate connection id '{}'", id)
            }
            ValidationError::BadPort(id) => write!(f, "Connection '{}' has port 0", id),
            ValidationError::EmptyChannelLayout => {
                write!(f, "History channel layout defines no data items")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug)]
pub enum StorageIOError {
    DirectoryFailed(std::io::Error),
    WriteFailed(std::io::Error),
    ReadFailed(std::io::Error),
    DeleteFailed(std::io::Error),
    MissingFile(String),
}

impl fmt::Display for StorageIOError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageIOError::DirectoryFailed(e) => write!(f, "Directory error: {}", e),
            StorageIOError::WriteFailed(e) => write!(f, "Storage write failed: {}", e),
            StorageIOError::ReadFailed(e) => write!(f, "Storage read failed: {}", e),
            StorageIOError::DeleteFailed(e) => write!(f, "Storage delete failed: {}", e),
            StorageIOError::MissingFile(name) => write!(f, "No stored file for '{}'", name),
        }
    }
}

impl std::error::Error for StorageIOError {}

#[derive(Debug)]
pub enum DataFormatError {
    MalformedFile(String, String),
    RecordArity { expected: usize, actual: usize },
    BadTimestamp(i64),
}

impl fmt::Display for DataFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataFormatError::MalformedFile(key, e) => {
                write!(f, "History file for '{}' is malformed: {}", key, e)
            }
            DataFormatError::RecordArity { expected, actual } => {
                write!(f, "Record has {} values, layout expects {}", actual, expected)
            }
            DataFormatError::BadTimestamp(ms) => {
                write!(f, "Record timestamp {} ms is out of range", ms)
            }
        }
    }
}

impl std::error::Error for DataFormatError {}

#[derive(Debug)]
pub enum HistoryError {
    Storage(StorageIOError),
    Format(DataFormatError),
}

impl fmt::Display for HistoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryError::Storage(e) => write!(f, "History storage error: {}", e),
            HistoryError::Format(e) => write!(f, "History format error: {}", e),
        }
    }
}

impl std::error::Error for HistoryError {}

impl From<StorageIOError> for HistoryError {
    fn from(err: StorageIOError) -> Self {
        HistoryError::Storage(err)
    }
}

impl From<DataFormatError> for HistoryError {
    fn from(err: DataFormatError) -> Self {
        HistoryError::Format(err)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    Invalid(Vec<ValidationError>),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::Invalid(errors) => {
                write!(f, "Invalid configuration: ")?;
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}
