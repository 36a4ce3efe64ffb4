use thiserror::Error;

/// POSIX-style errno surfaced by VFS operations, nested inside the outer
/// taxonomy so callers can match on the specific code without losing the
/// `CasError` context (operation name, path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(non_camel_case_types)]
pub enum VfsErrno {
    ENOENT,
    EEXIST,
    EISDIR,
    ENOTDIR,
    ENOTEMPTY,
    EBADF,
    EINVAL,
    EACCES,
    EIO,
    ENOSPC,
}

impl std::fmt::Display for VfsErrno {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Error)]
pub enum CasError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Codec(#[from] Box<bincode::error::EncodeError>),

    #[error("deserialization error: {0}")]
    Decode(#[from] Box<bincode::error::DecodeError>),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("invalid input in {op}: {message}")]
    InvalidInput { op: &'static str, message: String },

    #[error("not found in {op}: {subject}")]
    NotFound { op: &'static str, subject: String },

    #[error("already exists in {op}: {subject}")]
    AlreadyExists { op: &'static str, subject: String },

    #[error("wrong kind in {op} for {subject}: {errno}")]
    WrongKind { op: &'static str, subject: String, errno: VfsErrno },

    #[error("posix error in {op} for {subject}: {errno}")]
    Posix { op: &'static str, subject: String, errno: VfsErrno },

    #[error("format error in {op}: {message}")]
    FormatError { op: &'static str, message: String },

    #[error("operation cancelled: {op}")]
    Cancelled { op: &'static str },

    #[error("resource contention in {op}: {message}")]
    Contention { op: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, CasError>;

impl CasError {
    #[must_use]
    pub fn invalid(op: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput { op, message: message.into() }
    }

    #[must_use]
    pub fn not_found(op: &'static str, subject: impl Into<String>) -> Self {
        Self::NotFound { op, subject: subject.into() }
    }

    #[must_use]
    pub fn already_exists(op: &'static str, subject: impl Into<String>) -> Self {
        Self::AlreadyExists { op, subject: subject.into() }
    }

    #[must_use]
    pub fn wrong_kind(op: &'static str, subject: impl Into<String>, errno: VfsErrno) -> Self {
        Self::WrongKind { op, subject: subject.into(), errno }
    }

    #[must_use]
    pub fn posix(op: &'static str, subject: impl Into<String>, errno: VfsErrno) -> Self {
        Self::Posix { op, subject: subject.into(), errno }
    }

    #[must_use]
    pub fn format(op: &'static str, message: impl Into<String>) -> Self {
        Self::FormatError { op, message: message.into() }
    }

    #[must_use]
    pub fn contention(op: &'static str, message: impl Into<String>) -> Self {
        Self::Contention { op, message: message.into() }
    }

    /// POSIX errno this error maps to, for VFS callers that need a raw code.
    #[must_use]
    pub fn errno(&self) -> Option<VfsErrno> {
        match self {
            Self::WrongKind { errno, .. } | Self::Posix { errno, .. } => Some(*errno),
            Self::NotFound { .. } => Some(VfsErrno::ENOENT),
            Self::AlreadyExists { .. } => Some(VfsErrno::EEXIST),
            Self::InvalidInput { .. } => Some(VfsErrno::EINVAL),
            Self::Io(_) => Some(VfsErrno::EIO),
            Self::Codec(_) | Self::Decode(_) | Self::Config(_) | Self::FormatError { .. }
            | Self::Cancelled { .. } | Self::Contention { .. } => None,
        }
    }
}
