use std::fmt;

/// Machine-readable error codes shared by the library and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    InvalidBatchSize,
    SnapshotNotFound,
    VersionConflict,
    EventsAlreadyCompacted,
    UnknownEventReference,
    InvalidSnapshot,
    CorruptRecord,
    StoreWriteFailed,
    StoreUnavailable,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::InvalidBatchSize => "E1002",
            Self::SnapshotNotFound => "E2001",
            Self::VersionConflict => "E3001",
            Self::EventsAlreadyCompacted => "E3002",
            Self::UnknownEventReference => "E3003",
            Self::InvalidSnapshot => "E3004",
            Self::CorruptRecord => "E3005",
            Self::StoreWriteFailed => "E5001",
            Self::StoreUnavailable => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidBatchSize => "Invalid snapshot batch size",
            Self::SnapshotNotFound => "Snapshot not found",
            Self::VersionConflict => "Snapshot version conflict",
            Self::EventsAlreadyCompacted => "Event already belongs to a snapshot",
            Self::UnknownEventReference => "Snapshot references an unknown event",
            Self::InvalidSnapshot => "Invalid snapshot",
            Self::CorruptRecord => "Corrupt history record",
            Self::StoreWriteFailed => "History store write failed",
            Self::StoreUnavailable => "History store unavailable",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .visitlog/config.toml and retry."),
            Self::InvalidBatchSize => Some("Set history.batch_size to a value of at least 1."),
            Self::SnapshotNotFound => Some("Run `vl history <entity>` to list snapshot ids."),
            Self::VersionConflict | Self::EventsAlreadyCompacted => {
                Some("Another compaction won the race; the next edit re-runs compaction.")
            }
            Self::UnknownEventReference | Self::CorruptRecord => {
                Some("Run `vl verify <entity>` to inspect the history.")
            }
            Self::InvalidSnapshot => None,
            Self::StoreWriteFailed => Some("Check disk space and write permissions."),
            Self::StoreUnavailable => Some("Retry after the store becomes reachable."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
