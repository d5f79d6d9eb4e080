use std::path::PathBuf;

/// Failure to bring a core module into the process.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("core module not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("failed to copy core module {} to {}: {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to open core module {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("core module is missing required entry points: {}", missing.join(", "))]
    MissingSymbols { missing: Vec<&'static str> },
}

/// Failure to start or drive an emulation session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("no content given and the core cannot run without content")]
    ContentRequired,
    #[error("failed to read content {}: {source}", path.display())]
    ContentRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("content path is not representable as a C string: {}", path.display())]
    InvalidContentPath { path: PathBuf },
    #[error("core rejected content {}", path.as_ref().map_or_else(|| "<none>".to_string(), |p| p.display().to_string()))]
    GameRejected { path: Option<PathBuf> },
    #[error("core requested hardware rendering but no GL context provider is installed")]
    NoGlContextProvider,
    #[error("failed to create GL context: {0}")]
    GlContext(String),
    #[error("failed to spawn emulation thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("emulation thread exited before reporting startup")]
    ThreadLost,
}
