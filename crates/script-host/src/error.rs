use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("engine error: {0}")]
    Engine(#[from] mlua::Error),

    #[error("cannot load {}: {message}", .path.display())]
    Load { path: PathBuf, message: String },

    #[error("entry script failed: {0}")]
    Start(String),

    #[error("signal registration failed: {0}")]
    Signal(std::io::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HostResult<T> = Result<T, HostError>;
