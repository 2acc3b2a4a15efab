use std::path::PathBuf;

use crate::tree::NodeId;

#[derive(Debug, thiserror::Error)]
pub enum PageError {
    #[error("node {0:?} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0:?} is not attached to the document")]
    Detached(NodeId),
    #[error("unsupported selector `{0}`")]
    Selector(String),
    #[error("style sheet rules are not accessible across origins")]
    CrossOriginSheet,
    #[error("style rule index {0} out of range")]
    RuleIndex(usize),
    #[error("video frame unavailable: {0}")]
    FrameUnavailable(String),
    #[error("failed to read page description {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse page description: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("failed to parse page description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported page description format: {0}")]
    Format(PathBuf),
    #[error("invalid page description: {0}")]
    Invalid(String),
}
