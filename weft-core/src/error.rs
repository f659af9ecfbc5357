//! Error types shared by the reactive runtime and the renderer.

use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong while scheduling, rendering or mounting.
#[derive(Debug, Error)]
pub enum Error {
    /// A virtual node (or a list of siblings) is malformed.
    #[error("invalid vnode: {0}")]
    InvalidVNode(String),

    /// The template compiler rejected a template.
    #[error("template parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// A component has neither a render function nor a template.
    #[error("component `{0}` has neither a render function nor a template")]
    MissingRender(String),

    /// A component only has a template and the renderer has no compiler.
    #[error("component `{0}` has a template but no template compiler is installed")]
    NoCompiler(String),

    /// A mount selector did not resolve to a host node.
    #[error("mount target `{0}` not found")]
    ContainerNotFound(String),

    /// Jobs kept re-queueing each other past the configured pass budget.
    #[error("update loop did not settle after {0} flush passes")]
    FlushOverflow(usize),

    /// The runtime configuration document could not be decoded.
    #[error("invalid runtime config: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidVNode(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_render_readable_messages() {
        let err = Error::Parse {
            offset: 12,
            message: "unclosed tag".into(),
        };
        assert_eq!(
            err.to_string(),
            "template parse error at offset 12: unclosed tag"
        );

        let err = Error::invalid("duplicate key");
        assert_eq!(err.to_string(), "invalid vnode: duplicate key");
    }
}
