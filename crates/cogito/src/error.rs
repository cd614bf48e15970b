// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::path::PathBuf;

use cogito_config::ConfigError;
use cogito_sys::{render_attempts, LoadAttempt, SysError};
use thiserror::Error;

pub type CogitoResult<T> = Result<T, CogitoError>;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum CogitoError {
    /// The engine search configuration could not be read.
    #[error("invalid engine configuration: {reason}")]
    Configuration { var: &'static str, reason: String },
    /// No candidate library could be opened.
    #[error("could not load {library}; tried {}", render_attempts(.attempts))]
    Load {
        library: String,
        attempts: Vec<LoadAttempt>,
    },
    /// The library opened but an entry point is missing.
    #[error("symbol {symbol} could not be resolved from {}: {reason}", .path.display())]
    SymbolResolution {
        symbol: String,
        path: PathBuf,
        reason: String,
    },
    /// The engine was compiled against a different `cg_tensor` layout.
    #[error("cg_tensor layout mismatch: host expects {expected} bytes, engine reports {found}")]
    LayoutMismatch { expected: usize, found: usize },
    /// The engine returned a null handle.
    #[error("engine failed to allocate a tensor of shape {shape:?}")]
    Allocation { shape: Vec<usize> },
    /// Elementwise operands disagree on shape.
    #[error("{op}: shape mismatch {left:?} vs {right:?}")]
    ShapeMismatch {
        op: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },
    #[error("cannot view tensor: {reason}")]
    InvalidView { reason: String },
    /// Rejected before any foreign call was made.
    #[error("invalid argument {shape:?}: {reason}")]
    InvalidArgument { shape: Vec<usize>, reason: String },
    #[error("{op} called on a released tensor")]
    Released { op: &'static str },
    #[error("operands were allocated by different engines")]
    EngineMismatch,
    #[error("dlpack export failed: {message}")]
    Dlpack { message: String },
    #[error("failed to serialise view descriptor: {message}")]
    Serialization { message: String },
    #[error("a cogito engine is already installed for this process")]
    AlreadyInstalled,
}

impl CogitoError {
    /// Load-time failures leave the process without an engine.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CogitoError::Configuration { .. }
                | CogitoError::Load { .. }
                | CogitoError::SymbolResolution { .. }
                | CogitoError::LayoutMismatch { .. }
        )
    }

    /// Every path the loader tried, in order. Empty for other errors.
    pub fn attempted_paths(&self) -> Vec<PathBuf> {
        match self {
            CogitoError::Load { attempts, .. } => {
                attempts.iter().map(|attempt| attempt.path.clone()).collect()
            }
            _ => Vec::new(),
        }
    }

    pub(crate) fn invalid_argument(shape: &[usize], reason: impl Into<String>) -> Self {
        CogitoError::InvalidArgument {
            shape: shape.to_vec(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_view(reason: impl Into<String>) -> Self {
        CogitoError::InvalidView {
            reason: reason.into(),
        }
    }
}

impl From<SysError> for CogitoError {
    fn from(err: SysError) -> Self {
        match err {
            SysError::Load { library, attempts } => CogitoError::Load { library, attempts },
            SysError::Symbol {
                symbol,
                path,
                source,
            } => CogitoError::SymbolResolution {
                symbol: symbol.to_string(),
                path,
                reason: source.to_string(),
            },
            SysError::LayoutMismatch { expected, found } => {
                CogitoError::LayoutMismatch { expected, found }
            }
        }
    }
}

impl From<ConfigError> for CogitoError {
    fn from(err: ConfigError) -> Self {
        CogitoError::Configuration {
            var: err.var(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_errors_are_fatal_and_list_paths() {
        let err = CogitoError::Load {
            library: "libcogito.so".into(),
            attempts: vec![
                LoadAttempt {
                    source: "override",
                    path: PathBuf::from("/missing/libcogito.so"),
                    reason: "no such file".into(),
                },
                LoadAttempt {
                    source: "system",
                    path: PathBuf::from("libcogito.so"),
                    reason: "not found".into(),
                },
            ],
        };
        assert!(err.is_fatal());
        assert_eq!(err.attempted_paths().len(), 2);
        let rendered = err.to_string();
        assert!(rendered.contains("/missing/libcogito.so"));
        assert!(rendered.contains("[system] libcogito.so"));
    }

    #[test]
    fn operation_errors_are_recoverable() {
        let err = CogitoError::ShapeMismatch {
            op: "add",
            left: vec![2, 3],
            right: vec![3, 2],
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "add: shape mismatch [2, 3] vs [3, 2]");
        assert!(err.attempted_paths().is_empty());
    }

    #[test]
    fn config_errors_are_fatal_and_name_the_variable() {
        let err: CogitoError = ConfigError::EmptyValue {
            var: cogito_config::LIBRARY_NAME_ENV,
        }
        .into();
        assert!(err.is_fatal());
        assert!(matches!(
            err,
            CogitoError::Configuration {
                var: "COGITO_LIBRARY_NAME",
                ..
            }
        ));
        assert!(err.to_string().contains("COGITO_LIBRARY_NAME is set but empty"));
    }

    #[test]
    fn layout_mismatch_converts_from_sys() {
        let err: CogitoError = SysError::LayoutMismatch {
            expected: 96,
            found: 88,
        }
        .into();
        assert_eq!(
            err,
            CogitoError::LayoutMismatch {
                expected: 96,
                found: 88
            }
        );
        assert!(err.is_fatal());
    }
}
