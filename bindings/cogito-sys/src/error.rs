// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of Cogito — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type SysResult<T> = Result<T, SysError>;

/// One failed attempt to open a candidate library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoadAttempt {
    pub source: &'static str,
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for LoadAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.source, self.path.display(), self.reason)
    }
}

#[derive(Debug, Error)]
pub enum SysError {
    #[error("could not load {library}; tried {}", render_attempts(.attempts))]
    Load {
        library: String,
        attempts: Vec<LoadAttempt>,
    },
    #[error("symbol {symbol} missing from {}: {source}", .path.display())]
    Symbol {
        symbol: &'static str,
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("cg_tensor layout mismatch: host expects {expected} bytes, engine reports {found}")]
    LayoutMismatch { expected: usize, found: usize },
}

impl SysError {
    /// Every path the loader tried, in order.
    pub fn attempted_paths(&self) -> Vec<PathBuf> {
        match self {
            SysError::Load { attempts, .. } => attempts.iter().map(|a| a.path.clone()).collect(),
            _ => Vec::new(),
        }
    }
}

/// Renders attempts as `[source] path: reason` joined by `; `.
pub fn render_attempts(attempts: &[LoadAttempt]) -> String {
    if attempts.is_empty() {
        return "no candidate paths".to_string();
    }
    attempts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
