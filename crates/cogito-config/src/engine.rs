use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::warn;

/// Explicit location of the native engine. A file is used verbatim, a
/// directory is joined with the platform library file name.
pub const LIBRARY_PATH_ENV: &str = "COGITO_LIBRARY_PATH";
/// Directory holding the engine's build output.
pub const BUILD_DIR_ENV: &str = "COGITO_BUILD_DIR";
/// Library stem (`cogito` resolves to `libcogito.so`, `cogito.dll`, ...).
pub const LIBRARY_NAME_ENV: &str = "COGITO_LIBRARY_NAME";

pub const DEFAULT_LIBRARY_STEM: &str = "cogito";

/// Where a search candidate came from. The ordering of the variants is the
/// search precedence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CandidateSource {
    /// `COGITO_LIBRARY_PATH`.
    Override,
    /// Directory of the running executable.
    Adjacent,
    /// Engine build output directory.
    BuildOutput,
    /// Bare file name handed to the platform loader.
    System,
}

impl CandidateSource {
    pub fn label(self) -> &'static str {
        match self {
            CandidateSource::Override => "override",
            CandidateSource::Adjacent => "adjacent",
            CandidateSource::BuildOutput => "build-output",
            CandidateSource::System => "system",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub source: CandidateSource,
    pub path: PathBuf,
}

/// Search configuration for the native engine library.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub library_path: Option<PathBuf>,
    pub adjacent_dir: Option<PathBuf>,
    pub build_dirs: Vec<PathBuf>,
    pub library_stem: String,
    /// Whether the bare library name is handed to the OS search path last.
    pub system_fallback: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            adjacent_dir: current_exe_dir(),
            build_dirs: default_build_dirs(),
            library_stem: DEFAULT_LIBRARY_STEM.to_string(),
            system_fallback: true,
        }
    }
}

impl EngineConfig {
    /// Builds a configuration snapshot from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(raw) = std::env::var_os(LIBRARY_PATH_ENV) {
            if !raw.is_empty() {
                cfg.library_path = Some(PathBuf::from(raw));
            }
        }

        if let Some(raw) = std::env::var_os(BUILD_DIR_ENV) {
            if !raw.is_empty() {
                cfg.build_dirs = vec![PathBuf::from(raw)];
            }
        }

        match std::env::var(LIBRARY_NAME_ENV) {
            Ok(name) if name.trim().is_empty() => {
                return Err(ConfigError::EmptyValue {
                    var: LIBRARY_NAME_ENV,
                })
            }
            Ok(name) => cfg.library_stem = name.trim().to_string(),
            Err(std::env::VarError::NotPresent) => {}
            Err(err) => {
                return Err(ConfigError::Env {
                    var: LIBRARY_NAME_ENV,
                    source: err,
                })
            }
        }

        Ok(cfg)
    }

    /// A configuration with no search locations at all. Callers add the
    /// locations they want.
    pub fn empty() -> Self {
        Self {
            library_path: None,
            adjacent_dir: None,
            build_dirs: Vec::new(),
            library_stem: DEFAULT_LIBRARY_STEM.to_string(),
            system_fallback: false,
        }
    }

    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    pub fn with_adjacent_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.adjacent_dir = Some(dir.into());
        self
    }

    pub fn with_build_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.build_dirs.push(dir.into());
        self
    }

    pub fn with_library_stem(mut self, stem: impl Into<String>) -> Self {
        self.library_stem = stem.into();
        self
    }

    pub fn with_system_fallback(mut self, enabled: bool) -> Self {
        self.system_fallback = enabled;
        self
    }

    /// Platform file name of the engine library.
    pub fn file_name(&self) -> OsString {
        libloading::library_filename(&self.library_stem)
    }

    /// Ordered list of paths the loader should try.
    pub fn candidates(&self) -> Vec<Candidate> {
        let file_name = self.file_name();
        let mut out = Vec::new();

        if let Some(path) = &self.library_path {
            let path = if path.is_dir() {
                path.join(&file_name)
            } else {
                path.clone()
            };
            out.push(Candidate {
                source: CandidateSource::Override,
                path,
            });
        }

        if let Some(dir) = &self.adjacent_dir {
            out.push(Candidate {
                source: CandidateSource::Adjacent,
                path: dir.join(&file_name),
            });
        }

        for dir in &self.build_dirs {
            out.push(Candidate {
                source: CandidateSource::BuildOutput,
                path: dir.join(&file_name),
            });
        }

        if self.system_fallback {
            out.push(Candidate {
                source: CandidateSource::System,
                path: PathBuf::from(&file_name),
            });
        }

        out
    }
}

fn current_exe_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

fn default_build_dirs() -> Vec<PathBuf> {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../cogito/build");
    vec![root.join("Debug"), root.join("Release")]
}

/// Errors raised while reading the engine configuration.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is set but empty")]
    EmptyValue { var: &'static str },
    #[error("failed to read {var}: {source}")]
    Env {
        var: &'static str,
        source: std::env::VarError,
    },
}

impl ConfigError {
    /// Environment variable the error is about.
    pub fn var(&self) -> &'static str {
        match self {
            ConfigError::EmptyValue { var } | ConfigError::Env { var, .. } => var,
        }
    }
}

static CONFIG: OnceLock<Result<EngineConfig, ConfigError>> = OnceLock::new();

fn snapshot(
    slot: &'static Result<EngineConfig, ConfigError>,
) -> Result<&'static EngineConfig, ConfigError> {
    slot.as_ref().map_err(Clone::clone)
}

/// Returns the lazily initialised engine configuration.
///
/// A malformed environment is remembered: every call reports the same error
/// instead of silently searching the default locations.
pub fn config() -> Result<&'static EngineConfig, ConfigError> {
    snapshot(CONFIG.get_or_init(|| {
        let result = EngineConfig::from_env();
        if let Err(err) = &result {
            warn!(var = err.var(), "malformed engine configuration: {err}");
        }
        result
    }))
}

/// Overrides the engine configuration. Has no effect once `config()` has been
/// observed; the returned value is the configuration in force.
pub fn configure(cfg: EngineConfig) -> Result<&'static EngineConfig, ConfigError> {
    snapshot(CONFIG.get_or_init(|| Ok(cfg)))
}
