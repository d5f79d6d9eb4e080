use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

pub const DEFAULT_USERNAME: &str = "DefaultUser";
/// Size of the host audio ring, in seconds of audio at the core's sample rate.
pub const DEFAULT_AUDIO_BUFFER_SECS: f32 = 0.1;
/// `RETRO_LANGUAGE_ENGLISH`.
pub const LANGUAGE_ENGLISH: u32 = 0;

const LIBRETRO_SUFFIX: &str = "_libretro";

/// Severity of a line printed by the core through the log interface.
///
/// Values match `enum retro_log_level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CoreLogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl CoreLogLevel {
    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Debug),
            1 => Some(Self::Info),
            2 => Some(Self::Warn),
            3 => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for CoreLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoreLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown core log level: {other}")),
        }
    }
}

/// Static configuration of a frontend session.
///
/// Everything the frontend writes to disk lives below `root_dir`:
///
/// ```text
/// <root>/system/<core>        system directory handed to the core
/// <root>/save/<core>          save directory
/// <root>/core_assets/<core>   core assets (content) directory
/// <root>/core_options/<core>.opt
/// ```
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub root_dir: PathBuf,
    /// Where module scratch copies are placed before loading.
    pub temp_dir: PathBuf,
    pub username: String,
    pub language: u32,
    /// Core log lines below this level are dropped.
    pub core_log_level: CoreLogLevel,
    pub audio_buffer_secs: f32,
}

impl FrontendConfig {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            temp_dir: std::env::temp_dir(),
            username: DEFAULT_USERNAME.to_string(),
            language: LANGUAGE_ENGLISH,
            core_log_level: CoreLogLevel::Warn,
            audio_buffer_secs: DEFAULT_AUDIO_BUFFER_SECS,
        }
    }

    pub fn system_dir(&self, core_name: &str) -> PathBuf {
        self.root_dir.join("system").join(core_name)
    }

    pub fn save_dir(&self, core_name: &str) -> PathBuf {
        self.root_dir.join("save").join(core_name)
    }

    pub fn core_assets_dir(&self, core_name: &str) -> PathBuf {
        self.root_dir.join("core_assets").join(core_name)
    }

    pub fn options_file(&self, core_name: &str) -> PathBuf {
        self.root_dir
            .join("core_options")
            .join(format!("{core_name}.opt"))
    }
}

/// File stem of a module path with the conventional `_libretro` suffix removed.
///
/// `cores/snes9x_libretro.so` becomes `snes9x`.
pub fn core_name_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match stem.strip_suffix(LIBRETRO_SUFFIX) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => stem,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_name_strips_libretro_suffix() {
        assert_eq!(
            core_name_from_path(Path::new("/cores/snes9x_libretro.so")),
            "snes9x"
        );
        assert_eq!(
            core_name_from_path(Path::new("mgba_libretro.dll")),
            "mgba"
        );
        assert_eq!(core_name_from_path(Path::new("plain.so")), "plain");
        assert_eq!(core_name_from_path(Path::new("_libretro.so")), "_libretro");
    }

    #[test]
    fn derived_paths_are_grouped_by_core() {
        let config = FrontendConfig::new("/data");
        assert_eq!(config.system_dir("fceumm"), Path::new("/data/system/fceumm"));
        assert_eq!(config.save_dir("fceumm"), Path::new("/data/save/fceumm"));
        assert_eq!(
            config.core_assets_dir("fceumm"),
            Path::new("/data/core_assets/fceumm")
        );
        assert_eq!(
            config.options_file("fceumm"),
            Path::new("/data/core_options/fceumm.opt")
        );
    }

    #[test]
    fn log_level_parses_and_orders() {
        assert_eq!("WARN".parse::<CoreLogLevel>(), Ok(CoreLogLevel::Warn));
        assert!("loud".parse::<CoreLogLevel>().is_err());
        assert!(CoreLogLevel::Debug < CoreLogLevel::Error);
        assert_eq!(CoreLogLevel::from_raw(1), Some(CoreLogLevel::Info));
        assert_eq!(CoreLogLevel::from_raw(7), None);
    }
}
