//! Core option registry and its on-disk `key = "value"` file.
//!
//! A core declares its options once (any of the three registration
//! generations). Declared defaults are then overridden by whatever the
//! per-core options file holds for known keys. Every confirmed change marks
//! the registry dirty until the core next polls for updates.

use std::{
    collections::BTreeMap,
    ffi::{CStr, CString},
    fmt::Write as _,
    fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionValue {
    pub value: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionDefinition {
    pub key: String,
    pub description: String,
    pub info: String,
    pub category: Option<String>,
    pub values: Vec<OptionValue>,
    pub default: String,
    pub visible: bool,
}

impl OptionDefinition {
    pub fn new(key: impl Into<String>, default: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            info: String::new(),
            category: None,
            values: Vec::new(),
            default: default.into(),
            visible: true,
        }
    }

    /// Parses a legacy `"Description; first|second|third"` declaration.
    ///
    /// The first listed value is the default.
    pub fn from_legacy(key: &str, declaration: &str) -> Option<Self> {
        let (description, values) = declaration.split_once(';')?;
        let values: Vec<OptionValue> = values
            .trim_start()
            .split('|')
            .filter(|v| !v.is_empty())
            .map(|v| OptionValue {
                value: v.to_string(),
                label: None,
            })
            .collect();
        let default = values.first()?.value.clone();
        Some(Self {
            description: description.trim().to_string(),
            values,
            ..Self::new(key, default)
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionCategory {
    pub key: String,
    pub description: String,
    pub info: String,
}

/// Host-facing copy of the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionsSnapshot {
    pub definitions: Vec<OptionDefinition>,
    pub categories: Vec<OptionCategory>,
    pub values: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
pub struct CoreOptions {
    /// Values handed to the core.
    values: BTreeMap<String, CString>,
    /// Replaced values. A core may keep a pointer from an earlier query, so
    /// none are freed before the session ends.
    retired: Vec<CString>,
    definitions: Vec<OptionDefinition>,
    categories: Vec<OptionCategory>,
    dirty: bool,
    path: Option<PathBuf>,
}

impl CoreOptions {
    /// A registry persisted to `path`.
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Replaces every declaration, applies defaults, then the stored overrides.
    ///
    /// When no options file exists yet, one is written with the defaults.
    pub fn register(&mut self, definitions: Vec<OptionDefinition>, categories: Vec<OptionCategory>) {
        self.retired.extend(std::mem::take(&mut self.values).into_values());
        for def in &definitions {
            match CString::new(def.default.as_str()) {
                Ok(value) => {
                    self.values.insert(def.key.clone(), value);
                }
                Err(_) => warn!(key = %def.key, "option default contains a NUL byte"),
            }
        }
        debug!(
            options = definitions.len(),
            categories = categories.len(),
            "core options registered"
        );
        self.definitions = definitions;
        self.categories = categories;
        self.load();
    }

    pub fn get(&self, key: &str) -> Option<&CStr> {
        self.values.get(key).map(CString::as_c_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Applies a confirmed change to a known key and persists it.
    ///
    /// Unknown keys and empty values are rejected.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        if key.is_empty() || value.is_empty() || !self.values.contains_key(key) {
            return false;
        }
        let Ok(value) = CString::new(value) else {
            return false;
        };
        if let Some(previous) = self.values.insert(key.to_string(), value) {
            self.retired.push(previous);
        }
        self.dirty = true;
        self.save();
        true
    }

    /// Whether anything changed since the last call; clears the flag.
    pub fn take_update(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn set_visible(&mut self, key: &str, visible: bool) -> bool {
        match self.definitions.iter_mut().find(|d| d.key == key) {
            Some(def) => {
                def.visible = visible;
                true
            }
            None => false,
        }
    }

    pub fn definitions(&self) -> &[OptionDefinition] {
        &self.definitions
    }

    pub fn snapshot(&self) -> OptionsSnapshot {
        OptionsSnapshot {
            definitions: self.definitions.clone(),
            categories: self.categories.clone(),
            values: self
                .values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string_lossy().into_owned()))
                .collect(),
        }
    }

    fn load(&mut self) {
        let Some(path) = self.path.clone() else {
            return;
        };
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                self.save();
                return;
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to read options file");
                return;
            }
        };
        let mut applied = 0;
        for (key, value) in parse_options(&text) {
            if let Some(slot) = self.values.get_mut(key)
                && let Ok(value) = CString::new(value)
            {
                self.retired.push(std::mem::replace(slot, value));
                applied += 1;
            }
        }
        debug!(path = %path.display(), applied, "options file loaded");
    }

    fn save(&self) {
        let Some(path) = self.path.as_deref() else {
            return;
        };
        let text = format_options(
            self.values
                .iter()
                .map(|(k, v)| (k.as_str(), v.to_str().unwrap_or_default())),
        );
        let result = match path.parent() {
            Some(parent) => fs::create_dir_all(parent),
            None => Ok(()),
        }
        .and_then(|_| fs::write(path, text));
        if let Err(err) = result {
            warn!(path = %path.display(), %err, "failed to write options file");
        }
    }
}

/// Splits `key = "value"` lines; malformed lines are skipped.
pub fn parse_options(text: &str) -> impl Iterator<Item = (&str, &str)> {
    const BLANK: &[char] = &[' ', '\t'];
    text.lines().filter_map(|line| {
        let (key, value) = line.split_once('=')?;
        let key = key.trim_matches(BLANK);
        let value = value.trim_matches(BLANK).trim_end_matches('\r').trim_matches(BLANK);
        if key.is_empty() || value.is_empty() {
            return None;
        }
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some((key, value))
    })
}

pub fn format_options<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        let _ = writeln!(out, "{key} = \"{value}\"");
    }
    out
}
