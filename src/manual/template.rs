// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Typed placeholder substitution.
//!
//! Markdown sources reference build-time values through `@NAME@` tokens, where
//! `NAME` matches `[A-Z][A-Z0-9_]*`. Every token must name a known [`Slot`],
//! and every slot gets a typed [`SlotValue`] through [`Bindings`].
//!
//! # Known Slots
//!
//! | Token                  | Slot                        | Value |
//! |------------------------|-----------------------------|-------|
//! | `@NIXOS_VERSION@`      | [`Slot::Version`]           | text  |
//! | `@MODULE_CHAPTERS@`    | [`Slot::ModuleChapters`]    | text  |
//! | `@<SET>_OPTIONS_JSON@` | [`Slot::OptionsJson`]       | path  |
//!
//! Module set names map to tokens upper-cased with `-` replaced by `_`, so
//! set `nixos-test` owns `@NIXOS_TEST_OPTIONS_JSON@`.
//!
//! # Checking
//!
//! [`check`] validates a whole tree of templates against bindings at once, so
//! a bad token fails the build before a single file gets copied.

use regex::Regex;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::LazyLock,
};
use tracing::debug;

// INVARIANT: Pattern is a valid literal, so compilation cannot fail.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"@([A-Z][A-Z0-9_]*)@").unwrap());

const VERSION_TOKEN: &str = "NIXOS_VERSION";
const MODULE_CHAPTERS_TOKEN: &str = "MODULE_CHAPTERS";
const OPTIONS_JSON_SUFFIX: &str = "_OPTIONS_JSON";

/// Named substitution point.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Slot {
    /// Release version of the documented system.
    Version,

    /// Concatenated per-module documentation fragments.
    ModuleChapters,

    /// Path to the options JSON of a module set.
    OptionsJson(String),
}

impl Slot {
    /// Resolve slot from token name without its `@` delimiters.
    ///
    /// Returns `None` for unknown names. Options JSON slots recovered this way
    /// carry the lower-cased set name with `_` mapped back to `-`.
    pub fn from_token_name(name: &str) -> Option<Self> {
        match name {
            VERSION_TOKEN => Some(Self::Version),
            MODULE_CHAPTERS_TOKEN => Some(Self::ModuleChapters),
            _ => name
                .strip_suffix(OPTIONS_JSON_SUFFIX)
                .filter(|set| !set.is_empty())
                .map(|set| Self::OptionsJson(set.to_lowercase().replace('_', "-"))),
        }
    }

    /// Token name without its `@` delimiters.
    pub fn token_name(&self) -> String {
        match self {
            Self::Version => VERSION_TOKEN.into(),
            Self::ModuleChapters => MODULE_CHAPTERS_TOKEN.into(),
            Self::OptionsJson(set) => {
                format!("{}{OPTIONS_JSON_SUFFIX}", set.to_uppercase().replace('-', "_"))
            }
        }
    }

    /// Kind of value this slot accepts.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Version | Self::ModuleChapters => ValueKind::Text,
            Self::OptionsJson(_) => ValueKind::Path,
        }
    }
}

impl Display for Slot {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "@{}@", self.token_name())
    }
}

/// Value bound to a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotValue {
    Text(String),
    Path(PathBuf),
}

impl SlotValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Text(_) => ValueKind::Text,
            Self::Path(_) => ValueKind::Path,
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Path(path) => path.display().to_string(),
        }
    }
}

/// Kind of slot value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Path,
}

impl Display for ValueKind {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Text => fmt.write_str("text"),
            Self::Path => fmt.write_str("path"),
        }
    }
}

/// Typed mapping of slots to values.
///
/// Bindings are keyed by token name, so two slots that render to the same
/// token can never both be bound.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    values: BTreeMap<String, (Slot, SlotValue)>,
}

impl Bindings {
    /// Construct empty bindings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind value to slot, replacing any previous value.
    ///
    /// # Errors
    ///
    /// - Return [`SubstitutionError::WrongKind`] if value kind does not match
    ///   the kind the slot accepts.
    pub fn bind(&mut self, slot: Slot, value: SlotValue) -> Result<&mut Self> {
        if slot.kind() != value.kind() {
            return Err(SubstitutionError::WrongKind {
                token: slot.to_string(),
                expected: slot.kind(),
                found: value.kind(),
            });
        }

        self.values.insert(slot.token_name(), (slot, value));
        Ok(self)
    }

    /// Lookup value bound to slot.
    pub fn get(&self, slot: &Slot) -> Option<&SlotValue> {
        self.values.get(&slot.token_name()).map(|(_, value)| value)
    }

    /// Iterate over bound slots in token order.
    pub fn iter(&self) -> impl Iterator<Item = (&Slot, &SlotValue)> {
        self.values.values().map(|(slot, value)| (slot, value))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn lookup(&self, token_name: &str) -> Option<&SlotValue> {
        self.values.get(token_name).map(|(_, value)| value)
    }
}

/// Markdown file with its placeholder references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    path: PathBuf,
    text: String,
    tokens: BTreeSet<String>,
}

impl Template {
    /// Scan text for placeholder tokens.
    ///
    /// The path only identifies the template in error reports.
    pub fn parse(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        let tokens = TOKEN
            .captures_iter(&text)
            .filter_map(|captures| captures.get(1))
            .map(|name| name.as_str().to_owned())
            .collect();

        Self {
            path: path.into(),
            text,
            tokens,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Token names referenced by this template, without delimiters.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// Substitute every token with its bound value.
    ///
    /// # Errors
    ///
    /// - Return [`SubstitutionError::UnknownPlaceholder`] if a token names no
    ///   known slot.
    /// - Return [`SubstitutionError::MissingValue`] if a token has no value.
    pub fn render(&self, bindings: &Bindings) -> Result<String> {
        let mut rendered = String::with_capacity(self.text.len());
        let mut last = 0;
        for captures in TOKEN.captures_iter(&self.text) {
            let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
                continue;
            };

            let value = self.resolve(name.as_str(), bindings)?;
            rendered.push_str(&self.text[last..whole.start()]);
            rendered.push_str(&value.render());
            last = whole.end();
        }
        rendered.push_str(&self.text[last..]);

        Ok(rendered)
    }

    fn resolve<'b>(&self, name: &str, bindings: &'b Bindings) -> Result<&'b SlotValue> {
        if Slot::from_token_name(name).is_none() {
            return Err(SubstitutionError::UnknownPlaceholder {
                token: format!("@{name}@"),
                path: self.path.clone(),
            });
        }

        bindings
            .lookup(name)
            .ok_or_else(|| SubstitutionError::MissingValue {
                token: format!("@{name}@"),
                path: self.path.clone(),
            })
    }
}

/// Check a tree of templates against bindings.
///
/// Every referenced token must name a known slot with a bound value, every
/// bound slot must be referenced somewhere, and every bound path must exist.
///
/// # Errors
///
/// - Return [`SubstitutionError::UnknownPlaceholder`] for an unknown token.
/// - Return [`SubstitutionError::MissingValue`] for an unbound token.
/// - Return [`SubstitutionError::UnusedValue`] for an unreferenced binding.
/// - Return [`SubstitutionError::MissingFile`] for a bound path that does not
///   exist.
pub fn check<'t>(templates: impl IntoIterator<Item = &'t Template>, bindings: &Bindings) -> Result<()> {
    let mut referenced = BTreeSet::new();
    for template in templates {
        for name in template.tokens() {
            template.resolve(name, bindings)?;
            referenced.insert(name.to_owned());
        }
    }

    for (name, (slot, value)) in &bindings.values {
        if !referenced.contains(name) {
            return Err(SubstitutionError::UnusedValue(slot.to_string()));
        }

        if let SlotValue::Path(path) = value {
            if !path.exists() {
                return Err(SubstitutionError::MissingFile {
                    token: slot.to_string(),
                    path: path.clone(),
                });
            }
        }
    }

    debug!("checked {} bound placeholders", referenced.len());
    Ok(())
}

/// Placeholder substitution error types.
#[derive(Debug, thiserror::Error)]
pub enum SubstitutionError {
    /// Token names no known slot.
    #[error("unknown placeholder {token} in {:?}", path.display())]
    UnknownPlaceholder { token: String, path: PathBuf },

    /// Token has no bound value.
    #[error("placeholder {token} in {:?} has no value", path.display())]
    MissingValue { token: String, path: PathBuf },

    /// Bound slot is never referenced.
    #[error("placeholder {0} is bound but never referenced")]
    UnusedValue(String),

    /// Value kind does not match slot.
    #[error("placeholder {token} expects {expected} value, found {found} value")]
    WrongKind {
        token: String,
        expected: ValueKind,
        found: ValueKind,
    },

    /// Bound path does not exist.
    #[error("placeholder {token} refers to missing file {:?}", path.display())]
    MissingFile { token: String, path: PathBuf },
}

/// Friendly result alias :3
type Result<T, E = SubstitutionError> = std::result::Result<T, E>;
