// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where nixman looks for its configuration, and normalize the
//! declaration sites of options so that generated documentation does not leak
//! the file system layout of the machine that built it.
//!
//! # Declaration Site Normalization
//!
//! Every option remembers the files that declared it. Those paths are
//! absolute paths inside some build sandbox, e.g.,
//! `/build/source/nixos/modules/services/foo.nix`, which mean nothing to a
//! reader of the manual. The [`Normalizer`] rewrites them in one of three ways:
//!
//! 1. Paths under the __public root__ become a `{url, name}` link into a
//!    hosted copy of the source tree. This always wins.
//! 2. Paths under a __known root__ lose that prefix. The first matching root
//!    in configuration order is stripped.
//! 3. Anything else passes through untouched.
//!
//! Prefix matching is purely textual. A root of `/build/src/` does not match
//! `/build/srcs/foo.nix`, but a root of `/build/src` would. Overlapping roots
//! are a configuration mistake that nixman does not try to second guess.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Marker substituted by the remaining subpath inside a [`UrlTemplate`].
pub const SUB_MARKER: &str = "{sub}";

/// Determine default absolute path to nixman's configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/nixman/config.toml`. Does
/// not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`Error::NoConfigDir`] if configuration directory cannot be
///   determined.
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("nixman").join("config.toml"))
        .ok_or(Error::NoConfigDir)
}

/// URL template pointing at a hosted copy of the source tree.
///
/// Holds exactly one [`SUB_MARKER`], which gets replaced by the path relative
/// to the public root, e.g., `https://github.com/NixOS/nixpkgs/blob/master/{sub}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub struct UrlTemplate {
    prefix: String,
    suffix: String,
}

impl UrlTemplate {
    /// Expand template with given subpath.
    pub fn expand(&self, sub: impl AsRef<str>) -> String {
        format!("{}{}{}", self.prefix, sub.as_ref(), self.suffix)
    }
}

impl FromStr for UrlTemplate {
    type Err = Error;

    fn from_str(template: &str) -> Result<Self, Self::Err> {
        let found = template.matches(SUB_MARKER).count();
        if found != 1 {
            return Err(Error::MalformedTemplate {
                template: template.into(),
                found,
            });
        }

        // INVARIANT: Exactly one marker, so the split always yields two halves.
        let (prefix, suffix) = template.split_once(SUB_MARKER).ok_or(Error::MalformedTemplate {
            template: template.into(),
            found,
        })?;

        Ok(Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        })
    }
}

impl TryFrom<String> for UrlTemplate {
    type Error = Error;

    fn try_from(template: String) -> Result<Self, Self::Error> {
        template.parse()
    }
}

impl From<UrlTemplate> for String {
    fn from(template: UrlTemplate) -> Self {
        template.to_string()
    }
}

impl Display for UrlTemplate {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{}{}{}", self.prefix, SUB_MARKER, self.suffix)
    }
}

/// Source tree that has a human-browsable hosted copy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PublicRoot {
    /// Local prefix of the source tree.
    pub root: String,

    /// Where the hosted copy of the source tree lives.
    pub url: UrlTemplate,
}

/// Normalized form of a declaration site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum NormalizedRef {
    /// Path under the public root, linked to its hosted copy.
    Link { url: String, name: String },

    /// Path with a known root stripped off.
    Relative(String),

    /// Path outside every known root.
    Unchanged(String),
}

impl NormalizedRef {
    /// Displayable name of declaration site.
    pub fn name(&self) -> &str {
        match self {
            Self::Link { name, .. } => name,
            Self::Relative(path) | Self::Unchanged(path) => path,
        }
    }

    /// Hyperlink of declaration site, if any.
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Link { url, .. } => Some(url),
            Self::Relative(_) | Self::Unchanged(_) => None,
        }
    }
}

/// Rewrite declaration sites relative to known source roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalizer {
    roots: Vec<String>,
    public: Option<PublicRoot>,
}

impl Normalizer {
    /// Construct new normalizer.
    ///
    /// # Errors
    ///
    /// - Return [`Error::EmptyRoot`] if any root, or the public root, is an
    ///   empty string. An empty prefix would match every path.
    pub fn new(
        roots: impl IntoIterator<Item = impl Into<String>>,
        public: Option<PublicRoot>,
    ) -> Result<Self> {
        let roots = roots.into_iter().map(Into::into).collect::<Vec<String>>();
        if roots.iter().any(String::is_empty) {
            return Err(Error::EmptyRoot);
        }

        if public.as_ref().is_some_and(|public| public.root.is_empty()) {
            return Err(Error::EmptyRoot);
        }

        Ok(Self { roots, public })
    }

    /// Derive new normalizer that also strips given roots.
    ///
    /// Extra roots are tried after the existing ones.
    ///
    /// # Errors
    ///
    /// - Return [`Error::EmptyRoot`] if any extra root is empty.
    pub fn with_extra_roots(
        &self,
        extra: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self> {
        let roots = self
            .roots
            .iter()
            .cloned()
            .chain(extra.into_iter().map(Into::into));
        Self::new(roots, self.public.clone())
    }

    /// Known roots in match order.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// Normalize a declaration site.
    pub fn normalize(&self, path: impl AsRef<str>) -> NormalizedRef {
        normalize(path.as_ref(), &self.roots, self.public.as_ref())
    }
}

/// Normalize a declaration site against known roots and optional public root.
pub fn normalize(
    path: &str,
    roots: &[impl AsRef<str>],
    public: Option<&PublicRoot>,
) -> NormalizedRef {
    if let Some(public) = public {
        if let Some(sub) = path.strip_prefix(public.root.as_str()) {
            return NormalizedRef::Link {
                url: public.url.expand(sub),
                name: sub.into(),
            };
        }
    }

    for root in roots {
        if let Some(sub) = path.strip_prefix(root.as_ref()) {
            return NormalizedRef::Relative(sub.into());
        }
    }

    NormalizedRef::Unchanged(path.into())
}

/// Strip first matching prefix from path.
///
/// Returns the path unchanged if no prefix matches.
pub fn strip_any_prefix<'a>(
    path: &'a str,
    roots: impl IntoIterator<Item = impl AsRef<str>>,
) -> &'a str {
    roots
        .into_iter()
        .find_map(|root| path.strip_prefix(root.as_ref()))
        .unwrap_or(path)
}

/// Normalize a listing of declaration sites, preserving their order.
pub fn cleanup_locations(
    paths: impl IntoIterator<Item = impl AsRef<str>>,
    normalizer: &Normalizer,
) -> Vec<NormalizedRef> {
    paths
        .into_iter()
        .map(|path| normalizer.normalize(path))
        .collect()
}

/// Path resolution error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No way to determine user's configuration directory.
    #[error("cannot determine absolute path to user's configuration directory")]
    NoConfigDir,

    /// URL template does not hold exactly one substitution marker.
    #[error("malformed url template {template:?}: expected one \"{{sub}}\" marker, found {found}")]
    MalformedTemplate { template: String, found: usize },

    /// Empty prefix given as source root.
    #[error("source roots must not be empty")]
    EmptyRoot,
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
