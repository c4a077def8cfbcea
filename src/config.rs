// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that drives a manual build,
//! to simplify the process of serialization and deserialization.
//!
//! # General Layout
//!
//! A manual configuration is composed of four parts:
//!
//! - `[manual]`: where the Markdown sources live, where output goes, what
//!   revision is being documented, and which assets the HTML site links.
//! - `[paths]`: source roots to strip from declaration sites, and the optional
//!   public root whose files get linked to a hosted source browser.
//! - `[tools]`: names of the external programs to invoke.
//! - `[[module_set]]`: every independently evaluated module set. Exactly one
//!   of them must be marked as `primary`.
//!
//! All path-valued fields undergo shell expansion. Relative paths are resolved
//! against the directory of the configuration file when loaded through
//! [`ManualConfig::load`].

use crate::path::{Normalizer, PublicRoot};

use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Manual build configuration.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ManualConfig {
    /// Settings of the manual itself.
    pub manual: ManualSettings,

    /// Declaration site normalization settings.
    #[serde(default)]
    pub paths: PathSettings,

    /// External programs to invoke.
    #[serde(default)]
    pub tools: ToolSettings,

    /// Independently evaluated module sets.
    #[serde(rename = "module_set", default)]
    pub module_sets: Vec<ModuleSetDefinition>,
}

impl ManualConfig {
    /// Load configuration file from target path.
    ///
    /// Relative paths inside the configuration are resolved against the
    /// directory holding the configuration file.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file cannot be read.
    /// - Return any other [`ConfigError`] if parsing or validation fails.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("load configuration: {:?}", path.display());
        let data = read_to_string(path).map_err(|err| ConfigError::Read {
            source: err,
            path: path.into(),
        })?;

        let mut config: ManualConfig = data.parse()?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_relative_to(base);

        Ok(config)
    }

    /// Starter configuration written by `nixman init`.
    pub fn starter() -> Self {
        Self {
            manual: ManualSettings {
                revision: "unstable".into(),
                generator: default_generator(),
                doc_name: default_doc_name(),
                source: "doc/manual".into(),
                entry: default_entry(),
                output: "result".into(),
                assets: None,
                stylesheets: vec!["style.css".into()],
                scripts: Vec::new(),
                module_docs: Vec::new(),
                manpages: None,
                manpage_urls: None,
                toc_depth: default_depth(),
                chunk_toc_depth: default_depth(),
                section_toc_depth: 0,
            },
            paths: PathSettings::default(),
            tools: ToolSettings::default(),
            module_sets: vec![ModuleSetDefinition {
                name: "nixos".into(),
                primary: true,
                modules: vec!["options/*.json".into()],
                strip: Vec::new(),
                warnings_are_errors: false,
            }],
        }
    }

    /// Build declaration site normalizer from path settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Path`] if any source root is empty.
    pub fn normalizer(&self) -> Result<Normalizer> {
        Ok(Normalizer::new(
            self.paths.strip.iter().cloned(),
            self.paths.public.clone(),
        )?)
    }

    /// The one module set marked as primary.
    pub fn primary_set(&self) -> Option<&ModuleSetDefinition> {
        self.module_sets.iter().find(|set| set.primary)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let manual = &mut self.manual;
        manual.source = base.join(&manual.source);
        manual.output = base.join(&manual.output);
        manual.assets = manual.assets.as_ref().map(|path| base.join(path));
        manual.manpages = manual.manpages.as_ref().map(|path| base.join(path));
        manual.manpage_urls = manual.manpage_urls.as_ref().map(|path| base.join(path));
        manual.module_docs = manual
            .module_docs
            .iter()
            .map(|path| base.join(path))
            .collect();
        self.tools.epub_stylesheet = self
            .tools
            .epub_stylesheet
            .as_ref()
            .map(|path| base.join(path));

        for set in &mut self.module_sets {
            set.modules = set
                .modules
                .iter()
                .map(|pattern| base.join(pattern).to_string_lossy().into_owned())
                .collect();
        }
    }

    fn expand_paths(&mut self) -> Result<()> {
        let manual = &mut self.manual;
        manual.source = expand_path(&manual.source)?;
        manual.output = expand_path(&manual.output)?;
        manual.assets = manual.assets.as_deref().map(expand_path).transpose()?;
        manual.manpages = manual.manpages.as_deref().map(expand_path).transpose()?;
        manual.manpage_urls = manual
            .manpage_urls
            .as_deref()
            .map(expand_path)
            .transpose()?;
        manual.module_docs = manual
            .module_docs
            .iter()
            .map(|path| expand_path(path))
            .collect::<Result<Vec<_>>>()?;
        self.tools.epub_stylesheet = self
            .tools
            .epub_stylesheet
            .as_deref()
            .map(expand_path)
            .transpose()?;

        for set in &mut self.module_sets {
            set.modules = set
                .modules
                .iter()
                .map(|pattern| -> Result<String> { Ok(shellexpand::full(pattern)?.into_owned()) })
                .collect::<Result<Vec<_>>>()?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for set in &self.module_sets {
            if set.name.is_empty() {
                return Err(ConfigError::UnnamedSet);
            }

            if !seen.insert(set.name.as_str()) {
                return Err(ConfigError::DuplicateSet(set.name.clone()));
            }
        }

        let primaries = self
            .module_sets
            .iter()
            .filter(|set| set.primary)
            .map(|set| set.name.clone())
            .collect::<Vec<_>>();

        // INVARIANT: Exactly one primary set whenever module sets exist.
        match primaries.len() {
            0 if !self.module_sets.is_empty() => return Err(ConfigError::NoPrimarySet),
            0 | 1 => {}
            _ => return Err(ConfigError::MultiplePrimarySets(primaries)),
        }

        self.normalizer()?;

        Ok(())
    }
}

impl FromStr for ManualConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: ManualConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on all path fields.
        config.expand_paths()?;
        config.validate()?;

        Ok(config)
    }
}

impl Display for ManualConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Settings of the manual itself.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ManualSettings {
    /// Revision string substituted into the manual and passed to renderers.
    pub revision: String,

    /// Generator identity passed to the renderer.
    #[serde(default = "default_generator")]
    pub generator: String,

    /// Name of the documentation directory under `share/doc`.
    #[serde(default = "default_doc_name")]
    pub doc_name: String,

    /// Root of the Markdown source tree.
    pub source: PathBuf,

    /// Entry file of the manual relative to source root.
    #[serde(default = "default_entry")]
    pub entry: PathBuf,

    /// Output root. Every artifact mode writes below its own subdirectory.
    pub output: PathBuf,

    /// Directory holding stylesheets and scripts.
    pub assets: Option<PathBuf>,

    /// Stylesheets relative to asset directory.
    #[serde(default)]
    pub stylesheets: Vec<String>,

    /// Scripts relative to asset directory.
    #[serde(default)]
    pub scripts: Vec<String>,

    /// Per-module documentation fragments.
    #[serde(default)]
    pub module_docs: Vec<PathBuf>,

    /// Directory of statically authored man pages.
    pub manpages: Option<PathBuf>,

    /// Mapping of man page names to URLs for the renderer.
    pub manpage_urls: Option<PathBuf>,

    /// Depth of table of contents on the index page.
    #[serde(default = "default_depth")]
    pub toc_depth: u32,

    /// Depth of table of contents on chunked pages.
    #[serde(default = "default_depth")]
    pub chunk_toc_depth: u32,

    /// Depth of table of contents inside sections.
    #[serde(default)]
    pub section_toc_depth: u32,
}

/// Declaration site normalization settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct PathSettings {
    /// Roots to strip from declaration sites in match order.
    #[serde(default)]
    pub strip: Vec<String>,

    /// Source tree to link to a hosted copy.
    pub public: Option<PublicRoot>,
}

/// External programs to invoke.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ToolSettings {
    /// Documentation renderer.
    #[serde(default = "default_renderer")]
    pub renderer: String,

    /// XSLT processor.
    #[serde(default = "default_xsltproc")]
    pub xsltproc: String,

    /// XML validator.
    #[serde(default = "default_xmllint")]
    pub xmllint: String,

    /// DocBook EPUB stylesheet for the XSLT processor.
    pub epub_stylesheet: Option<PathBuf>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            renderer: default_renderer(),
            xsltproc: default_xsltproc(),
            xmllint: default_xmllint(),
            epub_stylesheet: None,
        }
    }
}

/// Independently evaluated module set.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ModuleSetDefinition {
    /// Name of module set.
    pub name: String,

    /// Whether this set also gets a legacy DocBook document.
    #[serde(default)]
    pub primary: bool,

    /// Glob patterns of module files.
    pub modules: Vec<String>,

    /// Extra roots to strip for this set only.
    #[serde(default)]
    pub strip: Vec<String>,

    /// Treat documentation warnings as evaluation errors.
    #[serde(default)]
    pub warnings_are_errors: bool,
}

fn default_generator() -> String {
    "nixman".into()
}

fn default_doc_name() -> String {
    "nixos".into()
}

fn default_entry() -> PathBuf {
    "manual.md".into()
}

fn default_depth() -> u32 {
    1
}

fn default_renderer() -> String {
    "nixos-render-docs".into()
}

fn default_xsltproc() -> String {
    "xsltproc".into()
}

fn default_xmllint() -> String {
    "xmllint".into()
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())?.into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Source roots are invalid.
    #[error(transparent)]
    Path(#[from] crate::path::Error),

    /// Module set has no name.
    #[error("module set without a name")]
    UnnamedSet,

    /// Two module sets share a name.
    #[error("module set {0:?} defined more than once")]
    DuplicateSet(String),

    /// No module set marked as primary.
    #[error("no module set marked as primary")]
    NoPrimarySet,

    /// More than one module set marked as primary.
    #[error("only one module set may be primary, found {0:?}")]
    MultiplePrimarySets(Vec<String>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
