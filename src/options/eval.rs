// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Module set evaluation.
//!
//! Turns the module files of a module set into a flat collection of declared
//! options. Module files are JSON dumps produced by the configuration
//! evaluator:
//!
//! ```json
//! {
//!   "options": {
//!     "services.foo.enable": {
//!       "type": "boolean",
//!       "default": false,
//!       "description": "Whether to enable foo.",
//!       "declarations": ["/build/src/nixos/modules/services/foo.nix"]
//!     }
//!   },
//!   "config": { "services.foo.enable": true }
//! }
//! ```
//!
//! # Isolation
//!
//! Every module set is evaluated inside its own [`EvalContext`]. A context is
//! created by [`evaluate`], threaded through each module of exactly one set,
//! and consumed once evaluation finishes. Nothing is shared between contexts,
//! so options of one set can never show up in another set's output.

use crate::config::ModuleSetDefinition;

use serde::Deserialize;
use serde_json::Value;
use std::{
    collections::{btree_map::Entry, BTreeMap},
    fs::read_to_string,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Named collection of module files evaluated together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleSet {
    /// Name of module set.
    pub name: String,

    /// Whether this set gets a legacy DocBook document.
    pub primary: bool,

    /// Module files in evaluation order.
    pub modules: Vec<PathBuf>,

    /// Extra roots to strip for this set only.
    pub strip: Vec<String>,

    /// Treat documentation warnings as evaluation errors.
    pub warnings_are_errors: bool,
}

impl ModuleSet {
    /// Resolve module set definition into concrete module files.
    ///
    /// Each glob pattern is expanded in definition order, and matches of a
    /// single pattern are sorted by path.
    ///
    /// # Errors
    ///
    /// - Return [`EvalError::Pattern`] if a glob pattern is invalid.
    /// - Return [`EvalError::Glob`] if a matched path cannot be read.
    pub fn resolve(definition: &ModuleSetDefinition) -> Result<Self> {
        let mut modules = Vec::new();
        for pattern in &definition.modules {
            let paths = glob::glob(pattern).map_err(|err| EvalError::Pattern {
                source: err,
                pattern: pattern.clone(),
            })?;

            let mut matched = paths.collect::<std::result::Result<Vec<_>, _>>()?;
            if matched.is_empty() {
                warn!("pattern {pattern:?} of module set {:?} matches nothing", definition.name);
            }
            matched.sort();
            modules.extend(matched);
        }

        Ok(Self {
            name: definition.name.clone(),
            primary: definition.primary,
            modules,
            strip: definition.strip.clone(),
            warnings_are_errors: definition.warnings_are_errors,
        })
    }
}

/// Option as declared by a module file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawOption {
    /// Type descriptor.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Default value.
    #[serde(default)]
    pub default: Option<Value>,

    /// Example value.
    #[serde(default)]
    pub example: Option<Value>,

    /// Description text.
    #[serde(default)]
    pub description: Option<String>,

    /// Declaration sites. Defaults to module file itself.
    #[serde(default)]
    pub declarations: Option<Vec<String>>,

    /// Whether option shows up in documentation.
    #[serde(default = "visible_by_default")]
    pub visible: bool,

    /// Whether option is internal to the module system.
    #[serde(default)]
    pub internal: bool,

    /// Whether option can only be read.
    #[serde(default)]
    pub read_only: bool,
}

impl RawOption {
    /// Whether option belongs in documentation at all.
    pub fn is_documented(&self) -> bool {
        self.visible && !self.internal
    }
}

fn visible_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ModuleFile {
    #[serde(default)]
    options: BTreeMap<String, RawOption>,

    #[serde(default)]
    config: BTreeMap<String, Value>,
}

/// Option produced by evaluating a module set.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedOption {
    /// Dotted name of option.
    pub name: String,

    /// First declaration of option.
    pub raw: RawOption,

    /// Raw declaration sites of every declaring module in evaluation order.
    pub declarations: Vec<String>,
}

/// Evaluation context of exactly one module set.
#[derive(Debug, Default)]
pub struct EvalContext {
    declared: BTreeMap<String, EvaluatedOption>,
    definitions: Vec<(String, PathBuf)>,
}

impl EvalContext {
    /// Construct new empty evaluation context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load module file into context.
    ///
    /// # Errors
    ///
    /// - Return [`EvalError::ReadModule`] if module cannot be read.
    /// - Return [`EvalError::ParseModule`] if module is not valid JSON.
    /// - Return [`EvalError::ConflictingDeclaration`] if module redeclares an
    ///   option with a different type.
    pub fn load_module(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        debug!("load module {:?}", path.display());
        let data = read_to_string(path).map_err(|err| EvalError::ReadModule {
            source: err,
            path: path.into(),
        })?;
        let module: ModuleFile =
            serde_json::from_str(&data).map_err(|err| EvalError::ParseModule {
                source: err,
                path: path.into(),
            })?;

        for (name, raw) in module.options {
            self.declare(path, name, raw)?;
        }

        for name in module.config.into_keys() {
            self.define(path, name);
        }

        Ok(())
    }

    /// Declare an option on behalf of a module.
    ///
    /// Redeclaring an option with the same type appends its declaration
    /// sites.
    ///
    /// # Errors
    ///
    /// - Return [`EvalError::ConflictingDeclaration`] if option was already
    ///   declared with a different type.
    pub fn declare(
        &mut self,
        module: impl AsRef<Path>,
        name: impl Into<String>,
        raw: RawOption,
    ) -> Result<()> {
        let module = module.as_ref();
        let name = name.into();
        let sites = raw
            .declarations
            .clone()
            .unwrap_or_else(|| vec![module.to_string_lossy().into_owned()]);

        match self.declared.entry(name) {
            Entry::Vacant(entry) => {
                let name = entry.key().clone();
                entry.insert(EvaluatedOption {
                    name,
                    raw,
                    declarations: sites,
                });
            }
            Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.raw.type_name != raw.type_name {
                    return Err(EvalError::ConflictingDeclaration {
                        option: existing.name.clone(),
                        first: existing.raw.type_name.clone(),
                        second: raw.type_name,
                        module: module.into(),
                    });
                }

                existing.declarations.extend(sites);
            }
        }

        Ok(())
    }

    /// Record that a module sets a value for an option.
    ///
    /// Definitions are checked against declarations once every module has
    /// been loaded, so module order does not matter.
    pub fn define(&mut self, module: impl AsRef<Path>, name: impl Into<String>) {
        self.definitions.push((name.into(), module.as_ref().into()));
    }

    /// Finish evaluation, consuming context.
    ///
    /// # Errors
    ///
    /// - Return [`EvalError::UndefinedOption`] if a module sets an option that
    ///   no module declares.
    /// - Return [`EvalError::Warnings`] if documented options lack a
    ///   description and warnings are treated as errors.
    pub fn finish(self, warnings_are_errors: bool) -> Result<Vec<EvaluatedOption>> {
        for (name, module) in &self.definitions {
            if !self.declared.contains_key(name) {
                return Err(EvalError::UndefinedOption {
                    option: name.clone(),
                    module: module.clone(),
                });
            }
        }

        let warnings = self
            .declared
            .values()
            .filter(|option| option.raw.is_documented())
            .filter(|option| {
                option
                    .raw
                    .description
                    .as_deref()
                    .is_none_or(|text| text.trim().is_empty())
            })
            .map(|option| format!("option {:?} has no description", option.name))
            .collect::<Vec<_>>();

        if !warnings.is_empty() {
            if warnings_are_errors {
                return Err(EvalError::Warnings(warnings));
            }

            for warning in &warnings {
                warn!("{warning}");
            }
        }

        Ok(self.declared.into_values().collect())
    }
}

/// Evaluate module set inside a fresh evaluation context.
///
/// # Errors
///
/// - Return [`EvalError`] if any module fails to load, or the finished
///   evaluation is inconsistent.
#[instrument(skip(set), fields(name = %set.name), level = "debug")]
pub fn evaluate(set: &ModuleSet) -> Result<Vec<EvaluatedOption>> {
    let mut context = EvalContext::new();
    for module in &set.modules {
        context.load_module(module)?;
    }

    context.finish(set.warnings_are_errors)
}

/// Module set evaluation error types.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Glob pattern of module set is invalid.
    #[error("invalid module pattern {pattern:?}")]
    Pattern {
        #[source]
        source: glob::PatternError,
        pattern: String,
    },

    /// Path matched by glob pattern cannot be accessed.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    /// Module file cannot be read.
    #[error("failed to read module at {:?}", path.display())]
    ReadModule {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Module file is not valid.
    #[error("failed to parse module at {:?}", path.display())]
    ParseModule {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Option declared twice with different types.
    #[error("option {option:?} declared as {first:?} and as {second:?} in {:?}", module.display())]
    ConflictingDeclaration {
        option: String,
        first: String,
        second: String,
        module: PathBuf,
    },

    /// Module sets an option nobody declared.
    #[error("option {option:?} set in {:?} does not exist", module.display())]
    UndefinedOption { option: String, module: PathBuf },

    /// Documentation warnings treated as errors.
    #[error("documentation warnings treated as errors:\n{}", .0.join("\n"))]
    Warnings(Vec<String>),

    /// Declaration site roots are invalid.
    #[error(transparent)]
    Path(#[from] crate::path::Error),
}

/// Friendly result alias :3
pub type Result<T, E = EvalError> = std::result::Result<T, E>;
