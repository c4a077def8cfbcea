// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Options documentation aggregation.
//!
//! Collects option metadata from every module set, normalizes the declaration
//! sites of each option, and serializes the result into __options documents__.
//!
//! # Options Documents
//!
//! Every module set yields one options document. Each document is available
//! as a JSON object keyed by dotted option name:
//!
//! ```json
//! {
//!   "services.foo.enable": {
//!     "loc": ["services", "foo", "enable"],
//!     "type": "boolean",
//!     "default": false,
//!     "description": "Whether to enable foo.",
//!     "readOnly": false,
//!     "declarations": [
//!       { "url": "https://host/blob/nixos/modules/foo.nix", "name": "nixos/modules/foo.nix" }
//!     ]
//!   }
//! }
//! ```
//!
//! The primary module set additionally gets a legacy DocBook rendition, see
//! [`docbook`].
//!
//! # Output Layout
//!
//! [`write_documents`] places each document at `<out>/options/<set>/`, so the
//! manual can reference option data by path instead of by value.

pub mod docbook;
pub mod eval;

pub use docbook::DocbookError;
pub use eval::{evaluate, EvalContext, EvalError, EvaluatedOption, ModuleSet, RawOption};

use crate::{
    manifest::BuildProducts,
    path::{cleanup_locations, NormalizedRef, Normalizer},
};

use serde::Serialize;
use serde_json::Value;
use std::{
    collections::BTreeMap,
    fs::write,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Documented option with normalized declaration sites.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionDoc {
    /// Option name split into its components.
    pub loc: Vec<String>,

    /// Type descriptor.
    #[serde(rename = "type")]
    pub type_name: String,

    /// Default value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Example value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub example: Option<Value>,

    /// Description text.
    pub description: String,

    /// Whether option can only be read.
    #[serde(rename = "readOnly")]
    pub read_only: bool,

    /// Normalized declaration sites.
    pub declarations: Vec<NormalizedRef>,
}

impl OptionDoc {
    /// Document evaluated option.
    pub fn new(option: EvaluatedOption, normalizer: &Normalizer) -> Self {
        Self {
            loc: option.name.split('.').map(str::to_owned).collect(),
            type_name: option.raw.type_name,
            default: option.raw.default,
            example: option.raw.example,
            description: option.raw.description.unwrap_or_default(),
            read_only: option.raw.read_only,
            declarations: cleanup_locations(&option.declarations, normalizer),
        }
    }
}

/// Serialized option collection of one module set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionsDocument {
    name: String,
    primary: bool,
    options: BTreeMap<String, OptionDoc>,
}

impl OptionsDocument {
    /// Construct new options document.
    pub fn new(
        name: impl Into<String>,
        primary: bool,
        options: impl IntoIterator<Item = (String, OptionDoc)>,
    ) -> Self {
        Self {
            name: name.into(),
            primary,
            options: options.into_iter().collect(),
        }
    }

    /// Name of module set this document belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether document also gets a legacy DocBook rendition.
    pub fn is_primary(&self) -> bool {
        self.primary
    }

    /// Documented options keyed by dotted name.
    pub fn options(&self) -> &BTreeMap<String, OptionDoc> {
        &self.options
    }

    /// Lookup documented option by dotted name.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&OptionDoc> {
        self.options.get(name.as_ref())
    }

    /// Dotted names of documented options in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }

    /// Serialize document into pretty JSON.
    ///
    /// # Errors
    ///
    /// - Return [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.options)
    }

    /// Serialize document into legacy DocBook markup.
    ///
    /// # Errors
    ///
    /// - Return [`DocbookError`] if markup cannot be written.
    pub fn to_docbook(&self) -> Result<String, DocbookError> {
        docbook::to_docbook(self)
    }
}

/// Evaluate one module set in isolation, and document its options.
///
/// Hidden and internal options are left out. Declaration sites are
/// normalized with the given normalizer plus the set's own extra roots.
///
/// # Errors
///
/// - Return [`EvalError`] if module set fails to evaluate.
#[instrument(skip(set, normalizer), fields(name = %set.name), level = "debug")]
pub fn aggregate_set(set: &ModuleSet, normalizer: &Normalizer) -> Result<OptionsDocument, EvalError> {
    let normalizer = normalizer.with_extra_roots(set.strip.iter().cloned())?;
    let options = evaluate(set)?
        .into_iter()
        .filter(|option| option.raw.is_documented())
        .map(|option| (option.name.clone(), OptionDoc::new(option, &normalizer)))
        .collect::<Vec<_>>();

    info!("module set {:?} documents {} options", set.name, options.len());
    Ok(OptionsDocument::new(&set.name, set.primary, options))
}

/// Options documents of every module set that evaluated.
#[derive(Debug, Default)]
pub struct Aggregation {
    /// Documents keyed by module set name.
    pub documents: BTreeMap<String, OptionsDocument>,

    /// Module sets that failed to evaluate, in declaration order.
    pub failures: Vec<AggregateError>,
}

impl Aggregation {
    /// Whether every module set evaluated.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Aggregate every module set into its own options document.
///
/// Each set gets a fresh evaluation context, so one set's options never leak
/// into another set's document. A set that fails to evaluate is recorded as
/// an [`AggregateError`], and the remaining sets are still documented.
pub fn aggregate(sets: &[ModuleSet], normalizer: &Normalizer) -> Aggregation {
    let mut aggregation = Aggregation::default();
    for set in sets {
        match aggregate_set(set, normalizer) {
            Ok(document) => {
                aggregation.documents.insert(set.name.clone(), document);
            }
            Err(err) => {
                warn!("module set {:?} failed to evaluate: {err}", set.name);
                aggregation.failures.push(AggregateError {
                    set: set.name.clone(),
                    source: err,
                });
            }
        }
    }

    aggregation
}

/// Write options documents below output root.
///
/// Writes `options.json` for every document, and `options.xml` for the
/// primary one. Each JSON file is recorded in its directory's build product
/// manifest. Returns the JSON path of every module set.
///
/// # Errors
///
/// - Return [`OutputError`] if any document cannot be serialized or written.
#[instrument(skip(documents, out), level = "debug")]
pub fn write_documents(
    documents: &BTreeMap<String, OptionsDocument>,
    out: impl AsRef<Path>,
) -> Result<BTreeMap<String, PathBuf>, OutputError> {
    let mut written = BTreeMap::new();
    for (name, document) in documents {
        let dir = out.as_ref().join("options").join(name);
        mkdirp::mkdirp(&dir).map_err(|err| OutputError::CreateDir {
            source: err,
            path: dir.clone(),
        })?;

        let json_path = dir.join("options.json");
        write_file(&json_path, document.to_json()?)?;
        info!("wrote options of {name:?} to {:?}", json_path.display());

        if document.is_primary() {
            let xml_path = dir.join("options.xml");
            write_file(&xml_path, document.to_docbook()?)?;
            info!("wrote legacy options of {name:?} to {:?}", xml_path.display());
        }

        BuildProducts::open(&dir)?.record("file", "json", &json_path)?;
        written.insert(name.clone(), json_path);
    }

    Ok(written)
}

fn write_file(path: &Path, contents: String) -> Result<(), OutputError> {
    write(path, contents).map_err(|err| OutputError::Write {
        source: err,
        path: path.into(),
    })
}

/// Module set failed to evaluate.
#[derive(Debug, thiserror::Error)]
#[error("failed to evaluate module set {set:?}")]
pub struct AggregateError {
    /// Name of failing module set.
    pub set: String,

    #[source]
    pub source: EvalError,
}

/// Options document output error types.
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    /// Output directory cannot be created.
    #[error("failed to create options directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Document cannot be written.
    #[error("failed to write options document at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// JSON serialization fails.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// DocBook serialization fails.
    #[error(transparent)]
    Docbook(#[from] DocbookError),

    /// Build product manifest cannot be updated.
    #[error(transparent)]
    Manifest(#[from] crate::manifest::Error),
}
