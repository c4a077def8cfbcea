// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Build product manifest.
//!
//! Every output directory carries an append-only listing of the products it
//! holds at `nix-support/hydra-build-products`, so the surrounding build
//! system can discover them. Each line is one `kind label path` record, e.g.,
//! `doc manual /out/share/doc/nixos`.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    fs::{read_to_string, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;

/// Location of manifest relative to an output directory.
pub const MANIFEST_PATH: &str = "nix-support/hydra-build-products";

/// Append-only build product manifest of an output directory.
#[derive(Clone, Debug)]
pub struct BuildProducts {
    manifest_path: PathBuf,
}

impl BuildProducts {
    /// Open manifest of target output directory.
    ///
    /// Creates the `nix-support` directory if needed, but leaves the manifest
    /// itself alone until the first record gets appended.
    ///
    /// # Errors
    ///
    /// - Return [`Error::CreateDir`] if `nix-support` cannot be created.
    pub fn open(out_dir: impl AsRef<Path>) -> Result<Self> {
        let manifest_path = out_dir.as_ref().join(MANIFEST_PATH);
        if let Some(parent) = manifest_path.parent() {
            mkdirp::mkdirp(parent).map_err(|err| Error::CreateDir {
                source: err,
                path: parent.into(),
            })?;
        }

        Ok(Self { manifest_path })
    }

    /// Path to manifest file.
    pub fn path(&self) -> &Path {
        &self.manifest_path
    }

    /// Append a product record.
    ///
    /// # Errors
    ///
    /// - Return [`Error::InvalidField`] if kind or label contain whitespace.
    /// - Return [`Error::Append`] if record cannot be written.
    pub fn record(
        &self,
        kind: impl Into<String>,
        label: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<()> {
        let product = Product::new(kind, label, path)?;
        debug!("record build product: {product}");

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.manifest_path)
            .map_err(|err| Error::Append {
                source: err,
                manifest_path: self.manifest_path.clone(),
            })?;
        writeln!(file, "{product}").map_err(|err| Error::Append {
            source: err,
            manifest_path: self.manifest_path.clone(),
        })?;

        Ok(())
    }

    /// List recorded products in insertion order.
    ///
    /// A manifest that was never written to holds no products.
    ///
    /// # Errors
    ///
    /// - Return [`Error::Read`] if manifest cannot be read.
    /// - Return [`Error::Malformed`] if a record cannot be parsed.
    pub fn products(&self) -> Result<Vec<Product>> {
        if !self.manifest_path.exists() {
            return Ok(Vec::new());
        }

        read_to_string(&self.manifest_path)
            .map_err(|err| Error::Read {
                source: err,
                manifest_path: self.manifest_path.clone(),
            })?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::parse::<Product>)
            .collect()
    }
}

/// Single build product record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub kind: String,
    pub label: String,
    pub path: PathBuf,
}

impl Product {
    /// Construct new product record.
    ///
    /// # Errors
    ///
    /// - Return [`Error::InvalidField`] if kind or label are empty or contain
    ///   whitespace, since records are whitespace separated.
    pub fn new(
        kind: impl Into<String>,
        label: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let kind = kind.into();
        let label = label.into();
        for field in [&kind, &label] {
            if field.is_empty() || field.contains(char::is_whitespace) {
                return Err(Error::InvalidField(field.clone()));
            }
        }

        Ok(Self {
            kind,
            label,
            path: path.into(),
        })
    }
}

impl Display for Product {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "{} {} {}", self.kind, self.label, self.path.display())
    }
}

impl FromStr for Product {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.splitn(3, ' ');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(kind), Some(label), Some(path)) if !path.is_empty() => {
                Product::new(kind, label, path)
            }
            _ => Err(Error::Malformed(line.into())),
        }
    }
}

/// Build product manifest error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Directory of manifest cannot be created.
    #[error("failed to create manifest directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Record cannot be appended to manifest.
    #[error("failed to append to manifest at {:?}", manifest_path.display())]
    Append {
        #[source]
        source: std::io::Error,
        manifest_path: PathBuf,
    },

    /// Manifest cannot be read from.
    #[error("failed to read from manifest at {:?}", manifest_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        manifest_path: PathBuf,
    },

    /// Record field is not a single word.
    #[error("invalid manifest field {0:?}")]
    InvalidField(String),

    /// Record line does not hold three fields.
    #[error("malformed manifest record {0:?}")]
    Malformed(String),
}

/// Friendly result alias :3
pub type Result<T, E = Error> = std::result::Result<T, E>;
