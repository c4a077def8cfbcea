// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Build NixOS-style manuals.
//!
//! A __manual__ is a tree of Markdown sources plus the documentation of every
//! configuration option the system offers. Building it takes three steps:
//!
//! 1. Normalize the declaration sites of each option, so that build-local
//!    store paths never leak into the published manual, see [`path`].
//! 2. Aggregate options per module set, where every set is evaluated in
//!    isolation, and write them out as JSON documents, see [`options`].
//! 3. Assemble the manual in each artifact mode, substituting typed
//!    placeholders into the Markdown tree and delegating the actual
//!    rendering to external programs, see [`manual`].
//!
//! Every output directory carries a build product manifest listing what it
//! holds, see [`manifest`].
//!
//! # See Also
//!
//! 1. [NixOS manual sources](https://github.com/NixOS/nixpkgs/tree/master/nixos/doc/manual)

pub mod config;
pub mod manifest;
pub mod manual;
pub mod options;
pub mod path;

pub use config::{ConfigError, ManualConfig, ManualSettings, ModuleSetDefinition, ToolSettings};
pub use manifest::{BuildProducts, Product};
pub use manual::{
    standard_bindings, ArtifactPaths, AssemblyError, Assembler, Bindings, ExternalRenderer, Mode,
    RenderInputs, Renderer, Slot, SlotValue, ToolError,
};
pub use options::{
    aggregate, aggregate_set, write_documents, Aggregation, ModuleSet, OptionsDocument,
};
pub use path::{normalize, NormalizedRef, Normalizer, PublicRoot, UrlTemplate};
