// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Manual assembly.
//!
//! Turn a tree of Markdown sources plus aggregated option documents into the
//! final manual artifacts.
//!
//! # Artifact Modes
//!
//! The manual comes in three independent [`Mode`]s:
//!
//! - __html__: substitute placeholders over a staged copy of the Markdown
//!   tree, render it into a chunked site under `share/doc/<doc_name>`, and
//!   copy its stylesheets and scripts next to it.
//! - __epub__: render a fixed placeholder document, and package the result
//!   into an EPUB container.
//! - __manpage__: render the primary module set's options into
//!   `configuration.nix.5`, and copy statically authored pages next to it.
//!
//! Each mode only ever writes below `<output>/<mode>/`, and shares no mutable
//! state with any other mode. Thus, modes may run concurrently.

pub mod epub;
pub mod renderer;
pub mod template;

pub use epub::EpubError;
pub use renderer::{
    ArtifactPaths, ExternalRenderer, Mode, RenderInputs, Renderer, TocDepths, ToolError,
};
pub use template::{Bindings, Slot, SlotValue, SubstitutionError, Template, ValueKind};

use crate::{config::ManualSettings, manifest::BuildProducts};

use ignore::WalkBuilder;
use std::{
    collections::BTreeMap,
    fs::{copy, read_to_string, remove_dir_all, write},
    path::{Path, PathBuf},
};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

const EPUB_TITLE: &str = "NixOS Manual";
const MANPAGE_PATH: &str = "share/man/man5/configuration.nix.5";

/// Manual assembler.
///
/// Holds everything that stays fixed across artifact modes: the manual
/// settings, the name of the primary module set, and the renderer that does
/// the heavy lifting.
#[derive(Debug)]
pub struct Assembler<R = ExternalRenderer>
where
    R: Renderer,
{
    settings: ManualSettings,
    primary_set: Option<String>,
    renderer: R,
}

impl<R> Assembler<R>
where
    R: Renderer,
{
    /// Construct new assembler.
    pub fn new(settings: ManualSettings, primary_set: Option<String>, renderer: R) -> Self {
        Self {
            settings,
            primary_set,
            renderer,
        }
    }

    pub fn settings(&self) -> &ManualSettings {
        &self.settings
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Directory that target mode writes into.
    pub fn output_dir(&self, mode: Mode) -> PathBuf {
        self.settings.output.join(mode.as_str())
    }

    /// Assemble one artifact mode.
    ///
    /// Previous output of the mode is cleared first. If assembly fails, the
    /// mode's output directory is removed again, since partial output is
    /// never valid.
    ///
    /// # Errors
    ///
    /// - Return [`AssemblyError`] if any step of the mode fails.
    #[instrument(skip(self, bindings), level = "debug")]
    pub fn assemble(&self, mode: Mode, bindings: &Bindings) -> Result<ArtifactPaths> {
        let out = self.output_dir(mode);
        info!("assemble {mode} manual into {:?}", out.display());
        reset_dir(&out)?;

        let result = match mode {
            Mode::Html => self.assemble_html(&out, bindings),
            Mode::Epub => self.assemble_epub(&out),
            Mode::Manpage => self.assemble_manpage(&out, bindings),
        };

        if result.is_err() && out.exists() {
            warn!("discard partial {mode} output at {:?}", out.display());
            if let Err(err) = remove_dir_all(&out) {
                warn!("failed to discard {:?}: {err}", out.display());
            }
        }

        result
    }

    fn assemble_html(&self, out: &Path, bindings: &Bindings) -> Result<ArtifactPaths> {
        let root = &self.settings.source;
        let sources = collect_sources(root)?;
        if !sources.iter().any(|source| source == &self.settings.entry) {
            return Err(AssemblyError::MissingEntry(root.join(&self.settings.entry)));
        }

        let templates = sources
            .iter()
            .filter(|source| is_markdown(source))
            .map(|source| Ok(Template::parse(source, read_file(&root.join(source))?)))
            .collect::<Result<Vec<_>>>()?;

        // INVARIANT: Whole tree is checked before any file is staged.
        template::check(&templates, bindings)?;

        let stage = stage_dir()?;
        for template in &templates {
            let target = stage.path().join(template.path());
            create_parent(&target)?;
            write_file(&target, template.render(bindings)?)?;
        }
        for source in sources.iter().filter(|source| !is_markdown(source)) {
            copy_file(&root.join(source), &stage.path().join(source))?;
        }
        debug!("staged {} sources at {:?}", sources.len(), stage.path().display());

        let dst = out.join("share/doc").join(&self.settings.doc_name);
        let inputs = RenderInputs {
            source: stage.path().join(&self.settings.entry),
            out: dst.clone(),
            revision: self.settings.revision.clone(),
            generator: self.settings.generator.clone(),
            stylesheets: self.settings.stylesheets.clone(),
            scripts: self.settings.scripts.clone(),
            toc: TocDepths {
                toc: self.settings.toc_depth,
                chunk: self.settings.chunk_toc_depth,
                section: self.settings.section_toc_depth,
            },
            manpage_urls: self.settings.manpage_urls.clone(),
        };
        let mut artifacts = self.renderer.render(Mode::Html, &inputs)?;

        if let Some(assets) = &self.settings.assets {
            for asset in self.settings.stylesheets.iter().chain(&self.settings.scripts) {
                let target = dst.join(asset);
                copy_file(&assets.join(asset), &target)?;
                artifacts.extra.push(target);
            }
        }

        let products = BuildProducts::open(out)?;
        products.record("nix-build", "out", out)?;
        products.record("doc", "manual", &dst)?;

        Ok(artifacts)
    }

    fn assemble_epub(&self, out: &Path) -> Result<ArtifactPaths> {
        let stage = stage_dir()?;
        let docbook = stage.path().join("manual.xml");
        write_file(
            &docbook,
            epub::placeholder_docbook(EPUB_TITLE, &self.settings.revision),
        )?;

        let tree = stage.path().join("epub");
        let mut inputs = RenderInputs::new(&docbook, &tree, &self.settings.revision);
        inputs.generator = self.settings.generator.clone();
        self.renderer.render(Mode::Epub, &inputs)?;

        let file = out.join(format!("{}-manual.epub", self.settings.doc_name));
        epub::package(&tree, &file)?;
        BuildProducts::open(out)?.record("doc-epub", "manual", &file)?;

        Ok(ArtifactPaths::new(file))
    }

    fn assemble_manpage(&self, out: &Path, bindings: &Bindings) -> Result<ArtifactPaths> {
        let set = self
            .primary_set
            .as_ref()
            .ok_or(AssemblyError::NoPrimarySet)?;
        let slot = Slot::OptionsJson(set.clone());
        let json = match bindings.get(&slot) {
            Some(SlotValue::Path(path)) if path.exists() => path.clone(),
            Some(SlotValue::Path(path)) => {
                return Err(SubstitutionError::MissingFile {
                    token: slot.to_string(),
                    path: path.clone(),
                }
                .into())
            }
            _ => return Err(AssemblyError::MissingOptions(slot.to_string())),
        };

        let mut inputs = RenderInputs::new(json, out.join(MANPAGE_PATH), &self.settings.revision);
        inputs.generator = self.settings.generator.clone();
        let mut artifacts = self.renderer.render(Mode::Manpage, &inputs)?;

        if let Some(manpages) = &self.settings.manpages {
            artifacts.extra.extend(copy_static_manpages(manpages, &out.join("share/man"))?);
        }

        Ok(artifacts)
    }
}

/// Standard bindings of a manual build.
///
/// Binds the revision as version, the concatenated module documentation when
/// any fragments are configured, and the options JSON path of every module
/// set.
///
/// # Errors
///
/// - Return [`AssemblyError::Read`] if a module documentation fragment cannot
///   be read.
pub fn standard_bindings(
    settings: &ManualSettings,
    options: &BTreeMap<String, PathBuf>,
) -> Result<Bindings> {
    let mut bindings = Bindings::new();
    bindings.bind(Slot::Version, SlotValue::Text(settings.revision.clone()))?;

    if !settings.module_docs.is_empty() {
        let chapters = collect_module_chapters(&settings.module_docs)?;
        bindings.bind(Slot::ModuleChapters, SlotValue::Text(chapters))?;
    }

    for (set, path) in options {
        bindings.bind(Slot::OptionsJson(set.clone()), SlotValue::Path(path.clone()))?;
    }

    Ok(bindings)
}

/// Concatenate per-module documentation fragments in given order.
///
/// # Errors
///
/// - Return [`AssemblyError::Read`] if a fragment cannot be read.
pub fn collect_module_chapters(fragments: &[PathBuf]) -> Result<String> {
    let mut chapters = String::new();
    for fragment in fragments {
        let text = read_file(fragment)?;
        chapters.push_str(text.trim_end());
        chapters.push_str("\n\n");
    }

    Ok(chapters)
}

/// Relative paths of every file below source root in sorted order.
///
/// # Errors
///
/// - Return [`AssemblyError::MissingSource`] if root is not a directory.
/// - Return [`AssemblyError::Walk`] if root cannot be traversed.
pub fn collect_sources(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(AssemblyError::MissingSource(root.into()));
    }

    let mut sources = Vec::new();
    for entry in WalkBuilder::new(root).standard_filters(false).build() {
        let entry = entry?;
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }

        if let Ok(relative) = entry.path().strip_prefix(root) {
            sources.push(relative.to_path_buf());
        }
    }
    sources.sort();

    Ok(sources)
}

/// Copy statically authored man pages into man page root.
///
/// Only pages inside section directories `man1` through `man9` are copied.
fn copy_static_manpages(source: &Path, man_root: &Path) -> Result<Vec<PathBuf>> {
    // INVARIANT: Source directory is matched literally, only sections are globbed.
    let pattern = Path::new(&glob::Pattern::escape(&source.to_string_lossy()))
        .join("man[1-9]")
        .join("*");
    let mut copied = Vec::new();
    for page in glob::glob(&pattern.to_string_lossy())? {
        let page = page?;
        if !page.is_file() {
            continue;
        }

        let Ok(relative) = page.strip_prefix(source) else {
            continue;
        };
        let target = man_root.join(relative);
        copy_file(&page, &target)?;
        copied.push(target);
    }
    debug!("copied {} static man pages", copied.len());

    Ok(copied)
}

fn is_markdown(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "md")
}

fn reset_dir(path: &Path) -> Result<()> {
    if path.exists() {
        remove_dir_all(path).map_err(|err| AssemblyError::RemoveDir {
            source: err,
            path: path.into(),
        })?;
    }

    mkdirp::mkdirp(path).map_err(|err| AssemblyError::CreateDir {
        source: err,
        path: path.into(),
    })?;

    Ok(())
}

fn stage_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("nixman-")
        .tempdir()
        .map_err(AssemblyError::Stage)
}

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        mkdirp::mkdirp(parent).map_err(|err| AssemblyError::CreateDir {
            source: err,
            path: parent.into(),
        })?;
    }

    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    read_to_string(path).map_err(|err| AssemblyError::Read {
        source: err,
        path: path.into(),
    })
}

fn write_file(path: &Path, contents: String) -> Result<()> {
    write(path, contents).map_err(|err| AssemblyError::Write {
        source: err,
        path: path.into(),
    })
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    create_parent(to)?;
    copy(from, to).map_err(|err| AssemblyError::Copy {
        source: err,
        from: from.into(),
        to: to.into(),
    })?;

    Ok(())
}

/// Manual assembly error types.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    /// Placeholder substitution fails.
    #[error(transparent)]
    Substitution(#[from] SubstitutionError),

    /// External tool fails.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// EPUB container cannot be packaged.
    #[error(transparent)]
    Epub(#[from] EpubError),

    /// Build product manifest cannot be updated.
    #[error(transparent)]
    Manifest(#[from] crate::manifest::Error),

    /// Source tree cannot be traversed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// Static man page pattern is invalid.
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Static man page cannot be accessed.
    #[error(transparent)]
    Glob(#[from] glob::GlobError),

    /// Source root does not exist.
    #[error("manual source {:?} is not a directory", .0.display())]
    MissingSource(PathBuf),

    /// Entry file does not exist.
    #[error("manual entry file {:?} does not exist", .0.display())]
    MissingEntry(PathBuf),

    /// No primary module set to render man page from.
    #[error("no primary module set to render man page from")]
    NoPrimarySet,

    /// Primary options JSON is not bound.
    #[error("man page needs a path bound to {0}")]
    MissingOptions(String),

    /// Staging directory cannot be created.
    #[error("failed to create staging directory")]
    Stage(#[source] std::io::Error),

    /// Output directory cannot be created.
    #[error("failed to create directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Stale output cannot be removed.
    #[error("failed to remove directory at {:?}", path.display())]
    RemoveDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// File cannot be copied.
    #[error("failed to copy {:?} to {:?}", from.display(), to.display())]
    Copy {
        #[source]
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = AssemblyError> = std::result::Result<T, E>;
