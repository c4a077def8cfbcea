// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Renderer capability.
//!
//! Markdown rendering and DocBook transformation are left to external
//! programs. The [`Renderer`] trait is the seam between the assembler and
//! those programs, so tests can swap in a renderer that never spawns a
//! process.

use crate::config::ToolSettings;

use std::{
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};
use tracing::{debug, info, instrument};

/// Artifact mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum Mode {
    /// Chunked HTML site.
    Html,

    /// EPUB container.
    Epub,

    /// Option reference man page plus static pages.
    Manpage,
}

impl Mode {
    /// Every artifact mode in build order.
    pub const ALL: [Mode; 3] = [Mode::Html, Mode::Epub, Mode::Manpage];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Html => "html",
            Mode::Epub => "epub",
            Mode::Manpage => "manpage",
        }
    }
}

impl Display for Mode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Table of contents depths of the HTML site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TocDepths {
    pub toc: u32,
    pub chunk: u32,
    pub section: u32,
}

impl Default for TocDepths {
    fn default() -> Self {
        Self {
            toc: 1,
            chunk: 1,
            section: 0,
        }
    }
}

/// Everything a renderer needs for one invocation.
///
/// `source` is the Markdown entry file in HTML mode, the DocBook document in
/// EPUB mode, and the options JSON in manpage mode. `out` is the target
/// directory in HTML and EPUB mode, and the target file in manpage mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderInputs {
    pub source: PathBuf,
    pub out: PathBuf,
    pub revision: String,
    pub generator: String,
    pub stylesheets: Vec<String>,
    pub scripts: Vec<String>,
    pub toc: TocDepths,
    pub manpage_urls: Option<PathBuf>,
}

impl RenderInputs {
    /// Construct inputs with default styling.
    pub fn new(
        source: impl Into<PathBuf>,
        out: impl Into<PathBuf>,
        revision: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            out: out.into(),
            revision: revision.into(),
            generator: "nixman".into(),
            stylesheets: Vec::new(),
            scripts: Vec::new(),
            toc: TocDepths::default(),
            manpage_urls: None,
        }
    }
}

/// Paths of produced artifacts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArtifactPaths {
    /// Main artifact, e.g., `index.html`, the EPUB file, or the man page.
    pub primary: PathBuf,

    /// Additional artifacts.
    pub extra: Vec<PathBuf>,
}

impl ArtifactPaths {
    pub fn new(primary: impl Into<PathBuf>) -> Self {
        Self {
            primary: primary.into(),
            extra: Vec::new(),
        }
    }

    /// Iterate over every artifact path, primary first.
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        std::iter::once(self.primary.as_path()).chain(self.extra.iter().map(PathBuf::as_path))
    }
}

/// External rendering capability.
pub trait Renderer: Send + Sync + 'static {
    /// Render one artifact mode.
    ///
    /// # Errors
    ///
    /// - Return [`ToolError`] if rendering fails for any reason.
    fn render(&self, mode: Mode, inputs: &RenderInputs) -> Result<ArtifactPaths>;
}

/// Renderer that shells out to configured programs.
#[derive(Debug, Clone, Default)]
pub struct ExternalRenderer {
    tools: ToolSettings,
}

impl ExternalRenderer {
    pub fn new(tools: ToolSettings) -> Self {
        Self { tools }
    }

    /// Arguments of the docs renderer for HTML output.
    pub fn html_args(&self, inputs: &RenderInputs) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec!["manual".into(), "html".into()];
        if let Some(urls) = &inputs.manpage_urls {
            args.extend([OsString::from("--manpage-urls"), urls.into()]);
        }
        args.extend([
            OsString::from("--revision"),
            inputs.revision.as_str().into(),
            "--generator".into(),
            inputs.generator.as_str().into(),
        ]);
        for stylesheet in &inputs.stylesheets {
            args.extend([OsString::from("--stylesheet"), stylesheet.into()]);
        }
        for script in &inputs.scripts {
            args.extend([OsString::from("--script"), script.into()]);
        }
        args.extend([
            OsString::from("--toc-depth"),
            inputs.toc.toc.to_string().into(),
            "--chunk-toc-depth".into(),
            inputs.toc.chunk.to_string().into(),
            "--section-toc-depth".into(),
            inputs.toc.section.to_string().into(),
            inputs.source.as_os_str().into(),
            inputs.out.join("index.html").into(),
        ]);

        args
    }

    /// Arguments of the docs renderer for man page output.
    pub fn manpage_args(&self, inputs: &RenderInputs) -> Vec<OsString> {
        vec![
            "options".into(),
            "manpage".into(),
            "--revision".into(),
            inputs.revision.as_str().into(),
            inputs.source.as_os_str().into(),
            inputs.out.as_os_str().into(),
        ]
    }

    /// Arguments of the XSLT processor for EPUB output.
    pub fn xsltproc_args(&self, stylesheet: &Path, inputs: &RenderInputs) -> Vec<OsString> {
        let mut args = Vec::new();
        for (name, value) in [
            ("chapter.autolabel", "0"),
            ("part.autolabel", "0"),
            ("preface.autolabel", "0"),
            ("reference.autolabel", "0"),
            ("section.autolabel", "0"),
            ("chunk.section.depth", "0"),
            ("chunk.first.sections", "0"),
        ] {
            args.extend([OsString::from("--param"), name.into(), value.into()]);
        }

        // INVARIANT: Trailing slash makes xsltproc treat output as directory.
        let mut out = inputs.out.as_os_str().to_owned();
        out.push("/");
        args.extend([
            OsString::from("--nonet"),
            "--xinclude".into(),
            "--output".into(),
            out,
            stylesheet.into(),
            inputs.source.as_os_str().into(),
        ]);

        args
    }

    fn render_html(&self, inputs: &RenderInputs) -> Result<ArtifactPaths> {
        create_dir(&inputs.out)?;
        syscall_non_interactive(&self.tools.renderer, self.html_args(inputs))?;
        Ok(ArtifactPaths::new(inputs.out.join("index.html")))
    }

    fn render_epub(&self, inputs: &RenderInputs) -> Result<ArtifactPaths> {
        let stylesheet = self
            .tools
            .epub_stylesheet
            .as_deref()
            .ok_or(ToolError::MissingStylesheet)?;

        syscall_non_interactive(
            &self.tools.xmllint,
            [OsStr::new("--noout"), OsStr::new("--nonet"), inputs.source.as_os_str()],
        )?;
        create_dir(&inputs.out)?;
        syscall_non_interactive(&self.tools.xsltproc, self.xsltproc_args(stylesheet, inputs))?;

        Ok(ArtifactPaths::new(&inputs.out))
    }

    fn render_manpage(&self, inputs: &RenderInputs) -> Result<ArtifactPaths> {
        if let Some(parent) = inputs.out.parent() {
            create_dir(parent)?;
        }
        syscall_non_interactive(&self.tools.renderer, self.manpage_args(inputs))?;
        Ok(ArtifactPaths::new(&inputs.out))
    }
}

impl Renderer for ExternalRenderer {
    #[instrument(skip(self, inputs), level = "debug")]
    fn render(&self, mode: Mode, inputs: &RenderInputs) -> Result<ArtifactPaths> {
        info!("render {mode} from {:?}", inputs.source.display());
        match mode {
            Mode::Html => self.render_html(inputs),
            Mode::Epub => self.render_epub(inputs),
            Mode::Manpage => self.render_manpage(inputs),
        }
    }
}

fn create_dir(path: &Path) -> Result<()> {
    mkdirp::mkdirp(path).map_err(|err| ToolError::CreateDir {
        source: err,
        path: path.into(),
    })?;

    Ok(())
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let program = cmd.as_ref().to_string_lossy().into_owned();
    let output = Command::new(cmd.as_ref())
        .args(args)
        .output()
        .map_err(|err| ToolError::Spawn {
            source: err,
            program: program.clone(),
        })?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message);

    if !output.status.success() {
        return Err(ToolError::Failed {
            program,
            status: output.status,
            output: message,
        });
    }

    debug!("{program}: {message}");
    Ok(message)
}

/// External tool error types.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Program cannot be spawned.
    #[error("failed to spawn {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: String,
    },

    /// Program exited unsuccessfully.
    #[error("command {program:?} failed with {status}:\n{output}")]
    Failed {
        program: String,
        status: ExitStatus,
        output: String,
    },

    /// No EPUB stylesheet configured.
    #[error("no epub stylesheet configured for xsltproc")]
    MissingStylesheet,

    /// Output directory cannot be created.
    #[error("failed to create render output directory at {:?}", path.display())]
    CreateDir {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ToolError> = std::result::Result<T, E>;
