// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

mod integration;

use nixman::{
    config::ModuleSetDefinition, ArtifactPaths, ManualConfig, ManualSettings, Mode, RenderInputs,
    Renderer, ToolError,
};

use anyhow::Result;
use serde_json::Value;
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    os::unix::process::ExitStatusExt,
    process::ExitStatus,
    sync::Mutex,
};
use tempfile::TempDir;

/// Scratch workspace holding a manual source tree and module dumps.
pub(crate) struct ManualFixture {
    root: TempDir,
}

impl ManualFixture {
    pub(crate) fn new() -> Result<Self> {
        let fixture = Self {
            root: tempfile::tempdir()?,
        };
        mkdirp::mkdirp(fixture.source())?;
        mkdirp::mkdirp(fixture.path().join("modules"))?;

        Ok(fixture)
    }

    pub(crate) fn path(&self) -> &Path {
        self.root.path()
    }

    pub(crate) fn source(&self) -> PathBuf {
        self.path().join("manual")
    }

    pub(crate) fn output(&self) -> PathBuf {
        self.path().join("result")
    }

    /// Write file relative to fixture root.
    pub(crate) fn write(&self, path: impl AsRef<Path>, contents: impl AsRef<str>) -> Result<PathBuf> {
        let path = self.path().join(path);
        if let Some(parent) = path.parent() {
            mkdirp::mkdirp(parent)?;
        }
        write(&path, contents.as_ref())?;

        Ok(path)
    }

    /// Write module dump below `modules/`.
    pub(crate) fn module(&self, name: &str, dump: Value) -> Result<PathBuf> {
        self.write(format!("modules/{name}.json"), serde_json::to_string_pretty(&dump)?)
    }

    pub(crate) fn module_set(&self, name: &str, primary: bool, modules: &[&str]) -> ModuleSetDefinition {
        ModuleSetDefinition {
            name: name.into(),
            primary,
            modules: modules
                .iter()
                .map(|module| self.path().join("modules").join(format!("{module}.json")))
                .map(|path| path.to_string_lossy().into_owned())
                .collect(),
            strip: Vec::new(),
            warnings_are_errors: false,
        }
    }

    pub(crate) fn settings(&self) -> ManualSettings {
        let mut settings = ManualConfig::starter().manual;
        settings.revision = "24.05".into();
        settings.source = self.source();
        settings.output = self.output();
        settings.stylesheets = Vec::new();
        settings
    }

    pub(crate) fn read(&self, path: impl AsRef<Path>) -> Result<String> {
        Ok(read_to_string(self.path().join(path))?)
    }
}

/// Renderer that writes deterministic files instead of spawning programs.
///
/// HTML mode copies the staged entry file to `index.html`, so tests can see
/// exactly what the renderer was given.
#[derive(Debug, Default)]
pub(crate) struct FakeRenderer {
    calls: Mutex<Vec<(Mode, RenderInputs)>>,
    fail: Option<Mode>,
}

impl FakeRenderer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing(mode: Mode) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: Some(mode),
        }
    }

    pub(crate) fn calls(&self) -> Vec<(Mode, RenderInputs)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Renderer for FakeRenderer {
    fn render(&self, mode: Mode, inputs: &RenderInputs) -> Result<ArtifactPaths, ToolError> {
        self.calls.lock().unwrap().push((mode, inputs.clone()));
        if self.fail == Some(mode) {
            return Err(ToolError::Failed {
                program: "fake-renderer".into(),
                status: failed_status(),
                output: "stderr: boom".into(),
            });
        }

        match mode {
            Mode::Html => {
                mkdirp::mkdirp(&inputs.out).unwrap();
                let index = inputs.out.join("index.html");
                std::fs::copy(&inputs.source, &index).unwrap();
                Ok(ArtifactPaths::new(index))
            }
            Mode::Epub => {
                mkdirp::mkdirp(inputs.out.join("META-INF")).unwrap();
                mkdirp::mkdirp(inputs.out.join("OEBPS")).unwrap();
                write(inputs.out.join("META-INF/container.xml"), "<container/>").unwrap();
                write(inputs.out.join("OEBPS/index.xhtml"), "<html/>").unwrap();
                Ok(ArtifactPaths::new(&inputs.out))
            }
            Mode::Manpage => {
                mkdirp::mkdirp(inputs.out.parent().unwrap()).unwrap();
                let options = read_to_string(&inputs.source).unwrap();
                write(&inputs.out, format!(".TH CONFIGURATION.NIX 5\n{options}")).unwrap();
                Ok(ArtifactPaths::new(&inputs.out))
            }
        }
    }
}

fn failed_status() -> ExitStatus {
    ExitStatus::from_raw(1 << 8)
}
