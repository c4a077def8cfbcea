// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! EPUB container packaging.
//!
//! An EPUB file is a ZIP archive whose first entry must be a file named
//! `mimetype`, stored without compression, holding exactly
//! `application/epub+zip`. Readers sniff those leading bytes to identify the
//! container, so [`package`] always writes that entry before anything else.

use ignore::WalkBuilder;
use quick_xml::escape::escape;
use std::{
    fs::{read, File},
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, instrument};
use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

/// Media type of EPUB containers.
pub const MIMETYPE: &str = "application/epub+zip";

/// Fixed DocBook document rendered in place of the full manual.
///
/// The full manual is not available as EPUB, so readers get a title page
/// with one chapter that points them to the HTML manual instead.
pub fn placeholder_docbook(title: &str, revision: &str) -> String {
    let title = escape(title);
    let revision = escape(revision);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<book xmlns="http://docbook.org/ns/docbook" xmlns:xlink="http://www.w3.org/1999/xlink" version="5.0" xml:id="book-nixos-manual">
  <info>
    <title>{title}</title>
    <subtitle>Version {revision}</subtitle>
  </info>
  <chapter>
    <title>Temporarily unavailable</title>
    <para>
      The EPUB output of this manual is temporarily unavailable. Please read
      the HTML manual instead.
    </para>
  </chapter>
</book>
"#
    )
}

/// Package rendered EPUB tree into container file.
///
/// Writes `mimetype` first and uncompressed, then every file below `tree` in
/// sorted order, deflated. Any `mimetype` file inside `tree` is ignored in
/// favor of the canonical one.
///
/// # Errors
///
/// - Return [`EpubError::Walk`] if `tree` cannot be traversed.
/// - Return [`EpubError::Read`] if a file of `tree` cannot be read.
/// - Return [`EpubError::Create`] if container file cannot be created.
/// - Return [`EpubError::Zip`] or [`EpubError::Write`] if archive cannot be
///   written.
#[instrument(skip(tree, epub), level = "debug")]
pub fn package(tree: impl AsRef<Path>, epub: impl AsRef<Path>) -> Result<PathBuf> {
    let tree = tree.as_ref();
    let epub = epub.as_ref();
    let entries = collect_entries(tree)?;

    let file = File::create(epub).map_err(|err| EpubError::Create {
        source: err,
        path: epub.into(),
    })?;
    let mut archive = ZipWriter::new(file);

    // INVARIANT: Mimetype is first entry and stored uncompressed.
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    archive.start_file("mimetype", stored)?;
    archive.write_all(MIMETYPE.as_bytes()).map_err(EpubError::Write)?;

    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, path) in entries {
        debug!("add {name:?} to {:?}", epub.display());
        let data = read(&path).map_err(|err| EpubError::Read { source: err, path })?;
        archive.start_file(name, deflated)?;
        archive.write_all(&data).map_err(EpubError::Write)?;
    }

    archive.finish()?;
    Ok(epub.into())
}

fn collect_entries(tree: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut entries = Vec::new();
    for entry in WalkBuilder::new(tree).standard_filters(false).build() {
        let entry = entry?;
        if !entry.file_type().is_some_and(|kind| kind.is_file()) {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(tree) else {
            continue;
        };

        // INVARIANT: Archive entry names always use forward slashes.
        let name = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        if name == "mimetype" {
            continue;
        }

        entries.push((name, entry.into_path()));
    }
    entries.sort();

    Ok(entries)
}

/// EPUB packaging error types.
#[derive(Debug, thiserror::Error)]
pub enum EpubError {
    /// Rendered tree cannot be traversed.
    #[error(transparent)]
    Walk(#[from] ignore::Error),

    /// File of rendered tree cannot be read.
    #[error("failed to read epub content at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Container file cannot be created.
    #[error("failed to create epub at {:?}", path.display())]
    Create {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Archive cannot be assembled.
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// Entry data cannot be written.
    #[error("failed to write epub entry")]
    Write(#[source] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = EpubError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::{fs::write, io::Read};
    use zip::ZipArchive;

    #[test]
    fn mimetype_is_first_and_stored() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let tree = dir.path().join("tree");
        mkdirp::mkdirp(tree.join("META-INF"))?;
        mkdirp::mkdirp(tree.join("OEBPS"))?;
        write(tree.join("META-INF/container.xml"), "<container/>")?;
        write(tree.join("OEBPS/package.opf"), "<package/>")?;
        write(tree.join("OEBPS/index.xhtml"), "<html/>")?;
        write(tree.join("mimetype"), "text/plain")?;

        let epub = package(&tree, dir.path().join("manual.epub"))?;
        let mut archive = ZipArchive::new(File::open(epub)?)?;

        let mut first = archive.by_index(0)?;
        assert_eq!(first.name(), "mimetype");
        assert_eq!(first.compression(), CompressionMethod::Stored);
        let mut content = String::new();
        first.read_to_string(&mut content)?;
        assert_eq!(content, MIMETYPE);
        drop(first);

        let names = (0..archive.len())
            .map(|index| Ok(archive.by_index(index)?.name().to_owned()))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let expect = [
            "mimetype",
            "META-INF/container.xml",
            "OEBPS/index.xhtml",
            "OEBPS/package.opf",
        ];
        assert_eq!(names, expect);
        assert_eq!(archive.by_index(3)?.compression(), CompressionMethod::Deflated);

        Ok(())
    }

    #[test]
    fn placeholder_escapes_markup() {
        let result = placeholder_docbook("NixOS <Manual>", "24.05 & later");
        assert!(result.contains("<title>NixOS &lt;Manual&gt;</title>"));
        assert!(result.contains("<subtitle>Version 24.05 &amp; later</subtitle>"));
        assert!(result.contains("Temporarily unavailable"));
    }
}
