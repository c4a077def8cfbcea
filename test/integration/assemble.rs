// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::{FakeRenderer, ManualFixture};

use nixman::{
    manual::{epub::MIMETYPE, Template},
    manifest::BuildProducts,
    standard_bindings, AssemblyError, Assembler, Bindings, Mode, Slot, SlotValue, ToolError,
};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{collections::BTreeMap, fs::File, io::Read, path::PathBuf};
use zip::{CompressionMethod, ZipArchive};

fn manual_with_options(fixture: &ManualFixture) -> Result<PathBuf> {
    fixture.write(
        "manual/manual.md",
        indoc! {"
            # NixOS Manual {#book-nixos-manual}
            ## Version @NIXOS_VERSION@

            ```{=include=} chapters
            installation/installing.md
            ```

            ```{=include=} options
            id-prefix: opt-
            list-id: configuration-variable-list
            source: @NIXOS_OPTIONS_JSON@
            ```
        "},
    )?;
    fixture.write(
        "manual/installation/installing.md",
        "# Installing NixOS @NIXOS_VERSION@ {#sec-installation}\n",
    )?;
    fixture.write("manual/media/logo.svg", "<svg>@NIXOS_VERSION@</svg>")?;
    fixture.write("result/options/nixos/options.json", r#"{ "foo": {} }"#)
}

fn bindings(options: PathBuf) -> Result<Bindings> {
    let mut bindings = Bindings::new();
    bindings
        .bind(Slot::Version, SlotValue::Text("24.05".into()))?
        .bind(Slot::OptionsJson("nixos".into()), SlotValue::Path(options))?;

    Ok(bindings)
}

#[test]
fn html_leaves_no_unresolved_tokens() -> Result<()> {
    let fixture = ManualFixture::new()?;
    let options = manual_with_options(&fixture)?;
    fixture.write("assets/style.css", "body {}")?;
    let mut settings = fixture.settings();
    settings.assets = Some(fixture.path().join("assets"));
    settings.stylesheets = vec!["style.css".into()];
    let assembler = Assembler::new(settings, Some("nixos".into()), FakeRenderer::new());

    let artifacts = assembler.assemble(Mode::Html, &bindings(options.clone())?)?;
    let dst = fixture.output().join("html/share/doc/nixos");
    assert_eq!(artifacts.primary, dst.join("index.html"));
    assert_eq!(artifacts.extra, [dst.join("style.css")]);

    let index = fixture.read("result/html/share/doc/nixos/index.html")?;
    let rendered = Template::parse("index.html", index.as_str());
    assert_eq!(rendered.tokens().count(), 0);
    assert!(index.contains("## Version 24.05"));
    assert!(index.contains(&format!("source: {}", options.display())));

    let calls = assembler.renderer().calls();
    assert_eq!(calls.len(), 1);
    let (mode, inputs) = &calls[0];
    assert_eq!(*mode, Mode::Html);
    assert_eq!(inputs.revision, "24.05");
    assert_eq!(inputs.stylesheets, ["style.css"]);
    assert_eq!(inputs.out, dst);

    let products = BuildProducts::open(fixture.output().join("html"))?.products()?;
    let records = products
        .iter()
        .map(|product| (product.kind.as_str(), product.label.as_str(), product.path.clone()))
        .collect::<Vec<_>>();
    let expect = vec![
        ("nix-build", "out", fixture.output().join("html")),
        ("doc", "manual", dst),
    ];
    assert_eq!(records, expect);

    Ok(())
}

#[test]
fn staging_directory_is_cleaned_up() -> Result<()> {
    let fixture = ManualFixture::new()?;
    let options = manual_with_options(&fixture)?;
    let assembler = Assembler::new(fixture.settings(), Some("nixos".into()), FakeRenderer::new());

    assembler.assemble(Mode::Html, &bindings(options)?)?;

    // Staging directory is gone by now, so check what the renderer was handed.
    let calls = assembler.renderer().calls();
    let (_, inputs) = &calls[0];
    assert!(inputs.source.ends_with("manual.md"));
    assert!(!inputs.source.exists());

    Ok(())
}

#[test]
fn unknown_placeholder_fails_before_rendering() -> Result<()> {
    let fixture = ManualFixture::new()?;
    let options = manual_with_options(&fixture)?;
    fixture.write("manual/release-notes.md", "Released on @RELEASE_DATE@.\n")?;
    let assembler = Assembler::new(fixture.settings(), Some("nixos".into()), FakeRenderer::new());

    let result = assembler.assemble(Mode::Html, &bindings(options)?);
    match result {
        Err(AssemblyError::Substitution(error)) => {
            assert!(error.to_string().contains("@RELEASE_DATE@"));
        }
        other => panic!("expected substitution error, got {other:?}"),
    }
    assert!(assembler.renderer().calls().is_empty());
    assert!(!fixture.output().join("html").exists());

    Ok(())
}

#[test]
fn unused_binding_fails_before_rendering() -> Result<()> {
    let fixture = ManualFixture::new()?;
    let options = manual_with_options(&fixture)?;
    let assembler = Assembler::new(fixture.settings(), Some("nixos".into()), FakeRenderer::new());
    let mut bindings = bindings(options)?;
    bindings.bind(Slot::ModuleChapters, SlotValue::Text("# ZFS".into()))?;

    let result = assembler.assemble(Mode::Html, &bindings);
    assert!(matches!(result, Err(AssemblyError::Substitution(_))));
    assert!(assembler.renderer().calls().is_empty());

    Ok(())
}

#[test]
fn standard_bindings_include_module_chapters() -> Result<()> {
    let fixture = ManualFixture::new()?;
    fixture.write("manual/manual.md", "@NIXOS_VERSION@\n\n@MODULE_CHAPTERS@\n")?;
    let zfs = fixture.write("docs/zfs.md", "# ZFS {#module-zfs}\n")?;
    let mut settings = fixture.settings();
    settings.module_docs = vec![zfs];
    let bindings = standard_bindings(&settings, &BTreeMap::new())?;
    let assembler = Assembler::new(settings, None, FakeRenderer::new());

    assembler.assemble(Mode::Html, &bindings)?;
    let index = fixture.read("result/html/share/doc/nixos/index.html")?;
    assert_eq!(index, "24.05\n\n# ZFS {#module-zfs}\n\n\n");

    Ok(())
}

#[test]
fn epub_is_valid_container() -> Result<()> {
    let fixture = ManualFixture::new()?;
    let assembler = Assembler::new(fixture.settings(), Some("nixos".into()), FakeRenderer::new());

    let artifacts = assembler.assemble(Mode::Epub, &Bindings::new())?;
    let expect = fixture.output().join("epub/nixos-manual.epub");
    assert_eq!(artifacts.primary, expect);

    let mut archive = ZipArchive::new(File::open(&expect)?)?;
    let mut first = archive.by_index(0)?;
    assert_eq!(first.name(), "mimetype");
    assert_eq!(first.compression(), CompressionMethod::Stored);
    let mut content = String::new();
    first.read_to_string(&mut content)?;
    assert_eq!(content, MIMETYPE);
    drop(first);
    assert!(archive.by_name("OEBPS/index.xhtml").is_ok());

    let calls = assembler.renderer().calls();
    let (mode, inputs) = &calls[0];
    assert_eq!(*mode, Mode::Epub);
    assert!(inputs.source.ends_with("manual.xml"));

    let products = BuildProducts::open(fixture.output().join("epub"))?.products()?;
    assert_eq!(products.len(), 1);
    assert_eq!(products[0].kind, "doc-epub");
    assert_eq!(products[0].path, expect);

    Ok(())
}

#[test]
fn manpage_renders_primary_options_and_static_pages() -> Result<()> {
    let fixture = ManualFixture::new()?;
    let options = fixture.write("result/options/nixos/options.json", r#"{"foo":{}}"#)?;
    fixture.write("man/man8/nixos-rebuild.8", ".TH NIXOS-REBUILD 8\n")?;
    fixture.write("man/man1/nixos-version.1", ".TH NIXOS-VERSION 1\n")?;
    fixture.write("man/README.md", "not a man page")?;
    let mut settings = fixture.settings();
    settings.manpages = Some(fixture.path().join("man"));
    let assembler = Assembler::new(settings, Some("nixos".into()), FakeRenderer::new());

    let artifacts = assembler.assemble(Mode::Manpage, &bindings(options)?)?;
    let man = fixture.output().join("manpage/share/man");
    assert_eq!(artifacts.primary, man.join("man5/configuration.nix.5"));
    assert_eq!(
        artifacts.extra,
        [man.join("man1/nixos-version.1"), man.join("man8/nixos-rebuild.8")]
    );

    let page = fixture.read("result/manpage/share/man/man5/configuration.nix.5")?;
    assert_eq!(page, ".TH CONFIGURATION.NIX 5\n{\"foo\":{}}");
    let copied = fixture.read("result/manpage/share/man/man8/nixos-rebuild.8")?;
    assert_eq!(copied, ".TH NIXOS-REBUILD 8\n");
    assert!(!man.join("README.md").exists());

    Ok(())
}

#[test]
fn manpage_needs_primary_options() -> Result<()> {
    let fixture = ManualFixture::new()?;
    let assembler = Assembler::new(fixture.settings(), Some("nixos".into()), FakeRenderer::new());

    let result = assembler.assemble(Mode::Manpage, &Bindings::new());
    assert!(matches!(result, Err(AssemblyError::MissingOptions(token)) if token == "@NIXOS_OPTIONS_JSON@"));
    assert!(assembler.renderer().calls().is_empty());

    Ok(())
}

#[test]
fn renderer_failure_discards_output() -> Result<()> {
    let fixture = ManualFixture::new()?;
    let options = manual_with_options(&fixture)?;
    let assembler = Assembler::new(
        fixture.settings(),
        Some("nixos".into()),
        FakeRenderer::failing(Mode::Html),
    );

    let result = assembler.assemble(Mode::Html, &bindings(options)?);
    match result {
        Err(AssemblyError::Tool(ToolError::Failed { output, .. })) => assert_eq!(output, "stderr: boom"),
        other => panic!("expected tool failure, got {other:?}"),
    }
    assert!(!fixture.output().join("html").exists());

    Ok(())
}

#[test]
fn modes_write_disjoint_directories() -> Result<()> {
    let fixture = ManualFixture::new()?;
    let options = manual_with_options(&fixture)?;
    let assembler = Assembler::new(fixture.settings(), Some("nixos".into()), FakeRenderer::new());
    let bindings = bindings(options)?;

    for mode in Mode::ALL {
        assembler.assemble(mode, &bindings)?;
    }
    // Rebuilding one mode leaves the others alone.
    assembler.assemble(Mode::Html, &bindings)?;

    assert!(fixture.output().join("html/share/doc/nixos/index.html").exists());
    assert!(fixture.output().join("epub/nixos-manual.epub").exists());
    assert!(fixture.output().join("manpage/share/man/man5/configuration.nix.5").exists());
    assert!(fixture.output().join("options/nixos/options.json").exists());

    Ok(())
}
