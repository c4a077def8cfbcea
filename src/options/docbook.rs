// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Legacy DocBook rendition of options documents.
//!
//! Older rendering paths consume option documentation as a DocBook
//! `<variablelist>`, with one `<varlistentry>` per option. Only the primary
//! module set is rendered this way.

use crate::{options::OptionsDocument, path::NormalizedRef};

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Writer,
};
use serde_json::Value;

const DOCBOOK_NS: &str = "http://docbook.org/ns/docbook";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Render options document as DocBook variable list.
///
/// # Errors
///
/// - Return [`DocbookError::Write`] if markup cannot be written.
/// - Return [`DocbookError::Utf8`] if written markup is not UTF-8.
pub fn to_docbook(document: &OptionsDocument) -> Result<String> {
    let mut writer = DocbookWriter::new();
    writer.event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.start(
        "variablelist",
        &[
            ("xmlns", DOCBOOK_NS),
            ("xmlns:xlink", XLINK_NS),
            ("xml:id", "configuration-variable-list"),
        ],
    )?;

    for (name, option) in document.options() {
        let id = option_id(name);
        let href = format!("#{id}");

        writer.start("varlistentry", &[])?;
        writer.start("term", &[("xlink:href", href.as_str()), ("xml:id", id.as_str())])?;
        writer.text_element("option", &[], name)?;
        writer.end("term")?;

        writer.start("listitem", &[])?;
        writer.text_element("para", &[], &option.description)?;
        labeled_para(&mut writer, "Type:", &option.type_name, false)?;
        if let Some(default) = &option.default {
            labeled_para(&mut writer, "Default:", &literal_text(default), true)?;
        }
        if let Some(example) = &option.example {
            labeled_para(&mut writer, "Example:", &literal_text(example), true)?;
        }
        if option.read_only {
            writer.text_element("para", &[], "Read only.")?;
        }

        if !option.declarations.is_empty() {
            let mut para = DocbookWriter::inline();
            para.text_element("emphasis", &[], "Declared by:")?;
            writer.para(para)?;
            writer.start("simplelist", &[])?;
            for site in &option.declarations {
                writer.start("member", &[])?;
                declaration(&mut writer, site)?;
                writer.end("member")?;
            }
            writer.end("simplelist")?;
        }

        writer.end("listitem")?;
        writer.end("varlistentry")?;
    }

    writer.end("variablelist")?;
    writer.finish()
}

/// Identifier of an option usable as `xml:id`.
///
/// Characters outside `[A-Za-z0-9._-]` are replaced by underscores, e.g.,
/// `users.users.<name>.home` becomes `opt-users.users._name_.home`.
pub fn option_id(name: &str) -> String {
    let sanitized = name
        .chars()
        .map(|ch| match ch {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' => ch,
            _ => '_',
        })
        .collect::<String>();

    format!("opt-{sanitized}")
}

/// Text rendition of a default or example value.
///
/// Values tagged as literal expressions or literal Markdown render their text
/// verbatim. Everything else renders as compact JSON.
pub fn literal_text(value: &Value) -> String {
    let tagged = value
        .get("_type")
        .and_then(Value::as_str)
        .filter(|kind| matches!(*kind, "literalExpression" | "literalMD" | "literalDocBook"));

    match (tagged, value.get("text").and_then(Value::as_str)) {
        (Some(_), Some(text)) => text.into(),
        _ => value.to_string(),
    }
}

fn labeled_para(writer: &mut DocbookWriter, label: &str, text: &str, literal: bool) -> Result<()> {
    let mut para = DocbookWriter::inline();
    para.text_element("emphasis", &[], label)?;
    para.text(" ")?;
    if literal {
        para.text_element("literal", &[], text)?;
    } else {
        para.text(text)?;
    }
    writer.para(para)
}

fn declaration(writer: &mut DocbookWriter, site: &NormalizedRef) -> Result<()> {
    match site.url() {
        Some(url) => writer.text_element("filename", &[("xlink:href", url)], site.name()),
        None => writer.text_element("filename", &[], site.name()),
    }
}

struct DocbookWriter {
    inner: Writer<Vec<u8>>,
}

impl DocbookWriter {
    fn new() -> Self {
        Self {
            inner: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    /// Writer for mixed content, where indentation would leak into text.
    fn inline() -> Self {
        Self {
            inner: Writer::new(Vec::new()),
        }
    }

    /// Wrap inline markup in a paragraph.
    fn para(&mut self, content: DocbookWriter) -> Result<()> {
        let markup = content.finish()?;
        self.start("para", &[])?;
        // INVARIANT: Markup is already escaped by the inline writer.
        self.event(Event::Text(BytesText::from_escaped(markup)))?;
        self.end("para")
    }

    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.inner
            .write_event(event)
            .map_err(|err| DocbookError::Write(err.to_string()))
    }

    fn start(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<()> {
        let mut element = BytesStart::new(name);
        for attribute in attributes {
            element.push_attribute(*attribute);
        }
        self.event(Event::Start(element))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn text(&mut self, text: &str) -> Result<()> {
        self.event(Event::Text(BytesText::new(text)))
    }

    fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<()> {
        self.start(name, attributes)?;
        self.text(text)?;
        self.end(name)
    }

    fn finish(self) -> Result<String> {
        Ok(String::from_utf8(self.inner.into_inner())?)
    }
}

/// DocBook rendition error types.
#[derive(Debug, thiserror::Error)]
pub enum DocbookError {
    /// Markup cannot be written.
    #[error("failed to write docbook markup: {0}")]
    Write(String),

    /// Written markup is not valid UTF-8.
    #[error(transparent)]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Friendly result alias :3
type Result<T, E = DocbookError> = std::result::Result<T, E>;
