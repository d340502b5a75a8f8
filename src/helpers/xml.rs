//! XML utilities for SpreadsheetML parts
//! Provides an XML reader wrapper, helper traits for attribute and text processing,
//! and a small writer helper used when serializing worksheets

use crate::error::SplitterError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::BytesDecl;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Reader;
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::BufRead;
use std::io::Write;
use std::str::FromStr;
use thiserror::Error;

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),

    #[error("Parse attribute value '{0}' failed")]
    ParseAttributeValueError(String),
}

/// XML reader wrapper with optimized configuration for spreadsheet parsing
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    /// Creates a new XML reader with optimized configuration for spreadsheet parsing
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        let buffer = Vec::with_capacity(1024);
        XmlReader { reader, buffer }
    }

    /// Reads the next XML event from the reader
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, SplitterError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer) {
            Ok(Event::Eof) => Ok(None),
            Ok(event) => Ok(Some(event)),
            Err(error) => Err(SplitterError::XmlError(error)),
        }
    }
}

/// Helper trait for XML attributes providing convenient value extraction and parsing
pub(crate) trait XmlAttributeHelper<'a> {
    /// Gets the unescaped attribute value as a string
    fn get_value(&self) -> Result<Cow<'a, str>, SplitterError>;

    /// Parses the attribute value to the specified type
    fn parse_value<T: FromStr>(&self) -> Result<T, SplitterError>;
}

impl<'a> XmlAttributeHelper<'a> for Attribute<'a> {
    fn get_value(&self) -> Result<Cow<'a, str>, SplitterError> {
        Ok(self.unescape_value()?)
    }

    fn parse_value<T: FromStr>(&self) -> Result<T, SplitterError> {
        self.get_value()?
            .parse()
            .map_err(|_| match std::str::from_utf8(&self.value) {
                Ok(value) => SplitterError::XmlHelperError(XmlError::ParseAttributeValueError(value.to_string())),
                Err(error) => SplitterError::StringEncodingError(error),
            })
    }
}

/// Helper trait for XML nodes providing attribute access methods
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets an attribute value by name
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SplitterError>;

    /// Gets an attribute value by local name, ignoring any namespace prefix (`r:id` matches `id`)
    fn get_local_attribute_value(&'a self, local_name: &str) -> Result<Option<Cow<'a, str>>, SplitterError>;

    /// Parses an attribute value to the specified type
    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, SplitterError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, SplitterError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.get_value())
            .transpose()
    }

    fn get_local_attribute_value(&'a self, local_name: &str) -> Result<Option<Cow<'a, str>>, SplitterError> {
        for result in self.attributes() {
            let attribute = result?;
            if attribute.key.local_name().as_ref() == local_name.as_bytes() {
                return Ok(Some(attribute.get_value()?));
            }
        }
        Ok(None)
    }

    fn parse_attribute_value<T: FromStr>(&self, name: &str) -> Result<Option<T>, SplitterError> {
        self.try_get_attribute(name)?
            .map(|attribute| attribute.parse_value())
            .transpose()
    }
}

/// Helper trait for building text content from XML events
pub(crate) trait XmlTextContextHelper {
    /// Appends text content from BytesText event
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), SplitterError>;

    /// Appends text content from BytesRef event (handles entities and character references)
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SplitterError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_text(&mut self, text: &BytesText) -> Result<(), SplitterError> {
        self.push_str(&text.xml_content()?);
        Ok(())
    }

    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), SplitterError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = if let Some(hex) = number.strip_prefix('x') {
                u32::from_str_radix(hex, 16)?
            } else {
                number.parse::<u32>()?
            };
            if let Some(character) = std::char::from_u32(code) {
                self.push_str(character.encode_utf8(&mut [0u8; 4]));
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }

        Ok(())
    }
}

/// Helper trait for emitting SpreadsheetML with a quick-xml writer
pub(crate) trait XmlWriterHelper {
    /// Writes the standalone UTF-8 XML declaration
    fn declaration(&mut self) -> Result<(), SplitterError>;

    /// Opens an element with the given attributes
    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), SplitterError>;

    /// Closes an element
    fn close(&mut self, name: &str) -> Result<(), SplitterError>;

    /// Writes a self-closing element with the given attributes
    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), SplitterError>;

    /// Writes escaped text content, dropping characters XML 1.0 cannot carry
    fn text(&mut self, text: &str) -> Result<(), SplitterError>;
}

impl<W: Write> XmlWriterHelper for Writer<W> {
    fn declaration(&mut self) -> Result<(), SplitterError> {
        self.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        Ok(())
    }

    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), SplitterError> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.write_event(Event::Start(element))?;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<(), SplitterError> {
        self.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), SplitterError> {
        let element = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.write_event(Event::Empty(element))?;
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), SplitterError> {
        let clean: Cow<str> = if text.chars().any(is_forbidden_xml_char) {
            Cow::Owned(text.chars().filter(|c| !is_forbidden_xml_char(*c)).collect())
        } else {
            Cow::Borrowed(text)
        };
        self.write_event(Event::Text(BytesText::new(&clean)))?;
        Ok(())
    }
}

/// Control characters other than tab, newline and carriage return are not allowed in XML 1.0
fn is_forbidden_xml_char(c: char) -> bool {
    (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r')
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_escapes_text_and_drops_control_characters() {
        let mut writer = Writer::new(Vec::new());
        writer.open("t", &[]).unwrap();
        writer.text("a < b & \u{1}c").unwrap();
        writer.close("t").unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(xml, "<t>a &lt; b &amp; c</t>");
    }

    #[test]
    fn reader_resolves_local_attribute_names() -> Result<(), SplitterError> {
        let mut reader = XmlReader::new(r#"<hyperlink ref="A1" r:id="rId3"/>"#.as_bytes());
        let mut id = None;
        match_xml_events!(reader => {
            Event::Start(event) => {
                id = event.get_local_attribute_value("id")?.map(|value| value.to_string());
            }
        });
        assert_eq!(id.as_deref(), Some("rId3"));
        Ok(())
    }
}
