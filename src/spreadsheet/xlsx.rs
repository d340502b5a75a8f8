use crate::error::ResultMessage;
use crate::error::SplitterError;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel;
use crate::spreadsheet::excel::load_relationships;
use crate::spreadsheet::excel::to_relationships_path;
use crate::spreadsheet::excel::HYPERLINK_RELATIONSHIP;
use crate::spreadsheet::excel::WORKSHEET_RELATIONSHIP;
use crate::spreadsheet::reference::parse_location;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Hyperlink;
use crate::spreadsheet::sheet::LinkTarget;
use crate::spreadsheet::sheet::SheetGrid;
use crate::spreadsheet::sheet::SheetGridBuilder;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use quick_xml::name::QName;
use regex::Regex;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use zip::ZipArchive;

// XML tag names for parsing Excel XLSX format
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts"); // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");   // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");  // Cell format indexes container
const TAG_FORMAT_INDEX: QName = QName(b"xf");         // Individual cell format index
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");   // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");       // Phonetic text for Asian languages
const TAG_TEXT: QName = QName(b"t");                  // Text content within strings
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr"); // Workbook properties
const TAG_SHEET: QName = QName(b"sheet");             // Worksheet definition
const TAG_ROW: QName = QName(b"row");                 // Row in worksheet
const TAG_CELL: QName = QName(b"c");                  // Cell in worksheet
const TAG_INLINE_STRING: QName = QName(b"is");        // Inline string value
const TAG_VALUE: QName = QName(b"v");                 // Cell value content
const TAG_FORMULA: QName = QName(b"f");               // Cell formula
const TAG_HYPERLINK: QName = QName(b"hyperlink");     // Cell hyperlink

/// Matches the target argument of a `HYPERLINK("…", …)` formula
const HYPERLINK_FORMULA_PATTERN: &str = r#"(?i)^\s*=?\s*HYPERLINK\(\s*"([^"]*)""#;

/// A `<hyperlink>` element waiting for its relationship target to be resolved
struct PendingHyperlink {
    reference: String,
    location: Option<String>,
    relationship_id: Option<String>,
}

/// An xlsx workbook opened for reading
pub(crate) struct XlsxWorkbook {
    /// File name of the workbook
    pub(crate) name: String,
    /// ZIP archive containing the XLSX file contents
    zip: ZipArchive<BufReader<File>>,
    /// Parsed number formats for cell type detection
    number_formats: Vec<CellType>,
    /// List of worksheets with (name, zip_path) pairs, in workbook order
    sheets: Vec<(String, String)>,
}

impl XlsxWorkbook {
    /// Opens an XLSX workbook and parses its structure
    pub(crate) fn open(path: &Path) -> Result<XlsxWorkbook, SplitterError> {
        let (zip, number_formats, sheets) = excel::open(path, load_workbook, load_number_formats)?;
        Ok(XlsxWorkbook {
            name: path.display().to_string(),
            zip,
            number_formats,
            sheets,
        })
    }

    /// Loads the whole shared string table; a workbook without one has no shared strings.
    fn load_shared_strings(&mut self) -> Result<Vec<String>, SplitterError> {
        let mut shared_strings = Vec::<String>::new();
        let mut reader = match self.zip.xml_reader("xl/sharedStrings.xml")? {
            Some(reader) => reader,
            None => return Ok(shared_strings),
        };
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
                let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
                shared_strings.push(string);
            }
        });
        Ok(shared_strings)
    }

    /// Reads every worksheet into a [`SheetGrid`], in workbook order.
    pub(crate) fn read_sheets(&mut self) -> Result<Vec<SheetGrid>, SplitterError> {
        let shared_strings = self.load_shared_strings()?;
        let hyperlink_formula = Regex::new(HYPERLINK_FORMULA_PATTERN)?;
        let sheets = self.sheets.clone();
        let mut grids = Vec::with_capacity(sheets.len());
        for (sheet_name, zip_path) in &sheets {
            let grid = self
                .read_sheet(sheet_name, zip_path, &shared_strings, &hyperlink_formula)
                .with_prefix(&format!("Read sheet '{sheet_name}' of '{}'", self.name))?;
            grids.push(grid);
        }
        Ok(grids)
    }

    /// Parses one worksheet part, its cells and its hyperlinks.
    fn read_sheet(
        &mut self,
        sheet_name: &str,
        zip_path: &str,
        shared_strings: &[String],
        hyperlink_formula: &Regex,
    ) -> Result<SheetGrid, SplitterError> {
        let mut builder = SheetGridBuilder::new(sheet_name);
        let mut pending = Vec::<PendingHyperlink>::new();
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        let mut formula_target = None::<String>;
        let mut reader = self.zip.xml_reader(zip_path)?
            .ok_or_else(|| SpreadsheetError::FileError(zip_path.to_owned()))?;
        match_xml_events!(reader => {
            Event::End(event) if event.name() == TAG_ROW => {
                row_count += 1;
                col_count = 0;
            }
            Event::Start(event) if event.name() == TAG_ROW => {
                if let Some(index) = event.parse_attribute_value::<usize>("r")? {
                    row_count = index.saturating_sub(1);
                }
            }
            Event::Start(event) if event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count = col + 1;
                value.clear();
                formula_target = None;
                kind = event.get_attribute_value("t")?.map(|t| {
                    match t.as_ref() {
                        "inlineStr" | "str" | "d" => CellType::InlineString,
                        "s" => CellType::SharedString,
                        "b" => CellType::Boolean,
                        "e" => CellType::Error,
                        _ => CellType::Number,
                    }
                }).unwrap_or(CellType::Number);
                if let Some(format_id) = event.get_attribute_value("s")? {
                    if kind == CellType::Number && !format_id.is_empty() {
                        let index = format_id.parse::<usize>()?;
                        kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
            }
            Event::Start(event) if event.name() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if event.name() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::Start(event) if event.name() == TAG_FORMULA => {
                let formula = read_string_value(&mut reader, TAG_FORMULA, true)?;
                formula_target = hyperlink_formula
                    .captures(&formula)
                    .and_then(|captures| captures.get(1))
                    .map(|target| target.as_str().to_owned());
            }
            Event::End(event) if event.name() == TAG_CELL => {
                if let Some(target) = formula_target.take() {
                    if let Some(target) = formula_link_target(&target) {
                        builder.push_hyperlink(Hyperlink { row, col, target });
                    }
                }
                if kind != CellType::Empty && !value.is_empty() {
                    builder.push(Cell {
                        row,
                        col,
                        kind,
                        value: std::mem::take(&mut value),
                    });
                }
                kind = CellType::default();
            }
            Event::Start(event) if event.name() == TAG_HYPERLINK => {
                if let Some(reference) = event.get_attribute_value("ref")? {
                    pending.push(PendingHyperlink {
                        reference: reference.to_string(),
                        location: event.get_attribute_value("location")?.map(Cow::into_owned),
                        relationship_id: event.get_local_attribute_value("id")?.map(Cow::into_owned),
                    });
                }
            }
        });
        drop(reader);

        if !pending.is_empty() {
            let relationships = load_relationships(&mut self.zip, &to_relationships_path(zip_path), HYPERLINK_RELATIONSHIP)?
                .unwrap_or_default();
            for hyperlink in pending {
                if let Some(hyperlink) = resolve_hyperlink(hyperlink, &relationships) {
                    builder.push_hyperlink(hyperlink);
                }
            }
        }
        Ok(builder.finish(shared_strings))
    }
}

/// Turns a `<hyperlink>` element into an anchored link.
/// A range reference anchors the link on its first cell.
fn resolve_hyperlink(hyperlink: PendingHyperlink, relationships: &HashMap<String, String>) -> Option<Hyperlink> {
    let anchor = hyperlink.reference.split(':').next().unwrap_or_default();
    let (row, col) = reference_to_index(anchor)?;
    let target = if let Some(location) = hyperlink.location.filter(|location| !location.trim().is_empty()) {
        let (sheet, cell) = parse_location(&location)?;
        LinkTarget::Internal { sheet, cell }
    } else {
        let target = relationships.get(hyperlink.relationship_id.as_deref()?)?;
        match target.strip_prefix('#').and_then(parse_location) {
            Some((sheet, cell)) => LinkTarget::Internal { sheet, cell },
            None => LinkTarget::External(target.to_owned()),
        }
    };
    Some(Hyperlink { row, col, target })
}

/// Interprets the first argument of a HYPERLINK formula.
fn formula_link_target(target: &str) -> Option<LinkTarget> {
    let target = target.trim();
    if target.is_empty() {
        None
    } else if let Some(location) = target.strip_prefix('#') {
        let (sheet, cell) = parse_location(location)?;
        Some(LinkTarget::Internal { sheet, cell })
    } else {
        Some(LinkTarget::External(target.to_owned()))
    }
}

/// Loads workbook structure and worksheet information from XLSX file
///
/// Parses the workbook.xml file to extract worksheet names and their corresponding
/// XML file paths, and determines the date system (1900 vs 1904) used in the file.
///
/// # Returns
/// Tuple of (worksheets, is_1904_date_system) where worksheets are (name, zip_path) pairs
fn load_workbook(zip: &mut ZipArchive<BufReader<File>>) -> Result<(Vec<(String, String)>, bool), SplitterError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels", WORKSHEET_RELATIONSHIP)?
        .ok_or_else(|| SpreadsheetError::FileError("xl/_rels/workbook.xml.rels".to_string()))?;
    let mut reader = zip.xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::FileError("xl/workbook.xml".to_string()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.get_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.get_value()?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(target) = relationships.get(id.as_ref()) {
                    sheets.push((name.to_string(), excel::to_zip_path(Cow::Borrowed(target))));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Loads number formats and cell styles from XLSX styles.xml file
///
/// Parses custom number formats and cell style indexes to determine
/// how numeric values should be interpreted (dates, times or plain numbers).
fn load_number_formats(zip: &mut ZipArchive<BufReader<File>>, is_1904: bool) -> Result<Vec<CellType>, SplitterError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut has_custom_formats = false;
    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();

    let mut has_format_indexes = false;
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if !custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            has_custom_formats = true;
            custom_formats_context = true;
        }
        Event::End(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            custom_formats_context = false;
            if has_custom_formats && has_format_indexes {
                break;
            }
        }
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let style = CellType::parse_custom_number_format(&format, is_1904);
                custom_formats.insert(id.to_string(), style);
            }
        }

        Event::Start(event) if !format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            has_format_indexes = true;
            format_indexes_context = true;
        }
        Event::End(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            format_indexes_context = false;
            if has_custom_formats && has_format_indexes {
                break;
            }
        }
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            if let Some(id) = event.get_attribute_value("numFmtId")? {
                format_indexes.push(id.to_string());
            }
        }
    });

    Ok(excel::load_number_formats(format_indexes, custom_formats, is_1904))
}

/// Reads string value from XML content, handling text and CDATA sections
///
/// Extracts string content from XML elements, skipping phonetic text annotations
/// and properly handling both text nodes and CDATA sections.
///
/// # Arguments
/// * `reader` - XML reader positioned at the start of the string content
/// * `end_tag` - XML tag that marks the end of the string content
/// * `is_text_content` - Whether to treat the content as text by default
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, SplitterError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_bytes_text(&event)?,
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}
