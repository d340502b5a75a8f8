//! Serializes sheet grids into a minimal xlsx package
//!
//! Only content survives a rewrite: cell values, sheet order and hyperlinks.
//! Strings are written inline, so no shared string table is produced.

use crate::error::SplitterError;
use crate::helpers::file::atomic_write_bytes;
use crate::helpers::xml::XmlWriterHelper;
use crate::helpers::zip::pack_parts;
use crate::spreadsheet::cell::CellValue;
use crate::spreadsheet::reference::format_location;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::sheet::LinkTarget;
use crate::spreadsheet::sheet::SheetGrid;
use quick_xml::Writer;
use std::path::Path;

const NS_PACKAGE_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";
const NS_PACKAGE_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

const TYPE_OFFICE_DOCUMENT: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument";
const TYPE_WORKSHEET: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet";
const TYPE_STYLES: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles";
const TYPE_HYPERLINK: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink";

const CONTENT_RELATIONSHIPS: &str = "application/vnd.openxmlformats-package.relationships+xml";
const CONTENT_XML: &str = "application/xml";
const CONTENT_WORKBOOK: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml";
const CONTENT_STYLES: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml";
const CONTENT_WORKSHEET: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml";

/// Writes `sheets` to `path` as a new workbook, replacing any existing file atomically.
pub fn write_workbook(path: &Path, sheets: &[SheetGrid]) -> Result<(), SplitterError> {
    let bytes = to_xlsx_bytes(sheets)?;
    atomic_write_bytes(path, &bytes)
}

/// Serializes `sheets` into the bytes of an xlsx package.
pub fn to_xlsx_bytes(sheets: &[SheetGrid]) -> Result<Vec<u8>, SplitterError> {
    let mut parts = Vec::<(String, Vec<u8>)>::with_capacity(sheets.len() * 2 + 5);
    parts.push(("[Content_Types].xml".to_owned(), content_types(sheets.len())?));
    parts.push(("_rels/.rels".to_owned(), package_relationships()?));
    parts.push(("xl/workbook.xml".to_owned(), workbook(sheets)?));
    parts.push(("xl/_rels/workbook.xml.rels".to_owned(), workbook_relationships(sheets.len())?));
    parts.push(("xl/styles.xml".to_owned(), styles()?));
    for (index, sheet) in sheets.iter().enumerate() {
        let (xml, external_targets) = worksheet(sheet)?;
        let number = index + 1;
        parts.push((format!("xl/worksheets/sheet{number}.xml"), xml));
        if !external_targets.is_empty() {
            parts.push((
                format!("xl/worksheets/_rels/sheet{number}.xml.rels"),
                hyperlink_relationships(&external_targets)?,
            ));
        }
    }
    pack_parts(&parts)
}

fn content_types(sheet_count: usize) -> Result<Vec<u8>, SplitterError> {
    let mut writer = Writer::new(Vec::new());
    writer.declaration()?;
    writer.open("Types", &[("xmlns", NS_PACKAGE_TYPES)])?;
    writer.empty("Default", &[("Extension", "rels"), ("ContentType", CONTENT_RELATIONSHIPS)])?;
    writer.empty("Default", &[("Extension", "xml"), ("ContentType", CONTENT_XML)])?;
    writer.empty("Override", &[("PartName", "/xl/workbook.xml"), ("ContentType", CONTENT_WORKBOOK)])?;
    writer.empty("Override", &[("PartName", "/xl/styles.xml"), ("ContentType", CONTENT_STYLES)])?;
    for number in 1..=sheet_count {
        let part_name = format!("/xl/worksheets/sheet{number}.xml");
        writer.empty("Override", &[("PartName", part_name.as_str()), ("ContentType", CONTENT_WORKSHEET)])?;
    }
    writer.close("Types")?;
    Ok(writer.into_inner())
}

fn package_relationships() -> Result<Vec<u8>, SplitterError> {
    let mut writer = Writer::new(Vec::new());
    writer.declaration()?;
    writer.open("Relationships", &[("xmlns", NS_PACKAGE_RELATIONSHIPS)])?;
    writer.empty("Relationship", &[("Id", "rId1"), ("Type", TYPE_OFFICE_DOCUMENT), ("Target", "xl/workbook.xml")])?;
    writer.close("Relationships")?;
    Ok(writer.into_inner())
}

fn workbook(sheets: &[SheetGrid]) -> Result<Vec<u8>, SplitterError> {
    let mut writer = Writer::new(Vec::new());
    writer.declaration()?;
    writer.open("workbook", &[("xmlns", NS_MAIN), ("xmlns:r", NS_RELATIONSHIPS)])?;
    writer.open("sheets", &[])?;
    for (index, sheet) in sheets.iter().enumerate() {
        let sheet_id = (index + 1).to_string();
        let relationship_id = format!("rId{sheet_id}");
        writer.empty("sheet", &[
            ("name", sheet.name.as_str()),
            ("sheetId", sheet_id.as_str()),
            ("r:id", relationship_id.as_str()),
        ])?;
    }
    writer.close("sheets")?;
    writer.close("workbook")?;
    Ok(writer.into_inner())
}

fn workbook_relationships(sheet_count: usize) -> Result<Vec<u8>, SplitterError> {
    let mut writer = Writer::new(Vec::new());
    writer.declaration()?;
    writer.open("Relationships", &[("xmlns", NS_PACKAGE_RELATIONSHIPS)])?;
    for number in 1..=sheet_count {
        let id = format!("rId{number}");
        let target = format!("worksheets/sheet{number}.xml");
        writer.empty("Relationship", &[("Id", id.as_str()), ("Type", TYPE_WORKSHEET), ("Target", target.as_str())])?;
    }
    let styles_id = format!("rId{}", sheet_count + 1);
    writer.empty("Relationship", &[("Id", styles_id.as_str()), ("Type", TYPE_STYLES), ("Target", "styles.xml")])?;
    writer.close("Relationships")?;
    Ok(writer.into_inner())
}

/// The smallest stylesheet spreadsheet applications accept: one font, two fills, one border, one format.
fn styles() -> Result<Vec<u8>, SplitterError> {
    let mut writer = Writer::new(Vec::new());
    writer.declaration()?;
    writer.open("styleSheet", &[("xmlns", NS_MAIN)])?;
    writer.open("fonts", &[("count", "1")])?;
    writer.open("font", &[])?;
    writer.empty("sz", &[("val", "11")])?;
    writer.empty("name", &[("val", "Calibri")])?;
    writer.close("font")?;
    writer.close("fonts")?;
    writer.open("fills", &[("count", "2")])?;
    for pattern in ["none", "gray125"] {
        writer.open("fill", &[])?;
        writer.empty("patternFill", &[("patternType", pattern)])?;
        writer.close("fill")?;
    }
    writer.close("fills")?;
    writer.open("borders", &[("count", "1")])?;
    writer.open("border", &[])?;
    for side in ["left", "right", "top", "bottom", "diagonal"] {
        writer.empty(side, &[])?;
    }
    writer.close("border")?;
    writer.close("borders")?;
    writer.open("cellStyleXfs", &[("count", "1")])?;
    writer.empty("xf", &[("numFmtId", "0"), ("fontId", "0"), ("fillId", "0"), ("borderId", "0")])?;
    writer.close("cellStyleXfs")?;
    writer.open("cellXfs", &[("count", "1")])?;
    writer.empty("xf", &[("numFmtId", "0"), ("fontId", "0"), ("fillId", "0"), ("borderId", "0"), ("xfId", "0")])?;
    writer.close("cellXfs")?;
    writer.close("styleSheet")?;
    Ok(writer.into_inner())
}

/// Serializes one worksheet; returns the part and the external hyperlink targets it references,
/// in relationship id order.
fn worksheet(sheet: &SheetGrid) -> Result<(Vec<u8>, Vec<String>), SplitterError> {
    let mut writer = Writer::new(Vec::new());
    writer.declaration()?;
    writer.open("worksheet", &[("xmlns", NS_MAIN), ("xmlns:r", NS_RELATIONSHIPS)])?;
    writer.open("sheetData", &[])?;
    for (row, cells) in sheet.rows.iter().enumerate() {
        if cells.iter().all(|cell| *cell == CellValue::Empty) {
            continue;
        }
        let row_number = (row + 1).to_string();
        writer.open("row", &[("r", row_number.as_str())])?;
        for (col, cell) in cells.iter().enumerate() {
            write_cell(&mut writer, &index_to_reference(row, col), cell)?;
        }
        writer.close("row")?;
    }
    writer.close("sheetData")?;

    let mut external_targets = Vec::<String>::new();
    if !sheet.hyperlinks.is_empty() {
        writer.open("hyperlinks", &[])?;
        for hyperlink in &sheet.hyperlinks {
            let reference = index_to_reference(hyperlink.row, hyperlink.col);
            match &hyperlink.target {
                LinkTarget::Internal { sheet, cell } => {
                    let location = format_location(sheet, cell);
                    writer.empty("hyperlink", &[("ref", reference.as_str()), ("location", location.as_str())])?;
                }
                LinkTarget::External(target) => {
                    external_targets.push(target.to_owned());
                    let id = format!("rId{}", external_targets.len());
                    writer.empty("hyperlink", &[("ref", reference.as_str()), ("r:id", id.as_str())])?;
                }
            }
        }
        writer.close("hyperlinks")?;
    }
    writer.close("worksheet")?;
    Ok((writer.into_inner(), external_targets))
}

fn write_cell(writer: &mut Writer<Vec<u8>>, reference: &str, cell: &CellValue) -> Result<(), SplitterError> {
    match cell {
        CellValue::Empty => (),
        CellValue::Number(value) if value.parse::<f64>().is_ok() => {
            writer.open("c", &[("r", reference)])?;
            writer.open("v", &[])?;
            writer.text(value)?;
            writer.close("v")?;
            writer.close("c")?;
        }
        CellValue::Boolean(value) => {
            writer.open("c", &[("r", reference), ("t", "b")])?;
            writer.open("v", &[])?;
            writer.text(if *value { "1" } else { "0" })?;
            writer.close("v")?;
            writer.close("c")?;
        }
        CellValue::Text(value) | CellValue::Number(value) => {
            writer.open("c", &[("r", reference), ("t", "inlineStr")])?;
            writer.open("is", &[])?;
            writer.open("t", &[("xml:space", "preserve")])?;
            writer.text(value)?;
            writer.close("t")?;
            writer.close("is")?;
            writer.close("c")?;
        }
    }
    Ok(())
}

fn hyperlink_relationships(targets: &[String]) -> Result<Vec<u8>, SplitterError> {
    let mut writer = Writer::new(Vec::new());
    writer.declaration()?;
    writer.open("Relationships", &[("xmlns", NS_PACKAGE_RELATIONSHIPS)])?;
    for (index, target) in targets.iter().enumerate() {
        let id = format!("rId{}", index + 1);
        writer.empty("Relationship", &[
            ("Id", id.as_str()),
            ("Type", TYPE_HYPERLINK),
            ("Target", target.as_str()),
            ("TargetMode", "External"),
        ])?;
    }
    writer.close("Relationships")?;
    Ok(writer.into_inner())
}
