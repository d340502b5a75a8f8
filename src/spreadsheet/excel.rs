//! SpreadsheetML package helpers
use crate::error::SplitterError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use std::io::Seek;
use std::path::Path;
use zip::ZipArchive;

/// XML tag name for relationship elements in Excel files
const TAG_RELATIONSHIP: &[u8] = b"Relationship";

/// Relationship type suffix of worksheet parts
pub(crate) const WORKSHEET_RELATIONSHIP: &str = "/worksheet";

/// Relationship type suffix of hyperlink targets
pub(crate) const HYPERLINK_RELATIONSHIP: &str = "/hyperlink";

/// Opens a workbook package and loads its structure
///
/// # Arguments
/// * `path` - Path to the workbook file
/// * `load_workbook` - Function to load workbook metadata and sheets
/// * `load_number_formats` - Function to load number formatting information
///
/// # Returns
/// Tuple containing:
/// - Zip archive handle
/// - Number format mappings
/// - List of sheet names and their paths
pub(super) fn open<W, F>(path: &Path, load_workbook: W, load_number_formats: F) -> Result<(
    ZipArchive<BufReader<File>>,
    Vec<CellType>,
    Vec<(String, String)>
), SplitterError>
where
    W: Fn(&mut ZipArchive<BufReader<File>>) -> Result<(Vec<(String, String)>, bool), SplitterError>,
    F: Fn(&mut ZipArchive<BufReader<File>>, bool) -> Result<Vec<CellType>, SplitterError>,
{
    let file_name = path.display().to_string();
    let file = File::open(path)?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .map_err(|error| SpreadsheetError::ContainerError(file_name.to_owned(), error.to_string()))?;
    let (sheets, is_1904) = load_workbook(&mut zip)?;
    if sheets.is_empty() {
        Err(SpreadsheetError::SpreadsheetEmptyError(file_name))?
    }

    let number_formats = load_number_formats(&mut zip, is_1904)?;
    Ok((zip, number_formats, sheets))
}

/// Loads relationships of one kind from a `.rels` part
///
/// # Arguments
/// * `zip` - Zip archive handle
/// * `path` - Path to the relationships XML file within the archive
/// * `kind_suffix` - Relationship type suffix to keep (e.g. `/worksheet`)
///
/// # Returns
/// Mapping of relationship IDs to raw targets, or `None` if the part does not exist
pub(super) fn load_relationships<RS: Read + Seek>(
    zip: &mut ZipArchive<RS>,
    path: &str,
    kind_suffix: &str,
) -> Result<Option<HashMap<String, String>>, SplitterError> {
    let mut reader = match zip.xml_reader(path)? {
        Some(reader) => reader,
        None => return Ok(None),
    };
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|it| it.ends_with(kind_suffix)).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), target.to_string());
                }
            }
        }
    });
    Ok(Some(relationships))
}

/// Maps format indexes to cell types using custom and built-in formats
///
/// # Arguments
/// * `format_indexes` - List of format identifiers
/// * `custom_formats` - Custom format mappings defined in the workbook
/// * `is_1904` - Whether the workbook uses the 1904 date system
///
/// # Returns
/// Vector of cell types corresponding to each format index
pub(super) fn load_number_formats(format_indexes: Vec<String>, custom_formats: HashMap<String, CellType>, is_1904: bool) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Normalizes a workbook relationship target to a path inside the archive
pub(crate) fn to_zip_path(path: Cow<'_, str>) -> String {
    if path.starts_with("/xl/") {
        path[1..].to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Path of the relationships part that belongs to `part`
/// (`xl/worksheets/sheet1.xml` → `xl/worksheets/_rels/sheet1.xml.rels`)
pub(crate) fn to_relationships_path(part: &str) -> String {
    match part.rsplit_once('/') {
        Some((directory, file_name)) => format!("{directory}/_rels/{file_name}.rels"),
        None => format!("_rels/{part}.rels"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::zip::pack_parts;
    use std::io::Cursor;

    #[test]
    fn normalizes_part_paths() {
        assert_eq!(to_zip_path(Cow::Borrowed("worksheets/sheet1.xml")), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path(Cow::Borrowed("/xl/worksheets/sheet1.xml")), "xl/worksheets/sheet1.xml");
        assert_eq!(to_relationships_path("xl/worksheets/sheet1.xml"), "xl/worksheets/_rels/sheet1.xml.rels");
    }

    #[test]
    fn relationships_are_filtered_by_kind() -> Result<(), SplitterError> {
        let rels = r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
            <Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
            <Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
        </Relationships>"#;
        let bytes = pack_parts(&[("xl/_rels/workbook.xml.rels".to_owned(), rels.as_bytes().to_vec())])?;
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let relationships = load_relationships(&mut zip, "xl/_rels/workbook.xml.rels", WORKSHEET_RELATIONSHIP)?
            .unwrap_or_default();
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships.get("rId1").map(String::as_str), Some("worksheets/sheet1.xml"));
        assert!(load_relationships(&mut zip, "xl/_rels/missing.rels", WORKSHEET_RELATIONSHIP)?.is_none());
        Ok(())
    }

    #[test]
    fn number_formats_fall_back_to_builtin_ids() {
        let mut custom = HashMap::new();
        custom.insert("164".to_owned(), CellType::NumberDate1900);
        let formats = load_number_formats(vec!["0".to_owned(), "164".to_owned(), "22".to_owned()], custom, false);
        assert_eq!(formats, vec![CellType::Number, CellType::NumberDate1900, CellType::NumberDateTime1900]);
    }
}
