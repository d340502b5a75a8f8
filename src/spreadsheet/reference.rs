//! A1-style cell references and `'Sheet'!A1` locations.

/// Converts a column letter sequence (`A`, `AB`) to a 0-based column index.
pub(crate) fn col_to_index(col: &str) -> Option<usize> {
    if col.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for character in col.chars() {
        if !character.is_ascii_alphabetic() {
            return None;
        }
        let digit = (character.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

/// Converts a 1-based row number string to a 0-based row index.
pub(crate) fn row_to_index(row: &str) -> Option<usize> {
    row.parse::<usize>().ok().filter(|row| *row > 0).map(|row| row - 1)
}

/// Converts a 0-based column index to its letter sequence.
pub(crate) fn index_to_col(col: usize) -> String {
    let mut letters = Vec::new();
    let mut value = col + 1;
    while value > 0 {
        let remainder = (value - 1) % 26;
        letters.push((b'A' + remainder as u8) as char);
        value = (value - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// Returns the Excel-style cell reference (e.g., "A1", "B2") for 0-based indexes.
pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    format!("{}{}", index_to_col(col), row + 1)
}

/// Parses an Excel-style cell reference ("B3", "$B$3") into 0-based (row, col).
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let reference = reference.replace('$', "");
    let split = reference.find(|c: char| c.is_ascii_digit())?;
    let (col, row) = reference.split_at(split);
    Some((row_to_index(row)?, col_to_index(col)?))
}

/// Parses an internal link location such as `'Net Revenues'!A1`, `#8!B2` or `Index`.
/// Returns the sheet name and the cell part (defaults to `A1`).
pub fn parse_location(location: &str) -> Option<(String, String)> {
    let location = location.trim().trim_start_matches('#').trim();
    if location.is_empty() {
        return None;
    }
    if let Some(quoted) = location.strip_prefix('\'') {
        // Quoted sheet names escape a single quote by doubling it
        let mut sheet = String::new();
        let mut characters = quoted.char_indices().peekable();
        while let Some((index, character)) = characters.next() {
            if character == '\'' {
                if let Some((_, '\'')) = characters.peek() {
                    sheet.push('\'');
                    characters.next();
                } else {
                    let rest = &quoted[index + 1..];
                    let cell = rest.strip_prefix('!').unwrap_or("A1");
                    return Some((sheet, non_empty_cell(cell)));
                }
            } else {
                sheet.push(character);
            }
        }
        None
    } else {
        match location.rsplit_once('!') {
            Some((sheet, cell)) if !sheet.is_empty() => Some((sheet.to_owned(), non_empty_cell(cell))),
            Some(_) => None,
            None => Some((location.to_owned(), "A1".to_owned())),
        }
    }
}

fn non_empty_cell(cell: &str) -> String {
    let cell = cell.trim();
    if cell.is_empty() { "A1".to_owned() } else { cell.to_owned() }
}

/// Formats an internal link location, always quoting the sheet name.
pub fn format_location(sheet: &str, cell: &str) -> String {
    format!("'{}'!{}", sheet.replace('\'', "''"), cell)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_references() {
        assert_eq!(col_to_index("A"), Some(0));
        assert_eq!(col_to_index("AA"), Some(26));
        assert_eq!(index_to_col(27), "AB");
        assert_eq!(index_to_reference(0, 0), "A1");
        assert_eq!(reference_to_index("$C$12"), Some((11, 2)));
        assert_eq!(reference_to_index("12"), None);
    }

    #[test]
    fn parses_locations() {
        assert_eq!(parse_location("'8'!A1"), Some(("8".to_owned(), "A1".to_owned())));
        assert_eq!(parse_location("#8_1!B2"), Some(("8_1".to_owned(), "B2".to_owned())));
        assert_eq!(parse_location("'It''s'!C3"), Some(("It's".to_owned(), "C3".to_owned())));
        assert_eq!(parse_location("Index"), Some(("Index".to_owned(), "A1".to_owned())));
        assert_eq!(parse_location("  "), None);
        assert_eq!(format_location("It's", "A1"), "'It''s'!A1");
    }
}
