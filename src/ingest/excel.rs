// Spreadsheet binaries (xlsx, xls, xlsb, ods): first worksheet only

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use tracing::debug;

use super::tokenizer::Grid;
use crate::types::{AppError, AppResult};

pub fn read_first_sheet(content: &[u8]) -> AppResult<Grid> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content.to_vec()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::Parse("Workbook has no worksheets".to_string()))??;

    debug!(rows = range.height(), columns = range.width(), "Read first worksheet");

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_spreadsheet_bytes() {
        let result = read_first_sheet(b"Name,Email\nAlice,a@b.c");
        assert!(matches!(result, Err(AppError::Parse(_))));
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("Alice".to_string())), "Alice");
        assert_eq!(cell_text(&Data::Int(42)), "42");
        assert_eq!(cell_text(&Data::Bool(true)), "true");
    }
}
