//! Delimited-text tokenizer
//!
//! Single pass over the input with an "inside quotes" flag. Outside quotes a
//! comma closes the cell and `\n`, `\r` or `\r\n` closes the row; a double
//! quote switches into quoted mode where everything is literal except `""`
//! (one escaped quote) and a lone `"` (end of quoted mode). Cells are trimmed
//! when they close.

/// Rows of cells, in input order.
pub type Grid = Vec<Vec<String>>;

const BOM: char = '\u{feff}';

pub fn tokenize(text: &str) -> Grid {
    let text = text.strip_prefix(BOM).unwrap_or(text);

    let mut rows: Grid = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut cell = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    cell.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                cell.push(ch);
            }
            continue;
        }

        match ch {
            '"' => in_quotes = true,
            ',' => row.push(take_cell(&mut cell)),
            '\n' | '\r' => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take_cell(&mut cell));
                rows.push(std::mem::take(&mut row));
            }
            _ => cell.push(ch),
        }
    }

    // No trailing newline: flush whatever is pending.
    if !cell.is_empty() || !row.is_empty() {
        row.push(take_cell(&mut cell));
        rows.push(row);
    }

    rows
}

/// Drops rows with no cells or only empty cells.
pub fn retain_non_empty(rows: Grid) -> Grid {
    rows.into_iter()
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect()
}

fn take_cell(cell: &mut String) -> String {
    let value = cell.trim().to_string();
    cell.clear();
    value
}
