//! Line classification for Ren'Py-style script source.
//!
//! Pure functions over a single line of text. The tree builder decides where
//! blocks begin and end entirely from these predicates plus the indentation
//! metric below.

/// Returns the label name when the line is a `label name:` statement.
pub fn is_label(line: &str) -> Option<&str> {
    let line = line.trim();
    if line.starts_with("label ") && line.ends_with(':') {
        Some(line[6..line.len() - 1].trim())
    } else {
        None
    }
}

pub fn is_if_statement(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("if ") && line.ends_with(':')
}

pub fn is_elif_statement(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("elif ") && line.ends_with(':')
}

pub fn is_else_statement(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("else") && line.ends_with(':')
}

pub fn is_menu_statement(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("menu") && line.ends_with(':')
}

/// True when the line opens any control statement. Used to decide where a
/// plain content segment has to stop.
pub fn is_statement(line: &str) -> bool {
    let line = line.trim_start();
    line.starts_with("if ")
        || line.starts_with("elif ")
        || line.starts_with("else")
        || line.starts_with("menu")
}

/// Indentation depth of a line under the mixed tab/space metric.
///
/// A tab resets the space run and always counts one unit; every 4th
/// consecutive space counts one unit and resets the run; any other character
/// stops the scan. A trailing space run shorter than 4 contributes nothing.
pub fn indent_level(line: &str) -> usize {
    let mut indent = 0;
    let mut run = 0;
    for ch in line.chars() {
        match ch {
            '\t' => {
                run = 0;
                indent += 1;
            }
            ' ' => {
                run += 1;
                if run == 4 {
                    indent += 1;
                    run = 0;
                }
            }
            _ => break,
        }
    }
    indent
}
