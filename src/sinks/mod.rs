pub mod console;
pub mod file;

use crate::storage::Bulk;

/// Renders a bulk as `bulk: a, b, c`, no trailing comma, newline-terminated.
fn format_bulk(bulk: &Bulk) -> String {
    let mut line = String::from("bulk: ");
    line.push_str(&bulk.commands.join(", "));
    line.push('\n');
    line
}
