//! Plain-text rendering of view snapshots

use std::fmt::Write;

use datagraph_engine::{ViewSection, ViewSnapshot};

/// Render every section of a view as an aligned text table
pub fn render_snapshot(title: &str, snapshot: &ViewSnapshot) -> String {
    let mut out = String::new();
    for (port, section) in snapshot.sections.iter().enumerate() {
        let _ = writeln!(out, "== {} [port {}] ({} rows)", title, port, section.total_rows);
        render_section(section, &mut out);
        if section.lines.len() < section.total_rows {
            let _ = writeln!(out, "... {} more", section.total_rows - section.lines.len());
        }
    }
    if snapshot.stale {
        let _ = writeln!(out, "(stale)");
    }
    out
}

fn render_section(section: &ViewSection, out: &mut String) {
    let mut widths: Vec<usize> = section.header.iter().map(|h| h.chars().count()).collect();
    for line in &section.lines {
        for (i, cell) in line.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.chars().count());
            }
        }
    }

    let mut write_line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
            .collect();
        let _ = writeln!(out, "{}", padded.join(" | ").trim_end());
    };
    write_line(&section.header);
    for line in &section.lines {
        write_line(line);
    }
}
