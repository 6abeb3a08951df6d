//! Terminal rendering of surface previews.
//!
//! Each character cell shows two vertically stacked pixels using the upper
//! half block with 24-bit foreground and background colours.

use framecast_platform_core::SurfacePreview;

const UPPER_HALF: char = '\u{2580}';
const RESET: &str = "\x1b[0m";

/// Render `preview` `cols` characters wide, preserving aspect ratio.
pub fn render_halfblocks(preview: &SurfacePreview, cols: u32) -> Vec<String> {
    if preview.width == 0 || preview.height == 0 || cols == 0 {
        return Vec::new();
    }
    let cols = cols.min(preview.width);
    let pixel_rows = (u64::from(preview.height) * u64::from(cols) / u64::from(preview.width)).max(2);
    let text_rows = (pixel_rows / 2) as u32;
    let pixel_rows = text_rows * 2;

    let sample = |c: u32, r: u32| {
        let x = (u64::from(c) * u64::from(preview.width) / u64::from(cols)) as u32;
        let y = (u64::from(r) * u64::from(preview.height) / u64::from(pixel_rows)) as u32;
        preview.pixel(x, y)
    };

    (0..text_rows)
        .map(|row| {
            let mut line = String::new();
            for col in 0..cols {
                let [tr, tg, tb] = sample(col, row * 2);
                let [br, bg, bb] = sample(col, row * 2 + 1);
                line.push_str(&format!(
                    "\x1b[38;2;{tr};{tg};{tb}m\x1b[48;2;{br};{bg};{bb}m{UPPER_HALF}"
                ));
            }
            line.push_str(RESET);
            line
        })
        .collect()
}

/// Box drawn in place of a preview that could not be captured.
pub fn placeholder(cols: u32, rows: u32) -> Vec<String> {
    let cols = cols.max(14) as usize;
    let rows = rows.max(3) as usize;
    let label = "no preview";
    let inner = cols - 2;
    let pad_left = (inner - label.len()) / 2;
    let pad_right = inner - label.len() - pad_left;

    let mut lines = Vec::with_capacity(rows);
    lines.push(format!("+{}+", "-".repeat(inner)));
    for i in 1..rows - 1 {
        if i == (rows - 1) / 2 {
            lines.push(format!(
                "|{}{label}{}|",
                " ".repeat(pad_left),
                " ".repeat(pad_right)
            ));
        } else {
            lines.push(format!("|{}|", " ".repeat(inner)));
        }
    }
    lines.push(format!("+{}+", "-".repeat(inner)));
    lines
}
