/// Maps full-width ASCII variants (U+FF01..=U+FF5E) to their ASCII forms
fn fold_full_width(ch: char) -> char {
    match ch {
        '\u{FF01}'..='\u{FF5E}' => char::from_u32(ch as u32 - 0xFEE0).unwrap_or(ch),
        _ => ch,
    }
}

fn is_invisible(ch: char) -> bool {
    matches!(ch, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}')
}

/// Canonical form of a hand-typed account name: surrounding whitespace
/// removed, any run of whitespace (including U+3000) collapsed to one ASCII
/// space, full-width letters and digits folded. Case is preserved.
pub fn normalize_account_name(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_space = false;

    for ch in input.chars() {
        if is_invisible(ch) {
            continue;
        }
        let ch = fold_full_width(ch);
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        out.push(ch);
    }

    out
}
