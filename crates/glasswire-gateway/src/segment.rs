//! Re-segmentation of a complete reply into token-sized fragments.
//!
//! A fragment is a run of ordinary characters followed by the run of
//! boundary characters after it, so `"Hi there.\n- a"` becomes
//! `["Hi ", "there.\n- ", "a"]`. Concatenating the fragments always gives
//! back the input exactly.

/// Characters after which a fragment may end.
const BOUNDARIES: &[char] = &[
    ' ', '\t', '\n', '\r', // whitespace
    '.', ',', '!', '?', ';', ':', // punctuation
    '#', '*', '-', '_', '`', '>', '|', '~', // markdown structure
];

fn is_boundary(c: char) -> bool {
    BOUNDARIES.contains(&c)
}

/// Split `text` into fragments that end on boundary characters.
pub fn segment(text: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut start = 0;
    let mut in_boundary = false;

    for (i, c) in text.char_indices() {
        if is_boundary(c) {
            in_boundary = true;
        } else if in_boundary {
            fragments.push(&text[start..i]);
            start = i;
            in_boundary = false;
        }
    }
    if start < text.len() {
        fragments.push(&text[start..]);
    }
    fragments
}
