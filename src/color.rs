//! Named CSS colors, rewritten in inline styles and stylesheet rules.

use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    /// The runtime only understands numeric colors.
    static ref NAMED_COLORS: HashMap<&'static str, (u8, u8, u8)> = {
        let mut m = HashMap::new();
        m.insert("black", (0, 0, 0));
        m.insert("silver", (192, 192, 192));
        m.insert("gray", (128, 128, 128));
        m.insert("grey", (128, 128, 128));
        m.insert("white", (255, 255, 255));
        m.insert("maroon", (128, 0, 0));
        m.insert("red", (255, 0, 0));
        m.insert("purple", (128, 0, 128));
        m.insert("fuchsia", (255, 0, 255));
        m.insert("magenta", (255, 0, 255));
        m.insert("green", (0, 128, 0));
        m.insert("lime", (0, 255, 0));
        m.insert("olive", (128, 128, 0));
        m.insert("yellow", (255, 255, 0));
        m.insert("navy", (0, 0, 128));
        m.insert("blue", (0, 0, 255));
        m.insert("teal", (0, 128, 128));
        m.insert("aqua", (0, 255, 255));
        m.insert("cyan", (0, 255, 255));
        m.insert("orange", (255, 165, 0));
        m.insert("pink", (255, 192, 203));
        m.insert("brown", (165, 42, 42));
        m.insert("gold", (255, 215, 0));
        m.insert("indigo", (75, 0, 130));
        m.insert("violet", (238, 130, 238));
        m.insert("coral", (255, 127, 80));
        m.insert("crimson", (220, 20, 60));
        m.insert("salmon", (250, 128, 114));
        m.insert("tomato", (255, 99, 71));
        m.insert("khaki", (240, 230, 140));
        m.insert("beige", (245, 245, 220));
        m.insert("ivory", (255, 255, 240));
        m.insert("lavender", (230, 230, 250));
        m.insert("turquoise", (64, 224, 208));
        m.insert("skyblue", (135, 206, 235));
        m.insert("steelblue", (70, 130, 180));
        m.insert("royalblue", (65, 105, 225));
        m.insert("darkblue", (0, 0, 139));
        m.insert("darkgreen", (0, 100, 0));
        m.insert("darkred", (139, 0, 0));
        m.insert("darkgray", (169, 169, 169));
        m.insert("darkgrey", (169, 169, 169));
        m.insert("lightgray", (211, 211, 211));
        m.insert("lightgrey", (211, 211, 211));
        m.insert("lightblue", (173, 216, 230));
        m.insert("lightgreen", (144, 238, 144));
        m.insert("whitesmoke", (245, 245, 245));
        m.insert("gainsboro", (220, 220, 220));
        m
    };
}

/// Properties whose named colors are rewritten.
pub const COLOR_PROPERTIES: [&str; 3] = ["background-color", "color", "border-color"];

/// `red` → `rgb(255,0,0)`. Unknown names and non-name values yield `None`.
pub fn named_to_rgb(value: &str) -> Option<String> {
    NAMED_COLORS
        .get(value.trim().to_ascii_lowercase().as_str())
        .map(|(r, g, b)| format!("rgb({},{},{})", r, g, b))
}

/// Normalize one declaration value.
pub fn normalize_declaration(name: &str, value: &str) -> String {
    if COLOR_PROPERTIES.contains(&name) {
        if let Some(rgb) = named_to_rgb(value) {
            return rgb;
        }
    }
    value.to_string()
}
