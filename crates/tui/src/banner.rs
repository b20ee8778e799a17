use std::collections::HashMap;

use once_cell::sync::Lazy;

const GLYPH_ROWS: usize = 6;
const GLYPH_GAP: usize = 1;

type Glyph = [&'static str; GLYPH_ROWS];

static GLYPHS: Lazy<HashMap<char, Glyph>> = Lazy::new(|| {
    HashMap::from([
        ('A', [" ### ", "#   #", "#   #", "#####", "#   #", "#   #"]),
        ('E', ["#####", "#    ", "#### ", "#    ", "#    ", "#####"]),
        ('K', ["#   #", "#  # ", "###  ", "#  # ", "#   #", "#   #"]),
        ('O', [" ### ", "#   #", "#   #", "#   #", "#   #", " ### "]),
        ('R', ["#### ", "#   #", "#   #", "#### ", "#  # ", "#   #"]),
        ('S', [" ####", "#    ", " ### ", "    #", "    #", "#### "]),
        ('T', ["#####", "  #  ", "  #  ", "  #  ", "  #  ", "  #  "]),
        (' ', ["     ", "     ", "     ", "     ", "     ", "     "]),
        ('?', [" ### ", "#   #", "   # ", "  #  ", "     ", "  #  "]),
    ])
});

/// Render `text` as a half-block banner, two bitmap rows per terminal line.
pub fn render(text: &str) -> Vec<String> {
    let mut lines = vec![String::new(); GLYPH_ROWS / 2];
    for (index, ch) in text.chars().map(|c| c.to_ascii_uppercase()).enumerate() {
        let Some(glyph) = GLYPHS.get(&ch).or_else(|| GLYPHS.get(&'?')) else {
            continue;
        };
        for (line_idx, line) in lines.iter_mut().enumerate() {
            if index > 0 {
                line.extend(std::iter::repeat(' ').take(GLYPH_GAP));
            }
            let top = glyph[line_idx * 2].chars();
            let bottom = glyph[line_idx * 2 + 1].chars();
            line.extend(top.zip(bottom).map(|pair| match pair {
                ('#', '#') => '█',
                ('#', _) => '▀',
                (_, '#') => '▄',
                _ => ' ',
            }));
        }
    }
    lines
        .into_iter()
        .map(|line| line.trim_end().to_string())
        .collect()
}
