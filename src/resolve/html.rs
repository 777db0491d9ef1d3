//! Visible-text extraction for scraped pages.
//!
//! Just enough HTML handling for a label/value scan: script and style
//! subtrees dropped, tags stripped, line-breaking tags turned into
//! newlines so a label and its value land on separate lines even in
//! minified markup.

/// Reduce an HTML document to its visible text.
pub fn visible_text(html: &str) -> String {
    let without_scripts = drop_element(html, "script");
    let without_styles = drop_element(&without_scripts, "style");
    decode_entities(&strip_tags(&without_styles))
}

/// Remove every `<tag ...>...</tag>` block, case-insensitive. An
/// unterminated block swallows the rest of the document.
fn drop_element(s: &str, tag: &str) -> String {
    let lower = s.to_ascii_lowercase();
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);

    let mut out = String::with_capacity(s.len());
    let mut pos = 0;
    while let Some(rel) = lower[pos..].find(&open) {
        let start = pos + rel;
        let after_name = start + open.len();
        // "<scriptsize>" is not a script tag
        let is_tag = lower[after_name..]
            .chars()
            .next()
            .map_or(true, |c| c == '>' || c == '/' || c.is_whitespace());
        if !is_tag {
            out.push_str(&s[pos..after_name]);
            pos = after_name;
            continue;
        }
        out.push_str(&s[pos..start]);
        match lower[after_name..].find(&close) {
            Some(c) => pos = after_name + c + close.len(),
            None => return out,
        }
    }
    out.push_str(&s[pos..]);
    out
}

/// Strip tags, keeping the source text's own whitespace and inserting a
/// newline where a line-breaking tag opened or closed.
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut tag = String::new();
    let mut in_tag = false;

    for ch in s.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                if breaks_line(&tag) {
                    out.push('\n');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => out.push(ch),
        }
    }
    out
}

fn breaks_line(tag: &str) -> bool {
    let name = tag.trim_start_matches('/');
    let name = name
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or("");
    matches!(
        name.to_ascii_lowercase().as_str(),
        "br" | "p" | "div" | "li" | "ul" | "ol" | "tr" | "td" | "th" | "table" | "dt" | "dd"
            | "dl" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "section" | "article" | "header"
            | "footer" | "main" | "nav"
    )
}

/// Decode the entities that actually show up on the school pages: the
/// HTML core set, the Swedish vowels, and numeric references.
fn decode_entities(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(i) = rest.find('&') {
        out.push_str(&rest[..i]);
        let tail = &rest[i..];
        match tail.find(';') {
            Some(j) if j > 1 && j <= 9 => match entity(&tail[1..j]) {
                Some(c) => {
                    out.push(c);
                    rest = &tail[j + 1..];
                }
                None => {
                    out.push('&');
                    rest = &tail[1..];
                }
            },
            _ => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn entity(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = if let Some(hex) = num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            num.parse().ok()?
        };
        return char::from_u32(code);
    }
    let c = match name {
        "amp" => '&',
        "nbsp" => ' ',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "aring" => 'å',
        "auml" => 'ä',
        "ouml" => 'ö',
        "Aring" => 'Å',
        "Auml" => 'Ä',
        "Ouml" => 'Ö',
        "eacute" => 'é',
        _ => return None,
    };
    Some(c)
}
