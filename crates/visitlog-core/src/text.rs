//! Plain-text extraction for HTML-bearing visit fields.
//!
//! Change detection and display both go through [`plain_text`], so the two
//! never disagree about whether an edit changed anything. The extraction is
//! deliberately small and deterministic:
//!
//! - tags are removed; block-level tags become line breaks
//! - `<script>` and `<style>` bodies are dropped, as are `<!-- -->` comments
//! - named (`&amp;`, `&lt;`, `&gt;`, `&quot;`, `&apos;`, `&#39;`, `&nbsp;`)
//!   and numeric (`&#NN;`, `&#xHH;`) entities are decoded
//! - whitespace runs collapse to one space, blank lines are dropped, and the
//!   result is trimmed

const BLOCK_TAGS: &[&str] = &[
    "p",
    "div",
    "br",
    "li",
    "ul",
    "ol",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "tr",
    "blockquote",
];

const RAW_TEXT_TAGS: &[&str] = &["script", "style"];

/// Longest entity body we try to decode, e.g. `#x10FFFF`.
const MAX_ENTITY_LEN: usize = 10;

/// Convert an HTML fragment (or plain text) to normalized plain text.
#[must_use]
pub fn plain_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < input.len() {
        let rest = &input[i..];

        // A comment ends at `-->`, not at the first `>` inside it.
        if let Some(body) = rest.strip_prefix("<!--") {
            i += 4 + body.find("-->").map_or(body.len(), |end| end + 3);
            continue;
        }

        if rest.starts_with('<') && looks_like_tag(rest) {
            if let Some(end) = rest.find('>') {
                let tag = &rest[1..end];
                let name = tag_name(tag);
                i += end + 1;

                if !tag.starts_with('/') && RAW_TEXT_TAGS.contains(&name.as_str()) {
                    i += skip_raw_text(&input[i..], &name);
                    continue;
                }

                if BLOCK_TAGS.contains(&name.as_str()) {
                    out.push('\n');
                }
                continue;
            }
        }

        if rest.starts_with('&') {
            if let Some((decoded, len)) = decode_entity(rest) {
                out.push(decoded);
                i += len;
                continue;
            }
        }

        let Some(ch) = rest.chars().next() else {
            break;
        };
        out.push(ch);
        i += ch.len_utf8();
    }

    normalize_whitespace(&out)
}

/// `<` only opens a tag when followed by a letter, `/`, or `!`.
fn looks_like_tag(rest: &str) -> bool {
    rest[1..]
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '/' || c == '!')
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Length of `body` up to and including the closing `</name ...>` tag.
fn skip_raw_text(body: &str, name: &str) -> usize {
    let close = format!("</{name}");
    // ASCII lowercasing keeps byte offsets stable.
    let lowered = body.to_ascii_lowercase();
    let Some(start) = lowered.find(&close) else {
        return body.len();
    };
    body[start..]
        .find('>')
        .map_or(body.len(), |gt| start + gt + 1)
}

/// Decode an entity at the start of `rest`, returning the char and the
/// number of bytes consumed.
fn decode_entity(rest: &str) -> Option<(char, usize)> {
    let semi = rest
        .char_indices()
        .take(MAX_ENTITY_LEN + 2)
        .find(|&(_, c)| c == ';')
        .map(|(idx, _)| idx)?;
    let body = &rest[1..semi];

    let decoded = match body {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        _ => {
            let digits = body.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse::<u32>().ok()?,
            };
            char::from_u32(code)?
        }
    };

    Some((decoded, semi + 1))
}

fn normalize_whitespace(s: &str) -> String {
    s.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::plain_text;

    #[test]
    fn plain_input_is_trimmed_only() {
        assert_eq!(plain_text("  Plan A  "), "Plan A");
        assert_eq!(plain_text(""), "");
    }

    #[test]
    fn paragraph_wrapper_is_removed() {
        assert_eq!(plain_text("<p>Plan A</p>"), "Plan A");
        assert_eq!(plain_text("<p>Plan A</p>"), plain_text("Plan A"));
    }

    #[test]
    fn block_tags_become_line_breaks() {
        assert_eq!(
            plain_text("<p>First</p><p>Second</p><ul><li>a</li><li>b</li></ul>"),
            "First\nSecond\na\nb"
        );
        assert_eq!(plain_text("one<br>two<br/>three"), "one\ntwo\nthree");
    }

    #[test]
    fn inline_tags_do_not_split_words() {
        assert_eq!(plain_text("<p>Hello <b>big</b> <i>world</i></p>"), "Hello big world");
        assert_eq!(plain_text("pre<span>fix</span>"), "prefix");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(plain_text("Fish &amp; chips"), "Fish & chips");
        assert_eq!(plain_text("&lt;tag&gt; &quot;q&quot; &#39;s&apos;"), "<tag> \"q\" 's'");
        assert_eq!(plain_text("&#65;&#x42;"), "AB");
        assert_eq!(plain_text("a&nbsp;&nbsp;b"), "a b");
    }

    #[test]
    fn unknown_entities_stay_literal() {
        assert_eq!(plain_text("AT&T rocks"), "AT&T rocks");
        assert_eq!(plain_text("&bogus;"), "&bogus;");
    }

    #[test]
    fn comparison_operators_are_not_tags() {
        assert_eq!(plain_text("a < b and c > d"), "a < b and c > d");
        assert_eq!(plain_text("x <3"), "x <3");
    }

    #[test]
    fn script_and_style_bodies_are_dropped() {
        assert_eq!(
            plain_text("<style>p { color: red }</style><p>Visible</p><script>alert(1)</script>"),
            "Visible"
        );
        assert_eq!(plain_text("<SCRIPT>x</SCRIPT>after"), "after");
    }

    #[test]
    fn unclosed_script_swallows_rest() {
        assert_eq!(plain_text("keep<script>never closed"), "keep");
    }

    #[test]
    fn whitespace_is_collapsed() {
        assert_eq!(plain_text("a \t  b\n\n\n  c  "), "a b\nc");
        assert_eq!(plain_text("<p>  spaced   out </p>\n<p></p>"), "spaced out");
    }

    #[test]
    fn multibyte_text_survives() {
        assert_eq!(plain_text("<p>Café naïve résumé</p>"), "Café naïve résumé");
    }

    #[test]
    fn comments_and_doctype_are_removed() {
        assert_eq!(plain_text("<!-- note -->text"), "text");
        assert_eq!(plain_text("<!DOCTYPE html><p>x</p>"), "x");
    }

    #[test]
    fn comment_ends_at_closing_marker() {
        assert_eq!(plain_text("<!-- a > b -->Plan"), "Plan");
        assert_eq!(
            plain_text("<!--[if gte mso 9]><xml><o:Office/></xml><![endif]--><p>Agenda</p>"),
            "Agenda"
        );
    }

    #[test]
    fn unclosed_comment_swallows_rest() {
        assert_eq!(plain_text("Plan<!-- draft > notes"), "Plan");
    }
}
