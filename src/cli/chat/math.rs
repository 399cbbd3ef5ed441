use crossterm::style::Stylize;
use regex::Regex;

/// Delimiter pairs recognized for typesetting, tried left-to-right at each
/// position: `$$…$$` and `\[…\]` select display mode, `\(…\)` and `$…$`
/// inline mode. `$$` must come before `$` so a display span is never eaten as
/// two inline ones. Inline `$…$` may not span a line break.
const DELIMITER_PATTERN: &str =
    r"(?s)\$\$(.+?)\$\$|\\\[(.+?)\\\]|\\\((.+?)\\\)|\$([^$\n]+?)\$";

/// One span of a rendered text blob: plain prose, or math eligible for
/// typesetting in inline or display mode. The delimiters themselves are not
/// part of the span content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MathSegment {
    Text(String),
    Inline(String),
    Display(String),
}

/// Splits a text blob into prose and math spans. Matching is left-to-right
/// and non-overlapping; malformed or unmatched delimiters stay inside plain
/// text spans untouched. Pure and idempotent over the source text.
pub fn render_math(content: &str) -> Vec<MathSegment> {
    let re = match Regex::new(DELIMITER_PATTERN) {
        Ok(re) => re,
        Err(_) => return vec![MathSegment::Text(content.to_string())],
    };

    let mut segments = Vec::new();
    let mut last_end = 0;

    for captures in re.captures_iter(content) {
        let whole = match captures.get(0) {
            Some(m) => m,
            None => continue,
        };
        if whole.start() > last_end {
            segments.push(MathSegment::Text(
                content[last_end..whole.start()].to_string(),
            ));
        }

        if let Some(m) = captures.get(1) {
            segments.push(MathSegment::Display(m.as_str().to_string()));
        } else if let Some(m) = captures.get(2) {
            segments.push(MathSegment::Display(m.as_str().to_string()));
        } else if let Some(m) = captures.get(3) {
            segments.push(MathSegment::Inline(m.as_str().to_string()));
        } else if let Some(m) = captures.get(4) {
            segments.push(MathSegment::Inline(m.as_str().to_string()));
        }

        last_end = whole.end();
    }

    if last_end < content.len() {
        segments.push(MathSegment::Text(content[last_end..].to_string()));
    }

    segments
}

/// A pluggable typesetting backend. Returns the rendered form of a math span,
/// or `None` to leave the span as literal text. Implementations must not fail
/// on malformed LaTeX.
pub trait Typesetter {
    fn typeset(&self, latex: &str, display: bool) -> Option<String>;
}

/// Typesets math for a terminal: a handful of common LaTeX commands become
/// their unicode glyphs, the rest of the source is shown as-is, and the whole
/// span is styled so it stands out from prose. Never errors; an empty span is
/// declined and falls back to its literal form.
pub struct TerminalTypesetter;

const GLYPHS: &[(&str, &str)] = &[
    ("\\times", "×"),
    ("\\cdot", "·"),
    ("\\div", "÷"),
    ("\\pm", "±"),
    ("\\leq", "≤"),
    ("\\geq", "≥"),
    ("\\neq", "≠"),
    ("\\approx", "≈"),
    ("\\infty", "∞"),
    ("\\pi", "π"),
    ("\\theta", "θ"),
    ("\\alpha", "α"),
    ("\\beta", "β"),
    ("\\sqrt", "√"),
    ("\\sum", "Σ"),
    ("\\int", "∫"),
    ("\\rightarrow", "→"),
];

impl Typesetter for TerminalTypesetter {
    fn typeset(&self, latex: &str, display: bool) -> Option<String> {
        let trimmed = latex.trim();
        if trimmed.is_empty() {
            return None;
        }

        let mut rendered = trimmed.to_string();
        for (command, glyph) in GLYPHS {
            rendered = rendered.replace(command, glyph);
        }

        if display {
            Some(format!("\n  {}\n", rendered.bold().cyan()))
        } else {
            Some(rendered.cyan().to_string())
        }
    }
}

/// Renders a text blob for the terminal: prose verbatim, math spans through
/// the given typesetter. A span the typesetter declines is restored to its
/// literal delimited form.
pub fn render_to_terminal(content: &str, typesetter: &dyn Typesetter) -> String {
    let mut out = String::new();
    for segment in render_math(content) {
        match segment {
            MathSegment::Text(text) => out.push_str(&text),
            MathSegment::Inline(latex) => match typesetter.typeset(&latex, false) {
                Some(rendered) => out.push_str(&rendered),
                None => {
                    out.push('$');
                    out.push_str(&latex);
                    out.push('$');
                }
            },
            MathSegment::Display(latex) => match typesetter.typeset(&latex, true) {
                Some(rendered) => out.push_str(&rendered),
                None => {
                    out.push_str("$$");
                    out.push_str(&latex);
                    out.push_str("$$");
                }
            },
        }
    }
    out
}
