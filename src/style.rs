//! The CSS subset the playback surface needs.
//!
//! Generated animations drive motion with keyframe rules bound to simple
//! selectors (`.spark`, `#sun`, `circle`) plus inline `style` attributes.
//! This module resolves that subset well enough to answer which elements
//! carry an active animation, and to read and write individual style
//! properties. Combinators, attribute selectors and pseudo-classes are out
//! of scope and simply never match.

/// An ordered set of `name: value` declarations. Later assignments win.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Declarations {
    props: Vec<(String, String)>,
}

impl Declarations {
    /// Parse the inside of a declaration block (or an inline `style`
    /// attribute). Unparseable fragments are dropped.
    pub fn parse(text: &str) -> Self {
        let mut decls = Self::default();
        for piece in split_top_level(text, ';') {
            let Some((name, value)) = piece.split_once(':') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            if !name.is_empty() && !value.is_empty() {
                decls.set(&name, value);
            }
        }
        decls
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.props
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        if let Some(slot) = self.props.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value.to_string();
        } else {
            self.props.push((name, value.to_string()));
        }
    }

    pub fn merge_from(&mut self, other: &Declarations) {
        for (name, value) in &other.props {
            self.set(name, value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Serialize back to `a: b; c: d` form, insertion-ordered.
    pub fn to_css(&self) -> String {
        self.props
            .iter()
            .map(|(n, v)| format!("{n}: {v}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Simple selectors only; anything else never matches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Selector {
    Universal,
    Tag(String),
    Class(String),
    Id(String),
}

impl Selector {
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text == "*" {
            return Some(Self::Universal);
        }
        if text.is_empty() || text.chars().any(|c| c.is_whitespace()) {
            return None;
        }
        if let Some(rest) = text.strip_prefix('.') {
            return is_ident(rest).then(|| Self::Class(rest.to_string()));
        }
        if let Some(rest) = text.strip_prefix('#') {
            return is_ident(rest).then(|| Self::Id(rest.to_string()));
        }
        is_ident(text).then(|| Self::Tag(text.to_ascii_lowercase()))
    }

    pub fn specificity(&self) -> u32 {
        match self {
            Self::Universal => 0,
            Self::Tag(_) => 1,
            Self::Class(_) => 10,
            Self::Id(_) => 100,
        }
    }

    pub fn matches(&self, tag: &str, id: Option<&str>, classes: &[&str]) -> bool {
        match self {
            Self::Universal => true,
            Self::Tag(t) => tag.eq_ignore_ascii_case(t),
            Self::Class(c) => classes.contains(&c.as_str()),
            Self::Id(i) => id == Some(i.as_str()),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Rule {
    pub selector: Selector,
    pub declarations: Declarations,
}

/// All style rules gathered from a document's `<style>` blocks.
#[derive(Clone, Debug, Default)]
pub struct Stylesheet {
    rules: Vec<Rule>,
}

impl Stylesheet {
    pub fn parse(css: &str) -> Self {
        let src = strip_comments(css);
        let mut rules = Vec::new();
        let mut rest = src.as_str();

        loop {
            rest = rest.trim_start();
            if rest.is_empty() {
                break;
            }

            // At-rules (@keyframes, @media, ...) are skipped wholesale; the
            // keyframe bodies themselves are irrelevant to cascade queries.
            if rest.starts_with('@') {
                rest = skip_at_rule(rest);
                continue;
            }

            let Some(open) = rest.find('{') else { break };
            let Some(close) = rest[open..].find('}') else {
                break;
            };
            let selectors = &rest[..open];
            let block = Declarations::parse(&rest[open + 1..open + close]);
            for selector in selectors.split(',') {
                if let Some(selector) = Selector::parse(selector) {
                    rules.push(Rule {
                        selector,
                        declarations: block.clone(),
                    });
                }
            }
            rest = &rest[open + close + 1..];
        }

        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Cascaded declarations for one element, lowest specificity first,
    /// document order breaking ties. Inline style is layered on by the
    /// caller.
    pub fn declarations_for(&self, tag: &str, id: Option<&str>, classes: &[&str]) -> Declarations {
        let mut matched: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|rule| rule.selector.matches(tag, id, classes))
            .collect();
        matched.sort_by_key(|rule| rule.selector.specificity());

        let mut out = Declarations::default();
        for rule in matched {
            out.merge_from(&rule.declarations);
        }
        out
    }
}

/// Value-position keywords of the `animation` shorthand that can never be a
/// keyframes name reference.
const ANIMATION_KEYWORDS: &[&str] = &[
    "normal",
    "reverse",
    "alternate",
    "alternate-reverse",
    "none",
    "forwards",
    "backwards",
    "both",
    "running",
    "paused",
    "infinite",
    "linear",
    "ease",
    "ease-in",
    "ease-out",
    "ease-in-out",
    "step-start",
    "step-end",
    "initial",
    "inherit",
    "unset",
];

/// Name of the animation applied by `decls`, if one is active.
pub fn animation_name(decls: &Declarations) -> Option<String> {
    if let Some(value) = decls.get("animation-name") {
        let first = split_top_level(value, ',').into_iter().next()?.trim();
        if first.is_empty() || first.eq_ignore_ascii_case("none") {
            return None;
        }
        return Some(first.to_string());
    }

    let shorthand = decls.get("animation")?;
    let first = split_top_level(shorthand, ',').into_iter().next()?;
    for token in split_tokens(first) {
        let lowered = token.to_ascii_lowercase();
        if ANIMATION_KEYWORDS.contains(&lowered.as_str())
            || token.contains('(')
            || is_time(token)
            || token.parse::<f64>().is_ok()
        {
            continue;
        }
        return Some(token.to_string());
    }
    None
}

pub fn has_active_animation(decls: &Declarations) -> bool {
    animation_name(decls).is_some()
}

/// Parse a CSS time value (`-2.5s`, `300ms`) into seconds.
pub fn parse_seconds(value: &str) -> Option<f64> {
    let v = value.trim();
    if let Some(ms) = v.strip_suffix("ms").or_else(|| v.strip_suffix("MS")) {
        return ms.trim().parse::<f64>().ok().map(|n| n / 1000.0);
    }
    let v = v.strip_suffix(['s', 'S']).unwrap_or(v);
    v.trim().parse::<f64>().ok()
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_time(token: &str) -> bool {
    let t = token.to_ascii_lowercase();
    let t = t.strip_suffix("ms").or_else(|| t.strip_suffix('s'));
    t.is_some_and(|n| n.parse::<f64>().is_ok())
}

fn strip_comments(css: &str) -> String {
    let mut out = String::with_capacity(css.len());
    let mut rest = css;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start..].find("*/") {
            Some(end) => rest = &rest[start + end + 2..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

fn skip_at_rule(rest: &str) -> &str {
    match rest.find(['{', ';']) {
        Some(i) if rest.as_bytes()[i] == b';' => &rest[i + 1..],
        Some(open) => {
            let mut depth = 0usize;
            for (j, c) in rest[open..].char_indices() {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return &rest[open + j + 1..];
                        }
                    }
                    _ => {}
                }
            }
            ""
        }
        None => "",
    }
}

/// Split on `sep`, ignoring separators inside parentheses.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

/// Whitespace-tokenize, keeping parenthesized groups intact.
fn split_tokens(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start: Option<usize> = None;
    for (i, c) in s.char_indices() {
        match c {
            '(' => {
                depth += 1;
                if start.is_none() {
                    start = Some(i);
                }
            }
            ')' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && depth == 0 => {
                if let Some(st) = start.take() {
                    out.push(&s[st..i]);
                }
            }
            _ => {
                if start.is_none() {
                    start = Some(i);
                }
            }
        }
    }
    if let Some(st) = start {
        out.push(&s[st..]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_parse_and_override() {
        let mut decls = Declarations::parse("fill: red; animation-delay: 1s; fill: blue");
        assert_eq!(decls.get("fill"), Some("blue"));
        assert_eq!(decls.get("animation-delay"), Some("1s"));
        decls.set("animation-delay", "-2s");
        assert_eq!(decls.get("animation-delay"), Some("-2s"));
        assert_eq!(decls.to_css(), "fill: blue; animation-delay: -2s");
    }

    #[test]
    fn stylesheet_skips_keyframes_blocks() {
        let sheet = Stylesheet::parse(
            "@keyframes spin { 0% { transform: rotate(0); } 100% { transform: rotate(360deg); } }\n\
             .wheel { animation: spin 3s linear infinite; }",
        );
        let decls = sheet.declarations_for("circle", None, &["wheel"]);
        assert_eq!(decls.get("animation"), Some("spin 3s linear infinite"));
        let none = sheet.declarations_for("circle", None, &[]);
        assert!(none.is_empty());
    }

    #[test]
    fn cascade_orders_by_specificity() {
        let sheet = Stylesheet::parse(
            "rect { fill: black; } .bg { fill: green; } #canvas { fill: white; }",
        );
        let decls = sheet.declarations_for("rect", Some("canvas"), &["bg"]);
        assert_eq!(decls.get("fill"), Some("white"));
    }

    #[test]
    fn animation_name_from_shorthand() {
        let decls = Declarations::parse("animation: 3s cubic-bezier(0.4, 0, 0.2, 1) 2 drift");
        assert_eq!(animation_name(&decls).as_deref(), Some("drift"));

        let named = Declarations::parse("animation-name: pulse, drift");
        assert_eq!(animation_name(&named).as_deref(), Some("pulse"));

        let none = Declarations::parse("animation: none");
        assert!(!has_active_animation(&none));
    }

    #[test]
    fn time_values_parse_to_seconds() {
        assert_eq!(parse_seconds("-2.5s"), Some(-2.5));
        assert_eq!(parse_seconds("300ms"), Some(0.3));
        assert_eq!(parse_seconds("oops"), None);
    }

    #[test]
    fn comments_and_at_imports_are_ignored() {
        let sheet = Stylesheet::parse("@import url(x.css); /* .ghost { fill: red; } */ g { opacity: 0.5; }");
        assert_eq!(
            sheet.declarations_for("g", None, &[]).get("opacity"),
            Some("0.5")
        );
    }
}
