//! Retained element tree for a mounted SVG subtree.
//!
//! The playback surface needs what a live document gives the original UI:
//! wholesale markup replacement, per-element attribute access, and traversal
//! of descendants. Comments and processing instructions are dropped on
//! parse; they carry nothing playback needs.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{SvgmotionError, SvgmotionResult};

#[derive(Clone, Debug, PartialEq)]
pub enum SvgChild {
    Element(SvgElement),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SvgElement {
    pub tag: String,
    attrs: Vec<(String, String)>,
    pub children: Vec<SvgChild>,
}

impl SvgElement {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Tag name without any namespace prefix.
    pub fn local_tag(&self) -> &str {
        self.tag.rsplit(':').next().unwrap_or(&self.tag)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        if let Some(slot) = self.attrs.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value.to_string();
        } else {
            self.attrs.push((name.to_string(), value.to_string()));
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn classes(&self) -> Vec<&str> {
        self.attr("class")
            .map(|c| c.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Concatenated text of this element and its descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                SvgChild::Text(text) => out.push_str(text),
                SvgChild::Element(el) => el.collect_text(out),
            }
        }
    }

    /// Depth-first visit of this element and every descendant element.
    pub fn for_each_element(&self, f: &mut impl FnMut(&SvgElement)) {
        f(self);
        for child in &self.children {
            if let SvgChild::Element(el) = child {
                el.for_each_element(f);
            }
        }
    }

    pub fn for_each_element_mut(&mut self, f: &mut impl FnMut(&mut SvgElement)) {
        f(self);
        for child in &mut self.children {
            if let SvgChild::Element(el) = child {
                el.for_each_element_mut(f);
            }
        }
    }

    pub fn element_count(&self) -> usize {
        let mut count = 0;
        self.for_each_element(&mut |_| count += 1);
        count
    }
}

/// A parsed SVG document rooted at an `<svg>` element.
#[derive(Clone, Debug, PartialEq)]
pub struct SvgDocument {
    pub root: SvgElement,
}

impl SvgDocument {
    pub fn parse(markup: &str) -> SvgmotionResult<Self> {
        let mut reader = Reader::from_str(markup);
        let mut stack: Vec<SvgElement> = Vec::new();
        let mut root: Option<SvgElement> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if root.is_some() && stack.is_empty() {
                        return Err(SvgmotionError::decode("markup has multiple root elements"));
                    }
                    stack.push(element_from(&e)?);
                }
                Ok(Event::Empty(e)) => {
                    if root.is_some() && stack.is_empty() {
                        return Err(SvgmotionError::decode("markup has multiple root elements"));
                    }
                    let el = element_from(&e)?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(SvgChild::Element(el)),
                        None => root = Some(el),
                    }
                }
                Ok(Event::End(_)) => {
                    let el = stack
                        .pop()
                        .ok_or_else(|| SvgmotionError::decode("unbalanced end tag"))?;
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(SvgChild::Element(el)),
                        None => root = Some(el),
                    }
                }
                Ok(Event::Text(t)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = t
                            .unescape()
                            .map_err(|err| {
                                SvgmotionError::decode(format!("bad text content: {err}"))
                            })?
                            .into_owned();
                        parent.children.push(SvgChild::Text(text));
                    }
                }
                Ok(Event::CData(t)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(t.into_inner().as_ref()).into_owned();
                        parent.children.push(SvgChild::Text(text));
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    return Err(SvgmotionError::decode(format!(
                        "markup is not well-formed svg: {err}"
                    )));
                }
            }
        }

        let root =
            root.ok_or_else(|| SvgmotionError::decode("markup contains no root element"))?;
        if root.local_tag() != "svg" {
            return Err(SvgmotionError::decode(format!(
                "root element is <{}>, expected <svg>",
                root.tag
            )));
        }
        Ok(Self { root })
    }

    pub fn serialize(&self) -> String {
        let mut out = String::new();
        write_element(&self.root, &mut out);
        out
    }

    /// Concatenated content of every `<style>` block in the document.
    pub fn style_text(&self) -> String {
        let mut css = String::new();
        self.root.for_each_element(&mut |el| {
            if el.local_tag() == "style" {
                css.push_str(&el.text_content());
                css.push('\n');
            }
        });
        css
    }
}

fn element_from(e: &BytesStart<'_>) -> SvgmotionResult<SvgElement> {
    let mut el = SvgElement::new(String::from_utf8_lossy(e.name().as_ref()).into_owned());
    for attr in e.attributes() {
        let attr =
            attr.map_err(|err| SvgmotionError::decode(format!("bad attribute: {err}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| SvgmotionError::decode(format!("bad attribute value: {err}")))?
            .into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

fn write_element(el: &SvgElement, out: &mut String) {
    out.push('<');
    out.push_str(&el.tag);
    for (name, value) in &el.attrs {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&quick_xml::escape::escape(value));
        out.push('"');
    }
    if el.children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in &el.children {
        match child {
            SvgChild::Element(e) => write_element(e, out),
            SvgChild::Text(t) => out.push_str(&quick_xml::escape::escape(t)),
        }
    }
    out.push_str("</");
    out.push_str(&el.tag);
    out.push('>');
}
