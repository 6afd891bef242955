//! Full-canvas background recolor applied to markup before export.
//!
//! The generation backend conventionally places an opaque canvas-sized
//! `<rect>` first in the document. Exports may ask for a different backdrop
//! (or none), so that rect's fill is rewritten — and synthesized when the
//! document never had one. The rewrite is a streaming event copy: every
//! node except the background rect passes through byte-for-byte.
//!
//! This is best-effort cosmetics. Markup that does not parse as SVG is
//! returned unmodified; callers must not assume the background actually
//! changed.

use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::model::{BackgroundColor, CANVAS_HEIGHT, CANVAS_WIDTH};

/// Return `markup` with its canvas background set to `color`.
pub fn rewrite_background(markup: &str, color: &BackgroundColor) -> String {
    let Some(plan) = scan(markup) else {
        tracing::warn!("markup did not parse as svg; leaving background untouched");
        return markup.to_string();
    };

    // Nothing to erase and nothing to draw.
    if plan.target_rect.is_none() && color.is_transparent() {
        return markup.to_string();
    }

    match apply(markup, color, &plan) {
        Some(out) => out,
        None => markup.to_string(),
    }
}

struct RewritePlan {
    /// Index (in document order) of the background rect, if one exists.
    target_rect: Option<usize>,
    /// Canvas size for a synthesized backdrop, from the root viewBox.
    canvas: (f64, f64),
}

/// First pass: locate the background rect and the canvas size, or bail out
/// on anything that is not well-formed SVG.
fn scan(markup: &str) -> Option<RewritePlan> {
    let mut reader = Reader::from_str(markup);
    let mut saw_svg = false;
    let mut canvas = (f64::from(CANVAS_WIDTH), f64::from(CANVAS_HEIGHT));
    let mut rect_index = 0usize;
    let mut tagged: Option<usize> = None;
    let mut by_geometry: Option<usize> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"svg" {
                    if !saw_svg {
                        saw_svg = true;
                        if let Some(size) = viewbox_size(&e) {
                            canvas = size;
                        }
                    }
                } else if e.local_name().as_ref() == b"rect" {
                    if tagged.is_none() && is_tagged_background(&e) {
                        tagged = Some(rect_index);
                    }
                    if by_geometry.is_none() && is_canvas_rect(&e) {
                        by_geometry = Some(rect_index);
                    }
                    rect_index += 1;
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(_) => return None,
        }
    }

    saw_svg.then_some(RewritePlan {
        // An explicitly tagged background layer beats the geometry guess.
        target_rect: tagged.or(by_geometry),
        canvas,
    })
}

/// Second pass: copy events through, patching or injecting the backdrop.
fn apply(markup: &str, color: &BackgroundColor, plan: &RewritePlan) -> Option<String> {
    let mut reader = Reader::from_str(markup);
    let mut writer = Writer::new(Vec::new());
    let mut rect_index = 0usize;
    let mut svg_seen = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"rect" {
                    if plan.target_rect == Some(rect_index) {
                        writer.write_event(Event::Start(recolored(&e, color)?)).ok()?;
                    } else {
                        writer.write_event(Event::Start(e)).ok()?;
                    }
                    rect_index += 1;
                } else {
                    let inject = !svg_seen
                        && e.local_name().as_ref() == b"svg"
                        && plan.target_rect.is_none();
                    if e.local_name().as_ref() == b"svg" {
                        svg_seen = true;
                    }
                    writer.write_event(Event::Start(e)).ok()?;
                    if inject {
                        writer
                            .write_event(Event::Empty(backdrop_rect(plan.canvas, color)))
                            .ok()?;
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"rect" {
                    if plan.target_rect == Some(rect_index) {
                        writer.write_event(Event::Empty(recolored(&e, color)?)).ok()?;
                    } else {
                        writer.write_event(Event::Empty(e)).ok()?;
                    }
                    rect_index += 1;
                } else if !svg_seen
                    && e.local_name().as_ref() == b"svg"
                    && plan.target_rect.is_none()
                {
                    // A childless root still gets its backdrop.
                    svg_seen = true;
                    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                    writer.write_event(Event::Start(e)).ok()?;
                    writer
                        .write_event(Event::Empty(backdrop_rect(plan.canvas, color)))
                        .ok()?;
                    writer.write_event(Event::End(BytesEnd::new(name))).ok()?;
                } else {
                    if e.local_name().as_ref() == b"svg" {
                        svg_seen = true;
                    }
                    writer.write_event(Event::Empty(e)).ok()?;
                }
            }
            Ok(Event::Eof) => break,
            Ok(ev) => writer.write_event(ev).ok()?,
            Err(_) => return None,
        }
    }

    String::from_utf8(writer.into_inner()).ok()
}

fn attr_value(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.as_ref() == name)
        .and_then(|attr| attr.unescape_value().ok())
        .map(|value| value.trim().to_string())
}

fn is_tagged_background(e: &BytesStart<'_>) -> bool {
    attr_value(e, b"data-role").is_some_and(|role| role == "background")
        || attr_value(e, b"id").is_some_and(|id| id == "background")
}

fn is_canvas_rect(e: &BytesStart<'_>) -> bool {
    let full_width = format!("{CANVAS_WIDTH}");
    let full_height = format!("{CANVAS_HEIGHT}");
    let width_ok = attr_value(e, b"width").is_some_and(|w| w == full_width || w == "100%");
    let height_ok = attr_value(e, b"height").is_some_and(|h| h == full_height || h == "100%");
    let origin_ok = attr_value(e, b"x").is_none_or(|x| x == "0")
        && attr_value(e, b"y").is_none_or(|y| y == "0");
    width_ok && height_ok && origin_ok
}

fn viewbox_size(e: &BytesStart<'_>) -> Option<(f64, f64)> {
    let viewbox = attr_value(e, b"viewBox")?;
    let parts: Vec<f64> = viewbox
        .split_whitespace()
        .filter_map(|p| p.parse().ok())
        .collect();
    match parts.as_slice() {
        [_, _, w, h] if *w > 0.0 && *h > 0.0 => Some((*w, *h)),
        _ => None,
    }
}

fn recolored(e: &BytesStart<'_>, color: &BackgroundColor) -> Option<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if key == "fill" || key == "fill-opacity" {
            continue;
        }
        let value = attr.unescape_value().ok()?.into_owned();
        out.push_attribute((key.as_str(), value.as_str()));
    }
    match color {
        // The keyword alone renders inconsistently; zeroing fill-opacity
        // makes the intent unambiguous.
        BackgroundColor::Transparent => {
            out.push_attribute(("fill", "transparent"));
            out.push_attribute(("fill-opacity", "0"));
        }
        BackgroundColor::Solid(c) => out.push_attribute(("fill", c.as_str())),
    }
    Some(out)
}

fn backdrop_rect(canvas: (f64, f64), color: &BackgroundColor) -> BytesStart<'static> {
    let mut rect = BytesStart::new("rect");
    rect.push_attribute(("width", format!("{}", canvas.0).as_str()));
    rect.push_attribute(("height", format!("{}", canvas.1).as_str()));
    rect.push_attribute(("fill", color.as_css()));
    rect
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::SvgDocument;

    fn solid(c: &str) -> BackgroundColor {
        BackgroundColor::Solid(c.to_string())
    }

    #[test]
    fn recolors_the_canvas_rect_and_nothing_else() {
        let markup = "<svg viewBox=\"0 0 800 600\">\n  <rect width=\"800\" height=\"600\" fill=\"#000\"/>\n  <rect x=\"10\" y=\"10\" width=\"20\" height=\"20\" fill=\"red\"/>\n  <text>a &amp; b</text>\n</svg>";
        let out = rewrite_background(markup, &solid("#123456"));
        let expected = markup.replace(
            "<rect width=\"800\" height=\"600\" fill=\"#000\"/>",
            "<rect width=\"800\" height=\"600\" fill=\"#123456\"/>",
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn transparent_zeroes_fill_opacity() {
        let markup = r##"<svg><rect width="100%" height="100%" fill="#fff"/><circle r="4"/></svg>"##;
        let out = rewrite_background(markup, &BackgroundColor::Transparent);
        assert!(out.contains(r#"<rect width="100%" height="100%" fill="transparent" fill-opacity="0"/>"#));
        assert!(out.contains(r#"<circle r="4"/>"#));
    }

    #[test]
    fn solid_color_drops_a_stale_fill_opacity() {
        let markup = r#"<svg><rect width="800" height="600" fill-opacity="0" fill="red"/></svg>"#;
        let out = rewrite_background(markup, &solid("blue"));
        assert!(!out.contains("fill-opacity"));
        assert!(out.contains(r#"fill="blue""#));
    }

    #[test]
    fn synthesizes_a_backdrop_sized_to_the_viewbox() {
        let markup = r#"<svg viewBox="0 0 400 300"><circle r="5"/></svg>"#;
        let out = rewrite_background(markup, &solid("pink"));
        assert_eq!(
            out,
            r#"<svg viewBox="0 0 400 300"><rect width="400" height="300" fill="pink"/><circle r="5"/></svg>"#
        );

        let before = SvgDocument::parse(markup).unwrap().root.element_count();
        let after = SvgDocument::parse(&out).unwrap().root.element_count();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn synthesized_backdrop_defaults_to_canvas_size() {
        let markup = "<svg><g/></svg>";
        let out = rewrite_background(markup, &solid("#abc"));
        assert_eq!(
            out,
            r##"<svg><rect width="800" height="600" fill="#abc"/><g/></svg>"##
        );
    }

    #[test]
    fn transparent_without_a_backdrop_is_a_no_op() {
        let markup = r#"<svg><circle r="5"/></svg>"#;
        assert_eq!(
            rewrite_background(markup, &BackgroundColor::Transparent),
            markup
        );
    }

    #[test]
    fn tagged_rect_beats_the_geometry_guess() {
        let markup = r##"<svg><rect width="800" height="600" fill="#000"/><rect data-role="background" width="640" height="480" fill="#111"/></svg>"##;
        let out = rewrite_background(markup, &solid("gold"));
        assert!(out.contains(r##"<rect width="800" height="600" fill="#000"/>"##));
        assert!(out.contains(r#"<rect data-role="background" width="640" height="480" fill="gold"/>"#));
    }

    #[test]
    fn unparseable_markup_passes_through_unchanged() {
        let markup = "<svg><rect width=\"800\"";
        assert_eq!(rewrite_background(markup, &solid("red")), markup);
        assert_eq!(rewrite_background("plain text", &solid("red")), "plain text");
    }

    #[test]
    fn offset_rects_are_not_mistaken_for_the_canvas() {
        let markup = r##"<svg><rect x="5" width="800" height="600" fill="#000"/></svg>"##;
        let out = rewrite_background(markup, &solid("lime"));
        // no match: a backdrop is injected instead
        assert!(out.contains(r#"<rect width="800" height="600" fill="lime"/>"#));
        assert!(out.contains(r##"fill="#000""##));
    }
}
