//! The mutable rendered view of one animation.
//!
//! CSS keyframe animations expose no seek primitive, so every timeline
//! operation is expressed through two side effects on the rendered subtree:
//! `animation-play-state` toggling and negative `animation-delay` injection.
//! [`AnimationSurface`] isolates those mechanics; a host that swaps in a
//! script-driven timeline engine replaces the surface, not the callers.

use crate::dom::{SvgDocument, SvgElement};
use crate::error::SvgmotionResult;
use crate::style::{Declarations, Stylesheet, has_active_animation, parse_seconds};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayState {
    Running,
    Paused,
}

impl PlayState {
    pub fn as_css(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Self::Running => Self::Paused,
            Self::Paused => Self::Running,
        }
    }
}

/// Play/pause/seek primitives over a rendered SVG subtree.
pub trait AnimationSurface {
    /// Replace the whole subtree with fresh markup, discarding any style
    /// mutations applied so far.
    fn replace_markup(&mut self, markup: &str) -> SvgmotionResult<()>;

    /// True once markup has been loaded.
    fn is_loaded(&self) -> bool;

    /// Serialize the subtree in its current state.
    fn markup(&self) -> Option<String>;

    /// Apply a play-state to every element whose computed style carries an
    /// active animation.
    fn set_play_state(&mut self, state: PlayState);

    /// Jump `seconds` into the timeline by giving every animated element a
    /// negative animation-delay.
    fn fast_forward(&mut self, seconds: f64);

    /// Computed animation-delay, in seconds, of every animated element.
    fn animated_delays(&self) -> Vec<f64>;
}

/// [`AnimationSurface`] backed by a retained element tree and the document's
/// own `<style>` rules.
#[derive(Debug, Default)]
pub struct DomSurface {
    doc: Option<SvgDocument>,
    sheet: Stylesheet,
}

impl DomSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_markup(markup: &str) -> SvgmotionResult<Self> {
        let mut surface = Self::new();
        surface.replace_markup(markup)?;
        Ok(surface)
    }

    pub fn document(&self) -> Option<&SvgDocument> {
        self.doc.as_ref()
    }

    fn computed(sheet: &Stylesheet, el: &SvgElement) -> Declarations {
        let mut decls = sheet.declarations_for(el.local_tag(), el.id(), &el.classes());
        if let Some(inline) = el.attr("style") {
            decls.merge_from(&Declarations::parse(inline));
        }
        decls
    }

    /// Apply `mutate` to the inline style of every animated element.
    fn update_animated(&mut self, mut mutate: impl FnMut(&mut Declarations)) {
        let Self { doc, sheet } = self;
        let Some(doc) = doc.as_mut() else { return };
        doc.root.for_each_element_mut(&mut |el| {
            let computed = Self::computed(sheet, el);
            if !has_active_animation(&computed) {
                return;
            }
            let mut inline = el
                .attr("style")
                .map(Declarations::parse)
                .unwrap_or_default();
            mutate(&mut inline);
            el.set_attr("style", &inline.to_css());
        });
    }
}

impl AnimationSurface for DomSurface {
    fn replace_markup(&mut self, markup: &str) -> SvgmotionResult<()> {
        let doc = SvgDocument::parse(markup)?;
        self.sheet = Stylesheet::parse(&doc.style_text());
        self.doc = Some(doc);
        Ok(())
    }

    fn is_loaded(&self) -> bool {
        self.doc.is_some()
    }

    fn markup(&self) -> Option<String> {
        self.doc.as_ref().map(SvgDocument::serialize)
    }

    fn set_play_state(&mut self, state: PlayState) {
        self.update_animated(|inline| inline.set("animation-play-state", state.as_css()));
    }

    fn fast_forward(&mut self, seconds: f64) {
        let delay = format!("-{seconds}s");
        self.update_animated(|inline| inline.set("animation-delay", &delay));
    }

    fn animated_delays(&self) -> Vec<f64> {
        let Some(doc) = self.doc.as_ref() else {
            return Vec::new();
        };
        let mut delays = Vec::new();
        doc.root.for_each_element(&mut |el| {
            let computed = Self::computed(&self.sheet, el);
            if has_active_animation(&computed) {
                let delay = computed
                    .get("animation-delay")
                    .and_then(parse_seconds)
                    .unwrap_or(0.0);
                delays.push(delay);
            }
        });
        delays
    }
}
