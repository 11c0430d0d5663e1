//! Drawing façade between backends and the frontend's rendering layer.
//!
//! Backends describe their display through the fixed vocabulary of
//! [`DrawApi`]; a frontend implements that trait once and every puzzle
//! renders through it. [`NullDraw`] discards everything, which is all the
//! headless driver and the tests need.

/// Index into the palette returned by a backend's `colours`.
pub type ColourIndex = usize;

/// An RGB colour with components in `0.0..=1.0`.
pub type Rgb = [f32; 3];

/// Font family for [`DrawApi::draw_text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontType {
    /// Monospaced.
    Fixed,
    /// Proportional.
    Variable,
}

/// Horizontal anchoring of drawn text relative to its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HAlign {
    /// Position is the left edge of the text.
    Left,
    /// Position is the centre of the text.
    Centre,
    /// Position is the right edge of the text.
    Right,
}

/// Vertical anchoring of drawn text relative to its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VAlign {
    /// Position is the text baseline.
    Baseline,
    /// Position is the vertical centre of the text.
    Centre,
}

/// Handle to a saved rectangle of pixels, used by cursor overlays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitterId(pub u32);

/// The rendering operations a frontend must supply. Every method has a
/// discard default so minimal implementations only override what they
/// can display.
#[allow(unused_variables)]
pub trait DrawApi {
    /// Draws a string anchored at (`x`, `y`).
    fn draw_text(
        &mut self,
        x: i32,
        y: i32,
        font: FontType,
        size: i32,
        halign: HAlign,
        valign: VAlign,
        colour: ColourIndex,
        text: &str,
    ) {
    }

    /// Fills an axis-aligned rectangle.
    fn draw_rect(&mut self, x: i32, y: i32, w: i32, h: i32, colour: ColourIndex) {}

    /// Draws a one-pixel line between two points.
    fn draw_line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, colour: ColourIndex) {}

    /// Draws a line of the given thickness between two points.
    fn draw_thick_line(
        &mut self,
        thickness: f32,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        colour: ColourIndex,
    ) {
    }

    /// Draws a closed polygon, optionally filled.
    fn draw_polygon(
        &mut self,
        coords: &[(i32, i32)],
        fill: Option<ColourIndex>,
        outline: ColourIndex,
    ) {
    }

    /// Draws a circle, optionally filled.
    fn draw_circle(
        &mut self,
        cx: i32,
        cy: i32,
        radius: i32,
        fill: Option<ColourIndex>,
        outline: ColourIndex,
    ) {
    }

    /// Marks a rectangle as needing a screen update.
    fn draw_update(&mut self, x: i32, y: i32, w: i32, h: i32) {}

    /// Restricts subsequent drawing to a rectangle.
    fn clip(&mut self, x: i32, y: i32, w: i32, h: i32) {}

    /// Removes the current clip rectangle.
    fn unclip(&mut self) {}

    /// Brackets a redraw; called before any other drawing in a frame.
    fn start_draw(&mut self) {}

    /// Brackets a redraw; called after all drawing in a frame.
    fn end_draw(&mut self) {}

    /// Replaces the status-bar text.
    fn status_bar(&mut self, text: &str) {}

    /// Allocates a `w` x `h` pixel buffer for later save/restore.
    fn blitter_new(&mut self, w: i32, h: i32) -> BlitterId {
        BlitterId(0)
    }

    /// Releases a blitter.
    fn blitter_free(&mut self, id: BlitterId) {}

    /// Copies the screen rectangle at (`x`, `y`) into the blitter.
    fn blitter_save(&mut self, id: BlitterId, x: i32, y: i32) {}

    /// Puts the blitter's pixels back, at the given position or at the
    /// position they were saved from when `None`.
    fn blitter_load(&mut self, id: BlitterId, pos: Option<(i32, i32)>) {}

    /// Notifies the frontend that undo/redo availability changed.
    fn changed_state(&mut self, can_undo: bool, can_redo: bool) {}
}

/// A drawing implementation that discards every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDraw;

impl DrawApi for NullDraw {}

/// The handle backends draw through. Owns the frontend's [`DrawApi`] and
/// deduplicates status-bar updates.
pub struct Draw {
    api: Box<dyn DrawApi>,
    laststatus: Option<String>,
}

impl Draw {
    /// Wraps a frontend drawing implementation.
    #[must_use]
    pub fn new(api: Box<dyn DrawApi>) -> Self {
        Self {
            api,
            laststatus: None,
        }
    }

    /// Direct access to the underlying API, for every call that needs no
    /// extra bookkeeping.
    pub fn api(&mut self) -> &mut dyn DrawApi {
        &mut *self.api
    }

    /// Sets the status-bar text, skipping the call when it is unchanged.
    pub fn status_bar(&mut self, text: &str) {
        if self.laststatus.as_deref() != Some(text) {
            self.api.status_bar(text);
            self.laststatus = Some(text.to_owned());
        }
    }

    /// Draws the one-pixel outline of a rectangle.
    pub fn rect_outline(&mut self, x: i32, y: i32, w: i32, h: i32, colour: ColourIndex) {
        let (x1, y1) = (x + w - 1, y + h - 1);
        self.api
            .draw_polygon(&[(x, y), (x, y1), (x1, y1), (x1, y)], None, colour);
    }

    /// Draws the four corner ticks of a square cursor around a centre.
    pub fn rect_corners(&mut self, cx: i32, cy: i32, r: i32, colour: ColourIndex) {
        for (sx, sy) in [(-1, -1), (-1, 1), (1, -1), (1, 1)] {
            let (ex, ey) = (cx + sx * r, cy + sy * r);
            self.api.draw_line(ex, ey, ex, cy + sy * (r / 2), colour);
            self.api.draw_line(ex, ey, cx + sx * (r / 2), ey, colour);
        }
    }
}

impl std::fmt::Debug for Draw {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Draw")
            .field("laststatus", &self.laststatus)
            .finish_non_exhaustive()
    }
}

/// Derives background, highlight and lowlight shades from a base colour.
/// The base is darkened if necessary so the highlight stays below full
/// white.
#[must_use]
pub fn mkhighlight(base: Rgb) -> (Rgb, Rgb, Rgb) {
    let mut background = base;
    let max = background[0].max(background[1]).max(background[2]);
    if max * 1.2 > 1.0 {
        for c in &mut background {
            *c /= max * 1.2;
        }
    }
    let highlight = background.map(|c| c * 1.2);
    let lowlight = background.map(|c| c * 0.8);
    (background, highlight, lowlight)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlight_stays_within_gamut() {
        let (bg, hi, lo) = mkhighlight([1.0, 1.0, 1.0]);
        assert!(hi.iter().all(|&c| c <= 1.0 + 1e-6));
        assert!(lo.iter().zip(&bg).all(|(&l, &b)| l < b));
    }

    #[test]
    fn dim_background_is_left_alone() {
        let (bg, hi, _) = mkhighlight([0.5, 0.5, 0.5]);
        assert_eq!(bg, [0.5, 0.5, 0.5]);
        assert!((hi[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn status_bar_deduplicates() {
        let counter = std::rc::Rc::new(std::cell::Cell::new(0));
        struct Shared(std::rc::Rc<std::cell::Cell<u32>>);
        impl DrawApi for Shared {
            fn status_bar(&mut self, _text: &str) {
                self.0.set(self.0.get() + 1);
            }
        }
        let mut draw = Draw::new(Box::new(Shared(counter.clone())));
        draw.status_bar("hello");
        draw.status_bar("hello");
        draw.status_bar("world");
        assert_eq!(counter.get(), 2);
    }
}
