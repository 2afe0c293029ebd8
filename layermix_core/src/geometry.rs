// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rectangles and points in normalized and pixel space.
//!
//! Layer bounds are expressed as [`Rect`] fractions (0–1) of the owning
//! composition's pixel size. Producers report popup rectangles as
//! [`PixelRect`] values in composition pixels, and input arrives as
//! [`PixelPoint`]s.

/// A rectangle with floating-point origin and size.
///
/// Used for normalized layer bounds. Width and height are never negative.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub x: f32,
    /// Top edge.
    pub y: f32,
    /// Width (≥ 0).
    pub width: f32,
    /// Height (≥ 0).
    pub height: f32,
}

impl Rect {
    /// The empty rectangle at the origin.
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    /// The whole composition in normalized space.
    pub const FULL: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    /// Creates a rectangle, clamping a negative width or height to zero.
    #[must_use]
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width: if width < 0.0 { 0.0 } else { width },
            height: if height < 0.0 { 0.0 } else { height },
        }
    }

    /// Converts normalized bounds to integer pixel bounds in a
    /// `width` × `height` composition.
    ///
    /// Each component is scaled and truncated toward zero independently, so
    /// the right edge is `x + width` of the *truncated* values.
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "truncation to whole pixels is the conversion rule"
    )]
    pub fn to_pixels(self, width: u32, height: u32) -> PixelRect {
        let w = width as f32;
        let h = height as f32;
        PixelRect {
            x: (self.x * w) as i32,
            y: (self.y * h) as i32,
            width: (self.width * w) as i32,
            height: (self.height * h) as i32,
        }
    }

    /// Returns this rectangle as a [`kurbo::Rect`] (`x0, y0, x1, y1`).
    #[must_use]
    pub fn to_kurbo(self) -> kurbo::Rect {
        kurbo::Rect::new(
            f64::from(self.x),
            f64::from(self.y),
            f64::from(self.x + self.width),
            f64::from(self.y + self.height),
        )
    }
}

/// An integer rectangle in composition pixels.
///
/// Unlike [`Rect`], the origin may be negative: producers report popups that
/// partially extend outside the composition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelRect {
    /// Left edge in pixels.
    pub x: i32,
    /// Top edge in pixels.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl PixelRect {
    /// Creates a pixel rectangle.
    #[must_use]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns whether `(x, y)` lies in `[x, x + width) × [y, y + height)`.
    #[must_use]
    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && x < self.x.saturating_add(self.width)
            && y >= self.y
            && y < self.y.saturating_add(self.height)
    }

    /// Divides by the composition size to produce normalized bounds.
    ///
    /// Returns `None` when either dimension is zero.
    #[must_use]
    pub fn normalized(&self, width: u32, height: u32) -> Option<Rect> {
        if width == 0 || height == 0 {
            return None;
        }
        let w = width as f32;
        let h = height as f32;
        Some(Rect::new(
            self.x as f32 / w,
            self.y as f32 / h,
            self.width as f32 / w,
            self.height as f32 / h,
        ))
    }
}

/// An integer point in composition or layer pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PixelPoint {
    /// Horizontal position.
    pub x: i32,
    /// Vertical position.
    pub y: i32,
}

impl PixelPoint {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}
