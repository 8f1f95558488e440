//! Overlay objects drawn on top of a live view
//!
//! Overlays are collected between two publishes and sent along with the
//! next frame. Text and line overlays serialize to the visualizer's
//! object format (`{"type": "text", ...}`, `{"type": "line", ...}`).

use serde::Serialize;

/// RGB color
pub type Color = [u8; 3];

/// Color of rectangle overlays
pub const DETECTION_COLOR: Color = [0, 255, 255];

const TEXT_COLOR: Color = [255, 255, 0];
const TEXT_THICKNESS: u32 = 2;
const TEXT_SIZE: f32 = 1.0;
const TEXT_BACKGROUND: Color = [0, 0, 0];
const LINE_COLOR: Color = [0, 255, 0];
const LINE_THICKNESS: u32 = 1;

/// Bounding box `(x1, y1, x2, y2)`, top-left then bottom-right
pub type BoundingBox = [i32; 4];

/// One labelled rectangle, as it appears in the detections list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub label: String,
    pub color: Color,
}

impl Detection {
    pub fn new(bbox: BoundingBox, label: impl Into<String>) -> Self {
        Self {
            bbox,
            label: label.into(),
            color: DETECTION_COLOR,
        }
    }
}

/// Free text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextOverlay {
    pub text: String,
    /// Top-left corner
    pub coords: (i32, i32),
    pub size: f32,
    pub color: Color,
    pub thickness: u32,
    pub outline: bool,
    #[serde(rename = "bg_color")]
    pub background_color: Color,
    #[serde(rename = "bg_transparency")]
    pub background_transparency: f32,
}

impl TextOverlay {
    /// Text at `coords` with the default style
    pub fn new(text: impl Into<String>, coords: (i32, i32)) -> Self {
        Self {
            text: text.into(),
            coords,
            size: TEXT_SIZE,
            color: TEXT_COLOR,
            thickness: TEXT_THICKNESS,
            outline: true,
            background_color: TEXT_BACKGROUND,
            background_transparency: 0.5,
        }
    }

    /// Set the font scale
    pub fn size(mut self, size: f32) -> Self {
        self.size = size;
        self
    }

    /// Set the text color
    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Set the stroke thickness in pixels
    pub fn thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness;
        self
    }

    /// Draw an outline around the glyphs
    pub fn outline(mut self, outline: bool) -> Self {
        self.outline = outline;
        self
    }

    /// Set background color and transparency (0.0 transparent, 1.0 opaque)
    pub fn background(mut self, color: Color, transparency: f32) -> Self {
        self.background_color = color;
        self.background_transparency = transparency;
        self
    }
}

/// Straight line between two points
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineOverlay {
    pub pt1: (i32, i32),
    pub pt2: (i32, i32),
    pub color: Color,
    pub thickness: u32,
}

impl LineOverlay {
    /// Line from `pt1` to `pt2` with the default style
    pub fn new(pt1: (i32, i32), pt2: (i32, i32)) -> Self {
        Self {
            pt1,
            pt2,
            color: LINE_COLOR,
            thickness: LINE_THICKNESS,
        }
    }

    /// Set the line color
    pub fn color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }

    /// Set the line thickness in pixels
    pub fn thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness;
        self
    }
}

/// Serialized form of a text or line overlay
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OverlayObject {
    Text(TextOverlay),
    Line(LineOverlay),
}

/// Overlays pending for the next publish
#[derive(Debug, Clone, Default)]
pub struct Overlays {
    pub detections: Vec<Detection>,
    pub texts: Vec<TextOverlay>,
    pub lines: Vec<LineOverlay>,
}

impl Overlays {
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty() && self.texts.is_empty() && self.lines.is_empty()
    }

    /// Text then line objects, in insertion order
    pub fn objects(&self) -> Vec<OverlayObject> {
        self.texts
            .iter()
            .cloned()
            .map(OverlayObject::Text)
            .chain(self.lines.iter().cloned().map(OverlayObject::Line))
            .collect()
    }
}
