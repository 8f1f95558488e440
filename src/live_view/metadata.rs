//! Metadata envelope sent with every published frame
//!
//! ```json
//! {
//!   "platform": "robothub",
//!   "frame_shape": [height, width],
//!   "config": { "output": {...}, "detection": {...}, "text": {...} },
//!   "objects": [
//!     { "type": "detections", "detections": [{ "bbox": [...], "label": "...", "color": [...] }] },
//!     { "type": "text", ... },
//!     { "type": "line", ... }
//!   ]
//! }
//! ```

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::Result;

use super::overlay::{Detection, Overlays};

const PLATFORM: &str = "robothub";

#[derive(Serialize)]
struct Envelope {
    platform: &'static str,
    frame_shape: [u32; 2],
    config: Value,
    objects: Vec<Value>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum DetectionsObject<'a> {
    Detections { detections: &'a [Detection] },
}

/// Fixed visualization styling block
pub fn visualization_config() -> Value {
    json!({
        "output": {
            "img_scale": 1.0,
            "show_fps": false,
            "clickable": true
        },
        "detection": {
            "thickness": 1,
            "fill_transparency": 0.05,
            "box_roundness": 0,
            "color": [0, 255, 0],
            "bbox_style": 0,
            "line_width": 0.5,
            "line_height": 0.5,
            "hide_label": false,
            "label_position": 0,
            "label_padding": 10
        },
        "text": {
            "font_color": [255, 255, 0],
            "font_transparency": 0.5,
            "font_scale": 1.0,
            "font_thickness": 2,
            "bg_transparency": 0.5,
            "bg_color": [0, 0, 0]
        }
    })
}

/// Build the envelope for a frame of `width` x `height`
pub fn build_metadata(width: u32, height: u32, overlays: &Overlays) -> Result<Value> {
    let mut objects = Vec::with_capacity(1 + overlays.texts.len() + overlays.lines.len());
    objects.push(serde_json::to_value(DetectionsObject::Detections {
        detections: &overlays.detections,
    })?);
    for object in overlays.objects() {
        objects.push(serde_json::to_value(&object)?);
    }

    let envelope = Envelope {
        platform: PLATFORM,
        frame_shape: [height, width],
        config: visualization_config(),
        objects,
    };
    Ok(serde_json::to_value(envelope)?)
}
