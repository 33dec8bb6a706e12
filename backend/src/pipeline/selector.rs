//! Picks the single foreground subject out of a segmentation mask.
//!
//! All non-zero labels are treated as one foreground class. The binary mask
//! is optionally cleaned (opening with a 3x3 cross, then closing with a 7x7
//! ellipse), split into 8-connected components, and one component is
//! chosen:
//!
//! - exactly one component: it is the subject, no scoring;
//! - several: every component at or above the noise floor is scored and the
//!   highest total wins.
//!
//! Scoring weights: area 0.6, position 0.1, shape 0.1, size 0.1.

use image::{GrayImage, Luma};
use imageproc::morphology::{grayscale_close, grayscale_open, Mask};
use imageproc::region_labelling::{connected_components, Connectivity};

use super::PipelineError;
use crate::backends::LabelMask;
use crate::config::SelectorSettings;

const FOREGROUND: Luma<u8> = Luma([255]);
const BACKGROUND: Luma<u8> = Luma([0]);

const AREA_WEIGHT: f64 = 0.6;
const POSITION_WEIGHT: f64 = 0.1;
const SHAPE_WEIGHT: f64 = 0.1;
const SIZE_WEIGHT: f64 = 0.1;

/// Half-width of each row of the 7x7 elliptical closing kernel, top to bottom.
const ELLIPSE_HALF_WIDTHS: [u32; 7] = [0, 2, 3, 3, 3, 2, 0];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    /// Integer center of the box, not the pixel centroid.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub label: u32,
    pub area: u32,
    pub bbox: BoundingBox,
}

/// The chosen subject: its box in image coordinates and its binary mask
/// (0/255) cropped to that box.
#[derive(Debug, Clone)]
pub struct Subject {
    pub bbox: BoundingBox,
    pub mask: GrayImage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComponentScore {
    pub area: f64,
    pub position: f64,
    pub shape: f64,
    pub size: f64,
}

impl ComponentScore {
    pub fn total(&self) -> f64 {
        self.area * AREA_WEIGHT
            + self.position * POSITION_WEIGHT
            + self.shape * SHAPE_WEIGHT
            + self.size * SIZE_WEIGHT
    }
}

pub fn select_subject(
    mask: &LabelMask,
    settings: &SelectorSettings,
) -> Result<Subject, PipelineError> {
    let mut binary = binarize(mask);
    if settings.clean_mask {
        binary = clean(&binary);
    }
    let (width, height) = binary.dimensions();

    let labels = connected_components(&binary, Connectivity::Eight, BACKGROUND);
    let components = measure_components(&labels);

    let chosen = match components.as_slice() {
        [] => return Err(PipelineError::NoSubject),
        [only] => *only,
        _ => {
            log::info!(
                "Found {} candidate subjects, scoring to pick the best",
                components.len()
            );
            best_component(&components, width, height, settings.noise_floor)
                .ok_or(PipelineError::NoSubject)?
        }
    };

    let bbox = chosen.bbox;
    if bbox.width < settings.min_subject_side || bbox.height < settings.min_subject_side {
        return Err(PipelineError::SubjectTooSmall {
            width: bbox.width,
            height: bbox.height,
        });
    }

    let subject_mask = GrayImage::from_fn(bbox.width, bbox.height, |x, y| {
        if labels.get_pixel(bbox.x + x, bbox.y + y)[0] == chosen.label {
            FOREGROUND
        } else {
            BACKGROUND
        }
    });

    log::debug!(
        "Selected component {} (area {}, {}x{} at {},{})",
        chosen.label,
        chosen.area,
        bbox.width,
        bbox.height,
        bbox.x,
        bbox.y
    );
    Ok(Subject {
        bbox,
        mask: subject_mask,
    })
}

pub fn binarize(mask: &LabelMask) -> GrayImage {
    let (rows, cols) = mask.dim();
    GrayImage::from_fn(cols as u32, rows as u32, |x, y| {
        if mask[[y as usize, x as usize]] > 0 {
            FOREGROUND
        } else {
            BACKGROUND
        }
    })
}

/// Opening removes speckle, closing bridges small gaps.
pub fn clean(binary: &GrayImage) -> GrayImage {
    let opened = grayscale_open(binary, &Mask::diamond(1));
    grayscale_close(&opened, &ellipse_kernel())
}

/// The 7x7 ellipse: rows one and two away from the center are full width.
pub fn ellipse_kernel() -> Mask {
    let shape = GrayImage::from_fn(7, 7, |x, y| {
        if x.abs_diff(3) <= ELLIPSE_HALF_WIDTHS[y as usize] {
            FOREGROUND
        } else {
            BACKGROUND
        }
    });
    Mask::from_image(&shape, 3, 3)
}

/// Area and tight bounding box of every label, ordered by label.
pub fn measure_components(
    labels: &image::ImageBuffer<Luma<u32>, Vec<u32>>,
) -> Vec<Component> {
    let count = labels.pixels().map(|p| p[0]).max().unwrap_or(0) as usize;
    // (area, min_x, min_y, max_x, max_y)
    let mut stats = vec![(0u32, u32::MAX, u32::MAX, 0u32, 0u32); count];

    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel[0];
        if label == 0 {
            continue;
        }
        let entry = &mut stats[(label - 1) as usize];
        entry.0 += 1;
        entry.1 = entry.1.min(x);
        entry.2 = entry.2.min(y);
        entry.3 = entry.3.max(x);
        entry.4 = entry.4.max(y);
    }

    stats
        .into_iter()
        .enumerate()
        .filter(|(_, (area, ..))| *area > 0)
        .map(|(i, (area, min_x, min_y, max_x, max_y))| Component {
            label: i as u32 + 1,
            area,
            bbox: BoundingBox {
                x: min_x,
                y: min_y,
                width: max_x - min_x + 1,
                height: max_y - min_y + 1,
            },
        })
        .collect()
}

pub fn score_component(
    component: &Component,
    image_width: u32,
    image_height: u32,
) -> ComponentScore {
    let bbox = component.bbox;

    let area = f64::from(component.area) / (f64::from(image_width) * f64::from(image_height));

    let (cx, cy) = bbox.center();
    let (icx, icy) = (image_width / 2, image_height / 2);
    let dx = f64::from(cx) - f64::from(icx);
    let dy = f64::from(cy) - f64::from(icy);
    let max_distance = f64::from(icx).hypot(f64::from(icy));
    let position = 1.0 - dx.hypot(dy) / max_distance;

    let long = f64::from(bbox.width.max(bbox.height));
    let short = f64::from(bbox.width.min(bbox.height));
    let aspect_ratio = long / short;
    let shape = if aspect_ratio <= 2.0 {
        1.0
    } else if aspect_ratio <= 3.0 {
        0.7
    } else {
        0.3
    };

    let size_ratio = short / f64::from(image_width.max(image_height));
    let size = if (0.1..=0.8).contains(&size_ratio) { 1.0 } else { 0.5 };

    ComponentScore {
        area,
        position,
        shape,
        size,
    }
}

/// Highest-scoring component at or above `noise_floor`; ties keep the lower label.
pub fn best_component(
    components: &[Component],
    image_width: u32,
    image_height: u32,
    noise_floor: u32,
) -> Option<Component> {
    let mut best: Option<(f64, Component)> = None;

    for component in components.iter().filter(|c| c.area >= noise_floor) {
        let score = score_component(component, image_width, image_height);
        let total = score.total();
        log::debug!(
            "  component {}: area={}, center={:?}, size={}x{}, score={:.3}",
            component.label,
            component.area,
            component.bbox.center(),
            component.bbox.width,
            component.bbox.height,
            total
        );
        if best.is_none_or(|(best_total, _)| total > best_total) {
            best = Some((total, *component));
        }
    }

    best.map(|(total, component)| {
        log::info!(
            "Picked component {} with score {:.3} ({}x{})",
            component.label,
            total,
            component.bbox.width,
            component.bbox.height
        );
        component
    })
}
