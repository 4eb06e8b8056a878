use crate::config::Config;
use crate::utils::{is_simple_ring, open_mask, ring, ring_area};

use geo::Simplify;
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use serde::Serialize;
use std::cmp::Ordering;

/// Closed polygon in image pixel coordinates, serialized as `[[x, y], ...]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outline(Vec<[f32; 2]>);

impl Outline {
    pub fn points(&self) -> &[[f32; 2]] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn area(&self) -> f64 {
        let points: Vec<[f64; 2]> = self.0.iter().map(|&[x, y]| [x as f64, y as f64]).collect();
        ring_area(&points)
    }

    // (min_x, min_y, max_x, max_y)
    pub fn bounds(&self) -> [f32; 4] {
        self.0.iter().fold(
            [f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY],
            |[x1, y1, x2, y2], &[x, y]| [x1.min(x), y1.min(y), x2.max(x), y2.max(y)],
        )
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Vectorizer {
    pub simplify_tolerance: f64,
    pub min_area: f64,
}

impl Vectorizer {
    pub fn new(simplify_tolerance: f64, min_area: f64) -> Self {
        Self {
            simplify_tolerance,
            min_area,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.simplify_tolerance, config.min_area)
    }

    pub fn vectorize(&self, mask: &GrayImage) -> Vec<Outline> {
        vectorize(mask, self.simplify_tolerance, self.min_area)
    }
}

impl Default for Vectorizer {
    fn default() -> Self {
        Self::new(1.5, 150.0)
    }
}

/// Turns a mask into the outlines of its connected regions, largest first.
///
/// The mask is opened with a 3x3 square before tracing, so features thinner than that
/// disappear. Only outer borders of top-level regions are traced: holes and islands inside
/// holes are not reported. Contours under `min_area` px are dropped, the rest are
/// simplified with Ramer-Douglas-Peucker when `simplify_tolerance > 0`. Polygons left with
/// fewer than 3 vertices, self-intersecting ones and ones that shrank under `min_area`
/// are dropped as well.
pub fn vectorize(mask: &GrayImage, simplify_tolerance: f64, min_area: f64) -> Vec<Outline> {
    let opened = open_mask(mask);

    let mut polygons: Vec<(f64, Vec<[f64; 2]>)> = find_contours::<i32>(&opened)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| {
            c.points
                .iter()
                .map(|p| [p.x as f64, p.y as f64])
                .collect::<Vec<_>>()
        })
        .filter(|points| ring_area(points) >= min_area)
        .map(|points| simplify(points, simplify_tolerance))
        .filter(|points| points.len() >= 3 && is_simple_ring(points))
        .map(|points| (ring_area(&points), points))
        .filter(|(area, _)| *area >= min_area)
        .collect();

    polygons.sort_by(|(a, pa), (b, pb)| b.total_cmp(a).then_with(|| first_vertex_order(pa, pb)));

    polygons
        .into_iter()
        .map(|(_, points)| Outline(points.iter().map(|&[x, y]| [x as f32, y as f32]).collect()))
        .collect()
}

fn simplify(points: Vec<[f64; 2]>, tolerance: f64) -> Vec<[f64; 2]> {
    if tolerance <= 0.0 || points.len() < 3 {
        return points;
    }

    // close the contour so the seam between last and first point is simplified too
    let mut closed = points.clone();
    closed.push(points[0]);

    let mut simplified: Vec<[f64; 2]> = ring(&closed)
        .simplify(&tolerance)
        .coords()
        .map(|c| [c.x, c.y])
        .collect();

    if simplified.len() > 1 && simplified.first() == simplified.last() {
        simplified.pop();
    }

    simplified
}

// leftmost, then topmost first vertex
fn first_vertex_order(a: &[[f64; 2]], b: &[[f64; 2]]) -> Ordering {
    match (a.first(), b.first()) {
        (Some([ax, ay]), Some([bx, by])) => ax.total_cmp(bx).then_with(|| ay.total_cmp(by)),
        _ => a.len().cmp(&b.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn fill(mask: &mut GrayImage, x0: u32, y0: u32, x1: u32, y1: u32) {
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    fn assert_invariants(outlines: &[Outline], min_area: f64) {
        for outline in outlines {
            assert!(outline.len() >= 3);
            assert!(outline.area() >= min_area);
        }
        for pair in outlines.windows(2) {
            assert!(pair[0].area() >= pair[1].area());
        }
    }

    #[test]
    fn white_square_gives_one_polygon() {
        let mut mask = GrayImage::new(100, 100);
        fill(&mut mask, 40, 40, 60, 60);

        let outlines = Vectorizer::default().vectorize(&mask);
        assert_eq!(outlines.len(), 1);

        let [x1, y1, x2, y2] = outlines[0].bounds();
        assert!((x1 - 40.0).abs() <= 1.5 && (y1 - 40.0).abs() <= 1.5);
        assert!((x2 - 60.0).abs() <= 1.5 && (y2 - 60.0).abs() <= 1.5);

        let area = outlines[0].area();
        assert!((330.0..=420.0).contains(&area), "area was {area}");
    }

    #[test]
    fn empty_mask_gives_nothing() {
        let mask = GrayImage::new(50, 50);
        assert!(vectorize(&mask, 1.5, 150.0).is_empty());
    }

    #[test]
    fn small_regions_and_speckles_are_dropped() {
        let mut mask = GrayImage::new(100, 100);
        fill(&mut mask, 10, 10, 40, 40);
        fill(&mut mask, 70, 70, 76, 76); // 5x5 traced area, below 150
        mask.put_pixel(90, 5, Luma([255]));

        let outlines = vectorize(&mask, 1.5, 150.0);
        assert_eq!(outlines.len(), 1);
        assert_invariants(&outlines, 150.0);
    }

    #[test]
    fn largest_region_comes_first() {
        let mut mask = GrayImage::new(120, 120);
        fill(&mut mask, 80, 80, 96, 96);
        fill(&mut mask, 5, 5, 35, 35);
        fill(&mut mask, 50, 5, 70, 25);

        let outlines = vectorize(&mask, 1.5, 50.0);
        assert_eq!(outlines.len(), 3);
        assert_invariants(&outlines, 50.0);
        assert!(outlines[0].bounds()[0] < 10.0);
    }

    #[test]
    fn holes_are_not_reported() {
        let mut mask = GrayImage::new(100, 100);
        fill(&mut mask, 10, 10, 90, 90);
        for y in 30..70 {
            for x in 30..70 {
                mask.put_pixel(x, y, Luma([0]));
            }
        }
        // island inside the hole
        fill(&mut mask, 40, 40, 60, 60);

        let outlines = vectorize(&mask, 1.5, 150.0);
        assert_eq!(outlines.len(), 1);
        assert!(outlines[0].area() > 6000.0);
    }

    #[test]
    fn zero_tolerance_keeps_every_contour_pixel() {
        let mut mask = GrayImage::new(40, 40);
        fill(&mut mask, 10, 10, 30, 30);

        let raw = vectorize(&mask, 0.0, 150.0);
        let simplified = vectorize(&mask, 1.5, 150.0);

        assert_eq!(raw.len(), 1);
        assert!(raw[0].len() > simplified[0].len());
        assert_eq!(simplified[0].len(), 4);
    }

    #[test]
    fn output_is_deterministic() {
        let mut mask = GrayImage::new(80, 80);
        fill(&mut mask, 5, 5, 30, 40);
        fill(&mut mask, 45, 10, 75, 35);

        let a = serde_json::to_string(&vectorize(&mask, 1.5, 150.0)).unwrap();
        let b = serde_json::to_string(&vectorize(&mask, 1.5, 150.0)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn outline_serializes_as_point_list() {
        let outline = Outline(vec![[0.0, 0.0], [2.0, 0.0], [2.0, 2.0]]);
        assert_eq!(
            serde_json::to_string(&outline).unwrap(),
            "[[0.0,0.0],[2.0,0.0],[2.0,2.0]]"
        );
    }
}
