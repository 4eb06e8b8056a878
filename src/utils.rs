use geo::{Area, Coord, Intersects, Line, LineString, Polygon};
use imageproc::distance_transform::Norm;

/// Morphological opening with a 3x3 square, removes speckles narrower than 3 px.
pub fn open_mask(mask: &image::GrayImage) -> image::GrayImage {
    imageproc::morphology::open(mask, Norm::LInf, 1)
}

pub fn ring(points: &[[f64; 2]]) -> LineString<f64> {
    // Polygon::new closes the ring
    LineString::from(
        points
            .iter()
            .map(|&[x, y]| Coord { x, y })
            .collect::<Vec<_>>(),
    )
}

pub fn ring_area(points: &[[f64; 2]]) -> f64 {
    Polygon::new(ring(points), vec![]).unsigned_area()
}

/// True when no two non-adjacent edges of the closed ring touch.
pub fn is_simple_ring(points: &[[f64; 2]]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }

    let edge = |i: usize| {
        let [x1, y1] = points[i];
        let [x2, y2] = points[(i + 1) % n];
        Line::new(Coord { x: x1, y: y1 }, Coord { x: x2, y: y2 })
    };

    for i in 0..n {
        for j in (i + 2)..n {
            // first and last edges share the closing vertex
            if i == 0 && j == n - 1 {
                continue;
            }
            if edge(i).intersects(&edge(j)) {
                return false;
            }
        }
    }

    true
}
