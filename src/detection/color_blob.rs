//! Color-band blob detector.
//!
//! Pipeline: RGB → HSV, union of two inclusive HSV bands into a binary mask,
//! median filter to drop speckle, 8-connected component labelling, keep the
//! largest component, fit its minimal enclosing circle.

use std::collections::BTreeMap;

use log::debug;

use super::Detection;
use crate::camera::Frame;
use crate::config::{DetectionSettings, HsvRange};

#[derive(Debug, Clone)]
pub struct ColorBlobDetector {
    ranges: [HsvRange; 2],
    median_kernel: usize,
    min_radius_px: f64,
}

impl ColorBlobDetector {
    pub fn new(ranges: [HsvRange; 2], median_kernel: usize, min_radius_px: f64) -> Self {
        Self {
            ranges,
            median_kernel: median_kernel.max(1) | 1,
            min_radius_px,
        }
    }

    pub fn from_settings(settings: &DetectionSettings) -> Self {
        Self::new(
            settings.color_ranges,
            settings.median_kernel,
            settings.min_radius_px,
        )
    }

    pub fn detect(&self, frame: &Frame) -> Option<Detection> {
        let mask = Mask::from_frame(frame, &self.ranges).median(self.median_kernel);
        let blob = largest_component(&mask)?;
        let circle = min_enclosing_circle(&convex_hull(blob.row_extremes()))?;

        if circle.radius < self.min_radius_px {
            debug!(
                "Blob of {} px rejected: radius {:.1} < {:.1}",
                blob.area, circle.radius, self.min_radius_px
            );
            return None;
        }

        Some(Detection {
            x: circle.cx as i32,
            y: circle.cy as i32,
            extent: circle.radius as i32,
            distance_cm: None,
        })
    }
}

/// Convert one RGB pixel to 8-bit HSV with hue on the 0..=179 scale.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f64::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max > 0.0 { delta / max * 255.0 } else { 0.0 };
    let h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    [
        ((h / 2.0).round() as u16 % 180) as u8,
        s.round() as u8,
        max as u8,
    ]
}

/// Row-major binary image.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<bool>,
}

impl Mask {
    pub fn from_frame(frame: &Frame, ranges: &[HsvRange]) -> Self {
        let data = frame
            .pixels()
            .map(|px| {
                let hsv = rgb_to_hsv(px.0);
                ranges.iter().any(|range| range.contains(hsv))
            })
            .collect();
        Self {
            width: frame.width() as usize,
            height: frame.height() as usize,
            data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    /// Binary median over a `kernel × kernel` window with replicated borders.
    pub fn median(&self, kernel: usize) -> Self {
        if kernel <= 1 || self.data.is_empty() {
            return self.clone();
        }
        let half = (kernel / 2) as isize;
        let majority = kernel * kernel / 2;
        let clamp = |v: isize, len: usize| v.clamp(0, len as isize - 1) as usize;

        let mut data = vec![false; self.data.len()];
        for y in 0..self.height {
            for x in 0..self.width {
                let mut set = 0;
                for dy in -half..=half {
                    let sy = clamp(y as isize + dy, self.height);
                    for dx in -half..=half {
                        let sx = clamp(x as isize + dx, self.width);
                        if self.get(sx, sy) {
                            set += 1;
                        }
                    }
                }
                data[y * self.width + x] = set > majority;
            }
        }
        Self {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

/// Pixels of one connected component.
#[derive(Debug, Clone)]
pub struct Blob {
    pub area: usize,
    /// Leftmost and rightmost column for every occupied row.
    pub rows: BTreeMap<usize, (usize, usize)>,
}

impl Blob {
    /// The row extremes, which contain every convex hull vertex.
    pub fn row_extremes(&self) -> Vec<(f64, f64)> {
        let mut points = Vec::with_capacity(self.rows.len() * 2);
        for (&y, &(x0, x1)) in &self.rows {
            points.push((x0 as f64, y as f64));
            if x1 != x0 {
                points.push((x1 as f64, y as f64));
            }
        }
        points
    }
}

fn find_root(parents: &mut [usize], label: usize) -> usize {
    let mut current = label;
    while current != parents[current] {
        parents[current] = parents[parents[current]];
        current = parents[current];
    }
    current
}

fn union_labels(parents: &mut [usize], a: usize, b: usize) {
    let root_a = find_root(parents, a);
    let root_b = find_root(parents, b);
    if root_a < root_b {
        parents[root_b] = root_a;
    } else if root_b < root_a {
        parents[root_a] = root_b;
    }
}

/// Two-pass 8-connected labelling. Returns per-pixel root labels (0 is
/// background) and the flattened parent table.
fn label_components(mask: &Mask) -> (Vec<usize>, Vec<usize>) {
    let (width, height) = (mask.width, mask.height);
    let mut labels = vec![0usize; width * height];
    let mut parents = vec![0usize];

    for y in 0..height {
        for x in 0..width {
            if !mask.get(x, y) {
                continue;
            }
            let mut neighbours = [0usize; 4];
            let mut n = 0;
            if x > 0 {
                neighbours[n] = labels[y * width + x - 1];
                n += 1;
            }
            if y > 0 {
                let up = (y - 1) * width;
                if x > 0 {
                    neighbours[n] = labels[up + x - 1];
                    n += 1;
                }
                neighbours[n] = labels[up + x];
                n += 1;
                if x + 1 < width {
                    neighbours[n] = labels[up + x + 1];
                    n += 1;
                }
            }

            let present = neighbours[..n].iter().copied().filter(|&l| l > 0);
            match present.clone().min() {
                None => {
                    let label = parents.len();
                    parents.push(label);
                    labels[y * width + x] = label;
                }
                Some(min_label) => {
                    labels[y * width + x] = min_label;
                    for other in present.filter(|&l| l != min_label) {
                        union_labels(&mut parents, min_label, other);
                    }
                }
            }
        }
    }

    for label in 1..parents.len() {
        find_root(&mut parents, label);
    }
    for label in labels.iter_mut().filter(|l| **l > 0) {
        *label = parents[*label];
    }
    (labels, parents)
}

/// The component with the most pixels, if any pixel is set.
pub fn largest_component(mask: &Mask) -> Option<Blob> {
    let (labels, parents) = label_components(mask);
    let mut areas = vec![0usize; parents.len()];
    for &label in labels.iter().filter(|&&l| l > 0) {
        areas[label] += 1;
    }

    // First label wins ties, so scanning order decides between equal blobs.
    let mut best: Option<(usize, usize)> = None;
    for (label, &area) in areas.iter().enumerate().skip(1) {
        if area > 0 && best.is_none_or(|(_, best_area)| area > best_area) {
            best = Some((label, area));
        }
    }
    let (best_label, area) = best?;

    let mut rows: BTreeMap<usize, (usize, usize)> = BTreeMap::new();
    for (idx, _) in labels.iter().enumerate().filter(|(_, l)| **l == best_label) {
        let (x, y) = (idx % mask.width, idx / mask.width);
        rows.entry(y)
            .and_modify(|(x0, x1)| {
                *x0 = (*x0).min(x);
                *x1 = (*x1).max(x);
            })
            .or_insert((x, x));
    }

    Some(Blob { area, rows })
}

fn cross(o: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

/// Andrew's monotone chain. Collinear points are dropped.
pub fn convex_hull(mut points: Vec<(f64, f64)>) -> Vec<(f64, f64)> {
    points.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)));
    points.dedup();
    if points.len() < 3 {
        return points;
    }

    let mut hull = half_hull(points.iter());
    hull.extend(half_hull(points.iter().rev()));
    hull
}

fn half_hull<'a>(points: impl Iterator<Item = &'a (f64, f64)>) -> Vec<(f64, f64)> {
    let mut chain: Vec<(f64, f64)> = Vec::new();
    for &p in points {
        while chain.len() >= 2 && cross(chain[chain.len() - 2], chain[chain.len() - 1], p) <= 0.0 {
            chain.pop();
        }
        chain.push(p);
    }
    chain.pop();
    chain
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Circle {
    pub cx: f64,
    pub cy: f64,
    pub radius: f64,
}

impl Circle {
    fn contains(&self, p: (f64, f64)) -> bool {
        let d = ((p.0 - self.cx).powi(2) + (p.1 - self.cy).powi(2)).sqrt();
        d <= self.radius + 1e-7
    }

    fn from_two(a: (f64, f64), b: (f64, f64)) -> Self {
        Self {
            cx: (a.0 + b.0) / 2.0,
            cy: (a.1 + b.1) / 2.0,
            radius: ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt() / 2.0,
        }
    }

    fn from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Self {
        let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
        if d.abs() < 1e-12 {
            // Collinear: the widest pair spans all three.
            return [Self::from_two(a, b), Self::from_two(b, c), Self::from_two(a, c)]
                .into_iter()
                .max_by(|x, y| x.radius.total_cmp(&y.radius))
                .unwrap_or(Self::from_two(a, c));
        }
        let sq = |p: (f64, f64)| p.0 * p.0 + p.1 * p.1;
        let cx = (sq(a) * (b.1 - c.1) + sq(b) * (c.1 - a.1) + sq(c) * (a.1 - b.1)) / d;
        let cy = (sq(a) * (c.0 - b.0) + sq(b) * (a.0 - c.0) + sq(c) * (b.0 - a.0)) / d;
        let radius = ((a.0 - cx).powi(2) + (a.1 - cy).powi(2)).sqrt();
        Self { cx, cy, radius }
    }
}

/// Smallest circle containing every point (incremental Welzl).
pub fn min_enclosing_circle(points: &[(f64, f64)]) -> Option<Circle> {
    let first = *points.first()?;
    let mut circle = Circle {
        cx: first.0,
        cy: first.1,
        radius: 0.0,
    };

    for i in 1..points.len() {
        if circle.contains(points[i]) {
            continue;
        }
        circle = Circle {
            cx: points[i].0,
            cy: points[i].1,
            radius: 0.0,
        };
        for j in 0..i {
            if circle.contains(points[j]) {
                continue;
            }
            circle = Circle::from_two(points[i], points[j]);
            for k in 0..j {
                if !circle.contains(points[k]) {
                    circle = Circle::from_three(points[i], points[j], points[k]);
                }
            }
        }
    }
    Some(circle)
}
