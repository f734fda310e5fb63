use bevy::prelude::*;
use constants::layout::{
    ICOSAHEDRON_MAX_COUNT, ITEM_DIAMETER, PADDING_FACTOR, REFERENCE_ITEM_COUNT, REFERENCE_RADIUS,
    SPIRAL_MAX_COUNT,
};
use std::f32::consts::{PI, TAU};

const GOLDEN_RATIO: f32 = 1.618_034;

/// Strategy that produced a layout, chosen from the item count alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    Empty,
    Single,
    Icosahedron,
    GoldenSpiral,
    Fibonacci,
}

impl Distribution {
    pub fn for_count(count: usize) -> Self {
        match count {
            0 => Distribution::Empty,
            1 => Distribution::Single,
            n if n <= ICOSAHEDRON_MAX_COUNT => Distribution::Icosahedron,
            n if n <= SPIRAL_MAX_COUNT => Distribution::GoldenSpiral,
            _ => Distribution::Fibonacci,
        }
    }
}

/// Unit direction on the sphere for one layout slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutPoint {
    pub index: usize,
    pub direction: Vec3,
}

/// Layout for the current item count. Rebuilt whole whenever the count changes.
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct SphereState {
    pub item_count: usize,
    pub radius: f32,
    pub points: Vec<LayoutPoint>,
    pub distribution: Distribution,
}

impl Default for SphereState {
    fn default() -> Self {
        layout(0)
    }
}

impl SphereState {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn direction(&self, index: usize) -> Option<Vec3> {
        self.points.get(index).map(|p| p.direction)
    }

    /// Slot whose rotated direction is most aligned with the camera axis (+Z).
    pub fn active_slot(&self, orientation: Quat) -> Option<usize> {
        let camera_axis = orientation.inverse() * Vec3::Z;
        self.points
            .iter()
            .map(|p| (p.index, p.direction.dot(camera_axis)))
            .fold(None, |best: Option<(usize, f32)>, (index, alignment)| match best {
                Some((_, top)) if top >= alignment => best,
                _ => Some((index, alignment)),
            })
            .map(|(index, _)| index)
    }

    /// Slots ordered by angular distance from `index`, nearest first.
    pub fn nearest_slots(&self, index: usize, count: usize) -> Vec<usize> {
        let Some(origin) = self.direction(index) else {
            return Vec::new();
        };
        let mut others: Vec<(usize, f32)> = self
            .points
            .iter()
            .filter(|p| p.index != index)
            .map(|p| (p.index, p.direction.dot(origin)))
            .collect();
        others.sort_by(|a, b| b.1.total_cmp(&a.1));
        others.into_iter().take(count).map(|(i, _)| i).collect()
    }
}

/// Sphere radius for `count` items. Constant up to the reference count, then
/// grows with the square root of the count so surface area per item is fixed.
pub fn sphere_radius(count: usize) -> f32 {
    if count <= REFERENCE_ITEM_COUNT {
        return REFERENCE_RADIUS;
    }
    let area_radius = (ITEM_DIAMETER * ITEM_DIAMETER * PADDING_FACTOR * count as f32 / (4.0 * PI)).sqrt();
    REFERENCE_RADIUS.max(area_radius)
}

/// Deterministic layout for `count` items.
pub fn layout(count: usize) -> SphereState {
    let distribution = Distribution::for_count(count);
    let directions = match distribution {
        Distribution::Empty => Vec::new(),
        Distribution::Single => vec![Vec3::Z],
        Distribution::Icosahedron => icosahedron_points(count),
        Distribution::GoldenSpiral => golden_spiral_points(count),
        Distribution::Fibonacci => fibonacci_points(count),
    };

    SphereState {
        item_count: count,
        radius: sphere_radius(count),
        points: directions
            .into_iter()
            .enumerate()
            .map(|(index, direction)| LayoutPoint { index, direction })
            .collect(),
        distribution,
    }
}

/// Icosahedron vertices with poles on Z, listed as antipodal pairs so any
/// prefix stays spread over the sphere. Slot 0 is always +Z.
fn icosahedron_points(count: usize) -> Vec<Vec3> {
    let ring_z = 1.0 / 5f32.sqrt();
    let ring_radius = 2.0 / 5f32.sqrt();

    let mut points = vec![Vec3::Z, Vec3::NEG_Z];
    for k in 0..5 {
        let azimuth = TAU * k as f32 / 5.0;
        let upper = Vec3::new(ring_radius * azimuth.cos(), ring_radius * azimuth.sin(), ring_z);
        points.push(upper);
        points.push(-upper);
    }
    points.truncate(count);
    points
}

/// Golden-ratio spiral with half-offset latitudes, which keeps both poles clear.
fn golden_spiral_points(count: usize) -> Vec<Vec3> {
    let n = count as f32;
    (0..count)
        .map(|i| {
            let y = 1.0 - (2.0 * i as f32 + 1.0) / n;
            let ring = (1.0 - y * y).max(0.0).sqrt();
            let theta = TAU * i as f32 / GOLDEN_RATIO;
            Vec3::new(ring * theta.cos(), y, ring * theta.sin())
        })
        .collect()
}

fn fibonacci_points(count: usize) -> Vec<Vec3> {
    let golden_angle = PI * (3.0 - 5f32.sqrt());
    let last = (count - 1) as f32;
    (0..count)
        .map(|i| {
            let y = 1.0 - 2.0 * i as f32 / last;
            let ring = (1.0 - y * y).max(0.0).sqrt();
            let theta = golden_angle * i as f32;
            Vec3::new(ring * theta.cos(), y, ring * theta.sin())
        })
        .collect()
}
