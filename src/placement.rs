//! Placement of construct centroids around reference centers
//!
//! Candidates come from a Fibonacci (golden-angle) sphere and are filtered
//! first-fit so no two accepted points are closer than the minimum separation.

use crate::{Result, SwarmError};
use podswarm_common::Vec3;
use std::f64::consts::PI;

/// `n` points spread over a sphere of `radius` around `center`
///
/// `n == 1` yields `center + (radius, 0, 0)`; the general formula divides by `n - 1`.
pub fn fibonacci_sphere(n: usize, radius: f64, center: Vec3) -> Vec<Vec3> {
    match n {
        0 => Vec::new(),
        1 => vec![center + Vec3::new(radius, 0.0, 0.0)],
        _ => {
            let golden_angle = PI * (3.0 - 5f64.sqrt());
            let last = (n - 1) as f64;
            (0..n)
                .map(|i| {
                    let y = 1.0 - 2.0 * i as f64 / last;
                    let r = (1.0 - y * y).max(0.0).sqrt();
                    let theta = i as f64 * golden_angle;
                    center + Vec3::new(theta.cos() * r, y, theta.sin() * r).scale(radius)
                })
                .collect()
        }
    }
}

/// Keep candidates, in input order, that are at least `min_distance` from every kept one
pub fn filter_non_overlapping(candidates: &[Vec3], min_distance: f64) -> Vec<Vec3> {
    filter_clear_of(&[], candidates, min_distance)
}

/// First-fit filter that also keeps `min_distance` from every `occupied` point
pub fn filter_clear_of(occupied: &[Vec3], candidates: &[Vec3], min_distance: f64) -> Vec<Vec3> {
    let mut accepted: Vec<Vec3> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if occupied
            .iter()
            .chain(accepted.iter())
            .all(|kept| kept.distance(*candidate) >= min_distance)
        {
            accepted.push(*candidate);
        }
    }
    accepted
}

/// Sizing derived from a template's bounding radius
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FleetGeometry {
    /// Centroid-to-farthest-part distance of the template
    pub bounding_radius: f64,
    /// Distance from each reference center to the construct centroids
    pub orbit_radius: f64,
    /// Minimum centroid-to-centroid distance between constructs
    pub min_separation: f64,
}

impl FleetGeometry {
    pub fn new(bounding_radius: f64, offset: Vec3) -> Self {
        let orbit_radius = offset.length().max(2.0 * bounding_radius) + bounding_radius;
        Self {
            bounding_radius,
            orbit_radius,
            min_separation: 4.0 * bounding_radius,
        }
    }
}

/// A placement assigned to one fleet member
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slot {
    pub center: Vec3,
    pub position: Vec3,
}

/// Assign `per_center` non-overlapping slots around each center
///
/// `occupied` holds positions already claimed by live constructs; new slots
/// keep clear of them. When claimed positions knock out candidates, the
/// sphere around that center is resampled with one more point at a time, at
/// most once per occupied position. Fails with a capacity error, before
/// anything is spawned, when fewer slots survive than were requested.
pub fn plan_slots(
    centers: &[Vec3],
    per_center: usize,
    geometry: &FleetGeometry,
    occupied: &[Vec3],
) -> Result<Vec<Slot>> {
    if centers.is_empty() && per_center > 0 {
        return Err(SwarmError::Validation("no reference centers given".into()));
    }

    let requested = centers.len() * per_center;
    let mut blocked: Vec<Vec3> = occupied.to_vec();
    let mut slots: Vec<Slot> = Vec::with_capacity(requested);

    for center in centers {
        let mut kept: Vec<Vec3> = Vec::new();
        for n in per_center..=per_center + occupied.len() {
            let candidates = fibonacci_sphere(n, geometry.orbit_radius, *center);
            let survivors = filter_clear_of(&blocked, &candidates, geometry.min_separation);
            if survivors.len() > kept.len() {
                kept = survivors;
            }
            if kept.len() >= per_center {
                break;
            }
        }
        kept.truncate(per_center);
        blocked.extend_from_slice(&kept);
        slots.extend(kept.into_iter().map(|position| Slot {
            center: *center,
            position,
        }));
    }

    if slots.len() < requested {
        return Err(SwarmError::Capacity {
            available: slots.len(),
            requested,
        });
    }
    Ok(slots)
}
