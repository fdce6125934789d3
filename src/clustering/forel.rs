//! FOREL: iterative mode-seeking partition
//!
//! Repeatedly seeds a center at the first unassigned item, moves it to the
//! mean of every unassigned item within `radius` until it stops moving, and
//! extracts that neighbourhood as one cluster. Every item ends up in exactly
//! one cluster; clusters are returned in the order they were extracted and
//! keep their members in input order.

use std::fmt::Debug;
use tracing::warn;

use super::ClusterError;
use crate::types::GeoPoint;

/// A position FOREL can measure and average.
pub trait Point: Copy + Debug {
    fn distance(&self, other: &Self) -> f64;

    /// Arithmetic mean, `None` for an empty slice.
    fn centroid(points: &[Self]) -> Option<Self>;
}

/// Flat Euclidean metric on (lat, lon); adequate at city scale.
impl Point for GeoPoint {
    fn distance(&self, other: &Self) -> f64 {
        (self.lat - other.lat).hypot(self.lon - other.lon)
    }

    fn centroid(points: &[Self]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let n = points.len() as f64;
        let (lat, lon) = points
            .iter()
            .fold((0.0, 0.0), |(lat, lon), p| (lat + p.lat, lon + p.lon));
        Some(GeoPoint::new(lat / n, lon / n))
    }
}

/// Scalar positions, e.g. seconds since the epoch.
impl Point for f64 {
    fn distance(&self, other: &Self) -> f64 {
        (self - other).abs()
    }

    fn centroid(points: &[Self]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        Some(points.iter().sum::<f64>() / points.len() as f64)
    }
}

/// FOREL parameters for one metric space.
#[derive(Debug, Clone, Copy)]
pub struct Forel {
    radius: f64,
    epsilon: f64,
    max_iterations: usize,
}

impl Forel {
    pub fn new(radius: f64, epsilon: f64, max_iterations: usize) -> Self {
        Self {
            radius,
            epsilon,
            max_iterations: max_iterations.max(1),
        }
    }

    /// Partition `items` by the position `position` assigns to each.
    ///
    /// Terminates: each round extracts at least the items near a center
    /// computed from a non-empty neighbourhood, and the center search is
    /// capped at `max_iterations` steps.
    pub fn partition<T, P, F>(&self, items: Vec<T>, position: F) -> Result<Vec<Vec<T>>, ClusterError>
    where
        P: Point,
        F: Fn(&T) -> P,
    {
        let mut remaining: Vec<(T, P)> = items
            .into_iter()
            .map(|item| {
                let p = position(&item);
                (item, p)
            })
            .collect();
        let mut clusters = Vec::new();

        while let Some(&(_, seed)) = remaining.first() {
            let members = self.converge(&remaining, seed)?;

            let mut taken = vec![false; remaining.len()];
            for i in members {
                taken[i] = true;
            }

            let mut cluster = Vec::new();
            let mut rest = Vec::with_capacity(remaining.len());
            for ((item, p), take) in remaining.into_iter().zip(taken) {
                if take {
                    cluster.push(item);
                } else {
                    rest.push((item, p));
                }
            }
            clusters.push(cluster);
            remaining = rest;
        }

        Ok(clusters)
    }

    /// Indices of the neighbourhood the center settles on, starting at `seed`.
    fn converge<T, P: Point>(&self, remaining: &[(T, P)], seed: P) -> Result<Vec<usize>, ClusterError> {
        let mut center = seed;

        for iteration in 1..=self.max_iterations {
            let near: Vec<usize> = remaining
                .iter()
                .enumerate()
                .filter(|(_, (_, p))| p.distance(&center) <= self.radius)
                .map(|(i, _)| i)
                .collect();

            let positions: Vec<P> = near.iter().map(|&i| remaining[i].1).collect();
            let next = P::centroid(&positions).ok_or_else(|| ClusterError::Degenerate {
                center: format!("{center:?}"),
                radius: self.radius,
            })?;

            if next.distance(&center) <= self.epsilon {
                return Ok(near);
            }
            if iteration == self.max_iterations {
                warn!(
                    iterations = self.max_iterations,
                    members = near.len(),
                    radius = self.radius,
                    "FOREL center did not settle, extracting current neighbourhood"
                );
                return Ok(near);
            }
            center = next;
        }

        // max_iterations >= 1, so the loop always returns
        Err(ClusterError::Degenerate {
            center: format!("{center:?}"),
            radius: self.radius,
        })
    }
}
