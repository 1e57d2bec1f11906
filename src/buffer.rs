//! Structure-of-arrays point and trajectory buffers.
//!
//! Buffers are owned by the caller and mutated in place by the path functions. Each carries a
//! generation counter (`version`) that increases monotonically on every mutation, so consumers
//! (e.g. a renderer holding GPU copies) can detect staleness without comparing contents.
//!
//! All mutation goes through methods that bump the counter; the raw slices are only handed out
//! mutably inside [`Points2D::update`] / [`Trajectories::update`], which bump exactly once.

use ndarray::{Array2, ArrayView2};

use crate::{Error, Result};

/// `N` independent 2-D points, stored as two `f32` columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Points2D {
    xs: Vec<f32>,
    ys: Vec<f32>,
    version: u64,
}

impl Points2D {
    pub fn zeros(n: usize) -> Self {
        Self {
            xs: vec![0.0; n],
            ys: vec![0.0; n],
            version: 0,
        }
    }

    pub fn from_xy(xs: Vec<f32>, ys: Vec<f32>) -> Result<Self> {
        if xs.len() != ys.len() {
            return Err(Error::Shape("xs and ys must have the same length"));
        }
        Ok(Self { xs, ys, version: 0 })
    }

    pub fn from_points(points: &[[f32; 2]]) -> Self {
        Self {
            xs: points.iter().map(|p| p[0]).collect(),
            ys: points.iter().map(|p| p[1]).collect(),
            version: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.xs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.is_empty()
    }

    pub fn xs(&self) -> &[f32] {
        &self.xs
    }

    pub fn ys(&self) -> &[f32] {
        &self.ys
    }

    pub fn get(&self, i: usize) -> [f32; 2] {
        [self.xs[i], self.ys[i]]
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Overwrite a single point (e.g. a dragged handle).
    pub fn set(&mut self, i: usize, p: [f32; 2]) {
        self.xs[i] = p[0];
        self.ys[i] = p[1];
        self.version += 1;
    }

    /// Run a batch mutation over both columns; bumps the version once.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut [f32], &mut [f32]) -> R) -> R {
        let out = f(&mut self.xs, &mut self.ys);
        self.version += 1;
        out
    }

    /// Reallocate to `n` points (zero-filled) if the length differs.
    ///
    /// Returns `true` when a reallocation happened.
    pub fn resize(&mut self, n: usize) -> bool {
        if self.xs.len() == n {
            return false;
        }
        self.xs = vec![0.0; n];
        self.ys = vec![0.0; n];
        self.version += 1;
        true
    }

    /// Copy into an `n × 2` array.
    pub fn to_array(&self) -> Array2<f32> {
        let mut out = Array2::<f32>::zeros((self.len(), 2));
        for i in 0..self.len() {
            out[[i, 0]] = self.xs[i];
            out[[i, 1]] = self.ys[i];
        }
        out
    }

    pub(crate) fn to_f64(&self) -> (Vec<f64>, Vec<f64>) {
        (
            self.xs.iter().map(|&v| v as f64).collect(),
            self.ys.iter().map(|&v| v as f64).collect(),
        )
    }
}

/// `count` trajectories of `points_per_trajectory` points each.
///
/// Trajectory `i`, point `j` lives at flat index `i * points_per_trajectory + j`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Trajectories {
    xs: Vec<f32>,
    ys: Vec<f32>,
    count: usize,
    points_per_trajectory: usize,
    version: u64,
}

impl Trajectories {
    pub fn new(count: usize, points_per_trajectory: usize) -> Self {
        let n = count * points_per_trajectory;
        Self {
            xs: vec![0.0; n],
            ys: vec![0.0; n],
            count,
            points_per_trajectory,
            version: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn points_per_trajectory(&self) -> usize {
        self.points_per_trajectory
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn xs(&self) -> &[f32] {
        &self.xs
    }

    pub fn ys(&self) -> &[f32] {
        &self.ys
    }

    #[inline]
    pub fn index(&self, i: usize, j: usize) -> usize {
        debug_assert!(i < self.count && j < self.points_per_trajectory);
        i * self.points_per_trajectory + j
    }

    pub fn point(&self, i: usize, j: usize) -> [f32; 2] {
        let k = self.index(i, j);
        [self.xs[k], self.ys[k]]
    }

    /// Last point of trajectory `i`.
    ///
    /// Panics if the buffer holds zero points per trajectory.
    pub fn endpoint(&self, i: usize) -> [f32; 2] {
        assert!(self.points_per_trajectory > 0, "trajectories have no points");
        self.point(i, self.points_per_trajectory - 1)
    }

    /// The x coordinates as a `count × points_per_trajectory` view.
    pub fn xs_view(&self) -> ArrayView2<'_, f32> {
        ArrayView2::from_shape((self.count, self.points_per_trajectory), &self.xs)
            .expect("flat length is count * points_per_trajectory")
    }

    pub fn ys_view(&self) -> ArrayView2<'_, f32> {
        ArrayView2::from_shape((self.count, self.points_per_trajectory), &self.ys)
            .expect("flat length is count * points_per_trajectory")
    }

    /// Reallocate if either dimension changed. Returns `true` when a reallocation happened.
    pub fn resize(&mut self, count: usize, points_per_trajectory: usize) -> bool {
        if self.count == count && self.points_per_trajectory == points_per_trajectory {
            return false;
        }
        let n = count * points_per_trajectory;
        self.xs = vec![0.0; n];
        self.ys = vec![0.0; n];
        self.count = count;
        self.points_per_trajectory = points_per_trajectory;
        self.version += 1;
        tracing::debug!(
            target: "probpath::buffer",
            count,
            points_per_trajectory,
            "reallocated trajectory buffer"
        );
        true
    }

    /// Run a batch mutation (one full simulation pass); bumps the version once.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut TrajectoryWriter<'_>) -> R) -> R {
        let mut w = TrajectoryWriter {
            xs: &mut self.xs,
            ys: &mut self.ys,
            points_per_trajectory: self.points_per_trajectory,
        };
        let out = f(&mut w);
        self.version += 1;
        out
    }
}

/// Mutable access to a [`Trajectories`] buffer during one [`Trajectories::update`] pass.
pub struct TrajectoryWriter<'a> {
    xs: &'a mut [f32],
    ys: &'a mut [f32],
    points_per_trajectory: usize,
}

impl TrajectoryWriter<'_> {
    #[inline]
    pub fn set(&mut self, i: usize, j: usize, x: f32, y: f32) {
        let k = i * self.points_per_trajectory + j;
        self.xs[k] = x;
        self.ys[k] = y;
    }

    /// Write the `j`-th point of every trajectory from batch state columns.
    pub fn set_column(&mut self, j: usize, xs: &[f64], ys: &[f64]) {
        debug_assert_eq!(xs.len(), ys.len());
        for i in 0..xs.len() {
            self.set(i, j, xs[i] as f32, ys[i] as f32);
        }
    }
}
