//! Observation triple (grid, self status, enemy status) and its tensor encoding

use burn::prelude::*;

use crate::error::{Result, TrainError};

/// Grid cells hold raw unit/terrain codes in `0..=255`
pub const GRID_SCALE: f32 = 255.0;

/// One captured observation
///
/// Immutable once built: stores keep their own copy, so the caller's value can
/// be reused or dropped freely after insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Square grid, row-major `[grid_size * grid_size]`
    grid: Vec<f32>,
    /// Self-status vector
    self_status: Vec<f32>,
    /// Enemy-status vector
    enemy_status: Vec<f32>,
}

impl Observation {
    pub fn new(grid: Vec<f32>, self_status: Vec<f32>, enemy_status: Vec<f32>) -> Self {
        Self {
            grid,
            self_status,
            enemy_status,
        }
    }

    pub fn grid(&self) -> &[f32] {
        &self.grid
    }

    pub fn self_status(&self) -> &[f32] {
        &self.self_status
    }

    pub fn enemy_status(&self) -> &[f32] {
        &self.enemy_status
    }
}

/// Expected dimensions of every observation in a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationShape {
    /// Side length of the square grid
    pub grid_size: usize,
    /// Length of the self-status vector
    pub self_len: usize,
    /// Length of the enemy-status vector
    pub enemy_len: usize,
}

impl ObservationShape {
    pub fn new(grid_size: usize, self_len: usize, enemy_len: usize) -> Self {
        Self {
            grid_size,
            self_len,
            enemy_len,
        }
    }

    /// 11x11 field of view with 7-wide status vectors
    pub fn strikeforce() -> Self {
        Self::new(11, 7, 7)
    }

    pub fn grid_cells(&self) -> usize {
        self.grid_size * self.grid_size
    }

    /// Length of the concatenated `[grid, self, enemy]` feature vector
    pub fn flat_len(&self) -> usize {
        self.grid_cells() + self.self_len + self.enemy_len
    }

    /// Fail fast on malformed observations
    pub fn validate(&self, observation: &Observation) -> Result<()> {
        if observation.grid.len() != self.grid_cells() {
            return Err(TrainError::invalid_input(format!(
                "grid has {} cells, expected {}x{}",
                observation.grid.len(),
                self.grid_size,
                self.grid_size
            )));
        }
        if observation.self_status.len() != self.self_len {
            return Err(TrainError::invalid_input(format!(
                "self-status has {} values, expected {}",
                observation.self_status.len(),
                self.self_len
            )));
        }
        if observation.enemy_status.len() != self.enemy_len {
            return Err(TrainError::invalid_input(format!(
                "enemy-status has {} values, expected {}",
                observation.enemy_status.len(),
                self.enemy_len
            )));
        }
        Ok(())
    }
}

impl Default for ObservationShape {
    fn default() -> Self {
        Self::strikeforce()
    }
}

/// Batched observation tensors handed to a model
#[derive(Debug, Clone)]
pub struct ObservationTensors<B: Backend> {
    /// Normalized grid `[batch, grid_size, grid_size]`
    pub grid: Tensor<B, 3>,
    /// `[batch, self_len]`
    pub self_status: Tensor<B, 2>,
    /// `[batch, enemy_len]`
    pub enemy_status: Tensor<B, 2>,
}

impl<B: Backend> ObservationTensors<B> {
    /// Stack observations into tensors, dividing grid codes by [`GRID_SCALE`]
    pub fn from_observations(
        observations: &[&Observation],
        shape: ObservationShape,
        device: &B::Device,
    ) -> Result<Self> {
        if observations.is_empty() {
            return Err(TrainError::invalid_input("cannot encode an empty batch"));
        }
        for observation in observations {
            shape.validate(observation)?;
        }

        let batch_size = observations.len();
        let grid: Vec<f32> = observations
            .iter()
            .flat_map(|o| o.grid.iter().map(|&cell| cell / GRID_SCALE))
            .collect();
        let self_status: Vec<f32> = observations
            .iter()
            .flat_map(|o| o.self_status.iter().copied())
            .collect();
        let enemy_status: Vec<f32> = observations
            .iter()
            .flat_map(|o| o.enemy_status.iter().copied())
            .collect();

        Ok(Self {
            grid: Tensor::<B, 1>::from_floats(grid.as_slice(), device).reshape([
                batch_size,
                shape.grid_size,
                shape.grid_size,
            ]),
            self_status: Tensor::<B, 1>::from_floats(self_status.as_slice(), device)
                .reshape([batch_size, shape.self_len]),
            enemy_status: Tensor::<B, 1>::from_floats(enemy_status.as_slice(), device)
                .reshape([batch_size, shape.enemy_len]),
        })
    }

    /// Encode a single observation as a batch of one
    pub fn single(
        observation: &Observation,
        shape: ObservationShape,
        device: &B::Device,
    ) -> Result<Self> {
        Self::from_observations(&[observation], shape, device)
    }

    pub fn batch_size(&self) -> usize {
        self.grid.dims()[0]
    }

    /// Concatenate into one `[batch, flat_len]` feature matrix
    pub fn flatten(self) -> Tensor<B, 2> {
        let [batch_size, rows, cols] = self.grid.dims();
        let grid = self.grid.reshape([batch_size, rows * cols]);
        Tensor::cat(vec![grid, self.self_status, self.enemy_status], 1)
    }
}
