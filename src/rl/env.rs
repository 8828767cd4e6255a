//! RL Environment - gym-like interface to the game and a channel boundary for
//! games running on another thread

use std::sync::mpsc::{self, Receiver, Sender};

use super::action_set::ActionSet;
use super::observation::Observation;
use crate::error::{Result, TrainError};

/// Step result from the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next observation
    pub observation: Observation,
    /// Reward for the submitted action
    pub reward: f32,
    /// Episode done
    pub done: bool,
    /// Additional info
    pub info: StepInfo,
}

/// Additional information from a step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepInfo {
    /// Steps taken this episode
    pub steps: usize,
    /// Enemies defeated this episode
    pub kills: usize,
    /// Player was defeated
    pub died: bool,
    /// Hit the step limit
    pub truncated: bool,
}

/// Game environment driven by discrete action indices
pub trait Environment {
    /// The fixed action enumeration for this environment
    fn action_set(&self) -> &ActionSet;

    /// Start a new episode
    fn reset(&mut self) -> Result<Observation>;

    /// Apply one action; indices outside the action set are `InvalidInput`
    fn step(&mut self, action: usize) -> Result<StepResult>;
}

#[derive(Debug)]
pub enum EnvRequest {
    Reset,
    Step(usize),
}

#[derive(Debug)]
pub enum EnvResponse {
    Reset(Result<Observation>),
    Step(Result<StepResult>),
}

/// Trainer-side handle to a game living on another thread
///
/// Every call blocks until the game answers, so the training loop stays
/// strictly sequential and keeps exclusive ownership of its experience stores.
pub struct ChannelEnv {
    actions: ActionSet,
    requests: Sender<EnvRequest>,
    responses: Receiver<EnvResponse>,
}

/// Game-side end of a [`ChannelEnv`]
pub struct GameEndpoint {
    requests: Receiver<EnvRequest>,
    responses: Sender<EnvResponse>,
}

/// Create a connected trainer/game channel pair
pub fn channel_env(actions: ActionSet) -> (ChannelEnv, GameEndpoint) {
    let (request_tx, request_rx) = mpsc::channel();
    let (response_tx, response_rx) = mpsc::channel();

    (
        ChannelEnv {
            actions,
            requests: request_tx,
            responses: response_rx,
        },
        GameEndpoint {
            requests: request_rx,
            responses: response_tx,
        },
    )
}

impl ChannelEnv {
    fn round_trip(&self, request: EnvRequest) -> Result<EnvResponse> {
        self.requests
            .send(request)
            .map_err(|_| TrainError::Environment("game endpoint disconnected".to_string()))?;
        self.responses
            .recv()
            .map_err(|_| TrainError::Environment("game endpoint hung up".to_string()))
    }
}

impl Environment for ChannelEnv {
    fn action_set(&self) -> &ActionSet {
        &self.actions
    }

    fn reset(&mut self) -> Result<Observation> {
        match self.round_trip(EnvRequest::Reset)? {
            EnvResponse::Reset(result) => result,
            EnvResponse::Step(_) => Err(TrainError::Environment(
                "expected reset response, got step".to_string(),
            )),
        }
    }

    fn step(&mut self, action: usize) -> Result<StepResult> {
        self.actions.validate(action)?;
        match self.round_trip(EnvRequest::Step(action))? {
            EnvResponse::Step(result) => result,
            EnvResponse::Reset(_) => Err(TrainError::Environment(
                "expected step response, got reset".to_string(),
            )),
        }
    }
}

impl GameEndpoint {
    /// Answer requests with `env` until the trainer side is dropped
    ///
    /// Returns the number of requests served.
    pub fn serve<E: Environment>(self, env: &mut E) -> usize {
        let mut served = 0;
        while let Ok(request) = self.requests.recv() {
            let response = match request {
                EnvRequest::Reset => EnvResponse::Reset(env.reset()),
                EnvRequest::Step(action) => EnvResponse::Step(env.step(action)),
            };
            served += 1;
            if self.responses.send(response).is_err() {
                break;
            }
        }
        tracing::debug!("Game endpoint closed after {} requests", served);
        served
    }
}
