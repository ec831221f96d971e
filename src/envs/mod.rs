//! Environments whose interaction can be recorded.
mod chain;
pub mod wrappers;

pub use chain::{Chain, Move};
pub use wrappers::{TraceRecording, WithTraceRecording, Wrap, Wrapped};

use crate::episode::Info;

/// The result of one environment step.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvStep<O> {
    /// Observation of the state after the step.
    pub observation: O,
    pub reward: f64,
    /// Whether this step ends the episode.
    pub done: bool,
    /// Auxiliary step metadata.
    pub info: Info,
}

/// A reinforcement learning environment with internal state.
pub trait Environment {
    type Observation;
    type Action;

    /// Start a new episode and return its initial observation.
    fn reset(&mut self) -> Self::Observation;

    /// Take a step in the environment.
    ///
    /// May panic if called before [`reset`](Environment::reset)
    /// or after a step returned `done = true`.
    fn step(&mut self, action: &Self::Action) -> EnvStep<Self::Observation>;
}

impl<E: Environment + ?Sized> Environment for Box<E> {
    type Observation = E::Observation;
    type Action = E::Action;

    fn reset(&mut self) -> Self::Observation {
        E::reset(self)
    }

    fn step(&mut self, action: &Self::Action) -> EnvStep<Self::Observation> {
        E::step(self, action)
    }
}
