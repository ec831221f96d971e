//! Chain environment
use super::{EnvStep, Environment};
use crate::episode::Info;

/// Chain Environment
///
/// Consists of n states in a line with 2 actions.
/// * Action [`Move::LEFT`] moves back to the start for 2 reward.
/// * Action [`Move::RIGHT`] moves forward for 0 reward in all states but the last.
///     In the last state, moving right is a self-transition with 10 reward.
///
/// Episodes end after `episode_len` steps.
/// The observation is the index of the current state.
///
/// Deterministic variant of the chain in "Bayesian Q-learning" by Dearden, Friedman and Russel (1998).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chain {
    pub size: i64,
    pub episode_len: u64,
    state: i64,
    steps: u64,
}

impl Chain {
    #[must_use]
    pub const fn new(size: i64, episode_len: u64) -> Self {
        Self {
            size,
            episode_len,
            state: 0,
            steps: 0,
        }
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new(5, 10)
    }
}

/// Chain actions.
pub struct Move;

impl Move {
    pub const LEFT: i64 = 0;
    pub const RIGHT: i64 = 1;
}

impl Environment for Chain {
    type Observation = i64;
    type Action = i64;

    fn reset(&mut self) -> Self::Observation {
        self.state = 0;
        self.steps = 0;
        self.state
    }

    fn step(&mut self, action: &Self::Action) -> EnvStep<Self::Observation> {
        let reward = if *action == Move::LEFT {
            self.state = 0;
            2.0
        } else if self.state == self.size - 1 {
            10.0
        } else {
            self.state += 1;
            0.0
        };
        self.steps += 1;
        EnvStep {
            observation: self.state,
            reward,
            done: self.steps >= self.episode_len,
            info: Info::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn right_to_the_end() {
        let mut env = Chain::new(3, 4);
        assert_eq!(env.reset(), 0);
        let rewards: Vec<_> = (0..4).map(|_| env.step(&Move::RIGHT)).collect();
        assert_eq!(
            rewards.iter().map(|s| s.observation).collect::<Vec<_>>(),
            vec![1, 2, 2, 2]
        );
        assert_eq!(
            rewards.iter().map(|s| s.reward).collect::<Vec<_>>(),
            vec![0.0, 0.0, 10.0, 10.0]
        );
        assert_eq!(
            rewards.iter().map(|s| s.done).collect::<Vec<_>>(),
            vec![false, false, false, true]
        );
    }

    #[test]
    fn left_returns_to_start() {
        let mut env = Chain::default();
        env.reset();
        env.step(&Move::RIGHT);
        let step = env.step(&Move::LEFT);
        assert_eq!(step.observation, 0);
        assert_eq!(step.reward, 2.0);
    }
}
