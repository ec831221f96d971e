//! Episodes and the in-progress episode buffer.
use crate::dtype::Element;
use crate::error::{InvariantError, ProtocolError, RecordError};
use crate::frames::{AsFrame, Field, FrameStack, ShapeMismatch};
use ndarray::{Array1, ArrayD};
use serde::{Deserialize, Serialize};

/// Auxiliary per-step metadata.
pub type Info = serde_json::Value;

/// One complete reset-to-done trajectory.
///
/// For an episode of `N` steps:
/// * `observations` has shape `(N + 1, ...observation_shape)`
///     and includes the observation from the reset;
/// * `actions` has shape `(N, ...action_shape)`;
/// * `rewards` has shape `(N,)`;
/// * `infos`, when recorded, has length `N`.
///
/// Observations and actions are `None` for episodes captured in reward-only mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode<O, A> {
    pub observations: Option<ArrayD<O>>,
    pub actions: Option<ArrayD<A>>,
    pub rewards: Array1<f64>,
    pub infos: Option<Vec<Info>>,
}

impl<O, A> Episode<O, A> {
    /// Number of steps in the episode.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    #[must_use]
    pub const fn is_reward_only(&self) -> bool {
        self.observations.is_none()
    }
}

/// Which parts of each step are captured.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaptureMode {
    /// Only store rewards; observations and actions are discarded.
    pub only_reward: bool,
    /// Store the per-step info values.
    pub record_infos: bool,
}

#[derive(Debug, Clone)]
struct OpenEpisode<O, A> {
    observations: FrameStack<O>,
    actions: FrameStack<A>,
    rewards: Vec<f64>,
    infos: Vec<Info>,
}

impl<O, A> Default for OpenEpisode<O, A> {
    fn default() -> Self {
        Self {
            observations: FrameStack::default(),
            actions: FrameStack::default(),
            rewards: Vec::new(),
            infos: Vec::new(),
        }
    }
}

fn shape_error(field: Field) -> impl Fn(ShapeMismatch) -> InvariantError {
    move |err| InvariantError::FrameShape {
        field,
        expected: err.expected,
        found: err.found,
    }
}

/// Accumulates the in-progress episode.
///
/// An episode is started by [`add_reset`](EpisodeBuffer::add_reset), extended by
/// [`add_step`](EpisodeBuffer::add_step) and handed out by value from
/// [`end_episode`](EpisodeBuffer::end_episode).
#[derive(Debug, Clone)]
pub struct EpisodeBuffer<O, A> {
    mode: CaptureMode,
    open: Option<OpenEpisode<O, A>>,
}

impl<O, A> EpisodeBuffer<O, A> {
    #[must_use]
    pub const fn new(mode: CaptureMode) -> Self {
        Self { mode, open: None }
    }

    #[must_use]
    pub const fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// Whether an episode has been started and not yet ended.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Number of steps in the open episode, if any.
    #[must_use]
    pub fn num_steps(&self) -> Option<usize> {
        self.open.as_ref().map(|episode| episode.rewards.len())
    }
}

impl<O: Element, A: Element> EpisodeBuffer<O, A> {
    /// Start a new episode with its initial observation.
    pub fn add_reset<F>(&mut self, observation: &F) -> Result<(), RecordError>
    where
        F: AsFrame<Elem = O> + ?Sized,
    {
        if self.open.is_some() {
            return Err(ProtocolError::EpisodeInProgress.into());
        }
        let mut episode = OpenEpisode::default();
        if !self.mode.only_reward {
            episode
                .observations
                .push(observation)
                .map_err(shape_error(Field::Observations))?;
        }
        self.open = Some(episode);
        Ok(())
    }

    /// Append one transition to the open episode.
    ///
    /// In reward-only mode the action and observation are accepted but not stored.
    /// The info is only stored if infos are being recorded.
    /// Nothing is stored if an error is returned.
    pub fn add_step<FA, FO>(
        &mut self,
        action: &FA,
        observation: &FO,
        reward: f64,
        info: Info,
    ) -> Result<(), RecordError>
    where
        FA: AsFrame<Elem = A> + ?Sized,
        FO: AsFrame<Elem = O> + ?Sized,
    {
        let episode = self.open.as_mut().ok_or(ProtocolError::NoEpisode)?;
        if !self.mode.only_reward {
            episode
                .actions
                .check(action)
                .map_err(shape_error(Field::Actions))?;
            episode
                .observations
                .check(observation)
                .map_err(shape_error(Field::Observations))?;
            episode
                .actions
                .push(action)
                .map_err(shape_error(Field::Actions))?;
            episode
                .observations
                .push(observation)
                .map_err(shape_error(Field::Observations))?;
        }
        episode.rewards.push(reward);
        if self.mode.record_infos {
            episode.infos.push(info);
        }
        Ok(())
    }

    /// Finish the open episode and return it.
    ///
    /// The buffer is empty afterwards even if the episode fails validation.
    pub fn end_episode(&mut self) -> Result<Episode<O, A>, RecordError> {
        let episode = self.open.take().ok_or(ProtocolError::NoEpisode)?;
        let num_steps = episode.rewards.len();

        let (observations, actions) = if self.mode.only_reward {
            (None, None)
        } else {
            if episode.observations.len() != episode.actions.len() + 1
                || episode.actions.len() != num_steps
            {
                return Err(InvariantError::LengthMismatch {
                    observations: episode.observations.len(),
                    actions: episode.actions.len(),
                    rewards: num_steps,
                }
                .into());
            }
            (
                Some(stack(episode.observations, Field::Observations)?),
                Some(stack(episode.actions, Field::Actions)?),
            )
        };

        let infos = if self.mode.record_infos {
            if episode.infos.len() != num_steps {
                return Err(InvariantError::InfoCount {
                    infos: episode.infos.len(),
                    rewards: num_steps,
                }
                .into());
            }
            Some(episode.infos)
        } else {
            None
        };

        Ok(Episode {
            observations,
            actions,
            rewards: Array1::from(episode.rewards),
            infos,
        })
    }
}

fn stack<T: Element>(frames: FrameStack<T>, field: Field) -> Result<ArrayD<T>, InvariantError> {
    frames.into_array().map_err(|err| InvariantError::Stack {
        field,
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};
    use rstest::{fixture, rstest};
    use serde_json::json;

    type Buffer = EpisodeBuffer<f32, i64>;

    #[fixture]
    fn buffer() -> Buffer {
        EpisodeBuffer::new(CaptureMode::default())
    }

    #[rstest]
    fn episode_lengths_line_up(mut buffer: Buffer) {
        buffer.add_reset(&[0.0_f32, 0.5]).unwrap();
        buffer.add_step(&1_i64, &[1.0_f32, 1.5], 1.0, Info::Null).unwrap();
        buffer.add_step(&0_i64, &[2.0_f32, 2.5], -1.0, Info::Null).unwrap();
        assert_eq!(buffer.num_steps(), Some(2));
        let episode = buffer.end_episode().unwrap();

        assert!(!buffer.is_open());
        assert_eq!(episode.len(), 2);
        assert_eq!(
            episode.observations.unwrap(),
            arr2(&[[0.0_f32, 0.5], [1.0, 1.5], [2.0, 2.5]]).into_dyn()
        );
        assert_eq!(episode.actions.unwrap(), arr1(&[1_i64, 0]).into_dyn());
        assert_eq!(episode.rewards, arr1(&[1.0, -1.0]));
        assert_eq!(episode.infos, None);
    }

    #[rstest]
    fn reset_only_episode(mut buffer: Buffer) {
        buffer.add_reset(&[3.0_f32]).unwrap();
        let episode = buffer.end_episode().unwrap();
        assert!(episode.is_empty());
        assert_eq!(episode.observations.unwrap().shape(), &[1, 1]);
        assert_eq!(episode.actions.unwrap().shape(), &[0]);
    }

    #[rstest]
    fn step_before_reset(mut buffer: Buffer) {
        let err = buffer
            .add_step(&0_i64, &[0.0_f32], 0.0, Info::Null)
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::Protocol(ProtocolError::NoEpisode)
        ));
    }

    #[rstest]
    fn reset_twice(mut buffer: Buffer) {
        buffer.add_reset(&[0.0_f32]).unwrap();
        let err = buffer.add_reset(&[0.0_f32]).unwrap_err();
        assert!(matches!(
            err,
            RecordError::Protocol(ProtocolError::EpisodeInProgress)
        ));
        // The open episode is untouched
        assert_eq!(buffer.num_steps(), Some(0));
    }

    #[rstest]
    fn end_without_reset(mut buffer: Buffer) {
        assert!(matches!(
            buffer.end_episode(),
            Err(RecordError::Protocol(ProtocolError::NoEpisode))
        ));
    }

    #[rstest]
    fn reset_after_end(mut buffer: Buffer) {
        buffer.add_reset(&[0.0_f32]).unwrap();
        buffer.end_episode().unwrap();
        buffer.add_reset(&[1.0_f32]).unwrap();
        assert!(buffer.is_open());
    }

    #[rstest]
    fn observation_shape_change_stores_nothing(mut buffer: Buffer) {
        buffer.add_reset(&[0.0_f32, 0.0]).unwrap();
        let err = buffer
            .add_step(&1_i64, &[1.0_f32], 1.0, Info::Null)
            .unwrap_err();
        assert!(matches!(
            err,
            RecordError::Invariant(InvariantError::FrameShape {
                field: Field::Observations,
                ..
            })
        ));
        assert_eq!(buffer.num_steps(), Some(0));
        let episode = buffer.end_episode().unwrap();
        assert_eq!(episode.actions.unwrap().len(), 0);
    }

    #[test]
    fn reward_only_discards_frames() {
        let mut buffer = EpisodeBuffer::<f32, i64>::new(CaptureMode {
            only_reward: true,
            record_infos: false,
        });
        buffer.add_reset(&[0.0_f32]).unwrap();
        for i in 0..5 {
            // Shapes are not checked because nothing is stored
            buffer
                .add_step(&vec![i; i as usize], &[1.0_f32], i as f64, Info::Null)
                .unwrap();
        }
        let episode = buffer.end_episode().unwrap();
        assert!(episode.is_reward_only());
        assert_eq!(episode.actions, None);
        assert_eq!(episode.rewards.shape(), &[5]);
        assert_eq!(episode.rewards, arr1(&[0.0, 1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn infos_recorded() {
        let mut buffer = EpisodeBuffer::<f64, f64>::new(CaptureMode {
            only_reward: false,
            record_infos: true,
        });
        buffer.add_reset(&0.0_f64).unwrap();
        buffer.add_step(&1.0_f64, &1.0_f64, 0.0, json!({"lives": 3})).unwrap();
        buffer.add_step(&1.0_f64, &2.0_f64, 0.0, Info::Null).unwrap();
        let episode = buffer.end_episode().unwrap();
        assert_eq!(episode.infos, Some(vec![json!({"lives": 3}), Info::Null]));
    }

    #[rstest]
    fn episode_json_export(mut buffer: Buffer) {
        buffer.add_reset(&[0.0_f32]).unwrap();
        buffer.add_step(&2_i64, &[1.0_f32], 0.5, Info::Null).unwrap();
        let episode = buffer.end_episode().unwrap();
        let text = serde_json::to_string(&episode).unwrap();
        let restored: Episode<f32, i64> = serde_json::from_str(&text).unwrap();
        assert_eq!(restored, episode);
    }
}
