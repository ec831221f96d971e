use super::Wrapped;
use crate::dtype::Element;
use crate::envs::{EnvStep, Environment};
use crate::error::RecordError;
use crate::frames::AsFrame;
use crate::recorder::TraceRecorder;
use ndarray::{ArrayD, ArrayViewD};
use std::fmt;

/// Transformation applied to each observation before it is recorded.
pub type Preprocess<O> = Box<dyn Fn(ArrayViewD<'_, O>) -> ArrayD<O> + Send>;

/// Environment wrapper that records a trace of every episode.
///
/// The environment sees unmodified observations;
/// only the recorded copy passes through the optional preprocessing function.
///
/// Unlike [`TraceRecorder::add_reset`], resetting while an episode is open is allowed:
/// the open episode is ended first and written if it has any steps.
pub struct TraceRecording<O, A> {
    pub recorder: TraceRecorder<O, A>,
    preprocess: Option<Preprocess<O>>,
}

impl<O, A> fmt::Debug for TraceRecording<O, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceRecording")
            .field("directory", &self.recorder.directory())
            .field("preprocess", &self.preprocess.is_some())
            .finish()
    }
}

impl<O, A> TraceRecording<O, A> {
    #[must_use]
    pub const fn new(recorder: TraceRecorder<O, A>) -> Self {
        Self {
            recorder,
            preprocess: None,
        }
    }

    /// Apply `preprocess` to each observation before recording it.
    #[must_use]
    pub fn with_preprocess<F>(mut self, preprocess: F) -> Self
    where
        F: Fn(ArrayViewD<'_, O>) -> ArrayD<O> + Send + 'static,
    {
        self.preprocess = Some(Box::new(preprocess));
        self
    }
}

impl<O: Element, A: Element> TraceRecording<O, A> {
    fn record_reset<F>(&mut self, observation: &F) -> Result<(), RecordError>
    where
        F: AsFrame<Elem = O> + ?Sized,
    {
        self.recorder.end_open_episode()?;
        match &self.preprocess {
            Some(preprocess) => self.recorder.add_reset(&preprocess(observation.as_frame())),
            None => self.recorder.add_reset(observation),
        }
    }

    fn record_step<FA, FO>(&mut self, action: &FA, step: &EnvStep<FO>) -> Result<(), RecordError>
    where
        FA: AsFrame<Elem = A> + ?Sized,
        FO: AsFrame<Elem = O>,
    {
        let info = step.info.clone();
        match &self.preprocess {
            Some(preprocess) => self.recorder.record_step(
                action,
                &preprocess(step.observation.as_frame()),
                step.reward,
                step.done,
                info,
            ),
            None => self.recorder.record_step(
                action,
                &step.observation,
                step.reward,
                step.done,
                info,
            ),
        }
    }
}

/// Wrap an environment so that its episodes are recorded.
pub type WithTraceRecording<E, O, A> = Wrapped<E, TraceRecording<O, A>>;

impl<E, O, A> Wrapped<E, TraceRecording<O, A>>
where
    E: Environment,
    E::Observation: AsFrame<Elem = O>,
    E::Action: AsFrame<Elem = A>,
    O: Element,
    A: Element,
{
    /// Reset the environment and start recording a new episode.
    pub fn reset(&mut self) -> Result<E::Observation, RecordError> {
        let observation = self.inner.reset();
        self.wrapper.record_reset(&observation)?;
        Ok(observation)
    }

    /// Step the environment and record the transition.
    ///
    /// The recorded episode ends when the step is `done`.
    pub fn step(&mut self, action: &E::Action) -> Result<EnvStep<E::Observation>, RecordError> {
        let step = self.inner.step(action);
        self.wrapper.record_step(action, &step)?;
        Ok(step)
    }

    /// Close the recorder, writing any remaining episodes.
    pub fn close(&mut self) -> Result<(), RecordError> {
        self.wrapper.recorder.close()
    }
}

#[cfg(test)]
mod tests {
    use super::super::Wrap;
    use super::*;
    use crate::envs::{Chain, Move};
    use crate::episode::Episode;
    use crate::error::ClosedError;
    use crate::recorder::TraceRecorderConfig;
    use crate::scanner::TraceScanner;
    use ndarray::{arr1, Array, Axis};
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn dir() -> TempDir {
        TempDir::new().unwrap()
    }

    fn recorded_chain(dir: &TempDir, config: TraceRecorderConfig) -> WithTraceRecording<Chain, i64, i64> {
        let recorder = TraceRecorderConfig {
            directory: Some(dir.path().to_owned()),
            ..config
        }
        .build_recorder()
        .unwrap();
        Chain::new(3, 4).wrap(TraceRecording::new(recorder))
    }

    fn run_episode(env: &mut WithTraceRecording<Chain, i64, i64>) {
        env.reset().unwrap();
        loop {
            if env.step(&Move::RIGHT).unwrap().done {
                break;
            }
        }
    }

    fn read_all(dir: &TempDir) -> Vec<Episode<i64, i64>> {
        TraceScanner::new(dir.path()).episodes().unwrap().collect()
    }

    #[rstest]
    fn records_complete_episodes(dir: TempDir) {
        let mut env = recorded_chain(&dir, TraceRecorderConfig::default().with_batch_size(2));
        for _ in 0..3 {
            run_episode(&mut env);
        }
        env.close().unwrap();

        let episodes = read_all(&dir);
        assert_eq!(episodes.len(), 3);
        for episode in &episodes {
            assert_eq!(
                episode.observations.as_ref().unwrap(),
                &arr1(&[0_i64, 1, 2, 2, 2]).into_dyn()
            );
            assert_eq!(
                episode.actions.as_ref().unwrap(),
                &arr1(&[Move::RIGHT; 4]).into_dyn()
            );
            assert_eq!(episode.rewards, arr1(&[0.0, 0.0, 10.0, 10.0]));
        }
    }

    #[rstest]
    fn reset_mid_episode_ends_it(dir: TempDir) {
        let mut env = recorded_chain(&dir, TraceRecorderConfig::default());
        env.reset().unwrap();
        env.step(&Move::RIGHT).unwrap();
        env.step(&Move::LEFT).unwrap();
        env.reset().unwrap();
        env.reset().unwrap();
        env.step(&Move::LEFT).unwrap();
        env.close().unwrap();

        let lengths: Vec<_> = read_all(&dir).iter().map(Episode::len).collect();
        assert_eq!(lengths, vec![2, 1]);
    }

    #[rstest]
    fn reward_only(dir: TempDir) {
        let mut env = recorded_chain(&dir, TraceRecorderConfig::default().only_reward());
        run_episode(&mut env);
        env.close().unwrap();

        let episodes = read_all(&dir);
        assert_eq!(episodes.len(), 1);
        assert!(episodes[0].is_reward_only());
        assert_eq!(episodes[0].rewards.len(), 4);
    }

    #[rstest]
    fn preprocess_applies_to_recorded_observations(dir: TempDir) {
        let recorder: TraceRecorder<i64, i64> =
            TraceRecorderConfig::new(dir.path()).build_recorder().unwrap();
        let wrapper = TraceRecording::new(recorder)
            .with_preprocess(|obs| Array::from_elem(2, obs.sum() * 10).into_dyn());
        let mut env = Chain::new(3, 2).wrap(wrapper);

        assert_eq!(env.reset().unwrap(), 0);
        assert_eq!(env.step(&Move::RIGHT).unwrap().observation, 1);
        env.step(&Move::RIGHT).unwrap();
        env.close().unwrap();

        let episodes = read_all(&dir);
        assert_eq!(
            episodes[0].observations.as_ref().unwrap().shape(),
            &[3, 2]
        );
        let first_column: Vec<_> = episodes[0]
            .observations
            .as_ref()
            .unwrap()
            .index_axis(Axis(1), 0)
            .iter()
            .copied()
            .collect();
        assert_eq!(first_column, vec![0, 10, 20]);
    }

    #[rstest]
    fn step_after_close_fails(dir: TempDir) {
        let mut env = recorded_chain(&dir, TraceRecorderConfig::default());
        env.reset().unwrap();
        env.close().unwrap();
        assert!(matches!(
            env.step(&Move::RIGHT),
            Err(RecordError::Closed(ClosedError))
        ));
    }
}
