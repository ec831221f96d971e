//! Batch manifests: where each episode's arrays live in a payload.
//!
//! A payload is a flat sequence of little-endian C-order arrays,
//! each starting on an 8-byte boundary. The manifest records, per episode,
//! the shape, byte offset and byte length of every array so that an episode
//! can be sliced out of the payload without decoding the rest of it.
use crate::dtype::{self, Dtype, Element};
use crate::episode::{Episode, Info};
use crate::error::CorruptionError;
use crate::frames::Field;
use ndarray::{ArrayBase, ArrayD, Data, Dimension, Ix1, IxDyn};
use serde::{Deserialize, Serialize};

/// Current manifest format version.
pub const MANIFEST_VERSION: u32 = 1;

/// Alignment of each array within a payload, in bytes.
pub const ALIGNMENT: u64 = 8;

/// Location of one array within a payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArraySlice {
    pub shape: Vec<usize>,
    pub offset: u64,
    pub nbytes: u64,
}

/// Manifest entry for one episode of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeEntry {
    /// Index of the episode among all episodes written by the recorder.
    pub index: u64,
    pub num_steps: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<ArraySlice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<ArraySlice>,
    pub rewards: ArraySlice,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub infos: Option<Vec<Info>>,
}

/// Description of one flushed batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    /// File name of the payload, relative to the manifest's directory.
    pub payload: String,
    /// Total payload size in bytes.
    pub payload_len: u64,
    pub only_reward: bool,
    pub observation_dtype: Option<Dtype>,
    pub action_dtype: Option<Dtype>,
    pub reward_dtype: Dtype,
    pub episodes: Vec<EpisodeEntry>,
}

/// Round `offset` up to the next multiple of [`ALIGNMENT`].
const fn align(offset: u64) -> u64 {
    (offset + ALIGNMENT - 1) / ALIGNMENT * ALIGNMENT
}

/// Assigns consecutive aligned slices.
struct Layout {
    end: u64,
}

impl Layout {
    fn place<S, D>(&mut self, array: &ArrayBase<S, D>) -> ArraySlice
    where
        S: Data,
        S::Elem: Element,
        D: Dimension,
    {
        let offset = align(self.end);
        let nbytes = (array.len() * <S::Elem as Element>::DTYPE.size()) as u64;
        self.end = offset + nbytes;
        ArraySlice {
            shape: array.shape().to_vec(),
            offset,
            nbytes,
        }
    }
}

impl Manifest {
    /// Lay out a batch of episodes in a new payload.
    ///
    /// `first_index` is the recorder-wide index of the first episode
    /// and `payload` is the payload file name.
    pub fn describe<O: Element, A: Element>(
        episodes: &[Episode<O, A>],
        first_index: u64,
        only_reward: bool,
        payload: impl Into<String>,
    ) -> Self {
        let mut layout = Layout { end: 0 };
        let entries = episodes
            .iter()
            .zip(first_index..)
            .map(|(episode, index)| EpisodeEntry {
                index,
                num_steps: episode.len(),
                observations: episode.observations.as_ref().map(|a| layout.place(a)),
                actions: episode.actions.as_ref().map(|a| layout.place(a)),
                rewards: layout.place(&episode.rewards),
                infos: episode.infos.clone(),
            })
            .collect();
        Self {
            version: MANIFEST_VERSION,
            payload: payload.into(),
            payload_len: layout.end,
            only_reward,
            observation_dtype: (!only_reward).then(|| O::DTYPE),
            action_dtype: (!only_reward).then(|| A::DTYPE),
            reward_dtype: f64::DTYPE,
            episodes: entries,
        }
    }

    /// Encode the payload for the episodes this manifest was described from.
    ///
    /// # Panics
    /// If `episodes` are not the episodes passed to [`Manifest::describe`].
    #[must_use]
    pub fn encode_payload<O: Element, A: Element>(&self, episodes: &[Episode<O, A>]) -> Vec<u8> {
        assert_eq!(
            episodes.len(),
            self.episodes.len(),
            "episodes do not match manifest"
        );
        let mut payload = vec![0; self.payload_len as usize];
        for (entry, episode) in self.episodes.iter().zip(episodes) {
            if let (Some(slice), Some(array)) = (&entry.observations, &episode.observations) {
                write_array(&mut payload, slice, array.iter().copied(), array.as_slice());
            }
            if let (Some(slice), Some(array)) = (&entry.actions, &episode.actions) {
                write_array(&mut payload, slice, array.iter().copied(), array.as_slice());
            }
            write_array(
                &mut payload,
                &entry.rewards,
                episode.rewards.iter().copied(),
                episode.rewards.as_slice(),
            );
        }
        payload
    }

    /// Check the batch-level properties of the manifest against a payload of `payload_len` bytes.
    pub fn validate<O: Element, A: Element>(&self, payload_len: u64) -> Result<(), CorruptionError> {
        if self.version != MANIFEST_VERSION {
            return Err(CorruptionError::UnsupportedVersion(self.version));
        }
        if self.payload_len != payload_len {
            return Err(CorruptionError::PayloadLength {
                declared: self.payload_len,
                actual: payload_len,
            });
        }
        check_dtype::<f64>(Field::Rewards, Some(self.reward_dtype))?;
        if !self.only_reward {
            check_dtype::<O>(Field::Observations, self.observation_dtype)?;
            check_dtype::<A>(Field::Actions, self.action_dtype)?;
        }
        Ok(())
    }

    /// Reconstruct every episode of the batch from its payload.
    ///
    /// Fails as a whole if the manifest does not describe this payload;
    /// otherwise each episode is checked on its own.
    pub fn resolve<'a, O: Element, A: Element>(
        &'a self,
        payload: &'a [u8],
    ) -> Result<impl Iterator<Item = Result<Episode<O, A>, CorruptionError>> + 'a, CorruptionError>
    {
        self.validate::<O, A>(payload.len() as u64)?;
        Ok(self
            .episodes
            .iter()
            .map(move |entry| self.resolve_episode::<O, A>(entry, payload)))
    }

    /// Reconstruct one episode from its manifest entry.
    ///
    /// Slices are bounds-checked against `payload` before they are read.
    pub fn resolve_episode<O: Element, A: Element>(
        &self,
        entry: &EpisodeEntry,
        payload: &[u8],
    ) -> Result<Episode<O, A>, CorruptionError> {
        let num_steps = entry.num_steps;
        let (observations, actions) = if self.only_reward {
            (None, None)
        } else {
            let num_observations = num_steps.checked_add(1).ok_or_else(|| {
                CorruptionError::InvalidManifest(format!("episode has {} steps", num_steps))
            })?;
            let observations = read_array::<O>(
                payload,
                Field::Observations,
                entry.observations.as_ref(),
                num_observations,
            )?;
            let actions = read_array::<A>(payload, Field::Actions, entry.actions.as_ref(), num_steps)?;
            (Some(observations), Some(actions))
        };

        let rewards = read_array::<f64>(payload, Field::Rewards, Some(&entry.rewards), num_steps)?
            .into_dimensionality::<Ix1>()
            .map_err(|_| CorruptionError::InvalidManifest("rewards must be 1-dimensional".into()))?;

        if let Some(infos) = &entry.infos {
            if infos.len() != num_steps {
                return Err(CorruptionError::EpisodeLength {
                    field: Field::Infos,
                    expected: num_steps,
                    found: infos.len(),
                });
            }
        }

        Ok(Episode {
            observations,
            actions,
            rewards,
            infos: entry.infos.clone(),
        })
    }
}

fn check_dtype<T: Element>(field: Field, stored: Option<Dtype>) -> Result<(), CorruptionError> {
    match stored {
        Some(stored) if stored == T::DTYPE => Ok(()),
        Some(stored) => Err(CorruptionError::Dtype {
            field,
            stored,
            requested: T::DTYPE,
        }),
        None => Err(CorruptionError::InvalidManifest(format!(
            "missing {} dtype",
            field
        ))),
    }
}

fn write_array<T, I>(payload: &mut [u8], slice: &ArraySlice, elements: I, contiguous: Option<&[T]>)
where
    T: Element,
    I: Iterator<Item = T>,
{
    let start = slice.offset as usize;
    let dst = &mut payload[start..start + slice.nbytes as usize];
    match contiguous {
        Some(src) => T::write_le(src, dst),
        None => T::write_le(&elements.collect::<Vec<_>>(), dst),
    }
}

/// Read and bounds-check one array whose leading axis must have length `len`.
fn read_array<T: Element>(
    payload: &[u8],
    field: Field,
    slice: Option<&ArraySlice>,
    len: usize,
) -> Result<ArrayD<T>, CorruptionError> {
    let slice = slice.ok_or(CorruptionError::MissingField { field })?;
    let payload_len = payload.len() as u64;
    let out_of_bounds = || CorruptionError::OutOfBounds {
        field,
        offset: slice.offset,
        nbytes: slice.nbytes,
        payload_len,
    };
    let end = slice
        .offset
        .checked_add(slice.nbytes)
        .ok_or_else(out_of_bounds)?;
    if end > payload_len {
        return Err(out_of_bounds());
    }

    let expected = slice
        .shape
        .iter()
        .try_fold(T::DTYPE.size() as u64, |n, &dim| n.checked_mul(dim as u64));
    if expected != Some(slice.nbytes) {
        return Err(CorruptionError::SliceSize {
            field,
            shape: slice.shape.clone(),
            dtype: T::DTYPE,
            nbytes: slice.nbytes,
            expected: expected.unwrap_or(u64::MAX),
        });
    }

    let found = slice.shape.first().copied().unwrap_or(0);
    if found != len {
        return Err(CorruptionError::EpisodeLength {
            field,
            expected: len,
            found,
        });
    }

    let bytes = &payload[slice.offset as usize..end as usize];
    let data = dtype::from_le_bytes::<T>(bytes).ok_or_else(out_of_bounds)?;
    ArrayD::from_shape_vec(IxDyn(&slice.shape), data)
        .map_err(|err| CorruptionError::InvalidManifest(err.to_string()))
}
