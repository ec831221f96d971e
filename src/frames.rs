//! Observation and action frames.
use crate::dtype::Element;
use ndarray::{aview0, aview1, ArrayBase, ArrayD, ArrayViewD, Data, Dimension, IxDyn, ShapeError};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Shape of a single frame (excludes the leading time axis).
pub type FrameShape = SmallVec<[usize; 4]>;

/// A per-step sequence stored in an episode.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Observations,
    Actions,
    Rewards,
    Infos,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Observations => "observations",
            Self::Actions => "actions",
            Self::Rewards => "rewards",
            Self::Infos => "infos",
        })
    }
}

/// A value that can be viewed as an array frame of numeric elements.
///
/// Scalars are 0-dimensional frames, slices and vectors are 1-dimensional,
/// and arrays keep their own shape.
pub trait AsFrame {
    type Elem: Element;

    fn as_frame(&self) -> ArrayViewD<'_, Self::Elem>;
}

macro_rules! impl_scalar_frame {
    ($($type:ty),*) => {
        $(
            impl AsFrame for $type {
                type Elem = Self;

                #[inline]
                fn as_frame(&self) -> ArrayViewD<'_, Self> {
                    aview0(self).into_dyn()
                }
            }
        )*
    };
}

impl_scalar_frame!(u8, i32, i64, f32, f64);

impl<T: Element> AsFrame for [T] {
    type Elem = T;

    #[inline]
    fn as_frame(&self) -> ArrayViewD<'_, T> {
        aview1(self).into_dyn()
    }
}

impl<T: Element, const N: usize> AsFrame for [T; N] {
    type Elem = T;

    #[inline]
    fn as_frame(&self) -> ArrayViewD<'_, T> {
        aview1(&self[..]).into_dyn()
    }
}

impl<T: Element> AsFrame for Vec<T> {
    type Elem = T;

    #[inline]
    fn as_frame(&self) -> ArrayViewD<'_, T> {
        aview1(self).into_dyn()
    }
}

impl<S, D> AsFrame for ArrayBase<S, D>
where
    S: Data,
    S::Elem: Element,
    D: Dimension,
{
    type Elem = S::Elem;

    #[inline]
    fn as_frame(&self) -> ArrayViewD<'_, S::Elem> {
        self.view().into_dyn()
    }
}

impl<F: AsFrame + ?Sized> AsFrame for &F {
    type Elem = F::Elem;

    #[inline]
    fn as_frame(&self) -> ArrayViewD<'_, F::Elem> {
        F::as_frame(self)
    }
}

/// A frame did not have the shape of the frames before it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub expected: FrameShape,
    pub found: FrameShape,
}

/// Same-shaped frames accumulated into one contiguous buffer.
///
/// The shape of the first pushed frame fixes the shape for the rest of the stack.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameStack<T> {
    data: Vec<T>,
    frame_shape: Option<FrameShape>,
    len: usize,
}

impl<T> Default for FrameStack<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            frame_shape: None,
            len: 0,
        }
    }
}

impl<T: Element> FrameStack<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shape of each frame; `None` until the first frame is pushed.
    #[must_use]
    pub fn frame_shape(&self) -> Option<&[usize]> {
        self.frame_shape.as_deref()
    }

    /// Check that `frame` could be pushed onto the stack.
    pub fn check<F: AsFrame<Elem = T> + ?Sized>(&self, frame: &F) -> Result<(), ShapeMismatch> {
        self.check_shape(frame.as_frame().shape())
    }

    fn check_shape(&self, shape: &[usize]) -> Result<(), ShapeMismatch> {
        match &self.frame_shape {
            Some(expected) if expected.as_slice() != shape => Err(ShapeMismatch {
                expected: expected.clone(),
                found: shape.iter().copied().collect(),
            }),
            _ => Ok(()),
        }
    }

    /// Append a copy of `frame` in C order.
    pub fn push<F: AsFrame<Elem = T> + ?Sized>(&mut self, frame: &F) -> Result<(), ShapeMismatch> {
        let view = frame.as_frame();
        self.check_shape(view.shape())?;
        if self.frame_shape.is_none() {
            self.frame_shape = Some(view.shape().iter().copied().collect());
        }
        self.data.extend(view.iter().copied());
        self.len += 1;
        Ok(())
    }

    /// Stack into an array of shape `(len, ...frame_shape)`.
    ///
    /// An empty stack with no known frame shape becomes an array of shape `(0,)`.
    pub fn into_array(self) -> Result<ArrayD<T>, ShapeError> {
        let mut shape = vec![self.len];
        if let Some(frame_shape) = &self.frame_shape {
            shape.extend_from_slice(frame_shape);
        }
        ArrayD::from_shape_vec(IxDyn(&shape), self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2, Array2};

    #[test]
    fn scalar_frames_stack_to_vector() {
        let mut stack = FrameStack::new();
        stack.push(&3_i64).unwrap();
        stack.push(&5_i64).unwrap();
        let array = stack.into_array().unwrap();
        assert_eq!(array, arr1(&[3_i64, 5]).into_dyn());
    }

    #[test]
    fn vector_frames_stack_to_matrix() {
        let mut stack = FrameStack::new();
        stack.push(&vec![1.0_f32, 2.0]).unwrap();
        stack.push(&[3.0_f32, 4.0]).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.frame_shape(), Some(&[2][..]));
        let array = stack.into_array().unwrap();
        assert_eq!(array, arr2(&[[1.0_f32, 2.0], [3.0, 4.0]]).into_dyn());
    }

    #[test]
    fn array_frames_keep_shape() {
        let frame = Array2::<u8>::from_shape_fn((2, 3), |(i, j)| (i * 3 + j) as u8);
        let mut stack = FrameStack::new();
        stack.push(&frame).unwrap();
        stack.push(&frame.view()).unwrap();
        let array = stack.into_array().unwrap();
        assert_eq!(array.shape(), &[2, 2, 3]);
        assert_eq!(array.index_axis(ndarray::Axis(0), 1), frame.into_dyn());
    }

    #[test]
    fn transposed_view_is_copied_in_logical_order() {
        let frame = arr2(&[[1_i32, 2], [3, 4]]);
        let mut stack = FrameStack::new();
        stack.push(&frame.t()).unwrap();
        let array = stack.into_array().unwrap();
        assert_eq!(array, arr2(&[[1_i32, 3], [2, 4]]).insert_axis(ndarray::Axis(0)).into_dyn());
    }

    #[test]
    fn shape_change_rejected() {
        let mut stack = FrameStack::new();
        stack.push(&vec![1.0_f64, 2.0]).unwrap();
        let err = stack.push(&vec![1.0_f64]).unwrap_err();
        assert_eq!(err.expected.as_slice(), &[2]);
        assert_eq!(err.found.as_slice(), &[1]);
        assert_eq!(stack.len(), 1);
    }

    #[test]
    fn empty_stack_is_zero_length_vector() {
        let stack = FrameStack::<f64>::new();
        assert!(stack.is_empty());
        assert_eq!(stack.into_array().unwrap().shape(), &[0]);
    }
}
