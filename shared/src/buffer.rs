//! Single-owner entity state buffers.
//!
//! A [`NativeArray`] is allocated once, lent to a job while a batch runs and
//! returned to the owner when the batch completes. Touching it while a job
//! holds it, or after it has been disposed, is reported as an error rather
//! than reading stale or freed data.

use std::sync::Arc;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer `{0}` has been disposed")]
    Disposed(&'static str),
    #[error("buffer `{0}` is disposed twice")]
    AlreadyDisposed(&'static str),
    #[error("buffer `{0}` is owned by a scheduled job")]
    InFlight(&'static str),
    #[error("buffer `{0}` was not lent to a job")]
    NotLent(&'static str),
    #[error("buffer `{label}` holds {expected} elements, got {actual}")]
    LengthMismatch {
        label: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("index {index} out of range for buffer `{label}` of length {len}")]
    IndexOutOfRange {
        label: &'static str,
        index: usize,
        len: usize,
    },
}

#[derive(Debug)]
enum Slot<T> {
    Ready(Vec<T>),
    InFlight,
    Disposed,
}

/// Fixed-length buffer with an explicit lifetime.
///
/// The length is fixed at allocation; [`NativeArray::restore`] refuses data
/// of any other length.
#[derive(Debug)]
pub struct NativeArray<T> {
    label: &'static str,
    len: usize,
    slot: Slot<T>,
}

impl<T> NativeArray<T> {
    pub fn from_vec(label: &'static str, data: Vec<T>) -> Self {
        Self {
            label,
            len: data.len(),
            slot: Slot::Ready(data),
        }
    }

    pub fn new(label: &'static str, len: usize) -> Self
    where
        T: Default + Clone,
    {
        Self::from_vec(label, vec![T::default(); len])
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Length fixed at allocation, valid in every state.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self.slot, Slot::InFlight)
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.slot, Slot::Disposed)
    }

    pub fn as_slice(&self) -> Result<&[T], BufferError> {
        match &self.slot {
            Slot::Ready(data) => Ok(data),
            Slot::InFlight => Err(BufferError::InFlight(self.label)),
            Slot::Disposed => Err(BufferError::Disposed(self.label)),
        }
    }

    pub fn as_mut_slice(&mut self) -> Result<&mut [T], BufferError> {
        match &mut self.slot {
            Slot::Ready(data) => Ok(data),
            Slot::InFlight => Err(BufferError::InFlight(self.label)),
            Slot::Disposed => Err(BufferError::Disposed(self.label)),
        }
    }

    pub fn get(&self, index: usize) -> Result<&T, BufferError> {
        let label = self.label;
        let slice = self.as_slice()?;
        let len = slice.len();
        slice
            .get(index)
            .ok_or(BufferError::IndexOutOfRange { label, index, len })
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<(), BufferError> {
        let label = self.label;
        let slice = self.as_mut_slice()?;
        let len = slice.len();
        let slot = slice
            .get_mut(index)
            .ok_or(BufferError::IndexOutOfRange { label, index, len })?;
        *slot = value;
        Ok(())
    }

    /// Moves the contents out so a job can own them until it completes.
    pub fn lend(&mut self) -> Result<Vec<T>, BufferError> {
        match std::mem::replace(&mut self.slot, Slot::InFlight) {
            Slot::Ready(data) => Ok(data),
            Slot::InFlight => Err(BufferError::InFlight(self.label)),
            Slot::Disposed => {
                self.slot = Slot::Disposed;
                Err(BufferError::Disposed(self.label))
            }
        }
    }

    /// Takes back the contents lent with [`NativeArray::lend`].
    pub fn restore(&mut self, data: Vec<T>) -> Result<(), BufferError> {
        match self.slot {
            Slot::InFlight => {}
            Slot::Ready(_) => return Err(BufferError::NotLent(self.label)),
            Slot::Disposed => return Err(BufferError::Disposed(self.label)),
        }
        if data.len() != self.len {
            return Err(BufferError::LengthMismatch {
                label: self.label,
                expected: self.len,
                actual: data.len(),
            });
        }
        self.slot = Slot::Ready(data);
        Ok(())
    }

    /// Releases the storage. Any later access fails with [`BufferError::Disposed`].
    pub fn dispose(&mut self) -> Result<(), BufferError> {
        match self.slot {
            Slot::Ready(_) => {
                self.slot = Slot::Disposed;
                Ok(())
            }
            Slot::InFlight => Err(BufferError::InFlight(self.label)),
            Slot::Disposed => Err(BufferError::AlreadyDisposed(self.label)),
        }
    }
}

/// Immutable buffer that any number of workers may read at once.
#[derive(Debug)]
pub struct ReadOnlyArray<T> {
    label: &'static str,
    data: Option<Arc<[T]>>,
}

impl<T> ReadOnlyArray<T> {
    pub fn from_vec(label: &'static str, data: Vec<T>) -> Self {
        Self {
            label,
            data: Some(data.into()),
        }
    }

    pub fn len(&self) -> usize {
        self.data.as_ref().map_or(0, |data| data.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cheap handle for a job; it stays valid for the job even if the owner disposes first.
    pub fn share(&self) -> Result<Arc<[T]>, BufferError> {
        self.data
            .as_ref()
            .map(Arc::clone)
            .ok_or(BufferError::Disposed(self.label))
    }

    pub fn as_slice(&self) -> Result<&[T], BufferError> {
        self.data.as_deref().ok_or(BufferError::Disposed(self.label))
    }

    pub fn dispose(&mut self) -> Result<(), BufferError> {
        match self.data.take() {
            Some(_) => Ok(()),
            None => Err(BufferError::AlreadyDisposed(self.label)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lend_and_restore() {
        let mut array = NativeArray::<i32>::new("values", 4);
        let mut data = array.lend().unwrap();
        assert!(array.is_in_flight());
        assert_eq!(array.as_slice(), Err(BufferError::InFlight("values")));

        data[2] = 7;
        array.restore(data).unwrap();
        assert_eq!(array.as_slice().unwrap(), &[0, 0, 7, 0]);
    }

    #[test]
    fn test_restore_rejects_wrong_length() {
        let mut array = NativeArray::<i32>::new("values", 4);
        let _ = array.lend().unwrap();
        let err = array.restore(vec![1, 2, 3]).unwrap_err();
        assert_eq!(
            err,
            BufferError::LengthMismatch {
                label: "values",
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn test_access_after_dispose_fails() {
        let mut array = NativeArray::from_vec("values", vec![1, 2, 3]);
        array.dispose().unwrap();

        assert_eq!(array.as_slice(), Err(BufferError::Disposed("values")));
        assert_eq!(array.get(0), Err(BufferError::Disposed("values")));
        assert_eq!(array.set(0, 5), Err(BufferError::Disposed("values")));
        assert_eq!(array.lend(), Err(BufferError::Disposed("values")));
        assert!(array.is_disposed());
        assert_eq!(array.dispose(), Err(BufferError::AlreadyDisposed("values")));
    }

    #[test]
    fn test_dispose_while_in_flight_fails() {
        let mut array = NativeArray::<u8>::new("bytes", 2);
        let data = array.lend().unwrap();
        assert_eq!(array.dispose(), Err(BufferError::InFlight("bytes")));
        array.restore(data).unwrap();
        assert!(array.dispose().is_ok());
    }

    #[test]
    fn test_index_out_of_range() {
        let mut array = NativeArray::<u8>::new("bytes", 2);
        assert_eq!(
            array.set(2, 1),
            Err(BufferError::IndexOutOfRange {
                label: "bytes",
                index: 2,
                len: 2
            })
        );
    }

    #[test]
    fn test_read_only_share_outlives_dispose() {
        let mut normals = ReadOnlyArray::from_vec("normals", vec![1.0_f32, 2.0]);
        let shared = normals.share().unwrap();
        normals.dispose().unwrap();

        assert_eq!(&shared[..], &[1.0, 2.0]);
        assert_eq!(normals.share().unwrap_err(), BufferError::Disposed("normals"));
        assert_eq!(normals.dispose(), Err(BufferError::AlreadyDisposed("normals")));
    }
}
