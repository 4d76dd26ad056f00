//! The equalization coefficient banks of the pocket correlator.
//!
//! Inputs share coefficient BRAMs in pairs: `eq_0_1_coeffs` holds the
//! per-channel gain vector applied to inputs 0 and 1, and so on up to
//! `eq_10_11_coeffs`.

use crate::transport::Transport;
use fixed::traits::Fixed;
use std::{
    marker::PhantomData,
    sync::{Arc, Mutex, Weak},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] crate::transport::Error),
    #[error("Out of bounds addressing")]
    OutOfBounds,
    #[error("Size of given data doesn't fit the target")]
    BadSize,
}

/// One bank of EQ coefficients, shared by a pair of inputs
#[derive(Debug)]
pub struct EqBank<T, F> {
    /// Upwards pointer to the parent device's transport
    transport: Weak<Mutex<T>>,
    /// The name of the coefficient BRAM
    name: String,
    /// Marker for the fixed point format of the coefficients
    phantom: PhantomData<F>,
    /// Size of the bank in number of words
    size: usize,
}

impl<T, F> EqBank<T, F>
where
    T: Transport,
    F: Fixed,
{
    #[must_use]
    pub fn new(transport: &Arc<Mutex<T>>, reg_name: &str, size: usize) -> Self {
        let transport = Arc::downgrade(transport);
        Self {
            transport,
            name: reg_name.to_string(),
            phantom: PhantomData,
            size,
        }
    }
}

impl<T, F, const N: usize> EqBank<T, F>
where
    T: Transport,
    F: Fixed<Bytes = [u8; N]>,
{
    /// Read one fixed point coefficient at word `addr` from the bank
    /// # Errors
    /// Returns an error on transport errors
    #[allow(clippy::missing_panics_doc)]
    pub fn read_addr(&self, addr: usize) -> Result<F, Error> {
        if addr >= self.size {
            return Err(Error::OutOfBounds);
        }
        let tarc = self.transport.upgrade().unwrap();
        let mut transport = (*tarc).lock().unwrap();
        let bytes: [u8; N] = transport.read_bytes(&self.name, addr * N)?;
        Ok(F::from_be_bytes(bytes))
    }

    /// Reads the entire bank
    /// # Errors
    /// Returns an error on transport errors
    #[allow(clippy::missing_panics_doc)]
    pub fn read(&self) -> Result<Vec<F>, Error> {
        let tarc = self.transport.upgrade().unwrap();
        let mut transport = (*tarc).lock().unwrap();
        // Read all the data
        let total_bytes = self.size * N;
        let v = transport.read_n_bytes(&self.name, 0, total_bytes)?;
        // Transform the vec of bytes to the vec of fixed point words
        Ok(v.chunks(N)
            .map(|c| F::from_be_bytes(c.try_into().unwrap()))
            .collect())
    }

    /// Write the entire bank
    /// # Errors
    /// Returns an error on transport errors or if the data is not the correct size
    #[allow(clippy::missing_panics_doc)]
    pub fn write(&self, data: &[F]) -> Result<(), Error> {
        let tarc = self.transport.upgrade().unwrap();
        let mut transport = (*tarc).lock().unwrap();
        // Transform the vec of fixed point words to the vec of bytes
        let total_bytes = self.size * N;
        let v = data
            .iter()
            .flat_map(|f| f.to_be_bytes().to_vec())
            .collect::<Vec<_>>();
        if v.len() != total_bytes {
            return Err(Error::BadSize);
        }
        // Write all the data
        transport.write_bytes(&self.name, 0, &v)?;
        Ok(())
    }

    /// Write a fixed point coefficient at word `addr` to the bank
    /// # Errors
    /// Returns an error on bad transport
    #[allow(clippy::missing_panics_doc)]
    pub fn write_addr(&self, addr: usize, val: F) -> Result<(), Error> {
        if addr >= self.size {
            return Err(Error::OutOfBounds);
        }
        let tarc = self.transport.upgrade().unwrap();
        let mut transport = (*tarc).lock().unwrap();
        Ok(transport.write_bytes(&self.name, addr * N, &val.to_be_bytes())?)
    }
}
