//! Defines all the transport mechanisms for which all spoco transports must implement

pub mod katcp;
pub mod mock;

use crate::core::RegisterMap;
use thiserror::Error;

/// Types that implement this trait can be serialized such that they can be written to FPGA software
/// registers
pub trait Serialize {
    type Chunk;
    fn serialize(&self) -> Self::Chunk;
}

/// Types that implement this trait can be deserialized such that they can be read from FPGA
/// software registers
pub trait Deserialize: Sized {
    type Chunk;
    fn deserialize(chunk: Self::Chunk) -> anyhow::Result<Self>;
}

macro_rules! ser_num {
    ($num:ty) => {
        impl Serialize for $num {
            type Chunk = [u8; core::mem::size_of::<$num>()];
            fn serialize(&self) -> Self::Chunk {
                self.to_be_bytes()
            }
        }
    };
}

macro_rules! deser_num {
    ($num:ty) => {
        impl Deserialize for $num {
            type Chunk = [u8; core::mem::size_of::<$num>()];
            fn deserialize(chunk: Self::Chunk) -> anyhow::Result<Self> {
                Ok(<$num>::from_be_bytes(chunk))
            }
        }
    };
}

// Implement serdes for all builtin numeric types
ser_num!(u8);
ser_num!(u16);
ser_num!(u32);
ser_num!(u64);
ser_num!(u128);
ser_num!(i8);
ser_num!(i16);
ser_num!(i32);
ser_num!(i64);
ser_num!(i128);
ser_num!(f32);
ser_num!(f64);

deser_num!(u8);
deser_num!(u16);
deser_num!(u32);
deser_num!(u64);
deser_num!(u128);
deser_num!(i8);
deser_num!(i16);
deser_num!(i32);
deser_num!(i64);
deser_num!(i128);
deser_num!(f32);
deser_num!(f64);

/// Errors from any of the transport implementations
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Katcp(#[from] self::katcp::Error),
    #[error(transparent)]
    Mock(#[from] self::mock::Error),
    #[error("Deserialization error")]
    Deserialize(anyhow::Error),
    #[error("Transport returned a payload of unexpected size")]
    Size,
}

pub type TransportResult<T> = Result<T, Error>;

/// The trait that is implemented for SNAP transport mechanisms.
/// The methods of this trait *assume* that the device is already connected.
pub trait Transport {
    /// Tests to see if the connected FPGA is programmed and running
    /// # Errors
    /// Returns an error on bad transport
    fn is_running(&mut self) -> TransportResult<bool>;

    /// Read `n` bytes from `device` starting at byte `offset`
    /// # Errors
    /// Returns an error on bad transport
    fn read_n_bytes(&mut self, device: &str, offset: usize, n: usize) -> TransportResult<Vec<u8>>;

    /// Read `N` bytes from `device` starting at byte `offset` into a const-sized array
    /// # Errors
    /// Returns an error on bad transport
    fn read_bytes<const N: usize>(
        &mut self,
        device: &str,
        offset: usize,
    ) -> TransportResult<[u8; N]> {
        let bytes = self.read_n_bytes(device, offset, N)?;
        bytes.try_into().map_err(|_| Error::Size)
    }

    /// Generically read a `Deserializable` type `T` from the connected platform at `device` and
    /// offset `offset`.
    /// # Example
    /// ```
    /// # use spoco::core::Register;
    /// # use std::collections::HashMap;
    /// # use spoco::transport::mock::Mock;
    /// # let mut transport = Mock::new(HashMap::from([("sys_scratchpad".into(), Register { length: 4 })]));
    /// # use spoco::transport::Transport;
    /// let my_num: u32 = transport.read("sys_scratchpad", 0).unwrap();
    /// ```
    /// # Errors
    /// Returns an error on bad transport or failed deserialization
    fn read<T, const N: usize>(&mut self, device: &str, offset: usize) -> TransportResult<T>
    where
        T: Deserialize<Chunk = [u8; N]>,
    {
        let bytes: [u8; N] = self.read_bytes(device, offset)?;
        T::deserialize(bytes).map_err(Error::Deserialize)
    }

    /// Write `data` to `device` starting at byte `offset`
    /// # Errors
    /// Returns an error on bad transport
    fn write_bytes(&mut self, device: &str, offset: usize, data: &[u8]) -> TransportResult<()>;

    /// Generically write a `Serializable` type `T` to the connected platform at `device` and offset
    /// `offset`.
    /// # Example
    /// ```
    /// # use spoco::core::Register;
    /// # use std::collections::HashMap;
    /// # use spoco::transport::mock::Mock;
    /// # let mut transport = Mock::new(HashMap::from([("sys_scratchpad".into(), Register { length: 4 })]));
    /// # use spoco::transport::Transport;
    /// let my_num = 3.14f32;
    /// transport.write("sys_scratchpad", 0, &my_num).unwrap();
    /// ```
    /// # Errors
    /// Returns an error on bad transport
    fn write<T, const N: usize>(
        &mut self,
        device: &str,
        offset: usize,
        data: &T,
    ) -> TransportResult<()>
    where
        T: Serialize<Chunk = [u8; N]>,
    {
        // Create bytes from the data and write with `write_bytes`
        self.write_bytes(device, offset, &data.serialize())
    }

    /// Retrieve a list of available devices on the (potentially programmed) connected platform
    /// # Errors
    /// Returns an error on bad transport
    fn listdev(&mut self) -> TransportResult<RegisterMap>;

    /// Retrieve the list of bof files resident on the connected platform
    /// # Errors
    /// Returns an error on bad transport
    fn listbof(&mut self) -> TransportResult<Vec<String>>;

    /// Program the platform with the named resident bof file
    /// # Errors
    /// Returns an error if the file isn't resident or programming fails
    fn program(&mut self, boffile: &str) -> TransportResult<()>;

    /// Deprograms the connected platform
    /// # Errors
    /// Returns an error on bad transport
    fn deprogram(&mut self) -> TransportResult<()>;
}
