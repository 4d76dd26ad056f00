//! Monitor and control of the 12-input pocket correlator gateware.
//!
//! This models the registers the design exposes: the FFT shift schedule in
//! `ctrl_sw`, the paired EQ coefficient banks, the accumulation control and
//! counter, the software sync trigger, and the muxed X-engine visibility
//! BRAMs.

pub mod eq;

use crate::{
    baseline::Baseline,
    core::estimate_fpga_clock,
    transport::{Deserialize, Serialize, Transport},
};
use eq::EqBank;
use fixed::types::U32F0;
use num_complex::Complex64;
use packed_struct::prelude::*;
use spoco_derive::RegisterSerde;
use std::{
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};
use thiserror::Error;

/// Number of frequency channels the gateware produces
pub const NCHANS: usize = 512;
/// The ADC sample clock in Hz
pub const ADC_CLK: f64 = 250e6;
/// Number of signal inputs of the design
pub const NINPUTS: usize = 12;

// EQ coefficients are shared between pairs of inputs
const EQ_BANKS: usize = NINPUTS / 2;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] crate::transport::Error),
    #[error(transparent)]
    Eq(#[from] eq::Error),
    #[error("Accumulation length of {0} spectra overflows the 32-bit acc_length register")]
    AccLenTooLong(u32),
}

/// The FFT shift schedule register (`ctrl_sw`), one bit per FFT stage
#[derive(Debug, PackedStruct, Default, Copy, Clone, PartialEq, Eq, RegisterSerde)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "4")]
pub struct FftShift {
    #[packed_field(bits = "0..16", endian = "msb")]
    pub schedule: u16,
}

/// What a signal input is listening to
#[derive(Debug, PrimitiveEnum, Default, Copy, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Digitized sky signal
    #[default]
    Adc = 0,
    /// On-chip pseudorandom noise
    Noise = 1,
    /// Test vector generator
    Tvg = 2,
    /// All zeros
    Zero = 3,
}

/// The input source multiplexer register (`insel`), two bits per input.
/// The design boots with every input on the ADC.
#[derive(Debug, PackedStruct, Default, Copy, Clone, PartialEq, Eq, RegisterSerde)]
#[packed_struct(bit_numbering = "lsb0", size_bytes = "4")]
pub struct InputMux {
    #[packed_field(bits = "0..=1", ty = "enum")]
    pub a: InputSource,
    #[packed_field(bits = "2..=3", ty = "enum")]
    pub b: InputSource,
    #[packed_field(bits = "4..=5", ty = "enum")]
    pub c: InputSource,
    #[packed_field(bits = "6..=7", ty = "enum")]
    pub d: InputSource,
    #[packed_field(bits = "8..=9", ty = "enum")]
    pub e: InputSource,
    #[packed_field(bits = "10..=11", ty = "enum")]
    pub f: InputSource,
    #[packed_field(bits = "12..=13", ty = "enum")]
    pub g: InputSource,
    #[packed_field(bits = "14..=15", ty = "enum")]
    pub h: InputSource,
    #[packed_field(bits = "16..=17", ty = "enum")]
    pub i: InputSource,
    #[packed_field(bits = "18..=19", ty = "enum")]
    pub j: InputSource,
    #[packed_field(bits = "20..=21", ty = "enum")]
    pub k: InputSource,
    #[packed_field(bits = "22..=23", ty = "enum")]
    pub l: InputSource,
}

impl InputMux {
    /// A mux setting routing every input to the same source
    #[must_use]
    pub fn all(source: InputSource) -> Self {
        Self {
            a: source,
            b: source,
            c: source,
            d: source,
            e: source,
            f: source,
            g: source,
            h: source,
            i: source,
            j: source,
            k: source,
            l: source,
        }
    }
}

/// One accumulated visibility spectrum
#[derive(Debug, Clone, PartialEq)]
pub enum Spectrum {
    /// Autocorrelations are real-valued
    Auto(Vec<i32>),
    /// Cross-correlations carry real and imaginary parts
    Cross(Vec<Complex64>),
}

impl Spectrum {
    /// Number of channels in this spectrum
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Spectrum::Auto(v) => v.len(),
            Spectrum::Cross(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The pocket correlator design running on a SNAP
#[derive(Debug)]
pub struct SnapPoco<T> {
    transport: Arc<Mutex<T>>,
    equalizers: [EqBank<T, U32F0>; EQ_BANKS],
}

impl<T> SnapPoco<T>
where
    T: Transport,
{
    #[must_use]
    pub fn new(transport: T) -> Self {
        let transport = Arc::new(Mutex::new(transport));
        let equalizers = std::array::from_fn(|i| {
            EqBank::new(
                &transport,
                &format!("eq_{}_{}_coeffs", 2 * i, 2 * i + 1),
                NCHANS,
            )
        });
        Self {
            transport,
            equalizers,
        }
    }

    /// Get a handle to the underlying transport
    #[must_use]
    pub fn transport(&self) -> Arc<Mutex<T>> {
        Arc::clone(&self.transport)
    }

    /// Whether a design is programmed and running
    /// # Errors
    /// Returns an error on bad transport
    #[allow(clippy::missing_panics_doc)]
    pub fn is_running(&self) -> Result<bool, Error> {
        let mut transport = self.transport.lock().unwrap();
        Ok(transport.is_running()?)
    }

    /// Program the named server-resident bof file
    /// # Errors
    /// Returns an error if the file isn't resident or programming fails
    #[allow(clippy::missing_panics_doc)]
    pub fn program(&self, boffile: &str) -> Result<(), Error> {
        let mut transport = self.transport.lock().unwrap();
        Ok(transport.program(boffile)?)
    }

    /// Estimate the FPGA fabric clock in megahertz. Blocks for a couple
    /// seconds while the clock counter ticks.
    /// # Errors
    /// Returns an error on bad transport
    #[allow(clippy::missing_panics_doc)]
    pub fn estimate_clock(&self) -> Result<f64, Error> {
        let mut transport = self.transport.lock().unwrap();
        Ok(estimate_fpga_clock(&mut *transport)?)
    }

    /// Set the FFT shift schedule
    /// # Errors
    /// Returns an error on bad transport
    #[allow(clippy::missing_panics_doc)]
    pub fn set_fft_shift(&self, schedule: u16) -> Result<(), Error> {
        let mut transport = self.transport.lock().unwrap();
        let reg = FftShift { schedule };
        Ok(transport.write("ctrl_sw", 0, &reg)?)
    }

    /// Read back the FFT shift schedule
    /// # Errors
    /// Returns an error on bad transport
    #[allow(clippy::missing_panics_doc)]
    pub fn fft_shift(&self) -> Result<u16, Error> {
        let mut transport = self.transport.lock().unwrap();
        let reg: FftShift = transport.read("ctrl_sw", 0)?;
        Ok(reg.schedule)
    }

    /// Route every signal input to `source`
    /// # Errors
    /// Returns an error on bad transport
    #[allow(clippy::missing_panics_doc)]
    pub fn set_input_source(&self, source: InputSource) -> Result<(), Error> {
        let mut transport = self.transport.lock().unwrap();
        Ok(transport.write("insel", 0, &InputMux::all(source))?)
    }

    /// Read back the input mux setting
    /// # Errors
    /// Returns an error on bad transport
    #[allow(clippy::missing_panics_doc)]
    pub fn input_mux(&self) -> Result<InputMux, Error> {
        let mut transport = self.transport.lock().unwrap();
        Ok(transport.read("insel", 0)?)
    }

    /// Set every EQ coefficient of every input to `level`
    /// # Errors
    /// Returns an error on bad transport
    pub fn set_eq_level(&self, level: U32F0) -> Result<(), Error> {
        let coeffs = vec![level; NCHANS];
        for bank in &self.equalizers {
            bank.write(&coeffs)?;
        }
        Ok(())
    }

    /// One of the six EQ coefficient banks, for per-bank coefficient loads.
    /// Bank `i` feeds inputs `2i` and `2i + 1`.
    #[must_use]
    pub fn eq_bank(&self, bank: usize) -> Option<&EqBank<T, U32F0>> {
        self.equalizers.get(bank)
    }

    /// Set the accumulation length in spectra. The `acc_length` register
    /// counts clock cycles, so this scales by the number of channels.
    /// # Errors
    /// Returns an error on bad transport or if the length doesn't fit the register
    #[allow(clippy::missing_panics_doc)]
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_accumulation_length(&self, spectra: u32) -> Result<(), Error> {
        let cycles = spectra
            .checked_mul(NCHANS as u32)
            .ok_or(Error::AccLenTooLong(spectra))?;
        let mut transport = self.transport.lock().unwrap();
        Ok(transport.write("acc_length", 0, &cycles)?)
    }

    /// Select the software sync source and fire a sync pulse, returning the
    /// moment the rising edge was sent
    /// # Errors
    /// Returns an error on bad transport
    #[allow(clippy::missing_panics_doc)]
    pub fn arm_and_sync(&self) -> Result<SystemTime, Error> {
        let mut transport = self.transport.lock().unwrap();
        transport.write("Sync_sync_pulse", 0, &0u32)?;
        transport.write("Sync_sync_sel", 0, &1u32)?;
        transport.write("Sync_sync_pulse", 0, &1u32)?;
        let trigger = SystemTime::now();
        transport.write("Sync_sync_pulse", 0, &0u32)?;
        Ok(trigger)
    }

    /// Read the accumulation counter, which increments once per completed
    /// accumulation
    /// # Errors
    /// Returns an error on bad transport
    #[allow(clippy::missing_panics_doc)]
    pub fn accumulation_count(&self) -> Result<u32, Error> {
        let mut transport = self.transport.lock().unwrap();
        Ok(transport.read("acc_num", 0)?)
    }

    /// Read the accumulated spectrum for one baseline out of the X-engine
    /// BRAMs. Autocorrelations only have a real part; cross-correlations read
    /// both real and imaginary BRAMs.
    /// # Errors
    /// Returns an error on bad transport
    #[allow(clippy::missing_panics_doc)]
    pub fn read_visibility(&self, baseline: Baseline) -> Result<Spectrum, Error> {
        let mut transport = self.transport.lock().unwrap();
        let real = read_spectrum(
            &mut *transport,
            &format!("xengine12_muxed_{baseline}_real"),
        )?;
        if baseline.is_auto() {
            Ok(Spectrum::Auto(real))
        } else {
            let imag = read_spectrum(
                &mut *transport,
                &format!("xengine12_muxed_{baseline}_imag"),
            )?;
            Ok(Spectrum::Cross(
                real.into_iter()
                    .zip(imag)
                    .map(|(re, im)| Complex64::new(f64::from(re), f64::from(im)))
                    .collect(),
            ))
        }
    }
}

/// How long one accumulation of `spectra` spectra takes at the ADC clock
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn accumulation_period(spectra: u32) -> Duration {
    Duration::from_secs_f64(f64::from(spectra) * NCHANS as f64 / ADC_CLK)
}

fn read_spectrum<T>(transport: &mut T, device: &str) -> Result<Vec<i32>, Error>
where
    T: Transport,
{
    let bytes = transport.read_n_bytes(device, 0, 4 * NCHANS)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_be_bytes(c.try_into().unwrap()))
        .collect())
}
