//! The core types and functions for interacting with SNAP gateware devices
use crate::transport::{Transport, TransportResult};
use kstring::KString;
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

/// The representation of an internal register
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Register {
    /// The number of bytes stored at this device
    pub length: usize,
}

/// The mapping from register names to their metadata. KATCP addresses
/// registers by name, so unlike memory-mapped transports there is no offset to
/// track here.
pub type RegisterMap = HashMap<KString, Register>;

/// Read the `sys_clkcounter` register a few times to estimate the clock rate in megahertz
/// # Errors
/// Returns an error on bad transport
#[allow(clippy::cast_precision_loss)]
pub fn estimate_fpga_clock<T>(transport: &mut T) -> TransportResult<f64>
where
    T: Transport,
{
    let delay_s = 2f64;
    let earlier = Instant::now();
    let first_count = u64::from(transport.read::<u32, 4>("sys_clkcounter", 0)?);
    let later = Instant::now();
    std::thread::sleep(Duration::from_secs_f64(delay_s));
    let mut second_count = u64::from(transport.read::<u32, 4>("sys_clkcounter", 0)?);
    // The counter is free-running and will wrap
    if first_count > second_count {
        second_count += 2u64.pow(32);
    }
    let transport_delay = later.duration_since(earlier).as_secs_f64();
    Ok((second_count - first_count) as f64 / ((delay_s - transport_delay) * 1_000_000_f64))
}
