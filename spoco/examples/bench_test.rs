//! In this example, we will connect to a SNAP running the pocket correlator,
//! route every input to the on-chip noise source, and grab one autocorrelation
//! to check the signal path end to end.

use fixed::types::U32F0;
use spoco::correlator::{self, InputSource, Spectrum};
use spoco::prelude::*;
use std::{thread, time::Duration};

fn main() -> anyhow::Result<()> {
    // Create the transport and connect
    let mut transport = Katcp::connect("10.10.10.101:7147".parse()?)?;
    transport.watchdog()?;
    assert!(
        transport.is_running()?,
        "No design is running, program one first"
    );
    let poco = SnapPoco::new(transport);

    // Noise into every input so we see something without an antenna
    poco.set_input_source(InputSource::Noise)?;
    poco.set_fft_shift(0xffff)?;
    poco.set_eq_level(U32F0::from_num(100))?;

    // A short accumulation, then sync and wait for it to complete
    let spectra = 1 << 16;
    poco.set_accumulation_length(spectra)?;
    poco.arm_and_sync()?;
    thread::sleep(correlator::accumulation_period(spectra) + Duration::from_millis(500));

    match poco.read_visibility("aa".parse()?)? {
        Spectrum::Auto(v) => {
            let peak = v.iter().copied().max().unwrap_or(0);
            println!("aa autocorrelation: {} channels, peak {peak}", v.len());
        }
        Spectrum::Cross(_) => unreachable!("aa is an autocorrelation"),
    }

    // Put the mux back how the gateware boots
    poco.set_input_source(InputSource::Adc)?;
    Ok(())
}
