//! Prelude (helpful reexports) for this package

pub use crate::{
    baseline::Baseline,
    correlator::SnapPoco,
    transport::{
        katcp::Katcp,
        Transport,
    },
};
pub use fixed::prelude::*;
