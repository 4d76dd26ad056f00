//! The spoco transport implementation for KATCP (`tcpborphserver`)
use super::{Transport, TransportResult};
use crate::core::{Register, RegisterMap};
use indicatif::ProgressBar;
use katcp::Client;
use std::{net::SocketAddr, time::Duration};
use thiserror::Error;

pub use katcp::DEFAULT_PORT;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Error from the lower-level KATCP client")]
    Lower(#[from] katcp::Error),
    #[error("Bof file `{0}` is not present on the server")]
    BofNotFound(String),
}

#[derive(Debug)]
/// A KATCP connection (newtype for the blocking [`katcp::Client`])
pub struct Katcp {
    client: Client,
}

impl Katcp {
    /// Create and connect to a KATCP transport
    /// # Errors
    /// Will return an error if the TCP connection fails
    pub fn connect(host: SocketAddr) -> TransportResult<Self> {
        let client = Client::connect(host).map_err(Error::from)?;
        Ok(Self { client })
    }
}

// Transport trait implementations

impl Transport for Katcp {
    fn is_running(&mut self) -> TransportResult<bool> {
        Ok(self.client.status().map_err(Error::from)?)
    }

    fn read_n_bytes(&mut self, device: &str, offset: usize, n: usize) -> TransportResult<Vec<u8>> {
        Ok(self.client.read(device, offset, n).map_err(Error::from)?)
    }

    fn write_bytes(&mut self, device: &str, offset: usize, data: &[u8]) -> TransportResult<()> {
        Ok(self.client.write(device, offset, data).map_err(Error::from)?)
    }

    fn listdev(&mut self) -> TransportResult<RegisterMap> {
        let devices = self.client.listdev().map_err(Error::from)?;
        Ok(devices
            .into_iter()
            .map(|(name, size)| {
                (
                    name.into(),
                    Register {
                        length: size as usize,
                    },
                )
            })
            .collect())
    }

    fn listbof(&mut self) -> TransportResult<Vec<String>> {
        Ok(self.client.listbof().map_err(Error::from)?)
    }

    fn program(&mut self, boffile: &str) -> TransportResult<()> {
        // First make sure the file actually exists server-side, progdev's own
        // failure mode for that is less helpful
        let available = self.listbof()?;
        if !available.iter().any(|b| b == boffile) {
            return Err(Error::BofNotFound(boffile.to_string()).into());
        }
        // Programming is one long blocking request, so all we can offer is a spinner
        let bar = ProgressBar::new_spinner();
        bar.set_message(format!("Programming {boffile}"));
        bar.enable_steady_tick(Duration::from_millis(100));
        let result = self.client.progdev(boffile).map_err(Error::from);
        bar.finish();
        result?;
        Ok(())
    }

    fn deprogram(&mut self) -> TransportResult<()> {
        Ok(self.client.deprogram().map_err(Error::from)?)
    }
}

// Katcp-specific methods
impl Katcp {
    /// Protocol-level ping to check the server is alive
    /// # Errors
    /// Returns errors on transport failures
    pub fn watchdog(&mut self) -> Result<(), Error> {
        Ok(self.client.watchdog()?)
    }
}
