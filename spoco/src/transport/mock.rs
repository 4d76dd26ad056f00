//! Mock transport implementations used in testing the interface

use super::Transport;
use crate::core::{Register, RegisterMap};
use kstring::KString;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Device not found - `{0}`")]
    DeviceNotFound(String),
    #[error("Out of bounds access on `{0}`")]
    OutOfBounds(String),
    #[error("No bof file named `{0}` on the mock platform")]
    NoSuchBof(String),
}

/// A platform that mocks reads and writes, useful for testing
#[derive(Debug)]
pub struct Mock {
    memory: HashMap<KString, Vec<u8>>,
    boffiles: Vec<String>,
    programmed: bool,
}

impl Mock {
    /// Construct a new mock platform by providing a device map `registers`
    #[must_use]
    pub fn new(registers: RegisterMap) -> Self {
        let memory = registers
            .into_iter()
            .map(|(name, Register { length })| (name, vec![0u8; length]))
            .collect();
        Self {
            memory,
            boffiles: vec![],
            programmed: true,
        }
    }

    /// Construct a mock platform that holds `boffiles` and must be programmed
    /// before it reports itself as running
    #[must_use]
    pub fn with_boffiles(registers: RegisterMap, boffiles: &[&str]) -> Self {
        let mut mock = Self::new(registers);
        mock.boffiles = boffiles.iter().map(ToString::to_string).collect();
        mock.programmed = false;
        mock
    }
}

impl Transport for Mock {
    fn is_running(&mut self) -> super::TransportResult<bool> {
        Ok(self.programmed)
    }

    fn read_n_bytes(
        &mut self,
        device: &str,
        offset: usize,
        n: usize,
    ) -> super::TransportResult<Vec<u8>> {
        let mem = self
            .memory
            .get(device)
            .ok_or_else(|| Error::DeviceNotFound(device.to_string()))?;
        if offset + n > mem.len() {
            return Err(Error::OutOfBounds(device.to_string()).into());
        }
        Ok(mem[offset..offset + n].to_vec())
    }

    fn write_bytes(
        &mut self,
        device: &str,
        offset: usize,
        data: &[u8],
    ) -> super::TransportResult<()> {
        let mem = self
            .memory
            .get_mut(device)
            .ok_or_else(|| Error::DeviceNotFound(device.to_string()))?;
        if offset + data.len() > mem.len() {
            return Err(Error::OutOfBounds(device.to_string()).into());
        }
        mem[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn listdev(&mut self) -> super::TransportResult<RegisterMap> {
        Ok(self
            .memory
            .iter()
            .map(|(name, bytes)| (name.clone(), Register { length: bytes.len() }))
            .collect())
    }

    fn listbof(&mut self) -> super::TransportResult<Vec<String>> {
        Ok(self.boffiles.clone())
    }

    fn program(&mut self, boffile: &str) -> super::TransportResult<()> {
        if self.boffiles.iter().any(|b| b == boffile) {
            self.programmed = true;
            Ok(())
        } else {
            Err(Error::NoSuchBof(boffile.to_string()).into())
        }
    }

    fn deprogram(&mut self) -> super::TransportResult<()> {
        self.programmed = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paste::paste;

    macro_rules! test_rw_num {
        ($num:ty, $v:literal) => {
            paste! {
                #[test]
                #[allow(clippy::float_cmp)]
                fn [<test_rw_$num>]() {
                    let mut transport = Mock::new(HashMap::from([(
                        "sys_scratchpad".into(),
                        Register { length: core::mem::size_of::<$num>() },
                    )]));
                    let num: $num = $v;
                    transport.write("sys_scratchpad", 0, &num).unwrap();
                    let read_num: $num = transport.read("sys_scratchpad", 0).unwrap();
                    assert_eq!(read_num, num);
                }
            }
        };
    }

    #[test]
    fn test_read() {
        let mut transport = Mock::new(HashMap::from([(
            "sys_scratchpad".into(),
            Register { length: 4 },
        )]));
        let bytes = transport.read_bytes("sys_scratchpad", 0).unwrap();
        assert_eq!(bytes, [0, 0, 0, 0]);
    }

    #[test]
    fn test_write_read_offset() {
        let mut transport = Mock::new(HashMap::from([(
            "sys_scratchpad".into(),
            Register { length: 4 },
        )]));
        let write_bytes = [7, 8];
        transport
            .write_bytes("sys_scratchpad", 2, &write_bytes)
            .unwrap();
        let read_bytes = transport.read_bytes("sys_scratchpad", 0).unwrap();
        assert_eq!(read_bytes, [0, 0, 7, 8]);
        let read_bytes = transport.read_bytes("sys_scratchpad", 2).unwrap();
        assert_eq!(read_bytes, [7, 8]);
    }

    #[test]
    fn test_missing_device() {
        let mut transport = Mock::new(HashMap::new());
        assert!(transport.read_n_bytes("nope", 0, 4).is_err());
    }

    #[test]
    fn test_out_of_bounds() {
        let mut transport = Mock::new(HashMap::from([(
            "sys_scratchpad".into(),
            Register { length: 4 },
        )]));
        assert!(transport.read_n_bytes("sys_scratchpad", 2, 4).is_err());
        assert!(transport.write_bytes("sys_scratchpad", 0, &[0; 8]).is_err());
    }

    #[test]
    fn test_program_gates_on_boffiles() {
        let mut transport = Mock::with_boffiles(HashMap::new(), &["spoco12.bof"]);
        assert!(!transport.is_running().unwrap());
        assert!(transport.program("other.bof").is_err());
        assert!(!transport.is_running().unwrap());
        transport.program("spoco12.bof").unwrap();
        assert!(transport.is_running().unwrap());
        transport.deprogram().unwrap();
        assert!(!transport.is_running().unwrap());
    }

    test_rw_num!(u8, 42);
    test_rw_num!(u16, 0xDEAD);
    test_rw_num!(u32, 0xDEAD_BEEF);
    test_rw_num!(u64, 0xDEAD_BEEF_B0BA_CAFE);
    test_rw_num!(u128, 0xDEAD_BEEF_B0BA_CAFE_0000_0000_0000);
    test_rw_num!(i8, -42);
    test_rw_num!(i16, -0xDEA);
    test_rw_num!(i32, -0x0DEA_DBEE);
    test_rw_num!(i64, -0x0DEA_DBEE_FB0B_ACAF);
    test_rw_num!(i128, -0xDEAD_BEEF_B0BA_CAFE_0000_0000_0000);
    test_rw_num!(f32, 1.618);
    test_rw_num!(f64, -6.022e23);
}
