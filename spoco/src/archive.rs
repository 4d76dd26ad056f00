//! Writing batches of captured visibilities to disk.
//!
//! Each file is an npz archive holding a `times` vector (Unix seconds, one
//! per capture) plus one array per baseline: integer spectra stacked row per
//! capture for autocorrelations, complex for cross-correlations. Filenames
//! carry the capture prefix and the Unix time the file was written.

use crate::{baseline::Baseline, correlator::Spectrum};
use ndarray::{Array1, Array2};
use ndarray_npy::NpzWriter;
use num_complex::Complex64;
use std::{
    fs::File,
    path::{Path, PathBuf},
    time::SystemTime,
};
use thiserror::Error;

/// Default filename prefix for visibility files
pub const DEFAULT_PREFIX: &str = "dat_poco_snap_simple";

#[derive(Debug, Error)]
pub enum Error {
    #[error("File IO error")]
    Io(#[from] std::io::Error),
    #[error("Failed to write npz archive")]
    Npz(#[from] ndarray_npy::WriteNpzError),
    #[error("Captures in a batch don't share the same baseline list")]
    Ragged,
    #[error("Refusing to write an empty batch")]
    Empty,
    #[error("Visibility rows have inconsistent lengths")]
    Shape(#[from] ndarray::ShapeError),
    #[error("System clock is before the Unix epoch")]
    Clock(#[from] std::time::SystemTimeError),
}

/// Everything captured for a single completed accumulation
#[derive(Debug, Clone)]
pub struct Accumulation {
    /// Unix time the accumulation was read out
    pub time: f64,
    /// Spectra in the order the baselines were requested
    pub spectra: Vec<(Baseline, Spectrum)>,
}

/// Writes visibility batches as npz archives into a directory
#[derive(Debug, Clone)]
pub struct Archiver {
    directory: PathBuf,
    prefix: String,
}

impl Archiver {
    #[must_use]
    pub fn new(directory: impl AsRef<Path>, prefix: &str) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
        }
    }

    /// Write one batch of accumulations to a new file, returning its path
    /// # Errors
    /// Returns an error on IO failures or if the batch isn't rectangular
    pub fn write(&self, batch: &[Accumulation]) -> Result<PathBuf, Error> {
        let Some(first) = batch.first() else {
            // A file holding nothing but an empty times vector helps no one
            return Err(Error::Empty);
        };
        for acc in batch {
            let matches = acc.spectra.len() == first.spectra.len()
                && acc
                    .spectra
                    .iter()
                    .zip(&first.spectra)
                    .all(|((a, _), (b, _))| a == b);
            if !matches {
                return Err(Error::Ragged);
            }
        }

        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)?
            .as_secs_f64();
        let path = self.directory.join(format!("{}-{:.2}.npz", self.prefix, now));
        let mut npz = NpzWriter::new(File::create(&path)?);

        let times: Array1<f64> = batch.iter().map(|acc| acc.time).collect();
        npz.add_array("times", &times)?;

        for (idx, (baseline, spectrum)) in first.spectra.iter().enumerate() {
            match spectrum {
                Spectrum::Auto(_) => {
                    let arr: Array2<i32> = stack_rows(batch, idx, |s| match s {
                        Spectrum::Auto(v) => Ok(v.clone()),
                        Spectrum::Cross(_) => Err(Error::Ragged),
                    })?;
                    npz.add_array(baseline.to_string(), &arr)?;
                }
                Spectrum::Cross(_) => {
                    let arr: Array2<Complex64> = stack_rows(batch, idx, |s| match s {
                        Spectrum::Cross(v) => Ok(v.clone()),
                        Spectrum::Auto(_) => Err(Error::Ragged),
                    })?;
                    npz.add_array(baseline.to_string(), &arr)?;
                }
            }
        }
        npz.finish()?;
        Ok(path)
    }
}

/// Stack the spectra at baseline index `idx` across all captures into a
/// 2d array, one row per capture
fn stack_rows<E, F>(batch: &[Accumulation], idx: usize, row: F) -> Result<Array2<E>, Error>
where
    F: Fn(&Spectrum) -> Result<Vec<E>, Error>,
{
    let width = batch[0].spectra[idx].1.len();
    let mut flat = Vec::with_capacity(batch.len() * width);
    for acc in batch {
        flat.extend(row(&acc.spectra[idx].1)?);
    }
    Ok(Array2::from_shape_vec((batch.len(), width), flat)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_npy::NpzReader;

    fn auto(vals: &[i32]) -> Spectrum {
        Spectrum::Auto(vals.to_vec())
    }

    fn cross(vals: &[(f64, f64)]) -> Spectrum {
        Spectrum::Cross(vals.iter().map(|&(re, im)| Complex64::new(re, im)).collect())
    }

    fn capture(time: f64) -> Accumulation {
        Accumulation {
            time,
            spectra: vec![
                ("aa".parse().unwrap(), auto(&[1, 2, 3, 4])),
                ("ab".parse().unwrap(), cross(&[(1.0, -1.0), (2.0, -2.0), (3.0, -3.0), (4.0, -4.0)])),
            ],
        }
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = Archiver::new(dir.path(), DEFAULT_PREFIX);
        let batch = vec![capture(100.0), capture(102.0)];
        let path = archiver.write(&batch).unwrap();
        assert!(path.exists());

        let mut npz = NpzReader::new(File::open(&path).unwrap()).unwrap();
        let mut names = npz.names().unwrap();
        names.sort();
        assert_eq!(names, vec!["aa.npy", "ab.npy", "times.npy"]);

        let times: Array1<f64> = npz.by_name("times.npy").unwrap();
        assert_eq!(times.to_vec(), vec![100.0, 102.0]);

        let aa: Array2<i32> = npz.by_name("aa.npy").unwrap();
        assert_eq!(aa.shape(), &[2, 4]);
        assert_eq!(aa[[0, 0]], 1);
        assert_eq!(aa[[1, 3]], 4);

        let ab: Array2<Complex64> = npz.by_name("ab.npy").unwrap();
        assert_eq!(ab.shape(), &[2, 4]);
        assert_eq!(ab[[0, 0]], Complex64::new(1.0, -1.0));
        assert_eq!(ab[[1, 3]], Complex64::new(4.0, -4.0));
    }

    #[test]
    fn test_filename_shape() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = Archiver::new(dir.path(), "unit_test");
        let path = archiver.write(&[capture(0.0)]).unwrap();
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("unit_test-"));
        assert!(name.ends_with(".npz"));
    }

    #[test]
    fn test_ragged_batch() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = Archiver::new(dir.path(), DEFAULT_PREFIX);
        let mut short = capture(1.0);
        short.spectra.pop();
        let batch = vec![capture(0.0), short];
        assert!(matches!(archiver.write(&batch), Err(Error::Ragged)));
    }

    #[test]
    fn test_empty_batch_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archiver = Archiver::new(dir.path(), DEFAULT_PREFIX);
        assert!(matches!(archiver.write(&[]), Err(Error::Empty)));
    }
}
