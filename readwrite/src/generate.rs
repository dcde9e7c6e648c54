//! Reproducible generators for synthetic object contents and object names.
//!
//! Both generators are infinite [`Iterator`]s driven by a seeded [`SmallRng`],
//! so two generators created with the same parameters and seed yield the exact
//! same sequence. Rewrite mode relies on this to overwrite the keys of a
//! previous pass instead of growing the key space.
//!
//! Sizes are drawn from a *Normal* distribution and rounded to the nearest
//! integer. File sizes are floored at `0` and name lengths at `1`.

use bytes::Bytes;
use rand::distr::Alphanumeric;
use rand::rngs::SmallRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_distr::{Distribution, Normal, NormalError};

use crate::verify::DIGEST_LEN;

/// Errors constructing a generator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The distribution could not be constructed.
    #[error("invalid size distribution: {0}")]
    Distribution(#[from] NormalError),
    /// The standard deviation is negative or not finite.
    #[error("stddev must be finite and non-negative, got {0}")]
    InvalidStddev(f64),
    /// The mean is not a finite number.
    #[error("mean must be finite, got {0}")]
    InvalidMean(f64),
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

fn normal(mean: f64, stddev: f64) -> Result<Normal<f64>> {
    if !mean.is_finite() {
        return Err(Error::InvalidMean(mean));
    }
    if !(stddev.is_finite() && stddev >= 0.0) {
        return Err(Error::InvalidStddev(stddev));
    }
    Ok(Normal::new(mean, stddev)?)
}

fn sample_len(distribution: &Normal<f64>, rng: &mut SmallRng, min: usize) -> usize {
    let len = distribution.sample(rng).round();
    if len <= min as f64 {
        min
    } else {
        len as usize
    }
}

/// Creates an infinite generator of files with a mean size and standard deviation in bytes.
pub fn files(mean: f64, stddev: f64, seed: u64) -> Result<FileGenerator> {
    Ok(FileGenerator {
        rng: SmallRng::seed_from_u64(seed),
        size: normal(mean, stddev)?,
    })
}

/// Creates an infinite generator of names with a mean length and standard deviation.
pub fn names(mean: f64, stddev: f64, seed: u64) -> Result<NameGenerator> {
    Ok(NameGenerator {
        rng: SmallRng::seed_from_u64(seed),
        len: normal(mean, stddev)?,
    })
}

/// An infinite sequence of [`SyntheticFile`]s.
#[derive(Debug, Clone)]
pub struct FileGenerator {
    rng: SmallRng,
    size: Normal<f64>,
}

impl FileGenerator {
    /// Produces the next file in the sequence.
    pub fn generate(&mut self) -> SyntheticFile {
        let len = sample_len(&self.size, &mut self.rng, 0);

        let mut data = vec![0; len.saturating_sub(DIGEST_LEN)];
        self.rng.fill_bytes(&mut data);
        let digest = md5::compute(&data).0;

        // files too short for the whole trailer only carry a prefix of it
        data.extend_from_slice(&digest[..len.min(DIGEST_LEN)]);

        SyntheticFile {
            data: data.into(),
            digest,
        }
    }
}

impl Iterator for FileGenerator {
    type Item = SyntheticFile;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.generate())
    }
}

/// An infinite sequence of alphanumeric object names.
#[derive(Debug, Clone)]
pub struct NameGenerator {
    rng: SmallRng,
    len: Normal<f64>,
}

impl NameGenerator {
    /// Produces the next name in the sequence.
    pub fn generate(&mut self) -> String {
        let len = sample_len(&self.len, &mut self.rng, 1);
        (&mut self.rng)
            .sample_iter(Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }
}

impl Iterator for NameGenerator {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.generate())
    }
}

/// Randomized contents of an object, ending in their own checksum.
#[derive(Debug, Clone)]
pub struct SyntheticFile {
    data: Bytes,
    digest: [u8; DIGEST_LEN],
}

impl SyntheticFile {
    /// The total length of the file in bytes, including the checksum trailer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` for zero-length files.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The MD5 digest of the random body, as embedded in the trailer.
    pub fn digest(&self) -> [u8; DIGEST_LEN] {
        self.digest
    }

    /// The full file contents.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the file, returning its contents for upload.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_deterministic() {
        for seed in [0, 1, 42, u64::MAX] {
            let first: Vec<_> = names(15.0, 4.0, seed).unwrap().take(100).collect();
            let second: Vec<_> = names(15.0, 4.0, seed).unwrap().take(100).collect();
            assert_eq!(first, second);
        }

        let a: Vec<_> = names(15.0, 4.0, 1).unwrap().take(10).collect();
        let b: Vec<_> = names(15.0, 4.0, 2).unwrap().take(10).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn names_are_alphanumeric_and_never_empty() {
        // a mean far below zero forces the floor
        for name in names(-10.0, 1.0, 9).unwrap().take(50) {
            assert_eq!(name.len(), 1);
        }
        for name in names(15.0, 4.0, 9).unwrap().take(500) {
            assert!(!name.is_empty());
            assert!(name.chars().all(|c| c.is_ascii_alphanumeric()), "{name}");
        }
        for name in names(12.0, 0.0, 9).unwrap().take(50) {
            assert_eq!(name.len(), 12);
        }
    }

    #[test]
    fn files_are_deterministic() {
        let mut a = files(2048.0, 512.0, 77).unwrap();
        let mut b = files(2048.0, 512.0, 77).unwrap();
        for _ in 0..20 {
            assert_eq!(a.generate().as_bytes(), b.generate().as_bytes());
        }
    }

    #[test]
    fn file_sizes_follow_distribution() {
        let fixed: Vec<_> = files(1024.0, 0.0, 1).unwrap().take(10).collect();
        assert!(fixed.iter().all(|file| file.len() == 1024));

        // clamped at zero
        let negative: Vec<_> = files(-500.0, 10.0, 1).unwrap().take(10).collect();
        assert!(negative.iter().all(|file| file.is_empty()));

        // re-sampling the same distribution reproduces the exact lengths
        let mut rng = SmallRng::seed_from_u64(123);
        let distribution = Normal::<f64>::new(4000.0, 1000.0).unwrap();
        let mut generator = files(4000.0, 1000.0, 123).unwrap();
        for _ in 0..20 {
            let expected = distribution.sample(&mut rng).round().max(0.0) as usize;
            let file = generator.generate();
            assert_eq!(file.len(), expected);
            // advance past the content bytes drawn for this file
            let mut skip = vec![0; expected.saturating_sub(DIGEST_LEN)];
            rng.fill_bytes(&mut skip);
        }
    }

    #[test]
    fn embeds_checksum_trailer() {
        let file = files(100.0, 0.0, 5).unwrap().generate();
        let (body, trailer) = file.as_bytes().split_at(100 - DIGEST_LEN);
        assert_eq!(md5::compute(body).0, file.digest());
        assert_eq!(trailer, file.digest());
    }

    #[test]
    fn rejects_invalid_parameters() {
        assert!(matches!(
            files(10.0, -1.0, 0),
            Err(Error::InvalidStddev(_))
        ));
        assert!(matches!(
            names(15.0, -4.0, 0),
            Err(Error::InvalidStddev(_))
        ));
        assert!(matches!(
            files(10.0, f64::INFINITY, 0),
            Err(Error::InvalidStddev(_))
        ));
        assert!(files(10.0, 0.0, 0).is_ok());
        assert!(matches!(
            names(f64::NAN, 1.0, 0),
            Err(Error::InvalidMean(_))
        ));
    }
}
