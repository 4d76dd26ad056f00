//! Naming of correlator inputs and the visibility baselines formed from them.
//!
//! The 12 signal inputs of the pocket correlator are lettered `a` through `l`,
//! and a baseline is written as a two letter pair: `aa` is the
//! autocorrelation of input `a`, `ab` the cross-correlation of `a` and `b`.

use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Baseline `{0}` makes no sense, expected two input letters like `ab`")]
    Malformed(String),
    #[error("Input `{0}` is not one of the twelve inputs `a` through `l`")]
    BadInput(char),
}

/// One of the twelve signal inputs
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Input {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
}

impl Input {
    fn from_char(c: char) -> Result<Self, Error> {
        Ok(match c {
            'a' => Input::A,
            'b' => Input::B,
            'c' => Input::C,
            'd' => Input::D,
            'e' => Input::E,
            'f' => Input::F,
            'g' => Input::G,
            'h' => Input::H,
            'i' => Input::I,
            'j' => Input::J,
            'k' => Input::K,
            'l' => Input::L,
            _ => return Err(Error::BadInput(c)),
        })
    }

    fn as_char(self) -> char {
        match self {
            Input::A => 'a',
            Input::B => 'b',
            Input::C => 'c',
            Input::D => 'd',
            Input::E => 'e',
            Input::F => 'f',
            Input::G => 'g',
            Input::H => 'h',
            Input::I => 'i',
            Input::J => 'j',
            Input::K => 'k',
            Input::L => 'l',
        }
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// A pair of inputs to correlate
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Baseline {
    pub a: Input,
    pub b: Input,
}

impl Baseline {
    /// Whether this baseline is an autocorrelation (both inputs the same)
    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.a == self.b
    }
}

impl fmt::Display for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.a, self.b)
    }
}

impl FromStr for Baseline {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(a), Some(b), None) => Ok(Self {
                a: Input::from_char(a)?,
                b: Input::from_char(b)?,
            }),
            _ => Err(Error::Malformed(s.to_string())),
        }
    }
}

/// Parse a comma separated list of baselines, e.g. `aa,bb,ab`
/// # Errors
/// Returns an error on the first malformed entry
pub fn parse_list(s: &str) -> Result<Vec<Baseline>, Error> {
    s.split(',').map(Baseline::from_str).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auto() {
        let bl: Baseline = "aa".parse().unwrap();
        assert_eq!(
            bl,
            Baseline {
                a: Input::A,
                b: Input::A
            }
        );
        assert!(bl.is_auto());
    }

    #[test]
    fn test_parse_cross() {
        let bl: Baseline = "al".parse().unwrap();
        assert_eq!(
            bl,
            Baseline {
                a: Input::A,
                b: Input::L
            }
        );
        assert!(!bl.is_auto());
    }

    #[test]
    fn test_display_roundtrip() {
        for s in ["aa", "bb", "ab", "kl"] {
            let bl: Baseline = s.parse().unwrap();
            assert_eq!(bl.to_string(), s);
        }
    }

    #[test]
    fn test_malformed() {
        assert_eq!(
            "abc".parse::<Baseline>(),
            Err(Error::Malformed("abc".to_string()))
        );
        assert_eq!("a".parse::<Baseline>(), Err(Error::Malformed("a".to_string())));
        assert_eq!("".parse::<Baseline>(), Err(Error::Malformed(String::new())));
    }

    #[test]
    fn test_bad_input() {
        assert_eq!("az".parse::<Baseline>(), Err(Error::BadInput('z')));
        assert_eq!("ma".parse::<Baseline>(), Err(Error::BadInput('m')));
    }

    #[test]
    fn test_parse_list() {
        let bls = parse_list("aa,bb,ab").unwrap();
        assert_eq!(bls.len(), 3);
        assert!(bls[0].is_auto());
        assert!(bls[1].is_auto());
        assert!(!bls[2].is_auto());
    }

    #[test]
    fn test_parse_list_bad_entry() {
        assert!(parse_list("aa,,bb").is_err());
    }
}
