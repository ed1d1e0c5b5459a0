//! Module and service version strings: `major[.minor][stability]`.
//!
//! Stability orders `stable > beta > alpha > dev`; a missing minor is `0`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use modstack_common::error::{ModstackError, Result};
use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::tag,
    character::complete::{digit1, one_of},
    combinator::{map_res, opt, value},
    sequence::preceded,
};

/// Release stability, ordered from least to most stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stability {
    /// Development snapshot.
    Dev,
    /// Alpha release.
    Alpha,
    /// Beta release.
    Beta,
    /// Stable release (no suffix).
    Stable,
}

/// A parsed version. Field order gives the derived total order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    /// Major component.
    pub major: u32,
    /// Minor component (0 when omitted).
    pub minor: u32,
    /// Stability suffix.
    pub stability: Stability,
}

impl Version {
    /// Creates a stable version.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            stability: Stability::Stable,
        }
    }
}

fn number(input: &str) -> IResult<&str, u32> {
    map_res(digit1, str::parse::<u32>).parse(input)
}

fn stability(input: &str) -> IResult<&str, Stability> {
    preceded(
        opt(one_of(".-")),
        alt((
            value(Stability::Beta, tag("beta")),
            value(Stability::Alpha, tag("alpha")),
            value(Stability::Dev, tag("dev")),
        )),
    )
    .parse(input)
}

/// Parses a version prefix of `input`, leaving the remainder untouched.
pub(crate) fn version(input: &str) -> IResult<&str, Version> {
    let (input, major) = number(input)?;
    let (input, minor) = opt(preceded(tag("."), number)).parse(input)?;
    let (input, stability) = opt(stability).parse(input)?;
    Ok((
        input,
        Version {
            major,
            minor: minor.unwrap_or(0),
            stability: stability.unwrap_or(Stability::Stable),
        },
    ))
}

impl FromStr for Version {
    type Err = ModstackError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ModstackError::InvalidVersion {
            input: s.to_string(),
        };
        match version(s.trim()) {
            Ok(("", v)) => Ok(v),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        match self.stability {
            Stability::Stable => Ok(()),
            Stability::Beta => f.write_str("beta"),
            Stability::Alpha => f.write_str("alpha"),
            Stability::Dev => f.write_str("dev"),
        }
    }
}

/// Compares two version strings.
///
/// # Errors
///
/// Returns [`ModstackError::InvalidVersion`] if either string is malformed.
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    let a: Version = a.parse()?;
    let b: Version = b.parse()?;
    Ok(a.cmp(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_minor_is_greater() {
        assert_eq!(compare("2.1", "2.0").unwrap(), Ordering::Greater);
    }

    #[test]
    fn beta_is_less_than_stable() {
        assert_eq!(compare("1.0beta", "1.0").unwrap(), Ordering::Less);
    }

    #[test]
    fn stability_chain() {
        let dev: Version = "3.2dev".parse().unwrap();
        let alpha: Version = "3.2-alpha".parse().unwrap();
        let beta: Version = "3.2.beta".parse().unwrap();
        let stable: Version = "3.2".parse().unwrap();
        assert!(dev < alpha && alpha < beta && beta < stable);
    }

    #[test]
    fn missing_minor_defaults_to_zero() {
        assert_eq!(compare("2", "2.0").unwrap(), Ordering::Equal);
        assert_eq!("7beta".parse::<Version>().unwrap().minor, 0);
    }

    #[test]
    fn major_dominates_minor() {
        assert_eq!(compare("10.0", "9.99").unwrap(), Ordering::Greater);
    }

    #[test]
    fn malformed_versions_are_rejected() {
        for bad in ["", "v1.0", "1.", "1.0rc", "1.0 beta", "a.b", "1.0.3"] {
            let err = bad.parse::<Version>().unwrap_err();
            assert!(
                matches!(err, ModstackError::InvalidVersion { .. }),
                "{bad}: {err}"
            );
        }
        assert!(compare("1.0", "x").is_err());
    }

    #[test]
    fn display_is_normalized() {
        assert_eq!("1".parse::<Version>().unwrap().to_string(), "1.0");
        assert_eq!("2.3-beta".parse::<Version>().unwrap().to_string(), "2.3beta");
    }
}
