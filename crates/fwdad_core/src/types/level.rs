//! Dual level identifiers.
//!
//! Levels are assigned sequentially from 0 and released in reverse order, so
//! at stack depth `k` the live levels are exactly `0..k`. "No level" is
//! `Option::<Level>::None`; the raw integer form uses `-1` for it.

use std::fmt;

use super::error::ForwardAdError;

/// A forward-AD nesting level.
///
/// # Examples
///
/// ```
/// use fwdad_core::types::Level;
///
/// let level = Level::new(2);
/// assert_eq!(level.index(), 2);
/// assert_eq!(level.as_raw(), 2);
/// assert_eq!(Level::raw(None), -1);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(u32);

impl Level {
    /// Raw value reported when no level is active.
    pub const NONE_RAW: i64 = -1;

    /// The outermost level.
    pub const ROOT: Level = Level(0);

    /// Creates a level from its index.
    #[inline]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the level index.
    #[inline]
    pub const fn index(self) -> u32 {
        self.0
    }

    /// Returns the level as a raw signed integer.
    #[inline]
    pub const fn as_raw(self) -> i64 {
        self.0 as i64
    }

    /// Returns the raw form of an optional level, `-1` for `None`.
    #[inline]
    pub fn raw(level: Option<Level>) -> i64 {
        level.map_or(Self::NONE_RAW, Level::as_raw)
    }

    /// Parses a raw signed level.
    ///
    /// `-1` maps to `None`; any other negative value, or a value that does
    /// not fit a level index, is rejected.
    ///
    /// # Examples
    ///
    /// ```
    /// use fwdad_core::types::Level;
    ///
    /// assert_eq!(Level::from_raw(-1).unwrap(), None);
    /// assert_eq!(Level::from_raw(3).unwrap(), Some(Level::new(3)));
    /// assert!(Level::from_raw(-2).is_err());
    /// ```
    pub fn from_raw(raw: i64) -> Result<Option<Level>, ForwardAdError> {
        if raw == Self::NONE_RAW {
            return Ok(None);
        }
        u32::try_from(raw)
            .map(|index| Some(Level(index)))
            .map_err(|_| ForwardAdError::InvalidArgument(format!("invalid level {}", raw)))
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
