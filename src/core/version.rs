/// Two-level file version numbers (`<major>-<minor>`)

use std::fmt;

use super::error::{BackupError, Result};

/// A `major-minor` pair embedded in backup file names.
///
/// Ordering compares `major` first, then `minor`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
}

/// Which component of a [`Version`] a rotation pass counts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Major,
    Minor,
}

impl Version {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub fn increase_major(&mut self) {
        self.major += 1;
    }

    pub fn increase_minor(&mut self) {
        self.minor += 1;
    }

    /// Fails instead of clamping: a decrement below zero is a bookkeeping bug.
    pub fn decrease_major(&mut self) -> Result<()> {
        self.major = self.major.checked_sub(1).ok_or_else(|| {
            BackupError::InvalidVersion(format!("cannot decrease major version below 0: '{}'", self))
        })?;
        Ok(())
    }

    pub fn decrease_minor(&mut self) -> Result<()> {
        self.minor = self.minor.checked_sub(1).ok_or_else(|| {
            BackupError::InvalidVersion(format!("cannot decrease minor version below 0: '{}'", self))
        })?;
        Ok(())
    }

    pub fn set(&mut self, axis: Axis, value: u32) {
        match axis {
            Axis::Major => self.major = value,
            Axis::Minor => self.minor = value,
        }
    }

    pub fn decrease(&mut self, axis: Axis) -> Result<()> {
        match axis {
            Axis::Major => self.decrease_major(),
            Axis::Minor => self.decrease_minor(),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cmp::Ordering;

    #[test]
    fn test_ordering_is_lexicographic() {
        assert!(Version::new(1, 0) > Version::new(0, 9));
        assert!(Version::new(0, 2) > Version::new(0, 1));
        assert!(Version::new(2, 0) < Version::new(2, 1));
        assert_eq!(Version::new(3, 4).cmp(&Version::new(3, 4)), Ordering::Equal);
    }

    #[test]
    fn test_total_order_over_grid() {
        let grid: Vec<Version> = (0..4)
            .flat_map(|major| (0..4).map(move |minor| Version::new(major, minor)))
            .collect();

        for a in &grid {
            for b in &grid {
                // antisymmetry
                if a <= b && b <= a {
                    assert_eq!(a, b);
                }
                for c in &grid {
                    // transitivity
                    if a < b && b < c {
                        assert!(a < c);
                    }
                }
            }
        }
    }

    #[test]
    fn test_increase_and_decrease() {
        let mut version = Version::new(0, 0);
        version.increase_major();
        version.increase_minor();
        version.increase_minor();
        assert_eq!(version, Version::new(1, 2));

        version.decrease_minor().unwrap();
        version.decrease_major().unwrap();
        assert_eq!(version, Version::new(0, 1));
    }

    #[test]
    fn test_decrease_below_zero_fails() {
        let mut version = Version::new(0, 3);
        let err = version.decrease_major().unwrap_err();
        assert!(matches!(err, BackupError::InvalidVersion(_)));
        assert_eq!(version, Version::new(0, 3));

        let mut version = Version::new(5, 0);
        assert!(version.decrease(Axis::Minor).is_err());
        assert_eq!(version, Version::new(5, 0));
    }

    #[test]
    fn test_display() {
        assert_eq!(Version::new(2, 11).to_string(), "2-11");
    }
}
