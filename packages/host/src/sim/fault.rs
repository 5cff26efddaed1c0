use serde::Serialize;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::Errno;

/// A host call that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, IntoStaticStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailPoint {
    AllocChrdevRegion,
    CdevAdd,
    ClassCreate,
    DeviceCreate,
}

impl FailPoint {
    /// The errno the real kernel typically reports when this call fails.
    pub fn default_errno(self) -> Errno {
        match self {
            FailPoint::AllocChrdevRegion => Errno::EBUSY,
            FailPoint::CdevAdd => Errno::EBUSY,
            FailPoint::ClassCreate => Errno::ENOMEM,
            FailPoint::DeviceCreate => Errno::ENOMEM,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_parse_from_cli_name() {
        assert_eq!(FailPoint::from_str("class_create").ok(), Some(FailPoint::ClassCreate));
        assert_eq!(FailPoint::DeviceCreate.to_string(), "device_create");
        assert!(FailPoint::from_str("unknown").is_err());
    }

    #[test]
    fn test_every_point_has_an_errno() {
        for point in FailPoint::iter() {
            assert!(point.default_errno().status() < 0);
        }
    }
}
