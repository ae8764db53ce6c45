// src/conditioning/layout.rs

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

use crate::acquisition::CHANNEL_COUNT;
use crate::error::{P300Error, Result};

/// Static table of where a recording keeps its channels, timestamp and marker.
///
/// | mode    | columns                                  | channels | marker |
/// |---------|------------------------------------------|----------|--------|
/// | default | index, 8 channels, unused, timestamp     | [1, 9)   | no     |
/// | fusion  | index, timestamp, 8 channels             | [2, 10)  | no     |
/// | train   | index, [timestamp], 8 channels, marker   | last 9   | yes    |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnLayout {
    Default,
    Fusion,
    #[default]
    Train,
}

/// Column positions resolved for one concrete file width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub channels: Range<usize>,
    pub timestamp: Option<usize>,
    pub marker: Option<usize>,
}

impl ColumnLayout {
    /// Nominal channel column range of the layout.
    pub fn channel_range(self) -> Range<usize> {
        match self {
            ColumnLayout::Default | ColumnLayout::Train => 1..1 + CHANNEL_COUNT,
            ColumnLayout::Fusion => 2..2 + CHANNEL_COUNT,
        }
    }

    pub fn has_marker(self) -> bool {
        self == ColumnLayout::Train
    }

    /// Maps a row width onto column positions. Any width the layout cannot
    /// hold is a shape error.
    pub fn resolve(self, width: usize) -> Result<ColumnMap> {
        let channels_end = 1 + CHANNEL_COUNT;
        let map = match self {
            ColumnLayout::Default if width >= channels_end => ColumnMap {
                channels: self.channel_range(),
                timestamp: (width > channels_end + 1).then_some(channels_end + 1),
                marker: None,
            },
            ColumnLayout::Fusion if width >= 2 + CHANNEL_COUNT => ColumnMap {
                channels: self.channel_range(),
                timestamp: Some(1),
                marker: None,
            },
            // index, 8 channels, marker
            ColumnLayout::Train if width == channels_end + 1 => ColumnMap {
                channels: self.channel_range(),
                timestamp: None,
                marker: Some(channels_end),
            },
            // index, timestamp, 8 channels, marker
            ColumnLayout::Train if width == channels_end + 2 => ColumnMap {
                channels: 2..2 + CHANNEL_COUNT,
                timestamp: Some(1),
                marker: Some(channels_end + 1),
            },
            _ => {
                return Err(P300Error::DataShape(format!(
                    "{} layout cannot read rows of {} columns",
                    self, width
                )))
            }
        };
        Ok(map)
    }
}

impl fmt::Display for ColumnLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnLayout::Default => "default",
            ColumnLayout::Fusion => "fusion",
            ColumnLayout::Train => "train",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn train_row_of_ten_fields_after_index_ends_in_the_marker() {
        let map = ColumnLayout::Train.resolve(11).unwrap();
        assert_eq!(map.marker, Some(10));
        assert_eq!(map.channels, 2..10);
        assert_eq!(map.timestamp, Some(1));
    }

    #[test]
    fn train_without_timestamp() {
        let map = ColumnLayout::Train.resolve(10).unwrap();
        assert_eq!(map.channels, 1..9);
        assert_eq!(map.marker, Some(9));
        assert_eq!(map.timestamp, None);
    }

    #[test]
    fn default_and_fusion_offsets() {
        let default = ColumnLayout::Default.resolve(11).unwrap();
        assert_eq!(default.channels, 1..9);
        assert_eq!(default.timestamp, Some(10));
        assert!(!ColumnLayout::Default.has_marker());

        let fusion = ColumnLayout::Fusion.resolve(10).unwrap();
        assert_eq!(fusion.channels, 2..10);
        assert_eq!(fusion.timestamp, Some(1));
        assert_eq!(fusion.marker, None);
    }

    #[test]
    fn mismatched_width_is_a_shape_error() {
        assert!(matches!(
            ColumnLayout::Train.resolve(9),
            Err(P300Error::DataShape(_))
        ));
        assert!(ColumnLayout::Train.resolve(12).is_err());
        assert!(ColumnLayout::Fusion.resolve(9).is_err());
        assert!(ColumnLayout::Default.resolve(5).is_err());
    }

    #[test]
    fn layout_names_parse_from_yaml() {
        let layout: ColumnLayout = serde_yaml::from_str("fusion").unwrap();
        assert_eq!(layout, ColumnLayout::Fusion);
    }
}
