//! Display topology
//!
//! Enumerates the connected displays on demand.

use crate::utils::config::DisplayConfig;
use crate::utils::error::{PlayerError, Result};
use parking_lot::RwLock;
use serde::Serialize;

/// One connected display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayInfo {
    /// Position in enumeration order
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub origin_x: i32,
    pub origin_y: i32,
}

/// Display topology provider
pub trait DisplayTopology: Send + Sync {
    /// Connected displays in enumeration order
    fn displays(&self) -> Result<Vec<DisplayInfo>>;

    /// The display at `index`, if still connected
    fn display(&self, index: usize) -> Result<DisplayInfo> {
        self.displays()?
            .into_iter()
            .find(|d| d.index == index)
            .ok_or(PlayerError::DisplayUnavailable(index))
    }
}

/// Topology fixed by configuration; can be replaced at runtime to model
/// displays being connected or removed
#[derive(Debug)]
pub struct StaticTopology {
    displays: RwLock<Vec<DisplayInfo>>,
}

impl StaticTopology {
    pub fn new(displays: &[DisplayConfig]) -> Self {
        Self {
            displays: RwLock::new(Self::enumerate(displays)),
        }
    }

    /// Replace the connected displays
    pub fn replace(&self, displays: &[DisplayConfig]) {
        *self.displays.write() = Self::enumerate(displays);
    }

    fn enumerate(displays: &[DisplayConfig]) -> Vec<DisplayInfo> {
        displays
            .iter()
            .enumerate()
            .map(|(index, d)| DisplayInfo {
                index,
                width: d.width,
                height: d.height,
                origin_x: d.x,
                origin_y: d.y,
            })
            .collect()
    }
}

impl DisplayTopology for StaticTopology {
    fn displays(&self) -> Result<Vec<DisplayInfo>> {
        Ok(self.displays.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(width: u32, height: u32, x: i32) -> DisplayConfig {
        DisplayConfig { width, height, x, y: 0 }
    }

    #[test]
    fn test_static_topology() {
        let topology = StaticTopology::new(&[mode(1920, 1080, 0), mode(1280, 720, 1920)]);
        let displays = topology.displays().unwrap();
        assert_eq!(displays.len(), 2);
        assert_eq!(displays[1].index, 1);
        assert_eq!(displays[1].origin_x, 1920);

        assert_eq!(topology.display(0).unwrap().width, 1920);
        assert!(matches!(topology.display(2), Err(PlayerError::DisplayUnavailable(2))));

        topology.replace(&[mode(800, 600, 0)]);
        assert!(topology.display(1).is_err());
    }
}
