use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Camera observation of the visual FoodCollector agent
pub const VISUAL_OBSERVATION: InputShape = InputShape::new(3, 84, 84);

/// Per-sample tensor dimensions (channels, height, width)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputShape {
    pub channels: i64,
    pub height: i64,
    pub width: i64,
}

impl InputShape {
    pub const fn new(channels: i64, height: i64, width: i64) -> Self {
        Self {
            channels,
            height,
            width,
        }
    }

    /// Number of elements in one sample
    pub fn numel(&self) -> i64 {
        self.channels * self.height * self.width
    }

    /// Full NCHW size for a batch
    pub fn batched(&self, batch_size: i64) -> [i64; 4] {
        [batch_size, self.channels, self.height, self.width]
    }
}

impl fmt::Display for InputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.channels, self.height, self.width)
    }
}

impl FromStr for InputShape {
    type Err = String;

    /// Parses `C,H,W` (also accepts `x` as separator).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dims = s
            .split([',', 'x'])
            .map(|part| part.trim().parse::<i64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid input shape '{s}': {e}"))?;
        match dims.as_slice() {
            [c, h, w] if *c > 0 && *h > 0 && *w > 0 => Ok(InputShape::new(*c, *h, *w)),
            _ => Err(format!(
                "invalid input shape '{s}': expected three positive dimensions C,H,W"
            )),
        }
    }
}
