//! Military tracks, bases and theaters

use serde::{Deserialize, Serialize};

/// Surge-tracked aircraft and vessel categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurgeCategory {
    Transport,
    Fighter,
    Reconnaissance,
    Tanker,
    Bomber,
    Naval,
}

impl SurgeCategory {
    pub const ALL: [SurgeCategory; 6] = [
        SurgeCategory::Transport,
        SurgeCategory::Fighter,
        SurgeCategory::Reconnaissance,
        SurgeCategory::Tanker,
        SurgeCategory::Bomber,
        SurgeCategory::Naval,
    ];

    /// Baseline floor applied while history is still thin
    pub fn baseline_floor(&self) -> f64 {
        match self {
            SurgeCategory::Transport => 2.0,
            _ => 1.0,
        }
    }

    /// Absolute count a surge must reach regardless of multiple
    pub fn minimum_count(&self) -> u32 {
        match self {
            SurgeCategory::Transport => 5,
            SurgeCategory::Fighter => 4,
            _ => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SurgeCategory::Transport => "transport",
            SurgeCategory::Fighter => "fighter",
            SurgeCategory::Reconnaissance => "reconnaissance",
            SurgeCategory::Tanker => "tanker",
            SurgeCategory::Bomber => "bomber",
            SurgeCategory::Naval => "naval",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Aircraft,
    Vessel,
}

/// A military flight or vessel position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilitaryTrack {
    pub id: String,
    pub kind: TrackKind,
    pub category: SurgeCategory,
    pub lat: f64,
    pub lon: f64,
    /// Operating country (alpha-2), if identified
    #[serde(default)]
    pub operator: Option<String>,
}

/// A known military installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilitaryBase {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub country: Option<String>,
}

/// Latitude/longitude bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl Bounds {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.min_lat && lat <= self.max_lat && lon >= self.min_lon && lon <= self.max_lon
    }
}

/// A named military theater watched for surges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theater {
    pub id: String,
    pub name: String,
    pub bounds: Bounds,
    /// Countries whose forces are expected in the theater
    #[serde(default)]
    pub host_nations: Vec<String>,
}

impl Theater {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.bounds.contains(lat, lon)
    }

    pub fn is_host(&self, operator: &str) -> bool {
        self.host_nations.iter().any(|h| h == operator)
    }
}

fn theater(id: &str, name: &str, bounds: [f64; 4], hosts: &[&str]) -> Theater {
    Theater {
        id: id.to_string(),
        name: name.to_string(),
        bounds: Bounds {
            min_lat: bounds[0],
            max_lat: bounds[1],
            min_lon: bounds[2],
            max_lon: bounds[3],
        },
        host_nations: hosts.iter().map(|h| h.to_string()).collect(),
    }
}

/// Built-in theaters used when a feed supplies none
pub fn default_theaters() -> Vec<Theater> {
    vec![
        theater(
            "taiwan-strait",
            "Taiwan Strait",
            [21.0, 27.0, 116.0, 124.0],
            &["TW", "CN"],
        ),
        theater(
            "south-china-sea",
            "South China Sea",
            [3.0, 21.0, 105.0, 121.0],
            &["CN", "VN", "PH", "MY"],
        ),
        theater(
            "korean-peninsula",
            "Korean Peninsula",
            [33.0, 43.0, 124.0, 131.0],
            &["KR", "KP"],
        ),
        theater(
            "persian-gulf",
            "Persian Gulf",
            [23.0, 31.0, 47.0, 57.0],
            &["IR", "SA", "AE", "QA", "BH", "KW"],
        ),
        theater(
            "eastern-mediterranean",
            "Eastern Mediterranean",
            [31.0, 37.0, 28.0, 36.5],
            &["IL", "CY", "LB", "SY", "TR"],
        ),
        theater(
            "black-sea",
            "Black Sea",
            [40.5, 47.0, 27.0, 42.0],
            &["UA", "RU", "TR", "RO", "BG"],
        ),
        theater(
            "baltic",
            "Baltic",
            [53.5, 66.0, 9.0, 30.0],
            &["PL", "LT", "LV", "EE", "FI", "SE", "DE", "RU"],
        ),
    ]
}
