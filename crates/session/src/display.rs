use std::collections::BTreeSet;

use serde::Serialize;

use streaming::{Comparison, Point};

/// Hide points whose comparison found every matched tag.
pub const HIDE_COMPLETE: &str = "hideCompletePOI";
/// Hide points that have any counterpart in the external source.
pub const HIDE_MATCHED: &str = "hideMatchedPOI";

/// Number of grades a comparison score is bucketed into, excluding the
/// "not compared yet" state.
pub const GRADE_STEPS: u8 = 10;

/// User toggles. Any identifier can be enabled; only the two hide settings
/// change how points are shown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplaySettings {
    enabled: BTreeSet<String>,
}

impl DisplaySettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the value changed.
    pub fn set(&mut self, id: &str, enabled: bool) -> bool {
        if enabled {
            self.enabled.insert(id.to_string())
        } else {
            self.enabled.remove(id)
        }
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.enabled.contains(id)
    }

    pub fn enabled(&self) -> &BTreeSet<String> {
        &self.enabled
    }

    /// Whether toggling `id` requires redrawing every point.
    pub fn affects_points(id: &str) -> bool {
        id == HIDE_COMPLETE || id == HIDE_MATCHED
    }

    pub fn point_visible(&self, point: &Point) -> bool {
        let Some(c) = point.comparison else {
            return true;
        };
        !(self.is_enabled(HIDE_COMPLETE) && c.is_complete()
            || self.is_enabled(HIDE_MATCHED) && c.is_matched)
    }

    pub fn marker(&self, point: &Point) -> MarkerState {
        MarkerState {
            grade: point.comparison.as_ref().map(grade),
            visible: self.point_visible(point),
        }
    }
}

/// How the display collaborator should draw a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MarkerState {
    /// `0..=10` from no match to complete; `None` until compared.
    pub grade: Option<u8>,
    pub visible: bool,
}

pub fn grade(c: &Comparison) -> u8 {
    if c.max_score <= 0.0 {
        return 0;
    }
    let g = (f64::from(GRADE_STEPS) * c.score / c.max_score).round();
    g.clamp(0.0, f64::from(GRADE_STEPS)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundation::LatLon;
    use serde_json::Map;

    fn scored(score: f64, max_score: f64, is_matched: bool) -> Point {
        let mut p = Point::new(LatLon::new(0.0, 0.0), Map::new());
        p.comparison = Some(Comparison {
            score,
            max_score,
            is_matched,
        });
        p
    }

    #[test]
    fn grades_round_to_tenths() {
        assert_eq!(grade(&scored(0.0, 3.0, false).comparison.unwrap()), 0);
        assert_eq!(grade(&scored(1.0, 3.0, true).comparison.unwrap()), 3);
        assert_eq!(grade(&scored(2.0, 3.0, true).comparison.unwrap()), 7);
        assert_eq!(grade(&scored(3.0, 3.0, true).comparison.unwrap()), 10);
    }

    #[test]
    fn hide_settings_filter_compared_points() {
        let mut settings = DisplaySettings::new();
        let complete = scored(3.0, 3.0, true);
        let partial = scored(2.0, 3.0, true);
        let missing = scored(0.0, 3.0, false);
        let unscored = Point::new(LatLon::new(0.0, 0.0), Map::new());

        assert!(settings.point_visible(&complete));

        assert!(settings.set(HIDE_COMPLETE, true));
        assert!(!settings.set(HIDE_COMPLETE, true));
        assert!(!settings.point_visible(&complete));
        assert!(settings.point_visible(&partial));

        settings.set(HIDE_MATCHED, true);
        assert!(!settings.point_visible(&partial));
        assert!(settings.point_visible(&missing));
        assert!(settings.point_visible(&unscored));
        assert_eq!(
            settings.marker(&unscored),
            MarkerState {
                grade: None,
                visible: true
            }
        );
    }

    #[test]
    fn only_hide_settings_redraw_points() {
        assert!(DisplaySettings::affects_points(HIDE_MATCHED));
        assert!(!DisplaySettings::affects_points("satellite"));
    }
}
