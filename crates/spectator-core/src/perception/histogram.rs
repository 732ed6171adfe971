//! Colour histograms and the Bhattacharyya distance used as an image-similarity proxy.

use anyhow::Context;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::session::Team;

pub const BINS: usize = 256;

/// Maximum distance at which a region still counts as matching a team reference.
pub const TEAM_MATCH_MAX_DELTA: f64 = 0.2;

/// Average frame-to-frame distance above which the camera is considered "active".
pub const MOTION_MIN_DELTA: f64 = 0.022;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct Histogram {
    bins: Vec<f32>,
}

impl TryFrom<Vec<f32>> for Histogram {
    type Error = anyhow::Error;

    fn try_from(bins: Vec<f32>) -> anyhow::Result<Self> {
        if bins.len() != BINS {
            anyhow::bail!("histogram must have {BINS} bins, got {}", bins.len());
        }
        Ok(Self { bins })
    }
}

impl From<Histogram> for Vec<f32> {
    fn from(h: Histogram) -> Self {
        h.bins
    }
}

impl Histogram {
    /// Histogram of the blue channel, the first plane of the BGR layout the reference
    /// histograms were recorded in.
    pub fn of_blue_channel(image: &RgbImage) -> Self {
        let mut bins = vec![0.0f32; BINS];
        for pixel in image.pixels() {
            bins[pixel.0[2] as usize] += 1.0;
        }
        Self { bins }
    }

    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    /// Bhattacharyya distance in `[0, 1]`; 0 means identical distributions.
    pub fn bhattacharyya(&self, other: &Histogram) -> f64 {
        let mut s1 = 0.0f64;
        let mut s2 = 0.0f64;
        let mut overlap = 0.0f64;
        for (a, b) in self.bins.iter().zip(other.bins.iter()) {
            let (a, b) = (*a as f64, *b as f64);
            s1 += a;
            s2 += b;
            overlap += (a * b).sqrt();
        }

        let norm = s1 * s2;
        let scale = if norm.abs() > f64::EPSILON {
            1.0 / norm.sqrt()
        } else {
            1.0
        };
        (1.0 - overlap * scale).max(0.0).sqrt()
    }
}

/// Active-flag reference histograms for the four factions.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TeamReferences {
    pub usmc: Histogram,
    pub eu: Histogram,
    pub china: Histogram,
    pub mec: Histogram,
}

impl TeamReferences {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        serde_json::from_str(text).context("invalid team reference histograms")
    }

    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read histograms at {}", path.display()))?;
        Self::from_json(&text)
    }
}

/// Distances of one team slot against its two candidate faction references.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotDeltas {
    pub first: f64,
    pub second: f64,
}

impl SlotDeltas {
    pub fn new(first: f64, second: f64) -> Self {
        Self { first, second }
    }

    fn matches(&self) -> bool {
        self.first < TEAM_MATCH_MAX_DELTA || self.second < TEAM_MATCH_MAX_DELTA
    }
}

/// Slot 0 holds USMC/EU, slot 1 China/MEC; whichever slot shows an active flag is our team.
pub fn classify_team(slot0: SlotDeltas, slot1: SlotDeltas) -> Option<Team> {
    if slot0.matches() {
        Some(Team::UsmcEu)
    } else if slot1.matches() {
        Some(Team::ChinaMec)
    } else {
        None
    }
}

/// True when consecutive frames differ enough on average to suggest a live player view.
pub fn sufficient_motion(frames: &[Histogram]) -> bool {
    let deltas: Vec<f64> = frames
        .windows(2)
        .map(|pair| pair[0].bhattacharyya(&pair[1]))
        .collect();
    if deltas.is_empty() {
        return false;
    }
    let average = deltas.iter().sum::<f64>() / deltas.len() as f64;
    tracing::debug!("perception.motion average_delta={average:.4}");
    average > MOTION_MIN_DELTA
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(blue: u8) -> Histogram {
        Histogram::of_blue_channel(&RgbImage::from_pixel(41, 13, Rgb([10, 20, blue])))
    }

    #[test]
    fn identical_histograms_have_zero_distance() {
        let h = solid(120);
        assert!(h.bhattacharyya(&h) < 1e-9);
    }

    #[test]
    fn disjoint_histograms_have_unit_distance() {
        let d = solid(0).bhattacharyya(&solid(255));
        assert!((d - 1.0).abs() < 1e-9, "got {d}");
    }

    #[test]
    fn empty_histograms_do_not_divide_by_zero() {
        let empty = Histogram::try_from(vec![0.0; BINS]).unwrap();
        assert!(empty.bhattacharyya(&empty).is_finite());
    }

    #[test]
    fn histogram_json_requires_full_bin_count() {
        assert!(serde_json::from_str::<Histogram>("[1.0, 2.0]").is_err());
        let json = serde_json::to_string(&solid(3)).unwrap();
        let back: Histogram = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bins()[3], 41.0 * 13.0);
    }

    #[test]
    fn team_is_a_pure_function_of_slot_deltas() {
        assert_eq!(
            classify_team(SlotDeltas::new(0.05, 0.9), SlotDeltas::new(0.9, 0.9)),
            Some(Team::UsmcEu)
        );
        assert_eq!(
            classify_team(SlotDeltas::new(0.9, 0.9), SlotDeltas::new(0.05, 0.9)),
            Some(Team::ChinaMec)
        );
        assert_eq!(
            classify_team(SlotDeltas::new(0.9, 0.9), SlotDeltas::new(0.9, 0.9)),
            None
        );
    }

    #[test]
    fn threshold_is_exclusive() {
        assert_eq!(
            classify_team(SlotDeltas::new(0.2, 0.2), SlotDeltas::new(0.9, 0.2)),
            None
        );
        assert_eq!(
            classify_team(SlotDeltas::new(0.9, 0.19), SlotDeltas::new(0.9, 0.9)),
            Some(Team::UsmcEu)
        );
    }

    #[test]
    fn static_frames_are_not_enough_motion() {
        assert!(!sufficient_motion(&[solid(50), solid(50), solid(50)]));
        assert!(sufficient_motion(&[solid(50), solid(200), solid(50)]));
        assert!(!sufficient_motion(&[solid(50)]));
    }
}
