//! Typed queries over screen pixels: "is text X in region R" and "how far is region R from
//! these reference histograms".
//!
//! Only capture failures are errors. An OCR engine failure is logged and read as empty
//! text, since "nothing recognised" is an ordinary answer for a noisy screen.

pub mod histogram;
pub mod layout;
pub mod vocabulary;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use image::RgbImage;

use histogram::Histogram;
use layout::{Rect, TextRegion};

/// Screen-region capture in absolute screen coordinates.
pub trait Screen: Send + Sync {
    fn capture(&self, area: Rect) -> anyhow::Result<RgbImage>;
}

/// OCR of a single line of text.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &RgbImage) -> anyhow::Result<String>;
}

/// Writes every OCR capture to a directory for offline inspection.
#[derive(Debug, Clone)]
pub struct DebugShots {
    dir: PathBuf,
}

impl DebugShots {
    pub fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create debug dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    fn save(&self, image: &RgbImage) {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let path = self.dir.join(format!("ocr_screenshot-{millis}.png"));
        if let Err(err) = image.save(&path) {
            tracing::warn!("perception.debug_shot.error path={} {err}", path.display());
        }
    }
}

#[derive(Clone)]
pub struct Perception {
    screen: Arc<dyn Screen>,
    ocr: Arc<dyn TextRecognizer>,
    debug: Option<DebugShots>,
}

impl Perception {
    pub fn new(screen: Arc<dyn Screen>, ocr: Arc<dyn TextRecognizer>) -> Self {
        Self {
            screen,
            ocr,
            debug: None,
        }
    }

    pub fn with_debug_shots(mut self, debug: DebugShots) -> Self {
        self.debug = Some(debug);
        self
    }

    /// Lower-cased, trimmed OCR text of an absolute region.
    pub fn read_text(&self, area: Rect, invert: bool) -> anyhow::Result<String> {
        let mut image = self
            .screen
            .capture(area)
            .with_context(|| format!("capture {area:?}"))?;
        if invert {
            image::imageops::invert(&mut image);
        }
        if let Some(debug) = &self.debug {
            debug.save(&image);
        }

        let text = match self.ocr.recognize(&image) {
            Ok(text) => text.trim().to_lowercase(),
            Err(err) => {
                tracing::warn!("perception.ocr.error area={area:?} {err:#}");
                String::new()
            }
        };
        tracing::debug!("perception.ocr area={area:?} text={text:?}");
        Ok(text)
    }

    pub fn region_text(&self, region: TextRegion, origin: layout::Point) -> anyhow::Result<String> {
        self.read_text(region.rect.at(origin), region.invert)
    }

    /// True if any of `needles` is contained in the region's text.
    pub fn region_contains(
        &self,
        region: TextRegion,
        origin: layout::Point,
        needles: &[&str],
    ) -> anyhow::Result<bool> {
        let text = self.region_text(region, origin)?;
        Ok(needles.iter().any(|needle| text.contains(needle)))
    }

    pub fn histogram(&self, area: Rect) -> anyhow::Result<Histogram> {
        let image = self
            .screen
            .capture(area)
            .with_context(|| format!("capture {area:?}"))?;
        Ok(Histogram::of_blue_channel(&image))
    }

    /// Distances of an absolute region against each reference, in reference order.
    pub fn deltas(&self, area: Rect, references: &[&Histogram]) -> anyhow::Result<Vec<f64>> {
        let sample = self.histogram(area)?;
        Ok(references
            .iter()
            .map(|reference| sample.bhattacharyya(reference))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedScreen;
    use image::Rgb;
    use layout::Point;

    fn perception(screen: &Arc<ScriptedScreen>) -> Perception {
        Perception::new(screen.clone(), screen.clone())
    }

    #[test]
    fn text_is_normalised_and_region_offset_applied() -> anyhow::Result<()> {
        let screen = Arc::new(ScriptedScreen::default());
        let origin = Point::new(5, 5);
        screen.set_text(
            layout::GAME_MESSAGE_TITLE.rect.at(origin),
            "  GAME MESSAGE\n",
        );

        let p = perception(&screen);
        assert_eq!(
            p.region_text(layout::GAME_MESSAGE_TITLE, origin)?,
            "game message"
        );
        assert!(p.region_contains(
            layout::GAME_MESSAGE_TITLE,
            origin,
            &[vocabulary::GAME_MESSAGE]
        )?);
        assert!(!p.region_contains(layout::GAME_MESSAGE_TITLE, Point::new(0, 0), &["game"])?);
        Ok(())
    }

    #[test]
    fn ocr_failure_reads_as_empty_text() -> anyhow::Result<()> {
        let screen = Arc::new(ScriptedScreen::default());
        let area = Rect::new(0, 0, 10, 10);
        screen.fail_ocr(area);
        assert_eq!(perception(&screen).read_text(area, false)?, "");
        Ok(())
    }

    #[test]
    fn capture_failure_is_an_error() {
        let screen = Arc::new(ScriptedScreen::default());
        let area = Rect::new(0, 0, 10, 10);
        screen.fail_capture(area);
        assert!(perception(&screen).read_text(area, true).is_err());
    }

    #[test]
    fn deltas_compare_against_each_reference() -> anyhow::Result<()> {
        let screen = Arc::new(ScriptedScreen::default());
        let area = Rect::new(68, 69, 41, 13);
        screen.set_image(area, RgbImage::from_pixel(41, 13, Rgb([0, 0, 200])));

        let same = Histogram::of_blue_channel(&RgbImage::from_pixel(4, 4, Rgb([9, 9, 200])));
        let other = Histogram::of_blue_channel(&RgbImage::from_pixel(4, 4, Rgb([9, 9, 10])));
        let deltas = perception(&screen).deltas(area, &[&same, &other])?;
        assert!(deltas[0] < 1e-9);
        assert!(deltas[1] > 0.99);
        Ok(())
    }

    #[test]
    fn debug_shots_are_written_as_png() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let screen = Arc::new(ScriptedScreen::default());
        let p = perception(&screen).with_debug_shots(DebugShots::new(dir.path().join("dbg"))?);
        p.read_text(Rect::new(0, 0, 3, 3), true)?;

        let written: Vec<_> = std::fs::read_dir(dir.path().join("dbg"))?.collect();
        assert_eq!(written.len(), 1);
        Ok(())
    }
}
