//! Frame result renderers

use std::fs;
use std::path::{Path, PathBuf};

use ab_glyph::{FontVec, PxScale};
use camera_capture::VideoFrame;
use dms::{DmsError, EyeBox, EyeStatus, FaceRegion, FrameAnalysis, FrameRenderer};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use tracing::{debug, info};

const FACE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const EYE_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const DROWSY_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
/// Text height relative to the frame height
const TEXT_SCALE: f32 = 0.06;

/// Logs the status and counter, announcing status changes at `info`
#[derive(Debug, Default)]
pub struct LogRenderer {
    last_status: Option<EyeStatus>,
}

impl LogRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_status(&self) -> Option<EyeStatus> {
        self.last_status
    }
}

impl FrameRenderer for LogRenderer {
    fn render(&mut self, frame: &VideoFrame, analysis: &FrameAnalysis) -> Result<(), DmsError> {
        let status = analysis.status();
        if self.last_status != Some(status) {
            info!("{} ({})", status.label(), analysis.counter_text());
            self.last_status = Some(status);
        } else {
            debug!("Frame {}: {} ({})", frame.sequence, status.label(), analysis.counter_text());
        }
        Ok(())
    }
}

/// Draws face and eye rectangles onto each frame and saves it as PNG.
/// With a font loaded the status and closed-frame counter are written too.
pub struct AnnotatingRenderer {
    dir: PathBuf,
    log: LogRenderer,
    font: Option<FontVec>,
}

impl AnnotatingRenderer {
    /// Create the output directory if needed
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, DmsError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| DmsError::ImageProcessing(format!("cannot create {}: {}", dir.display(), e)))?;
        info!("Writing annotated frames to {}", dir.display());
        Ok(Self {
            dir,
            log: LogRenderer::new(),
            font: None,
        })
    }

    /// Load a TrueType/OpenType font for the status text
    pub fn with_font(mut self, path: impl AsRef<Path>) -> Result<Self, DmsError> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .map_err(|e| DmsError::ImageProcessing(format!("cannot read font {}: {}", path.display(), e)))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|e| DmsError::ImageProcessing(format!("invalid font {}: {}", path.display(), e)))?;
        debug!("Overlay font loaded from {}", path.display());
        self.font = Some(font);
        Ok(self)
    }

    /// Output file for a frame sequence number
    pub fn frame_path(&self, sequence: u64) -> PathBuf {
        self.dir.join(format!("frame_{:06}.png", sequence))
    }

    /// Draw the analysis onto a copy of the frame
    pub fn annotate(
        frame: &VideoFrame,
        analysis: &FrameAnalysis,
        font: Option<&FontVec>,
    ) -> Result<RgbImage, DmsError> {
        let mut image = frame
            .to_rgb_image()
            .ok_or_else(|| DmsError::ImageProcessing("pixel buffer does not match dimensions".into()))?;
        let scale = Scale::new(analysis.frame_size, image.dimensions());
        let eye_color = if analysis.state.alarm_active {
            DROWSY_COLOR
        } else {
            EYE_COLOR
        };

        for face in &analysis.faces {
            if let Some(rect) = scale.face(&face.face) {
                draw_hollow_rect_mut(&mut image, rect, FACE_COLOR);
            }
            for eye in face.left_eye.iter().chain(face.right_eye.iter()) {
                if let Some(rect) = scale.eye(eye) {
                    draw_hollow_rect_mut(&mut image, rect, eye_color);
                }
            }
        }

        if let Some(font) = font {
            let height = (image.height() as f32 * TEXT_SCALE).max(8.0);
            let margin = (height / 2.0).round() as i32;
            let text_scale = PxScale::from(height);
            draw_text_mut(&mut image, TEXT_COLOR, margin, margin, text_scale, font, analysis.status().label());
            let counter_x = image.width() as i32 - margin - (height * 4.0) as i32;
            let counter = analysis.counter_text();
            draw_text_mut(&mut image, TEXT_COLOR, counter_x.max(margin), margin, text_scale, font, &counter);
        }
        Ok(image)
    }
}

impl FrameRenderer for AnnotatingRenderer {
    fn render(&mut self, frame: &VideoFrame, analysis: &FrameAnalysis) -> Result<(), DmsError> {
        self.log.render(frame, analysis)?;

        let path = self.frame_path(frame.sequence);
        Self::annotate(frame, analysis, self.font.as_ref())?
            .save(&path)
            .map_err(|e| DmsError::ImageProcessing(format!("cannot write {}: {}", path.display(), e)))
    }
}

/// Maps working-frame coordinates onto the source frame
#[derive(Debug, Clone, Copy)]
struct Scale {
    x: f32,
    y: f32,
}

impl Scale {
    fn new(working: (u32, u32), source: (u32, u32)) -> Self {
        let ratio = |src: u32, work: u32| if work == 0 { 1.0 } else { src as f32 / work as f32 };
        Self {
            x: ratio(source.0, working.0),
            y: ratio(source.1, working.1),
        }
    }

    fn rect(&self, x: i32, y: i32, width: u32, height: u32) -> Option<Rect> {
        let w = (width as f32 * self.x).round() as u32;
        let h = (height as f32 * self.y).round() as u32;
        if w == 0 || h == 0 {
            return None;
        }
        let x = (x as f32 * self.x).round() as i32;
        let y = (y as f32 * self.y).round() as i32;
        Some(Rect::at(x, y).of_size(w, h))
    }

    fn face(&self, face: &FaceRegion) -> Option<Rect> {
        self.rect(face.x, face.y, face.width, face.height)
    }

    fn eye(&self, eye: &EyeBox) -> Option<Rect> {
        self.rect(eye.x, eye.y, eye.width, eye.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dms::EyeStatus::{Closing, NoFace};
    use dms::{AlarmDecision, DrowsinessState, EyeLabel, FaceAnalysis, FaceOutcome};

    fn analysis() -> FrameAnalysis {
        FrameAnalysis {
            sequence: 3,
            frame_size: (100, 50),
            faces: vec![FaceAnalysis {
                face: FaceRegion {
                    x: 10,
                    y: 5,
                    width: 40,
                    height: 30,
                    confidence: 1.0,
                },
                left_eye: Some(EyeBox {
                    x: 30,
                    y: 10,
                    width: 8,
                    height: 8,
                }),
                right_eye: None,
                outcome: FaceOutcome::Skipped {
                    reason: "test".into(),
                },
            }],
            state: DrowsinessState::default(),
            alarms: Vec::new(),
        }
    }

    fn frame() -> VideoFrame {
        VideoFrame::from_rgb_image(RgbImage::new(200, 100), 0, 3)
    }

    #[test]
    fn test_annotate_scales_to_source_frame() {
        let image = AnnotatingRenderer::annotate(&frame(), &analysis(), None).unwrap();

        // face (10,5) in the 100x50 working frame lands at (20,10)
        assert_eq!(*image.get_pixel(20, 10), FACE_COLOR);
        assert_eq!(*image.get_pixel(60, 20), EYE_COLOR);
        assert_eq!(*image.get_pixel(0, 0), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_drowsy_eyes_are_red() {
        let mut analysis = analysis();
        analysis.state = DrowsinessState {
            consecutive_closed_frames: 10,
            alarm_active: true,
        };
        let image = AnnotatingRenderer::annotate(&frame(), &analysis, None).unwrap();
        assert_eq!(*image.get_pixel(60, 20), DROWSY_COLOR);
    }

    #[test]
    fn test_render_writes_png() {
        let dir = std::env::temp_dir().join(format!("annotated-{}", std::process::id()));
        let mut renderer = AnnotatingRenderer::new(&dir).unwrap();

        renderer.render(&frame(), &analysis()).unwrap();
        let path = renderer.frame_path(3);
        assert!(path.ends_with("frame_000003.png"));
        assert_eq!(image::open(&path).unwrap().to_rgb8().dimensions(), (200, 100));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_font_must_load() {
        let dir = std::env::temp_dir().join(format!("annotated-font-{}", std::process::id()));
        let bogus = dir.join("bogus.ttf");
        let renderer = AnnotatingRenderer::new(&dir).unwrap();
        fs::write(&bogus, b"not a font").unwrap();

        let err = renderer.with_font(&bogus).err().unwrap();
        assert!(err.to_string().contains("invalid font"));
        let renderer = AnnotatingRenderer::new(&dir).unwrap();
        assert!(renderer.with_font(dir.join("missing.ttf")).is_err());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_status_text_is_drawn_with_font() {
        // any installed TrueType font will do
        let Some(font_path) = ["/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf", "/Library/Fonts/Arial.ttf"]
            .into_iter()
            .map(Path::new)
            .find(|p| p.exists())
        else {
            return;
        };
        let font = FontVec::try_from_vec(fs::read(font_path).unwrap()).unwrap();

        let mut analysis = analysis();
        analysis.faces[0].outcome = FaceOutcome::Classified {
            left: EyeLabel::Closed,
            right: EyeLabel::Closed,
            decision: AlarmDecision::Continue,
        };
        let plain = AnnotatingRenderer::annotate(&frame(), &analysis, None).unwrap();
        let labelled = AnnotatingRenderer::annotate(&frame(), &analysis, Some(&font)).unwrap();

        // the status sits in the top left corner, clear of the face box
        let corner_changed = (0..15)
            .flat_map(|y| (0..20).map(move |x| (x, y)))
            .any(|(x, y)| plain.get_pixel(x, y) != labelled.get_pixel(x, y));
        assert!(corner_changed);
    }

    #[test]
    fn test_log_renderer_tracks_status() {
        let mut renderer = LogRenderer::new();
        renderer.render(&frame(), &FrameAnalysis::default()).unwrap();
        assert_eq!(renderer.last_status(), Some(NoFace));

        let mut analysis = analysis();
        analysis.faces[0].outcome = FaceOutcome::Classified {
            left: EyeLabel::Closed,
            right: EyeLabel::Closed,
            decision: AlarmDecision::Continue,
        };
        renderer.render(&frame(), &analysis).unwrap();
        assert_eq!(renderer.last_status(), Some(Closing));
    }
}
