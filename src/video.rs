//! OpenCV frontend: capture, YOLO person detection and the display window.

use std::sync::{Arc, Mutex};

use anyhow::{bail, Context, Result};
use opencv::{
    core::{self, Mat, Point as CvPoint, Rect, Scalar, Size, Vector},
    dnn, highgui, imgproc,
    prelude::*,
    videoio,
};

use crate::{
    detection::{BBox, RawDetection},
    overlay::DrawDirective,
    pipeline::FrameSink,
    session::{Command, FrameOutcome},
    source::{Detector, FrameSource},
    zones::ZoneRect,
};

pub struct CaptureSource {
    label: String,
    capture: videoio::VideoCapture,
    resize: Option<Size>,
}

impl CaptureSource {
    pub fn open_file(source: &str, resize: Option<(i32, i32)>) -> Result<Self> {
        let capture = videoio::VideoCapture::from_file(source, videoio::CAP_ANY)
            .with_context(|| format!("Failed to open input source: {}", source))?;
        Self::from_capture(source.to_string(), capture, resize)
    }

    pub fn open_camera(index: i32, resize: Option<(i32, i32)>) -> Result<Self> {
        let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)
            .with_context(|| format!("Failed to open camera {}", index))?;
        Self::from_capture(format!("camera:{}", index), capture, resize)
    }

    fn from_capture(
        label: String,
        mut capture: videoio::VideoCapture,
        resize: Option<(i32, i32)>,
    ) -> Result<Self> {
        if !capture.is_opened()? {
            bail!("Failed to open input source: {}", label);
        }
        let _ = capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0);
        Ok(Self {
            label,
            capture,
            resize: resize.map(|(w, h)| Size::new(w, h)),
        })
    }
}

impl FrameSource for CaptureSource {
    type Frame = Mat;

    fn next_frame(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            return Ok(None);
        }
        let Some(size) = self.resize else {
            return Ok(Some(frame));
        };
        let mut resized = Mat::default();
        imgproc::resize(&frame, &mut resized, size, 0.0, 0.0, imgproc::INTER_LINEAR)
            .context("Failed to resize frame")?;
        Ok(Some(resized))
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

/// YOLOv8-style ONNX detector (`[1, 4 + classes, anchors]` output) run
/// through OpenCV DNN. Non-max suppression happens here so downstream code
/// can take every box at face value.
pub struct YoloDetector {
    net: dnn::Net,
    input_size: i32,
    score_threshold: f32,
    nms_iou: f32,
}

impl YoloDetector {
    pub fn new(model: &str, input_size: i32, score_threshold: f32, nms_iou: f32) -> Result<Self> {
        let net = dnn::read_net_from_onnx(model)
            .with_context(|| format!("Failed to load model {}", model))?;
        Ok(Self {
            net,
            input_size,
            score_threshold,
            nms_iou,
        })
    }
}

impl Detector<Mat> for YoloDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Vec<RawDetection>> {
        let blob = dnn::blob_from_image(
            frame,
            1.0 / 255.0,
            Size::new(self.input_size, self.input_size),
            Scalar::default(),
            true,
            false,
            core::CV_32F,
        )?;
        self.net.set_input(&blob, "", 1.0, Scalar::default())?;
        let output = self.net.forward_single("")?;

        let dims = output.mat_size();
        if dims.len() != 3 {
            bail!("Unexpected detector output rank {}", dims.len());
        }
        let (rows, anchors) = (dims[1] as usize, dims[2] as usize);
        if rows <= 4 {
            bail!("Detector output has no class rows");
        }
        let data = output.data_typed::<f32>()?;
        let scale = (
            frame.cols() as f32 / self.input_size as f32,
            frame.rows() as f32 / self.input_size as f32,
        );
        let candidates = decode_anchors(data, rows, anchors, scale, self.score_threshold);
        suppress_per_class(candidates, self.score_threshold, self.nms_iou)
    }
}

/// Best-scoring class per anchor, box rescaled to frame pixels.
fn decode_anchors(
    data: &[f32],
    rows: usize,
    anchors: usize,
    (scale_x, scale_y): (f32, f32),
    score_threshold: f32,
) -> Vec<RawDetection> {
    let mut candidates = Vec::new();
    for a in 0..anchors {
        let (class_id, score) = (4..rows)
            .map(|r| (r - 4, data[r * anchors + a]))
            .fold((0, f32::MIN), |best, c| if c.1 > best.1 { c } else { best });
        if score < score_threshold {
            continue;
        }
        let (cx, cy) = (data[a] * scale_x, data[anchors + a] * scale_y);
        let (w, h) = (data[2 * anchors + a] * scale_x, data[3 * anchors + a] * scale_y);
        candidates.push(RawDetection {
            class_id: class_id as i32,
            confidence: score,
            bbox: BBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0),
        });
    }
    candidates
}

/// Non-max suppression within each class, so a person overlapping a
/// higher-scoring object of another class survives.
fn suppress_per_class(
    candidates: Vec<RawDetection>,
    score_threshold: f32,
    nms_iou: f32,
) -> Result<Vec<RawDetection>> {
    let mut boxes = Vector::<Rect>::new();
    let mut scores = Vector::<f32>::new();
    let mut class_ids = Vector::<i32>::new();
    for det in &candidates {
        let b = det.bbox;
        boxes.push(Rect::new(
            b.x1 as i32,
            b.y1 as i32,
            (b.x2 - b.x1) as i32,
            (b.y2 - b.y1) as i32,
        ));
        scores.push(det.confidence);
        class_ids.push(det.class_id);
    }

    let mut keep = Vector::<i32>::new();
    dnn::nms_boxes_batched(
        &boxes,
        &scores,
        &class_ids,
        score_threshold,
        nms_iou,
        &mut keep,
        1.0,
        0,
    )?;
    Ok(keep
        .iter()
        .filter_map(|i| candidates.get(i as usize).cloned())
        .collect())
}

#[derive(Debug, Default)]
struct DragState {
    start: Option<(i32, i32)>,
    cursor: Option<(i32, i32)>,
    finished: Vec<ZoneRect>,
}

impl DragState {
    fn on_mouse(&mut self, event: i32, x: i32, y: i32) {
        if event == highgui::EVENT_LBUTTONDOWN {
            self.start = Some((x, y));
            self.cursor = Some((x, y));
        } else if event == highgui::EVENT_MOUSEMOVE && self.start.is_some() {
            self.cursor = Some((x, y));
        } else if event == highgui::EVENT_LBUTTONUP {
            self.cursor = None;
            if let Some((x1, y1)) = self.start.take() {
                self.finished.push(ZoneRect::new(x1, y1, x, y));
            }
        }
    }

    /// Rectangle being dragged right now, if any.
    fn preview(&self) -> Option<ZoneRect> {
        let ((x1, y1), (x2, y2)) = (self.start?, self.cursor?);
        Some(ZoneRect::new(x1, y1, x2, y2))
    }
}

/// `highgui` window that paints the overlay and turns keys and mouse drags
/// into session commands.
pub struct Window {
    name: String,
    drag: Arc<Mutex<DragState>>,
}

impl Window {
    pub fn open(name: &str) -> Result<Self> {
        highgui::named_window(name, highgui::WINDOW_AUTOSIZE)?;
        let drag = Arc::new(Mutex::new(DragState::default()));
        let shared = Arc::clone(&drag);
        highgui::set_mouse_callback(
            name,
            Some(Box::new(move |event, x, y, _flags| {
                if let Ok(mut state) = shared.lock() {
                    state.on_mouse(event, x, y);
                }
            })),
        )?;
        Ok(Self {
            name: name.to_string(),
            drag,
        })
    }

    /// Completed drags since the last call, plus the drag still in progress.
    fn take_drags(&self) -> (Vec<ZoneRect>, Option<ZoneRect>) {
        match self.drag.lock() {
            Ok(mut state) => (std::mem::take(&mut state.finished), state.preview()),
            Err(_) => (Vec::new(), None),
        }
    }
}

impl FrameSink<Mat> for Window {
    fn present(&mut self, frame: &mut Mat, outcome: &FrameOutcome) -> Result<Vec<Command>> {
        let (finished, preview) = self.take_drags();
        draw_overlay(frame, &outcome.overlay.directives)?;
        if let Some(rect) = preview {
            let preview_color = Scalar::new(0.0, 255.0, 255.0, 0.0);
            imgproc::rectangle(frame, cv_rect(&rect), preview_color, 1, imgproc::LINE_8, 0)?;
        }
        highgui::imshow(&self.name, &*frame)?;

        let mut commands: Vec<Command> = finished.into_iter().map(Command::AddZone).collect();
        match highgui::wait_key(1)? {
            27 | 113 => commands.push(Command::Quit),
            100 => commands.push(Command::DeleteLastZone),
            114 => commands.push(Command::ClearZones),
            _ => {}
        }
        Ok(commands)
    }
}

fn cv_rect(rect: &ZoneRect) -> Rect {
    Rect::new(
        rect.x1.min(rect.x2),
        rect.y1.min(rect.y2),
        i32::try_from(rect.width()).unwrap_or(i32::MAX),
        i32::try_from(rect.height()).unwrap_or(i32::MAX),
    )
}

fn draw_overlay(frame: &mut Mat, directives: &[DrawDirective]) -> Result<()> {
    let track_color = Scalar::new(0.0, 255.0, 0.0, 0.0);
    let zone_color = Scalar::new(255.0, 0.0, 0.0, 0.0);
    let line_color = Scalar::new(0.0, 0.0, 255.0, 0.0);
    let hud_color = Scalar::new(0.0, 255.0, 255.0, 0.0);

    for directive in directives {
        match directive {
            DrawDirective::TrackBox { bbox, label, .. } => {
                let rect = Rect::new(
                    bbox.x1 as i32,
                    bbox.y1 as i32,
                    (bbox.x2 - bbox.x1) as i32,
                    (bbox.y2 - bbox.y1) as i32,
                );
                imgproc::rectangle(frame, rect, track_color, 2, imgproc::LINE_8, 0)?;
                put_label(frame, label, rect.x, rect.y.saturating_sub(5), 0.5, track_color)?;
            }
            DrawDirective::ZoneBox { rect, label, .. } => {
                let cv_rect = cv_rect(rect);
                imgproc::rectangle(frame, cv_rect, zone_color, 2, imgproc::LINE_8, 0)?;
                put_label(frame, label, cv_rect.x, cv_rect.y.saturating_sub(10), 0.5, zone_color)?;
            }
            DrawDirective::CrossingLine { y } => {
                let (y, width) = (*y as i32, frame.cols());
                imgproc::line(
                    frame,
                    CvPoint::new(0, y),
                    CvPoint::new(width, y),
                    line_color,
                    2,
                    imgproc::LINE_8,
                    0,
                )?;
            }
            DrawDirective::Dashboard {
                entry,
                exit,
                active,
            } => {
                put_label(frame, &format!("Entry: {}", entry), 20, 40, 0.7, hud_color)?;
                put_label(frame, &format!("Exit: {}", exit), 20, 70, 0.7, hud_color)?;
                put_label(frame, &format!("Active: {}", active), 20, 100, 0.7, hud_color)?;
            }
        }
    }
    Ok(())
}

fn put_label(frame: &mut Mat, text: &str, x: i32, y: i32, scale: f64, color: Scalar) -> Result<()> {
    imgproc::put_text(
        frame,
        text,
        CvPoint::new(x, y),
        imgproc::FONT_HERSHEY_SIMPLEX,
        scale,
        color,
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}
