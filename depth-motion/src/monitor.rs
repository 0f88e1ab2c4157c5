//! # Multi-subject motion monitoring
//!
//! [`MotionMonitor`] owns an independent [`MotionDetector`] for every body slot, keeps track of
//! how long each subject has been holding still, and forwards per-frame diagnostics to an
//! injected [`Telemetry`] sink.

use crate::detection::{DetectorSettings, MotionDetector};
use crate::frame::{BodyIndexFrame, DepthFrame, MAX_BODIES};
use crate::properties::Properties;
use anyhow::{ensure, Result};
use log::*;

/// Outcome of a single update for one subject.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
pub struct SubjectMotion {
    pub subject: u8,
    pub moved: bool,
    /// Area in motion, in m².
    pub area: f32,
    pub pixel_count: u32,
    /// Noise floor average.
    pub average: f32,
    /// Noise floor standard deviation.
    pub std_dev: f32,
    /// Number of consecutive updates without motion.
    pub still_frames: usize,
}

/// Sink for motion diagnostics.
pub trait Telemetry {
    /// Called for every tracked subject on every update.
    fn record(&mut self, motion: &SubjectMotion);

    /// Called when a subject stops being tracked.
    fn subject_lost(&mut self, _subject: u8) {}
}

/// Telemetry that drops everything.
#[derive(Default, Clone, Copy, Debug)]
pub struct NullTelemetry;

impl Telemetry for NullTelemetry {
    fn record(&mut self, _: &SubjectMotion) {}
}

/// Telemetry forwarding to the `log` facade.
///
/// Motion is logged at debug level, everything else at trace level.
#[derive(Default, Clone, Copy, Debug)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn record(&mut self, m: &SubjectMotion) {
        let level = if m.moved { Level::Debug } else { Level::Trace };

        log!(
            level,
            "subject {}: moved={} area={:.6} m² ({} px) floor={:.6}±{:.6} still={}",
            m.subject,
            m.moved,
            m.area,
            m.pixel_count,
            m.average,
            m.std_dev,
            m.still_frames
        );
    }

    fn subject_lost(&mut self, subject: u8) {
        info!("subject {} lost, resetting its detector", subject);
    }
}

/// Motion detection for all bodies in the scene.
pub struct MotionMonitor {
    detectors: Vec<MotionDetector>,
    still_frames: [usize; MAX_BODIES],
    tracked: [bool; MAX_BODIES],
    telemetry: Box<dyn Telemetry + Send>,
}

impl MotionMonitor {
    /// Create a new monitor, logging through [`LogTelemetry`].
    ///
    /// # Arguments
    ///
    /// * `width` - width of the depth and body-index frames.
    /// * `height` - height of the depth and body-index frames.
    /// * `settings` - tuning parameters shared by all detectors.
    pub fn new(width: usize, height: usize, settings: DetectorSettings) -> Result<Self> {
        let detectors = (0..MAX_BODIES)
            .map(|_| MotionDetector::new(width, height, settings.clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            detectors,
            still_frames: [0; MAX_BODIES],
            tracked: [false; MAX_BODIES],
            telemetry: Box::new(LogTelemetry),
        })
    }

    /// Replace the telemetry sink.
    pub fn with_telemetry(mut self, telemetry: impl Telemetry + Send + 'static) -> Self {
        self.telemetry = Box::new(telemetry);
        self
    }

    /// Process the next pair of frames for all tracked subjects.
    ///
    /// Subjects that were tracked on the previous update but are missing from `tracked` get
    /// their detector reset. If either frame is missing, nothing happens and no reports are
    /// produced.
    ///
    /// # Arguments
    ///
    /// * `depth` - depth frame.
    /// * `body` - body-index frame.
    /// * `tracked` - body-index labels of the subjects currently tracked.
    pub fn update(
        &mut self,
        depth: Option<DepthFrame>,
        body: Option<BodyIndexFrame>,
        tracked: &[u8],
    ) -> Result<Vec<SubjectMotion>> {
        let (depth, body) = match (depth, body) {
            (Some(depth), Some(body)) => (depth, body),
            _ => return Ok(vec![]),
        };

        let dim = self.dim();
        ensure!(
            depth.dim() == dim && body.dim() == dim,
            "expected {:?} frames, got depth {:?} and body index {:?}",
            dim,
            depth.dim(),
            body.dim()
        );

        let mut now_tracked = [false; MAX_BODIES];

        for &subject in tracked {
            ensure!(
                (subject as usize) < MAX_BODIES,
                "body index {} out of range",
                subject
            );
            now_tracked[subject as usize] = true;
        }

        for (subject, (was, is)) in self.tracked.iter().zip(now_tracked).enumerate() {
            if *was && !is {
                self.detectors[subject].reset();
                self.still_frames[subject] = 0;
                self.telemetry.subject_lost(subject as u8);
            }
        }

        self.tracked = now_tracked;

        let mut reports = vec![];

        for subject in (0..MAX_BODIES).filter(|&s| now_tracked[s]) {
            let detector = &mut self.detectors[subject];

            detector.update(subject as u8, Some(depth), Some(body))?;

            let moved = detector.did_player_move();

            let still = &mut self.still_frames[subject];
            *still = if moved { 0 } else { *still + 1 };

            let report = SubjectMotion {
                subject: subject as u8,
                moved,
                area: detector.motion_area(),
                pixel_count: detector.motion_pixel_count(),
                average: detector.motion_area_average(),
                std_dev: detector.motion_area_std_dev(),
                still_frames: *still,
            };

            self.telemetry.record(&report);
            reports.push(report);
        }

        Ok(reports)
    }

    /// Check whether every tracked subject has been still for at least `frames` updates.
    ///
    /// Returns `false` when nobody is tracked.
    pub fn all_still_for(&self, frames: usize) -> bool {
        let mut tracked = self.tracked_subjects().peekable();

        tracked.peek().is_some() && tracked.all(|s| self.still_frames[s as usize] >= frames)
    }

    /// Number of consecutive still updates of a subject.
    pub fn still_frames(&self, subject: u8) -> Option<usize> {
        self.still_frames.get(subject as usize).copied()
    }

    /// Iterate the currently tracked subjects in ascending order.
    pub fn tracked_subjects(&self) -> impl Iterator<Item = u8> + '_ {
        self.tracked
            .iter()
            .enumerate()
            .filter(|&(_, &t)| t)
            .map(|(s, _)| s as u8)
    }

    pub fn detector(&self, subject: u8) -> Option<&MotionDetector> {
        self.detectors.get(subject as usize)
    }

    pub fn detector_mut(&mut self, subject: u8) -> Option<&mut MotionDetector> {
        self.detectors.get_mut(subject as usize)
    }

    /// Get width and height of the input frames.
    pub fn dim(&self) -> (usize, usize) {
        self.detectors[0].dim()
    }

    /// Apply a property to every detector.
    pub fn set_prop(&mut self, name: &str, value: &str) -> Result<()> {
        self.detectors
            .iter_mut()
            .try_for_each(|d| d.set_prop(name, value))
    }

    /// Forget all subjects and their history.
    pub fn reset(&mut self) {
        self.detectors.iter_mut().for_each(MotionDetector::reset);
        self.still_frames = [0; MAX_BODIES];
        self.tracked = [false; MAX_BODIES];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::NO_BODY;
    use std::sync::{Arc, Mutex};

    const W: usize = 8;
    const H: usize = 8;

    #[derive(Clone, Default)]
    struct Recorder {
        records: Arc<Mutex<Vec<SubjectMotion>>>,
        lost: Arc<Mutex<Vec<u8>>>,
    }

    impl Telemetry for Recorder {
        fn record(&mut self, motion: &SubjectMotion) {
            self.records.lock().unwrap().push(*motion);
        }

        fn subject_lost(&mut self, subject: u8) {
            self.lost.lock().unwrap().push(subject);
        }
    }

    /// Left half belongs to subject 0, right half to subject 2.
    fn body() -> Vec<u8> {
        (0..W * H)
            .map(|i| if i % W < W / 2 { 0 } else { 2 })
            .collect()
    }

    /// Subject 0 stands still while subject 2 moves towards the camera.
    fn depth(tick: u16) -> Vec<u16> {
        (0..W * H)
            .map(|i| if i % W < W / 2 { 2000 } else { 1000 + tick * 150 })
            .collect()
    }

    fn step(mon: &mut MotionMonitor, tick: u16, tracked: &[u8]) -> Vec<SubjectMotion> {
        let (d, b) = (depth(tick), body());
        mon.update(
            Some(DepthFrame::new(&d, W, H).unwrap()),
            Some(BodyIndexFrame::new(&b, W, H).unwrap()),
            tracked,
        )
        .unwrap()
    }

    #[test]
    fn independent_subjects() {
        let recorder = Recorder::default();
        let settings = DetectorSettings {
            motion_area_threshold: 0.0,
            ..Default::default()
        };
        let mut mon = MotionMonitor::new(W, H, settings)
            .unwrap()
            .with_telemetry(recorder.clone());

        for tick in 0..5 {
            let reports = step(&mut mon, tick, &[2, 0]);

            assert_eq!(reports.len(), 2);
            assert_eq!(reports[0].subject, 0);
            assert_eq!(reports[1].subject, 2);
            assert!(!reports[0].moved);
            assert_eq!(reports[0].pixel_count, 0);

            if tick >= 2 {
                assert_eq!(reports[1].pixel_count, ((W / 4) * (H / 2)) as u32);
                assert!(reports[1].moved);
                assert_eq!(reports[1].still_frames, 0);
            }
        }

        assert_eq!(mon.still_frames(0), Some(5));
        assert!(!mon.all_still_for(3));
        assert_eq!(recorder.records.lock().unwrap().len(), 10);
        assert_eq!(mon.tracked_subjects().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn lost_subject_is_reset() {
        let recorder = Recorder::default();
        let mut mon = MotionMonitor::new(W, H, Default::default())
            .unwrap()
            .with_telemetry(recorder.clone());

        for tick in 0..4 {
            step(&mut mon, tick, &[0, 2]);
        }

        assert!(mon.detector(2).unwrap().motion_area() > 0.0);

        let reports = step(&mut mon, 4, &[0]);

        assert_eq!(reports.len(), 1);
        assert_eq!(*recorder.lost.lock().unwrap(), vec![2]);
        assert_eq!(mon.detector(2).unwrap().motion_area(), 0.0);
        assert_eq!(mon.still_frames(2), Some(0));
        assert!(mon.all_still_for(5));
    }

    #[test]
    fn missing_frames_produce_nothing() {
        let mut mon = MotionMonitor::new(W, H, Default::default())
            .unwrap()
            .with_telemetry(NullTelemetry);

        step(&mut mon, 0, &[0]);

        let b = body();
        let reports = mon
            .update(None, Some(BodyIndexFrame::new(&b, W, H).unwrap()), &[])
            .unwrap();

        assert!(reports.is_empty());
        assert_eq!(mon.tracked_subjects().collect::<Vec<_>>(), vec![0]);
        assert_eq!(mon.still_frames(0), Some(1));
    }

    #[test]
    fn invalid_subject() {
        let mut mon = MotionMonitor::new(W, H, Default::default())
            .unwrap()
            .with_telemetry(NullTelemetry);

        let (d, b) = (depth(0), vec![NO_BODY; W * H]);

        let res = mon.update(
            Some(DepthFrame::new(&d, W, H).unwrap()),
            Some(BodyIndexFrame::new(&b, W, H).unwrap()),
            &[MAX_BODIES as u8],
        );

        assert!(res.is_err());
        assert!(!mon.all_still_for(0));
    }

    #[test]
    fn properties_apply_everywhere() {
        let mut mon = MotionMonitor::new(W, H, Default::default()).unwrap();

        mon.set_prop("delta_z_threshold", "400").unwrap();

        for s in 0..MAX_BODIES as u8 {
            assert_eq!(mon.detector(s).unwrap().delta_z_threshold(), 400);
        }

        assert!(mon.set_prop("no_such_prop", "1").is_err());
    }
}
