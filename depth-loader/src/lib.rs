//! Common frame source loader.
//!
//! Frame sources feed depth and body-index frames to the detector outside of a live sensor, for
//! tuning and regression testing. Two sources are available: `.dmrec` recordings (see
//! [`recording`]) and a seeded [`synthetic::SyntheticScene`].

use depth_motion::prelude::v1::*;
use log::*;
use std::io::{BufReader, Read};
use std::net::{TcpListener, TcpStream};

pub mod recording;
pub mod synthetic;

pub use recording::{RecordingReader, RecordingWriter};
pub use synthetic::SyntheticScene;

/// Reusable storage for one pair of frames.
#[derive(Clone, Debug)]
pub struct FrameBuffers {
    width: usize,
    height: usize,
    pub depth: Vec<u16>,
    pub body: Vec<u8>,
    /// Whether `depth` holds a frame for the current tick.
    pub has_depth: bool,
    /// Whether `body` holds a frame for the current tick.
    pub has_body: bool,
}

impl FrameBuffers {
    /// Allocate buffers for frames of given size.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            depth: vec![NO_DEPTH; width * height],
            body: vec![NO_BODY; width * height],
            has_depth: false,
            has_body: false,
        }
    }

    /// Get width and height of the frames.
    pub fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Borrow the depth frame, if present.
    pub fn depth_frame(&self) -> Result<Option<DepthFrame>> {
        self.has_depth
            .then(|| DepthFrame::new(&self.depth, self.width, self.height))
            .transpose()
    }

    /// Borrow the body-index frame, if present.
    pub fn body_frame(&self) -> Result<Option<BodyIndexFrame>> {
        self.has_body
            .then(|| BodyIndexFrame::new(&self.body, self.width, self.height))
            .transpose()
    }
}

/// Source of sequential depth and body-index frames.
pub trait FrameSource {
    /// Get width and height of the produced frames.
    fn dim(&self) -> (usize, usize);

    /// Produce the next pair of frames.
    ///
    /// Returns `Ok(false)` once the source is exhausted. Either of the frames may be missing on
    /// a tick, which is signalled through the `has_depth` and `has_body` flags.
    fn next_frame(&mut self, frames: &mut FrameBuffers) -> Result<bool>;

    /// Get the framerate of the stream, if known.
    fn get_framerate(&self) -> Option<f64> {
        None
    }
}

/// Create a frame source depending on the input.
///
/// `synthetic://<frames>` creates a default [`SyntheticScene`] of the reference sensor size.
/// Anything else is opened with [`open_file`] and parsed as a `.dmrec` recording.
pub fn create_source(input: &str) -> Result<Box<dyn FrameSource>> {
    if let Some(frames) = input.strip_prefix("synthetic://") {
        let frames = frames.parse()?;

        return Ok(Box::new(
            SyntheticScene::new(DEPTH_WIDTH, DEPTH_HEIGHT, 0).with_frames(frames),
        ));
    }

    let reader = BufReader::new(open_file(input)?);
    let recording = RecordingReader::new(reader)?;

    let (w, h) = recording.dim();
    info!("Opened {} ({}x{})", input, w, h);

    Ok(Box::new(recording))
}

/// Open a file or an input stream.
///
/// `tcp://host:port` connects to a remote stream, `tcp://@:port` waits for one connection.
pub fn open_file(input: &str) -> Result<Box<dyn Read + Send>> {
    if let Some(input) = input.strip_prefix("tcp://") {
        let (addr, port) = input
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid format"))?;
        let port: u16 = str::parse(port)?;

        let stream = if addr == "@" {
            let listener = TcpListener::bind(("0.0.0.0", port))?;
            let (sock, addr) = listener.accept()?;
            info!("Accept {}", addr);
            sock
        } else {
            info!("Connecting to {}", input);
            TcpStream::connect(input)?
        };

        Ok(Box::new(stream))
    } else {
        std::fs::File::open(input)
            .map(|i| Box::new(i) as _)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_to_frames() {
        let mut buffers = FrameBuffers::new(4, 2);

        assert!(buffers.depth_frame().unwrap().is_none());
        assert!(buffers.body_frame().unwrap().is_none());

        buffers.has_depth = true;
        buffers.depth[7] = 1234;

        let depth = buffers.depth_frame().unwrap().unwrap();
        assert_eq!(depth.get(1, 3), Some(1234));
    }

    #[test]
    fn synthetic_input() {
        let mut source = create_source("synthetic://3").unwrap();
        let (w, h) = source.dim();
        let mut buffers = FrameBuffers::new(w, h);

        assert_eq!((w, h), (DEPTH_WIDTH, DEPTH_HEIGHT));

        for _ in 0..3 {
            assert!(source.next_frame(&mut buffers).unwrap());
        }

        assert!(!source.next_frame(&mut buffers).unwrap());
    }

    #[test]
    fn bad_inputs() {
        assert!(create_source("synthetic://many").is_err());
        assert!(open_file("tcp://nowhere").is_err());
        assert!(open_file("/definitely/not/a/file.dmrec").is_err());
    }
}
