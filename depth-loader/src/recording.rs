//! `.dmrec` depth recordings.
//!
//! The format is a small header followed by a sequence of frames, all little-endian:
//!
//! ```text
//! "DMRC" | version: u32 | width: u32 | height: u32
//! frame: flags: u8 | depth: [u16; width * height]? | body: [u8; width * height]?
//! ```
//!
//! Bit 0 of `flags` marks a depth payload, bit 1 a body-index payload. A tick on which the
//! sensor delivered neither is stored as a lone zero flag byte.

use crate::{FrameBuffers, FrameSource};
use anyhow::{bail, ensure, Result};
use log::*;
use std::io::{ErrorKind, Read, Write};

const MAGIC: &[u8; 4] = b"DMRC";
const VERSION: u32 = 1;

const HAS_DEPTH: u8 = 1 << 0;
const HAS_BODY: u8 = 1 << 1;

/// Upper bound on frame size, to reject garbage headers before allocating.
const MAX_PIXELS: usize = 4096 * 4096;

/// Reader of `.dmrec` streams.
pub struct RecordingReader<R> {
    reader: R,
    width: usize,
    height: usize,
}

impl<R: Read> RecordingReader<R> {
    /// Parse the stream header.
    pub fn new(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        ensure!(&magic == MAGIC, "not a depth recording");

        let version = read_u32(&mut reader)?;
        ensure!(version == VERSION, "unsupported recording version {}", version);

        let width = read_u32(&mut reader)? as usize;
        let height = read_u32(&mut reader)? as usize;
        ensure!(
            width > 0 && height > 0 && width * height <= MAX_PIXELS,
            "invalid recording dimensions {}x{}",
            width,
            height
        );

        debug!("Recording header: v{} {}x{}", version, width, height);

        Ok(Self {
            reader,
            width,
            height,
        })
    }
}

impl<R: Read> FrameSource for RecordingReader<R> {
    fn dim(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn next_frame(&mut self, frames: &mut FrameBuffers) -> Result<bool> {
        ensure!(
            frames.dim() == self.dim(),
            "frame buffers are {:?}, recording is {:?}",
            frames.dim(),
            self.dim()
        );

        let mut flags = [0u8; 1];

        // End of stream is only valid on a frame boundary.
        match self.reader.read_exact(&mut flags) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        let flags = flags[0];

        if flags & !(HAS_DEPTH | HAS_BODY) != 0 {
            bail!("invalid frame flags {:#04x}", flags);
        }

        frames.has_depth = flags & HAS_DEPTH != 0;
        frames.has_body = flags & HAS_BODY != 0;

        if frames.has_depth {
            self.reader
                .read_exact(bytemuck::cast_slice_mut(&mut frames.depth[..]))?;
            frames.depth.iter_mut().for_each(|d| *d = u16::from_le(*d));
        }

        if frames.has_body {
            self.reader.read_exact(&mut frames.body)?;
        }

        Ok(true)
    }
}

/// Writer of `.dmrec` streams.
pub struct RecordingWriter<W: Write> {
    writer: W,
    width: usize,
    height: usize,
    scratch: Vec<u16>,
}

impl<W: Write> RecordingWriter<W> {
    /// Write the stream header.
    ///
    /// # Arguments
    ///
    /// * `writer` - output stream.
    /// * `width` - width of the frames.
    /// * `height` - height of the frames.
    pub fn new(mut writer: W, width: usize, height: usize) -> Result<Self> {
        ensure!(
            width > 0 && height > 0 && width * height <= MAX_PIXELS,
            "invalid recording dimensions {}x{}",
            width,
            height
        );

        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&(width as u32).to_le_bytes())?;
        writer.write_all(&(height as u32).to_le_bytes())?;

        Ok(Self {
            writer,
            width,
            height,
            scratch: vec![],
        })
    }

    /// Append a single tick.
    pub fn write_frame(&mut self, depth: Option<&[u16]>, body: Option<&[u8]>) -> Result<()> {
        let pixels = self.width * self.height;

        for len in depth.map(<[u16]>::len).into_iter().chain(body.map(<[u8]>::len)) {
            ensure!(len == pixels, "frame has {} pixels, expected {}", len, pixels);
        }

        let mut flags = 0;

        if depth.is_some() {
            flags |= HAS_DEPTH;
        }

        if body.is_some() {
            flags |= HAS_BODY;
        }

        self.writer.write_all(&[flags])?;

        if let Some(depth) = depth {
            self.scratch.clear();
            self.scratch.extend(depth.iter().map(|d| d.to_le()));
            self.writer.write_all(bytemuck::cast_slice(&self.scratch))?;
        }

        if let Some(body) = body {
            self.writer.write_all(body)?;
        }

        Ok(())
    }

    /// Append the frames held in `frames`.
    pub fn write_buffers(&mut self, frames: &FrameBuffers) -> Result<()> {
        self.write_frame(
            frames.has_depth.then(|| &frames.depth[..]),
            frames.has_body.then(|| &frames.body[..]),
        )
    }

    /// Flush and return the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut buf = [0u8; std::mem::size_of::<u32>()];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn record() -> Vec<u8> {
        let mut writer = RecordingWriter::new(vec![], 3, 2).unwrap();

        writer
            .write_frame(Some(&[1, 2, 3, 4, 5, 0xbeef][..]), Some(&[0, 0, 1, 1, 255, 255][..]))
            .unwrap();
        writer.write_frame(None, Some(&[2; 6][..])).unwrap();
        writer.write_frame(None, None).unwrap();

        writer.finish().unwrap()
    }

    #[test]
    fn layout() {
        let data = record();

        assert_eq!(&data[..4], b"DMRC");
        assert_eq!(&data[4..8], &1u32.to_le_bytes());
        assert_eq!(&data[8..12], &3u32.to_le_bytes());
        assert_eq!(&data[12..16], &2u32.to_le_bytes());
        assert_eq!(data[16], HAS_DEPTH | HAS_BODY);
        assert_eq!(&data[17..19], &[1, 0]);
        assert_eq!(&data[27..29], &[0xef, 0xbe]);
        assert_eq!(data.len(), 16 + (1 + 12 + 6) + (1 + 6) + 1);
    }

    #[test]
    fn replay() {
        let mut reader = RecordingReader::new(Cursor::new(record())).unwrap();
        let mut frames = FrameBuffers::new(3, 2);

        assert_eq!(reader.dim(), (3, 2));

        assert!(reader.next_frame(&mut frames).unwrap());
        assert_eq!(frames.depth, vec![1, 2, 3, 4, 5, 0xbeef]);
        assert_eq!(frames.body, vec![0, 0, 1, 1, 255, 255]);
        assert!(frames.has_depth && frames.has_body);

        assert!(reader.next_frame(&mut frames).unwrap());
        assert!(!frames.has_depth);
        assert_eq!(frames.body, vec![2; 6]);

        assert!(reader.next_frame(&mut frames).unwrap());
        assert!(frames.depth_frame().unwrap().is_none());
        assert!(frames.body_frame().unwrap().is_none());

        assert!(!reader.next_frame(&mut frames).unwrap());
    }

    #[test]
    fn truncated_frame_is_error() {
        let mut data = record();
        data.truncate(16 + 5);

        let mut reader = RecordingReader::new(Cursor::new(data)).unwrap();
        let mut frames = FrameBuffers::new(3, 2);

        assert!(reader.next_frame(&mut frames).is_err());
    }

    #[test]
    fn bad_headers() {
        assert!(RecordingReader::new(Cursor::new(b"NOPE".to_vec())).is_err());

        let mut data = record();
        data[4] = 2;
        assert!(RecordingReader::new(Cursor::new(data)).is_err());

        let mut data = record();
        data[8..12].copy_from_slice(&0u32.to_le_bytes());
        assert!(RecordingReader::new(Cursor::new(data)).is_err());

        let mut data = record();
        data[16] = 0x80;
        let mut reader = RecordingReader::new(Cursor::new(data)).unwrap();
        assert!(reader.next_frame(&mut FrameBuffers::new(3, 2)).is_err());
    }

    #[test]
    fn size_checks() {
        let mut writer = RecordingWriter::new(vec![], 3, 2).unwrap();
        assert!(writer.write_frame(Some(&[0; 5][..]), None).is_err());
        assert!(writer.write_frame(None, Some(&[0; 7][..])).is_err());
        assert!(RecordingWriter::new(vec![], 0, 2).is_err());

        let mut reader = RecordingReader::new(Cursor::new(record())).unwrap();
        assert!(reader.next_frame(&mut FrameBuffers::new(2, 3)).is_err());
    }
}
