//! CH3600 gaussmeter framing over any byte stream (serial port, socket,
//! replay file).

use std::io::{BufRead, Write};
use std::sync::OnceLock;

use nalgebra::Vector3;
use regex::Regex;

use crate::device::{FieldProbe, ProbeReading};
use crate::error::{MagError, MagResult};

/// Request continuous data output
const START_COMMAND: &[u8] = b"DATA?>";

fn frame_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        let channel = r"([-+]?\d*\.?\d+)/.*?([-+]?\d+)";
        Regex::new(&format!("#{channel};{channel};{channel}>")).expect("static frame pattern")
    })
}

/// Parse one frame such as `#00000.0097/000/+0256;-00000.0003/000/+0256;...>`.
///
/// Temperatures arrive in tenths of a degree.
pub fn parse_frame(line: &str) -> Option<ProbeReading> {
    let caps = frame_pattern().captures(line)?;
    let mut numbers = [0.0; 6];
    for (i, n) in numbers.iter_mut().enumerate() {
        *n = caps.get(i + 1)?.as_str().parse().ok()?;
    }
    Some(ProbeReading {
        field: Vector3::new(numbers[0], numbers[2], numbers[4]),
        temperature: Vector3::new(numbers[1], numbers[3], numbers[5]) / 10.0,
    })
}

/// A gaussmeter streaming one frame per line
pub struct FrameProbe<S> {
    stream: S,
    /// Consecutive unparseable lines tolerated before giving up
    pub max_bad_frames: usize,
}

impl<S: BufRead + Write> FrameProbe<S> {
    /// Wrap `stream` and ask the meter to start streaming
    pub fn open(mut stream: S) -> MagResult<Self> {
        stream.write_all(START_COMMAND)?;
        stream.flush()?;
        Ok(Self {
            stream,
            max_bad_frames: 10,
        })
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S: BufRead + Write> FieldProbe for FrameProbe<S> {
    /// Drop everything buffered so far, then the rest of the line it ends in
    fn discard_stale(&mut self) -> MagResult<()> {
        let buffered = self.stream.fill_buf()?.len();
        self.stream.consume(buffered);
        let mut partial = Vec::new();
        self.stream.read_until(b'\n', &mut partial)?;
        Ok(())
    }

    fn read_once(&mut self) -> MagResult<ProbeReading> {
        let mut last = String::new();
        for _ in 0..=self.max_bad_frames {
            last.clear();
            if self.stream.read_line(&mut last)? == 0 {
                return Err(MagError::Device("probe stream closed".to_string()));
            }
            if let Some(reading) = parse_frame(&last) {
                return Ok(reading);
            }
            tracing::warn!("Invalid message received: {:?}", last.trim_end());
        }
        Err(MagError::ProbeFrame {
            attempts: self.max_bad_frames + 1,
            last: last.trim_end().to_string(),
        })
    }
}
