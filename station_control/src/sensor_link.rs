//! Serial link to the scientific (sensor) board.
//!
//! Messages are framed as `<payload>`; bytes outside a frame are
//! discarded. Inbound payloads are either two whitespace-separated
//! milli-psi longs ("123456 123456") or the literal `calibrated`
//! acknowledgement. Outbound payloads are the two maintenance
//! commands, `cal` and `clear cal`, forwarded from the operator.
//!
//! The ADC sampling, median filtering, and calibration storage all
//! live on the other board; this side only ferries sentences.

use std::sync::Arc;
use std::time::Duration;

use station_common::SensorConfig;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tracing::{debug, info, warn};

use crate::pressure::PressureFeed;

const SENTENCE_START: u8 = b'<';
const SENTENCE_END: u8 = b'>';
const MAX_SENTENCE_LEN: usize = 64;

const RECALIBRATE_SENTENCE: &str = "cal";
const CLEAR_CALIBRATION_SENTENCE: &str = "clear cal";
const CALIBRATION_COMPLETE_SENTENCE: &str = "calibrated";

/// Maintenance requests forwarded to the sensor board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorCommand {
    Recalibrate,
    ClearCalibration,
}

impl SensorCommand {
    fn sentence(&self) -> &'static str {
        match self {
            Self::Recalibrate => RECALIBRATE_SENTENCE,
            Self::ClearCalibration => CLEAR_CALIBRATION_SENTENCE,
        }
    }
}

// ─── Sentence Framing ───────────────────────────────────────────────

/// Incremental `<...>` frame extractor.
///
/// Pure state machine over a byte stream; tested without any I/O.
#[derive(Debug, Default)]
pub struct SentenceReader {
    buf: Vec<u8>,
    in_sentence: bool,
}

impl SentenceReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, invoking `on_sentence` for every completed frame.
    pub fn push<F: FnMut(&str)>(&mut self, bytes: &[u8], mut on_sentence: F) {
        for &b in bytes {
            match b {
                SENTENCE_START => {
                    self.buf.clear();
                    self.in_sentence = true;
                }
                SENTENCE_END if self.in_sentence => {
                    self.in_sentence = false;
                    match std::str::from_utf8(&self.buf) {
                        Ok(s) => on_sentence(s),
                        Err(_) => warn!("non-UTF-8 sentence from sensor board"),
                    }
                    self.buf.clear();
                }
                _ if self.in_sentence => {
                    if self.buf.len() < MAX_SENTENCE_LEN {
                        self.buf.push(b);
                    } else {
                        // Oversized frame: drop it and resync on the
                        // next start marker.
                        warn!("sensor sentence too long, discarding");
                        self.in_sentence = false;
                        self.buf.clear();
                    }
                }
                _ => {} // noise outside a frame
            }
        }
    }
}

/// Wrap a payload in frame markers for transmission.
pub fn frame_sentence(payload: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    out.push(SENTENCE_START);
    out.extend_from_slice(payload.as_bytes());
    out.push(SENTENCE_END);
    out
}

// ─── Sentence Handling ──────────────────────────────────────────────

/// Outcome of one inbound sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentenceEvent {
    Pressure {
        transducer1_mpsi: i64,
        transducer2_mpsi: i64,
    },
    CalibrationComplete,
    Invalid,
}

/// Classify an inbound payload.
pub fn parse_sentence(payload: &str) -> SentenceEvent {
    if payload == CALIBRATION_COMPLETE_SENTENCE {
        return SentenceEvent::CalibrationComplete;
    }

    let mut parts = payload.split_whitespace();
    if let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) {
        if let (Ok(t1), Ok(t2)) = (a.parse::<i64>(), b.parse::<i64>()) {
            return SentenceEvent::Pressure {
                transducer1_mpsi: t1,
                transducer2_mpsi: t2,
            };
        }
    }

    SentenceEvent::Invalid
}

// ─── Link Task ──────────────────────────────────────────────────────

/// Run the sensor link over the configured serial device.
///
/// Reads pressure/calibration sentences into the shared feed and
/// writes maintenance commands as they arrive. Device errors log and
/// retry after a short pause; the control loop keeps running on the
/// last stored pressure throughout.
pub async fn run_sensor_link(
    config: SensorConfig,
    feed: Arc<PressureFeed>,
    mut commands: mpsc::Receiver<SensorCommand>,
) {
    let device = config.device;
    loop {
        // Raw 8N1 port; the default line discipline would hold `<...>`
        // frames (which carry no newline) in the kernel's canonical
        // buffer and echo outbound commands back into the reader.
        match tokio_serial::new(&device, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
        {
            Ok(mut port) => {
                info!(device, baud_rate = config.baud_rate, "sensor link open");
                let mut reader = SentenceReader::new();
                let mut chunk = [0u8; 256];

                loop {
                    tokio::select! {
                        read = port.read(&mut chunk) => match read {
                            Ok(0) => {
                                warn!(device, "sensor link closed by peer");
                                break;
                            }
                            Ok(n) => {
                                reader.push(&chunk[..n], |payload| {
                                    handle_sentence(payload, &feed);
                                });
                            }
                            Err(e) => {
                                warn!(device, error = %e, "sensor link read failed");
                                break;
                            }
                        },
                        cmd = commands.recv() => match cmd {
                            Some(cmd) => {
                                debug!(?cmd, "forwarding maintenance command");
                                if let Err(e) =
                                    port.write_all(&frame_sentence(cmd.sentence())).await
                                {
                                    warn!(device, error = %e, "sensor link write failed");
                                    break;
                                }
                            }
                            None => return, // command side shut down
                        },
                    }
                }
            }
            Err(e) => {
                warn!(device, error = %e, "sensor device open failed, retrying");
            }
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

fn handle_sentence(payload: &str, feed: &PressureFeed) {
    match parse_sentence(payload) {
        SentenceEvent::Pressure {
            transducer1_mpsi,
            transducer2_mpsi,
        } => feed.store(transducer1_mpsi, transducer2_mpsi),
        SentenceEvent::CalibrationComplete => info!("transducer calibration complete"),
        SentenceEvent::Invalid => warn!(payload, "invalid sentence from sensor board"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(reader: &mut SentenceReader, bytes: &[u8]) -> Vec<String> {
        let mut out = Vec::new();
        reader.push(bytes, |s| out.push(s.to_string()));
        out
    }

    #[test]
    fn extracts_framed_sentences() {
        let mut reader = SentenceReader::new();
        let got = collect(&mut reader, b"<123456 789012><calibrated>");
        assert_eq!(got, vec!["123456 789012", "calibrated"]);
    }

    #[test]
    fn ignores_noise_outside_frames() {
        let mut reader = SentenceReader::new();
        let got = collect(&mut reader, b"garbage<100 200>more garbage");
        assert_eq!(got, vec!["100 200"]);
    }

    #[test]
    fn reassembles_across_chunks() {
        let mut reader = SentenceReader::new();
        assert!(collect(&mut reader, b"<1234").is_empty());
        let got = collect(&mut reader, b"56 78>");
        assert_eq!(got, vec!["123456 78"]);
    }

    #[test]
    fn restart_marker_resets_frame() {
        let mut reader = SentenceReader::new();
        let got = collect(&mut reader, b"<partial<100 200>");
        assert_eq!(got, vec!["100 200"]);
    }

    #[test]
    fn oversized_frame_discarded() {
        let mut reader = SentenceReader::new();
        let long = vec![b'x'; 200];
        let mut bytes = vec![SENTENCE_START];
        bytes.extend_from_slice(&long);
        bytes.push(SENTENCE_END);
        bytes.extend_from_slice(b"<1 2>");
        let got = collect(&mut reader, &bytes);
        assert_eq!(got, vec!["1 2"]);
    }

    #[test]
    fn parse_pressure_sentence() {
        assert_eq!(
            parse_sentence("730500 741200"),
            SentenceEvent::Pressure {
                transducer1_mpsi: 730_500,
                transducer2_mpsi: 741_200,
            }
        );
        // Negative readings happen with a zeroed calibration offset.
        assert_eq!(
            parse_sentence("-150 20"),
            SentenceEvent::Pressure {
                transducer1_mpsi: -150,
                transducer2_mpsi: 20,
            }
        );
    }

    #[test]
    fn parse_calibration_ack() {
        assert_eq!(parse_sentence("calibrated"), SentenceEvent::CalibrationComplete);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(parse_sentence(""), SentenceEvent::Invalid);
        assert_eq!(parse_sentence("123456"), SentenceEvent::Invalid);
        assert_eq!(parse_sentence("a b"), SentenceEvent::Invalid);
        assert_eq!(parse_sentence("1 2 3"), SentenceEvent::Invalid);
    }

    #[test]
    fn frame_wraps_payload() {
        assert_eq!(frame_sentence("cal"), b"<cal>");
        assert_eq!(frame_sentence("clear cal"), b"<clear cal>");
    }
}
