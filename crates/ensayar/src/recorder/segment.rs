//! Video segment files.
//!
//! A recording session produces one or more segments in its directory. Each
//! segment is a standalone MJPEG-in-MP4 file whose frame dimensions are
//! locked by the first frame appended to it; a frame with different geometry
//! is rejected with [`EnsayarError::DimensionMismatch`], which is the signal
//! the encode worker uses to roll over to a fresh segment.

use crate::recorder::VideoFormat;
use crate::result::{EnsayarError, EnsayarResult};
use chrono::Local;
use image::DynamicImage;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Timestamp format for segment file names.
///
/// Millisecond precision: a rollover can open the next segment well under a
/// second after the previous one, and the two names must not collide.
const SEGMENT_TIMESTAMP: &str = "%d-%m-%Y_%H-%M-%S%.3f";

/// Writer for a single video segment.
///
/// The output file is created eagerly so the session directory always shows
/// the segment being recorded. Encoded frames are buffered and the container
/// is muxed once on [`close`](Self::close); a segment that never received a
/// frame still closes into a valid (empty) container.
#[derive(Debug)]
pub struct SegmentWriter {
    path: PathBuf,
    fps: u8,
    jpeg_quality: u8,
    dimensions: Option<(u32, u32)>,
    frames: Vec<Vec<u8>>,
}

impl SegmentWriter {
    /// Open a new segment in `dir`, named by the current timestamp.
    pub fn create(dir: &Path, format: VideoFormat, fps: u8, jpeg_quality: u8) -> EnsayarResult<Self> {
        let stamp = Local::now().format(SEGMENT_TIMESTAMP).to_string();
        let ext = format.extension();
        let mut path = dir.join(format!("{stamp}.{ext}"));
        let mut attempt = 1;
        while path.exists() {
            path = dir.join(format!("{stamp}_{attempt}.{ext}"));
            attempt += 1;
        }
        drop(fs::File::create(&path)?);
        Ok(Self {
            path,
            fps: fps.max(1),
            jpeg_quality,
            dimensions: None,
            frames: Vec::new(),
        })
    }

    /// Path of the segment file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of frames appended so far
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Dimensions the segment is locked to, once a frame has been appended
    #[must_use]
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    /// Append one frame.
    ///
    /// The first frame locks the segment dimensions; later frames must match
    /// exactly or the append fails with [`EnsayarError::DimensionMismatch`].
    pub fn append(&mut self, frame: &DynamicImage) -> EnsayarResult<()> {
        let size = (frame.width(), frame.height());
        match self.dimensions {
            None => self.dimensions = Some(size),
            Some(locked) if locked != size => {
                return Err(EnsayarError::DimensionMismatch {
                    expected_width: locked.0,
                    expected_height: locked.1,
                    actual_width: size.0,
                    actual_height: size.1,
                });
            }
            Some(_) => {}
        }

        let rgb = frame.to_rgb8();
        let mut encoded = Cursor::new(Vec::new());
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, self.jpeg_quality)
            .encode(
                rgb.as_raw(),
                size.0,
                size.1,
                image::ExtendedColorType::Rgb8,
            )
            .map_err(|e| EnsayarError::FrameEncoding {
                message: format!("JPEG encoding failed: {e}"),
            })?;
        self.frames.push(encoded.into_inner());
        Ok(())
    }

    /// Mux the buffered frames into the container and write the file.
    ///
    /// Consumes the writer; a segment is closed exactly once.
    pub fn close(self) -> EnsayarResult<PathBuf> {
        let bytes = self.mux();
        fs::write(&self.path, bytes)?;
        Ok(self.path)
    }

    /// Build the ISO BMFF byte stream: ftyp, mdat, then moov with the
    /// mvhd/trak sample-table hierarchy describing the MJPEG track.
    fn mux(&self) -> Vec<u8> {
        let mut out = Vec::new();

        write_box(&mut out, b"ftyp", |b| {
            b.extend_from_slice(b"isom");
            b.extend_from_slice(&512_u32.to_be_bytes());
            for brand in [b"isom", b"iso2", b"mp41"] {
                b.extend_from_slice(brand);
            }
        });

        // The stco chunk offset points at the mdat payload, which starts
        // right after the 8-byte mdat header.
        let mdat_payload_offset = (out.len() + 8) as u32;
        write_box(&mut out, b"mdat", |b| {
            for frame in &self.frames {
                b.extend_from_slice(frame);
            }
        });

        let (width, height) = self.dimensions.unwrap_or((0, 0));
        let timescale = u32::from(self.fps) * 100;
        let frame_ticks = timescale / u32::from(self.fps);
        let duration = self.frames.len() as u32 * frame_ticks;
        let matrix: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

        write_box(&mut out, b"moov", |moov| {
            write_box(moov, b"mvhd", |b| {
                b.extend_from_slice(&[0, 0, 0, 0]); // version + flags
                b.extend_from_slice(&0_u32.to_be_bytes()); // creation time
                b.extend_from_slice(&0_u32.to_be_bytes()); // modification time
                b.extend_from_slice(&timescale.to_be_bytes());
                b.extend_from_slice(&duration.to_be_bytes());
                b.extend_from_slice(&0x0001_0000_u32.to_be_bytes()); // rate 1.0
                b.extend_from_slice(&[0x01, 0x00]); // volume 1.0
                b.extend_from_slice(&[0_u8; 10]); // reserved
                for value in &matrix {
                    b.extend_from_slice(&value.to_be_bytes());
                }
                b.extend_from_slice(&[0_u8; 24]); // pre-defined
                b.extend_from_slice(&2_u32.to_be_bytes()); // next track id
            });
            write_box(moov, b"trak", |trak| {
                write_box(trak, b"tkhd", |b| {
                    b.extend_from_slice(&[0, 0, 0, 3]); // version + enabled flags
                    b.extend_from_slice(&0_u32.to_be_bytes()); // creation time
                    b.extend_from_slice(&0_u32.to_be_bytes()); // modification time
                    b.extend_from_slice(&1_u32.to_be_bytes()); // track id
                    b.extend_from_slice(&0_u32.to_be_bytes()); // reserved
                    b.extend_from_slice(&duration.to_be_bytes());
                    b.extend_from_slice(&[0_u8; 8]); // reserved
                    b.extend_from_slice(&0_u16.to_be_bytes()); // layer
                    b.extend_from_slice(&0_u16.to_be_bytes()); // alternate group
                    b.extend_from_slice(&0_u16.to_be_bytes()); // volume
                    b.extend_from_slice(&0_u16.to_be_bytes()); // reserved
                    for value in &matrix {
                        b.extend_from_slice(&value.to_be_bytes());
                    }
                    b.extend_from_slice(&(width << 16).to_be_bytes()); // fixed point
                    b.extend_from_slice(&(height << 16).to_be_bytes());
                });
                write_box(trak, b"mdia", |mdia| {
                    write_box(mdia, b"mdhd", |b| {
                        b.extend_from_slice(&[0, 0, 0, 0]);
                        b.extend_from_slice(&0_u32.to_be_bytes());
                        b.extend_from_slice(&0_u32.to_be_bytes());
                        b.extend_from_slice(&timescale.to_be_bytes());
                        b.extend_from_slice(&duration.to_be_bytes());
                        b.extend_from_slice(&0x55c4_u16.to_be_bytes()); // language: und
                        b.extend_from_slice(&0_u16.to_be_bytes()); // quality
                    });
                    write_box(mdia, b"hdlr", |b| {
                        b.extend_from_slice(&[0, 0, 0, 0]);
                        b.extend_from_slice(&0_u32.to_be_bytes());
                        b.extend_from_slice(b"vide");
                        b.extend_from_slice(&[0_u8; 12]);
                        b.extend_from_slice(b"Ensayar Video Handler\0");
                    });
                    write_box(mdia, b"minf", |minf| {
                        write_box(minf, b"vmhd", |b| {
                            b.extend_from_slice(&[0, 0, 0, 1]);
                            b.extend_from_slice(&0_u16.to_be_bytes()); // graphics mode
                            b.extend_from_slice(&[0_u8; 6]); // op color
                        });
                        write_box(minf, b"dinf", |dinf| {
                            write_box(dinf, b"dref", |b| {
                                b.extend_from_slice(&[0, 0, 0, 0]);
                                b.extend_from_slice(&1_u32.to_be_bytes()); // entry count
                                b.extend_from_slice(&12_u32.to_be_bytes()); // url entry size
                                b.extend_from_slice(b"url ");
                                b.extend_from_slice(&[0, 0, 0, 1]); // self-contained
                            });
                        });
                        write_box(minf, b"stbl", |stbl| {
                            self.write_sample_tables(stbl, width, height, frame_ticks, mdat_payload_offset);
                        });
                    });
                });
            });
        });

        out
    }

    fn write_sample_tables(
        &self,
        stbl: &mut Vec<u8>,
        width: u32,
        height: u32,
        frame_ticks: u32,
        mdat_payload_offset: u32,
    ) {
        let sample_count = self.frames.len() as u32;

        write_box(stbl, b"stsd", |b| {
            b.extend_from_slice(&[0, 0, 0, 0]);
            b.extend_from_slice(&1_u32.to_be_bytes()); // entry count
            write_box(b, b"jpeg", |entry| {
                entry.extend_from_slice(&[0_u8; 6]); // reserved
                entry.extend_from_slice(&1_u16.to_be_bytes()); // data reference index
                entry.extend_from_slice(&0_u16.to_be_bytes()); // pre-defined
                entry.extend_from_slice(&0_u16.to_be_bytes()); // reserved
                entry.extend_from_slice(&[0_u8; 12]); // pre-defined
                entry.extend_from_slice(&(width as u16).to_be_bytes());
                entry.extend_from_slice(&(height as u16).to_be_bytes());
                entry.extend_from_slice(&0x0048_0000_u32.to_be_bytes()); // 72 dpi
                entry.extend_from_slice(&0x0048_0000_u32.to_be_bytes());
                entry.extend_from_slice(&0_u32.to_be_bytes()); // reserved
                entry.extend_from_slice(&1_u16.to_be_bytes()); // frame count per sample
                let mut compressor = [0_u8; 32];
                let name = b"Ensayar MJPEG";
                compressor[0] = name.len() as u8;
                compressor[1..=name.len()].copy_from_slice(name);
                entry.extend_from_slice(&compressor);
                entry.extend_from_slice(&24_u16.to_be_bytes()); // depth
                entry.extend_from_slice(&(-1_i16).to_be_bytes()); // pre-defined
            });
        });

        write_box(stbl, b"stts", |b| {
            b.extend_from_slice(&[0, 0, 0, 0]);
            b.extend_from_slice(&1_u32.to_be_bytes());
            b.extend_from_slice(&sample_count.to_be_bytes());
            b.extend_from_slice(&frame_ticks.to_be_bytes());
        });

        write_box(stbl, b"stsc", |b| {
            b.extend_from_slice(&[0, 0, 0, 0]);
            b.extend_from_slice(&1_u32.to_be_bytes());
            b.extend_from_slice(&1_u32.to_be_bytes()); // first chunk
            b.extend_from_slice(&sample_count.to_be_bytes()); // all samples in one chunk
            b.extend_from_slice(&1_u32.to_be_bytes()); // sample description index
        });

        write_box(stbl, b"stsz", |b| {
            b.extend_from_slice(&[0, 0, 0, 0]);
            b.extend_from_slice(&0_u32.to_be_bytes()); // variable sizes
            b.extend_from_slice(&sample_count.to_be_bytes());
            for frame in &self.frames {
                b.extend_from_slice(&(frame.len() as u32).to_be_bytes());
            }
        });

        write_box(stbl, b"stco", |b| {
            b.extend_from_slice(&[0, 0, 0, 0]);
            b.extend_from_slice(&1_u32.to_be_bytes());
            b.extend_from_slice(&mdat_payload_offset.to_be_bytes());
        });
    }
}

/// Write one box: 4-byte big-endian size, 4-byte type, then the body built
/// by `body`. The size is patched in after the body is known.
fn write_box(out: &mut Vec<u8>, kind: &[u8; 4], body: impl FnOnce(&mut Vec<u8>)) {
    let start = out.len();
    out.extend_from_slice(&[0_u8; 4]);
    out.extend_from_slice(kind);
    body(out);
    let size = (out.len() - start) as u32;
    out[start..start + 4].copy_from_slice(&size.to_be_bytes());
}
