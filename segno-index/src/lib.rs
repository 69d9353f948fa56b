// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persistent frame indexing for media containers.
//!
//! Segno scans a media container once and emits a rich, self-describing index of every video and
//! audio packet — picture type, keyframe truth, parameter set generation, byte offset — from
//! which a frame-server can seek to any frame by number with correct decoding semantics: the
//! right keyframe, the right extra data, the right timestamp basis, and correct A/V alignment.
//!
//! The index persists next to the media as a versioned text file (`<path>.lwi`). Reopening a
//! file with a valid index skips the scan entirely: the reader rebuilds all in-memory state from
//! the file alone and re-runs the same classification a fresh scan would.
//!
//! Containers are reached through the contracts in [`segno_core`]: a [`Demuxer`] supplies
//! packets, a [`CodecSupport`] supplies codec parsers and probe decoders. The entry point is
//! [`construct_index`].
//!
//! [`Demuxer`]: segno_core::demux::Demuxer
//! [`CodecSupport`]: segno_core::demux::CodecSupport

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Segno crates. Please see the root manifest for their
// justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::manual_range_contains)]

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use log::{info, warn};

use segno_core::demux::{CodecSupport, ContainerProvider};
use segno_core::errors::{Error, Result};

pub mod ebdu;
pub mod extradata;
pub mod frame;
pub mod indexer;
pub mod lwi;
pub mod output;
pub mod probe;
pub mod pts;
pub mod seek;
pub mod stream;
pub mod sync;

#[cfg(test)]
mod testing;

pub use crate::stream::{AudioStreamIndex, MediaIndex, VideoStreamIndex};

/// Options accepted by the indexer orchestrator.
#[derive(Clone, Debug)]
pub struct IndexerOptions {
    /// The media file to index.
    pub file_path: PathBuf,
    /// Elect only the video stream named by `force_video_index` instead of the default election.
    pub force_video: bool,
    /// The video stream to elect when `force_video` is set. -1 disables video entirely.
    pub force_video_index: i32,
    /// Elect only the audio stream named by `force_audio_index` instead of the default election.
    pub force_audio: bool,
    /// The audio stream to elect when `force_audio` is set. -1 disables audio entirely.
    pub force_audio_index: i32,
    /// Compute the A/V gap between the elected streams. Default: `true`.
    pub av_sync: bool,
    /// The decoder thread count recorded for reopening. Default: `0` (automatic).
    pub threads: u32,
    /// Scan without writing an index file. Default: `false`.
    pub no_create_index: bool,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        IndexerOptions {
            file_path: PathBuf::new(),
            force_video: false,
            force_video_index: -1,
            force_audio: false,
            force_audio_index: -1,
            av_sync: true,
            threads: 0,
            no_create_index: false,
        }
    }
}

/// Progress reporting and cancellation for a scan.
///
/// Invoked between packets. Returning `true` cancels the scan; the indexer stops cleanly,
/// releases its resources, and makes no promise that an index file exists.
pub trait Progress {
    /// Report progress. `percent` is a best-effort estimate and may be 0 when the container
    /// duration is unknown.
    fn update(&mut self, message: &str, percent: i32) -> bool;
}

/// A `Progress` implementation that reports nothing and never cancels.
pub struct NoProgress;

impl Progress for NoProgress {
    fn update(&mut self, _message: &str, _percent: i32) -> bool {
        false
    }
}

/// Derive the index file path for a media path.
///
/// The index lives next to the media with an `.lwi` suffix appended. A path that already names
/// an index file is used as-is.
pub fn index_file_path(media_path: &Path) -> PathBuf {
    if media_path.extension().map_or(false, |ext| ext == lwi::INDEX_FILE_EXTENSION) {
        return media_path.to_path_buf();
    }
    let mut path = media_path.as_os_str().to_os_string();
    path.push(".");
    path.push(lwi::INDEX_FILE_EXTENSION);
    PathBuf::from(path)
}

/// Open or create the index for a media file.
///
/// If an index file exists, parses at the supported version, and still refers to an existing
/// media file, it is reused without touching the container; forced stream options are applied to
/// the parsed state and the active-stream markers re-patched in place when they elect different
/// streams than recorded. Otherwise the container is opened through `provider` and scanned once,
/// streaming a fresh index file unless the options say not to.
pub fn construct_index(
    opts: &IndexerOptions,
    provider: &dyn ContainerProvider,
    codecs: &dyn CodecSupport,
    progress: &mut dyn Progress,
) -> Result<MediaIndex> {
    let index_path = index_file_path(&opts.file_path);

    if let Ok(file) = File::open(&index_path) {
        match lwi::read_index(BufReader::new(file), opts) {
            Ok(parsed) => {
                if std::fs::metadata(&parsed.file_path).is_ok() {
                    let chosen_video = parsed.media.active_video_stream();
                    let chosen_audio = parsed.media.active_audio_stream();
                    if chosen_video != parsed.recorded_video_index
                        || chosen_audio != parsed.recorded_audio_index
                    {
                        // Different streams were elected this time; update the markers in place.
                        match OpenOptions::new().write(true).open(&index_path) {
                            Ok(file) => lwi::patch_active_streams(
                                file,
                                parsed.marker_pos,
                                chosen_video,
                                chosen_audio,
                            )?,
                            Err(err) => {
                                warn!("could not re-patch active streams: {}", err);
                            }
                        }
                    }
                    info!("reusing index file {}", index_path.display());
                    return Ok(parsed.media);
                }
                warn!(
                    "indexed media file {} no longer exists, re-creating the index",
                    parsed.file_path
                );
            }
            Err(err) => {
                warn!("index file {} is unusable ({}), re-creating", index_path.display(), err);
            }
        }
    }

    let mut demuxer = provider.open(&opts.file_path)?;

    let writer = if opts.no_create_index {
        None
    }
    else {
        let file = File::create(&index_path).map_err(Error::IndexFileIo)?;
        Some(lwi::IndexWriter::new(
            BufWriter::new(file),
            &opts.file_path.to_string_lossy(),
            demuxer.format_flags(),
            demuxer.format_name(),
        )?)
    };

    indexer::create_index(demuxer.as_mut(), codecs, opts, progress, writer)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use segno_core::codecs::well_known::CODEC_ID_H264;
    use segno_core::codecs::{CodecState, CodecType, PixelFormat};
    use segno_core::packet::{Packet, PacketFlags};

    use crate::testing::{FakeCodecSupport, FakeDemuxer, FakeProvider, FakeStream, PayloadTagParser};
    use crate::{construct_index, index_file_path, IndexerOptions, NoProgress};

    fn temp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("segno-tests");
        fs::create_dir_all(&dir).expect("temp directory");
        dir.join(format!("{}-{}", std::process::id(), name))
    }

    fn simple_demuxer() -> FakeDemuxer {
        let state = CodecState {
            codec_type: CodecType::Video,
            codec_id: CODEC_ID_H264,
            width: 640,
            height: 360,
            pixel_format: PixelFormat::Yuv420p,
            ..Default::default()
        };
        let mut demuxer = FakeDemuxer::new("matroska", vec![FakeStream::with_state(state)]);
        demuxer.push_packet(
            Packet::new(0, vec![b'I']).with_pts(0).with_dts(0).with_pos(0).with_flags(PacketFlags::KEY),
        );
        demuxer.push_packet(Packet::new(0, vec![b'P']).with_pts(40).with_dts(40).with_pos(100));
        demuxer
    }

    fn simple_support() -> FakeCodecSupport {
        let support = FakeCodecSupport::new();
        support.add_parser_factory(CODEC_ID_H264, || Box::new(PayloadTagParser));
        support
    }

    #[test]
    fn verify_index_file_path_derivation() {
        assert_eq!(index_file_path("dir/movie.mkv".as_ref()), PathBuf::from("dir/movie.mkv.lwi"));
        // A path already naming an index file is used as-is.
        assert_eq!(index_file_path("dir/movie.mkv.lwi".as_ref()), PathBuf::from("dir/movie.mkv.lwi"));
    }

    #[test]
    fn verify_create_then_reuse() {
        let media_path = temp_path("movie.mkv");
        fs::write(&media_path, b"not really media").expect("media file");
        let index_path = index_file_path(&media_path);
        let _ = fs::remove_file(&index_path);

        let opts = IndexerOptions { file_path: media_path.clone(), ..Default::default() };

        let provider = FakeProvider::new(simple_demuxer());
        let support = simple_support();
        let scanned = construct_index(&opts, &provider, &support, &mut NoProgress)
            .expect("initial scan succeeds");
        assert!(index_path.exists());

        // The provider is exhausted: a second run can only succeed by reusing the index file
        // without touching the container.
        let reused = construct_index(&opts, &provider, &support, &mut NoProgress)
            .expect("index file reused");
        assert_eq!(reused, scanned);

        let _ = fs::remove_file(&index_path);
        let _ = fs::remove_file(&media_path);
    }

    #[test]
    fn verify_corrupt_index_recreated() {
        let media_path = temp_path("broken.mkv");
        fs::write(&media_path, b"not really media").expect("media file");
        let index_path = index_file_path(&media_path);
        fs::write(&index_path, b"<LibavReaderIndexFile=8>\ngarbage\n").expect("corrupt index");

        let opts = IndexerOptions { file_path: media_path.clone(), ..Default::default() };

        let provider = FakeProvider::new(simple_demuxer());
        let support = simple_support();
        let media = construct_index(&opts, &provider, &support, &mut NoProgress)
            .expect("fallback to creation succeeds");
        assert!(media.video.is_some());

        // The rewritten index is valid now.
        let provider = FakeProvider::new(simple_demuxer());
        let reused = construct_index(&opts, &provider, &support, &mut NoProgress).unwrap();
        assert_eq!(reused, media);

        let _ = fs::remove_file(&index_path);
        let _ = fs::remove_file(&media_path);
    }

    #[test]
    fn verify_no_create_index_leaves_no_file() {
        let media_path = temp_path("transient.mkv");
        fs::write(&media_path, b"not really media").expect("media file");
        let index_path = index_file_path(&media_path);
        let _ = fs::remove_file(&index_path);

        let opts = IndexerOptions {
            file_path: media_path.clone(),
            no_create_index: true,
            ..Default::default()
        };

        let provider = FakeProvider::new(simple_demuxer());
        let support = simple_support();
        let media = construct_index(&opts, &provider, &support, &mut NoProgress).unwrap();
        assert!(media.video.is_some());
        assert!(!index_path.exists());

        let _ = fs::remove_file(&media_path);
    }
}
