// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type.

use std::error::Error as StdError;
use std::fmt;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Segno.
#[derive(Debug)]
pub enum Error {
    /// An IO error occurred while reading or seeking the media source.
    IoError(std::io::Error),
    /// The media container could not be opened.
    ContainerOpen(&'static str),
    /// A codec parser or probe decoder could not be set up for a stream.
    ParserSetup(&'static str),
    /// The demuxer failed while reading a packet.
    DemuxRead(&'static str),
    /// A one-frame probe decode failed.
    DecodeProbe(&'static str),
    /// An IO error occurred while reading or writing the index file.
    IndexFileIo(std::io::Error),
    /// The index file contained malformed data.
    Malformed(&'static str),
    /// The index file was written by an incompatible layout version.
    VersionMismatch {
        /// The version recorded in the index file.
        found: u32,
        /// The version this build understands.
        expected: u32,
    },
    /// The scan was cancelled by the caller.
    Cancelled,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::IoError(ref err) => {
                write!(f, "io error: {}", err)
            }
            Error::ContainerOpen(msg) => {
                write!(f, "could not open container: {}", msg)
            }
            Error::ParserSetup(msg) => {
                write!(f, "parser setup failed: {}", msg)
            }
            Error::DemuxRead(msg) => {
                write!(f, "demux read failed: {}", msg)
            }
            Error::DecodeProbe(msg) => {
                write!(f, "probe decode failed: {}", msg)
            }
            Error::IndexFileIo(ref err) => {
                write!(f, "index file io error: {}", err)
            }
            Error::Malformed(msg) => {
                write!(f, "malformed index file: {}", msg)
            }
            Error::VersionMismatch { found, expected } => {
                write!(f, "index file version {} does not match expected version {}", found, expected)
            }
            Error::Cancelled => {
                write!(f, "cancelled by user")
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::IoError(ref err) => Some(err),
            Error::IndexFileIo(ref err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a container open error.
pub fn container_open_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::ContainerOpen(msg))
}

/// Convenience function to create a parser setup error.
pub fn parser_setup_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::ParserSetup(msg))
}

/// Convenience function to create a demux read error.
pub fn demux_read_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::DemuxRead(msg))
}

/// Convenience function to create a probe decode error.
pub fn decode_probe_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::DecodeProbe(msg))
}

/// Convenience function to create a malformed index file error.
pub fn malformed_error<T>(msg: &'static str) -> Result<T> {
    Err(Error::Malformed(msg))
}
