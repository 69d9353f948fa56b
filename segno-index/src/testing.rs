// Segno
// Copyright (c) 2026 The Project Segno Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted collaborators for exercising the indexer without a real demuxer or codec library.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::rc::Rc;

use segno_core::codecs::{CodecState, PictureType};
use segno_core::demux::{
    CodecSupport, ContainerProvider, DecodeOutput, Demuxer, FormatFlags, FrameParser, IndexEntry,
    ParseInfo, ParserFlags, ProbeDecoder,
};
use segno_core::errors::{container_open_error, Result};
use segno_core::packet::Packet;
use segno_core::units::TimeBase;

/// One synthetic stream of a [`FakeDemuxer`].
pub(crate) struct FakeStream {
    pub state: CodecState,
    pub time_base: TimeBase,
    pub index_entries: Vec<IndexEntry>,
}

impl FakeStream {
    pub fn with_state(state: CodecState) -> Self {
        FakeStream { state, time_base: TimeBase::new(1, 1000), index_entries: Vec::new() }
    }

    pub fn with_time_base(mut self, time_base: TimeBase) -> Self {
        self.time_base = time_base;
        self
    }

    pub fn with_index_entries(mut self, entries: Vec<IndexEntry>) -> Self {
        self.index_entries = entries;
        self
    }
}

/// A demuxer that replays a scripted packet sequence.
pub(crate) struct FakeDemuxer {
    pub format_name: String,
    pub format_flags: FormatFlags,
    pub streams: Vec<FakeStream>,
    pub packets: VecDeque<Packet>,
}

impl FakeDemuxer {
    pub fn new(format_name: &str, streams: Vec<FakeStream>) -> Self {
        FakeDemuxer {
            format_name: format_name.to_string(),
            format_flags: FormatFlags::empty(),
            streams,
            packets: VecDeque::new(),
        }
    }

    pub fn push_packet(&mut self, pkt: Packet) {
        self.packets.push_back(pkt);
    }
}

impl Demuxer for FakeDemuxer {
    fn format_name(&self) -> &str {
        &self.format_name
    }

    fn format_flags(&self) -> FormatFlags {
        self.format_flags
    }

    fn stream_count(&self) -> usize {
        self.streams.len()
    }

    fn codec_state(&self, stream: usize) -> CodecState {
        self.streams[stream].state.clone()
    }

    fn time_base(&self, stream: usize) -> TimeBase {
        self.streams[stream].time_base
    }

    fn next_packet(&mut self) -> Result<Option<Packet>> {
        Ok(self.packets.pop_front())
    }

    fn index_entries(&self, stream: usize) -> &[IndexEntry] {
        &self.streams[stream].index_entries
    }
}

/// A parser that replays scripted parse results and records every payload it is fed.
pub(crate) struct ScriptedParser {
    results: VecDeque<ParseInfo>,
    split_result: Option<usize>,
    fed: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl ScriptedParser {
    pub fn new(results: Vec<ParseInfo>) -> Self {
        ScriptedParser { results: results.into(), split_result: None, fed: Rc::default() }
    }

    pub fn with_split_result(mut self, split_result: Option<usize>) -> Self {
        self.split_result = split_result;
        self
    }

    /// Get a shared handle onto the payload log.
    pub fn fed(&self) -> Rc<RefCell<Vec<Vec<u8>>>> {
        Rc::clone(&self.fed)
    }
}

impl FrameParser for ScriptedParser {
    fn parse(
        &mut self,
        _state: &CodecState,
        data: &[u8],
        _pts: Option<i64>,
        _dts: Option<i64>,
        _pos: i64,
    ) -> ParseInfo {
        self.fed.borrow_mut().push(data.to_vec());
        self.results.pop_front().unwrap_or_default()
    }

    fn split(&self, _state: &CodecState, _data: &[u8]) -> Option<usize> {
        self.split_result
    }
}

/// A parser deriving the picture type from the first payload byte: `b'I'`, `b'P'`, `b'B'`.
pub(crate) struct PayloadTagParser;

impl FrameParser for PayloadTagParser {
    fn parse(
        &mut self,
        _state: &CodecState,
        data: &[u8],
        _pts: Option<i64>,
        _dts: Option<i64>,
        _pos: i64,
    ) -> ParseInfo {
        let pict_type = match data.first() {
            Some(b'I') => PictureType::I,
            Some(b'P') => PictureType::P,
            Some(b'B') => PictureType::B,
            _ => PictureType::Unknown,
        };
        ParseInfo { pict_type, duration: 0 }
    }
}

/// An audio parser reporting a fixed frame duration.
pub(crate) struct FixedDurationParser {
    pub duration: u32,
}

impl FrameParser for FixedDurationParser {
    fn parse(
        &mut self,
        _state: &CodecState,
        _data: &[u8],
        _pts: Option<i64>,
        _dts: Option<i64>,
        _pos: i64,
    ) -> ParseInfo {
        ParseInfo { pict_type: PictureType::Unknown, duration: self.duration }
    }
}

/// A decoder that replays scripted outputs and records every payload it is fed.
pub(crate) struct ScriptedDecoder {
    outputs: VecDeque<DecodeOutput>,
    fed: Rc<RefCell<Vec<Option<Vec<u8>>>>>,
}

impl ScriptedDecoder {
    pub fn new(outputs: Vec<DecodeOutput>) -> Self {
        ScriptedDecoder { outputs: outputs.into(), fed: Rc::default() }
    }

    #[allow(dead_code)]
    pub fn fed(&self) -> Rc<RefCell<Vec<Option<Vec<u8>>>>> {
        Rc::clone(&self.fed)
    }
}

impl ProbeDecoder for ScriptedDecoder {
    fn decode(&mut self, data: Option<&[u8]>) -> Result<DecodeOutput> {
        self.fed.borrow_mut().push(data.map(|d| d.to_vec()));
        Ok(self.outputs.pop_front().unwrap_or_default())
    }
}

type ParserFactory = Box<dyn Fn() -> Box<dyn FrameParser>>;
type DecoderFactory = Box<dyn Fn() -> Box<dyn ProbeDecoder>>;

/// Codec support that hands out queued one-shot collaborators, falling back to factories.
#[derive(Default)]
pub(crate) struct FakeCodecSupport {
    queued_parsers: RefCell<HashMap<u32, VecDeque<Box<dyn FrameParser>>>>,
    queued_decoders: RefCell<HashMap<u32, VecDeque<Box<dyn ProbeDecoder>>>>,
    parser_factories: RefCell<HashMap<u32, ParserFactory>>,
    decoder_factories: RefCell<HashMap<u32, DecoderFactory>>,
}

impl FakeCodecSupport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_parser(&self, codec: segno_core::codecs::CodecId, parser: impl FrameParser + 'static) {
        self.queued_parsers
            .borrow_mut()
            .entry(codec.get())
            .or_default()
            .push_back(Box::new(parser));
    }

    pub fn add_decoder(
        &self,
        codec: segno_core::codecs::CodecId,
        decoder: impl ProbeDecoder + 'static,
    ) {
        self.queued_decoders
            .borrow_mut()
            .entry(codec.get())
            .or_default()
            .push_back(Box::new(decoder));
    }

    pub fn add_parser_factory(
        &self,
        codec: segno_core::codecs::CodecId,
        factory: impl Fn() -> Box<dyn FrameParser> + 'static,
    ) {
        self.parser_factories.borrow_mut().insert(codec.get(), Box::new(factory));
    }

    pub fn add_decoder_factory(
        &self,
        codec: segno_core::codecs::CodecId,
        factory: impl Fn() -> Box<dyn ProbeDecoder> + 'static,
    ) {
        self.decoder_factories.borrow_mut().insert(codec.get(), Box::new(factory));
    }
}

impl CodecSupport for FakeCodecSupport {
    fn new_parser(
        &self,
        codec: segno_core::codecs::CodecId,
        _flags: ParserFlags,
    ) -> Result<Option<Box<dyn FrameParser>>> {
        if let Some(parser) =
            self.queued_parsers.borrow_mut().get_mut(&codec.get()).and_then(|q| q.pop_front())
        {
            return Ok(Some(parser));
        }
        Ok(self.parser_factories.borrow().get(&codec.get()).map(|factory| factory()))
    }

    fn new_probe_decoder(
        &self,
        state: &CodecState,
        _threads: u32,
    ) -> Result<Option<Box<dyn ProbeDecoder>>> {
        let code = state.codec_id.get();
        if let Some(decoder) =
            self.queued_decoders.borrow_mut().get_mut(&code).and_then(|q| q.pop_front())
        {
            return Ok(Some(decoder));
        }
        Ok(self.decoder_factories.borrow().get(&code).map(|factory| factory()))
    }
}

/// A provider handing out a single pre-built demuxer, regardless of the path.
pub(crate) struct FakeProvider {
    demuxer: RefCell<Option<FakeDemuxer>>,
}

impl FakeProvider {
    pub fn new(demuxer: FakeDemuxer) -> Self {
        FakeProvider { demuxer: RefCell::new(Some(demuxer)) }
    }
}

impl ContainerProvider for FakeProvider {
    fn open(&self, _path: &Path) -> Result<Box<dyn Demuxer>> {
        match self.demuxer.borrow_mut().take() {
            Some(demuxer) => Ok(Box::new(demuxer)),
            None => container_open_error("fake provider already consumed"),
        }
    }
}
