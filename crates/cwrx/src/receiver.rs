//! Full receiver chain

#[cfg(not(test))]
use log::{trace, warn};

#[cfg(test)]
use std::println as trace;
#[cfg(test)]
use std::println as warn;

use std::convert::From;
use std::iter::{IntoIterator, Iterator};

use arrayvec::ArrayVec;
use thiserror::Error;

use crate::builder::CwReceiverBuilder;
use crate::decoder::MorseDecoder;
use crate::keying::{KeyDetector, KeyEvent};
use crate::output::{CwReceiverEvent, DecodedOutput, SignalState, Telemetry};
use crate::tracker::{FrequencyLock, FrequencyTracker, LockChange};
use crate::turns::{ConversationTurn, TurnTracker};

/// Maximum events reported for one block
pub const MAX_BLOCK_EVENTS: usize = 16;

/// Events reported for one block
pub type BlockEvents = ArrayVec<CwReceiverEvent, MAX_BLOCK_EVENTS>;

/// One block of mono audio
///
/// `samples` must hold exactly one receiver
/// [block](CwReceiver::block_size), sampled at `sample_rate`.
/// `start_time` is the time of the first sample, in seconds,
/// on any clock you like. Start times must increase from
/// block to block.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AudioBlock<'a> {
    pub samples: &'a [f32],
    pub start_time: f64,
    pub sample_rate: u32,
}

impl<'a> AudioBlock<'a> {
    /// Wrap a block of samples
    pub fn new(samples: &'a [f32], start_time: f64, sample_rate: u32) -> Self {
        Self {
            samples,
            start_time,
            sample_rate,
        }
    }

    /// Duration of the block (s)
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / f64::max(self.sample_rate as f64, 1.0)
    }
}

/// A block which the receiver cannot accept
///
/// Rejected blocks leave the receiver unchanged.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum BlockError {
    /// Block holds the wrong number of samples
    #[error("block has {actual} samples, but the receiver needs {expected}")]
    WrongBlockSize { expected: usize, actual: usize },

    /// Block was sampled at the wrong rate
    #[error("block is sampled at {actual} Hz, but the receiver runs at {expected} Hz")]
    SampleRateMismatch { expected: u32, actual: u32 },

    /// Block starts no later than its predecessor
    #[error("block starts at {current} s, which is not after the previous block at {previous} s")]
    NonMonotonicTime { previous: f64, current: f64 },
}

/// A complete CW receiver chain
///
/// The receive chain takes blocks of `f32` audio samples and
/// performs the following operations:
///
/// 1. Tone magnitude estimation, by Goertzel filter, at one
///    fixed frequency or at every candidate frequency of a
///    scanning range.
/// 2. Frequency tracking, which locks to the strongest
///    persistent tone.
/// 3. Key detection, which turns the magnitude of the locked
///    tone into key-down and key-up events.
/// 4. Morse decoding, with adaptive speed estimation.
/// 5. Conversation tracking, which groups decoded text into
///    turns.
///
/// To create the receiver, first create its Builder:
///
/// ```
/// use cwrx::CwReceiverBuilder;
///
/// let mut builder = CwReceiverBuilder::default();
/// let receiver = builder.build();
/// assert_eq!(receiver.input_rate(), 8000);
/// assert_eq!(receiver.block_size(), 80);
/// ```
///
/// See [module documentation](index.html) for details.
#[derive(Clone, Debug)]
pub struct CwReceiver {
    tracker: FrequencyTracker,
    detector: KeyDetector,
    decoder: MorseDecoder,
    turns: TurnTracker,
    input_rate: u32,
    block_size: usize,
    calibration_blocks: u32,
    block_counter: u64,
    input_sample_counter: u64,
    last_time: Option<f64>,
    clock: f64,
    buffer: Vec<f32>,
}

impl CwReceiver {
    /// Process one block of audio
    ///
    /// Returns every event which the block caused, in time
    /// order. The block must match the receiver's
    /// [block size](#method.block_size) and
    /// [input rate](#method.input_rate), and it must start
    /// after the previous block. Otherwise, it is rejected
    /// with an error and the receiver is left unchanged.
    pub fn process(&mut self, block: &AudioBlock) -> Result<BlockEvents, BlockError> {
        if block.samples.len() != self.block_size {
            return Err(BlockError::WrongBlockSize {
                expected: self.block_size,
                actual: block.samples.len(),
            });
        }
        if block.sample_rate != self.input_rate {
            return Err(BlockError::SampleRateMismatch {
                expected: self.input_rate,
                actual: block.sample_rate,
            });
        }
        if let Some(previous) = self.last_time {
            if !(block.start_time > previous) {
                return Err(BlockError::NonMonotonicTime {
                    previous,
                    current: block.start_time,
                });
            }
        }

        let start = block.start_time;
        let end = start + block.duration();
        let midpoint = start + 0.5 * block.duration();
        let calibrating = self.block_counter < self.calibration_blocks as u64;

        let mut out = BlockEvents::new();
        let tracked = self.tracker.input(block.samples, start, calibrating);
        match tracked.change {
            Some(LockChange::Acquired { lock, floor, peak }) => {
                self.detector.seed(floor, peak);
                emit(&mut out, CwReceiverEvent::new(SignalState::Locked(lock), midpoint));
            }
            Some(LockChange::Dropped) => {
                if let Some(key) = self.detector.release(midpoint) {
                    self.handle_key(key, &mut out);
                }
                emit(&mut out, CwReceiverEvent::new(SignalState::Unlocked, midpoint));
            }
            None => {
                if let Some(magnitude) = tracked.magnitude {
                    if let Some(key) = self.detector.input(magnitude, start) {
                        self.handle_key(key, &mut out);
                    }
                }
            }
        }

        for decoded in self.decoder.poll(end) {
            self.handle_decoded(decoded, end, &mut out);
        }
        if let Some(turn) = self.turns.tick(end) {
            emit(&mut out, CwReceiverEvent::new(turn, end));
        }

        self.block_counter += 1;
        self.input_sample_counter += block.samples.len() as u64;
        self.last_time = Some(start);
        self.clock = end;

        let blocks_per_second = u64::max(self.input_rate as u64 / self.block_size as u64, 1);
        if self.block_counter % blocks_per_second == 0 {
            trace!("receiver [{:>10.3}]: {}", end, self.telemetry());
        }

        Ok(out)
    }

    /// Receive CW from a source of audio
    ///
    /// Bind an iterator which will consume the `input` and
    /// produce [`CwReceiverEvent`]s. The `input` must be f32
    /// PCM mono audio at the [`input_rate()`](#method.input_rate)
    /// for this receiver, scaled to about `[-1.0, 1.0]`.
    ///
    /// Samples are gathered into blocks. Each block starts where
    /// the last processed block ended, so the iterator continues
    /// the clock of any blocks given to
    /// [`process()`](#method.process). A fresh receiver starts
    /// at zero. A partial block is kept until more samples
    /// arrive or until [`flush()`](#method.flush).
    ///
    /// The iterator will consume as many samples of `input`
    /// as are required to produce the next event. It will
    /// return `None` if the input is exhausted and there are
    /// no new events.
    #[must_use = "iterators are lazy and do nothing unless consumed"]
    pub fn iter<'rx, I, T>(&'rx mut self, input: I) -> SourceIter<'rx, T>
    where
        I: IntoIterator<Item = f32> + IntoIterator<IntoIter = T>,
        T: Iterator<Item = f32>,
    {
        SourceIter {
            source: input.into_iter(),
            receiver: self,
            queue: BlockEvents::new(),
        }
    }

    /// Flush the receiver at the end of the input
    ///
    /// Processes any partial block, padded with silence,
    /// releases the key, emits the pending character, and
    /// closes the open conversation turn. Call this when the
    /// audio source is exhausted.
    pub fn flush(&mut self) -> Vec<CwReceiverEvent> {
        let mut out = vec![];

        if !self.buffer.is_empty() {
            let mut samples = std::mem::take(&mut self.buffer);
            samples.resize(self.block_size, 0.0f32);
            let block = AudioBlock::new(&samples, self.clock, self.input_rate);
            match self.process(&block) {
                Ok(evts) => out.extend(evts),
                Err(err) => warn!("receiver: discarding partial block: {}", err),
            }
            samples.clear();
            self.buffer = samples;
        }

        let now = self.clock;
        let mut evts = BlockEvents::new();
        if let Some(key) = self.detector.release(now) {
            self.handle_key(key, &mut evts);
        }
        for decoded in self.decoder.flush() {
            self.handle_decoded(decoded, now, &mut evts);
        }
        out.extend(evts);

        if let Some(turn) = self.turns.close() {
            out.push(CwReceiverEvent::new(turn, now));
        }
        out
    }

    /// Clear all signal and decoding state
    ///
    /// The receiver drops its lock, forgets its noise levels,
    /// discards any pending character, and calibrates again.
    /// The sample counter and the block clock start over.
    ///
    /// An open conversation turn is closed, kept in the
    /// [history](#method.turns), and returned.
    pub fn reset(&mut self) -> Option<ConversationTurn> {
        self.tracker.reset();
        self.detector.reset();
        self.decoder.reset();
        let closed = self.turns.close();
        self.block_counter = 0;
        self.input_sample_counter = 0;
        self.last_time = None;
        self.clock = 0.0;
        self.buffer.clear();
        closed
    }

    /// Snapshot of the receiver status
    pub fn telemetry(&self) -> Telemetry {
        let lock = self.tracker.lock();
        Telemetry {
            locked: lock.locked,
            frequency: lock.active_frequency(),
            confidence: if lock.locked { lock.confidence } else { 0.0 },
            wpm: self.decoder.wpm(),
            calibrating: self.block_counter < self.calibration_blocks as u64,
            key_down: self.detector.is_key_down(),
        }
    }

    /// Closed conversation turns, oldest first
    pub fn turns(&self) -> &[ConversationTurn] {
        self.turns.history()
    }

    /// The open conversation turn, if any
    pub fn current_turn(&self) -> Option<&ConversationTurn> {
        self.turns.current()
    }

    /// Frequency lock state
    pub fn lock(&self) -> &FrequencyLock {
        self.tracker.lock()
    }

    /// Input sampling rate
    ///
    /// Returns sampling rate expected by the
    /// [`process()`](#method.process) method.
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Block size (samples)
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Lifetime total input sample counter
    ///
    /// Reports the lifetime total of input samples which
    /// have been processed in complete blocks.
    pub fn input_sample_counter(&self) -> u64 {
        self.input_sample_counter
    }

    // gather one sample; process a block once it is full
    fn push_sample(&mut self, sample: f32) -> Option<Result<BlockEvents, BlockError>> {
        self.buffer.push(sample);
        if self.buffer.len() < self.block_size {
            return None;
        }

        let samples = std::mem::take(&mut self.buffer);
        let res = self.process(&AudioBlock::new(&samples, self.clock, self.input_rate));

        let mut samples = samples;
        samples.clear();
        self.buffer = samples;
        Some(res)
    }

    fn handle_key(&mut self, key: KeyEvent, out: &mut BlockEvents) {
        let state = if key.key_down {
            SignalState::KeyDown
        } else {
            SignalState::KeyUp
        };
        emit(out, CwReceiverEvent::new(state, key.time));

        for decoded in self.decoder.input(key) {
            self.handle_decoded(decoded, key.time, out);
        }
    }

    fn handle_decoded(&mut self, decoded: DecodedOutput, time: f64, out: &mut BlockEvents) {
        let frequency = self.tracker.lock().active_frequency();
        let closed = self.turns.push(&decoded, time, frequency);
        emit(out, CwReceiverEvent::new(decoded, time));
        if let Some(turn) = closed {
            emit(out, CwReceiverEvent::new(turn, time));
        }
    }
}

impl From<&CwReceiverBuilder> for CwReceiver {
    fn from(cfg: &CwReceiverBuilder) -> Self {
        let (on_ratio, off_ratio) = cfg.key_ratios();
        Self {
            tracker: FrequencyTracker::new(
                cfg.tracking_mode(),
                cfg.input_rate(),
                cfg.block_size(),
                on_ratio,
                cfg.lock_acquire_blocks(),
                cfg.lock_timeout(),
            ),
            detector: KeyDetector::new(
                on_ratio,
                off_ratio,
                cfg.confirm_blocks(),
                cfg.calibration_blocks(),
                cfg.debounce(),
                cfg.fast_drop(),
                cfg.block_duration(),
            ),
            decoder: MorseDecoder::new(cfg.speed_mode(), cfg.decoder_timing()),
            turns: TurnTracker::new(
                cfg.turn_prosigns(),
                cfg.turn_tolerance(),
                cfg.turn_idle_timeout(),
                cfg.first_speaker(),
            ),
            input_rate: cfg.input_rate(),
            block_size: cfg.block_size(),
            calibration_blocks: cfg.calibration_blocks(),
            block_counter: 0,
            input_sample_counter: 0,
            last_time: None,
            clock: 0.0,
            buffer: Vec::with_capacity(cfg.block_size()),
        }
    }
}

/// Sample source iterator
///
/// This iterator is bound to a source of mono f32 PCM
/// audio samples. Calling the `next()` method will
/// return the next [`CwReceiverEvent`] from the receiver
/// or `None` if the available samples have been consumed
/// without any new events.
///
/// # Panics
///
/// If the receiver rejects a block it assembled itself. Blocks
/// are always assembled at the receiver's own block size, rate,
/// and clock, so this indicates a bug.
#[derive(Debug)]
pub struct SourceIter<'rx, I>
where
    I: Iterator<Item = f32>,
{
    source: I,
    receiver: &'rx mut CwReceiver,
    queue: BlockEvents,
}

impl<'rx, I> Iterator for SourceIter<'rx, I>
where
    I: Iterator<Item = f32>,
{
    type Item = CwReceiverEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.queue.is_empty() {
                return Some(self.queue.remove(0));
            }

            let sa = self.source.next()?;
            match self.receiver.push_sample(sa) {
                Some(Ok(evts)) => self.queue = evts,
                Some(Err(err)) => panic!("receiver: rejected its own block: {}", err),
                None => continue,
            }
        }
    }
}

// append an event, dropping it if the block is full
fn emit(out: &mut BlockEvents, evt: CwReceiverEvent) {
    if let Err(err) = out.try_push(evt) {
        warn!("receiver: too many events in one block: {}", err.element());
    }
}
