//! Episode tracking.
//!
//! A movement episode starts on the first frame with regions, keeps going
//! while regions keep appearing, and coasts through at most `tail_limit`
//! frames without regions before closing. Every frame of an open episode is
//! published under the episode's correlation id with a sequence number that
//! grows by one per published frame.

use uuid::Uuid;

/// Frames without detection an episode survives before it closes.
pub const TAIL_FRAME_LIMIT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpisodeState {
    Idle,
    InEpisode {
        correlation_id: Uuid,
        /// Sequence number of the last published frame
        sequence: u32,
        /// Consecutive frames without detection so far
        tail: u32,
    },
}

/// Identity of a published frame within its episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameSlot {
    pub correlation_id: Uuid,
    pub sequence_number: u32,
    /// Whether this frame had regions; tail frames carry no content.
    pub detected: bool,
}

impl FrameSlot {
    pub fn is_tail(&self) -> bool {
        !self.detected
    }
}

/// What to do with the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    Skip,
    Publish(FrameSlot),
}

/// Advance the episode state by one frame.
///
/// `new_id` is only called when an episode starts.
pub fn transition(
    state: EpisodeState,
    detected: bool,
    tail_limit: u32,
    new_id: impl FnOnce() -> Uuid,
) -> (EpisodeState, FrameDecision) {
    let (correlation_id, sequence, tail) = match state {
        EpisodeState::Idle if detected => (new_id(), 1, 0),
        EpisodeState::Idle => return (EpisodeState::Idle, FrameDecision::Skip),
        EpisodeState::InEpisode {
            correlation_id,
            sequence,
            ..
        } if detected => (correlation_id, sequence + 1, 0),
        EpisodeState::InEpisode {
            correlation_id,
            sequence,
            tail,
        } if tail < tail_limit => (correlation_id, sequence + 1, tail + 1),
        EpisodeState::InEpisode { .. } => return (EpisodeState::Idle, FrameDecision::Skip),
    };

    let slot = FrameSlot {
        correlation_id,
        sequence_number: sequence,
        detected,
    };
    let next = EpisodeState::InEpisode {
        correlation_id,
        sequence,
        tail,
    };
    (next, FrameDecision::Publish(slot))
}

/// Stateful wrapper around [`transition`] with random correlation ids.
#[derive(Debug)]
pub struct SequenceTracker {
    state: EpisodeState,
    tail_limit: u32,
}

impl SequenceTracker {
    pub fn new(tail_limit: u32) -> Self {
        Self {
            state: EpisodeState::Idle,
            tail_limit,
        }
    }

    pub fn advance(&mut self, detected: bool) -> FrameDecision {
        let previous = self.state;
        let (state, decision) = transition(previous, detected, self.tail_limit, Uuid::new_v4);
        match (previous, state) {
            (EpisodeState::Idle, EpisodeState::InEpisode { correlation_id, .. }) => {
                log::info!("Movement episode {} started", correlation_id);
            }
            (EpisodeState::InEpisode { correlation_id, sequence, .. }, EpisodeState::Idle) => {
                log::info!("Movement episode {} closed after {} frames", correlation_id, sequence);
            }
            _ => {}
        }
        self.state = state;
        decision
    }

    pub fn state(&self) -> EpisodeState {
        self.state
    }
}

impl Default for SequenceTracker {
    fn default() -> Self {
        Self::new(TAIL_FRAME_LIMIT)
    }
}
