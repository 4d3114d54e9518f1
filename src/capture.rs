//! Microphone block processing
//!
//! Each 4096-frame block from the microphone is checked for barge-in energy
//! while the assistant speaks, then resampled to 16 kHz PCM16 and streamed.
//! The uplink keeps flowing during speech so the remote side can do its own
//! interruption detection.

use crate::codec::{encode_audio_block, rms};
use crate::controller::TurnController;
use crate::gateway::RealtimeSender;
use crate::turn_fsm::{AssistantState, Event};
use std::sync::Arc;
use tracing::info;

/// Frames per microphone block
pub const CAPTURE_BLOCK_FRAMES: usize = 4096;
/// RMS above which the user is considered to be talking over the assistant
pub const DEFAULT_BARGE_IN_THRESHOLD: f32 = 0.02;

/// Callback invoked for every captured block
pub type BlockHandler = Box<dyn FnMut(&[f32]) + Send>;

pub struct CapturePipeline {
    turn: Arc<TurnController>,
    sender: Arc<dyn RealtimeSender>,
    input_rate: u32,
    barge_in_threshold: f32,
}

impl CapturePipeline {
    pub fn new(
        turn: Arc<TurnController>,
        sender: Arc<dyn RealtimeSender>,
        input_rate: u32,
        barge_in_threshold: f32,
    ) -> Self {
        Self {
            turn,
            sender,
            input_rate,
            barge_in_threshold,
        }
    }

    pub fn process_block(&self, block: &[f32]) {
        if block.is_empty() {
            return;
        }

        let mut state = self.turn.state();
        if state == AssistantState::Speaking {
            let energy = rms(block);
            if energy > self.barge_in_threshold {
                info!("Barge-in at RMS {:.4}", energy);
                self.turn.dispatch(Event::BargeIn);
                state = self.turn.state();
            }
        }

        if state.is_terminal() {
            return;
        }

        let payload = encode_audio_block(block, self.input_rate);
        self.sender.send_realtime_input(payload.into());
    }

    pub fn into_handler(self) -> BlockHandler {
        Box::new(move |block: &[f32]| self.process_block(block))
    }
}
