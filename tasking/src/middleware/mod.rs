//! Middleware hooks around the agent loop: budget counters and the
//! human-in-the-loop client.

mod human;
mod step_counter;

pub use human::{ChannelHumanClient, HumanClient};
pub use step_counter::{BaseStepCounter, MaxStepCounter, StepCounter, TokenStepCounter};
