pub mod config;
pub mod driver;
pub mod error;
pub mod loop_result;
pub mod sample;
pub mod state;
pub mod waveform;
