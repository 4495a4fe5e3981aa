pub mod loop_writer;
pub mod metadata;
pub mod wav_format;
