use crate::models::error::CaptureError;

/// MIDI note dispatch collaborator.
///
/// Stays on the thread that drives the capture; it is never handed to a
/// capture worker.
pub trait NoteDispatcher {
    fn send_note_on(&mut self, note: u8, velocity: u8) -> Result<(), CaptureError>;

    fn send_note_off(&mut self, note: u8) -> Result<(), CaptureError>;
}

/// Dispatcher for sources that need no MIDI, e.g. sustained external signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoNotes;

impl NoteDispatcher for NoNotes {
    fn send_note_on(&mut self, _note: u8, _velocity: u8) -> Result<(), CaptureError> {
        Ok(())
    }

    fn send_note_off(&mut self, _note: u8) -> Result<(), CaptureError> {
        Ok(())
    }
}
