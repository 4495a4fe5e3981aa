pub mod capture_backend;
pub mod capture_delegate;
pub mod device_catalog;
pub mod loop_metadata_writer;
pub mod note_dispatcher;
