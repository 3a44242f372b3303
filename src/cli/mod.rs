pub mod probe;
pub mod speech;
pub mod terminal;

pub use probe::annotate_faces;
pub use speech::SpeechCommand;
pub use terminal::{check_for_stop, clear_screen, poll_key, Key, RawMode};
