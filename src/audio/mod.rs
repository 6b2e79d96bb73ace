pub mod output;
pub mod playback;
pub mod processing;
pub mod sink;

pub use output::{list_output_devices, CpalOutput};
pub use playback::{PlaybackController, PlaybackState, PlayerConfig};
pub use sink::{AudioOutput, AudioSink, CancelFlag};
