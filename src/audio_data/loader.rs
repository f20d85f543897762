use crate::audio_data::SoundDecoder;
use crate::config::SoundResource;
use crate::error::Result;

/// Trait for opening decoders over sound resources.
///
/// The stage never decodes audio itself. Every time it needs PCM data for a
/// resource (caching a static sound, starting a stream, or rewinding a looping
/// stream) it asks the loader for a fresh decoder positioned at the start of
/// the data.
///
/// # Example
///
/// ```ignore
/// use soundstage::audio_data::{SoundDecoder, SoundLoader};
/// use soundstage::{Result, SoundResource};
///
/// struct OggLoader;
///
/// impl SoundLoader for OggLoader {
///     fn open(&self, resource: &SoundResource) -> Result<Box<dyn SoundDecoder>> {
///         // Open resource.name and wrap your decoder here
///         todo!()
///     }
/// }
/// ```
pub trait SoundLoader: Send + Sync {
    /// Opens a decoder at the beginning of the resource's audio.
    ///
    /// # Errors
    ///
    /// Returns [`SoundStageError::Io`](crate::SoundStageError::Io) if the data cannot
    /// be read, or [`SoundStageError::UnsupportedFormat`](crate::SoundStageError::UnsupportedFormat)
    /// if it is not a format the decoder understands.
    fn open(&self, resource: &SoundResource) -> Result<Box<dyn SoundDecoder>>;
}
