//! Effect trait definition
//!
//! Base trait for the in-place processing stages of the effect graph.

use crate::engine::AudioBuffer;
use crate::params::EffectParameters;

/// In-place processing stage
///
/// Stages never change the number of frames in a buffer. The time-pitch
/// stage resamples and therefore sits behind its own pull interface instead.
pub trait Effect: Send {
    /// Process audio buffer in-place
    fn process(&mut self, buffer: &mut AudioBuffer);

    /// Prepare the effect for processing
    ///
    /// Called when the graph is configured for a source format.
    fn prepare(&mut self, sample_rate: u32, max_block_size: usize);

    /// Clear filter history and delay lines
    fn reset(&mut self);

    /// Push the current effect values into the stage
    ///
    /// Never allocates or blocks; safe between two render calls.
    fn apply_parameters(&mut self, params: &EffectParameters);

    /// Get the effect type identifier
    fn effect_type(&self) -> &'static str;

    /// Get human-readable display name
    fn display_name(&self) -> &'static str;

    /// Check if effect is bypassed
    fn is_bypassed(&self) -> bool;

    /// Bypass or engage the effect
    fn set_bypassed(&mut self, bypassed: bool);
}

/// Helper macro to implement common Effect trait methods
///
/// The implementing type needs a `bypassed: bool` field.
#[macro_export]
macro_rules! impl_effect_common {
    ($effect_type:expr, $display_name:expr) => {
        fn effect_type(&self) -> &'static str {
            $effect_type
        }

        fn display_name(&self) -> &'static str {
            $display_name
        }

        fn is_bypassed(&self) -> bool {
            self.bypassed
        }

        fn set_bypassed(&mut self, bypassed: bool) {
            self.bypassed = bypassed;
        }
    };
}
