use std::time::Duration;

use cogex_audio::MediaStream;
use cogex_timing::TimeoutId;

use crate::display::ElementId;
use crate::trial::TrialData;

/// Random draws used to synthesise simulated responses.
pub trait Randomization {
    /// Sample from an ex-Gaussian: normal(`mean`, `sd`) plus exponential(`rate`).
    /// With `positive`, draws are repeated until the sample is above zero.
    fn sample_ex_gaussian(&mut self, mean: f64, sd: f64, rate: f64, positive: bool) -> f64;

    /// Uniform integer in `lower..=upper`.
    fn random_int(&mut self, lower: i64, upper: i64) -> i64;
}

/// Services a running trial consumes from the host runtime.
pub trait TrialHost {
    /// Milliseconds on the host's monotonic clock.
    fn now_ms(&self) -> f64;

    /// Schedules a [`TrialEvent::Timeout`](crate::TrialEvent::Timeout) for the
    /// current trial after `delay`. Pending timeouts die with the trial.
    fn set_timeout(&mut self, delay: Duration) -> TimeoutId;

    fn clear_timeout(&mut self, id: TimeoutId);

    /// Completes the current trial. Only the first call per trial is honoured.
    fn finish_trial(&mut self, data: TrialData);

    fn randomization(&mut self) -> &mut dyn Randomization;

    /// Clicks `target` after `delay`, as if the participant had.
    fn click_target(&mut self, target: ElementId, delay: Duration);

    /// Hands a captured stream to the host's audio recorder.
    fn initialize_microphone_recorder(&mut self, stream: MediaStream);
}
