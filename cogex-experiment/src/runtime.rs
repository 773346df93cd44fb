use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use cogex_audio::MediaStream;
use cogex_core::{
    Display, ElementId, Randomization, SimulationMode, SimulationOptions, TrialData, TrialError,
    TrialEvent, TrialHost, TrialPlugin, TrialResult,
};
use cogex_timing::{TimeoutId, TimeoutQueue, Timer};
use rand::Rng;
use serde_json::Value;

use crate::error::{ExperimentError, Result};
use crate::random::Randomizer;

/// What the host queue fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scheduled {
    Timeout,
    Click(ElementId),
    NextTrial,
}

/// The services handed to a running trial.
///
/// Kept apart from the runtime so a trial can borrow it mutably alongside
/// the display.
struct HostContext<T: Timer, R: Rng> {
    timer: T,
    randomizer: Randomizer<R>,
    queue: TimeoutQueue<Scheduled>,
    trial_index: usize,
    trial_open: bool,
    finished: Option<TrialData>,
    recorder: Option<MediaStream>,
}

impl<T: Timer, R: Rng> TrialHost for HostContext<T, R> {
    fn now_ms(&self) -> f64 {
        self.timer.now_ms()
    }

    fn set_timeout(&mut self, delay: Duration) -> TimeoutId {
        let id = self
            .queue
            .schedule(self.timer.now_ns(), delay, Scheduled::Timeout);
        log::debug!("trial {}: {} set for {:?}", self.trial_index, id, delay);
        id
    }

    fn clear_timeout(&mut self, id: TimeoutId) {
        self.queue.cancel(id);
    }

    fn finish_trial(&mut self, data: TrialData) {
        if !self.trial_open {
            log::warn!(
                "trial {} finished more than once; ignoring {:?}",
                self.trial_index,
                data
            );
            return;
        }
        self.trial_open = false;
        self.finished = Some(data);
    }

    fn randomization(&mut self) -> &mut dyn Randomization {
        &mut self.randomizer
    }

    fn click_target(&mut self, target: ElementId, delay: Duration) {
        log::debug!("trial {}: click on {:?} in {:?}", self.trial_index, target, delay);
        self.queue
            .schedule(self.timer.now_ns(), delay, Scheduled::Click(target));
    }

    fn initialize_microphone_recorder(&mut self, stream: MediaStream) {
        log::info!(
            "recorder attached to {} ({} Hz, {} ch, {})",
            stream.label,
            stream.sample_rate,
            stream.channels,
            if stream.is_live() { "live" } else { "no capture" }
        );
        self.recorder = Some(stream);
    }
}

/// Runs a timeline of trials against a single display surface.
///
/// Single-threaded: the owner calls [`update`](Self::update) once per frame
/// and forwards input through [`click`](Self::click) and
/// [`select`](Self::select).
pub struct ExperimentRuntime<T: Timer, R: Rng> {
    display: Display,
    ctx: HostContext<T, R>,
    timeline: VecDeque<Box<dyn TrialPlugin>>,
    current: Option<Box<dyn TrialPlugin>>,
    simulation: Option<(SimulationMode, SimulationOptions)>,
    post_trial_gap: Duration,
    results: Vec<TrialResult>,
    started_ns: Option<u64>,
}

impl<T: Timer, R: Rng> ExperimentRuntime<T, R> {
    pub fn new(timer: T, rng: R) -> Self {
        Self {
            display: Display::new(),
            ctx: HostContext {
                timer,
                randomizer: Randomizer::new(rng),
                queue: TimeoutQueue::new(),
                trial_index: 0,
                trial_open: false,
                finished: None,
                recorder: None,
            },
            timeline: VecDeque::new(),
            current: None,
            simulation: None,
            post_trial_gap: Duration::ZERO,
            results: Vec::new(),
            started_ns: None,
        }
    }

    pub fn with_post_trial_gap(mut self, gap: Duration) -> Self {
        self.post_trial_gap = gap;
        self
    }

    pub fn push(&mut self, trial: Box<dyn TrialPlugin>) {
        self.timeline.push_back(trial);
    }

    pub fn extend(&mut self, trials: impl IntoIterator<Item = Box<dyn TrialPlugin>>) {
        self.timeline.extend(trials);
    }

    /// Runs every remaining trial through its simulation path instead of
    /// waiting for a participant.
    pub fn simulate(&mut self, mode: SimulationMode, options: SimulationOptions) {
        self.simulation = Some((mode, options));
    }

    pub fn start(&mut self) -> Result<()> {
        if self.started_ns.is_some() {
            return Ok(());
        }
        self.started_ns = Some(self.ctx.timer.now_ns());
        log::info!("experiment started with {} trials", self.timeline.len());
        self.begin_next()?;
        self.settle()
    }

    /// Fires everything due, then polls the running trial.
    pub fn update(&mut self) -> Result<()> {
        if self.started_ns.is_none() {
            return Ok(());
        }
        let now = self.ctx.timer.now_ns();
        while let Some((id, item)) = self.ctx.queue.pop_due(now) {
            match item {
                Scheduled::Timeout => {
                    log::debug!("trial {}: {} fired", self.ctx.trial_index, id);
                    self.dispatch(TrialEvent::Timeout(id))?;
                }
                Scheduled::Click(target) => {
                    self.click(target)?;
                }
                Scheduled::NextTrial => {
                    self.begin_next()?;
                    self.settle()?;
                }
            }
        }

        if let Some(trial) = self.current.as_mut() {
            let polled = trial.poll(&mut self.display, &mut self.ctx);
            self.check(polled)?;
            self.settle()?;
        }
        Ok(())
    }

    /// Activates `element` if it is an enabled button of the running trial.
    /// Returns whether the click was delivered.
    pub fn click(&mut self, element: ElementId) -> Result<bool> {
        if self.current.is_none() {
            return Ok(false);
        }
        let is_button = self.display.get(element).is_some_and(|e| e.is_button());
        if !is_button || !self.display.is_interactive(element) {
            log::debug!("click on {:?} ignored", element);
            return Ok(false);
        }
        self.dispatch(TrialEvent::Click(element))?;
        Ok(true)
    }

    /// Moves a selection list to `index` and tells the running trial.
    pub fn select(&mut self, element: ElementId, index: usize) -> Result<bool> {
        if self.current.is_none() || !self.display.is_interactive(element) {
            return Ok(false);
        }
        let selected = self.display.select_index(element, index);
        self.check(selected)?;
        self.dispatch(TrialEvent::SelectionChanged(element))?;
        Ok(true)
    }

    /// Drives the timeline by sleeping until each next deadline. Used for
    /// simulated and headless runs.
    pub fn run_to_completion(&mut self) -> Result<()> {
        self.start()?;
        loop {
            self.update()?;
            if self.is_finished() {
                return Ok(());
            }
            match self.ctx.queue.next_deadline() {
                Some(deadline) => {
                    let now = self.ctx.timer.now_ns();
                    if deadline > now {
                        self.ctx.timer.sleep(Duration::from_nanos(deadline - now));
                    }
                }
                None => return Err(ExperimentError::Stalled(self.ctx.trial_index)),
            }
        }
    }

    /// Drops the running trial and everything still queued.
    pub fn abort(&mut self) {
        if let Some(trial) = self.current.take() {
            log::warn!(
                "aborting at trial {} ({})",
                self.ctx.trial_index,
                trial.info().name
            );
        }
        self.timeline.clear();
        self.ctx.queue.clear();
        self.ctx.trial_open = false;
        self.ctx.finished = None;
        self.display.clear();
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }

    pub fn recorder(&self) -> Option<&MediaStream> {
        self.ctx.recorder.as_ref()
    }

    pub fn timer(&self) -> &T {
        &self.ctx.timer
    }

    /// Name of the running trial's plugin.
    pub fn current_trial(&self) -> Option<&'static str> {
        self.current.as_ref().map(|t| t.info().name)
    }

    pub fn is_started(&self) -> bool {
        self.started_ns.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.started_ns.is_some()
            && self.current.is_none()
            && self.timeline.is_empty()
            && self.ctx.queue.is_empty()
    }

    pub fn next_deadline(&mut self) -> Option<u64> {
        self.ctx.queue.next_deadline()
    }

    pub fn save_results(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let io_err = |source| ExperimentError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(io_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, &self.results)?;
        writer.flush().map_err(io_err)?;
        log::info!("results saved to {}", path.display());
        Ok(())
    }

    fn dispatch(&mut self, event: TrialEvent) -> Result<()> {
        let Some(trial) = self.current.as_mut() else {
            return Ok(());
        };
        let handled = trial.handle_event(event, &mut self.display, &mut self.ctx);
        self.check(handled)?;
        self.settle()
    }

    /// Records every pending finish and moves the timeline along.
    fn settle(&mut self) -> Result<()> {
        while let Some(data) = self.ctx.finished.take() {
            self.record(data);
            if self.post_trial_gap.is_zero() || self.timeline.is_empty() {
                self.begin_next()?;
            } else {
                self.ctx
                    .queue
                    .schedule(self.ctx.timer.now_ns(), self.post_trial_gap, Scheduled::NextTrial);
            }
        }
        Ok(())
    }

    fn record(&mut self, data: TrialData) {
        let Some(trial) = self.current.take() else {
            return;
        };
        self.ctx.queue.clear();
        self.display.clear();

        let elapsed = self
            .ctx
            .timer
            .elapsed(self.started_ns.unwrap_or_default());
        let result = TrialResult {
            trial_index: self.ctx.trial_index,
            trial_type: trial.info().name.to_string(),
            time_elapsed_ms: elapsed.as_millis() as u64,
            data,
        };
        log::info!(
            "trial {} ({}) finished at {} ms",
            result.trial_index,
            result.trial_type,
            result.time_elapsed_ms
        );
        self.results.push(result);
        self.ctx.trial_index += 1;
    }

    fn begin_next(&mut self) -> Result<()> {
        let Some(mut trial) = self.timeline.pop_front() else {
            self.log_summary();
            return Ok(());
        };
        self.ctx.trial_open = true;
        log::info!(
            "trial {} ({}) starting",
            self.ctx.trial_index,
            trial.info().name
        );
        let started = match &self.simulation {
            Some((mode, options)) => {
                trial.simulate(*mode, options, &mut self.display, &mut self.ctx)
            }
            None => trial.start(&mut self.display, &mut self.ctx),
        };
        self.current = Some(trial);
        self.check(started)
    }

    /// Stops the timeline on the first trial error.
    fn check<V>(&mut self, result: std::result::Result<V, TrialError>) -> Result<V> {
        result.map_err(|source| {
            let index = self.ctx.trial_index;
            let plugin = self.current.as_ref().map_or("none", |t| t.info().name);
            log::error!("trial {} ({}) failed: {}", index, plugin, source);
            self.abort();
            ExperimentError::Trial {
                index,
                plugin,
                source,
            }
        })
    }

    fn log_summary(&self) {
        let rts: Vec<f64> = self
            .results
            .iter()
            .filter_map(|r| r.data.get("rt").and_then(Value::as_f64))
            .collect();
        log::info!("experiment finished: {} trials", self.results.len());
        if !rts.is_empty() {
            let mean = rts.iter().sum::<f64>() / rts.len() as f64;
            log::info!("{} timed responses, mean rt {:.1} ms", rts.len(), mean);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogex_core::{Element, PluginInfo, Result as TrialResultT};
    use cogex_timing::ManualTimer;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    static PROBE_INFO: PluginInfo = PluginInfo {
        name: "probe",
        version: "0.0.0",
        parameters: &[],
        data: &[],
    };

    /// Test trial: a single button that finishes on click, plus a timeout.
    struct Probe {
        timeout: Option<Duration>,
        finish_twice: bool,
        events: Rc<RefCell<Vec<TrialEvent>>>,
        button: Option<ElementId>,
    }

    impl Probe {
        fn new(events: &Rc<RefCell<Vec<TrialEvent>>>) -> Self {
            Self {
                timeout: None,
                finish_twice: false,
                events: Rc::clone(events),
                button: None,
            }
        }
    }

    impl TrialPlugin for Probe {
        fn info(&self) -> &'static PluginInfo {
            &PROBE_INFO
        }

        fn start(&mut self, display: &mut Display, host: &mut dyn TrialHost) -> TrialResultT<()> {
            self.button = Some(display.append(display.root(), Element::button("go"))?);
            if let Some(delay) = self.timeout {
                host.set_timeout(delay);
            }
            Ok(())
        }

        fn handle_event(
            &mut self,
            event: TrialEvent,
            _display: &mut Display,
            host: &mut dyn TrialHost,
        ) -> TrialResultT<()> {
            self.events.borrow_mut().push(event);
            let mut data = TrialData::new();
            data.insert("rt", json!(host.now_ms().round()));
            host.finish_trial(data.clone());
            if self.finish_twice {
                data.insert("rt", json!(-1));
                host.finish_trial(data);
            }
            Ok(())
        }

        fn simulate(
            &mut self,
            mode: SimulationMode,
            _options: &SimulationOptions,
            display: &mut Display,
            host: &mut dyn TrialHost,
        ) -> TrialResultT<()> {
            match mode {
                SimulationMode::DataOnly => {
                    host.finish_trial(TrialData::new());
                    Ok(())
                }
                SimulationMode::Visual => {
                    self.start(display, host)?;
                    if let Some(button) = self.button {
                        host.click_target(button, Duration::from_millis(300));
                    }
                    Ok(())
                }
            }
        }
    }

    struct Failing;

    impl TrialPlugin for Failing {
        fn info(&self) -> &'static PluginInfo {
            &PROBE_INFO
        }

        fn start(&mut self, _: &mut Display, _: &mut dyn TrialHost) -> TrialResultT<()> {
            Err(TrialError::Config("broken".into()))
        }

        fn handle_event(
            &mut self,
            _: TrialEvent,
            _: &mut Display,
            _: &mut dyn TrialHost,
        ) -> TrialResultT<()> {
            Ok(())
        }

        fn simulate(
            &mut self,
            _: SimulationMode,
            _: &SimulationOptions,
            display: &mut Display,
            host: &mut dyn TrialHost,
        ) -> TrialResultT<()> {
            self.start(display, host)
        }
    }

    fn runtime() -> (ExperimentRuntime<ManualTimer, StdRng>, ManualTimer) {
        let timer = ManualTimer::new();
        let rt = ExperimentRuntime::new(timer.clone(), StdRng::seed_from_u64(1));
        (rt, timer)
    }

    fn only_button(rt: &ExperimentRuntime<ManualTimer, StdRng>) -> ElementId {
        let display = rt.display();
        display
            .descendants(display.root())
            .find(|&id| display.get(id).is_some_and(|e| e.is_button()))
            .unwrap()
    }

    #[test]
    fn click_finishes_trial_and_records_result() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (mut rt, timer) = runtime();
        rt.push(Box::new(Probe::new(&events)));
        rt.start().unwrap();

        timer.advance_ms(420);
        let button = only_button(&rt);
        assert!(rt.click(button).unwrap());

        assert!(rt.is_finished());
        assert_eq!(rt.results().len(), 1);
        let result = &rt.results()[0];
        assert_eq!(result.trial_type, "probe");
        assert_eq!(result.time_elapsed_ms, 420);
        assert_eq!(result.data.get("rt"), Some(&json!(420.0)));
        assert!(rt.display().get(rt.display().root()).unwrap().children().is_empty());
    }

    #[test]
    fn second_finish_is_ignored() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (mut rt, _timer) = runtime();
        let mut probe = Probe::new(&events);
        probe.finish_twice = true;
        rt.push(Box::new(probe));
        rt.start().unwrap();
        let button = only_button(&rt);
        rt.click(button).unwrap();
        assert_eq!(rt.results().len(), 1);
        assert_eq!(rt.results()[0].data.get("rt"), Some(&json!(0.0)));
    }

    #[test]
    fn timeouts_of_a_finished_trial_never_reach_the_next() {
        let first_events = Rc::new(RefCell::new(Vec::new()));
        let second_events = Rc::new(RefCell::new(Vec::new()));
        let (mut rt, timer) = runtime();
        let mut first = Probe::new(&first_events);
        first.timeout = Some(Duration::from_millis(1000));
        rt.push(Box::new(first));
        rt.push(Box::new(Probe::new(&second_events)));
        rt.start().unwrap();

        timer.advance_ms(10);
        let button = only_button(&rt);
        rt.click(button).unwrap();
        assert_eq!(rt.current_trial(), Some("probe"));

        timer.advance_ms(2000);
        rt.update().unwrap();
        assert!(second_events.borrow().is_empty());
        assert_eq!(rt.results().len(), 1);
    }

    #[test]
    fn timeout_is_delivered_to_running_trial() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (mut rt, timer) = runtime();
        let mut probe = Probe::new(&events);
        probe.timeout = Some(Duration::from_millis(50));
        rt.push(Box::new(probe));
        rt.start().unwrap();

        timer.advance_ms(49);
        rt.update().unwrap();
        assert!(events.borrow().is_empty());
        timer.advance_ms(1);
        rt.update().unwrap();
        assert!(matches!(events.borrow()[0], TrialEvent::Timeout(_)));
        assert!(rt.is_finished());
    }

    #[test]
    fn disabled_buttons_ignore_clicks() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (mut rt, _timer) = runtime();
        rt.push(Box::new(Probe::new(&events)));
        rt.start().unwrap();
        let button = only_button(&rt);
        rt.display.set_disabled(button, true).unwrap();
        assert!(!rt.click(button).unwrap());
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn visual_simulation_runs_to_completion() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (mut rt, timer) = runtime();
        rt.push(Box::new(Probe::new(&events)));
        rt.push(Box::new(Probe::new(&events)));
        rt.simulate(SimulationMode::Visual, SimulationOptions::default());
        rt.run_to_completion().unwrap();
        assert_eq!(rt.results().len(), 2);
        assert_eq!(timer.now_ns(), 600_000_000);
        assert_eq!(rt.results()[1].data.get("rt"), Some(&json!(600.0)));
    }

    #[test]
    fn post_trial_gap_delays_next_trial() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let timer = ManualTimer::new();
        let mut rt = ExperimentRuntime::new(timer.clone(), StdRng::seed_from_u64(1))
            .with_post_trial_gap(Duration::from_millis(500));
        rt.push(Box::new(Probe::new(&events)));
        rt.push(Box::new(Probe::new(&events)));
        rt.simulate(SimulationMode::DataOnly, SimulationOptions::default());
        rt.start().unwrap();
        assert_eq!(rt.results().len(), 1);
        assert_eq!(rt.current_trial(), None);

        rt.run_to_completion().unwrap();
        assert_eq!(rt.results().len(), 2);
        assert_eq!(rt.results()[1].time_elapsed_ms, 500);
    }

    #[test]
    fn waiting_trial_without_timers_is_stalled() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (mut rt, _timer) = runtime();
        rt.push(Box::new(Probe::new(&events)));
        assert!(matches!(
            rt.run_to_completion(),
            Err(ExperimentError::Stalled(0))
        ));
    }

    #[test]
    fn trial_error_stops_the_timeline() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let (mut rt, _timer) = runtime();
        rt.push(Box::new(Failing));
        rt.push(Box::new(Probe::new(&events)));
        let err = rt.start().unwrap_err();
        assert!(matches!(
            err,
            ExperimentError::Trial {
                index: 0,
                source: TrialError::Config(_),
                ..
            }
        ));
        assert!(rt.is_finished());
        assert!(rt.results().is_empty());
    }

    #[test]
    fn results_are_written_as_json() {
        let (mut rt, _timer) = runtime();
        let events = Rc::new(RefCell::new(Vec::new()));
        rt.push(Box::new(Probe::new(&events)));
        rt.simulate(SimulationMode::DataOnly, SimulationOptions::default());
        rt.start().unwrap();

        let path = std::env::temp_dir().join(format!("cogex-results-{}.json", std::process::id()));
        rt.save_results(&path).unwrap();
        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(saved[0]["trial_type"], "probe");
        assert_eq!(saved[0]["trial_index"], 0);
    }
}
