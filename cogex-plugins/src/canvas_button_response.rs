//! Canvas stimulus with one button per choice.
//!
//! The stimulus is drawn once onto a fresh canvas, the buttons are laid out
//! below it as a grid or a wrapping row, and the trial reports the index of
//! the first button pressed together with the time since the canvas was
//! drawn.

use std::str::FromStr;
use std::time::Duration;

use cogex_core::{
    Completion, Display, DrawStimulus, Element, ElementId, Layout, ParameterDefault, ParameterInfo,
    ParameterType, PluginInfo, DataInfo, Result, SimulationMode, SimulationOptions, StimulusType,
    TrialData, TrialError, TrialEvent, TrialHost, TrialPlugin,
};
use cogex_timing::TimeoutId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tiny_skia::Pixmap;

pub static INFO: PluginInfo = PluginInfo {
    name: "canvas-button-response",
    version: "2.0.0",
    parameters: &[
        ParameterInfo {
            name: "stimulus",
            ty: ParameterType::Function,
            array: false,
            default: ParameterDefault::Required,
        },
        ParameterInfo {
            name: "choices",
            ty: ParameterType::String,
            array: true,
            default: ParameterDefault::Required,
        },
        ParameterInfo {
            name: "button_html",
            ty: ParameterType::Function,
            array: false,
            default: ParameterDefault::Builtin,
        },
        ParameterInfo {
            name: "prompt",
            ty: ParameterType::HtmlString,
            array: false,
            default: ParameterDefault::Null,
        },
        ParameterInfo {
            name: "stimulus_duration",
            ty: ParameterType::Int,
            array: false,
            default: ParameterDefault::Null,
        },
        ParameterInfo {
            name: "trial_duration",
            ty: ParameterType::Int,
            array: false,
            default: ParameterDefault::Null,
        },
        ParameterInfo {
            name: "button_layout",
            ty: ParameterType::String,
            array: false,
            default: ParameterDefault::Str("grid"),
        },
        ParameterInfo {
            name: "grid_rows",
            ty: ParameterType::Int,
            array: false,
            default: ParameterDefault::Int(1),
        },
        ParameterInfo {
            name: "grid_columns",
            ty: ParameterType::Int,
            array: false,
            default: ParameterDefault::Null,
        },
        ParameterInfo {
            name: "response_ends_trial",
            ty: ParameterType::Bool,
            array: false,
            default: ParameterDefault::Bool(true),
        },
        ParameterInfo {
            name: "canvas_size",
            ty: ParameterType::Int,
            array: true,
            default: ParameterDefault::IntArray(&[500, 500]),
        },
    ],
    data: &[
        DataInfo {
            name: "response",
            ty: ParameterType::Int,
        },
        DataInfo {
            name: "rt",
            ty: ParameterType::Int,
        },
    ],
};

pub const STIMULUS_ID: &str = "cogex-canvas-button-response-stimulus";
pub const CANVAS_ID: &str = "cogex-canvas-stimulus";
pub const BUTTON_GROUP_ID: &str = "cogex-canvas-button-response-btngroup";
pub const RESPONDED_CLASS: &str = "responded";

/// Markup produced for one choice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonSpec {
    pub label: String,
    pub classes: Vec<String>,
    pub dom_id: Option<String>,
}

/// Builds the button shown for `choice` at position `index`.
pub trait ButtonTemplate: Send {
    fn build(&self, choice: &str, index: usize) -> ButtonSpec;
}

impl<F> ButtonTemplate for F
where
    F: Fn(&str, usize) -> ButtonSpec + Send,
{
    fn build(&self, choice: &str, index: usize) -> ButtonSpec {
        self(choice, index)
    }
}

/// A plain `cogex-btn` labelled with the choice text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultButton;

impl ButtonTemplate for DefaultButton {
    fn build(&self, choice: &str, _index: usize) -> ButtonSpec {
        ButtonSpec {
            label: choice.to_string(),
            classes: vec!["cogex-btn".to_string()],
            dom_id: None,
        }
    }
}

/// Template given in a trial description. `{choice}` and `{index}` in the
/// label are substituted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LabelTemplate {
    pub label: String,
    #[serde(default)]
    pub class: Option<String>,
}

impl ButtonTemplate for LabelTemplate {
    fn build(&self, choice: &str, index: usize) -> ButtonSpec {
        ButtonSpec {
            label: self
                .label
                .replace("{choice}", choice)
                .replace("{index}", &index.to_string()),
            classes: vec![self.class.clone().unwrap_or_else(|| "cogex-btn".to_string())],
            dom_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonLayout {
    Grid,
    Flex,
}

impl FromStr for ButtonLayout {
    type Err = TrialError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "grid" => Ok(ButtonLayout::Grid),
            "flex" => Ok(ButtonLayout::Flex),
            other => Err(TrialError::Config(format!(
                "unknown button_layout `{}` (expected `grid` or `flex`)",
                other
            ))),
        }
    }
}

/// Rows and columns of the button grid. A missing dimension is derived from
/// the other one and the number of choices.
pub fn grid_dimensions(
    choices: usize,
    rows: Option<usize>,
    columns: Option<usize>,
) -> Result<(usize, usize)> {
    match (rows, columns) {
        (None, None) => Err(TrialError::Config(
            "`grid_rows` cannot be null without a value for `grid_columns`".into(),
        )),
        (Some(0), _) | (_, Some(0)) => Err(TrialError::Config(
            "`grid_rows` and `grid_columns` must be positive".into(),
        )),
        (Some(rows), None) => Ok((rows, choices.div_ceil(rows))),
        (None, Some(columns)) => Ok((choices.div_ceil(columns), columns)),
        (Some(rows), Some(columns)) => Ok((rows, columns)),
    }
}

pub struct CanvasButtonResponseParams {
    pub stimulus: Box<dyn DrawStimulus>,
    pub choices: Vec<String>,
    pub button_html: Box<dyn ButtonTemplate>,
    pub prompt: Option<String>,
    pub stimulus_duration: Option<u64>,
    pub trial_duration: Option<u64>,
    pub button_layout: String,
    pub grid_rows: Option<usize>,
    pub grid_columns: Option<usize>,
    pub response_ends_trial: bool,
    /// `[height, width]` in pixels.
    pub canvas_size: [u32; 2],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ButtonHtml {
    Label(String),
    Template(LabelTemplate),
}

#[derive(Deserialize)]
struct JsonParams {
    stimulus: StimulusType,
    choices: Vec<String>,
    #[serde(default)]
    button_html: Option<ButtonHtml>,
    prompt: Option<String>,
    stimulus_duration: Option<u64>,
    trial_duration: Option<u64>,
    button_layout: String,
    grid_rows: Option<usize>,
    grid_columns: Option<usize>,
    response_ends_trial: bool,
    canvas_size: Vec<u32>,
}

impl CanvasButtonResponseParams {
    pub fn new(stimulus: impl DrawStimulus + 'static, choices: Vec<String>) -> Self {
        Self {
            stimulus: Box::new(stimulus),
            choices,
            button_html: Box::new(DefaultButton),
            prompt: None,
            stimulus_duration: None,
            trial_duration: None,
            button_layout: "grid".to_string(),
            grid_rows: Some(1),
            grid_columns: None,
            response_ends_trial: true,
            canvas_size: [500, 500],
        }
    }

    /// Builds the parameters from a trial description. `params` must
    /// already be resolved against [`INFO`].
    pub fn from_json(params: &Map<String, Value>) -> Result<Self> {
        let raw: JsonParams = serde_json::from_value(Value::Object(params.clone()))?;
        let canvas_size = match raw.canvas_size.as_slice() {
            &[height, width] => [height, width],
            other => {
                return Err(TrialError::Config(format!(
                    "canvas_size needs [height, width], got {} values",
                    other.len()
                )));
            }
        };
        let button_html: Box<dyn ButtonTemplate> = match raw.button_html {
            None => Box::new(DefaultButton),
            Some(ButtonHtml::Label(label)) => Box::new(LabelTemplate { label, class: None }),
            Some(ButtonHtml::Template(template)) => Box::new(template),
        };
        Ok(Self {
            stimulus: Box::new(raw.stimulus),
            choices: raw.choices,
            button_html,
            prompt: raw.prompt,
            stimulus_duration: raw.stimulus_duration,
            trial_duration: raw.trial_duration,
            button_layout: raw.button_layout,
            grid_rows: raw.grid_rows,
            grid_columns: raw.grid_columns,
            response_ends_trial: raw.response_ends_trial,
            canvas_size,
        })
    }

    pub fn with_button_html(mut self, template: impl ButtonTemplate + 'static) -> Self {
        self.button_html = Box::new(template);
        self
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn with_stimulus_duration(mut self, ms: u64) -> Self {
        self.stimulus_duration = Some(ms);
        self
    }

    pub fn with_trial_duration(mut self, ms: u64) -> Self {
        self.trial_duration = Some(ms);
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.button_layout = layout.into();
        self
    }

    pub fn with_grid(mut self, rows: Option<usize>, columns: Option<usize>) -> Self {
        self.grid_rows = rows;
        self.grid_columns = columns;
        self
    }

    pub fn with_response_ends_trial(mut self, ends: bool) -> Self {
        self.response_ends_trial = ends;
        self
    }

    pub fn with_canvas_size(mut self, height: u32, width: u32) -> Self {
        self.canvas_size = [height, width];
        self
    }

    fn group_layout(&self) -> Result<(ButtonLayout, Layout)> {
        let kind = self.button_layout.parse::<ButtonLayout>()?;
        let layout = match kind {
            ButtonLayout::Grid => {
                let (rows, columns) =
                    grid_dimensions(self.choices.len(), self.grid_rows, self.grid_columns)?;
                Layout::Grid {
                    rows,
                    columns: columns.max(1),
                }
            }
            ButtonLayout::Flex => Layout::Flex,
        };
        Ok((kind, layout))
    }
}

/// `{rt, response}` as reported to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ButtonResponse {
    pub rt: Option<u64>,
    #[serde(rename = "response")]
    pub button: Option<usize>,
}

struct Elements {
    stimulus: ElementId,
    group: ElementId,
    buttons: Vec<ElementId>,
}

pub struct CanvasButtonResponse {
    params: CanvasButtonResponseParams,
    elements: Option<Elements>,
    start_ms: f64,
    response: ButtonResponse,
    hide_timer: Option<TimeoutId>,
    end_timer: Option<TimeoutId>,
    completion: Completion,
}

impl CanvasButtonResponse {
    pub fn new(params: CanvasButtonResponseParams) -> Self {
        Self {
            params,
            elements: None,
            start_ms: 0.0,
            response: ButtonResponse::default(),
            hide_timer: None,
            end_timer: None,
            completion: Completion::default(),
        }
    }

    pub fn response(&self) -> ButtonResponse {
        self.response
    }

    pub fn buttons(&self) -> &[ElementId] {
        self.elements
            .as_ref()
            .map(|e| e.buttons.as_slice())
            .unwrap_or_default()
    }

    fn render(&mut self, display: &mut Display) -> Result<ElementId> {
        let (kind, layout) = self.params.group_layout()?;
        let [height, width] = self.params.canvas_size;
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            TrialError::Config(format!("canvas_size [{}, {}] is empty", height, width))
        })?;

        let root = display.root();
        let stimulus = display.append(root, Element::container().with_id(STIMULUS_ID))?;
        let canvas = display.append(stimulus, Element::canvas(pixmap).with_id(CANVAS_ID))?;

        let group_class = match kind {
            ButtonLayout::Grid => "cogex-btn-group-grid",
            ButtonLayout::Flex => "cogex-btn-group-flex",
        };
        let group = display.append(
            root,
            Element::container()
                .with_id(BUTTON_GROUP_ID)
                .with_class(group_class)
                .with_layout(layout),
        )?;

        let mut buttons = Vec::with_capacity(self.params.choices.len());
        for (index, choice) in self.params.choices.iter().enumerate() {
            let spec = self.params.button_html.build(choice, index);
            let mut button = Element::button(spec.label).with_data("choice", index.to_string());
            for class in spec.classes {
                button = button.with_class(class);
            }
            if let Some(id) = spec.dom_id {
                button = button.with_id(id);
            }
            buttons.push(display.append(group, button)?);
        }

        if let Some(prompt) = &self.params.prompt {
            display.append(root, Element::html(prompt.clone()))?;
        }

        self.elements = Some(Elements {
            stimulus,
            group,
            buttons,
        });
        Ok(canvas)
    }

    fn after_response(
        &mut self,
        choice: usize,
        display: &mut Display,
        host: &mut dyn TrialHost,
    ) -> Result<()> {
        let Some(elements) = &self.elements else {
            return Ok(());
        };
        let rt = (host.now_ms() - self.start_ms).round().max(0.0) as u64;
        self.response = ButtonResponse {
            rt: Some(rt),
            button: Some(choice),
        };
        log::debug!("button {} pressed after {} ms", choice, rt);

        display.add_class(elements.stimulus, RESPONDED_CLASS)?;
        for &button in &elements.buttons {
            display.set_disabled(button, true)?;
        }

        if self.params.response_ends_trial {
            self.end_trial(host)?;
        }
        Ok(())
    }

    fn end_trial(&mut self, host: &mut dyn TrialHost) -> Result<()> {
        if !self.completion.try_complete() {
            return Ok(());
        }
        for timer in [self.hide_timer.take(), self.end_timer.take()].into_iter().flatten() {
            host.clear_timeout(timer);
        }
        host.finish_trial(TrialData::from_serialize(&self.response)?);
        Ok(())
    }

    /// Synthetic `{rt, response}` with caller overrides applied and the
    /// result made consistent with this trial.
    fn simulation_data(
        &self,
        options: &SimulationOptions,
        host: &mut dyn TrialHost,
    ) -> Result<TrialData> {
        let rng = host.randomization();
        let rt = rng.sample_ex_gaussian(500.0, 50.0, 1.0 / 150.0, true);
        let choices = self.params.choices.len() as i64;
        let response = if choices > 0 {
            Value::from(rng.random_int(0, choices - 1))
        } else {
            Value::Null
        };

        let mut data = TrialData::new();
        data.insert("rt", Value::from(rt));
        data.insert("response", response);
        data.merge(&options.data);
        self.make_consistent(&mut data)?;
        Ok(data)
    }

    fn make_consistent(&self, data: &mut TrialData) -> Result<()> {
        let rt = match data.get("rt") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                value
                    .as_f64()
                    .ok_or_else(|| TrialError::Config(format!("simulated rt {} is not a number", value)))?
                    .round()
                    .max(0.0) as u64,
            ),
        };
        let response = match data.get("response") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let index = value
                    .as_u64()
                    .filter(|&i| (i as usize) < self.params.choices.len())
                    .ok_or_else(|| {
                        TrialError::Config(format!(
                            "simulated response {} is not a choice index below {}",
                            value,
                            self.params.choices.len()
                        ))
                    })?;
                Some(index as usize)
            }
        };

        let timed_out = matches!((rt, self.params.trial_duration), (Some(rt), Some(limit)) if rt > limit);
        let (rt, response) = if timed_out { (None, None) } else { (rt, response) };
        data.insert("rt", rt.map_or(Value::Null, Value::from));
        data.insert("response", response.map_or(Value::Null, Value::from));
        Ok(())
    }
}

impl TrialPlugin for CanvasButtonResponse {
    fn info(&self) -> &'static PluginInfo {
        &INFO
    }

    fn start(&mut self, display: &mut Display, host: &mut dyn TrialHost) -> Result<()> {
        let canvas = self.render(display)?;
        self.params.stimulus.draw(display.canvas_mut(canvas)?);
        self.start_ms = host.now_ms();

        if let Some(ms) = self.params.stimulus_duration {
            self.hide_timer = Some(host.set_timeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.params.trial_duration {
            self.end_timer = Some(host.set_timeout(Duration::from_millis(ms)));
        }
        log::info!(
            "{} showing {} choices",
            INFO.name,
            self.params.choices.len()
        );
        Ok(())
    }

    fn handle_event(
        &mut self,
        event: TrialEvent,
        display: &mut Display,
        host: &mut dyn TrialHost,
    ) -> Result<()> {
        if self.completion.is_complete() {
            return Ok(());
        }
        match event {
            TrialEvent::Click(target) => {
                if self.response.button.is_some() {
                    return Ok(());
                }
                let choice = self
                    .elements
                    .as_ref()
                    .and_then(|e| e.buttons.iter().position(|&b| b == target));
                match choice {
                    Some(choice) => self.after_response(choice, display, host),
                    None => Ok(()),
                }
            }
            TrialEvent::Timeout(id) if Some(id) == self.hide_timer => {
                self.hide_timer = None;
                if let Some(elements) = &self.elements {
                    display.set_hidden(elements.stimulus, true)?;
                }
                Ok(())
            }
            TrialEvent::Timeout(id) if Some(id) == self.end_timer => {
                self.end_timer = None;
                self.end_trial(host)
            }
            TrialEvent::Timeout(_) | TrialEvent::SelectionChanged(_) => Ok(()),
        }
    }

    fn simulate(
        &mut self,
        mode: SimulationMode,
        options: &SimulationOptions,
        display: &mut Display,
        host: &mut dyn TrialHost,
    ) -> Result<()> {
        let data = self.simulation_data(options, host)?;
        match mode {
            SimulationMode::DataOnly => {
                if self.completion.try_complete() {
                    host.finish_trial(data);
                }
                Ok(())
            }
            SimulationMode::Visual => {
                self.start(display, host)?;
                let rt = data.get("rt").and_then(Value::as_u64);
                let response = data.get("response").and_then(Value::as_u64);
                if let (Some(rt), Some(response), Some(elements)) = (rt, response, &self.elements) {
                    if let Some(button) =
                        display.query_data(elements.group, "choice", &response.to_string())
                    {
                        host.click_target(button, Duration::from_millis(rt));
                    }
                }
                Ok(())
            }
        }
    }
}
