//! Tuning parameters and the cycle of alternate value sets.
//!
//! Every parameter is kept in its text form as entered and re-parsed on
//! each edit. A parameter that fails to parse never raises: it marks the
//! whole set invalid, and an invalid set produces no movement.

use thiserror::Error;

/// Exclusive upper bound of the `sleep` parameter (100ns units, i.e. 100ms).
pub const SLEEP_LIMIT: f64 = 1_000_000.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("no value given")]
    Empty,
    #[error("`{0}` is not a number")]
    NotANumber(String),
    #[error("`{0}` is negative")]
    Negative(String),
    #[error("expected a single value, found {0}")]
    NotScalar(usize),
    #[error("must be greater than zero")]
    Zero,
    #[error("must be below {0}")]
    TooLarge(f64),
    #[error("has {found} values but the cycle has {expected}")]
    LengthMismatch { found: usize, expected: usize },
    #[error("turn speed overflows at cycle position {0}")]
    Overflow(usize),
}

/// Scalar (non-cycling) parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    Rate,
    Sleep,
}

impl Var {
    pub const ALL: [Var; 2] = [Var::Rate, Var::Sleep];

    pub fn name(self) -> &'static str {
        match self {
            Var::Rate => "rate",
            Var::Sleep => "sleep",
        }
    }

    fn parse(self, text: &str) -> Result<f64, ParseError> {
        let values = parse_sequence(text)?;
        if values.len() != 1 {
            return Err(ParseError::NotScalar(values.len()));
        }
        let value = values[0];
        match self {
            Var::Rate if value == 0.0 => Err(ParseError::Zero),
            Var::Sleep if value >= SLEEP_LIMIT => Err(ParseError::TooLarge(SLEEP_LIMIT)),
            _ => Ok(value),
        }
    }
}

/// Parameters that may hold one value per cycle position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleVar {
    Yawspeed,
    Sensitivity,
    AngleSpeedKey,
    Yaw,
}

impl CycleVar {
    pub const ALL: [CycleVar; 4] = [
        CycleVar::Yawspeed,
        CycleVar::Sensitivity,
        CycleVar::AngleSpeedKey,
        CycleVar::Yaw,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CycleVar::Yawspeed => "yawspeed",
            CycleVar::Sensitivity => "sensitivity",
            CycleVar::AngleSpeedKey => "anglespeedkey",
            CycleVar::Yaw => "yaw",
        }
    }

    /// Sensitivity and yaw divide the turn speed.
    fn is_divisor(self) -> bool {
        matches!(self, CycleVar::Sensitivity | CycleVar::Yaw)
    }
}

/// Any editable parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Var(Var),
    Cycle(CycleVar),
}

impl Param {
    pub fn from_name(name: &str) -> Option<Param> {
        let var = Var::ALL.into_iter().find(|v| v.name() == name).map(Param::Var);
        var.or_else(|| {
            CycleVar::ALL
                .into_iter()
                .find(|v| v.name() == name)
                .map(Param::Cycle)
        })
    }

    /// Every parameter name, for error messages.
    pub fn names() -> Vec<&'static str> {
        Var::ALL
            .iter()
            .map(|v| v.name())
            .chain(CycleVar::ALL.iter().map(|v| v.name()))
            .collect()
    }
}

/// Parse whitespace-separated non-negative decimal numbers.
pub fn parse_sequence(text: &str) -> Result<Vec<f64>, ParseError> {
    let values = text
        .split_whitespace()
        .map(|token| {
            let value: f64 = token
                .parse()
                .map_err(|_| ParseError::NotANumber(token.to_string()))?;
            if !value.is_finite() {
                return Err(ParseError::NotANumber(token.to_string()));
            }
            if value < 0.0 {
                return Err(ParseError::Negative(token.to_string()));
            }
            Ok(value)
        })
        .collect::<Result<Vec<_>, _>>()?;
    if values.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(values)
}

/// Effective cycle length of a group of sequences: the first length above
/// one, provided every other sequence has that length or length one.
pub fn reconcile_lengths(lengths: &[usize]) -> Result<usize, ParseError> {
    let mut count = 0;
    for &len in lengths {
        if count <= 1 {
            count = len;
        } else if len != 1 && len != count {
            return Err(ParseError::LengthMismatch {
                found: len,
                expected: count,
            });
        }
    }
    Ok(count)
}

/// One consistent set of values for a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSet {
    pub rate: f64,
    pub yawspeed: f64,
    pub sensitivity: f64,
    pub angle_speed_key: f64,
    pub yaw_scale: f64,
}

impl ParameterSet {
    /// Mouse counts per second of turning at unit speed factor.
    pub fn counts_per_second(&self) -> f64 {
        self.yawspeed / (self.sensitivity * self.yaw_scale)
    }
}

/// Changes the caller may want to surface (log line, UI redraw).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    pub cycle_index: Option<usize>,
    pub validity: Option<bool>,
}

impl Signals {
    pub fn is_empty(&self) -> bool {
        self.cycle_index.is_none() && self.validity.is_none()
    }
}

/// Parameter values in text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterText {
    pub rate: String,
    pub sleep: String,
    pub yawspeed: String,
    pub sensitivity: String,
    pub anglespeedkey: String,
    pub yaw: String,
}

impl Default for ParameterText {
    fn default() -> Self {
        Self {
            rate: "1000".into(),
            sleep: "3500".into(),
            yawspeed: "75 120 210".into(),
            sensitivity: "1.0".into(),
            anglespeedkey: "0.67".into(),
            yaw: "0.022".into(),
        }
    }
}

pub struct Parameters {
    var_text: [String; 2],
    vars: [Result<f64, ParseError>; 2],
    cycle_text: [String; 4],
    cycles: [Vec<f64>; 4],
    cycle_error: Option<(CycleVar, ParseError)>,
    count: usize,
    current: usize,
    valid: bool,
}

impl Parameters {
    /// Parse `text`. A `current` index outside the resulting cycle is reset
    /// to zero.
    pub fn load(text: &ParameterText, current: usize) -> Self {
        let var_text = [text.rate.clone(), text.sleep.clone()];
        let vars = [Var::Rate.parse(&var_text[0]), Var::Sleep.parse(&var_text[1])];
        let mut params = Self {
            var_text,
            vars,
            cycle_text: [
                text.yawspeed.clone(),
                text.sensitivity.clone(),
                text.anglespeedkey.clone(),
                text.yaw.clone(),
            ],
            cycles: Default::default(),
            cycle_error: None,
            count: 0,
            current,
            valid: false,
        };
        params.parse_cycles();
        if params.current >= params.count {
            params.current = 0;
        }
        params.valid = params.compute_valid();
        params
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn var(&self, var: Var) -> Result<f64, &ParseError> {
        self.vars[var as usize].as_ref().copied()
    }

    pub fn var_text(&self, var: Var) -> &str {
        &self.var_text[var as usize]
    }

    /// Target interval between ticks, in seconds.
    pub fn tick_budget(&self) -> Option<f64> {
        self.var(Var::Sleep).ok().map(|hns| hns * 1e-7)
    }

    /// Value of `var` at cycle position `index`; length-one sequences apply to
    /// every position.
    pub fn cycle_value(&self, var: CycleVar, index: usize) -> Option<f64> {
        let seq = &self.cycles[var as usize];
        if seq.is_empty() {
            return None;
        }
        Some(seq[index % seq.len()])
    }

    /// Copy of the values at the current cycle position, if valid.
    pub fn snapshot(&self) -> Option<ParameterSet> {
        if !self.valid {
            return None;
        }
        Some(ParameterSet {
            rate: self.var(Var::Rate).ok()?,
            yawspeed: self.cycle_value(CycleVar::Yawspeed, self.current)?,
            sensitivity: self.cycle_value(CycleVar::Sensitivity, self.current)?,
            angle_speed_key: self.cycle_value(CycleVar::AngleSpeedKey, self.current)?,
            yaw_scale: self.cycle_value(CycleVar::Yaw, self.current)?,
        })
    }

    /// Step to the next cycle position. Returns the new index, or `None`
    /// when no cycle is defined.
    pub fn advance_cycle(&mut self) -> Option<usize> {
        if self.count == 0 {
            return None;
        }
        self.current = (self.current + 1) % self.count;
        Some(self.current)
    }

    /// Replace the text of `param` and re-parse.
    pub fn set(&mut self, param: Param, text: &str) -> Signals {
        match param {
            Param::Var(var) => self.set_var_text(var, text),
            Param::Cycle(var) => self.set_cycle_text(var, text),
        }
    }

    pub fn set_var_text(&mut self, var: Var, text: &str) -> Signals {
        self.var_text[var as usize] = text.to_string();
        self.vars[var as usize] = var.parse(text);
        Signals {
            cycle_index: None,
            validity: self.update_valid(),
        }
    }

    pub fn set_cycle_text(&mut self, var: CycleVar, text: &str) -> Signals {
        self.cycle_text[var as usize] = text.to_string();
        let prev_count = self.count;
        self.parse_cycles();
        let mut signals = Signals::default();
        if self.count != prev_count && self.current != 0 {
            self.current = 0;
            signals.cycle_index = Some(0);
        }
        signals.validity = self.update_valid();
        signals
    }

    /// Every reason the set is invalid, as `(parameter, error)`.
    pub fn errors(&self) -> Vec<(&'static str, ParseError)> {
        let mut errors: Vec<_> = Var::ALL
            .iter()
            .filter_map(|&var| match &self.vars[var as usize] {
                Err(e) => Some((var.name(), e.clone())),
                Ok(_) => None,
            })
            .collect();
        if let Some((var, e)) = &self.cycle_error {
            errors.push((var.name(), e.clone()));
        }
        errors
    }

    /// `var` with the value at the current position bracketed.
    pub fn describe_cycle(&self, var: CycleVar) -> String {
        let seq = &self.cycles[var as usize];
        if self.count == 0 || seq.is_empty() {
            return self.cycle_text[var as usize].clone();
        }
        if seq.len() == 1 {
            return seq[0].to_string();
        }
        seq.iter()
            .enumerate()
            .map(|(i, v)| {
                if i == self.current {
                    format!("[{}]", v)
                } else {
                    v.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn parse_cycles(&mut self) {
        self.count = 0;
        self.cycle_error = None;
        let mut lengths = [0usize; 4];
        for var in CycleVar::ALL {
            let i = var as usize;
            let seq = match parse_sequence(&self.cycle_text[i]) {
                Ok(seq) => seq,
                Err(e) => {
                    self.cycles[i].clear();
                    self.cycle_error = Some((var, e));
                    return;
                }
            };
            if var.is_divisor() && seq.iter().any(|&v| v == 0.0) {
                self.cycles[i].clear();
                self.cycle_error = Some((var, ParseError::Zero));
                return;
            }
            lengths[i] = seq.len();
            self.cycles[i] = seq;
        }
        let count = match reconcile_lengths(&lengths) {
            Ok(count) => count,
            Err(e) => {
                let var = mismatched(&lengths).unwrap_or(CycleVar::Yawspeed);
                self.cycle_error = Some((var, e));
                return;
            }
        };
        if let Some(index) = (0..count).find(|&i| !self.turn_speed_is_finite(i)) {
            self.cycle_error = Some((CycleVar::Yawspeed, ParseError::Overflow(index)));
            return;
        }
        self.count = count;
    }

    /// Fastest turn at `index` (speed key applied when it speeds up) fits in an f64.
    fn turn_speed_is_finite(&self, index: usize) -> bool {
        let value = |var| self.cycle_value(var, index).unwrap_or(0.0);
        let counts_per_second =
            value(CycleVar::Yawspeed) / (value(CycleVar::Sensitivity) * value(CycleVar::Yaw));
        (counts_per_second * value(CycleVar::AngleSpeedKey).max(1.0)).is_finite()
    }

    fn compute_valid(&self) -> bool {
        self.count > 0 && self.vars.iter().all(Result::is_ok)
    }

    fn update_valid(&mut self) -> Option<bool> {
        let valid = self.compute_valid();
        if valid == self.valid {
            return None;
        }
        self.valid = valid;
        Some(valid)
    }
}

/// First cycle parameter whose length disagrees with the cycle.
fn mismatched(lengths: &[usize; 4]) -> Option<CycleVar> {
    let count = lengths.iter().copied().find(|&len| len > 1)?;
    CycleVar::ALL
        .into_iter()
        .find(|&var| lengths[var as usize] != 1 && lengths[var as usize] != count)
}
