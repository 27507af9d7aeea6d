//! Structured plan request: the typed values collected from the user.

use std::path::Path;
use std::str::FromStr;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::PlannerError;
use crate::i18n::Language;

pub const DEFAULT_HOURS_PER_DAY: u32 = 3;
pub const DEFAULT_DIFFICULTY: u8 = 5;
const MAX_HOURS_PER_DAY: u32 = 24;
const MAX_DIFFICULTY: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnergyLevel {
    #[default]
    High,
    Medium,
    Low,
}

impl EnergyLevel {
    pub fn label(self, language: Language) -> &'static str {
        let s = language.strings();
        match self {
            EnergyLevel::High => s.energy_high,
            EnergyLevel::Medium => s.energy_medium,
            EnergyLevel::Low => s.energy_low,
        }
    }
}

impl FromStr for EnergyLevel {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" | "alto" | "alta" => Ok(EnergyLevel::High),
            "medium" | "medio" | "media" => Ok(EnergyLevel::Medium),
            "low" | "bajo" | "baja" => Ok(EnergyLevel::Low),
            _ => Err(PlannerError::InvalidValue {
                field: "energy",
                value: s.to_owned(),
                expected: "high, medium or low",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeOfDay {
    #[default]
    Morning,
    Afternoon,
    Night,
}

impl TimeOfDay {
    pub fn label(self, language: Language) -> &'static str {
        let s = language.strings();
        match self {
            TimeOfDay::Morning => s.morning,
            TimeOfDay::Afternoon => s.afternoon,
            TimeOfDay::Night => s.night,
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "morning" | "mañana" | "manana" => Ok(TimeOfDay::Morning),
            "afternoon" | "tarde" => Ok(TimeOfDay::Afternoon),
            "night" | "evening" | "noche" => Ok(TimeOfDay::Night),
            _ => Err(PlannerError::InvalidValue {
                field: "best_time",
                value: s.to_owned(),
                expected: "morning, afternoon or night",
            }),
        }
    }
}

/// Parse an English (chrono) or Spanish weekday name or abbreviation.
pub fn parse_weekday(s: &str) -> Result<Weekday, PlannerError> {
    let lowered = s.trim().to_lowercase();
    if let Ok(day) = lowered.parse::<Weekday>() {
        return Ok(day);
    }
    let day = match lowered.as_str() {
        "lun" | "lunes" => Weekday::Mon,
        "mar" | "martes" => Weekday::Tue,
        "mié" | "mie" | "miércoles" | "miercoles" => Weekday::Wed,
        "jue" | "jueves" => Weekday::Thu,
        "vie" | "viernes" => Weekday::Fri,
        "sáb" | "sab" | "sábado" | "sabado" => Weekday::Sat,
        "dom" | "domingo" => Weekday::Sun,
        _ => {
            return Err(PlannerError::InvalidValue {
                field: "blocked day",
                value: s.to_owned(),
                expected: "a weekday name such as \"saturday\" or \"sábado\"",
            });
        }
    };
    Ok(day)
}

/// One task the user wants scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    pub deadline: NaiveDate,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    #[serde(default)]
    pub energy: EnergyLevel,
}

fn default_difficulty() -> u8 {
    DEFAULT_DIFFICULTY
}

impl TaskRecord {
    /// The pre-filled task a new form row starts with: "Tarea N", due today,
    /// medium difficulty, high energy.
    pub fn placeholder(number: usize, language: Language, today: NaiveDate) -> Self {
        Self {
            name: format!("{} {number}", language.strings().task_word),
            deadline: today,
            difficulty: DEFAULT_DIFFICULTY,
            energy: EnergyLevel::High,
        }
    }

    /// Parse `name;YYYY-MM-DD;difficulty;energy`. Difficulty and energy may
    /// be omitted and take their defaults.
    pub fn parse_spec(spec: &str) -> Result<Self, PlannerError> {
        let invalid = |detail: String| PlannerError::InvalidTaskSpec {
            spec: spec.to_owned(),
            detail,
        };

        let parts: Vec<&str> = spec.split(';').map(str::trim).collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(invalid(format!("expected 2 to 4 fields, got {}", parts.len())));
        }

        let deadline = NaiveDate::parse_from_str(parts[1], "%Y-%m-%d")
            .map_err(|e| invalid(format!("bad deadline '{}': {e}", parts[1])))?;
        let difficulty = match parts.get(2).filter(|p| !p.is_empty()) {
            Some(d) => d
                .parse::<u8>()
                .map_err(|e| invalid(format!("bad difficulty '{d}': {e}")))?,
            None => DEFAULT_DIFFICULTY,
        };
        let energy = match parts.get(3).filter(|p| !p.is_empty()) {
            Some(e) => e.parse::<EnergyLevel>().map_err(|e| invalid(e.to_string()))?,
            None => EnergyLevel::default(),
        };

        Ok(Self {
            name: parts[0].to_owned(),
            deadline,
            difficulty,
            energy,
        })
    }

    /// Check one task; `index` is its 1-based position, used in the error.
    pub fn validate(&self, index: usize) -> Result<(), PlannerError> {
        if self.name.trim().is_empty() {
            return Err(PlannerError::InvalidTask {
                index,
                detail: "name must not be empty".to_owned(),
            });
        }
        if !(1..=MAX_DIFFICULTY).contains(&self.difficulty) {
            return Err(PlannerError::InvalidTask {
                index,
                detail: format!("difficulty must be between 1 and 10 (got {})", self.difficulty),
            });
        }
        Ok(())
    }
}

/// Everything the prompt is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    pub hours_per_day: u32,
    pub best_time: TimeOfDay,
    pub blocked_days: Vec<Weekday>,
    pub tasks: Vec<TaskRecord>,
    pub language: Language,
}

fn default_hours() -> u32 {
    DEFAULT_HOURS_PER_DAY
}

impl PlanRequest {
    pub fn new(tasks: Vec<TaskRecord>, language: Language) -> Self {
        Self {
            hours_per_day: DEFAULT_HOURS_PER_DAY,
            best_time: TimeOfDay::default(),
            blocked_days: Vec::new(),
            tasks,
            language,
        }
    }

    /// Blocked days in Monday-first order without duplicates.
    pub fn normalized_blocked_days(&self) -> Vec<Weekday> {
        let mut days = self.blocked_days.clone();
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        days
    }

    pub fn validate(&self) -> Result<(), PlannerError> {
        if self.tasks.is_empty() {
            return Err(PlannerError::NoTasks);
        }
        if !(1..=MAX_HOURS_PER_DAY).contains(&self.hours_per_day) {
            return Err(PlannerError::InvalidHours {
                hours: self.hours_per_day,
            });
        }
        if self.normalized_blocked_days().len() == 7 {
            return Err(PlannerError::AllDaysBlocked);
        }
        for (i, task) in self.tasks.iter().enumerate() {
            task.validate(i + 1)?;
        }
        Ok(())
    }
}

/// Request file as written by the user; language is optional so the CLI
/// and session can supply it.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RequestFile {
    #[serde(default = "default_hours")]
    hours_per_day: u32,
    #[serde(default)]
    best_time: TimeOfDay,
    #[serde(default)]
    blocked_days: Vec<String>,
    #[serde(default)]
    tasks: Vec<TaskRecord>,
    language: Option<Language>,
}

/// A request loaded from TOML, with the language it named, if any.
#[derive(Debug, Clone)]
pub struct LoadedRequest {
    pub request: PlanRequest,
    pub language: Option<Language>,
}

/// Read a TOML request file.
///
/// `blocked_days` accepts English or Spanish weekday names. Deadlines are
/// quoted `YYYY-MM-DD` strings.
pub fn load_request_file(path: &Path) -> Result<LoadedRequest, PlannerError> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PlannerError::RequestFileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            PlannerError::InvalidRequestFile {
                path: path.to_path_buf(),
                detail: e.to_string(),
            }
        }
    })?;

    parse_request_toml(&contents).map_err(|detail| PlannerError::InvalidRequestFile {
        path: path.to_path_buf(),
        detail,
    })
}

fn parse_request_toml(contents: &str) -> Result<LoadedRequest, String> {
    let file: RequestFile = toml::from_str(contents).map_err(|e| e.to_string())?;
    let blocked_days = file
        .blocked_days
        .iter()
        .map(|d| parse_weekday(d))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;

    Ok(LoadedRequest {
        request: PlanRequest {
            hours_per_day: file.hours_per_day,
            best_time: file.best_time,
            blocked_days,
            tasks: file.tasks,
            language: file.language.unwrap_or_default(),
        },
        language: file.language,
    })
}
