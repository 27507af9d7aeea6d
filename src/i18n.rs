//! Static string tables for the two supported languages.
//!
//! Lookup only: every user-visible label, weekday name and notice lives in a
//! [`Strings`] table selected by [`Language::strings`].

use std::fmt;
use std::str::FromStr;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::error::PlannerError;
use crate::generate::GenerationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Es,
    En,
}

impl Language {
    pub fn strings(self) -> &'static Strings {
        match self {
            Language::Es => &ES,
            Language::En => &EN,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Language::Es => "es",
            Language::En => "en",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = PlannerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "es" | "spanish" | "español" | "espanol" => Ok(Language::Es),
            "en" | "english" | "inglés" | "ingles" => Ok(Language::En),
            _ => Err(PlannerError::InvalidValue {
                field: "language",
                value: s.to_owned(),
                expected: "\"es\" or \"en\"",
            }),
        }
    }
}

/// Labels and notices for one language.
#[derive(Debug)]
pub struct Strings {
    /// Prefix for numbered task names and task-list lines ("Tarea 1").
    pub task_word: &'static str,
    pub deadline_label: &'static str,
    pub difficulty_label: &'static str,
    pub energy_label: &'static str,
    pub energy_high: &'static str,
    pub energy_medium: &'static str,
    pub energy_low: &'static str,
    pub morning: &'static str,
    pub afternoon: &'static str,
    pub night: &'static str,
    /// Monday first.
    pub weekdays: [&'static str; 7],
    /// First column the prompt asks the model to use for the plan table.
    pub day_column: &'static str,
    pub export_file_name: &'static str,
    pub plan_generated: &'static str,
    pub no_table_found: &'static str,
    pub degraded_table: &'static str,
    pub export_written: &'static str,
    pub last_task_kept: &'static str,
    pub auth_failure: &'static str,
    pub rate_limited: &'static str,
    pub transient_failure: &'static str,
    pub unexpected_failure: &'static str,
}

static ES: Strings = Strings {
    task_word: "Tarea",
    deadline_label: "Límite",
    difficulty_label: "Dificultad",
    energy_label: "Energía",
    energy_high: "Alto",
    energy_medium: "Medio",
    energy_low: "Bajo",
    morning: "Mañana",
    afternoon: "Tarde",
    night: "Noche",
    weekdays: [
        "Lunes",
        "Martes",
        "Miércoles",
        "Jueves",
        "Viernes",
        "Sábado",
        "Domingo",
    ],
    day_column: "Día",
    export_file_name: "plan_de_estudio.csv",
    plan_generated: "✅ Planificación generada con éxito",
    no_table_found: "No se encontró ninguna tabla en el plan generado; no hay nada que exportar.",
    degraded_table: "⚠️ Algunas filas de la tabla tenían un número de columnas distinto y fueron ajustadas.",
    export_written: "CSV guardado en",
    last_task_kept: "La lista siempre conserva al menos una tarea.",
    auth_failure: "🚨 La clave de API no es válida o no está configurada.",
    rate_limited: "🚨 Se alcanzó el límite de uso del servicio de generación. Inténtalo más tarde.",
    transient_failure: "🚨 No se pudo contactar con el servicio de generación.",
    unexpected_failure: "🚨 Error inesperado del servicio de generación.",
};

static EN: Strings = Strings {
    task_word: "Task",
    deadline_label: "Deadline",
    difficulty_label: "Difficulty",
    energy_label: "Energy",
    energy_high: "High",
    energy_medium: "Medium",
    energy_low: "Low",
    morning: "Morning",
    afternoon: "Afternoon",
    night: "Night",
    weekdays: [
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
        "Sunday",
    ],
    day_column: "Day",
    export_file_name: "study_plan.csv",
    plan_generated: "✅ Plan generated successfully",
    no_table_found: "No table was found in the generated plan; nothing to export.",
    degraded_table: "⚠️ Some table rows had a different number of columns and were adjusted.",
    export_written: "CSV written to",
    last_task_kept: "The list always keeps at least one task.",
    auth_failure: "🚨 The API key is invalid or not configured.",
    rate_limited: "🚨 The generation service rate limit was reached. Try again later.",
    transient_failure: "🚨 Could not reach the generation service.",
    unexpected_failure: "🚨 Unexpected error from the generation service.",
};

impl Strings {
    pub fn weekday(&self, day: Weekday) -> &'static str {
        self.weekdays[day.num_days_from_monday() as usize]
    }

    /// One-line notice shown to the user when the generation call fails.
    pub fn generation_notice(&self, err: &GenerationError) -> String {
        let headline = match err {
            GenerationError::Authentication { .. } => self.auth_failure,
            GenerationError::RateLimited { .. } => self.rate_limited,
            GenerationError::Transient { .. } => self.transient_failure,
            _ => self.unexpected_failure,
        };
        format!("{headline} ({err})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_codes_and_names() {
        assert_eq!("es".parse::<Language>().unwrap(), Language::Es);
        assert_eq!("English".parse::<Language>().unwrap(), Language::En);
        assert_eq!(" Español ".parse::<Language>().unwrap(), Language::Es);
    }

    #[test]
    fn rejects_unknown_language() {
        let err = "fr".parse::<Language>().unwrap_err();
        assert!(err.to_string().contains("language"), "got: {err}");
    }

    #[test]
    fn default_language_is_spanish() {
        assert_eq!(Language::default(), Language::Es);
        assert_eq!(Language::default().to_string(), "es");
    }

    #[test]
    fn weekday_names_start_on_monday() {
        assert_eq!(Language::Es.strings().weekday(Weekday::Mon), "Lunes");
        assert_eq!(Language::Es.strings().weekday(Weekday::Sat), "Sábado");
        assert_eq!(Language::En.strings().weekday(Weekday::Sun), "Sunday");
    }

    #[test]
    fn day_column_matches_language() {
        assert_eq!(Language::Es.strings().day_column, "Día");
        assert_eq!(Language::En.strings().day_column, "Day");
    }

    #[test]
    fn generation_notice_is_classified() {
        let en = Language::En.strings();
        let notice = en.generation_notice(&GenerationError::RateLimited {
            detail: "quota".into(),
        });
        assert!(notice.starts_with(en.rate_limited), "got: {notice}");

        let notice = en.generation_notice(&GenerationError::EmptyResponse);
        assert!(notice.starts_with(en.unexpected_failure), "got: {notice}");
    }
}
