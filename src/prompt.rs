//! Prompt construction for the generation backend.
//!
//! Every prompt sent to a backend is built here from a [`PlanRequest`]; the
//! functions are pure so the exact text can be reviewed and tested in one
//! place.

use std::fmt::Write;

use crate::i18n::Language;
use crate::request::{PlanRequest, TaskRecord};

/// Sampling temperature used when nothing else is configured.
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

/// Build the full planning prompt in the request's language.
pub fn build_prompt(request: &PlanRequest) -> String {
    let tasks = task_list_text(&request.tasks, request.language);
    let blocked = blocked_days_text(request);
    match request.language {
        Language::Es => spanish_prompt(request, &tasks, blocked.as_deref()),
        Language::En => english_prompt(request, &tasks, blocked.as_deref()),
    }
}

/// One line per task, numbered from 1:
/// `Tarea 1: Cálculo (Límite: 2026-11-02, Dificultad: 8/10, Energía: Alto)`.
pub fn task_list_text(tasks: &[TaskRecord], language: Language) -> String {
    let s = language.strings();
    let mut out = String::new();
    for (i, task) in tasks.iter().enumerate() {
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "{} {}: {} ({}: {}, {}: {}/10, {}: {})",
            s.task_word,
            i + 1,
            task.name.trim(),
            s.deadline_label,
            task.deadline.format("%Y-%m-%d"),
            s.difficulty_label,
            task.difficulty,
            s.energy_label,
            task.energy.label(language),
        );
    }
    out
}

/// Localized, comma-separated blocked weekdays, or `None` when no day is blocked.
fn blocked_days_text(request: &PlanRequest) -> Option<String> {
    let days = request.normalized_blocked_days();
    if days.is_empty() {
        return None;
    }
    let s = request.language.strings();
    Some(
        days.iter()
            .map(|d| s.weekday(*d))
            .collect::<Vec<_>>()
            .join(", "),
    )
}

fn spanish_prompt(request: &PlanRequest, tasks: &str, blocked: Option<&str>) -> String {
    let s = Language::Es.strings();
    let hours = request.hours_per_day;
    let best = request.best_time.label(Language::Es);

    let blocked_input = blocked
        .map(|d| format!("- Días Bloqueados (sin estudio): {d}.\n"))
        .unwrap_or_default();
    let blocked_rule = blocked
        .map(|d| {
            format!(
                "\n**RESTRICCIÓN ADICIONAL:** No asignes ningún bloque de estudio en los días bloqueados ({d}).\n"
            )
        })
        .unwrap_or_default();

    format!(
        "\
Actúa como un Experto en Planificación y Optimización de Procesos Académicos. Tu objetivo es crear un plan de estudio semanal que optimice la eficiencia y minimice el estrés para el estudiante.

**DATOS DE ENTRADA:**
- Horas de Estudio Diarias Disponibles: {hours} horas.
- Mejor Momento de Productividad: {best}.
{blocked_input}- LISTA DE TAREAS Y REQUERIMIENTOS:
{tasks}
**APLICACIÓN DE INGENIERÍA DE PROCESOS (CoT):**
1. Evalúa la Criticidad (Dificultad + Fecha Límite + Energía) de CADA tarea.
2. Prioriza las tareas más Críticas.
3. Asigna bloques de 1.5 a 2 horas, poniendo los bloques más difíciles en el momento: {best}.

**RESTRICCIÓN:** No excedas el límite de {hours} horas diarias.
{blocked_rule}
**OUTPUT REQUERIDO:**
1. Genera un plan de estudio DÍA POR DÍA para la próxima semana en formato **Tabla Markdown**. La tabla debe tener las columnas: {day}, Tarea (Nombre y Fecha Límite), Horario, Enfoque (Bloque de 1.5-2h).
2. Después de la tabla, proporciona un 'Comentario Crítico' de no más de 3 líneas.
",
        day = s.day_column,
    )
}

fn english_prompt(request: &PlanRequest, tasks: &str, blocked: Option<&str>) -> String {
    let s = Language::En.strings();
    let hours = request.hours_per_day;
    let best = request.best_time.label(Language::En);

    let blocked_input = blocked
        .map(|d| format!("- Blocked Days (no study): {d}.\n"))
        .unwrap_or_default();
    let blocked_rule = blocked
        .map(|d| {
            format!("\n**ADDITIONAL CONSTRAINT:** Do not assign any study block on the blocked days ({d}).\n")
        })
        .unwrap_or_default();

    format!(
        "\
Act as an Expert in Academic Planning and Process Optimization. Your goal is to create a weekly study plan that maximizes efficiency and minimizes stress for the student.

**INPUT DATA:**
- Available Daily Study Hours: {hours} hours.
- Most Productive Time of Day: {best}.
{blocked_input}- TASK LIST AND REQUIREMENTS:
{tasks}
**PROCESS ENGINEERING (CoT):**
1. Evaluate the Criticality (Difficulty + Deadline + Energy) of EACH task.
2. Prioritize the most Critical tasks.
3. Assign blocks of 1.5 to 2 hours, placing the hardest blocks in the {best}.

**CONSTRAINT:** Do not exceed the limit of {hours} hours per day.
{blocked_rule}
**REQUIRED OUTPUT:**
1. Produce a DAY BY DAY study plan for next week as a **Markdown Table**. The table must have the columns: {day}, Task (Name and Deadline), Schedule, Focus (1.5-2h Block).
2. After the table, give a 'Critical Comment' of no more than 3 lines.
",
        day = s.day_column,
    )
}
