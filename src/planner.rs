//! Plan generation: request → prompt → backend → Markdown → table → CSV.
//!
//! One call, no retries. A backend failure aborts the run and is returned as
//! [`PlannerError::Generation`] so the CLI can show a localized notice.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::agent::CommandBackend;
use crate::cache::{CacheKey, ResponseCache};
use crate::cli::RequestArgs;
use crate::config::{BackendKind, PlannerConfig};
use crate::error::PlannerError;
use crate::export::{self, ExportBytes};
use crate::generate::{GeminiBackend, GenerationBackend};
use crate::i18n::Language;
use crate::prompt;
use crate::request::{self, PlanRequest, TaskRecord};
use crate::session::SessionState;
use crate::table::{Extraction, TableExtractor};

/// Everything one `plan` run produced.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// The generated plan, exactly as the backend returned it.
    pub markdown: String,
    pub extraction: Extraction,
    /// CSV of the plan's table; empty when no table was found.
    pub export: ExportBytes,
    /// The markdown came from the response cache, not the backend.
    pub from_cache: bool,
}

impl PlanOutcome {
    pub fn is_degraded(&self) -> bool {
        self.extraction.table().is_some_and(|t| t.is_degraded())
    }
}

/// Build the backend named by `config.backend`.
///
/// The Gemini backend needs an API key; the command backend needs its
/// program on `PATH`. Both are checked here, before any prompt is built.
pub fn build_backend(config: &PlannerConfig) -> Result<Box<dyn GenerationBackend>, PlannerError> {
    let timeout = Duration::from_secs(config.request_timeout_sec);
    match config.backend {
        BackendKind::Gemini => {
            let api_key = config.api_key.clone().ok_or(PlannerError::MissingApiKey)?;
            let backend = GeminiBackend::new(
                api_key,
                config.model.clone(),
                config.api_base_url.clone(),
                timeout,
            )?;
            Ok(Box::new(backend))
        }
        BackendKind::Command => {
            let backend = CommandBackend::new(
                &config.agent_cmd,
                config.agent_args.clone(),
                PathBuf::from("."),
                timeout,
            )?;
            info!(program = %backend.program().display(), "command backend resolved");
            Ok(Box::new(backend))
        }
    }
}

/// Assemble the request from a request file or the session, then apply the
/// flags in `args`.
///
/// `--task` replaces the task list wholesale. Language precedence is
/// `language_override`, then the request file's `language`, then the
/// session's.
pub fn resolve_request(
    args: &RequestArgs,
    session: &SessionState,
    language_override: Option<Language>,
) -> Result<PlanRequest, PlannerError> {
    let (mut request, file_language) = match &args.request {
        Some(path) => {
            let loaded = request::load_request_file(path)?;
            (loaded.request, loaded.language)
        }
        None => (
            PlanRequest::new(session.tasks().to_vec(), session.language),
            None,
        ),
    };

    if !args.tasks.is_empty() {
        request.tasks = args
            .tasks
            .iter()
            .map(|spec| TaskRecord::parse_spec(spec))
            .collect::<Result<_, _>>()?;
    }
    if let Some(hours) = args.hours {
        request.hours_per_day = hours;
    }
    if let Some(best_time) = &args.best_time {
        request.best_time = best_time.parse()?;
    }
    if !args.blocked_days.is_empty() {
        request.blocked_days = args
            .blocked_days
            .iter()
            .map(|d| request::parse_weekday(d))
            .collect::<Result<_, _>>()?;
    }
    request.language = language_override
        .or(file_language)
        .unwrap_or(session.language);

    Ok(request)
}

/// Validate `request`, send its prompt to `backend` and extract the plan's
/// table.
///
/// With a `cache`, an identical earlier call (same backend, model,
/// temperature and prompt) is answered from disk, and successful responses
/// are stored. A cache write failure only logs a warning.
///
/// A response without a table is still a successful plan: the outcome
/// carries [`Extraction::NotFound`] and an empty export.
pub fn generate_plan(
    backend: &dyn GenerationBackend,
    request: &PlanRequest,
    extractor: &TableExtractor,
    temperature: f32,
    cache: Option<&ResponseCache>,
) -> Result<PlanOutcome, PlannerError> {
    request.validate()?;
    let prompt = prompt::build_prompt(request);

    info!(
        backend = backend.name(),
        language = %request.language,
        tasks = request.tasks.len(),
        prompt_len = prompt.len(),
        temperature,
        "requesting plan"
    );

    let key = CacheKey {
        backend: backend.name(),
        model: backend.model(),
        temperature,
        prompt: &prompt,
    };
    let cached = cache.and_then(|c| c.get(&key));
    let from_cache = cached.is_some();

    let markdown = match cached {
        Some(markdown) => {
            info!(
                backend = backend.name(),
                response_len = markdown.len(),
                "plan reused from cache"
            );
            markdown
        }
        None => {
            let markdown = call_backend(backend, &prompt, temperature)?;
            if let Some(cache) = cache {
                if let Err(e) = cache.put(&key, &markdown) {
                    warn!(err = %e, "could not cache generated plan");
                }
            }
            markdown
        }
    };

    let extraction = extractor.extract(&markdown);
    let export = match extraction.table() {
        Some(table) => {
            info!(
                columns = table.column_count(),
                rows = table.rows().len(),
                degraded_rows = table.degraded_rows(),
                "plan table extracted"
            );
            export::serialize(table)
        }
        None => {
            warn!("generated plan contains no table");
            ExportBytes::default()
        }
    };

    Ok(PlanOutcome {
        markdown,
        extraction,
        export,
        from_cache,
    })
}

fn call_backend(
    backend: &dyn GenerationBackend,
    prompt: &str,
    temperature: f32,
) -> Result<String, PlannerError> {
    let start = Instant::now();
    let markdown = backend.generate(prompt, temperature).map_err(|e| {
        error!(
            backend = backend.name(),
            duration_ms = start.elapsed().as_millis() as u64,
            err = %e,
            "generation failed"
        );
        e
    })?;

    info!(
        backend = backend.name(),
        duration_ms = start.elapsed().as_millis() as u64,
        response_len = markdown.len(),
        "plan generated"
    );
    Ok(markdown)
}
