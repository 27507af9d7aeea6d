use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::process::ExitCode;

use chrono::{Local, NaiveDate};
use clap::Parser;
use tracing::{error, info, warn};

use studyplan::cache::ResponseCache;
use studyplan::cli::{
    AddTaskArgs, BackendArgs, Cli, Commands, CommonArgs, ExtractArgs, ExtractorArgs, PlanArgs,
    PromptArgs, SessionArgs, SessionCommand, SetArgs,
};
use studyplan::config::PlannerConfig;
use studyplan::error::PlannerError;
use studyplan::export;
use studyplan::i18n::Language;
use studyplan::planner;
use studyplan::prompt;
use studyplan::request::{EnergyLevel, TaskRecord};
use studyplan::session::{self, SessionState};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if tracing::dispatcher::has_been_set() {
                error!("{e:#}");
            } else {
                eprintln!("error: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Plan(args) => run_plan(args),
        Commands::Prompt(args) => run_prompt(args),
        Commands::Extract(args) => run_extract(args),
        Commands::Session(args) => run_session(args),
    }
}

/// Load config, start logging, then validate.
fn setup(
    common: &CommonArgs,
    backend: Option<&BackendArgs>,
    extractor: Option<&ExtractorArgs>,
) -> anyhow::Result<PlannerConfig> {
    let config = PlannerConfig::load(common, backend, extractor)?;

    studyplan::logging::init(config.log_level.as_deref(), config.log_file.as_deref())?;

    config.validate()?;
    Ok(config)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn language_override(common: &CommonArgs) -> Result<Option<Language>, PlannerError> {
    common.language.as_deref().map(str::parse).transpose()
}

fn run_plan(args: PlanArgs) -> anyhow::Result<()> {
    let config = setup(&args.common, Some(&args.backend), Some(&args.extractor))?;

    let mut session = session::load_or_default(&config.state_dir, config.language, today())?;
    let request =
        planner::resolve_request(&args.request, &session, language_override(&args.common)?)?;
    let strings = request.language.strings();

    let backend = planner::build_backend(&config)?;
    info!(
        backend = backend.name(),
        model = %config.model,
        temperature = config.temperature,
        state_dir = %config.state_dir.display(),
        "config loaded"
    );

    let cache = (!args.no_cache).then(|| ResponseCache::new(&config.state_dir));
    let outcome = match planner::generate_plan(
        backend.as_ref(),
        &request,
        &config.extractor(),
        config.temperature,
        cache.as_ref(),
    ) {
        Ok(outcome) => outcome,
        Err(PlannerError::Generation(e)) => {
            return Err(anyhow::anyhow!(strings.generation_notice(&e)));
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", outcome.markdown);
    eprintln!("{}", strings.plan_generated);

    if outcome.is_degraded() {
        eprintln!("{}", strings.degraded_table);
    }

    if let Some(csv_path) = &args.csv {
        if outcome.export.is_empty() {
            eprintln!("{}", strings.no_table_found);
        } else {
            let target = export::export_target(csv_path, request.language);
            export::write_export(&outcome.export, &target)?;
            eprintln!("{} {}", strings.export_written, target.display());
        }
    }

    session.last_plan = Some(outcome.markdown);
    session::save_session(&session, &config.state_dir)?;
    Ok(())
}

fn run_prompt(args: PromptArgs) -> anyhow::Result<()> {
    let config = setup(&args.common, None, None)?;

    let session = session::load_or_default(&config.state_dir, config.language, today())?;
    let request =
        planner::resolve_request(&args.request, &session, language_override(&args.common)?)?;
    request.validate()?;

    let text = prompt::build_prompt(&request);
    match &args.output {
        Some(path) => {
            fs::write(path, &text).map_err(|e| {
                anyhow::anyhow!("failed to write prompt to {}: {e}", path.display())
            })?;
            info!(path = %path.display(), prompt_len = text.len(), "prompt written");
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn run_extract(args: ExtractArgs) -> anyhow::Result<()> {
    let config = setup(&args.common, None, Some(&args.extractor))?;

    let session = session::load_or_default(&config.state_dir, config.language, today())?;
    let language = language_override(&args.common)?.unwrap_or(session.language);
    let strings = language.strings();

    let document = match args.input.as_deref() {
        Some(path) if path == Path::new("-") => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| anyhow::anyhow!("failed to read stdin: {e}"))?;
            buf
        }
        Some(path) => fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?,
        None => session.last_plan.clone().ok_or(PlannerError::NoLastPlan)?,
    };

    let extractor = config.extractor();
    info!(
        locator = ?extractor.locator(),
        row_policy = %extractor.policy(),
        document_len = document.len(),
        "extracting table"
    );
    let extraction = extractor.extract(&document);
    let Some(table) = extraction.table() else {
        warn!(document_len = document.len(), "no table found");
        eprintln!("{}", strings.no_table_found);
        return Ok(());
    };
    if table.is_degraded() {
        eprintln!("{}", strings.degraded_table);
    }
    let bytes = export::serialize(table);

    match &args.output {
        Some(path) => {
            let target = export::export_target(path, language);
            export::write_export(&bytes, &target)?;
            eprintln!("{} {}", strings.export_written, target.display());
        }
        None => {
            std::io::stdout()
                .write_all(bytes.as_bytes())
                .map_err(|e| anyhow::anyhow!("failed to write CSV to stdout: {e}"))?;
        }
    }
    Ok(())
}

fn run_session(args: SessionArgs) -> anyhow::Result<()> {
    let config = setup(&args.common, None, None)?;
    let today = today();
    let mut session = session::load_or_default(&config.state_dir, config.language, today)?;

    match args.action {
        SessionCommand::Show => {
            print!("{}", render_session(&session));
            return Ok(());
        }
        SessionCommand::AddTask(task_args) => {
            let task = task_from_args(&task_args, &session, today)?;
            session.add_task(task, today);
        }
        SessionCommand::RemoveTask => {
            if session.remove_last_task().is_none() {
                eprintln!("{}", session.language.strings().last_task_kept);
            }
        }
        SessionCommand::Clear => session.clear_tasks(today),
        SessionCommand::Set(SetArgs { language, theme }) => {
            if let Some(language) = language {
                session.language = language.parse()?;
            }
            if let Some(theme) = theme {
                session.theme = theme.parse()?;
            }
        }
    }

    session::save_session(&session, &config.state_dir)?;
    info!(tasks = session.tasks().len(), "session updated");
    Ok(())
}

/// `None` when no field was given, so the session numbers a placeholder.
fn task_from_args(
    args: &AddTaskArgs,
    session: &SessionState,
    today: NaiveDate,
) -> Result<Option<TaskRecord>, PlannerError> {
    if args.is_empty() {
        return Ok(None);
    }

    let mut task = TaskRecord::placeholder(session.tasks().len() + 1, session.language, today);
    if let Some(name) = &args.name {
        task.name = name.clone();
    }
    if let Some(deadline) = &args.deadline {
        task.deadline = NaiveDate::parse_from_str(deadline, "%Y-%m-%d").map_err(|_| {
            PlannerError::InvalidValue {
                field: "deadline",
                value: deadline.clone(),
                expected: "a date as YYYY-MM-DD",
            }
        })?;
    }
    if let Some(difficulty) = args.difficulty {
        task.difficulty = difficulty;
    }
    if let Some(energy) = &args.energy {
        task.energy = energy.parse::<EnergyLevel>()?;
    }
    task.validate(session.tasks().len() + 1)?;
    Ok(Some(task))
}

fn render_session(session: &SessionState) -> String {
    let mut out = format!(
        "language: {}\ntheme: {}\ntasks:\n",
        session.language, session.theme
    );
    for line in prompt::task_list_text(session.tasks(), session.language).lines() {
        out.push_str("  ");
        out.push_str(line);
        out.push('\n');
    }
    match &session.last_plan {
        Some(plan) => out.push_str(&format!("last plan: {} chars\n", plan.chars().count())),
        None => out.push_str("last plan: none\n"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, extra: &str) -> String {
        let state_dir = dir.join("state");
        let path = dir.join("studyplan.toml");
        fs::write(
            &path,
            format!("state_dir = {:?}\n{extra}", state_dir.to_str().unwrap()),
        )
        .unwrap();
        path.to_str().unwrap().to_owned()
    }

    fn load_state(dir: &Path) -> SessionState {
        session::load_session(&dir.join("state"))
            .unwrap()
            .expect("session should be saved")
    }

    #[test]
    fn prompt_writes_to_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "");
        let out = dir.path().join("prompt.txt");

        let cli = Cli::try_parse_from([
            "studyplan",
            "prompt",
            "--config",
            config.as_str(),
            "--task",
            "Cálculo;2026-11-02;8;high",
            "--block-day",
            "sunday",
            "--output",
            out.to_str().unwrap(),
        ])
        .unwrap();
        run(cli).expect("prompt should succeed");

        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("Tarea 1: Cálculo"), "got: {text}");
        assert!(text.contains("Domingo"), "got: {text}");
    }

    #[test]
    fn prompt_rejects_invalid_hours() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "");

        let cli = Cli::try_parse_from([
            "studyplan", "prompt", "--config", config.as_str(), "--hours", "30",
        ])
        .unwrap();
        let err = run(cli).unwrap_err();
        assert!(format!("{err}").contains("between 1 and 24"), "got: {err}");
    }

    #[test]
    fn extract_writes_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "");
        let input = dir.path().join("plan.md");
        fs::write(&input, "Plan:\n\n| Day | Task |\n|---|---|\n| Monday | Physics |\n").unwrap();
        let output = dir.path().join("plan.csv");

        let cli = Cli::try_parse_from([
            "studyplan",
            "extract",
            "--config",
            config.as_str(),
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .unwrap();
        run(cli).expect("extract should succeed");

        assert_eq!(fs::read(&output).unwrap(), b"Day,Task\nMonday,Physics\n");
    }

    #[test]
    fn extract_without_table_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "");
        let input = dir.path().join("plan.md");
        fs::write(&input, "hello world, no tables here").unwrap();
        let output = dir.path().join("plan.csv");

        let cli = Cli::try_parse_from([
            "studyplan",
            "extract",
            "--config",
            config.as_str(),
            "--input",
            input.to_str().unwrap(),
            "--output",
            output.to_str().unwrap(),
        ])
        .unwrap();
        run(cli).expect("no table is not an error");
        assert!(!output.exists());
    }

    #[test]
    fn extract_without_last_plan_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "");

        let cli = Cli::try_parse_from(["studyplan", "extract", "--config", config.as_str()]).unwrap();
        let err = run(cli).unwrap_err();
        assert!(
            err.downcast_ref::<PlannerError>()
                .is_some_and(|e| matches!(e, PlannerError::NoLastPlan)),
            "got: {err}"
        );
    }

    #[test]
    fn session_add_set_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "");
        let session_cmd = |args: &[&str]| {
            let mut argv = vec!["studyplan", "session", "--config", config.as_str()];
            argv.extend_from_slice(args);
            run(Cli::try_parse_from(argv).unwrap())
        };

        session_cmd(&["add-task"]).unwrap();
        session_cmd(&[
            "add-task",
            "--name",
            "Física",
            "--deadline",
            "2026-11-03",
            "--difficulty",
            "7",
            "--energy",
            "low",
        ])
        .unwrap();
        session_cmd(&["set", "--language", "en", "--theme", "dark"]).unwrap();

        let state = load_state(dir.path());
        let names: Vec<&str> = state.tasks().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Tarea 1", "Tarea 2", "Física"]);
        assert_eq!(state.tasks()[2].energy, EnergyLevel::Low);
        assert_eq!(state.language, Language::En);
        assert_eq!(state.theme, studyplan::session::Theme::Dark);

        session_cmd(&["remove-task"]).unwrap();
        session_cmd(&["remove-task"]).unwrap();
        session_cmd(&["remove-task"]).unwrap();
        assert_eq!(load_state(dir.path()).tasks().len(), 1);
    }

    #[test]
    fn session_add_task_rejects_bad_difficulty() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "");

        let cli = Cli::try_parse_from([
            "studyplan",
            "session",
            "--config",
            config.as_str(),
            "add-task",
            "--difficulty",
            "11",
        ])
        .unwrap();
        assert!(run(cli).is_err());
    }

    #[test]
    fn render_session_lists_tasks() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
        let mut session = SessionState::new(Language::En, today);
        session.last_plan = Some("| a |".into());

        let text = render_session(&session);
        assert!(text.starts_with("language: en\ntheme: light\ntasks:\n"));
        assert!(text.contains("  Task 1: Task 1 (Deadline: 2026-10-18"), "got: {text}");
        assert!(text.ends_with("last plan: 5 chars\n"));
    }

    #[cfg(unix)]
    #[test]
    fn plan_with_command_backend_exports_csv() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(
            dir.path(),
            r#"
backend = "command"
agent_cmd = "sh"
agent_args = ["-c", "printf '%s\n' 'Plan' '' '| Día | Tarea |' '|---|---|' '| Lunes | Cálculo |'"]
"#,
        );
        let csv = dir.path().join("plan.csv");

        let cli = Cli::try_parse_from([
            "studyplan",
            "plan",
            "--config",
            config.as_str(),
            "--task",
            "Cálculo;2026-11-02;8;high",
            "--csv",
            csv.to_str().unwrap(),
        ])
        .unwrap();
        run(cli).expect("plan should succeed");

        assert_eq!(
            fs::read_to_string(&csv).unwrap(),
            "Día,Tarea\nLunes,Cálculo\n"
        );
        let state = load_state(dir.path());
        assert!(state.last_plan.unwrap().contains("| Lunes | Cálculo |"));
    }

    #[cfg(unix)]
    #[test]
    fn plan_csv_directory_uses_localized_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(
            dir.path(),
            r#"
backend = "command"
agent_cmd = "sh"
agent_args = ["-c", "printf '%s\n' '| Day | Task |' '|---|---|' '| Monday | Physics |'"]
"#,
        );

        let cli = Cli::try_parse_from([
            "studyplan",
            "plan",
            "--config",
            config.as_str(),
            "--language",
            "en",
            "--task",
            "Physics;2026-11-02",
            "--csv",
            dir.path().to_str().unwrap(),
        ])
        .unwrap();
        run(cli).expect("plan should succeed");

        assert_eq!(
            fs::read_to_string(dir.path().join("study_plan.csv")).unwrap(),
            "Day,Task\nMonday,Physics\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn repeated_plan_reuses_cached_response_unless_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let calls = dir.path().join("calls");
        let config = write_config(
            dir.path(),
            &format!(
                r#"
backend = "command"
agent_cmd = "sh"
agent_args = ["-c", "echo call >> '{}'; printf '%s\n' '| Día | Tarea |' '|---|---|' '| Lunes | Cálculo |'"]
"#,
                calls.display()
            ),
        );
        let plan = |extra: &[&str]| {
            let mut argv = vec![
                "studyplan",
                "plan",
                "--config",
                config.as_str(),
                "--task",
                "Cálculo;2026-11-02;8;high",
            ];
            argv.extend_from_slice(extra);
            run(Cli::try_parse_from(argv).unwrap()).expect("plan should succeed");
        };
        let call_count = || fs::read_to_string(&calls).unwrap().lines().count();

        plan(&[]);
        plan(&[]);
        assert_eq!(call_count(), 1);

        plan(&["--no-cache"]);
        plan(&["--no-cache"]);
        assert_eq!(call_count(), 3);

        let state = load_state(dir.path());
        assert!(state.last_plan.unwrap().contains("| Lunes | Cálculo |"));
    }

    #[cfg(unix)]
    #[test]
    fn plan_reports_failing_backend_with_notice() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(
            dir.path(),
            "backend = \"command\"\nagent_cmd = \"sh\"\nagent_args = [\"-c\", \"echo quota >&2; exit 1\"]\n",
        );

        let cli = Cli::try_parse_from(["studyplan", "plan", "--config", config.as_str()]).unwrap();
        let err = run(cli).unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("Error inesperado"), "got: {msg}");
        assert!(msg.contains("quota"), "got: {msg}");
        assert!(session::load_session(&dir.path().join("state")).unwrap().is_none());
    }

    #[test]
    fn plan_without_api_key_fails_before_generation() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path(), "backend = \"gemini\"\napi_key = \"\"\n");

        let cli = Cli::try_parse_from(["studyplan", "plan", "--config", config.as_str()]).unwrap();
        if std::env::var_os("GEMINI_API_KEY").is_some()
            || std::env::var_os("STUDYPLAN_API_KEY").is_some()
        {
            return;
        }
        let err = run(cli).unwrap_err();
        assert!(
            err.downcast_ref::<PlannerError>()
                .is_some_and(|e| matches!(e, PlannerError::MissingApiKey)),
            "got: {err}"
        );
    }
}
