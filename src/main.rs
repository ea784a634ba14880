use clap::Parser;
use sensormirror::{
    BatchReport, BundleOperation, BundleReport, Cli, Command, MirrorError, OutputFormatter,
    OutputMode, SensorMirror, UserFriendlyError,
};
use std::path::Path;
use std::process;
use tracing_subscriber::EnvFilter;

const EXIT_OK: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_WARNINGS: i32 = 2;
const EXIT_ABORTED: i32 = 3;
const EXIT_ARCHIVE_NOT_FOUND: i32 = 4;
const EXIT_INTERRUPTED: i32 = 130;

fn main() {
    let exit_code = run();
    process::exit(exit_code);
}

fn run() -> i32 {
    let cli = Cli::parse();
    setup_logging(cli.verbosity_level());

    if let Command::InitConfig { ref path } = cli.command {
        return handle_init_config(path);
    }

    let app = match SensorMirror::from_cli(&cli) {
        Ok(app) => app,
        Err(e) => {
            print_startup_error(&e);
            return exit_code_for_error(&e);
        }
    };
    app.output_formatter().debug(&sensormirror::build_info().to_string());

    let outcome = match cli.command {
        Command::Extract(ref args) if args.dry_run => handle_extract_dry_run(&app),
        Command::Extract(_) => app.run_batch().map(|report| {
            app.output_formatter().print_batch_report(&report);
            exit_code_for_batch(&report)
        }),
        Command::Pack(ref args) => run_bundle(&app, &args.dir, BundleOperation::Pack, args.dry_run),
        Command::Unpack(ref args) => {
            run_bundle(&app, &args.dir, BundleOperation::Unpack, args.dry_run)
        }
        Command::InitConfig { .. } => Ok(EXIT_OK),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            app.handle_error(&e);
            exit_code_for_error(&e)
        }
    }
}

/// `RUST_LOG` wins; otherwise `-v` count picks the crate's level. Logs go
/// to stderr so JSON output on stdout stays parseable.
fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sensormirror={}", level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_init_config(path: &Path) -> i32 {
    match SensorMirror::generate_sample_config(path) {
        Ok(()) => {
            println!("Generated sample configuration file: {}", path.display());
            println!("\nTo use this configuration:");
            println!("  sensormirror --config {} extract", path.display());
            println!("\nEdit the file to point [archive] root at your data.");
            EXIT_OK
        }
        Err(e) => {
            eprintln!(
                "Failed to generate configuration file: {}",
                e.user_message()
            );
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            EXIT_ERROR
        }
    }
}

fn handle_extract_dry_run(app: &SensorMirror) -> sensormirror::Result<i32> {
    let formatter = app.output_formatter();
    let plan = app.plan_extraction()?;

    if formatter.mode() == OutputMode::Json {
        println!(
            "{}",
            serde_json::to_string_pretty(&plan).unwrap_or_else(|_| "{}".to_string())
        );
        return Ok(EXIT_OK);
    }

    formatter.print_header("Dry run: nothing will be copied");
    formatter.print_detail("Archive root", &plan.archive_root.display().to_string());
    formatter.print_detail("Mirror root", &plan.mirror_root.display().to_string());
    formatter.print_detail("Tasks", &plan.tasks.join(", "));
    formatter.print_detail("Sensors", &plan.sensors.join(", "));
    formatter.print_separator();

    if plan.participants.is_empty() {
        formatter.warning("No participants matched");
    }

    for participant in &plan.participants {
        match (&participant.date_dir, &participant.problem) {
            (Some(date_dir), _) => formatter.print_detail(
                &participant.participant,
                &format!(
                    "{} -> {}",
                    date_dir,
                    participant.mirror_dir.join(date_dir).display()
                ),
            ),
            (None, Some(problem)) => {
                formatter.warning(&format!("{}: {}", participant.participant, problem))
            }
            (None, None) => {}
        }
    }

    formatter.print_separator();
    formatter.success("Dry run completed");
    Ok(EXIT_OK)
}

fn run_bundle(
    app: &SensorMirror,
    dir: &Path,
    operation: BundleOperation,
    dry_run: bool,
) -> sensormirror::Result<i32> {
    if dry_run {
        let formatter = app.output_formatter();
        let names = app.bundle_candidates(dir, operation)?;

        if formatter.mode() == OutputMode::Json {
            println!(
                "{}",
                serde_json::json!({ "operation": operation, "directory": dir, "items": names })
            );
        } else {
            formatter.print_header("Dry run: nothing will be written");
            for name in &names {
                formatter.print_detail("Would process", name);
            }
            formatter.success(&format!("{} item(s) in {}", names.len(), dir.display()));
        }
        return Ok(EXIT_OK);
    }

    let report = match operation {
        BundleOperation::Pack => app.pack(dir)?,
        BundleOperation::Unpack => app.unpack(dir)?,
    };
    app.output_formatter().print_bundle_report(&report);
    Ok(exit_code_for_bundle(&report))
}

fn exit_code_for_batch(report: &BatchReport) -> i32 {
    if report.interrupted {
        EXIT_INTERRUPTED
    } else if report.has_aborted_participants() {
        EXIT_ABORTED
    } else if report.has_warnings() {
        EXIT_WARNINGS
    } else {
        EXIT_OK
    }
}

fn exit_code_for_bundle(report: &BundleReport) -> i32 {
    if report.interrupted {
        EXIT_INTERRUPTED
    } else if report.has_failures() {
        EXIT_ABORTED
    } else {
        EXIT_OK
    }
}

fn exit_code_for_error(error: &MirrorError) -> i32 {
    match error {
        MirrorError::Cancelled => EXIT_INTERRUPTED,
        MirrorError::ArchiveRootNotFound { .. } => EXIT_ARCHIVE_NOT_FOUND,
        _ => EXIT_ERROR,
    }
}

fn print_startup_error(error: &MirrorError) {
    let formatter = OutputFormatter::new(OutputMode::Human, 0, false);
    formatter.print_user_friendly_error(error);
}
