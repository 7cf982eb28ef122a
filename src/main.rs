use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{arg, command, value_parser, ArgAction, ArgMatches, Command};
use colored::Colorize;
use serde_json::json;
use tracing::Level;

use dslx_batch::golden::{find_golden_files, run_golden, GOLDEN_SUFFIX};
use dslx_batch::{BatchHarness, EmptyRowPolicy, Error, RowFailurePolicy, RunConfig, Value};

fn main() -> ExitCode {
    let matches = command!()
        .subcommand_required(true)
        .arg(arg!(-v --verbose ... "Log more; repeat for more detail").global(true))
        .arg(
            arg!(--"stdlib-path" <DIR> "Directory searched first for imported modules")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            arg!(-I --"search-path" <DIR> "Additional directory searched for imported modules")
                .value_parser(value_parser!(PathBuf))
                .action(ArgAction::Append)
                .global(true),
        )
        .arg(
            arg!(--"max-call-depth" <DEPTH> "Nested calls allowed before a row fails")
                .value_parser(value_parser!(usize))
                .global(true),
        )
        .arg(
            arg!(--"tag-rows" "Report failing rows individually instead of failing the batch")
                .global(true),
        )
        .subcommand(
            Command::new("function")
                .about("Run a function once per batch row")
                .arg(arg!(<file> "The DSLX source file").value_parser(value_parser!(PathBuf)))
                .arg(arg!(<top> "The function to run"))
                .arg(
                    arg!(<batch> "JSON file with a list of argument rows")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(arg!(--json "Print results as JSON")),
        )
        .subcommand(
            Command::new("proc")
                .about("Spawn a proc and tick it once per batch row")
                .arg(arg!(<file> "The DSLX source file").value_parser(value_parser!(PathBuf)))
                .arg(arg!(<top> "The proc to run"))
                .arg(
                    arg!(<batch> "JSON file with a list of input-channel rows")
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    arg!(-s --state <VALUE> "Initial state element, as a value literal")
                        .action(ArgAction::Append),
                )
                .arg(arg!(--"drop-empty-rows" "Leave out ticks that produced no outputs"))
                .arg(arg!(--json "Print results as JSON")),
        )
        .subcommand(
            Command::new("golden")
                .about(format!("Run `*{GOLDEN_SUFFIX}` golden batches"))
                .arg(
                    arg!([path] "A golden file, or a directory to search")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("tests"),
                )
                .arg(arg!(-f --filter <NAME> "Only run cases whose name contains this")),
        )
        .get_matches();

    init_logging(matches.get_count("verbose"));
    let config = run_config(&matches);

    let passed = match matches.subcommand() {
        Some(("function", args)) => run_function(config, args),
        Some(("proc", args)) => run_proc(config, args),
        Some(("golden", args)) => {
            let path = args.get_one::<PathBuf>("path").cloned().unwrap_or_default();
            let files = if path.is_dir() {
                find_golden_files(&path)
            } else {
                vec![path]
            };
            let filter = args.get_one::<String>("filter").map(String::as_str);
            run_golden(&files, &config, filter)
        }
        _ => false,
    };
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run_config(matches: &ArgMatches) -> RunConfig {
    let mut config = RunConfig::default();
    if let Some(path) = matches.get_one::<PathBuf>("stdlib-path") {
        config = config.with_stdlib_path(path);
    }
    for path in matches.get_many::<PathBuf>("search-path").into_iter().flatten() {
        config = config.with_search_path(path);
    }
    if let Some(depth) = matches.get_one::<usize>("max-call-depth") {
        config = config.with_max_call_depth(*depth);
    }
    if matches.get_flag("tag-rows") {
        config = config.with_row_failures(RowFailurePolicy::TagRows);
    }
    config
}

fn read_inputs(file: &Path, batch: &Path) -> Option<(String, Vec<Vec<Value>>)> {
    let Ok(code) = fs::read_to_string(file) else {
        println!("{}: {}", "Could not read file".bright_red(), file.display());
        return None;
    };
    let rows = fs::read_to_string(batch)
        .map_err(|err| err.to_string())
        .and_then(|text| serde_json::from_str(&text).map_err(|err| err.to_string()));
    match rows {
        Ok(rows) => Some((code, rows)),
        Err(message) => {
            println!("{} {}: {message}", "Could not read batch".bright_red(), batch.display());
            None
        }
    }
}

fn run_function(config: RunConfig, args: &ArgMatches) -> bool {
    let (Some(file), Some(top), Some(batch)) = (
        args.get_one::<PathBuf>("file"),
        args.get_one::<String>("top"),
        args.get_one::<PathBuf>("batch"),
    ) else {
        return false;
    };
    let Some((code, rows)) = read_inputs(file, batch) else {
        return false;
    };

    let mut harness = BatchHarness::dslx(config);
    let results = match harness.run_function(&code, top, &rows) {
        Ok(results) => results,
        Err(error) => {
            report(&harness, &error);
            return false;
        }
    };

    let all_ok = results.iter().all(Result::is_ok);
    if args.get_flag("json") {
        let rows: Vec<_> = results
            .iter()
            .map(|row| match row {
                Ok(value) => json!(value),
                Err(error) => error_json(error),
            })
            .collect();
        println!("{}", json!(rows));
    } else {
        for row in &results {
            match row {
                Ok(value) => println!("{value}"),
                Err(error) => println!("{}", error.to_string().red()),
            }
        }
    }
    all_ok
}

fn run_proc(config: RunConfig, args: &ArgMatches) -> bool {
    let (Some(file), Some(top), Some(batch)) = (
        args.get_one::<PathBuf>("file"),
        args.get_one::<String>("top"),
        args.get_one::<PathBuf>("batch"),
    ) else {
        return false;
    };
    let Some((code, rows)) = read_inputs(file, batch) else {
        return false;
    };
    let mut initial_state = Vec::new();
    for literal in args.get_many::<String>("state").into_iter().flatten() {
        match literal.parse::<Value>() {
            Ok(value) => initial_state.push(value),
            Err(error) => {
                println!("{} `{literal}`: {}", "Invalid state value".bright_red(), error.message);
                return false;
            }
        }
    }
    let config = if args.get_flag("drop-empty-rows") {
        config.with_empty_rows(EmptyRowPolicy::Drop)
    } else {
        config
    };

    let mut harness = BatchHarness::dslx(config);
    let results = match harness.run_proc(&code, top, &rows, &initial_state) {
        Ok(results) => results,
        Err(error) => {
            report(&harness, &error);
            return false;
        }
    };

    let all_ok = results.iter().all(Result::is_ok);
    if args.get_flag("json") {
        let rows: Vec<_> = results
            .iter()
            .map(|row| match row {
                Ok(row) => json!(row),
                Err(error) => error_json(error),
            })
            .collect();
        println!("{}", json!(rows));
    } else {
        for row in results {
            match row {
                Ok(row) => println!("{}", row.into_value()),
                Err(error) => println!("{}", error.to_string().red()),
            }
        }
    }
    all_ok
}

fn error_json(error: &Error) -> serde_json::Value {
    json!({ "error": error.kind(), "message": error.to_string() })
}

fn report(harness: &BatchHarness<dslx_batch::dslx::DslxToolchain>, error: &Error) {
    println!("{}", harness.render_error(error).bright_red());
}
