use std::path::Path;
use std::process;

use clap::{App, Arg, ArgMatches};
use log::{warn, LevelFilter};

use latency_test::config::{parse_count, parse_duration};
use latency_test::report::{self, Format};
use latency_test::{measure, setup_logger, url, Cancel, ConfigBuilder, FileConfig, Progress, Result, SuccessPolicy};

const BANNER: &str = r"
     _        _
    | |      | |
    | |  __ _| |_ ___ _ __   ___ _   _
    | | / _` | __/ _ \ '_ \ / __| | | |
    | || (_| | ||  __/ | | | (__| |_| |
    |_| \__,_|\__\___|_| |_|\___|\__, |
                                  __/ |
                                 |___/
    HTTP latency measurement
";

fn main() {
    let matches = cli().get_matches();

    let log_level = match matches.occurrences_of("v") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    if let Err(e) = setup_logger(log_level, matches.value_of("log-file").map(Path::new)) {
        eprintln!("error: {}", e);
        process::exit(1);
    }

    if let Err(e) = run(&matches) {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<()> {
    // everything that can be wrong with the input is caught here, before any request
    let target = url::normalise(matches.value_of("url").unwrap_or_default())?;

    let mut builder = ConfigBuilder::new(target);

    if let Some(path) = matches.value_of("config") {
        builder = FileConfig::from_file(Path::new(path))?.apply(builder)?;
    }
    if let Some(n) = matches.value_of("num_tests") {
        builder = builder.attempts(parse_count("num_tests", n)?);
    }
    if let Some(n) = matches.value_of("workers") {
        builder = builder.workers(parse_count("workers", n)?);
    }
    if let Some(timeout) = matches.value_of("timeout") {
        builder = builder.timeout(parse_duration("timeout", timeout)?);
    }
    if let Some(deadline) = matches.value_of("deadline") {
        builder = builder.deadline(parse_duration("deadline", deadline)?);
    }
    if matches.is_present("keep-alive") {
        builder = builder.keep_alive(true);
    }
    if matches.is_present("any-status") {
        builder = builder.success(SuccessPolicy::AnyResponse);
    }

    let config = builder.build();
    config.validate()?;

    let format = matches.value_of("format").unwrap_or("text").parse::<Format>()?;
    let quiet = matches.is_present("quiet") || format == Format::Json;

    if !quiet {
        println!("{}", BANNER);
        println!("Testing URL: {}", config.target);
    }

    let cancel = Cancel::new();
    let handler_cancel = cancel.clone();
    let handler = move || {
        if let Some(code) = interrupt(&handler_cancel) {
            process::exit(code);
        }
    };
    if let Err(e) = ctrlc::set_handler(handler) {
        warn!("failed to install ctrl-c handler: {}", e);
    }

    let mut progress = if quiet {
        Progress::hidden()
    } else {
        Progress::new(config.attempts)
    };

    let summary = measure(&config, &cancel, &mut progress)?;

    println!("{}", report::render(format, &config.target, &summary)?);

    Ok(())
}

/// The first ctrl-c lets the workers wind down and still reports what finished. A second
/// one gives up on in-flight requests and returns the exit code to leave with.
fn interrupt(cancel: &Cancel) -> Option<i32> {
    if cancel.cancel() {
        return Some(130);
    }

    eprintln!("interrupted, finishing in-flight requests (ctrl-c again to quit)");
    None
}

fn cli() -> App<'static, 'static> {
    App::new("latency-test")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Test the latency of a specified URL with multiple requests.")
        .arg(
            Arg::with_name("url")
                .help("The URL to test; scheme and www. are added when missing")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("num_tests")
                .short("n")
                .long("num_tests")
                .help("The number of tests to run (default is 100)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("workers")
                .short("w")
                .long("workers")
                .help("The number of concurrent workers (default is 10)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("timeout")
                .short("t")
                .long("timeout")
                .help("Per-request timeout, e.g. 5s or 750ms, or 'none' (default is 5s)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("deadline")
                .short("d")
                .long("deadline")
                .help("Stop starting new requests after this long, e.g. 30s")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("keep-alive")
                .long("keep-alive")
                .help("Reuse connections between requests made by the same worker"),
        )
        .arg(
            Arg::with_name("any-status")
                .long("any-status")
                .help("Count 4xx/5xx responses as successful"),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .help("TOML file with default settings")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .help("Report format")
                .possible_values(&["text", "json"])
                .takes_value(true),
        )
        .arg(
            Arg::with_name("quiet")
                .short("q")
                .long("quiet")
                .help("No banner and no progress bar"),
        )
        .arg(
            Arg::with_name("log-file")
                .long("log-file")
                .help("Also write logs to this file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
}
