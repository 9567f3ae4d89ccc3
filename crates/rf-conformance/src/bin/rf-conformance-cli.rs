#![forbid(unsafe_code)]

use rf_conformance::{HarnessConfig, enforce_green, run_fixture_suite};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut config = HarnessConfig::default_paths();
    let mut emit_json = false;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--case-id" => {
                let value = args
                    .next()
                    .ok_or("--case-id requires a value (e.g. merge_inner)")?;
                config.case_filter = Some(value);
            }
            "--fixture-root" => {
                let value = args.next().ok_or("--fixture-root requires a directory")?;
                config.fixture_root = value.into();
            }
            "--require-green" => {
                config.require_green = true;
            }
            "--json" => {
                emit_json = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            other => {
                return Err(format!("unknown argument: {other}").into());
            }
        }
    }

    let report = run_fixture_suite(&config)?;
    if emit_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for result in &report.results {
            println!(
                "case={} operation={:?} status={:?}{}",
                result.case_id,
                result.operation,
                result.status,
                result
                    .mismatch
                    .as_deref()
                    .map(|reason| format!(" mismatch={reason}"))
                    .unwrap_or_default()
            );
        }
        println!(
            "suite={} fixtures={} passed={} failed={} green={}",
            report.suite,
            report.fixture_count,
            report.passed,
            report.failed,
            report.is_green()
        );
    }

    if config.require_green {
        enforce_green(&report)?;
    }
    Ok(())
}

fn print_help() {
    println!(
        "rf-conformance-cli\n\
         Usage:\n\
         \trf-conformance-cli [--case-id merge_] [--fixture-root DIR] [--require-green] [--json]\n\
         Options:\n\
         \t--case-id <text>     Run only cases whose id contains <text>\n\
         \t--fixture-root <dir> Read cases from <dir>/cases instead of the bundled fixtures\n\
         \t--require-green      Exit non-zero when any case fails\n\
         \t--json               Print the suite report as JSON\n\
         \t-h, --help           Show this help\n\
         Logging is controlled by RUST_LOG (e.g. RUST_LOG=rf_join=debug)."
    );
}
