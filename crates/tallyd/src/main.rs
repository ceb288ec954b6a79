use std::ffi::OsString;
use std::io::{self, Write};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<OsString> = std::env::args_os().collect();
    match tallyd::run_worker(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            // Telemetry may not be installed yet, so the parent only sees
            // this line on the worker's stderr.
            drop(writeln!(io::stderr(), "tallyd: {error}"));
            ExitCode::FAILURE
        }
    }
}
