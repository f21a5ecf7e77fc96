use std::process::ExitCode;

use clap::Parser;

use input_remapper_service::{ServiceArgs, entrypoint};

fn main() -> ExitCode {
    entrypoint::run(ServiceArgs::parse()).into()
}
