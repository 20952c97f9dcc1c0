use std::process::ExitCode;

fn main() -> ExitCode {
    flightdesk_cli::run()
}
