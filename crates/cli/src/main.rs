use std::process::ExitCode;

fn main() -> ExitCode {
    rolecall_cli::run()
}
