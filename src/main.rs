use std::process::ExitCode;

fn main() -> ExitCode {
    weekblock::run()
}
