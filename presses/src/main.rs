use std::process::exit;

use presses::run_program;

fn main() {
    if let Err(err) = run_program() {
        eprintln!("{err}");
        exit(1);
    }
}
