use std::process::exit;

use presses::run_texel_program;

fn main() {
    if let Err(err) = run_texel_program() {
        eprintln!("{err}");
        exit(1);
    }
}
