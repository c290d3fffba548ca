use std::process::exit;

use peryan::cli;

fn main() {
    exit(cli::run_cli());
}
