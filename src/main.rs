//! fnxc entry point.

fn main() {
    std::process::exit(fnxc::cli::run());
}
