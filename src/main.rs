fn main() {
    if let Err(err) = incontrol_bridge::app::run() {
        eprintln!("application startup failed: {err}");
        std::process::exit(1);
    }
}
