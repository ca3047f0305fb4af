fn main() {
    if let Err(err) = incontrol_bridge::app::run_replay() {
        eprintln!("replay startup failed: {err}");
        std::process::exit(1);
    }
}
