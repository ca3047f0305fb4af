fn main() {
    if let Err(err) = incontrol_bridge::app::run_status() {
        eprintln!("status snapshot failed: {err}");
        std::process::exit(1);
    }
}
