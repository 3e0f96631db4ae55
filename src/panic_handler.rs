use log::error;
use std::panic;
use std::thread;

/// Install readable backtraces and make sure panics reach the log file.
///
/// Render threads catch their own panics and turn them into failed replies,
/// so only a panic on the main thread ends the process.
pub fn initialize_panic_handler() {
    better_panic::install();

    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let on_main = thread::current().name() == Some("main");
        error!("{panic_info}");
        log::logger().flush();

        default_hook(panic_info);

        if on_main {
            std::process::exit(1);
        }
    }));
}
